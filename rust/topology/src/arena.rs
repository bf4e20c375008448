// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Arena-based storage for the planar topology graph.
//!
//! The [`TopoGraph`] is the central owner of all topology records. Nodes,
//! lines, areas and isles live in [`Slots`]: growable arrays of optional
//! records addressed by 1-based `u32` ids. Deleting a record leaves a `None`
//! tombstone so that ids held elsewhere (other records, the persisted file,
//! callers) never silently point at a different record.
//!
//! Cross references are plain ids in both directions: a boundary names the
//! area or isle on each of its sides, and the area or isle lists the
//! boundaries of its ring with a signed direction.

use nalgebra::Point3;
use rustc_hash::FxHashSet;

use crate::config::BuildLevel;
use crate::error::{Error, Result};
use crate::geometry::BoundBox;
use crate::keys::*;

/// Dense 1-based storage with tombstones.
#[derive(Debug, Clone)]
pub struct Slots<T> {
    items: Vec<Option<T>>,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Slots<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots from explicit contents; index 0 holds id 1.
    pub(crate) fn from_vec(items: Vec<Option<T>>) -> Self {
        Self { items }
    }

    /// Stores `item` under the next id and returns that id.
    pub fn push(&mut self, item: T) -> u32 {
        self.items.push(Some(item));
        self.items.len() as u32
    }

    /// Reserves the next id as a tombstone.
    pub fn push_dead(&mut self) -> u32 {
        self.items.push(None);
        self.items.len() as u32
    }

    /// Id the next [`Slots::push`] will return.
    pub fn next_id(&self) -> u32 {
        self.items.len() as u32 + 1
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        let index = (id as usize).checked_sub(1)?;
        self.items.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        let index = (id as usize).checked_sub(1)?;
        self.items.get_mut(index)?.as_mut()
    }

    /// Tombstones the slot and returns the record it held.
    pub fn kill(&mut self, id: u32) -> Option<T> {
        let index = (id as usize).checked_sub(1)?;
        self.items.get_mut(index)?.take()
    }

    /// Number of allocated slots, tombstones included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of live records.
    pub fn alive(&self) -> usize {
        self.items.iter().filter(|s| s.is_some()).count()
    }

    /// Live records with their ids, ascending.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|item| (i as u32 + 1, item)))
    }

    /// Every slot, tombstones included, ascending.
    pub fn slots(&self) -> impl Iterator<Item = Option<&T>> {
        self.items.iter().map(Option::as_ref)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// One line end registered at a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeLink {
    /// Positive when the line starts at the node, negative when it ends there.
    pub line: LineRef,
    /// Direction of the line leaving the node, radians in `(-pi, pi]`, or
    /// [`DEGENERATE_ANGLE`](crate::adjacency::DEGENERATE_ANGLE).
    pub angle: f32,
}

/// A junction of line endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub position: Point3<f64>,
    /// Incident line ends, sorted by ascending angle.
    pub links: Vec<NodeLink>,
}

/// Type-specific topology of a line record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineTopo {
    Point,
    Line {
        n1: NodeId,
        n2: NodeId,
    },
    Boundary {
        n1: NodeId,
        n2: NodeId,
        left: Face,
        right: Face,
    },
    Centroid {
        area: CentroidArea,
    },
}

/// A feature registered in the topology.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// Byte offset of the feature's record in the coordinate store.
    pub offset: u64,
    pub topo: LineTopo,
}

impl Line {
    pub fn feature_type(&self) -> FeatureType {
        match self.topo {
            LineTopo::Point => FeatureType::Point,
            LineTopo::Line { .. } => FeatureType::Line,
            LineTopo::Boundary { .. } => FeatureType::Boundary,
            LineTopo::Centroid { .. } => FeatureType::Centroid,
        }
    }

    /// Start and end node of lines and boundaries.
    pub fn nodes(&self) -> Option<(NodeId, NodeId)> {
        match self.topo {
            LineTopo::Line { n1, n2 } | LineTopo::Boundary { n1, n2, .. } => Some((n1, n2)),
            _ => None,
        }
    }

    /// Face on one side of a boundary.
    pub fn face(&self, side: Side) -> Option<Face> {
        match self.topo {
            LineTopo::Boundary { left, right, .. } => Some(match side {
                Side::Left => left,
                Side::Right => right,
            }),
            _ => None,
        }
    }

    pub(crate) fn face_mut(&mut self, side: Side) -> Option<&mut Face> {
        match &mut self.topo {
            LineTopo::Boundary { left, right, .. } => Some(match side {
                Side::Left => left,
                Side::Right => right,
            }),
            _ => None,
        }
    }

    pub fn centroid_area(&self) -> Option<CentroidArea> {
        match self.topo {
            LineTopo::Centroid { area } => Some(area),
            _ => None,
        }
    }
}

/// A region enclosed by a clockwise ring of boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    /// Ring in traversal order; a backward entry means the area is on the
    /// line's left side, a forward entry on its right side.
    pub lines: Vec<LineRef>,
    /// Isles nested directly inside this area.
    pub isles: Vec<IsleId>,
    pub centroid: Option<LineId>,
    pub bbox: BoundBox,
}

/// A counter-clockwise ring of boundaries: the outer side of a group of
/// areas, possibly nested inside an enclosing area.
#[derive(Debug, Clone, PartialEq)]
pub struct Isle {
    pub lines: Vec<LineRef>,
    pub area: Option<AreaId>,
    pub bbox: BoundBox,
}

/// Ids of lines and nodes touched since the last reset.
#[derive(Debug, Clone, Default)]
pub struct UpdateLog {
    pub(crate) enabled: bool,
    lines: Vec<LineId>,
    nodes: Vec<NodeId>,
    seen_lines: FxHashSet<LineId>,
    seen_nodes: FxHashSet<NodeId>,
}

impl UpdateLog {
    pub(crate) fn line(&mut self, id: LineId) {
        if self.enabled && self.seen_lines.insert(id) {
            self.lines.push(id);
        }
    }

    pub(crate) fn node(&mut self, id: NodeId) {
        if self.enabled && self.seen_nodes.insert(id) {
            self.nodes.push(id);
        }
    }

    pub fn lines(&self) -> &[LineId] {
        &self.lines
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn reset(&mut self) {
        self.lines.clear();
        self.nodes.clear();
        self.seen_lines.clear();
        self.seen_nodes.clear();
    }
}

/// The planar topology of one map.
///
/// # Example
///
/// ```
/// use planar_topo::TopoGraph;
///
/// let graph = TopoGraph::new(false);
/// assert_eq!(graph.node_count(), 0);
/// assert_eq!(graph.area_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct TopoGraph {
    pub(crate) nodes: Slots<Node>,
    pub(crate) lines: Slots<Line>,
    pub(crate) areas: Slots<Area>,
    pub(crate) isles: Slots<Isle>,
    pub(crate) with_z: bool,
    /// Extent of every line ever registered since the last rebuild.
    pub(crate) bbox: Option<BoundBox>,
    /// Size of the coordinate store the offsets refer to.
    pub(crate) coor_size: u64,
    pub(crate) built: BuildLevel,
    pub(crate) updates: UpdateLog,
}

impl TopoGraph {
    /// Creates an empty graph.
    pub fn new(with_z: bool) -> Self {
        Self {
            nodes: Slots::new(),
            lines: Slots::new(),
            areas: Slots::new(),
            isles: Slots::new(),
            with_z,
            bbox: None,
            coor_size: 0,
            built: BuildLevel::None,
            updates: UpdateLog::default(),
        }
    }

    /// Drops every record, keeping settings.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.lines.clear();
        self.areas.clear();
        self.isles.clear();
        self.bbox = None;
        self.coor_size = 0;
        self.built = BuildLevel::None;
        self.updates.reset();
    }

    pub fn with_z(&self) -> bool {
        self.with_z
    }

    pub fn built(&self) -> BuildLevel {
        self.built
    }

    pub fn bbox(&self) -> BoundBox {
        self.bbox.unwrap_or_default()
    }

    pub fn coor_size(&self) -> u64 {
        self.coor_size
    }

    pub fn updates(&self) -> &UpdateLog {
        &self.updates
    }

    // --- Record access ---

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn line(&self, id: LineId) -> Option<&Line> {
        self.lines.get(id.0)
    }

    pub fn area(&self, id: AreaId) -> Option<&Area> {
        self.areas.get(id.0)
    }

    pub fn isle(&self, id: IsleId) -> Option<&Isle> {
        self.isles.get(id.0)
    }

    pub(crate) fn node_or_err(&self, id: NodeId) -> Result<&Node> {
        self.node(id).ok_or(Error::missing(RecordKind::Node, id.0))
    }

    pub(crate) fn line_or_err(&self, id: LineId) -> Result<&Line> {
        self.line(id).ok_or(Error::missing(RecordKind::Line, id.0))
    }

    pub(crate) fn area_or_err(&self, id: AreaId) -> Result<&Area> {
        self.area(id).ok_or(Error::missing(RecordKind::Area, id.0))
    }

    pub(crate) fn isle_or_err(&self, id: IsleId) -> Result<&Isle> {
        self.isle(id).ok_or(Error::missing(RecordKind::Isle, id.0))
    }

    pub(crate) fn line_mut(&mut self, id: LineId) -> Result<&mut Line> {
        self.lines
            .get_mut(id.0)
            .ok_or(Error::missing(RecordKind::Line, id.0))
    }

    pub(crate) fn area_mut(&mut self, id: AreaId) -> Result<&mut Area> {
        self.areas
            .get_mut(id.0)
            .ok_or(Error::missing(RecordKind::Area, id.0))
    }

    pub(crate) fn isle_mut(&mut self, id: IsleId) -> Result<&mut Isle> {
        self.isles
            .get_mut(id.0)
            .ok_or(Error::missing(RecordKind::Isle, id.0))
    }

    /// Node a directed line leaves from: the start node for forward
    /// references, the end node for backward ones.
    pub fn pivot_node(&self, line: LineRef) -> Option<NodeId> {
        let (n1, n2) = self.line(line.line())?.nodes()?;
        Some(if line.is_forward() { n1 } else { n2 })
    }

    /// Face on one side of a boundary.
    pub fn line_face(&self, line: LineId, side: Side) -> Result<Face> {
        self.line_or_err(line)?
            .face(side)
            .ok_or(Error::NotBoundary(line))
    }

    pub(crate) fn set_line_face(&mut self, line: LineId, side: Side, face: Face) -> Result<()> {
        let slot = self.line_mut(line)?.face_mut(side).ok_or(Error::NotBoundary(line))?;
        *slot = face;
        self.updates.line(line);
        Ok(())
    }

    pub(crate) fn set_centroid_area(&mut self, line: LineId, link: CentroidArea) -> Result<()> {
        match &mut self.line_mut(line)?.topo {
            LineTopo::Centroid { area } => {
                *area = link;
                Ok(())
            }
            _ => Err(Error::Consistency(format!("line {line} is not a centroid"))),
        }
    }

    // --- Counts ---

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.alive()
    }

    /// Number of live lines of any type.
    pub fn line_count(&self) -> usize {
        self.lines.alive()
    }

    pub fn area_count(&self) -> usize {
        self.areas.alive()
    }

    pub fn isle_count(&self) -> usize {
        self.isles.alive()
    }

    /// Number of live lines of the given type.
    pub fn count_type(&self, ftype: FeatureType) -> usize {
        self.lines
            .iter()
            .filter(|(_, l)| l.feature_type() == ftype)
            .count()
    }

    // --- Iteration ---

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(id, n)| (NodeId(id), n))
    }

    pub fn lines(&self) -> impl Iterator<Item = (LineId, &Line)> {
        self.lines.iter().map(|(id, l)| (LineId(id), l))
    }

    pub fn areas(&self) -> impl Iterator<Item = (AreaId, &Area)> {
        self.areas.iter().map(|(id, a)| (AreaId(id), a))
    }

    pub fn isles(&self) -> impl Iterator<Item = (IsleId, &Isle)> {
        self.isles.iter().map(|(id, i)| (IsleId(id), i))
    }
}

impl Default for TopoGraph {
    fn default() -> Self {
        Self::new(false)
    }
}

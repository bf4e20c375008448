// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Spatial index for nodes, lines, areas and isles.
//!
//! The topology engine only talks to the [`SpatialIndex`] trait: it reports
//! every record it creates or deletes together with its box, and asks for
//! candidates by box. [`BoxIndex`] is a straightforward in-memory
//! implementation; nodes go through a [`NodeGrid`] hash so that exact
//! endpoint matching stays O(1) on average.

use nalgebra::Point3;
use rustc_hash::FxHashMap;

use crate::geometry::BoundBox;
use crate::keys::{AreaId, FeatureType, IsleId, LineId, NodeId, TypeMask};

/// Box index collaborator used by the topology builder.
pub trait SpatialIndex {
    fn add_node(&mut self, id: NodeId, position: &Point3<f64>);
    fn del_node(&mut self, id: NodeId);
    /// Node located exactly at `position`, if any.
    fn find_node(&self, position: &Point3<f64>) -> Option<NodeId>;

    fn add_line(&mut self, id: LineId, ftype: FeatureType, bbox: &BoundBox);
    fn del_line(&mut self, id: LineId);
    /// Lines of the given types whose box overlaps `bbox`, ascending by id.
    fn select_lines(&self, bbox: &BoundBox, mask: TypeMask) -> Vec<LineId>;

    fn add_area(&mut self, id: AreaId, bbox: &BoundBox);
    fn del_area(&mut self, id: AreaId);
    /// Areas whose box overlaps `bbox`, ascending by id.
    fn select_areas(&self, bbox: &BoundBox) -> Vec<AreaId>;

    fn add_isle(&mut self, id: IsleId, bbox: &BoundBox);
    fn del_isle(&mut self, id: IsleId);
    /// Isles whose box overlaps `bbox`, ascending by id.
    fn select_isles(&self, bbox: &BoundBox) -> Vec<IsleId>;

    /// Drops every entry.
    fn clear(&mut self);
}

/// A spatial hash grid for exact node lookup.
///
/// The grid divides space into square cells of side `cell_size`; a lookup
/// only inspects the cell the query point falls in. With `with_z` unset the
/// z coordinate is ignored, so 2D maps match endpoints on x and y only.
#[derive(Debug, Clone)]
pub struct NodeGrid {
    cell_size: f64,
    with_z: bool,
    grid: FxHashMap<(i64, i64), Vec<(NodeId, Point3<f64>)>>,
    cells: FxHashMap<NodeId, (i64, i64)>,
}

impl NodeGrid {
    /// Creates an empty grid. Non-positive cell sizes fall back to 1.
    pub fn new(cell_size: f64, with_z: bool) -> Self {
        let cell_size = if cell_size > 0.0 && cell_size.is_finite() {
            cell_size
        } else {
            1.0
        };
        Self {
            cell_size,
            with_z,
            grid: FxHashMap::default(),
            cells: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, id: NodeId, position: &Point3<f64>) {
        let cell = self.cell_coords(position);
        self.grid.entry(cell).or_default().push((id, *position));
        self.cells.insert(id, cell);
    }

    pub fn remove(&mut self, id: NodeId) {
        let Some(cell) = self.cells.remove(&id) else {
            return;
        };
        if let Some(bucket) = self.grid.get_mut(&cell) {
            bucket.retain(|(n, _)| *n != id);
            if bucket.is_empty() {
                self.grid.remove(&cell);
            }
        }
    }

    /// Finds the node stored exactly at `position`.
    pub fn find(&self, position: &Point3<f64>) -> Option<NodeId> {
        let bucket = self.grid.get(&self.cell_coords(position))?;
        bucket
            .iter()
            .find(|(_, p)| p.x == position.x && p.y == position.y && (!self.with_z || p.z == position.z))
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.grid.clear();
        self.cells.clear();
    }

    fn cell_coords(&self, p: &Point3<f64>) -> (i64, i64) {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
        )
    }
}

/// In-memory [`SpatialIndex`] keeping one box per record.
#[derive(Debug, Clone)]
pub struct BoxIndex {
    nodes: NodeGrid,
    lines: FxHashMap<LineId, (FeatureType, BoundBox)>,
    areas: FxHashMap<AreaId, BoundBox>,
    isles: FxHashMap<IsleId, BoundBox>,
}

impl BoxIndex {
    pub fn new(node_cell_size: f64, with_z: bool) -> Self {
        Self {
            nodes: NodeGrid::new(node_cell_size, with_z),
            lines: FxHashMap::default(),
            areas: FxHashMap::default(),
            isles: FxHashMap::default(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    pub fn isle_count(&self) -> usize {
        self.isles.len()
    }
}

fn select_sorted<K: Copy + Ord>(entries: impl Iterator<Item = K>) -> Vec<K> {
    let mut ids: Vec<K> = entries.collect();
    ids.sort_unstable();
    ids
}

impl SpatialIndex for BoxIndex {
    fn add_node(&mut self, id: NodeId, position: &Point3<f64>) {
        self.nodes.insert(id, position);
    }

    fn del_node(&mut self, id: NodeId) {
        self.nodes.remove(id);
    }

    fn find_node(&self, position: &Point3<f64>) -> Option<NodeId> {
        self.nodes.find(position)
    }

    fn add_line(&mut self, id: LineId, ftype: FeatureType, bbox: &BoundBox) {
        self.lines.insert(id, (ftype, *bbox));
    }

    fn del_line(&mut self, id: LineId) {
        self.lines.remove(&id);
    }

    fn select_lines(&self, bbox: &BoundBox, mask: TypeMask) -> Vec<LineId> {
        select_sorted(
            self.lines
                .iter()
                .filter(|(_, (t, b))| mask.contains(*t) && b.overlaps(bbox))
                .map(|(id, _)| *id),
        )
    }

    fn add_area(&mut self, id: AreaId, bbox: &BoundBox) {
        self.areas.insert(id, *bbox);
    }

    fn del_area(&mut self, id: AreaId) {
        self.areas.remove(&id);
    }

    fn select_areas(&self, bbox: &BoundBox) -> Vec<AreaId> {
        select_sorted(
            self.areas
                .iter()
                .filter(|(_, b)| b.overlaps(bbox))
                .map(|(id, _)| *id),
        )
    }

    fn add_isle(&mut self, id: IsleId, bbox: &BoundBox) {
        self.isles.insert(id, *bbox);
    }

    fn del_isle(&mut self, id: IsleId) {
        self.isles.remove(&id);
    }

    fn select_isles(&self, bbox: &BoundBox) -> Vec<IsleId> {
        select_sorted(
            self.isles
                .iter()
                .filter(|(_, b)| b.overlaps(bbox))
                .map(|(id, _)| *id),
        )
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.lines.clear();
        self.areas.clear();
        self.isles.clear();
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topology query methods and the consistency checker.

use rustc_hash::FxHashSet;

use crate::arena::{LineTopo, NodeLink, TopoGraph};
use crate::error::{Error, Result};
use crate::keys::*;

impl TopoGraph {
    pub fn line_type(&self, line: LineId) -> Option<FeatureType> {
        self.line(line).map(|l| l.feature_type())
    }

    pub fn line_nodes(&self, line: LineId) -> Option<(NodeId, NodeId)> {
        self.line(line)?.nodes()
    }

    /// Raw faces on the left and right side of a boundary.
    pub fn line_faces(&self, line: LineId) -> Option<(Face, Face)> {
        let l = self.line(line)?;
        Some((l.face(Side::Left)?, l.face(Side::Right)?))
    }

    /// Areas on the left and right side of a boundary. An isle side
    /// resolves to the area the isle is nested in.
    pub fn line_areas(&self, line: LineId) -> Option<(Option<AreaId>, Option<AreaId>)> {
        let (left, right) = self.line_faces(line)?;
        Some((self.face_area(left), self.face_area(right)))
    }

    fn face_area(&self, face: Face) -> Option<AreaId> {
        match face {
            Face::Area(area) => Some(area),
            Face::Isle(isle) => self.isle(isle)?.area,
            Face::None => None,
        }
    }

    pub fn centroid_area(&self, line: LineId) -> Option<CentroidArea> {
        self.line(line)?.centroid_area()
    }

    pub fn node_links(&self, node: NodeId) -> &[NodeLink] {
        self.node(node).map_or(&[], |n| &n.links)
    }

    pub fn area_boundaries(&self, area: AreaId) -> Option<&[LineRef]> {
        self.area(area).map(|a| a.lines.as_slice())
    }

    pub fn area_isles(&self, area: AreaId) -> Option<&[IsleId]> {
        self.area(area).map(|a| a.isles.as_slice())
    }

    pub fn area_centroid(&self, area: AreaId) -> Option<LineId> {
        self.area(area)?.centroid
    }

    pub fn isle_boundaries(&self, isle: IsleId) -> Option<&[LineRef]> {
        self.isle(isle).map(|i| i.lines.as_slice())
    }

    pub fn isle_area(&self, isle: IsleId) -> Option<AreaId> {
        self.isle(isle)?.area
    }

    /// Areas sharing a boundary with `area`, across both its outer ring and
    /// its isles, ascending.
    pub fn area_neighbors(&self, area: AreaId) -> Vec<AreaId> {
        let Some(record) = self.area(area) else {
            return Vec::new();
        };
        let rings = std::iter::once(record.lines.as_slice()).chain(
            record
                .isles
                .iter()
                .filter_map(|i| self.isle(*i).map(|isle| isle.lines.as_slice())),
        );

        let mut neighbors = FxHashSet::default();
        for ring in rings {
            for r in ring {
                if let Some((left, right)) = self.line_areas(r.line()) {
                    neighbors.extend([left, right].into_iter().flatten());
                }
            }
        }
        neighbors.remove(&area);
        let mut neighbors: Vec<AreaId> = neighbors.into_iter().collect();
        neighbors.sort_unstable();
        neighbors
    }

    /// Boundaries with no area or isle on at least one side.
    pub fn open_boundaries(&self) -> Vec<LineId> {
        self.lines()
            .filter(|(_, l)| match l.topo {
                LineTopo::Boundary { left, right, .. } => left.is_none() || right.is_none(),
                _ => false,
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Verifies that every cross reference in the graph is mirrored.
    ///
    /// Checks link ordering at nodes, line/node agreement, boundary side
    /// slots against area and isle rings, isle nesting and centroid
    /// registration. Returns the first violation found.
    pub fn check_consistency(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(Error::Consistency(msg)) };

        for (id, node) in self.nodes() {
            if node.links.is_empty() {
                return fail(format!("node {id} has no links"));
            }
            if node.links.windows(2).any(|w| w[0].angle > w[1].angle) {
                return fail(format!("links of node {id} are not sorted by angle"));
            }
            for link in &node.links {
                if self.pivot_node(link.line) != Some(id) {
                    return fail(format!("node {id} lists {} which does not end there", link.line));
                }
            }
        }

        for (id, line) in self.lines() {
            if let Some((n1, n2)) = line.nodes() {
                for (node, end) in [(n1, LineRef::forward(id)), (n2, LineRef::backward(id))] {
                    let registered = self
                        .node(node)
                        .is_some_and(|n| n.links.iter().any(|l| l.line == end));
                    if !registered {
                        return fail(format!("line end {end} is not registered at node {node}"));
                    }
                }
            }
            for side in [Side::Left, Side::Right] {
                let Some(face) = line.face(side) else {
                    break;
                };
                let r = match side {
                    Side::Left => LineRef::backward(id),
                    Side::Right => LineRef::forward(id),
                };
                let ring = match face {
                    Face::Area(a) => self.area_boundaries(a),
                    Face::Isle(i) => self.isle_boundaries(i),
                    Face::None => continue,
                };
                if !ring.is_some_and(|ring| ring.contains(&r)) {
                    return fail(format!("{side} side of line {id} names a face whose ring lacks {r}"));
                }
            }
            if let Some(CentroidArea::Inside(a)) = line.centroid_area() {
                if self.area_centroid(a) != Some(id) {
                    return fail(format!("centroid {id} is not registered in area {a}"));
                }
            }
        }

        for (id, area) in self.areas() {
            if area.lines.is_empty() {
                return fail(format!("area {id} has an empty ring"));
            }
            for r in &area.lines {
                let side = if r.is_forward() { Side::Right } else { Side::Left };
                if self.line(r.line()).and_then(|l| l.face(side)) != Some(Face::Area(id)) {
                    return fail(format!("{side} side of line {} does not name area {id}", r.line()));
                }
            }
            for isle in &area.isles {
                if self.isle_area(*isle) != Some(id) {
                    return fail(format!("isle {isle} listed in area {id} is not nested there"));
                }
            }
            if let Some(c) = area.centroid {
                if self.centroid_area(c) != Some(CentroidArea::Inside(id)) {
                    return fail(format!("centroid {c} of area {id} does not point back"));
                }
            }
        }

        for (id, isle) in self.isles() {
            if isle.lines.is_empty() {
                return fail(format!("isle {id} has an empty ring"));
            }
            for r in &isle.lines {
                let side = if r.is_forward() { Side::Right } else { Side::Left };
                if self.line(r.line()).and_then(|l| l.face(side)) != Some(Face::Isle(id)) {
                    return fail(format!("{side} side of line {} does not name isle {id}", r.line()));
                }
            }
            if let Some(a) = isle.area {
                if !self.area_isles(a).is_some_and(|isles| isles.contains(&id)) {
                    return fail(format!("isle {id} is not listed in its area {a}"));
                }
            }
        }
        Ok(())
    }
}

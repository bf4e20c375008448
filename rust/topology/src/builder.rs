// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ring tracing and area/isle bookkeeping.
//!
//! A ring is traced from one side of a boundary by repeatedly taking the
//! next boundary to the right at each node. The graph only decides whether a
//! closed ring exists; whether it becomes an area or an isle depends on its
//! orientation, which needs coordinates and is decided by the map session.

use rustc_hash::FxHashSet;

use crate::adjacency::DEGENERATE_ANGLE;
use crate::arena::{Area, Isle, LineTopo, TopoGraph};
use crate::error::{Error, Result};
use crate::geometry::BoundBox;
use crate::keys::*;
use crate::spatial::SpatialIndex;

/// Reusable buffers for ring tracing, owned by the map session.
#[derive(Debug, Default)]
pub struct RingScratch {
    ring: Vec<LineRef>,
    seen: FxHashSet<LineId>,
}

impl RingScratch {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Result of tracing a ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingOutcome {
    /// A closed ring, starting with the traced line.
    Ring(Vec<LineRef>),
    /// The walk hit a dead end or came back to a line already used.
    NoRing,
    /// Two boundaries leave a node at the same angle; the ring is not
    /// uniquely defined.
    Ambiguous,
}

impl TopoGraph {
    /// Traces the ring on `side` of boundary `first`.
    ///
    /// Starting with `first` (reversed for the left side), the walk follows
    /// [`next_line`](TopoGraph::next_line) to the right at each node until it
    /// returns to the start. The first line must be a live boundary.
    pub fn build_ring(
        &self,
        scratch: &mut RingScratch,
        first: LineId,
        side: Side,
    ) -> Result<RingOutcome> {
        let line = self.line_or_err(first)?;
        let LineTopo::Boundary { n1, .. } = line.topo else {
            return Err(Error::NotBoundary(first));
        };

        // Degenerate lines start and end on the same node, so one end is
        // enough to tell.
        let start = LineRef::forward(first);
        if self.node_or_err(n1)?.link_angle(start) == DEGENERATE_ANGLE {
            return Ok(RingOutcome::NoRing);
        }

        let first_ref = match side {
            Side::Left => start.reversed(),
            Side::Right => start,
        };

        scratch.ring.clear();
        scratch.seen.clear();
        scratch.ring.push(first_ref);
        scratch.seen.insert(first);

        let mut prev = first_ref.reversed();
        loop {
            let next = self
                .next_line(prev, Side::Right, TypeMask::BOUNDARY)
                .ok_or_else(|| {
                    Error::Consistency(format!("line end {prev} is missing from its node"))
                })?;

            if !self.angle_tie_check(next, TypeMask::BOUNDARY) {
                tracing::debug!(line = %first, side = %side, at = %next, "ambiguous ring");
                return Ok(RingOutcome::Ambiguous);
            }
            if next == first_ref {
                return Ok(RingOutcome::Ring(scratch.ring.clone()));
            }
            if next == prev {
                tracing::trace!(line = %first, side = %side, "dead end");
                return Ok(RingOutcome::NoRing);
            }
            if !scratch.seen.insert(next.line()) {
                tracing::trace!(line = %first, side = %side, repeated = %next, "line repeated");
                return Ok(RingOutcome::NoRing);
            }
            scratch.ring.push(next);
            prev = next.reversed();
        }
    }

    /// Checks that every ring entry's slot is free.
    fn check_free_slots(&self, ring: &[LineRef]) -> Result<()> {
        for r in ring {
            let side = ring_side(*r);
            let existing = self.line_face(r.line(), side)?;
            if !existing.is_none() {
                return Err(Error::SlotOccupied {
                    line: r.line(),
                    side,
                    existing,
                });
            }
        }
        Ok(())
    }

    /// Registers a clockwise ring as a new area.
    pub fn commit_area(
        &mut self,
        index: &mut dyn SpatialIndex,
        ring: Vec<LineRef>,
        bbox: BoundBox,
    ) -> Result<AreaId> {
        self.check_free_slots(&ring)?;
        let id = AreaId(self.areas.next_id());
        for r in &ring {
            self.set_line_face(r.line(), ring_side(*r), Face::Area(id))?;
        }
        let pushed = AreaId(self.areas.push(Area {
            lines: ring,
            isles: Vec::new(),
            centroid: None,
            bbox,
        }));
        debug_assert_eq!(pushed, id);
        index.add_area(id, &bbox);
        tracing::debug!(area = %id, "area created");
        Ok(id)
    }

    /// Registers a counter-clockwise ring as a new, unattached isle.
    pub fn commit_isle(
        &mut self,
        index: &mut dyn SpatialIndex,
        ring: Vec<LineRef>,
        bbox: BoundBox,
    ) -> Result<IsleId> {
        self.check_free_slots(&ring)?;
        let id = IsleId(self.isles.next_id());
        for r in &ring {
            self.set_line_face(r.line(), ring_side(*r), Face::Isle(id))?;
        }
        let pushed = IsleId(self.isles.push(Isle {
            lines: ring,
            area: None,
            bbox,
        }));
        debug_assert_eq!(pushed, id);
        index.add_isle(id, &bbox);
        tracing::debug!(isle = %id, "isle created");
        Ok(id)
    }

    /// Deletes an area: frees its boundary slots, detaches its nested isles
    /// and its centroid, and tombstones it.
    pub fn teardown_area(&mut self, index: &mut dyn SpatialIndex, id: AreaId) -> Result<Area> {
        let area = self
            .areas
            .kill(id.0)
            .ok_or(Error::missing(RecordKind::Area, id.0))?;
        index.del_area(id);

        for r in &area.lines {
            self.set_line_face(r.line(), ring_side(*r), Face::None)?;
        }

        if let Some(centroid) = area.centroid {
            match self.line(centroid).and_then(|l| l.centroid_area()) {
                Some(_) => self.set_centroid_area(centroid, CentroidArea::Outside)?,
                None => tracing::warn!(area = %id, line = %centroid, "area references a dead centroid"),
            }
        }

        for isle in &area.isles {
            self.isle_mut(*isle)
                .map_err(|_| {
                    Error::Consistency(format!("area {id} lists dead isle {isle}"))
                })?
                .area = None;
        }

        tracing::debug!(area = %id, "area deleted");
        Ok(area)
    }

    /// Deletes an isle: frees its boundary slots, removes it from its
    /// enclosing area and tombstones it.
    pub fn teardown_isle(&mut self, index: &mut dyn SpatialIndex, id: IsleId) -> Result<Isle> {
        let isle = self
            .isles
            .kill(id.0)
            .ok_or(Error::missing(RecordKind::Isle, id.0))?;
        index.del_isle(id);

        for r in &isle.lines {
            self.set_line_face(r.line(), ring_side(*r), Face::None)?;
        }
        if let Some(area) = isle.area {
            self.area_del_isle(area, id)?;
        }

        tracing::debug!(isle = %id, "isle deleted");
        Ok(isle)
    }

    /// Registers `isle` as nested directly inside `area`.
    pub(crate) fn area_add_isle(&mut self, area: AreaId, isle: IsleId) -> Result<()> {
        let record = self.area_mut(area)?;
        if record.isles.contains(&isle) {
            tracing::warn!(area = %area, isle = %isle, "isle already registered in area");
            return Ok(());
        }
        record.isles.push(isle);
        Ok(())
    }

    pub(crate) fn area_del_isle(&mut self, area: AreaId, isle: IsleId) -> Result<()> {
        let record = self.area_mut(area).map_err(|_| {
            Error::Consistency(format!("isle {isle} is attached to dead area {area}"))
        })?;
        match record.isles.iter().position(|i| *i == isle) {
            Some(pos) => {
                record.isles.remove(pos);
                Ok(())
            }
            None => Err(Error::Consistency(format!(
                "isle {isle} is not registered in area {area}"
            ))),
        }
    }
}

/// Boundary side a ring entry occupies: backward entries are on the left,
/// forward entries on the right.
pub fn ring_side(r: LineRef) -> Side {
    if r.is_forward() {
        Side::Right
    } else {
        Side::Left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::BoxIndex;
    use nalgebra::Point3;

    fn pts(coords: &[(f64, f64)]) -> Vec<Point3<f64>> {
        coords.iter().map(|&(x, y)| Point3::new(x, y, 0.0)).collect()
    }

    fn graph_with(lines: &[&[(f64, f64)]]) -> (TopoGraph, BoxIndex) {
        let mut graph = TopoGraph::new(false);
        let mut index = BoxIndex::new(1.0, false);
        for l in lines {
            graph
                .add_line(&mut index, FeatureType::Boundary, &pts(l), 0)
                .unwrap();
        }
        (graph, index)
    }

    fn refs(raw: &[i32]) -> Vec<LineRef> {
        raw.iter().filter_map(|r| LineRef::from_raw(*r)).collect()
    }

    const TRIANGLE: [&[(f64, f64)]; 3] = [
        &[(0.0, 0.0), (10.0, 0.0)],
        &[(10.0, 0.0), (5.0, 10.0)],
        &[(5.0, 10.0), (0.0, 0.0)],
    ];

    #[test]
    fn triangle_rings_on_both_sides() {
        let (graph, _) = graph_with(&TRIANGLE);
        let mut scratch = RingScratch::new();

        let left = graph.build_ring(&mut scratch, LineId(3), Side::Left).unwrap();
        assert_eq!(left, RingOutcome::Ring(refs(&[-3, -2, -1])));

        let right = graph.build_ring(&mut scratch, LineId(3), Side::Right).unwrap();
        assert_eq!(right, RingOutcome::Ring(refs(&[3, 1, 2])));
    }

    #[test]
    fn single_line_loop_closes_on_itself() {
        let (graph, _) = graph_with(&[&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 0.0)]]);
        let mut scratch = RingScratch::new();
        assert_eq!(
            graph.build_ring(&mut scratch, LineId(1), Side::Right).unwrap(),
            RingOutcome::Ring(refs(&[1]))
        );
        assert_eq!(
            graph.build_ring(&mut scratch, LineId(1), Side::Left).unwrap(),
            RingOutcome::Ring(refs(&[-1]))
        );
    }

    #[test]
    fn dangle_has_no_ring() {
        let (graph, _) = graph_with(&[&[(0.0, 0.0), (1.0, 1.0)]]);
        let mut scratch = RingScratch::new();
        for side in [Side::Left, Side::Right] {
            assert_eq!(
                graph.build_ring(&mut scratch, LineId(1), side).unwrap(),
                RingOutcome::NoRing
            );
        }
    }

    #[test]
    fn open_chain_has_no_ring() {
        let (graph, _) = graph_with(&TRIANGLE[..2]);
        let mut scratch = RingScratch::new();
        assert_eq!(
            graph.build_ring(&mut scratch, LineId(2), Side::Left).unwrap(),
            RingOutcome::NoRing
        );
    }

    #[test]
    fn degenerate_line_has_no_ring() {
        let (graph, _) = graph_with(&[&[(1.0, 1.0), (1.0, 1.0)]]);
        let mut scratch = RingScratch::new();
        assert_eq!(
            graph.build_ring(&mut scratch, LineId(1), Side::Right).unwrap(),
            RingOutcome::NoRing
        );
    }

    #[test]
    fn coincident_boundaries_are_ambiguous() {
        let (graph, _) = graph_with(&[&[(0.0, 0.0), (5.0, 0.0)], &[(0.0, 0.0), (5.0, 0.0)]]);
        let mut scratch = RingScratch::new();
        assert_eq!(
            graph.build_ring(&mut scratch, LineId(1), Side::Right).unwrap(),
            RingOutcome::Ambiguous
        );
        assert_eq!(
            graph.build_ring(&mut scratch, LineId(2), Side::Left).unwrap(),
            RingOutcome::Ambiguous
        );
    }

    #[test]
    fn non_boundary_is_rejected() {
        let mut graph = TopoGraph::new(false);
        let mut index = BoxIndex::new(1.0, false);
        graph
            .add_line(&mut index, FeatureType::Line, &pts(&[(0.0, 0.0), (1.0, 0.0)]), 0)
            .unwrap();
        let mut scratch = RingScratch::new();
        assert!(matches!(
            graph.build_ring(&mut scratch, LineId(1), Side::Left),
            Err(Error::NotBoundary(LineId(1)))
        ));
        assert!(matches!(
            graph.build_ring(&mut scratch, LineId(7), Side::Left),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn commit_and_teardown_area() {
        let (mut graph, mut index) = graph_with(&TRIANGLE);
        let ring = refs(&[-3, -2, -1]);
        let bbox = BoundBox::from_points(&pts(&[(0.0, 0.0), (10.0, 10.0)]));

        let area = graph.commit_area(&mut index, ring.clone(), bbox).unwrap();
        assert_eq!(area, AreaId(1));
        for l in 1..=3 {
            assert_eq!(graph.line_face(LineId(l), Side::Left).unwrap(), Face::Area(area));
            assert_eq!(graph.line_face(LineId(l), Side::Right).unwrap(), Face::None);
        }
        assert_eq!(index.area_count(), 1);

        // The same ring cannot be committed twice.
        let err = graph.commit_isle(&mut index, ring, bbox).unwrap_err();
        assert!(matches!(err, Error::SlotOccupied { side: Side::Left, .. }));
        assert_eq!(graph.isle_count(), 0);

        graph.teardown_area(&mut index, area).unwrap();
        assert!(graph.area(area).is_none());
        assert_eq!(graph.line_face(LineId(2), Side::Left).unwrap(), Face::None);
        assert_eq!(index.area_count(), 0);
        assert!(graph.teardown_area(&mut index, area).is_err());
    }

    #[test]
    fn isle_registration_follows_teardown() {
        let (mut graph, mut index) = graph_with(&TRIANGLE);
        let bbox = BoundBox::default();
        let area = graph.commit_area(&mut index, refs(&[-3, -2, -1]), bbox).unwrap();
        let isle = graph.commit_isle(&mut index, refs(&[3, 1, 2]), bbox).unwrap();

        graph.isle_mut(isle).unwrap().area = Some(area);
        graph.area_add_isle(area, isle).unwrap();
        graph.area_add_isle(area, isle).unwrap();
        assert_eq!(graph.area(area).unwrap().isles, vec![isle]);

        // Tearing down the area resets the isle to unattached.
        graph.teardown_area(&mut index, area).unwrap();
        assert_eq!(graph.isle(isle).unwrap().area, None);

        graph.teardown_isle(&mut index, isle).unwrap();
        assert_eq!(graph.line_face(LineId(1), Side::Right).unwrap(), Face::None);
        assert_eq!(index.isle_count(), 0);
    }

    #[test]
    fn isle_teardown_unregisters_from_area() {
        let (mut graph, mut index) = graph_with(&TRIANGLE);
        let bbox = BoundBox::default();
        let area = graph.commit_area(&mut index, refs(&[-3, -2, -1]), bbox).unwrap();
        let isle = graph.commit_isle(&mut index, refs(&[3, 1, 2]), bbox).unwrap();
        graph.isle_mut(isle).unwrap().area = Some(area);
        graph.area_add_isle(area, isle).unwrap();

        graph.teardown_isle(&mut index, isle).unwrap();
        assert!(graph.area(area).unwrap().isles.is_empty());
        assert!(graph.area_del_isle(area, isle).is_err());
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Incremental area/isle maintenance.
//!
//! Writing or deleting a boundary only invalidates the faces that touch it.
//! Those faces are torn down, the rings around the changed boundary and its
//! neighbors are traced again, and isles and centroids inside the union box
//! of everything torn down or created are re-attached. The rest of the map
//! is left alone.

use nalgebra::Point3;

use crate::arena::LineTopo;
use crate::builder::{ring_side, RingOutcome};
use crate::cidx::CatKind;
use crate::config::BuildLevel;
use crate::error::{Error, Result};
use crate::geometry::{extend_box, point_in_ring, ring_area_cw, BoundBox, Containment};
use crate::keys::*;
use crate::map::Map;
use crate::spatial::SpatialIndex;
use crate::store::{Cat, LineStore};

/// Result of building one side of a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideOutcome {
    Area(AreaId),
    Isle(IsleId),
    /// The side already references an area or isle.
    AlreadyBuilt,
    NoRing,
    Ambiguous,
    /// The ring encloses no area.
    ZeroSize,
}

/// Faces created and deleted by one mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    pub new_areas: Vec<AreaId>,
    pub new_isles: Vec<IsleId>,
    pub removed_areas: Vec<AreaId>,
    pub removed_isles: Vec<IsleId>,
    /// Boundary sides whose ring could not be built because of an angle tie.
    pub ambiguous: Vec<(LineId, Side)>,
    /// Attachment of a written centroid.
    pub centroid: Option<CentroidArea>,
}

impl UpdateReport {
    pub fn is_ambiguous(&self) -> bool {
        !self.ambiguous.is_empty()
    }

    pub(crate) fn merge(&mut self, other: UpdateReport) {
        self.new_areas.extend(other.new_areas);
        self.new_isles.extend(other.new_isles);
        self.removed_areas.extend(other.removed_areas);
        self.removed_isles.extend(other.removed_isles);
        self.ambiguous.extend(other.ambiguous);
        if other.centroid.is_some() {
            self.centroid = other.centroid;
        }
    }
}

impl<S: LineStore, I: SpatialIndex> Map<S, I> {
    /// Coordinates of a ring, closed, each line contributing all but its
    /// last point in traversal direction.
    pub(crate) fn ring_points(&self, ring: &[LineRef]) -> Result<Vec<Point3<f64>>> {
        let mut points = Vec::new();
        for r in ring {
            let record = self.read_line(r.line())?;
            let n = record.points.len();
            if r.is_forward() {
                points.extend_from_slice(&record.points[..n - 1]);
            } else {
                points.extend(record.points.iter().rev().take(n - 1).copied());
            }
        }
        if let Some(first) = points.first().copied() {
            points.push(first);
        }
        Ok(points)
    }

    /// Builds the area or isle on `side` of boundary `line`.
    ///
    /// Clockwise rings become areas, counter-clockwise rings isles. Sides
    /// that already reference a face are left alone.
    pub fn build_line_area(&mut self, line: LineId, side: Side) -> Result<SideOutcome> {
        if !self.graph.line_face(line, side)?.is_none() {
            return Ok(SideOutcome::AlreadyBuilt);
        }
        let ring = match self.graph.build_ring(&mut self.scratch, line, side)? {
            RingOutcome::Ring(ring) => ring,
            RingOutcome::NoRing => return Ok(SideOutcome::NoRing),
            RingOutcome::Ambiguous => return Ok(SideOutcome::Ambiguous),
        };

        let points = self.ring_points(&ring)?;
        let bbox = BoundBox::from_points(&points);
        let size = ring_area_cw(&points);
        if size > 0.0 {
            let area = self.graph.commit_area(&mut self.index, ring, bbox)?;
            Ok(SideOutcome::Area(area))
        } else if size < 0.0 {
            let isle = self.graph.commit_isle(&mut self.index, ring, bbox)?;
            Ok(SideOutcome::Isle(isle))
        } else {
            tracing::warn!(line = %line, side = %side, "area of size 0.0 ignored");
            Ok(SideOutcome::ZeroSize)
        }
    }

    fn build_side(
        &mut self,
        line: LineId,
        side: Side,
        report: &mut UpdateReport,
        abox: &mut Option<BoundBox>,
    ) -> Result<()> {
        match self.build_line_area(line, side)? {
            SideOutcome::Area(area) => {
                extend_box(abox, &self.graph.area_or_err(area)?.bbox);
                report.new_areas.push(area);
            }
            SideOutcome::Isle(isle) => {
                extend_box(abox, &self.graph.isle_or_err(isle)?.bbox);
                report.new_isles.push(isle);
            }
            SideOutcome::Ambiguous => report.ambiguous.push((line, side)),
            SideOutcome::AlreadyBuilt | SideOutcome::NoRing | SideOutcome::ZeroSize => {}
        }
        Ok(())
    }

    fn drop_face(
        &mut self,
        face: Face,
        report: &mut UpdateReport,
        abox: &mut Option<BoundBox>,
    ) -> Result<()> {
        match face {
            Face::Area(area) => {
                let (bbox, centroid) = {
                    let record = self.graph.area_or_err(area)?;
                    (record.bbox, record.centroid)
                };
                extend_box(abox, &bbox);
                if let Some(centroid) = centroid {
                    self.index_area_cats(area, centroid, false)?;
                }
                self.graph.teardown_area(&mut self.index, area)?;
                report.removed_areas.push(area);
            }
            Face::Isle(isle) => {
                self.graph.teardown_isle(&mut self.index, isle)?;
                report.removed_isles.push(isle);
            }
            Face::None => {}
        }
        Ok(())
    }

    /// Re-attaches isles and centroids in `bbox`, as far as the build level
    /// allows.
    fn reattach(&mut self, bbox: &BoundBox) -> Result<()> {
        if self.graph.built >= BuildLevel::AttachIsles {
            self.attach_isles(bbox)?;
        }
        if self.graph.built >= BuildLevel::Centroids {
            self.attach_centroids(bbox)?;
        }
        Ok(())
    }

    /// Updates topology after `line` has been registered.
    ///
    /// For a boundary, the faces it splits are torn down at each end node
    /// with more than two boundaries, both its sides and the torn-down
    /// neighbor sides are built, and isles and centroids around the change
    /// are re-attached. A centroid is attached to the area it falls in.
    pub fn on_boundary_added(&mut self, line: LineId) -> Result<UpdateReport> {
        let record = self.graph.line_or_err(line)?.clone();
        let cats = self.store.read(record.offset)?.cats;
        self.index_line_cats(line, record.feature_type(), &cats, true);

        let mut report = UpdateReport::default();
        match record.topo {
            LineTopo::Boundary { n1, n2, .. } if self.graph.built >= BuildLevel::Areas => {
                let mut abox: Option<BoundBox> = None;
                let mut torn: Vec<(LineId, Side)> = Vec::new();

                for (node, end) in [(n1, LineRef::forward(line)), (n2, LineRef::backward(line))] {
                    let boundaries = self
                        .graph
                        .node_or_err(node)?
                        .count_links(&self.graph, TypeMask::BOUNDARY);
                    if boundaries <= 2 {
                        continue;
                    }
                    let Some(next) = self.graph.next_line(end, Side::Right, TypeMask::BOUNDARY)
                    else {
                        continue;
                    };
                    let side = ring_side(next);
                    let face = self.graph.line_face(next.line(), side)?;
                    if !face.is_none() {
                        self.drop_face(face, &mut report, &mut abox)?;
                        torn.push((next.line(), side));
                    }
                }

                for side in [Side::Left, Side::Right] {
                    self.build_side(line, side, &mut report, &mut abox)?;
                }
                for (neighbor, side) in torn {
                    if self.graph.line(neighbor).is_some() {
                        self.build_side(neighbor, side, &mut report, &mut abox)?;
                    }
                }
                if let Some(bbox) = abox {
                    self.reattach(&bbox)?;
                }
            }
            LineTopo::Centroid { .. } if self.graph.built >= BuildLevel::Centroids => {
                report.centroid = Some(self.attach_centroid(line)?);
            }
            _ => {}
        }

        tracing::debug!(
            line = %line,
            new_areas = report.new_areas.len(),
            new_isles = report.new_isles.len(),
            removed_areas = report.removed_areas.len(),
            removed_isles = report.removed_isles.len(),
            "line added to topology"
        );
        Ok(report)
    }

    /// Removes `line` from the topology.
    ///
    /// For a boundary, the faces on both sides are torn down, the line is
    /// unregistered from its nodes, the rings of its up to four neighbors
    /// are traced again and isles and centroids around the change are
    /// re-attached. A centroid is detached from its area.
    pub fn on_boundary_removed(&mut self, line: LineId) -> Result<UpdateReport> {
        let record = self.graph.line_or_err(line)?.clone();
        let cats = self.store.read(record.offset)?.cats;
        self.index_line_cats(line, record.feature_type(), &cats, false);

        let mut report = UpdateReport::default();
        let mut abox: Option<BoundBox> = None;
        let mut adjacent: Vec<LineRef> = Vec::new();

        match record.topo {
            LineTopo::Boundary { left, right, .. } if self.graph.built >= BuildLevel::Areas => {
                for end in [LineRef::forward(line), LineRef::backward(line)] {
                    for side in [Side::Right, Side::Left] {
                        let Some(next) = self.graph.next_line(end, side, TypeMask::BOUNDARY)
                        else {
                            continue;
                        };
                        if next.line() == line {
                            continue;
                        }
                        adjacent.push(match side {
                            Side::Right => next,
                            Side::Left => next.reversed(),
                        });
                    }
                }
                self.drop_face(left, &mut report, &mut abox)?;
                self.drop_face(right, &mut report, &mut abox)?;
            }
            LineTopo::Centroid {
                area: CentroidArea::Inside(area),
            } if self.graph.built >= BuildLevel::Centroids => {
                self.index_area_cats(area, line, false)?;
                match self.graph.area_mut(area) {
                    Ok(a) if a.centroid == Some(line) => a.centroid = None,
                    _ => tracing::warn!(line = %line, area = %area, "centroid was not registered in its area"),
                }
            }
            _ => {}
        }

        self.graph.remove_line(&mut self.index, line)?;

        for adj in adjacent {
            if self.graph.line(adj.line()).is_some() {
                self.build_side(adj.line(), ring_side(adj), &mut report, &mut abox)?;
            }
        }
        if let Some(bbox) = abox {
            self.reattach(&bbox)?;
        }

        tracing::debug!(
            line = %line,
            new_areas = report.new_areas.len(),
            removed_areas = report.removed_areas.len(),
            "line removed from topology"
        );
        Ok(report)
    }

    /// Area that would enclose `isle`: among the areas whose box contains
    /// the isle's first node and the isle's box, and whose outer ring
    /// strictly contains that node, the smallest one.
    pub(crate) fn isle_find_area(&self, isle: IsleId) -> Result<Option<AreaId>> {
        let record = self.graph.isle_or_err(isle)?;
        let Some(first) = record.lines.first() else {
            return Ok(None);
        };
        let (n1, _) = self
            .graph
            .line_or_err(first.line())?
            .nodes()
            .ok_or(Error::NotBoundary(first.line()))?;
        let p = self.graph.node_or_err(n1)?.position;

        let mut best: Option<(AreaId, f64)> = None;
        for area in self.index.select_areas(&BoundBox::point(p.x, p.y)) {
            let candidate = self.graph.area_or_err(area)?;
            // The area on the other side of a single-boundary isle.
            if candidate.lines.first().map(|r| r.line()) == Some(first.line()) {
                continue;
            }
            if !candidate.bbox.contains_2d(&record.bbox) {
                continue;
            }
            let outer = self.ring_points(&candidate.lines)?;
            if point_in_ring(p.x, p.y, &outer) != Containment::Inside {
                continue;
            }
            let size = ring_area_cw(&outer);
            if best.map_or(true, |(_, s)| size < s) {
                best = Some((area, size));
            }
        }
        Ok(best.map(|(area, _)| area))
    }

    /// Attaches an unattached isle to its enclosing area, if any.
    pub fn attach_isle(&mut self, isle: IsleId) -> Result<Option<AreaId>> {
        if let Some(existing) = self.graph.isle_or_err(isle)?.area {
            tracing::debug!(isle = %isle, area = %existing, "isle already attached");
            return Ok(Some(existing));
        }
        let found = self.isle_find_area(isle)?;
        if let Some(area) = found {
            self.graph.isle_mut(isle)?.area = Some(area);
            self.graph.area_add_isle(area, isle)?;
        }
        Ok(found)
    }

    /// Detaches and re-attaches every isle whose box overlaps `bbox`.
    pub fn attach_isles(&mut self, bbox: &BoundBox) -> Result<()> {
        for isle in self.index.select_isles(bbox) {
            if let Some(area) = self.graph.isle_or_err(isle)?.area {
                self.graph.area_del_isle(area, isle)?;
                self.graph.isle_mut(isle)?.area = None;
            }
            self.attach_isle(isle)?;
        }
        Ok(())
    }

    /// Classifies `(x, y)` against an area: inside its outer ring and
    /// outside all of its isles. Points inside or on an isle are outside.
    pub fn point_in_area(&self, x: f64, y: f64, area: AreaId) -> Result<Containment> {
        let record = self.graph.area_or_err(area)?;
        if !record.bbox.contains_point(x, y) {
            return Ok(Containment::Outside);
        }
        let outer = self.ring_points(&record.lines)?;
        let position = point_in_ring(x, y, &outer);
        if position != Containment::Inside {
            return Ok(position);
        }
        for isle in &record.isles {
            let ring = self.ring_points(&self.graph.isle_or_err(*isle)?.lines)?;
            if point_in_ring(x, y, &ring) != Containment::Outside {
                return Ok(Containment::Outside);
            }
        }
        Ok(Containment::Inside)
    }

    /// First area, by id, containing `(x, y)`.
    pub fn find_area(&self, x: f64, y: f64) -> Result<Option<AreaId>> {
        for area in self.index.select_areas(&BoundBox::point(x, y)) {
            if self.point_in_area(x, y, area)? != Containment::Outside {
                return Ok(Some(area));
            }
        }
        Ok(None)
    }

    /// Attaches a centroid to the area it falls in.
    ///
    /// The first centroid of an area becomes its registered centroid; later
    /// ones are recorded as duplicates of that area.
    pub fn attach_centroid(&mut self, line: LineId) -> Result<CentroidArea> {
        let current = self
            .graph
            .line_or_err(line)?
            .centroid_area()
            .ok_or_else(|| Error::Consistency(format!("line {line} is not a centroid")))?;
        if let CentroidArea::Inside(area) = current {
            if self.graph.area(area).is_some_and(|a| a.centroid == Some(line)) {
                self.index_area_cats(area, line, false)?;
                self.graph.area_mut(area)?.centroid = None;
            }
        }

        let record = self.read_line(line)?;
        let p = record.points[0];
        let link = match self.find_area(p.x, p.y)? {
            Some(area) if self.graph.area_or_err(area)?.centroid.is_none() => {
                self.graph.area_mut(area)?.centroid = Some(line);
                self.add_cats(&record.cats, area.0, CatKind::Area);
                CentroidArea::Inside(area)
            }
            Some(area) => {
                tracing::debug!(line = %line, area = %area, "duplicate centroid");
                CentroidArea::Duplicate(area)
            }
            None => CentroidArea::Outside,
        };
        self.graph.set_centroid_area(line, link)?;
        Ok(link)
    }

    /// Attaches every centroid in `bbox` that is not the registered
    /// centroid of a live area still containing it.
    ///
    /// A registered centroid that an isle has opened beneath is moved to the
    /// area it now falls in.
    pub fn attach_centroids(&mut self, bbox: &BoundBox) -> Result<()> {
        for line in self.index.select_lines(bbox, TypeMask::CENTROID) {
            let Some(link) = self.graph.line(line).and_then(|l| l.centroid_area()) else {
                continue;
            };
            if let CentroidArea::Inside(area) = link {
                if self.graph.area(area).is_some_and(|a| a.centroid == Some(line)) {
                    let p = self.read_line(line)?.points[0];
                    if self.point_in_area(p.x, p.y, area)? != Containment::Outside {
                        continue;
                    }
                    tracing::debug!(line = %line, area = %area, "centroid left its area");
                }
            }
            self.attach_centroid(line)?;
        }
        Ok(())
    }

    /// Registered centroids whose point is not in their area, as
    /// `(area, centroid)` pairs.
    pub fn misplaced_centroids(&self) -> Result<Vec<(AreaId, LineId)>> {
        let mut misplaced = Vec::new();
        for (area, record) in self.graph.areas() {
            let Some(centroid) = record.centroid else {
                continue;
            };
            let p = self.read_line(centroid)?.points[0];
            if self.point_in_area(p.x, p.y, area)? == Containment::Outside {
                misplaced.push((area, centroid));
            }
        }
        Ok(misplaced)
    }

    /// Verifies the graph's cross references, then that every registered
    /// centroid lies in its area and outside the area's isles.
    pub fn check_consistency(&self) -> Result<()> {
        self.graph.check_consistency()?;
        match self.misplaced_centroids()?.first() {
            Some((area, centroid)) => Err(Error::Consistency(format!(
                "centroid {centroid} of area {area} does not lie in the area"
            ))),
            None => Ok(()),
        }
    }

    // --- Category index delegation ---

    fn add_cats(&mut self, cats: &[Cat], id: u32, kind: CatKind) {
        if let Some(cidx) = self.cidx.as_mut() {
            for c in cats {
                cidx.add_cat(c.field, c.cat, id, kind);
            }
        }
    }

    fn del_cats(&mut self, cats: &[Cat], id: u32, kind: CatKind) {
        if let Some(cidx) = self.cidx.as_mut() {
            for c in cats {
                cidx.del_cat(c.field, c.cat, id, kind);
            }
        }
    }

    pub(crate) fn index_line_cats(&mut self, line: LineId, ftype: FeatureType, cats: &[Cat], add: bool) {
        if add {
            self.add_cats(cats, line.0, CatKind::Feature(ftype));
        } else {
            self.del_cats(cats, line.0, CatKind::Feature(ftype));
        }
    }

    /// Adds or removes an area's categories, taken from `centroid`.
    pub(crate) fn index_area_cats(&mut self, area: AreaId, centroid: LineId, add: bool) -> Result<()> {
        if self.cidx.is_none() {
            return Ok(());
        }
        let cats = self.read_line(centroid)?.cats;
        if add {
            self.add_cats(&cats, area.0, CatKind::Area);
        } else {
            self.del_cats(&cats, area.0, CatKind::Area);
        }
        Ok(())
    }
}

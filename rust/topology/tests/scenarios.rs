// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end topology scenarios driven through the map session.

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_relative_eq;
use nalgebra::Point3;
use planar_topo::{
    AreaId, BuildLevel, ByteOrder, CatKind, CategoryIndex, CentroidArea, Config, CoorBuffer, Face,
    FeatureType, IsleId, LineId, LineRecord, LineRef, Map, MemoryCatIndex, NodeId, Side,
    UpdateReport,
};

const OUTER: [(f64, f64); 3] = [(0.0, 0.0), (100.0, 0.0), (50.0, 100.0)];
const INNER: [(f64, f64); 3] = [(40.0, 20.0), (60.0, 20.0), (50.0, 40.0)];
const TRIANGLE: [(f64, f64); 3] = [(0.0, 0.0), (10.0, 0.0), (5.0, 10.0)];

fn config(level: BuildLevel) -> Config {
    Config {
        build_level: level,
        with_z: false,
        byte_order: ByteOrder::Little,
        node_grid_cell: 1.0,
        track_updates: false,
    }
}

fn new_map() -> Map<CoorBuffer> {
    Map::new(CoorBuffer::new(ByteOrder::Little, false), config(BuildLevel::ALL))
}

fn boundary_record(coords: &[(f64, f64)]) -> LineRecord {
    LineRecord::new(
        FeatureType::Boundary,
        coords.iter().map(|&(x, y)| Point3::new(x, y, 0.0)).collect(),
    )
}

fn boundary(map: &mut Map<CoorBuffer>, coords: &[(f64, f64)]) -> (LineId, UpdateReport) {
    let update = map.write_line(&boundary_record(coords)).unwrap();
    map.check_consistency().unwrap();
    (update.line.unwrap(), update.report)
}

fn centroid(map: &mut Map<CoorBuffer>, x: f64, y: f64) -> (LineId, UpdateReport) {
    let record = LineRecord::new(FeatureType::Centroid, vec![Point3::new(x, y, 0.0)]);
    let update = map.write_line(&record).unwrap();
    map.check_consistency().unwrap();
    (update.line.unwrap(), update.report)
}

/// Writes the three sides of a closed triangle as separate boundaries.
fn closed_ring(map: &mut Map<CoorBuffer>, corners: &[(f64, f64); 3]) -> Vec<(LineId, UpdateReport)> {
    (0..3)
        .map(|i| boundary(map, &[corners[i], corners[(i + 1) % 3]]))
        .collect()
}

/// Ring as raw signed ids, renamed and rotated to start at its smallest
/// entry, so rings built from different starting lines compare equal.
fn canonical(ring: &[LineRef], rename: &dyn Fn(LineId) -> LineId) -> Vec<i32> {
    let mut raw: Vec<i32> = ring
        .iter()
        .map(|r| {
            let id = rename(r.line()).0 as i32;
            if r.is_forward() {
                id
            } else {
                -id
            }
        })
        .collect();
    if let Some(start) = (0..raw.len()).min_by_key(|&i| raw[i]) {
        raw.rotate_left(start);
    }
    raw
}

/// Area and isle contents, independent of their ids.
fn faces(map: &Map<CoorBuffer>, rename: &dyn Fn(LineId) -> LineId) -> Vec<(bool, Vec<i32>, usize, bool)> {
    let graph = map.graph();
    let mut faces: Vec<_> = graph
        .areas()
        .map(|(_, a)| (true, canonical(&a.lines, rename), a.isles.len(), a.centroid.is_some()))
        .chain(
            graph
                .isles()
                .map(|(_, i)| (false, canonical(&i.lines, rename), 0, i.area.is_some())),
        )
        .collect();
    faces.sort();
    faces
}

#[test]
fn triangle_builds_one_area() {
    let mut map = new_map();
    let written = closed_ring(&mut map, &TRIANGLE);
    let (a, b, c) = (written[0].0, written[1].0, written[2].0);

    // Only the closing boundary produces faces.
    assert!(written[0].1.new_areas.is_empty());
    assert!(written[1].1.new_areas.is_empty());
    let report = &written[2].1;
    assert_eq!(report.new_areas, vec![AreaId(1)]);
    assert_eq!(report.new_isles, vec![IsleId(1)]);
    assert!(!report.is_ambiguous());

    let graph = map.graph();
    assert_eq!(graph.area_count(), 1);
    let area = graph.area(AreaId(1)).unwrap();
    let expected = vec![LineRef::backward(c), LineRef::backward(b), LineRef::backward(a)];
    assert_eq!(area.lines, expected);
    assert!(area.isles.is_empty());
    assert_eq!(area.centroid, None);

    // The outer side of the loop is an isle nested in nothing.
    assert_eq!(graph.isle_count(), 1);
    assert_eq!(
        graph.isle_boundaries(IsleId(1)).unwrap(),
        &[LineRef::forward(c), LineRef::forward(a), LineRef::forward(b)]
    );
    assert_eq!(graph.isle_area(IsleId(1)), None);

    for line in [a, b, c] {
        assert_eq!(
            graph.line_faces(line),
            Some((Face::Area(AreaId(1)), Face::Isle(IsleId(1))))
        );
        assert_eq!(graph.line_areas(line), Some((Some(AreaId(1)), None)));
    }
    assert_relative_eq!(map.area_size(AreaId(1)).unwrap(), 50.0);
    assert!(graph.open_boundaries().is_empty());
}

#[test]
fn dangling_boundary_has_no_ring() {
    let mut map = new_map();
    let (line, report) = boundary(&mut map, &[(0.0, 0.0), (5.0, 5.0), (10.0, 0.0)]);
    assert_eq!(report, UpdateReport::default());
    assert_eq!(map.graph().line_faces(line), Some((Face::None, Face::None)));
    assert_eq!(map.graph().area_count(), 0);
    assert_eq!(map.graph().isle_count(), 0);
    assert_eq!(map.graph().open_boundaries(), vec![line]);
}

#[test]
fn dangle_on_a_ring_keeps_the_area() {
    let mut map = new_map();
    closed_ring(&mut map, &TRIANGLE);
    let (dangle, report) = boundary(&mut map, &[(10.0, 0.0), (20.0, 0.0)]);

    // The outer isle would have to pass along the dangle twice.
    assert_eq!(report.removed_isles, vec![IsleId(1)]);
    assert!(report.new_isles.is_empty());
    assert!(report.removed_areas.is_empty());
    assert_eq!(map.graph().area_count(), 1);
    assert_eq!(map.graph().isle_count(), 0);
    assert_eq!(map.graph().line_faces(dangle), Some((Face::None, Face::None)));

    // Removing the dangle brings the isle back.
    let report = map.delete_line(dangle).unwrap();
    map.check_consistency().unwrap();
    assert_eq!(report.new_isles.len(), 1);
    assert_eq!(map.graph().isle_count(), 1);
}

#[test]
fn donut_nests_the_inner_ring() {
    let mut map = new_map();
    closed_ring(&mut map, &OUTER);
    let inner = closed_ring(&mut map, &INNER);

    let graph = map.graph();
    assert_eq!(graph.area_count(), 2);
    assert_eq!(graph.isle_count(), 2);
    // Outer area 1 holds the inner ring's outer side; the hole is area 2.
    assert_eq!(graph.area_isles(AreaId(1)).unwrap(), &[IsleId(2)]);
    assert_eq!(graph.isle_area(IsleId(2)), Some(AreaId(1)));
    assert_eq!(graph.isle_area(IsleId(1)), None);
    assert!(graph.area_isles(AreaId(2)).unwrap().is_empty());
    assert_eq!(graph.line_areas(inner[0].0), Some((Some(AreaId(2)), Some(AreaId(1)))));
    assert_eq!(graph.area_neighbors(AreaId(1)), vec![AreaId(2)]);

    assert_relative_eq!(map.area_size(AreaId(1)).unwrap(), 4800.0);
    assert_relative_eq!(map.area_size(AreaId(2)).unwrap(), 200.0);
    assert_eq!(map.find_area(50.0, 5.0).unwrap(), Some(AreaId(1)));
    assert_eq!(map.find_area(50.0, 27.0).unwrap(), Some(AreaId(2)));
    assert_eq!(map.find_area(0.0, 90.0).unwrap(), None);

    let label = map.label_point(AreaId(1)).unwrap().unwrap();
    assert_eq!(map.find_area(label.x, label.y).unwrap(), Some(AreaId(1)));
}

#[test]
fn removing_the_inner_ring_restores_the_triangle() {
    let mut reference = new_map();
    closed_ring(&mut reference, &OUTER);

    let mut map = new_map();
    closed_ring(&mut map, &OUTER);
    let inner = closed_ring(&mut map, &INNER);
    for (line, _) in inner {
        map.delete_line(line).unwrap();
        map.check_consistency().unwrap();
    }

    let graph = map.graph();
    assert_eq!(graph.area_count(), 1);
    assert_eq!(graph.isle_count(), 1);
    assert_eq!(graph.area(AreaId(1)), reference.graph().area(AreaId(1)));
    assert_eq!(graph.isle(IsleId(1)), reference.graph().isle(IsleId(1)));
    for id in 1..=3 {
        assert_eq!(graph.node(NodeId(id)), reference.graph().node(NodeId(id)));
    }
    // The inner ring's nodes are gone.
    assert_eq!(graph.node_count(), 3);
}

#[test]
fn remove_then_readd_restores_faces() {
    let mut map = new_map();
    let written = closed_ring(&mut map, &TRIANGLE);
    let (c1, _) = centroid(&mut map, 5.0, 3.0);
    let b = written[1].0;
    let same = |id: LineId| id;
    let before = faces(&map, &same);

    let removed = map.delete_line(b).unwrap();
    map.check_consistency().unwrap();
    assert_eq!(removed.removed_areas, vec![AreaId(1)]);
    assert_eq!(removed.removed_isles, vec![IsleId(1)]);
    assert_eq!(map.graph().area_count(), 0);
    assert_eq!(map.graph().isle_count(), 0);
    assert_eq!(map.graph().centroid_area(c1), Some(CentroidArea::Outside));

    let (b2, added) = boundary(&mut map, &[TRIANGLE[1], TRIANGLE[2]]);
    assert_ne!(b2, b);
    assert_eq!(added.new_areas.len(), 1);
    let rename = move |id: LineId| if id == b2 { b } else { id };
    assert_eq!(faces(&map, &rename), before);
    assert_eq!(
        map.graph().centroid_area(c1),
        Some(CentroidArea::Inside(added.new_areas[0]))
    );
}

#[test]
fn coincident_boundaries_are_ambiguous() {
    let mut map = new_map();
    let (first, _) = boundary(&mut map, &[(0.0, 0.0), (10.0, 0.0)]);
    let (second, report) = boundary(&mut map, &[(0.0, 0.0), (10.0, 0.0)]);

    assert_eq!(report.ambiguous, vec![(second, Side::Left), (second, Side::Right)]);
    assert!(report.new_areas.is_empty());
    assert_eq!(map.graph().line_faces(first), Some((Face::None, Face::None)));
    assert!(!map.graph().angle_tie_check(LineRef::forward(first), planar_topo::TypeMask::BOUNDARY));

    let stats = map.build().unwrap();
    assert_eq!(stats.ambiguous, 4);
    assert_eq!(stats.areas, 0);
    map.check_consistency().unwrap();
}

#[test]
fn centroids_attach_once_per_area() {
    let mut map = new_map();
    closed_ring(&mut map, &TRIANGLE);

    let (first, report) = centroid(&mut map, 5.0, 3.0);
    assert_eq!(report.centroid, Some(CentroidArea::Inside(AreaId(1))));
    let (second, report) = centroid(&mut map, 4.0, 2.0);
    assert_eq!(report.centroid, Some(CentroidArea::Duplicate(AreaId(1))));
    let (outside, report) = centroid(&mut map, 50.0, 50.0);
    assert_eq!(report.centroid, Some(CentroidArea::Outside));
    assert_eq!(map.graph().area_centroid(AreaId(1)), Some(first));

    // A duplicate is not promoted when the registered centroid goes.
    map.delete_line(first).unwrap();
    map.check_consistency().unwrap();
    assert_eq!(map.graph().area_centroid(AreaId(1)), None);
    assert_eq!(
        map.graph().centroid_area(second),
        Some(CentroidArea::Duplicate(AreaId(1)))
    );
    assert_eq!(map.graph().centroid_area(outside), Some(CentroidArea::Outside));

    // A full build attaches the remaining inside centroid.
    map.build().unwrap();
    map.check_consistency().unwrap();
    let area = map.graph().areas().next().unwrap().0;
    let registered = map.graph().area_centroid(area).unwrap();
    assert_eq!(map.read_line(registered).unwrap().points[0], Point3::new(4.0, 2.0, 0.0));
}

#[test]
fn centroid_in_hole_belongs_to_hole_area() {
    let cidx = Rc::new(RefCell::new(MemoryCatIndex::new()));
    let mut map = new_map();
    map.set_category_index(Box::new(Shared(cidx.clone()))).unwrap();
    closed_ring(&mut map, &OUTER);

    let record = LineRecord::new(FeatureType::Centroid, vec![Point3::new(50.0, 27.0, 0.0)]).with_cat(1, 9);
    let early = map.write_line(&record).unwrap().line.unwrap();
    assert_eq!(map.graph().centroid_area(early), Some(CentroidArea::Inside(AreaId(1))));
    assert_eq!(cidx.borrow().find(1, 9, CatKind::Area), vec![1]);

    // The hole opens under the registered centroid and takes it over.
    let inner = closed_ring(&mut map, &INNER);
    assert_eq!(inner[2].1.new_areas, vec![AreaId(2)]);
    assert_eq!(map.graph().centroid_area(early), Some(CentroidArea::Inside(AreaId(2))));
    assert_eq!(map.graph().area_centroid(AreaId(2)), Some(early));
    assert_eq!(map.graph().area_centroid(AreaId(1)), None);
    assert_eq!(cidx.borrow().find(1, 9, CatKind::Area), vec![2]);
    assert!(map.misplaced_centroids().unwrap().is_empty());

    let (late, report) = centroid(&mut map, 45.0, 25.0);
    assert_eq!(report.centroid, Some(CentroidArea::Duplicate(AreaId(2))));
    let (outer_centroid, report) = centroid(&mut map, 50.0, 5.0);
    assert_eq!(report.centroid, Some(CentroidArea::Inside(AreaId(1))));

    // A full build attaches by position, in store order.
    map.build().unwrap();
    map.check_consistency().unwrap();
    let hole = map.find_area(50.0, 27.0).unwrap().unwrap();
    let outer = map.find_area(50.0, 5.0).unwrap().unwrap();
    assert_eq!(map.graph().centroid_area(early), Some(CentroidArea::Inside(hole)));
    assert_eq!(map.graph().centroid_area(late), Some(CentroidArea::Duplicate(hole)));
    assert_eq!(map.graph().area_centroid(outer), Some(outer_centroid));
}

#[test]
fn rewrite_rebuilds_touching_faces() {
    let mut map = new_map();
    let written = closed_ring(&mut map, &TRIANGLE);
    let (c1, _) = centroid(&mut map, 5.0, 3.0);
    let b = written[1].0;

    let bent = boundary_record(&[(10.0, 0.0), (8.0, 8.0), (5.0, 10.0)]);
    let update = map.rewrite_line(b, &bent).unwrap();
    map.check_consistency().unwrap();

    let b2 = update.line.unwrap();
    assert_ne!(b2, b);
    assert!(map.graph().line(b).is_none());
    assert_eq!(update.report.removed_areas, vec![AreaId(1)]);
    assert_eq!(update.report.new_areas.len(), 1);
    let area = update.report.new_areas[0];
    assert_eq!(map.graph().area_boundaries(area).unwrap().len(), 3);
    assert_eq!(map.graph().centroid_area(c1), Some(CentroidArea::Inside(area)));
    assert!(map.area_size(area).unwrap() > 50.0);
}

#[test]
fn build_level_limits_maintenance() {
    let mut map = Map::new(
        CoorBuffer::new(ByteOrder::Little, false),
        config(BuildLevel::Areas),
    );
    closed_ring(&mut map, &OUTER);
    closed_ring(&mut map, &INNER);
    let (c, report) = centroid(&mut map, 50.0, 5.0);

    assert_eq!(map.graph().area_count(), 2);
    assert_eq!(map.graph().isle_area(IsleId(2)), None);
    assert_eq!(report.centroid, None);
    assert_eq!(map.graph().centroid_area(c), Some(CentroidArea::Outside));

    map.build_partial(BuildLevel::ALL).unwrap();
    map.check_consistency().unwrap();
    assert_eq!(map.graph().isle_area(IsleId(2)), Some(AreaId(1)));
    assert_eq!(map.graph().centroid_area(c), Some(CentroidArea::Inside(AreaId(1))));
}

#[test]
fn full_build_matches_incremental() {
    let mut map = new_map();
    closed_ring(&mut map, &OUTER);
    closed_ring(&mut map, &INNER);
    centroid(&mut map, 50.0, 5.0);
    centroid(&mut map, 50.0, 27.0);
    let same = |id: LineId| id;
    let incremental = faces(&map, &same);

    let stats = map.build().unwrap();
    map.check_consistency().unwrap();
    assert_eq!(stats.areas, 2);
    assert_eq!(stats.isles, 2);
    assert_eq!(stats.lines, 8);
    assert_eq!(faces(&map, &same), incremental);
}

/// Category index shared with the test so its contents can be inspected.
struct Shared(Rc<RefCell<MemoryCatIndex>>);

impl CategoryIndex for Shared {
    fn add_cat(&mut self, field: i32, cat: i32, id: u32, kind: CatKind) {
        self.0.borrow_mut().add_cat(field, cat, id, kind);
    }

    fn del_cat(&mut self, field: i32, cat: i32, id: u32, kind: CatKind) {
        self.0.borrow_mut().del_cat(field, cat, id, kind);
    }

    fn clear(&mut self) {
        self.0.borrow_mut().clear();
    }
}

#[test]
fn area_categories_follow_the_centroid() {
    let cidx = Rc::new(RefCell::new(MemoryCatIndex::new()));
    let mut map = new_map();
    map.set_category_index(Box::new(Shared(cidx.clone()))).unwrap();

    let written = closed_ring(&mut map, &TRIANGLE);
    let record = LineRecord::new(FeatureType::Centroid, vec![Point3::new(5.0, 3.0, 0.0)]).with_cat(1, 7);
    let c = map.write_line(&record).unwrap().line.unwrap();

    let centroid_kind = CatKind::Feature(FeatureType::Centroid);
    assert_eq!(cidx.borrow().find(1, 7, centroid_kind), vec![c.0]);
    assert_eq!(cidx.borrow().find(1, 7, CatKind::Area), vec![1]);

    map.delete_line(written[0].0).unwrap();
    assert!(cidx.borrow().find(1, 7, CatKind::Area).is_empty());

    let (_, report) = boundary(&mut map, &[TRIANGLE[0], TRIANGLE[1]]);
    let area = report.new_areas[0];
    assert_eq!(cidx.borrow().find(1, 7, CatKind::Area), vec![area.0]);

    map.delete_line(c).unwrap();
    assert!(cidx.borrow().is_empty());
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar geometry helpers: bounding boxes, ring orientation, point-in-ring
//! classification and label points.
//!
//! Rings are closed coordinate sequences (first point repeated at the end).
//! Only x and y take part in the planar computations; z is carried along.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub top: f64,
    pub bottom: f64,
}

impl BoundBox {
    /// Box spanning the given points. An empty slice gives the zero box.
    pub fn from_points(points: &[Point3<f64>]) -> Self {
        let Some(first) = points.first() else {
            return BoundBox::default();
        };
        let mut bbox = BoundBox {
            north: first.y,
            south: first.y,
            east: first.x,
            west: first.x,
            top: first.z,
            bottom: first.z,
        };
        for p in &points[1..] {
            bbox.north = bbox.north.max(p.y);
            bbox.south = bbox.south.min(p.y);
            bbox.east = bbox.east.max(p.x);
            bbox.west = bbox.west.min(p.x);
            bbox.top = bbox.top.max(p.z);
            bbox.bottom = bbox.bottom.min(p.z);
        }
        bbox
    }

    /// Degenerate box at `(x, y)` covering every z.
    pub fn point(x: f64, y: f64) -> Self {
        BoundBox {
            north: y,
            south: y,
            east: x,
            west: x,
            top: f64::MAX,
            bottom: -f64::MAX,
        }
    }

    /// Grows `self` to cover `other`.
    pub fn extend(&mut self, other: &BoundBox) {
        self.north = self.north.max(other.north);
        self.south = self.south.min(other.south);
        self.east = self.east.max(other.east);
        self.west = self.west.min(other.west);
        self.top = self.top.max(other.top);
        self.bottom = self.bottom.min(other.bottom);
    }

    /// Boxes touching on an edge overlap.
    pub fn overlaps(&self, other: &BoundBox) -> bool {
        !(self.east < other.west
            || self.west > other.east
            || self.north < other.south
            || self.south > other.north
            || self.top < other.bottom
            || self.bottom > other.top)
    }

    /// Planar containment of `inner` (edges may coincide).
    pub fn contains_2d(&self, inner: &BoundBox) -> bool {
        inner.north <= self.north
            && inner.south >= self.south
            && inner.east <= self.east
            && inner.west >= self.west
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.west && x <= self.east && y >= self.south && y <= self.north
    }
}

/// Grows an optional accumulator box by `bbox`.
pub fn extend_box(acc: &mut Option<BoundBox>, bbox: &BoundBox) {
    match acc {
        Some(b) => b.extend(bbox),
        None => *acc = Some(*bbox),
    }
}

/// Signed area of a closed ring: positive for clockwise rings,
/// negative for counter-clockwise ones.
pub fn ring_area_cw(ring: &[Point3<f64>]) -> f64 {
    let total: f64 = ring
        .windows(2)
        .map(|w| (w[1].x - w[0].x) * (w[1].y + w[0].y))
        .sum();
    0.5 * total
}

/// Position of a point relative to a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    Outside,
    Inside,
    OnBoundary,
}

/// Classifies `(x, y)` against a closed ring by crossing count, with an
/// explicit test for points lying on a segment.
pub fn point_in_ring(x: f64, y: f64, ring: &[Point3<f64>]) -> Containment {
    let mut inside = false;
    for w in ring.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        if on_segment(x, y, a, b) {
            return Containment::OnBoundary;
        }
        if (a.y > y) != (b.y > y) {
            let xi = a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y);
            if x < xi {
                inside = !inside;
            }
        }
    }
    if inside {
        Containment::Inside
    } else {
        Containment::Outside
    }
}

fn on_segment(x: f64, y: f64, a: &Point3<f64>, b: &Point3<f64>) -> bool {
    if x < a.x.min(b.x) || x > a.x.max(b.x) || y < a.y.min(b.y) || y > a.y.max(b.y) {
        return false;
    }
    let cross = (b.x - a.x) * (y - a.y) - (b.y - a.y) * (x - a.x);
    let scale = (b.x - a.x).abs() + (b.y - a.y).abs();
    cross.abs() <= f64::EPSILON * 16.0 * scale.max(1.0)
}

/// Length of a polyline in the plane.
pub fn planar_length(points: &[Point3<f64>]) -> f64 {
    points
        .windows(2)
        .map(|w| ((w[1].x - w[0].x).powi(2) + (w[1].y - w[0].y).powi(2)).sqrt())
        .sum()
}

/// A point guaranteed to lie inside a polygon with holes: the centroid of
/// the largest triangle of its ear-clipping triangulation.
///
/// Returns `None` when the polygon cannot be triangulated.
pub fn label_point(outer: &[Point3<f64>], holes: &[Vec<Point3<f64>>]) -> Option<Point2<f64>> {
    let mut coords: Vec<f64> = Vec::new();
    let mut hole_indices: Vec<usize> = Vec::new();

    push_open_ring(&mut coords, outer);
    for hole in holes {
        hole_indices.push(coords.len() / 2);
        push_open_ring(&mut coords, hole);
    }
    if coords.len() < 6 {
        return None;
    }

    let indices = earcutr::earcut(&coords, &hole_indices, 2).ok()?;
    let vertex = |i: usize| Point2::new(coords[2 * i], coords[2 * i + 1]);

    let mut best: Option<(f64, Point2<f64>)> = None;
    for tri in indices.chunks(3) {
        if tri.len() < 3 {
            continue;
        }
        let (a, b, c) = (vertex(tri[0]), vertex(tri[1]), vertex(tri[2]));
        let area = ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)).abs() * 0.5;
        let center = Point2::new((a.x + b.x + c.x) / 3.0, (a.y + b.y + c.y) / 3.0);
        if best.map_or(true, |(size, _)| area > size) {
            best = Some((area, center));
        }
    }
    best.map(|(_, center)| center)
}

// earcut expects rings without the closing duplicate.
fn push_open_ring(coords: &mut Vec<f64>, ring: &[Point3<f64>]) {
    let open = match (ring.first(), ring.last()) {
        (Some(f), Some(l)) if ring.len() > 1 && f == l => &ring[..ring.len() - 1],
        _ => ring,
    };
    for p in open {
        coords.push(p.x);
        coords.push(p.y);
    }
}

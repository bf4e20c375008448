// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Angular adjacency around nodes.
//!
//! Every line end registered at a node carries the direction in which the
//! line leaves that node. Links are kept sorted by that angle, so walking a
//! node's link list forwards turns counter-clockwise and walking it
//! backwards turns clockwise. Ring building relies on "take the next line to
//! the right" at each node it passes through.

use nalgebra::Point3;

use crate::arena::{Node, NodeLink, TopoGraph};
use crate::keys::{LineRef, Side, TypeMask};

/// Angle assigned to line ends whose geometry collapses to a single point.
/// Such ends are skipped by every traversal.
pub const DEGENERATE_ANGLE: f32 = -9.0;

/// Direction of the first segment leaving the first point, skipping
/// repeated coordinates.
pub fn begin_angle(points: &[Point3<f64>]) -> f32 {
    let Some(start) = points.first() else {
        return DEGENERATE_ANGLE;
    };
    points
        .iter()
        .skip(1)
        .find(|p| p.x != start.x || p.y != start.y)
        .map_or(DEGENERATE_ANGLE, |p| {
            (p.y - start.y).atan2(p.x - start.x) as f32
        })
}

/// Direction of the last segment, measured from the last point back along
/// the line, skipping repeated coordinates.
pub fn end_angle(points: &[Point3<f64>]) -> f32 {
    let Some(end) = points.last() else {
        return DEGENERATE_ANGLE;
    };
    points
        .iter()
        .rev()
        .skip(1)
        .find(|p| p.x != end.x || p.y != end.y)
        .map_or(DEGENERATE_ANGLE, |p| (p.y - end.y).atan2(p.x - end.x) as f32)
}

impl Node {
    /// Registers a line end, keeping links sorted by angle. A new link goes
    /// after existing links with an equal angle.
    pub(crate) fn insert_link(&mut self, line: LineRef, angle: f32) {
        let at = self.links.partition_point(|l| l.angle <= angle);
        self.links.insert(at, NodeLink { line, angle });
    }

    /// Removes a line end; returns whether it was registered.
    pub(crate) fn remove_link(&mut self, line: LineRef) -> bool {
        match self.links.iter().position(|l| l.line == line) {
            Some(i) => {
                self.links.remove(i);
                true
            }
            None => false,
        }
    }

    /// Angle of a registered line end, or [`DEGENERATE_ANGLE`] when the end
    /// is not registered here.
    pub fn link_angle(&self, line: LineRef) -> f32 {
        self.links
            .iter()
            .find(|l| l.line == line)
            .map_or(DEGENERATE_ANGLE, |l| l.angle)
    }

    /// Number of registered ends whose line matches `mask`.
    pub fn count_links(&self, graph: &TopoGraph, mask: TypeMask) -> usize {
        self.links
            .iter()
            .filter(|l| {
                graph
                    .line(l.line.line())
                    .is_some_and(|line| mask.contains(line.feature_type()))
            })
            .count()
    }
}

impl TopoGraph {
    /// Next line end around `current`'s pivot node, turning to `side`.
    ///
    /// The pivot is the start node for forward references and the end node
    /// for backward ones. `Side::Right` walks to greater angles, `Side::Left`
    /// to smaller ones, wrapping around. Degenerate ends are skipped. If the
    /// walk comes back to `current` without another match, `current` itself
    /// is returned when it matches `mask` (a dangle). Returns `None` when
    /// `current` is not a registered line end or nothing matches.
    pub fn next_line(&self, current: LineRef, side: Side, mask: TypeMask) -> Option<LineRef> {
        self.next_link(current, side, mask).map(|l| l.line)
    }

    pub(crate) fn next_link(
        &self,
        current: LineRef,
        side: Side,
        mask: TypeMask,
    ) -> Option<NodeLink> {
        let line = self.line(current.line())?;
        if !TypeMask::LINES.contains(line.feature_type()) {
            return None;
        }
        let node = self.node(self.pivot_node(current)?)?;
        let n = node.links.len();
        let start = node.links.iter().rposition(|l| l.line == current)?;

        let mut i = start;
        loop {
            i = match side {
                Side::Right => (i + 1) % n,
                Side::Left => (i + n - 1) % n,
            };
            let link = node.links[i];
            if link.angle == DEGENERATE_ANGLE {
                if link.line == current {
                    break;
                }
                continue;
            }
            let matches = self
                .line(link.line.line())
                .is_some_and(|l| mask.contains(l.feature_type()));
            if matches {
                return Some(link);
            }
            if link.line == current {
                break;
            }
        }
        tracing::trace!(line = %current, side = %side, "no next line");
        None
    }

    /// Whether `line`'s angle at its pivot node is distinct from both
    /// immediate neighbors'. A neighbor that is `line` itself does not count
    /// as a tie.
    pub fn angle_tie_check(&self, line: LineRef, mask: TypeMask) -> bool {
        let Some(record) = self.line(line.line()) else {
            return false;
        };
        if !TypeMask::LINES.contains(record.feature_type()) {
            return false;
        }
        let Some(node) = self.pivot_node(line).and_then(|n| self.node(n)) else {
            return false;
        };
        let angle = node.link_angle(line);

        for side in [Side::Right, Side::Left] {
            let neighbor = match self.next_link(line, side, mask) {
                Some(l) if l.line == line => continue,
                Some(l) => l.angle,
                None => DEGENERATE_ANGLE,
            };
            if neighbor == angle {
                tracing::debug!(line = %line, side = %side, angle, "angle tie at node");
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{FeatureType, LineId};
    use crate::spatial::BoxIndex;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn pts(coords: &[(f64, f64)]) -> Vec<Point3<f64>> {
        coords.iter().map(|&(x, y)| Point3::new(x, y, 0.0)).collect()
    }

    fn fwd(id: u32) -> LineRef {
        LineRef::forward(LineId(id))
    }

    fn bwd(id: u32) -> LineRef {
        LineRef::backward(LineId(id))
    }

    #[test]
    fn angles_skip_repeated_points() {
        let line = pts(&[(0.0, 0.0), (0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 1.0)]);
        assert_relative_eq!(begin_angle(&line), FRAC_PI_2);
        assert_relative_eq!(end_angle(&line), PI);
    }

    #[test]
    fn collapsed_line_is_degenerate() {
        let line = pts(&[(2.0, 2.0), (2.0, 2.0)]);
        assert_eq!(begin_angle(&line), DEGENERATE_ANGLE);
        assert_eq!(end_angle(&line), DEGENERATE_ANGLE);
        assert_eq!(begin_angle(&[]), DEGENERATE_ANGLE);
    }

    #[test]
    fn links_sorted_with_ties_after() {
        let mut node = Node {
            position: Point3::origin(),
            links: Vec::new(),
        };
        node.insert_link(fwd(1), 1.0);
        node.insert_link(fwd(2), -1.0);
        node.insert_link(fwd(3), 1.0);
        node.insert_link(fwd(4), DEGENERATE_ANGLE);
        let order: Vec<i32> = node.links.iter().map(|l| l.line.raw()).collect();
        assert_eq!(order, vec![4, 2, 1, 3]);

        assert!(node.remove_link(fwd(1)));
        assert!(!node.remove_link(fwd(1)));
        assert_eq!(node.link_angle(fwd(3)), 1.0);
        assert_eq!(node.link_angle(fwd(1)), DEGENERATE_ANGLE);
    }

    /// Three boundaries leaving the origin east, north and west.
    fn star() -> (TopoGraph, BoxIndex) {
        let mut graph = TopoGraph::new(false);
        let mut index = BoxIndex::new(1.0, false);
        for (x, y) in [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0)] {
            let p = pts(&[(0.0, 0.0), (x, y)]);
            graph
                .add_line(&mut index, FeatureType::Boundary, &p, 0)
                .unwrap();
        }
        (graph, index)
    }

    #[test]
    fn next_line_turns_by_angle() {
        let (graph, _) = star();
        // East (0), north (pi/2), west (pi) at the shared origin node.
        assert_eq!(graph.next_line(fwd(1), Side::Right, TypeMask::BOUNDARY), Some(fwd(2)));
        assert_eq!(graph.next_line(fwd(1), Side::Left, TypeMask::BOUNDARY), Some(fwd(3)));
        assert_eq!(graph.next_line(fwd(3), Side::Right, TypeMask::BOUNDARY), Some(fwd(1)));
        assert_eq!(graph.next_line(fwd(2), Side::Left, TypeMask::BOUNDARY), Some(fwd(1)));
    }

    #[test]
    fn dangle_returns_itself() {
        let (graph, _) = star();
        // The far end of each arm has only that arm.
        assert_eq!(graph.next_line(bwd(2), Side::Right, TypeMask::BOUNDARY), Some(bwd(2)));
        assert_eq!(graph.next_line(bwd(2), Side::Right, TypeMask::LINE), None);
        assert!(graph.angle_tie_check(bwd(2), TypeMask::BOUNDARY));
    }

    #[test]
    fn equal_angles_fail_tie_check() {
        let (mut graph, mut index) = star();
        // A second boundary leaving north from the origin.
        graph
            .add_line(&mut index, FeatureType::Boundary, &pts(&[(0.0, 0.0), (0.0, 2.0)]), 0)
            .unwrap();
        assert!(!graph.angle_tie_check(fwd(2), TypeMask::BOUNDARY));
        assert!(!graph.angle_tie_check(fwd(4), TypeMask::BOUNDARY));
        assert!(graph.angle_tie_check(fwd(1), TypeMask::BOUNDARY));
    }

    #[test]
    fn unknown_reference_has_no_neighbor() {
        let (graph, _) = star();
        assert_eq!(graph.next_line(fwd(9), Side::Right, TypeMask::BOUNDARY), None);
        assert!(!graph.angle_tie_check(fwd(9), TypeMask::BOUNDARY));
    }
}

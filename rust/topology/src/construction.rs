// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registering and removing lines and nodes.
//!
//! Lines and boundaries are attached to a node at each end; nodes are found
//! by exact endpoint match through the spatial index and created on demand.
//! Points and centroids are registered without nodes.

use nalgebra::Point3;

use crate::adjacency::{begin_angle, end_angle};
use crate::arena::{Line, LineTopo, Node, TopoGraph};
use crate::error::{Error, Result};
use crate::geometry::{extend_box, BoundBox};
use crate::keys::*;
use crate::spatial::SpatialIndex;

impl TopoGraph {
    /// Adds a node at `position`.
    pub fn add_node(&mut self, index: &mut dyn SpatialIndex, position: Point3<f64>) -> NodeId {
        let id = NodeId(self.nodes.push(Node {
            position,
            links: Vec::new(),
        }));
        index.add_node(id, &position);
        self.updates.node(id);
        id
    }

    /// Existing node at `position`, or a new one.
    pub fn find_or_add_node(
        &mut self,
        index: &mut dyn SpatialIndex,
        position: Point3<f64>,
    ) -> NodeId {
        match index.find_node(&position) {
            Some(id) if self.node(id).is_some() => id,
            _ => self.add_node(index, position),
        }
    }

    /// Registers a feature stored at `offset` and returns its new id.
    ///
    /// Lines and boundaries get a node at each end, with their end angles
    /// inserted into the nodes' link lists. Areas are not touched; see
    /// [`Map`](crate::map::Map) for the incremental maintenance that follows.
    pub fn add_line(
        &mut self,
        index: &mut dyn SpatialIndex,
        ftype: FeatureType,
        points: &[Point3<f64>],
        offset: u64,
    ) -> Result<LineId> {
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return Err(Error::EmptyGeometry);
        };
        let id = LineId(self.lines.next_id());

        let topo = match ftype {
            FeatureType::Point => LineTopo::Point,
            FeatureType::Centroid => LineTopo::Centroid {
                area: CentroidArea::Outside,
            },
            FeatureType::Line | FeatureType::Boundary => {
                let n1 = self.find_or_add_node(index, *first);
                self.attach_end(n1, LineRef::forward(id), begin_angle(points))?;
                let n2 = self.find_or_add_node(index, *last);
                self.attach_end(n2, LineRef::backward(id), end_angle(points))?;
                if ftype == FeatureType::Line {
                    LineTopo::Line { n1, n2 }
                } else {
                    LineTopo::Boundary {
                        n1,
                        n2,
                        left: Face::None,
                        right: Face::None,
                    }
                }
            }
        };

        let pushed = LineId(self.lines.push(Line { offset, topo }));
        debug_assert_eq!(pushed, id);

        let bbox = BoundBox::from_points(points);
        index.add_line(id, ftype, &bbox);
        extend_box(&mut self.bbox, &bbox);
        self.updates.line(id);

        tracing::trace!(line = %id, ftype = %ftype, offset, "line registered");
        Ok(id)
    }

    fn attach_end(&mut self, node: NodeId, line: LineRef, angle: f32) -> Result<()> {
        self.nodes
            .get_mut(node.0)
            .ok_or(Error::missing(RecordKind::Node, node.0))?
            .insert_link(line, angle);
        self.updates.node(node);
        Ok(())
    }

    /// Unregisters a line: removes its ends from their nodes, deletes nodes
    /// left without links and tombstones the line.
    ///
    /// Faces must already have been torn down; the line's slots are not
    /// inspected.
    pub fn remove_line(&mut self, index: &mut dyn SpatialIndex, id: LineId) -> Result<Line> {
        let line = self
            .lines
            .kill(id.0)
            .ok_or(Error::missing(RecordKind::Line, id.0))?;
        index.del_line(id);
        self.updates.line(id);

        if let Some((n1, n2)) = line.nodes() {
            for (node_id, end) in [(n1, LineRef::forward(id)), (n2, LineRef::backward(id))] {
                let node = self
                    .nodes
                    .get_mut(node_id.0)
                    .ok_or(Error::missing(RecordKind::Node, node_id.0))?;
                if !node.remove_link(end) {
                    return Err(Error::Consistency(format!(
                        "line end {end} is not registered at node {node_id}"
                    )));
                }
                self.updates.node(node_id);
                if node.links.is_empty() {
                    self.nodes.kill(node_id.0);
                    index.del_node(node_id);
                }
            }
        }
        Ok(line)
    }

    /// Live lines registered at `node`, in link order.
    pub fn node_line_ids(&self, node: NodeId) -> Vec<LineId> {
        self.node(node)
            .map(|n| n.links.iter().map(|l| l.line.line()).collect())
            .unwrap_or_default()
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON snapshot of a topology graph, for debugging and inspection.
//!
//! Unlike the binary file, the snapshot carries area and isle boxes and the
//! build level. Ids are kept as-is; the slot counts let tombstones be
//! restored.

use serde::{Deserialize, Serialize};

use crate::arena::*;
use crate::config::BuildLevel;
use crate::error::{Error, Result};
use crate::geometry::BoundBox;
use crate::keys::*;

/// Serializable representation of a whole graph.
#[derive(Debug, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub with_z: bool,
    pub built: BuildLevel,
    pub coor_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundBox>,
    pub slots: SlotCounts,
    pub nodes: Vec<NodeSnapshot>,
    pub lines: Vec<LineSnapshot>,
    pub areas: Vec<AreaSnapshot>,
    pub isles: Vec<IsleSnapshot>,
}

/// Allocated slots per record kind, tombstones included.
#[derive(Debug, Serialize, Deserialize)]
pub struct SlotCounts {
    pub nodes: usize,
    pub lines: usize,
    pub areas: usize,
    pub isles: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub links: Vec<LinkSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub line: LineRef,
    pub angle: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub id: LineId,
    pub offset: u64,
    pub topo: TopoSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TopoSnapshot {
    Point,
    Line { n1: NodeId, n2: NodeId },
    Boundary { n1: NodeId, n2: NodeId, left: Face, right: Face },
    Centroid { area: CentroidArea },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AreaSnapshot {
    pub id: AreaId,
    pub lines: Vec<LineRef>,
    pub isles: Vec<IsleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid: Option<LineId>,
    pub bbox: BoundBox,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IsleSnapshot {
    pub id: IsleId,
    pub lines: Vec<LineRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<AreaId>,
    pub bbox: BoundBox,
}

impl From<LineTopo> for TopoSnapshot {
    fn from(topo: LineTopo) -> Self {
        match topo {
            LineTopo::Point => TopoSnapshot::Point,
            LineTopo::Line { n1, n2 } => TopoSnapshot::Line { n1, n2 },
            LineTopo::Boundary { n1, n2, left, right } => TopoSnapshot::Boundary { n1, n2, left, right },
            LineTopo::Centroid { area } => TopoSnapshot::Centroid { area },
        }
    }
}

impl From<&TopoSnapshot> for LineTopo {
    fn from(topo: &TopoSnapshot) -> Self {
        match *topo {
            TopoSnapshot::Point => LineTopo::Point,
            TopoSnapshot::Line { n1, n2 } => LineTopo::Line { n1, n2 },
            TopoSnapshot::Boundary { n1, n2, left, right } => LineTopo::Boundary { n1, n2, left, right },
            TopoSnapshot::Centroid { area } => LineTopo::Centroid { area },
        }
    }
}

/// Places `items` at their ids in `len` slots.
fn place<T>(kind: RecordKind, len: usize, items: Vec<(u32, T)>) -> Result<Slots<T>> {
    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(len).collect();
    for (id, item) in items {
        let slot = (id as usize)
            .checked_sub(1)
            .and_then(|i| slots.get_mut(i))
            .ok_or_else(|| Error::Serialization(format!("{kind} id {id} outside {len} slots")))?;
        if slot.replace(item).is_some() {
            return Err(Error::Serialization(format!("duplicate {kind} id {id}")));
        }
    }
    Ok(Slots::from_vec(slots))
}

impl TopoGraph {
    /// Serializes the graph to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        let snapshot = self.to_snapshot();
        serde_json::to_string_pretty(&snapshot).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Creates a serializable snapshot of the graph.
    pub fn to_snapshot(&self) -> GraphSnapshot {
        let nodes = self
            .nodes()
            .map(|(id, n)| NodeSnapshot {
                id,
                x: n.position.x,
                y: n.position.y,
                z: n.position.z,
                links: n
                    .links
                    .iter()
                    .map(|l| LinkSnapshot {
                        line: l.line,
                        angle: l.angle,
                    })
                    .collect(),
            })
            .collect();

        let lines = self
            .lines()
            .map(|(id, l)| LineSnapshot {
                id,
                offset: l.offset,
                topo: l.topo.into(),
            })
            .collect();

        let areas = self
            .areas()
            .map(|(id, a)| AreaSnapshot {
                id,
                lines: a.lines.clone(),
                isles: a.isles.clone(),
                centroid: a.centroid,
                bbox: a.bbox,
            })
            .collect();

        let isles = self
            .isles()
            .map(|(id, i)| IsleSnapshot {
                id,
                lines: i.lines.clone(),
                area: i.area,
                bbox: i.bbox,
            })
            .collect();

        GraphSnapshot {
            with_z: self.with_z,
            built: self.built,
            coor_size: self.coor_size,
            bbox: self.bbox,
            slots: SlotCounts {
                nodes: self.nodes.len(),
                lines: self.lines.len(),
                areas: self.areas.len(),
                isles: self.isles.len(),
            },
            nodes,
            lines,
            areas,
            isles,
        }
    }

    /// Deserializes a graph from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: GraphSnapshot =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }

    /// Reconstructs a graph from a snapshot, ids and tombstones included.
    pub fn from_snapshot(snap: GraphSnapshot) -> Result<Self> {
        let mut graph = TopoGraph::new(snap.with_z);

        let nodes = snap
            .nodes
            .into_iter()
            .map(|n| {
                let node = Node {
                    position: nalgebra::Point3::new(n.x, n.y, n.z),
                    links: n
                        .links
                        .into_iter()
                        .map(|l| NodeLink {
                            line: l.line,
                            angle: l.angle,
                        })
                        .collect(),
                };
                (n.id.0, node)
            })
            .collect();
        graph.nodes = place(RecordKind::Node, snap.slots.nodes, nodes)?;

        let lines = snap
            .lines
            .iter()
            .map(|l| {
                let line = Line {
                    offset: l.offset,
                    topo: (&l.topo).into(),
                };
                (l.id.0, line)
            })
            .collect();
        graph.lines = place(RecordKind::Line, snap.slots.lines, lines)?;

        let areas = snap
            .areas
            .into_iter()
            .map(|a| {
                let area = Area {
                    lines: a.lines,
                    isles: a.isles,
                    centroid: a.centroid,
                    bbox: a.bbox,
                };
                (a.id.0, area)
            })
            .collect();
        graph.areas = place(RecordKind::Area, snap.slots.areas, areas)?;

        let isles = snap
            .isles
            .into_iter()
            .map(|i| {
                let isle = Isle {
                    lines: i.lines,
                    area: i.area,
                    bbox: i.bbox,
                };
                (i.id.0, isle)
            })
            .collect();
        graph.isles = place(RecordKind::Isle, snap.slots.isles, isles)?;

        graph.bbox = snap.bbox;
        graph.coor_size = snap.coor_size;
        graph.built = snap.built;
        Ok(graph)
    }
}

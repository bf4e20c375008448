// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary topology file.
//!
//! After the header come four sections, one record per allocated slot in id
//! order, tombstones included so that ids survive a round trip:
//!
//! - node: link count (0 for a deleted node), link refs (i32), link angles
//!   (f32), a reserved edge count when the map is 3D, then x, y and z
//! - line: type code (u8, 0 for a deleted line), store offset, then
//!   per type: centroid area; line nodes; boundary nodes and side faces
//! - area: ring length (0 for a deleted area), ring refs, isle count, isle
//!   ids, centroid line
//! - isle: ring length (0 for a deleted isle), ring refs, enclosing area
//!
//! Area and isle boxes are not stored; they are recomputed from the
//! coordinate store when a map is opened.

use std::io::{Read, Seek, SeekFrom, Write};

use nalgebra::Point3;

use crate::arena::{Area, Isle, Line, LineTopo, Node, NodeLink, TopoGraph};
use crate::codec::{ByteOrder, OffsetSize, PortableReader, PortableWriter};
use crate::config::BuildLevel;
use crate::error::{Error, Result};
use crate::format::{read_header, write_header, RecordCounts, TopoHeader, TypeCounts};
use crate::keys::*;

fn write_node<W: Write>(w: &mut PortableWriter<W>, node: Option<&Node>, with_z: bool) -> Result<()> {
    let Some(node) = node else {
        return w.write_i32(0);
    };
    w.write_count(node.links.len())?;
    for link in &node.links {
        w.write_i32(link.line.raw())?;
    }
    for link in &node.links {
        w.write_f32(link.angle)?;
    }
    if with_z {
        // Edge count, reserved.
        w.write_i32(0)?;
    }
    w.write_f64(node.position.x)?;
    w.write_f64(node.position.y)?;
    if with_z {
        w.write_f64(node.position.z)?;
    }
    Ok(())
}

fn read_node<R: Read>(r: &mut PortableReader<R>, with_z: bool) -> Result<Option<Node>> {
    let n = r.read_count()?;
    if n == 0 {
        return Ok(None);
    }
    let refs = r.read_i32_vec(n)?;
    let angles = r.read_f32_vec(n)?;
    if with_z {
        let edges = r.read_count()?;
        if edges != 0 {
            tracing::debug!(edges, "ignoring node edges");
        }
    }
    let x = r.read_f64()?;
    let y = r.read_f64()?;
    let z = if with_z { r.read_f64()? } else { 0.0 };

    let links = refs
        .into_iter()
        .zip(angles)
        .map(|(raw, angle)| {
            let line = LineRef::try_from(raw)?;
            Ok(NodeLink { line, angle })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(Node {
        position: Point3::new(x, y, z),
        links,
    }))
}

fn node_id(raw: i32) -> Result<NodeId> {
    u32::try_from(raw)
        .ok()
        .filter(|&id| id > 0)
        .map(NodeId)
        .ok_or_else(|| Error::Format(format!("invalid node id {raw}")))
}

fn raw_id(id: u32) -> Result<i32> {
    i32::try_from(id).map_err(|_| Error::Format(format!("id {id} exceeds i32")))
}

fn write_line<W: Write>(w: &mut PortableWriter<W>, line: Option<&Line>, size: OffsetSize) -> Result<()> {
    let Some(line) = line else {
        return w.write_u8(0);
    };
    w.write_u8(line.feature_type().store_code())?;
    w.write_offset(line.offset, size)?;
    match line.topo {
        LineTopo::Point => {}
        LineTopo::Centroid { area } => w.write_i32(area.raw())?,
        LineTopo::Line { n1, n2 } => {
            w.write_i32(raw_id(n1.0)?)?;
            w.write_i32(raw_id(n2.0)?)?;
        }
        LineTopo::Boundary { n1, n2, left, right } => {
            w.write_i32(raw_id(n1.0)?)?;
            w.write_i32(raw_id(n2.0)?)?;
            w.write_i32(left.raw())?;
            w.write_i32(right.raw())?;
        }
    }
    Ok(())
}

fn read_line<R: Read>(r: &mut PortableReader<R>, size: OffsetSize) -> Result<Option<Line>> {
    let code = r.read_u8()?;
    if code == 0 {
        return Ok(None);
    }
    let ftype = FeatureType::from_store_code(code).ok_or(Error::UnsupportedType(code))?;
    let offset = r.read_offset(size)?;
    let topo = match ftype {
        FeatureType::Point => LineTopo::Point,
        FeatureType::Centroid => LineTopo::Centroid {
            area: CentroidArea::from_raw(r.read_i32()?),
        },
        FeatureType::Line => LineTopo::Line {
            n1: node_id(r.read_i32()?)?,
            n2: node_id(r.read_i32()?)?,
        },
        FeatureType::Boundary => LineTopo::Boundary {
            n1: node_id(r.read_i32()?)?,
            n2: node_id(r.read_i32()?)?,
            left: Face::from_raw(r.read_i32()?),
            right: Face::from_raw(r.read_i32()?),
        },
    };
    Ok(Some(Line { offset, topo }))
}

fn write_ring<W: Write>(w: &mut PortableWriter<W>, ring: &[LineRef]) -> Result<()> {
    w.write_count(ring.len())?;
    ring.iter().try_for_each(|r| w.write_i32(r.raw()))
}

fn read_ring<R: Read>(r: &mut PortableReader<R>, n: usize) -> Result<Vec<LineRef>> {
    r.read_i32_vec(n)?
        .into_iter()
        .map(LineRef::try_from)
        .collect()
}

fn write_area<W: Write>(w: &mut PortableWriter<W>, area: Option<&Area>) -> Result<()> {
    let Some(area) = area else {
        return w.write_i32(0);
    };
    write_ring(w, &area.lines)?;
    w.write_count(area.isles.len())?;
    for isle in &area.isles {
        w.write_i32(raw_id(isle.0)?)?;
    }
    w.write_i32(area.centroid.map_or(Ok(0), |c| raw_id(c.0))?)
}

fn read_area<R: Read>(r: &mut PortableReader<R>) -> Result<Option<Area>> {
    let n = r.read_count()?;
    if n == 0 {
        return Ok(None);
    }
    let lines = read_ring(r, n)?;
    let n_isles = r.read_count()?;
    let isles = r
        .read_i32_vec(n_isles)?
        .into_iter()
        .map(|raw| {
            u32::try_from(raw)
                .ok()
                .filter(|&id| id > 0)
                .map(IsleId)
                .ok_or_else(|| Error::Format(format!("invalid isle id {raw}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let centroid = r.read_i32()?;
    Ok(Some(Area {
        lines,
        isles,
        centroid: u32::try_from(centroid).ok().filter(|&id| id > 0).map(LineId),
        bbox: Default::default(),
    }))
}

fn write_isle<W: Write>(w: &mut PortableWriter<W>, isle: Option<&Isle>) -> Result<()> {
    let Some(isle) = isle else {
        return w.write_i32(0);
    };
    write_ring(w, &isle.lines)?;
    w.write_i32(isle.area.map_or(Ok(0), |a| raw_id(a.0))?)
}

fn read_isle<R: Read>(r: &mut PortableReader<R>) -> Result<Option<Isle>> {
    let n = r.read_count()?;
    if n == 0 {
        return Ok(None);
    }
    let lines = read_ring(r, n)?;
    let area = r.read_i32()?;
    Ok(Some(Isle {
        lines,
        area: u32::try_from(area).ok().filter(|&id| id > 0).map(AreaId),
        bbox: Default::default(),
    }))
}

impl TopoGraph {
    /// Header describing the graph as it would be written.
    pub fn header(&self, byte_order: ByteOrder) -> TopoHeader {
        let mut header = TopoHeader::new(byte_order, self.with_z, self.coor_size);
        header.bbox = self.bbox();
        header.counts = RecordCounts {
            nodes: self.nodes.len(),
            lines: self.lines.len(),
            areas: self.areas.len(),
            isles: self.isles.len(),
        };
        header.type_counts = TypeCounts {
            points: self.count_type(FeatureType::Point),
            lines: self.count_type(FeatureType::Line),
            boundaries: self.count_type(FeatureType::Boundary),
            centroids: self.count_type(FeatureType::Centroid),
        };
        header
    }

    /// Writes the topology file from the start of `stream`.
    ///
    /// The header is written twice: first as a placeholder, then with the
    /// section offsets once they are known.
    pub fn write_topo<W: Write + Seek>(&self, stream: &mut W, byte_order: ByteOrder) -> Result<()> {
        let mut header = self.header(byte_order);
        let size = header.offset_size;

        stream.seek(SeekFrom::Start(0))?;
        write_header(stream, &header)?;

        let mut w = PortableWriter::new(&mut *stream, byte_order);
        header.offsets.node = w.position()?;
        for node in self.nodes.slots() {
            write_node(&mut w, node, self.with_z)?;
        }
        header.offsets.line = w.position()?;
        for line in self.lines.slots() {
            write_line(&mut w, line, size)?;
        }
        header.offsets.area = w.position()?;
        for area in self.areas.slots() {
            write_area(&mut w, area)?;
        }
        header.offsets.isle = w.position()?;
        for isle in self.isles.slots() {
            write_isle(&mut w, isle)?;
        }
        let end = w.position()?;

        stream.seek(SeekFrom::Start(0))?;
        write_header(stream, &header)?;
        stream.seek(SeekFrom::Start(end))?;
        stream.flush()?;

        tracing::info!(
            nodes = header.counts.nodes,
            lines = header.counts.lines,
            areas = header.counts.areas,
            isles = header.counts.isles,
            bytes = end,
            offset_bytes = size.bytes(),
            "topology written"
        );
        Ok(())
    }

    /// Reads a topology file written by [`TopoGraph::write_topo`].
    ///
    /// The result is considered fully built. Area and isle boxes are left
    /// empty.
    pub fn read_topo<R: Read + Seek>(stream: &mut R) -> Result<TopoGraph> {
        let header = read_header(stream)?;
        let mut graph = TopoGraph::new(header.with_z);
        let mut r = PortableReader::new(&mut *stream, header.byte_order);

        r.seek(header.offsets.node)?;
        for _ in 0..header.counts.nodes {
            match read_node(&mut r, header.with_z)? {
                Some(node) => graph.nodes.push(node),
                None => graph.nodes.push_dead(),
            };
        }
        r.seek(header.offsets.line)?;
        for _ in 0..header.counts.lines {
            match read_line(&mut r, header.offset_size)? {
                Some(line) => graph.lines.push(line),
                None => graph.lines.push_dead(),
            };
        }
        r.seek(header.offsets.area)?;
        for _ in 0..header.counts.areas {
            match read_area(&mut r)? {
                Some(area) => graph.areas.push(area),
                None => graph.areas.push_dead(),
            };
        }
        r.seek(header.offsets.isle)?;
        for _ in 0..header.counts.isles {
            match read_isle(&mut r)? {
                Some(isle) => graph.isles.push(isle),
                None => graph.isles.push_dead(),
            };
        }

        graph.bbox = Some(header.bbox);
        graph.coor_size = header.coor_size;
        graph.built = BuildLevel::ALL;
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::spatial::BoxIndex;
    use std::io::Cursor;

    fn pts(coords: &[(f64, f64)]) -> Vec<Point3<f64>> {
        coords.iter().map(|&(x, y)| Point3::new(x, y, 0.0)).collect()
    }

    fn sample(offset: u64) -> TopoGraph {
        let mut graph = TopoGraph::new(false);
        let mut index = BoxIndex::new(1.0, false);
        graph
            .add_line(&mut index, FeatureType::Boundary, &pts(&[(0.0, 0.0), (1.0, 0.0)]), 0)
            .unwrap();
        let dead = graph
            .add_line(&mut index, FeatureType::Line, &pts(&[(1.0, 0.0), (1.0, 1.0)]), 20)
            .unwrap();
        graph
            .add_line(&mut index, FeatureType::Centroid, &pts(&[(0.5, 0.5)]), offset)
            .unwrap();
        graph.remove_line(&mut index, dead).unwrap();
        graph
    }

    #[test]
    fn tombstones_survive_round_trip() {
        let mut graph = sample(40);
        graph.coor_size = 64;
        let mut buf = Cursor::new(Vec::new());
        graph.write_topo(&mut buf, ByteOrder::Big).unwrap();

        let restored = TopoGraph::read_topo(&mut buf).unwrap();
        assert_eq!(restored.lines.len(), 3);
        assert!(restored.line(LineId(2)).is_none());
        assert_eq!(restored.line(LineId(1)), graph.line(LineId(1)));
        assert_eq!(restored.line(LineId(3)).unwrap().offset, 40);
        assert_eq!(restored.nodes.len(), 3);
        assert!(restored.node(NodeId(3)).is_none());
        assert_eq!(restored.node(NodeId(2)), graph.node(NodeId(2)));
        assert_eq!(restored.coor_size(), 64);
        assert_eq!(restored.built(), BuildLevel::ALL);
    }

    #[test]
    fn four_byte_offsets_overflow() {
        let graph = sample(3_000_000_000);
        let mut buf = Cursor::new(Vec::new());
        let err = graph.write_topo(&mut buf, ByteOrder::Little).unwrap_err();
        assert!(matches!(err, Error::OffsetOverflow { width: 4, .. }));
    }

    #[test]
    fn large_store_uses_eight_byte_offsets() {
        let mut graph = sample(3_000_000_000);
        graph.coor_size = 3_000_000_100;
        let mut buf = Cursor::new(Vec::new());
        graph.write_topo(&mut buf, ByteOrder::Little).unwrap();

        let restored = TopoGraph::read_topo(&mut buf).unwrap();
        assert_eq!(restored.line(LineId(3)).unwrap().offset, 3_000_000_000);
        assert_eq!(restored.coor_size(), 3_000_000_100);
    }

    #[test]
    fn zero_ring_reference_is_rejected() {
        let mut w = PortableWriter::new(Vec::new(), ByteOrder::Little);
        w.write_i32(1).unwrap();
        w.write_i32(0).unwrap();
        let bytes = w.into_inner();
        let mut r = PortableReader::new(Cursor::new(bytes), ByteOrder::Little);
        assert!(matches!(read_isle(&mut r), Err(Error::Format(_))));
    }

    #[test]
    fn unnegatable_ring_reference_is_rejected() {
        let mut w = PortableWriter::new(Vec::new(), ByteOrder::Little);
        w.write_i32(2).unwrap();
        w.write_i32(3).unwrap();
        w.write_i32(i32::MIN).unwrap();
        w.write_i32(0).unwrap();
        let bytes = w.into_inner();
        let mut r = PortableReader::new(Cursor::new(bytes), ByteOrder::Little);
        assert!(matches!(read_isle(&mut r), Err(Error::Format(msg)) if msg.contains("-2147483648")));
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topology file header.
//!
//! Layout (version 5.1):
//!
//! | bytes  | field                                                        |
//! |--------|--------------------------------------------------------------|
//! | 0..5   | version, earliest compatible version, byte-order tag         |
//! | 5..9   | header size (u32)                                            |
//! | 9      | with z                                                       |
//! | 10..58 | bounding box N, S, E, W, T, B (f64)                          |
//! | 58..86 | record counts: nodes, edges, lines, areas, isles, volumes, holes |
//! | 86..110| line counts: points, lines, boundaries, centroids, faces, kernels |
//! | ..     | section offsets: node, edge, line, area, isle, volume, hole  |
//! | ..     | coordinate store size                                        |
//!
//! Offsets are 4 bytes when the header is 142 bytes long and 8 bytes when it
//! is 174 bytes or longer. Edge, volume, hole, face and kernel fields are
//! reserved and always zero.

use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};

use serde::{Deserialize, Serialize};

use crate::codec::{ByteOrder, OffsetSize, PortableReader, PortableWriter};
use crate::error::{Error, Result};
use crate::geometry::BoundBox;

/// Topology format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Version written by this library.
pub const TOPO_VERSION: Version = Version::new(5, 1);
/// Oldest reader able to read what this library writes.
pub const TOPO_EARLIEST: Version = Version::new(5, 1);
/// Oldest file version this library can read.
pub const TOPO_OLDEST_READABLE: Version = Version::new(5, 1);

pub const HEADER_SIZE: u32 = 142;
pub const LARGE_HEADER_SIZE: u32 = 174;

/// Live and allocated record counts stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordCounts {
    pub nodes: usize,
    pub lines: usize,
    pub areas: usize,
    pub isles: usize,
}

/// Live line counts by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeCounts {
    pub points: usize,
    pub lines: usize,
    pub boundaries: usize,
    pub centroids: usize,
}

/// Byte position of each record section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SectionOffsets {
    pub node: u64,
    pub line: u64,
    pub area: u64,
    pub isle: u64,
}

/// Decoded topology header.
#[derive(Debug, Clone, PartialEq)]
pub struct TopoHeader {
    pub version: Version,
    pub earliest: Version,
    pub byte_order: ByteOrder,
    pub head_size: u32,
    pub offset_size: OffsetSize,
    pub with_z: bool,
    pub bbox: BoundBox,
    /// Allocated slots per record kind, tombstones included.
    pub counts: RecordCounts,
    pub type_counts: TypeCounts,
    pub offsets: SectionOffsets,
    pub coor_size: u64,
}

impl TopoHeader {
    /// Header for data written by this library. The offset width follows
    /// from `coor_size`.
    pub fn new(byte_order: ByteOrder, with_z: bool, coor_size: u64) -> Self {
        let offset_size = OffsetSize::for_size(coor_size);
        Self {
            version: TOPO_VERSION,
            earliest: TOPO_EARLIEST,
            byte_order,
            head_size: match offset_size {
                OffsetSize::Four => HEADER_SIZE,
                OffsetSize::Eight => LARGE_HEADER_SIZE,
            },
            offset_size,
            with_z,
            bbox: BoundBox::default(),
            counts: RecordCounts::default(),
            type_counts: TypeCounts::default(),
            offsets: SectionOffsets::default(),
            coor_size,
        }
    }
}

/// Checks a file's version pair against this reader.
///
/// Files whose earliest compatible reader is newer than this one are
/// rejected outright; newer files within that bound are read with a warning.
pub fn check_version(version: Version, earliest: Version) -> Result<()> {
    if earliest > TOPO_VERSION {
        return Err(Error::ReaderTooOld {
            file: version,
            required: earliest,
        });
    }
    if version > TOPO_VERSION {
        tracing::warn!(
            file = %version,
            reader = %TOPO_VERSION,
            "topology format is newer than this library; some features may be ignored"
        );
    }
    if version < TOPO_OLDEST_READABLE {
        return Err(Error::FileTooOld {
            file: version,
            supported: TOPO_OLDEST_READABLE,
        });
    }
    Ok(())
}

/// Reads and validates the header, leaving the stream at the end of the
/// declared header.
pub fn read_header<R: Read + Seek>(stream: &mut R) -> Result<TopoHeader> {
    stream.seek(SeekFrom::Start(0))?;

    let mut lead = [0u8; 5];
    stream.read_exact(&mut lead).map_err(Error::from_read)?;
    let version = Version::new(lead[0], lead[1]);
    let earliest = Version::new(lead[2], lead[3]);
    check_version(version, earliest)?;
    let byte_order = ByteOrder::from_tag(lead[4])?;

    let mut r = PortableReader::new(stream, byte_order);
    let head_size = r.read_u32()?;
    if head_size < HEADER_SIZE {
        return Err(Error::Format(format!("header size {head_size} is too small")));
    }
    let offset_size = if head_size >= LARGE_HEADER_SIZE {
        OffsetSize::Eight
    } else {
        OffsetSize::Four
    };
    let with_z = r.read_u8()? != 0;

    let b = r.read_f64_vec(6)?;
    let bbox = BoundBox {
        north: b[0],
        south: b[1],
        east: b[2],
        west: b[3],
        top: b[4],
        bottom: b[5],
    };

    let nodes = r.read_count()?;
    let _edges = r.read_count()?;
    let lines = r.read_count()?;
    let areas = r.read_count()?;
    let isles = r.read_count()?;
    let _volumes = r.read_count()?;
    let _holes = r.read_count()?;

    let type_counts = TypeCounts {
        points: r.read_count()?,
        lines: r.read_count()?,
        boundaries: r.read_count()?,
        centroids: r.read_count()?,
    };
    let _faces = r.read_count()?;
    let _kernels = r.read_count()?;

    let node = r.read_offset(offset_size)?;
    let _edge = r.read_offset(offset_size)?;
    let line = r.read_offset(offset_size)?;
    let area = r.read_offset(offset_size)?;
    let isle = r.read_offset(offset_size)?;
    let _volume = r.read_offset(offset_size)?;
    let _hole = r.read_offset(offset_size)?;
    let coor_size = r.read_offset(offset_size)?;

    r.seek(u64::from(head_size))?;

    tracing::debug!(
        version = %version,
        head_size,
        offset_bytes = offset_size.bytes(),
        nodes,
        lines,
        areas,
        isles,
        "read topology header"
    );

    Ok(TopoHeader {
        version,
        earliest,
        byte_order,
        head_size,
        offset_size,
        with_z,
        bbox,
        counts: RecordCounts {
            nodes,
            lines,
            areas,
            isles,
        },
        type_counts,
        offsets: SectionOffsets {
            node,
            line,
            area,
            isle,
        },
        coor_size,
    })
}

/// Writes `header` at the current position.
pub fn write_header<W: Write>(stream: &mut W, header: &TopoHeader) -> Result<()> {
    let mut w = PortableWriter::new(stream, header.byte_order);
    w.write_u8(header.version.major)?;
    w.write_u8(header.version.minor)?;
    w.write_u8(header.earliest.major)?;
    w.write_u8(header.earliest.minor)?;
    w.write_u8(header.byte_order.tag())?;
    w.write_u32(header.head_size)?;
    w.write_u8(u8::from(header.with_z))?;

    let b = &header.bbox;
    w.write_f64_slice(&[b.north, b.south, b.east, b.west, b.top, b.bottom])?;

    let c = &header.counts;
    for n in [c.nodes, 0, c.lines, c.areas, c.isles, 0, 0] {
        w.write_count(n)?;
    }
    let t = &header.type_counts;
    for n in [t.points, t.lines, t.boundaries, t.centroids, 0, 0] {
        w.write_count(n)?;
    }

    let o = &header.offsets;
    let size = header.offset_size;
    for offset in [o.node, 0, o.line, o.area, o.isle, 0, 0, header.coor_size] {
        w.write_offset(offset, size)?;
    }

    // Pad to the declared length so readers can seek past unknown fields.
    let written = 5 + 4 + 1 + 48 + 28 + 24 + 8 * u32::from(size.bytes());
    for _ in written..header.head_size {
        w.write_u8(0)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    fn sample(coor_size: u64, order: ByteOrder) -> TopoHeader {
        let mut header = TopoHeader::new(order, true, coor_size);
        header.bbox = BoundBox {
            north: 10.0,
            south: -10.0,
            east: 5.0,
            west: -5.0,
            top: 1.0,
            bottom: 0.0,
        };
        header.counts = RecordCounts {
            nodes: 4,
            lines: 6,
            areas: 2,
            isles: 1,
        };
        header.type_counts.boundaries = 5;
        header.type_counts.centroids = 1;
        header.offsets = SectionOffsets {
            node: 142,
            line: 300,
            area: 400,
            isle: 500,
        };
        header
    }

    #[test]
    fn base_header_is_142_bytes() {
        let header = sample(1000, ByteOrder::Little);
        let mut buf = Vec::new();
        write_header(&mut buf, &header).unwrap();
        assert_eq!(buf.len(), 142);
        assert_eq!(&buf[..5], &[5, 1, 5, 1, 0]);
    }

    #[test]
    fn large_store_uses_eight_byte_offsets() {
        let header = sample(5_000_000_000, ByteOrder::Big);
        assert_eq!(header.offset_size, OffsetSize::Eight);
        assert_eq!(header.head_size, LARGE_HEADER_SIZE);

        let mut buf = Vec::new();
        write_header(&mut buf, &header).unwrap();
        assert_eq!(buf.len(), 174);

        let read = read_header(&mut Cursor::new(buf)).unwrap();
        assert_eq!(read.offset_size, OffsetSize::Eight);
        assert_eq!(read.coor_size, 5_000_000_000);
        assert_eq!(read, header);
    }

    #[test]
    fn header_reads_back() {
        let header = sample(1000, ByteOrder::Little);
        let mut buf = Vec::new();
        write_header(&mut buf, &header).unwrap();
        buf.extend_from_slice(&[0xAA; 8]);

        let mut cursor = Cursor::new(buf);
        let read = read_header(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 142);
        assert_eq!(read.counts, header.counts);
        assert_eq!(read.offsets, header.offsets);
        assert!(read.with_z);
        assert_relative_eq!(read.bbox.south, -10.0);
    }

    #[test]
    fn newer_reader_required_is_rejected_before_anything_else() {
        // Only the lead bytes: a reader that looked further would see a
        // truncated stream instead.
        let mut cursor = Cursor::new(vec![6u8, 0, 6, 0, 0]);
        let err = read_header(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            Error::ReaderTooOld {
                required: Version { major: 6, minor: 0 },
                ..
            }
        ));
    }

    #[test]
    fn newer_compatible_file_is_read() {
        let header = sample(1000, ByteOrder::Little);
        let mut buf = Vec::new();
        write_header(&mut buf, &header).unwrap();
        buf[0] = 5;
        buf[1] = 4;

        let read = read_header(&mut Cursor::new(buf)).unwrap();
        assert_eq!(read.version, Version::new(5, 4));
        assert_eq!(read.counts, header.counts);
    }

    #[test]
    fn older_file_asks_for_rebuild() {
        let mut cursor = Cursor::new(vec![5u8, 0, 5, 0, 0]);
        let err = read_header(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::FileTooOld { .. }));
    }
}

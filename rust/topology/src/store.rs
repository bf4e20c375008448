// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Coordinate store: the raw feature records the topology points into.
//!
//! Topology only keeps a byte offset per line; geometry and categories are
//! read back through [`LineStore`] whenever rings are assembled or points
//! located. [`CoorBuffer`] keeps records in memory using the native
//! coordinate record layout:
//!
//! - head byte: bit 0 alive, bit 1 has categories, bits 2.. type code
//! - with categories: count, then fields, then category values (i32)
//! - for lines and boundaries: point count (i32)
//! - x values, y values, and z values when the map is 3D (f64)

use std::io::Cursor;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::codec::{ByteOrder, PortableReader, PortableWriter};
use crate::error::{Error, Result};
use crate::geometry::BoundBox;
use crate::keys::FeatureType;

/// One category attached to a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cat {
    pub field: i32,
    pub cat: i32,
}

/// A feature as stored in the coordinate store.
#[derive(Debug, Clone, PartialEq)]
pub struct LineRecord {
    pub ftype: FeatureType,
    pub cats: Vec<Cat>,
    pub points: Vec<Point3<f64>>,
}

impl LineRecord {
    pub fn new(ftype: FeatureType, points: Vec<Point3<f64>>) -> Self {
        Self {
            ftype,
            cats: Vec::new(),
            points,
        }
    }

    pub fn with_cat(mut self, field: i32, cat: i32) -> Self {
        self.cats.push(Cat { field, cat });
        self
    }

    pub fn bbox(&self) -> BoundBox {
        BoundBox::from_points(&self.points)
    }
}

/// Storage of raw feature records addressed by byte offset.
pub trait LineStore {
    /// Appends a live record and returns its offset.
    fn append(&mut self, record: &LineRecord) -> Result<u64>;

    /// Reads the record at `offset`, live or deleted.
    fn read(&self, offset: u64) -> Result<LineRecord>;

    fn is_alive(&self, offset: u64) -> Result<bool>;

    /// Marks the record at `offset` as deleted.
    fn delete(&mut self, offset: u64) -> Result<()>;

    /// Marks a deleted record as live again.
    fn restore(&mut self, offset: u64) -> Result<()>;

    /// Replaces the record at `offset` and returns the record's new offset.
    fn rewrite(&mut self, offset: u64, record: &LineRecord) -> Result<u64>;

    /// Every live record in offset order.
    fn scan(&self) -> Result<Vec<(u64, LineRecord)>>;

    /// Size of the store in bytes.
    fn size(&self) -> u64;
}

const ALIVE_BIT: u8 = 0x01;
const CATS_BIT: u8 = 0x02;

/// In-memory coordinate store.
#[derive(Debug, Clone)]
pub struct CoorBuffer {
    data: Vec<u8>,
    order: ByteOrder,
    with_z: bool,
}

impl CoorBuffer {
    pub fn new(order: ByteOrder, with_z: bool) -> Self {
        Self {
            data: Vec::new(),
            order,
            with_z,
        }
    }

    pub fn with_z(&self) -> bool {
        self.with_z
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn encode(&self, record: &LineRecord) -> Result<Vec<u8>> {
        if record.points.is_empty() {
            return Err(Error::EmptyGeometry);
        }
        let mut w = PortableWriter::new(Vec::new(), self.order);

        let mut head = ALIVE_BIT | (record.ftype.store_code() << 2);
        if !record.cats.is_empty() {
            head |= CATS_BIT;
        }
        w.write_u8(head)?;

        if !record.cats.is_empty() {
            w.write_count(record.cats.len())?;
            for c in &record.cats {
                w.write_i32(c.field)?;
            }
            for c in &record.cats {
                w.write_i32(c.cat)?;
            }
        }

        // Point-like features always carry exactly one coordinate.
        let points = if record.ftype.is_point_like() {
            &record.points[..1]
        } else {
            w.write_count(record.points.len())?;
            &record.points[..]
        };
        for p in points {
            w.write_f64(p.x)?;
        }
        for p in points {
            w.write_f64(p.y)?;
        }
        if self.with_z {
            for p in points {
                w.write_f64(p.z)?;
            }
        }
        Ok(w.into_inner())
    }

    /// Decodes the record at `offset`: record, alive flag and encoded length.
    fn decode(&self, offset: u64) -> Result<(LineRecord, bool, usize)> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|&s| s < self.data.len())
            .ok_or_else(|| Error::Format(format!("offset {offset} is outside the store")))?;
        let mut cursor = Cursor::new(&self.data[start..]);
        let mut r = PortableReader::new(&mut cursor, self.order);

        let head = r.read_u8()?;
        let alive = head & ALIVE_BIT != 0;
        let code = head >> 2;
        let ftype = FeatureType::from_store_code(code).ok_or(Error::UnsupportedType(code))?;

        let mut cats = Vec::new();
        if head & CATS_BIT != 0 {
            let n = r.read_count()?;
            let fields = r.read_i32_vec(n)?;
            let values = r.read_i32_vec(n)?;
            cats = fields
                .into_iter()
                .zip(values)
                .map(|(field, cat)| Cat { field, cat })
                .collect();
        }

        let n = if ftype.is_point_like() {
            1
        } else {
            r.read_count()?
        };
        let xs = r.read_f64_vec(n)?;
        let ys = r.read_f64_vec(n)?;
        let zs = if self.with_z {
            r.read_f64_vec(n)?
        } else {
            vec![0.0; n]
        };
        let points = (0..n).map(|i| Point3::new(xs[i], ys[i], zs[i])).collect();

        let len = cursor.position() as usize;
        Ok((LineRecord { ftype, cats, points }, alive, len))
    }

    fn set_alive(&mut self, offset: u64, alive: bool) -> Result<()> {
        let head = usize::try_from(offset)
            .ok()
            .and_then(|i| self.data.get_mut(i))
            .ok_or_else(|| Error::Format(format!("offset {offset} is outside the store")))?;
        if alive {
            *head |= ALIVE_BIT;
        } else {
            *head &= !ALIVE_BIT;
        }
        Ok(())
    }
}

impl LineStore for CoorBuffer {
    fn append(&mut self, record: &LineRecord) -> Result<u64> {
        let bytes = self.encode(record)?;
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(&bytes);
        Ok(offset)
    }

    fn read(&self, offset: u64) -> Result<LineRecord> {
        self.decode(offset).map(|(record, _, _)| record)
    }

    fn is_alive(&self, offset: u64) -> Result<bool> {
        self.decode(offset).map(|(_, alive, _)| alive)
    }

    fn delete(&mut self, offset: u64) -> Result<()> {
        self.set_alive(offset, false)
    }

    fn restore(&mut self, offset: u64) -> Result<()> {
        self.set_alive(offset, true)
    }

    fn rewrite(&mut self, offset: u64, record: &LineRecord) -> Result<u64> {
        let (_, _, old_len) = self.decode(offset)?;
        let bytes = self.encode(record)?;
        if bytes.len() == old_len {
            let start = offset as usize;
            self.data[start..start + old_len].copy_from_slice(&bytes);
            return Ok(offset);
        }
        self.delete(offset)?;
        self.append(record)
    }

    fn scan(&self) -> Result<Vec<(u64, LineRecord)>> {
        let mut records = Vec::new();
        let mut offset = 0u64;
        while (offset as usize) < self.data.len() {
            let (record, alive, len) = self.decode(offset)?;
            if alive {
                records.push((offset, record));
            }
            offset += len as u64;
        }
        Ok(records)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pts(coords: &[(f64, f64)]) -> Vec<Point3<f64>> {
        coords.iter().map(|&(x, y)| Point3::new(x, y, 0.0)).collect()
    }

    #[test]
    fn append_and_read() {
        let mut store = CoorBuffer::new(ByteOrder::Little, false);
        let line = LineRecord::new(FeatureType::Boundary, pts(&[(0.0, 0.0), (1.0, 2.0)]))
            .with_cat(1, 42);
        let point = LineRecord::new(FeatureType::Centroid, pts(&[(0.5, 0.5)]));

        let a = store.append(&line).unwrap();
        let b = store.append(&point).unwrap();
        assert_eq!(a, 0);
        // head + cat count + field + cat + point count + 2 * 2 doubles
        assert_eq!(b, 1 + 4 + 4 + 4 + 4 + 32);

        let read = store.read(a).unwrap();
        assert_eq!(read, line);
        assert_relative_eq!(store.read(b).unwrap().points[0].x, 0.5);
        assert_eq!(store.size(), b + 1 + 16);
    }

    #[test]
    fn delete_hides_record_from_scan() {
        let mut store = CoorBuffer::new(ByteOrder::Big, true);
        let a = store
            .append(&LineRecord::new(FeatureType::Point, vec![Point3::new(1.0, 2.0, 3.0)]))
            .unwrap();
        let b = store
            .append(&LineRecord::new(FeatureType::Line, pts(&[(0.0, 0.0), (4.0, 4.0)])))
            .unwrap();

        store.delete(a).unwrap();
        assert!(!store.is_alive(a).unwrap());
        let live: Vec<u64> = store.scan().unwrap().into_iter().map(|(o, _)| o).collect();
        assert_eq!(live, vec![b]);

        store.restore(a).unwrap();
        assert_eq!(store.scan().unwrap().len(), 2);
        assert_relative_eq!(store.read(a).unwrap().points[0].z, 3.0);
    }

    #[test]
    fn rewrite_in_place_or_append() {
        let mut store = CoorBuffer::new(ByteOrder::Little, false);
        let a = store
            .append(&LineRecord::new(FeatureType::Line, pts(&[(0.0, 0.0), (1.0, 0.0)])))
            .unwrap();

        let same_shape = LineRecord::new(FeatureType::Boundary, pts(&[(0.0, 0.0), (2.0, 0.0)]));
        assert_eq!(store.rewrite(a, &same_shape).unwrap(), a);
        assert_eq!(store.read(a).unwrap(), same_shape);

        let longer = LineRecord::new(
            FeatureType::Boundary,
            pts(&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0)]),
        );
        let moved = store.rewrite(a, &longer).unwrap();
        assert_ne!(moved, a);
        assert!(!store.is_alive(a).unwrap());
        assert_eq!(store.read(moved).unwrap(), longer);
    }

    #[test]
    fn empty_geometry_is_rejected() {
        let mut store = CoorBuffer::new(ByteOrder::Little, false);
        let err = store
            .append(&LineRecord::new(FeatureType::Line, Vec::new()))
            .unwrap_err();
        assert!(matches!(err, Error::EmptyGeometry));
        assert!(store.read(0).is_err());
    }
}

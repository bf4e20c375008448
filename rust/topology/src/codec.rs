// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Portable primitive encoding for topology and coordinate data.
//!
//! Files record their byte order in the header, so the order is a runtime
//! value here rather than a type parameter. Offsets into the coordinate
//! store are written with 4 or 8 bytes depending on the store size.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Order of the running platform.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// Header tag: 0 little endian, 1 big endian.
    pub fn tag(self) -> u8 {
        match self {
            ByteOrder::Little => 0,
            ByteOrder::Big => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(ByteOrder::Little),
            1 => Ok(ByteOrder::Big),
            other => Err(Error::InvalidByteOrder(other)),
        }
    }

    /// Parses `little`, `big` or `native`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "little" | "le" => Some(ByteOrder::Little),
            "big" | "be" => Some(ByteOrder::Big),
            "native" => Some(ByteOrder::native()),
            _ => None,
        }
    }
}

/// Width of coordinate-store offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OffsetSize {
    Four,
    Eight,
}

impl OffsetSize {
    pub fn bytes(self) -> u8 {
        match self {
            OffsetSize::Four => 4,
            OffsetSize::Eight => 8,
        }
    }

    /// Smallest width able to address a store of `size` bytes.
    pub fn for_size(size: u64) -> Self {
        if size > i32::MAX as u64 {
            OffsetSize::Eight
        } else {
            OffsetSize::Four
        }
    }
}

macro_rules! read_ordered {
    ($self:ident, $method:ident) => {
        match $self.order {
            ByteOrder::Little => $self.inner.$method::<LittleEndian>(),
            ByteOrder::Big => $self.inner.$method::<BigEndian>(),
        }
        .map_err(Error::from_read)
    };
    ($self:ident, $method:ident, $dst:expr) => {
        match $self.order {
            ByteOrder::Little => $self.inner.$method::<LittleEndian>($dst),
            ByteOrder::Big => $self.inner.$method::<BigEndian>($dst),
        }
        .map_err(Error::from_read)
    };
}

macro_rules! write_ordered {
    ($self:ident, $method:ident, $value:expr) => {
        Ok(match $self.order {
            ByteOrder::Little => $self.inner.$method::<LittleEndian>($value),
            ByteOrder::Big => $self.inner.$method::<BigEndian>($value),
        }?)
    };
}

/// Largest number of values decoded per read from a count field.
const READ_CHUNK: usize = 4096;

/// Reads portable primitives from a byte stream.
#[derive(Debug)]
pub struct PortableReader<R> {
    inner: R,
    order: ByteOrder,
}

impl<R: Read> PortableReader<R> {
    pub fn new(inner: R, order: ByteOrder) -> Self {
        Self { inner, order }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn set_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.inner.read_u8().map_err(Error::from_read)
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(Error::from_read)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        read_ordered!(self, read_i32)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        read_ordered!(self, read_u32)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        read_ordered!(self, read_f32)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        read_ordered!(self, read_f64)
    }

    /// Reads a count field; negative values are malformed.
    pub fn read_count(&mut self) -> Result<usize> {
        let n = self.read_i32()?;
        usize::try_from(n).map_err(|_| Error::Format(format!("negative count {n}")))
    }

    pub fn read_i32_vec(&mut self, n: usize) -> Result<Vec<i32>> {
        self.read_chunked(n, |r, chunk| read_ordered!(r, read_i32_into, chunk))
    }

    pub fn read_f32_vec(&mut self, n: usize) -> Result<Vec<f32>> {
        self.read_chunked(n, |r, chunk| read_ordered!(r, read_f32_into, chunk))
    }

    pub fn read_f64_vec(&mut self, n: usize) -> Result<Vec<f64>> {
        self.read_chunked(n, |r, chunk| read_ordered!(r, read_f64_into, chunk))
    }

    /// Reads `n` values at most `READ_CHUNK` at a time, so a corrupt count
    /// fails with [`Error::Truncated`] once the data runs out instead of
    /// allocating for the whole count up front.
    fn read_chunked<T: Copy + Default>(
        &mut self,
        n: usize,
        mut fill: impl FnMut(&mut Self, &mut [T]) -> Result<()>,
    ) -> Result<Vec<T>> {
        let mut values = Vec::with_capacity(n.min(READ_CHUNK));
        while values.len() < n {
            let start = values.len();
            let len = (n - start).min(READ_CHUNK);
            values.resize(start + len, T::default());
            fill(self, &mut values[start..])?;
        }
        Ok(values)
    }

    /// Reads a coordinate-store offset of the given width.
    pub fn read_offset(&mut self, size: OffsetSize) -> Result<u64> {
        let raw = match size {
            OffsetSize::Four => i64::from(self.read_i32()?),
            OffsetSize::Eight => read_ordered!(self, read_i64)?,
        };
        u64::try_from(raw).map_err(|_| Error::Format(format!("negative offset {raw}")))
    }
}

impl<R: Read + Seek> PortableReader<R> {
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        Ok(self.inner.seek(SeekFrom::Start(pos))?)
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }
}

/// Writes portable primitives to a byte stream.
#[derive(Debug)]
pub struct PortableWriter<W> {
    inner: W,
    order: ByteOrder,
}

impl<W: Write> PortableWriter<W> {
    pub fn new(inner: W, order: ByteOrder) -> Self {
        Self { inner, order }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(self.inner.write_u8(value)?)
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        write_ordered!(self, write_i32, value)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        write_ordered!(self, write_u32, value)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        write_ordered!(self, write_f32, value)
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        write_ordered!(self, write_f64, value)
    }

    /// Writes a count field.
    pub fn write_count(&mut self, n: usize) -> Result<()> {
        let n = i32::try_from(n).map_err(|_| Error::Format(format!("count {n} exceeds i32")))?;
        self.write_i32(n)
    }

    pub fn write_i32_slice(&mut self, values: &[i32]) -> Result<()> {
        values.iter().try_for_each(|v| self.write_i32(*v))
    }

    pub fn write_f32_slice(&mut self, values: &[f32]) -> Result<()> {
        values.iter().try_for_each(|v| self.write_f32(*v))
    }

    pub fn write_f64_slice(&mut self, values: &[f64]) -> Result<()> {
        values.iter().try_for_each(|v| self.write_f64(*v))
    }

    /// Writes a coordinate-store offset, failing if it does not fit.
    pub fn write_offset(&mut self, offset: u64, size: OffsetSize) -> Result<()> {
        match size {
            OffsetSize::Four => {
                let v = i32::try_from(offset).map_err(|_| Error::OffsetOverflow {
                    offset,
                    width: size.bytes(),
                })?;
                self.write_i32(v)
            }
            OffsetSize::Eight => {
                let v = i64::try_from(offset).map_err(|_| Error::OffsetOverflow {
                    offset,
                    width: size.bytes(),
                })?;
                write_ordered!(self, write_i64, v)
            }
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.inner.flush()?)
    }
}

impl<W: Write + Seek> PortableWriter<W> {
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.inner.seek(pos)?)
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }
}

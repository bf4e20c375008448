// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Identifier and handle types for the topology graph.
//!
//! Every record gets a 1-based `u32` id. Ids are stable for the lifetime of a
//! session: deleting a record leaves a tombstone in its slot and the id is
//! never handed out again until a full rebuild. Id 0 is reserved for "none"
//! in the persisted format and never identifies a live record.

use std::fmt;
use std::ops::{BitOr, Neg};

use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Returns the raw 1-based id.
            pub fn get(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Id of a node (a junction of line endpoints).
    NodeId
);
record_id!(
    /// Id of a line-like feature (point, line, boundary or centroid).
    LineId
);
record_id!(
    /// Id of an area (a clockwise ring of boundaries).
    AreaId
);
record_id!(
    /// Id of an isle (a counter-clockwise ring of boundaries).
    IsleId
);

/// A line traversed in a given direction.
///
/// Positive: the line is followed from its first to its last point and, when
/// stored at a node, starts there. Negative: the line is followed backwards
/// and, when stored at a node, ends there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct LineRef(i32);

impl LineRef {
    /// Forward reference to `line`.
    pub fn forward(line: LineId) -> Self {
        LineRef(line.0 as i32)
    }

    /// Backward reference to `line`.
    pub fn backward(line: LineId) -> Self {
        LineRef(-(line.0 as i32))
    }

    /// Wraps a raw signed id. 0 and `i32::MIN` (which has no negation) are
    /// not valid references.
    pub fn from_raw(raw: i32) -> Option<Self> {
        (raw != 0 && raw != i32::MIN).then_some(LineRef(raw))
    }

    /// Signed raw value as persisted.
    pub fn raw(self) -> i32 {
        self.0
    }

    /// The referenced line, regardless of direction.
    pub fn line(self) -> LineId {
        LineId(self.0.unsigned_abs())
    }

    pub fn is_forward(self) -> bool {
        self.0 > 0
    }

    /// The same line traversed in the opposite direction.
    pub fn reversed(self) -> Self {
        LineRef(-self.0)
    }
}

impl TryFrom<i32> for LineRef {
    type Error = crate::error::Error;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        LineRef::from_raw(raw)
            .ok_or_else(|| crate::error::Error::Format(format!("invalid line reference {raw}")))
    }
}

impl From<LineRef> for i32 {
    fn from(r: LineRef) -> i32 {
        r.0
    }
}

impl Neg for LineRef {
    type Output = LineRef;

    fn neg(self) -> LineRef {
        self.reversed()
    }
}

impl fmt::Display for LineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Side of a directed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one side of a boundary references.
///
/// Persisted as 0 (none), a positive area id or a negated isle id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Face {
    #[default]
    None,
    Area(AreaId),
    Isle(IsleId),
}

impl Face {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Face::None,
            r if r > 0 => Face::Area(AreaId(r as u32)),
            r => Face::Isle(IsleId(r.unsigned_abs())),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            Face::None => 0,
            Face::Area(a) => a.0 as i32,
            Face::Isle(i) => -(i.0 as i32),
        }
    }

    pub fn is_none(self) -> bool {
        self == Face::None
    }
}

/// Link from a centroid to the area it labels.
///
/// Persisted as 0 (outside any area), a positive area id (the registered
/// centroid of that area) or a negated area id (inside an area that already
/// has a centroid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CentroidArea {
    #[default]
    Outside,
    Inside(AreaId),
    Duplicate(AreaId),
}

impl CentroidArea {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => CentroidArea::Outside,
            r if r > 0 => CentroidArea::Inside(AreaId(r as u32)),
            r => CentroidArea::Duplicate(AreaId(r.unsigned_abs())),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            CentroidArea::Outside => 0,
            CentroidArea::Inside(a) => a.0 as i32,
            CentroidArea::Duplicate(a) => -(a.0 as i32),
        }
    }
}

/// Geometry type of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureType {
    Point,
    Line,
    Boundary,
    Centroid,
}

impl FeatureType {
    /// Type code used in the coordinate and topology files.
    pub fn store_code(self) -> u8 {
        match self {
            FeatureType::Point => 1,
            FeatureType::Line => 2,
            FeatureType::Boundary => 3,
            FeatureType::Centroid => 4,
        }
    }

    /// Inverse of [`FeatureType::store_code`]. Face and kernel codes (5, 6)
    /// and unknown codes return `None`.
    pub fn from_store_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(FeatureType::Point),
            2 => Some(FeatureType::Line),
            3 => Some(FeatureType::Boundary),
            4 => Some(FeatureType::Centroid),
            _ => None,
        }
    }

    /// Points and centroids are stored as a single coordinate and never
    /// take part in node topology.
    pub fn is_point_like(self) -> bool {
        matches!(self, FeatureType::Point | FeatureType::Centroid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::Point => "point",
            FeatureType::Line => "line",
            FeatureType::Boundary => "boundary",
            FeatureType::Centroid => "centroid",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of [`FeatureType`]s used to filter traversals and selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeMask(u8);

impl TypeMask {
    pub const NONE: TypeMask = TypeMask(0);
    pub const POINT: TypeMask = TypeMask(0x01);
    pub const LINE: TypeMask = TypeMask(0x02);
    pub const BOUNDARY: TypeMask = TypeMask(0x04);
    pub const CENTROID: TypeMask = TypeMask(0x08);
    /// Types that are registered at nodes.
    pub const LINES: TypeMask = TypeMask(0x02 | 0x04);
    pub const POINTS: TypeMask = TypeMask(0x01 | 0x08);
    pub const ALL: TypeMask = TypeMask(0x0f);

    pub fn contains(self, ftype: FeatureType) -> bool {
        self.0 & TypeMask::from(ftype).0 != 0
    }
}

impl From<FeatureType> for TypeMask {
    fn from(ftype: FeatureType) -> Self {
        match ftype {
            FeatureType::Point => TypeMask::POINT,
            FeatureType::Line => TypeMask::LINE,
            FeatureType::Boundary => TypeMask::BOUNDARY,
            FeatureType::Centroid => TypeMask::CENTROID,
        }
    }
}

impl BitOr for TypeMask {
    type Output = TypeMask;

    fn bitor(self, rhs: TypeMask) -> TypeMask {
        TypeMask(self.0 | rhs.0)
    }
}

/// Kind of record, used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Node,
    Line,
    Area,
    Isle,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Node => "node",
            RecordKind::Line => "line",
            RecordKind::Area => "area",
            RecordKind::Isle => "isle",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

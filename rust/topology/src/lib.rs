// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Planar Topology
//!
//! Incremental planar topology for digitized vector features.
//!
//! Lines and boundaries are written to a coordinate store; this crate keeps
//! the derived structure in step with them: nodes where line ends meet,
//! areas enclosed by clockwise rings of boundaries, isles formed by the
//! counter-clockwise outer side of each connected group of areas, and the
//! nesting of isles and centroids inside areas.
//!
//! Records live in a [`TopoGraph`] arena addressed by 1-based ids. A [`Map`]
//! session ties the graph to a [`LineStore`], a [`SpatialIndex`] and an
//! optional [`CategoryIndex`], and updates only the faces a mutation
//! touches. The graph is persisted in a versioned, byte-order aware binary
//! format with 4- or 8-byte store offsets.
//!
//! ```
//! use nalgebra::Point3;
//! use planar_topo::{ByteOrder, Config, CoorBuffer, FeatureType, LineRecord, Map};
//!
//! let config = Config::default().with_byte_order(ByteOrder::Little);
//! let mut map = Map::new(CoorBuffer::new(ByteOrder::Little, false), config);
//! let ring = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 0.0, 0.0),
//! ];
//! map.write_line(&LineRecord::new(FeatureType::Boundary, ring)).unwrap();
//! map.build().unwrap();
//! assert_eq!(map.graph().area_count(), 1);
//! ```

pub mod adjacency;
pub mod arena;
pub mod builder;
pub mod cidx;
pub mod codec;
pub mod config;
pub mod construction;
pub mod dump;
pub mod error;
pub mod format;
pub mod geometry;
pub mod keys;
pub mod maintain;
pub mod map;
pub mod query;
pub mod serialization;
pub mod spatial;
pub mod store;

pub use arena::{Area, Isle, Line, LineTopo, Node, NodeLink, TopoGraph, UpdateLog};
pub use builder::{RingOutcome, RingScratch};
pub use cidx::{CatKind, CategoryIndex, MemoryCatIndex};
pub use codec::{ByteOrder, OffsetSize};
pub use config::{BuildLevel, Config};
pub use error::{Error, Result};
pub use format::{TopoHeader, Version, TOPO_VERSION};
pub use geometry::{BoundBox, Containment};
pub use keys::{
    AreaId, CentroidArea, Face, FeatureType, IsleId, LineId, LineRef, NodeId, RecordKind, Side,
    TypeMask,
};
pub use maintain::{SideOutcome, UpdateReport};
pub use map::{BuildStats, LineUpdate, Map};
pub use spatial::{BoxIndex, SpatialIndex};
pub use store::{Cat, CoorBuffer, LineRecord, LineStore};

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Map session configuration loaded from environment variables.

use serde::{Deserialize, Serialize};

use crate::codec::ByteOrder;

/// How far topology construction has progressed.
///
/// Levels are cumulative: each one includes everything below it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum BuildLevel {
    /// Nothing built; features only live in the coordinate store.
    #[default]
    None,
    /// Nodes and lines.
    Base,
    /// Areas and isles.
    Areas,
    /// Isles attached to their enclosing areas.
    AttachIsles,
    /// Centroids attached to areas.
    Centroids,
}

impl BuildLevel {
    /// Complete topology.
    pub const ALL: BuildLevel = BuildLevel::Centroids;

    /// Parses the names accepted by `PLANAR_TOPO_BUILD_LEVEL`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(BuildLevel::None),
            "base" => Some(BuildLevel::Base),
            "areas" => Some(BuildLevel::Areas),
            "isles" | "attach_isles" => Some(BuildLevel::AttachIsles),
            "centroids" | "all" => Some(BuildLevel::Centroids),
            _ => None,
        }
    }
}

/// Map session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Level maintained by incremental updates and reached by full builds.
    pub build_level: BuildLevel,
    /// Whether features carry a meaningful z coordinate.
    pub with_z: bool,
    /// Byte order used when writing coordinate and topology data.
    pub byte_order: ByteOrder,
    /// Cell size of the node lookup grid.
    pub node_grid_cell: f64,
    /// Record ids of lines and nodes touched by each mutation.
    pub track_updates: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            build_level: std::env::var("PLANAR_TOPO_BUILD_LEVEL")
                .ok()
                .and_then(|v| BuildLevel::parse(&v))
                .unwrap_or(BuildLevel::ALL),
            with_z: std::env::var("PLANAR_TOPO_WITH_Z")
                .unwrap_or_else(|_| "false".into())
                .parse()
                .unwrap_or(false),
            byte_order: std::env::var("PLANAR_TOPO_BYTE_ORDER")
                .ok()
                .and_then(|v| ByteOrder::parse(&v))
                .unwrap_or_else(ByteOrder::native),
            node_grid_cell: parse_cell_size(std::env::var("PLANAR_TOPO_NODE_GRID").ok()),
            track_updates: std::env::var("PLANAR_TOPO_TRACK_UPDATES")
                .unwrap_or_else(|_| "false".into())
                .parse()
                .unwrap_or(false),
        }
    }

    pub fn with_build_level(mut self, level: BuildLevel) -> Self {
        self.build_level = level;
        self
    }

    pub fn with_z(mut self, with_z: bool) -> Self {
        self.with_z = with_z;
        self
    }

    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    pub fn with_update_tracking(mut self, track: bool) -> Self {
        self.track_updates = track;
        self
    }
}

/// Node grid cell size from its environment value. Missing, unparsable,
/// non-finite and non-positive values give the default of 1.
fn parse_cell_size(value: Option<String>) -> f64 {
    let Some(value) = value else {
        return 1.0;
    };
    match value.trim().parse::<f64>() {
        Ok(size) if size > 0.0 && size.is_finite() => size,
        _ => {
            tracing::warn!(value = %value, "invalid PLANAR_TOPO_NODE_GRID, using 1.0");
            1.0
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_levels_are_ordered() {
        assert!(BuildLevel::None < BuildLevel::Base);
        assert!(BuildLevel::Areas < BuildLevel::AttachIsles);
        assert_eq!(BuildLevel::ALL, BuildLevel::Centroids);
    }

    #[test]
    fn node_grid_cell_must_be_positive() {
        assert_eq!(parse_cell_size(None), 1.0);
        assert_eq!(parse_cell_size(Some(" 0.25 ".into())), 0.25);
        for bad in ["0", "-2", "NaN", "inf", "wide"] {
            assert_eq!(parse_cell_size(Some(bad.into())), 1.0, "{bad}");
        }
    }

    #[test]
    fn build_level_names() {
        assert_eq!(BuildLevel::parse("Areas"), Some(BuildLevel::Areas));
        assert_eq!(BuildLevel::parse(" all "), Some(BuildLevel::Centroids));
        assert_eq!(BuildLevel::parse("isles"), Some(BuildLevel::AttachIsles));
        assert_eq!(BuildLevel::parse("everything"), None);
    }

    #[test]
    fn builder_overrides() {
        let config = Config::from_env()
            .with_build_level(BuildLevel::Base)
            .with_z(true)
            .with_byte_order(ByteOrder::Big)
            .with_update_tracking(true);
        assert_eq!(config.build_level, BuildLevel::Base);
        assert!(config.with_z);
        assert_eq!(config.byte_order, ByteOrder::Big);
        assert!(config.track_updates);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Map session: a coordinate store, its topology and the indexes kept in
//! step with both.
//!
//! Every mutation goes through [`Map`]: the feature is written to the
//! store first and its topology is then updated incrementally, as far as
//! the session's build level reaches.

use std::fmt;
use std::io::{Read, Seek, Write};

use nalgebra::{Point2, Point3};

use crate::arena::{LineTopo, TopoGraph};
use crate::builder::RingScratch;
use crate::cidx::{CatKind, CategoryIndex};
use crate::config::{BuildLevel, Config};
use crate::error::{Error, Result};
use crate::geometry::{label_point, planar_length, ring_area_cw, BoundBox};
use crate::keys::*;
use crate::maintain::{SideOutcome, UpdateReport};
use crate::spatial::{BoxIndex, SpatialIndex};
use crate::store::{LineRecord, LineStore};

/// Outcome of writing a feature.
#[derive(Debug, Clone, PartialEq)]
pub struct LineUpdate {
    /// Offset of the record in the coordinate store.
    pub offset: u64,
    /// Topology id, when the session is built to at least the base level.
    pub line: Option<LineId>,
    pub report: UpdateReport,
}

/// Summary of a full or partial build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub nodes: usize,
    pub lines: usize,
    pub areas: usize,
    pub isles: usize,
    /// Boundary sides skipped because of an angle tie.
    pub ambiguous: usize,
    /// Rings that enclose no area.
    pub zero_size: usize,
}

/// An open map.
pub struct Map<S: LineStore, I: SpatialIndex = BoxIndex> {
    pub(crate) graph: TopoGraph,
    pub(crate) store: S,
    pub(crate) index: I,
    pub(crate) cidx: Option<Box<dyn CategoryIndex>>,
    pub(crate) scratch: RingScratch,
    pub(crate) config: Config,
}

impl<S: LineStore, I: SpatialIndex> fmt::Debug for Map<S, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("built", &self.graph.built)
            .field("nodes", &self.graph.node_count())
            .field("lines", &self.graph.line_count())
            .field("areas", &self.graph.area_count())
            .field("isles", &self.graph.isle_count())
            .field("store_size", &self.store.size())
            .finish_non_exhaustive()
    }
}

impl<S: LineStore> Map<S, BoxIndex> {
    /// Opens a session over `store` with the default spatial index.
    ///
    /// An empty store is treated as built to the configured level, so
    /// features written afterwards are maintained incrementally. Otherwise
    /// call [`Map::build`] before relying on topology.
    pub fn new(store: S, config: Config) -> Self {
        let index = BoxIndex::new(config.node_grid_cell, config.with_z);
        Self::with_index(store, index, config)
    }

    /// Opens a session over `store` with topology read from `topo`.
    ///
    /// The session is open for writing: the spatial index is rebuilt from
    /// the restored graph and every mutator maintains topology
    /// incrementally. Save with [`Map::save_topo`] to persist the edits.
    pub fn open<R: Read + Seek>(store: S, topo: &mut R, config: Config) -> Result<Self> {
        let index = BoxIndex::new(config.node_grid_cell, config.with_z);
        Self::open_with_index(store, index, topo, config)
    }
}

impl<S: LineStore, I: SpatialIndex> Map<S, I> {
    pub fn with_index(store: S, index: I, config: Config) -> Self {
        let mut graph = TopoGraph::new(config.with_z);
        graph.updates.enabled = config.track_updates;
        if store.size() == 0 {
            graph.built = config.build_level;
        }
        Self {
            graph,
            store,
            index,
            cidx: None,
            scratch: RingScratch::new(),
            config,
        }
    }

    /// Opens a session with persisted topology and a caller-supplied index.
    ///
    /// The topology must describe the store as it is: a size mismatch means
    /// features were written without updating the topology file. The
    /// returned session is writable like one from [`Map::open`].
    pub fn open_with_index<R: Read + Seek>(
        store: S,
        index: I,
        topo: &mut R,
        config: Config,
    ) -> Result<Self> {
        let mut graph = TopoGraph::read_topo(topo)?;
        if graph.coor_size != store.size() {
            return Err(Error::Format(format!(
                "coordinate store is {} bytes but topology was built for {} bytes; rebuild topology",
                store.size(),
                graph.coor_size
            )));
        }
        if graph.with_z != config.with_z {
            tracing::warn!(
                file = graph.with_z,
                config = config.with_z,
                "dimension in topology file differs from configuration, using the file's"
            );
        }
        graph.updates.enabled = config.track_updates;

        let mut map = Self {
            graph,
            store,
            index,
            cidx: None,
            scratch: RingScratch::new(),
            config,
        };
        map.rebuild_index()?;
        tracing::info!(
            nodes = map.graph.node_count(),
            lines = map.graph.line_count(),
            areas = map.graph.area_count(),
            isles = map.graph.isle_count(),
            "topology opened"
        );
        Ok(map)
    }

    /// Installs a category index and fills it from the current topology.
    pub fn set_category_index(&mut self, mut cidx: Box<dyn CategoryIndex>) -> Result<()> {
        cidx.clear();
        self.cidx = Some(cidx);
        self.fill_category_index()
    }

    pub fn take_category_index(&mut self) -> Option<Box<dyn CategoryIndex>> {
        self.cidx.take()
    }

    fn fill_category_index(&mut self) -> Result<()> {
        let Some(mut cidx) = self.cidx.take() else {
            return Ok(());
        };
        for (id, line) in self.graph.lines() {
            let record = self.store.read(line.offset)?;
            for c in &record.cats {
                cidx.add_cat(c.field, c.cat, id.0, CatKind::Feature(record.ftype));
            }
        }
        for (id, area) in self.graph.areas() {
            if let Some(centroid) = area.centroid {
                let record = self.read_line(centroid)?;
                for c in &record.cats {
                    cidx.add_cat(c.field, c.cat, id.0, CatKind::Area);
                }
            }
        }
        self.cidx = Some(cidx);
        Ok(())
    }

    // --- Accessors ---

    pub fn graph(&self) -> &TopoGraph {
        &self.graph
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn built(&self) -> BuildLevel {
        self.graph.built
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Lines touched since the last [`Map::reset_updates`].
    pub fn updated_lines(&self) -> &[LineId] {
        self.graph.updates.lines()
    }

    /// Nodes touched since the last [`Map::reset_updates`].
    pub fn updated_nodes(&self) -> &[NodeId] {
        self.graph.updates.nodes()
    }

    pub fn reset_updates(&mut self) {
        self.graph.updates.reset();
    }

    /// Stored record of a registered line.
    pub fn read_line(&self, line: LineId) -> Result<LineRecord> {
        self.store.read(self.graph.line_or_err(line)?.offset)
    }

    // --- Mutations ---

    /// Appends a feature and updates topology.
    pub fn write_line(&mut self, record: &LineRecord) -> Result<LineUpdate> {
        let offset = self.store.append(record)?;
        self.register(offset, record)
    }

    fn register(&mut self, offset: u64, record: &LineRecord) -> Result<LineUpdate> {
        self.graph.coor_size = self.store.size();
        if self.graph.built < BuildLevel::Base {
            return Ok(LineUpdate {
                offset,
                line: None,
                report: UpdateReport::default(),
            });
        }
        let line = self
            .graph
            .add_line(&mut self.index, record.ftype, &record.points, offset)?;
        let report = self.on_boundary_added(line)?;
        if report.is_ambiguous() {
            tracing::warn!(line = %line, sides = report.ambiguous.len(), "ambiguous boundary sides left unbuilt");
        }
        Ok(LineUpdate {
            offset,
            line: Some(line),
            report,
        })
    }

    /// Deletes a feature from the store and the topology.
    pub fn delete_line(&mut self, line: LineId) -> Result<UpdateReport> {
        let offset = self.graph.line_or_err(line)?.offset;
        if !self.store.is_alive(offset)? {
            return Err(Error::Consistency(format!(
                "line {line} points at a deleted record"
            )));
        }
        self.store.delete(offset)?;
        self.on_boundary_removed(line)
    }

    /// Replaces a feature's geometry, type or categories.
    ///
    /// The feature is removed from topology and registered again, so it
    /// gets a new id.
    pub fn rewrite_line(&mut self, line: LineId, record: &LineRecord) -> Result<LineUpdate> {
        let old = self.graph.line_or_err(line)?.offset;
        let mut report = self.on_boundary_removed(line)?;
        let offset = self.store.rewrite(old, record)?;
        let mut update = self.register(offset, record)?;
        report.merge(update.report);
        update.report = report;
        Ok(update)
    }

    /// Brings a deleted record back and registers it under a new id.
    pub fn restore_line(&mut self, offset: u64) -> Result<LineUpdate> {
        if self.store.is_alive(offset)? {
            return Err(Error::Consistency(format!(
                "record at offset {offset} is not deleted"
            )));
        }
        self.store.restore(offset)?;
        let record = self.store.read(offset)?;
        self.register(offset, &record)
    }

    // --- Building ---

    /// Discards topology and builds it from the store up to the configured
    /// level.
    pub fn build(&mut self) -> Result<BuildStats> {
        self.build_partial(BuildLevel::None)?;
        self.build_partial(self.config.build_level)
    }

    /// Raises or lowers the build level.
    ///
    /// Lowering drops exactly the structures above `level`; raising builds
    /// the missing ones from what is already there.
    pub fn build_partial(&mut self, level: BuildLevel) -> Result<BuildStats> {
        if level < self.graph.built {
            self.downgrade(level)?;
        }
        let mut stats = BuildStats::default();

        if self.graph.built < BuildLevel::Base && level >= BuildLevel::Base {
            self.graph.clear();
            self.index.clear();
            if let Some(cidx) = self.cidx.as_mut() {
                cidx.clear();
            }
            for (offset, record) in self.store.scan()? {
                let line = self
                    .graph
                    .add_line(&mut self.index, record.ftype, &record.points, offset)?;
                self.index_line_cats(line, record.ftype, &record.cats, true);
            }
            self.graph.coor_size = self.store.size();
            self.graph.built = BuildLevel::Base;
        }

        if self.graph.built < BuildLevel::Areas && level >= BuildLevel::Areas {
            let boundaries: Vec<LineId> = self
                .graph
                .lines()
                .filter(|(_, l)| l.feature_type() == FeatureType::Boundary)
                .map(|(id, _)| id)
                .collect();
            for line in boundaries {
                for side in [Side::Left, Side::Right] {
                    match self.build_line_area(line, side)? {
                        SideOutcome::Ambiguous => stats.ambiguous += 1,
                        SideOutcome::ZeroSize => stats.zero_size += 1,
                        _ => {}
                    }
                }
            }
            self.graph.built = BuildLevel::Areas;
        }

        if self.graph.built < BuildLevel::AttachIsles && level >= BuildLevel::AttachIsles {
            let isles: Vec<IsleId> = self.graph.isles().map(|(id, _)| id).collect();
            for isle in isles {
                self.attach_isle(isle)?;
            }
            self.graph.built = BuildLevel::AttachIsles;
        }

        if self.graph.built < BuildLevel::Centroids && level >= BuildLevel::Centroids {
            let centroids: Vec<LineId> = self
                .graph
                .lines()
                .filter(|(_, l)| l.feature_type() == FeatureType::Centroid)
                .map(|(id, _)| id)
                .collect();
            for line in centroids {
                self.attach_centroid(line)?;
            }
            self.graph.built = BuildLevel::Centroids;
        }

        stats.nodes = self.graph.node_count();
        stats.lines = self.graph.line_count();
        stats.areas = self.graph.area_count();
        stats.isles = self.graph.isle_count();
        tracing::info!(
            level = ?self.graph.built,
            nodes = stats.nodes,
            lines = stats.lines,
            areas = stats.areas,
            isles = stats.isles,
            ambiguous = stats.ambiguous,
            "topology built"
        );
        Ok(stats)
    }

    fn downgrade(&mut self, level: BuildLevel) -> Result<()> {
        if level < BuildLevel::Centroids && self.graph.built >= BuildLevel::Centroids {
            let centroids: Vec<(LineId, CentroidArea)> = self
                .graph
                .lines()
                .filter_map(|(id, l)| l.centroid_area().map(|a| (id, a)))
                .collect();
            for (line, link) in centroids {
                if let CentroidArea::Inside(area) = link {
                    if self.graph.area(area).is_some_and(|a| a.centroid == Some(line)) {
                        self.index_area_cats(area, line, false)?;
                        self.graph.area_mut(area)?.centroid = None;
                    }
                }
                self.graph.set_centroid_area(line, CentroidArea::Outside)?;
            }
            self.graph.built = BuildLevel::AttachIsles;
        }

        if level < BuildLevel::AttachIsles && self.graph.built >= BuildLevel::AttachIsles {
            let isles: Vec<IsleId> = self.graph.isles().map(|(id, _)| id).collect();
            for isle in isles {
                self.graph.isle_mut(isle)?.area = None;
            }
            let areas: Vec<AreaId> = self.graph.areas().map(|(id, _)| id).collect();
            for area in areas {
                self.graph.area_mut(area)?.isles.clear();
            }
            self.graph.built = BuildLevel::Areas;
        }

        if level < BuildLevel::Areas && self.graph.built >= BuildLevel::Areas {
            let areas: Vec<AreaId> = self.graph.areas().map(|(id, _)| id).collect();
            for area in areas {
                self.graph.teardown_area(&mut self.index, area)?;
            }
            let isles: Vec<IsleId> = self.graph.isles().map(|(id, _)| id).collect();
            for isle in isles {
                self.graph.teardown_isle(&mut self.index, isle)?;
            }
            // Ids restart from 1 on the next build.
            self.graph.areas.clear();
            self.graph.isles.clear();
            self.graph.built = BuildLevel::Base;
        }

        if level < BuildLevel::Base && self.graph.built >= BuildLevel::Base {
            self.graph.clear();
            self.index.clear();
            if let Some(cidx) = self.cidx.as_mut() {
                cidx.clear();
            }
        }
        tracing::debug!(level = ?self.graph.built, "topology downgraded");
        Ok(())
    }

    // --- Persistence ---

    /// Writes the topology file for the current store.
    pub fn save_topo<W: Write + Seek>(&self, stream: &mut W) -> Result<()> {
        if self.graph.built < BuildLevel::ALL {
            tracing::warn!(level = ?self.graph.built, "saving topology that is not fully built");
        }
        self.graph.write_topo(stream, self.config.byte_order)
    }

    /// Recomputes area and isle boxes from the store and fills the spatial
    /// index from the topology.
    fn rebuild_index(&mut self) -> Result<()> {
        self.index.clear();
        for (id, node) in self.graph.nodes() {
            self.index.add_node(id, &node.position);
        }

        let lines: Vec<(LineId, u64, FeatureType)> = self
            .graph
            .lines()
            .map(|(id, l)| (id, l.offset, l.feature_type()))
            .collect();
        for (id, offset, ftype) in lines {
            let bbox = self.store.read(offset)?.bbox();
            self.index.add_line(id, ftype, &bbox);
        }

        let areas: Vec<AreaId> = self.graph.areas().map(|(id, _)| id).collect();
        for id in areas {
            let points = self.ring_points(&self.graph.area_or_err(id)?.lines)?;
            let bbox = BoundBox::from_points(&points);
            self.graph.area_mut(id)?.bbox = bbox;
            self.index.add_area(id, &bbox);
        }

        let isles: Vec<IsleId> = self.graph.isles().map(|(id, _)| id).collect();
        for id in isles {
            let points = self.ring_points(&self.graph.isle_or_err(id)?.lines)?;
            let bbox = BoundBox::from_points(&points);
            self.graph.isle_mut(id)?.bbox = bbox;
            self.index.add_isle(id, &bbox);
        }
        Ok(())
    }

    // --- Geometry ---

    /// Closed outer ring of an area.
    pub fn area_points(&self, area: AreaId) -> Result<Vec<Point3<f64>>> {
        self.ring_points(&self.graph.area_or_err(area)?.lines)
    }

    /// Closed ring of an isle.
    pub fn isle_points(&self, isle: IsleId) -> Result<Vec<Point3<f64>>> {
        self.ring_points(&self.graph.isle_or_err(isle)?.lines)
    }

    /// Rings of the isles nested in an area.
    pub fn area_holes(&self, area: AreaId) -> Result<Vec<Vec<Point3<f64>>>> {
        self.graph
            .area_or_err(area)?
            .isles
            .iter()
            .map(|isle| self.isle_points(*isle))
            .collect()
    }

    /// Area enclosed by the outer ring minus the nested isles.
    pub fn area_size(&self, area: AreaId) -> Result<f64> {
        let outer = ring_area_cw(&self.area_points(area)?);
        let holes: f64 = self
            .area_holes(area)?
            .iter()
            .map(|ring| ring_area_cw(ring).abs())
            .sum();
        Ok(outer - holes)
    }

    /// Perimeter of an area's outer ring.
    pub fn area_perimeter(&self, area: AreaId) -> Result<f64> {
        Ok(planar_length(&self.area_points(area)?))
    }

    /// A point strictly inside an area, suitable for placing a centroid.
    pub fn label_point(&self, area: AreaId) -> Result<Option<Point2<f64>>> {
        let outer = self.area_points(area)?;
        let holes = self.area_holes(area)?;
        Ok(label_point(&outer, &holes))
    }

    /// Planar length of a line.
    pub fn line_length(&self, line: LineId) -> Result<f64> {
        Ok(planar_length(&self.read_line(line)?.points))
    }

    /// Writes a centroid at the label point of every area without one.
    pub fn add_missing_centroids(&mut self) -> Result<Vec<LineId>> {
        let missing: Vec<AreaId> = self
            .graph
            .areas()
            .filter(|(_, a)| a.centroid.is_none())
            .map(|(id, _)| id)
            .collect();
        let mut added = Vec::new();
        for area in missing {
            let Some(p) = self.label_point(area)? else {
                tracing::warn!(area = %area, "no label point");
                continue;
            };
            let record = LineRecord::new(FeatureType::Centroid, vec![Point3::new(p.x, p.y, 0.0)]);
            if let Some(line) = self.write_line(&record)?.line {
                added.push(line);
            }
        }
        Ok(added)
    }

    /// Whether the line is a boundary with at least one side unbuilt.
    pub fn has_open_side(&self, line: LineId) -> Result<bool> {
        Ok(match self.graph.line_or_err(line)?.topo {
            LineTopo::Boundary { left, right, .. } => left.is_none() || right.is_none(),
            _ => false,
        })
    }
}

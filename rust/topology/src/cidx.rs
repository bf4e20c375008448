// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Category index: the link between features and attribute records.
//!
//! The map session reports each feature's categories when the feature is
//! written or deleted, and an area's categories (those of its centroid) when
//! the centroid is attached to or detached from the area.

use rustc_hash::FxHashMap;

use crate::keys::FeatureType;

/// What a category entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatKind {
    Feature(FeatureType),
    Area,
}

/// Category index collaborator.
pub trait CategoryIndex {
    fn add_cat(&mut self, field: i32, cat: i32, id: u32, kind: CatKind);
    fn del_cat(&mut self, field: i32, cat: i32, id: u32, kind: CatKind);
    fn clear(&mut self);
}

/// In-memory category index.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatIndex {
    entries: FxHashMap<(i32, i32), Vec<(CatKind, u32)>>,
}

impl MemoryCatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of the given kind carrying category `cat` in `field`, ascending.
    pub fn find(&self, field: i32, cat: i32, kind: CatKind) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .entries
            .get(&(field, cat))
            .map(|v| v.iter().filter(|(k, _)| *k == kind).map(|(_, id)| *id).collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Number of (category, record) pairs.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CategoryIndex for MemoryCatIndex {
    fn add_cat(&mut self, field: i32, cat: i32, id: u32, kind: CatKind) {
        let ids = self.entries.entry((field, cat)).or_default();
        if !ids.contains(&(kind, id)) {
            ids.push((kind, id));
        }
    }

    fn del_cat(&mut self, field: i32, cat: i32, id: u32, kind: CatKind) {
        if let Some(ids) = self.entries.get_mut(&(field, cat)) {
            ids.retain(|e| *e != (kind, id));
            if ids.is_empty() {
                self.entries.remove(&(field, cat));
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

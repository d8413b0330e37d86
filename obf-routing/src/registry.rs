//! Process-wide numbering of `(tag, value)` pairs
//!
//! Sections number their rules locally; profiles are written against
//! universal ids handed out here. Ids are dense, start at 0 and are never
//! reused or renumbered, so callers may cache them for as long as the
//! registry lives.

use parking_lot::RwLock;
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;

pub type UniversalRuleId = u32;

/// A set of universal rule ids.
pub type TypeSet = RoaringBitmap;

#[derive(Debug, Default)]
struct TagEntry {
    values: FxHashMap<String, UniversalRuleId>,
    mask: RoaringBitmap,
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_tag: FxHashMap<String, TagEntry>,
    rules: Vec<(String, String)>,
}

/// Shared between profiles and contexts behind an `Arc`.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    inner: RwLock<RegistryInner>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `(tag, value)`, registering the pair on first sight.
    pub fn register_or_get(&self, tag: &str, value: &str) -> UniversalRuleId {
        if let Some(id) = self.get(tag, value) {
            return id;
        }

        let mut inner = self.inner.write();
        // another writer may have won the race
        if let Some(id) = inner
            .by_tag
            .get(tag)
            .and_then(|entry| entry.values.get(value))
        {
            return *id;
        }

        let id = inner.rules.len() as UniversalRuleId;
        inner.rules.push((tag.to_string(), value.to_string()));
        let entry = inner.by_tag.entry(tag.to_string()).or_default();
        entry.values.insert(value.to_string(), id);
        entry.mask.insert(id);
        tracing::trace!(tag, value, id, "registered universal rule");
        id
    }

    pub fn get(&self, tag: &str, value: &str) -> Option<UniversalRuleId> {
        self.inner
            .read()
            .by_tag
            .get(tag)
            .and_then(|entry| entry.values.get(value))
            .copied()
    }

    /// All ids registered under `tag`, whatever their value.
    pub fn tag_mask(&self, tag: &str) -> TypeSet {
        self.inner
            .read()
            .by_tag
            .get(tag)
            .map(|entry| entry.mask.clone())
            .unwrap_or_default()
    }

    /// True when `types` carries any value of `tag`.
    pub fn has_tag(&self, tag: &str, types: &TypeSet) -> bool {
        self.inner
            .read()
            .by_tag
            .get(tag)
            .is_some_and(|entry| !entry.mask.is_disjoint(types))
    }

    /// Lowest id in `types` registered under `tag`.
    pub fn first_with_tag(&self, tag: &str, types: &TypeSet) -> Option<UniversalRuleId> {
        let inner = self.inner.read();
        let entry = inner.by_tag.get(tag)?;
        (&entry.mask & types).min()
    }

    pub fn rule(&self, id: UniversalRuleId) -> Option<(String, String)> {
        self.inner.read().rules.get(id as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

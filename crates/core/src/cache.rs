//! Optional read cache for vitals histories.
//!
//! Entries are keyed by `(EhrId, TemplateId)`. Any write to an EHR drops every entry of that
//! EHR, so a cached history never outlives a change made through this process. Nothing is shared
//! across patients or templates.
//!
//! Each EHR also carries a generation, bumped on every invalidation. A reader takes the
//! generation before it queries the repository and hands it back on insert; a history fetched
//! across an invalidation is then discarded instead of cached.

use crate::record::VitalsRecord;
use clinic_types::{EhrId, TemplateId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Invalidation counter of one EHR.
pub type Generation = u64;

#[derive(Debug, Default)]
struct Entries {
    histories: HashMap<(EhrId, TemplateId), Vec<VitalsRecord>>,
    generations: HashMap<EhrId, Generation>,
}

#[derive(Debug, Default)]
pub struct ReadCache {
    entries: RwLock<Entries>,
}

impl ReadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, ehr_id: &EhrId, template_id: &TemplateId) -> Option<Vec<VitalsRecord>> {
        self.entries
            .read()
            .await
            .histories
            .get(&(ehr_id.clone(), template_id.clone()))
            .cloned()
    }

    /// Current generation of `ehr_id`. Take it before fetching and pass it to [`Self::insert`].
    pub async fn generation(&self, ehr_id: &EhrId) -> Generation {
        self.entries
            .read()
            .await
            .generations
            .get(ehr_id)
            .copied()
            .unwrap_or_default()
    }

    /// Cache `records` unless `ehr_id` was invalidated since `generation` was taken.
    ///
    /// Returns whether the history was stored.
    pub async fn insert(
        &self,
        ehr_id: &EhrId,
        template_id: &TemplateId,
        generation: Generation,
        records: Vec<VitalsRecord>,
    ) -> bool {
        let mut entries = self.entries.write().await;
        let current = entries.generations.get(ehr_id).copied().unwrap_or_default();
        if current != generation {
            return false;
        }
        entries
            .histories
            .insert((ehr_id.clone(), template_id.clone()), records);
        true
    }

    /// Drop every cached history of `ehr_id` and start a new generation.
    pub async fn invalidate_ehr(&self, ehr_id: &EhrId) {
        let mut entries = self.entries.write().await;
        entries.histories.retain(|(ehr, _), _| ehr != ehr_id);
        *entries.generations.entry(ehr_id.clone()).or_default() += 1;
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.histories.len()
    }
}

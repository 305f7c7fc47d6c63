//! Per-user cache of merged calendar views.
//!
//! The occurrence list for a range is recomputed from bills plus overrides
//! on every read, which makes repeated calendar fetches the hot path. One
//! entry is kept per user (the last range they asked for) and every write
//! through the coordinator bumps that user's generation, so a stale view
//! can never be served after a status change.

use chrono::NaiveDate;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::MergedOccurrence;
use crate::services::metrics::record_view_cache;

#[derive(Debug, Clone)]
struct CachedView {
    generation: u64,
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
    occurrences: Vec<MergedOccurrence>,
}

#[derive(Default)]
pub struct ViewCache {
    entries: DashMap<Uuid, CachedView>,
    generations: DashMap<Uuid, u64>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn generation(&self, user_id: Uuid) -> u64 {
        self.generations.get(&user_id).map(|g| *g).unwrap_or(0)
    }

    /// Cached view for exactly this (range, today) tuple, if it is still
    /// current. `today` is part of the key so a view cached yesterday never
    /// reports stale due/overdue classifications.
    pub fn get(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
    ) -> Option<Vec<MergedOccurrence>> {
        let generation = self.generation(user_id);
        let hit = self
            .entries
            .get(&user_id)
            .filter(|view| {
                view.generation == generation
                    && view.start == start
                    && view.end == end
                    && view.today == today
            })
            .map(|view| view.occurrences.clone());
        record_view_cache(if hit.is_some() { "hit" } else { "miss" });
        hit
    }

    /// Store a freshly merged view. The generation is read before the
    /// insert, so a concurrent invalidation leaves the entry stamped stale
    /// and it falls out on the next lookup.
    pub fn put(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
        occurrences: Vec<MergedOccurrence>,
    ) {
        let generation = self.generation(user_id);
        self.entries.insert(
            user_id,
            CachedView {
                generation,
                start,
                end,
                today,
                occurrences,
            },
        );
    }

    /// Drop the user's cached view after a write.
    pub fn invalidate(&self, user_id: Uuid) {
        *self.generations.entry(user_id).or_insert(0) += 1;
        self.entries.remove(&user_id);
    }
}

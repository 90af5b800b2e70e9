// Ingestion orchestrator.
//
// Drives one full pass over all enabled sources, isolating per-source
// failures. A source failure never aborts the run; the run only goes
// `failed` when every single enabled source failed. Health fields are
// committed once per source, after its full item batch is persisted, so a
// crash mid-source cannot falsely mark it healthy.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info};

use rivalscope_common::types::{Run, RunStatus, Source, SourceKind, StoredItem};

use crate::timeline::max_external_id;
use crate::traits::{SourceFetcher, Store};

pub struct SourceChecker {
    store: Arc<dyn Store>,
    syndication: Arc<dyn SourceFetcher>,
    listing: Arc<dyn SourceFetcher>,
    timeline: Arc<dyn SourceFetcher>,
}

/// Aggregate counters for one ingestion pass, logged at the end of a run.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestStats {
    pub sources_checked: usize,
    pub sources_failed: usize,
    pub new_items: usize,
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sources checked ({} failed), {} new items",
            self.sources_checked, self.sources_failed, self.new_items
        )
    }
}

impl SourceChecker {
    pub fn new(
        store: Arc<dyn Store>,
        syndication: Arc<dyn SourceFetcher>,
        listing: Arc<dyn SourceFetcher>,
        timeline: Arc<dyn SourceFetcher>,
    ) -> Self {
        Self {
            store,
            syndication,
            listing,
            timeline,
        }
    }

    fn fetcher_for(&self, kind: SourceKind) -> &dyn SourceFetcher {
        match kind {
            SourceKind::Syndication => self.syndication.as_ref(),
            SourceKind::Listing => self.listing.as_ref(),
            SourceKind::Timeline => self.timeline.as_ref(),
        }
    }

    /// One full ingestion pass. Opens a run, processes every enabled source
    /// in stable name order, and finalizes the run's terminal status.
    pub async fn check_all_sources(&self) -> Result<Run> {
        let mut run = Run::begin();
        self.store.create_run(&run).await?;

        let mut sources = self.store.list_enabled_sources().await?;
        sources.sort_by(|a, b| a.name.cmp(&b.name));

        let total = sources.len();
        info!(run_id = %run.id, sources = total, "Starting ingestion pass");

        let mut stats = IngestStats::default();
        let mut errors: Vec<String> = Vec::new();

        for mut source in sources {
            run.sources_checked += 1;
            stats.sources_checked += 1;
            source.health.last_attempt_at = Some(Utc::now());

            match self.fetcher_for(source.kind).fetch(&mut source).await {
                Ok(candidates) => {
                    let inserted = self.ingest_batch(&mut source, candidates).await?;
                    source.health.last_success_at = Some(Utc::now());
                    source.health.consecutive_errors = 0;
                    source.health.last_error = None;
                    run.new_items += inserted as i32;
                    stats.new_items += inserted;
                    info!(source = %source.name, new_items = inserted, "Source checked");
                }
                Err(e) => {
                    source.health.consecutive_errors += 1;
                    source.health.last_error = Some(e.to_string());
                    stats.sources_failed += 1;
                    errors.push(format!("{}: {e}", source.name));
                    error!(source = %source.name, error = %e, "Source check failed");
                }
            }

            // Single commit point per source.
            self.store.upsert_source(&source).await?;
            self.store.update_run(&run).await?;
        }

        run.status = if total > 0 && errors.len() == total {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        run.error_log = if errors.is_empty() {
            None
        } else {
            Some(errors.join("\n"))
        };
        run.completed_at = Some(Utc::now());
        self.store.update_run(&run).await?;

        info!(run_id = %run.id, status = run.status.as_str(), "Ingestion pass finished. {stats}");
        Ok(run)
    }

    /// Dedup and insert one source's batch, then advance timeline state.
    /// Returns the number of newly inserted items.
    async fn ingest_batch(
        &self,
        source: &mut Source,
        candidates: Vec<rivalscope_common::types::CandidateItem>,
    ) -> Result<usize> {
        let observed_max = max_external_id(candidates.iter().map(|c| c.external_id.as_str()));

        let mut inserted = 0;
        for candidate in candidates {
            if self
                .store
                .item_exists(source.id, &candidate.external_id)
                .await?
            {
                continue;
            }
            let item = StoredItem::from_candidate(source.id, candidate);
            self.store.insert_item(&item).await?;
            inserted += 1;
        }

        if let Some(state) = &mut source.timeline {
            if let Some(max_id) = observed_max {
                match &state.last_seen_id {
                    Some(current) if !cursor_advances(current, &max_id) => {}
                    _ => state.last_seen_id = Some(max_id),
                }
            }
            // Any successful fetch, even an empty one, ends the backfill phase.
            state.backfill_completed = true;
        }

        Ok(inserted)
    }
}

/// True when `candidate` is strictly newer than the `current` cursor.
/// Numeric comparison with a length-then-lexicographic fallback.
fn cursor_advances(current: &str, candidate: &str) -> bool {
    match (current.parse::<u64>(), candidate.parse::<u64>()) {
        (Ok(cur), Ok(cand)) => cand > cur,
        _ => (candidate.len(), candidate) > (current.len(), current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_only_moves_forward() {
        assert!(cursor_advances("99", "100"));
        assert!(!cursor_advances("100", "99"));
        assert!(!cursor_advances("100", "100"));
    }

    #[test]
    fn stats_display_is_compact() {
        let stats = IngestStats {
            sources_checked: 5,
            sources_failed: 2,
            new_items: 17,
        };
        assert_eq!(stats.to_string(), "5 sources checked (2 failed), 17 new items");
    }
}

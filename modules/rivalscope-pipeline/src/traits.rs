// Trait seams for the pipeline.
//
// Three boundaries, each with a production implementation and an in-memory
// test double in `testing`:
// - SourceFetcher — one per source kind, dispatched by the orchestrator
// - CompletionModel — the LLM call behind the classification engine
// - Store — the persistent store (Postgres in production)

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use ai_client::AiError;
use rivalscope_common::types::{
    AnalysisCard, CandidateItem, Competitor, OrgProfile, Run, Source, StoredItem,
};

/// Turns one configured source into a batch of candidate items.
///
/// Takes the source mutably so adapters can write back resolved state
/// (e.g. a timeline handle resolved to a platform user id). Health fields
/// and cursors are the orchestrator's responsibility, not the adapter's.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &mut Source) -> Result<Vec<CandidateItem>>;
}

/// Single-turn text completion. The error type distinguishes rate limiting
/// from other API failures so the caller can apply tiered backoff.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, AiError>;
}

#[async_trait]
impl CompletionModel for ai_client::Claude {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, AiError> {
        ai_client::Claude::complete(self, prompt).await
    }
}

/// Persistence operations the pipeline needs. Every mutation is atomic at
/// the granularity of a single call.
#[async_trait]
pub trait Store: Send + Sync {
    // Sources
    async fn list_enabled_sources(&self) -> Result<Vec<Source>>;
    async fn get_source(&self, id: Uuid) -> Result<Option<Source>>;
    async fn upsert_source(&self, source: &Source) -> Result<()>;

    // Items
    async fn item_exists(&self, source_id: Uuid, external_id: &str) -> Result<bool>;
    async fn insert_item(&self, item: &StoredItem) -> Result<()>;
    async fn unprocessed_items(&self) -> Result<Vec<StoredItem>>;
    /// Atomically mark an item processed. Returns false if another writer
    /// got there first; the caller must then skip the item entirely.
    async fn mark_item_processed(
        &self,
        item_id: Uuid,
        relevant: bool,
        irrelevance_reason: Option<&str>,
    ) -> Result<bool>;

    // Classification context
    async fn org_profile(&self) -> Result<Option<OrgProfile>>;
    async fn active_competitors(&self) -> Result<Vec<Competitor>>;
    async fn find_competitor_by_name(&self, name: &str) -> Result<Option<Competitor>>;
    async fn insert_competitor(&self, competitor: &Competitor) -> Result<()>;

    // Cards
    async fn insert_card(&self, card: &AnalysisCard) -> Result<()>;
    async fn link_card_competitor(&self, card_id: Uuid, competitor_id: Uuid) -> Result<()>;

    // Run ledger
    async fn create_run(&self, run: &Run) -> Result<()>;
    async fn update_run(&self, run: &Run) -> Result<()>;
    async fn recent_runs(&self, limit: i64) -> Result<Vec<Run>>;
}

// Test doubles for the pipeline's three trait seams.
//
// - MemoryStore (Store) — stateful in-memory store
// - MockFetcher (SourceFetcher) — HashMap-based source id → items/failure
// - ScriptedModel (CompletionModel) — queue of scripted responses
// - MockScraper (PageScraper) — HashMap-based URL → page/HTML

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use ai_client::AiError;
use rivalscope_common::types::{
    AnalysisCard, CandidateItem, Competitor, OrgProfile, Run, Source, StoredItem,
};

use crate::listing_scraper::{PageScraper, ScrapedPage};
use crate::traits::{CompletionModel, SourceFetcher, Store};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    sources: Vec<Source>,
    items: Vec<StoredItem>,
    competitors: Vec<Competitor>,
    cards: Vec<AnalysisCard>,
    card_links: Vec<(Uuid, Uuid)>,
    runs: Vec<Run>,
    profile: Option<OrgProfile>,
}

/// In-memory Store with the same first-writer-wins semantics as Postgres.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, profile: OrgProfile) -> Self {
        self.inner.lock().unwrap().profile = Some(profile);
        self
    }

    pub fn with_competitor(self, competitor: Competitor) -> Self {
        self.inner.lock().unwrap().competitors.push(competitor);
        self
    }

    pub fn with_source(self, source: Source) -> Self {
        self.inner.lock().unwrap().sources.push(source);
        self
    }

    pub fn with_item(self, item: StoredItem) -> Self {
        self.inner.lock().unwrap().items.push(item);
        self
    }

    // Inspection helpers for assertions.

    pub fn items(&self) -> Vec<StoredItem> {
        self.inner.lock().unwrap().items.clone()
    }

    pub fn cards(&self) -> Vec<AnalysisCard> {
        self.inner.lock().unwrap().cards.clone()
    }

    pub fn card_links(&self) -> Vec<(Uuid, Uuid)> {
        self.inner.lock().unwrap().card_links.clone()
    }

    pub fn competitors(&self) -> Vec<Competitor> {
        self.inner.lock().unwrap().competitors.clone()
    }

    pub fn sources(&self) -> Vec<Source> {
        self.inner.lock().unwrap().sources.clone()
    }

    pub fn runs(&self) -> Vec<Run> {
        self.inner.lock().unwrap().runs.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_enabled_sources(&self) -> Result<Vec<Source>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .sources
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect())
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .sources
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn upsert_source(&self, source: &Source) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.sources.iter_mut().find(|s| s.id == source.id) {
            Some(existing) => *existing = source.clone(),
            None => inner.sources.push(source.clone()),
        }
        Ok(())
    }

    async fn item_exists(&self, source_id: Uuid, external_id: &str) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .items
            .iter()
            .any(|i| i.source_id == source_id && i.external_id == external_id))
    }

    async fn insert_item(&self, item: &StoredItem) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let duplicate = inner
            .items
            .iter()
            .any(|i| i.source_id == item.source_id && i.external_id == item.external_id);
        if !duplicate {
            inner.items.push(item.clone());
        }
        Ok(())
    }

    async fn unprocessed_items(&self) -> Result<Vec<StoredItem>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .items
            .iter()
            .filter(|i| !i.processed)
            .cloned()
            .collect())
    }

    async fn mark_item_processed(
        &self,
        item_id: Uuid,
        relevant: bool,
        irrelevance_reason: Option<&str>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .items
            .iter_mut()
            .find(|i| i.id == item_id && !i.processed)
        {
            Some(item) => {
                item.processed = true;
                item.relevant = Some(relevant);
                item.irrelevance_reason = irrelevance_reason.map(String::from);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn org_profile(&self) -> Result<Option<OrgProfile>> {
        Ok(self.inner.lock().unwrap().profile.clone())
    }

    async fn active_competitors(&self) -> Result<Vec<Competitor>> {
        let mut competitors: Vec<Competitor> = self
            .inner
            .lock()
            .unwrap()
            .competitors
            .iter()
            .filter(|c| c.active)
            .cloned()
            .collect();
        competitors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(competitors)
    }

    async fn find_competitor_by_name(&self, name: &str) -> Result<Option<Competitor>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .competitors
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn insert_competitor(&self, competitor: &Competitor) -> Result<()> {
        self.inner.lock().unwrap().competitors.push(competitor.clone());
        Ok(())
    }

    async fn insert_card(&self, card: &AnalysisCard) -> Result<()> {
        self.inner.lock().unwrap().cards.push(card.clone());
        Ok(())
    }

    async fn link_card_competitor(&self, card_id: Uuid, competitor_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.card_links.contains(&(card_id, competitor_id)) {
            inner.card_links.push((card_id, competitor_id));
        }
        Ok(())
    }

    async fn create_run(&self, run: &Run) -> Result<()> {
        self.inner.lock().unwrap().runs.push(run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &Run) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => {
                *existing = run.clone();
                Ok(())
            }
            None => anyhow::bail!("MemoryStore: no run {}", run.id),
        }
    }

    async fn recent_runs(&self, limit: i64) -> Result<Vec<Run>> {
        let mut runs = self.inner.lock().unwrap().runs.clone();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// HashMap-based source fetcher. Errors for unregistered sources; use
/// `.failing()` to register an explicit failure.
#[derive(Default)]
pub struct MockFetcher {
    batches: HashMap<Uuid, Vec<CandidateItem>>,
    failures: HashMap<Uuid, String>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_source(mut self, source_id: Uuid, items: Vec<CandidateItem>) -> Self {
        self.batches.insert(source_id, items);
        self
    }

    pub fn failing(mut self, source_id: Uuid, error: &str) -> Self {
        self.failures.insert(source_id, error.to_string());
        self
    }
}

#[async_trait]
impl SourceFetcher for MockFetcher {
    async fn fetch(&self, source: &mut Source) -> Result<Vec<CandidateItem>> {
        if let Some(error) = self.failures.get(&source.id) {
            anyhow::bail!("{error}");
        }
        self.batches
            .get(&source.id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("MockFetcher: no batch registered for {}", source.name))
    }
}

// ---------------------------------------------------------------------------
// ScriptedModel
// ---------------------------------------------------------------------------

/// Completion model that replays a scripted sequence of outcomes, one per
/// call. Panics when the script runs dry so tests fail loudly.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<std::result::Result<String, AiError>>>,
    calls: Mutex<u32>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self, response: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(response.to_string()));
        self
    }

    pub fn then_rate_limited(self) -> Self {
        self.script.lock().unwrap().push_back(Err(AiError::RateLimited {
            message: "rate limit exceeded".to_string(),
            retry_after: None,
        }));
        self
    }

    pub fn then_api_error(self, status: u16) -> Self {
        self.script.lock().unwrap().push_back(Err(AiError::Api {
            status,
            message: "upstream error".to_string(),
        }));
        self
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, _prompt: &str) -> std::result::Result<String, AiError> {
        *self.calls.lock().unwrap() += 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedModel: script exhausted")
    }
}

// ---------------------------------------------------------------------------
// MockScraper
// ---------------------------------------------------------------------------

/// HashMap-based page scraper. Unregistered URLs error, which the listing
/// scraper treats as a failed crawl.
#[derive(Default)]
pub struct MockScraper {
    pages: HashMap<String, ScrapedPage>,
    raw: HashMap<String, String>,
    regions: HashMap<(String, String), String>,
}

impl MockScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, url: &str, text: &str, title: Option<&str>) -> Self {
        self.pages.insert(
            url.to_string(),
            ScrapedPage {
                text: text.to_string(),
                title: title.map(String::from),
            },
        );
        self
    }

    pub fn on_raw(mut self, url: &str, html: &str) -> Self {
        self.raw.insert(url.to_string(), html.to_string());
        self
    }

    pub fn on_region(mut self, url: &str, selector: &str, html: &str) -> Self {
        self.regions
            .insert((url.to_string(), selector.to_string()), html.to_string());
        self
    }
}

#[async_trait]
impl PageScraper for MockScraper {
    async fn page(&self, url: &str) -> Result<ScrapedPage> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("MockScraper: no page registered for {url}"))
    }

    async fn raw_html(&self, url: &str) -> Result<String> {
        self.raw
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("MockScraper: no raw html registered for {url}"))
    }

    async fn select_region(&self, url: &str, selector: &str) -> Result<String> {
        self.regions
            .get(&(url.to_string(), selector.to_string()))
            .cloned()
            .ok_or_else(|| {
                anyhow::anyhow!("MockScraper: no region registered for {url} {selector}")
            })
    }
}

// ---------------------------------------------------------------------------
// Item helpers
// ---------------------------------------------------------------------------

/// A minimal candidate item for ingestion tests.
pub fn candidate(external_id: &str, url: &str) -> CandidateItem {
    CandidateItem {
        external_id: external_id.to_string(),
        title: Some(format!("Item {external_id}")),
        url: url.to_string(),
        author: None,
        published_at: chrono::Utc::now(),
        content: format!("Content for {external_id}"),
        metadata: None,
    }
}

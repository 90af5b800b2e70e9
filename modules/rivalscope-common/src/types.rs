use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// How a source delivers items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// RSS/Atom feed, fetched and parsed as-is.
    Syndication,
    /// HTML listing page crawled for article links.
    Listing,
    /// X timeline fetched via the platform API.
    Timeline,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Syndication => "syndication",
            SourceKind::Listing => "listing",
            SourceKind::Timeline => "timeline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "syndication" => Some(SourceKind::Syndication),
            "listing" => Some(SourceKind::Listing),
            "timeline" => Some(SourceKind::Timeline),
            _ => None,
        }
    }
}

/// Fetch-attempt bookkeeping, updated by the orchestrator after every attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceHealth {
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_errors: i32,
    pub last_error: Option<String>,
}

/// Per-source state for the timeline kind.
///
/// `user_id` may be unresolved at creation; the adapter resolves the handle to
/// a platform id before the first fetch and writes it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineState {
    pub handle: String,
    pub user_id: Option<String>,
    /// Highest tweet id seen so far, used as `since_id` on incremental fetches.
    pub last_seen_id: Option<String>,
    pub backfill_completed: bool,
    pub backfill_days: i64,
    pub include_retweets: bool,
    pub include_replies: bool,
}

impl TimelineState {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            user_id: None,
            last_seen_id: None,
            backfill_completed: false,
            backfill_days: 30,
            include_retweets: false,
            include_replies: false,
        }
    }
}

/// A configured origin of items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub kind: SourceKind,
    /// Feed or listing-page URL. Absent only for timeline sources.
    pub url: Option<String>,
    /// CSS selector narrowing link extraction on listing pages.
    pub selector_hint: Option<String>,
    pub competitor_id: Option<Uuid>,
    pub enabled: bool,
    pub health: SourceHealth,
    pub timeline: Option<TimelineState>,
    pub created_at: DateTime<Utc>,
}

impl Source {
    pub fn syndication(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, SourceKind::Syndication, Some(url.into()), None)
    }

    pub fn listing(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, SourceKind::Listing, Some(url.into()), None)
    }

    pub fn timeline(name: impl Into<String>, handle: impl Into<String>) -> Self {
        Self::new(name, SourceKind::Timeline, None, Some(TimelineState::new(handle)))
    }

    fn new(
        name: impl Into<String>,
        kind: SourceKind,
        url: Option<String>,
        timeline: Option<TimelineState>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            url,
            selector_hint: None,
            competitor_id: None,
            enabled: true,
            health: SourceHealth::default(),
            timeline,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// A normalized unit of content produced by an adapter, not yet persisted.
#[derive(Debug, Clone)]
pub struct CandidateItem {
    /// Source-scoped unique id: feed guid, tweet id, or canonical article URL.
    pub external_id: String,
    /// Absent for microblog content, which has no title.
    pub title: Option<String>,
    pub url: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub content: String,
    /// Engagement counts, language, thread linkage etc. for timeline items.
    pub metadata: Option<serde_json::Value>,
}

/// A persisted candidate item plus its classification state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredItem {
    pub id: Uuid,
    pub source_id: Uuid,
    pub external_id: String,
    pub title: Option<String>,
    pub url: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub processed: bool,
    pub relevant: Option<bool>,
    pub irrelevance_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredItem {
    pub fn from_candidate(source_id: Uuid, candidate: CandidateItem) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            external_id: candidate.external_id,
            title: candidate.title,
            url: candidate.url,
            author: candidate.author,
            published_at: candidate.published_at,
            content: candidate.content,
            metadata: candidate.metadata,
            processed: false,
            relevant: None,
            irrelevance_reason: None,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis cards
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NewFeature,
    ProductAnnouncement,
    Partnership,
    Acquisition,
    Acquired,
    Funding,
    PricingChange,
    LeadershipChange,
    Expansion,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NewFeature => "new_feature",
            EventType::ProductAnnouncement => "product_announcement",
            EventType::Partnership => "partnership",
            EventType::Acquisition => "acquisition",
            EventType::Acquired => "acquired",
            EventType::Funding => "funding",
            EventType::PricingChange => "pricing_change",
            EventType::LeadershipChange => "leadership_change",
            EventType::Expansion => "expansion",
            EventType::Other => "other",
        }
    }

    /// Map a model-supplied string onto the closed enumeration.
    /// Anything unrecognized collapses to `Other`.
    pub fn coerce(s: &str) -> Self {
        match s {
            "new_feature" => EventType::NewFeature,
            "product_announcement" => EventType::ProductAnnouncement,
            "partnership" => EventType::Partnership,
            "acquisition" => EventType::Acquisition,
            "acquired" => EventType::Acquired,
            "funding" => EventType::Funding,
            "pricing_change" => EventType::PricingChange,
            "leadership_change" => EventType::LeadershipChange,
            "expansion" => EventType::Expansion,
            _ => EventType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Red,
    Yellow,
    Green,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Red => "red",
            Priority::Yellow => "yellow",
            Priority::Green => "green",
        }
    }

    /// Unrecognized values collapse to the lowest severity.
    pub fn coerce(s: &str) -> Self {
        match s {
            "red" => Priority::Red,
            "yellow" => Priority::Yellow,
            _ => Priority::Green,
        }
    }
}

/// Review lifecycle, owned by the (out-of-process) review surface.
/// The pipeline only ever creates cards in `Draft`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Draft,
    InReview,
    Approved,
    Archived,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Draft => "draft",
            CardStatus::InReview => "in_review",
            CardStatus::Approved => "approved",
            CardStatus::Archived => "archived",
        }
    }
}

/// Structured output of classifying one relevant item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisCard {
    pub id: Uuid,
    pub item_id: Option<Uuid>,
    pub run_id: Option<Uuid>,
    pub event_type: EventType,
    pub priority: Priority,
    pub title: String,
    pub summary: String,
    pub impact_assessment: String,
    pub suggested_counter_moves: String,
    /// The parsed model payload, kept verbatim for audit.
    pub raw_llm_output: Option<serde_json::Value>,
    pub status: CardStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Competitors and the org profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competitor {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub key_products: String,
    pub target_customers: String,
    pub known_strengths: String,
    pub known_weaknesses: String,
    pub overlap: String,
    pub pricing: String,
    pub active: bool,
    /// True for LLM-proposed entries awaiting human confirmation.
    pub suggested: bool,
    pub suggested_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Competitor {
    /// A competitor proposed by the classification model, pending confirmation.
    pub fn suggested(name: impl Into<String>, description: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            key_products: String::new(),
            target_customers: String::new(),
            known_strengths: String::new(),
            known_weaknesses: String::new(),
            overlap: String::new(),
            pricing: String::new(),
            active: true,
            suggested: true,
            suggested_reason: Some(reason.into()),
            created_at: Utc::now(),
        }
    }
}

/// The organization's own profile, included in every classification prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgProfile {
    pub company_description: String,
    pub key_differentiators: String,
    pub target_customer_segments: String,
    pub product_capabilities: String,
    pub strategic_priorities: String,
    pub pricing: String,
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// One end-to-end pipeline invocation. Counters only ever grow and the
/// terminal status transition happens exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub sources_checked: i32,
    pub new_items: i32,
    pub cards_generated: i32,
    pub error_log: Option<String>,
}

impl Run {
    pub fn begin() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            scheduled_at: now,
            started_at: now,
            completed_at: None,
            status: RunStatus::Running,
            sources_checked: 0,
            new_items: 0,
            cards_generated: 0,
            error_log: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_coerces_unknown_to_other() {
        assert_eq!(EventType::coerce("funding"), EventType::Funding);
        assert_eq!(EventType::coerce("ipo"), EventType::Other);
        assert_eq!(EventType::coerce(""), EventType::Other);
    }

    #[test]
    fn priority_coerces_unknown_to_green() {
        assert_eq!(Priority::coerce("red"), Priority::Red);
        assert_eq!(Priority::coerce("purple"), Priority::Green);
    }

    #[test]
    fn kind_round_trips() {
        for kind in [SourceKind::Syndication, SourceKind::Listing, SourceKind::Timeline] {
            assert_eq!(SourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SourceKind::parse("carrier_pigeon"), None);
    }
}

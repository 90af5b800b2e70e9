// Classification engine.
//
// Resolves every unprocessed item to a relevance decision; relevant items
// become draft analysis cards with competitor links. The LLM call gets a
// tiered retry: rate limits wait out the quota window, other API errors
// back off exponentially. An item whose call exhausts all retries is
// marked processed-but-irrelevant so it can never wedge the backlog.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use ai_client::AiError;
use rivalscope_common::types::{
    AnalysisCard, CardStatus, Competitor, EventType, Priority, StoredItem,
};

use crate::prompts;
use crate::traits::{CompletionModel, Store};

const MAX_RETRIES: u32 = 3;
/// Base for exponential backoff on generic API errors: 2s, 4s.
const BASE_DELAY: Duration = Duration::from_secs(2);
/// Minimum wait after a rate limit, matching a per-minute quota window.
const RATE_LIMIT_MIN_DELAY: Duration = Duration::from_secs(60);

pub struct Analyzer {
    store: Arc<dyn Store>,
    model: Arc<dyn CompletionModel>,
}

/// The JSON contract the model must satisfy. Unknown enum strings are
/// coerced after parsing, not rejected here.
#[derive(Debug, Deserialize)]
pub struct Evaluation {
    #[serde(default)]
    pub is_relevant: bool,
    #[serde(default)]
    pub irrelevance_reason: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub impact_assessment: Option<String>,
    #[serde(default)]
    pub suggested_counter_moves: Option<String>,
    #[serde(default)]
    pub competitor_names: Vec<String>,
    #[serde(default)]
    pub suggested_new_competitor: Option<SuggestedCompetitor>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestedCompetitor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Analyzer {
    pub fn new(store: Arc<dyn Store>, model: Arc<dyn CompletionModel>) -> Self {
        Self { store, model }
    }

    /// Classify the whole unprocessed backlog. Returns the number of cards
    /// created. `run_id` is stamped on every card when the caller is a full
    /// pipeline run; standalone invocations pass None.
    pub async fn process_unprocessed_items(&self, run_id: Option<Uuid>) -> Result<u32> {
        let items = self.store.unprocessed_items().await?;
        if items.is_empty() {
            info!("No unprocessed items found");
            return Ok(0);
        }

        let profile = self.store.org_profile().await?;
        let competitors = self.store.active_competitors().await?;
        info!(
            items = items.len(),
            competitors = competitors.len(),
            "Classifying unprocessed backlog"
        );

        let mut cards_created = 0;
        for item in items {
            match self
                .process_single_item(&item, profile.as_ref(), &competitors, run_id)
                .await
            {
                Ok(true) => cards_created += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(item_id = %item.id, error = %e, "Item classification failed");
                    // Poison cutoff: never leave the item eligible for retry.
                    self.store
                        .mark_item_processed(item.id, false, Some("Processing error"))
                        .await?;
                }
            }
        }

        Ok(cards_created)
    }

    /// Returns true if a card was created for the item.
    async fn process_single_item(
        &self,
        item: &StoredItem,
        profile: Option<&rivalscope_common::types::OrgProfile>,
        competitors: &[Competitor],
        run_id: Option<Uuid>,
    ) -> Result<bool> {
        let source_name = self
            .store
            .get_source(item.source_id)
            .await?
            .map(|s| s.name)
            .unwrap_or_else(|| "Unknown source".to_string());

        let prompt = prompts::build_evaluation_prompt(profile, competitors, &source_name, item);
        let raw_response = self.call_with_retry(&prompt).await?;

        let (evaluation, raw_payload) = match parse_evaluation(&raw_response) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Could not parse model response");
                self.store
                    .mark_item_processed(item.id, false, Some("LLM response parse error"))
                    .await?;
                return Ok(false);
            }
        };

        if !evaluation.is_relevant {
            let reason = evaluation
                .irrelevance_reason
                .as_deref()
                .unwrap_or("Not relevant");
            self.store
                .mark_item_processed(item.id, false, Some(reason))
                .await?;
            return Ok(false);
        }

        // First-writer-wins serialization point: claim the item before
        // creating any artifacts so a concurrent pass cannot double-card it.
        let claimed = self.store.mark_item_processed(item.id, true, None).await?;
        if !claimed {
            warn!(item_id = %item.id, "Item already claimed by another pass, skipping");
            return Ok(false);
        }

        let card = self.build_card(item, &evaluation, raw_payload, run_id);
        self.store.insert_card(&card).await?;

        self.link_competitors(&card, &evaluation, competitors).await?;
        self.handle_suggested_competitor(&card, &evaluation).await?;

        info!(card_id = %card.id, item_id = %item.id, "Created analysis card");
        Ok(true)
    }

    async fn call_with_retry(&self, prompt: &str) -> std::result::Result<String, AiError> {
        let mut attempt = 0;
        loop {
            match self.model.complete(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt + 1 >= MAX_RETRIES => return Err(e),
                Err(AiError::RateLimited { message, .. }) => {
                    let jitter = Duration::from_secs(rand::rng().random_range(0..=5));
                    let delay = RATE_LIMIT_MIN_DELAY + jitter;
                    warn!(
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs(),
                        detail = %message,
                        "Rate limited, waiting out quota window"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let delay = BASE_DELAY * 2u32.pow(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "API error, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            attempt += 1;
        }
    }

    fn build_card(
        &self,
        item: &StoredItem,
        evaluation: &Evaluation,
        raw_payload: serde_json::Value,
        run_id: Option<Uuid>,
    ) -> AnalysisCard {
        let event_type = EventType::coerce(evaluation.event_type.as_deref().unwrap_or("other"));
        let priority = Priority::coerce(evaluation.priority.as_deref().unwrap_or("green"));

        AnalysisCard {
            id: Uuid::new_v4(),
            item_id: Some(item.id),
            run_id,
            event_type,
            priority,
            title: evaluation
                .title
                .clone()
                .unwrap_or_else(|| prompts::item_title(item)),
            summary: evaluation.summary.clone().unwrap_or_default(),
            impact_assessment: evaluation.impact_assessment.clone().unwrap_or_default(),
            suggested_counter_moves: evaluation
                .suggested_counter_moves
                .clone()
                .unwrap_or_default(),
            raw_llm_output: Some(raw_payload),
            status: CardStatus::Draft,
            created_at: Utc::now(),
        }
    }

    async fn link_competitors(
        &self,
        card: &AnalysisCard,
        evaluation: &Evaluation,
        roster: &[Competitor],
    ) -> Result<()> {
        for name in &evaluation.competitor_names {
            let matched = roster
                .iter()
                .find(|c| c.active && c.name.eq_ignore_ascii_case(name));
            if let Some(competitor) = matched {
                self.store
                    .link_card_competitor(card.id, competitor.id)
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_suggested_competitor(
        &self,
        card: &AnalysisCard,
        evaluation: &Evaluation,
    ) -> Result<()> {
        let Some(suggestion) = &evaluation.suggested_new_competitor else {
            return Ok(());
        };
        let name = suggestion.name.trim();
        if name.is_empty() {
            return Ok(());
        }

        if let Some(existing) = self.store.find_competitor_by_name(name).await? {
            if existing.active {
                self.store
                    .link_card_competitor(card.id, existing.id)
                    .await?;
            }
            return Ok(());
        }

        let reason = suggestion
            .reason
            .clone()
            .unwrap_or_else(|| "Suggested by LLM analysis".to_string());
        let competitor = Competitor::suggested(name, suggestion.description.clone(), reason);
        self.store.insert_competitor(&competitor).await?;
        self.store
            .link_card_competitor(card.id, competitor.id)
            .await?;
        info!(name, "Created suggested competitor");
        Ok(())
    }
}

/// Strip Markdown code-fence wrapping if present: drop the opening fence
/// line (which may carry a language tag) and the trailing fence.
pub fn strip_code_fences(raw: &str) -> String {
    let mut text = raw.trim();
    if text.starts_with("```") {
        text = match text.find('\n') {
            Some(idx) => &text[idx + 1..],
            None => "",
        };
        if text.ends_with("```") {
            text = &text[..text.len() - 3];
        }
        text = text.trim();
    }
    text.to_string()
}

/// Parse the model's response into the evaluation contract plus the raw
/// payload kept verbatim for audit.
pub fn parse_evaluation(raw: &str) -> Result<(Evaluation, serde_json::Value)> {
    let cleaned = strip_code_fences(raw);
    let payload: serde_json::Value = serde_json::from_str(&cleaned)?;
    let evaluation: Evaluation = serde_json::from_value(payload.clone())?;
    Ok((evaluation, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{"is_relevant": true, "event_type": "funding", "priority": "red", "title": "Rival raises", "summary": "s", "impact_assessment": "i", "suggested_counter_moves": "m", "competitor_names": ["Rival"]}"#;

    #[test]
    fn fenced_json_parses_identically() {
        let bare = parse_evaluation(RESPONSE).unwrap().1;
        let fenced = parse_evaluation(&format!("```json\n{RESPONSE}\n```")).unwrap().1;
        let fenced_no_tag = parse_evaluation(&format!("```\n{RESPONSE}\n```")).unwrap().1;
        assert_eq!(bare, fenced);
        assert_eq!(bare, fenced_no_tag);
    }

    #[test]
    fn strip_fences_leaves_plain_text_alone() {
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```"), "");
    }

    #[test]
    fn missing_optional_fields_default() {
        let (eval, _) = parse_evaluation(r#"{"is_relevant": false}"#).unwrap();
        assert!(!eval.is_relevant);
        assert!(eval.competitor_names.is_empty());
        assert!(eval.suggested_new_competitor.is_none());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_evaluation("the item is relevant").is_err());
        assert!(parse_evaluation("```\nnot json\n```").is_err());
    }
}

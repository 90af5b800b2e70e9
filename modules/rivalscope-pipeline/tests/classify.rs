// Classification engine behavior against scripted model responses:
// relevance decisions, tiered retry, the poison-item cutoff, and
// competitor linking/suggestion.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use rivalscope_common::types::{
    CardStatus, Competitor, EventType, Priority, Source, StoredItem,
};
use rivalscope_pipeline::analyzer::Analyzer;
use rivalscope_pipeline::testing::{MemoryStore, ScriptedModel};

fn unprocessed_item(source_id: Uuid) -> StoredItem {
    StoredItem {
        id: Uuid::new_v4(),
        source_id,
        external_id: "guid-1".to_string(),
        title: Some("Rival raises $100M".to_string()),
        url: "https://rival.example/blog/funding".to_string(),
        author: None,
        published_at: Utc::now(),
        content: "Rival announced a $100M Series C.".to_string(),
        metadata: None,
        processed: false,
        relevant: None,
        irrelevance_reason: None,
        created_at: Utc::now(),
    }
}

fn competitor(name: &str) -> Competitor {
    let mut c = Competitor::suggested(name, "desc", "seed");
    c.suggested = false;
    c.suggested_reason = None;
    c
}

const RELEVANT: &str = r#"{
  "is_relevant": true,
  "event_type": "funding",
  "priority": "red",
  "title": "Rival raises $100M Series C",
  "summary": "Large raise aimed at enterprise expansion.",
  "impact_assessment": "More sales capacity against our core segment.",
  "suggested_counter_moves": "Accelerate the enterprise roadmap.",
  "competitor_names": ["rival"]
}"#;

#[tokio::test]
async fn relevant_item_becomes_a_draft_card_with_competitor_link() {
    let source = Source::syndication("Rival Blog", "https://rival.example/feed");
    let rival = competitor("Rival");
    let rival_id = rival.id;
    let item = unprocessed_item(source.id);
    let item_id = item.id;

    let store = Arc::new(
        MemoryStore::new()
            .with_source(source)
            .with_competitor(rival)
            .with_item(item),
    );
    let model = Arc::new(ScriptedModel::new().then_ok(RELEVANT));

    let cards = Analyzer::new(store.clone(), model)
        .process_unprocessed_items(None)
        .await
        .unwrap();
    assert_eq!(cards, 1);

    let card = &store.cards()[0];
    assert_eq!(card.event_type, EventType::Funding);
    assert_eq!(card.priority, Priority::Red);
    assert_eq!(card.status, CardStatus::Draft);
    assert_eq!(card.item_id, Some(item_id));
    assert!(card.raw_llm_output.is_some());

    // Case-insensitive roster match.
    assert_eq!(store.card_links(), vec![(card.id, rival_id)]);

    let item = &store.items()[0];
    assert!(item.processed);
    assert_eq!(item.relevant, Some(true));
}

#[tokio::test]
async fn irrelevant_item_records_the_models_reason() {
    let source = Source::syndication("Rival Blog", "https://rival.example/feed");
    let store = Arc::new(
        MemoryStore::new()
            .with_source(source.clone())
            .with_item(unprocessed_item(source.id)),
    );
    let model = Arc::new(ScriptedModel::new().then_ok(
        r#"{"is_relevant": false, "irrelevance_reason": "General industry news"}"#,
    ));

    let cards = Analyzer::new(store.clone(), model)
        .process_unprocessed_items(None)
        .await
        .unwrap();
    assert_eq!(cards, 0);
    assert!(store.cards().is_empty());

    let item = &store.items()[0];
    assert!(item.processed);
    assert_eq!(item.relevant, Some(false));
    assert_eq!(item.irrelevance_reason.as_deref(), Some("General industry news"));
}

#[tokio::test]
async fn fenced_response_parses_like_bare_json() {
    let source = Source::syndication("Rival Blog", "https://rival.example/feed");
    let store = Arc::new(
        MemoryStore::new()
            .with_source(source.clone())
            .with_item(unprocessed_item(source.id)),
    );
    let model = Arc::new(ScriptedModel::new().then_ok(&format!("```json\n{RELEVANT}\n```")));

    let cards = Analyzer::new(store.clone(), model)
        .process_unprocessed_items(None)
        .await
        .unwrap();
    assert_eq!(cards, 1);
    assert_eq!(store.cards()[0].title, "Rival raises $100M Series C");
}

#[tokio::test]
async fn unparseable_response_is_terminal_for_the_item() {
    let source = Source::syndication("Rival Blog", "https://rival.example/feed");
    let store = Arc::new(
        MemoryStore::new()
            .with_source(source.clone())
            .with_item(unprocessed_item(source.id)),
    );
    let model = Arc::new(ScriptedModel::new().then_ok("I think this is relevant."));

    let cards = Analyzer::new(store.clone(), model.clone())
        .process_unprocessed_items(None)
        .await
        .unwrap();
    assert_eq!(cards, 0);
    // Parse failures are never retried.
    assert_eq!(model.calls(), 1);

    let item = &store.items()[0];
    assert!(item.processed);
    assert_eq!(item.relevant, Some(false));
    assert_eq!(item.irrelevance_reason.as_deref(), Some("LLM response parse error"));
}

#[tokio::test(start_paused = true)]
async fn unknown_enum_values_are_coerced_not_rejected() {
    let source = Source::syndication("Rival Blog", "https://rival.example/feed");
    let store = Arc::new(
        MemoryStore::new()
            .with_source(source.clone())
            .with_item(unprocessed_item(source.id)),
    );
    let model = Arc::new(ScriptedModel::new().then_ok(
        r#"{"is_relevant": true, "event_type": "ipo", "priority": "purple", "title": "t", "summary": "s"}"#,
    ));

    Analyzer::new(store.clone(), model)
        .process_unprocessed_items(None)
        .await
        .unwrap();

    let card = &store.cards()[0];
    assert_eq!(card.event_type, EventType::Other);
    assert_eq!(card.priority, Priority::Green);
}

#[tokio::test(start_paused = true)]
async fn api_errors_retry_then_poison_the_item() {
    let source = Source::syndication("Rival Blog", "https://rival.example/feed");
    let store = Arc::new(
        MemoryStore::new()
            .with_source(source.clone())
            .with_item(unprocessed_item(source.id)),
    );
    let model = Arc::new(
        ScriptedModel::new()
            .then_api_error(500)
            .then_api_error(502)
            .then_api_error(503),
    );
    let analyzer = Analyzer::new(store.clone(), model.clone());

    let cards = analyzer.process_unprocessed_items(None).await.unwrap();
    assert_eq!(cards, 0);
    assert_eq!(model.calls(), 3);

    let item = &store.items()[0];
    assert!(item.processed);
    assert_eq!(item.relevant, Some(false));
    assert_eq!(item.irrelevance_reason.as_deref(), Some("Processing error"));

    // The poisoned item is never re-selected; an exhausted script would
    // panic if the model were called again.
    let cards = analyzer.process_unprocessed_items(None).await.unwrap();
    assert_eq!(cards, 0);
    assert_eq!(model.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_waits_out_the_quota_window_then_succeeds() {
    let source = Source::syndication("Rival Blog", "https://rival.example/feed");
    let store = Arc::new(
        MemoryStore::new()
            .with_source(source.clone())
            .with_item(unprocessed_item(source.id)),
    );
    let model = Arc::new(ScriptedModel::new().then_rate_limited().then_ok(RELEVANT));

    let cards = Analyzer::new(store.clone(), model.clone())
        .process_unprocessed_items(None)
        .await
        .unwrap();
    assert_eq!(cards, 1);
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn suggested_competitor_matching_existing_is_linked_not_duplicated() {
    let source = Source::syndication("Rival Blog", "https://rival.example/feed");
    let existing = competitor("NewCo");
    let existing_id = existing.id;
    let store = Arc::new(
        MemoryStore::new()
            .with_source(source.clone())
            .with_competitor(existing)
            .with_item(unprocessed_item(source.id)),
    );
    let model = Arc::new(ScriptedModel::new().then_ok(
        r#"{
          "is_relevant": true, "event_type": "other", "priority": "yellow",
          "title": "t", "summary": "s",
          "suggested_new_competitor": { "name": "newco", "description": "d", "reason": "r" }
        }"#,
    ));

    Analyzer::new(store.clone(), model)
        .process_unprocessed_items(None)
        .await
        .unwrap();

    assert_eq!(store.competitors().len(), 1);
    let card_id = store.cards()[0].id;
    assert_eq!(store.card_links(), vec![(card_id, existing_id)]);
}

#[tokio::test]
async fn unknown_suggested_competitor_is_created_and_linked() {
    let source = Source::syndication("Rival Blog", "https://rival.example/feed");
    let store = Arc::new(
        MemoryStore::new()
            .with_source(source.clone())
            .with_item(unprocessed_item(source.id)),
    );
    let model = Arc::new(ScriptedModel::new().then_ok(
        r#"{
          "is_relevant": true, "event_type": "new_feature", "priority": "yellow",
          "title": "t", "summary": "s",
          "suggested_new_competitor": { "name": "FreshCo", "description": "An emerging rival", "reason": "Ships a competing widget" }
        }"#,
    ));

    Analyzer::new(store.clone(), model)
        .process_unprocessed_items(None)
        .await
        .unwrap();

    let competitors = store.competitors();
    assert_eq!(competitors.len(), 1);
    let created = &competitors[0];
    assert_eq!(created.name, "FreshCo");
    assert!(created.active);
    assert!(created.suggested);
    assert_eq!(created.suggested_reason.as_deref(), Some("Ships a competing widget"));

    let card_id = store.cards()[0].id;
    assert_eq!(store.card_links(), vec![(card_id, created.id)]);
}

#[tokio::test]
async fn timeline_item_prompts_use_synthesized_title() {
    // End-to-end smoke for the microblog path: no title, author handle,
    // engagement metadata.
    let source = Source::timeline("Rival X", "rivalhq");
    let mut item = unprocessed_item(source.id);
    item.title = None;
    item.author = Some("rivalhq".to_string());
    item.metadata = Some(serde_json::json!({
        "like_count": 5, "retweet_count": 1, "reply_count": 0
    }));

    let store = Arc::new(MemoryStore::new().with_source(source).with_item(item));
    let model = Arc::new(ScriptedModel::new().then_ok(
        r#"{"is_relevant": false, "irrelevance_reason": "Marketing fluff"}"#,
    ));

    let cards = Analyzer::new(store.clone(), model)
        .process_unprocessed_items(None)
        .await
        .unwrap();
    assert_eq!(cards, 0);
    assert!(store.items()[0].processed);
}

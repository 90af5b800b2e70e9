// Classification prompt assembly.
//
// One prompt per item: the org's own profile, the active competitor roster,
// and the item itself. Timeline items get a synthesized title and their
// engagement metrics appended to the content, since virality is signal.

use rivalscope_common::types::{Competitor, OrgProfile, StoredItem};

use crate::feed_fetcher::truncate_chars;

/// Item content is capped before prompting; beyond this the model gains
/// nothing and the tokens cost real money.
pub const MAX_CONTENT_CHARS: usize = 8000;

pub fn build_evaluation_prompt(
    profile: Option<&OrgProfile>,
    competitors: &[Competitor],
    source_name: &str,
    item: &StoredItem,
) -> String {
    let profile_text = format_org_profile(profile);
    let competitors_text = format_competitor_roster(competitors);
    let title = item_title(item);
    let content = item_content(item);

    format!(
        r#"You are a competitive intelligence analyst. Your job is to evaluate news items and determine their competitive relevance.

Context:
- Company Profile: {profile_text}
- Known Competitors: {competitors_text}

Evaluate the following item and respond in JSON format.

Source: {source_name}
Title: {title}
Content: {content}
URL: {url}
Published: {published}

Respond with JSON:
{{
  "is_relevant": boolean,
  "irrelevance_reason": string | null,
  "event_type": "new_feature" | "product_announcement" | "partnership" | "acquisition" | "acquired" | "funding" | "pricing_change" | "leadership_change" | "expansion" | "other",
  "priority": "red" | "yellow" | "green",
  "title": string,
  "summary": string,
  "impact_assessment": string,
  "suggested_counter_moves": string,
  "competitor_names": [string],
  "suggested_new_competitor": {{ "name": string, "description": string, "reason": string }} | null
}}

Priority Guide:
- RED: Direct competitive threat, pricing changes, major funding, product launch that directly competes
- YELLOW: Notable development, indirect competitive impact, partnerships affecting market
- GREEN: General industry news, minor updates, tangentially related

IMPORTANT: Respond ONLY with valid JSON. No markdown, no code fences, no explanation outside the JSON."#,
        url = item.url,
        published = item.published_at.to_rfc3339(),
    )
}

fn format_org_profile(profile: Option<&OrgProfile>) -> String {
    match profile {
        None => "No company profile configured yet.".to_string(),
        Some(p) => format!(
            "Company: {}\nDifferentiators: {}\nTarget Customers: {}\nCapabilities: {}\nStrategic Priorities: {}\nPricing: {}",
            p.company_description,
            p.key_differentiators,
            p.target_customer_segments,
            p.product_capabilities,
            p.strategic_priorities,
            p.pricing,
        ),
    }
}

fn format_competitor_roster(competitors: &[Competitor]) -> String {
    if competitors.is_empty() {
        return "No competitors configured yet.".to_string();
    }
    competitors
        .iter()
        .map(|c| {
            format!(
                "--- {} ---\nDescription: {}\nKey Products: {}\nTarget Customers: {}\nStrengths: {}\nWeaknesses: {}\nOverlap: {}\nPricing: {}",
                c.name,
                c.description,
                c.key_products,
                c.target_customers,
                c.known_strengths,
                c.known_weaknesses,
                c.overlap,
                c.pricing,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Microblog items carry no title; synthesize one from the author handle.
pub fn item_title(item: &StoredItem) -> String {
    match &item.title {
        Some(title) => title.clone(),
        None => match &item.author {
            Some(author) => format!("Post by @{author}"),
            None => "Post".to_string(),
        },
    }
}

/// Truncated content, with the engagement block appended for items whose
/// metadata carries counts.
pub fn item_content(item: &StoredItem) -> String {
    let mut content = truncate_chars(&item.content, MAX_CONTENT_CHARS);

    if let Some(meta) = &item.metadata {
        let likes = meta.get("like_count").and_then(|v| v.as_u64());
        let retweets = meta.get("retweet_count").and_then(|v| v.as_u64());
        let replies = meta.get("reply_count").and_then(|v| v.as_u64());
        if likes.is_some() || retweets.is_some() || replies.is_some() {
            content.push_str(&format!(
                "\n\n[Engagement: {} likes, {} retweets, {} replies]",
                likes.unwrap_or(0),
                retweets.unwrap_or(0),
                replies.unwrap_or(0),
            ));
        }
    }

    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn item(title: Option<&str>, author: Option<&str>, metadata: Option<serde_json::Value>) -> StoredItem {
        StoredItem {
            id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            external_id: "e1".to_string(),
            title: title.map(String::from),
            url: "https://acme.example/blog/post".to_string(),
            author: author.map(String::from),
            published_at: Utc::now(),
            content: "Acme ships widgets".to_string(),
            metadata,
            processed: false,
            relevant: None,
            irrelevance_reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn timeline_items_get_synthesized_title() {
        assert_eq!(item_title(&item(None, Some("acmehq"), None)), "Post by @acmehq");
        assert_eq!(item_title(&item(Some("Real title"), None, None)), "Real title");
    }

    #[test]
    fn engagement_block_is_appended() {
        let meta = serde_json::json!({ "like_count": 42, "retweet_count": 7, "reply_count": 3 });
        let content = item_content(&item(None, Some("acmehq"), Some(meta)));
        assert!(content.ends_with("[Engagement: 42 likes, 7 retweets, 3 replies]"));
    }

    #[test]
    fn no_engagement_block_without_metrics() {
        let content = item_content(&item(Some("t"), None, None));
        assert_eq!(content, "Acme ships widgets");
    }

    #[test]
    fn content_is_truncated() {
        let mut long = item(Some("t"), None, None);
        long.content = "x".repeat(10_000);
        assert_eq!(item_content(&long).chars().count(), MAX_CONTENT_CHARS);
    }

    #[test]
    fn prompt_includes_profile_and_roster() {
        let profile = OrgProfile {
            company_description: "Acme makes widgets".to_string(),
            ..Default::default()
        };
        let prompt = build_evaluation_prompt(Some(&profile), &[], "Acme Blog", &item(Some("t"), None, None));
        assert!(prompt.contains("Acme makes widgets"));
        assert!(prompt.contains("No competitors configured yet."));
        assert!(prompt.contains("Source: Acme Blog"));
    }
}

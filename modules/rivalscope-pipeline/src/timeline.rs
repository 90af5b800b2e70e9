// X timeline adapter.
//
// Two fetch modes: a one-time backfill bounded by a start-time window, and
// incremental fetches driven by a since_id cursor once backfill has
// completed. Pagination is transparent; all pages are accumulated before
// returning. Cursor advancement and the backfill flag are written by the
// orchestrator, not here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use rivalscope_common::types::{CandidateItem, Source, TimelineState};
use x_client::{Tweet, TweetQuery, XApiClient};

use crate::traits::SourceFetcher;

pub struct TimelineFetcher {
    client: XApiClient,
}

impl TimelineFetcher {
    pub fn new(client: XApiClient) -> Self {
        Self { client }
    }

    pub async fn fetch_timeline(&self, state: &mut TimelineState) -> Result<Vec<CandidateItem>> {
        let user_id = match &state.user_id {
            Some(id) => id.clone(),
            None => {
                let user = self
                    .client
                    .user_by_username(&state.handle)
                    .await
                    .with_context(|| format!("failed to resolve @{}", state.handle))?;
                info!(handle = %state.handle, user_id = %user.id, "Resolved timeline handle");
                state.user_id = Some(user.id.clone());
                user.id
            }
        };

        let mut query = TweetQuery::new();
        query.exclude = build_exclude(state.include_retweets, state.include_replies);

        if state.backfill_completed && state.last_seen_id.is_some() {
            query.since_id = state.last_seen_id.clone();
            debug!(handle = %state.handle, since_id = ?query.since_id, "Incremental timeline fetch");
        } else {
            let start = Utc::now() - Duration::days(state.backfill_days);
            query.start_time = Some(start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
            debug!(handle = %state.handle, days = state.backfill_days, "Backfill timeline fetch");
        }

        let mut tweets = Vec::new();
        let mut pagination_token: Option<String> = None;
        loop {
            let page = self
                .client
                .user_tweets(&user_id, &query, pagination_token.as_deref())
                .await
                .with_context(|| format!("timeline fetch failed for @{}", state.handle))?;

            tweets.extend(page.data);
            match page.meta.next_token {
                Some(token) => pagination_token = Some(token),
                None => break,
            }
        }

        info!(handle = %state.handle, tweets = tweets.len(), "Fetched timeline");

        Ok(tweets
            .into_iter()
            .map(|t| tweet_to_candidate(t, &state.handle))
            .collect())
    }
}

#[async_trait]
impl SourceFetcher for TimelineFetcher {
    async fn fetch(&self, source: &mut Source) -> Result<Vec<CandidateItem>> {
        let state = source
            .timeline
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("timeline source {} has no handle state", source.name))?;
        self.fetch_timeline(state).await
    }
}

/// Derive the API exclude filter from the inclusion toggles.
/// Both excluded → "retweets,replies"; one included → exclude the other;
/// both included → no filter.
pub fn build_exclude(include_retweets: bool, include_replies: bool) -> Option<String> {
    let mut parts = Vec::new();
    if !include_retweets {
        parts.push("retweets");
    }
    if !include_replies {
        parts.push("replies");
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}

/// Convert a tweet into canonical form: id as external id, no title, URL
/// synthesized from handle + id, engagement and thread info in metadata.
pub fn tweet_to_candidate(tweet: Tweet, handle: &str) -> CandidateItem {
    let published_at = tweet
        .created_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let metrics = tweet.public_metrics.unwrap_or_default();
    let metadata = serde_json::json!({
        "like_count": metrics.like_count,
        "retweet_count": metrics.retweet_count,
        "reply_count": metrics.reply_count,
        "quote_count": metrics.quote_count,
        "conversation_id": tweet.conversation_id,
        "lang": tweet.lang,
        "referenced_tweets": tweet
            .referenced_tweets
            .unwrap_or_default()
            .iter()
            .map(|r| serde_json::json!({ "type": r.kind, "id": r.id }))
            .collect::<Vec<_>>(),
    });

    CandidateItem {
        external_id: tweet.id.clone(),
        title: None,
        url: format!("https://x.com/{handle}/status/{}", tweet.id),
        author: Some(handle.to_string()),
        published_at,
        content: tweet.text,
        metadata: Some(metadata),
    }
}

/// Pick the new cursor value from a batch of observed external ids.
/// Tweet ids are numeric and monotonically increasing; compare numerically
/// with a lexicographic fallback for safety.
pub fn max_external_id<'a, I>(ids: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    ids.into_iter()
        .max_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
        })
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use x_client::PublicMetrics;

    #[test]
    fn exclude_covers_all_four_combinations() {
        assert_eq!(build_exclude(false, false).as_deref(), Some("retweets,replies"));
        assert_eq!(build_exclude(false, true).as_deref(), Some("retweets"));
        assert_eq!(build_exclude(true, false).as_deref(), Some("replies"));
        assert_eq!(build_exclude(true, true), None);
    }

    #[test]
    fn tweet_maps_to_canonical_form() {
        let tweet = Tweet {
            id: "1881234".to_string(),
            text: "We just shipped widgets".to_string(),
            created_at: Some("2025-03-03T09:00:00Z".to_string()),
            public_metrics: Some(PublicMetrics {
                like_count: 42,
                retweet_count: 7,
                reply_count: 3,
                quote_count: 1,
            }),
            entities: None,
            referenced_tweets: None,
            conversation_id: Some("1881234".to_string()),
            lang: Some("en".to_string()),
        };

        let item = tweet_to_candidate(tweet, "acmehq");
        assert_eq!(item.external_id, "1881234");
        assert_eq!(item.title, None);
        assert_eq!(item.url, "https://x.com/acmehq/status/1881234");
        assert_eq!(item.author.as_deref(), Some("acmehq"));
        assert_eq!(item.content, "We just shipped widgets");

        let meta = item.metadata.unwrap();
        assert_eq!(meta["like_count"], 42);
        assert_eq!(meta["lang"], "en");
    }

    #[test]
    fn cursor_picks_numeric_maximum() {
        let ids = ["99", "100", "12"];
        assert_eq!(max_external_id(ids).as_deref(), Some("100"));
        assert_eq!(max_external_id(std::iter::empty::<&str>()), None);
    }
}

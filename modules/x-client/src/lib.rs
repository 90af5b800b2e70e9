pub mod error;
pub mod types;

pub use error::{Result, XApiError};
pub use types::{
    Entities, PageMeta, PublicMetrics, ReferencedTweet, Tweet, TweetsPage, UrlEntity, XUser,
};

use std::time::Duration;

use types::UserResponse;

const BASE_URL: &str = "https://api.x.com/2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fields requested for every tweet. Keep this in sync with what the
/// timeline mapper actually reads.
const TWEET_FIELDS: &str =
    "created_at,public_metrics,entities,referenced_tweets,conversation_id,lang";

/// Query parameters for a timeline page request.
#[derive(Debug, Clone, Default)]
pub struct TweetQuery {
    /// Only return tweets newer than this id.
    pub since_id: Option<String>,
    /// ISO 8601 lower bound, used for backfill windows.
    pub start_time: Option<String>,
    /// Comma-joined exclude filter, e.g. "retweets,replies". None means
    /// no filter.
    pub exclude: Option<String>,
    pub max_results: u32,
}

impl TweetQuery {
    pub fn new() -> Self {
        Self {
            since_id: None,
            start_time: None,
            exclude: None,
            max_results: 100,
        }
    }
}

pub struct XApiClient {
    client: reqwest::Client,
    bearer_token: String,
    base_url: String,
}

impl XApiClient {
    pub fn new(bearer_token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            bearer_token,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// Resolve a handle to a numeric user id.
    pub async fn user_by_username(&self, username: &str) -> Result<XUser> {
        let url = format!("{}/users/by/username/{}", self.base_url, username);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(error_for_status(status.as_u16(), resp).await);
        }

        let body: UserResponse = resp.json().await?;
        // The API returns 200 with an errors array (and no data) for
        // suspended or nonexistent accounts.
        body.data
            .ok_or_else(|| XApiError::NotFound(format!("user @{username}")))
    }

    /// Fetch one page of a user's timeline, newest first. Pass the
    /// `next_token` from the previous page's meta to continue.
    pub async fn user_tweets(
        &self,
        user_id: &str,
        query: &TweetQuery,
        pagination_token: Option<&str>,
    ) -> Result<TweetsPage> {
        let url = format!("{}/users/{}/tweets", self.base_url, user_id);

        let mut params: Vec<(&str, String)> = vec![
            ("tweet.fields", TWEET_FIELDS.to_string()),
            ("max_results", query.max_results.to_string()),
        ];
        if let Some(since_id) = &query.since_id {
            params.push(("since_id", since_id.clone()));
        }
        if let Some(start_time) = &query.start_time {
            params.push(("start_time", start_time.clone()));
        }
        if let Some(exclude) = &query.exclude {
            params.push(("exclude", exclude.clone()));
        }
        if let Some(token) = pagination_token {
            params.push(("pagination_token", token.to_string()));
        }

        tracing::debug!(user_id, ?pagination_token, "Fetching timeline page");

        let resp = self
            .client
            .get(&url)
            .query(&params)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(error_for_status(status.as_u16(), resp).await);
        }

        let page: TweetsPage = resp.json().await?;
        Ok(page)
    }
}

async fn error_for_status(status: u16, resp: reqwest::Response) -> XApiError {
    let reset_epoch = resp
        .headers()
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let message = resp.text().await.unwrap_or_default();
    classify_status(status, message, reset_epoch)
}

/// Map an error status to its variant. Auth, quota, and protected-account
/// failures get descriptive variants so recorded source health distinguishes
/// a misconfiguration from a transient upstream problem.
fn classify_status(status: u16, message: String, reset_epoch: Option<u64>) -> XApiError {
    match status {
        401 => XApiError::Unauthorized,
        402 => XApiError::CreditsExhausted,
        403 => XApiError::Forbidden,
        404 => XApiError::NotFound(message),
        429 => XApiError::RateLimited { reset_epoch },
        _ => XApiError::Api { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_descriptive_variants() {
        assert!(matches!(
            classify_status(401, String::new(), None),
            XApiError::Unauthorized
        ));
        assert!(matches!(
            classify_status(402, String::new(), None),
            XApiError::CreditsExhausted
        ));
        assert!(matches!(
            classify_status(403, String::new(), None),
            XApiError::Forbidden
        ));
        assert!(matches!(
            classify_status(404, "user @ghost".to_string(), None),
            XApiError::NotFound(m) if m == "user @ghost"
        ));
        assert!(matches!(
            classify_status(429, String::new(), Some(1_700_000_000)),
            XApiError::RateLimited { reset_epoch: Some(1_700_000_000) }
        ));
        assert!(matches!(
            classify_status(503, "upstream".to_string(), None),
            XApiError::Api { status: 503, .. }
        ));
    }

    #[test]
    fn variant_messages_are_descriptive() {
        assert_eq!(
            XApiError::Unauthorized.to_string(),
            "Invalid or expired bearer token"
        );
        assert_eq!(
            XApiError::CreditsExhausted.to_string(),
            "X API credits exhausted"
        );
        assert_eq!(
            XApiError::Forbidden.to_string(),
            "Account is protected or suspended"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn requests_time_out_against_a_stalled_server() {
        use tokio::io::AsyncReadExt;

        // Accepts connections and reads forever without ever responding.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
                });
            }
        });

        let client =
            XApiClient::new("token".to_string()).with_base_url(&format!("http://{addr}"));
        let err = client.user_by_username("anyone").await.unwrap_err();
        assert!(matches!(err, XApiError::Network(_)));
    }
}

pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::Deserialize;

/// One element matched by a `/scrape` selector.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedElement {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: Vec<ElementAttribute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementAttribute {
    pub name: String,
    pub value: String,
}

impl ScrapedElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct ScrapeResult {
    #[serde(default)]
    results: Vec<String>,
    #[serde(default)]
    elements: Vec<ScrapedElement>,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    data: Vec<ScrapeResult>,
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}/{path}", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    /// Fetch fully-rendered HTML for a URL via the `/content` endpoint.
    pub async fn content(&self, url: &str) -> Result<String> {
        let body = serde_json::json!({ "url": url });

        let resp = self
            .client
            .post(self.endpoint("content"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }

    /// Extract elements matching a CSS selector from a rendered page via
    /// the `/scrape` endpoint. Returns the matched elements in document
    /// order.
    pub async fn scrape(&self, url: &str, selector: &str) -> Result<Vec<ScrapedElement>> {
        let body = serde_json::json!({
            "url": url,
            "elements": [{ "selector": selector }],
        });

        tracing::debug!(url, selector, "Browserless scrape request");

        let resp = self
            .client
            .post(self.endpoint("scrape"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ScrapeResponse = resp.json().await?;
        let elements = parsed
            .data
            .into_iter()
            .flat_map(|r| {
                if r.elements.is_empty() {
                    // Older Browserless versions return plain html strings.
                    r.results
                        .into_iter()
                        .map(|html| ScrapedElement {
                            html,
                            text: String::new(),
                            attributes: Vec::new(),
                        })
                        .collect::<Vec<_>>()
                } else {
                    r.elements
                }
            })
            .collect();
        Ok(elements)
    }
}

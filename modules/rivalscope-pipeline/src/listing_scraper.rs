// HTML listing adapter.
//
// Crawls a listing page (blog index, newsroom, press page), extracts
// outbound links that look like articles, then crawls each article for its
// readable text. With a selector hint configured, links are taken from the
// matched DOM region instead of running the heuristics.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};
use tracing::{info, warn};
use url::Url;

use rivalscope_common::types::{CandidateItem, Source};

use crate::feed_fetcher::truncate_chars;
use crate::traits::SourceFetcher;

const MAX_TITLE_CHARS: usize = 500;
const MAX_URL_CHARS: usize = 2000;
/// Cap on article links followed per listing page per run.
const MAX_ARTICLES: usize = 20;

/// One rendered page: readable body text plus the document title.
#[derive(Debug, Clone)]
pub struct ScrapedPage {
    pub text: String,
    pub title: Option<String>,
}

/// Rendered-page access. One production implementation (Browserless) and a
/// HashMap-backed mock in `testing`.
#[async_trait]
pub trait PageScraper: Send + Sync {
    /// Readable text + title for an article page.
    async fn page(&self, url: &str) -> Result<ScrapedPage>;
    /// Raw rendered HTML, used for link extraction on listing pages.
    async fn raw_html(&self, url: &str) -> Result<String>;
    /// HTML of the region(s) matching a CSS selector. Used when a source
    /// carries an extraction hint.
    async fn select_region(&self, url: &str, selector: &str) -> Result<String>;
}

// --- Browserless + Readability scraper ---

pub struct BrowserlessScraper {
    client: browserless_client::BrowserlessClient,
}

impl BrowserlessScraper {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        info!(base_url, "Using BrowserlessScraper");
        Self {
            client: browserless_client::BrowserlessClient::new(base_url, token),
        }
    }
}

#[async_trait]
impl PageScraper for BrowserlessScraper {
    async fn page(&self, url: &str) -> Result<ScrapedPage> {
        let html = self
            .client
            .content(url)
            .await
            .context("Browserless content request failed")?;

        if html.is_empty() {
            warn!(url, scraper = "browserless", "Empty HTML response");
            return Ok(ScrapedPage {
                text: String::new(),
                title: None,
            });
        }

        let title = extract_html_title(&html);

        let parsed_url = Url::parse(url).ok();
        let config = TransformConfig {
            readability: true,
            main_content: true,
            return_format: ReturnFormat::Markdown,
            filter_images: true,
            filter_svg: true,
            clean_html: true,
        };
        let input = TransformInput {
            url: parsed_url.as_ref(),
            content: html.as_bytes(),
            screenshot_bytes: None,
            encoding: None,
            selector_config: None,
            ignore_tags: None,
        };

        let text = transform_content_input(input, &config);

        if text.trim().is_empty() {
            warn!(url, scraper = "browserless", "Empty content after extraction");
        }

        Ok(ScrapedPage { text, title })
    }

    async fn raw_html(&self, url: &str) -> Result<String> {
        let html = self
            .client
            .content(url)
            .await
            .context("Browserless content request failed")?;
        Ok(html)
    }

    async fn select_region(&self, url: &str, selector: &str) -> Result<String> {
        let elements = self
            .client
            .scrape(url, selector)
            .await
            .context("Browserless scrape request failed")?;
        Ok(elements
            .into_iter()
            .map(|e| e.html)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

// --- Listing scraper ---

pub struct ListingScraper {
    scraper: Arc<dyn PageScraper>,
    /// Pause between article crawls, zeroed in tests.
    article_delay: Duration,
}

impl ListingScraper {
    pub fn new(scraper: Arc<dyn PageScraper>) -> Self {
        Self {
            scraper,
            article_delay: Duration::from_millis(500),
        }
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn without_delay(scraper: Arc<dyn PageScraper>) -> Self {
        Self {
            scraper,
            article_delay: Duration::ZERO,
        }
    }

    /// Crawl a listing page and every surviving article link.
    /// A failed listing crawl yields an empty batch, not an error; a failed
    /// article crawl skips that one article.
    pub async fn fetch_articles(
        &self,
        listing_url: &str,
        selector_hint: Option<&str>,
    ) -> Result<Vec<CandidateItem>> {
        let links = match self.candidate_links(listing_url, selector_hint).await {
            Ok(links) => links,
            Err(e) => {
                warn!(listing_url, error = %e, "Listing crawl failed, returning no articles");
                return Ok(Vec::new());
            }
        };

        info!(listing_url, candidates = links.len(), "Extracted article links");

        let mut items = Vec::new();
        for link in links {
            let page = match self.scraper.page(&link.url).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(url = %link.url, error = %e, "Article crawl failed, skipping");
                    continue;
                }
            };

            let title = if !link.anchor_text.trim().is_empty() {
                link.anchor_text.trim().to_string()
            } else {
                page.title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| "Untitled".to_string())
            };

            items.push(CandidateItem {
                external_id: truncate_chars(&link.url, MAX_URL_CHARS),
                title: Some(truncate_chars(&title, MAX_TITLE_CHARS)),
                url: truncate_chars(&link.url, MAX_URL_CHARS),
                author: None,
                published_at: Utc::now(),
                content: page.text,
                metadata: None,
            });

            if !self.article_delay.is_zero() {
                tokio::time::sleep(self.article_delay).await;
            }
        }

        Ok(items)
    }

    /// Configuration-validation mode: crawl only the listing page and report
    /// how many article links would be followed. No articles are fetched.
    pub async fn probe(&self, listing_url: &str, selector_hint: Option<&str>) -> Result<usize> {
        let links = self.candidate_links(listing_url, selector_hint).await?;
        Ok(links.len())
    }

    async fn candidate_links(
        &self,
        listing_url: &str,
        selector_hint: Option<&str>,
    ) -> Result<Vec<ExtractedLink>> {
        match selector_hint {
            Some(selector) => {
                let region = self.scraper.select_region(listing_url, selector).await?;
                Ok(links_from_region(&region, listing_url))
            }
            None => {
                let html = self.scraper.raw_html(listing_url).await?;
                Ok(article_links(&html, listing_url))
            }
        }
    }
}

#[async_trait]
impl SourceFetcher for ListingScraper {
    async fn fetch(&self, source: &mut Source) -> Result<Vec<CandidateItem>> {
        let url = source
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("listing source {} has no URL", source.name))?;
        self.fetch_articles(url, source.selector_hint.as_deref())
            .await
    }
}

// --- Link extraction ---

#[derive(Debug, Clone)]
pub struct ExtractedLink {
    pub url: String,
    pub anchor_text: String,
}

/// Path segments that suggest article-style URLs.
const ALLOW_SEGMENTS: &[&str] = &[
    "blog",
    "news",
    "newsroom",
    "article",
    "articles",
    "post",
    "posts",
    "press",
    "press-release",
    "press-releases",
    "announcement",
    "announcements",
    "story",
    "stories",
    "update",
    "updates",
    "release",
    "releases",
    "changelog",
];

/// Path segments that mark index pages, auth flows, and legal boilerplate.
const DENY_SEGMENTS: &[&str] = &[
    "login",
    "signin",
    "sign-in",
    "signup",
    "sign-up",
    "register",
    "privacy",
    "terms",
    "legal",
    "cookies",
    "contact",
    "careers",
    "tag",
    "tags",
    "category",
    "categories",
    "topics",
    "author",
    "authors",
    "page",
    "search",
    "subscribe",
    "share",
];

/// Extract anchors from raw HTML and keep the ones that look like article
/// links relative to the listing page: same host, at least two path
/// segments, an allow-listed segment and no deny-listed one. Deduplicates
/// by normalized scheme://host/path.
pub fn article_links(html: &str, listing_url: &str) -> Vec<ExtractedLink> {
    let base = match Url::parse(listing_url) {
        Ok(u) => u,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for link in extract_anchors(html, &base) {
        let parsed = match Url::parse(&link.url) {
            Ok(u) => u,
            Err(_) => continue,
        };
        if !is_article_link(&parsed, &base) {
            continue;
        }
        let key = normalized_key(&parsed);
        if normalized_key(&base) == key {
            continue;
        }
        if seen.insert(key) {
            links.push(link);
            if links.len() >= MAX_ARTICLES {
                break;
            }
        }
    }

    links
}

/// Hint mode: every link inside the matched region is trusted, subject only
/// to the same-host restriction and dedup.
pub fn links_from_region(region_html: &str, listing_url: &str) -> Vec<ExtractedLink> {
    let base = match Url::parse(listing_url) {
        Ok(u) => u,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for link in extract_anchors(region_html, &base) {
        let parsed = match Url::parse(&link.url) {
            Ok(u) => u,
            Err(_) => continue,
        };
        if parsed.host_str() != base.host_str() {
            continue;
        }
        let key = normalized_key(&parsed);
        if normalized_key(&base) == key {
            continue;
        }
        if seen.insert(key) {
            links.push(link);
            if links.len() >= MAX_ARTICLES {
                break;
            }
        }
    }

    links
}

static ANCHOR_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r#"(?is)<a\s[^>]*href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#)
        .expect("valid anchor regex")
});
static TAG_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?s)<[^>]+>").expect("valid tag regex"));
static TITLE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));

/// Pull `<a href>` pairs out of HTML, resolving relative URLs against the
/// base. Fragment/mailto/tel/javascript pseudo-links are discarded here.
fn extract_anchors(html: &str, base: &Url) -> Vec<ExtractedLink> {
    let mut links = Vec::new();
    for cap in ANCHOR_RE.captures_iter(html) {
        let raw = cap[1].trim();
        if raw.is_empty()
            || raw.starts_with('#')
            || raw.starts_with("mailto:")
            || raw.starts_with("tel:")
            || raw.starts_with("javascript:")
        {
            continue;
        }

        let resolved = match base.join(raw) {
            Ok(u) => u,
            Err(_) => continue,
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }

        let anchor_text = TAG_RE.replace_all(&cap[2], " ");
        let anchor_text = anchor_text.split_whitespace().collect::<Vec<_>>().join(" ");

        links.push(ExtractedLink {
            url: resolved.to_string(),
            anchor_text,
        });
    }
    links
}

fn is_article_link(url: &Url, listing: &Url) -> bool {
    if url.host_str() != listing.host_str() {
        return false;
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    if segments.len() < 2 {
        return false;
    }

    let has_deny = segments
        .iter()
        .any(|seg| DENY_SEGMENTS.contains(&seg.to_ascii_lowercase().as_str()));
    if has_deny {
        return false;
    }

    segments
        .iter()
        .any(|seg| ALLOW_SEGMENTS.contains(&seg.to_ascii_lowercase().as_str()))
}

fn normalized_key(url: &Url) -> String {
    format!(
        "{}://{}{}",
        url.scheme(),
        url.host_str().unwrap_or(""),
        url.path().trim_end_matches('/')
    )
}

/// `<title>` fallback for pages whose anchor text was empty.
pub fn extract_html_title(html: &str) -> Option<String> {
    TITLE_RE.captures(html).map(|cap| {
        cap[1]
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "https://acme.example/blog";

    fn html_with(links: &[(&str, &str)]) -> String {
        links
            .iter()
            .map(|(href, text)| format!(r#"<a href="{href}">{text}</a>"#))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn cross_domain_links_are_discarded() {
        let html = html_with(&[
            ("https://evil.example/blog/post", "stolen"),
            ("https://acme.example/blog/post-1", "kept"),
        ]);
        let links = article_links(&html, LISTING);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://acme.example/blog/post-1");
    }

    #[test]
    fn relative_links_resolve_against_listing() {
        let html = html_with(&[("/blog/relative-post", "rel")]);
        let links = article_links(&html, LISTING);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://acme.example/blog/relative-post");
    }

    #[test]
    fn deny_list_beats_allow_list() {
        let html = html_with(&[
            ("https://acme.example/blog/tag/widgets", "tag index"),
            ("https://acme.example/blog/author/jane", "author index"),
            ("https://acme.example/blog/real-post", "post"),
        ]);
        let links = article_links(&html, LISTING);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://acme.example/blog/real-post");
    }

    #[test]
    fn requires_two_path_segments() {
        let html = html_with(&[
            ("https://acme.example/blog", "the listing itself"),
            ("https://acme.example/news", "one segment"),
            ("https://acme.example/news/launch", "two segments"),
        ]);
        let links = article_links(&html, LISTING);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://acme.example/news/launch");
    }

    #[test]
    fn pseudo_links_are_skipped() {
        let html = html_with(&[
            ("#top", "anchor"),
            ("mailto:pr@acme.example", "mail"),
            ("javascript:void(0)", "js"),
            ("tel:+1555", "phone"),
        ]);
        assert!(article_links(&html, LISTING).is_empty());
    }

    #[test]
    fn dedups_by_scheme_host_path() {
        let html = html_with(&[
            ("https://acme.example/blog/post-1", "a"),
            ("https://acme.example/blog/post-1/", "trailing slash"),
            ("https://acme.example/blog/post-1?utm_source=x", "query"),
        ]);
        let links = article_links(&html, LISTING);
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn region_links_skip_heuristics_but_not_host_check() {
        let html = html_with(&[
            ("https://acme.example/whatever", "trusted by hint"),
            ("https://evil.example/whatever", "still cross-domain"),
        ]);
        let links = links_from_region(&html, LISTING);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://acme.example/whatever");
    }

    #[test]
    fn anchor_text_strips_nested_tags() {
        let html = r#"<a href="/blog/post-2"><span>Acme</span> <b>ships</b></a>"#;
        let links = article_links(html, LISTING);
        assert_eq!(links[0].anchor_text, "Acme ships");
    }

    #[test]
    fn title_regex_fallback() {
        let html = "<html><head><title>\n  Acme — Launch\n</title></head></html>";
        assert_eq!(extract_html_title(html).as_deref(), Some("Acme — Launch"));
        assert_eq!(extract_html_title("<p>no title</p>"), None);
    }
}

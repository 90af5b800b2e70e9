pub mod analyzer;
pub mod checker;
pub mod feed_fetcher;
pub mod listing_scraper;
pub mod prompts;
pub mod store;
pub mod timeline;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

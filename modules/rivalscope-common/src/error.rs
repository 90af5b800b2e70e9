use thiserror::Error;

#[derive(Error, Debug)]
pub enum RivalscopeError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed parse error: {0}")]
    FeedParse(String),

    #[error("Not a feed: {0}")]
    NotAFeed(String),

    #[error("Scraping error: {0}")]
    Scrape(String),

    #[error("Timeline error: {0}")]
    Timeline(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

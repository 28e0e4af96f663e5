// Feed collaborator: scraped source posts and the process that produces them.

pub mod models;
pub mod scraper;

pub use models::SourcePost;
pub use scraper::{FeedSource, QuotedPost, TwintScraper};

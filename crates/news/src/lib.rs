//! News ingestion and distribution for BroBot.
//!
//! - `provider` - the `NewsProvider` capability trait
//! - `rss` - regex-based RSS provider over a set of French feeds
//! - `distributor` - the periodic tick that fans fresh stories out to the
//!   configured channels, deduplicated and rate-capped per channel

pub mod distributor;
pub mod provider;
pub mod rss;

pub use distributor::Distributor;
pub use provider::NewsProvider;
pub use rss::{FeedFetcher, HttpFeedFetcher, RssProvider};

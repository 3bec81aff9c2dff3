use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use brobot_core::news::{NewsCategory, NewsItem};

use crate::provider::NewsProvider;

pub const USER_AGENT: &str = "BroBot/1.0";
const ACCEPT_HEADER: &str = "application/rss+xml, application/xml, text/xml";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_AGE_HOURS: i64 = 72;
const MIN_DESCRIPTION_CHARS: usize = 30;
const EXTERNAL_ID_PREFIX: &str = "rss_french_";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Http(String),
    #[error("feed returned status {0}")]
    Status(u16),
}

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", ACCEPT_HEADER)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.text().await.map_err(|e| FetchError::Http(e.to_string()))
    }
}

/// Stable provider-scoped story ID derived from the article link.
pub fn external_id(link: &str) -> String {
    let encoded = BASE64.encode(link.as_bytes());
    let short: String = encoded.chars().take(20).collect();
    format!("{EXTERNAL_ID_PREFIX}{short}")
}

fn source_label(feed_url: &str) -> &'static str {
    const LABELS: [(&str, &str); 9] = [
        ("lequipe.fr", "L'Équipe"),
        ("rmcsport", "RMC Sport"),
        ("eurosport", "Eurosport"),
        ("gamekult", "Gamekult"),
        ("jeuxvideo.com", "JeuxVideo.com"),
        ("allocine", "AlloCiné"),
        ("premiere", "Première"),
        ("catch-arena", "Catch Arena"),
        ("actualitte", "ActuaLitté"),
    ];
    LABELS
        .iter()
        .find(|(needle, _)| feed_url.contains(needle))
        .map(|(_, label)| *label)
        .unwrap_or("RSS Feed")
}

/// The French feeds polled per category.
pub fn default_feeds() -> HashMap<NewsCategory, Vec<String>> {
    let owned = |urls: &[&str]| urls.iter().map(|u| (*u).to_owned()).collect::<Vec<_>>();
    HashMap::from([
        (NewsCategory::Sports, owned(&["https://rmcsport.bfmtv.com/rss/football/"])),
        (NewsCategory::Gaming, owned(&["https://www.gamekult.com/feed.xml"])),
        (NewsCategory::Films, owned(&["https://www.allocine.fr/rss/news-cine.xml"])),
        (NewsCategory::Series, owned(&["https://www.allocine.fr/rss/news-series.xml"])),
        (
            NewsCategory::Wwe,
            owned(&[
                "https://www.catch-arena.com/rss.xml",
                "https://www.wwe.com/feeds/page/rss.xml",
            ]),
        ),
        (
            NewsCategory::Lectures,
            owned(&[
                "https://www.livreshebdo.fr/rss.xml",
                "https://www.babelio.com/rss/critiques",
                "https://actualitte.com/rss",
            ]),
        ),
    ])
}

/// Feeds are scraped with patterns rather than a full XML parser; real-world
/// French feeds are messy enough that lenient matching outlasts strictness.
struct Patterns {
    item: Regex,
    title: Regex,
    description: Regex,
    link: Regex,
    pub_date: Regex,
    enclosure: Regex,
    thumbnail: Regex,
    img: Regex,
    tag: Regex,
    whitespace: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            item: Regex::new(r"(?is)<item[^>]*>(.*?)</item>")?,
            title: Regex::new(r"(?is)<title[^>]*>(?:<!\[CDATA\[(.*?)\]\]>|(.*?))</title>")?,
            description: Regex::new(
                r"(?is)<description[^>]*>(?:<!\[CDATA\[(.*?)\]\]>|(.*?))</description>",
            )?,
            link: Regex::new(r"(?is)<link[^>]*>(.*?)</link>")?,
            pub_date: Regex::new(r"(?is)<pubDate[^>]*>(.*?)</pubDate>")?,
            enclosure: Regex::new(r#"(?i)<enclosure[^>]*url="([^"]*)"[^>]*type="image"#)?,
            thumbnail: Regex::new(r#"(?i)<media:thumbnail[^>]*url="([^"]*)""#)?,
            img: Regex::new(r#"(?i)<img[^>]*src="([^"]*)""#)?,
            tag: Regex::new(r"<[^>]*>")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }
}

struct RawItem {
    title: String,
    description: String,
    link: String,
    published_at: DateTime<Utc>,
    image_url: Option<String>,
}

pub struct RssProvider {
    fetcher: Arc<dyn FeedFetcher>,
    feeds: HashMap<NewsCategory, Vec<String>>,
    patterns: Patterns,
}

impl RssProvider {
    pub fn new(fetcher: Arc<dyn FeedFetcher>) -> Result<Self, regex::Error> {
        Self::with_feeds(fetcher, default_feeds())
    }

    pub fn with_feeds(
        fetcher: Arc<dyn FeedFetcher>,
        feeds: HashMap<NewsCategory, Vec<String>>,
    ) -> Result<Self, regex::Error> {
        Ok(Self { fetcher, feeds, patterns: Patterns::compile()? })
    }

    async fn fetch_feed(
        &self,
        feed_url: &str,
        category: NewsCategory,
        limit: usize,
    ) -> Vec<NewsItem> {
        let xml = match self.fetcher.fetch(feed_url).await {
            Ok(xml) => xml,
            Err(fetch_error) => {
                warn!(feed_url, error = %fetch_error, "rss feed fetch failed");
                return Vec::new();
            }
        };

        let source = source_label(feed_url);
        self.parse_items(&xml)
            .into_iter()
            .filter(|item| self.keep(item))
            .take(limit)
            .map(|item| NewsItem {
                external_id: external_id(&item.link),
                title: item.title,
                description: item.description,
                url: item.link,
                published_at: item.published_at,
                source: source.to_owned(),
                category,
                image_url: item.image_url,
                author: None,
            })
            .collect()
    }

    fn parse_items(&self, xml: &str) -> Vec<RawItem> {
        let mut items = Vec::new();
        for block in self.patterns.item.captures_iter(xml) {
            let body = &block[1];

            let Some(title) = self.text_of(&self.patterns.title, body) else { continue };
            let Some(link) =
                self.patterns.link.captures(body).map(|c| c[1].trim().to_owned())
            else {
                continue;
            };
            let Some(published_at) = self
                .patterns
                .pub_date
                .captures(body)
                .and_then(|c| parse_feed_date(c[1].trim()))
            else {
                continue;
            };

            let description = self.text_of(&self.patterns.description, body).unwrap_or_default();
            // Best-effort image: enclosure, then media:thumbnail, then <img>.
            let image_url = self
                .patterns
                .enclosure
                .captures(body)
                .or_else(|| self.patterns.thumbnail.captures(body))
                .or_else(|| self.patterns.img.captures(body))
                .map(|c| c[1].to_owned());

            if title.is_empty() || link.is_empty() {
                continue;
            }
            items.push(RawItem { title, description, link, published_at, image_url });
        }
        items
    }

    fn text_of(&self, pattern: &Regex, body: &str) -> Option<String> {
        let captures = pattern.captures(body)?;
        let raw = captures.get(1).or_else(|| captures.get(2))?.as_str();
        Some(self.clean_text(raw))
    }

    fn clean_text(&self, raw: &str) -> String {
        let stripped = self.patterns.tag.replace_all(raw, "");
        let unescaped = stripped
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&")
            .replace("&quot;", "\"")
            .replace("&#039;", "'");
        self.patterns.whitespace.replace_all(&unescaped, " ").trim().to_owned()
    }

    fn keep(&self, item: &RawItem) -> bool {
        let age_hours = (Utc::now() - item.published_at).num_hours();
        if age_hours > MAX_AGE_HOURS {
            return false;
        }
        // Teasers too short to be worth posting are dropped; feeds without
        // descriptions still pass.
        if !item.description.is_empty()
            && item.description.chars().count() < MIN_DESCRIPTION_CHARS
        {
            return false;
        }
        true
    }
}

fn parse_feed_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|parsed| parsed.with_timezone(&Utc))
        .ok()
}

#[async_trait]
impl NewsProvider for RssProvider {
    async fn fetch(&self, category: NewsCategory, limit: usize) -> Vec<NewsItem> {
        let Some(feed_urls) = self.feeds.get(&category).filter(|urls| !urls.is_empty()) else {
            return Vec::new();
        };

        let per_feed = limit.div_ceil(feed_urls.len());
        let mut stories = Vec::new();
        for feed_url in feed_urls {
            stories.extend(self.fetch_feed(feed_url, category, per_feed).await);
        }

        stories.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        stories.truncate(limit);
        debug!(
            category = category.as_str(),
            count = stories.len(),
            "fetched stories"
        );
        stories
    }

    fn name(&self) -> &'static str {
        "RSS French"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use tokio::sync::Mutex;

    use brobot_core::news::NewsCategory;

    use super::{external_id, FeedFetcher, FetchError, NewsProvider, RssProvider};

    struct ScriptedFetcher {
        responses: Mutex<HashMap<String, Result<String, FetchError>>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<(&str, Result<String, FetchError>)>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(
                    responses.into_iter().map(|(url, body)| (url.to_owned(), body)).collect(),
                ),
            })
        }
    }

    #[async_trait]
    impl FeedFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.responses
                .lock()
                .await
                .remove(url)
                .unwrap_or(Err(FetchError::Status(404)))
        }
    }

    fn feed_item(title: &str, link: &str, description: &str, age_hours: i64) -> String {
        let date = (Utc::now() - Duration::hours(age_hours)).to_rfc2822();
        format!(
            "<item><title>{title}</title><link>{link}</link>\
             <description>{description}</description><pubDate>{date}</pubDate></item>"
        )
    }

    fn provider_with(
        fetcher: Arc<ScriptedFetcher>,
        feeds: Vec<(NewsCategory, Vec<&str>)>,
    ) -> RssProvider {
        let feeds = feeds
            .into_iter()
            .map(|(cat, urls)| (cat, urls.into_iter().map(str::to_owned).collect()))
            .collect();
        RssProvider::with_feeds(fetcher, feeds).expect("patterns compile")
    }

    const LONG_DESC: &str = "Une description suffisamment longue pour passer le filtre de taille.";

    #[tokio::test]
    async fn parses_cdata_and_plain_titles() {
        let date = (Utc::now() - Duration::hours(1)).to_rfc2822();
        let xml = format!(
            "<rss><channel>\
             <item><title><![CDATA[Titre &amp; CDATA]]></title>\
             <link>https://a.fr/1</link><description>{LONG_DESC}</description>\
             <pubDate>{date}</pubDate></item>\
             <item><title>Titre simple</title><link>https://a.fr/2</link>\
             <description><![CDATA[<p>{LONG_DESC}</p>]]></description>\
             <pubDate>{date}</pubDate>\
             <enclosure url=\"https://a.fr/img.jpg\" type=\"image/jpeg\"/></item>\
             </channel></rss>"
        );
        let fetcher = ScriptedFetcher::new(vec![("https://a.fr/rss", Ok(xml))]);
        let provider = provider_with(fetcher, vec![(NewsCategory::Sports, vec!["https://a.fr/rss"])]);

        let stories = provider.fetch(NewsCategory::Sports, 5).await;
        assert_eq!(stories.len(), 2);
        assert_eq!(stories[0].title, "Titre & CDATA");
        assert_eq!(stories[1].title, "Titre simple");
        assert_eq!(stories[1].description, LONG_DESC);
        assert_eq!(stories[1].image_url.as_deref(), Some("https://a.fr/img.jpg"));
    }

    #[tokio::test]
    async fn stale_and_thin_items_are_dropped() {
        let xml = format!(
            "<rss>{}{}{}{}</rss>",
            feed_item("Frais", "https://a.fr/fresh", LONG_DESC, 2),
            feed_item("Trop vieux", "https://a.fr/old", LONG_DESC, 100),
            feed_item("Trop court", "https://a.fr/thin", "Court.", 2),
            // Valid without a description at all.
            feed_item("Sans description", "https://a.fr/bare", "", 2),
        );
        let fetcher = ScriptedFetcher::new(vec![("https://a.fr/rss", Ok(xml))]);
        let provider = provider_with(fetcher, vec![(NewsCategory::Films, vec!["https://a.fr/rss"])]);

        let titles: Vec<String> = provider
            .fetch(NewsCategory::Films, 10)
            .await
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["Frais", "Sans description"]);
    }

    #[tokio::test]
    async fn items_without_a_date_or_link_are_dropped() {
        let xml = "<rss><item><title>Sans date</title><link>https://a.fr/x</link>\
                   <description>desc desc desc desc desc desc desc</description></item></rss>"
            .to_owned();
        let fetcher = ScriptedFetcher::new(vec![("https://a.fr/rss", Ok(xml))]);
        let provider = provider_with(fetcher, vec![(NewsCategory::Wwe, vec!["https://a.fr/rss"])]);

        assert!(provider.fetch(NewsCategory::Wwe, 5).await.is_empty());
    }

    #[tokio::test]
    async fn merges_feeds_newest_first_and_survives_one_failing_feed() {
        let feed_a = format!("<rss>{}</rss>", feed_item("Hier", "https://a.fr/1", LONG_DESC, 24));
        let feed_b = format!(
            "<rss>{}</rss>",
            feed_item("Ce matin", "https://b.fr/1", LONG_DESC, 1)
        );
        let fetcher = ScriptedFetcher::new(vec![
            ("https://a.fr/rss", Ok(feed_a)),
            ("https://b.fr/rss", Ok(feed_b)),
            ("https://c.fr/rss", Err(FetchError::Http("timeout".to_owned()))),
        ]);
        let provider = provider_with(
            fetcher,
            vec![(
                NewsCategory::Lectures,
                vec!["https://a.fr/rss", "https://b.fr/rss", "https://c.fr/rss"],
            )],
        );

        let stories = provider.fetch(NewsCategory::Lectures, 2).await;
        assert_eq!(stories.len(), 2);
        assert_eq!(stories[0].title, "Ce matin");
        assert_eq!(stories[1].title, "Hier");
    }

    #[tokio::test]
    async fn unknown_category_feeds_yield_nothing() {
        let fetcher = ScriptedFetcher::new(vec![]);
        let provider = provider_with(fetcher, vec![]);
        assert!(provider.fetch(NewsCategory::Gaming, 5).await.is_empty());
    }

    #[test]
    fn external_ids_are_prefixed_and_bounded() {
        let id = external_id("https://www.allocine.fr/article/fichearticle_gen_carticle=1.html");
        assert!(id.starts_with("rss_french_"));
        assert_eq!(id.chars().count(), "rss_french_".len() + 20);
        assert_eq!(id, external_id("https://www.allocine.fr/article/fichearticle_gen_carticle=1.html"));
    }

    #[test]
    fn source_labels_fall_back_to_a_generic_name() {
        assert_eq!(super::source_label("https://www.gamekult.com/feed.xml"), "Gamekult");
        assert_eq!(super::source_label("https://rmcsport.bfmtv.com/rss/football/"), "RMC Sport");
        assert_eq!(super::source_label("https://inconnu.fr/rss"), "RSS Feed");
    }
}

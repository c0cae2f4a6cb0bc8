/// Chapter import from the web
///
/// A `scrape` job carries a URL and a target book. [`Scraper`] fetches the
/// page and hands the body to the first [`ScrapeStrategy`] whose `matches`
/// accepts the URL:
///
/// 1. [`JsonApiStrategy`] for configured hosts that serve chapters as JSON
///    (`{"title", "content"}` or `{"title", "body"}`, optionally wrapped in
///    `data` or `chapter`)
/// 2. [`HtmlArticleStrategy`] for everything else: title from the first
///    `<h1>` (falling back to `<title>`), text from the `<p>` elements of the
///    `<article>` (or the whole page)
///
/// Extraction is pure, so strategies are tested without a network.

use crate::config::ScraperSettings;
use crate::handlers::{HandlerError, JobHandler};
use crate::queue::JobQueue;
use async_trait::async_trait;
use readhub_shared::models::book::Book;
use readhub_shared::models::chapter::{Chapter, CreateChapter};
use readhub_shared::models::job::{EmbedPayload, Job, JobKind, ScrapePayload};
use readhub_shared::models::{foreign_key_violation, unique_violation};
use regex::Regex;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Longest chapter title stored
pub const MAX_TITLE_CHARS: usize = 255;

const UNTITLED: &str = "Untitled chapter";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedChapter {
    pub title: String,
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Only http and https URLs can be imported, got {0}")]
    UnsupportedScheme(String),

    #[error("No scrape strategy accepts {0}")]
    NoStrategy(String),

    #[error("Fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Source returned HTTP {0}")]
    Status(u16),

    #[error("Page exceeds the {max} byte limit")]
    TooLarge { max: usize },

    #[error("Invalid chapter JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No chapter text found on the page")]
    NoContent,

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl ScrapeError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ScrapeError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ScrapeError::Status(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<ScrapeError> for HandlerError {
    fn from(err: ScrapeError) -> Self {
        if err.is_retryable() {
            HandlerError::transient(err.to_string())
        } else {
            HandlerError::permanent(err.to_string())
        }
    }
}

pub trait ScrapeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, url: &Url) -> bool;

    fn extract(&self, url: &Url, body: &str) -> Result<ScrapedChapter, ScrapeError>;

    /// `Accept` header sent when fetching for this strategy
    fn accept(&self) -> &'static str {
        "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"
    }
}

/// Markup to plain text
#[derive(Debug, Clone)]
pub struct HtmlText {
    noise: Regex,
    paragraph: Regex,
    line_break: Regex,
    tag: Regex,
    entity: Regex,
}

impl HtmlText {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            noise: Regex::new(
                r"(?is)<head\b.*?</head>|<script\b.*?</script>|<style\b.*?</style>|<noscript\b.*?</noscript>|<!--.*?-->",
            )?,
            paragraph: Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>")?,
            line_break: Regex::new(r"(?i)<br\s*/?>")?,
            tag: Regex::new(r"(?s)<[^>]*>")?,
            entity: Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});")?,
        })
    }

    /// Removes scripts, styles, comments and the document head
    pub fn strip_noise(&self, html: &str) -> String {
        self.noise.replace_all(html, "").into_owned()
    }

    /// Text of an inline fragment on one line
    pub fn inline(&self, fragment: &str) -> String {
        let text = self.line_break.replace_all(fragment, " ");
        let text = self.tag.replace_all(&text, "");
        collapse_whitespace(&self.decode_entities(&text))
    }

    /// Non-empty `<p>` texts in document order
    pub fn paragraphs(&self, html: &str) -> Vec<String> {
        self.paragraph
            .captures_iter(html)
            .filter_map(|c| c.get(1))
            .map(|m| self.inline(m.as_str()))
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Non-empty lines of text once every tag is removed
    pub fn text_lines(&self, html: &str) -> Vec<String> {
        let text = self.tag.replace_all(html, "\n");
        self.decode_entities(&text)
            .lines()
            .map(collapse_whitespace)
            .filter(|l| !l.is_empty())
            .collect()
    }

    pub fn decode_entities(&self, text: &str) -> String {
        self.entity
            .replace_all(text, |caps: &regex::Captures| {
                let name = &caps[1];
                decode_entity(name).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

fn decode_entity(name: &str) -> Option<String> {
    if let Some(code) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        return u32::from_str_radix(code, 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from);
    }
    if let Some(code) = name.strip_prefix('#') {
        return code.parse::<u32>().ok().and_then(char::from_u32).map(String::from);
    }

    let decoded = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201C}",
        "rdquo" => "\u{201D}",
        "laquo" => "\u{00AB}",
        "raquo" => "\u{00BB}",
        "copy" => "\u{00A9}",
        _ => return None,
    };
    Some(decoded.to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

/// Hosts serving chapters as JSON documents
#[derive(Debug, Clone)]
pub struct JsonApiStrategy {
    hosts: Vec<String>,
    html: HtmlText,
}

impl JsonApiStrategy {
    pub fn new(hosts: Vec<String>, html: HtmlText) -> Self {
        let hosts = hosts.into_iter().map(|h| h.to_ascii_lowercase()).collect();
        Self { hosts, html }
    }
}

impl ScrapeStrategy for JsonApiStrategy {
    fn name(&self) -> &'static str {
        "json-api"
    }

    fn matches(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| self.hosts.iter().any(|h| h.eq_ignore_ascii_case(host)))
            .unwrap_or(false)
    }

    fn extract(&self, _url: &Url, body: &str) -> Result<ScrapedChapter, ScrapeError> {
        let value: Value = serde_json::from_str(body)?;
        let document = ["chapter", "data"]
            .iter()
            .filter_map(|key| value.get(*key))
            .find(|v| v.is_object())
            .unwrap_or(&value);

        let title = non_blank(document.get("title").and_then(Value::as_str))
            .unwrap_or_else(|| UNTITLED.to_string());

        let raw = ["content", "body"]
            .iter()
            .find_map(|key| non_blank(document.get(*key).and_then(Value::as_str)))
            .ok_or(ScrapeError::NoContent)?;

        let content = if raw.to_ascii_lowercase().contains("<p") {
            self.html.paragraphs(&raw).join("\n\n")
        } else {
            raw
        };
        if content.trim().is_empty() {
            return Err(ScrapeError::NoContent);
        }

        Ok(ScrapedChapter { title, content })
    }

    fn accept(&self) -> &'static str {
        "application/json"
    }
}

/// Generic article pages; accepts any URL
#[derive(Debug, Clone)]
pub struct HtmlArticleStrategy {
    html: HtmlText,
    article: Regex,
    heading: Regex,
    title: Regex,
}

impl HtmlArticleStrategy {
    pub fn new(html: HtmlText) -> Result<Self, regex::Error> {
        Ok(Self {
            html,
            article: Regex::new(r"(?is)<article\b[^>]*>(.*?)</article>")?,
            heading: Regex::new(r"(?is)<h1\b[^>]*>(.*?)</h1>")?,
            title: Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>")?,
        })
    }

    fn first_text(&self, pattern: &Regex, html: &str) -> Option<String> {
        pattern
            .captures_iter(html)
            .filter_map(|c| c.get(1))
            .map(|m| self.html.inline(m.as_str()))
            .find(|t| !t.is_empty())
    }
}

impl ScrapeStrategy for HtmlArticleStrategy {
    fn name(&self) -> &'static str {
        "html-article"
    }

    fn matches(&self, _url: &Url) -> bool {
        true
    }

    fn extract(&self, _url: &Url, body: &str) -> Result<ScrapedChapter, ScrapeError> {
        let page = self.html.strip_noise(body);

        let title = self
            .first_text(&self.heading, &page)
            .or_else(|| self.first_text(&self.title, body))
            .unwrap_or_else(|| UNTITLED.to_string());

        let region = self
            .article
            .captures(&page)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(&page);

        let mut paragraphs = self.html.paragraphs(region);
        if paragraphs.is_empty() {
            let heading = self.heading.replace_all(region, "");
            paragraphs = self.html.text_lines(&heading);
        }
        if paragraphs.is_empty() {
            return Err(ScrapeError::NoContent);
        }

        Ok(ScrapedChapter {
            title,
            content: paragraphs.join("\n\n"),
        })
    }
}

/// Fetches pages and runs the matching strategy
pub struct Scraper {
    client: reqwest::Client,
    strategies: Vec<Box<dyn ScrapeStrategy>>,
    max_bytes: usize,
}

impl Scraper {
    pub fn new(settings: &ScraperSettings) -> Result<Self, ScrapeError> {
        let html = HtmlText::new()?;
        let strategies: Vec<Box<dyn ScrapeStrategy>> = vec![
            Box::new(JsonApiStrategy::new(settings.json_hosts.clone(), html.clone())),
            Box::new(HtmlArticleStrategy::new(html)?),
        ];

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            strategies,
            max_bytes: settings.max_bytes,
        })
    }

    /// Parses `raw` and rejects anything but http(s)
    pub fn parse_url(raw: &str) -> Result<Url, ScrapeError> {
        let url = Url::parse(raw.trim())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ScrapeError::UnsupportedScheme(url.scheme().to_string()));
        }
        Ok(url)
    }

    pub fn strategy_for(&self, url: &Url) -> Option<&dyn ScrapeStrategy> {
        self.strategies
            .iter()
            .find(|s| s.matches(url))
            .map(|s| s.as_ref())
    }

    pub async fn fetch(&self, raw_url: &str) -> Result<ScrapedChapter, ScrapeError> {
        let url = Self::parse_url(raw_url)?;
        let strategy = self
            .strategy_for(&url)
            .ok_or_else(|| ScrapeError::NoStrategy(url.to_string()))?;

        tracing::debug!(url = %url, strategy = strategy.name(), "Fetching chapter");

        let mut response = self
            .client
            .get(url.clone())
            .header(ACCEPT, strategy.accept())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status(status.as_u16()));
        }
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(ScrapeError::TooLarge { max: self.max_bytes });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(ScrapeError::TooLarge { max: self.max_bytes });
            }
            body.extend_from_slice(&chunk);
        }

        strategy.extract(&url, &String::from_utf8_lossy(&body))
    }
}

/// Handles `scrape` jobs
pub struct ScrapeHandler {
    queue: JobQueue,
    scraper: Arc<Scraper>,
}

impl ScrapeHandler {
    pub fn new(queue: JobQueue, scraper: Arc<Scraper>) -> Self {
        Self { queue, scraper }
    }
}

fn chapter_title(requested: Option<&str>, scraped: String) -> String {
    let title = non_blank(requested).unwrap_or(scraped);
    title.chars().take(MAX_TITLE_CHARS).collect()
}

#[async_trait]
impl JobHandler for ScrapeHandler {
    fn kind(&self) -> JobKind {
        JobKind::Scrape
    }

    async fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        let payload: ScrapePayload = job.payload_as()?;
        let db = self.queue.pool();

        if Book::find_by_id(db, payload.book_id).await?.is_none() {
            return Err(HandlerError::permanent("Book not found"));
        }

        let scraped = self.scraper.fetch(&payload.url).await?;

        let data = CreateChapter {
            book_id: payload.book_id,
            number: payload.chapter_number,
            title: chapter_title(payload.title.as_deref(), scraped.title),
            content: scraped.content,
            source_url: Some(payload.url.clone()),
        };

        let chapter = match Chapter::create(db, data).await {
            Ok(chapter) => chapter,
            Err(e) if unique_violation(&e).is_some() => {
                return Err(match payload.chapter_number {
                    Some(number) => HandlerError::permanent(format!("Chapter {} already exists", number)),
                    // Another import took the next number first.
                    None => HandlerError::transient("Chapter number was taken concurrently"),
                });
            }
            Err(e) if foreign_key_violation(&e) => {
                return Err(HandlerError::permanent("Book was deleted during import"));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            job_id = %job.id,
            book_id = %chapter.book_id,
            chapter_id = %chapter.id,
            number = chapter.number,
            words = chapter.word_count,
            "Imported chapter"
        );

        let embed = EmbedPayload {
            book_id: payload.book_id,
        };
        if let Err(e) = self.queue.enqueue(JobKind::Embed, &embed).await {
            tracing::warn!(book_id = %payload.book_id, error = %e, "Failed to enqueue embed job");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn html() -> HtmlText {
        HtmlText::new().unwrap()
    }

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    fn settings(json_hosts: &[&str]) -> ScraperSettings {
        ScraperSettings {
            json_hosts: json_hosts.iter().map(|h| h.to_string()).collect(),
            timeout_secs: 5,
            user_agent: "ReadHubBot/test".into(),
            max_bytes: 64 * 1024,
        }
    }

    #[test]
    fn test_decode_entities() {
        let text = html().decode_entities("Tom &amp; Jerry &lt;3 &#8217; &#x2014; &unknown; &quot;hi&quot;");
        assert_eq!(text, "Tom & Jerry <3 \u{2019} \u{2014} &unknown; \"hi\"");
    }

    #[test]
    fn test_inline_strips_tags() {
        let text = html().inline("  She <em>ran</em>,<br/>and   ran &hellip; <a href=\"#\">away</a> ");
        assert_eq!(text, "She ran, and ran \u{2026} away");
    }

    #[test]
    fn test_html_article_extraction() {
        let strategy = HtmlArticleStrategy::new(html()).unwrap();
        let page = r#"
            <html>
              <head><title>Site | Chapter 3</title><style>p { color: red }</style></head>
              <body>
                <nav><p>Home</p></nav>
                <article class="chapter">
                  <h1>Chapter 3: The <b>Storm</b></h1>
                  <p>The rain fell &amp; the wind rose.</p>
                  <script>var p = "<p>ad</p>";</script>
                  <p class="x">
                     Nobody   knew.
                  </p>
                  <p> </p>
                </article>
              </body>
            </html>
        "#;

        let chapter = strategy.extract(&url("https://novels.example/ch/3"), page).unwrap();
        assert_eq!(chapter.title, "Chapter 3: The Storm");
        assert_eq!(chapter.content, "The rain fell & the wind rose.\n\nNobody knew.");
    }

    #[test]
    fn test_html_title_fallback() {
        let strategy = HtmlArticleStrategy::new(html()).unwrap();
        let page = "<html><head><title> Chapter One </title></head><body><p>Once.</p><pre>code</pre></body></html>";

        let chapter = strategy.extract(&url("https://example.com/1"), page).unwrap();
        assert_eq!(chapter.title, "Chapter One");
        assert_eq!(chapter.content, "Once.");
    }

    #[test]
    fn test_html_without_paragraphs() {
        let strategy = HtmlArticleStrategy::new(html()).unwrap();
        let page = "<body><h1>Ch 2</h1><div>Line one</div>\n<div>Line  two</div></body>";

        let chapter = strategy.extract(&url("https://example.com/2"), page).unwrap();
        assert_eq!(chapter.title, "Ch 2");
        assert_eq!(chapter.content, "Line one\n\nLine two");
    }

    #[test]
    fn test_html_empty_page() {
        let strategy = HtmlArticleStrategy::new(html()).unwrap();
        let err = strategy
            .extract(&url("https://example.com/"), "<html><body>  </body></html>")
            .unwrap_err();
        assert!(matches!(err, ScrapeError::NoContent));

        let chapter = strategy.extract(&url("https://example.com/"), "<p>Just text</p>").unwrap();
        assert_eq!(chapter.title, "Untitled chapter");
    }

    #[test]
    fn test_json_extraction() {
        let strategy = JsonApiStrategy::new(vec!["api.novels.example".into()], html());
        let u = url("https://api.novels.example/chapters/9");

        let chapter = strategy
            .extract(&u, r#"{"title": "Nine", "content": "First.\n\nSecond."}"#)
            .unwrap();
        assert_eq!(chapter.title, "Nine");
        assert_eq!(chapter.content, "First.\n\nSecond.");

        let wrapped = strategy
            .extract(&u, r#"{"data": {"title": "Ten", "body": "<p>A &amp; B</p><p>C</p>"}}"#)
            .unwrap();
        assert_eq!(wrapped.title, "Ten");
        assert_eq!(wrapped.content, "A & B\n\nC");

        let untitled = strategy.extract(&u, r#"{"chapter": {"content": "Text"}}"#).unwrap();
        assert_eq!(untitled.title, "Untitled chapter");
    }

    #[test]
    fn test_json_errors() {
        let strategy = JsonApiStrategy::new(vec![], html());
        let u = url("https://api.novels.example/chapters/9");

        assert!(matches!(strategy.extract(&u, "not json"), Err(ScrapeError::Json(_))));
        assert!(matches!(
            strategy.extract(&u, r#"{"title": "Empty", "content": "  "}"#),
            Err(ScrapeError::NoContent)
        ));
    }

    #[test]
    fn test_strategy_selection() {
        let scraper = Scraper::new(&settings(&["api.novels.example"])).unwrap();

        let json = scraper.strategy_for(&url("https://API.novels.example/c/1")).unwrap();
        assert_eq!(json.name(), "json-api");

        let html = scraper.strategy_for(&url("https://blog.example.com/post")).unwrap();
        assert_eq!(html.name(), "html-article");
    }

    #[test]
    fn test_parse_url() {
        assert!(Scraper::parse_url("https://example.com/ch1").is_ok());
        assert!(matches!(
            Scraper::parse_url("ftp://example.com/ch1"),
            Err(ScrapeError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(Scraper::parse_url("not a url"), Err(ScrapeError::InvalidUrl(_))));
    }

    #[test]
    fn test_chapter_title() {
        assert_eq!(chapter_title(Some(" Custom "), "Scraped".into()), "Custom");
        assert_eq!(chapter_title(Some(""), "Scraped".into()), "Scraped");
        assert_eq!(chapter_title(None, "x".repeat(300)).chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_error_retryability() {
        assert!(ScrapeError::Status(503).is_retryable());
        assert!(ScrapeError::Status(429).is_retryable());
        assert!(!ScrapeError::Status(404).is_retryable());
        assert!(!ScrapeError::NoContent.is_retryable());
        assert!(!HandlerError::from(ScrapeError::TooLarge { max: 1 }).is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_html_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/story/1"))
            .and(header("user-agent", "ReadHubBot/test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string("<h1>Prologue</h1><p>It began.</p>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let scraper = Scraper::new(&settings(&[])).unwrap();
        let chapter = scraper.fetch(&format!("{}/story/1", server.uri())).await.unwrap();

        assert_eq!(chapter.title, "Prologue");
        assert_eq!(chapter.content, "It began.");
    }

    #[tokio::test]
    async fn test_fetch_json_host() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chapters/2"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "Two",
                "content": "Plain text."
            })))
            .mount(&server)
            .await;

        let scraper = Scraper::new(&settings(&["127.0.0.1"])).unwrap();
        let chapter = scraper
            .fetch(&format!("{}/api/chapters/2", server.uri()))
            .await
            .unwrap();

        assert_eq!(chapter.title, "Two");
        assert_eq!(chapter.content, "Plain text.");
    }

    #[tokio::test]
    async fn test_fetch_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let scraper = Scraper::new(&settings(&[])).unwrap();

        let missing = scraper.fetch(&format!("{}/missing", server.uri())).await.unwrap_err();
        assert!(matches!(missing, ScrapeError::Status(404)));
        assert!(!missing.is_retryable());

        let busy = scraper.fetch(&format!("{}/busy", server.uri())).await.unwrap_err();
        assert!(busy.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_rejects_large_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>x</p>".repeat(20_000)))
            .mount(&server)
            .await;

        let scraper = Scraper::new(&settings(&[])).unwrap();
        let err = scraper.fetch(&server.uri()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::TooLarge { max } if max == 64 * 1024));
    }

    #[tokio::test]
    async fn test_fetch_rejects_other_schemes() {
        let scraper = Scraper::new(&settings(&[])).unwrap();
        let err = scraper.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, ScrapeError::UnsupportedScheme(_)));
    }
}

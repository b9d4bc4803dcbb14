use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::FetchError;
use crate::llm::summarizer::truncate;
use crate::models::RawArticle;

const TITLE_FIELDS: [&str; 6] = ["title", "headline", "subject", "name", "summary", "app_msg"];
const CONTENT_FIELDS: [&str; 7] = ["content", "body", "text", "description", "detail", "article", "app_msg"];
const URL_FIELDS: [&str; 4] = ["url", "link", "source_url", "href"];
const PUBLISHED_FIELDS: [&str; 6] = ["published_at", "published", "timestamp", "time", "pub_date", "created_at"];
const LIST_FIELDS: [&str; 4] = ["redis_value", "data", "news", "items"];

/// Where a run's articles come from.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Fetch the current batch. Order reflects the source's order.
    async fn fetch(&self) -> Result<Vec<RawArticle>, FetchError>;
}

/// JSON-over-HTTP news source.
pub struct HttpNewsSource {
    url: String,
    timeout_secs: u64,
    client: Client,
}

impl HttpNewsSource {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            url: url.into(),
            timeout_secs,
            client,
        })
    }

    pub fn from_config(config: &common::SourceConfig) -> Result<Self, FetchError> {
        Self::new(config.url.trim(), config.timeout_seconds())
    }
}

#[async_trait]
impl NewsSource for HttpNewsSource {
    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Vec<RawArticle>, FetchError> {
        info!("Fetching news from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .header(USER_AGENT, concat!("newsdigest/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/json, text/plain, */*")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| FetchError::Malformed(format!("response is not JSON: {}", e)))?;

        let articles = parse_payload(payload)?;
        info!("Fetched {} articles from {}", articles.len(), self.url);
        Ok(articles)
    }
}

impl HttpNewsSource {
    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout_secs)
        } else {
            FetchError::Http(err)
        }
    }
}

/// Normalize any supported response shape into a list of articles.
pub fn parse_payload(payload: Value) -> Result<Vec<RawArticle>, FetchError> {
    let items = extract_items(payload)?;
    let total = items.len();

    let articles: Vec<RawArticle> = items.iter().filter_map(parse_item).collect();
    if articles.len() < total {
        debug!("Skipped {} of {} items without usable content", total - articles.len(), total);
    }
    Ok(articles)
}

fn extract_items(payload: Value) -> Result<Vec<Value>, FetchError> {
    match payload {
        Value::Array(items) => {
            let wrapped = items
                .first()
                .and_then(|first| first.get("redis_value"))
                .is_some();
            if !wrapped {
                return Ok(items);
            }
            // [{"redis_value": [...]}, {"redis_value": [...]}]
            Ok(items
                .into_iter()
                .filter_map(|mut item| match item.get_mut("redis_value").map(Value::take) {
                    Some(Value::Array(inner)) => Some(inner),
                    _ => None,
                })
                .flatten()
                .collect())
        }
        Value::Object(mut map) => {
            for key in LIST_FIELDS {
                if let Some(Value::Array(_)) = map.get(key) {
                    if let Some(Value::Array(items)) = map.remove(key) {
                        return Ok(items);
                    }
                }
            }
            Ok(vec![Value::Object(map)])
        }
        Value::Null => Ok(Vec::new()),
        other => Err(FetchError::Malformed(format!(
            "expected a list or object of articles, got `{}`",
            truncate(&other.to_string(), 80)
        ))),
    }
}

/// Map one source item to an article. Returns `None` for items without content.
pub fn parse_item(item: &Value) -> Option<RawArticle> {
    match item {
        Value::String(text) => {
            let content = text.trim();
            if content.is_empty() {
                return None;
            }
            Some(RawArticle::new(truncate(content, 100), content))
        }
        Value::Object(_) => {
            let content = first_text(item, &CONTENT_FIELDS)?;
            let title = first_text(item, &TITLE_FIELDS)
                .map(|(field, text)| {
                    if field == "app_msg" {
                        text.lines().next().unwrap_or_default().trim().to_string()
                    } else {
                        text
                    }
                })
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| truncate(&content.1, 50));

            Some(RawArticle {
                title,
                content: content.1,
                url: first_text(item, &URL_FIELDS).map(|(_, url)| url),
                published_at: PUBLISHED_FIELDS
                    .iter()
                    .filter_map(|f| item.get(*f))
                    .find_map(parse_timestamp),
            })
        }
        _ => None,
    }
}

/// First non-empty textual field among `fields`, with the field name it came from.
fn first_text(item: &Value, fields: &[&'static str]) -> Option<(&'static str, String)> {
    fields.iter().find_map(|field| {
        let text = match item.get(*field)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some((*field, text))
    })
}

/// Accepts RFC 3339, "YYYY-MM-DD HH:MM:SS" (UTC) and Unix epoch seconds or milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            s.parse::<i64>().ok().and_then(epoch_to_datetime)
        }
        Value::Number(n) => n.as_i64().and_then(epoch_to_datetime),
        _ => None,
    }
}

fn epoch_to_datetime(raw: i64) -> Option<DateTime<Utc>> {
    // Anything past ~2286 in seconds is taken to be milliseconds
    if raw > 9_999_999_999 {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_list_keeps_order() {
        let articles = parse_payload(json!([
            {"title": "One", "content": "first"},
            {"title": "Two", "content": "second"},
        ]))
        .unwrap();
        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["One", "Two"]);
    }

    #[test]
    fn redis_value_wrappers_are_flattened() {
        let articles = parse_payload(json!([
            {"redis_key": "a", "redis_value": [{"title": "A1", "content": "x"}, {"title": "A2", "content": "y"}]},
            {"redis_key": "b", "redis_value": [{"title": "B1", "content": "z"}]},
            {"redis_key": "c", "redis_value": "not a list"},
        ]))
        .unwrap();
        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["A1", "A2", "B1"]);
    }

    #[test]
    fn object_wrappers_are_unwrapped() {
        for key in ["redis_value", "data", "news", "items"] {
            let payload = json!({ key: [{"headline": "H", "body": "B"}], "status": "ok" });
            let articles = parse_payload(payload).unwrap();
            assert_eq!(articles.len(), 1, "wrapper key {}", key);
            assert_eq!(articles[0].title, "H");
            assert_eq!(articles[0].content, "B");
        }
    }

    #[test]
    fn lone_object_is_one_article() {
        let articles = parse_payload(json!({"title": "Solo", "text": "only one"})).unwrap();
        assert_eq!(articles, vec![RawArticle::new("Solo", "only one")]);
    }

    #[test]
    fn scalar_payload_is_malformed() {
        assert!(matches!(parse_payload(json!("hello")), Err(FetchError::Malformed(_))));
        assert!(matches!(parse_payload(json!(42)), Err(FetchError::Malformed(_))));
        assert!(parse_payload(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn app_msg_supplies_title_and_content() {
        let article = parse_item(&json!({"app_msg": "Fed holds rates\nThe committee voted..."})).unwrap();
        assert_eq!(article.title, "Fed holds rates");
        assert_eq!(article.content, "Fed holds rates\nThe committee voted...");
    }

    #[test]
    fn summary_field_supplies_title() {
        let article = parse_item(&json!({"summary": "Fed holds rates", "content": "The committee voted..."})).unwrap();
        assert_eq!(article.title, "Fed holds rates");
        assert_eq!(article.content, "The committee voted...");

        let article = parse_item(&json!({"summary": "Ignored", "app_msg": "Fed holds rates\nBody"})).unwrap();
        assert_eq!(article.title, "Ignored");
    }

    #[test]
    fn missing_title_falls_back_to_content_prefix() {
        let content = "x".repeat(80);
        let article = parse_item(&json!({ "content": content })).unwrap();
        assert_eq!(article.title, format!("{}...", "x".repeat(50)));
    }

    #[test]
    fn items_without_content_are_skipped() {
        assert!(parse_item(&json!({"title": "No body"})).is_none());
        assert!(parse_item(&json!({"title": "Blank", "content": "   "})).is_none());
        assert!(parse_item(&json!(17)).is_none());
        assert!(parse_item(&json!("")).is_none());
    }

    #[test]
    fn string_items_become_articles() {
        let long = "y".repeat(120);
        let article = parse_item(&json!(long)).unwrap();
        assert_eq!(article.content, long);
        assert_eq!(article.title, format!("{}...", "y".repeat(100)));
    }

    #[test]
    fn url_and_timestamp_aliases() {
        let article = parse_item(&json!({
            "title": "T",
            "content": "C",
            "link": "https://example.com/a",
            "timestamp": 1_700_000_000,
        }))
        .unwrap();
        assert_eq!(article.url.as_deref(), Some("https://example.com/a"));
        assert_eq!(article.published_at, Utc.timestamp_opt(1_700_000_000, 0).single());
    }

    #[test]
    fn timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 10, 14, 30, 0).single();
        assert_eq!(parse_timestamp(&json!("2024-01-10T14:30:00Z")), expected);
        assert_eq!(parse_timestamp(&json!("2024-01-10T16:30:00+02:00")), expected);
        assert_eq!(parse_timestamp(&json!("2024-01-10 14:30:00")), expected);
        assert_eq!(parse_timestamp(&json!(1_704_897_000_000i64)), expected);
        assert_eq!(parse_timestamp(&json!("1704897000")), expected);
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
    }
}

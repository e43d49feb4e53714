use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info};
use url::Url;

use crate::config::{RetryPolicy, UpstreamSettings};
use crate::domain::{CollectionItem, GameId, Username, join_game_ids};
use crate::error::ShelfError;
use crate::normalizer::RawItem;
use crate::xml::{XmlElement, parse_document};

/// HTTP status BGG uses for "report queued, check back shortly".
pub const STATUS_PROCESSING: u16 = 202;

pub trait BggClient: Send + Sync {
    fn fetch_collection(&self, username: &Username) -> Result<Vec<CollectionItem>, ShelfError>;
    /// Raw `<item>` elements for one id or a batch; callers normalize them.
    fn fetch_item_details(&self, ids: &[GameId]) -> Result<Vec<RawItem>, ShelfError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

pub trait Transport: Send + Sync {
    fn get(&self, url: &Url) -> Result<UpstreamResponse, ShelfError>;
}

pub type SleepFn = Arc<dyn Fn(Duration) + Send + Sync>;

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, ShelfError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&settings.user_agent)
                .map_err(|err| ShelfError::ConfigParse(format!("user_agent: {err}")))?,
        );
        if let Some(token) = settings.api_token.as_deref() {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| ShelfError::ConfigParse(format!("api_token: {err}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ShelfError::UpstreamHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &Url) -> Result<UpstreamResponse, ShelfError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|err| ShelfError::UpstreamHttp(err.to_string()))?;
        let status = response.status();
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let body = response
            .text()
            .map_err(|err| ShelfError::UpstreamHttp(err.to_string()))?;
        Ok(UpstreamResponse {
            status: status.as_u16(),
            reason,
            body,
        })
    }
}

#[derive(Clone)]
pub struct BggHttpClient<T: Transport = ReqwestTransport> {
    transport: T,
    base_url: String,
    retry: RetryPolicy,
    sleep: SleepFn,
}

impl BggHttpClient<ReqwestTransport> {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, ShelfError> {
        let transport = ReqwestTransport::new(settings)?;
        Ok(Self::with_transport(settings, transport))
    }
}

impl<T: Transport> BggHttpClient<T> {
    pub fn with_transport(settings: &UpstreamSettings, transport: T) -> Self {
        Self {
            transport,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            retry: settings.retry,
            sleep: Arc::new(std::thread::sleep),
        }
    }

    /// Replaces the wait used between processing polls.
    pub fn with_sleep(mut self, sleep: SleepFn) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn collection_url(&self, username: &Username) -> Result<Url, ShelfError> {
        Url::parse_with_params(
            &format!("{}/collection", self.base_url),
            &[("username", username.as_str()), ("own", "1")],
        )
        .map_err(|err| ShelfError::ConfigParse(format!("base_url: {err}")))
    }

    pub fn thing_url(&self, ids: &[GameId]) -> Result<Url, ShelfError> {
        let joined = join_game_ids(ids);
        Url::parse_with_params(
            &format!("{}/thing", self.base_url),
            &[("id", joined.as_str()), ("stats", "1")],
        )
        .map_err(|err| ShelfError::ConfigParse(format!("base_url: {err}")))
    }

    fn get_ready(&self, url: &Url) -> Result<UpstreamResponse, ShelfError> {
        let sleep = self.sleep.as_ref();
        poll_until_ready(self.retry, sleep, |attempt| {
            debug!(%url, attempt, "bgg.request");
            let start = Instant::now();
            let response = self.transport.get(url)?;
            debug!(
                status = response.status,
                latency_ms = start.elapsed().as_millis() as u64,
                "bgg.response"
            );
            Ok(response)
        })
    }
}

impl<T: Transport> BggClient for BggHttpClient<T> {
    fn fetch_collection(&self, username: &Username) -> Result<Vec<CollectionItem>, ShelfError> {
        let url = self.collection_url(username)?;
        self.get_ready(&url)
            .and_then(|response| parse_collection(&response.body))
            .map_err(|err| ShelfError::collection(username.as_str(), err))
    }

    fn fetch_item_details(&self, ids: &[GameId]) -> Result<Vec<RawItem>, ShelfError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.thing_url(ids)?;
        self.get_ready(&url)
            .and_then(|response| parse_items(&response.body))
            .map_err(|err| ShelfError::game_details(&join_game_ids(ids), err))
    }
}

/// Sends until the response is no longer "processing".
///
/// A 202 waits `policy.delay` (the same delay every time) and asks again, at
/// most `policy.max_retries` times. Any other non-2xx status fails at once.
/// Transport errors are returned as-is without retrying.
pub fn poll_until_ready<F>(
    policy: RetryPolicy,
    sleep: &(dyn Fn(Duration) + Send + Sync),
    mut send: F,
) -> Result<UpstreamResponse, ShelfError>
where
    F: FnMut(u32) -> Result<UpstreamResponse, ShelfError>,
{
    let mut attempt = 0u32;
    loop {
        let response = send(attempt)?;
        if response.status == STATUS_PROCESSING {
            if attempt < policy.max_retries {
                info!(
                    attempt,
                    delay_ms = policy.delay.as_millis() as u64,
                    "BGG is still processing; polling again"
                );
                sleep(policy.delay);
                attempt += 1;
                continue;
            }
            return Err(ShelfError::StillProcessing {
                attempts: attempt + 1,
            });
        }
        if !(200..300).contains(&response.status) {
            let message = if response.reason.is_empty() {
                "BGG request failed".to_string()
            } else {
                response.reason
            };
            return Err(ShelfError::UpstreamStatus {
                status: response.status,
                message,
            });
        }
        return Ok(response);
    }
}

/// Parses a collection document. A document without items is an empty
/// collection.
pub fn parse_collection(xml: &str) -> Result<Vec<CollectionItem>, ShelfError> {
    let doc = parse_document(xml)?;
    check_error_document(&doc)?;
    if doc.name != "items" {
        return Ok(Vec::new());
    }

    doc.children_named("item")
        .map(|item| -> Result<CollectionItem, ShelfError> {
            let id = item
                .attr("objectid")
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    ShelfError::MalformedPayload("collection item without objectid".to_string())
                })?;
            Ok(CollectionItem {
                id: id.to_string(),
                name: collection_name(item),
                image: text_of(item, "image"),
                thumbnail: text_of(item, "thumbnail"),
                year_published: item
                    .child_text("yearpublished")
                    .and_then(|year| year.trim().parse().ok()),
            })
        })
        .collect()
}

/// Parses a thing document into its raw `<item>` elements.
pub fn parse_items(xml: &str) -> Result<Vec<RawItem>, ShelfError> {
    let doc = parse_document(xml)?;
    check_error_document(&doc)?;
    if doc.name != "items" {
        return Ok(Vec::new());
    }
    Ok(doc
        .children
        .into_iter()
        .filter(|child| child.name == "item")
        .collect())
}

// Collection names come as text (`<name sortindex="1">Catan</name>`) while
// thing names carry a `value` attribute; accept both.
fn collection_name(item: &XmlElement) -> String {
    let Some(name) = item.child("name") else {
        return String::new();
    };
    let text = name.text();
    if !text.is_empty() {
        return text.to_string();
    }
    name.attr("value").unwrap_or_default().to_string()
}

fn text_of(item: &XmlElement, name: &str) -> String {
    item.child_text(name).unwrap_or_default().to_string()
}

// BGG answers some invalid requests (unknown user, bad id list) with 200 and
// an <errors> document.
fn check_error_document(doc: &XmlElement) -> Result<(), ShelfError> {
    if doc.name != "errors" && doc.name != "error" {
        return Ok(());
    }
    let message = doc
        .children_named("error")
        .filter_map(|error| error.child_text("message"))
        .chain(doc.child_text("message"))
        .map(str::trim)
        .find(|message| !message.is_empty())
        .unwrap_or("unspecified error");
    Err(ShelfError::MalformedPayload(format!(
        "BGG reported: {message}"
    )))
}

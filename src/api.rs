use std::io::Write;
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::Region;
use crate::error::BackupError;

pub const PER_PAGE: usize = 100;

/// Management API surface both pipelines are written against.
///
/// `get`, `post` and `put` return the decoded response body, e.g.
/// `{"story": {...}}`. `get_all` aggregates every page of a collection and
/// returns the bare items.
pub trait ManagementClient: Send + Sync {
    fn get_all(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<Value>, BackupError>;
    fn get(&self, path: &str) -> Result<Value, BackupError>;
    fn post(&self, path: &str, body: &Value) -> Result<Value, BackupError>;
    fn put(&self, path: &str, body: &Value) -> Result<Value, BackupError>;
    fn download(&self, url: &str, writer: &mut dyn Write) -> Result<u64, BackupError>;
}

#[derive(Clone)]
pub struct StoryblokHttpClient {
    client: Client,
    base_url: String,
    token: HeaderValue,
}

impl StoryblokHttpClient {
    pub fn new(token: &str, region: Region) -> Result<Self, BackupError> {
        Self::with_base_url(token, region.base_url())
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self, BackupError> {
        if token.trim().is_empty() {
            return Err(BackupError::Configuration(
                "oauth token must not be empty".to_string(),
            ));
        }
        let mut token = HeaderValue::from_str(token.trim())
            .map_err(|_| BackupError::Configuration("oauth token is not a valid header".into()))?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("storyblok-backup/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BackupError::Configuration(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| BackupError::ApiHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, self.token.clone())
    }

    fn handle_status(response: Response) -> Result<Response, BackupError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "management API request failed".to_string());
        Err(BackupError::ApiStatus { status, message })
    }

    /// Rate-limited responses are retried here; every other outcome is returned as is.
    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, BackupError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            let response = make_req()
                .send()
                .map_err(|err| BackupError::ApiHttp(err.to_string()))?;
            if attempt < MAX_RETRIES && response.status() == StatusCode::TOO_MANY_REQUESTS {
                let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                warn!(attempt, delay_ms = delay, "rate limited, retrying");
                thread::sleep(Duration::from_millis(delay));
                attempt += 1;
                continue;
            }
            return Ok(response);
        }
    }

    fn decode(response: Response) -> Result<Value, BackupError> {
        let response = Self::handle_status(response)?;
        let text = response
            .text()
            .map_err(|err| BackupError::ApiHttp(err.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|err| BackupError::UnexpectedResponse(err.to_string()))
    }
}

impl ManagementClient for StoryblokHttpClient {
    fn get_all(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<Value>, BackupError> {
        let url = self.url(path);
        let key = collection_key(path);
        let mut items = Vec::new();
        let mut page = 1usize;
        loop {
            debug!(%url, page, "GET page");
            let paging = [("per_page", PER_PAGE.to_string()), ("page", page.to_string())];
            let response = self.send_with_retries(|| {
                self.authorized(self.client.get(&url))
                    .query(params)
                    .query(&paging)
            })?;
            let response = Self::handle_status(response)?;
            let total = response
                .headers()
                .get("total")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<usize>().ok());
            let body: Value = response
                .json()
                .map_err(|err| BackupError::ApiHttp(err.to_string()))?;
            let batch = extract_collection(body, key)?;
            let received = batch.len();
            items.extend(batch);

            if received == 0 || page >= page_count(total) {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    fn get(&self, path: &str) -> Result<Value, BackupError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self.send_with_retries(|| self.authorized(self.client.get(&url)))?;
        Self::decode(response)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, BackupError> {
        let url = self.url(path);
        debug!(%url, "POST");
        let response =
            self.send_with_retries(|| self.authorized(self.client.post(&url)).json(body))?;
        Self::decode(response)
    }

    fn put(&self, path: &str, body: &Value) -> Result<Value, BackupError> {
        let url = self.url(path);
        debug!(%url, "PUT");
        let response =
            self.send_with_retries(|| self.authorized(self.client.put(&url)).json(body))?;
        Self::decode(response)
    }

    fn download(&self, url: &str, writer: &mut dyn Write) -> Result<u64, BackupError> {
        debug!(%url, "download");
        // Asset files live on the public CDN; the token is not sent there.
        let response = self.send_with_retries(|| self.client.get(url))?;
        let mut response = Self::handle_status(response)?;
        std::io::copy(&mut response, writer)
            .map_err(|err| BackupError::ApiHttp(format!("download {url}: {err}")))
    }
}

/// Pages to request for a collection of `total` items; without the header there is one.
pub fn page_count(total: Option<usize>) -> usize {
    total.map(|total| total.div_ceil(PER_PAGE)).unwrap_or(1)
}

/// Name of the array a collection response wraps its items in: the last path segment.
pub fn collection_key(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

fn extract_collection(body: Value, key: &str) -> Result<Vec<Value>, BackupError> {
    match body {
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(BackupError::UnexpectedResponse(format!(
                "field `{key}` is not a list"
            ))),
        },
        _ => Err(BackupError::UnexpectedResponse(format!(
            "response for `{key}` is not an object"
        ))),
    }
}

use async_trait::async_trait;
use attr_scan_core::record::KEY_FIELD;
use attr_scan_core::{ConfigurationError, Record, ScanRequest};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde_json::Value;

use super::page_source::{Cursor, Page, PageError, PageRequest, PageSource};
use crate::config::ScanConfig;

const CLIENT_NAME_HEADER: &str = "clientname";
const CLIENT_SECRET_HEADER: &str = "clientsecret";
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Backend filter parameters shared by every page request of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScanQuery {
    name: String,
    value: String,
    product: Option<String>,
    attribute_names: Option<String>,
}

impl ScanQuery {
    fn from_request(request: &ScanRequest) -> Self {
        // The matched attribute and the key must come back even when the
        // caller restricts output columns, or client-side matching breaks.
        let attribute_names = request.attribute_names().map(|columns| {
            let mut names = vec![KEY_FIELD.to_string(), request.attribute_name().to_string()];
            for column in columns {
                if !names.contains(column) {
                    names.push(column.clone());
                }
            }
            names.join(",")
        });

        Self {
            name: request.attribute_name().to_string(),
            value: request.attribute_value().to_string(),
            product: request.product().map(str::to_string),
            attribute_names,
        }
    }
}

/// Range-query client for the account and license services.
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
    endpoint: Url,
    query: ScanQuery,
}

impl HttpPageSource {
    pub fn new(config: &ScanConfig, request: &ScanRequest) -> Result<Self, ConfigurationError> {
        let endpoint_text = format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            config.resource.path()
        );
        let endpoint = Url::parse(&endpoint_text).map_err(|error| {
            ConfigurationError::new(format!("invalid service URL '{endpoint_text}': {error}"))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(CLIENT_NAME_HEADER),
            HeaderValue::from_str(&config.credentials.client_name).map_err(|_| {
                ConfigurationError::new("client name contains characters not allowed in a header")
            })?,
        );
        if let Some(secret) = &config.credentials.client_secret {
            let mut value = HeaderValue::from_str(secret).map_err(|_| {
                ConfigurationError::new(
                    "client secret contains characters not allowed in a header",
                )
            })?;
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static(CLIENT_SECRET_HEADER), value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| {
                ConfigurationError::new(format!("failed to build HTTP client: {error}"))
            })?;

        Ok(Self {
            client,
            endpoint,
            query: ScanQuery::from_request(request),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn query_pairs(&self, request: &PageRequest) -> Result<Vec<(&'static str, String)>, PageError> {
        let (start_key, start_inclusive) = match &request.cursor {
            Some(cursor) => (cursor_key(cursor)?, false),
            None => (request.range.start, true),
        };

        let mut pairs = vec![
            ("name", self.query.name.clone()),
            ("value", self.query.value.clone()),
            ("startKey", start_key.to_string()),
            ("endKey", request.range.end.to_string()),
            ("startInclusive", start_inclusive.to_string()),
            ("endInclusive", "true".to_string()),
            ("count", request.page_size.to_string()),
        ];
        if let Some(product) = &self.query.product {
            pairs.push(("product", product.clone()));
        }
        if let Some(attribute_names) = &self.query.attribute_names {
            pairs.push(("attributeNames", attribute_names.clone()));
        }
        Ok(pairs)
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, request: PageRequest) -> Result<Page, PageError> {
        let pairs = self.query_pairs(&request)?;
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&pairs)
            .send()
            .await
            .map_err(|error| PageError::Transient(describe_request_error(&error)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| PageError::Transient(describe_request_error(&error)))?;
        decode_page(&body, &request)
    }
}

fn describe_request_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request timed out: {error}")
    } else {
        error.to_string()
    }
}

/// Maps a non-success status onto the retry taxonomy.
pub(crate) fn status_error(status: u16, body: &str) -> PageError {
    let message: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    match status {
        401 | 403 => PageError::Unauthorized { status },
        408 | 429 | 500..=599 => PageError::Transient(format!("status {status}: {message}")),
        _ => PageError::Rejected { status, message },
    }
}

fn cursor_key(cursor: &Cursor) -> Result<u64, PageError> {
    cursor
        .as_str()
        .parse()
        .map_err(|_| PageError::Malformed(format!("cursor '{cursor}' is not a record key")))
}

/// Decodes one page body. An empty array ends the partition; otherwise the
/// last key becomes the cursor for the next request.
pub(crate) fn decode_page(body: &[u8], request: &PageRequest) -> Result<Page, PageError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|error| PageError::Malformed(format!("response body is not JSON: {error}")))?;
    let Value::Array(items) = value else {
        return Err(PageError::Malformed(
            "expected a JSON array of records".to_string(),
        ));
    };

    let mut floor = request.cursor.as_ref().map(cursor_key).transpose()?;
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let record = Record::from_wire(item).map_err(PageError::Malformed)?;
        if !request.range.contains(record.key) {
            return Err(PageError::Malformed(format!(
                "record key {} is outside partition range {}",
                record.key, request.range
            )));
        }
        if floor.is_some_and(|floor| record.key <= floor) {
            return Err(PageError::Malformed(format!(
                "record key {} does not advance past the previous key",
                record.key
            )));
        }
        floor = Some(record.key);
        records.push(record);
    }

    let next = records
        .last()
        .map(|record| Cursor::new(record.key.to_string()));
    Ok(Page { records, next })
}

//! Client for the licensing-search guest API.
//!
//! The site exposes a single "apex execute" endpoint that dispatches on a
//! class name and method, plus an older PDF viewer page that embeds the
//! document as a base64 `data:` URI in an iframe. Both return the latest
//! version of a document for a given `ContentDocumentId`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::http_client::{HttpClient, HttpResponse};
use crate::error::FetchError;
use crate::models::Agency;

pub const DEFAULT_BASE_URL: &str = "https://michildwelfarepubliclicensingsearch.michigan.gov";
pub const APEX_PATH: &str = "/licagencysrch/webruntime/api/apex/execute";
pub const VIEWER_PATH: &str = "/vforcesite/pdfviewer";
pub const SEARCH_PAGE_PATH: &str = "/licagencysrch/";
pub const APEX_CLASSNAME: &str = "@udd/01p8z0000009E4V";

const PDF_DATA_PREFIX: &str = "data:application/pdf;base64,";
const AGENCY_LIST_LABEL: &str = "agency-list";

/// Query string shared by every apex call.
const GUEST_QUERY: [(&str, &str); 3] = [
    ("language", "en-US"),
    ("asGuest", "true"),
    ("htmlEncode", "false"),
];

/// Which upstream surface serves document content.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ContentEndpoint {
    /// `getContentBaseData` on the apex endpoint (JSON, base64 in `returnValue`)
    #[default]
    Apex,
    /// The PDF viewer page (HTML, base64 in an iframe `data:` URI)
    Viewer,
}

impl ContentEndpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apex => "apex",
            Self::Viewer => "viewer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "apex" => Some(Self::Apex),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }
}

/// The agency listing, with the response it was parsed from.
#[derive(Debug, Clone)]
pub struct AgencyDirectory {
    pub response: Value,
    pub agencies: Vec<Agency>,
}

/// One agency's content listing, with the response it was parsed from.
#[derive(Debug, Clone)]
pub struct ContentDetails {
    pub response: Value,
    pub entries: Vec<Value>,
}

/// Anything that can produce the bytes of a document by id.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch and fully decode the current content of a document.
    async fn fetch_document(&self, document_id: &str) -> Result<Vec<u8>, FetchError>;
}

/// Production client for the licensing-search site.
#[derive(Clone)]
pub struct LicensingClient {
    http: HttpClient,
    base_url: String,
    endpoint: ContentEndpoint,
}

impl LicensingClient {
    /// Create a client rooted at `base_url` (scheme and host, no trailing path).
    pub fn new(http: HttpClient, base_url: &str, endpoint: ContentEndpoint) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = http
            .with_referer(format!("{}{}", base_url, SEARCH_PAGE_PATH))
            .with_origin(base_url.clone());
        Self {
            http,
            base_url,
            endpoint,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self) -> ContentEndpoint {
        self.endpoint
    }

    fn apex_url(&self) -> String {
        format!("{}{}", self.base_url, APEX_PATH)
    }

    /// Fetch the full agency listing.
    pub async fn agencies(&self) -> Result<AgencyDirectory, FetchError> {
        let params = json!({ "recordId": null }).to_string();
        let query = [
            ("namespace", ""),
            ("classname", APEX_CLASSNAME),
            ("method", "getAgenciesDetail"),
            ("isContinuation", "false"),
            ("params", params.as_str()),
            ("cacheable", "true"),
            ("language", "en-US"),
            ("asGuest", "true"),
            ("htmlEncode", "false"),
        ];

        let response = self
            .http
            .get(&self.apex_url(), &query)
            .await
            .map_err(|source| request_error(AGENCY_LIST_LABEL, source))?;
        let body = json_body(AGENCY_LIST_LABEL, response).await?;

        let agencies = body
            .pointer("/returnValue/objectData/responseResult")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::MissingPayload {
                document_id: AGENCY_LIST_LABEL.to_string(),
                detail: "returnValue.objectData.responseResult is missing or not a list".to_string(),
            })?;

        let agencies = agencies.iter().cloned().map(Agency::from_json).collect();
        Ok(AgencyDirectory {
            response: body,
            agencies,
        })
    }

    /// Fetch the content listing entries for one agency.
    pub async fn content_details(&self, agency_id: &str) -> Result<ContentDetails, FetchError> {
        let body = json!({
            "namespace": "",
            "classname": APEX_CLASSNAME,
            "method": "getContentDetails",
            "isContinuation": false,
            "params": { "recordId": agency_id },
            "cacheable": false,
        });

        let response = self
            .http
            .post_json(&self.apex_url(), &GUEST_QUERY, &body)
            .await
            .map_err(|source| request_error(agency_id, source))?;
        let body = json_body(agency_id, response).await?;

        let return_value = body
            .get("returnValue")
            .filter(|v| !v.is_null())
            .ok_or_else(|| FetchError::MissingPayload {
                document_id: agency_id.to_string(),
                detail: "response has no returnValue".to_string(),
            })?;

        // An agency without documents comes back with a null list
        let entries = return_value
            .get("contentVersionRes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(ContentDetails {
            response: body,
            entries,
        })
    }

    async fn fetch_apex(&self, document_id: &str) -> Result<Vec<u8>, FetchError> {
        let body = json!({
            "namespace": "",
            "classname": APEX_CLASSNAME,
            "method": "getContentBaseData",
            "isContinuation": false,
            "params": {
                "contentDocumentId": document_id,
                "actionName": "download",
            },
            "cacheable": false,
        });

        let response = self
            .http
            .post_json(&self.apex_url(), &GUEST_QUERY, &body)
            .await
            .map_err(|source| request_error(document_id, source))?;
        let body = json_body(document_id, response).await?;

        let encoded = body
            .get("returnValue")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| FetchError::MissingPayload {
                document_id: document_id.to_string(),
                detail: "returnValue is missing or empty".to_string(),
            })?;

        let encoded = encoded
            .strip_prefix(PDF_DATA_PREFIX)
            .unwrap_or(encoded);
        decode_payload(document_id, encoded)
    }

    async fn fetch_viewer(&self, document_id: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}{}", self.base_url, VIEWER_PATH);
        let response = self
            .http
            .get(&url, &[("id", document_id)])
            .await
            .map_err(|source| request_error(document_id, source))?;
        check_status(document_id, &response)?;
        if let Some(content_type) = response.content_type() {
            tracing::debug!("Viewer page for {} served as {}", document_id, content_type);
        }

        let html = response
            .text()
            .await
            .map_err(|source| request_error(document_id, source))?;

        let encoded =
            extract_embedded_pdf(&html).ok_or_else(|| FetchError::MissingPayload {
                document_id: document_id.to_string(),
                detail: "no iframe with an embedded PDF data URI".to_string(),
            })?;
        decode_payload(document_id, &encoded)
    }
}

#[async_trait]
impl ContentSource for LicensingClient {
    async fn fetch_document(&self, document_id: &str) -> Result<Vec<u8>, FetchError> {
        tracing::debug!(
            "Fetching {} via {} endpoint",
            document_id,
            self.endpoint.as_str()
        );
        match self.endpoint {
            ContentEndpoint::Apex => self.fetch_apex(document_id).await,
            ContentEndpoint::Viewer => self.fetch_viewer(document_id).await,
        }
    }
}

/// Pull the base64 payload out of the viewer page's iframe.
pub fn extract_embedded_pdf(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("iframe[src]").ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("src"))
        .find_map(|src| src.trim().strip_prefix(PDF_DATA_PREFIX).map(str::to_string))
}

fn decode_payload(document_id: &str, encoded: &str) -> Result<Vec<u8>, FetchError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|source| FetchError::Decode {
            document_id: document_id.to_string(),
            source,
        })?;
    if bytes.is_empty() {
        return Err(FetchError::MissingPayload {
            document_id: document_id.to_string(),
            detail: "payload decoded to zero bytes".to_string(),
        });
    }
    Ok(bytes)
}

fn request_error(document_id: &str, source: reqwest::Error) -> FetchError {
    FetchError::Request {
        document_id: document_id.to_string(),
        source,
    }
}

fn check_status(document_id: &str, response: &HttpResponse) -> Result<(), FetchError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(FetchError::Status {
            document_id: document_id.to_string(),
            status: response.status.as_u16(),
        })
    }
}

async fn json_body(document_id: &str, response: HttpResponse) -> Result<Value, FetchError> {
    check_status(document_id, &response)?;
    response
        .json::<Value>()
        .await
        .map_err(|source| request_error(document_id, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_embedded_pdf() {
        let html = r#"<html><body>
            <iframe src="https://example.com/other"></iframe>
            <iframe id="pdf" src="data:application/pdf;base64,JVBERi0xLjQK"></iframe>
        </body></html>"#;
        assert_eq!(extract_embedded_pdf(html).as_deref(), Some("JVBERi0xLjQK"));
    }

    #[test]
    fn test_extract_embedded_pdf_missing() {
        assert_eq!(extract_embedded_pdf("<html><p>Not found</p></html>"), None);
    }

    #[test]
    fn test_decode_payload_ignores_line_breaks() {
        let bytes = decode_payload("D1", "JVBE\nRi0x\r\nLjQK").unwrap();
        assert_eq!(bytes, b"%PDF-1.4\n");
    }

    #[test]
    fn test_decode_payload_rejects_garbage() {
        assert!(matches!(
            decode_payload("D1", "not base64!!"),
            Err(FetchError::Decode { .. })
        ));
    }

    #[test]
    fn test_endpoint_parsing() {
        assert_eq!(ContentEndpoint::from_str("Viewer"), Some(ContentEndpoint::Viewer));
        assert_eq!(ContentEndpoint::from_str("x"), None);
    }
}

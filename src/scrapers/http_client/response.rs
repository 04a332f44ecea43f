//! HTTP response wrapper.

use std::collections::HashMap;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

/// HTTP response wrapper.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub(crate) response: Response,
}

impl HttpResponse {
    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// Get response body as text.
    pub async fn text(self) -> Result<String, reqwest::Error> {
        self.response.text().await
    }

    /// Decode the response body as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, reqwest::Error> {
        self.response.json().await
    }
}

//! HTTP client with a fixed identity and a post-request delay.

mod response;
mod user_agent;

pub use response::HttpResponse;
pub use user_agent::{resolve_user_agent, USER_AGENT};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder};
use serde::Serialize;

/// HTTP client shared by discovery and document fetches.
///
/// Every request carries the configured user agent plus the optional
/// `Referer`/`Origin` headers, and is followed by `request_delay` of sleep
/// so that sequential callers are throttled without tracking time themselves.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    request_delay: Duration,
    referer: Option<String>,
    origin: Option<String>,
}

impl HttpClient {
    /// Create a new HTTP client with the default user agent.
    pub fn new(timeout: Duration, request_delay: Duration) -> Result<Self, reqwest::Error> {
        Self::with_user_agent(timeout, request_delay, None, false)
    }

    /// Create a new HTTP client with custom user agent configuration.
    /// - None: Use default licacquire user agent
    /// - Some("impersonate"): Use a browser user agent
    /// - Some(custom): Use custom user agent string
    pub fn with_user_agent(
        timeout: Duration,
        request_delay: Duration,
        user_agent_config: Option<&str>,
        accept_invalid_certs: bool,
    ) -> Result<Self, reqwest::Error> {
        let user_agent = resolve_user_agent(user_agent_config);
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            request_delay,
            referer: None,
            origin: None,
        })
    }

    /// Set the Referer header for requests.
    pub fn with_referer(mut self, referer: String) -> Self {
        self.referer = Some(referer);
        self
    }

    /// Set the Origin header for requests.
    pub fn with_origin(mut self, origin: String) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Make a GET request with query parameters.
    pub async fn get<Q>(&self, url: &str, query: &Q) -> Result<HttpResponse, reqwest::Error>
    where
        Q: Serialize + ?Sized,
    {
        let request = self.client.get(url).query(query);
        self.send("GET", url, request).await
    }

    /// Make a POST request with a JSON body and query parameters.
    pub async fn post_json<Q, B>(
        &self,
        url: &str,
        query: &Q,
        body: &B,
    ) -> Result<HttpResponse, reqwest::Error>
    where
        Q: Serialize + ?Sized,
        B: Serialize + ?Sized,
    {
        let request = self.client.post(url).query(query).json(body);
        self.send("POST", url, request).await
    }

    async fn send(
        &self,
        method: &str,
        url: &str,
        mut request: RequestBuilder,
    ) -> Result<HttpResponse, reqwest::Error> {
        request = request
            .header("Accept", "*/*")
            .header("X-Requested-With", "XMLHttpRequest");
        if let Some(referer) = &self.referer {
            request = request.header("Referer", referer);
        }
        if let Some(origin) = &self.origin {
            request = request.header("Origin", origin);
        }

        let start = Instant::now();
        let result = request.send().await;
        let duration = start.elapsed();

        // Apply the delay whether or not the request succeeded
        tokio::time::sleep(self.request_delay).await;

        let response = result?;
        tracing::debug!(
            "{} {} -> {} in {}ms",
            method,
            url,
            response.status().as_u16(),
            duration.as_millis()
        );

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }

        Ok(HttpResponse {
            status: response.status(),
            headers,
            response,
        })
    }
}

//! Upstream clients for the licensing-search site.

mod http_client;
pub mod licensing;

pub use http_client::{resolve_user_agent, HttpClient, HttpResponse, USER_AGENT};
pub use licensing::{
    AgencyDirectory, ContentDetails, ContentEndpoint, ContentSource, LicensingClient,
    DEFAULT_BASE_URL,
};

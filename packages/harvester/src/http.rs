//! HTTP client wrapper for the annotation and task servers.
//!
//! The harvester only ever issues read-only GET requests. [`HttpGet`] is the
//! seam between the pagination logic and the network so that paging and rate
//! limiting can be exercised without a server.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use url::Url;

use crate::config::HTTP_TIMEOUT_SECS;
use crate::error::Result;

/// User agent string identifying this harvester.
const USER_AGENT: &str = concat!("annotation-harvester/", env!("CARGO_PKG_VERSION"));

/// A buffered HTTP response.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,

    /// Response headers.
    pub headers: HeaderMap,

    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the server answered 404 Not Found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Read-only HTTP GET capability.
///
/// Implementations return every response, whatever its status; only
/// transport failures are errors here. Status handling belongs to callers.
pub trait HttpGet {
    /// Issue a GET request for `url`.
    fn get(&self, url: &Url) -> Result<HttpResponse>;
}

impl HttpGet for Client {
    fn get(&self, url: &Url) -> Result<HttpResponse> {
        let response = Client::get(self, url.clone()).send()?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes()?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl<T: HttpGet + ?Sized> HttpGet for &T {
    fn get(&self, url: &Url) -> Result<HttpResponse> {
        (**self).get(url)
    }
}

/// Create a configured HTTP client.
///
/// # Returns
/// A `reqwest::blocking::Client` configured with appropriate timeout and user agent.
pub fn create_client() -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

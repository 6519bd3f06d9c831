//! Synthetic responses for when neither the network nor the store can answer.

use reqwest::header::{self, HeaderValue};
use reqwest::StatusCode;

use crate::http::{Request, Response};

/// Built-in offline page. Self-contained, with a button that reloads.
pub const DEFAULT_OFFLINE_PAGE: &str = include_str!("../assets/offline.html");

/// Label of the reload button in the built-in page.
pub const RETRY_BUTTON_TEXT: &str = "Try again";

/// Body of the non-HTML error response.
pub const NETWORK_ERROR_BODY: &str = "Network error";

#[derive(Debug, Clone)]
pub struct OfflineFallback {
    page: String,
}

impl Default for OfflineFallback {
    fn default() -> Self {
        Self::new(DEFAULT_OFFLINE_PAGE)
    }
}

impl OfflineFallback {
    pub fn new(page: impl Into<String>) -> Self {
        Self { page: page.into() }
    }

    /// The offline document for page loads, the 408 error for everything else.
    pub fn respond_to(&self, request: &Request) -> Response {
        if request.accepts_html() {
            self.offline_document()
        } else {
            network_error()
        }
    }

    pub fn offline_document(&self) -> Response {
        Response::new(StatusCode::OK, self.page.clone())
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            )
            .with_header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))
    }
}

/// Client-timeout class error with a throwaway body.
pub fn network_error() -> Response {
    Response::new(StatusCode::REQUEST_TIMEOUT, NETWORK_ERROR_BODY)
}

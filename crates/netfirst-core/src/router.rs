//! Interception routing.
//!
//! Only resources the application deploys itself are managed. Third-party
//! data endpoints and sibling applications on the same host are passed
//! through: serving stale copies of those would be worse than an error.

use url::Url;

use crate::http::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Left alone: no fetch, no store access, no added behavior.
    PassThrough,
    /// Handled by the retrieval policy.
    Managed,
}

/// The deployment host plus the path subtree the application owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    host: String,
    path_prefix: String,
}

impl Scope {
    pub fn new(host: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path_prefix: path_prefix.into(),
        }
    }

    /// Derive the scope from the application's own URL, e.g.
    /// `https://joseprico.github.io/CNT/` → host `joseprico.github.io`,
    /// subtree `/CNT/`.
    pub fn from_app_url(app_url: &Url) -> Option<Self> {
        let host = app_url.host_str()?;
        Some(Self::new(host, app_url.path()))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// Hostname equality (scheme and port ignored) and a plain prefix match
    /// on the path.
    pub fn classify(&self, request: &Request) -> Classification {
        let in_scope = request.url.host_str() == Some(self.host.as_str())
            && request.url.path().starts_with(&self.path_prefix);
        if in_scope {
            Classification::Managed
        } else {
            Classification::PassThrough
        }
    }
}

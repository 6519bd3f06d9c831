use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::http::Response;

/// A captured response as kept in a store.
///
/// Headers are stored as ordered name/value pairs so repeated headers
/// survive. The body is base64 in serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn capture(response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        Self {
            status: response.status.as_u16(),
            headers,
            body: response.body.clone(),
            cached_at: Utc::now(),
        }
    }

    /// Rebuild a response from the snapshot.
    pub fn to_response(&self) -> Result<Response, StoreError> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|_| StoreError::Corrupt(format!("invalid status {}", self.status)))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| StoreError::Corrupt(format!("invalid header name {:?}", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| StoreError::Corrupt(format!("invalid value for header {}", name)))?;
            headers.append(name, value);
        }

        Ok(Response {
            status,
            headers,
            body: self.body.clone(),
        })
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

mod body_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================

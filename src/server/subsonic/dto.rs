//! Subsonic API Data Transfer Objects
//!
//! These types match what the Subsonic REST API returns with `f=json`.
//! DO NOT use these types outside the subsonic module - convert via the adapter.
//!
//! API Reference: http://www.subsonic.org/pages/api.jsp
//!
//! Example response:
//! ```json
//! {
//!   "subsonic-response": {
//!     "status": "failed",
//!     "version": "1.16.1",
//!     "error": { "code": 40, "message": "Wrong username or password" }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Envelope every endpoint is wrapped in
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Envelope {
    #[serde(rename = "subsonic-response")]
    pub response: SubsonicResponse,
}

/// Common response body (ping and scrobble carry nothing else)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubsonicResponse {
    /// "ok" or "failed"
    pub status: String,
    pub version: String,
    /// Server implementation name (OpenSubsonic extension)
    #[serde(rename = "type")]
    pub server_type: Option<String>,
    #[serde(rename = "serverVersion")]
    pub server_version: Option<String>,
    /// Error info if status != "ok"
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

//! Subsonic HTTP client
//!
//! Talks to any Subsonic-compatible server (Navidrome, Gonic, Airsonic...).
//! See: http://www.subsonic.org/pages/api.jsp
//!
//! ## Notes
//!
//! Stream URLs are handed to the audio backend as-is, so they carry the full
//! auth query string. A new salt is generated for every URL.
//!
//! `scrobble` sends `time` in unix milliseconds. Servers that predate 1.8.0
//! ignore it.

use super::{adapter, auth, dto};
use crate::server::{MediaServer, ServerError, TranscodeSettings};
use async_trait::async_trait;

/// REST API version advertised to the server.
pub const API_VERSION: &str = "1.16.1";
/// Client name advertised to the server.
pub const CLIENT_NAME: &str = env!("CARGO_PKG_NAME");

/// Subsonic API client
pub struct SubsonicClient {
    http_client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl std::fmt::Debug for SubsonicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsonicClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl SubsonicClient {
    /// Create a client for the server at `base_url`
    ///
    /// The URL must be http(s). A trailing slash is ignored.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ServerError> {
        let base_url = normalize_base_url(&base_url.into())?;
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| ServerError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            username: username.into(),
            password: password.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check connectivity and credentials
    pub async fn ping(&self) -> Result<adapter::ServerInfo, ServerError> {
        let envelope = self.get("ping.view", &[]).await?;
        adapter::check_status(envelope)
    }

    /// Report playback of a track
    ///
    /// `submission = false` marks it as now playing; `true` counts a play.
    pub async fn scrobble(&self, track_id: &str, submission: bool) -> Result<(), ServerError> {
        let time = chrono::Utc::now().timestamp_millis().to_string();
        let submission = if submission { "true" } else { "false" };
        let envelope = self
            .get(
                "scrobble.view",
                &[("id", track_id), ("time", time.as_str()), ("submission", submission)],
            )
            .await?;
        adapter::check_status(envelope).map(|_| ())
    }

    /// Build the URL for streaming a track
    pub fn stream_url_for(
        &self,
        track_id: &str,
        transcode: Option<&TranscodeSettings>,
        force_raw: bool,
    ) -> String {
        let mut params: Vec<(&str, String)> = vec![("id", track_id.to_string())];
        if force_raw {
            params.push(("format", "raw".to_string()));
        } else if let Some(t) = transcode {
            if !t.codec.is_empty() {
                params.push(("format", t.codec.clone()));
            }
            if t.max_bit_rate_kbps > 0 {
                params.push(("maxBitRate", t.max_bit_rate_kbps.to_string()));
            }
        }
        let borrowed: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.endpoint_url("stream.view", &borrowed)
    }

    /// Full endpoint URL including auth parameters
    fn endpoint_url(&self, endpoint: &str, extra: &[(&str, &str)]) -> String {
        let salt = auth::salt();
        let token = auth::token(&self.password, &salt);

        let mut url = format!(
            "{}/rest/{}?u={}&t={}&s={}&v={}&c={}&f=json",
            self.base_url,
            endpoint,
            urlencoding::encode(&self.username),
            token,
            salt,
            API_VERSION,
            CLIENT_NAME
        );
        for (key, value) in extra {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    /// Send a GET and parse the response envelope
    async fn get(
        &self,
        endpoint: &str,
        extra: &[(&str, &str)],
    ) -> Result<dto::Envelope, ServerError> {
        let url = self.endpoint_url(endpoint, extra);
        tracing::debug!(target: "subsonic", endpoint, "request");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| ServerError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServerError::Network(format!(
                "HTTP {}: {} - {}",
                status,
                status.canonical_reason().unwrap_or("Unknown"),
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<dto::Envelope>()
            .await
            .map_err(|e| ServerError::Parse(e.to_string()))
    }
}

fn normalize_base_url(url: &str) -> Result<String, ServerError> {
    let trimmed = url.trim().trim_end_matches('/');
    let host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));
    match host {
        Some(h) if !h.is_empty() => Ok(trimmed.to_string()),
        _ => Err(ServerError::InvalidUrl(url.to_string())),
    }
}

#[async_trait]
impl MediaServer for SubsonicClient {
    fn stream_url(
        &self,
        track_id: &str,
        transcode: Option<&TranscodeSettings>,
        force_raw: bool,
    ) -> Result<String, ServerError> {
        Ok(self.stream_url_for(track_id, transcode, force_raw))
    }

    fn client_decides_scrobble(&self) -> bool {
        true
    }

    async fn track_began_playback(&self, track_id: &str) -> Result<(), ServerError> {
        self.scrobble(track_id, false).await
    }

    async fn track_ended_playback(
        &self,
        track_id: &str,
        _position_secs: u32,
        submission: bool,
    ) -> Result<(), ServerError> {
        if submission {
            self.scrobble(track_id, true).await
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SubsonicClient {
        SubsonicClient::new("https://music.example.com/", "alice", "sesame").unwrap()
    }

    fn query_value<'a>(url: &'a str, key: &str) -> Option<&'a str> {
        let query = url.split_once('?')?.1;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    #[test]
    fn test_client_creation_trims_slash() {
        assert_eq!(client().base_url(), "https://music.example.com");
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(matches!(
            SubsonicClient::new("ftp://host", "a", "b"),
            Err(ServerError::InvalidUrl(_))
        ));
        assert!(matches!(
            SubsonicClient::new("music.example.com", "a", "b"),
            Err(ServerError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_stream_url_has_auth_params() {
        let url = client().stream_url_for("tr-1", None, false);
        assert!(url.starts_with("https://music.example.com/rest/stream.view?"));
        assert_eq!(query_value(&url, "u"), Some("alice"));
        assert_eq!(query_value(&url, "id"), Some("tr-1"));
        assert_eq!(query_value(&url, "v"), Some(API_VERSION));

        let salt = query_value(&url, "s").unwrap();
        let token = query_value(&url, "t").unwrap();
        assert_eq!(token, auth::token("sesame", salt));
        assert!(query_value(&url, "format").is_none());
    }

    #[test]
    fn test_stream_url_raw_overrides_transcode() {
        let transcode = TranscodeSettings {
            codec: "opus".to_string(),
            max_bit_rate_kbps: 160,
        };
        let url = client().stream_url_for("x", Some(&transcode), true);
        assert_eq!(query_value(&url, "format"), Some("raw"));
        assert!(query_value(&url, "maxBitRate").is_none());
    }

    #[test]
    fn test_stream_url_transcode() {
        let transcode = TranscodeSettings {
            codec: "opus".to_string(),
            max_bit_rate_kbps: 160,
        };
        let url = client().stream_url_for("x", Some(&transcode), false);
        assert_eq!(query_value(&url, "format"), Some("opus"));
        assert_eq!(query_value(&url, "maxBitRate"), Some("160"));
    }

    #[test]
    fn test_ids_are_url_encoded() {
        let url = client().stream_url_for("a b&c", None, false);
        assert_eq!(query_value(&url, "id"), Some("a%20b%26c"));
    }

    #[test]
    fn test_each_url_gets_fresh_salt() {
        let c = client();
        let a = c.stream_url_for("x", None, false);
        let b = c.stream_url_for("x", None, false);
        assert_ne!(query_value(&a, "s"), query_value(&b, "s"));
    }

    #[test]
    fn test_debug_hides_password() {
        let dbg = format!("{:?}", client());
        assert!(!dbg.contains("sesame"));
    }
}

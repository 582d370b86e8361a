//! Adapter layer: Convert Subsonic DTOs to results
//!
//! This is the ONLY place where DTO types are interpreted.

use super::dto;
use crate::server::ServerError;

/// Server identity reported by a successful ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub api_version: String,
    pub server_type: Option<String>,
    pub server_version: Option<String>,
}

/// Turn a response envelope into success or an API error
pub fn check_status(envelope: dto::Envelope) -> Result<ServerInfo, ServerError> {
    let response = envelope.response;
    if response.status != "ok" {
        let error = response.error.unwrap_or(dto::ApiError {
            code: -1,
            message: "Unknown error".to_string(),
        });
        return Err(ServerError::Api {
            code: error.code,
            message: error.message,
        });
    }

    Ok(ServerInfo {
        api_version: response.version,
        server_type: response.server_type,
        server_version: response.server_version,
    })
}

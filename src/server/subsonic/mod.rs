//! Subsonic API integration
//!
//! Provides stream URLs and scrobbling against Subsonic-compatible servers.
//!
//! ## Architecture
//!
//! - `dto` - Data Transfer Objects matching the API response format
//! - `adapter` - Interprets response envelopes
//! - `auth` - Salted token authentication
//! - `client` - HTTP client, implements [`MediaServer`](crate::server::MediaServer)

mod adapter;
mod auth;
mod client;
mod dto;

pub use adapter::ServerInfo;
pub use client::{API_VERSION, SubsonicClient};

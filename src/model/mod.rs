//! Core data models for queued media.
//!
//! Defines the two things a play queue can hold: a streamable [`Track`] from
//! the server library and an internet [`RadioStation`]. Both are wrapped in
//! [`MediaItem`], which is what the playback engine stores.
//!
//! Items are plain values. The engine keeps its own clones so it can bump
//! play counts or flip favorites without touching the caller's copies.

use serde::{Deserialize, Serialize};

/// A track in the server library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Server-side track ID (stable across sessions)
    pub id: String,
    /// Track title
    pub title: String,
    /// Artist IDs, parallel to `artist_names`
    pub artist_ids: Vec<String>,
    /// Display names of the credited artists
    pub artist_names: Vec<String>,
    /// Album title
    pub album: String,
    /// Album ID
    pub album_id: String,
    /// Cover art ID for image lookups
    pub cover_art_id: String,
    /// Duration in seconds
    pub duration_secs: f64,
    pub track_number: u32,
    pub disc_number: u32,
    pub year: Option<i32>,
    pub genre: Option<String>,
    /// Number of plays recorded by the server (bumped locally on scrobble)
    pub play_count: u32,
    /// Starred on the server
    pub favorite: bool,
    /// User rating 0-5 (0 = unrated)
    pub rating: u8,
    /// Bit rate in kbps, if the server reported one
    pub bit_rate: Option<u32>,
    /// File size in bytes
    pub size: Option<u64>,
    /// Server-side file path (informational only)
    pub file_path: Option<String>,
}

impl Track {
    /// Create a track with just the fields the engine needs.
    pub fn new(id: impl Into<String>, title: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            duration_secs,
            ..Default::default()
        }
    }

    /// Artist names joined for display.
    pub fn artist_display(&self) -> String {
        self.artist_names.join(", ")
    }
}

/// An internet radio station.
///
/// The stream URL is already resolved, never transcoded, and not seekable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadioStation {
    pub id: String,
    pub name: String,
    pub stream_url: String,
    pub home_page_url: Option<String>,
}

impl RadioStation {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        stream_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stream_url: stream_url.into(),
            home_page_url: None,
        }
    }
}

/// Discriminant for [`MediaItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaItemKind {
    Track,
    RadioStation,
}

/// Metadata common to every media item.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItemMetadata {
    pub id: String,
    pub kind: MediaItemKind,
    pub name: String,
    pub artist: String,
    pub album: String,
    /// Duration in seconds (0 for radio)
    pub duration_secs: f64,
}

/// Anything that can sit in the play queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MediaItem {
    Track(Track),
    Radio(RadioStation),
}

impl MediaItem {
    /// Shared metadata accessor.
    pub fn metadata(&self) -> MediaItemMetadata {
        match self {
            Self::Track(t) => MediaItemMetadata {
                id: t.id.clone(),
                kind: MediaItemKind::Track,
                name: t.title.clone(),
                artist: t.artist_display(),
                album: t.album.clone(),
                duration_secs: t.duration_secs,
            },
            Self::Radio(r) => MediaItemMetadata {
                id: r.id.clone(),
                kind: MediaItemKind::RadioStation,
                name: r.name.clone(),
                artist: String::new(),
                album: String::new(),
                duration_secs: 0.0,
            },
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Track(t) => &t.id,
            Self::Radio(r) => &r.id,
        }
    }

    pub fn kind(&self) -> MediaItemKind {
        match self {
            Self::Track(_) => MediaItemKind::Track,
            Self::Radio(_) => MediaItemKind::RadioStation,
        }
    }

    /// Known duration in seconds; radio streams report 0.
    pub fn duration_secs(&self) -> f64 {
        match self {
            Self::Track(t) => t.duration_secs,
            Self::Radio(_) => 0.0,
        }
    }

    pub fn as_track(&self) -> Option<&Track> {
        match self {
            Self::Track(t) => Some(t),
            Self::Radio(_) => None,
        }
    }

    pub fn as_track_mut(&mut self) -> Option<&mut Track> {
        match self {
            Self::Track(t) => Some(t),
            Self::Radio(_) => None,
        }
    }

    pub fn is_radio(&self) -> bool {
        matches!(self, Self::Radio(_))
    }
}

impl From<Track> for MediaItem {
    fn from(track: Track) -> Self {
        Self::Track(track)
    }
}

impl From<RadioStation> for MediaItem {
    fn from(station: RadioStation) -> Self {
        Self::Radio(station)
    }
}

// Source identity and episode metadata

use std::fmt;

/// Opaque identifier of an audio resource (path or URI)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceHandle(String);

impl SourceHandle {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Local filesystem path for `file://` URIs and bare paths.
    /// Returns `None` for any other scheme.
    pub fn local_path(&self) -> Option<&str> {
        if let Some(path) = self.0.strip_prefix("file://") {
            return Some(path);
        }
        match self.0.split_once("://") {
            Some(_) => None,
            None => Some(&self.0),
        }
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceHandle {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

impl From<String> for SourceHandle {
    fn from(uri: String) -> Self {
        Self(uri)
    }
}

/// Metadata attached to the current source for presentation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    /// Artwork location, fetched by the presentation layer
    pub artwork_ref: Option<String>,
    /// Duration in milliseconds, filled in once the engine knows it
    pub duration_ms: Option<u64>,
}

impl Metadata {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            artist: Some(artist.into()),
            ..Default::default()
        }
    }

    pub fn with_artwork(mut self, artwork_ref: impl Into<String>) -> Self {
        self.artwork_ref = Some(artwork_ref.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

//! Streaming engine trait and the events it reports back.
//!
//! A [`StreamingEngine`] creates one [`EngineSession`] per manifest binding.
//! Sessions do their own I/O and report lifecycle through [`EngineEvent`]s
//! tagged with the [`SessionId`] they were created with; the resolver drops
//! events from sessions it has already destroyed.

use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::config::{LoadPolicy, StartLevel};
use crate::media::MediaElement;

/// Identifies one engine session within a resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Configuration passed to an engine when creating a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub load: LoadPolicy,
    pub start_level: StartLevel,
    /// Fragments to buffer ahead after the manifest is parsed.
    pub prefetch_fragments: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            load: LoadPolicy::default(),
            start_level: StartLevel::Lowest,
            prefetch_fragments: 3,
        }
    }
}

/// Broad error class, as adaptive-streaming engines report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamErrorKind {
    Network,
    Media,
    Mux,
    Other,
}

/// Specific failure within a [`StreamErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorDetails {
    ManifestLoadError,
    ManifestLoadTimeout,
    ManifestParsingError,
    LevelLoadError,
    LevelLoadTimeout,
    FragLoadError,
    FragLoadTimeout,
    BufferStalled,
    DecodeError,
    Internal,
}

impl ErrorDetails {
    /// Failure to obtain the manifest or a level playlist.
    pub fn is_playlist_load(self) -> bool {
        matches!(
            self,
            Self::ManifestLoadError
                | Self::ManifestLoadTimeout
                | Self::LevelLoadError
                | Self::LevelLoadTimeout
        )
    }
}

/// Error reported by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub details: ErrorDetails,
    pub fatal: bool,
    /// HTTP status of the failed response, when there was one.
    pub status: Option<u16>,
    pub reason: String,
}

impl StreamError {
    pub fn network(details: ErrorDetails, fatal: bool, reason: impl Into<String>) -> Self {
        Self {
            kind: StreamErrorKind::Network,
            details,
            fatal,
            status: None,
            reason: reason.into(),
        }
    }

    pub fn media(details: ErrorDetails, fatal: bool, reason: impl Into<String>) -> Self {
        Self {
            kind: StreamErrorKind::Media,
            details,
            fatal,
            status: None,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// 403 / 404 responses, or a playlist that could not be loaded at all.
    pub fn is_not_found(&self) -> bool {
        matches!(self.status, Some(403 | 404))
            || (self.kind == StreamErrorKind::Network && self.details.is_playlist_load())
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.kind, self.details)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {status})")?;
        }
        if !self.reason.is_empty() {
            write!(f, ": {}", self.reason)?;
        }
        Ok(())
    }
}

/// Lifecycle events a session reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Manifest (and initial level) parsed.
    ManifestParsed { levels: usize },
    /// A fragment was buffered.
    FragmentLoaded { sequence: u64, bytes: usize },
    /// Everything the session was asked to buffer is buffered.
    EndOfStream,
    Error(StreamError),
}

/// Factory for engine sessions bound to elements of type `E`.
pub trait StreamingEngine<E: MediaElement> {
    type Session: EngineSession<E>;

    /// Whether the engine can run in this environment at all.
    fn is_supported(&self) -> bool;

    /// Build a new, unattached session.
    fn create_session(&mut self, id: SessionId, config: &SessionConfig) -> Self::Session;
}

/// One live adaptive-streaming session.
pub trait EngineSession<E: MediaElement> {
    fn attach_media(&mut self, element: Rc<E>);

    /// Start loading `url`.
    fn load_source(&mut self, url: &str);

    /// Cancel pending loads.
    fn stop_load(&mut self);

    fn detach_media(&mut self);

    /// Try to recover from a fatal decode error.
    fn recover_media_error(&mut self) -> Result<(), String>;

    /// Release everything. No event for this session may fire afterwards.
    fn destroy(self);
}

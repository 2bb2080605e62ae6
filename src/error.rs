//! Error types surfaced by the resolver.

use serde::Serialize;
use thiserror::Error;

/// Unrecoverable playback failure handed to the error callback.
///
/// Everything else (missing manifest, decode hiccup, autoplay rejection) is
/// absorbed by the resolver and never reaches the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "kebab-case")]
pub enum PlaybackError {
    /// Manifest, level or fragment fetch failed and no fallback applies.
    #[error("network-error: {0}")]
    Network(String),

    /// Decoding failed and the single recovery attempt did not help.
    #[error("media-error: {0}")]
    Media(String),

    /// Neither an engine nor native playback can handle the source, and
    /// there is no progressive file to fall back to.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl PlaybackError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "network-error",
            Self::Media(_) => "media-error",
            Self::Unsupported(_) => "unsupported",
        }
    }
}

/// Misuse of [`SourceResolver::attach`](crate::SourceResolver::attach).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachError {
    #[error("media element is already bound to another resolver")]
    ElementInUse,
}

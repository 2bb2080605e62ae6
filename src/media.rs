//! Playback element abstraction.
//!
//! Methods take `&self` the way DOM bindings do; implementations keep their
//! state behind `Cell`/`RefCell`.

use std::fmt;

use thiserror::Error;

/// MIME type an element must accept to play HLS natively.
pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";

/// Identifies the resolver currently owning an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resolver#{}", self.0)
    }
}

/// Answer to `canPlayType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanPlay {
    No,
    Maybe,
    Probably,
}

impl CanPlay {
    pub fn is_supported(self) -> bool {
        !matches!(self, Self::No)
    }
}

/// Error codes reported by the element itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaErrorCode {
    Aborted,
    Network,
    Decode,
    SrcNotSupported,
}

/// Rejection of a `play()` request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayError {
    /// Autoplay policy refused playback without a user gesture.
    #[error("playback not allowed without user interaction")]
    NotAllowed,

    #[error("playback aborted: {0}")]
    Aborted(String),
}

/// A media element a resolver can bind sources to.
pub trait MediaElement {
    /// Native support for `mime`.
    fn can_play_type(&self, mime: &str) -> CanPlay;

    /// Point the element at `url`.
    fn set_src(&self, url: &str);

    /// Current source, if any.
    fn src(&self) -> Option<String>;

    /// Request playback start.
    fn play(&self) -> Result<(), PlayError>;

    /// Take exclusive ownership. Returns `false` if another owner holds it;
    /// claiming twice with the same owner succeeds.
    fn claim(&self, owner: OwnerId) -> bool;

    /// Give up ownership if `owner` holds it.
    fn release(&self, owner: OwnerId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_play_support() {
        assert!(!CanPlay::No.is_supported());
        assert!(CanPlay::Maybe.is_supported());
        assert!(CanPlay::Probably.is_supported());
    }

    #[test]
    fn owner_display() {
        assert_eq!(OwnerId(7).to_string(), "resolver#7");
    }
}

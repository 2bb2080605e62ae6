//! In-memory media element.

use std::cell::{Cell, RefCell};

use crate::media::{CanPlay, MediaElement, OwnerId, PlayError, HLS_MIME};

/// Media element that renders nothing and remembers what it was told.
#[derive(Debug)]
pub struct HeadlessElement {
    native_hls: bool,
    autoplay_allowed: bool,
    sources: RefCell<Vec<String>>,
    play_attempts: Cell<u32>,
    playing: Cell<bool>,
    owner: Cell<Option<OwnerId>>,
}

impl Default for HeadlessElement {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessElement {
    /// Element without native HLS support that allows autoplay.
    pub fn new() -> Self {
        Self {
            native_hls: false,
            autoplay_allowed: true,
            sources: RefCell::new(Vec::new()),
            play_attempts: Cell::new(0),
            playing: Cell::new(false),
            owner: Cell::new(None),
        }
    }

    #[must_use]
    pub fn with_native_hls(mut self, native: bool) -> Self {
        self.native_hls = native;
        self
    }

    #[must_use]
    pub fn with_autoplay(mut self, allowed: bool) -> Self {
        self.autoplay_allowed = allowed;
        self
    }

    /// Every URL passed to `set_src`, oldest first.
    pub fn src_history(&self) -> Vec<String> {
        self.sources.borrow().clone()
    }

    pub fn play_attempts(&self) -> u32 {
        self.play_attempts.get()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.get()
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.owner.get()
    }
}

impl MediaElement for HeadlessElement {
    fn can_play_type(&self, mime: &str) -> CanPlay {
        if self.native_hls && mime.eq_ignore_ascii_case(HLS_MIME) {
            CanPlay::Maybe
        } else {
            CanPlay::No
        }
    }

    fn set_src(&self, url: &str) {
        self.playing.set(false);
        self.sources.borrow_mut().push(url.to_string());
    }

    fn src(&self) -> Option<String> {
        self.sources.borrow().last().cloned()
    }

    fn play(&self) -> Result<(), PlayError> {
        self.play_attempts.set(self.play_attempts.get() + 1);
        if !self.autoplay_allowed {
            return Err(PlayError::NotAllowed);
        }
        self.playing.set(true);
        Ok(())
    }

    fn claim(&self, owner: OwnerId) -> bool {
        match self.owner.get() {
            Some(current) if current != owner => false,
            _ => {
                self.owner.set(Some(owner));
                true
            }
        }
    }

    fn release(&self, owner: OwnerId) {
        if self.owner.get() == Some(owner) {
            self.owner.set(None);
        }
    }
}

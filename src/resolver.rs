//! Adaptive video source resolver.
//!
//! Binds a source to a media element using the best delivery mode available
//! and falls back from the HLS manifest to the progressive file at most once
//! per source.
//!
//! ```text
//! Idle ─attach─▶ Resolving ─┬─▶ Streaming(Engine) ─┐
//!                           ├─▶ Streaming(Native) ─┼─fallback─▶ Progressive
//!                           └─▶ Progressive        └─error────▶ Failed
//! any ─detach/drop─▶ TornDown
//! ```
//!
//! The resolver is single-threaded and purely reactive: the caller feeds it
//! engine events ([`SourceResolver::handle_event`]) and element errors
//! ([`SourceResolver::handle_element_error`]).

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::engine::{
    EngineEvent, EngineSession, SessionConfig, SessionId, StreamError, StreamErrorKind,
    StreamingEngine,
};
use crate::error::{AttachError, PlaybackError};
use crate::media::{MediaElement, MediaErrorCode, OwnerId, PlayError, HLS_MIME};
use crate::state::{ErrorBudget, FailureMemory, ResolverState, StreamingMode};
use crate::target::{ResolvedTarget, TargetResolver};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Callback receiving unrecoverable playback errors.
pub type ErrorCallback = Box<dyn FnMut(&PlaybackError)>;

struct LiveSession<S> {
    id: SessionId,
    inner: S,
}

/// Resolves sources onto one media element at a time.
pub struct SourceResolver<E, G>
where
    E: MediaElement,
    G: StreamingEngine<E>,
{
    owner: OwnerId,
    engine: G,
    targets: TargetResolver,
    session_config: SessionConfig,
    element: Option<Rc<E>>,
    source: Option<String>,
    target: Option<ResolvedTarget>,
    session: Option<LiveSession<G::Session>>,
    native_listener: bool,
    recovery_attempted: bool,
    failures: FailureMemory,
    budget: ErrorBudget,
    state: ResolverState,
    initializing: bool,
    next_session: u64,
    on_error: Option<ErrorCallback>,
    last_error: Option<PlaybackError>,
}

impl<E, G> SourceResolver<E, G>
where
    E: MediaElement,
    G: StreamingEngine<E>,
{
    pub fn new(engine: G, config: &ResolverConfig) -> Result<Self> {
        Ok(Self {
            owner: OwnerId(NEXT_OWNER.fetch_add(1, Ordering::Relaxed)),
            engine,
            targets: TargetResolver::new(config)?,
            session_config: SessionConfig {
                load: config.load,
                start_level: config.start_level,
                prefetch_fragments: config.prefetch_fragments,
            },
            element: None,
            source: None,
            target: None,
            session: None,
            native_listener: false,
            recovery_attempted: false,
            failures: FailureMemory::default(),
            budget: ErrorBudget::new(config.error_budget),
            state: ResolverState::Idle,
            initializing: false,
            next_session: 1,
            on_error: None,
            last_error: None,
        })
    }

    /// Register the error callback, replacing any previous one.
    pub fn on_error(&mut self, callback: impl FnMut(&PlaybackError) + 'static) {
        self.on_error = Some(Box::new(callback));
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn state(&self) -> ResolverState {
        self.state
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn target(&self) -> Option<&ResolvedTarget> {
        self.target.as_ref()
    }

    /// Id of the live engine session, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn failures(&self) -> &FailureMemory {
        &self.failures
    }

    pub fn budget(&self) -> &ErrorBudget {
        &self.budget
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing
    }

    /// Most recent error handed to the callback.
    pub fn last_error(&self) -> Option<&PlaybackError> {
        self.last_error.as_ref()
    }

    pub fn engine(&self) -> &G {
        &self.engine
    }

    /// Bind `source` to `element`.
    ///
    /// Either being `None` (or an empty source) tears the current binding
    /// down. Re-attaching the bound source to the same element is a no-op.
    ///
    /// `&mut self` already rules out a second attach while one is binding;
    /// the initialising flag only records it and is cleared on every exit.
    pub fn attach(
        &mut self,
        element: Option<Rc<E>>,
        source: Option<&str>,
    ) -> std::result::Result<ResolverState, AttachError> {
        debug_assert!(!self.initializing, "attach re-entered while binding");

        let (Some(element), Some(source)) = (element, source.filter(|s| !s.is_empty())) else {
            debug!("{}: no element or no source, going idle", self.owner);
            self.teardown();
            self.release_element();
            self.source = None;
            self.target = None;
            self.state = ResolverState::Idle;
            return Ok(self.state);
        };

        if self.is_bound_to(&element, source) {
            debug!("{}: {source} already bound, skipping", self.owner);
            return Ok(self.state);
        }

        self.initializing = true;
        let result = self.bind(&element, source);
        self.initializing = false;
        result
    }

    /// Unmount: tear down and release the element.
    pub fn detach(&mut self) {
        if self.state != ResolverState::TornDown {
            debug!("{}: detaching", self.owner);
        }
        self.teardown();
        self.release_element();
        self.source = None;
        self.target = None;
        self.initializing = false;
        self.state = ResolverState::TornDown;
    }

    /// Feed an event from engine session `id`.
    pub fn handle_event(&mut self, id: SessionId, event: EngineEvent) {
        match &self.session {
            Some(live) if live.id == id => {}
            _ => {
                debug!("{}: dropping event from stale {id}", self.owner);
                return;
            }
        }

        match event {
            EngineEvent::ManifestParsed { levels } => {
                info!("{id}: manifest parsed, {levels} level(s)");
                if let Some(source) = &self.source {
                    self.failures.clear(source);
                }
                self.budget.reset();
                self.try_play();
            }
            EngineEvent::FragmentLoaded { sequence, bytes } => {
                debug!("{id}: fragment {sequence} buffered ({bytes} bytes)");
                self.budget.reset();
            }
            EngineEvent::EndOfStream => debug!("{id}: end of stream"),
            EngineEvent::Error(err) if !err.fatal => {
                if self.budget.record() {
                    warn!(
                        "{id}: {} consecutive errors exceed budget of {}, escalating: {err}",
                        self.budget.used(),
                        self.budget.threshold()
                    );
                    self.handle_fatal(&err);
                } else {
                    debug!(
                        "{id}: non-fatal error {}/{}: {err}",
                        self.budget.used(),
                        self.budget.threshold()
                    );
                }
            }
            EngineEvent::Error(err) => {
                warn!("{id}: fatal error: {err}");
                self.handle_fatal(&err);
            }
        }
    }

    /// Feed an error raised by the element itself.
    ///
    /// Only acts while a natively bound manifest is awaiting its one-shot
    /// error listener.
    pub fn handle_element_error(&mut self, code: MediaErrorCode) {
        if !self.native_listener {
            debug!("{}: element error {code:?} with no listener armed", self.owner);
            return;
        }
        self.native_listener = false;

        match code {
            MediaErrorCode::SrcNotSupported | MediaErrorCode::Network => {
                let fallback = self.target.as_ref().and_then(ResolvedTarget::fallback);
                match fallback.map(str::to_string) {
                    Some(url) if self.mark_failed() => {
                        warn!("{}: native playback rejected manifest ({code:?}), falling back to {url}", self.owner);
                        self.bind_progressive(url);
                    }
                    _ => {
                        let reason = format!("element rejected {}", self.bound_url());
                        self.fail(PlaybackError::Unsupported(reason));
                    }
                }
            }
            MediaErrorCode::Decode => {
                let reason = format!("element failed to decode {}", self.bound_url());
                self.fail(PlaybackError::Media(reason));
            }
            MediaErrorCode::Aborted => {
                debug!("{}: element load aborted", self.owner);
            }
        }
    }

    fn bind(
        &mut self,
        element: &Rc<E>,
        source: &str,
    ) -> std::result::Result<ResolverState, AttachError> {
        self.teardown();

        let same_element = self
            .element
            .as_ref()
            .is_some_and(|current| Rc::ptr_eq(current, element));
        if !same_element {
            self.release_element();
            if !element.claim(self.owner) {
                warn!("{}: element already owned by another resolver", self.owner);
                self.source = None;
                self.target = None;
                self.state = ResolverState::Idle;
                return Err(AttachError::ElementInUse);
            }
            self.element = Some(Rc::clone(element));
        }

        self.source = Some(source.to_string());
        self.budget.reset();
        self.recovery_attempted = false;
        self.state = ResolverState::Resolving;

        let target = self.targets.resolve(source, &self.failures);
        info!("{}: {source} -> {:?} {}", self.owner, target.kind(), target.url());
        self.target = Some(target.clone());

        match target {
            ResolvedTarget::Progressive { url } => self.bind_progressive(url),
            ResolvedTarget::Manifest { url, fallback } => {
                if element.can_play_type(HLS_MIME).is_supported() {
                    debug!("{}: element plays HLS natively", self.owner);
                    element.set_src(&url);
                    self.native_listener = true;
                    self.state = ResolverState::Streaming(StreamingMode::Native);
                } else if self.engine.is_supported() {
                    self.start_session(element, &url);
                } else if let Some(fallback) = fallback {
                    info!("{}: no HLS support, using progressive file", self.owner);
                    self.bind_progressive(fallback);
                } else {
                    self.fail(PlaybackError::Unsupported(format!(
                        "no HLS engine or native support for {url}"
                    )));
                }
            }
        }

        Ok(self.state)
    }

    fn start_session(&mut self, element: &Rc<E>, url: &str) {
        let id = SessionId(self.next_session);
        self.next_session += 1;

        let mut session = self.engine.create_session(id, &self.session_config);
        session.attach_media(Rc::clone(element));
        session.load_source(url);
        debug!("{id}: loading {url}");

        self.session = Some(LiveSession { id, inner: session });
        self.state = ResolverState::Streaming(StreamingMode::Engine);
    }

    fn handle_fatal(&mut self, err: &StreamError) {
        match err.kind {
            StreamErrorKind::Network => {
                let fallback = self
                    .target
                    .as_ref()
                    .and_then(ResolvedTarget::fallback)
                    .map(str::to_string);
                match fallback {
                    Some(url) if self.mark_failed() => {
                        let what = if err.is_not_found() {
                            "manifest unavailable"
                        } else {
                            "stream failed"
                        };
                        warn!("{}: {what} ({err}), falling back to {url}", self.owner);
                        self.teardown();
                        self.bind_progressive(url);
                    }
                    _ => self.fail(PlaybackError::Network(err.to_string())),
                }
            }
            StreamErrorKind::Media => {
                if self.recovery_attempted {
                    self.fail(PlaybackError::Media(err.to_string()));
                    return;
                }
                self.recovery_attempted = true;
                let Some(live) = self.session.as_mut() else {
                    return;
                };
                match live.inner.recover_media_error() {
                    Ok(()) => {
                        info!("{}: recovering from media error: {err}", live.id);
                        self.budget.reset();
                    }
                    Err(reason) => {
                        self.fail(PlaybackError::Media(format!(
                            "{err}; recovery failed: {reason}"
                        )));
                    }
                }
            }
            StreamErrorKind::Mux | StreamErrorKind::Other => {
                self.fail(PlaybackError::Media(err.to_string()));
            }
        }
    }

    /// Record the current source in failure memory. `false` if it already
    /// fell back once.
    fn mark_failed(&mut self) -> bool {
        match &self.source {
            Some(source) => self.failures.mark(source),
            None => false,
        }
    }

    fn bind_progressive(&mut self, url: String) {
        if let Some(element) = &self.element {
            element.set_src(&url);
        }
        info!("{}: bound progressive {url}", self.owner);
        self.target = Some(ResolvedTarget::Progressive { url });
        self.state = ResolverState::Progressive;
    }

    fn try_play(&self) {
        let Some(element) = &self.element else {
            return;
        };
        match element.play() {
            Ok(()) => debug!("{}: playback started", self.owner),
            Err(PlayError::NotAllowed) => debug!("{}: autoplay blocked", self.owner),
            Err(e) => debug!("{}: play() rejected: {e}", self.owner),
        }
    }

    /// Tear down, enter `Failed` and surface `err`.
    fn fail(&mut self, err: PlaybackError) {
        self.teardown();
        self.state = ResolverState::Failed;
        warn!("{}: {err}", self.owner);
        if let Some(callback) = self.on_error.as_mut() {
            callback(&err);
        }
        self.last_error = Some(err);
    }

    fn bound_url(&self) -> &str {
        self.target.as_ref().map_or("", ResolvedTarget::url)
    }

    fn is_bound_to(&self, element: &Rc<E>, source: &str) -> bool {
        self.state.is_bound()
            && self.source.as_deref() == Some(source)
            && self
                .element
                .as_ref()
                .is_some_and(|current| Rc::ptr_eq(current, element))
    }

    /// Stop, detach and destroy the live session; disarm the native
    /// listener.
    fn teardown(&mut self) {
        self.native_listener = false;
        if let Some(LiveSession { id, mut inner }) = self.session.take() {
            debug!("{id}: teardown");
            inner.stop_load();
            inner.detach_media();
            inner.destroy();
        }
    }

    fn release_element(&mut self) {
        if let Some(element) = self.element.take() {
            element.release(self.owner);
        }
    }
}

impl<E, G> Drop for SourceResolver<E, G>
where
    E: MediaElement,
    G: StreamingEngine<E>,
{
    fn drop(&mut self) {
        self.detach();
    }
}

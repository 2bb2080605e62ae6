//! HTTP-backed streaming engine.
//!
//! Each session spawns one tokio task that loads the manifest (and the
//! chosen level for master playlists), reports `ManifestParsed`, then
//! buffers the first few fragments. Events go out over an unbounded channel
//! tagged with the session id; stopping or destroying the session aborts the
//! task.

use std::rc::Rc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use super::fetch::{FetchError, Fetcher};
use super::playlist::{self, PlaylistError};
use crate::engine::{
    EngineEvent, EngineSession, ErrorDetails, SessionConfig, SessionId, StreamError,
    StreamingEngine,
};
use crate::media::MediaElement;

/// Event as delivered to the driver loop.
pub type SessionEvent = (SessionId, EngineEvent);

/// Engine that fetches playlists and fragments over HTTP.
#[derive(Debug)]
pub struct HttpEngine {
    fetcher: Fetcher,
    events: UnboundedSender<SessionEvent>,
}

impl HttpEngine {
    pub fn new(fetcher: Fetcher, events: UnboundedSender<SessionEvent>) -> Self {
        Self { fetcher, events }
    }

    /// Engine plus the receiving end of its event channel.
    pub fn channel(fetcher: Fetcher) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(fetcher, tx), rx)
    }
}

impl<E: MediaElement> StreamingEngine<E> for HttpEngine {
    type Session = HttpSession;

    fn is_supported(&self) -> bool {
        tokio::runtime::Handle::try_current().is_ok()
    }

    fn create_session(&mut self, id: SessionId, config: &SessionConfig) -> HttpSession {
        HttpSession {
            id,
            config: config.clone(),
            fetcher: self.fetcher.clone(),
            events: self.events.clone(),
            url: None,
            attached: false,
            task: None,
        }
    }
}

/// One manifest load in flight.
#[derive(Debug)]
pub struct HttpSession {
    id: SessionId,
    config: SessionConfig,
    fetcher: Fetcher,
    events: UnboundedSender<SessionEvent>,
    url: Option<String>,
    attached: bool,
    task: Option<JoinHandle<()>>,
}

impl HttpSession {
    fn spawn_load(&mut self) {
        self.abort();
        let Some(url) = self.url.clone() else {
            return;
        };
        let loader = Loader {
            id: self.id,
            config: self.config.clone(),
            fetcher: self.fetcher.clone(),
            events: self.events.clone(),
        };
        self.task = Some(tokio::spawn(loader.run(url)));
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<E: MediaElement> EngineSession<E> for HttpSession {
    fn attach_media(&mut self, _element: Rc<E>) {
        self.attached = true;
        if self.task.is_none() && self.url.is_some() {
            self.spawn_load();
        }
    }

    fn load_source(&mut self, url: &str) {
        self.url = Some(url.to_string());
        if self.attached {
            self.spawn_load();
        }
    }

    fn stop_load(&mut self) {
        debug!("{}: stop load", self.id);
        self.abort();
    }

    fn detach_media(&mut self) {
        self.attached = false;
    }

    fn recover_media_error(&mut self) -> Result<(), String> {
        if self.url.is_none() {
            return Err("no source loaded".to_string());
        }
        info!("{}: reloading after media error", self.id);
        self.spawn_load();
        Ok(())
    }

    fn destroy(mut self) {
        self.abort();
    }
}

impl Drop for HttpSession {
    fn drop(&mut self) {
        self.abort();
    }
}

/// State moved into the load task.
struct Loader {
    id: SessionId,
    config: SessionConfig,
    fetcher: Fetcher,
    events: UnboundedSender<SessionEvent>,
}

impl Loader {
    fn send(&self, event: EngineEvent) {
        // receiver gone means the driver shut down
        let _ = self.events.send((self.id, event));
    }

    async fn run(self, url: String) {
        if let Err(err) = self.load(&url).await {
            self.send(EngineEvent::Error(err));
        }
    }

    async fn load(&self, url: &str) -> Result<(), StreamError> {
        let manifest_url = Url::parse(url).map_err(|e| {
            StreamError::network(ErrorDetails::ManifestLoadError, true, e.to_string())
        })?;

        let text = self
            .fetcher
            .fetch_text(url, &self.config.load.manifest)
            .await
            .map_err(|e| {
                fetch_error(
                    e,
                    ErrorDetails::ManifestLoadError,
                    ErrorDetails::ManifestLoadTimeout,
                )
            })?;

        let (level_url, level_text, levels) = if playlist::is_master(&text) {
            let variants = playlist::parse_master(&text, &manifest_url).map_err(parse_error)?;
            let variant = playlist::select_variant(&variants, self.config.start_level)
                .ok_or_else(|| parse_error(PlaylistError::NoVariants))?;
            debug!(
                "{}: {} variant(s), starting at {} bps",
                self.id,
                variants.len(),
                variant.bandwidth
            );
            let level_text = self
                .fetcher
                .fetch_text(variant.uri.as_str(), &self.config.load.level)
                .await
                .map_err(|e| {
                    fetch_error(e, ErrorDetails::LevelLoadError, ErrorDetails::LevelLoadTimeout)
                })?;
            (variant.uri.clone(), level_text, variants.len())
        } else {
            (manifest_url, text, 1)
        };

        let media = playlist::parse_media(&level_text, &level_url).map_err(parse_error)?;
        self.send(EngineEvent::ManifestParsed { levels });

        for segment in media.segments.iter().take(self.config.prefetch_fragments) {
            let body = self
                .fetcher
                .fetch(segment.uri.as_str(), &self.config.load.fragment, |_, e| {
                    self.send(EngineEvent::Error(fetch_error_nonfatal(e)));
                })
                .await
                .map_err(|e| {
                    fetch_error(e, ErrorDetails::FragLoadError, ErrorDetails::FragLoadTimeout)
                })?;
            self.send(EngineEvent::FragmentLoaded {
                sequence: segment.sequence,
                bytes: body.len(),
            });
        }

        self.send(EngineEvent::EndOfStream);
        Ok(())
    }
}

fn fetch_error(e: FetchError, on_error: ErrorDetails, on_timeout: ErrorDetails) -> StreamError {
    let details = if e.is_timeout() { on_timeout } else { on_error };
    let status = e.status();
    let err = StreamError::network(details, true, e.to_string());
    match status {
        Some(code) => err.with_status(code),
        None => err,
    }
}

fn fetch_error_nonfatal(e: &FetchError) -> StreamError {
    let mut err = fetch_error(
        e.clone(),
        ErrorDetails::FragLoadError,
        ErrorDetails::FragLoadTimeout,
    );
    err.fatal = false;
    err
}

fn parse_error(e: PlaylistError) -> StreamError {
    StreamError::network(ErrorDetails::ManifestParsingError, true, e.to_string())
}

//! Drive a resolver end to end against real HTTP endpoints.

use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use super::element::HeadlessElement;
use super::engine::{HttpEngine, SessionEvent};
use super::fetch::Fetcher;
use crate::config::ResolverConfig;
use crate::engine::EngineEvent;
use crate::error::PlaybackError;
use crate::media::MediaErrorCode;
use crate::resolver::SourceResolver;
use crate::state::{ResolverState, StreamingMode};
use crate::target::{ResolvedTarget, TargetKind};

/// Environment the probe pretends to run in.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Element plays HLS itself (Safari-like).
    pub native_hls: bool,
    /// Autoplay is permitted.
    pub autoplay: bool,
    /// Upper bound on the whole probe.
    pub timeout: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            native_hls: false,
            autoplay: true,
            timeout: Duration::from_secs(30),
        }
    }
}

/// What happened while resolving one source.
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackReport {
    pub source: String,
    /// Target picked before any error handling.
    pub initial_target: Option<ResolvedTarget>,
    /// Target bound when the probe settled.
    pub final_target: Option<ResolvedTarget>,
    pub state: ResolverState,
    /// Every URL the element was pointed at.
    pub element_sources: Vec<String>,
    pub fragments_buffered: usize,
    pub play_attempts: u32,
    pub playing: bool,
    pub fell_back: bool,
    pub timed_out: bool,
    pub error: Option<PlaybackError>,
    pub elapsed_ms: u128,
}

/// Resolve `source` with a headless element and the HTTP engine, then run
/// the event loop until playback settles.
pub async fn probe(
    source: &str,
    config: &ResolverConfig,
    options: &ProbeOptions,
) -> Result<PlaybackReport> {
    let started = Instant::now();
    let fetcher = Fetcher::new()?;
    let (engine, mut events) = HttpEngine::channel(fetcher.clone());
    let mut resolver = SourceResolver::new(engine, config)?;

    let element = Rc::new(
        HeadlessElement::new()
            .with_native_hls(options.native_hls)
            .with_autoplay(options.autoplay),
    );

    resolver.attach(Some(Rc::clone(&element)), Some(source))?;
    let initial_target = resolver.target().cloned();
    info!("probing {source}: {:?}", resolver.state());

    let deadline = tokio::time::sleep(options.timeout);
    tokio::pin!(deadline);

    let mut timed_out = false;
    let mut fragments = 0;

    if resolver.state() == ResolverState::Streaming(StreamingMode::Native) {
        // a native element fetches the manifest itself; mirror that
        let url = resolver.target().map(|t| t.url().to_string()).unwrap_or_default();
        tokio::select! {
            result = fetcher.fetch_text(&url, &config.load.manifest) => {
                if let Err(e) = result {
                    debug!("native manifest load failed: {e}");
                    resolver.handle_element_error(MediaErrorCode::SrcNotSupported);
                }
            }
            () = &mut deadline => timed_out = true,
        }
    } else {
        timed_out = drive(&mut resolver, &mut events, &mut deadline, &mut fragments).await;
    }

    if timed_out {
        warn!("probe of {source} timed out after {:?}", options.timeout);
    }

    let state = resolver.state();
    let final_target = resolver.target().cloned();
    let error = resolver.last_error().cloned();
    let fell_back = initial_target.as_ref().map(ResolvedTarget::kind) == Some(TargetKind::Manifest)
        && state == ResolverState::Progressive;

    resolver.detach();

    Ok(PlaybackReport {
        source: source.to_string(),
        initial_target,
        final_target,
        state,
        element_sources: element.src_history(),
        fragments_buffered: fragments,
        play_attempts: element.play_attempts(),
        playing: element.is_playing(),
        fell_back,
        timed_out,
        error,
        elapsed_ms: started.elapsed().as_millis(),
    })
}

/// Feed engine events until the engine session ends or the deadline hits.
/// Returns `true` on timeout.
async fn drive(
    resolver: &mut SourceResolver<HeadlessElement, HttpEngine>,
    events: &mut UnboundedReceiver<SessionEvent>,
    deadline: &mut std::pin::Pin<&mut tokio::time::Sleep>,
    fragments: &mut usize,
) -> bool {
    while resolver.state() == ResolverState::Streaming(StreamingMode::Engine) {
        tokio::select! {
            event = events.recv() => {
                let Some((id, event)) = event else {
                    return false;
                };
                let current = resolver.session_id() == Some(id);
                let finished = matches!(event, EngineEvent::EndOfStream);
                if current && matches!(event, EngineEvent::FragmentLoaded { .. }) {
                    *fragments += 1;
                }
                resolver.handle_event(id, event);
                if current && finished {
                    return false;
                }
            }
            () = deadline.as_mut() => return true,
        }
    }
    false
}

//! Headless probe against a local HTTP fixture.
//!
//! The fixture is an axum `Router` serving a static route table from its
//! fallback handler and recording every requested path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::Router;
use tokio::net::TcpListener;

use streamfall::headless::{probe, ProbeOptions};
use streamfall::{PlaybackError, ResolverConfig, ResolverState, RetryPolicy, StreamingMode};

// ─── Test server ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct Routes {
    table: HashMap<String, (StatusCode, &'static str)>,
    requests: Mutex<Vec<String>>,
}

struct Fixture {
    base: String,
    routes: Arc<Routes>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl Fixture {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn hits(&self, path: &str) -> usize {
        self.routes
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

/// Answer from the route table; unknown paths are 404.
async fn respond(State(routes): State<Arc<Routes>>, uri: Uri) -> (StatusCode, &'static str) {
    let path = uri.path().to_string();
    let response = routes
        .table
        .get(&path)
        .copied()
        .unwrap_or((StatusCode::NOT_FOUND, "not found"));
    routes.requests.lock().unwrap().push(path);
    response
}

/// Serve `routes` (path, status, body) on a random localhost port.
async fn serve(routes: Vec<(&'static str, u16, &'static str)>) -> Fixture {
    let routes = Arc::new(Routes {
        table: routes
            .into_iter()
            .map(|(path, status, body)| {
                (
                    path.to_string(),
                    (StatusCode::from_u16(status).unwrap(), body),
                )
            })
            .collect(),
        ..Routes::default()
    });
    let router = Router::new()
        .fallback(respond)
        .with_state(Arc::clone(&routes));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        shutdown_rx.await.ok();
    });
    tokio::spawn(async move {
        server.await.unwrap();
    });

    Fixture {
        base: format!("http://{addr}"),
        routes,
        shutdown_tx: Some(shutdown_tx),
    }
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

fn options() -> ProbeOptions {
    ProbeOptions {
        timeout: Duration::from_secs(10),
        ..ProbeOptions::default()
    }
}

const MEDIA: &str = "#EXTM3U
#EXT-X-TARGETDURATION:4
#EXTINF:4.0,
seg0.ts
#EXTINF:4.0,
seg1.ts
#EXT-X-ENDLIST
";

const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=3000000,RESOLUTION=1280x720
720p/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
360p/index.m3u8
";

#[tokio::test]
async fn missing_manifest_falls_back_to_mp4() {
    let fixture = serve(vec![("/courses/5/video-1.mp4", 200, "mp4 bytes")]).await;
    let source = fixture.url("/courses/5/video-1.mp4");

    let report = probe(&source, &ResolverConfig::default(), &options())
        .await
        .unwrap();

    assert_eq!(report.state, ResolverState::Progressive);
    assert!(report.fell_back);
    assert!(report.error.is_none());
    assert_eq!(report.element_sources, vec![source.clone()]);
    assert_eq!(fixture.hits("/courses/5/hls/video-1/video-1.m3u8"), 1);
}

#[tokio::test]
async fn media_playlist_streams_and_plays() {
    let fixture = serve(vec![
        ("/live/stream.m3u8", 200, MEDIA),
        ("/live/seg0.ts", 200, "segment-zero"),
        ("/live/seg1.ts", 200, "segment-one"),
    ])
    .await;

    let report = probe(
        &fixture.url("/live/stream.m3u8"),
        &ResolverConfig::default(),
        &options(),
    )
    .await
    .unwrap();

    assert_eq!(report.state, ResolverState::Streaming(StreamingMode::Engine));
    assert_eq!(report.fragments_buffered, 2);
    assert!(report.playing);
    assert!(!report.fell_back);
    assert!(report.element_sources.is_empty());
}

#[tokio::test]
async fn master_playlist_starts_at_lowest_level() {
    let fixture = serve(vec![
        ("/v/hls/intro/intro.m3u8", 200, MASTER),
        ("/v/hls/intro/360p/index.m3u8", 200, MEDIA),
        ("/v/hls/intro/360p/seg0.ts", 200, "a"),
        ("/v/hls/intro/360p/seg1.ts", 200, "b"),
    ])
    .await;

    let report = probe(
        &fixture.url("/v/intro.mp4"),
        &ResolverConfig::default(),
        &options(),
    )
    .await
    .unwrap();

    assert_eq!(report.state, ResolverState::Streaming(StreamingMode::Engine));
    assert_eq!(report.fragments_buffered, 2);
    assert_eq!(fixture.hits("/v/hls/intro/720p/index.m3u8"), 0);
    assert_eq!(fixture.hits("/v/intro.mp4"), 0);
}

#[tokio::test]
async fn failing_fragments_exhaust_budget_and_fall_back() {
    let fixture = serve(vec![
        ("/v/hls/intro/intro.m3u8", 200, MEDIA),
        ("/v/hls/intro/seg0.ts", 503, "busy"),
    ])
    .await;
    let config = ResolverConfig {
        error_budget: 1,
        load: streamfall::LoadPolicy {
            fragment: RetryPolicy {
                max_retries: 5,
                retry_delay_ms: 10,
                timeout_ms: 2_000,
            },
            ..streamfall::LoadPolicy::default()
        },
        ..ResolverConfig::default()
    };

    let report = probe(&fixture.url("/v/intro.mp4"), &config, &options())
        .await
        .unwrap();

    assert_eq!(report.state, ResolverState::Progressive);
    assert!(report.fell_back);
    assert_eq!(report.element_sources, vec![fixture.url("/v/intro.mp4")]);
    // second non-fatal error trips a budget of one
    assert!(fixture.hits("/v/hls/intro/seg0.ts") >= 2);
}

#[tokio::test]
async fn missing_direct_manifest_surfaces_network_error() {
    let fixture = serve(vec![]).await;

    let report = probe(
        &fixture.url("/gone.m3u8"),
        &ResolverConfig::default(),
        &options(),
    )
    .await
    .unwrap();

    assert_eq!(report.state, ResolverState::Failed);
    assert!(matches!(report.error, Some(PlaybackError::Network(_))));
    assert!(report.element_sources.is_empty());
}

#[tokio::test]
async fn native_element_falls_back_on_rejected_manifest() {
    let fixture = serve(vec![]).await;
    let source = fixture.url("/courses/5/video-1.mp4");
    let options = ProbeOptions {
        native_hls: true,
        ..options()
    };

    let report = probe(&source, &ResolverConfig::default(), &options)
        .await
        .unwrap();

    assert_eq!(report.state, ResolverState::Progressive);
    assert_eq!(
        report.element_sources,
        vec![fixture.url("/courses/5/hls/video-1/video-1.m3u8"), source]
    );
}

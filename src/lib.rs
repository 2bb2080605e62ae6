//! `streamfall` - Adaptive video source resolver
//!
//! # Features
//!
//! - **Manifest inference**: `.m3u8` sources stream directly; progressive
//!   files are mapped to a conventional sibling HLS rendition
//! - **One-way fallback**: manifest failures rebind the progressive file
//!   exactly once per source, and the source is never retried as HLS
//! - **Bounded retries**: non-fatal stream errors are budgeted, then treated
//!   as fatal
//! - **Single session**: at most one engine session per element, torn down
//!   before the next one is created
//! - **Headless engine**: an HTTP-backed engine and probe for running the
//!   resolver outside a browser
//!
//! # Example
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use streamfall::headless::{Fetcher, HeadlessElement, HttpEngine};
//! use streamfall::{ResolverConfig, SourceResolver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (engine, _events) = HttpEngine::channel(Fetcher::new()?);
//!     let mut resolver = SourceResolver::new(engine, &ResolverConfig::default())?;
//!     let element = Rc::new(HeadlessElement::new());
//!     let state = resolver.attach(Some(element), Some("https://cdn.example.com/v/intro.mp4"))?;
//!     println!("{state:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod headless;
pub mod media;
pub mod resolver;
pub mod state;
pub mod target;
pub mod testing;

pub use config::{LoadPolicy, ResolverConfig, RetryPolicy, StartLevel};
pub use engine::{
    EngineEvent, EngineSession, ErrorDetails, SessionConfig, SessionId, StreamError,
    StreamErrorKind, StreamingEngine,
};
pub use error::{AttachError, PlaybackError};
pub use media::{CanPlay, MediaElement, MediaErrorCode, OwnerId, PlayError, HLS_MIME};
pub use resolver::{ErrorCallback, SourceResolver};
pub use state::{ErrorBudget, FailureMemory, ResolverState, StreamingMode};
pub use target::{ResolvedTarget, TargetKind, TargetResolver};

/// Version of streamfall
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

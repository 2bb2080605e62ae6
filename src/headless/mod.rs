//! Headless playback: an in-memory element, an HTTP engine, and a probe
//! that runs the resolver against real endpoints.

pub mod element;
pub mod engine;
pub mod fetch;
pub mod playlist;
pub mod probe;

pub use element::HeadlessElement;
pub use engine::{HttpEngine, HttpSession, SessionEvent};
pub use fetch::{FetchError, Fetcher};
pub use probe::{probe, PlaybackReport, ProbeOptions};

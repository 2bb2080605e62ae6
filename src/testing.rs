//! Recording engine for exercising a resolver without I/O.
//!
//! Every session call lands in a shared log so tests can assert ordering
//! (teardown before create) and liveness (at most one session at a time).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::engine::{EngineSession, SessionConfig, SessionId, StreamingEngine};
use crate::media::MediaElement;

/// One observed engine interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Create(SessionId),
    Attach(SessionId),
    Load(SessionId, String),
    StopLoad(SessionId),
    Detach(SessionId),
    Recover(SessionId),
    Destroy(SessionId),
}

#[derive(Debug, Default)]
struct Shared {
    log: Rc<RefCell<Vec<EngineCall>>>,
    live: Cell<usize>,
    max_live: Cell<usize>,
}

/// Engine whose sessions only record what they are asked to do.
#[derive(Debug)]
pub struct RecordingEngine {
    shared: Rc<Shared>,
    supported: bool,
    fail_recovery: bool,
    created: usize,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            shared: Rc::new(Shared::default()),
            supported: true,
            fail_recovery: false,
            created: 0,
        }
    }

    pub fn set_supported(&mut self, supported: bool) {
        self.supported = supported;
    }

    /// Make `recover_media_error` fail on every session.
    pub fn fail_recovery(&mut self, fail: bool) {
        self.fail_recovery = fail;
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.shared.log.borrow().clone()
    }

    /// Handle to the call log that outlives the engine.
    pub fn log(&self) -> Rc<RefCell<Vec<EngineCall>>> {
        Rc::clone(&self.shared.log)
    }

    pub fn sessions_created(&self) -> usize {
        self.created
    }

    /// Sessions created and not yet destroyed.
    pub fn live_sessions(&self) -> usize {
        self.shared.live.get()
    }

    /// Highest number of simultaneously live sessions ever observed.
    pub fn max_live_sessions(&self) -> usize {
        self.shared.max_live.get()
    }

    /// Manifest URLs passed to `load_source`, in order.
    pub fn loaded_urls(&self) -> Vec<String> {
        self.shared
            .log
            .borrow()
            .iter()
            .filter_map(|call| match call {
                EngineCall::Load(_, url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }
}

impl<E: MediaElement> StreamingEngine<E> for RecordingEngine {
    type Session = RecordingSession;

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn create_session(&mut self, id: SessionId, _config: &SessionConfig) -> RecordingSession {
        self.created += 1;
        let live = self.shared.live.get() + 1;
        self.shared.live.set(live);
        self.shared.max_live.set(self.shared.max_live.get().max(live));
        self.shared.log.borrow_mut().push(EngineCall::Create(id));
        RecordingSession {
            id,
            shared: Rc::clone(&self.shared),
            fail_recovery: self.fail_recovery,
        }
    }
}

/// Session produced by [`RecordingEngine`].
#[derive(Debug)]
pub struct RecordingSession {
    id: SessionId,
    shared: Rc<Shared>,
    fail_recovery: bool,
}

impl RecordingSession {
    fn record(&self, call: EngineCall) {
        self.shared.log.borrow_mut().push(call);
    }
}

impl<E: MediaElement> EngineSession<E> for RecordingSession {
    fn attach_media(&mut self, _element: Rc<E>) {
        self.record(EngineCall::Attach(self.id));
    }

    fn load_source(&mut self, url: &str) {
        self.record(EngineCall::Load(self.id, url.to_string()));
    }

    fn stop_load(&mut self) {
        self.record(EngineCall::StopLoad(self.id));
    }

    fn detach_media(&mut self) {
        self.record(EngineCall::Detach(self.id));
    }

    fn recover_media_error(&mut self) -> Result<(), String> {
        self.record(EngineCall::Recover(self.id));
        if self.fail_recovery {
            Err("media pipeline could not be reset".to_string())
        } else {
            Ok(())
        }
    }

    fn destroy(self) {
        self.record(EngineCall::Destroy(self.id));
        self.shared.live.set(self.shared.live.get().saturating_sub(1));
    }
}

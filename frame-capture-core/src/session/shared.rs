use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::models::config::CaptureConfig;
use crate::models::device::{AdapterInfo, OutputInfo};
use crate::models::error::CaptureError;
use crate::models::frame::Frame;
use crate::models::state::CaptureState;
use crate::models::status::CaptureDiagnostics;
use crate::traits::duplication_backend::DuplicationBackend;
use crate::traits::frame_listener::FrameListener;

use super::capture_session::CaptureSession;

/// Everything the controller and the capture thread both touch.
///
/// Kept behind one lock so a reader never sees, say, a new adapter index
/// next to a stale output index.
pub(crate) struct SharedState {
    pub config: CaptureConfig,
    pub latest_frame: Option<Arc<Frame>>,
    pub last_error: Option<String>,
    pub adapters: Vec<AdapterInfo>,
    pub outputs: Vec<OutputInfo>,
    pub state: CaptureState,
    pub diagnostics: CaptureDiagnostics,
}

pub(crate) struct Shared {
    state: Mutex<SharedState>,
    listeners: RwLock<Vec<Arc<dyn FrameListener>>>,
    shutting_down: AtomicBool,
}

impl Shared {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            state: Mutex::new(SharedState {
                config,
                latest_frame: None,
                last_error: None,
                adapters: Vec::new(),
                outputs: Vec::new(),
                state: CaptureState::Idle,
                diagnostics: CaptureDiagnostics::default(),
            }),
            listeners: RwLock::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock()
    }

    /// Set once the controller is dropped; ends even an unbounded recovery.
    pub fn request_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self, listener: Arc<dyn FrameListener>) {
        self.listeners.write().push(listener);
    }

    /// Store the new state; listeners hear about it only when the kind of
    /// state changes (a growing recovery attempt count is silent).
    pub fn set_state(&self, new_state: CaptureState) {
        let changed = {
            let mut s = self.state.lock();
            let changed = mem::discriminant(&s.state) != mem::discriminant(&new_state);
            s.state = new_state.clone();
            changed
        };
        if changed {
            for listener in self.snapshot_listeners() {
                listener.on_state_changed(&new_state);
            }
        }
    }

    /// Copy the session's device lists and latest error message into the
    /// shared slot. A recorded message survives later successful opens.
    pub fn sync_session<B: DuplicationBackend>(&self, session: &CaptureSession<B>) {
        let mut s = self.state.lock();
        s.adapters = session.adapters().to_vec();
        s.outputs = session.outputs().to_vec();
        if let Some(error) = session.last_error() {
            s.last_error = Some(error.to_string());
        }
    }

    pub fn notify_frame_ready(&self) {
        for listener in self.snapshot_listeners() {
            listener.on_frame_ready();
        }
    }

    pub fn notify_error(&self, error: &CaptureError) {
        for listener in self.snapshot_listeners() {
            listener.on_error(error);
        }
    }

    fn snapshot_listeners(&self) -> Vec<Arc<dyn FrameListener>> {
        self.listeners.read().clone()
    }
}

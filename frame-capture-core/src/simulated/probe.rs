use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// Most recent events kept by a [`SimulationProbe`]; older ones are dropped.
pub const EVENT_LOG_CAPACITY: usize = 4096;

/// Something the simulated backend (or a test) observed, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    DeviceCreated,
    DeviceCreationRejected,
    DuplicationOpened { adapter: usize, output: usize },
    DuplicationRejected { adapter: usize, output: usize },
    FrameAcquired,
    DuplicateFrame,
    AcquireTimedOut,
    AcquireFailed,
    DecodeFailed,
    /// Free-form marker recorded by callers, e.g. a listener noting a publish.
    Note(&'static str),
}

#[derive(Debug, Default)]
struct ProbeState {
    devices_alive: usize,
    duplications_alive: usize,
    device_creations: u64,
    open_attempts: u64,
    acquires_started: u64,
    acquires_completed: u64,
    frames_released: u64,
    staging_created: u64,
    events: VecDeque<SimEvent>,
}

impl ProbeState {
    fn push_event(&mut self, event: SimEvent) {
        if self.events.len() == EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Shared view into a [`SimulatedBackend`](super::SimulatedBackend).
///
/// Cloned handles observe the same counters, so tests keep one while the
/// backend itself moves onto the capture thread.
#[derive(Debug, Clone, Default)]
pub struct SimulationProbe {
    inner: Arc<Mutex<ProbeState>>,
}

impl SimulationProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices created and not yet dropped.
    pub fn devices_alive(&self) -> usize {
        self.inner.lock().devices_alive
    }

    /// Duplication interfaces created and not yet dropped.
    pub fn duplications_alive(&self) -> usize {
        self.inner.lock().duplications_alive
    }

    pub fn device_creations(&self) -> u64 {
        self.inner.lock().device_creations
    }

    /// Calls to `duplicate_output`, successful or not.
    pub fn open_attempts(&self) -> u64 {
        self.inner.lock().open_attempts
    }

    pub fn acquires_started(&self) -> u64 {
        self.inner.lock().acquires_started
    }

    pub fn acquires_completed(&self) -> u64 {
        self.inner.lock().acquires_completed
    }

    pub fn frames_released(&self) -> u64 {
        self.inner.lock().frames_released
    }

    pub fn staging_created(&self) -> u64 {
        self.inner.lock().staging_created
    }

    /// Recorded events, oldest first, at most [`EVENT_LOG_CAPACITY`].
    pub fn events(&self) -> Vec<SimEvent> {
        self.inner.lock().events.iter().cloned().collect()
    }

    pub fn note(&self, label: &'static str) {
        self.record(SimEvent::Note(label));
    }

    pub(crate) fn record(&self, event: SimEvent) {
        self.inner.lock().push_event(event);
    }

    pub(crate) fn device_created(&self) {
        let mut s = self.inner.lock();
        s.devices_alive += 1;
        s.device_creations += 1;
        s.push_event(SimEvent::DeviceCreated);
    }

    pub(crate) fn device_dropped(&self) {
        let mut s = self.inner.lock();
        s.devices_alive = s.devices_alive.saturating_sub(1);
    }

    pub(crate) fn open_attempted(&self) {
        self.inner.lock().open_attempts += 1;
    }

    pub(crate) fn duplication_opened(&self, adapter: usize, output: usize) {
        let mut s = self.inner.lock();
        s.duplications_alive += 1;
        s.push_event(SimEvent::DuplicationOpened { adapter, output });
    }

    pub(crate) fn duplication_dropped(&self) {
        let mut s = self.inner.lock();
        s.duplications_alive = s.duplications_alive.saturating_sub(1);
    }

    pub(crate) fn acquire_started(&self) {
        self.inner.lock().acquires_started += 1;
    }

    pub(crate) fn acquire_completed(&self, event: SimEvent) {
        let mut s = self.inner.lock();
        s.acquires_completed += 1;
        s.push_event(event);
    }

    pub(crate) fn frame_released(&self) {
        self.inner.lock().frames_released += 1;
    }

    pub(crate) fn staging_allocated(&self) {
        self.inner.lock().staging_created += 1;
    }
}

//! GPU-free backend for CI, demos on non-Windows hosts and loop tests.

pub mod backend;
pub mod probe;

pub use backend::{AcquireStep, SimulatedAdapter, SimulatedBackend, SimulationScript};
pub use probe::{SimEvent, SimulationProbe, EVENT_LOG_CAPACITY};

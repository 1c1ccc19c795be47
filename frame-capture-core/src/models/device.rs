use serde::{Deserialize, Serialize};

/// A graphics adapter reported by the system, in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    pub index: usize,
    pub description: String,
    /// Dedicated video memory in bytes (0 when the backend does not report it).
    pub dedicated_video_memory: u64,
}

/// A display attached to an adapter. `index` is relative to that adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputInfo {
    pub index: usize,
    pub name: String,
    pub attached_to_desktop: bool,
}

/// The adapter/output pair a session is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Selection {
    pub adapter: usize,
    pub output: usize,
}

impl Selection {
    pub const fn new(adapter: usize, output: usize) -> Self {
        Self { adapter, output }
    }
}

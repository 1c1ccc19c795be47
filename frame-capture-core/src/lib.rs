//! # frame-capture-core
//!
//! Platform-agnostic desktop frame capture core library.
//!
//! Provides the capture session lifecycle, the acquire/convert/publish
//! loop with frame pacing and automatic recovery, cropping, and the
//! controller that exposes it all to a host. Platform backends (Windows
//! DXGI desktop duplication) implement the `DuplicationBackend` trait and
//! plug into the generic `CaptureController`.
//!
//! ## Architecture
//!
//! ```text
//! frame-capture-core (this crate)
//! ├── traits/       ← DuplicationBackend, DeviceEnumerator, FrameListener, DesktopBounds
//! ├── models/       ← CaptureError, CaptureState, CaptureConfig, Frame, CropRect, etc.
//! ├── processing/   ← Pacer, crop
//! ├── session/      ← CaptureController, CaptureSession, AdapterCatalog
//! └── simulated/    ← SimulatedBackend (no GPU needed)
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod simulated;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::{CaptureConfig, RecoveryPolicy, DEFAULT_FRAME_RATE, DEFAULT_TIMEOUT_MS};
pub use models::device::{AdapterInfo, OutputInfo, Selection};
pub use models::error::CaptureError;
pub use models::frame::{DecodedImage, Frame, PixelFormat};
pub use models::geometry::{CropRect, Size};
pub use models::state::CaptureState;
pub use models::status::{CaptureDiagnostics, CaptureStatus};
pub use processing::pacer::Pacer;
pub use session::adapter_catalog::AdapterCatalog;
pub use session::capture_session::CaptureSession;
pub use session::controller::CaptureController;
pub use simulated::SimulatedBackend;
pub use traits::desktop_bounds::{DesktopBounds, FixedDesktop};
pub use traits::duplication_backend::{AcquiredFrame, DeviceEnumerator, DuplicationBackend};
pub use traits::frame_listener::FrameListener;

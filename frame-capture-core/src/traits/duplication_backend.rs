use std::time::Duration;

use crate::models::device::{AdapterInfo, OutputInfo};
use crate::models::error::CaptureError;
use crate::models::frame::DecodedImage;

/// A frame handed out by the duplication interface.
///
/// The backend keeps the frame checked out until the next
/// [`DuplicationBackend::release_frame`] call.
#[derive(Debug)]
pub struct AcquiredFrame<T> {
    pub texture: T,
    /// Presentation timestamp of the desktop image; 0 when only metadata
    /// (for example the pointer) changed since the previous acquire.
    pub last_present_time: i64,
    pub accumulated_frames: u32,
}

impl<T> AcquiredFrame<T> {
    /// Whether the frame carries a new desktop image.
    pub fn has_new_image(&self) -> bool {
        self.last_present_time != 0
    }
}

/// Enumerates graphics adapters and their outputs.
///
/// Implementations stop at the end-of-list signal of the underlying API and
/// return `Err` only when the enumeration call itself fails.
pub trait DeviceEnumerator {
    /// Adapters in index order.
    fn enumerate_adapters(&self) -> Result<Vec<AdapterInfo>, CaptureError>;

    /// Outputs of `adapter` in index order.
    fn enumerate_outputs(&self, adapter: usize) -> Result<Vec<OutputInfo>, CaptureError>;
}

/// Platform-specific desktop duplication.
///
/// Implemented by:
/// - `DxgiBackend` (Windows, `frame-capture-windows`)
/// - `SimulatedBackend` (any platform, this crate)
///
/// All handles are created and used on the capture thread only; the
/// backend value itself is moved there by the controller.
pub trait DuplicationBackend: DeviceEnumerator + Send + 'static {
    /// Accelerated device plus its immediate execution context.
    type Device: Send;
    /// Duplication interface for one output.
    type Duplication: Send;
    /// GPU resource returned by an acquire.
    type Texture;
    /// CPU-readable copy target, reused while its description matches.
    type Staging: Send;

    /// Create a hardware-accelerated device.
    fn create_device(&mut self) -> Result<Self::Device, CaptureError>;

    /// Request duplication of `output` on `adapter` for BGRA8 frames.
    fn duplicate_output(
        &mut self,
        device: &Self::Device,
        adapter: usize,
        output: usize,
    ) -> Result<Self::Duplication, CaptureError>;

    /// Give the previously acquired frame back to the system.
    fn release_frame(&mut self, duplication: &mut Self::Duplication) -> Result<(), CaptureError>;

    /// Wait up to `timeout` for the next frame.
    ///
    /// Must return [`CaptureError::AcquireTimeout`] when the wait elapses
    /// without a frame; any other error is treated as fatal to the session.
    fn acquire_next_frame(
        &mut self,
        duplication: &mut Self::Duplication,
        timeout: Duration,
    ) -> Result<AcquiredFrame<Self::Texture>, CaptureError>;

    /// Copy `texture` into the staging resource (creating or replacing it
    /// when its description differs), map it and read the pixels out.
    ///
    /// The mapping must be released before this returns.
    fn read_texture(
        &mut self,
        device: &Self::Device,
        staging: &mut Option<Self::Staging>,
        texture: Self::Texture,
    ) -> Result<DecodedImage, CaptureError>;
}

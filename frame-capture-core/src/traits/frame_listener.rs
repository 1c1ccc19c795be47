use crate::models::error::CaptureError;
use crate::models::state::CaptureState;

/// Receives "frame ready" notifications from the capture loop.
///
/// All methods are called from the capture thread after the shared lock is
/// released. Implementations must return quickly and fetch the image with
/// `CaptureController::latest_frame`; frames published while a listener is
/// busy are simply overwritten.
pub trait FrameListener: Send + Sync {
    /// A new frame was stored as the latest frame.
    fn on_frame_ready(&self);

    /// Called when the controller state changes.
    fn on_state_changed(&self, _state: &CaptureState) {}

    /// Called when opening or re-opening a session fails.
    fn on_error(&self, _error: &CaptureError) {}
}

impl<F> FrameListener for F
where
    F: Fn() + Send + Sync,
{
    fn on_frame_ready(&self) {
        self()
    }
}

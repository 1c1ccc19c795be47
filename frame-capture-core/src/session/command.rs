use std::sync::mpsc::Sender;

use crate::models::device::Selection;
use crate::models::error::CaptureError;

/// Requests sent from the controller to the capture thread.
///
/// Session handles are only ever touched on that thread, so every
/// open/close goes through here.
pub(crate) enum Command {
    /// (Re)open the session. With `fallback`, other adapters are tried with
    /// output 0 when the requested pair fails.
    Open {
        selection: Selection,
        fallback: bool,
        reply: Option<Sender<Result<(), CaptureError>>>,
    },
    /// Run the capture loop until capture is disabled.
    Run,
    /// Stop capturing and release the session.
    Close { reply: Option<Sender<()>> },
    Shutdown,
}

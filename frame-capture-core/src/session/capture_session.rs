use std::time::Duration;

use crate::models::device::{AdapterInfo, OutputInfo, Selection};
use crate::models::error::CaptureError;
use crate::models::frame::DecodedImage;
use crate::traits::duplication_backend::{AcquiredFrame, DuplicationBackend};

/// Handles that exist only while a session is open.
struct OpenHandles<B: DuplicationBackend> {
    // Field order is drop order: the duplication goes before the device.
    duplication: B::Duplication,
    staging: Option<B::Staging>,
    device: B::Device,
}

/// One duplication session for an (adapter, output) pair.
///
/// Either fully open (device and duplication both held) or closed. Every
/// `open` rebuilds everything from scratch; nothing is patched in place.
pub struct CaptureSession<B: DuplicationBackend> {
    backend: B,
    handles: Option<OpenHandles<B>>,
    selection: Selection,
    adapters: Vec<AdapterInfo>,
    outputs: Vec<OutputInfo>,
    last_error: Option<CaptureError>,
}

impl<B: DuplicationBackend> CaptureSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            handles: None,
            selection: Selection::default(),
            adapters: Vec::new(),
            outputs: Vec::new(),
            last_error: None,
        }
    }

    /// Tear down any current session and open `output` on `adapter`.
    ///
    /// Also refreshes the adapter and output lists, even when the requested
    /// indices turn out to be out of range. On failure nothing stays
    /// allocated and the error is kept as [`last_error`](Self::last_error);
    /// a later successful open does not clear it.
    pub fn open(&mut self, adapter: usize, output: usize) -> Result<(), CaptureError> {
        self.selection = Selection::new(adapter, output);
        self.close();

        match self.open_handles(adapter, output) {
            Ok(handles) => {
                self.handles = Some(handles);
                log::info!(
                    "Opened duplication on adapter {} ({}) output {} ({})",
                    adapter,
                    self.adapter_name(adapter),
                    output,
                    self.output_name(output),
                );
                Ok(())
            }
            Err(e) => {
                // Callers log at their own level.
                log::debug!("Failed to open duplication (adapter {adapter}, output {output}): {e}");
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    fn open_handles(
        &mut self,
        adapter: usize,
        output: usize,
    ) -> Result<OpenHandles<B>, CaptureError> {
        // Any `?` below drops the handles created so far.
        let device = self.backend.create_device()?;

        self.adapters.clear();
        self.outputs.clear();
        self.adapters = self.backend.enumerate_adapters()?;
        if adapter >= self.adapters.len() {
            return Err(CaptureError::AdapterNotFound(adapter));
        }

        self.outputs = self.backend.enumerate_outputs(adapter)?;
        if output >= self.outputs.len() {
            return Err(CaptureError::OutputNotFound(output));
        }

        let duplication = self.backend.duplicate_output(&device, adapter, output)?;
        Ok(OpenHandles { duplication, staging: None, device })
    }

    /// Release the duplication, staging resource and device. Idempotent.
    pub fn close(&mut self) {
        if self.handles.take().is_some() {
            log::debug!(
                "Closed duplication on adapter {} output {}",
                self.selection.adapter,
                self.selection.output
            );
        }
    }

    pub fn is_open(&self) -> bool {
        self.handles.is_some()
    }

    /// Indices requested by the most recent `open`.
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Adapters found by the most recent `open`.
    pub fn adapters(&self) -> &[AdapterInfo] {
        &self.adapters
    }

    /// Outputs of the selected adapter found by the most recent `open`.
    pub fn outputs(&self) -> &[OutputInfo] {
        &self.outputs
    }

    /// Most recent open failure, if any open has ever failed.
    pub fn last_error(&self) -> Option<&CaptureError> {
        self.last_error.as_ref()
    }

    /// Hand the previously acquired frame back. Errors are expected when no
    /// frame is held and can be ignored.
    pub fn release_frame(&mut self) -> Result<(), CaptureError> {
        let handles = self.handles.as_mut().ok_or(CaptureError::SessionClosed)?;
        self.backend.release_frame(&mut handles.duplication)
    }

    pub fn acquire_next_frame(
        &mut self,
        timeout: Duration,
    ) -> Result<AcquiredFrame<B::Texture>, CaptureError> {
        let handles = self.handles.as_mut().ok_or(CaptureError::SessionClosed)?;
        self.backend.acquire_next_frame(&mut handles.duplication, timeout)
    }

    /// Read an acquired texture back into CPU memory via the staging resource.
    pub fn read_frame(&mut self, texture: B::Texture) -> Result<DecodedImage, CaptureError> {
        let handles = self.handles.as_mut().ok_or(CaptureError::SessionClosed)?;
        self.backend
            .read_texture(&handles.device, &mut handles.staging, texture)
    }

    fn adapter_name(&self, index: usize) -> &str {
        self.adapters.get(index).map(|a| a.description.as_str()).unwrap_or("?")
    }

    fn output_name(&self, index: usize) -> &str {
        self.outputs.get(index).map(|o| o.name.as_str()).unwrap_or("?")
    }
}

impl<B: DuplicationBackend> Drop for CaptureSession<B> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::geometry::Size;
    use crate::simulated::{AcquireStep, SimulatedAdapter, SimulatedBackend};

    fn two_adapters() -> SimulatedBackend {
        SimulatedBackend::with_adapters(
            Size::new(64, 32),
            vec![
                SimulatedAdapter {
                    description: "Adapter A".into(),
                    outputs: vec!["A1".into(), "A2".into()],
                },
                SimulatedAdapter {
                    description: "Adapter B".into(),
                    outputs: vec!["B1".into()],
                },
            ],
        )
    }

    #[test]
    fn open_valid_pairs_publishes_lists() {
        for (adapter, output, outputs) in [(0, 0, 2), (0, 1, 2), (1, 0, 1)] {
            let backend = two_adapters();
            let probe = backend.probe();
            let mut session = CaptureSession::new(backend);

            session.open(adapter, output).unwrap();

            assert!(session.is_open());
            assert_eq!(session.adapters().len(), 2);
            assert_eq!(session.adapters()[1].description, "Adapter B");
            assert_eq!(session.outputs().len(), outputs);
            assert_eq!(session.selection(), Selection::new(adapter, output));
            assert!(session.last_error().is_none());
            assert_eq!(probe.devices_alive(), 1);
            assert_eq!(probe.duplications_alive(), 1);
        }
    }

    #[test]
    fn out_of_range_adapter_leaves_nothing_allocated() {
        let backend = two_adapters();
        let probe = backend.probe();
        let mut session = CaptureSession::new(backend);

        let err = session.open(2, 0).unwrap_err();

        assert_eq!(err, CaptureError::AdapterNotFound(2));
        assert!(err.is_selection_out_of_range());
        assert!(!session.is_open());
        assert_eq!(session.last_error(), Some(&CaptureError::AdapterNotFound(2)));
        // Lists are still published for discovery.
        assert_eq!(session.adapters().len(), 2);
        assert_eq!(probe.device_creations(), 1);
        assert_eq!(probe.devices_alive(), 0);
        assert_eq!(probe.duplications_alive(), 0);

        session.close();
        assert!(!session.is_open());
        assert_eq!(probe.devices_alive(), 0);
    }

    #[test]
    fn out_of_range_output() {
        let backend = two_adapters();
        let probe = backend.probe();
        let mut session = CaptureSession::new(backend);

        let err = session.open(1, 1).unwrap_err();

        assert_eq!(err, CaptureError::OutputNotFound(1));
        assert_eq!(session.outputs().len(), 1);
        assert_eq!(probe.devices_alive(), 0);
        assert_eq!(probe.open_attempts(), 0);
    }

    #[test]
    fn duplication_failure_releases_device() {
        let backend = two_adapters();
        let probe = backend.probe();
        backend.script().fail_next_opens(1, CaptureError::DuplicationFailed(0x8007_0005));
        let mut session = CaptureSession::new(backend);

        let err = session.open(0, 0).unwrap_err();

        assert_eq!(err, CaptureError::DuplicationFailed(0x8007_0005));
        assert!(!session.is_open());
        assert_eq!(probe.devices_alive(), 0);

        session.open(0, 0).unwrap();
        assert!(session.is_open());
        assert_eq!(session.last_error(), Some(&CaptureError::DuplicationFailed(0x8007_0005)));
    }

    #[test]
    fn device_creation_failure() {
        let backend = two_adapters();
        backend.script().fail_next_devices(1, CaptureError::DeviceCreationFailed(0x887A_0004));
        let mut session = CaptureSession::new(backend);

        let err = session.open(0, 0).unwrap_err();

        assert_eq!(err, CaptureError::DeviceCreationFailed(0x887A_0004));
        assert!(session.adapters().is_empty());
    }

    #[test]
    fn enumeration_failure_surfaces_from_open() {
        let backend = two_adapters();
        let probe = backend.probe();
        backend.script().set_enumeration_fails(true);
        let mut session = CaptureSession::new(backend);

        let err = session.open(0, 0).unwrap_err();

        assert!(matches!(err, CaptureError::EnumerationFailed { what: "adapters", .. }));
        assert!(session.adapters().is_empty());
        assert_eq!(probe.devices_alive(), 0);
    }

    #[test]
    fn close_is_idempotent() {
        let backend = two_adapters();
        let probe = backend.probe();
        let mut session = CaptureSession::new(backend);

        session.close();
        session.close();
        assert!(!session.is_open());

        session.open(0, 0).unwrap();
        session.close();
        session.close();
        assert!(!session.is_open());
        assert_eq!(probe.devices_alive(), 0);
        assert_eq!(probe.duplications_alive(), 0);
    }

    #[test]
    fn reopen_rebuilds_everything() {
        let backend = two_adapters();
        let probe = backend.probe();
        let mut session = CaptureSession::new(backend);

        session.open(0, 0).unwrap();
        session.open(1, 0).unwrap();

        assert_eq!(probe.device_creations(), 2);
        assert_eq!(probe.devices_alive(), 1);
        assert_eq!(probe.duplications_alive(), 1);
        assert_eq!(session.outputs()[0].name, "B1");
    }

    #[test]
    fn frame_primitives_require_open_session() {
        let mut session = CaptureSession::new(two_adapters());

        assert_eq!(session.release_frame().unwrap_err(), CaptureError::SessionClosed);
        assert_eq!(
            session.acquire_next_frame(Duration::from_millis(1)).unwrap_err(),
            CaptureError::SessionClosed
        );
    }

    #[test]
    fn acquire_and_read_back() {
        let backend = two_adapters();
        let probe = backend.probe();
        backend.script().push_steps([AcquireStep::Frame, AcquireStep::Frame]);
        let mut session = CaptureSession::new(backend);
        session.open(0, 0).unwrap();

        let frame = session.acquire_next_frame(Duration::from_millis(5)).unwrap();
        assert!(frame.has_new_image());
        assert_eq!(frame.accumulated_frames, 1);
        let image = session.read_frame(frame.texture).unwrap();
        assert_eq!((image.width, image.height), (64, 32));
        assert_eq!(image.data.len(), 64 * 32 * 4);

        session.release_frame().unwrap();
        let frame = session.acquire_next_frame(Duration::from_millis(5)).unwrap();
        session.read_frame(frame.texture).unwrap();

        // Staging is created once and reused while the size matches.
        assert_eq!(probe.staging_created(), 1);
        assert_eq!(probe.frames_released(), 1);
    }
}

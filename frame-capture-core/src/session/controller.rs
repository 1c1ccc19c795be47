use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

use crate::models::config::CaptureConfig;
use crate::models::device::{AdapterInfo, OutputInfo, Selection};
use crate::models::error::CaptureError;
use crate::models::frame::Frame;
use crate::models::geometry::CropRect;
use crate::models::state::CaptureState;
use crate::models::status::{CaptureDiagnostics, CaptureStatus};
use crate::traits::desktop_bounds::DesktopBounds;
use crate::traits::duplication_backend::DuplicationBackend;
use crate::traits::frame_listener::FrameListener;

use super::acquirer::FrameAcquirer;
use super::capture_session::CaptureSession;
use super::command::Command;
use super::shared::Shared;

/// Public entry point of the capture engine.
///
/// Owns the configuration and the latest frame, runs the capture loop on a
/// dedicated `frame-capture` thread and fans "frame ready" events out to
/// subscribed [`FrameListener`]s. Consumers receive a handle to one
/// controller at construction; there is no global instance.
///
/// ```text
/// setters ─┐                         ┌─ latest_frame()
///          ▼                         │
///   [SharedState] ◀── publish ── [frame-capture thread] ── on_frame_ready ─▶ listeners
///          │                         ▲
///          └── Command (mpsc) ───────┘  open / run / close / shutdown
/// ```
pub struct CaptureController {
    shared: Arc<Shared>,
    commands: Sender<Command>,
    desktop: Arc<dyn DesktopBounds>,
    worker: Option<thread::JoinHandle<()>>,
    worker_id: thread::ThreadId,
}

impl CaptureController {
    /// Controller with default settings and the crop covering the whole
    /// virtual desktop. Opens adapter 0 output 0, falling back to the other
    /// adapters' first output.
    pub fn new<B: DuplicationBackend>(
        backend: B,
        desktop: Arc<dyn DesktopBounds>,
    ) -> Result<Self, CaptureError> {
        let config = CaptureConfig::for_desktop(desktop.virtual_desktop_size());
        Self::with_config(backend, desktop, config)
    }

    /// Controller with an explicit configuration. Capture starts right away
    /// when `config.capture_enabled` is set.
    ///
    /// Failing to open any device is not an error here: it is logged,
    /// stored as the last error, and capture can be retried later.
    pub fn with_config<B: DuplicationBackend>(
        backend: B,
        desktop: Arc<dyn DesktopBounds>,
        mut config: CaptureConfig,
    ) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;

        let bounds = desktop.virtual_desktop_size();
        let crop = config.crop;
        config.crop = CropRect::clamped(crop.x, crop.y, crop.width, crop.height, bounds);
        let autostart = config.capture_enabled;
        config.capture_enabled = false;
        let selection = config.selection();

        let shared = Arc::new(Shared::new(config));
        let (commands, receiver) = mpsc::channel();
        let acquirer =
            FrameAcquirer::new(CaptureSession::new(backend), Arc::clone(&shared), receiver);

        let worker = thread::Builder::new()
            .name("frame-capture".into())
            .spawn(move || acquirer.serve())
            .map_err(|e| {
                CaptureError::ConfigurationFailed(format!("failed to spawn capture thread: {}", e))
            })?;

        let controller = Self {
            shared,
            commands,
            desktop,
            worker_id: worker.thread().id(),
            worker: Some(worker),
        };

        if let Err(e) = controller.request_open(selection, true) {
            log::error!("No available capture devices: {}", e);
        }
        if autostart {
            controller.start();
        }
        Ok(controller)
    }

    /// Register a listener for frame, state and error notifications.
    pub fn subscribe(&self, listener: Arc<dyn FrameListener>) {
        self.shared.subscribe(listener);
    }

    /// Begin capturing. No-op if capture is already enabled.
    pub fn start(&self) {
        {
            let mut s = self.shared.lock();
            if s.config.capture_enabled {
                return;
            }
            s.config.capture_enabled = true;
        }
        log::info!("Starting capture");
        if self.commands.send(Command::Run).is_err() {
            log::error!("Capture thread is gone; cannot start capture");
            self.shared.lock().config.capture_enabled = false;
        }
    }

    /// Disable capture. The loop exits before its next acquire attempt,
    /// so at most one acquire timeout after this call.
    pub fn stop(&self) {
        let was_enabled = std::mem::replace(&mut self.shared.lock().config.capture_enabled, false);
        if was_enabled {
            log::info!("Stopping capture");
        }
    }

    /// Stop capturing and release the session on the capture thread.
    pub fn close(&self) {
        self.stop();
        let running = self.shared.lock().state.is_running();
        if running || self.on_capture_thread() {
            let _ = self.commands.send(Command::Close { reply: None });
            return;
        }
        let (reply, response) = mpsc::channel();
        if self.commands.send(Command::Close { reply: Some(reply) }).is_ok() {
            let _ = response.recv();
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.lock().config.capture_enabled
    }

    /// Most recently published frame, if any has been captured yet.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.shared.lock().latest_frame.clone()
    }

    pub fn adapters(&self) -> Vec<AdapterInfo> {
        self.shared.lock().adapters.clone()
    }

    /// Outputs of the currently selected adapter.
    pub fn outputs(&self) -> Vec<OutputInfo> {
        self.shared.lock().outputs.clone()
    }

    pub fn adapter_index(&self) -> usize {
        self.shared.lock().config.adapter_index
    }

    pub fn output_index(&self) -> usize {
        self.shared.lock().config.output_index
    }

    /// Switch to another adapter, keeping the output index.
    ///
    /// Returns `false` without any change when `index` is not in
    /// [`adapters`](Self::adapters).
    pub fn set_adapter_index(&self, index: usize) -> bool {
        let output = {
            let s = self.shared.lock();
            if index >= s.adapters.len() {
                return false;
            }
            s.config.output_index
        };
        self.reselect(Selection::new(index, output));
        true
    }

    /// Switch to another output of the current adapter.
    ///
    /// Returns `false` without any change when `index` is not in
    /// [`outputs`](Self::outputs).
    pub fn set_output_index(&self, index: usize) -> bool {
        let adapter = {
            let s = self.shared.lock();
            if index >= s.outputs.len() {
                return false;
            }
            s.config.adapter_index
        };
        self.reselect(Selection::new(adapter, index));
        true
    }

    /// Store the selection and wait for the capture thread to re-open with
    /// it, so the published lists match the new selection on return. A
    /// running loop applies it at its next cycle boundary and keeps going.
    ///
    /// Called from a listener (on the capture thread itself) the re-open is
    /// only queued.
    fn reselect(&self, selection: Selection) {
        {
            let mut s = self.shared.lock();
            s.config.adapter_index = selection.adapter;
            s.config.output_index = selection.output;
        }
        log::info!(
            "Selecting adapter {} output {}",
            selection.adapter,
            selection.output
        );
        if self.on_capture_thread() {
            let _ = self.commands.send(Command::Open { selection, fallback: false, reply: None });
        } else if let Err(e) = self.request_open(selection, false) {
            log::warn!("Re-open with new selection failed: {}", e);
        }
    }

    fn on_capture_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    fn request_open(&self, selection: Selection, fallback: bool) -> Result<(), CaptureError> {
        let (reply, response) = mpsc::channel();
        self.commands
            .send(Command::Open { selection, fallback, reply: Some(reply) })
            .map_err(|_| CaptureError::WorkerUnavailable)?;
        response.recv().map_err(|_| CaptureError::WorkerUnavailable)?
    }

    pub fn crop_rect(&self) -> CropRect {
        self.shared.lock().config.crop
    }

    /// Centre a `width` x `height` crop on the virtual desktop. Zero or
    /// oversized dimensions use the full desktop extent.
    pub fn set_crop_size(&self, width: u32, height: u32) -> CropRect {
        let rect = CropRect::centered(width, height, self.desktop.virtual_desktop_size());
        self.shared.lock().config.crop = rect;
        rect
    }

    /// Crop at an explicit origin; only the size is clamped to the desktop.
    pub fn set_crop_rect(&self, x: i32, y: i32, width: u32, height: u32) -> CropRect {
        let rect = CropRect::clamped(x, y, width, height, self.desktop.virtual_desktop_size());
        self.shared.lock().config.crop = rect;
        rect
    }

    pub fn frame_rate(&self) -> u32 {
        self.shared.lock().config.frame_rate
    }

    /// Returns `false` and keeps the current rate when `fps` is zero.
    pub fn set_frame_rate(&self, fps: u32) -> bool {
        if fps == 0 {
            return false;
        }
        self.shared.lock().config.frame_rate = fps;
        true
    }

    pub fn timeout_ms(&self) -> u32 {
        self.shared.lock().config.timeout_ms
    }

    /// Returns `false` and keeps the current timeout when `ms` is zero.
    pub fn set_timeout_ms(&self, ms: u32) -> bool {
        if ms == 0 {
            return false;
        }
        self.shared.lock().config.timeout_ms = ms;
        true
    }

    /// Message of the most recent failed open or re-open. Later successful
    /// opens leave it in place.
    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    pub fn state(&self) -> CaptureState {
        self.shared.lock().state.clone()
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        self.shared.lock().diagnostics.clone()
    }

    pub fn config(&self) -> CaptureConfig {
        self.shared.lock().config.clone()
    }

    pub fn status(&self) -> CaptureStatus {
        let s = self.shared.lock();
        CaptureStatus {
            adapters: s.adapters.clone(),
            outputs: s.outputs.clone(),
            adapter_index: s.config.adapter_index,
            output_index: s.config.output_index,
            crop: s.config.crop,
            frame_rate: s.config.frame_rate,
            timeout_ms: s.config.timeout_ms,
            capture_enabled: s.config.capture_enabled,
            state: s.state.name().to_string(),
            last_error: s.last_error.clone(),
            diagnostics: s.diagnostics.clone(),
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.stop();
        self.shared.request_shutdown();
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            // A listener holding the last handle drops it on the capture
            // thread, which then exits on its own.
            if !self.on_capture_thread() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::Receiver;
    use std::time::{Duration, Instant};

    use approx::assert_relative_eq;

    use super::*;
    use crate::models::config::RecoveryPolicy;
    use crate::models::geometry::Size;
    use crate::simulated::{AcquireStep, SimEvent, SimulatedAdapter, SimulatedBackend};
    use crate::traits::desktop_bounds::FixedDesktop;

    const DESKTOP: Size = Size { width: 64, height: 32 };

    fn desktop() -> Arc<dyn DesktopBounds> {
        Arc::new(FixedDesktop(DESKTOP))
    }

    fn two_adapters() -> SimulatedBackend {
        SimulatedBackend::with_adapters(
            DESKTOP,
            vec![
                SimulatedAdapter {
                    description: "Adapter A".into(),
                    outputs: vec!["A1".into()],
                },
                SimulatedAdapter {
                    description: "Adapter B".into(),
                    outputs: vec!["B1".into(), "B2".into()],
                },
            ],
        )
    }

    fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn frame_channel(controller: &CaptureController) -> Receiver<()> {
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        controller.subscribe(Arc::new(move || {
            let _ = tx.lock().send(());
        }));
        rx
    }

    fn wait_frames(rx: &Receiver<()>, count: usize) {
        for _ in 0..count {
            rx.recv_timeout(Duration::from_secs(5))
                .expect("frame not published in time");
        }
    }

    #[test]
    fn construction_opens_and_publishes_lists() {
        let controller = CaptureController::new(two_adapters(), desktop()).unwrap();

        assert_eq!(controller.state(), CaptureState::Ready);
        assert_eq!(controller.adapters().len(), 2);
        assert_eq!(controller.outputs().len(), 1);
        assert_eq!((controller.adapter_index(), controller.output_index()), (0, 0));
        assert_eq!(controller.crop_rect(), CropRect::full(DESKTOP));
        assert_eq!(controller.frame_rate(), 120);
        assert_eq!(controller.timeout_ms(), 50);
        assert!(!controller.is_capturing());
        assert!(controller.latest_frame().is_none());
        assert!(controller.last_error().is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = CaptureConfig {
            frame_rate: 0,
            ..CaptureConfig::for_desktop(DESKTOP)
        };
        let err = CaptureController::with_config(two_adapters(), desktop(), config)
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::ConfigurationFailed(_)));
    }

    #[test]
    fn initial_open_falls_back_to_next_adapter() {
        let backend = two_adapters();
        let probe = backend.probe();
        backend
            .script()
            .fail_next_opens(1, CaptureError::DuplicationFailed(0x887A_0022));

        let controller = CaptureController::new(backend, desktop()).unwrap();

        assert_eq!(controller.adapter_index(), 1);
        assert_eq!(controller.output_index(), 0);
        assert_eq!(controller.outputs().len(), 2);
        assert_eq!(controller.state(), CaptureState::Ready);
        assert!(probe
            .events()
            .contains(&SimEvent::DuplicationOpened { adapter: 1, output: 0 }));
        // The reason adapter 0 was skipped stays visible.
        assert_eq!(
            controller.last_error().as_deref(),
            Some("failed to duplicate output: error code 0x887a0022")
        );
    }

    #[test]
    fn no_device_leaves_controller_idle_with_error() {
        let backend = two_adapters();
        backend.script().set_enumeration_fails(true);

        let controller = CaptureController::new(backend, desktop()).unwrap();

        assert_eq!(controller.state(), CaptureState::Idle);
        assert!(controller.adapters().is_empty());
        assert!(controller.last_error().is_some());
        assert!(!controller.set_adapter_index(0));
    }

    #[test]
    fn start_without_session_turns_capture_back_off() {
        let backend = two_adapters();
        let probe = backend.probe();
        backend.script().set_enumeration_fails(true);
        let controller = CaptureController::new(backend, desktop()).unwrap();

        controller.start();

        assert!(wait_until(Duration::from_secs(2), || !controller.is_capturing()));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(controller.state(), CaptureState::Idle);
        assert_eq!(controller.diagnostics().reopen_attempts, 0);
        assert_eq!(probe.acquires_started(), 0);
    }

    #[test]
    fn captures_cropped_frames_at_requested_rate() {
        let backend =
            SimulatedBackend::new(Size::new(1920, 1080)).with_frame_delay(Duration::from_millis(5));
        let controller =
            CaptureController::new(backend, Arc::new(FixedDesktop(Size::new(1920, 1080)))).unwrap();
        assert!(controller.set_frame_rate(30));
        assert!(controller.set_timeout_ms(50));
        let crop = controller.set_crop_size(640, 360);
        assert_eq!(crop, CropRect::new(640, 360, 640, 360));
        let frames = frame_channel(&controller);

        controller.start();
        wait_frames(&frames, 10);

        let frame = controller.latest_frame().unwrap();
        assert_eq!((frame.width, frame.height), (640, 360));
        assert_eq!(frame.data.len(), 640 * 360 * 4);
        assert_eq!(frame.source_size, Size::new(1920, 1080));
        assert_eq!(frame.region, crop);
        assert_eq!(frame.pixel(0, 0).map(|p| p[3]), Some(0xFF));
        assert!(frame.sequence >= 10);

        let diagnostics = controller.diagnostics();
        assert!(diagnostics.frames_published >= 10);
        // Every sample includes the 5ms acquire delay, so a pairwise mean of
        // them can never drop below it; the budget is derived from that mean.
        let average = diagnostics.average_frame_ms.unwrap();
        assert!(average >= 5.0, "average {average}ms below the acquire delay");
        assert_relative_eq!(
            diagnostics.last_sleep_budget_ms.unwrap(),
            (1000.0 - average * 30.0) / 30.0,
            epsilon = 1e-9
        );
        assert!(controller.state().is_capturing());
    }

    #[test]
    fn pacing_limits_publish_rate() {
        let controller = CaptureController::new(two_adapters(), desktop()).unwrap();
        controller.set_frame_rate(50);
        let frames = frame_channel(&controller);

        let started = Instant::now();
        controller.start();
        wait_frames(&frames, 6);

        // Five full pacing waits of ~20ms each.
        assert!(started.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn fatal_acquire_reopens_until_success() {
        let backend = two_adapters();
        let probe = backend.probe();
        let script = backend.script();
        let controller = CaptureController::new(backend, desktop()).unwrap();
        assert_eq!(probe.open_attempts(), 1);

        script.push_steps([AcquireStep::Frame, AcquireStep::Frame, AcquireStep::Fail(0x887A_0026)]);
        script.fail_next_opens(2, CaptureError::DuplicationFailed(0x887A_0022));
        let listener_probe = probe.clone();
        controller.subscribe(Arc::new(move || listener_probe.note("published")));
        let frames = frame_channel(&controller);

        controller.start();
        wait_frames(&frames, 4);

        assert_eq!(probe.open_attempts(), 1 + 3);
        let diagnostics = controller.diagnostics();
        assert_eq!(diagnostics.fatal_acquire_failures, 1);
        assert_eq!(diagnostics.reopen_attempts, 3);
        assert_eq!(
            controller.last_error().as_deref(),
            Some("failed to duplicate output: error code 0x887a0022")
        );
        assert!(controller.is_capturing());

        // Nothing is published between the failure and the successful re-open.
        let events = probe.events();
        let failed = events.iter().position(|e| *e == SimEvent::AcquireFailed).unwrap();
        let reopened = failed
            + events[failed..]
                .iter()
                .position(|e| matches!(e, SimEvent::DuplicationOpened { .. }))
                .unwrap();
        assert!(events[failed..reopened]
            .iter()
            .all(|e| !matches!(e, SimEvent::Note(_))));
        assert_eq!(
            events[failed..reopened]
                .iter()
                .filter(|e| matches!(e, SimEvent::DuplicationRejected { .. }))
                .count(),
            2
        );
        assert!(events[reopened..].contains(&SimEvent::Note("published")));
    }

    #[test]
    fn capped_recovery_ends_in_failed_state() {
        let backend = two_adapters();
        let script = backend.script();
        let config = CaptureConfig {
            recovery: RecoveryPolicy {
                backoff_ms: Some(1),
                max_attempts: Some(3),
            },
            ..CaptureConfig::for_desktop(DESKTOP)
        };
        let controller = CaptureController::with_config(backend, desktop(), config).unwrap();
        script.push_steps([AcquireStep::Fail(0x887A_0026)]);
        script.fail_next_opens(10, CaptureError::DuplicationFailed(0x887A_0022));

        controller.start();

        assert!(wait_until(Duration::from_secs(5), || matches!(
            controller.state(),
            CaptureState::Failed(_)
        )));
        assert_eq!(
            controller.state(),
            CaptureState::Failed(CaptureError::DuplicationFailed(0x887A_0022))
        );
        assert!(!controller.is_capturing());
        assert_eq!(controller.diagnostics().reopen_attempts, 3);
        assert!(controller.last_error().is_some());
    }

    #[test]
    fn stop_returns_within_one_timeout() {
        let backend = two_adapters();
        let probe = backend.probe();
        backend.script().set_default_step(AcquireStep::Timeout);
        let controller = CaptureController::new(backend, desktop()).unwrap();
        controller.set_timeout_ms(50);

        controller.start();
        assert!(wait_until(Duration::from_secs(2), || probe.acquires_started() >= 2));

        let stopped = Instant::now();
        controller.stop();
        assert!(!controller.is_capturing());
        assert!(wait_until(Duration::from_secs(2), || !controller.state().is_running()));
        assert!(stopped.elapsed() < Duration::from_millis(50 + 250));

        // No acquire was abandoned half-way.
        assert_eq!(probe.acquires_started(), probe.acquires_completed());
        assert_eq!(controller.state(), CaptureState::Ready);
        assert!(controller.diagnostics().timeouts >= 1);
        assert_eq!(controller.diagnostics().frames_published, 0);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let controller = CaptureController::new(two_adapters(), desktop()).unwrap();
        let frames = frame_channel(&controller);

        controller.start();
        controller.start();
        wait_frames(&frames, 2);
        controller.stop();
        controller.stop();

        assert!(wait_until(Duration::from_secs(2), || controller.state() == CaptureState::Ready));

        controller.start();
        wait_frames(&frames, 1);
        assert!(controller.is_capturing());
    }

    #[test]
    fn autostart_from_config() {
        let config = CaptureConfig {
            capture_enabled: true,
            ..CaptureConfig::for_desktop(DESKTOP)
        };
        let controller = CaptureController::with_config(two_adapters(), desktop(), config).unwrap();

        assert!(controller.is_capturing());
        assert!(wait_until(Duration::from_secs(2), || controller.latest_frame().is_some()));
    }

    #[test]
    fn decode_failures_are_skipped() {
        let backend = two_adapters();
        backend.script().push_steps([AcquireStep::Corrupt, AcquireStep::Frame]);
        let controller = CaptureController::new(backend, desktop()).unwrap();
        let frames = frame_channel(&controller);

        controller.start();
        wait_frames(&frames, 1);

        assert_eq!(controller.diagnostics().decode_failures, 1);
        assert_eq!(controller.latest_frame().unwrap().sequence, 1);
    }

    #[test]
    fn duplicate_frames_are_not_published() {
        let backend = two_adapters();
        backend
            .script()
            .push_steps([AcquireStep::Duplicate, AcquireStep::Duplicate, AcquireStep::Frame]);
        let controller = CaptureController::new(backend, desktop()).unwrap();
        let frames = frame_channel(&controller);

        controller.start();
        wait_frames(&frames, 1);

        let diagnostics = controller.diagnostics();
        assert_eq!(diagnostics.duplicate_frames, 2);
        assert_eq!(controller.latest_frame().unwrap().sequence, 1);
    }

    #[test]
    fn rejects_zero_rate_and_timeout() {
        let controller = CaptureController::new(two_adapters(), desktop()).unwrap();

        assert!(!controller.set_frame_rate(0));
        assert!(!controller.set_timeout_ms(0));
        assert_eq!(controller.frame_rate(), 120);
        assert_eq!(controller.timeout_ms(), 50);

        assert!(controller.set_frame_rate(60));
        assert!(controller.set_timeout_ms(1000));
        assert_eq!(controller.frame_rate(), 60);
        assert_eq!(controller.timeout_ms(), 1000);
    }

    #[test]
    fn crop_setters_clamp_to_desktop() {
        let controller = CaptureController::new(two_adapters(), desktop()).unwrap();

        assert_eq!(controller.set_crop_size(32, 16), CropRect::new(16, 8, 32, 16));
        assert_eq!(controller.set_crop_size(0, 100), CropRect::new(0, 0, 64, 32));
        assert_eq!(controller.set_crop_rect(10, 5, 1000, 0), CropRect::new(10, 5, 64, 32));
        assert_eq!(controller.crop_rect(), CropRect::new(10, 5, 64, 32));
    }

    #[test]
    fn crop_outside_source_is_zero_filled() {
        let controller = CaptureController::new(two_adapters(), desktop()).unwrap();
        controller.set_crop_rect(48, 0, 32, 16);
        let frames = frame_channel(&controller);

        controller.start();
        wait_frames(&frames, 1);

        let frame = controller.latest_frame().unwrap();
        assert_eq!(frame.pixel(0, 0).map(|p| p[3]), Some(0xFF));
        assert_eq!(frame.pixel(20, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn out_of_range_selection_is_ignored() {
        let backend = two_adapters();
        let probe = backend.probe();
        let controller = CaptureController::new(backend, desktop()).unwrap();

        assert!(!controller.set_adapter_index(2));
        assert!(!controller.set_output_index(1));
        assert_eq!((controller.adapter_index(), controller.output_index()), (0, 0));
        assert_eq!(probe.open_attempts(), 1);
    }

    #[test]
    fn reselect_while_idle_reopens_immediately() {
        let backend = two_adapters();
        let probe = backend.probe();
        let controller = CaptureController::new(backend, desktop()).unwrap();

        assert!(controller.set_adapter_index(1));
        assert_eq!(controller.outputs().len(), 2);
        assert!(controller.set_output_index(1));

        assert_eq!((controller.adapter_index(), controller.output_index()), (1, 1));
        assert_eq!(probe.duplications_alive(), 1);
        assert_eq!(
            probe.events().last(),
            Some(&SimEvent::DuplicationOpened { adapter: 1, output: 1 })
        );
    }

    #[test]
    fn reselect_while_capturing_keeps_running() {
        let backend = two_adapters();
        let probe = backend.probe();
        let controller = CaptureController::new(backend, desktop()).unwrap();
        let frames = frame_channel(&controller);
        controller.start();
        wait_frames(&frames, 2);

        assert!(controller.set_adapter_index(1));
        assert!(wait_until(Duration::from_secs(2), || probe
            .events()
            .contains(&SimEvent::DuplicationOpened { adapter: 1, output: 0 })));
        while frames.try_recv().is_ok() {}
        wait_frames(&frames, 2);

        assert!(controller.is_capturing());
        assert_eq!(controller.outputs().len(), 2);
        assert_eq!(probe.duplications_alive(), 1);
    }

    #[test]
    fn close_releases_session() {
        let backend = two_adapters();
        let probe = backend.probe();
        let controller = CaptureController::new(backend, desktop()).unwrap();
        let frames = frame_channel(&controller);
        controller.start();
        wait_frames(&frames, 1);

        controller.close();

        assert!(!controller.is_capturing());
        assert!(wait_until(Duration::from_secs(2), || controller.state() == CaptureState::Idle));
        assert_eq!(probe.devices_alive(), 0);
        assert_eq!(probe.duplications_alive(), 0);
    }

    #[test]
    fn drop_joins_capture_thread() {
        let backend = two_adapters();
        let probe = backend.probe();
        let controller = CaptureController::new(backend, desktop()).unwrap();
        let frames = frame_channel(&controller);
        controller.start();
        wait_frames(&frames, 1);

        drop(controller);

        assert_eq!(probe.devices_alive(), 0);
        assert_eq!(probe.duplications_alive(), 0);
        assert_eq!(probe.acquires_started(), probe.acquires_completed());
    }

    #[test]
    fn status_serializes_to_json() {
        let controller = CaptureController::new(two_adapters(), desktop()).unwrap();

        let status = controller.status();
        assert_eq!(status.state, "ready");
        assert_eq!(status.adapters.len(), 2);

        let json = status.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["adapters"][1]["description"], "Adapter B");
        assert_eq!(value["frame_rate"], 120);
        assert_eq!(value["capture_enabled"], false);
    }
    /// Reselects adapter 0 whenever an open fails.
    struct FallBackOnError {
        controller: std::sync::OnceLock<std::sync::Weak<CaptureController>>,
        calls: parking_lot::Mutex<Vec<bool>>,
    }

    impl FrameListener for FallBackOnError {
        fn on_frame_ready(&self) {}

        fn on_error(&self, _error: &CaptureError) {
            if let Some(controller) = self.controller.get().and_then(|c| c.upgrade()) {
                let accepted = controller.set_adapter_index(0);
                self.calls.lock().push(accepted);
            }
        }
    }

    #[test]
    fn listener_can_reselect_from_error_callback() {
        let backend = two_adapters();
        let probe = backend.probe();
        let script = backend.script();
        let controller = Arc::new(CaptureController::new(backend, desktop()).unwrap());
        let listener = Arc::new(FallBackOnError {
            controller: std::sync::OnceLock::new(),
            calls: parking_lot::Mutex::new(Vec::new()),
        });
        let _ = listener.controller.set(Arc::downgrade(&controller));
        controller.subscribe(listener.clone());
        script.fail_next_opens(1, CaptureError::DuplicationFailed(0x887A_0022));

        let (done_tx, done_rx) = mpsc::channel();
        let caller = Arc::clone(&controller);
        std::thread::spawn(move || {
            let _ = done_tx.send(caller.set_adapter_index(1));
        });

        assert_eq!(done_rx.recv_timeout(Duration::from_secs(3)), Ok(true));
        assert!(wait_until(Duration::from_secs(2), || probe
            .events()
            .last()
            .is_some_and(|e| *e == SimEvent::DuplicationOpened { adapter: 0, output: 0 })));
        assert_eq!(*listener.calls.lock(), vec![true]);
        assert_eq!(controller.adapter_index(), 0);
        assert_eq!(controller.state(), CaptureState::Ready);
    }

    #[test]
    fn output_index_checked_against_newly_selected_adapter() {
        let backend = two_adapters();
        let probe = backend.probe();
        let controller = CaptureController::new(backend, desktop()).unwrap();
        let frames = frame_channel(&controller);
        controller.start();
        wait_frames(&frames, 1);

        // Adapter 0 has one output, adapter 1 has two.
        assert!(controller.set_adapter_index(1));
        assert_eq!(controller.outputs().len(), 2);
        assert!(controller.set_output_index(1));

        assert_eq!((controller.adapter_index(), controller.output_index()), (1, 1));
        assert!(probe
            .events()
            .contains(&SimEvent::DuplicationOpened { adapter: 1, output: 1 }));
        assert!(controller.is_capturing());
    }
}

use std::ops::ControlFlow;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::Utc;

use crate::models::device::Selection;
use crate::models::error::CaptureError;
use crate::models::frame::{DecodedImage, Frame};
use crate::models::state::CaptureState;
use crate::processing::crop;
use crate::processing::pacer::{precise_wait, Pacer};
use crate::traits::duplication_backend::{AcquiredFrame, DuplicationBackend};

use super::capture_session::CaptureSession;
use super::command::Command;
use super::shared::Shared;

/// Owns the session on the capture thread and drives the
/// acquire → convert → publish → pace cycle.
///
/// ```text
/// [release prev] → [acquire(timeout)] ─ timeout/duplicate ─┐
///        ↑                 │ fatal → [reopen until ok] ────┤
///        │                 ▼                               │
///        │           [read back] ─ decode error ───────────┤
///        │                 ▼                               │
///        └── [pace] ← [crop + publish]  ←──────────────────┘ (retry)
/// ```
pub(crate) struct FrameAcquirer<B: DuplicationBackend> {
    session: CaptureSession<B>,
    shared: Arc<Shared>,
    commands: Receiver<Command>,
    pacer: Pacer,
    sequence: u64,
    running: bool,
    shutdown: bool,
}

impl<B: DuplicationBackend> FrameAcquirer<B> {
    pub fn new(
        session: CaptureSession<B>,
        shared: Arc<Shared>,
        commands: Receiver<Command>,
    ) -> Self {
        Self {
            session,
            shared,
            commands,
            pacer: Pacer::new(),
            sequence: 0,
            running: false,
            shutdown: false,
        }
    }

    /// Capture thread body: serve commands until shutdown or until the
    /// controller goes away.
    pub fn serve(mut self) {
        while !self.shutdown {
            match self.commands.recv() {
                Ok(command) => self.handle(command),
                Err(_) => break,
            }
        }
        self.session.close();
        log::debug!("Capture thread exiting");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Open { selection, fallback, reply } => {
                let result = self.open(selection, fallback);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Command::Run => self.run_capture_loop(),
            Command::Close { reply } => {
                self.close();
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
            }
            Command::Shutdown => self.shutdown = true,
        }
    }

    /// Commands that arrive while the loop runs are applied at the next
    /// cycle boundary, on this thread.
    fn drain_commands(&mut self) -> ControlFlow<()> {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Run => {}
                Command::Open { selection, fallback, reply } => {
                    // A failed open leaves the session closed; the next
                    // acquire then falls into recovery for the new selection.
                    let result = self.open(selection, fallback);
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                Command::Close { reply } => {
                    self.shared.lock().config.capture_enabled = false;
                    self.close();
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                    return ControlFlow::Break(());
                }
                Command::Shutdown => {
                    self.shutdown = true;
                    return ControlFlow::Break(());
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn open(&mut self, selection: Selection, fallback: bool) -> Result<(), CaptureError> {
        let mut result = self.session.open(selection.adapter, selection.output);

        if let Err(e) = &result {
            log::warn!(
                "Failed to open adapter {} output {}: {}",
                selection.adapter,
                selection.output,
                e
            );
        }

        if result.is_err() && fallback {
            let candidates = self.session.adapters().len();
            for adapter in (0..candidates).filter(|a| *a != selection.adapter) {
                log::info!("Trying fallback adapter {adapter} output 0");
                if self.session.open(adapter, 0).is_ok() {
                    let mut s = self.shared.lock();
                    s.config.adapter_index = adapter;
                    s.config.output_index = 0;
                    result = Ok(());
                    break;
                }
            }
        }

        self.pacer.reset();
        self.shared.sync_session(&self.session);
        if let Err(ref e) = result {
            self.shared.notify_error(e);
        }
        if !self.running {
            self.shared.set_state(self.idle_state());
        }
        result
    }

    fn close(&mut self) {
        self.session.close();
        self.shared.sync_session(&self.session);
        if !self.running {
            self.shared.set_state(CaptureState::Idle);
        }
        log::info!("Capture session closed");
    }

    fn idle_state(&self) -> CaptureState {
        if self.session.is_open() {
            CaptureState::Ready
        } else {
            CaptureState::Idle
        }
    }

    fn capture_enabled(&self) -> bool {
        self.shared.lock().config.capture_enabled
    }

    /// Run cycles until capture is disabled, the session is closed, or a
    /// capped recovery gives up.
    ///
    /// Without an open session there is nothing to recover, so capture is
    /// switched back off instead.
    fn run_capture_loop(&mut self) {
        if !self.capture_enabled() {
            return;
        }
        if !self.session.is_open() {
            log::warn!("Cannot start capture: no capture session is open");
            self.shared.lock().config.capture_enabled = false;
            self.shared.set_state(CaptureState::Idle);
            return;
        }
        self.running = true;
        self.shared.set_state(CaptureState::Capturing);
        log::info!("Capture loop started");

        let exit_state = loop {
            match self.cycle() {
                ControlFlow::Continue(()) => {}
                ControlFlow::Break(Some(error)) => break CaptureState::Failed(error),
                ControlFlow::Break(None) => break self.idle_state(),
            }
        };

        self.running = false;
        self.shared.set_state(exit_state);
        log::info!("Capture loop stopped");
    }

    /// One acquire → convert → publish → pace pass.
    fn cycle(&mut self) -> ControlFlow<Option<CaptureError>> {
        let (frame, started) = self.acquire()?;

        let image = match self.session.read_frame(frame.texture) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Skipping frame: {e}");
                self.shared.lock().diagnostics.decode_failures += 1;
                return ControlFlow::Continue(());
            }
        };

        self.publish(image, frame.last_present_time);

        let frame_rate = self.shared.lock().config.frame_rate;
        let wait = self.pacer.next_wait(started.elapsed(), frame_rate);
        {
            let mut s = self.shared.lock();
            s.diagnostics.average_frame_ms = self.pacer.average_ms();
            s.diagnostics.last_sleep_budget_ms = self.pacer.last_budget_ms();
        }
        precise_wait(wait);
        ControlFlow::Continue(())
    }

    /// Loop until a frame with a new desktop image arrives.
    ///
    /// Returns the frame and the instant its acquire attempt started.
    fn acquire(
        &mut self,
    ) -> ControlFlow<Option<CaptureError>, (AcquiredFrame<B::Texture>, Instant)> {
        loop {
            if self.drain_commands().is_break() {
                return ControlFlow::Break(None);
            }
            let timeout = {
                let s = self.shared.lock();
                if !s.config.capture_enabled {
                    return ControlFlow::Break(None);
                }
                s.config.timeout()
            };

            let started = Instant::now();
            let _ = self.session.release_frame();

            match self.session.acquire_next_frame(timeout) {
                Ok(frame) if frame.has_new_image() => {
                    return ControlFlow::Continue((frame, started));
                }
                Ok(_) => {
                    self.shared.lock().diagnostics.duplicate_frames += 1;
                }
                Err(e) if e.is_timeout() => {
                    log::trace!("No new frame within {}ms", timeout.as_millis());
                    self.shared.lock().diagnostics.timeouts += 1;
                }
                Err(e) => {
                    log::warn!("Frame acquisition failed, re-opening session: {e}");
                    self.shared.lock().diagnostics.fatal_acquire_failures += 1;
                    self.recover()?;
                }
            }
        }
    }

    /// Re-open the session with the last selection until it succeeds.
    ///
    /// Not interruptible by `stop()`; only a capped [`RecoveryPolicy`],
    /// `close()` or dropping the controller ends it early. A new selection
    /// sent meanwhile replaces the one being retried.
    ///
    /// [`RecoveryPolicy`]: crate::models::config::RecoveryPolicy
    fn recover(&mut self) -> ControlFlow<Option<CaptureError>> {
        let policy = self.shared.lock().config.recovery;
        let mut attempts: u32 = 0;

        loop {
            if self.shared.is_shutting_down() || self.drain_commands().is_break() {
                return ControlFlow::Break(None);
            }
            if self.session.is_open() {
                self.shared.set_state(CaptureState::Capturing);
                log::info!("Session re-opened with a new selection");
                return ControlFlow::Continue(());
            }

            let selection = self.session.selection();
            attempts = attempts.saturating_add(1);
            self.shared.lock().diagnostics.reopen_attempts += 1;
            self.shared.set_state(CaptureState::Recovering { attempts });

            match self.session.open(selection.adapter, selection.output) {
                Ok(()) => {
                    self.pacer.reset();
                    self.shared.sync_session(&self.session);
                    self.shared.set_state(CaptureState::Capturing);
                    log::info!("Session re-opened after {attempts} attempt(s)");
                    return ControlFlow::Continue(());
                }
                Err(e) => {
                    self.shared.sync_session(&self.session);
                    self.shared.notify_error(&e);
                    if attempts == 1 {
                        log::warn!("Re-open failed, retrying: {e}");
                    } else {
                        log::debug!("Re-open attempt {attempts} failed: {e}");
                    }

                    if policy.gives_up_after(attempts) {
                        log::error!("Giving up on capture after {attempts} re-open attempts: {e}");
                        self.shared.lock().config.capture_enabled = false;
                        return ControlFlow::Break(Some(e));
                    }
                    if let Some(backoff) = policy.backoff() {
                        thread::sleep(backoff);
                    }
                }
            }
        }
    }

    fn publish(&mut self, image: DecodedImage, present_time: i64) {
        let region = self.shared.lock().config.crop;
        let data = crop::crop(&image, region);
        self.sequence += 1;

        let frame = Arc::new(Frame {
            width: region.width,
            height: region.height,
            format: image.format,
            data,
            region,
            source_size: image.size(),
            sequence: self.sequence,
            present_time,
            captured_at: Utc::now(),
        });

        {
            let mut s = self.shared.lock();
            s.latest_frame = Some(frame);
            s.diagnostics.frames_published += 1;
        }
        self.shared.notify_frame_ready();
    }
}

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::probe::{SimEvent, SimulationProbe};
use crate::models::device::{AdapterInfo, OutputInfo};
use crate::models::error::CaptureError;
use crate::models::frame::{DecodedImage, PixelFormat};
use crate::models::geometry::Size;
use crate::traits::duplication_backend::{AcquiredFrame, DeviceEnumerator, DuplicationBackend};

/// Outcome of one simulated acquire call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireStep {
    /// A new desktop image, delivered after the configured frame delay.
    Frame,
    /// An acquire that succeeds but carries no new presentation time.
    Duplicate,
    /// Blocks for the full timeout, then reports `AcquireTimeout`.
    Timeout,
    /// Fails with `AcquireFailed(code)`, e.g. access lost.
    Fail(u32),
    /// Acquires a frame whose read-back fails.
    Corrupt,
}

/// One simulated adapter with its outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedAdapter {
    pub description: String,
    pub outputs: Vec<String>,
}

#[derive(Debug)]
struct Script {
    steps: VecDeque<AcquireStep>,
    default_step: AcquireStep,
    open_failures: VecDeque<CaptureError>,
    device_failures: VecDeque<CaptureError>,
    enumeration_fails: bool,
}

/// Script controls shared with the caller after the backend moves away.
#[derive(Debug, Clone)]
pub struct SimulationScript {
    inner: Arc<Mutex<Script>>,
}

impl SimulationScript {
    /// Append outcomes consumed by the next acquire calls, in order.
    pub fn push_steps(&self, steps: impl IntoIterator<Item = AcquireStep>) {
        self.inner.lock().steps.extend(steps);
    }

    /// Outcome used once the queued steps run out.
    pub fn set_default_step(&self, step: AcquireStep) {
        self.inner.lock().default_step = step;
    }

    /// Make the next `count` duplication requests fail with `error`.
    pub fn fail_next_opens(&self, count: usize, error: CaptureError) {
        let mut script = self.inner.lock();
        script.open_failures.extend(std::iter::repeat_n(error, count));
    }

    /// Make the next `count` device creations fail with `error`.
    pub fn fail_next_devices(&self, count: usize, error: CaptureError) {
        let mut script = self.inner.lock();
        script.device_failures.extend(std::iter::repeat_n(error, count));
    }

    pub fn set_enumeration_fails(&self, fails: bool) {
        self.inner.lock().enumeration_fails = fails;
    }

    fn next_step(&self) -> AcquireStep {
        let mut script = self.inner.lock();
        match script.steps.pop_front() {
            Some(step) => step,
            None => script.default_step.clone(),
        }
    }
}

/// A [`DuplicationBackend`] that needs no GPU.
///
/// Produces solid-colour BGRA frames of a fixed size whose blue channel
/// carries the low byte of a running frame counter. Used for CI, demos on
/// non-Windows hosts and the capture-loop tests.
pub struct SimulatedBackend {
    adapters: Vec<SimulatedAdapter>,
    frame_size: Size,
    frame_delay: Duration,
    script: SimulationScript,
    probe: SimulationProbe,
    frame_counter: u64,
}

impl SimulatedBackend {
    /// One adapter with one output producing `frame_size` frames.
    pub fn new(frame_size: Size) -> Self {
        Self::with_adapters(
            frame_size,
            vec![SimulatedAdapter {
                description: "Simulated Display Adapter".into(),
                outputs: vec![r"\\.\DISPLAY1".into()],
            }],
        )
    }

    pub fn with_adapters(frame_size: Size, adapters: Vec<SimulatedAdapter>) -> Self {
        Self {
            adapters,
            frame_size,
            frame_delay: Duration::ZERO,
            script: SimulationScript {
                inner: Arc::new(Mutex::new(Script {
                    steps: VecDeque::new(),
                    default_step: AcquireStep::Frame,
                    open_failures: VecDeque::new(),
                    device_failures: VecDeque::new(),
                    enumeration_fails: false,
                })),
            },
            probe: SimulationProbe::new(),
            frame_counter: 0,
        }
    }

    /// Time each successful acquire takes before returning.
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    pub fn script(&self) -> SimulationScript {
        self.script.clone()
    }

    pub fn probe(&self) -> SimulationProbe {
        self.probe.clone()
    }

    fn frame_image(&self, seq: u64) -> DecodedImage {
        let pixel = [seq as u8, 0x40, 0x80, 0xFF];
        let count = self.frame_size.width as usize * self.frame_size.height as usize;
        DecodedImage {
            width: self.frame_size.width,
            height: self.frame_size.height,
            format: PixelFormat::Bgra8,
            data: pixel.repeat(count),
        }
    }
}

impl DeviceEnumerator for SimulatedBackend {
    fn enumerate_adapters(&self) -> Result<Vec<AdapterInfo>, CaptureError> {
        if self.script.inner.lock().enumeration_fails {
            return Err(CaptureError::EnumerationFailed { what: "adapters", code: 0x8000_4005 });
        }
        Ok(self
            .adapters
            .iter()
            .enumerate()
            .map(|(index, adapter)| AdapterInfo {
                index,
                description: adapter.description.clone(),
                dedicated_video_memory: 0,
            })
            .collect())
    }

    fn enumerate_outputs(&self, adapter: usize) -> Result<Vec<OutputInfo>, CaptureError> {
        if self.script.inner.lock().enumeration_fails {
            return Err(CaptureError::EnumerationFailed { what: "outputs", code: 0x8000_4005 });
        }
        Ok(self
            .adapters
            .get(adapter)
            .map(|a| {
                a.outputs
                    .iter()
                    .enumerate()
                    .map(|(index, name)| OutputInfo {
                        index,
                        name: name.clone(),
                        attached_to_desktop: true,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Simulated device handle; counts itself in the probe while alive.
pub struct SimDevice {
    probe: SimulationProbe,
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        self.probe.device_dropped();
    }
}

/// Simulated duplication interface.
pub struct SimDuplication {
    probe: SimulationProbe,
    frame_held: bool,
}

impl Drop for SimDuplication {
    fn drop(&mut self) {
        self.probe.duplication_dropped();
    }
}

#[derive(Debug)]
pub struct SimTexture {
    seq: u64,
    corrupt: bool,
}

#[derive(Debug)]
pub struct SimStaging {
    size: Size,
}

impl DuplicationBackend for SimulatedBackend {
    type Device = SimDevice;
    type Duplication = SimDuplication;
    type Texture = SimTexture;
    type Staging = SimStaging;

    fn create_device(&mut self) -> Result<SimDevice, CaptureError> {
        if let Some(err) = self.script.inner.lock().device_failures.pop_front() {
            self.probe.record(SimEvent::DeviceCreationRejected);
            return Err(err);
        }
        self.probe.device_created();
        Ok(SimDevice { probe: self.probe.clone() })
    }

    fn duplicate_output(
        &mut self,
        _device: &SimDevice,
        adapter: usize,
        output: usize,
    ) -> Result<SimDuplication, CaptureError> {
        self.probe.open_attempted();
        if let Some(err) = self.script.inner.lock().open_failures.pop_front() {
            self.probe.record(SimEvent::DuplicationRejected { adapter, output });
            return Err(err);
        }
        self.probe.duplication_opened(adapter, output);
        Ok(SimDuplication { probe: self.probe.clone(), frame_held: false })
    }

    fn release_frame(&mut self, duplication: &mut SimDuplication) -> Result<(), CaptureError> {
        if !duplication.frame_held {
            // DXGI reports INVALID_CALL here; callers ignore it.
            return Err(CaptureError::AcquireFailed(0x887A_0001));
        }
        duplication.frame_held = false;
        self.probe.frame_released();
        Ok(())
    }

    fn acquire_next_frame(
        &mut self,
        duplication: &mut SimDuplication,
        timeout: Duration,
    ) -> Result<AcquiredFrame<SimTexture>, CaptureError> {
        self.probe.acquire_started();
        let step = self.script.next_step();
        match step {
            AcquireStep::Timeout => {
                thread::sleep(timeout);
                self.probe.acquire_completed(SimEvent::AcquireTimedOut);
                Err(CaptureError::AcquireTimeout)
            }
            AcquireStep::Fail(code) => {
                self.probe.acquire_completed(SimEvent::AcquireFailed);
                Err(CaptureError::AcquireFailed(code))
            }
            AcquireStep::Duplicate => {
                duplication.frame_held = true;
                self.probe.acquire_completed(SimEvent::DuplicateFrame);
                Ok(AcquiredFrame {
                    texture: SimTexture { seq: self.frame_counter, corrupt: false },
                    last_present_time: 0,
                    accumulated_frames: 0,
                })
            }
            AcquireStep::Frame | AcquireStep::Corrupt => {
                if !self.frame_delay.is_zero() {
                    thread::sleep(self.frame_delay);
                }
                self.frame_counter += 1;
                duplication.frame_held = true;
                self.probe.acquire_completed(SimEvent::FrameAcquired);
                Ok(AcquiredFrame {
                    texture: SimTexture {
                        seq: self.frame_counter,
                        corrupt: step == AcquireStep::Corrupt,
                    },
                    last_present_time: self.frame_counter as i64,
                    accumulated_frames: 1,
                })
            }
        }
    }

    fn read_texture(
        &mut self,
        _device: &SimDevice,
        staging: &mut Option<SimStaging>,
        texture: SimTexture,
    ) -> Result<DecodedImage, CaptureError> {
        if texture.corrupt {
            self.probe.record(SimEvent::DecodeFailed);
            return Err(CaptureError::FrameDecodeFailed(
                "resource is not a 2D texture".into(),
            ));
        }
        if staging.as_ref().map(|s| s.size) != Some(self.frame_size) {
            *staging = Some(SimStaging { size: self.frame_size });
            self.probe.staging_allocated();
        }
        Ok(self.frame_image(texture.seq))
    }
}

//! DXGI Desktop Duplication backend.
//!
//! Device creation, output duplication, frame acquisition and staging
//! read-back for [`CaptureSession`](frame_capture_core::CaptureSession).
//! All COM objects are created and used on the capture thread.

use std::time::Duration;

use windows::core::Interface;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

use frame_capture_core::models::device::{AdapterInfo, OutputInfo};
use frame_capture_core::models::error::CaptureError;
use frame_capture_core::models::frame::{DecodedImage, PixelFormat};
use frame_capture_core::traits::duplication_backend::{
    AcquiredFrame, DeviceEnumerator, DuplicationBackend,
};

use crate::dxgi_enumerator::{hresult, DxgiEnumerator};

/// Formats requested from `DuplicateOutput1`; frames arrive as BGRA8.
const SUPPORTED_FORMATS: [DXGI_FORMAT; 1] = [DXGI_FORMAT_B8G8R8A8_UNORM];

/// Direct3D 11 device on the default hardware adapter.
pub struct DxgiDevice {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
}

pub struct DxgiDuplication {
    duplication: IDXGIOutputDuplication,
}

pub struct DxgiStaging {
    texture: ID3D11Texture2D,
    width: u32,
    height: u32,
}

// SAFETY: these wrappers are created on the capture thread and never leave
// it; Send is only needed to move the owning session there before first use.
unsafe impl Send for DxgiDevice {}
unsafe impl Send for DxgiDuplication {}
unsafe impl Send for DxgiStaging {}

/// [`DuplicationBackend`] over DXGI Desktop Duplication and Direct3D 11.
#[derive(Debug, Default)]
pub struct DxgiBackend {
    enumerator: DxgiEnumerator,
}

impl DxgiBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_staging(
        device: &DxgiDevice,
        staging: &mut Option<DxgiStaging>,
        width: u32,
        height: u32,
    ) -> Result<ID3D11Texture2D, CaptureError> {
        if let Some(existing) = staging.as_ref() {
            if existing.width == width && existing.height == height {
                return Ok(existing.texture.clone());
            }
        }

        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };

        let mut texture = None;
        unsafe { device.device.CreateTexture2D(&desc, None, Some(&mut texture)) }.map_err(|e| {
            CaptureError::FrameDecodeFailed(format!(
                "failed to create staging texture: error code {:#x}",
                hresult(&e)
            ))
        })?;
        let texture = texture.ok_or_else(|| {
            CaptureError::FrameDecodeFailed("staging texture creation returned nothing".into())
        })?;

        log::debug!("Allocated {}x{} staging texture", width, height);
        *staging = Some(DxgiStaging {
            texture: texture.clone(),
            width,
            height,
        });
        Ok(texture)
    }
}

impl DeviceEnumerator for DxgiBackend {
    fn enumerate_adapters(&self) -> Result<Vec<AdapterInfo>, CaptureError> {
        self.enumerator.enumerate_adapters()
    }

    fn enumerate_outputs(&self, adapter: usize) -> Result<Vec<OutputInfo>, CaptureError> {
        self.enumerator.enumerate_outputs(adapter)
    }
}

impl DuplicationBackend for DxgiBackend {
    type Device = DxgiDevice;
    type Duplication = DxgiDuplication;
    type Texture = IDXGIResource;
    type Staging = DxgiStaging;

    fn create_device(&mut self) -> Result<DxgiDevice, CaptureError> {
        let mut device = None;
        let mut context = None;
        let mut feature_level = D3D_FEATURE_LEVEL::default();

        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                Some(&[D3D_FEATURE_LEVEL_11_0]),
                D3D11_SDK_VERSION,
                Some(&mut device),
                Some(&mut feature_level),
                Some(&mut context),
            )
        }
        .map_err(|e| CaptureError::DeviceCreationFailed(hresult(&e)))?;

        match (device, context) {
            (Some(device), Some(context)) => {
                log::debug!("Created D3D11 device (feature level {:#x})", feature_level.0);
                Ok(DxgiDevice { device, context })
            }
            // E_POINTER
            _ => Err(CaptureError::DeviceCreationFailed(0x8000_4003)),
        }
    }

    fn duplicate_output(
        &mut self,
        device: &DxgiDevice,
        adapter: usize,
        output: usize,
    ) -> Result<DxgiDuplication, CaptureError> {
        let output = self.enumerator.output(adapter, output)?;
        let output6 = output
            .cast::<IDXGIOutput6>()
            .map_err(|e| CaptureError::InterfaceUnsupported(hresult(&e)))?;

        let duplication = unsafe { output6.DuplicateOutput1(&device.device, 0, &SUPPORTED_FORMATS) }
            .map_err(|e| CaptureError::DuplicationFailed(hresult(&e)))?;

        Ok(DxgiDuplication { duplication })
    }

    fn release_frame(&mut self, duplication: &mut DxgiDuplication) -> Result<(), CaptureError> {
        unsafe { duplication.duplication.ReleaseFrame() }
            .map_err(|e| CaptureError::AcquireFailed(hresult(&e)))
    }

    fn acquire_next_frame(
        &mut self,
        duplication: &mut DxgiDuplication,
        timeout: Duration,
    ) -> Result<AcquiredFrame<IDXGIResource>, CaptureError> {
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource = None;

        unsafe {
            duplication
                .duplication
                .AcquireNextFrame(timeout_ms, &mut info, &mut resource)
        }
        .map_err(|e| {
            if e.code() == DXGI_ERROR_WAIT_TIMEOUT {
                CaptureError::AcquireTimeout
            } else {
                CaptureError::AcquireFailed(hresult(&e))
            }
        })?;

        let texture = resource
            .ok_or_else(|| CaptureError::FrameDecodeFailed("acquire returned no resource".into()))?;

        Ok(AcquiredFrame {
            texture,
            last_present_time: info.LastPresentTime,
            accumulated_frames: info.AccumulatedFrames,
        })
    }

    fn read_texture(
        &mut self,
        device: &DxgiDevice,
        staging: &mut Option<DxgiStaging>,
        texture: IDXGIResource,
    ) -> Result<DecodedImage, CaptureError> {
        let source = texture
            .cast::<ID3D11Texture2D>()
            .map_err(|_| CaptureError::FrameDecodeFailed("resource is not a 2D texture".into()))?;

        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { source.GetDesc(&mut desc) };
        if desc.Format != DXGI_FORMAT_B8G8R8A8_UNORM {
            return Err(CaptureError::FrameDecodeFailed(format!(
                "unsupported pixel format {}",
                desc.Format.0
            )));
        }
        if desc.Width == 0 || desc.Height == 0 {
            return Err(CaptureError::FrameDecodeFailed("empty desktop texture".into()));
        }

        let target = Self::ensure_staging(device, staging, desc.Width, desc.Height)?;

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            device.context.CopyResource(&target, &source);
            device
                .context
                .Map(&target, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                .map_err(|e| {
                    CaptureError::FrameDecodeFailed(format!(
                        "failed to map staging texture: error code {:#x}",
                        hresult(&e)
                    ))
                })?;
        }

        let format = PixelFormat::Bgra8;
        let row_bytes = desc.Width as usize * format.bytes_per_pixel();
        let row_pitch = mapped.RowPitch as usize;
        let mut data = vec![0u8; row_bytes * desc.Height as usize];

        // SAFETY: the mapping covers `Height` rows of `RowPitch` bytes each,
        // with `RowPitch >= Width * 4`, until the Unmap below.
        unsafe {
            let base = mapped.pData as *const u8;
            for (y, row) in data.chunks_exact_mut(row_bytes).enumerate() {
                std::ptr::copy_nonoverlapping(base.add(y * row_pitch), row.as_mut_ptr(), row_bytes);
            }
            device.context.Unmap(&target, 0);
        }

        Ok(DecodedImage {
            width: desc.Width,
            height: desc.Height,
            format,
            data,
        })
    }
}

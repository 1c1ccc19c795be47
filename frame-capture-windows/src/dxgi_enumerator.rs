//! Adapter and output enumeration via DXGI.
//!
//! A fresh `IDXGIFactory1` is created for every listing; a factory keeps
//! the adapter set it saw at creation and would miss hot-plugged GPUs.

use windows::core::Error as WinError;
use windows::Win32::Graphics::Dxgi::*;

use frame_capture_core::models::device::{AdapterInfo, OutputInfo};
use frame_capture_core::models::error::CaptureError;
use frame_capture_core::traits::duplication_backend::DeviceEnumerator;

/// Stateless DXGI enumerator.
#[derive(Debug, Default, Clone, Copy)]
pub struct DxgiEnumerator;

impl DxgiEnumerator {
    pub fn new() -> Self {
        Self
    }

    fn factory(what: &'static str) -> Result<IDXGIFactory1, CaptureError> {
        unsafe { CreateDXGIFactory1::<IDXGIFactory1>() }.map_err(|e| enumeration_failed(what, &e))
    }

    /// The `index`-th adapter, or `AdapterNotFound` past the end of the list.
    pub fn adapter(&self, index: usize) -> Result<IDXGIAdapter1, CaptureError> {
        let factory = Self::factory("adapters")?;
        let slot = u32::try_from(index).map_err(|_| CaptureError::AdapterNotFound(index))?;
        unsafe { factory.EnumAdapters1(slot) }.map_err(|e| {
            if e.code() == DXGI_ERROR_NOT_FOUND {
                CaptureError::AdapterNotFound(index)
            } else {
                enumeration_failed("adapters", &e)
            }
        })
    }

    /// The `output`-th output of `adapter`, or `OutputNotFound` past the end.
    pub fn output(&self, adapter: usize, output: usize) -> Result<IDXGIOutput, CaptureError> {
        let adapter = self.adapter(adapter)?;
        let slot = u32::try_from(output).map_err(|_| CaptureError::OutputNotFound(output))?;
        unsafe { adapter.EnumOutputs(slot) }.map_err(|e| {
            if e.code() == DXGI_ERROR_NOT_FOUND {
                CaptureError::OutputNotFound(output)
            } else {
                enumeration_failed("outputs", &e)
            }
        })
    }
}

impl DeviceEnumerator for DxgiEnumerator {
    fn enumerate_adapters(&self) -> Result<Vec<AdapterInfo>, CaptureError> {
        let factory = Self::factory("adapters")?;
        let mut adapters = Vec::new();

        for index in 0u32.. {
            let adapter = match unsafe { factory.EnumAdapters1(index) } {
                Ok(adapter) => adapter,
                Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(e) => return Err(enumeration_failed("adapters", &e)),
            };
            let desc =
                unsafe { adapter.GetDesc1() }.map_err(|e| enumeration_failed("adapters", &e))?;
            adapters.push(AdapterInfo {
                index: index as usize,
                description: utf16_name(&desc.Description),
                dedicated_video_memory: desc.DedicatedVideoMemory as u64,
            });
        }

        log::debug!("Found {} adapter(s)", adapters.len());
        Ok(adapters)
    }

    fn enumerate_outputs(&self, adapter: usize) -> Result<Vec<OutputInfo>, CaptureError> {
        let adapter = match self.adapter(adapter) {
            Ok(adapter) => adapter,
            Err(CaptureError::AdapterNotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut outputs = Vec::new();

        for index in 0u32.. {
            let output = match unsafe { adapter.EnumOutputs(index) } {
                Ok(output) => output,
                Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(e) => return Err(enumeration_failed("outputs", &e)),
            };
            let desc = unsafe { output.GetDesc() }.map_err(|e| enumeration_failed("outputs", &e))?;
            outputs.push(OutputInfo {
                index: index as usize,
                name: utf16_name(&desc.DeviceName),
                attached_to_desktop: desc.AttachedToDesktop.as_bool(),
            });
        }

        Ok(outputs)
    }
}

pub(crate) fn hresult(e: &WinError) -> u32 {
    e.code().0 as u32
}

fn enumeration_failed(what: &'static str, e: &WinError) -> CaptureError {
    CaptureError::EnumerationFailed { what, code: hresult(e) }
}

/// Fixed-size, NUL-padded UTF-16 buffer to `String`.
fn utf16_name(raw: &[u16]) -> String {
    let len = raw.iter().position(|c| *c == 0).unwrap_or(raw.len());
    String::from_utf16_lossy(&raw[..len])
}

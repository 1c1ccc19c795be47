//! # frame-capture-windows
//!
//! Windows DXGI Desktop Duplication backend for frame-capture-core.
//!
//! Provides:
//! - `DxgiEnumerator`: adapter and output enumeration via `IDXGIFactory1`
//! - `DxgiBackend`: Direct3D 11 device, `IDXGIOutput6::DuplicateOutput1`
//!   duplication and staging-texture read-back
//! - `VirtualScreenMetrics`: virtual desktop size from `GetSystemMetrics`
//!
//! ## Platform Requirements
//! - Windows 10 1703+ for `IDXGIOutput6`
//! - A hardware Direct3D 11 device (feature level 11.0)
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use frame_capture_windows::{DxgiBackend, VirtualScreenMetrics};
//! use frame_capture_core::CaptureController;
//!
//! let controller = CaptureController::new(DxgiBackend::new(), Arc::new(VirtualScreenMetrics))?;
//! controller.subscribe(Arc::new(|| println!("frame")));
//! controller.start();
//! ```

#[cfg(target_os = "windows")]
pub mod dxgi_backend;
#[cfg(target_os = "windows")]
pub mod dxgi_enumerator;
#[cfg(target_os = "windows")]
pub mod virtual_screen;

#[cfg(target_os = "windows")]
pub use dxgi_backend::DxgiBackend;
#[cfg(target_os = "windows")]
pub use dxgi_enumerator::DxgiEnumerator;
#[cfg(target_os = "windows")]
pub use virtual_screen::VirtualScreenMetrics;

use windows::Win32::UI::WindowsAndMessaging::{
    GetSystemMetrics, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN,
};

use frame_capture_core::models::geometry::Size;
use frame_capture_core::traits::desktop_bounds::DesktopBounds;

/// Bounding size of all monitors, read from the system metrics on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct VirtualScreenMetrics;

impl DesktopBounds for VirtualScreenMetrics {
    fn virtual_desktop_size(&self) -> Size {
        let (width, height) = unsafe {
            (
                GetSystemMetrics(SM_CXVIRTUALSCREEN),
                GetSystemMetrics(SM_CYVIRTUALSCREEN),
            )
        };
        Size::new(width.max(0) as u32, height.max(0) as u32)
    }
}

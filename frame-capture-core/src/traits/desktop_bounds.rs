use crate::models::geometry::Size;

/// Source of the virtual-desktop size (all monitors combined).
///
/// Used to default and clamp the crop rectangle.
pub trait DesktopBounds: Send + Sync {
    fn virtual_desktop_size(&self) -> Size;
}

/// Fixed bounds, for hosts that already know their desktop size and for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDesktop(pub Size);

impl DesktopBounds for FixedDesktop {
    fn virtual_desktop_size(&self) -> Size {
        self.0
    }
}

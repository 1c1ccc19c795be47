use crate::models::device::{AdapterInfo, OutputInfo};
use crate::traits::duplication_backend::DeviceEnumerator;

/// Read-only adapter/output listing on top of a [`DeviceEnumerator`].
///
/// Holds no state between calls. A failing enumeration is logged and
/// reported as an empty list.
pub struct AdapterCatalog<'a, E: DeviceEnumerator + ?Sized> {
    enumerator: &'a E,
}

impl<'a, E: DeviceEnumerator + ?Sized> AdapterCatalog<'a, E> {
    pub fn new(enumerator: &'a E) -> Self {
        Self { enumerator }
    }

    pub fn list_adapters(&self) -> Vec<AdapterInfo> {
        self.enumerator.enumerate_adapters().unwrap_or_else(|e| {
            log::warn!("Adapter enumeration failed: {e}");
            Vec::new()
        })
    }

    pub fn list_outputs(&self, adapter: usize) -> Vec<OutputInfo> {
        self.enumerator.enumerate_outputs(adapter).unwrap_or_else(|e| {
            log::warn!("Output enumeration for adapter {adapter} failed: {e}");
            Vec::new()
        })
    }
}

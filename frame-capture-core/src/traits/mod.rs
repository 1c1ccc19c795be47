pub mod desktop_bounds;
pub mod duplication_backend;
pub mod frame_listener;

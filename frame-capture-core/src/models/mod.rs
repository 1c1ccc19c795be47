pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod state;
pub mod status;

pub(crate) mod acquirer;
pub mod adapter_catalog;
pub mod capture_session;
pub(crate) mod command;
pub mod controller;
pub(crate) mod shared;

pub mod backlog;
pub mod config;
pub mod error;
pub mod export;
pub mod geocode;
pub mod io;
pub mod notify;
pub mod paths;
pub mod pipeline;
pub mod retry;
pub mod store;
pub mod types;
pub mod workflow;

pub use error::{OcmapError, Result};

//! `map-driver` is a native Rust client for the W3C WebDriver protocol.
//!
//! Drives a headless Chrome through a `chromedriver` subprocess so the
//! layer-update workflow can run without a Python or Node.js runtime.
//!
//! # Architecture
//!
//! ```text
//! ChromeDriver      ← spawns `chromedriver --port=N`, polls /status
//!     │
//!     ▼ SessionFactory::open
//! WebDriverSession  ← one Chrome session, JSON commands over HTTP
//!     │
//!     ▼
//! dyn Browser       ← object-safe trait the workflow engine talks to;
//!                     tests substitute a scripted double
//! ```

pub mod error;
pub mod session;
pub mod types;

pub(crate) mod process;
pub(crate) mod wire;

pub use error::DriverError;
pub use session::{
    Browser, ChromeDriver, LazyChromeDriver, SessionFactory, WebDriverSession, POLL_INTERVAL,
};
pub use types::{ChromeOptions, ElementId, Locator};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, DriverError>;

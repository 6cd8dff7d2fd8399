use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error talking to the driver: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed driver response for {command}: {detail}")]
    Malformed { command: String, detail: String },

    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("no alert is open")]
    NoSuchAlert,

    #[error("an alert is blocking the page: {0}")]
    UnexpectedAlert(String),

    #[error("timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: String, waited_ms: u128 },

    #[error("webdriver error '{code}': {message}")]
    Protocol { code: String, message: String },

    #[error("driver process error: {0}")]
    Process(String),
}

impl DriverError {
    /// `true` for failures caused by the page not being in the expected shape
    /// yet: element missing, alert absent or in the way, wait expired.
    pub fn is_ui_timing(&self) -> bool {
        matches!(
            self,
            DriverError::NoSuchElement(_)
                | DriverError::NoSuchAlert
                | DriverError::UnexpectedAlert(_)
                | DriverError::Timeout { .. }
        )
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcmapError {
    #[error("not initialized: run 'ocmap init'")]
    NotInitialized,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("credential env var '{0}' is not set")]
    MissingCredential(String),

    #[error("unknown operating unit: {0}")]
    UnknownUnit(String),

    #[error("report artifact missing for {oc}: {path}")]
    ArtifactMissing { oc: String, path: String },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("priority list has no rows for {0}")]
    NoPriorityData(String),

    #[error("notifier error: {0}")]
    Notify(String),

    #[error(transparent)]
    Driver(#[from] map_driver::DriverError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OcmapError>;

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;

/// Account used to sign in to the map product.
#[derive(Clone)]
pub struct Credential {
    pub identity: String,
    pub secret: String,
}

impl Credential {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Everything one operating unit's layer replacement needs.
#[derive(Debug, Clone)]
pub struct LayerUpdateJob {
    pub oc_id: String,
    pub login_url: String,
    pub credential: Credential,
    pub artifact_path: PathBuf,
    pub layer_name: String,
}

impl LayerUpdateJob {
    /// `today` is the run date; the layer is named for the day after.
    pub fn new(
        oc_id: impl Into<String>,
        login_url: impl Into<String>,
        credential: Credential,
        artifact_path: impl Into<PathBuf>,
        today: NaiveDate,
    ) -> Self {
        let oc_id = oc_id.into();
        let layer_name = layer_name(&oc_id, today);
        Self {
            oc_id,
            login_url: login_url.into(),
            credential,
            artifact_path: artifact_path.into(),
            layer_name,
        }
    }
}

/// `{oc}_{YYYYMMDD}_All`, dated the day after `today` to match the report
/// the artifact was exported for.
pub fn layer_name(oc: &str, today: NaiveDate) -> String {
    let tomorrow = today.succ_opt().unwrap_or(today);
    format!("{oc}_{}_All", tomorrow.format("%Y%m%d"))
}

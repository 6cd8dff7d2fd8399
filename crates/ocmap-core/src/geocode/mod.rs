//! Two-tier address → coordinate resolution.
//!
//! The postal-zone lookup is tried first. When it finds nothing, returns a
//! blank half, or fails outright, the place-search page is consulted after a
//! randomized pause. Transient failures against either provider are retried
//! per [`GeocodeConfig::retry`].

pub mod html;
pub mod place_search;
pub mod zipcode;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{DelayRange, GeocodeConfig};
use crate::error::Result;
use crate::retry::{RetryBudget, RetryPolicy, Sleeper};
use crate::types::{Coordinate, GeocodeOutcome};

pub use place_search::PlaceSearchProvider;
pub use zipcode::ZipcodeProvider;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

// ---------------------------------------------------------------------------
// Sanitization
// ---------------------------------------------------------------------------

const STRIPPED: [char; 8] = ['[', ']', '#', '@', '［', '］', '＃', '＠'];

/// Remove bracket, hash and at-sign characters (ASCII and full-width).
pub fn sanitize(raw: &str) -> String {
    raw.chars().filter(|c| !STRIPPED.contains(c)).collect()
}

// ---------------------------------------------------------------------------
// GeocodeProvider
// ---------------------------------------------------------------------------

#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the provider answered without a usable coordinate;
    /// `Err` for network failures and malformed forms.
    async fn lookup(&self, address: &str) -> Result<Option<Coordinate>>;
}

// ---------------------------------------------------------------------------
// GeocodeResolver
// ---------------------------------------------------------------------------

pub struct GeocodeResolver {
    primary: Box<dyn GeocodeProvider>,
    secondary: Box<dyn GeocodeProvider>,
    retry: RetryPolicy,
    budget: RetryBudget,
    secondary_delay: DelayRange,
}

impl GeocodeResolver {
    pub fn new(
        primary: Box<dyn GeocodeProvider>,
        secondary: Box<dyn GeocodeProvider>,
        retry: RetryPolicy,
        budget: RetryBudget,
        secondary_delay: DelayRange,
    ) -> Self {
        Self {
            primary,
            secondary,
            retry,
            budget,
            secondary_delay,
        }
    }

    /// Build both HTTP providers from config, sharing one client.
    pub fn from_config(cfg: &GeocodeConfig, sleeper: Arc<dyn Sleeper>) -> Result<Self> {
        cfg.secondary_delay.check()?;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self::new(
            Box::new(ZipcodeProvider::new(http.clone(), &cfg.primary_url)),
            Box::new(PlaceSearchProvider::new(http, &cfg.secondary_url)),
            RetryPolicy::new(sleeper),
            cfg.retry,
            cfg.secondary_delay,
        ))
    }

    /// Resolve one address. Never caches; every call hits the providers.
    pub async fn resolve(&self, raw: &str) -> GeocodeOutcome {
        let address = sanitize(raw);

        let primary = self.query(self.primary.as_ref(), &address, false).await;
        if primary.complete_coordinate().is_some() {
            return primary;
        }
        tracing::debug!(address = %address, outcome = %primary, "primary lookup missed, falling back");

        let secondary = self.query(self.secondary.as_ref(), &address, true).await;
        tracing::debug!(address = %address, outcome = %secondary, "secondary lookup finished");
        secondary
    }

    async fn query(
        &self,
        provider: &dyn GeocodeProvider,
        address: &str,
        throttled: bool,
    ) -> GeocodeOutcome {
        if throttled {
            if let Err(e) = self.secondary_delay.check() {
                return GeocodeOutcome::provider_error(format!("{}: {}", provider.name(), e));
            }
        }
        let result = self
            .retry
            .execute(&self.budget, || async move {
                if throttled {
                    self.retry.sleeper().sleep(self.secondary_delay.sample()?).await;
                }
                provider.lookup(address).await
            })
            .await;

        match result {
            Ok(Some(c)) if c.is_complete() => GeocodeOutcome::Resolved(c),
            Ok(_) => GeocodeOutcome::NotFound,
            Err(e) => {
                tracing::warn!(provider = provider.name(), address = %address, error = %e, "provider failed");
                GeocodeOutcome::provider_error(format!("{}: {}", provider.name(), e))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

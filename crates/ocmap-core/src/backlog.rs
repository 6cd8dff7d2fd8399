use serde::Serialize;

use crate::error::Result;
use crate::geocode::GeocodeResolver;
use crate::store::RecordStore;
use crate::types::GeocodeOutcome;

/// Tally of one backlog drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BacklogReport {
    /// Outstanding count taken at the start of the drain.
    pub outstanding: usize,
    pub resolved: usize,
    /// Marked empty after both providers came up short.
    pub unresolved: usize,
    /// Provider errors among `unresolved`.
    pub provider_errors: usize,
}

impl BacklogReport {
    pub fn processed(&self) -> usize {
        self.resolved + self.unresolved
    }
}

/// Drains the outstanding-address backlog one record at a time.
pub struct BacklogProcessor<'a> {
    store: &'a dyn RecordStore,
    resolver: &'a GeocodeResolver,
}

impl<'a> BacklogProcessor<'a> {
    pub fn new(store: &'a dyn RecordStore, resolver: &'a GeocodeResolver) -> Self {
        Self { store, resolver }
    }

    /// Count the backlog, then re-query the first outstanding record for each
    /// slot. Every processed record leaves the backlog: resolved ones land in
    /// the target set, the rest are marked empty.
    pub async fn process_backlog(&self) -> Result<BacklogReport> {
        let outstanding = self.store.count_outstanding()?;
        let mut report = BacklogReport {
            outstanding,
            ..BacklogReport::default()
        };
        tracing::info!(outstanding, "draining address backlog");

        for _ in 0..outstanding {
            let Some(record) = self.store.first_outstanding()? else {
                break;
            };
            let outcome = self.resolver.resolve(&record.address).await;
            match outcome.complete_coordinate() {
                Some(coordinate) => {
                    self.store.insert_resolved(&record, coordinate)?;
                    report.resolved += 1;
                    tracing::info!(address = %record.address, coordinate = %coordinate, "address resolved");
                }
                None => {
                    self.store.mark_empty(&record.address)?;
                    report.unresolved += 1;
                    if matches!(outcome, GeocodeOutcome::ProviderError { .. }) {
                        report.provider_errors += 1;
                    }
                    tracing::info!(address = %record.address, outcome = %outcome, "address marked empty");
                }
            }
        }

        tracing::info!(
            resolved = report.resolved,
            unresolved = report.unresolved,
            "backlog drained"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayRange;
    use crate::geocode::testing::ScriptedProvider;
    use crate::retry::{RecordingSleeper, RetryBudget, RetryPolicy};
    use crate::store::SqliteStore;
    use crate::types::Coordinate;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn resolver(primary: ScriptedProvider, secondary: ScriptedProvider) -> GeocodeResolver {
        GeocodeResolver::new(
            Box::new(primary),
            Box::new(secondary),
            RetryPolicy::new(Arc::new(RecordingSleeper::default())),
            RetryBudget::once(),
            DelayRange::default(),
        )
    }

    #[tokio::test]
    async fn resolved_and_unresolved_both_leave_the_backlog() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_priority_row(day(), "台北市中正區1號", Some("A1")).unwrap();
        store.insert_priority_row(day(), "無此地址", Some("A2")).unwrap();

        let primary = ScriptedProvider::new("primary")
            .found("25.04", "121.52")
            .missing();
        let secondary = ScriptedProvider::new("secondary").missing();
        let r = resolver(primary, secondary);

        let report = BacklogProcessor::new(&store, &r).process_backlog().await.unwrap();
        assert_eq!(
            report,
            BacklogReport {
                outstanding: 2,
                resolved: 1,
                unresolved: 1,
                provider_errors: 0,
            }
        );
        assert_eq!(
            store.resolved("台北市中正區1號").unwrap(),
            Some(Coordinate::new("25.04", "121.52"))
        );
        assert_eq!(
            store.source_coordinate("無此地址").unwrap(),
            Some(Coordinate::new("", ""))
        );
    }

    #[tokio::test]
    async fn failed_record_is_not_reprocessed() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_priority_row(day(), "無此地址", Some("B1")).unwrap();

        let primary = ScriptedProvider::new("primary").failing();
        let secondary = ScriptedProvider::new("secondary").failing();
        let p_seen = primary.queried.clone();
        let r = resolver(primary, secondary);
        let processor = BacklogProcessor::new(&store, &r);

        let first = processor.process_backlog().await.unwrap();
        assert_eq!(first.unresolved, 1);
        assert_eq!(first.provider_errors, 1);

        let second = processor.process_backlog().await.unwrap();
        assert_eq!(second, BacklogReport::default());
        assert_eq!(p_seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_addresses_resolve_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_priority_row(day(), "台北市中正區1號", Some("A1")).unwrap();
        store.insert_priority_row(day(), "台北市中正區1號", Some("A1")).unwrap();

        let primary = ScriptedProvider::new("primary").found("25.04", "121.52");
        let p_seen = primary.queried.clone();
        let r = resolver(primary, ScriptedProvider::new("secondary"));

        let report = BacklogProcessor::new(&store, &r).process_backlog().await.unwrap();
        assert_eq!(report.outstanding, 2);
        assert_eq!(report.processed(), 1);
        assert_eq!(p_seen.lock().unwrap().len(), 1);
    }
}

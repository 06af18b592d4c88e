//! Continuous analytics table job.
//!
//! Each invocation decides between a full rebuild and a latest-data update using a
//! persisted watermark. Full rebuilds run once a day at a configured hour; in between,
//! invocations only merge rows changed since the last full rebuild.
//!
//! The caller guarantees that at most one invocation runs at a time across the whole
//! cluster. The job does not coordinate concurrent runs itself.

use crate::error::{JobError, WatermarkError};
use crate::table::{AnalyticsTableGenerator, AnalyticsTableUpdateParams, GenerationReport};
use crate::types::CancellationToken;
use chrono::{DateTime, Duration, TimeZone, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{error, info, info_span};

/// When the next full update is due, and when the last one finished.
///
/// The default value is the unset watermark: `next_full_update` at the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    pub next_full_update: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_full_update: Option<DateTime<Utc>>,
}

impl Watermark {
    pub fn unset() -> Self {
        Self::default()
    }

    pub fn is_unset(&self) -> bool {
        self.next_full_update == DateTime::<Utc>::default()
    }

    /// A full update runs when no watermark was ever set, or once it is due.
    pub fn run_full_update(&self, now: DateTime<Utc>) -> bool {
        self.is_unset() || now >= self.next_full_update
    }
}

/// Persistence of the watermark between invocations.
pub trait WatermarkStore: Send + Sync {
    fn load(&self) -> Result<Watermark, WatermarkError>;
    fn store(&self, watermark: &Watermark) -> Result<(), WatermarkError>;
}

#[derive(Debug, Default)]
pub struct InMemoryWatermarkStore {
    watermark: Mutex<Watermark>,
}

impl InMemoryWatermarkStore {
    pub fn new(watermark: Watermark) -> Self {
        Self {
            watermark: Mutex::new(watermark),
        }
    }
}

impl WatermarkStore for InMemoryWatermarkStore {
    fn load(&self) -> Result<Watermark, WatermarkError> {
        self.watermark
            .lock()
            .map(|w| *w)
            .map_err(|_| WatermarkError("watermark lock poisoned".to_string()))
    }

    fn store(&self, watermark: &Watermark) -> Result<(), WatermarkError> {
        let mut current = self
            .watermark
            .lock()
            .map_err(|_| WatermarkError("watermark lock poisoned".to_string()))?;
        *current = *watermark;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContinuousJobSettings {
    /// Hour of day (UTC, 0-23) at which full updates become due.
    pub full_update_hour_of_day: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_years: Option<u32>,
    pub parallel_jobs: usize,
    #[serde(default)]
    pub skip_table_types: Vec<String>,
}

impl Default for ContinuousJobSettings {
    fn default() -> Self {
        Self {
            full_update_hour_of_day: 0,
            last_years: None,
            parallel_jobs: 1,
            skip_table_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobRunKind {
    Full,
    Continuous,
}

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub kind: JobRunKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<GenerationReport>,
    /// Failure of a continuous run. Such failures do not affect the schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub watermark: Watermark,
}

pub struct ContinuousAnalyticsTableJob {
    generator: AnalyticsTableGenerator,
    store: Arc<dyn WatermarkStore>,
    settings: ContinuousJobSettings,
}

impl ContinuousAnalyticsTableJob {
    pub fn new(
        generator: AnalyticsTableGenerator,
        store: Arc<dyn WatermarkStore>,
        settings: ContinuousJobSettings,
    ) -> Self {
        Self {
            generator,
            store,
            settings,
        }
    }

    pub fn run_full_update(&self, now: DateTime<Utc>) -> Result<bool, JobError> {
        Ok(self.store.load()?.run_full_update(now))
    }

    /// Runs one invocation at `now`.
    ///
    /// A failed full update returns an error and leaves the watermark unchanged. A
    /// failed continuous update is logged and reported in the returned [`JobRun`].
    pub fn execute(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<JobRun, JobError> {
        let watermark = self.store.load()?;

        if watermark.run_full_update(now) {
            let _span = info_span!("full_update").entered();
            info!(next_full_update = %watermark.next_full_update, "Starting full analytics table update");

            let params = AnalyticsTableUpdateParams::new(now)
                .with_last_years(self.settings.last_years)
                .with_parallel_jobs(self.settings.parallel_jobs)
                .with_skip_table_types(self.settings.skip_table_types.clone());
            let report = self.generator.generate(&params, cancel).map_err(|err| {
                error!(error = %err, "Full analytics table update failed");
                JobError::Build(err)
            })?;

            let next = Watermark {
                next_full_update: next_full_update(now, self.settings.full_update_hour_of_day),
                last_full_update: Some(now),
            };
            self.store.store(&next)?;
            info!(next_full_update = %next.next_full_update, "Full analytics table update done");

            Ok(JobRun {
                kind: JobRunKind::Full,
                report: Some(report),
                error: None,
                watermark: next,
            })
        } else {
            let _span = info_span!("continuous_update").entered();
            let params = AnalyticsTableUpdateParams::latest(now, watermark.last_full_update)
                .with_parallel_jobs(self.settings.parallel_jobs)
                .with_skip_table_types(self.settings.skip_table_types.clone());

            match self.generator.generate(&params, cancel) {
                Ok(report) => Ok(JobRun {
                    kind: JobRunKind::Continuous,
                    report: Some(report),
                    error: None,
                    watermark,
                }),
                Err(err) => {
                    error!(error = %err, "Latest data analytics table update failed");
                    Ok(JobRun {
                        kind: JobRunKind::Continuous,
                        report: None,
                        error: Some(err.to_string()),
                        watermark,
                    })
                }
            }
        }
    }
}

/// Next occurrence of `hour_of_day`:00 UTC strictly after `now`.
pub fn next_full_update(now: DateTime<Utc>, hour_of_day: u32) -> DateTime<Utc> {
    let hour = hour_of_day.min(23);
    let today = now
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .map(|t| Utc.from_utc_datetime(&t))
        .unwrap_or(now);
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::PostgreSqlBuilder;
    use crate::table::SqlTableManager;
    use crate::test_utils::{event_table_definition, RecordingExecutor};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, hour, minute, 0).unwrap()
    }

    fn job(executor: RecordingExecutor, watermark: Watermark) -> (ContinuousAnalyticsTableJob, Arc<InMemoryWatermarkStore>) {
        let generator = AnalyticsTableGenerator::new(Arc::new(executor), Arc::new(PostgreSqlBuilder::new()))
            .with_manager(SqlTableManager::new(event_table_definition()));
        let store = Arc::new(InMemoryWatermarkStore::new(watermark));
        let settings = ContinuousJobSettings {
            full_update_hour_of_day: 2,
            ..Default::default()
        };
        (ContinuousAnalyticsTableJob::new(generator, store.clone(), settings), store)
    }

    #[test]
    fn test_unset_watermark_always_runs_full_update() {
        let watermark = Watermark::unset();
        assert!(watermark.run_full_update(DateTime::<Utc>::default()));
        assert!(watermark.run_full_update(at(0, 0)));
    }

    #[test]
    fn test_run_full_update_when_due() {
        let watermark = Watermark {
            next_full_update: at(2, 0),
            last_full_update: Some(at(2, 0) - Duration::days(1)),
        };
        assert!(!watermark.run_full_update(at(1, 59)));
        assert!(watermark.run_full_update(at(2, 0)));
        assert!(watermark.run_full_update(at(3, 0)));
    }

    #[test]
    fn test_next_full_update_is_strictly_after_now() {
        assert_eq!(next_full_update(at(1, 0), 2), at(2, 0));
        assert_eq!(next_full_update(at(2, 0), 2), at(2, 0) + Duration::days(1));
        assert_eq!(next_full_update(at(23, 30), 2), at(2, 0) + Duration::days(1));
    }

    #[test]
    fn test_successful_full_update_advances_watermark() {
        let executor = RecordingExecutor::new().with_integers("select distinct", vec![2024]);
        let (job, store) = job(executor, Watermark::unset());

        let run = job.execute(at(2, 30), &CancellationToken::new()).unwrap();
        assert_eq!(run.kind, JobRunKind::Full);
        let watermark = store.load().unwrap();
        assert_eq!(watermark.next_full_update, at(2, 0) + Duration::days(1));
        assert_eq!(watermark.last_full_update, Some(at(2, 30)));
    }

    #[test]
    fn test_failed_full_update_keeps_watermark() {
        let executor = RecordingExecutor::new()
            .with_integers("select distinct", vec![2024])
            .fail_on("insert into");
        let (job, store) = job(executor, Watermark::unset());

        let err = job.execute(at(2, 30), &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, JobError::Build(_)));
        assert!(store.load().unwrap().is_unset());
        assert!(job.run_full_update(at(2, 31)).unwrap());
    }

    #[test]
    fn test_failed_continuous_update_is_reported_not_raised() {
        let watermark = Watermark {
            next_full_update: at(2, 0) + Duration::days(1),
            last_full_update: Some(at(2, 30)),
        };
        let executor = RecordingExecutor::new()
            .with_existing_tables(["analytics_event"])
            .fail_on("insert into");
        let (job, store) = job(executor, watermark);

        let run = job.execute(at(9, 0), &CancellationToken::new()).unwrap();
        assert_eq!(run.kind, JobRunKind::Continuous);
        assert!(run.error.is_some());
        assert_eq!(store.load().unwrap(), watermark);
    }
}

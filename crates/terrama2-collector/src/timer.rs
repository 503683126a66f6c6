//! Recurring collection timers.
//!
//! A [`DataSetTimer`] turns the scheduling fields of a dataset into a
//! periodic "time to collect" event. It only reports the dataset id through
//! its callback; queueing the dataset is up to the owner of the callback.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime, Timelike};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use terrama2_core::models::{DataSet, DataSetId};

use crate::error::{CollectorError, Result};

const SECONDS_PER_DAY: u64 = 24 * 3600;
const MIN_SCHEDULE_CHECK: Duration = Duration::from_millis(10);

/// Invoked with the dataset id every time a timer fires
pub type TimerCallback = Arc<dyn Fn(DataSetId) + Send + Sync>;

/// How a timer decides when to fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Fire every period, first one period after creation
    Frequency(Duration),
    /// Fire once during the wall-clock minute `hour:minute`
    Schedule { hour: u32, minute: u32 },
}

impl TimerMode {
    /// Pick the mode from the dataset fields.
    ///
    /// A non-zero `data_frequency` wins; otherwise `schedule` must be a
    /// positive time of day.
    pub fn from_dataset(dataset: &DataSet) -> Result<Self> {
        if !dataset.data_frequency.is_zero() {
            return Ok(TimerMode::Frequency(dataset.data_frequency));
        }

        let secs = dataset.schedule.as_secs();
        if secs == 0 {
            return Err(CollectorError::InvalidCollectFrequency {
                dataset: dataset.id(),
                reason: "neither data frequency nor schedule is set".to_string(),
            });
        }
        if secs >= SECONDS_PER_DAY {
            return Err(CollectorError::InvalidCollectFrequency {
                dataset: dataset.id(),
                reason: format!("schedule of {}s is not a time of day", secs),
            });
        }

        Ok(TimerMode::Schedule {
            hour: (secs / 3600) as u32,
            minute: ((secs % 3600) / 60) as u32,
        })
    }

    /// Whether a schedule-mode timer should fire at `now`
    pub fn is_due(&self, now: NaiveTime) -> bool {
        match self {
            TimerMode::Frequency(_) => false,
            TimerMode::Schedule { hour, minute } => now.hour() == *hour && now.minute() == *minute,
        }
    }
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerMode::Frequency(period) => write!(f, "every {}s", period.as_secs_f64()),
            TimerMode::Schedule { hour, minute } => write!(f, "daily at {:02}:{:02}", hour, minute),
        }
    }
}

/// Background alarm for one dataset. Dropping it cancels the alarm.
pub struct DataSetTimer {
    dataset: DataSetId,
    mode: TimerMode,
    task: JoinHandle<()>,
}

impl DataSetTimer {
    /// Arm a timer for `dataset` on the current tokio runtime.
    ///
    /// `schedule_check` is how often schedule-mode timers look at the clock.
    pub fn new(dataset: &DataSet, schedule_check: Duration, callback: TimerCallback) -> Result<Self> {
        let id = dataset.id();
        if !id.is_valid() {
            return Err(CollectorError::InvalidDataSet {
                reason: format!("dataset '{}' has no id", dataset.name),
            });
        }
        if dataset.name.trim().is_empty() {
            return Err(CollectorError::InvalidDataSet {
                reason: format!("dataset {} has no name", id),
            });
        }

        let mode = TimerMode::from_dataset(dataset)?;
        let handle = Handle::try_current().map_err(|e| CollectorError::RuntimeUnavailable(e.to_string()))?;

        let task = match mode {
            TimerMode::Frequency(period) => handle.spawn(run_frequency(id, period, callback)),
            TimerMode::Schedule { .. } => {
                let check = schedule_check.max(MIN_SCHEDULE_CHECK);
                handle.spawn(run_schedule(id, mode, check, callback))
            }
        };

        tracing::debug!(dataset_id = %id, mode = %mode, "Timer armed");
        Ok(Self { dataset: id, mode, task })
    }

    pub fn dataset(&self) -> DataSetId {
        self.dataset
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }
}

impl Drop for DataSetTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl fmt::Debug for DataSetTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSetTimer")
            .field("dataset", &self.dataset)
            .field("mode", &self.mode)
            .finish()
    }
}

async fn run_frequency(dataset: DataSetId, period: Duration, callback: TimerCallback) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        tracing::trace!(dataset_id = %dataset, "Timer fired");
        callback(dataset);
    }
}

async fn run_schedule(dataset: DataSetId, mode: TimerMode, check: Duration, callback: TimerCallback) {
    let mut ticker = time::interval(check);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_fired: Option<NaiveDateTime> = None;
    loop {
        ticker.tick().await;
        let now = Local::now().naive_local();
        if !mode.is_due(now.time()) {
            continue;
        }

        // one event per matching minute, however often the clock is checked
        let minute = now.with_second(0).and_then(|t| t.with_nanosecond(0));
        if minute.is_some() && minute == last_fired {
            continue;
        }
        last_fired = minute;

        tracing::trace!(dataset_id = %dataset, "Scheduled timer fired");
        callback(dataset);
    }
}

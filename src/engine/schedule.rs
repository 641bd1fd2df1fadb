use crate::{engine::refresh::RefreshEngine, store::DirectoryStore};

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Local, NaiveTime, TimeDelta, TimeZone};
use tracing::info;

/// Fires one refresh per day at a fixed local wall clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
}

impl DailySchedule {
    pub fn new(at: NaiveTime) -> Self {
        Self { at }
    }

    #[inline]
    pub fn at(&self) -> NaiveTime {
        self.at
    }

    /// First instant strictly after `now` whose wall clock time is `at`. Times skipped by a
    /// forward offset change resolve to the next hour that exists.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let mut naive = now.date_naive().and_time(self.at);
        if naive <= now.naive_local() {
            naive += TimeDelta::days(1);
        }

        loop {
            if let Some(next) = tz.from_local_datetime(&naive).earliest() {
                if next > *now {
                    return next;
                }
            }
            naive += TimeDelta::hours(1);
        }
    }

    pub fn until_next(&self) -> Duration {
        let now = Local::now();
        (self.next_after(&now) - now).to_std().unwrap_or_default()
    }

    /// Triggers a refresh on `engine` every day, forever
    pub async fn run<S: DirectoryStore>(self, engine: Arc<RefreshEngine<S>>) {
        let mut next = self.next_after(&Local::now());

        loop {
            info!("Next refresh scheduled for {}", next.format("%Y-%m-%d %H:%M"));

            let wait = (next - Local::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            engine.trigger_refresh();
            next = self.next_after(&next.max(Local::now()));
        }
    }
}

use super::CycleReport;
use crate::{
    LOG_ONLY,
    engine::{
        masterlist::{self, Masterlist},
        query::{QueryClient, QueryErr},
    },
    models::records::{RawEntry, ServerRecord},
    utils::display::DisplayServerCount,
};

use std::{collections::HashSet, fmt::Display, sync::Arc};

use reqwest::Client;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{error, info, trace};

/// Downloads every source concurrently and returns the lists in configured order. Sources
/// that fail are logged and counted, `None` is returned only when no source could be read.
pub(super) async fn fetch_sources(
    urls: &[String],
    client: &Client,
    report: &mut CycleReport,
) -> Option<Vec<Masterlist>> {
    let mut tasks = JoinSet::new();
    for (i, url) in urls.iter().enumerate() {
        let client = client.clone();
        let url = url.clone();
        tasks.spawn(async move { (i, masterlist::fetch(&client, &url).await) });
    }

    let mut slots = std::iter::repeat_with(|| None)
        .take(urls.len())
        .collect::<Vec<Option<Masterlist>>>();

    while let Some(task_res) = tasks.join_next().await {
        match task_res {
            Ok((i, Ok(list))) => {
                report.sources_ok += 1;
                slots[i] = Some(list);
            }
            Ok((_, Err(err))) => {
                report.sources_failed += 1;
                error!("{err}");
            }
            Err(err) => {
                report.sources_failed += 1;
                error!(name: LOG_ONLY, "{err:?}");
            }
        }
    }

    (report.sources_ok > 0).then(|| slots.into_iter().flatten().collect())
}

/// Union of all lists, keeping the first occurrence of every `(address, port)`
pub(super) fn dedup_entries(lists: Vec<Masterlist>, report: &mut CycleReport) -> Vec<RawEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for mut list in lists {
        let before = entries.len();
        for entry in list.by_ref() {
            report.entries += 1;
            if seen.insert(entry.clone()) {
                entries.push(entry);
            } else {
                report.duplicates += 1;
            }
        }
        report.malformed_lines += list.malformed();
        trace!(
            "{} new from {}",
            DisplayServerCount(entries.len() - before),
            list.url()
        );
    }

    entries
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnresponsiveCounter {
    pub timed_out: usize,
    pub malformed: usize,
    pub unreachable: usize,
}

impl UnresponsiveCounter {
    #[inline]
    pub fn total(&self) -> usize {
        self.timed_out + self.malformed + self.unreachable
    }

    fn add(&mut self, err: &QueryErr) {
        match err {
            QueryErr::Timeout(_) => self.timed_out += 1,
            QueryErr::Malformed(_) => self.malformed += 1,
            QueryErr::Io(_) => self.unreachable += 1,
        }
    }
}

impl Display for UnresponsiveCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} did not respond ({} timed out, {} malformed, {} unreachable)",
            DisplayServerCount(self.total()),
            self.timed_out,
            self.malformed,
            self.unreachable
        )
    }
}

/// Queries every entry with at most `max_concurrent` exchanges in flight. Records come back
/// in the order of `entries`, hosts that failed any phase are left out.
pub(super) async fn query_all(
    entries: Vec<RawEntry>,
    query: QueryClient,
    max_concurrent: usize,
    report: &mut CycleReport,
) -> Vec<ServerRecord> {
    let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = JoinSet::new();

    for (i, entry) in entries.into_iter().enumerate() {
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let server = entry.to_string();
            (i, server, query.query_record(entry).await)
        });
    }

    let mut responses = Vec::with_capacity(tasks.len());

    while let Some(task_res) = tasks.join_next().await {
        match task_res {
            Ok((i, _, Ok(record))) => responses.push((i, record)),
            Ok((_, server, Err(err))) => {
                report.unresponsive.add(&err);
                error!(name: LOG_ONLY, "Failed to query server: {server}, {err}");
            }
            Err(err) => {
                report.unresponsive.unreachable += 1;
                error!(name: LOG_ONLY, "{err:?}");
            }
        }
    }

    responses.sort_unstable_by_key(|&(i, _)| i);
    report.responded = responses.len();

    if report.unresponsive.total() > 0 {
        info!("{}", report.unresponsive);
    }

    responses.into_iter().map(|(_, record)| record).collect()
}

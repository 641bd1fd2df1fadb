mod ops;

pub use ops::UnresponsiveCounter;

use crate::{
    LOG_ONLY,
    engine::{
        masterlist::DEFAULT_MASTERLISTS,
        publisher::Publisher,
        query::{DEFAULT_QUERY_TIMEOUT, QueryClient},
    },
    models::records::DirectorySnapshot,
    store::{DirectoryStore, StoreErr},
    utils::{
        display::DisplayServerCount,
        request::{ResponseErr, client_with_timeout},
    },
};

use std::{
    fmt::Display,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::{Duration, Instant},
};

use reqwest::Client;
use tracing::{error, info, trace};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 256;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Fetching,
    Querying,
    Persisting,
    Reloading,
    Publishing,
    Failed,
}

impl RefreshState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Fetching,
            2 => Self::Querying,
            3 => Self::Persisting,
            4 => Self::Reloading,
            5 => Self::Publishing,
            6 => Self::Failed,
            _ => Self::Idle,
        }
    }
}

impl Display for RefreshState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Idle => "idle",
                Self::Fetching => "fetching",
                Self::Querying => "querying",
                Self::Persisting => "persisting",
                Self::Reloading => "reloading",
                Self::Publishing => "publishing",
                Self::Failed => "failed",
            }
        )
    }
}

/// Proof that the holder moved the engine out of `Idle`. The state is put back to `Idle`
/// when the guard drops, on every exit path of a cycle.
struct CycleGuard(Arc<AtomicU8>);

impl CycleGuard {
    fn acquire(state: &Arc<AtomicU8>) -> Option<Self> {
        state
            .compare_exchange(
                RefreshState::Idle as u8,
                RefreshState::Fetching as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| Self(Arc::clone(state)))
    }

    #[inline]
    fn advance(&self, to: RefreshState) {
        self.0.store(to as u8, Ordering::Release);
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.store(RefreshState::Idle as u8, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub masterlists: Vec<String>,
    pub query_timeout: Duration,
    pub fetch_timeout: Duration,
    pub max_concurrent_queries: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            masterlists: DEFAULT_MASTERLISTS.iter().map(|url| url.to_string()).collect(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
        }
    }
}

/// Reasons a cycle ended without publishing
#[derive(Debug)]
pub enum RefreshErr {
    AllSourcesUnavailable,
    Store(StoreErr),
}

impl From<StoreErr> for RefreshErr {
    fn from(err: StoreErr) -> Self {
        Self::Store(err)
    }
}

impl Display for RefreshErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshErr::AllSourcesUnavailable => write!(f, "No masterlist could be retrieved"),
            RefreshErr::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RefreshErr {}

#[derive(Default, Debug, Clone)]
pub struct CycleReport {
    pub sources_ok: usize,
    pub sources_failed: usize,
    /// Every well formed line read across all sources
    pub entries: usize,
    pub duplicates: usize,
    pub malformed_lines: usize,
    pub responded: usize,
    pub unresponsive: UnresponsiveCounter,
    pub published: usize,
    pub elapsed: Duration,
}

impl CycleReport {
    /// Unique entries that were sent a query
    #[inline]
    pub fn queried(&self) -> usize {
        self.entries - self.duplicates
    }
}

impl Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Published {}, {} of {} responded ({} duplicate, {} malformed lines), {}/{} masterlists read in {:.2}s",
            DisplayServerCount(self.published),
            self.responded,
            self.queried(),
            self.duplicates,
            self.malformed_lines,
            self.sources_ok,
            self.sources_ok + self.sources_failed,
            self.elapsed.as_secs_f32()
        )
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// Another cycle was already in progress
    Skipped,
    Published(CycleReport),
    Failed(RefreshErr),
}

impl CycleOutcome {
    #[inline]
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Published(report) => Some(report),
            CycleOutcome::Skipped | CycleOutcome::Failed(_) => None,
        }
    }

    #[inline]
    pub fn is_published(&self) -> bool {
        matches!(self, CycleOutcome::Published(_))
    }
}

/// Owns the refresh cycle. Readers only ever call [`RefreshEngine::current`], all writes to
/// the store come from the one cycle allowed to run at a time.
pub struct RefreshEngine<S> {
    store: S,
    publisher: Publisher,
    client: Client,
    query: QueryClient,
    masterlists: Vec<String>,
    max_concurrent_queries: usize,
    state: Arc<AtomicU8>,
}

impl<S: DirectoryStore> RefreshEngine<S> {
    pub fn new(store: S, config: RefreshConfig) -> Result<Self, ResponseErr> {
        Ok(Self {
            store,
            publisher: Publisher::new(),
            client: client_with_timeout(config.fetch_timeout)?,
            query: QueryClient::new(config.query_timeout),
            masterlists: config.masterlists,
            max_concurrent_queries: config.max_concurrent_queries.max(1),
            state: Arc::new(AtomicU8::new(RefreshState::Idle as u8)),
        })
    }

    /// The latest complete snapshot, empty until the first publish
    #[inline]
    pub fn current(&self) -> Arc<DirectorySnapshot> {
        self.publisher.current()
    }

    #[inline]
    pub fn state(&self) -> RefreshState {
        RefreshState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn masterlists(&self) -> &[String] {
        &self.masterlists
    }

    /// Publishes whatever the store already holds. Returns `None` without touching the store
    /// if a cycle is in progress.
    pub async fn restore(&self) -> Result<Option<usize>, StoreErr> {
        let Some(guard) = CycleGuard::acquire(&self.state) else {
            trace!("Refresh in progress, skipping restore");
            return Ok(None);
        };

        guard.advance(RefreshState::Reloading);
        let records = self.store.load_all().await?;

        guard.advance(RefreshState::Publishing);
        let snapshot = DirectorySnapshot::new(records);
        let count = snapshot.len();
        self.publisher.publish(snapshot);

        info!("Restored {} from store", DisplayServerCount(count));
        Ok(Some(count))
    }

    /// Starts a cycle in the background and returns immediately. Returns `false` if a cycle
    /// was already in progress. Must be called from within a tokio runtime.
    pub fn trigger_refresh(self: &Arc<Self>) -> bool {
        let Some(guard) = CycleGuard::acquire(&self.state) else {
            info!("Refresh already in progress");
            return false;
        };

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run_with(guard).await;
        });
        true
    }

    /// Runs one cycle to completion on the current task
    pub async fn run_cycle(&self) -> CycleOutcome {
        match CycleGuard::acquire(&self.state) {
            Some(guard) => self.run_with(guard).await,
            None => {
                info!("Refresh already in progress");
                CycleOutcome::Skipped
            }
        }
    }

    async fn run_with(&self, guard: CycleGuard) -> CycleOutcome {
        let start = Instant::now();
        let mut report = CycleReport::default();

        info!("Refreshing server directory");

        match self.cycle(&guard, &mut report).await {
            Ok(()) => {
                report.elapsed = start.elapsed();
                info!("{report}");
                CycleOutcome::Published(report)
            }
            Err(err) => {
                guard.advance(RefreshState::Failed);
                error!("Refresh failed, keeping previous directory: {err}");
                CycleOutcome::Failed(err)
            }
        }
    }

    async fn cycle(&self, guard: &CycleGuard, report: &mut CycleReport) -> Result<(), RefreshErr> {
        let lists = ops::fetch_sources(&self.masterlists, &self.client, report)
            .await
            .ok_or(RefreshErr::AllSourcesUnavailable)?;
        let entries = ops::dedup_entries(lists, report);

        guard.advance(RefreshState::Querying);
        info!("Querying {}", DisplayServerCount(entries.len()));
        let records =
            ops::query_all(entries, self.query, self.max_concurrent_queries, report).await;

        guard.advance(RefreshState::Persisting);
        self.store.clear_all().await?;
        for record in records {
            trace!(name: LOG_ONLY, "Added server: {}:{}", record.address, record.port);
            self.store.upsert_record(record).await?;
        }

        guard.advance(RefreshState::Reloading);
        let records = self.store.load_all().await?;

        guard.advance(RefreshState::Publishing);
        let snapshot = DirectorySnapshot::new(records);
        report.published = snapshot.len();
        self.publisher.publish(snapshot);

        Ok(())
    }
}

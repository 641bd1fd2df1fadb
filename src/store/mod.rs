pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::models::records::ServerRecord;

use std::{borrow::Cow, fmt::Display, future::Future, io};

/// Durable home of every [`ServerRecord`] written by the last refresh. The refresh engine
/// is the only writer, readers may access the backing storage at any time.
pub trait DirectoryStore: Send + Sync + 'static {
    /// Inserts `record`, replacing any record with the same `(address, port)`
    fn upsert_record(
        &self,
        record: ServerRecord,
    ) -> impl Future<Output = Result<(), StoreErr>> + Send;

    fn clear_all(&self) -> impl Future<Output = Result<(), StoreErr>> + Send;

    /// Every stored record in insertion order
    fn load_all(&self) -> impl Future<Output = Result<Vec<ServerRecord>, StoreErr>> + Send;
}

#[derive(Debug)]
pub enum StoreErr {
    Io(io::Error),
    Serialize(serde_json::Error),
    Unavailable(Cow<'static, str>),
}

impl StoreErr {
    crate::from_static_cow_fn!(Unavailable, unavailable);
}

impl From<io::Error> for StoreErr {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for StoreErr {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err)
    }
}

impl Display for StoreErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Store unavailable: ")?;
        match self {
            StoreErr::Io(err) => write!(f, "{err}"),
            StoreErr::Serialize(err) => write!(f, "record formatting, {err}"),
            StoreErr::Unavailable(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for StoreErr {}

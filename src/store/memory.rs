use super::{DirectoryStore, StoreErr};
use crate::models::records::ServerRecord;

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

#[derive(Default)]
struct Records {
    servers: Vec<ServerRecord>,
    index: HashMap<(String, u16), usize>,
}

/// Keeps records for the lifetime of the process
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Records>, StoreErr> {
        self.records
            .lock()
            .map_err(|_| StoreErr::unavailable("memory store lock poisoned"))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|records| records.servers.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DirectoryStore for MemoryStore {
    async fn upsert_record(&self, record: ServerRecord) -> Result<(), StoreErr> {
        let mut records = self.lock()?;
        let key = (record.address.clone(), record.port);

        if let Some(&i) = records.index.get(&key) {
            records.servers[i] = record;
        } else {
            let i = records.servers.len();
            records.servers.push(record);
            records.index.insert(key, i);
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StoreErr> {
        *self.lock()? = Records::default();
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ServerRecord>, StoreErr> {
        Ok(self.lock()?.servers.clone())
    }
}

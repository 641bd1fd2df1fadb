use super::{DirectoryStore, StoreErr};
use crate::{LOG_ONLY, models::records::ServerRecord};

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use tracing::{error, trace};

/// One JSON encoded [`ServerRecord`] per line. Upserts append; on load the last line written
/// for an `(address, port)` wins while keeping the position that server was first written at.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreErr> {
        self.write_lock
            .lock()
            .map_err(|_| StoreErr::unavailable("file store lock poisoned"))
    }
}

impl DirectoryStore for JsonFileStore {
    async fn upsert_record(&self, record: ServerRecord) -> Result<(), StoreErr> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let _guard = self.lock()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StoreErr> {
        let _guard = self.lock()?;
        File::create(&self.path)?;
        trace!("Cleared store: {}", self.path.display());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ServerRecord>, StoreErr> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut servers = Vec::<ServerRecord>::new();
        let mut index = HashMap::new();

        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record = match serde_json::from_str::<ServerRecord>(&line) {
                Ok(record) => record,
                Err(err) => {
                    error!(name: LOG_ONLY, "{err}, skipping line {} of: {}", i + 1, self.path.display());
                    continue;
                }
            };

            match index.get(&(record.address.clone(), record.port)) {
                Some(&pos) => servers[pos] = record,
                None => {
                    index.insert((record.address.clone(), record.port), servers.len());
                    servers.push(record);
                }
            }
        }

        Ok(servers)
    }
}

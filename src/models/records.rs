use std::{collections::HashSet, fmt::Display, time::SystemTime};

use serde::{Deserialize, Serialize};

/// One `address:port` pair read from a masterlist
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawEntry {
    pub address: String,
    pub port: u16,
}

impl RawEntry {
    pub fn new<T: Into<String>>(address: T, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl Display for RawEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Everything known about a server that answered both query phases during the last refresh.
/// `(address, port)` is the identity of a record, all other fields are passed through as the
/// server reported them.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerRecord {
    pub address: String,
    pub port: u16,
    pub hostname: String,
    pub passworded: bool,
    pub players: u16,
    pub max_players: u16,
    pub mode: String,
    pub language: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub lagcomp: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub map: Option<String>,
    #[serde(default)]
    pub worldtime: Option<String>,
    #[serde(default)]
    pub weather: i32,
}

impl ServerRecord {
    #[inline]
    pub fn key(&self) -> (&str, u16) {
        (&self.address, self.port)
    }
}

/// Immutable view of every server published by one refresh cycle
#[derive(Serialize, Debug, Clone)]
pub struct DirectorySnapshot {
    created: SystemTime,
    servers: Vec<ServerRecord>,
}

impl Default for DirectorySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl DirectorySnapshot {
    pub fn empty() -> Self {
        Self {
            created: SystemTime::now(),
            servers: Vec::new(),
        }
    }

    /// Keeps the first record seen for every `(address, port)`, preserving input order
    pub fn new(records: Vec<ServerRecord>) -> Self {
        let mut seen = HashSet::with_capacity(records.len());
        let servers = records
            .into_iter()
            .filter(|record| seen.insert((record.address.clone(), record.port)))
            .collect();

        Self {
            created: SystemTime::now(),
            servers,
        }
    }

    #[inline]
    pub fn created(&self) -> SystemTime {
        self.created
    }

    #[inline]
    pub fn servers(&self) -> &[ServerRecord] {
        &self.servers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn find(&self, address: &str, port: u16) -> Option<&ServerRecord> {
        self.servers
            .iter()
            .find(|record| record.key() == (address, port))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ServerRecord> {
        self.servers.iter()
    }
}

impl<'a> IntoIterator for &'a DirectorySnapshot {
    type Item = &'a ServerRecord;
    type IntoIter = std::slice::Iter<'a, ServerRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.servers.iter()
    }
}

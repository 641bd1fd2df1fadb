use crate::{
    LOG_ONLY,
    models::records::RawEntry,
    utils::request::{ResponseErr, STATUS_OK},
};

use std::fmt::Display;

use reqwest::{Client, header::USER_AGENT};
use tracing::{instrument, trace, warn};

/// Some masterlist hosts refuse requests that do not look like they came from a browser
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:25.0) Gecko/20100101 Firefox/25.0";

pub const DEFAULT_MASTERLISTS: [&str; 2] = [
    "http://monitor.sacnr.com/list/masterlist.txt",
    "http://monitor.sacnr.com/list/hostedlist.txt",
];

/// The masterlist at `url` could not be downloaded
#[derive(Debug)]
pub struct SourceUnavailable {
    pub url: String,
    pub err: ResponseErr,
}

impl Display for SourceUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Masterlist {} unavailable: {}", self.url, self.err)
    }
}

impl std::error::Error for SourceUnavailable {}

#[derive(Debug, PartialEq, Eq)]
pub struct LineMalformed<'a> {
    pub line: &'a str,
    pub reason: &'static str,
}

impl Display for LineMalformed<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unexpected masterlist formatting: {}, in: {}", self.reason, self.line)
    }
}

/// Parses one trimmed, non-empty `address:port` line
pub fn parse_line(line: &str) -> Result<RawEntry, LineMalformed<'_>> {
    let malformed = |reason| LineMalformed { line, reason };

    let Some((address, port)) = line.rsplit_once(':') else {
        return Err(malformed("address was not formatted with a port"));
    };

    let address = address.trim();
    if address.is_empty() {
        return Err(malformed("missing address"));
    }

    let port = port
        .trim()
        .parse::<u16>()
        .map_err(|_| malformed("failed to parse port"))?;

    Ok(RawEntry::new(address, port))
}

/// Single pass over the entries of one downloaded masterlist. Lines are parsed as they are
/// requested; malformed lines are logged, counted, and skipped.
#[derive(Debug)]
pub struct Masterlist {
    url: String,
    body: String,
    pos: usize,
    malformed: usize,
}

impl Masterlist {
    pub fn from_body<T: Into<String>>(url: T, body: String) -> Self {
        Self {
            url: url.into(),
            body,
            pos: 0,
            malformed: 0,
        }
    }

    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of lines skipped so far
    #[inline]
    pub fn malformed(&self) -> usize {
        self.malformed
    }
}

impl Iterator for Masterlist {
    type Item = RawEntry;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.body.len() {
            let rest = &self.body[self.pos..];
            let (line, advance) = match rest.find('\n') {
                Some(i) => (&rest[..i], i + 1),
                None => (rest, rest.len()),
            };
            self.pos += advance;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse_line(line) {
                Ok(entry) => return Some(entry),
                Err(err) => {
                    self.malformed += 1;
                    warn!(name: LOG_ONLY, "{err}, source: {}", self.url)
                }
            }
        }
        None
    }
}

#[instrument(level = "trace", skip(client))]
pub async fn fetch(client: &Client, url: &str) -> Result<Masterlist, SourceUnavailable> {
    let unavailable = |err: ResponseErr| SourceUnavailable {
        url: url.to_string(),
        err,
    };

    trace!("retrieving masterlist");

    let response = client
        .get(url)
        .header(USER_AGENT, BROWSER_USER_AGENT)
        .send()
        .await
        .map_err(|err| unavailable(err.into()))?;

    if response.status() != STATUS_OK {
        return Err(unavailable(ResponseErr::bad_status("Masterlist", response)));
    }

    let body = response
        .text()
        .await
        .map_err(|err| unavailable(err.into()))?;

    Ok(Masterlist::from_body(url, body))
}

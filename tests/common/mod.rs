#![allow(dead_code)]

use samp_directory::{
    RefreshConfig, ServerRecord,
    engine::query::packet::{HEADER_LEN, MAX_DATAGRAM},
};

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use rand::{Rng, distr::Alphanumeric};
use tokio::{net::UdpSocket, task::JoinHandle};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const TEST_QUERY_TIMEOUT: Duration = Duration::from_millis(300);

pub fn test_config(masterlists: Vec<String>) -> RefreshConfig {
    RefreshConfig {
        masterlists,
        query_timeout: TEST_QUERY_TIMEOUT,
        fetch_timeout: Duration::from_secs(5),
        max_concurrent_queries: 8,
    }
}

pub fn info_reply(
    header: &[u8],
    passworded: bool,
    players: u16,
    max_players: u16,
    strings: [&[u8]; 3],
) -> Vec<u8> {
    let mut packet = header[..HEADER_LEN].to_vec();
    packet.push(passworded as u8);
    packet.extend_from_slice(&players.to_le_bytes());
    packet.extend_from_slice(&max_players.to_le_bytes());
    for s in strings {
        packet.extend_from_slice(&(s.len() as u32).to_le_bytes());
        packet.extend_from_slice(s);
    }
    packet
}

pub fn rules_reply(header: &[u8], rules: &[(&str, &str)]) -> Vec<u8> {
    let mut packet = header[..HEADER_LEN].to_vec();
    packet.extend_from_slice(&(rules.len() as u16).to_le_bytes());
    for (name, value) in rules {
        packet.push(name.len() as u8);
        packet.extend_from_slice(name.as_bytes());
        packet.push(value.len() as u8);
        packet.extend_from_slice(value.as_bytes());
    }
    packet
}

/// Header of a request as the query client sends it
pub fn header(octets: [u8; 4], port: u16, opcode: u8) -> Vec<u8> {
    let mut packet = b"SAMP".to_vec();
    packet.extend_from_slice(&octets);
    packet.extend_from_slice(&port.to_le_bytes());
    packet.push(opcode);
    packet
}

pub const FULL_RULES: [(&str, &str); 7] = [
    ("lagcomp", "On"),
    ("mapname", "San Andreas"),
    ("version", "0.3.7-R2"),
    ("weather", "10"),
    ("weburl", "www.sa-mp.com"),
    ("worldtime", "12:00"),
    ("unknown", "ignored"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    /// Answers both phases
    Full,
    /// Answers basic info, never answers rules
    InfoOnly,
    /// Never answers
    Silent,
    /// Answers every request with bytes that are not a reply
    Garbage,
    /// Answers both phases with a weather rule that is not a number
    BadWeather,
}

/// A game server listening on localhost
pub struct FakeServer {
    pub addr: SocketAddr,
    pub hostname: String,
    info_requests: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeServer {
    pub async fn spawn(behavior: Behavior, hostname: &str) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let info_requests = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&info_requests);
        let name = hostname.to_string();
        let task = tokio::spawn(async move {
            let mut buf = [0; MAX_DATAGRAM];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                if len < HEADER_LEN {
                    continue;
                }
                let request = &buf[..HEADER_LEN];
                let opcode = request[HEADER_LEN - 1];
                if opcode == b'i' {
                    counter.fetch_add(1, Ordering::SeqCst);
                }

                let reply = match (behavior, opcode) {
                    (Behavior::Silent, _) => None,
                    (Behavior::Garbage, _) => Some(b"garbage".to_vec()),
                    (_, b'i') => Some(info_reply(
                        request,
                        false,
                        12,
                        100,
                        [name.as_bytes(), b"Freeroam", b"English"],
                    )),
                    (Behavior::Full, b'r') => Some(rules_reply(request, &FULL_RULES)),
                    (Behavior::BadWeather, b'r') => {
                        Some(rules_reply(request, &[("weather", "sunny")]))
                    }
                    _ => None,
                };

                if let Some(reply) = reply {
                    let _ = socket.send_to(&reply, peer).await;
                }
            }
        });

        Self {
            addr,
            hostname: hostname.to_string(),
            info_requests,
            task,
        }
    }

    /// `address:port` line for a masterlist
    pub fn line(&self) -> String {
        format!("{}:{}", self.addr.ip(), self.addr.port())
    }

    pub fn info_requests(&self) -> usize {
        self.info_requests.load(Ordering::SeqCst)
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn mount_masterlist(server: &MockServer, route: &str, body: String) -> String {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
    format!("{}{route}", server.uri())
}

pub fn masterlist_body(servers: &[&FakeServer]) -> String {
    servers
        .iter()
        .map(|server| server.line())
        .collect::<Vec<_>>()
        .join("\n")
}

fn random_string(rng: &mut impl Rng, len: usize) -> String {
    rng.sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn maybe_string(rng: &mut impl Rng) -> Option<String> {
    rng.random_bool(0.5).then(|| random_string(rng, 12))
}

pub fn random_record(rng: &mut impl Rng) -> ServerRecord {
    ServerRecord {
        address: format!(
            "{}.{}.{}.{}",
            rng.random::<u8>(),
            rng.random::<u8>(),
            rng.random::<u8>(),
            rng.random::<u8>()
        ),
        port: rng.random_range(1024..=u16::MAX),
        hostname: random_string(rng, 24),
        passworded: rng.random_bool(0.2),
        players: rng.random_range(0..=500),
        max_players: rng.random_range(0..=1000),
        mode: random_string(rng, 8),
        language: random_string(rng, 8),
        version: maybe_string(rng),
        lagcomp: maybe_string(rng),
        website: maybe_string(rng),
        map: maybe_string(rng),
        worldtime: maybe_string(rng),
        weather: rng.random_range(-10..=50),
    }
}

pub fn random_records(count: usize) -> Vec<ServerRecord> {
    let mut rng = rand::rng();
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let mut record = random_record(&mut rng);
        // unique keys
        record.port = 1024 + i as u16;
        records.push(record);
    }
    records
}

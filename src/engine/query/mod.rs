pub mod packet;

use packet::{BasicInfo, MAX_DATAGRAM, Opcode, PacketErr, Rules};

use crate::models::records::{RawEntry, ServerRecord};

use std::{
    borrow::Cow,
    fmt::Display,
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use tokio::{net::UdpSocket, time::timeout};
use tracing::{instrument, trace};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub enum QueryErr {
    /// No response to the given request before the timeout elapsed
    Timeout(Opcode),
    Malformed(Cow<'static, str>),
    Io(io::Error),
}

impl QueryErr {
    crate::from_static_cow_fn!(Malformed, malformed);
}

impl From<io::Error> for QueryErr {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<PacketErr> for QueryErr {
    fn from(err: PacketErr) -> Self {
        Self::Malformed(Cow::Owned(err.to_string()))
    }
}

impl Display for QueryErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryErr::Timeout(opcode) => write!(f, "timed out waiting for {opcode} response"),
            QueryErr::Malformed(msg) => write!(f, "malformed response, {msg}"),
            QueryErr::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for QueryErr {}

/// Both phases of a completed exchange
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub info: BasicInfo,
    pub rules: Rules,
}

pub type QueryOutcome = Result<QueryResponse, QueryErr>;

impl QueryResponse {
    /// Fails if `weather` is present but not a number
    pub fn into_record(self, entry: RawEntry) -> Result<ServerRecord, QueryErr> {
        let rules = self.rules;
        let owned = |key: &str| rules.get(key).map(str::to_owned);

        let weather = match rules.get("weather") {
            Some(value) => value.trim().parse::<i32>().map_err(|_| {
                QueryErr::malformed(format!("weather rule is not numeric: {value}"))
            })?,
            None => 0,
        };

        Ok(ServerRecord {
            address: entry.address,
            port: entry.port,
            hostname: self.info.hostname,
            passworded: self.info.passworded,
            players: self.info.players,
            max_players: self.info.max_players,
            mode: self.info.mode,
            language: self.info.language,
            version: owned("version"),
            lagcomp: owned("lagcomp"),
            website: owned("weburl"),
            map: owned("mapname"),
            worldtime: owned("worldtime"),
            weather,
        })
    }
}

/// Speaks the two phase UDP query protocol with one host at a time. Every call returns a
/// value, no failure of a single host is ever raised to the caller.
#[derive(Clone, Copy, Debug)]
pub struct QueryClient {
    timeout: Duration,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_TIMEOUT)
    }
}

impl QueryClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The socket is owned by this call and closed on every return path
    #[instrument(level = "trace", skip_all, fields(server = %entry))]
    pub async fn query(&self, entry: &RawEntry) -> QueryOutcome {
        let target = self.resolve(entry).await?;

        let bind_addr = match target {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(target).await?;

        let info = packet::parse_info(&self.exchange(&socket, target, Opcode::Info).await?)?;
        trace!("basic info received");
        let rules = packet::parse_rules(&self.exchange(&socket, target, Opcode::Rules).await?)?;
        trace!("{} rules received", rules.len());

        Ok(QueryResponse { info, rules })
    }

    /// Queries `entry` and normalizes a full response into a [`ServerRecord`]
    pub async fn query_record(&self, entry: RawEntry) -> Result<ServerRecord, QueryErr> {
        self.query(&entry).await?.into_record(entry)
    }

    async fn resolve(&self, entry: &RawEntry) -> Result<SocketAddr, QueryErr> {
        if let Ok(ip) = entry.address.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, entry.port));
        }

        let lookup = timeout(
            self.timeout,
            tokio::net::lookup_host((entry.address.as_str(), entry.port)),
        )
        .await
        .map_err(|_| {
            QueryErr::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("resolving {} timed out", entry.address),
            ))
        })??;

        lookup.into_iter().next().ok_or_else(|| {
            QueryErr::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} did not resolve to any address", entry.address),
            ))
        })
    }

    async fn exchange(
        &self,
        socket: &UdpSocket,
        target: SocketAddr,
        opcode: Opcode,
    ) -> Result<Vec<u8>, QueryErr> {
        socket.send(&packet::encode_request(target, opcode)).await?;

        let mut buf = [0; MAX_DATAGRAM];
        let len = timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| QueryErr::Timeout(opcode))??;

        Ok(buf[..len].to_vec())
    }
}

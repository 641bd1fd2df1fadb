use std::{
    collections::HashMap,
    fmt::Display,
    io::Cursor,
    net::{IpAddr, SocketAddr},
};

use byteorder::{LittleEndian, ReadBytesExt};

pub const MAGIC: &[u8; 4] = b"SAMP";

/// `magic (4) | ipv4 octets (4) | port LE (2) | opcode (1)`
pub const HEADER_LEN: usize = 11;

/// Largest datagram a server is expected to answer with
pub const MAX_DATAGRAM: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Info = b'i',
    Rules = b'r',
}

impl Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Opcode::Info => "basic info",
                Opcode::Rules => "rules",
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketErr {
    Header(Opcode),
    Truncated(&'static str),
}

impl Display for PacketErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketErr::Header(opcode) => write!(f, "unexpected header on {opcode} response"),
            PacketErr::Truncated(field) => write!(f, "response ended before field: {field}"),
        }
    }
}

/// IPv6 targets are sent with zeroed octets, servers only echo them back
pub fn encode_request(target: SocketAddr, opcode: Opcode) -> [u8; HEADER_LEN] {
    let mut packet = [0; HEADER_LEN];
    packet[..4].copy_from_slice(MAGIC);
    if let IpAddr::V4(ip) = target.ip() {
        packet[4..8].copy_from_slice(&ip.octets());
    }
    packet[8..10].copy_from_slice(&target.port().to_le_bytes());
    packet[10] = opcode as u8;
    packet
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicInfo {
    pub passworded: bool,
    pub players: u16,
    pub max_players: u16,
    pub hostname: String,
    pub mode: String,
    pub language: String,
}

/// Every rule a server reported, later duplicates overwrite earlier ones
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rules(HashMap<String, String>);

impl Rules {
    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Rules {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

struct Reader<'a>(Cursor<&'a [u8]>);

impl<'a> Reader<'a> {
    fn after_header(packet: &'a [u8], opcode: Opcode) -> Result<Self, PacketErr> {
        if packet.len() < HEADER_LEN
            || &packet[..4] != MAGIC
            || packet[HEADER_LEN - 1] != opcode as u8
        {
            return Err(PacketErr::Header(opcode));
        }
        let mut cursor = Cursor::new(packet);
        cursor.set_position(HEADER_LEN as u64);
        Ok(Self(cursor))
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, PacketErr> {
        self.0.read_u8().map_err(|_| PacketErr::Truncated(field))
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, PacketErr> {
        self.0
            .read_u16::<LittleEndian>()
            .map_err(|_| PacketErr::Truncated(field))
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, PacketErr> {
        self.0
            .read_u32::<LittleEndian>()
            .map_err(|_| PacketErr::Truncated(field))
    }

    fn string(&mut self, len: usize, field: &'static str) -> Result<String, PacketErr> {
        let data: &'a [u8] = *self.0.get_ref();
        let start = self.0.position() as usize;
        let bytes = data
            .get(start..start.saturating_add(len))
            .ok_or(PacketErr::Truncated(field))?;
        self.0.set_position((start + len) as u64);
        Ok(decode_string(bytes))
    }
}

/// Servers send whatever codepage their config was written in, anything that is not valid
/// UTF-8 is read as Latin-1
fn decode_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => bytes.iter().copied().map(char::from).collect(),
    }
}

pub fn parse_info(packet: &[u8]) -> Result<BasicInfo, PacketErr> {
    let mut reader = Reader::after_header(packet, Opcode::Info)?;

    let passworded = reader.u8("password")? != 0;
    let players = reader.u16("players")?;
    let max_players = reader.u16("max players")?;

    let len = reader.u32("hostname length")? as usize;
    let hostname = reader.string(len, "hostname")?;
    let len = reader.u32("gamemode length")? as usize;
    let mode = reader.string(len, "gamemode")?;
    let len = reader.u32("language length")? as usize;
    let language = reader.string(len, "language")?;

    Ok(BasicInfo {
        passworded,
        players,
        max_players,
        hostname,
        mode,
        language,
    })
}

pub fn parse_rules(packet: &[u8]) -> Result<Rules, PacketErr> {
    let mut reader = Reader::after_header(packet, Opcode::Rules)?;

    let count = reader.u16("rule count")?;
    (0..count)
        .map(|_| {
            let len = reader.u8("rule name length")? as usize;
            let name = reader.string(len, "rule name")?;
            let len = reader.u8("rule value length")? as usize;
            let value = reader.string(len, "rule value")?;
            Ok::<_, PacketErr>((name, value))
        })
        .collect()
}

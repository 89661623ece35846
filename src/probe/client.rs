// src/probe/client.rs
use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::{self, Read};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::models::server::{Endpoint, ServerInfo};

const PACKET_PREFIX: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const INFO_REQUEST: u8 = 0x54;
const INFO_REPLY: u8 = 0x49;
const CHALLENGE_REPLY: u8 = 0x41;
const INFO_QUERY_STRING: &[u8] = b"Source Engine Query\0";
const MAX_DATAGRAM: usize = 1400;

#[derive(Debug)]
pub enum ProbeError {
    /// Host down, unreachable, refused, timed out: the server has no
    /// information to give right now. Never escalated past the prober.
    Unreachable(io::ErrorKind),
    Timeout,
    /// The server answered with bytes we cannot interpret. This is a
    /// programming or environment defect, not unavailability.
    Malformed(String),
    /// Any other transport fault. Propagates as a hard failure.
    Io(io::Error),
}

impl ProbeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout)
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(kind) => write!(f, "server unreachable: {}", kind),
            Self::Timeout => write!(f, "probe timed out"),
            Self::Malformed(msg) => write!(f, "malformed status reply: {}", msg),
            Self::Io(e) => write!(f, "probe transport fault: {}", e),
        }
    }
}

/// Sorts a transport error into the swallow-or-escalate taxonomy.
fn classify_io(e: io::Error) -> ProbeError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ProbeError::Timeout,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable
        | io::ErrorKind::NetworkDown
        | io::ErrorKind::NotFound
        | io::ErrorKind::PermissionDenied
        | io::ErrorKind::Interrupted => ProbeError::Unreachable(e.kind()),
        _ => ProbeError::Io(e),
    }
}

/// A reusable status-query client for one endpoint. Holds a connected UDP
/// socket so repeated probes of the same server skip bind/connect teardown.
pub struct ProbeClient {
    socket: UdpSocket,
    send_timeout: Duration,
    recv_timeout: Duration,
}

impl ProbeClient {
    /// Binds and connects synchronously so creation can happen under the
    /// registry's per-key entry lock.
    pub fn connect(
        endpoint: &Endpoint,
        send_timeout: Duration,
        recv_timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let std_socket = std::net::UdpSocket::bind("0.0.0.0:0").map_err(ProbeError::Io)?;
        std_socket
            .connect((endpoint.ip.as_str(), endpoint.port))
            .map_err(classify_io)?;
        std_socket.set_nonblocking(true).map_err(ProbeError::Io)?;
        let socket = UdpSocket::from_std(std_socket).map_err(ProbeError::Io)?;
        Ok(Self {
            socket,
            send_timeout,
            recv_timeout,
        })
    }

    /// One full status query: request, optional challenge round, parse.
    pub async fn query_info(&self) -> Result<ServerInfo, ProbeError> {
        let reply = self.exchange(&info_request(None)).await?;
        let reply = match parse_reply_kind(&reply)? {
            ReplyKind::Challenge(challenge) => {
                self.exchange(&info_request(Some(challenge))).await?
            }
            ReplyKind::Info => reply,
        };
        match parse_reply_kind(&reply)? {
            ReplyKind::Info => parse_info(&reply),
            ReplyKind::Challenge(_) => Err(ProbeError::Malformed(
                "server re-challenged after challenge was echoed".to_string(),
            )),
        }
    }

    async fn exchange(&self, request: &[u8]) -> Result<Vec<u8>, ProbeError> {
        match timeout(self.send_timeout, self.socket.send(request)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(classify_io(e)),
            Err(_) => return Err(ProbeError::Timeout),
        }

        let mut buffer = [0u8; MAX_DATAGRAM];
        match timeout(self.recv_timeout, self.socket.recv(&mut buffer)).await {
            Ok(Ok(len)) => Ok(buffer[..len].to_vec()),
            Ok(Err(e)) => Err(classify_io(e)),
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}

fn info_request(challenge: Option<[u8; 4]>) -> Vec<u8> {
    let mut packet = Vec::with_capacity(PACKET_PREFIX.len() + 1 + INFO_QUERY_STRING.len() + 4);
    packet.extend_from_slice(&PACKET_PREFIX);
    packet.push(INFO_REQUEST);
    packet.extend_from_slice(INFO_QUERY_STRING);
    if let Some(challenge) = challenge {
        packet.extend_from_slice(&challenge);
    }
    packet
}

enum ReplyKind {
    Info,
    Challenge([u8; 4]),
}

fn parse_reply_kind(reply: &[u8]) -> Result<ReplyKind, ProbeError> {
    if reply.len() < 5 || reply[..4] != PACKET_PREFIX {
        return Err(ProbeError::Malformed(format!(
            "bad reply header, {} bytes",
            reply.len()
        )));
    }
    match reply[4] {
        INFO_REPLY => Ok(ReplyKind::Info),
        CHALLENGE_REPLY => {
            if reply.len() < 9 {
                return Err(ProbeError::Malformed("truncated challenge".to_string()));
            }
            let mut challenge = [0u8; 4];
            challenge.copy_from_slice(&reply[5..9]);
            Ok(ReplyKind::Challenge(challenge))
        }
        other => Err(ProbeError::Malformed(format!(
            "unknown reply type 0x{:02X}",
            other
        ))),
    }
}

fn read_cstring(cursor: &mut io::Cursor<&[u8]>) -> Result<String, ProbeError> {
    let mut bytes = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        cursor
            .read_exact(&mut byte)
            .map_err(|_| ProbeError::Malformed("unterminated string field".to_string()))?;
        if byte[0] == 0 {
            break;
        }
        bytes.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Little-endian info payload: protocol byte, four strings, app id, player
/// counts, environment bytes, then the version string.
fn parse_info(reply: &[u8]) -> Result<ServerInfo, ProbeError> {
    let payload = &reply[5..];
    let mut cursor = io::Cursor::new(payload);

    let truncated = |_| ProbeError::Malformed("truncated info payload".to_string());

    let _protocol = cursor.read_u8().map_err(truncated)?;
    let name = read_cstring(&mut cursor)?;
    let map = read_cstring(&mut cursor)?;
    let _folder = read_cstring(&mut cursor)?;
    let game = read_cstring(&mut cursor)?;
    let _app_id = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let players = cursor.read_u8().map_err(truncated)?;
    let max_players = cursor.read_u8().map_err(truncated)?;
    let _bots = cursor.read_u8().map_err(truncated)?;
    let _server_type = cursor.read_u8().map_err(truncated)?;
    let _environment = cursor.read_u8().map_err(truncated)?;
    let _visibility = cursor.read_u8().map_err(truncated)?;
    let _vac = cursor.read_u8().map_err(truncated)?;
    let version = read_cstring(&mut cursor)?;

    Ok(ServerInfo {
        name,
        map,
        game,
        version,
        online_players: players as i64,
        max_players: max_players as i64,
        raw: reply.to_vec(),
    })
}

#[cfg(test)]
pub(crate) fn encode_info_reply(
    name: &str,
    map: &str,
    game: &str,
    version: &str,
    players: u8,
    max_players: u8,
) -> Vec<u8> {
    let mut reply = Vec::new();
    reply.extend_from_slice(&PACKET_PREFIX);
    reply.push(INFO_REPLY);
    reply.push(17); // protocol
    for s in [name, map, "cstrike", game] {
        reply.extend_from_slice(s.as_bytes());
        reply.push(0);
    }
    reply.extend_from_slice(&730u16.to_le_bytes());
    reply.push(players);
    reply.push(max_players);
    reply.extend_from_slice(&[0, b'd', b'l', 0, 1]); // bots, type, env, visibility, vac
    reply.extend_from_slice(version.as_bytes());
    reply.push(0);
    reply
}

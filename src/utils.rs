// src/utils.rs
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use std::fmt;
use std::net::IpAddr;

use crate::models::server::Endpoint;
use crate::search::SearchError;

pub const DEFAULT_QUERY_PORT: u16 = 27015;

#[derive(Debug)]
pub enum RequestError {
    MissingPeerIP,
    RateLimitExceeded,
    InvalidAddress(String),
    SessionUnavailable,
    UpstreamDirectory(String),
    ProbeFault(String),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPeerIP => write!(f, "Failed to extract client IP"),
            Self::RateLimitExceeded => write!(f, "Rate limit exceeded"),
            Self::InvalidAddress(addr) => write!(f, "Invalid server address: {}", addr),
            Self::SessionUnavailable => write!(f, "Directory session is not available"),
            Self::UpstreamDirectory(msg) => write!(f, "Directory query failed: {}", msg),
            Self::ProbeFault(msg) => write!(f, "Probe failed: {}", msg),
        }
    }
}

impl ResponseError for RequestError {
    fn error_response(&self) -> HttpResponse {
        match self {
            Self::RateLimitExceeded => HttpResponse::TooManyRequests().body(self.to_string()),
            Self::SessionUnavailable => HttpResponse::ServiceUnavailable().body(self.to_string()),
            Self::UpstreamDirectory(_) => HttpResponse::BadGateway().body(self.to_string()),
            Self::ProbeFault(_) => HttpResponse::InternalServerError().body(self.to_string()),
            _ => HttpResponse::BadRequest().body(self.to_string()),
        }
    }
}

impl From<SearchError> for RequestError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::SessionUnavailable => Self::SessionUnavailable,
            SearchError::Directory(e) => Self::UpstreamDirectory(e.to_string()),
            SearchError::Probe(e) => Self::ProbeFault(e.to_string()),
        }
    }
}

pub fn extract_peer_ip(req: &HttpRequest) -> Result<IpAddr, RequestError> {
    req.peer_addr()
        .map(|addr| addr.ip())
        .ok_or(RequestError::MissingPeerIP)
}

/// Builds the probe target from `/server/info` parameters: `ip` may carry an
/// embedded `addr:port`, otherwise the explicit `port` parameter or the
/// default query port applies.
pub fn parse_probe_target(ip: &str, port: Option<u16>) -> Result<Endpoint, RequestError> {
    let ip = ip.trim();
    if ip.is_empty() {
        return Err(RequestError::InvalidAddress(ip.to_string()));
    }
    if let Some((addr, embedded)) = ip.rsplit_once(':') {
        let parsed: u16 = embedded
            .parse()
            .map_err(|_| RequestError::InvalidAddress(ip.to_string()))?;
        if addr.is_empty() {
            return Err(RequestError::InvalidAddress(ip.to_string()));
        }
        return Ok(Endpoint::new(addr, parsed));
    }
    Ok(Endpoint::new(ip, port.unwrap_or(DEFAULT_QUERY_PORT)))
}

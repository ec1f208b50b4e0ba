//! TURN URI 解析
//!
//! 格式: `scheme:host:port?key=value&key=value`

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TesterError};

/// URI 方案
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnScheme {
    Turn,
    Turns,
    Other(String),
}

impl From<&str> for TurnScheme {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("turn") {
            TurnScheme::Turn
        } else if s.eq_ignore_ascii_case("turns") {
            TurnScheme::Turns
        } else {
            TurnScheme::Other(s.to_string())
        }
    }
}

impl fmt::Display for TurnScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnScheme::Turn => f.write_str("turn"),
            TurnScheme::Turns => f.write_str("turns"),
            TurnScheme::Other(s) => f.write_str(s),
        }
    }
}

/// 传输协议
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnTransport {
    Udp,
    Tcp,
    Other(String),
}

impl From<&str> for TurnTransport {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("udp") {
            TurnTransport::Udp
        } else if s.eq_ignore_ascii_case("tcp") {
            TurnTransport::Tcp
        } else {
            TurnTransport::Other(s.to_string())
        }
    }
}

impl fmt::Display for TurnTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnTransport::Udp => f.write_str("udp"),
            TurnTransport::Tcp => f.write_str("tcp"),
            TurnTransport::Other(s) => f.write_str(s),
        }
    }
}

/// 解析后的 TURN URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTurnUri {
    pub scheme: TurnScheme,
    pub host: String,
    pub port: u16,
    /// 未指定时为 udp
    pub transport: TurnTransport,
    pub raw_query: BTreeMap<String, String>,
}

impl FromStr for ParsedTurnUri {
    type Err = TesterError;

    fn from_str(uri: &str) -> Result<Self> {
        parse(uri)
    }
}

/// 解析 TURN/TURNS URI
pub fn parse(uri: &str) -> Result<ParsedTurnUri> {
    let (head, query) = match uri.split_once('?') {
        Some((head, query)) => (head, Some(query)),
        None => (uri, None),
    };

    let parts: Vec<&str> = head.split(':').collect();
    let [scheme, host, port] = parts.as_slice() else {
        return Err(TesterError::MalformedUri(format!(
            "{}: expected scheme:host:port",
            uri
        )));
    };

    let port: u16 = port
        .parse()
        .map_err(|_| TesterError::MalformedUri(format!("{}: invalid port '{}'", uri, port)))?;

    let raw_query = query.map(parse_query).unwrap_or_default();
    let transport = raw_query
        .get("transport")
        .map(|t| TurnTransport::from(t.as_str()))
        .unwrap_or(TurnTransport::Udp);

    Ok(ParsedTurnUri {
        scheme: TurnScheme::from(*scheme),
        host: host.to_string(),
        port,
        transport,
        raw_query,
    })
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

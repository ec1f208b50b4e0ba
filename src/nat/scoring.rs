//! 评分规则
//!
//! 由 TURN URI 推导特性标志，再由 STUN/TURN 观测结果和标志得出评级

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::Verdict;
use crate::turn::uri::{self, ParsedTurnUri, TurnScheme, TurnTransport};

/// TURN 服务器特性标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TurnFlag {
    #[serde(rename = "udp-turn")]
    UdpTurn,
    #[serde(rename = "udp-turns")]
    UdpTurns,
    #[serde(rename = "tcp-turn")]
    TcpTurn,
    #[serde(rename = "tcp-turns")]
    TcpTurns,
    #[serde(rename = "tcp-turns-443")]
    TcpTurns443,
}

impl TurnFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnFlag::UdpTurn => "udp-turn",
            TurnFlag::UdpTurns => "udp-turns",
            TurnFlag::TcpTurn => "tcp-turn",
            TurnFlag::TcpTurns => "tcp-turns",
            TurnFlag::TcpTurns443 => "tcp-turns-443",
        }
    }
}

impl fmt::Display for TurnFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type FlagSet = BTreeSet<TurnFlag>;

/// 由解析后的 URI 推导标志
pub fn flags_for(parsed: &ParsedTurnUri) -> FlagSet {
    let mut flags = FlagSet::new();
    match (&parsed.scheme, &parsed.transport) {
        (TurnScheme::Turn, TurnTransport::Udp) => {
            flags.insert(TurnFlag::UdpTurn);
        }
        (TurnScheme::Turns, TurnTransport::Udp) => {
            flags.insert(TurnFlag::UdpTurns);
        }
        (TurnScheme::Turn, TurnTransport::Tcp) => {
            flags.insert(TurnFlag::TcpTurn);
        }
        (TurnScheme::Turns, TurnTransport::Tcp) => {
            flags.insert(TurnFlag::TcpTurns);
            if parsed.port == 443 {
                flags.insert(TurnFlag::TcpTurns443);
            }
        }
        (scheme, transport) => {
            tracing::warn!("未知的 TURN 组合: {} over {}", scheme, transport);
        }
    }
    flags
}

/// 由 URI 字符串推导标志；URI 无法解析时返回空集合
pub fn flags_for_uri(turn_uri: &str) -> FlagSet {
    match uri::parse(turn_uri) {
        Ok(parsed) => flags_for(&parsed),
        Err(e) => {
            tracing::warn!("无法推导标志: {}", e);
            FlagSet::new()
        }
    }
}

/// 单个 URI 的评级
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriVerdict {
    pub summary: String,
    pub verdict: Verdict,
}

/// 单个 URI 的评级规则
///
/// `turn_usable` 要求既收集到中继候选，又通过了中继回声测试
pub fn uri_verdict(stun_seen: bool, turn_usable: bool, flags: &FlagSet) -> UriVerdict {
    let (summary, verdict) = match (stun_seen, turn_usable) {
        (true, false) => ("STUN only", Verdict::Poor),
        (false, true) if !flags.contains(&TurnFlag::UdpTurn) => ("TURN", Verdict::Excellent),
        (false, true) => ("TURN only", Verdict::Poor),
        (true, true) => ("STUN & TURN", Verdict::Excellent),
        (false, false) => ("Didn't work", Verdict::Fail),
    };
    UriVerdict {
        summary: summary.to_string(),
        verdict,
    }
}

/// 单个 IP 版本轮次的汇总输入
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassTally {
    pub stun_seen: bool,
    pub turn_usable: bool,
    pub flags: FlagSet,
}

impl PassTally {
    /// 合并一个 URI 的结果
    pub fn add(&mut self, stun_seen: bool, turn_usable: bool, flags: &FlagSet) {
        self.stun_seen |= stun_seen;
        self.turn_usable |= turn_usable;
        self.flags.extend(flags.iter().copied());
    }

    fn has(&self, flag: TurnFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// IP 版本轮次的评级
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassVerdict {
    pub summary: String,
    pub verdict: Verdict,
    pub rationale: String,
}

/// 轮次汇总评级规则
pub fn pass_verdict(tally: &PassTally) -> PassVerdict {
    let (summary, verdict, rationale) = match (tally.stun_seen, tally.turn_usable) {
        (true, false) => (
            "STUN only (No TURN)",
            Verdict::Poor,
            "STUN alone fails behind some NAT types",
        ),
        (false, true) => (
            "TURN only (No STUN)",
            Verdict::Poor,
            "Relaying works but direct connections can't be optimised",
        ),
        (true, true) if tally.has(TurnFlag::TcpTurns443) && tally.has(TurnFlag::UdpTurn) => (
            "STUN & TURN",
            Verdict::Excellent,
            "TURNS on TCP port 443 gets through strict firewalls and UDP TURN provides STUN",
        ),
        (true, true)
            if tally.has(TurnFlag::UdpTurn)
                && (tally.has(TurnFlag::TcpTurns) || tally.has(TurnFlag::UdpTurns)) =>
        (
            "STUN & TURN",
            Verdict::Great,
            "Encrypted TURN is available alongside UDP TURN",
        ),
        (true, true) if tally.has(TurnFlag::UdpTurn) => (
            "STUN & TURN",
            Verdict::Good,
            "Works, but TURN credentials are sent in cleartext",
        ),
        (true, true) => (
            "STUN & TURN",
            Verdict::Poor,
            "Most browsers only do STUN over cleartext UDP TURN (udp-turn missing)",
        ),
        (false, false) => (
            "No STUN or TURN",
            Verdict::Fail,
            "No NAT traversal support detected",
        ),
    };
    PassVerdict {
        summary: summary.to_string(),
        verdict,
        rationale: rationale.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(list: &[TurnFlag]) -> FlagSet {
        list.iter().copied().collect()
    }

    #[test]
    fn test_flags_turns_443() {
        let f = flags_for_uri("turns:example.com:443?transport=tcp");
        assert_eq!(f, flags(&[TurnFlag::TcpTurns, TurnFlag::TcpTurns443]));
    }

    #[test]
    fn test_flags_table() {
        assert_eq!(
            flags_for_uri("turn:example.com:3478"),
            flags(&[TurnFlag::UdpTurn])
        );
        assert_eq!(
            flags_for_uri("turns:example.com:5349?transport=udp"),
            flags(&[TurnFlag::UdpTurns])
        );
        assert_eq!(
            flags_for_uri("turn:example.com:3478?transport=tcp"),
            flags(&[TurnFlag::TcpTurn])
        );
        assert_eq!(
            flags_for_uri("turns:example.com:5349?transport=tcp"),
            flags(&[TurnFlag::TcpTurns])
        );
        // 443 只对 TURNS over TCP 有意义
        assert_eq!(
            flags_for_uri("turn:example.com:443?transport=tcp"),
            flags(&[TurnFlag::TcpTurn])
        );
    }

    #[test]
    fn test_flags_unknown_or_malformed() {
        assert!(flags_for_uri("stun:example.com:3478").is_empty());
        assert!(flags_for_uri("turn:example.com:3478?transport=tls").is_empty());
        assert!(flags_for_uri("turn:example.com").is_empty());
    }

    #[test]
    fn test_uri_verdicts() {
        let udp = flags(&[TurnFlag::UdpTurn]);
        let tcp = flags(&[TurnFlag::TcpTurns]);

        assert_eq!(uri_verdict(true, false, &udp).verdict, Verdict::Poor);
        assert_eq!(uri_verdict(true, false, &udp).summary, "STUN only");

        let v = uri_verdict(false, true, &tcp);
        assert_eq!((v.summary.as_str(), v.verdict), ("TURN", Verdict::Excellent));

        let v = uri_verdict(false, true, &udp);
        assert_eq!((v.summary.as_str(), v.verdict), ("TURN only", Verdict::Poor));

        let v = uri_verdict(true, true, &udp);
        assert_eq!((v.summary.as_str(), v.verdict), ("STUN & TURN", Verdict::Excellent));

        let v = uri_verdict(false, false, &udp);
        assert_eq!((v.summary.as_str(), v.verdict), ("Didn't work", Verdict::Fail));
    }

    fn tally(stun: bool, turn: bool, list: &[TurnFlag]) -> PassTally {
        PassTally {
            stun_seen: stun,
            turn_usable: turn,
            flags: flags(list),
        }
    }

    #[test]
    fn test_pass_stun_only() {
        let v = pass_verdict(&tally(true, false, &[TurnFlag::UdpTurn]));
        assert_eq!(v.verdict, Verdict::Poor);
        assert_eq!(v.summary, "STUN only (No TURN)");
    }

    #[test]
    fn test_pass_turn_only_is_poor() {
        // URI 级别 TURN (无 udp-turn) 为 Excellent，汇总级别为 Poor
        let v = pass_verdict(&tally(false, true, &[TurnFlag::TcpTurns]));
        assert_eq!(v.verdict, Verdict::Poor);
        assert_eq!(uri_verdict(false, true, &flags(&[TurnFlag::TcpTurns])).verdict, Verdict::Excellent);
    }

    #[test]
    fn test_pass_stun_and_turn_tiers() {
        let v = pass_verdict(&tally(
            true,
            true,
            &[TurnFlag::TcpTurns443, TurnFlag::TcpTurns, TurnFlag::UdpTurn],
        ));
        assert_eq!(v.verdict, Verdict::Excellent);

        let v = pass_verdict(&tally(true, true, &[TurnFlag::UdpTurn, TurnFlag::TcpTurns]));
        assert_eq!(v.verdict, Verdict::Great);

        let v = pass_verdict(&tally(true, true, &[TurnFlag::UdpTurn, TurnFlag::UdpTurns]));
        assert_eq!(v.verdict, Verdict::Great);

        let v = pass_verdict(&tally(true, true, &[TurnFlag::UdpTurn, TurnFlag::TcpTurn]));
        assert_eq!(v.verdict, Verdict::Good);

        let v = pass_verdict(&tally(true, true, &[TurnFlag::TcpTurns443, TurnFlag::TcpTurns]));
        assert_eq!(v.verdict, Verdict::Poor);
    }

    #[test]
    fn test_pass_neither_fails() {
        let v = pass_verdict(&PassTally::default());
        assert_eq!(v.verdict, Verdict::Fail);
    }

    #[test]
    fn test_tally_unions_uris() {
        let mut t = PassTally::default();
        t.add(true, false, &flags(&[TurnFlag::UdpTurn]));
        t.add(false, true, &flags(&[TurnFlag::TcpTurns, TurnFlag::TcpTurns443]));
        assert!(t.stun_seen && t.turn_usable);
        assert_eq!(t.flags.len(), 3);
        assert_eq!(pass_verdict(&t).verdict, Verdict::Excellent);
    }
}

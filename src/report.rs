//! 测试报告
//!
//! 每个 IP 版本、每个 URI 一份结果，加上每个 IP 版本的汇总评级

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::ProbeErrorKind;
use crate::nat::scoring::{pass_verdict, uri_verdict, FlagSet, PassTally, PassVerdict, UriVerdict};
use crate::nat::{classify_address, IpVersion};
use crate::turn::TurnConfig;
use crate::webrtc::{CandidateProtocol, CandidateType, IceCandidate};

/// 报告中的单个候选
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateDetail {
    pub proto: CandidateProtocol,
    #[serde(rename = "type")]
    pub candidate_type: CandidateType,
    pub ip: String,
    pub port: u16,
}

impl From<&IceCandidate> for CandidateDetail {
    fn from(c: &IceCandidate) -> Self {
        Self {
            proto: c.protocol,
            candidate_type: c.candidate_type,
            ip: c.address.clone(),
            port: c.port,
        }
    }
}

/// 非受限收集的摘要
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CandidateSummary {
    pub details: Vec<CandidateDetail>,
    /// 收集到服务器反射 (STUN) 候选
    pub stun_seen: bool,
    /// 收集到中继 (TURN) 候选
    pub turn_seen: bool,
}

impl CandidateSummary {
    /// 只统计地址属于 `version` 的候选
    pub fn from_candidates(candidates: &[IceCandidate], version: IpVersion) -> Self {
        let mut summary = Self::default();
        for c in candidates
            .iter()
            .filter(|c| classify_address(&c.address).matches(version))
        {
            match c.candidate_type {
                CandidateType::Srflx => summary.stun_seen = true,
                CandidateType::Relay => summary.turn_seen = true,
                CandidateType::Host | CandidateType::Prflx => {}
            }
            summary.details.push(CandidateDetail::from(c));
        }
        summary
    }
}

/// 中继测试结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayProbeOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProbeErrorKind>,
}

impl RelayProbeOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: ProbeErrorKind) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }
}

/// 单个 URI 的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UriReport {
    pub candidates: CandidateSummary,
    pub relay: RelayProbeOutcome,
    pub flags: FlagSet,
    pub verdict: UriVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gather_error: Option<String>,
}

impl UriReport {
    pub fn new(
        candidates: CandidateSummary,
        relay: RelayProbeOutcome,
        flags: FlagSet,
        gather_error: Option<String>,
    ) -> Self {
        let turn_usable = candidates.turn_seen && relay.success;
        let verdict = uri_verdict(candidates.stun_seen, turn_usable, &flags);
        Self {
            candidates,
            relay,
            flags,
            verdict,
            gather_error,
        }
    }

    /// 中继候选存在且端到端可用
    pub fn turn_usable(&self) -> bool {
        self.candidates.turn_seen && self.relay.success
    }
}

/// 单个 IP 版本的全部 URI 结果
pub type PassReport = BTreeMap<String, UriReport>;

/// 完整的测试报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestReport {
    /// 凭据不会被序列化
    pub turn_config: TurnConfig,
    pub passes: BTreeMap<IpVersion, PassReport>,
    pub verdicts: BTreeMap<IpVersion, PassVerdict>,
}

impl TestReport {
    pub fn new(turn_config: TurnConfig) -> Self {
        Self {
            turn_config,
            passes: BTreeMap::new(),
            verdicts: BTreeMap::new(),
        }
    }

    /// 计算每个 IP 版本的汇总评级
    pub fn classify(&mut self) {
        self.verdicts = self
            .passes
            .iter()
            .map(|(version, pass)| {
                let mut tally = PassTally::default();
                for report in pass.values() {
                    tally.add(report.candidates.stun_seen, report.turn_usable(), &report.flags);
                }
                (*version, pass_verdict(&tally))
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nat::scoring::flags_for_uri;
    use crate::nat::Verdict;
    use crate::webrtc::mock::candidate;

    fn candidates() -> Vec<IceCandidate> {
        vec![
            candidate("1", CandidateType::Host, "192.168.1.10", 50000),
            candidate("2", CandidateType::Srflx, "198.51.100.4", 50001),
            candidate("3", CandidateType::Relay, "2001:db8::3", 3478),
            candidate("4", CandidateType::Host, "0d3f1e5c.local", 50002),
        ]
    }

    fn config(uris: &[&str]) -> TurnConfig {
        TurnConfig {
            username: "user".to_string(),
            credential: "secret".to_string(),
            uris: uris.iter().map(|u| u.to_string()).collect(),
            ttl: None,
        }
    }

    #[test]
    fn test_summary_filters_by_version() {
        let v4 = CandidateSummary::from_candidates(&candidates(), IpVersion::V4);
        assert!(v4.stun_seen);
        assert!(!v4.turn_seen);
        assert_eq!(v4.details.len(), 2);

        let v6 = CandidateSummary::from_candidates(&candidates(), IpVersion::V6);
        assert!(!v6.stun_seen);
        assert!(v6.turn_seen);
        assert_eq!(v6.details[0].ip, "2001:db8::3");
    }

    #[test]
    fn test_turn_requires_successful_probe() {
        let summary = CandidateSummary::from_candidates(&candidates(), IpVersion::V6);
        let flags = flags_for_uri("turn:turn.example.com:3478");

        let report = UriReport::new(
            summary.clone(),
            RelayProbeOutcome::failed(ProbeErrorKind::NoRelayCandidate),
            flags.clone(),
            None,
        );
        assert!(!report.turn_usable());
        assert_eq!(report.verdict.verdict, Verdict::Fail);

        let report = UriReport::new(summary, RelayProbeOutcome::succeeded(), flags, None);
        assert!(report.turn_usable());
        assert_eq!(report.verdict.summary, "TURN only");
    }

    #[test]
    fn test_stun_only_pass() {
        let mut report = TestReport::new(config(&["stun:stun.example.com:3478"]));
        let summary = CandidateSummary::from_candidates(&candidates(), IpVersion::V4);
        let mut pass = PassReport::new();
        pass.insert(
            "stun:stun.example.com:3478".to_string(),
            UriReport::new(
                summary,
                RelayProbeOutcome::failed(ProbeErrorKind::NoRelayCandidate),
                FlagSet::new(),
                None,
            ),
        );
        report.passes.insert(IpVersion::V4, pass);
        report.classify();

        let verdict = &report.verdicts[&IpVersion::V4];
        assert_eq!(verdict.summary, "STUN only (No TURN)");
        assert_eq!(verdict.verdict, Verdict::Poor);
    }

    #[test]
    fn test_empty_passes_fail() {
        let mut report = TestReport::new(config(&[]));
        for version in IpVersion::ALL {
            report.passes.insert(version, PassReport::new());
        }
        report.classify();
        assert!(report.passes.values().all(|p| p.is_empty()));
        for version in IpVersion::ALL {
            assert_eq!(report.verdicts[&version].verdict, Verdict::Fail);
        }
    }

    #[test]
    fn test_report_json_shape() {
        let mut report = TestReport::new(config(&["turn:turn.example.com:3478"]));
        let mut pass = PassReport::new();
        pass.insert(
            "turn:turn.example.com:3478".to_string(),
            UriReport::new(
                CandidateSummary::from_candidates(&candidates(), IpVersion::V4),
                RelayProbeOutcome::failed(ProbeErrorKind::ServiceRequest { status: 502 }),
                flags_for_uri("turn:turn.example.com:3478"),
                None,
            ),
        );
        report.passes.insert(IpVersion::V4, pass);
        report.classify();

        let json = serde_json::to_value(&report).unwrap();
        let uri = &json["passes"]["IPv4"]["turn:turn.example.com:3478"];
        assert_eq!(uri["flags"][0], "udp-turn");
        assert_eq!(uri["relay"]["error"]["kind"], "service_request");
        assert_eq!(uri["candidates"]["details"][1]["type"], "srflx");
        assert_eq!(json["verdicts"]["IPv4"]["verdict"], "Poor");
        assert!(json["turn_config"].get("credential").is_none());
        assert!(!json.to_string().contains("secret"));
    }
}

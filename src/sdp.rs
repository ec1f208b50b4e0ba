//! SDP 处理
//!
//! 改写 offer 使其只保留一个候选，这样中继测试一定走指定的中继地址。
//! 改写按行进行；校验则使用 webrtc-rs 的 SDP 解析。
//!
//! 限制：只适用于单媒体段的 SDP (本工具只创建一个数据通道)

use std::io::Cursor;
use webrtc::sdp::SessionDescription as ParsedSdp;

use crate::error::{Result, TesterError};
use crate::nat::{classify_address, IpVersion};
use crate::webrtc::IceCandidate;

/// 候选收集结束标记
pub const END_OF_CANDIDATES: &str = "a=end-of-candidates";

const CANDIDATE_PREFIX: &str = "a=candidate:";

fn lines(sdp: &str) -> impl DoubleEndedIterator<Item = &str> {
    sdp.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line))
}

/// 只保留指定候选
///
/// webrtc-rs 会为同一候选写出 component 1 和 component 2 两行，foundation 相同。
/// 匹配键为 foundation 加 component，并且只保留第一条匹配行。
///
/// 从最后一行向前扫描，丢弃其它候选行。如果保留的候选之后还没有收集结束标记，
/// 则在它后面插入一个。没有任何候选匹配时返回 `DoctorSdp`
pub fn isolate(offer_sdp: &str, wanted: &IceCandidate) -> Result<String> {
    let key = format!("{}{} {} ", CANDIDATE_PREFIX, wanted.foundation, wanted.component);

    let all: Vec<&str> = lines(offer_sdp).collect();
    let keep = all.iter().position(|line| line.starts_with(&key)).ok_or_else(|| {
        TesterError::DoctorSdp(format!(
            "candidate {} (component {}) not found in offer",
            wanted.foundation, wanted.component
        ))
    })?;

    let mut reversed: Vec<&str> = Vec::with_capacity(all.len() + 1);
    let mut seen_marker = false;

    for (index, line) in all.iter().copied().enumerate().rev() {
        if line == END_OF_CANDIDATES {
            seen_marker = true;
            reversed.push(line);
        } else if line.starts_with(CANDIDATE_PREFIX) {
            if index != keep {
                continue;
            }
            if !seen_marker {
                reversed.push(END_OF_CANDIDATES);
                seen_marker = true;
            }
            reversed.push(line);
        } else {
            reversed.push(line);
        }
    }

    reversed.reverse();
    Ok(reversed.join("\r\n"))
}

/// 删除地址不属于指定 IP 版本的候选行
///
/// 用于回声服务返回的 answer：对端只暴露当前测试的地址族，本地其它地址族的
/// 中继候选就无法与之配对
pub fn retain_address_class(sdp: &str, version: IpVersion) -> String {
    lines(sdp)
        .filter(|line| {
            if !line.starts_with(CANDIDATE_PREFIX) {
                return true;
            }
            match IceCandidate::parse(line) {
                Ok(c) => classify_address(&c.address).matches(version),
                Err(e) => {
                    tracing::debug!("保留无法解析的候选行 {:?}: {}", line, e);
                    true
                }
            }
        })
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// SDP 中与候选相关的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SdpSummary {
    pub media_sections: usize,
    pub candidates: usize,
    pub end_of_candidates: bool,
}

/// 解析 SDP 并统计媒体段和候选
pub fn inspect(sdp: &str) -> Result<SdpSummary> {
    let parsed = ParsedSdp::unmarshal(&mut Cursor::new(sdp.as_bytes()))
        .map_err(|e| TesterError::InvalidOffer(format!("unparseable SDP: {}", e)))?;

    let attributes = parsed
        .attributes
        .iter()
        .chain(parsed.media_descriptions.iter().flat_map(|m| m.attributes.iter()));

    let mut summary = SdpSummary {
        media_sections: parsed.media_descriptions.len(),
        ..Default::default()
    };
    for attribute in attributes {
        match attribute.key.as_str() {
            "candidate" => summary.candidates += 1,
            "end-of-candidates" => summary.end_of_candidates = true,
            _ => {}
        }
    }
    Ok(summary)
}

/// 确认 offer 已被改写为单候选形式
///
/// 回声服务据此拒绝未经处理的 offer
pub fn check_isolated(sdp: &str) -> Result<()> {
    let summary = inspect(sdp)?;
    if summary.media_sections != 1 {
        return Err(TesterError::InvalidOffer(format!(
            "expected 1 media section, found {}",
            summary.media_sections
        )));
    }
    if summary.candidates != 1 {
        return Err(TesterError::InvalidOffer(format!(
            "expected 1 candidate, found {}",
            summary.candidates
        )));
    }
    if !summary.end_of_candidates {
        return Err(TesterError::InvalidOffer(
            "candidates are not marked complete".to_string(),
        ));
    }
    Ok(())
}

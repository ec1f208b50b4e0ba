//! 测试报告的文本输出

use crate::nat::scoring::flags_for_uri;
use crate::nat::{IpVersion, Verdict};
use crate::report::{TestReport, UriReport};
use crate::turn::uri;

fn verdict_icon(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Excellent | Verdict::Great => "✓",
        Verdict::Good | Verdict::Poor => "⚠",
        Verdict::Fail => "✗",
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "✓"
    } else {
        "✗"
    }
}

fn format_uri(output: &mut String, turn_uri: &str, report: &UriReport) {
    output.push_str(&format!(
        "  [{}] {} - {} ({})\n",
        verdict_icon(report.verdict.verdict),
        turn_uri,
        report.verdict.summary,
        report.verdict.verdict
    ));
    output.push_str(&format!(
        "      候选: {} (STUN {}, TURN {})\n",
        report.candidates.details.len(),
        yes_no(report.candidates.stun_seen),
        yes_no(report.candidates.turn_seen)
    ));

    match &report.relay.error {
        None if report.relay.success => output.push_str("      中继: ✓\n"),
        None => output.push_str("      中继: ✗\n"),
        Some(error) => output.push_str(&format!("      中继: ✗ {}\n", error)),
    }

    if !report.flags.is_empty() {
        let flags: Vec<&str> = report.flags.iter().map(|f| f.as_str()).collect();
        output.push_str(&format!("      标志: {}\n", flags.join(", ")));
    }

    if let Some(ref error) = report.gather_error {
        output.push_str(&format!("      收集失败: {}\n", error));
    }
}

/// 格式化测试报告
pub fn format_report(report: &TestReport) -> String {
    let mut output = String::new();

    output.push_str("\n=== STUN/TURN 测试结果 ===\n");

    for (version, pass) in &report.passes {
        output.push('\n');
        match report.verdicts.get(version) {
            Some(verdict) => {
                output.push_str(&format!(
                    "[{}] {} - {} ({})\n",
                    verdict_icon(verdict.verdict),
                    version,
                    verdict.summary,
                    verdict.verdict
                ));
                output.push_str(&format!("  说明: {}\n", verdict.rationale));
            }
            None => output.push_str(&format!("[?] {}\n", version)),
        }

        // 按配置中的顺序输出
        for turn_uri in &report.turn_config.uris {
            if let Some(uri_report) = pass.get(turn_uri) {
                format_uri(&mut output, turn_uri, uri_report);
            }
        }
    }

    output
}

/// 格式化单个 URI 的解析结果
pub fn format_parsed_uri(turn_uri: &str) -> String {
    match uri::parse(turn_uri) {
        Ok(parsed) => {
            let flags: Vec<&str> = flags_for_uri(turn_uri).iter().map(|f| f.as_str()).collect();
            let mut output = String::new();
            output.push_str(&format!("协议: {}\n", parsed.scheme));
            output.push_str(&format!("主机: {}\n", parsed.host));
            output.push_str(&format!("端口: {}\n", parsed.port));
            output.push_str(&format!("传输: {}\n", parsed.transport));
            for (key, value) in &parsed.raw_query {
                output.push_str(&format!("参数: {}={}\n", key, value));
            }
            output.push_str(&format!(
                "标志: {}\n",
                if flags.is_empty() {
                    "(无)".to_string()
                } else {
                    flags.join(", ")
                }
            ));
            output
        }
        Err(e) => format!("✗ {}\n", e),
    }
}

/// 报告中最差的评级
pub fn worst_verdict(report: &TestReport) -> Option<(IpVersion, Verdict)> {
    report
        .verdicts
        .iter()
        .map(|(version, verdict)| (*version, verdict.verdict))
        .max_by_key(|(_, verdict)| *verdict)
}

//! 测试流程
//!
//! 依次对每个 IP 版本、每个 TURN URI 执行：
//! 1. 非受限收集，统计 STUN/TURN 候选
//! 2. 仅中继收集 (独立会话)
//! 3. 中继回声测试
//! 4. 推导标志和评级

pub mod gather;
pub mod progress;
pub mod relay;

pub use gather::{gather, gather_within, GatherResult, DATA_CHANNEL_LABEL};
pub use progress::{LogProgress, ProgressSink};
pub use relay::{EchoService, HttpEchoService, RelayProber, DEFAULT_ECHO_TIMEOUT};

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{ProbeErrorKind, Result};
use crate::nat::scoring::flags_for_uri;
use crate::nat::IpVersion;
use crate::report::{CandidateSummary, PassReport, RelayProbeOutcome, TestReport, UriReport};
use crate::turn::{TurnConfig, TurnConfigProvider};
use crate::webrtc::IceAgent;

/// 单个 URI 内的阶段数
const URI_STAGES: usize = 3;

/// 测试选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOptions {
    /// 等待回声的时间
    pub echo_timeout: Duration,
    /// 单次收集的超时，`None` 表示不限制
    pub gather_timeout: Option<Duration>,
    /// 按顺序测试的 IP 版本
    pub ip_versions: Vec<IpVersion>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            echo_timeout: DEFAULT_ECHO_TIMEOUT,
            gather_timeout: Some(Duration::from_secs(60)),
            ip_versions: IpVersion::ALL.to_vec(),
        }
    }
}

/// NAT 穿透测试器
pub struct Tester {
    agent: Arc<dyn IceAgent>,
    prober: RelayProber,
    progress: Arc<dyn ProgressSink>,
    options: TestOptions,
}

impl Tester {
    pub fn new(agent: Arc<dyn IceAgent>, echo: Arc<dyn EchoService>, options: TestOptions) -> Self {
        Self {
            agent,
            prober: RelayProber::new(echo, options.echo_timeout),
            progress: Arc::new(LogProgress),
            options,
        }
    }

    /// 替换进度观察者
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// 获取 TURN 配置并运行完整测试
    ///
    /// 获取配置失败是致命错误
    pub async fn run(&self, provider: &dyn TurnConfigProvider) -> Result<TestReport> {
        let steps = self.options.ip_versions.len() + 1;
        self.progress
            .on_progress(1, 0, steps, "Requesting TURN details");
        let turn_config = provider.get_turn_config().await?;
        self.run_passes(turn_config, 1, steps).await
    }

    /// 使用给定的 TURN 配置运行完整测试
    pub async fn run_test(&self, turn_config: TurnConfig) -> Result<TestReport> {
        let steps = self.options.ip_versions.len();
        self.run_passes(turn_config, 0, steps).await
    }

    async fn run_passes(&self, turn_config: TurnConfig, done: usize, steps: usize) -> Result<TestReport> {
        let mut report = TestReport::new(turn_config);

        for (i, version) in self.options.ip_versions.iter().copied().enumerate() {
            self.progress.on_progress(
                1,
                done + i,
                steps,
                &format!("Testing ({} candidates)", version),
            );
            let pass = self.run_pass(version, &report.turn_config).await?;
            report.passes.insert(version, pass);
        }

        report.classify();
        for (version, verdict) in &report.verdicts {
            info!("{}: {} ({})", version, verdict.verdict, verdict.summary);
        }
        Ok(report)
    }

    /// 对一个 IP 版本测试全部 URI
    pub async fn run_pass(&self, version: IpVersion, turn_config: &TurnConfig) -> Result<PassReport> {
        let total = turn_config.uris.len();
        let mut pass = PassReport::new();

        for (i, uri) in turn_config.uris.iter().enumerate() {
            self.progress
                .on_progress(2, i, total, &format!("TURN URI: {}", uri));
            let report = self.test_uri(version, uri, turn_config).await?;
            pass.insert(uri.clone(), report);
        }

        Ok(pass)
    }

    /// 测试单个 URI
    ///
    /// 收集失败和中继测试失败都记录在结果中，只有结构性错误会返回 `Err`
    pub async fn test_uri(&self, version: IpVersion, uri: &str, turn_config: &TurnConfig) -> Result<UriReport> {
        let flags = flags_for_uri(uri);
        let timeout = self.options.gather_timeout;
        let agent = self.agent.as_ref();

        self.progress
            .on_progress(3, 0, URI_STAGES, "Gathering candidates");
        let mut gather_error = None;
        let candidates = match gather_within(
            agent,
            uri,
            &turn_config.username,
            &turn_config.credential,
            false,
            timeout,
        )
        .await
        {
            Ok(result) => {
                let summary = CandidateSummary::from_candidates(&result.candidates, version);
                result.close().await;
                summary
            }
            Err(e) => {
                warn!("[{}] 收集候选失败 {}: {}", version, uri, e);
                gather_error = Some(e.to_string());
                CandidateSummary::default()
            }
        };

        self.progress
            .on_progress(3, 1, URI_STAGES, "Gathering candidates (relay only)");
        let relay = match gather_within(
            agent,
            uri,
            &turn_config.username,
            &turn_config.credential,
            true,
            timeout,
        )
        .await
        {
            Ok(result) => {
                self.progress
                    .on_progress(3, 2, URI_STAGES, "Testing TURN relaying");
                self.probe(version, result).await?
            }
            Err(e) => {
                warn!("[{}] 仅中继收集失败 {}: {}", version, uri, e);
                RelayProbeOutcome::failed(ProbeErrorKind::Gather {
                    message: e.to_string(),
                })
            }
        };

        let report = UriReport::new(candidates, relay, flags, gather_error);
        info!(
            "[{}] {}: {} ({})",
            version, uri, report.verdict.verdict, report.verdict.summary
        );
        Ok(report)
    }

    async fn probe(&self, version: IpVersion, gathered: GatherResult) -> Result<RelayProbeOutcome> {
        match self.prober.probe(version, gathered).await {
            Ok(()) => Ok(RelayProbeOutcome::succeeded()),
            Err(e) => match ProbeErrorKind::from_probe_error(&e) {
                Some(kind) => {
                    info!("[{}] 中继测试失败: {}", version, e);
                    Ok(RelayProbeOutcome::failed(kind))
                }
                None => Err(e),
            },
        }
    }
}

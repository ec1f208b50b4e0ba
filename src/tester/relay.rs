//! 中继可用性测试
//!
//! 只保留一个中继候选，把 offer 交给远端回声服务，然后在数据通道上
//! 完成一次问答。能完成问答说明该中继地址端到端可用

use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::gather::GatherResult;
use crate::echo::{TestMeRequest, TestMeResponse, MAGIC_ANSWER, MAGIC_QUESTION};
use crate::error::{InteractiveFailure, Result, TesterError};
use crate::nat::{classify_address, IpVersion};
use crate::sdp;
use crate::webrtc::{AgentSession, CandidateType, IceCandidate, SessionDescription, SessionEvent};

/// 默认回声等待时间
pub const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_millis(150_000);

/// 远端回声服务
#[async_trait]
pub trait EchoService: Send + Sync {
    /// 提交 offer，返回 answer
    async fn exchange(&self, offer: SessionDescription) -> Result<SessionDescription>;
}

/// 基于 HTTP 的回声服务客户端
pub struct HttpEchoService {
    client: Client,
    url: Url,
}

impl HttpEchoService {
    /// `service_url` 为 `/v1/test_me` 的完整地址
    pub fn new(service_url: &str) -> Result<Self> {
        let url = Url::parse(service_url).map_err(|e| {
            TesterError::ServiceUnreachable(format!("invalid service URL {}: {}", service_url, e))
        })?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl EchoService for HttpEchoService {
    async fn exchange(&self, offer: SessionDescription) -> Result<SessionDescription> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&TestMeRequest {
                offer,
                candidate: None,
            })
            .send()
            .await
            .map_err(|e| TesterError::ServiceUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TesterError::ServiceRequest {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| TesterError::ServiceUnreachable(e.to_string()))?;
        let parsed: TestMeResponse = serde_json::from_str(&body)
            .map_err(|e| TesterError::MalformedResponse(e.to_string()))?;
        Ok(parsed.answer)
    }
}

/// 选择第一个属于指定 IP 版本的中继候选
pub fn select_relay_candidate(candidates: &[IceCandidate], version: IpVersion) -> Option<&IceCandidate> {
    candidates.iter().find(|c| {
        c.candidate_type == CandidateType::Relay && classify_address(&c.address).matches(version)
    })
}

/// 探测状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    CandidateSelected,
    OfferDoctored,
    ServiceContacted,
    ChannelOpen,
    Succeeded,
    TimedOut,
    UnexpectedClose,
    ChannelError,
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct Transitions {
    state: ProbeState,
    version: IpVersion,
}

impl Transitions {
    fn to(&mut self, next: ProbeState) {
        debug!("[{}] 中继测试: {} -> {}", self.version, self.state, next);
        self.state = next;
    }

    fn fail(&mut self, next: ProbeState, failure: InteractiveFailure) -> TesterError {
        self.to(next);
        TesterError::InteractiveTestFail(failure)
    }
}

/// 中继测试器
pub struct RelayProber {
    echo: Arc<dyn EchoService>,
    echo_timeout: Duration,
}

impl RelayProber {
    pub fn new(echo: Arc<dyn EchoService>, echo_timeout: Duration) -> Self {
        Self { echo, echo_timeout }
    }

    /// 使用仅中继收集的结果进行测试
    ///
    /// 接管会话，并在任何退出路径上恰好关闭一次
    pub async fn probe(&self, version: IpVersion, gathered: GatherResult) -> Result<()> {
        let GatherResult {
            candidates,
            local_description,
            mut session,
        } = gathered;

        let outcome = self
            .run(version, &candidates, &local_description, &mut session)
            .await;
        session.close().await;
        outcome
    }

    async fn run(
        &self,
        version: IpVersion,
        candidates: &[IceCandidate],
        local: &SessionDescription,
        session: &mut AgentSession,
    ) -> Result<()> {
        let mut states = Transitions {
            state: ProbeState::Idle,
            version,
        };

        let candidate =
            select_relay_candidate(candidates, version).ok_or(TesterError::NoRelayCandidate(version))?;
        states.to(ProbeState::CandidateSelected);
        debug!("[{}] 测试中继候选 {}:{}", version, candidate.address, candidate.port);

        let offer = SessionDescription {
            sdp_type: local.sdp_type,
            sdp: sdp::isolate(&local.sdp, candidate)?,
        };
        states.to(ProbeState::OfferDoctored);

        let answer = self.echo.exchange(offer).await?;
        states.to(ProbeState::ServiceContacted);

        // 本地仍持有其它中继候选 (例如另一地址族)，只让对端暴露当前地址族的候选
        let answer = SessionDescription {
            sdp: sdp::retain_address_class(&answer.sdp, version),
            ..answer
        };

        let remote = Arc::clone(&session.session);
        tokio::spawn(async move {
            if let Err(e) = remote.set_remote_description(answer).await {
                warn!("设置远程描述失败: {}", e);
            }
        });

        let deadline = tokio::time::sleep(self.echo_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    return Err(states.fail(ProbeState::TimedOut, InteractiveFailure::Timeout));
                }
                event = session.events.recv() => match event {
                    Some(SessionEvent::ChannelOpen) => {
                        states.to(ProbeState::ChannelOpen);
                        session.session.send_text(MAGIC_QUESTION).await?;
                    }
                    Some(SessionEvent::ChannelMessage(text)) if text == MAGIC_ANSWER => {
                        states.to(ProbeState::Succeeded);
                        return Ok(());
                    }
                    Some(SessionEvent::ChannelMessage(text)) => {
                        debug!("[{}] 忽略意外回复: {:?}", version, text);
                    }
                    Some(SessionEvent::ChannelClose) | None => {
                        return Err(states.fail(
                            ProbeState::UnexpectedClose,
                            InteractiveFailure::UnexpectedClose,
                        ));
                    }
                    Some(SessionEvent::ChannelError(detail)) => {
                        return Err(states.fail(
                            ProbeState::ChannelError,
                            InteractiveFailure::ChannelError(detail),
                        ));
                    }
                    Some(other) => debug!("[{}] 测试阶段忽略事件: {:?}", version, other),
                },
            }
        }
    }
}

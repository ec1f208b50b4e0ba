//! ICE 候选收集
//!
//! 针对单个 STUN/TURN URI 创建会话并收集候选，直到收集结束

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, TesterError};
use crate::webrtc::{
    AgentSession, IceAgent, IceCandidate, IceServer, IceSessionConfig, IceTransportPolicy,
    SessionDescription, SessionEvent,
};

/// 测试数据通道的标签
pub const DATA_CHANNEL_LABEL: &str = "voiptest";

/// 一次收集的结果
///
/// 持有会话本身，中继测试会继续使用它
pub struct GatherResult {
    /// 按到达顺序排列的候选
    pub candidates: Vec<IceCandidate>,
    /// 收集完成时的本地描述 (包含全部候选)
    pub local_description: SessionDescription,
    pub session: AgentSession,
}

impl GatherResult {
    /// 丢弃结果并关闭会话
    pub async fn close(self) {
        self.session.close().await;
    }
}

/// 使用单个 ICE 服务器收集候选
///
/// `relay_only` 为 true 时只允许中继候选。本函数没有超时，
/// 需要超时时使用 [`gather_within`]
pub async fn gather(
    agent: &dyn IceAgent,
    server_uri: &str,
    username: &str,
    credential: &str,
    relay_only: bool,
) -> Result<GatherResult> {
    gather_within(agent, server_uri, username, credential, relay_only, None).await
}

/// 带可选超时的候选收集
///
/// 收集失败或超时时会话会被关闭
pub async fn gather_within(
    agent: &dyn IceAgent,
    server_uri: &str,
    username: &str,
    credential: &str,
    relay_only: bool,
    limit: Option<Duration>,
) -> Result<GatherResult> {
    let config = IceSessionConfig {
        ice_servers: vec![IceServer {
            urls: vec![server_uri.to_string()],
            username: username.to_string(),
            credential: credential.to_string(),
        }],
        ice_transport_policy: if relay_only {
            IceTransportPolicy::Relay
        } else {
            IceTransportPolicy::All
        },
    };

    debug!("开始收集候选: {} (relay_only={})", server_uri, relay_only);
    let mut session = agent.create_session(config).await?;

    let collected = match limit {
        Some(limit) => tokio::time::timeout(limit, collect(&mut session))
            .await
            .unwrap_or_else(|_| Err(TesterError::GatherTimeout(limit.as_millis() as u64))),
        None => collect(&mut session).await,
    };

    match collected {
        Ok((candidates, local_description)) => {
            debug!("收集完成: {} 个候选", candidates.len());
            Ok(GatherResult {
                candidates,
                local_description,
                session,
            })
        }
        Err(e) => {
            session.close().await;
            Err(e)
        }
    }
}

async fn collect(agent_session: &mut AgentSession) -> Result<(Vec<IceCandidate>, SessionDescription)> {
    let session = Arc::clone(&agent_session.session);
    session.create_data_channel(DATA_CHANNEL_LABEL).await?;

    let mut candidates = Vec::new();
    let mut negotiated = false;

    while let Some(event) = agent_session.events.recv().await {
        match event {
            SessionEvent::NegotiationNeeded if !negotiated => {
                negotiated = true;
                let offer = session.create_offer().await?;
                session.set_local_description(offer).await?;
            }
            SessionEvent::Candidate(Some(candidate)) => {
                debug!("候选: {}", candidate.sdp_line);
                candidates.push(candidate);
            }
            SessionEvent::Candidate(None) => {
                let local = session.local_description().await.ok_or_else(|| {
                    TesterError::Agent("no local description after gathering".to_string())
                })?;
                return Ok((candidates, local));
            }
            other => debug!("收集阶段忽略事件: {:?}", other),
        }
    }

    Err(TesterError::Agent(
        "session ended before candidate gathering completed".to_string(),
    ))
}

//! WebRTC 模块
//!
//! ICE 代理能力的抽象层。测试流程只通过 [`IceAgent`] / [`IceSession`] 驱动 ICE，
//! 实际实现由 webrtc-rs 提供 (见 [`peer_connection`])

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use webrtc::ice::candidate::candidate_base::unmarshal_candidate;
use webrtc::ice::candidate::{Candidate, CandidateType as IceCandidateKind};
use webrtc::ice::network_type::NetworkType;

use crate::error::{Result, TesterError};

pub mod peer_connection;

#[cfg(test)]
pub(crate) mod mock;

pub use peer_connection::RtcIceAgent;

/// ICE 服务器条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// ICE 传输策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IceTransportPolicy {
    /// 使用所有候选
    All,
    /// 仅中继候选
    Relay,
}

/// 创建 ICE 会话所需的配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceSessionConfig {
    pub ice_servers: Vec<IceServer>,
    pub ice_transport_policy: IceTransportPolicy,
}

/// SDP 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// 会话描述 (`{sdp, type}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE 候选类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateType {
    Host,
    Srflx,
    Prflx,
    Relay,
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandidateType::Host => "host",
            CandidateType::Srflx => "srflx",
            CandidateType::Prflx => "prflx",
            CandidateType::Relay => "relay",
        };
        f.write_str(s)
    }
}

/// 候选传输协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateProtocol {
    Udp,
    Tcp,
}

impl fmt::Display for CandidateProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateProtocol::Udp => f.write_str("udp"),
            CandidateProtocol::Tcp => f.write_str("tcp"),
        }
    }
}

/// ICE 候选
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    /// 候选的稳定标识，不是序号
    pub foundation: String,
    /// 1 为 RTP/数据，2 为 RTCP。webrtc-rs 两个都会写进 SDP
    pub component: u16,
    pub candidate_type: CandidateType,
    pub protocol: CandidateProtocol,
    pub address: String,
    pub port: u16,
    /// 原样的 `a=candidate:...` 行
    pub sdp_line: String,
}

impl IceCandidate {
    /// 解析 SDP 候选属性
    ///
    /// 接受 `a=candidate:...` 或 `candidate:...`，由 webrtc-rs 的 ICE 实现解析
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let value = line.strip_prefix("a=").unwrap_or(line);
        let body = value
            .strip_prefix("candidate:")
            .ok_or_else(|| TesterError::MalformedCandidate(line.to_string()))?;

        let parsed = unmarshal_candidate(body)
            .map_err(|e| TesterError::MalformedCandidate(format!("{}: {}", line, e)))?;

        let candidate_type = match parsed.candidate_type() {
            IceCandidateKind::Host => CandidateType::Host,
            IceCandidateKind::ServerReflexive => CandidateType::Srflx,
            IceCandidateKind::PeerReflexive => CandidateType::Prflx,
            IceCandidateKind::Relay => CandidateType::Relay,
            other => {
                return Err(TesterError::MalformedCandidate(format!(
                    "unsupported candidate type {} in {}",
                    other, line
                )))
            }
        };

        // mDNS 主机候选没有确定的网络类型，按 udp 处理
        let protocol = match parsed.network_type() {
            NetworkType::Tcp4 | NetworkType::Tcp6 => CandidateProtocol::Tcp,
            _ => CandidateProtocol::Udp,
        };

        Ok(Self {
            foundation: parsed.foundation(),
            component: parsed.component(),
            candidate_type,
            protocol,
            address: parsed.address(),
            port: parsed.port(),
            sdp_line: format!("a=candidate:{}", body),
        })
    }
}

/// ICE 会话事件
///
/// 回调被转发到每个会话独占的事件通道中
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// 需要协商：调用方应创建并设置本地 offer
    NegotiationNeeded,
    /// 发现候选；`None` 表示候选收集结束
    Candidate(Option<IceCandidate>),
    ChannelOpen,
    ChannelMessage(String),
    ChannelClose,
    ChannelError(String),
}

/// ICE 会话
///
/// 每个会话最多一个数据通道
#[async_trait]
pub trait IceSession: Send + Sync {
    /// 创建数据通道
    async fn create_data_channel(&self, label: &str) -> Result<()>;

    /// 创建 SDP Offer
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// 设置本地 SDP
    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    /// 设置远程 SDP
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// 当前本地 SDP (收集完成后包含全部候选)
    async fn local_description(&self) -> Option<SessionDescription>;

    /// 通过数据通道发送文本
    async fn send_text(&self, text: &str) -> Result<()>;

    /// 关闭数据通道和连接
    async fn close(&self) -> Result<()>;
}

/// 会话句柄及其事件流
pub struct AgentSession {
    pub session: Arc<dyn IceSession>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl AgentSession {
    /// 关闭会话，失败只记录日志
    pub async fn close(&self) {
        if let Err(e) = self.session.close().await {
            tracing::warn!("关闭 ICE 会话失败: {}", e);
        }
    }
}

/// ICE 代理能力
#[async_trait]
pub trait IceAgent: Send + Sync {
    /// 创建一个新的独立会话
    async fn create_session(&self, config: IceSessionConfig) -> Result<AgentSession>;
}

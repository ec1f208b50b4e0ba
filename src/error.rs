//! 错误类型
//!
//! 测试流程中所有可识别的失败，以及写入报告的可序列化失败记录

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::nat::IpVersion;

/// 交互式回声测试失败的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum InteractiveFailure {
    /// 等待期内没有收到回复
    Timeout,
    /// 数据通道在成功之前被关闭
    UnexpectedClose,
    /// 数据通道报告错误
    ChannelError(String),
}

impl fmt::Display for InteractiveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractiveFailure::Timeout => write!(f, "echo test timed out"),
            InteractiveFailure::UnexpectedClose => write!(f, "channel closed unexpectedly"),
            InteractiveFailure::ChannelError(detail) => write!(f, "channel error: {}", detail),
        }
    }
}

/// 测试错误
#[derive(Debug, Error)]
pub enum TesterError {
    #[error("Malformed TURN URI: {0}")]
    MalformedUri(String),

    #[error("Malformed ICE candidate: {0}")]
    MalformedCandidate(String),

    #[error("Can't get TURN credentials from homeserver: {0}")]
    TurnCredentials(String),

    #[error("No TURN servers: {0}")]
    NoTurnServers(String),

    #[error("Bad credentials: {0}")]
    BadCredentials(String),

    #[error("Bad access token: {0}")]
    BadAccessToken(String),

    #[error("Login method not supported, supply an access token instead: {0}")]
    LoginFailure(String),

    #[error("Failed homeserver connection: {0}")]
    HomeserverConnection(String),

    #[error("Unexpected homeserver response: {0}")]
    Homeserver(String),

    #[error("No relay candidate for {0}")]
    NoRelayCandidate(IpVersion),

    #[error("Failed to doctor the SDP: {0}")]
    DoctorSdp(String),

    #[error("Invalid offer: {0}")]
    InvalidOffer(String),

    #[error("{status} when contacting testing service")]
    ServiceRequest { status: u16 },

    #[error("Testing service unreachable: {0}")]
    ServiceUnreachable(String),

    #[error("Malformed testing service response: {0}")]
    MalformedResponse(String),

    #[error("Interactive test failed: {0}")]
    InteractiveTestFail(InteractiveFailure),

    #[error("ICE gathering timed out after {0} ms")]
    GatherTimeout(u64),

    #[error("ICE agent error: {0}")]
    Agent(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, TesterError>;

/// 写入报告的失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeErrorKind {
    NoRelayCandidate,
    DoctorSdp { message: String },
    ServiceRequest { status: u16 },
    ServiceUnreachable { message: String },
    InteractiveTestFail { failure: InteractiveFailure },
    Gather { message: String },
    Agent { message: String },
}

impl ProbeErrorKind {
    /// 把单次中继探测的失败转换为报告记录
    ///
    /// 返回 `None` 表示这是结构性错误 (例如测试服务返回了无法解析的 JSON)，
    /// 应当继续向上传播而不是记录为失败
    pub fn from_probe_error(error: &TesterError) -> Option<Self> {
        let kind = match error {
            TesterError::NoRelayCandidate(_) => ProbeErrorKind::NoRelayCandidate,
            TesterError::DoctorSdp(message) => ProbeErrorKind::DoctorSdp {
                message: message.clone(),
            },
            TesterError::ServiceRequest { status } => {
                ProbeErrorKind::ServiceRequest { status: *status }
            }
            TesterError::ServiceUnreachable(message) => ProbeErrorKind::ServiceUnreachable {
                message: message.clone(),
            },
            TesterError::InteractiveTestFail(failure) => ProbeErrorKind::InteractiveTestFail {
                failure: failure.clone(),
            },
            TesterError::GatherTimeout(_) => ProbeErrorKind::Gather {
                message: error.to_string(),
            },
            TesterError::Agent(message) => ProbeErrorKind::Agent {
                message: message.clone(),
            },
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeErrorKind::NoRelayCandidate => write!(f, "no relay candidate"),
            ProbeErrorKind::DoctorSdp { message } => write!(f, "failed to doctor SDP: {}", message),
            ProbeErrorKind::ServiceRequest { status } => {
                write!(f, "{} when contacting testing service", status)
            }
            ProbeErrorKind::ServiceUnreachable { message } => {
                write!(f, "testing service unreachable: {}", message)
            }
            ProbeErrorKind::InteractiveTestFail { failure } => write!(f, "{}", failure),
            ProbeErrorKind::Gather { message } => write!(f, "gathering failed: {}", message),
            ProbeErrorKind::Agent { message } => write!(f, "ICE agent error: {}", message),
        }
    }
}

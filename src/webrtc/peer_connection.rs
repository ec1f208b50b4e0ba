//! WebRTC PeerConnection 实现
//!
//! 使用 webrtc-rs 库实现 ICE 代理能力

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use webrtc::{
    api::{APIBuilder, API},
    data_channel::{data_channel_message::DataChannelMessage, RTCDataChannel},
    ice_transport::{
        ice_candidate::RTCIceCandidate, ice_candidate_type::RTCIceCandidateType,
        ice_protocol::RTCIceProtocol, ice_server::RTCIceServer,
    },
    peer_connection::{
        configuration::RTCConfiguration,
        policy::ice_transport_policy::RTCIceTransportPolicy,
        sdp::{sdp_type::RTCSdpType, session_description::RTCSessionDescription},
        RTCPeerConnection,
    },
};

use super::{
    AgentSession, CandidateProtocol, CandidateType, IceAgent, IceCandidate, IceSession,
    IceSessionConfig, IceTransportPolicy, SdpType, SessionDescription, SessionEvent,
};
use crate::error::{Result, TesterError};

fn agent_error(context: &'static str) -> impl FnOnce(webrtc::Error) -> TesterError {
    move |e| TesterError::Agent(format!("{}: {}", context, e))
}

/// 转换为 webrtc-rs 的会话描述
pub(crate) fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    let SessionDescription { sdp_type, sdp } = description;
    match sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(sdp).map_err(agent_error("创建 Offer SessionDescription 失败")),
        SdpType::Answer => RTCSessionDescription::answer(sdp).map_err(agent_error("创建 Answer SessionDescription 失败")),
        SdpType::Pranswer => RTCSessionDescription::pranswer(sdp).map_err(agent_error("创建 SessionDescription 失败")),
        SdpType::Rollback => Err(TesterError::Agent("不支持 rollback".to_string())),
    }
}

/// 从 webrtc-rs 的会话描述转换
pub(crate) fn from_rtc_description(description: RTCSessionDescription) -> SessionDescription {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Offer | RTCSdpType::Unspecified => SdpType::Offer,
    };
    SessionDescription {
        sdp_type,
        sdp: description.sdp,
    }
}

fn convert_candidate(candidate: &RTCIceCandidate) -> Result<IceCandidate> {
    let candidate_type = match candidate.typ {
        RTCIceCandidateType::Host => CandidateType::Host,
        RTCIceCandidateType::Srflx => CandidateType::Srflx,
        RTCIceCandidateType::Prflx => CandidateType::Prflx,
        RTCIceCandidateType::Relay => CandidateType::Relay,
        RTCIceCandidateType::Unspecified => {
            return Err(TesterError::MalformedCandidate(format!(
                "候选 {} 类型未知",
                candidate.foundation
            )))
        }
    };
    let protocol = match candidate.protocol {
        RTCIceProtocol::Tcp => CandidateProtocol::Tcp,
        _ => CandidateProtocol::Udp,
    };

    let init = candidate
        .to_json()
        .map_err(agent_error("序列化 ICE 候选失败"))?;

    Ok(IceCandidate {
        foundation: candidate.foundation.clone(),
        component: candidate.component,
        candidate_type,
        protocol,
        address: candidate.address.clone(),
        port: candidate.port,
        sdp_line: format!("a={}", init.candidate),
    })
}

/// 基于 webrtc-rs 的 ICE 代理
pub struct RtcIceAgent {
    api: API,
}

impl RtcIceAgent {
    /// 创建新的代理
    pub fn new() -> Self {
        Self {
            api: APIBuilder::new().build(),
        }
    }
}

impl Default for RtcIceAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IceAgent for RtcIceAgent {
    async fn create_session(&self, config: IceSessionConfig) -> Result<AgentSession> {
        let ice_servers = config
            .ice_servers
            .into_iter()
            .map(|server| RTCIceServer {
                urls: server.urls,
                username: server.username,
                credential: server.credential,
                ..Default::default()
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ice_transport_policy: match config.ice_transport_policy {
                IceTransportPolicy::All => RTCIceTransportPolicy::All,
                IceTransportPolicy::Relay => RTCIceTransportPolicy::Relay,
            },
            ..Default::default()
        };

        let pc = Arc::new(
            self.api
                .new_peer_connection(rtc_config)
                .await
                .map_err(agent_error("创建 PeerConnection 失败"))?,
        );

        let (tx, rx) = mpsc::unbounded_channel();

        let negotiation_tx = tx.clone();
        pc.on_negotiation_needed(Box::new(move || {
            let _ = negotiation_tx.send(SessionEvent::NegotiationNeeded);
            Box::pin(async {})
        }));

        let candidate_tx = tx.clone();
        pc.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            match c {
                Some(c) => match convert_candidate(&c) {
                    Ok(candidate) => {
                        let _ = candidate_tx.send(SessionEvent::Candidate(Some(candidate)));
                    }
                    Err(e) => tracing::warn!("忽略无法识别的 ICE 候选: {}", e),
                },
                None => {
                    let _ = candidate_tx.send(SessionEvent::Candidate(None));
                }
            }
            Box::pin(async {})
        }));

        tracing::debug!("创建 RtcIceSession");

        Ok(AgentSession {
            session: Arc::new(RtcIceSession {
                pc,
                events: tx,
                data_channel: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
            events: rx,
        })
    }
}

/// 基于 RTCPeerConnection 的 ICE 会话
pub struct RtcIceSession {
    pc: Arc<RTCPeerConnection>,
    events: mpsc::UnboundedSender<SessionEvent>,
    data_channel: Mutex<Option<Arc<RTCDataChannel>>>,
    closed: AtomicBool,
}

impl RtcIceSession {
    fn forward_channel_events(&self, dc: &RTCDataChannel) {
        let open_tx = self.events.clone();
        dc.on_open(Box::new(move || {
            let _ = open_tx.send(SessionEvent::ChannelOpen);
            Box::pin(async {})
        }));

        let message_tx = self.events.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            if msg.is_string {
                let text = String::from_utf8_lossy(&msg.data).into_owned();
                let _ = message_tx.send(SessionEvent::ChannelMessage(text));
            } else {
                tracing::debug!("忽略二进制消息: {} 字节", msg.data.len());
            }
            Box::pin(async {})
        }));

        let close_tx = self.events.clone();
        dc.on_close(Box::new(move || {
            let _ = close_tx.send(SessionEvent::ChannelClose);
            Box::pin(async {})
        }));

        let error_tx = self.events.clone();
        dc.on_error(Box::new(move |err: webrtc::Error| {
            let _ = error_tx.send(SessionEvent::ChannelError(err.to_string()));
            Box::pin(async {})
        }));
    }
}

#[async_trait]
impl IceSession for RtcIceSession {
    async fn create_data_channel(&self, label: &str) -> Result<()> {
        let dc = self
            .pc
            .create_data_channel(label, None)
            .await
            .map_err(agent_error("创建数据通道失败"))?;

        self.forward_channel_events(&dc);
        *self.data_channel.lock().await = Some(dc);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(agent_error("创建 Offer 失败"))?;
        Ok(from_rtc_description(offer))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(agent_error("设置本地描述失败"))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(agent_error("设置远程描述失败"))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc.local_description().await.map(from_rtc_description)
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        let dc = self.data_channel.lock().await;
        let Some(dc) = dc.as_ref() else {
            return Err(TesterError::Agent("数据通道未创建".to_string()));
        };
        dc.send_text(text.to_string())
            .await
            .map_err(agent_error("发送数据失败"))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(dc) = self.data_channel.lock().await.take() {
            if let Err(e) = dc.close().await {
                tracing::debug!("关闭数据通道失败: {}", e);
            }
        }

        self.pc
            .close()
            .await
            .map_err(agent_error("关闭 PeerConnection 失败"))
    }
}

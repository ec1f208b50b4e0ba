//! 回声测试服务
//!
//! 接受只含单个候选的 offer，返回 answer，并在建立的数据通道上
//! 回答魔法问题。测试端据此确认中继地址端到端可用

pub mod server;

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::{
    api::{APIBuilder, API},
    data_channel::{data_channel_message::DataChannelMessage, RTCDataChannel},
    peer_connection::{configuration::RTCConfiguration, RTCPeerConnection},
};

use crate::error::{Result, TesterError};
use crate::sdp;
use crate::webrtc::peer_connection::{from_rtc_description, to_rtc_description};
use crate::webrtc::{IceCandidate, SdpType, SessionDescription};

/// 测试端发送的问题
pub const MAGIC_QUESTION: &str = "Hello? Is this on?";

/// 服务端的回答
pub const MAGIC_ANSWER: &str = "Yes; yes, it is! :^)";

/// 每个测试连接的最长存活时间
pub const CONNECTION_TTL: Duration = Duration::from_secs(300);

/// `POST /v1/test_me` 请求体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMeRequest {
    pub offer: SessionDescription,
    /// 可选：要保留的候选。提供时服务端先自行改写 offer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
}

/// `POST /v1/test_me` 响应体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMeResponse {
    pub answer: SessionDescription,
}

/// 回声应答方
pub struct EchoResponder {
    api: API,
    connection_ttl: Duration,
}

impl EchoResponder {
    pub fn new() -> Self {
        Self::with_ttl(CONNECTION_TTL)
    }

    pub fn with_ttl(connection_ttl: Duration) -> Self {
        Self {
            api: APIBuilder::new().build(),
            connection_ttl,
        }
    }

    /// 校验请求并得到待应答的 offer
    pub fn prepare_offer(request: TestMeRequest) -> Result<SessionDescription> {
        let TestMeRequest { offer, candidate } = request;
        if offer.sdp_type != SdpType::Offer {
            return Err(TesterError::InvalidOffer(format!(
                "expected an offer, got {:?}",
                offer.sdp_type
            )));
        }

        let offer = match candidate {
            Some(line) => {
                let wanted = IceCandidate::parse(&line)
                    .map_err(|e| TesterError::InvalidOffer(e.to_string()))?;
                let sdp = sdp::isolate(&offer.sdp, &wanted)
                    .map_err(|e| TesterError::InvalidOffer(e.to_string()))?;
                SessionDescription::offer(sdp)
            }
            None => offer,
        };

        sdp::check_isolated(&offer.sdp)?;
        Ok(offer)
    }

    /// 为 offer 创建应答连接并返回 answer
    ///
    /// 协商成功的连接在存活时间到期后关闭，失败的连接立即关闭
    pub async fn answer(&self, request: TestMeRequest) -> Result<SessionDescription> {
        let offer = to_rtc_description(Self::prepare_offer(request)?)?;
        let test_id = Uuid::new_v4();
        info!("[{}] 开始回声测试", test_id);

        let pc = Arc::new(
            self.api
                .new_peer_connection(RTCConfiguration::default())
                .await
                .map_err(|e| TesterError::Agent(format!("创建 PeerConnection 失败: {}", e)))?,
        );

        let pc_weak = Arc::downgrade(&pc);
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            debug!("[{}] 建立数据通道: {}", test_id, dc.label());
            attach_echo(&dc, pc_weak.clone(), test_id);
            Box::pin(async {})
        }));

        let result = negotiate(&pc, offer).await;
        self.settle(&pc, result, test_id).await
    }

    /// 协商失败立即关闭连接；成功则在存活时间到期后关闭
    async fn settle(
        &self,
        pc: &Arc<RTCPeerConnection>,
        result: Result<SessionDescription>,
        test_id: Uuid,
    ) -> Result<SessionDescription> {
        if let Err(e) = &result {
            warn!("[{}] 协商失败: {}", test_id, e);
            if let Err(close_err) = pc.close().await {
                debug!("关闭测试连接失败: {}", close_err);
            }
            return result;
        }

        let ttl = self.connection_ttl;
        let expiring = Arc::clone(pc);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            debug!("[{}] 测试连接到期，关闭", test_id);
            if let Err(e) = expiring.close().await {
                warn!("关闭测试连接失败: {}", e);
            }
        });

        result
    }
}

impl Default for EchoResponder {
    fn default() -> Self {
        Self::new()
    }
}

async fn negotiate(
    pc: &RTCPeerConnection,
    offer: webrtc::peer_connection::sdp::session_description::RTCSessionDescription,
) -> Result<SessionDescription> {
    let agent_error = |context: &str, e: webrtc::Error| TesterError::Agent(format!("{}: {}", context, e));

    pc.set_remote_description(offer)
        .await
        .map_err(|e| agent_error("设置远程描述失败", e))?;

    let answer = pc
        .create_answer(None)
        .await
        .map_err(|e| agent_error("创建 Answer 失败", e))?;

    let mut gathering_done = pc.gathering_complete_promise().await;
    pc.set_local_description(answer)
        .await
        .map_err(|e| agent_error("设置本地描述失败", e))?;
    let _ = gathering_done.recv().await;

    pc.local_description()
        .await
        .map(from_rtc_description)
        .ok_or_else(|| TesterError::Agent("no local description after gathering".to_string()))
}

/// 在数据通道上回答魔法问题，其它消息会关闭通道和连接
fn attach_echo(dc: &Arc<RTCDataChannel>, pc: Weak<RTCPeerConnection>, test_id: Uuid) {
    let dc_weak = Arc::downgrade(dc);
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let dc = dc_weak.clone();
        let pc = pc.clone();
        Box::pin(async move {
            let Some(dc) = dc.upgrade() else {
                return;
            };

            if msg.is_string && msg.data.as_ref() == MAGIC_QUESTION.as_bytes() {
                match dc.send_text(MAGIC_ANSWER.to_string()).await {
                    Ok(_) => info!("[{}] 已回答", test_id),
                    Err(e) => warn!("[{}] 发送回答失败: {}", test_id, e),
                }
                return;
            }

            debug!("[{}] 收到意外消息，关闭连接", test_id);
            if let Err(e) = dc.close().await {
                debug!("关闭数据通道失败: {}", e);
            }
            if let Some(pc) = pc.upgrade() {
                if let Err(e) = pc.close().await {
                    debug!("关闭连接失败: {}", e);
                }
            }
        })
    }));
}

//! 脚本化的 ICE 代理，供单元测试使用

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{
    AgentSession, CandidateType, IceAgent, IceCandidate, IceSession, IceSessionConfig,
    SessionDescription, SessionEvent,
};
use crate::echo::{MAGIC_ANSWER, MAGIC_QUESTION};
use crate::error::{Result, TesterError};

const SDP_HEADER: &str = "v=0\r\no=- 4215775240449105457 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\na=group:BUNDLE 0\r\nm=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\nc=IN IP4 0.0.0.0\r\na=mid:0\r\na=sctp-port:5000\r\n";

/// 构造测试候选
pub(crate) fn candidate(foundation: &str, typ: CandidateType, address: &str, port: u16) -> IceCandidate {
    let line = format!(
        "a=candidate:{} 1 udp 2130706431 {} {} typ {}",
        foundation, address, port, typ
    );
    match IceCandidate::parse(&line) {
        Ok(c) => c,
        Err(e) => panic!("bad test candidate {}: {}", line, e),
    }
}

/// 收集阶段的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gathering {
    /// 发出全部候选后发送收集结束标记
    Complete,
    /// 发出全部候选后不再有任何事件
    Hang,
    /// 发出全部候选后事件流结束
    Abort,
}

/// 远端 (回声服务) 的行为
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Remote {
    /// 打开通道并回答魔法问题
    Echo,
    /// 打开通道但回复错误内容
    WrongAnswer,
    /// 打开通道后立即关闭
    Close,
    /// 打开通道后报告错误
    Error(String),
    /// 什么也不做
    Silent,
}

/// 单个会话的脚本
#[derive(Debug, Clone)]
pub(crate) struct Script {
    pub candidates: Vec<IceCandidate>,
    pub gathering: Gathering,
    pub remote: Remote,
}

impl Script {
    pub fn new(candidates: Vec<IceCandidate>) -> Self {
        Self {
            candidates,
            gathering: Gathering::Complete,
            remote: Remote::Echo,
        }
    }

    pub fn gathering(mut self, gathering: Gathering) -> Self {
        self.gathering = gathering;
        self
    }

    pub fn remote(mut self, remote: Remote) -> Self {
        self.remote = remote;
        self
    }
}

/// 脚本化会话
pub(crate) struct FakeSession {
    pub config: IceSessionConfig,
    script: Script,
    tx: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
    local: Mutex<Option<SessionDescription>>,
    pub remote: Mutex<Option<SessionDescription>>,
    pub sent: Mutex<Vec<String>>,
    pub channels: Mutex<Vec<String>>,
    close_calls: AtomicUsize,
}

impl FakeSession {
    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IceSession for FakeSession {
    async fn create_data_channel(&self, label: &str) -> Result<()> {
        self.channels.lock().unwrap().push(label.to_string());
        self.emit(SessionEvent::NegotiationNeeded);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer(SDP_HEADER))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        // 与 webrtc-rs 一致：每个候选写出 component 1 和 component 2 两行
        let mut sdp = description.sdp.clone();
        for c in &self.script.candidates {
            let rtcp_line = c.sdp_line.replacen(
                &format!("a=candidate:{} 1 ", c.foundation),
                &format!("a=candidate:{} 2 ", c.foundation),
                1,
            );
            for line in [&c.sdp_line, &rtcp_line] {
                sdp.push_str(line);
                sdp.push_str("\r\n");
            }
        }
        *self.local.lock().unwrap() = Some(SessionDescription {
            sdp_type: description.sdp_type,
            sdp,
        });

        for c in &self.script.candidates {
            self.emit(SessionEvent::Candidate(Some(c.clone())));
        }
        match self.script.gathering {
            Gathering::Complete => self.emit(SessionEvent::Candidate(None)),
            Gathering::Hang => {}
            Gathering::Abort => {
                self.tx.lock().unwrap().take();
            }
        }
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        *self.remote.lock().unwrap() = Some(description);
        match &self.script.remote {
            Remote::Echo | Remote::WrongAnswer => self.emit(SessionEvent::ChannelOpen),
            Remote::Close => {
                self.emit(SessionEvent::ChannelOpen);
                self.emit(SessionEvent::ChannelClose);
            }
            Remote::Error(detail) => {
                self.emit(SessionEvent::ChannelOpen);
                self.emit(SessionEvent::ChannelError(detail.clone()));
            }
            Remote::Silent => {}
        }
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        if text == MAGIC_QUESTION {
            match self.script.remote {
                Remote::Echo => self.emit(SessionEvent::ChannelMessage(MAGIC_ANSWER.to_string())),
                Remote::WrongAnswer => {
                    self.emit(SessionEvent::ChannelMessage("No.".to_string()))
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 按顺序为每个新会话分配脚本的代理
#[derive(Default)]
pub(crate) struct FakeAgent {
    scripts: Mutex<VecDeque<Script>>,
    pub sessions: Mutex<Vec<Arc<FakeSession>>>,
    fail_creation: bool,
}

impl FakeAgent {
    pub fn with_scripts(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        }
    }

    /// 每次创建会话都失败的代理
    pub fn failing() -> Self {
        Self {
            fail_creation: true,
            ..Default::default()
        }
    }

    pub fn session(&self, index: usize) -> Arc<FakeSession> {
        Arc::clone(&self.sessions.lock().unwrap()[index])
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl IceAgent for FakeAgent {
    async fn create_session(&self, config: IceSessionConfig) -> Result<AgentSession> {
        if self.fail_creation {
            return Err(TesterError::Agent("invalid ICE server".to_string()));
        }

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::new(Vec::new()));

        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(FakeSession {
            config,
            script,
            tx: Mutex::new(Some(tx)),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
        });
        self.sessions.lock().unwrap().push(Arc::clone(&session));

        Ok(AgentSession {
            session,
            events: rx,
        })
    }
}

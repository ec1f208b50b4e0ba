//! turncheck - STUN/TURN 配置测试库
//!
//! 对每个 IP 版本、每个 TURN URI 收集 ICE 候选并测试中继是否端到端可用，
//! 最后给出 NAT 穿透能力评级 (Excellent/Great/Good/Poor/Fail)

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

// NAT 穿透评估
pub mod nat;

// SDP 处理
pub mod sdp;

// TURN 配置来源
pub mod turn;

// ICE 代理 (webrtc-rs)
pub mod webrtc;

// 测试流程
pub mod tester;

pub mod report;

// 回声测试服务
pub mod echo;

// 命令行工具模块
pub mod tools;

pub use error::{Result, TesterError};
pub use report::TestReport;
pub use tester::{TestOptions, Tester};

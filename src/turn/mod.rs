//! TURN 配置
//!
//! TURN 服务器列表及其共享凭据的来源

pub mod homeserver;
pub mod uri;

pub use homeserver::HomeserverClient;
pub use uri::{ParsedTurnUri, TurnScheme, TurnTransport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TesterError};

/// 一次测试使用的 TURN 配置
///
/// 与 Matrix `/voip/turnServer` 的响应格式一致，`password` 作为 `credential` 的别名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnConfig {
    pub username: String,
    #[serde(alias = "password", skip_serializing)]
    pub credential: String,
    pub uris: Vec<String>,
    /// 凭据有效期 (秒)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl TurnConfig {
    /// 拒绝空的 URI 列表
    pub fn ensure_servers(self) -> Result<Self> {
        if self.uris.is_empty() {
            return Err(TesterError::NoTurnServers(
                "empty `uris` list in TURN configuration".to_string(),
            ));
        }
        Ok(self)
    }
}

/// TURN 配置来源
#[async_trait]
pub trait TurnConfigProvider: Send + Sync {
    /// 获取 TURN 配置
    ///
    /// URI 列表为空时返回 `NoTurnServers`
    async fn get_turn_config(&self) -> Result<TurnConfig>;
}

/// 固定的 TURN 配置 (来自配置文件或命令行)
#[derive(Debug, Clone)]
pub struct StaticTurnConfig {
    config: TurnConfig,
}

impl StaticTurnConfig {
    pub fn new(config: TurnConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TurnConfigProvider for StaticTurnConfig {
    async fn get_turn_config(&self) -> Result<TurnConfig> {
        self.config.clone().ensure_servers()
    }
}

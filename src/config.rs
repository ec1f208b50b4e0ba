//! 配置管理模块
//!
//! 负责加载和管理测试配置

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::nat::IpVersion;
use crate::tester::TestOptions;
use crate::turn::TurnConfig;

/// 配置文件名
const CONFIG_FILE: &str = "turncheck.toml";

/// 应用程序配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Matrix 主服务器 (TURN 凭据来源)
    #[serde(default)]
    pub homeserver: HomeserverConfig,
    #[serde(default)]
    pub tester: TesterConfig,
    /// 固定 TURN 配置，不经过主服务器
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<StaticTurnSection>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 主服务器配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HomeserverConfig {
    /// 主服务器地址，例如 https://matrix.example.org
    #[serde(default)]
    pub url: Option<String>,
    /// 访问令牌 (推荐通过环境变量设置: TURNCHECK_ACCESS_TOKEN)
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// 密码 (推荐通过环境变量设置: TURNCHECK_PASSWORD)
    #[serde(default)]
    pub password: Option<String>,
}

/// 测试配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TesterConfig {
    /// 回声服务 `/v1/test_me` 地址
    #[serde(default = "default_service_url")]
    pub service_url: String,
    /// 回声等待时间 (毫秒)
    #[serde(default = "default_echo_timeout_ms")]
    pub echo_timeout_ms: u64,
    /// 单次收集超时 (毫秒)，0 表示不限制
    #[serde(default = "default_gather_timeout_ms")]
    pub gather_timeout_ms: u64,
    /// 测试的 IP 版本
    #[serde(default = "default_ip_versions")]
    pub ip_versions: Vec<IpVersion>,
}

/// 固定 TURN 配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StaticTurnSection {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub credential: String,
    pub uris: Vec<String>,
}

impl From<StaticTurnSection> for TurnConfig {
    fn from(section: StaticTurnSection) -> Self {
        TurnConfig {
            username: section.username,
            credential: section.credential,
            uris: section.uris,
            ttl: None,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for TesterConfig {
    fn default() -> Self {
        TesterConfig {
            service_url: default_service_url(),
            echo_timeout_ms: default_echo_timeout_ms(),
            gather_timeout_ms: default_gather_timeout_ms(),
            ip_versions: default_ip_versions(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

fn default_service_url() -> String {
    "http://127.0.0.1:8080/v1/test_me".to_string()
}

fn default_echo_timeout_ms() -> u64 {
    150_000
}

fn default_gather_timeout_ms() -> u64 {
    60_000
}

fn default_ip_versions() -> Vec<IpVersion> {
    IpVersion::ALL.to_vec()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TesterConfig {
    /// 转换为测试选项
    pub fn options(&self) -> TestOptions {
        TestOptions {
            echo_timeout: Duration::from_millis(self.echo_timeout_ms),
            gather_timeout: match self.gather_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            ip_versions: self.ip_versions.clone(),
        }
    }
}

impl Config {
    /// 从文件加载配置
    ///
    /// 如果文件不存在，返回默认配置
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!("配置文件不存在: {:?}, 使用默认配置", path);
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("配置文件解析失败: {}", e))?;

        tracing::info!("配置加载成功: {:?}", path);
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// 获取配置文件路径
    ///
    /// 优先级: 命令行指定 > 当前目录 > 用户主目录
    pub fn get_config_path(cli_path: Option<&str>) -> String {
        if let Some(p) = cli_path {
            return p.to_string();
        }

        if Path::new(CONFIG_FILE).exists() {
            return CONFIG_FILE.to_string();
        }

        if let Ok(home) = std::env::var("HOME") {
            let config_path = format!("{}/.config/turncheck/{}", home, CONFIG_FILE);
            if Path::new(&config_path).exists() {
                return config_path;
            }
        }

        CONFIG_FILE.to_string()
    }
}

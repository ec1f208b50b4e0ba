//! CLI argument definitions for turncheck
//!
//! This module contains all command-line argument parsing logic.

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::nat::IpVersion;

/// turncheck - 命令行参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// 日志级别 (0=warn, 1=info, 2=debug, 3=trace)
    #[arg(short, long, global = true)]
    pub verbose: Option<u8>,
}

/// 子命令
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 运行完整的 STUN/TURN 测试
    Test(TestArgs),

    /// 解析 TURN URI 并显示其特性标志
    ParseUri {
        /// TURN URI，例如 turns:turn.example.com:443?transport=tcp
        uri: String,
    },

    /// 生成配置文件
    Config {
        /// 配置文件路径
        #[arg(short, long)]
        path: Option<String>,
    },
}

/// `test` 子命令参数，覆盖配置文件中的值
#[derive(ClapArgs, Debug, Default)]
pub struct TestArgs {
    /// Matrix 主服务器地址
    #[arg(long, env = "TURNCHECK_HOMESERVER")]
    pub homeserver: Option<String>,

    /// 访问令牌
    #[arg(long, env = "TURNCHECK_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// 用户 ID (密码登录)
    #[arg(long, env = "TURNCHECK_USER_ID")]
    pub user_id: Option<String>,

    /// 密码
    #[arg(long, env = "TURNCHECK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// 回声服务地址
    #[arg(long, env = "TURNCHECK_SERVICE_URL")]
    pub service_url: Option<String>,

    /// 直接测试的 TURN URI (可重复)，不经过主服务器
    #[arg(long = "uri")]
    pub uris: Vec<String>,

    /// 与 --uri 一起使用的 TURN 用户名
    #[arg(long)]
    pub username: Option<String>,

    /// 与 --uri 一起使用的 TURN 凭据
    #[arg(long, env = "TURNCHECK_TURN_CREDENTIAL", hide_env_values = true)]
    pub credential: Option<String>,

    /// 回声等待时间 (毫秒)
    #[arg(long)]
    pub echo_timeout_ms: Option<u64>,

    /// 单次收集超时 (毫秒)，0 表示不限制
    #[arg(long)]
    pub gather_timeout_ms: Option<u64>,

    /// 只测试指定的 IP 版本 (可重复: ipv4 / ipv6)
    #[arg(long = "ip-version")]
    pub ip_versions: Vec<IpVersion>,

    /// 以 JSON 输出报告
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_test_command() {
        let args = Args::try_parse_from([
            "turncheck",
            "-v",
            "2",
            "test",
            "--uri",
            "turn:turn.example.com:3478",
            "--uri",
            "turns:turn.example.com:443?transport=tcp",
            "--ip-version",
            "ipv6",
            "--json",
        ])
        .unwrap();

        assert_eq!(args.verbose, Some(2));
        let Commands::Test(test) = args.command else {
            panic!("expected test command");
        };
        assert_eq!(test.uris.len(), 2);
        assert_eq!(test.ip_versions, vec![IpVersion::V6]);
        assert!(test.json);
    }

    #[test]
    fn test_parse_uri_command() {
        let args = Args::try_parse_from(["turncheck", "parse-uri", "turn:example.com:3478"]).unwrap();
        assert!(matches!(args.command, Commands::ParseUri { ref uri } if uri == "turn:example.com:3478"));
    }
}

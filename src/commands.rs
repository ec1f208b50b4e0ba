//! Command handlers for turncheck
//!
//! This module contains handlers for the test and utility commands.

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::fmt::MakeWriter;

use crate::cli::TestArgs;
use crate::config::{Config, StaticTurnSection};
use crate::tester::{HttpEchoService, Tester};
use crate::tools;
use crate::turn::{HomeserverClient, StaticTurnConfig, TurnConfigProvider};
use crate::webrtc::RtcIceAgent;

/// 把 `-v` 级别映射为日志级别
pub fn verbosity_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialize logging with the specified level
pub fn init_logging(level: Level) {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(level)
        .init();
}

/// 在全局日志初始化之前加载配置
///
/// 日志级别来自配置文件本身时使用。加载期间挂一个临时的 WARN 级订阅者，
/// 配置文件不存在之类的警告照常输出
pub fn load_config_early<W>(path: &str, writer: W) -> Result<Config>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(Level::WARN)
        .with_writer(writer)
        .finish();
    tracing::subscriber::with_default(bootstrap, || Config::load(path))
}

/// 命令行参数覆盖配置文件
pub fn apply_overrides(config: &mut Config, args: &TestArgs) {
    let homeserver = &mut config.homeserver;
    if let Some(ref url) = args.homeserver {
        homeserver.url = Some(url.clone());
    }
    if let Some(ref token) = args.access_token {
        homeserver.access_token = Some(token.clone());
    }
    if let Some(ref user_id) = args.user_id {
        homeserver.user_id = Some(user_id.clone());
    }
    if let Some(ref password) = args.password {
        homeserver.password = Some(password.clone());
    }

    let tester = &mut config.tester;
    if let Some(ref url) = args.service_url {
        tester.service_url = url.clone();
    }
    if let Some(ms) = args.echo_timeout_ms {
        tester.echo_timeout_ms = ms;
    }
    if let Some(ms) = args.gather_timeout_ms {
        tester.gather_timeout_ms = ms;
    }
    if !args.ip_versions.is_empty() {
        tester.ip_versions = args.ip_versions.clone();
    }

    if !args.uris.is_empty() {
        config.turn = Some(StaticTurnSection {
            username: args.username.clone().unwrap_or_default(),
            credential: args.credential.clone().unwrap_or_default(),
            uris: args.uris.clone(),
        });
    }
}

/// 选择 TURN 配置来源
///
/// 固定 TURN 配置优先；否则登录主服务器
pub async fn turn_provider(config: &Config) -> Result<Box<dyn TurnConfigProvider>> {
    if let Some(ref turn) = config.turn {
        info!("使用固定 TURN 配置 ({} 个 URI)", turn.uris.len());
        return Ok(Box::new(StaticTurnConfig::new(turn.clone().into())));
    }

    let homeserver = &config.homeserver;
    let url = homeserver
        .url
        .as_deref()
        .ok_or_else(|| anyhow!("未配置 TURN 来源: 需要 --homeserver 或 --uri"))?;

    let mut client = HomeserverClient::new(url)?;
    match (&homeserver.access_token, &homeserver.user_id, &homeserver.password) {
        (Some(token), _, _) => client.login_with_access_token(token).await?,
        (None, Some(user_id), Some(password)) => {
            client.login_with_password(user_id, password).await?
        }
        _ => return Err(anyhow!("需要访问令牌，或者用户 ID 和密码")),
    }

    info!("已登录主服务器: {}", url);
    Ok(Box::new(client))
}

/// Handle test command
pub async fn handle_test(mut config: Config, args: TestArgs) -> Result<()> {
    apply_overrides(&mut config, &args);

    let provider = turn_provider(&config).await?;
    let echo = Arc::new(HttpEchoService::new(&config.tester.service_url)?);
    let tester = Tester::new(
        Arc::new(RtcIceAgent::new()),
        echo,
        config.tester.options(),
    );

    let report = tester.run(provider.as_ref()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", tools::format_report(&report));
    }

    if let Some((version, verdict)) = tools::worst_verdict(&report) {
        info!("最低评级: {} ({})", verdict, version);
    }

    Ok(())
}

/// Handle parse-uri command
pub fn handle_parse_uri(uri: &str) -> Result<()> {
    print!("{}", tools::format_parsed_uri(uri));
    Ok(())
}

/// Handle generate config command
pub fn handle_generate_config(path: Option<String>) -> Result<()> {
    let path = PathBuf::from(path.unwrap_or_else(|| Config::get_config_path(None)));

    if path.exists() {
        return Err(anyhow!("配置文件已存在: {}", path.display()));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    Config::default().save(&path)?;
    println!("配置文件已生成: {}", path.display());
    Ok(())
}

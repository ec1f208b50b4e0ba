//! turncheck 回声测试服务
//!
//! 测试端把只含单个中继候选的 offer 提交到这里，服务端应答并在数据通道上
//! 回答魔法问题
//!
//! # 运行方式
//!
//! ```bash
//! turncheck-echo --host 0.0.0.0 --port 8080
//! ```
//!
//! # API 端点
//!
//! - `POST /v1/test_me` - 提交 offer，返回 answer
//! - `GET /health` - 健康检查

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use turncheck::echo::{server, EchoResponder, CONNECTION_TTL};

/// turncheck 回声测试服务
#[derive(Parser, Debug)]
#[command(name = "turncheck-echo")]
#[command(about = "turncheck 回声测试服务")]
#[command(version)]
struct Args {
    /// 监听主机地址
    #[arg(long, default_value = "0.0.0.0", env = "TURNCHECK_ECHO_HOST")]
    host: String,

    /// 监听端口
    #[arg(short, long, default_value = "8080", env = "TURNCHECK_ECHO_PORT")]
    port: u16,

    /// 测试连接的最长存活时间 (秒)
    #[arg(long, default_value_t = CONNECTION_TTL.as_secs())]
    ttl: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let responder = Arc::new(EchoResponder::with_ttl(Duration::from_secs(args.ttl)));
    let app = server::router(responder);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    tracing::info!("turncheck 回声测试服务");
    tracing::info!("监听地址: http://{}", addr);
    tracing::info!("测试端点: http://{}/v1/test_me", addr);
    tracing::info!("健康检查: http://{}/health", addr);

    // 启动服务器
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

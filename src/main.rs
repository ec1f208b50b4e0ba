//! turncheck - STUN/TURN 配置测试工具
//!
//! 主入口程序

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};

use turncheck::cli::{Args, Commands};
use turncheck::commands;
use turncheck::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志后加载配置: -v 优先于配置文件
    let config_path = Config::get_config_path(args.config.as_deref());
    let config = match args.verbose {
        Some(verbose) => {
            commands::init_logging(commands::verbosity_level(verbose));
            Config::load(&config_path)?
        }
        None => {
            let config = commands::load_config_early(&config_path, std::io::stdout)?;
            commands::init_logging(config.logging.level.parse().unwrap_or(Level::INFO));
            config
        }
    };
    info!("turncheck v{} (配置: {})", env!("CARGO_PKG_VERSION"), config_path);

    match args.command {
        Commands::Test(test_args) => commands::handle_test(config, test_args).await,
        Commands::ParseUri { uri } => commands::handle_parse_uri(&uri),
        Commands::Config { path } => commands::handle_generate_config(path),
    }
}

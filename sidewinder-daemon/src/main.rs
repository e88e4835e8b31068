use anyhow::Result;
use clap::Parser;

use sidewinder_core::config::SidewinderConfig;
use sidewinder_daemon::cli::DaemonCli;
use sidewinder_daemon::logging;
use sidewinder_daemon::orchestrator::Daemon;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로드: 파일 → 환경변수 → CLI 순으로 우선순위가 높아짐
    let mut config = SidewinderConfig::from_file(&cli.config).await?;
    config.apply_env_overrides();
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    if let Some(socket) = &cli.docker_socket {
        config.runtime.docker_socket = socket.clone();
    }
    config.validate()?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    sidewinder_core::metrics::describe_all();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "sidewinder-daemon starting"
    );

    let mut daemon = Daemon::new(config);
    daemon.run().await
}

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use svcat_operator::{settings::OperatorSettings, SvcatOperator};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Service Catalog 控制器管理器 Operator
#[derive(Debug, Parser)]
#[command(name = "svcat-operator", version, about)]
struct Args {
    /// 配置文件（yaml 或 json）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 工作负载镜像，覆盖模板中的镜像
    #[arg(long, env = "IMAGE")]
    image: Option<String>,

    /// 只执行一个同步周期后退出
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = OperatorSettings::load(args.config.as_deref())?;
    if let Some(image) = args.image.filter(|i| !i.is_empty()) {
        settings.image_pull_spec = image;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level)),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "启动 svcat-operator");
    let operator = SvcatOperator::new(settings).await?;

    if args.once {
        let outcome = operator.run_once().await?;
        println!(
            "needs_retry={} status_updated={}",
            outcome.needs_retry, outcome.status_updated
        );
        return Ok(());
    }

    operator.run().await
}

use std::net::IpAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use kvitlach::server::{run_server, ServerConfig, DEFAULT_HTTP_PORT, DEFAULT_WS_PORT};

#[derive(Debug, Parser)]
#[command(name = "kvitlach_server")]
#[command(about = "Launch the Kvitlach real-time game server", long_about = None)]
struct Args {
    /// Address to bind both listeners to
    #[arg(long, env = "KVITLACH_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port for the bidirectional websocket channel
    #[arg(long, env = "KVITLACH_WS_PORT", default_value_t = DEFAULT_WS_PORT)]
    ws_port: u16,

    /// Port for the plain HTTP health endpoint
    #[arg(long, env = "KVITLACH_HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    http_port: u16,

    /// Optional database URL enabling the connection audit sink
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "KVITLACH_LOG_JSON", default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.json).context("failed to initialize tracing")?;

    run_server(ServerConfig {
        bind: args.bind,
        ws_port: args.ws_port,
        http_port: args.http_port,
        database_url: args.database_url,
    })
    .await
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().try_init().map_err(|err| anyhow::anyhow!(err))
    } else {
        builder.try_init().map_err(|err| anyhow::anyhow!(err))
    }
}

use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use ros_tcp::Builder;
use ros_tcp::master::{DEFAULT_MASTER_PORT, MasterServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Standalone ROS master.
#[derive(Debug, Parser)]
#[command(name = "rosmaster", version, about)]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    #[arg(short, long, default_value_t = DEFAULT_MASTER_PORT)]
    port: u16,

    /// Host name put in the advertised URI instead of the bind address
    #[arg(long, env = "ROS_HOSTNAME")]
    advertise_host: Option<String>,

    /// Used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ros_tcp::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut builder = MasterServer::builder().with_bind_addr(SocketAddr::new(args.host, args.port));
    if let Some(host) = args.advertise_host {
        builder = builder.with_advertise_host(host);
    }
    let master = builder.build().await?;
    info!("ROS master running at {}", master.uri());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    master.shutdown();
    Ok(())
}

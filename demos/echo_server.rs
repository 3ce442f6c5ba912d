//! Framed echo server.
//!
//! Every frame is sent back unchanged from a worker thread:
//!
//! ```text
//! cargo run --example echo_server -- 127.0.0.1:8080
//! ```

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use mill_frame::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mill_frame=info".parse()?))
        .init();

    let address: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string())
        .parse()
        .context("invalid bind address")?;

    let config = TcpServerConfig::builder().address(address).build();
    let mut server = TcpServer::new(config)?;
    let pool = Arc::new(ThreadPool::with_available_parallelism()?);

    server.set_connection_callback(|conn| tracing::info!("{} connected", conn.show()));
    server.set_close_callback(|conn| tracing::info!("{} disconnected", conn.show()));
    server.serve(Arc::new(|request: Vec<u8>| request), pool);

    server.start()?;
    Ok(())
}

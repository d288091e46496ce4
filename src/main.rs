use std::sync::Arc;

use clap::Parser;

use kvraft::config::{Cli, Config};
use kvraft::server::handlers::build_router;
use kvraft::server::node::{spawn_drivers, Node};
use kvraft::transport::HttpTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::from_cli(cli)?;
    log::info!(
        "server {} starting, bind {} election_timeout {:?}",
        config.server_id,
        config.bind_addr,
        config.election_timeout
    );

    let transport = Arc::new(HttpTransport::new(config.peers.clone(), config.rpc_timeout));
    let node = Node::new(config.clone(), transport);
    let (_election, _heartbeat) = spawn_drivers(Arc::clone(&node));

    let router = build_router(node);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

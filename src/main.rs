// Ledger node

use clap::Parser;
use pow_ledger::network::api::run_api_server;
use pow_ledger::{Cli, HttpTransport, Node};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = Cli::parse().into_config();

    let transport = match HttpTransport::new(config.request_timeout) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error initializing: {}", e);
            std::process::exit(1);
        }
    };
    let node = Arc::new(Node::new(config, Arc::new(transport)));

    // Serve first so peers answering our greeting can reach us
    let server = tokio::spawn(run_api_server(node.clone()));

    node.greet_peers().await;

    if node.config().load {
        match node.load_from_disk().await {
            Ok(true) => {}
            Ok(false) => log::warn!("Nothing to load, starting from genesis"),
            Err(e) => log::error!("Failed to load blockchain: {}", e),
        }
    } else if let Err(e) = node.ask_for_blockchain().await {
        log::warn!("Initial sync failed: {}", e);
    }

    if node.config().mining {
        let _mining = node.start_mining();
    }

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

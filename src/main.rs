use std::error::Error;
use std::sync::Arc;

use tracing::{error, info};

use brokerlink::broker::{ConnectionManager, ManagerOptions};
use brokerlink::config::{Settings, StoreBackend, load_config};
use brokerlink::persistence::{MemoryStore, MessageStore, SledStore};
use brokerlink::server::start_control_server;
use brokerlink::transport::Transport;
use brokerlink::utils::logging;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    if let Err(e) = run(settings).await {
        error!("brokerlink stopped: {e}");
        std::process::exit(1);
    }
}

async fn run(settings: Settings) -> Result<(), Box<dyn Error>> {
    let persistence = &settings.persistence;
    let store: Arc<dyn MessageStore> = match persistence.backend {
        StoreBackend::Sled => Arc::new(SledStore::open(
            &persistence.path,
            persistence.ttl_secs,
            persistence.max_messages,
        )?),
        StoreBackend::Memory => Arc::new(MemoryStore::new(persistence.max_messages)),
    };

    let manager = ConnectionManager::start(
        broker_transport()?,
        store,
        ManagerOptions::from(&settings),
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    tokio::select! {
        result = start_control_server(addr, manager.clone()) => {
            result?;
            error!("control server stopped accepting connections");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    manager.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

#[cfg(feature = "amqp")]
fn broker_transport() -> Result<Arc<dyn Transport>, Box<dyn Error>> {
    Ok(Arc::new(brokerlink::transport::amqp::AmqpTransport::new()))
}

#[cfg(not(feature = "amqp"))]
fn broker_transport() -> Result<Arc<dyn Transport>, Box<dyn Error>> {
    Err("no broker transport compiled in; rebuild with `--features amqp`".into())
}

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use wsrooms_app::bin_common::{
    init_tracing_with_level, load_config_from_env, parse_args, AppConfig, ConfigType,
    ShutdownManager,
};
use wsrooms_app::wsrooms::{ConnectionManager, EventKind, WsEvent, WsMessage};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config_path = load_config_from_env(ConfigType::Client);
    let mut config = AppConfig::load(&config_path)?;

    // `room_client ws://host:port/room` beats both file and environment
    if let Some(endpoint) = parse_args().into_iter().next() {
        config.endpoint = endpoint;
        config.validate()?;
    }

    init_tracing_with_level(&config.log_level);
    config.log();

    let manager = ConnectionManager::new(config.endpoint.clone(), config.connection.clone())?;

    manager.on(EventKind::Open, |_| info!("Connected"));
    manager.on(EventKind::Close, |event| {
        if let WsEvent::Close(close) = event {
            if !close.manual {
                warn!("Connection lost, reconnecting");
            }
        }
    });
    manager.on(EventKind::Message, |event| {
        if let WsEvent::Message(message) = event {
            match message {
                WsMessage::Text(text) => println!("{}", text),
                WsMessage::Binary(bytes) => println!("<{} bytes>", bytes.len()),
            }
        }
    });

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    manager.connect();
    info!("Type a line and press Enter to send it, Ctrl+C to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    if let Err(e) = manager.send(line) {
                        warn!("Message not sent: {}", e);
                    }
                }
                None => break,
            },
            _ = shutdown.wait() => break,
        }
    }

    manager.close();
    let metrics = manager.metrics();
    info!(
        "Client stopped ({} connects, {} reconnects)",
        metrics.successful_opens, metrics.reconnects_scheduled
    );
    Ok(())
}

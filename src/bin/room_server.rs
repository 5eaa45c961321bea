use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, info, warn};
use wsrooms_app::bin_common::{
    init_tracing_with_level, load_config_from_env, AppConfig, ConfigType, ShutdownManager,
};
use wsrooms_app::wsrooms::{
    link_from_stream, Connection, ConnectionOptions, EventKind, RoomBroker, WsEvent,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load config first (before logging is initialized)
    let config_path = load_config_from_env(ConfigType::Server);
    let config = AppConfig::load(&config_path)?;

    init_tracing_with_level(&config.log_level);
    config.log();

    let listener = TcpListener::bind(&config.bind_addr).await?;
    let broker: RoomBroker = RoomBroker::new();
    let options = config.connection.connection_options();

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    print_banner("Room Server", &config.bind_addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let broker = broker.clone();
                    let default_room = config.default_room.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, addr, broker, default_room, options).await {
                            warn!("Client {} rejected: {}", addr, e);
                        }
                    });
                }
                Err(e) => warn!("Accept error: {}", e),
            },
            _ = shutdown.wait() => break,
        }
    }

    info!("Open rooms at shutdown: {:?}", broker.room_names());
    print_shutdown("Room server");
    Ok(())
}

async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    broker: RoomBroker,
    default_room: String,
    options: ConnectionOptions,
) -> Result<()> {
    let mut path = String::new();
    let capture_path = |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        path = request.uri().path().to_string();
        Ok(response)
    };
    let ws_stream = accept_hdr_async(stream, capture_path).await?;

    let room = room_from_path(&path, &default_room);
    let connection = Arc::new(Connection::accept(
        link_from_stream(ws_stream),
        addr.to_string(),
        options,
    ));

    // No connection handle in here: the listener lives as long as the link
    {
        let broker = broker.clone();
        let room = room.clone();
        connection.on(EventKind::Message, move |event| {
            if let WsEvent::Message(message) = event {
                if message.is_text() {
                    let delivered = broker.emit_on_room(&room, message.clone());
                    debug!("Relayed frame to {} member(s) of '{}'", delivered, room);
                }
            }
        });
    }
    {
        let room = room.clone();
        connection.on(EventKind::Close, move |_| {
            info!("{} left '{}'", addr, room);
        });
    }

    broker.join_room(room.clone(), connection);
    info!(
        "{} joined '{}' ({} members)",
        addr,
        room,
        broker.member_count(&room)
    );

    Ok(())
}

/// Room name from the request path, `/news/tech` -> `news/tech`
fn room_from_path(path: &str, default_room: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        default_room.to_string()
    } else {
        trimmed.to_string()
    }
}

fn print_banner(name: &str, bind_addr: &str) {
    info!("");
    info!("========================================");
    info!("Starting {}", name);
    info!("Listening on ws://{}", bind_addr);
    info!("Press Ctrl+C to stop");
    info!("========================================");
    info!("");
}

fn print_shutdown(name: &str) {
    info!("");
    info!("========================================");
    info!("{} stopped gracefully", name);
    info!("========================================");
}

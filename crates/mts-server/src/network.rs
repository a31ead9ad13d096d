use crate::state::{JoinRefusal, ServerContext};
use anyhow::Result;
use mts_protocol_core::{Connection, Hello, HelloAck};
use mts_relay::InboundConnection;
use mts_types::{Origin, PlayerProfile};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, trace};

pub async fn accept_loop(listener: TcpListener, ctx: Arc<ServerContext>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                debug!("New connection from {}", peer);
                if let Err(e) = socket.set_nodelay(true) {
                    debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
                }
                tokio::spawn(handle_connection(socket, peer, ctx.clone()));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Run one client from its hello until the socket closes.
pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>) {
    let mut conn = Connection::new(stream);
    conn.set_max_frame_len(ctx.config.max_frame_len);

    if let Err(e) = serve(conn, peer, &ctx).await {
        debug!("Connection {} ended: {:#}", peer, e);
    }
}

async fn serve(mut conn: Connection, peer: SocketAddr, ctx: &ServerContext) -> Result<()> {
    let profile = match login(&mut conn, ctx).await? {
        Ok(profile) => profile,
        Err(reason) => {
            info!("Rejected {}: {}", peer, reason);
            conn.write_frame(&HelloAck::Rejected { reason }.encode()).await?;
            return Ok(());
        }
    };

    let threshold = ctx.config.compression_threshold;
    let ack = HelloAck::Accepted {
        player: profile.id,
        compression_threshold: threshold,
    };
    if let Err(e) = conn.write_frame(&ack.encode()).await {
        ctx.worlds.remove_player(profile.id);
        return Err(e);
    }
    conn.enable_compression(threshold);

    info!("{} joined from {} ({})", profile.name, peer, profile.id);
    play(conn, &profile, ctx).await;

    ctx.table.disconnect(profile.id);
    ctx.worlds.remove_player(profile.id);
    info!("{} left", profile.name);
    Ok(())
}

/// Read and check the client's hello. The inner error is the rejection reason.
async fn login(
    conn: &mut Connection,
    ctx: &ServerContext,
) -> Result<std::result::Result<PlayerProfile, String>> {
    let mut frame = conn.read_frame().await?;
    let hello = Hello::decode(&mut frame)?;
    debug!(
        "Hello from {}: channel={}, version={}",
        hello.player_name, hello.channel, hello.version
    );

    if let Err(reason) = hello.verify(&ctx.config.channel, &ctx.config.protocol_version) {
        return Ok(Err(reason));
    }

    let profile = PlayerProfile::offline(hello.player_name);
    match ctx
        .worlds
        .add_player(profile.clone(), ctx.config.max_players as usize)
    {
        Ok(()) => Ok(Ok(profile)),
        Err(JoinRefusal::Full) => Ok(Err("Server is full".to_string())),
        Err(JoinRefusal::AlreadyOnline) => {
            Ok(Err(format!("{} is already connected", profile.name)))
        }
    }
}

/// Split into a writer task draining the player's outbound queue and a reader
/// loop feeding the relay. Returns when the client goes away.
async fn play(conn: Connection, profile: &PlayerProfile, ctx: &ServerContext) {
    let mut out_rx = ctx.table.connect(profile.id);
    let inbound = ctx.relay.inbound(Origin::Client(profile.id));
    let (mut reader, mut writer) = conn.into_split();

    let writer_name = profile.name.clone();
    let writer_handle = tokio::spawn(async move {
        while let Some(payload) = out_rx.recv().await {
            if let Err(e) = writer.write_frame(&payload).await {
                debug!("Writer error for {}: {}", writer_name, e);
                break;
            }
        }
    });

    loop {
        match reader.read_frame().await {
            Ok(payload) => receive(&inbound, &profile.name, payload),
            Err(e) => {
                debug!("Reader error for {}: {}", profile.name, e);
                break;
            }
        }
    }

    drop(inbound);
    writer_handle.abort();
}

fn receive(inbound: &InboundConnection, name: &str, payload: bytes::BytesMut) {
    // Decode errors are logged by the relay; the connection stays open.
    if let Ok(dispatch) = inbound.receive(payload) {
        trace!("Packet from {}: {:?}", name, dispatch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::tick::run_tick_loop;
    use mts_nbt::{nbt_compound, NbtValue};
    use mts_relay::packets::{EntityHandshakeRequest, EntityHandshakeResponse};
    use mts_types::PlayerId;
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio::time::timeout;
    use uuid::Uuid;

    struct TestServer {
        ctx: Arc<ServerContext>,
        addr: SocketAddr,
        _shutdown: watch::Sender<bool>,
    }

    async fn start(config: ServerConfig) -> TestServer {
        let (ctx, executor) = ServerContext::new(Arc::new(config)).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(accept_loop(listener, ctx.clone()));
        tokio::spawn(run_tick_loop(ctx.config.tick_rate, executor, shutdown_rx));
        TestServer {
            ctx,
            addr,
            _shutdown: shutdown_tx,
        }
    }

    async fn join(addr: SocketAddr, hello: &Hello) -> (Connection, HelloAck) {
        let mut conn = Connection::connect(addr).await.unwrap();
        conn.write_frame(&hello.encode()).await.unwrap();
        let mut frame = timeout(Duration::from_secs(5), conn.read_frame())
            .await
            .unwrap()
            .unwrap();
        let ack = HelloAck::decode(&mut frame).unwrap();
        if let HelloAck::Accepted {
            compression_threshold,
            ..
        } = ack
        {
            conn.enable_compression(compression_threshold);
        }
        (conn, ack)
    }

    #[tokio::test]
    async fn test_entity_handshake_over_tcp() {
        let server = start(ServerConfig::default()).await;
        let entity = Uuid::new_v4();
        let data = nbt_compound! {
            "systemName" => NbtValue::String("trailer".into()),
            "fuel" => NbtValue::Double(100.0),
        };
        server.ctx.worlds.overworld().insert_entity(entity, data.clone());

        let (mut conn, ack) = join(server.addr, &Hello::new("Steve")).await;
        assert_eq!(
            ack,
            HelloAck::Accepted {
                player: PlayerId::offline("Steve"),
                compression_threshold: 256,
            }
        );

        // A payload with an unknown tag is skipped, the connection stays usable.
        conn.write_frame(&[250u8, 1, 2]).await.unwrap();

        let request = server
            .ctx
            .relay
            .encode(&EntityHandshakeRequest { entity })
            .unwrap();
        conn.write_frame(&request).await.unwrap();

        let response = timeout(Duration::from_secs(5), conn.read_frame())
            .await
            .unwrap()
            .unwrap();
        let envelope = server.ctx.relay.decode(response).unwrap();
        assert_eq!(
            envelope.downcast_ref::<EntityHandshakeResponse>(),
            Some(&EntityHandshakeResponse {
                entity,
                data: Some(data),
            })
        );
    }

    #[tokio::test]
    async fn test_version_mismatch_is_rejected() {
        let server = start(ServerConfig::default()).await;
        let mut hello = Hello::new("Alex");
        hello.version = "21.0.0".into();

        let (_conn, ack) = join(server.addr, &hello).await;
        assert!(matches!(ack, HelloAck::Rejected { reason } if reason.contains("Version mismatch")));
        assert_eq!(server.ctx.worlds.player_count(), 0);
    }

    #[tokio::test]
    async fn test_full_server_and_duplicate_names() {
        let server = start(ServerConfig {
            max_players: 2,
            ..ServerConfig::default()
        })
        .await;

        let (_alex, ack) = join(server.addr, &Hello::new("Alex")).await;
        assert!(matches!(ack, HelloAck::Accepted { .. }));

        let (_twin, ack) = join(server.addr, &Hello::new("Alex")).await;
        assert_eq!(
            ack,
            HelloAck::Rejected {
                reason: "Alex is already connected".into()
            }
        );

        let (_steve, ack) = join(server.addr, &Hello::new("Steve")).await;
        assert!(matches!(ack, HelloAck::Accepted { .. }));

        let (_bob, ack) = join(server.addr, &Hello::new("Bob")).await;
        assert_eq!(
            ack,
            HelloAck::Rejected {
                reason: "Server is full".into()
            }
        );
    }

    #[tokio::test]
    async fn test_disconnect_frees_the_slot() {
        let server = start(ServerConfig {
            max_players: 1,
            ..ServerConfig::default()
        })
        .await;

        let (first, _) = join(server.addr, &Hello::new("Alex")).await;
        drop(first);

        timeout(Duration::from_secs(5), async {
            while server.ctx.worlds.player_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert!(!server.ctx.table.is_connected(PlayerId::offline("Alex")));

        let (_again, ack) = join(server.addr, &Hello::new("Alex")).await;
        assert!(matches!(ack, HelloAck::Accepted { .. }));
    }
}

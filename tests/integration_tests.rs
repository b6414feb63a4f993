//! Integration tests for the rollback netcode components
//!
//! These tests drive the authoritative room and the predicting client
//! together, in process and over real UDP sockets.

use client::predictor::Predictor;
use client::reconcile::{Reconciler, Reconciliation};
use server::network::{Server, ServerEvent};
use server::room::Room;
use shared::{ClientMessage, InputCommand, NetcodeConfig, PlayerId, ServerMessage, Snapshot};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const ME: PlayerId = PlayerId(77);

fn axis(i: u32) -> (f32, f32) {
    let t = i as f32 * 0.13;
    (t.sin(), (t * 0.7).cos())
}

/// DETERMINISM TESTS
mod determinism_tests {
    use super::*;

    /// Server consumption and client resimulation of the same inputs agree
    #[test]
    fn server_and_client_paths_agree() {
        let config = NetcodeConfig::default();
        let mut room = Room::new(config.clone());
        room.join(ME);
        let mut predictor = Predictor::new(ME, config.clone());

        let mut commands = Vec::new();
        for i in 0..90 {
            let (x, y) = axis(i);
            commands.push(predictor.step(x, y, 0, 16.667));
        }
        for cmd in &commands {
            room.ingest_input(ME, *cmd).unwrap();
        }
        room.tick();

        assert_eq!(room.current_seq(ME), Some(90));
        assert_eq!(room.state(ME), Some(predictor.state()));

        // Force a rollback to an early snapshot and compare again.
        let mut early = *predictor.frames().get(30).map(|f| &f.state).unwrap();
        early.x += 1.0;
        let mut reconciler = Reconciler::new(&config);
        let outcome = reconciler
            .on_snapshot(&mut predictor, &Snapshot::new(1, 30, early, true))
            .unwrap();
        assert!(matches!(
            outcome,
            Reconciliation::Corrected { replayed: 60, .. }
        ));

        let mut replay_from = early;
        let dt = config.tick_dt();
        for cmd in &commands[30..] {
            replay_from = shared::step(&replay_from, cmd, dt);
        }
        assert_eq!(*predictor.state(), replay_from);
    }

    /// Applying strictly increasing sequences leaves current seq at the max
    #[test]
    fn current_seq_tracks_max_applied() {
        let mut room = Room::new(NetcodeConfig::default());
        room.join(ME);

        let mut applied = 0;
        for batch in [3u32, 1, 7, 12, 2] {
            for _ in 0..batch {
                applied += 1;
                room.ingest_input(ME, InputCommand::neutral(ME, applied, applied, 16.667))
                    .unwrap();
            }
            room.tick();
            assert_eq!(room.current_seq(ME), Some(applied));
        }
    }
}

/// LOSS AND RECOVERY TESTS
mod recovery_tests {
    use super::*;

    /// A lost input is filled as "no input" by the server; the client
    /// corrects towards that and both sides converge afterwards.
    #[test]
    fn lost_input_converges_after_gap_timeout() {
        let config = NetcodeConfig {
            gap_timeout_ticks: 2,
            snapshot_every_n_ticks: 1,
            ..Default::default()
        };
        let mut room = Room::new(config.clone());
        room.join(ME);
        let mut predictor = Predictor::new(ME, config.clone());
        let mut reconciler = Reconciler::new(&config);

        let mut corrected = 0;
        for _ in 0..40 {
            let cmd = predictor.step(1.0, 0.0, 0, 16.667);
            if cmd.seq != 5 {
                room.ingest_input(ME, cmd).unwrap();
            }
            room.tick();

            if let Some(snapshot) = room.emit_snapshot(ME) {
                if let Ok(Reconciliation::Corrected { .. }) =
                    reconciler.on_snapshot(&mut predictor, &snapshot)
                {
                    corrected += 1;
                }
            }
            assert!(predictor.input_history().len() <= config.max_client_history_frames);
        }

        assert_eq!(corrected, 1);
        assert_eq!(room.current_seq(ME), Some(40));
        assert_eq!(room.state(ME), Some(predictor.state()));
    }

    /// Duplicate delivery never moves the authoritative state
    #[test]
    fn duplicate_delivery_is_harmless() {
        let mut room = Room::new(NetcodeConfig::default());
        room.join(ME);
        let mut predictor = Predictor::new(ME, NetcodeConfig::default());

        for _ in 0..50 {
            let cmd = predictor.step(0.5, 0.5, 0, 16.667);
            room.ingest_input(ME, cmd).unwrap();
        }
        room.tick();
        let settled = *room.state(ME).unwrap();

        for cmd in predictor.input_history().iter() {
            assert!(room.ingest_input(ME, *cmd).is_err());
        }
        room.tick();
        assert_eq!(*room.state(ME).unwrap(), settled);
    }
}

/// NETWORK TESTS
mod network_tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    async fn start_server(
        config: NetcodeConfig,
    ) -> (SocketAddr, mpsc::UnboundedSender<ServerEvent>) {
        let mut server = Server::new("127.0.0.1:0", config, 8, Duration::from_secs(5))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        (addr, shutdown)
    }

    async fn recv(socket: &UdpSocket) -> ServerMessage {
        let mut buf = [0u8; 2048];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for server")
            .unwrap();
        ServerMessage::decode(&buf[..len]).unwrap()
    }

    async fn send(socket: &UdpSocket, server: SocketAddr, message: &ClientMessage) {
        socket
            .send_to(&message.encode().unwrap(), server)
            .await
            .unwrap();
    }

    /// Join, predict, send and reconcile against a live server
    #[tokio::test]
    async fn predicted_inputs_are_confirmed_by_live_server() {
        let config = NetcodeConfig::default();
        let (server, shutdown) = start_server(config.clone()).await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        // Garbage first: must be dropped without affecting the session.
        socket.send_to(&[0xde, 0xad, 0xbe, 0xef], server).await.unwrap();

        send(&socket, server, &ClientMessage::Join { player_id: ME }).await;
        let resume = match recv(&socket).await {
            ServerMessage::Hello {
                player_id,
                tick_rate,
                resume,
                ..
            } => {
                assert_eq!(player_id, ME);
                assert_eq!(tick_rate, 60);
                resume
            }
            other => panic!("Expected hello, got {:?}", other),
        };

        let mut predictor = Predictor::new(ME, config.clone());
        predictor.reset(&resume);
        let mut reconciler = Reconciler::new(&config);

        for i in 0..20 {
            let (x, y) = axis(i);
            let cmd = predictor.step(x, y, 0, 16.667);
            send(&socket, server, &ClientMessage::Input(cmd)).await;
        }

        let mut confirmed_through = 0;
        while confirmed_through < 20 {
            if let ServerMessage::Snapshot(snapshot) = recv(&socket).await {
                assert!(snapshot.verify());
                assert!(snapshot.last_processed_seq <= 20);
                let outcome = reconciler.on_snapshot(&mut predictor, &snapshot).unwrap();
                assert!(!matches!(outcome, Reconciliation::Corrected { .. }));
                confirmed_through = snapshot.last_processed_seq;
            }
        }

        assert!(predictor.input_history().is_empty());
        assert_eq!(reconciler.stats().corrected, 0);

        send(&socket, server, &ClientMessage::Ping { client_time: 99 }).await;
        loop {
            if let ServerMessage::Pong { client_time, .. } = recv(&socket).await {
                assert_eq!(client_time, 99);
                break;
            }
        }

        let _ = shutdown.send(ServerEvent::Shutdown);
    }
}

/// Codec sanity check outside an async runtime
#[test]
fn records_survive_the_codec() {
    let snapshot = Snapshot::new(3, 2, shared::SimState::new(ME), true);
    let message = ServerMessage::Snapshot(snapshot);
    let decoded = tokio_test::block_on(async {
        ServerMessage::decode(&message.encode().unwrap()).unwrap()
    });
    assert_eq!(decoded, message);
}

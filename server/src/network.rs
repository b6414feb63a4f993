//! Server network layer: UDP I/O tasks around the authoritative room loop

use crate::connections::{Bind, ConnectionRegistry};
use crate::room::Room;
use log::{debug, error, info, warn};
use shared::error::NetcodeError;
use shared::protocol::MAX_DATAGRAM_SIZE;
use shared::{get_timestamp, ClientMessage, NetcodeConfig, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Events sent from network tasks to the room loop
#[derive(Debug)]
pub enum ServerEvent {
    Received {
        message: ClientMessage,
        addr: SocketAddr,
    },
    Malformed {
        addr: SocketAddr,
        error: NetcodeError,
    },
    Shutdown,
}

/// A record queued for the sender task
#[derive(Debug)]
pub struct Outgoing {
    pub message: ServerMessage,
    pub addr: SocketAddr,
}

/// Counters reported in the periodic debug log
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    pub received: u64,
    pub malformed: u64,
    pub rejected_inputs: u64,
    pub evicted_inputs: u64,
    pub applied_inputs: u64,
    pub snapshots_sent: u64,
}

/// Room server coordinating networking and the fixed-tick simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    connections: ConnectionRegistry,
    room: Room,
    tick_duration: Duration,
    stats: ServerStats,

    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
    out_tx: mpsc::UnboundedSender<Outgoing>,
    out_rx: Option<mpsc::UnboundedReceiver<Outgoing>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: NetcodeConfig,
        max_players: usize,
        connection_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            connections: ConnectionRegistry::new(max_players, connection_timeout),
            tick_duration: config.tick_duration(),
            room: Room::new(config),
            stats: ServerStats::default(),
            event_tx,
            event_rx,
            out_tx,
            out_rx: Some(out_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle that stops [`Server::run`] when sent [`ServerEvent::Shutdown`]
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerEvent> {
        self.event_tx.clone()
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let event = match ClientMessage::decode(&buffer[..len]) {
                            Ok(message) => ServerEvent::Received { message, addr },
                            Err(error) => ServerEvent::Malformed { addr, error },
                        };
                        if event_tx.send(event).is_err() {
                            debug!("Room loop gone, stopping receiver");
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the outgoing queue to the socket
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut out_rx = match self.out_rx.take() {
            Some(rx) => rx,
            None => return,
        };

        tokio::spawn(async move {
            while let Some(Outgoing { message, addr }) = out_rx.recv().await {
                match message.encode() {
                    Ok(data) => {
                        if let Err(e) = socket.send_to(&data, addr).await {
                            warn!("Failed to send to {}: {}", addr, e);
                        }
                    }
                    Err(e) => error!("Failed to encode record for {}: {}", addr, e),
                }
            }
        });
    }

    /// Queues a record without waiting on the socket
    fn send(&self, message: ServerMessage, addr: SocketAddr) {
        if self.out_tx.send(Outgoing { message, addr }).is_err() {
            error!("Sender task gone, dropping record for {}", addr);
        }
    }

    /// Dispatches one decoded record. Never fails: bad records are logged and
    /// dropped so one peer cannot disturb the room.
    pub fn handle_message(&mut self, message: ClientMessage, addr: SocketAddr) {
        self.stats.received += 1;

        match message {
            ClientMessage::Join { player_id } => {
                match self.connections.bind(player_id, addr) {
                    Bind::Full => {
                        warn!("Rejecting player {} from {}: room full", player_id, addr);
                        self.send(
                            ServerMessage::Rejected {
                                reason: "Room full".to_string(),
                            },
                            addr,
                        );
                        return;
                    }
                    Bind::Displaced { previous } => {
                        self.room.leave(previous);
                    }
                    Bind::Accepted | Bind::Rebound { .. } => {}
                }

                let resume = self.room.join(player_id);
                let hello = ServerMessage::Hello {
                    server_tick: self.room.current_tick(),
                    tick_rate: self.room.config().tick_rate_hz,
                    player_id,
                    resume,
                };
                self.send(hello, addr);
            }

            ClientMessage::Input(cmd) => {
                let player_id = match self.connections.touch(addr) {
                    Some(id) => id,
                    None => {
                        debug!("Input seq {} from unbound peer {}", cmd.seq, addr);
                        self.stats.rejected_inputs += 1;
                        return;
                    }
                };

                match self.room.ingest_input(player_id, cmd) {
                    Ok(ingested) => {
                        self.stats.evicted_inputs += ingested.evicted as u64;
                    }
                    Err(e @ NetcodeError::StaleInput { .. })
                    | Err(e @ NetcodeError::DuplicateInput { .. }) => {
                        debug!("Dropped input: {}", e);
                        self.stats.rejected_inputs += 1;
                    }
                    Err(e) => {
                        warn!("Dropped input from {}: {}", addr, e);
                        self.stats.rejected_inputs += 1;
                    }
                }
            }

            ClientMessage::Ping { client_time } => {
                self.connections.touch(addr);
                self.send(
                    ServerMessage::Pong {
                        client_time,
                        server_time: get_timestamp(),
                    },
                    addr,
                );
            }

            ClientMessage::Leave => {
                if let Some(player_id) = self.connections.player_at(addr) {
                    self.connections.remove_player(player_id);
                    self.room.leave(player_id);
                }
            }
        }
    }

    /// Runs one room tick and sends snapshots when the cadence is due
    pub fn run_tick(&mut self) {
        let report = self.room.tick();
        self.stats.applied_inputs += (report.applied + report.gap_filled) as u64;

        if self.room.snapshot_due() {
            for (player_id, snapshot) in self.room.emit_snapshots() {
                if let Some(addr) = self.connections.addr_of(player_id) {
                    self.send(ServerMessage::Snapshot(snapshot), addr);
                    self.stats.snapshots_sent += 1;
                }
            }
        }

        let tick_rate = self.room.config().tick_rate_hz;
        if report.tick % tick_rate == 0 && !self.room.is_empty() {
            debug!(
                "Tick {}: {} players, {} stalled on gaps, stats {:?}",
                report.tick,
                self.room.len(),
                report.stalled.len(),
                self.stats
            );
        }
    }

    fn drop_timed_out(&mut self) {
        for player_id in self.connections.check_timeouts() {
            info!("Player {} timed out", player_id);
            self.room.leave(player_id);
        }
    }

    /// Main server loop. Network receipt only feeds the event channel; the
    /// room is mutated here and nowhere else.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let mut timeout_interval = interval(Duration::from_secs(1));

        info!(
            "Room running at {} Hz, snapshots every {} ticks",
            self.room.config().tick_rate_hz,
            self.room.config().snapshot_every_n_ticks
        );

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(ServerEvent::Received { message, addr }) => {
                            self.handle_message(message, addr);
                        }
                        Some(ServerEvent::Malformed { addr, error }) => {
                            self.stats.malformed += 1;
                            warn!("Dropped record from {}: {}", addr, error);
                        }
                        Some(ServerEvent::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                }

                _ = tick_interval.tick() => {
                    self.run_tick();
                }

                _ = timeout_interval.tick() => {
                    self.drop_timed_out();
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{InputCommand, PlayerId, Seq};
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    fn input(player_id: PlayerId, seq: Seq) -> ClientMessage {
        ClientMessage::Input(InputCommand {
            player_id,
            seq,
            tick: seq,
            dt_ms: 16.667,
            move_x: 1.0,
            move_y: 0.0,
            buttons: 0,
        })
    }

    async fn test_server(max_players: usize) -> Server {
        Server::new(
            "127.0.0.1:0",
            NetcodeConfig::default(),
            max_players,
            Duration::from_secs(5),
        )
        .await
        .unwrap()
    }

    fn drain(server: &mut Server) -> Vec<Outgoing> {
        let rx = server.out_rx.as_mut().unwrap();
        let mut out = Vec::new();
        while let Ok(outgoing) = rx.try_recv() {
            out.push(outgoing);
        }
        out
    }

    #[tokio::test]
    async fn test_join_replies_with_hello() {
        let mut server = test_server(4).await;
        server.handle_message(ClientMessage::Join { player_id: PlayerId(8) }, addr(7000));

        let out = drain(&mut server);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].addr, addr(7000));
        match &out[0].message {
            ServerMessage::Hello {
                player_id,
                tick_rate,
                resume,
                ..
            } => {
                assert_eq!(*player_id, PlayerId(8));
                assert_eq!(*tick_rate, 60);
                assert_eq!(resume.last_processed_seq, 0);
            }
            other => panic!("Unexpected record: {:?}", other),
        }
        assert!(server.room().contains(PlayerId(8)));
    }

    #[tokio::test]
    async fn test_full_room_rejects() {
        let mut server = test_server(1).await;
        server.handle_message(ClientMessage::Join { player_id: PlayerId(1) }, addr(7000));
        server.handle_message(ClientMessage::Join { player_id: PlayerId(2) }, addr(7001));

        let out = drain(&mut server);
        assert!(matches!(out[1].message, ServerMessage::Rejected { .. }));
        assert!(!server.room().contains(PlayerId(2)));
    }

    #[tokio::test]
    async fn test_inputs_flow_into_snapshots() {
        let mut server = test_server(4).await;
        server.handle_message(ClientMessage::Join { player_id: PlayerId(3) }, addr(7000));
        for seq in 1..=4 {
            server.handle_message(input(PlayerId(3), seq), addr(7000));
        }
        drain(&mut server);

        server.run_tick();
        server.run_tick();

        let snapshots: Vec<_> = drain(&mut server)
            .into_iter()
            .filter_map(|o| match o.message {
                ServerMessage::Snapshot(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].last_processed_seq, 4);
        assert_eq!(snapshots[0].tick, 4);
        assert_eq!(server.stats().applied_inputs, 4);
    }

    #[tokio::test]
    async fn test_unbound_and_stale_inputs_are_dropped() {
        let mut server = test_server(4).await;
        server.handle_message(input(PlayerId(3), 1), addr(7000));
        assert_eq!(server.stats().rejected_inputs, 1);

        server.handle_message(ClientMessage::Join { player_id: PlayerId(3) }, addr(7000));
        server.handle_message(input(PlayerId(3), 1), addr(7000));
        server.run_tick();
        server.handle_message(input(PlayerId(3), 1), addr(7000));
        assert_eq!(server.stats().rejected_inputs, 2);
        assert_eq!(server.room().current_seq(PlayerId(3)), Some(1));
    }

    #[tokio::test]
    async fn test_ping_gets_pong_and_leave_removes_player() {
        let mut server = test_server(4).await;
        server.handle_message(ClientMessage::Join { player_id: PlayerId(5) }, addr(7000));
        server.handle_message(ClientMessage::Ping { client_time: 1234 }, addr(7000));

        let out = drain(&mut server);
        match out[1].message {
            ServerMessage::Pong { client_time, .. } => assert_eq!(client_time, 1234),
            ref other => panic!("Unexpected record: {:?}", other),
        }

        server.handle_message(ClientMessage::Leave, addr(7000));
        assert!(!server.room().contains(PlayerId(5)));
    }
}

//! Client network loop: predicts locally, sends inputs fire-and-forget and
//! reconciles against the snapshots that come back.

use crate::input::{InputPattern, InputScript};
use crate::predictor::Predictor;
use crate::reconcile::{Reconciliation, Reconciler};
use log::{debug, error, info, warn};
use rand::Rng;
use shared::error::NetcodeError;
use shared::protocol::MAX_DATAGRAM_SIZE;
use shared::{get_timestamp, ClientMessage, NetcodeConfig, PlayerId, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Interval, MissedTickBehavior};

/// Where the client is in its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Join sent, waiting for a hello
    Connecting,
    /// Hello received, predicting every step
    Predicting,
    /// Server went silent; prediction is paused until the next hello
    Frozen,
}

/// Simulated network impairment applied to both directions
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkConditions {
    /// Round-trip latency to add, split evenly per direction
    pub fake_ping_ms: u64,
    /// Probability in [0, 1] of dropping each datagram
    pub loss: f64,
}

impl LinkConditions {
    fn one_way(&self) -> Duration {
        Duration::from_millis(self.fake_ping_ms / 2)
    }

    fn drop_this(&self) -> bool {
        self.loss > 0.0 && rand::thread_rng().gen_bool(self.loss.min(1.0))
    }
}

/// Local step timer; late steps are skipped rather than bunched up.
fn step_timer(config: &NetcodeConfig) -> Interval {
    let mut timer = interval(config.tick_duration());
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

/// Records handed from the receiver task to the client loop
#[derive(Debug)]
enum ClientEvent {
    Received(ServerMessage),
    Malformed(NetcodeError),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ClientStats {
    pub sent_inputs: u64,
    pub snapshots: u64,
    pub malformed: u64,
    pub resets: u64,
}

pub struct Client {
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    player_id: PlayerId,
    conditions: LinkConditions,
    connection_timeout: Duration,

    predictor: Predictor,
    reconciler: Reconciler,
    script: InputScript,
    link: LinkState,
    last_server_record: Instant,
    last_step: Instant,

    ping_ms: u64,
    stats: ClientStats,

    out_tx: mpsc::UnboundedSender<Vec<u8>>,
    out_rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        player_id: PlayerId,
        config: NetcodeConfig,
        pattern: InputPattern,
        conditions: LinkConditions,
        connection_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        let server_addr: SocketAddr = server_addr.parse()?;
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Client {
            socket,
            server_addr,
            player_id,
            conditions,
            connection_timeout,
            reconciler: Reconciler::new(&config),
            script: InputScript::new(pattern, config.tick_rate_hz),
            predictor: Predictor::new(player_id, config),
            link: LinkState::Connecting,
            last_server_record: Instant::now(),
            last_step: Instant::now(),
            ping_ms: 0,
            stats: ClientStats::default(),
            out_tx,
            out_rx: Some(out_rx),
        })
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    /// Spawns task that sends queued datagrams, applying simulated latency
    /// and loss without ever blocking the client loop
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let server_addr = self.server_addr;
        let conditions = self.conditions;
        let mut out_rx = match self.out_rx.take() {
            Some(rx) => rx,
            None => return,
        };

        tokio::spawn(async move {
            while let Some(data) = out_rx.recv().await {
                if conditions.drop_this() {
                    continue;
                }
                if conditions.fake_ping_ms == 0 {
                    if let Err(e) = socket.send_to(&data, server_addr).await {
                        warn!("Failed to send to {}: {}", server_addr, e);
                    }
                    continue;
                }

                let socket = Arc::clone(&socket);
                let delay = conditions.one_way();
                tokio::spawn(async move {
                    sleep(delay).await;
                    if let Err(e) = socket.send_to(&data, server_addr).await {
                        warn!("Failed to send to {}: {}", server_addr, e);
                    }
                });
            }
        });
    }

    /// Spawns task that decodes incoming datagrams
    fn spawn_network_receiver(&self) -> mpsc::UnboundedReceiver<ClientEvent> {
        let socket = Arc::clone(&self.socket);
        let server_addr = self.server_addr;
        let conditions = self.conditions;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
            loop {
                let (len, from) = match socket.recv_from(&mut buffer).await {
                    Ok(received) => received,
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                };
                if from != server_addr || conditions.drop_this() {
                    continue;
                }

                let event = match ServerMessage::decode(&buffer[..len]) {
                    Ok(message) => ClientEvent::Received(message),
                    Err(e) => ClientEvent::Malformed(e),
                };

                if conditions.fake_ping_ms == 0 {
                    if event_tx.send(event).is_err() {
                        break;
                    }
                } else {
                    let event_tx = event_tx.clone();
                    let delay = conditions.one_way();
                    tokio::spawn(async move {
                        sleep(delay).await;
                        let _ = event_tx.send(event);
                    });
                }
            }
        });

        event_rx
    }

    fn send(&self, message: &ClientMessage) {
        match message.encode() {
            Ok(data) => {
                if self.out_tx.send(data).is_err() {
                    error!("Sender task gone, dropping record");
                }
            }
            Err(e) => error!("Failed to encode record: {}", e),
        }
    }

    fn join(&self) {
        info!("Joining {} as player {}", self.server_addr, self.player_id);
        self.send(&ClientMessage::Join {
            player_id: self.player_id,
        });
    }

    fn handle_message(&mut self, message: ServerMessage) {
        self.last_server_record = Instant::now();

        match message {
            ServerMessage::Hello {
                server_tick,
                tick_rate,
                player_id,
                resume,
            } => {
                if player_id != self.player_id {
                    warn!("Ignoring hello addressed to player {}", player_id);
                    return;
                }
                if tick_rate != self.predictor.config().tick_rate_hz {
                    let config = NetcodeConfig {
                        tick_rate_hz: tick_rate,
                        ..self.predictor.config().clone()
                    };
                    if let Err(e) = config.validate() {
                        self.stats.malformed += 1;
                        warn!(
                            "{}",
                            NetcodeError::MalformedMessage(format!("hello rejected: {}", e))
                        );
                        return;
                    }
                    warn!(
                        "Server ticks at {} Hz, adopting it over local {} Hz",
                        tick_rate,
                        self.predictor.config().tick_rate_hz
                    );
                    self.predictor = Predictor::new(self.player_id, config);
                    self.script.set_tick_rate(tick_rate);
                }

                self.predictor.reset(&resume);
                self.stats.resets += 1;
                self.link = LinkState::Predicting;
                info!(
                    "Hello from server at tick {}: resuming at tick {} seq {}",
                    server_tick, resume.tick, resume.last_processed_seq
                );
            }

            ServerMessage::Snapshot(snapshot) => {
                self.stats.snapshots += 1;
                if self.link != LinkState::Predicting {
                    return;
                }

                match self.reconciler.on_snapshot(&mut self.predictor, &snapshot) {
                    Ok(Reconciliation::Corrected {
                        from_tick,
                        replayed,
                        correction,
                    }) => {
                        debug!(
                            "Correction at tick {}: replayed {}, moved {:.3}",
                            from_tick, replayed, correction
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.stats.malformed += 1;
                        warn!("Dropped snapshot: {}", e);
                    }
                }
            }

            ServerMessage::Pong { client_time, .. } => {
                self.ping_ms = get_timestamp().saturating_sub(client_time);
            }

            ServerMessage::Rejected { reason } => {
                warn!("Server rejected join: {}", reason);
                self.link = LinkState::Connecting;
            }
        }
    }

    /// One local step: sample input, predict, transmit.
    fn predict_step(&mut self) {
        let now = Instant::now();
        let dt_ms = now.duration_since(self.last_step).as_secs_f32() * 1000.0;
        self.last_step = now;

        if self.link != LinkState::Predicting {
            return;
        }

        let input = self.script.sample(self.predictor.tick());
        let cmd = self
            .predictor
            .step(input.move_x, input.move_y, input.buttons, dt_ms);
        self.send(&ClientMessage::Input(cmd));
        self.stats.sent_inputs += 1;
    }

    /// Pings while predicting; otherwise (re-)sends the join.
    fn keepalive(&mut self) {
        match self.link {
            LinkState::Predicting => {
                self.send(&ClientMessage::Ping {
                    client_time: get_timestamp(),
                });
                info!(
                    "Tick {} | ping {}ms | pending inputs {} | reconcile {:?}",
                    self.predictor.tick(),
                    self.ping_ms,
                    self.predictor.input_history().len(),
                    self.reconciler.stats()
                );
            }
            LinkState::Connecting | LinkState::Frozen => self.join(),
        }
    }

    fn check_link(&mut self) {
        if self.last_server_record.elapsed() <= self.connection_timeout {
            return;
        }
        if self.link == LinkState::Predicting {
            warn!(
                "No server records for {:?}, freezing prediction",
                self.connection_timeout
            );
            self.link = LinkState::Frozen;
        }
    }

    /// Runs until `run_for` elapses, or forever when it is `None`.
    pub async fn run(&mut self, run_for: Option<Duration>) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_sender();
        let mut events = self.spawn_network_receiver();

        let mut step_rate = self.predictor.config().tick_rate_hz;
        let mut step_interval = step_timer(self.predictor.config());
        let mut ping_interval = interval(Duration::from_secs(1));
        let mut link_interval = interval(Duration::from_millis(250));

        let deadline = async {
            match run_for {
                Some(duration) => sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(ClientEvent::Received(message)) => {
                            self.handle_message(message);
                            let rate = self.predictor.config().tick_rate_hz;
                            if rate != step_rate {
                                step_rate = rate;
                                step_interval = step_timer(self.predictor.config());
                            }
                        }
                        Some(ClientEvent::Malformed(e)) => {
                            self.stats.malformed += 1;
                            warn!("Dropped record from server: {}", e);
                        }
                        None => break,
                    }
                }

                _ = step_interval.tick() => {
                    self.predict_step();
                }

                _ = ping_interval.tick() => {
                    self.keepalive();
                }

                _ = link_interval.tick() => {
                    self.check_link();
                }

                _ = &mut deadline => {
                    info!("Run time elapsed");
                    break;
                }
            }
        }

        self.send(&ClientMessage::Leave);
        // Give the sender task a moment to flush the leave record.
        sleep(Duration::from_millis(20) + self.conditions.one_way()).await;

        Ok(())
    }
}

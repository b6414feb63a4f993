//! Connection registry for the room server
//!
//! Binds transport addresses to the externally issued player identities, and
//! tracks liveness so silent peers can be dropped without affecting anyone
//! else. The registry never creates identities; it only records the one a
//! client presents when joining.

use log::info;
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A live transport binding for one player
#[derive(Debug)]
pub struct Connection {
    pub player_id: PlayerId,
    pub addr: SocketAddr,
    /// Last time we received any record from this peer
    pub last_seen: Instant,
}

impl Connection {
    pub fn new(player_id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            player_id,
            addr,
            last_seen: Instant::now(),
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Result of binding a player to an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bind {
    /// New binding created
    Accepted,
    /// The player was already bound; the address was refreshed
    Rebound { previous: SocketAddr },
    /// The address belonged to a different player, who has been unbound
    Displaced { previous: PlayerId },
    /// The registry is at capacity
    Full,
}

/// Maps peers to players and enforces the room capacity
pub struct ConnectionRegistry {
    by_player: HashMap<PlayerId, Connection>,
    by_addr: HashMap<SocketAddr, PlayerId>,
    max_connections: usize,
    timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize, timeout: Duration) -> Self {
        Self {
            by_player: HashMap::new(),
            by_addr: HashMap::new(),
            max_connections,
            timeout,
        }
    }

    /// Binds `player_id` to `addr`, replacing stale bindings on either side.
    pub fn bind(&mut self, player_id: PlayerId, addr: SocketAddr) -> Bind {
        let displaced = match self.by_addr.get(&addr) {
            Some(existing) if *existing != player_id => {
                let existing = *existing;
                self.remove_player(existing);
                Some(existing)
            }
            _ => None,
        };

        if let Some(connection) = self.by_player.get_mut(&player_id) {
            let previous = connection.addr;
            connection.addr = addr;
            connection.last_seen = Instant::now();
            self.by_addr.remove(&previous);
            self.by_addr.insert(addr, player_id);
            info!("Player {} rebound from {} to {}", player_id, previous, addr);
            return match displaced {
                Some(previous) => Bind::Displaced { previous },
                None => Bind::Rebound { previous },
            };
        }

        if self.by_player.len() >= self.max_connections {
            return Bind::Full;
        }

        self.by_player
            .insert(player_id, Connection::new(player_id, addr));
        self.by_addr.insert(addr, player_id);
        info!("Player {} connected from {}", player_id, addr);

        match displaced {
            Some(previous) => Bind::Displaced { previous },
            None => Bind::Accepted,
        }
    }

    pub fn player_at(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.by_addr.get(&addr).copied()
    }

    pub fn addr_of(&self, player_id: PlayerId) -> Option<SocketAddr> {
        self.by_player.get(&player_id).map(|c| c.addr)
    }

    /// Marks the peer at `addr` as alive. Returns its player, if bound.
    pub fn touch(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        let player_id = self.player_at(addr)?;
        if let Some(connection) = self.by_player.get_mut(&player_id) {
            connection.last_seen = Instant::now();
        }
        Some(player_id)
    }

    pub fn remove_player(&mut self, player_id: PlayerId) -> bool {
        if let Some(connection) = self.by_player.remove(&player_id) {
            self.by_addr.remove(&connection.addr);
            info!("Player {} disconnected ({})", player_id, connection.addr);
            true
        } else {
            false
        }
    }

    /// Unbinds and returns every player silent for longer than the timeout.
    pub fn check_timeouts(&mut self) -> Vec<PlayerId> {
        let timeout = self.timeout;
        let timed_out: Vec<PlayerId> = self
            .by_player
            .values()
            .filter(|connection| connection.is_timed_out(timeout))
            .map(|connection| connection.player_id)
            .collect();

        for player_id in &timed_out {
            self.remove_player(*player_id);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.by_player.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_player.is_empty()
    }
}

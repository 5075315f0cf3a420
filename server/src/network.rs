//! TCP front end and the fixed-tick simulation loop.
//!
//! Each accepted connection gets a reader task and a writer task; both
//! talk to the simulation loop through channels only. The loop is the
//! sole owner of the world: it drains inbound session events at the top
//! of every tick, steps the simulation once, and fans the resulting
//! messages out through the bounded per-session outbound queues.

use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use shared::protocol::{ClientMessage, ServerMessage};
use shared::{MAX_NAME_LEN, TILE_SIZE};

use crate::game::{GameEvent, World};
use crate::round::{StartCondition, WinCondition};
use crate::sessions::{Session, SessionManager};

/// Outbound lines buffered per connection before it is considered too
/// slow and dropped.
const OUTBOUND_QUEUE: usize = 256;

/// Longest simulation step accepted after a stall; anything longer is
/// clamped so entities do not teleport.
const MAX_DELTA: f32 = 1.0 / 20.0;

/// Position/rotation change below this does not produce an UPD.
const UPDATE_EPSILON: f32 = 0.005;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub tick_rate: u32,
    pub map_width: u32,
    pub map_height: u32,
    pub seed: u64,
    pub max_clients: usize,
    pub start_condition: StartCondition,
    pub win_condition: WinCondition,
}

/// Everything connection tasks report to the simulation loop.
enum SessionEvent {
    Connected {
        conn_id: u32,
        sender: mpsc::Sender<String>,
    },
    Message {
        conn_id: u32,
        msg: ClientMessage,
    },
    Disconnected {
        conn_id: u32,
    },
}

pub struct Server {
    /// Taken by `run` when the accept loop is spawned.
    listener: Option<TcpListener>,
    local_addr: std::net::SocketAddr,
    config: ServerConfig,
    world: World,
    sessions: SessionManager,
    tick_duration: Duration,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Server {
    /// Binds the listener and generates the world. Either failure is
    /// fatal at startup.
    pub async fn new(config: ServerConfig) -> Result<Server, Box<dyn std::error::Error>> {
        let world = World::new(
            config.map_width,
            config.map_height,
            config.seed,
            config.start_condition,
            config.win_condition,
        )?;
        let listener = TcpListener::bind(&config.addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate as f64);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            config,
            world,
            sessions: SessionManager::new(),
            tick_duration,
            event_tx,
            event_rx,
        })
    }

    /// Address the listener actually bound, for port-0 test setups.
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop and the simulation loop until the process
    /// is stopped.
    pub async fn run(mut self) {
        if let Some(listener) = self.listener.take() {
            let event_tx = self.event_tx.clone();
            tokio::spawn(async move {
                accept_loop(listener, event_tx).await;
            });
        }

        let mut interval = tokio::time::interval(self.tick_duration);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let start = Instant::now();
        let mut last_tick = Instant::now();
        let mut first_tick = true;

        info!(
            "Simulation running at {} ticks/s",
            self.config.tick_rate
        );

        loop {
            interval.tick().await;

            let now = Instant::now();
            let dt = now.duration_since(last_tick).as_secs_f32();
            last_tick = now;

            // The first interval fires immediately; skip its zero step.
            if first_tick {
                first_tick = false;
                continue;
            }
            let dt = dt.min(MAX_DELTA);
            let now_ms = start.elapsed().as_millis() as u64;

            while let Ok(event) = self.event_rx.try_recv() {
                self.handle_event(event, now_ms);
            }
            self.apply_removals();

            for session in self.sessions.values_mut() {
                let Some(player_id) = session.player_id else {
                    continue;
                };
                self.world.set_intent(player_id, session.intent);
                if session.shoot_requested {
                    session.shoot_requested = false;
                    self.world.try_shoot(player_id, now_ms);
                }
            }

            let events = self.world.step(dt, now_ms);
            for event in events {
                self.sessions.broadcast(&event_to_message(event));
            }

            self.broadcast_movement();
        }
    }

    fn handle_event(&mut self, event: SessionEvent, now_ms: u64) {
        match event {
            SessionEvent::Connected { conn_id, sender } => {
                debug!("Connection {} established", conn_id);
                self.sessions.insert(Session::new(conn_id, sender));
            }
            SessionEvent::Disconnected { conn_id } => {
                if let Some(session) = self.sessions.get_mut(conn_id) {
                    session.remove = true;
                }
            }
            SessionEvent::Message { conn_id, msg } => match msg {
                ClientMessage::Connect { name } => self.handle_connect(conn_id, name, now_ms),
                ClientMessage::Input {
                    forward,
                    backward,
                    left,
                    right,
                } => {
                    if let Some(session) = self.sessions.get_mut(conn_id) {
                        session.intent.forward = forward;
                        session.intent.backward = backward;
                        session.intent.left = left;
                        session.intent.right = right;
                    }
                }
                ClientMessage::Shoot => {
                    if let Some(session) = self.sessions.get_mut(conn_id) {
                        session.shoot_requested = true;
                    }
                }
                ClientMessage::Ping => {
                    self.sessions.send_to(conn_id, &ServerMessage::Pong);
                }
            },
        }
    }

    fn handle_connect(&mut self, conn_id: u32, name: String, now_ms: u64) {
        // Sessions marked for removal free their slot immediately, even
        // though their tanks despawn at the tick boundary.
        let at_capacity = self.sessions.player_count() >= self.config.max_clients;
        let Some(session) = self.sessions.get_mut(conn_id) else {
            return;
        };
        if session.player_id.is_some() {
            session.send(&ServerMessage::Error {
                text: "already joined".to_string(),
            });
            return;
        }
        let Some(name) = sanitize_name(&name) else {
            warn!("Connection {} sent an invalid name", conn_id);
            session.send(&ServerMessage::Error {
                text: "invalid name".to_string(),
            });
            return;
        };
        if at_capacity {
            session.send(&ServerMessage::Error {
                text: "server full".to_string(),
            });
            session.remove = true;
            return;
        }

        // Connection ID doubles as player ID; both are unique per
        // process lifetime.
        let player_id = conn_id;
        session.player_id = Some(player_id);
        let tank = self.world.add_tank(player_id, name.clone());
        let spawn = (tank.pos.x, tank.pos.y, tank.rot);
        info!("Player {} ({}) joined", player_id, name);

        self.send_join_snapshot(conn_id, player_id, now_ms);

        self.sessions.broadcast_except(
            conn_id,
            &ServerMessage::NewPlayer {
                id: player_id,
                x: spawn.0,
                y: spawn.1,
                rot: spawn.2,
                name: name.clone(),
                color: crate::game::color_for(player_id),
            },
        );
        self.sessions.broadcast_except(
            conn_id,
            &ServerMessage::Announce {
                text: format!("{} joined", name),
            },
        );
    }

    /// Initial state for a new session: its ID, the map header and
    /// terrain rows, the current phase, then every tank and its lives.
    fn send_join_snapshot(&mut self, conn_id: u32, player_id: u32, now_ms: u64) {
        let mut lines = Vec::new();
        lines.push(ServerMessage::AssignId { id: player_id }.encode());
        lines.push(
            ServerMessage::MapInfo {
                width: self.world.terrain.width(),
                height: self.world.terrain.height(),
                tile_size: TILE_SIZE as u32,
            }
            .encode(),
        );
        for (row, data) in self.world.terrain.encode_rows().into_iter().enumerate() {
            lines.push(
                ServerMessage::TerrainRow {
                    row: row as u32,
                    data,
                }
                .encode(),
            );
        }
        lines.push(
            ServerMessage::GameState {
                phase: self.world.round.phase(),
                time_data: self.world.round.time_data(now_ms),
            }
            .encode(),
        );

        let mut ids: Vec<u32> = self.world.tanks.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let tank = &self.world.tanks[&id];
            lines.push(
                ServerMessage::NewPlayer {
                    id,
                    x: tank.pos.x,
                    y: tank.pos.y,
                    rot: tank.rot,
                    name: tank.name.clone(),
                    color: tank.color,
                }
                .encode(),
            );
            lines.push(
                ServerMessage::Lives {
                    id,
                    lives: tank.lives,
                }
                .encode(),
            );
            if tank.spectator {
                lines.push(ServerMessage::SpectatePermanent { id }.encode());
            }
        }

        if let Some(session) = self.sessions.get_mut(conn_id) {
            for line in lines {
                session.send_line(line);
            }
        }
    }

    fn apply_removals(&mut self) {
        for (conn_id, player_id) in self.sessions.take_removals() {
            debug!("Connection {} removed", conn_id);
            let Some(player_id) = player_id else {
                continue;
            };
            if let Some(tank) = self.world.remove_tank(player_id) {
                self.sessions
                    .broadcast(&ServerMessage::PlayerLeft { id: player_id });
                self.sessions.broadcast(&ServerMessage::Announce {
                    text: format!("{} left", tank.name),
                });
            }
        }
    }

    /// Sends UPD deltas for every tank that moved since its last one.
    fn broadcast_movement(&mut self) {
        let mut updates = Vec::new();
        for tank in self.world.tanks.values_mut() {
            if !tank.simulated() {
                continue;
            }
            let current = (tank.pos.x, tank.pos.y, tank.rot);
            let moved = match tank.last_sent {
                Some((x, y, rot)) => {
                    (current.0 - x).abs() > UPDATE_EPSILON
                        || (current.1 - y).abs() > UPDATE_EPSILON
                        || (current.2 - rot).abs() > UPDATE_EPSILON
                }
                None => true,
            };
            if moved {
                tank.last_sent = Some(current);
                updates.push(ServerMessage::Update {
                    id: tank.id,
                    x: current.0,
                    y: current.1,
                    rot: current.2,
                });
            }
        }
        for update in updates {
            self.sessions.broadcast(&update);
        }
    }
}

/// Display name rules: surrounding whitespace trimmed, control
/// characters and the field delimiter stripped, length capped. An
/// empty result rejects the join.
fn sanitize_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control() && *c != shared::protocol::DELIMITER)
        .take(MAX_NAME_LEN)
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn event_to_message(event: GameEvent) -> ServerMessage {
    match event {
        GameEvent::Shot {
            bullet_id,
            owner_id,
            x,
            y,
            dir_x,
            dir_y,
        } => ServerMessage::Shot {
            bullet_id,
            owner_id,
            x,
            y,
            dir_x,
            dir_y,
        },
        GameEvent::Hit {
            target_id,
            shooter_id,
            bullet_id,
            damage,
        } => ServerMessage::Hit {
            target_id,
            shooter_id,
            bullet_id,
            damage,
        },
        GameEvent::Destroyed {
            target_id,
            shooter_id,
        } => ServerMessage::Destroyed {
            target_id,
            shooter_id,
        },
        GameEvent::Respawned { id, x, y, rot } => ServerMessage::Respawn { id, x, y, rot },
        GameEvent::Lives { id, lives } => ServerMessage::Lives { id, lives },
        GameEvent::TileChanged { col, row, state } => ServerMessage::TileChanged {
            x: col,
            y: row,
            state,
        },
        GameEvent::PhaseChanged { phase, time_data } => {
            ServerMessage::GameState { phase, time_data }
        }
        GameEvent::RoundOver {
            winner_id,
            winner_name,
            millis,
        } => ServerMessage::RoundOver {
            winner_id,
            winner_name,
            millis,
        },
        GameEvent::Announce { text } => ServerMessage::Announce { text },
        GameEvent::SpectateStart { id } => ServerMessage::SpectateStart { id },
        GameEvent::SpectateEnd { id } => ServerMessage::SpectateEnd { id },
        GameEvent::SpectatePermanent { id } => ServerMessage::SpectatePermanent { id },
    }
}

async fn accept_loop(listener: TcpListener, event_tx: mpsc::UnboundedSender<SessionEvent>) {
    let mut next_conn_id: u32 = 1;
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let conn_id = next_conn_id;
                next_conn_id += 1;
                debug!("Accepted {} as connection {}", addr, conn_id);

                if stream.set_nodelay(true).is_err() {
                    warn!("Failed to set TCP_NODELAY for connection {}", conn_id);
                }
                let (read_half, write_half) = stream.into_split();
                let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);

                if event_tx
                    .send(SessionEvent::Connected {
                        conn_id,
                        sender: out_tx,
                    })
                    .is_err()
                {
                    return;
                }

                let reader_tx = event_tx.clone();
                tokio::spawn(async move {
                    read_loop(conn_id, read_half, reader_tx).await;
                });
                tokio::spawn(async move {
                    write_loop(conn_id, write_half, out_rx).await;
                });
            }
            Err(err) => {
                error!("Accept failed: {}", err);
            }
        }
    }
}

/// Reads newline-terminated messages until EOF or error. Malformed
/// lines are logged and dropped; the connection stays up.
async fn read_loop(
    conn_id: u32,
    read_half: OwnedReadHalf,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match ClientMessage::decode(&line) {
                Ok(msg) => {
                    if event_tx
                        .send(SessionEvent::Message { conn_id, msg })
                        .is_err()
                    {
                        return;
                    }
                }
                Err(err) => {
                    warn!("Connection {}: dropping bad line: {}", conn_id, err);
                }
            },
            Ok(None) => break,
            Err(err) => {
                debug!("Connection {} read error: {}", conn_id, err);
                break;
            }
        }
    }
    let _ = event_tx.send(SessionEvent::Disconnected { conn_id });
}

async fn write_loop(
    conn_id: u32,
    mut write_half: OwnedWriteHalf,
    mut out_rx: mpsc::Receiver<String>,
) {
    while let Some(mut line) = out_rx.recv().await {
        line.push('\n');
        if let Err(err) = write_half.write_all(line.as_bytes()).await {
            debug!("Connection {} write error: {}", conn_id, err);
            return;
        }
    }
}

//! Round lifecycle: WAITING, COUNTDOWN, PLAYING, ROUND_OVER.
//!
//! The machine is evaluated once per tick after physics, so every
//! transition it makes is consistent with the entity state broadcast in
//! the same tick. All timing runs on the simulation clock.

use std::collections::HashMap;

use log::info;
use rand::rngs::StdRng;

use shared::protocol::GamePhase;
use shared::{RESPAWN_DELAY_MS, ROUND_OVER_DELAY_MS, TANK_LIVES, TANK_MAX_HEALTH};

use crate::game::{Bullet, GameEvent, Tank};
use crate::terrain::TerrainGrid;

/// When a round is allowed to start out of WAITING.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartCondition {
    /// First player in starts the round.
    Immediate,
    /// First player in arms a countdown of this many milliseconds.
    Countdown(u64),
    /// Round starts the tick this many players are present.
    MinPlayers(usize),
}

/// When a running round ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinCondition {
    /// Endless round; only an empty server ends it.
    None,
    /// Round ends after this many milliseconds; most kills wins.
    Timed(u64),
    /// First player to reach this many kills wins.
    FirstToScore(u32),
    /// Round ends when at most one participant still has lives.
    LastSurvivor,
}

#[derive(Debug, Clone, Copy)]
struct PendingRespawn {
    player_id: u32,
    due_ms: u64,
}

pub struct RoundStateMachine {
    phase: GamePhase,
    start: StartCondition,
    win: WinCondition,
    round_start_ms: u64,
    countdown_end_ms: u64,
    round_over_until_ms: u64,
    /// Length of the finished round, frozen for GST while ROUND_OVER.
    round_over_elapsed: u64,
    /// Player count at round start, for the LastSurvivor check.
    participants: usize,
    kills: HashMap<u32, u32>,
    pending_respawns: Vec<PendingRespawn>,
}

impl RoundStateMachine {
    pub fn new(start: StartCondition, win: WinCondition) -> RoundStateMachine {
        RoundStateMachine {
            phase: GamePhase::Waiting,
            start,
            win,
            round_start_ms: 0,
            countdown_end_ms: 0,
            round_over_until_ms: 0,
            round_over_elapsed: 0,
            participants: 0,
            kills: HashMap::new(),
            pending_respawns: Vec::new(),
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Phase-dependent payload for the GST message: zero while waiting,
    /// remaining countdown, elapsed round time, or the finished round's
    /// length. Always a duration, so clients need no reference to the
    /// server clock.
    pub fn time_data(&self, now_ms: u64) -> u64 {
        match self.phase {
            GamePhase::Waiting => 0,
            GamePhase::Countdown => self.countdown_end_ms.saturating_sub(now_ms),
            GamePhase::Playing => now_ms.saturating_sub(self.round_start_ms),
            GamePhase::RoundOver => self.round_over_elapsed,
        }
    }

    pub fn record_kill(&mut self, shooter_id: u32) {
        *self.kills.entry(shooter_id).or_insert(0) += 1;
    }

    /// Handles one destroyed tank: spends a life, then either schedules
    /// a respawn or retires the player to spectator for the round.
    pub fn on_destroyed(&mut self, tank: &mut Tank, now_ms: u64, events: &mut Vec<GameEvent>) {
        tank.lives = tank.lives.saturating_sub(1);
        events.push(GameEvent::Lives {
            id: tank.id,
            lives: tank.lives,
        });

        if tank.lives > 0 {
            self.pending_respawns.push(PendingRespawn {
                player_id: tank.id,
                due_ms: now_ms + RESPAWN_DELAY_MS,
            });
            events.push(GameEvent::SpectateStart { id: tank.id });
        } else {
            tank.spectator = true;
            info!("Player {} is out of lives, spectating", tank.id);
            events.push(GameEvent::SpectatePermanent { id: tank.id });
        }
    }

    /// One per-tick evaluation. May transition at most one phase per
    /// call; chained transitions settle over consecutive ticks.
    pub fn evaluate(
        &mut self,
        tanks: &mut HashMap<u32, Tank>,
        bullets: &mut Vec<Bullet>,
        terrain: &TerrainGrid,
        rng: &mut StdRng,
        now_ms: u64,
        events: &mut Vec<GameEvent>,
    ) {
        match self.phase {
            GamePhase::Waiting => {
                if tanks.is_empty() {
                    return;
                }
                match self.start {
                    StartCondition::Immediate => {
                        self.enter_playing(tanks, bullets, terrain, rng, now_ms, events);
                    }
                    StartCondition::Countdown(ms) => {
                        self.phase = GamePhase::Countdown;
                        self.countdown_end_ms = now_ms + ms;
                        info!("Countdown started, round begins in {}ms", ms);
                        events.push(GameEvent::PhaseChanged {
                            phase: GamePhase::Countdown,
                            time_data: ms,
                        });
                        events.push(GameEvent::Announce {
                            text: format!("Round starting in {} seconds", ms / 1000),
                        });
                    }
                    StartCondition::MinPlayers(n) => {
                        if tanks.len() >= n {
                            self.enter_playing(tanks, bullets, terrain, rng, now_ms, events);
                        }
                    }
                }
            }
            GamePhase::Countdown => {
                if tanks.is_empty() {
                    self.enter_waiting(now_ms, events);
                } else if now_ms >= self.countdown_end_ms {
                    self.enter_playing(tanks, bullets, terrain, rng, now_ms, events);
                }
            }
            GamePhase::Playing => {
                self.process_respawns(tanks, terrain, rng, now_ms, events);

                if tanks.is_empty() {
                    self.enter_waiting(now_ms, events);
                    return;
                }
                if let Some((winner_id, winner_name)) = self.check_win(tanks, now_ms) {
                    self.enter_round_over(winner_id, winner_name, now_ms, events);
                }
            }
            GamePhase::RoundOver => {
                if now_ms >= self.round_over_until_ms {
                    self.enter_waiting(now_ms, events);
                }
            }
        }
    }

    fn process_respawns(
        &mut self,
        tanks: &mut HashMap<u32, Tank>,
        terrain: &TerrainGrid,
        rng: &mut StdRng,
        now_ms: u64,
        events: &mut Vec<GameEvent>,
    ) {
        let due: Vec<u32> = self
            .pending_respawns
            .iter()
            .filter(|r| now_ms >= r.due_ms)
            .map(|r| r.player_id)
            .collect();
        if due.is_empty() {
            return;
        }
        self.pending_respawns.retain(|r| now_ms < r.due_ms);

        for player_id in due {
            // Disconnected players simply drop off the respawn list.
            let Some(tank) = tanks.get_mut(&player_id) else {
                continue;
            };
            tank.health = TANK_MAX_HEALTH;
            tank.destroyed = false;
            tank.pos = terrain.random_spawn(rng);
            tank.rot = 0.0;
            events.push(GameEvent::Respawned {
                id: tank.id,
                x: tank.pos.x,
                y: tank.pos.y,
                rot: tank.rot,
            });
            events.push(GameEvent::SpectateEnd { id: tank.id });
        }
    }

    fn enter_playing(
        &mut self,
        tanks: &mut HashMap<u32, Tank>,
        bullets: &mut Vec<Bullet>,
        terrain: &TerrainGrid,
        rng: &mut StdRng,
        now_ms: u64,
        events: &mut Vec<GameEvent>,
    ) {
        self.phase = GamePhase::Playing;
        self.round_start_ms = now_ms;
        self.kills.clear();
        self.pending_respawns.clear();
        self.participants = tanks.len();
        bullets.clear();

        info!("Round started with {} players", self.participants);
        events.push(GameEvent::PhaseChanged {
            phase: GamePhase::Playing,
            time_data: 0,
        });

        // Deterministic reset order so spawn positions only depend on
        // the RNG stream, not HashMap iteration order.
        let mut ids: Vec<u32> = tanks.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let Some(tank) = tanks.get_mut(&id) else {
                continue;
            };
            let was_spectator = tank.spectator;
            tank.lives = TANK_LIVES;
            tank.health = TANK_MAX_HEALTH;
            tank.destroyed = false;
            tank.spectator = false;
            tank.pos = terrain.random_spawn(rng);
            tank.rot = 0.0;

            events.push(GameEvent::Respawned {
                id,
                x: tank.pos.x,
                y: tank.pos.y,
                rot: tank.rot,
            });
            events.push(GameEvent::Lives {
                id,
                lives: tank.lives,
            });
            if was_spectator {
                events.push(GameEvent::SpectateEnd { id });
            }
        }

        events.push(GameEvent::Announce {
            text: "Round started".to_string(),
        });
    }

    fn enter_round_over(
        &mut self,
        winner_id: u32,
        winner_name: String,
        now_ms: u64,
        events: &mut Vec<GameEvent>,
    ) {
        self.phase = GamePhase::RoundOver;
        self.round_over_elapsed = now_ms.saturating_sub(self.round_start_ms);
        self.round_over_until_ms = now_ms + ROUND_OVER_DELAY_MS;
        self.pending_respawns.clear();

        let text = if winner_id == 0 {
            "Round over: draw".to_string()
        } else {
            format!("Round over: {} wins", winner_name)
        };
        info!("{} ({}ms)", text, self.round_over_elapsed);

        events.push(GameEvent::PhaseChanged {
            phase: GamePhase::RoundOver,
            time_data: self.round_over_elapsed,
        });
        events.push(GameEvent::RoundOver {
            winner_id,
            winner_name,
            millis: self.round_over_elapsed,
        });
        events.push(GameEvent::Announce { text });
    }

    fn enter_waiting(&mut self, _now_ms: u64, events: &mut Vec<GameEvent>) {
        self.phase = GamePhase::Waiting;
        self.pending_respawns.clear();
        self.kills.clear();
        info!("Waiting for players");
        events.push(GameEvent::PhaseChanged {
            phase: GamePhase::Waiting,
            time_data: 0,
        });
    }

    /// Winner ID 0 with an empty name means a draw.
    fn check_win(&self, tanks: &HashMap<u32, Tank>, now_ms: u64) -> Option<(u32, String)> {
        match self.win {
            WinCondition::None => None,
            WinCondition::Timed(ms) => {
                if now_ms.saturating_sub(self.round_start_ms) < ms {
                    return None;
                }
                Some(self.top_scorer(tanks))
            }
            WinCondition::FirstToScore(target) => {
                let leader = self
                    .kills
                    .iter()
                    .filter(|(_, kills)| **kills >= target)
                    .max_by_key(|(_, kills)| **kills)?;
                let name = tanks
                    .get(leader.0)
                    .map(|t| t.name.clone())
                    .unwrap_or_default();
                Some((*leader.0, name))
            }
            WinCondition::LastSurvivor => {
                if self.participants < 2 {
                    return None;
                }
                let mut alive = tanks.values().filter(|t| !t.spectator);
                match (alive.next(), alive.next()) {
                    (Some(last), None) => Some((last.id, last.name.clone())),
                    (None, None) => Some((0, String::new())),
                    _ => None,
                }
            }
        }
    }

    /// Player with strictly the most kills, or a draw on a tie.
    fn top_scorer(&self, tanks: &HashMap<u32, Tank>) -> (u32, String) {
        let best = self.kills.values().copied().max().unwrap_or(0);
        if best == 0 {
            return (0, String::new());
        }
        let mut leaders = self.kills.iter().filter(|(_, kills)| **kills == best);
        match (leaders.next(), leaders.next()) {
            (Some((id, _)), None) => {
                let name = tanks.get(id).map(|t| t.name.clone()).unwrap_or_default();
                (*id, name)
            }
            _ => (0, String::new()),
        }
    }
}

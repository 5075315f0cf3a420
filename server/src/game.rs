//! Authoritative world state: tanks, bullets, terrain, fire, and the
//! round machine, owned exclusively by the simulation loop. Connection
//! tasks never touch this directly; they hand commands to the loop
//! through the session event channel.

use std::collections::HashMap;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use shared::protocol::GamePhase;
use shared::terrain::TileState;
use shared::{
    BULLET_DAMAGE, BULLET_LIFETIME_MS, BULLET_RADIUS, BULLET_SPEED, EXPLOSION_RADIUS,
    SHOOT_COOLDOWN_MS, TANK_MAX_HEALTH, TANK_MOVE_SPEED, TANK_RADIUS, TANK_REVERSE_FACTOR,
    TANK_TURN_SPEED,
};

use crate::fire::FireSimulation;
use crate::physics::{self, Vec2};
use crate::round::{RoundStateMachine, StartCondition, WinCondition};
use crate::terrain::TerrainGrid;

/// Latest movement intent received from a client. Last write wins;
/// the simulation samples it once per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputIntent {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

impl InputIntent {
    pub fn is_idle(&self) -> bool {
        !(self.forward || self.backward || self.left || self.right)
    }
}

/// Fixed palette cycled by player ID, so colors are stable across a
/// reconnecting client's lifetime without any negotiation.
const TANK_COLORS: [(u8, u8, u8); 8] = [
    (66, 135, 245),
    (245, 66, 66),
    (66, 245, 96),
    (179, 66, 245),
    (245, 147, 66),
    (66, 227, 245),
    (245, 66, 194),
    (240, 245, 66),
];

pub fn color_for(player_id: u32) -> (u8, u8, u8) {
    TANK_COLORS[(player_id as usize).wrapping_sub(1) % TANK_COLORS.len()]
}

#[derive(Debug, Clone)]
pub struct Tank {
    pub id: u32,
    pub pos: Vec2,
    pub rot: f32,
    pub health: i32,
    pub lives: u32,
    pub name: String,
    pub color: (u8, u8, u8),
    pub destroyed: bool,
    /// Out of respawns for the current round: no tank is simulated or
    /// broadcast, but the session keeps receiving everything.
    pub spectator: bool,
    pub intent: InputIntent,
    pub last_shot_ms: Option<u64>,
    /// Position/rotation of the last UPD delta sent for this tank.
    pub last_sent: Option<(f32, f32, f32)>,
}

impl Tank {
    pub fn new(id: u32, name: String, pos: Vec2) -> Tank {
        Tank {
            id,
            pos,
            rot: 0.0,
            health: TANK_MAX_HEALTH,
            lives: shared::TANK_LIVES,
            name,
            color: color_for(id),
            destroyed: false,
            spectator: false,
            intent: InputIntent::default(),
            last_shot_ms: None,
            last_sent: None,
        }
    }

    /// Simulated means the physics step moves it and bullets can hit it.
    pub fn simulated(&self) -> bool {
        !self.destroyed && !self.spectator
    }
}

#[derive(Debug, Clone)]
pub struct Bullet {
    pub id: u32,
    pub owner: u32,
    pub pos: Vec2,
    pub vel: Vec2,
    pub rot: f32,
    pub spawned_ms: u64,
    pub destroyed: bool,
}

/// One-shot occurrences produced by a tick, translated into broadcast
/// messages by the network layer.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Shot {
        bullet_id: u32,
        owner_id: u32,
        x: f32,
        y: f32,
        dir_x: f32,
        dir_y: f32,
    },
    Hit {
        target_id: u32,
        shooter_id: u32,
        bullet_id: u32,
        damage: i32,
    },
    Destroyed {
        target_id: u32,
        shooter_id: u32,
    },
    Respawned {
        id: u32,
        x: f32,
        y: f32,
        rot: f32,
    },
    Lives {
        id: u32,
        lives: u32,
    },
    TileChanged {
        col: u32,
        row: u32,
        state: TileState,
    },
    PhaseChanged {
        phase: GamePhase,
        time_data: u64,
    },
    RoundOver {
        winner_id: u32,
        winner_name: String,
        millis: u64,
    },
    Announce {
        text: String,
    },
    SpectateStart {
        id: u32,
    },
    SpectateEnd {
        id: u32,
    },
    SpectatePermanent {
        id: u32,
    },
}

/// The complete simulation state. Every mutation happens on the
/// simulation loop; sessions only observe broadcasts.
pub struct World {
    pub tanks: HashMap<u32, Tank>,
    pub bullets: Vec<Bullet>,
    pub terrain: TerrainGrid,
    pub fire: FireSimulation,
    pub round: RoundStateMachine,
    rng: StdRng,
    next_bullet_id: u32,
    pending_events: Vec<GameEvent>,
}

impl World {
    /// Builds the world, generating terrain from the given seed.
    /// Fails when the dimensions are unusable or generation produced a
    /// map with nowhere to spawn; both are fatal startup errors.
    pub fn new(
        width_tiles: u32,
        height_tiles: u32,
        seed: u64,
        start: StartCondition,
        win: WinCondition,
    ) -> Result<World, String> {
        if width_tiles == 0 || height_tiles == 0 {
            return Err(format!(
                "map dimensions must be non-zero, got {}x{}",
                width_tiles, height_tiles
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let terrain = TerrainGrid::generate(width_tiles, height_tiles, &mut rng);
        if terrain.passable_tile_count() == 0 {
            return Err("terrain generation produced no passable tiles".to_string());
        }

        Ok(World {
            tanks: HashMap::new(),
            bullets: Vec::new(),
            terrain,
            fire: FireSimulation::new(),
            round: RoundStateMachine::new(start, win),
            rng,
            next_bullet_id: 1,
            pending_events: Vec::new(),
        })
    }

    pub fn add_tank(&mut self, id: u32, name: String) -> &Tank {
        let pos = self.terrain.random_spawn(&mut self.rng);
        let tank = Tank::new(id, name, pos);
        info!(
            "Added tank {} ({}) at ({:.1}, {:.1})",
            id, tank.name, pos.x, pos.y
        );
        self.tanks.insert(id, tank);
        &self.tanks[&id]
    }

    pub fn remove_tank(&mut self, id: u32) -> Option<Tank> {
        let tank = self.tanks.remove(&id);
        if tank.is_some() {
            info!("Removed tank {}", id);
        }
        tank
    }

    /// Copies the latest session intent onto the tank. Spectators and
    /// unknown IDs are silently ignored.
    pub fn set_intent(&mut self, id: u32, intent: InputIntent) {
        if let Some(tank) = self.tanks.get_mut(&id) {
            if !tank.spectator {
                tank.intent = intent;
            }
        }
    }

    /// Spawns a bullet for the player if the round is live, the tank
    /// can act, and the cooldown has elapsed. Violations are dropped
    /// without error, so spamming SHT yields at most one shot per
    /// cooldown window.
    pub fn try_shoot(&mut self, id: u32, now_ms: u64) {
        if self.round.phase() != GamePhase::Playing {
            return;
        }
        let Some(tank) = self.tanks.get_mut(&id) else {
            return;
        };
        if !tank.simulated() {
            return;
        }
        if let Some(last) = tank.last_shot_ms {
            if now_ms.saturating_sub(last) < SHOOT_COOLDOWN_MS {
                return;
            }
        }
        tank.last_shot_ms = Some(now_ms);

        let dir = Vec2::from_angle(tank.rot);
        let pos = tank.pos.add(&dir.scale(TANK_RADIUS + BULLET_RADIUS + 1.0));
        let bullet = Bullet {
            id: self.next_bullet_id,
            owner: id,
            pos,
            vel: dir.scale(BULLET_SPEED),
            rot: tank.rot,
            spawned_ms: now_ms,
            destroyed: false,
        };
        self.next_bullet_id += 1;

        self.pending_events.push(GameEvent::Shot {
            bullet_id: bullet.id,
            owner_id: id,
            x: pos.x,
            y: pos.y,
            dir_x: dir.x,
            dir_y: dir.y,
        });
        self.bullets.push(bullet);
    }

    /// One simulation step. Order is fixed: physics, then terrain
    /// fire, then round evaluation, so a round transition can never
    /// contradict the entity state broadcast alongside it.
    pub fn step(&mut self, dt: f32, now_ms: u64) -> Vec<GameEvent> {
        let mut events = std::mem::take(&mut self.pending_events);

        if self.round.phase() == GamePhase::Playing {
            self.integrate_tanks(dt);
            self.integrate_bullets(dt, now_ms, &mut events);
        }

        for change in self.fire.update(&mut self.terrain, now_ms) {
            events.push(GameEvent::TileChanged {
                col: change.col,
                row: change.row,
                state: change.state,
            });
        }

        self.round.evaluate(
            &mut self.tanks,
            &mut self.bullets,
            &self.terrain,
            &mut self.rng,
            now_ms,
            &mut events,
        );

        events
    }

    fn integrate_tanks(&mut self, dt: f32) {
        for tank in self.tanks.values_mut() {
            if !tank.simulated() || tank.intent.is_idle() {
                continue;
            }

            if tank.intent.left {
                tank.rot -= TANK_TURN_SPEED * dt;
            }
            if tank.intent.right {
                tank.rot += TANK_TURN_SPEED * dt;
            }

            let drive = if tank.intent.forward {
                1.0
            } else if tank.intent.backward {
                -TANK_REVERSE_FACTOR
            } else {
                0.0
            };

            if drive != 0.0 {
                let modifier = self.terrain.speed_modifier_at(tank.pos);
                let dir = Vec2::from_angle(tank.rot);
                let step = dir.scale(TANK_MOVE_SPEED * modifier * drive * dt);
                let next = tank.pos.add(&step);
                // Terrain is a hard collider; tank/tank overlap is not.
                if self.terrain.passable_at(next) {
                    tank.pos = next;
                }
            }

            // Keep the full collision footprint inside the map. This is
            // a silent correction, not an error.
            tank.pos.x = tank
                .pos
                .x
                .clamp(TANK_RADIUS, self.terrain.world_width() - TANK_RADIUS);
            tank.pos.y = tank
                .pos
                .y
                .clamp(TANK_RADIUS, self.terrain.world_height() - TANK_RADIUS);
        }
    }

    fn integrate_bullets(&mut self, dt: f32, now_ms: u64, events: &mut Vec<GameEvent>) {
        let mut explosions: Vec<Vec2> = Vec::new();
        let mut kills: Vec<(u32, u32)> = Vec::new();

        for bullet in &mut self.bullets {
            let prev = bullet.pos;
            bullet.pos = bullet.pos.add(&bullet.vel.scale(dt));

            if now_ms.saturating_sub(bullet.spawned_ms) >= BULLET_LIFETIME_MS {
                bullet.destroyed = true;
                continue;
            }
            if !self.terrain.contains(bullet.pos) {
                bullet.destroyed = true;
                continue;
            }
            if self.terrain.blocks_bullets_at(bullet.pos) {
                bullet.destroyed = true;
                explosions.push(bullet.pos);
                continue;
            }

            for tank in self.tanks.values_mut() {
                if tank.id == bullet.owner || !tank.simulated() {
                    continue;
                }
                if !physics::segment_hits_circle(
                    prev,
                    bullet.pos,
                    tank.pos,
                    TANK_RADIUS + BULLET_RADIUS,
                ) {
                    continue;
                }

                bullet.destroyed = true;
                explosions.push(bullet.pos);
                tank.health -= BULLET_DAMAGE;
                events.push(GameEvent::Hit {
                    target_id: tank.id,
                    shooter_id: bullet.owner,
                    bullet_id: bullet.id,
                    damage: BULLET_DAMAGE,
                });

                if tank.health <= 0 {
                    tank.health = 0;
                    tank.destroyed = true;
                    kills.push((tank.id, bullet.owner));
                }
                break;
            }
        }

        // Destroyed bullets disappear this tick and are never revived.
        self.bullets.retain(|b| !b.destroyed);

        for (target_id, shooter_id) in kills {
            events.push(GameEvent::Destroyed {
                target_id,
                shooter_id,
            });
            if shooter_id != target_id {
                self.round.record_kill(shooter_id);
            }
            if let Some(tank) = self.tanks.get_mut(&target_id) {
                self.round.on_destroyed(tank, now_ms, events);
            }
        }

        for center in explosions {
            for change in self.fire.on_explosion(
                &mut self.terrain,
                center,
                EXPLOSION_RADIUS,
                now_ms,
                &mut self.rng,
            ) {
                events.push(GameEvent::TileChanged {
                    col: change.col,
                    row: change.row,
                    state: change.state,
                });
            }
        }
    }
}

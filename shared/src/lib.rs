//! Types shared between the authoritative tank server and its clients:
//! the line-oriented wire protocol codec, terrain tile definitions with
//! their wire encoding, and the gameplay constants both sides agree on.

pub mod protocol;
pub mod terrain;

/// Edge length of one terrain tile in world units.
pub const TILE_SIZE: f32 = 32.0;

/// Collision radius of a tank hull.
pub const TANK_RADIUS: f32 = 14.0;
/// Forward speed on terrain with modifier 1.0, world units per second.
pub const TANK_MOVE_SPEED: f32 = 120.0;
/// Reverse gear runs at a fraction of forward speed.
pub const TANK_REVERSE_FACTOR: f32 = 0.5;
/// Turn rate in radians per second.
pub const TANK_TURN_SPEED: f32 = 3.0;
pub const TANK_MAX_HEALTH: i32 = 100;
/// Respawns granted to each player at round start.
pub const TANK_LIVES: u32 = 3;

pub const BULLET_SPEED: f32 = 320.0;
pub const BULLET_RADIUS: f32 = 3.0;
/// Bullets self-destruct once they have been alive this long.
pub const BULLET_LIFETIME_MS: u64 = 2000;
pub const BULLET_DAMAGE: i32 = 25;
/// Minimum interval between accepted shots from one tank.
pub const SHOOT_COOLDOWN_MS: u64 = 500;

/// World-unit radius of the ignition attempt around a bullet impact.
pub const EXPLOSION_RADIUS: f32 = 48.0;

pub const RESPAWN_DELAY_MS: u64 = 3000;
/// Pause on the results screen before the next round cycles to waiting.
pub const ROUND_OVER_DELAY_MS: u64 = 5000;

/// Player names longer than this are truncated on connect.
pub const MAX_NAME_LEN: usize = 16;

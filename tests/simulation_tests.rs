//! Scenario tests driving the simulation directly, without the network
//! layer: full fire timelines, lives and respawns, terrain slowdown,
//! and the round lifecycle from first kill to the next round.

use assert_approx_eq::assert_approx_eq;

use server::game::{GameEvent, InputIntent, World};
use server::round::{StartCondition, WinCondition};
use shared::protocol::GamePhase;
use shared::terrain::{TileState, TileType};
use shared::{
    BULLET_DAMAGE, BULLET_LIFETIME_MS, RESPAWN_DELAY_MS, ROUND_OVER_DELAY_MS, TANK_LIVES,
    TANK_MOVE_SPEED, TANK_RADIUS,
};

const DT: f32 = 1.0 / 30.0;

fn playing_world(win: WinCondition) -> World {
    let mut world = World::new(24, 24, 11, StartCondition::Immediate, win).unwrap();
    world.add_tank(1, "alpha".to_string());
    world.add_tank(2, "bravo".to_string());
    world.step(0.0, 0);
    assert_eq!(world.round.phase(), GamePhase::Playing);
    world
}

/// Overwrites a rectangle of tiles so a test has known ground under it.
fn paint(world: &mut World, cols: std::ops::Range<u32>, rows: std::ops::Range<u32>, t: TileType) {
    for row in rows {
        for col in cols.clone() {
            let tile = world.terrain.tile_mut(col, row).unwrap();
            tile.base = t;
            tile.overlay = None;
        }
    }
}

/// Puts the shooter on a grass corridor aiming right at the target,
/// 80 world units away.
fn line_up_shot(world: &mut World) {
    paint(world, 3..20, 9..12, TileType::Grass);
    let shooter_pos = world.terrain.tile_center(5, 10);
    let target_pos = shooter_pos.add(&server::physics::Vec2::new(80.0, 0.0));
    {
        let shooter = world.tanks.get_mut(&1).unwrap();
        shooter.pos = shooter_pos;
        shooter.rot = 0.0;
    }
    {
        let target = world.tanks.get_mut(&2).unwrap();
        target.pos = target_pos;
        target.rot = 0.0;
    }
}

fn step_collect(world: &mut World, from_ms: u64, ticks: u32) -> (Vec<GameEvent>, u64) {
    let mut events = Vec::new();
    let mut now = from_ms;
    for _ in 0..ticks {
        now += 33;
        events.extend(world.step(DT, now));
    }
    (events, now)
}

#[test]
fn test_fire_timeline_over_world_steps() {
    let mut world = playing_world(WinCondition::None);
    paint(&mut world, 2..5, 2..5, TileType::Grass);

    let change = world.fire.ignite(&mut world.terrain, 3, 3, 1000).unwrap();
    assert_eq!(change.state, TileState::Igniting);
    let burn = TileType::Grass.burn_duration_ms();

    let states = |events: &[GameEvent]| -> Vec<TileState> {
        events
            .iter()
            .filter_map(|e| match e {
                GameEvent::TileChanged { col: 3, row: 3, state } => Some(*state),
                _ => None,
            })
            .collect()
    };

    let events = world.step(0.0, 1000 + 2000);
    assert_eq!(states(&events), vec![TileState::Burning]);

    let events = world.step(0.0, 1000 + burn - 3000);
    assert_eq!(states(&events), vec![TileState::Smoldering]);

    let events = world.step(0.0, 1000 + burn);
    assert_eq!(states(&events), vec![TileState::Scorched]);

    // Terminal state: later steps emit nothing more for this tile.
    let events = world.step(0.0, 1000 + burn * 4);
    assert!(states(&events).is_empty());
    assert_eq!(
        world.terrain.tile(3, 3).unwrap().state,
        TileState::Scorched
    );
}

#[test]
fn test_last_life_kill_is_permanent() {
    let mut world = playing_world(WinCondition::None);
    line_up_shot(&mut world);
    {
        let target = world.tanks.get_mut(&2).unwrap();
        target.lives = 1;
        target.health = BULLET_DAMAGE;
    }

    world.try_shoot(1, 1000);
    let (events, now) = step_collect(&mut world, 1000, 20);

    let destroyed = events
        .iter()
        .filter(|e| matches!(e, GameEvent::Destroyed { target_id: 2, .. }))
        .count();
    assert_eq!(destroyed, 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, GameEvent::Lives { id: 2, lives: 0 })));
    assert!(events
        .iter()
        .any(|e| matches!(e, GameEvent::SpectatePermanent { id: 2 })));
    assert!(world.tanks[&2].spectator);

    // No respawn, no matter how long we wait.
    let (later, _) = step_collect(&mut world, now + RESPAWN_DELAY_MS * 3, 10);
    assert!(!later
        .iter()
        .any(|e| matches!(e, GameEvent::Respawned { id: 2, .. })));
}

#[test]
fn test_kill_with_lives_left_schedules_respawn() {
    let mut world = playing_world(WinCondition::None);
    line_up_shot(&mut world);
    world.tanks.get_mut(&2).unwrap().health = BULLET_DAMAGE;

    world.try_shoot(1, 1000);
    let (events, now) = step_collect(&mut world, 1000, 20);

    assert!(events
        .iter()
        .any(|e| matches!(e, GameEvent::Destroyed { target_id: 2, shooter_id: 1 })));
    assert!(events
        .iter()
        .any(|e| matches!(e, GameEvent::SpectateStart { id: 2 })));
    assert_eq!(world.tanks[&2].lives, TANK_LIVES - 1);

    let (later, _) = step_collect(&mut world, now + RESPAWN_DELAY_MS, 5);
    assert!(later
        .iter()
        .any(|e| matches!(e, GameEvent::Respawned { id: 2, .. })));
    assert!(later
        .iter()
        .any(|e| matches!(e, GameEvent::SpectateEnd { id: 2 })));
    let target = &world.tanks[&2];
    assert!(!target.destroyed);
    assert_eq!(target.health, shared::TANK_MAX_HEALTH);
}

#[test]
fn test_mud_slows_movement_to_sixty_percent() {
    let mut world = playing_world(WinCondition::None);
    paint(&mut world, 6..12, 6..12, TileType::Mud);
    paint(&mut world, 6..12, 14..20, TileType::Grass);

    let dt = 0.1f32;
    let forward = InputIntent {
        forward: true,
        ..Default::default()
    };

    // One tick on mud.
    {
        let tank = world.tanks.get_mut(&1).unwrap();
        tank.pos = world.terrain.tile_center(8, 8);
        tank.rot = 0.0;
    }
    world.set_intent(1, forward);
    let before = world.tanks[&1].pos;
    world.step(dt, 100);
    let mud_travel = world.tanks[&1].pos.distance_to(&before);
    assert_approx_eq!(mud_travel, TANK_MOVE_SPEED * 0.6 * dt, 0.001);

    // One tick on grass.
    {
        let tank = world.tanks.get_mut(&1).unwrap();
        tank.pos = world.terrain.tile_center(8, 16);
        tank.rot = 0.0;
    }
    world.step(dt, 200);
    let grass_travel = world.tanks[&1]
        .pos
        .distance_to(&world.terrain.tile_center(8, 16));
    assert_approx_eq!(grass_travel, TANK_MOVE_SPEED * dt, 0.001);

    assert_approx_eq!(mud_travel / grass_travel, 0.6, 0.001);
}

#[test]
fn test_round_lifecycle_from_kill_to_next_round() {
    let mut world = playing_world(WinCondition::LastSurvivor);
    line_up_shot(&mut world);
    {
        let target = world.tanks.get_mut(&2).unwrap();
        target.lives = 1;
        target.health = BULLET_DAMAGE;
    }

    world.try_shoot(1, 1000);
    let (events, now) = step_collect(&mut world, 1000, 20);

    assert_eq!(world.round.phase(), GamePhase::RoundOver);
    assert!(events.iter().any(|e| matches!(
        e,
        GameEvent::RoundOver { winner_id: 1, winner_name, .. } if winner_name == "alpha"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        GameEvent::PhaseChanged { phase: GamePhase::RoundOver, .. }
    )));

    // The display delay passes, the server returns to WAITING, and with
    // players still present the next round starts at once.
    let events = world.step(0.0, now + ROUND_OVER_DELAY_MS);
    assert_eq!(world.round.phase(), GamePhase::Waiting);
    assert!(events.iter().any(|e| matches!(
        e,
        GameEvent::PhaseChanged { phase: GamePhase::Waiting, .. }
    )));

    let events = world.step(0.0, now + ROUND_OVER_DELAY_MS + 33);
    assert_eq!(world.round.phase(), GamePhase::Playing);
    let revived = &world.tanks[&2];
    assert!(!revived.spectator);
    assert!(!revived.destroyed);
    assert_eq!(revived.lives, TANK_LIVES);
    assert!(events
        .iter()
        .any(|e| matches!(e, GameEvent::SpectateEnd { id: 2 })));
}

#[test]
fn test_expired_bullet_never_comes_back() {
    let mut world = playing_world(WinCondition::None);
    // A full grass row to fly down: long enough that the bullet hits
    // its lifetime before the map edge, with nothing to collide with.
    paint(&mut world, 0..24, 9..12, TileType::Grass);
    {
        let shooter = world.tanks.get_mut(&1).unwrap();
        shooter.pos = world.terrain.tile_center(1, 10);
        shooter.rot = 0.0;
    }
    world.tanks.get_mut(&2).unwrap().pos = world.terrain.tile_center(12, 20);

    world.try_shoot(1, 0);
    assert_eq!(world.bullets.len(), 1);

    let ticks = (BULLET_LIFETIME_MS / 33 + 5) as u32;
    step_collect(&mut world, 0, ticks);
    assert!(world.bullets.is_empty());

    let (later, _) = step_collect(&mut world, BULLET_LIFETIME_MS + 200, 10);
    assert!(!later
        .iter()
        .any(|e| matches!(e, GameEvent::Hit { .. } | GameEvent::Destroyed { .. })));
}

#[test]
fn test_tanks_never_leave_the_map() {
    let mut world = playing_world(WinCondition::None);
    world.tanks.get_mut(&1).unwrap().rot = -std::f32::consts::FRAC_PI_2;
    world.set_intent(
        1,
        InputIntent {
            forward: true,
            ..Default::default()
        },
    );

    let mut now = 0u64;
    for _ in 0..1200 {
        now += 33;
        world.step(DT, now);
        for tank in world.tanks.values() {
            assert!(tank.pos.x >= TANK_RADIUS && tank.pos.y >= TANK_RADIUS);
            assert!(tank.pos.x <= world.terrain.world_width() - TANK_RADIUS);
            assert!(tank.pos.y <= world.terrain.world_height() - TANK_RADIUS);
        }
    }
}

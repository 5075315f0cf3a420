//! Fire propagation over the terrain grid.
//!
//! Explosions attempt to ignite every flammable tile whose center lies
//! inside the blast radius. An ignited tile then walks a time-gated
//! timeline: IGNITING for the first two seconds, BURNING for the bulk
//! of the burn, SMOLDERING for the final three seconds, and finally the
//! terminal SCORCHED state. The walk is a pure function of elapsed time
//! since ignition, so re-evaluating with an unchanged clock never
//! advances a tile twice.

use rand::rngs::StdRng;
use rand::Rng;

use shared::terrain::TileState;
use shared::TILE_SIZE;

use crate::physics::Vec2;
use crate::terrain::TerrainGrid;

/// Length of the IGNITING phase at the start of the timeline.
pub const IGNITING_PHASE_MS: u64 = 2000;
/// Length of the SMOLDERING phase at the end of the timeline.
pub const SMOLDERING_PHASE_MS: u64 = 3000;

/// A dynamic tile state change to be broadcast as a `TIL` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileChange {
    pub col: u32,
    pub row: u32,
    pub state: TileState,
}

#[derive(Debug, Clone, Copy)]
struct ActiveFire {
    col: u32,
    row: u32,
    ignited_at_ms: u64,
    burn_duration_ms: u64,
}

/// Drives every burning tile on the map. The active set only ever
/// holds tiles between ignition and SCORCHED.
#[derive(Default)]
pub struct FireSimulation {
    active: Vec<ActiveFire>,
}

impl FireSimulation {
    pub fn new() -> FireSimulation {
        FireSimulation { active: Vec::new() }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Attempts ignition on every tile whose center is within `radius`
    /// of the explosion point. Each candidate rolls independently
    /// against its effective type's ignition chance.
    pub fn on_explosion(
        &mut self,
        grid: &mut TerrainGrid,
        center: Vec2,
        radius: f32,
        now_ms: u64,
        rng: &mut StdRng,
    ) -> Vec<TileChange> {
        let mut changes = Vec::new();

        let min_col = ((center.x - radius) / TILE_SIZE).floor().max(0.0) as u32;
        let min_row = ((center.y - radius) / TILE_SIZE).floor().max(0.0) as u32;
        let max_col = (((center.x + radius) / TILE_SIZE).ceil() as u32).min(grid.width());
        let max_row = (((center.y + radius) / TILE_SIZE).ceil() as u32).min(grid.height());

        for row in min_row..max_row {
            for col in min_col..max_col {
                if grid.tile_center(col, row).distance_to(&center) > radius {
                    continue;
                }

                let chance = match grid.tile(col, row) {
                    Some(tile) if !tile.state.fire_affected() => {
                        tile.effective_type().ignition_chance()
                    }
                    _ => continue,
                };
                if chance <= 0.0 || rng.gen::<f32>() >= chance {
                    continue;
                }

                if let Some(change) = self.ignite(grid, col, row, now_ms) {
                    changes.push(change);
                }
            }
        }

        changes
    }

    /// Unconditionally ignites a flammable tile that is not already on
    /// the fire timeline. Returns the resulting state change, or None
    /// if the tile cannot burn.
    pub fn ignite(
        &mut self,
        grid: &mut TerrainGrid,
        col: u32,
        row: u32,
        now_ms: u64,
    ) -> Option<TileChange> {
        let burn_duration_ms = {
            let tile = grid.tile(col, row)?;
            if tile.state.fire_affected() {
                return None;
            }
            let duration = tile.effective_type().burn_duration_ms();
            if duration == 0 {
                return None;
            }
            duration
        };

        if let Some(tile) = grid.tile_mut(col, row) {
            tile.burn_duration_ms = burn_duration_ms;
        }
        grid.set_state(col, row, TileState::Igniting, now_ms);
        self.active.push(ActiveFire {
            col,
            row,
            ignited_at_ms: now_ms,
            burn_duration_ms,
        });

        Some(TileChange {
            col,
            row,
            state: TileState::Igniting,
        })
    }

    /// Advances every active fire to the state its elapsed time maps
    /// to. SCORCHED tiles leave the active set permanently.
    pub fn update(&mut self, grid: &mut TerrainGrid, now_ms: u64) -> Vec<TileChange> {
        let mut changes = Vec::new();
        let mut remaining = Vec::with_capacity(self.active.len());

        for fire in self.active.drain(..) {
            let elapsed = now_ms.saturating_sub(fire.ignited_at_ms);
            let target = stage_for(elapsed, fire.burn_duration_ms);

            let current = grid.tile(fire.col, fire.row).map(|t| t.state);
            if current != Some(target) {
                grid.set_state(fire.col, fire.row, target, now_ms);
                changes.push(TileChange {
                    col: fire.col,
                    row: fire.row,
                    state: target,
                });
            }

            if target != TileState::Scorched {
                remaining.push(fire);
            }
        }

        self.active = remaining;
        changes
    }
}

/// Maps elapsed burn time to the fire state it belongs to.
fn stage_for(elapsed_ms: u64, burn_duration_ms: u64) -> TileState {
    if elapsed_ms < IGNITING_PHASE_MS {
        TileState::Igniting
    } else if elapsed_ms + SMOLDERING_PHASE_MS < burn_duration_ms {
        TileState::Burning
    } else if elapsed_ms < burn_duration_ms {
        TileState::Smoldering
    } else {
        TileState::Scorched
    }
}

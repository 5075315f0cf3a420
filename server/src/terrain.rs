//! Tile grid owned by the simulation loop.
//!
//! The grid is generated once at startup from a seeded RNG so that the
//! same seed and dimensions always produce the same map. All gameplay
//! queries (passability, speed, bullet blocking) go through the tile's
//! effective type, which is the overlay when one is present.

use log::info;
use rand::rngs::StdRng;
use rand::Rng;

use shared::terrain::{encode_row, TileState, TileType};
use shared::TILE_SIZE;

use crate::physics::Vec2;

/// One cell of the terrain grid.
#[derive(Debug, Clone)]
pub struct Tile {
    pub base: TileType,
    pub overlay: Option<TileType>,
    pub state: TileState,
    /// Timestamp of the last dynamic state change.
    pub state_since_ms: u64,
    /// Total fire timeline length for this tile, fixed at ignition.
    pub burn_duration_ms: u64,
}

impl Tile {
    fn new(base: TileType, overlay: Option<TileType>) -> Tile {
        Tile {
            base,
            overlay,
            state: TileState::Normal,
            state_since_ms: 0,
            burn_duration_ms: 0,
        }
    }

    /// Overlay when present, otherwise the base type.
    pub fn effective_type(&self) -> TileType {
        self.overlay.unwrap_or(self.base)
    }

    /// Product of the effective type's modifier and the dynamic state's
    /// factor. Zero means tanks cannot enter.
    pub fn speed_modifier(&self) -> f32 {
        self.effective_type().speed_modifier() * self.state.speed_factor()
    }

    pub fn passable(&self) -> bool {
        self.effective_type().passable()
    }

    pub fn blocks_bullets(&self) -> bool {
        self.effective_type().blocks_bullets()
    }
}

pub struct TerrainGrid {
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
}

impl TerrainGrid {
    /// Generates a map from the world RNG: a weighted random fill, one
    /// majority-vote smoothing pass to clump the types into patches,
    /// then sparse forest/stone overlays on open ground.
    pub fn generate(width: u32, height: u32, rng: &mut StdRng) -> TerrainGrid {
        let count = (width * height) as usize;
        let mut bases = Vec::with_capacity(count);
        for _ in 0..count {
            bases.push(random_base_type(rng));
        }

        let smoothed = smooth_pass(&bases, width, height);

        let mut tiles = Vec::with_capacity(count);
        for base in smoothed {
            let overlay = match base {
                TileType::Grass | TileType::Dirt => {
                    let roll = rng.gen_range(0..100);
                    if roll < 5 {
                        Some(TileType::Forest)
                    } else if roll < 7 {
                        Some(TileType::Stone)
                    } else {
                        None
                    }
                }
                _ => None,
            };
            tiles.push(Tile::new(base, overlay));
        }

        let grid = TerrainGrid {
            width,
            height,
            tiles,
        };
        info!(
            "Generated {}x{} terrain, {} passable tiles",
            width,
            height,
            grid.passable_tile_count()
        );
        grid
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn world_width(&self) -> f32 {
        self.width as f32 * TILE_SIZE
    }

    pub fn world_height(&self) -> f32 {
        self.height as f32 * TILE_SIZE
    }

    fn index(&self, col: u32, row: u32) -> usize {
        (row * self.width + col) as usize
    }

    pub fn tile(&self, col: u32, row: u32) -> Option<&Tile> {
        if col < self.width && row < self.height {
            Some(&self.tiles[self.index(col, row)])
        } else {
            None
        }
    }

    /// Tile coordinates containing a world position, or None outside
    /// the map.
    pub fn tile_coords_at(&self, pos: Vec2) -> Option<(u32, u32)> {
        if pos.x < 0.0 || pos.y < 0.0 {
            return None;
        }
        let col = (pos.x / TILE_SIZE) as u32;
        let row = (pos.y / TILE_SIZE) as u32;
        if col < self.width && row < self.height {
            Some((col, row))
        } else {
            None
        }
    }

    pub fn contains(&self, pos: Vec2) -> bool {
        pos.x >= 0.0 && pos.y >= 0.0 && pos.x < self.world_width() && pos.y < self.world_height()
    }

    /// Effective speed modifier under a world position. Positions off
    /// the map report 1.0; the boundary clamp keeps tanks inside anyway.
    pub fn speed_modifier_at(&self, pos: Vec2) -> f32 {
        match self.tile_coords_at(pos) {
            Some((col, row)) => self.tiles[self.index(col, row)].speed_modifier(),
            None => 1.0,
        }
    }

    pub fn passable_at(&self, pos: Vec2) -> bool {
        match self.tile_coords_at(pos) {
            Some((col, row)) => self.tiles[self.index(col, row)].passable(),
            None => false,
        }
    }

    pub fn blocks_bullets_at(&self, pos: Vec2) -> bool {
        match self.tile_coords_at(pos) {
            Some((col, row)) => self.tiles[self.index(col, row)].blocks_bullets(),
            None => false,
        }
    }

    pub fn set_state(&mut self, col: u32, row: u32, state: TileState, now_ms: u64) {
        let index = self.index(col, row);
        if let Some(tile) = self.tiles.get_mut(index) {
            tile.state = state;
            tile.state_since_ms = now_ms;
        }
    }

    pub fn tile_mut(&mut self, col: u32, row: u32) -> Option<&mut Tile> {
        if col < self.width && row < self.height {
            let index = self.index(col, row);
            Some(&mut self.tiles[index])
        } else {
            None
        }
    }

    /// World-space center of a tile.
    pub fn tile_center(&self, col: u32, row: u32) -> Vec2 {
        Vec2::new(
            (col as f32 + 0.5) * TILE_SIZE,
            (row as f32 + 0.5) * TILE_SIZE,
        )
    }

    pub fn passable_tile_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.passable()).count()
    }

    /// Encodes every row for the full terrain snapshot sent to new
    /// sessions.
    pub fn encode_rows(&self) -> Vec<String> {
        let mut rows = Vec::with_capacity(self.height as usize);
        for row in 0..self.height {
            let start = self.index(0, row);
            let end = start + self.width as usize;
            let pairs: Vec<(TileType, Option<TileType>)> = self.tiles[start..end]
                .iter()
                .map(|t| (t.base, t.overlay))
                .collect();
            rows.push(encode_row(&pairs));
        }
        rows
    }

    /// Picks a random passable tile center as a spawn point. Falls back
    /// to the first passable tile if the random probes all miss.
    pub fn random_spawn(&self, rng: &mut StdRng) -> Vec2 {
        for _ in 0..256 {
            let col = rng.gen_range(0..self.width);
            let row = rng.gen_range(0..self.height);
            if self.tiles[self.index(col, row)].passable() {
                return self.tile_center(col, row);
            }
        }

        for row in 0..self.height {
            for col in 0..self.width {
                if self.tiles[self.index(col, row)].passable() {
                    return self.tile_center(col, row);
                }
            }
        }

        // Unreachable when the grid was validated at startup.
        Vec2::new(self.world_width() / 2.0, self.world_height() / 2.0)
    }
}

fn random_base_type(rng: &mut StdRng) -> TileType {
    match rng.gen_range(0..100) {
        0..=39 => TileType::Grass,
        40..=54 => TileType::Dirt,
        55..=64 => TileType::Sand,
        65..=72 => TileType::Mud,
        73..=78 => TileType::ShallowWater,
        79..=82 => TileType::DeepWater,
        83..=92 => TileType::Forest,
        93..=96 => TileType::Stone,
        _ => TileType::Mountain,
    }
}

/// Majority vote over the 3x3 neighborhood; ties keep the current type.
fn smooth_pass(bases: &[TileType], width: u32, height: u32) -> Vec<TileType> {
    let mut out = Vec::with_capacity(bases.len());
    for row in 0..height as i64 {
        for col in 0..width as i64 {
            let current = bases[(row * width as i64 + col) as usize];
            let mut counts: Vec<(TileType, u32)> = Vec::new();

            for dy in -1..=1 {
                for dx in -1..=1 {
                    let (nx, ny) = (col + dx, row + dy);
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let neighbor = bases[(ny * width as i64 + nx) as usize];
                    match counts.iter_mut().find(|(t, _)| *t == neighbor) {
                        Some((_, n)) => *n += 1,
                        None => counts.push((neighbor, 1)),
                    }
                }
            }

            let current_count = counts
                .iter()
                .find(|(t, _)| *t == current)
                .map_or(0, |(_, n)| *n);
            let winner = counts
                .iter()
                .filter(|(_, n)| *n > current_count)
                .max_by_key(|(_, n)| *n)
                .map_or(current, |(t, _)| *t);
            out.push(winner);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use shared::terrain::decode_row;

    fn test_grid(seed: u64) -> TerrainGrid {
        let mut rng = StdRng::seed_from_u64(seed);
        TerrainGrid::generate(16, 12, &mut rng)
    }

    #[test]
    fn test_generation_is_reproducible() {
        let a = test_grid(42);
        let b = test_grid(42);
        assert_eq!(a.encode_rows(), b.encode_rows());

        let c = test_grid(43);
        assert_ne!(a.encode_rows(), c.encode_rows());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let grid = test_grid(7);
        for (row_index, row) in grid.encode_rows().iter().enumerate() {
            let decoded = decode_row(row).expect("row should decode");
            assert_eq!(decoded.len(), grid.width() as usize);
            for (col, (base, overlay)) in decoded.iter().enumerate() {
                let tile = grid.tile(col as u32, row_index as u32).unwrap();
                assert_eq!(*base, tile.base);
                assert_eq!(*overlay, tile.overlay);
            }
        }
    }

    #[test]
    fn test_tile_coords_at_bounds() {
        let grid = test_grid(1);
        assert_eq!(grid.tile_coords_at(Vec2::new(0.0, 0.0)), Some((0, 0)));
        assert_eq!(
            grid.tile_coords_at(Vec2::new(TILE_SIZE * 1.5, TILE_SIZE * 2.5)),
            Some((1, 2))
        );
        assert_eq!(grid.tile_coords_at(Vec2::new(-1.0, 5.0)), None);
        assert_eq!(
            grid.tile_coords_at(Vec2::new(grid.world_width() + 1.0, 5.0)),
            None
        );
    }

    #[test]
    fn test_effective_type_prefers_overlay() {
        let mut tile = Tile::new(TileType::Grass, None);
        assert_eq!(tile.effective_type(), TileType::Grass);
        assert!(tile.passable());

        tile.overlay = Some(TileType::Stone);
        assert_eq!(tile.effective_type(), TileType::Stone);
        assert!(!tile.passable());
        assert!(tile.blocks_bullets());
    }

    #[test]
    fn test_speed_modifier_includes_state() {
        let mut tile = Tile::new(TileType::Mud, None);
        assert_eq!(tile.speed_modifier(), 0.6);

        tile.state = TileState::Flooded;
        assert!((tile.speed_modifier() - 0.6 * 0.4).abs() < 0.0001);
    }

    #[test]
    fn test_random_spawn_is_passable() {
        let grid = test_grid(99);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..32 {
            let spawn = grid.random_spawn(&mut rng);
            assert!(grid.passable_at(spawn));
        }
    }

    #[test]
    fn test_set_state_records_timestamp() {
        let mut grid = test_grid(3);
        grid.set_state(2, 2, TileState::Igniting, 1234);
        let tile = grid.tile(2, 2).unwrap();
        assert_eq!(tile.state, TileState::Igniting);
        assert_eq!(tile.state_since_ms, 1234);
    }

    #[test]
    fn test_map_has_passable_tiles() {
        assert!(test_grid(0).passable_tile_count() > 0);
    }
}

//! Terrain tile definitions and their wire encoding.
//!
//! A tile has a fixed base type, an optional overlay type, and a dynamic
//! state driven by the fire simulation. Passability, bullet blocking, and
//! the speed modifier are always queried through the *effective* type:
//! the overlay when present, otherwise the base.

/// Base or overlay type of a terrain tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileType {
    Grass,
    Dirt,
    Mud,
    ShallowWater,
    DeepWater,
    Sand,
    Stone,
    Forest,
    Mountain,
}

impl TileType {
    /// Movement speed modifier for tanks on this tile type.
    /// Zero means the type is impassable.
    pub fn speed_modifier(&self) -> f32 {
        match self {
            TileType::Grass => 1.0,
            TileType::Dirt => 0.9,
            TileType::Mud => 0.6,
            TileType::ShallowWater => 0.5,
            TileType::DeepWater => 0.0,
            TileType::Sand => 0.8,
            TileType::Stone => 0.0,
            TileType::Forest => 0.7,
            TileType::Mountain => 0.0,
        }
    }

    pub fn passable(&self) -> bool {
        self.speed_modifier() > 0.0
    }

    pub fn blocks_bullets(&self) -> bool {
        matches!(self, TileType::Stone | TileType::Mountain)
    }

    /// Probability that an explosion covering this tile ignites it.
    /// Zero means the type never burns.
    pub fn ignition_chance(&self) -> f32 {
        match self {
            TileType::Grass => 0.7,
            TileType::Forest => 0.9,
            _ => 0.0,
        }
    }

    /// Total wall-clock length of the fire timeline for this type.
    pub fn burn_duration_ms(&self) -> u64 {
        match self {
            TileType::Grass => 8000,
            TileType::Forest => 15000,
            _ => 0,
        }
    }

    /// Single-character wire encoding used in `TER` rows.
    pub fn wire_char(&self) -> char {
        match self {
            TileType::Grass => 'g',
            TileType::Dirt => 'd',
            TileType::Mud => 'm',
            TileType::ShallowWater => 'w',
            TileType::DeepWater => 'W',
            TileType::Sand => 's',
            TileType::Stone => 'S',
            TileType::Forest => 'f',
            TileType::Mountain => 'M',
        }
    }

    pub fn from_wire_char(c: char) -> Option<TileType> {
        match c {
            'g' => Some(TileType::Grass),
            'd' => Some(TileType::Dirt),
            'm' => Some(TileType::Mud),
            'w' => Some(TileType::ShallowWater),
            'W' => Some(TileType::DeepWater),
            's' => Some(TileType::Sand),
            'S' => Some(TileType::Stone),
            'f' => Some(TileType::Forest),
            'M' => Some(TileType::Mountain),
            _ => None,
        }
    }
}

/// Dynamic state of a tile. Fire advances Normal tiles through
/// Igniting/Burning/Smoldering to the terminal Scorched state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileState {
    Normal,
    Igniting,
    Burning,
    Smoldering,
    Scorched,
    Flooded,
    Frozen,
}

impl TileState {
    /// Multiplier applied on top of the effective type's speed modifier.
    pub fn speed_factor(&self) -> f32 {
        match self {
            TileState::Normal => 1.0,
            TileState::Igniting => 1.0,
            TileState::Burning => 0.9,
            TileState::Smoldering => 0.95,
            TileState::Scorched => 1.0,
            TileState::Flooded => 0.4,
            TileState::Frozen => 1.2,
        }
    }

    /// True for every state on the fire timeline, including the terminal
    /// one. Tiles in these states cannot be ignited again.
    pub fn fire_affected(&self) -> bool {
        matches!(
            self,
            TileState::Igniting | TileState::Burning | TileState::Smoldering | TileState::Scorched
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TileState::Normal => "NORMAL",
            TileState::Igniting => "IGNITING",
            TileState::Burning => "BURNING",
            TileState::Smoldering => "SMOLDERING",
            TileState::Scorched => "SCORCHED",
            TileState::Flooded => "FLOODED",
            TileState::Frozen => "FROZEN",
        }
    }

    pub fn from_str_tag(s: &str) -> Option<TileState> {
        match s {
            "NORMAL" => Some(TileState::Normal),
            "IGNITING" => Some(TileState::Igniting),
            "BURNING" => Some(TileState::Burning),
            "SMOLDERING" => Some(TileState::Smoldering),
            "SCORCHED" => Some(TileState::Scorched),
            "FLOODED" => Some(TileState::Flooded),
            "FROZEN" => Some(TileState::Frozen),
            _ => None,
        }
    }
}

/// Placeholder overlay character meaning "no overlay".
pub const NO_OVERLAY_CHAR: char = '.';

/// Encodes one row of (base, overlay) pairs as two characters per tile.
pub fn encode_row(tiles: &[(TileType, Option<TileType>)]) -> String {
    let mut out = String::with_capacity(tiles.len() * 2);
    for (base, overlay) in tiles {
        out.push(base.wire_char());
        out.push(overlay.map_or(NO_OVERLAY_CHAR, |t| t.wire_char()));
    }
    out
}

/// Decodes a `TER` row payload back into (base, overlay) pairs.
/// Returns None on odd lengths or unknown tile characters.
pub fn decode_row(data: &str) -> Option<Vec<(TileType, Option<TileType>)>> {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() % 2 != 0 {
        return None;
    }

    let mut tiles = Vec::with_capacity(chars.len() / 2);
    for pair in chars.chunks(2) {
        let base = TileType::from_wire_char(pair[0])?;
        let overlay = if pair[1] == NO_OVERLAY_CHAR {
            None
        } else {
            Some(TileType::from_wire_char(pair[1])?)
        };
        tiles.push((base, overlay));
    }
    Some(tiles)
}

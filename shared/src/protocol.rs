//! Line-oriented wire protocol.
//!
//! Every message is one ASCII line whose fields are separated by `;`,
//! with the three-letter message tag first. The codec is symmetric:
//! every tag both parses and serializes, so round trips are lossless
//! (floats are quantized to two decimal places on encode).

use std::fmt;

use crate::terrain::TileState;

/// Field separator. Player names and announcement texts must not
/// contain it.
pub const DELIMITER: char = ';';

/// Failure to decode a single inbound line. The connection survives
/// these; the offending line is logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Empty,
    UnknownTag(String),
    MissingField(&'static str),
    InvalidField(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Empty => write!(f, "empty message"),
            ProtocolError::UnknownTag(tag) => write!(f, "unknown message tag '{}'", tag),
            ProtocolError::MissingField(name) => write!(f, "missing field '{}'", name),
            ProtocolError::InvalidField(name) => write!(f, "invalid field '{}'", name),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Round lifecycle phase, broadcast in `GST` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Waiting,
    Countdown,
    Playing,
    RoundOver,
}

impl GamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::Waiting => "WAITING",
            GamePhase::Countdown => "COUNTDOWN",
            GamePhase::Playing => "PLAYING",
            GamePhase::RoundOver => "ROUND_OVER",
        }
    }

    pub fn from_str_tag(s: &str) -> Option<GamePhase> {
        match s {
            "WAITING" => Some(GamePhase::Waiting),
            "COUNTDOWN" => Some(GamePhase::Countdown),
            "PLAYING" => Some(GamePhase::Playing),
            "ROUND_OVER" => Some(GamePhase::RoundOver),
            _ => None,
        }
    }
}

/// Messages a client may send to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `CON;<name>`: join with a display name.
    Connect { name: String },
    /// `INP;<fwd>;<back>;<left>;<right>`: latest movement intent.
    Input {
        forward: bool,
        backward: bool,
        left: bool,
        right: bool,
    },
    /// `SHT`: request one shot, subject to the server cooldown.
    Shoot,
    /// `PIN`: keepalive, answered with `PON`.
    Ping,
}

/// Messages the server broadcasts or sends to individual sessions.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// `AID;<id>`: the player ID assigned to this session.
    AssignId { id: u32 },
    /// `NEW;<id>;<x>;<y>;<rot>;<name>;<r>;<g>;<b>`
    NewPlayer {
        id: u32,
        x: f32,
        y: f32,
        rot: f32,
        name: String,
        color: (u8, u8, u8),
    },
    /// `UPD;<id>;<x>;<y>;<rot>`: delta update for a moved tank.
    Update { id: u32, x: f32, y: f32, rot: f32 },
    /// `LEF;<id>`
    PlayerLeft { id: u32 },
    /// `SHO;<bulletId>;<ownerId>;<x>;<y>;<dirX>;<dirY>`
    Shot {
        bullet_id: u32,
        owner_id: u32,
        x: f32,
        y: f32,
        dir_x: f32,
        dir_y: f32,
    },
    /// `HIT;<targetId>;<shooterId>;<bulletId>;<damage>`
    Hit {
        target_id: u32,
        shooter_id: u32,
        bullet_id: u32,
        damage: i32,
    },
    /// `DES;<targetId>;<shooterId>`
    Destroyed { target_id: u32, shooter_id: u32 },
    /// `RSP;<id>;<x>;<y>;<rot>`
    Respawn { id: u32, x: f32, y: f32, rot: f32 },
    /// `LIV;<id>;<lives>`
    Lives { id: u32, lives: u32 },
    /// `GST;<stateName>;<timeData>`: authoritative phase transition.
    GameState { phase: GamePhase, time_data: u64 },
    /// `ANN;<message>`
    Announce { text: String },
    /// `ROV;<winnerId>;<winnerName>;<finalTimeMillis>`: winner ID 0 is a draw.
    RoundOver {
        winner_id: u32,
        winner_name: String,
        millis: u64,
    },
    /// `MAP;<widthTiles>;<heightTiles>;<tileSize>`
    MapInfo {
        width: u32,
        height: u32,
        tile_size: u32,
    },
    /// `TER;<row>;<encodedRow>`: one row of the terrain snapshot.
    TerrainRow { row: u32, data: String },
    /// `TIL;<x>;<y>;<state>`: dynamic tile state change.
    TileChanged { x: u32, y: u32, state: TileState },
    /// `ERR;<message>`
    Error { text: String },
    /// `PON`
    Pong,
    /// `SPS;<id>`: player entered spectator view (awaiting respawn).
    SpectateStart { id: u32 },
    /// `SPE;<id>`: player left spectator view.
    SpectateEnd { id: u32 },
    /// `SPP;<id>`: player is a spectator for the rest of the round.
    SpectatePermanent { id: u32 },
}

/// Cursor over the `;`-separated fields of one line.
struct Fields<'a> {
    parts: std::str::Split<'a, char>,
}

impl<'a> Fields<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            parts: line.split(DELIMITER),
        }
    }

    fn next(&mut self, name: &'static str) -> Result<&'a str, ProtocolError> {
        self.parts.next().ok_or(ProtocolError::MissingField(name))
    }

    fn next_u32(&mut self, name: &'static str) -> Result<u32, ProtocolError> {
        self.next(name)?
            .parse()
            .map_err(|_| ProtocolError::InvalidField(name))
    }

    fn next_u64(&mut self, name: &'static str) -> Result<u64, ProtocolError> {
        self.next(name)?
            .parse()
            .map_err(|_| ProtocolError::InvalidField(name))
    }

    fn next_u8(&mut self, name: &'static str) -> Result<u8, ProtocolError> {
        self.next(name)?
            .parse()
            .map_err(|_| ProtocolError::InvalidField(name))
    }

    fn next_i32(&mut self, name: &'static str) -> Result<i32, ProtocolError> {
        self.next(name)?
            .parse()
            .map_err(|_| ProtocolError::InvalidField(name))
    }

    fn next_f32(&mut self, name: &'static str) -> Result<f32, ProtocolError> {
        self.next(name)?
            .parse()
            .map_err(|_| ProtocolError::InvalidField(name))
    }

    fn next_bool(&mut self, name: &'static str) -> Result<bool, ProtocolError> {
        match self.next(name)? {
            "0" => Ok(false),
            "1" => Ok(true),
            _ => Err(ProtocolError::InvalidField(name)),
        }
    }
}

fn bool_char(b: bool) -> char {
    if b {
        '1'
    } else {
        '0'
    }
}

impl ClientMessage {
    pub fn decode(line: &str) -> Result<ClientMessage, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let mut fields = Fields::new(line);
        let tag = fields.next("tag")?;
        match tag {
            "CON" => Ok(ClientMessage::Connect {
                name: fields.next("name")?.to_string(),
            }),
            "INP" => Ok(ClientMessage::Input {
                forward: fields.next_bool("forward")?,
                backward: fields.next_bool("backward")?,
                left: fields.next_bool("left")?,
                right: fields.next_bool("right")?,
            }),
            "SHT" => Ok(ClientMessage::Shoot),
            "PIN" => Ok(ClientMessage::Ping),
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            ClientMessage::Connect { name } => format!("CON;{}", name),
            ClientMessage::Input {
                forward,
                backward,
                left,
                right,
            } => format!(
                "INP;{};{};{};{}",
                bool_char(*forward),
                bool_char(*backward),
                bool_char(*left),
                bool_char(*right)
            ),
            ClientMessage::Shoot => "SHT".to_string(),
            ClientMessage::Ping => "PIN".to_string(),
        }
    }
}

impl ServerMessage {
    pub fn decode(line: &str) -> Result<ServerMessage, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let mut f = Fields::new(line);
        let tag = f.next("tag")?;
        match tag {
            "AID" => Ok(ServerMessage::AssignId {
                id: f.next_u32("id")?,
            }),
            "NEW" => Ok(ServerMessage::NewPlayer {
                id: f.next_u32("id")?,
                x: f.next_f32("x")?,
                y: f.next_f32("y")?,
                rot: f.next_f32("rot")?,
                name: f.next("name")?.to_string(),
                color: (f.next_u8("r")?, f.next_u8("g")?, f.next_u8("b")?),
            }),
            "UPD" => Ok(ServerMessage::Update {
                id: f.next_u32("id")?,
                x: f.next_f32("x")?,
                y: f.next_f32("y")?,
                rot: f.next_f32("rot")?,
            }),
            "LEF" => Ok(ServerMessage::PlayerLeft {
                id: f.next_u32("id")?,
            }),
            "SHO" => Ok(ServerMessage::Shot {
                bullet_id: f.next_u32("bulletId")?,
                owner_id: f.next_u32("ownerId")?,
                x: f.next_f32("x")?,
                y: f.next_f32("y")?,
                dir_x: f.next_f32("dirX")?,
                dir_y: f.next_f32("dirY")?,
            }),
            "HIT" => Ok(ServerMessage::Hit {
                target_id: f.next_u32("targetId")?,
                shooter_id: f.next_u32("shooterId")?,
                bullet_id: f.next_u32("bulletId")?,
                damage: f.next_i32("damage")?,
            }),
            "DES" => Ok(ServerMessage::Destroyed {
                target_id: f.next_u32("targetId")?,
                shooter_id: f.next_u32("shooterId")?,
            }),
            "RSP" => Ok(ServerMessage::Respawn {
                id: f.next_u32("id")?,
                x: f.next_f32("x")?,
                y: f.next_f32("y")?,
                rot: f.next_f32("rot")?,
            }),
            "LIV" => Ok(ServerMessage::Lives {
                id: f.next_u32("id")?,
                lives: f.next_u32("lives")?,
            }),
            "GST" => {
                let phase = GamePhase::from_str_tag(f.next("stateName")?)
                    .ok_or(ProtocolError::InvalidField("stateName"))?;
                Ok(ServerMessage::GameState {
                    phase,
                    time_data: f.next_u64("timeData")?,
                })
            }
            "ANN" => Ok(ServerMessage::Announce {
                text: f.next("message")?.to_string(),
            }),
            "ROV" => Ok(ServerMessage::RoundOver {
                winner_id: f.next_u32("winnerId")?,
                winner_name: f.next("winnerName")?.to_string(),
                millis: f.next_u64("finalTimeMillis")?,
            }),
            "MAP" => Ok(ServerMessage::MapInfo {
                width: f.next_u32("widthTiles")?,
                height: f.next_u32("heightTiles")?,
                tile_size: f.next_u32("tileSize")?,
            }),
            "TER" => Ok(ServerMessage::TerrainRow {
                row: f.next_u32("row")?,
                data: f.next("data")?.to_string(),
            }),
            "TIL" => {
                let x = f.next_u32("x")?;
                let y = f.next_u32("y")?;
                let state = TileState::from_str_tag(f.next("state")?)
                    .ok_or(ProtocolError::InvalidField("state"))?;
                Ok(ServerMessage::TileChanged { x, y, state })
            }
            "ERR" => Ok(ServerMessage::Error {
                text: f.next("message")?.to_string(),
            }),
            "PON" => Ok(ServerMessage::Pong),
            "SPS" => Ok(ServerMessage::SpectateStart {
                id: f.next_u32("id")?,
            }),
            "SPE" => Ok(ServerMessage::SpectateEnd {
                id: f.next_u32("id")?,
            }),
            "SPP" => Ok(ServerMessage::SpectatePermanent {
                id: f.next_u32("id")?,
            }),
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            ServerMessage::AssignId { id } => format!("AID;{}", id),
            ServerMessage::NewPlayer {
                id,
                x,
                y,
                rot,
                name,
                color,
            } => format!(
                "NEW;{};{:.2};{:.2};{:.2};{};{};{};{}",
                id, x, y, rot, name, color.0, color.1, color.2
            ),
            ServerMessage::Update { id, x, y, rot } => {
                format!("UPD;{};{:.2};{:.2};{:.2}", id, x, y, rot)
            }
            ServerMessage::PlayerLeft { id } => format!("LEF;{}", id),
            ServerMessage::Shot {
                bullet_id,
                owner_id,
                x,
                y,
                dir_x,
                dir_y,
            } => format!(
                "SHO;{};{};{:.2};{:.2};{:.2};{:.2}",
                bullet_id, owner_id, x, y, dir_x, dir_y
            ),
            ServerMessage::Hit {
                target_id,
                shooter_id,
                bullet_id,
                damage,
            } => format!("HIT;{};{};{};{}", target_id, shooter_id, bullet_id, damage),
            ServerMessage::Destroyed {
                target_id,
                shooter_id,
            } => format!("DES;{};{}", target_id, shooter_id),
            ServerMessage::Respawn { id, x, y, rot } => {
                format!("RSP;{};{:.2};{:.2};{:.2}", id, x, y, rot)
            }
            ServerMessage::Lives { id, lives } => format!("LIV;{};{}", id, lives),
            ServerMessage::GameState { phase, time_data } => {
                format!("GST;{};{}", phase.as_str(), time_data)
            }
            ServerMessage::Announce { text } => format!("ANN;{}", text),
            ServerMessage::RoundOver {
                winner_id,
                winner_name,
                millis,
            } => format!("ROV;{};{};{}", winner_id, winner_name, millis),
            ServerMessage::MapInfo {
                width,
                height,
                tile_size,
            } => format!("MAP;{};{};{}", width, height, tile_size),
            ServerMessage::TerrainRow { row, data } => format!("TER;{};{}", row, data),
            ServerMessage::TileChanged { x, y, state } => {
                format!("TIL;{};{};{}", x, y, state.as_str())
            }
            ServerMessage::Error { text } => format!("ERR;{}", text),
            ServerMessage::Pong => "PON".to_string(),
            ServerMessage::SpectateStart { id } => format!("SPS;{}", id),
            ServerMessage::SpectateEnd { id } => format!("SPE;{}", id),
            ServerMessage::SpectatePermanent { id } => format!("SPP;{}", id),
        }
    }
}

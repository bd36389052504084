//! Bus Messages
//!
//! Inbound commands parsed from bus records and the outbound notification
//! payloads the engine publishes.

/// One of the eight compass moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// North-west.
    NW,
    /// North.
    N,
    /// North-east.
    NE,
    /// West.
    W,
    /// East.
    E,
    /// South-west.
    SW,
    /// South.
    S,
    /// South-east.
    SE,
}

impl Direction {
    /// All directions.
    pub const ALL: [Direction; 8] = [
        Direction::NW,
        Direction::N,
        Direction::NE,
        Direction::W,
        Direction::E,
        Direction::SW,
        Direction::S,
        Direction::SE,
    ];

    /// Parse a movement code.
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "NW" => Direction::NW,
            "N" => Direction::N,
            "NE" => Direction::NE,
            "W" => Direction::W,
            "E" => Direction::E,
            "SW" => Direction::SW,
            "S" => Direction::S,
            "SE" => Direction::SE,
            _ => return None,
        })
    }

    /// Unit delta. North is negative y.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::NW => (-1, -1),
            Direction::N => (0, -1),
            Direction::NE => (1, -1),
            Direction::W => (-1, 0),
            Direction::E => (1, 0),
            Direction::SW => (-1, 1),
            Direction::S => (0, 1),
            Direction::SE => (1, 1),
        }
    }

    /// Wire code.
    pub fn code(self) -> &'static str {
        match self {
            Direction::NW => "NW",
            Direction::N => "N",
            Direction::NE => "NE",
            Direction::W => "W",
            Direction::E => "E",
            Direction::SW => "SW",
            Direction::S => "S",
            Direction::SE => "SE",
        }
    }
}

/// `token:argument` as carried on the movement and keep-alive topics.
pub fn split_token_message(value: &str) -> Option<(&str, &str)> {
    let mut parts = value.split(':');
    let (token, arg) = (parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    Some((token, arg))
}

/// NPC join request: `join:level:requesterId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    /// Requested level, at least 1.
    pub level: i32,
    /// Identifier the NPC process listens for in the accept reply.
    pub requester: String,
}

/// Why a join request was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinRejection {
    /// Wrong number of fields or wrong verb.
    Malformed,
    /// Level missing, unparsable or below 1.
    InvalidLevel,
}

impl JoinRequest {
    /// Parse `join:level:requesterId`.
    pub fn parse(value: &str) -> Result<Self, JoinRejection> {
        let parts: Vec<&str> = value.split(':').collect();
        let ["join", level, requester] = parts[..] else {
            return Err(JoinRejection::Malformed);
        };
        match level.parse::<i32>() {
            Ok(level) if level > 0 => Ok(Self { level, requester: requester.to_string() }),
            _ => Err(JoinRejection::InvalidLevel),
        }
    }
}

/// Outbound payloads.
pub mod notify {
    /// Published on the player topic once the match accepts moves.
    pub const GAME_STARTED: &str = "game_stared";
    /// Published on the NPC topic when the match ends.
    pub const GAME_ENDED: &str = "game_ended";
    /// Winner name when nobody survived.
    pub const NO_WINNER: &str = "NO WINNER";

    /// `accept:requesterId:token`
    pub fn npc_accepted(requester: &str, token: &str) -> String {
        format!("accept:{}:{}", requester, token)
    }

    /// `die:token`, for NPCs.
    pub fn npc_died(token: &str) -> String {
        format!("die:{}", token)
    }

    /// `death:token`, for players.
    pub fn player_died(token: &str) -> String {
        format!("death:{}", token)
    }

    /// `winner:name`
    pub fn winner(name: Option<&str>) -> String {
        format!("winner:{}", name.unwrap_or(NO_WINNER))
    }
}

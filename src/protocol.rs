use crate::game::input::Direction;
use crate::game::snake::Snake;
use crate::game::types::{Powerup, Wall};
use serde::{Deserialize, Serialize};

/// The one message clients may send after joining.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MoveIntent {
  pub moving: Direction,
}

/// One broadcast line. The enum is the single place where wire typing
/// lives; on the wire the variants stay distinguishable by which id field
/// is present (`snake`, `wall` or `power`), which is what clients key on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorldFrame {
  Snake(Snake),
  Wall(Wall),
  Powerup(Powerup),
}

/// Parses a movement intent. Anything that is not one is `None`; the
/// protocol treats junk as silence, not as an error.
pub fn parse_move(line: &str) -> Option<MoveIntent> {
  serde_json::from_str(line.trim()).ok()
}

pub fn decode_frame(line: &str) -> Option<WorldFrame> {
  serde_json::from_str(line.trim()).ok()
}

/// Encodes one frame as a newline-terminated JSON line.
pub fn encode_frame(frame: &WorldFrame) -> String {
  let mut line = serde_json::to_string(frame).unwrap_or_default();
  line.push('\n');
  line
}

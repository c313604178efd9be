use super::math::Vector;
use serde::{Deserialize, Serialize};

/// A movement intent sent by a client. Anything else on the wire is
/// silently dropped before it gets here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Screen coordinates, so `Up` points toward negative y.
    pub fn vector(self) -> Vector {
        match self {
            Direction::Up => Vector::new(0.0, -1.0),
            Direction::Down => Vector::new(0.0, 1.0),
            Direction::Left => Vector::new(-1.0, 0.0),
            Direction::Right => Vector::new(1.0, 0.0),
        }
    }
}

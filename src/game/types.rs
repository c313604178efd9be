use super::constants::{POWERUP_COLLISION_RADIUS, WALL_COLLISION_PADDING};
use super::math::Vector;
use serde::{Deserialize, Serialize};

/// An axis-aligned wall segment between two endpoints. Immutable after the
/// settings file is loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wall {
  #[serde(rename = "wall")]
  pub id: u64,
  pub p1: Vector,
  pub p2: Vector,
}

impl Wall {
  pub fn min(&self) -> Vector {
    Vector::new(self.p1.x.min(self.p2.x), self.p1.y.min(self.p2.y))
  }

  pub fn max(&self) -> Vector {
    Vector::new(self.p1.x.max(self.p2.x), self.p1.y.max(self.p2.y))
  }

  /// Head-versus-wall test: the wall's bounding box padded outward.
  pub fn collides(&self, head: Vector) -> bool {
    let min = self.min();
    let max = self.max();
    head.x > min.x - WALL_COLLISION_PADDING
      && head.x < max.x + WALL_COLLISION_PADDING
      && head.y > min.y - WALL_COLLISION_PADDING
      && head.y < max.y + WALL_COLLISION_PADDING
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Powerup {
  #[serde(rename = "power")]
  pub id: u64,
  pub loc: Vector,
  pub died: bool,
}

impl Powerup {
  pub fn new(id: u64, loc: Vector) -> Self {
    Self {
      id,
      loc,
      died: false,
    }
  }

  pub fn is_hit(&self, head: Vector) -> bool {
    head.x < self.loc.x + POWERUP_COLLISION_RADIUS
      && head.x > self.loc.x - POWERUP_COLLISION_RADIUS
      && head.y < self.loc.y + POWERUP_COLLISION_RADIUS
      && head.y > self.loc.y - POWERUP_COLLISION_RADIUS
  }
}

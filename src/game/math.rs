use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// 2D point or direction. Screen coordinates: y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector {
  pub x: f64,
  pub y: f64,
}

impl Vector {
  pub fn new(x: f64, y: f64) -> Self {
    Self { x, y }
  }

  pub fn length(self) -> f64 {
    (self.x * self.x + self.y * self.y).sqrt()
  }

  pub fn dot(self, other: Vector) -> f64 {
    self.x * other.x + self.y * other.y
  }

  /// Collapses each component to -1, 0 or 1. Body segments are always
  /// axis-aligned, so this turns a segment delta into its unit direction
  /// without any float drift.
  pub fn clamped_axis(self) -> Vector {
    Vector {
      x: axis_sign(self.x),
      y: axis_sign(self.y),
    }
  }
}

fn axis_sign(value: f64) -> f64 {
  if value > 0.0 {
    1.0
  } else if value < 0.0 {
    -1.0
  } else {
    0.0
  }
}

impl Add for Vector {
  type Output = Vector;

  fn add(self, other: Vector) -> Vector {
    Vector::new(self.x + other.x, self.y + other.y)
  }
}

impl Sub for Vector {
  type Output = Vector;

  fn sub(self, other: Vector) -> Vector {
    Vector::new(self.x - other.x, self.y - other.y)
  }
}

impl Mul<f64> for Vector {
  type Output = Vector;

  fn mul(self, scale: f64) -> Vector {
    Vector::new(self.x * scale, self.y * scale)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clamped_axis_keeps_exact_units() {
    assert_eq!(Vector::new(37.5, 0.0).clamped_axis(), Vector::new(1.0, 0.0));
    assert_eq!(Vector::new(-0.25, 0.0).clamped_axis(), Vector::new(-1.0, 0.0));
    assert_eq!(Vector::new(0.0, -120.0).clamped_axis(), Vector::new(0.0, -1.0));
    assert_eq!(Vector::new(0.0, 0.0).clamped_axis(), Vector::new(0.0, 0.0));
  }

  #[test]
  fn opposite_axis_directions_dot_to_minus_one() {
    let left = Vector::new(-1.0, 0.0);
    let right = Vector::new(1.0, 0.0);
    assert_eq!(left.dot(right), -1.0);
  }

  #[test]
  fn vector_arithmetic() {
    let head = Vector::new(10.0, -4.0) + Vector::new(0.0, -1.0) * 3.0;
    assert_eq!(head, Vector::new(10.0, -7.0));
    assert_eq!((head - Vector::new(10.0, -4.0)).length(), 3.0);
  }
}

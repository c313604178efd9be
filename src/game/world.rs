use super::constants::{
  MAX_SPAWN_ATTEMPTS, SEGMENT_COLLISION_PADDING, SPAWN_BORDER_MARGIN, SPAWN_PROBE_OFFSET,
  SPAWN_WALL_PADDING,
};
use super::math::Vector;
use super::snake::{BodySnapshot, Snake};
use super::types::{Powerup, Wall};
use crate::settings::GameSettings;
use rand::Rng;
use std::collections::HashMap;

/// The authoritative game state: every snake, wall and powerup, plus the
/// tick-scalar configuration. The server wraps the whole thing in one
/// coarse lock; nothing in here synchronizes on its own.
#[derive(Debug)]
pub struct World {
  players: HashMap<u64, Snake>,
  powerups: HashMap<u64, Powerup>,
  walls: HashMap<u64, Wall>,
  settings: GameSettings,
  tick: u64,
  next_powerup_id: u64,
  // Ticks since a powerup was last added, measured against a delay that is
  // re-rolled every time one is eaten.
  powerup_clock: u64,
  powerup_delay: u64,
}

impl World {
  pub fn from_settings(mut settings: GameSettings) -> Self {
    let walls = std::mem::take(&mut settings.walls)
      .into_iter()
      .map(|wall| (wall.id, wall))
      .collect();
    let mut world = Self {
      players: HashMap::new(),
      powerups: HashMap::new(),
      walls,
      settings,
      tick: 0,
      next_powerup_id: 0,
      powerup_clock: 0,
      powerup_delay: 0,
    };
    while world.live_powerup_count() < world.settings.max_powerup {
      world.spawn_powerup();
    }
    world
  }

  pub fn half_extent(&self) -> f64 {
    self.settings.universe_size / 2.0
  }

  pub fn tick_count(&self) -> u64 {
    self.tick
  }

  pub fn player_count(&self) -> usize {
    self.players.len()
  }

  pub fn players(&self) -> impl Iterator<Item = &Snake> {
    self.players.values()
  }

  pub fn player(&self, id: u64) -> Option<&Snake> {
    self.players.get(&id)
  }

  pub fn player_mut(&mut self, id: u64) -> Option<&mut Snake> {
    self.players.get_mut(&id)
  }

  pub fn walls(&self) -> impl Iterator<Item = &Wall> {
    self.walls.values()
  }

  pub fn powerups(&self) -> impl Iterator<Item = &Powerup> {
    self.powerups.values()
  }

  pub fn add_player(&mut self, id: u64, name: String, spawn: Vector, dir: Vector) {
    let snake = Snake::new(id, name, spawn, dir, &self.settings);
    self.players.insert(id, snake);
  }

  pub fn remove_player(&mut self, id: u64) {
    self.players.remove(&id);
  }

  /// Runs one simulation tick: respawns, movement, collisions and powerup
  /// bookkeeping. Broadcast and the physical removal of eaten powerups are
  /// the caller's half of the tick.
  pub fn update(&mut self) {
    self.tick += 1;
    let tick = self.tick;
    let ids: Vec<u64> = self.players.keys().copied().collect();

    for id in &ids {
      let respawn_now = self
        .players
        .get(id)
        .map_or(false, |snake| snake.ready_to_respawn(tick));
      if respawn_now {
        let (spawn, dir) = self.pick_spawn();
        if let Some(snake) = self.players.get_mut(id) {
          snake.new_life(spawn, dir);
        }
      }
      if let Some(snake) = self.players.get_mut(id) {
        snake.update();
      }
    }

    // Collision pass against a post-movement snapshot so the outcome does
    // not depend on map iteration order.
    let snapshots: Vec<BodySnapshot> = self.players.values().map(BodySnapshot::of).collect();
    let mut dead: Vec<u64> = Vec::new();
    for id in &ids {
      let Some(snake) = self.players.get(id) else { continue };
      if !snake.alive {
        continue;
      }
      if snake.hits_wall(self.walls.values()) || snake.hits_snake(&snapshots) {
        dead.push(*id);
      }
    }
    for id in dead {
      if let Some(snake) = self.players.get_mut(&id) {
        snake.kill(tick);
        tracing::debug!(id, "snake died");
      }
    }

    let powerup_ids: Vec<u64> = self.powerups.keys().copied().collect();
    for id in &ids {
      let head = match self.players.get(id) {
        Some(snake) if snake.alive => snake.head(),
        _ => continue,
      };
      let mut eaten = 0u32;
      for powerup_id in &powerup_ids {
        let Some(powerup) = self.powerups.get_mut(powerup_id) else { continue };
        if powerup.died || !powerup.is_hit(head) {
          continue;
        }
        powerup.died = true;
        self.powerup_delay = rand::thread_rng().gen_range(0..=self.settings.max_powerup_delay);
        eaten += 1;
      }
      if eaten > 0 {
        if let Some(snake) = self.players.get_mut(id) {
          for _ in 0..eaten {
            snake.eat_powerup();
          }
        }
      }
    }

    // Refill: at most one new powerup per tick once the delay has elapsed.
    self.powerup_clock += 1;
    if self.live_powerup_count() < self.settings.max_powerup
      && self.powerup_delay <= self.powerup_clock
    {
      self.spawn_powerup();
      self.powerup_clock = 0;
    }
  }

  /// Eaten powerups stay in the map, flagged dead, until every client has
  /// seen them die in a broadcast.
  pub fn remove_dead_powerups(&mut self) {
    self.powerups.retain(|_, powerup| !powerup.died);
  }

  fn live_powerup_count(&self) -> usize {
    self.powerups.values().filter(|powerup| !powerup.died).count()
  }

  fn spawn_powerup(&mut self) {
    let (loc, _) = self.pick_spawn();
    let id = self.next_powerup_id;
    self.next_powerup_id += 1;
    self.powerups.insert(id, Powerup::new(id, loc));
  }

  /// Rejection-sampling spawn search: a random interior point and axis
  /// direction, rejected while the speculative snake rectangle touches a
  /// padded wall or probe snakes around the point would collide with a
  /// living snake. Bounded: after the attempts run out a relaxed pass
  /// keeps only the wall check, and the last resort takes any candidate,
  /// so a crowded map cannot loop forever.
  pub fn pick_spawn(&self) -> (Vector, Vector) {
    let mut rng = rand::thread_rng();
    let snapshots: Vec<BodySnapshot> = self.players.values().map(BodySnapshot::of).collect();

    for _ in 0..MAX_SPAWN_ATTEMPTS {
      let (spawn, dir) = self.random_candidate(&mut rng);
      if self.candidate_hits_wall(spawn, dir) {
        continue;
      }
      if self.candidate_near_snake(spawn, dir, &snapshots) {
        continue;
      }
      return (spawn, dir);
    }
    for _ in 0..MAX_SPAWN_ATTEMPTS {
      let (spawn, dir) = self.random_candidate(&mut rng);
      if !self.candidate_hits_wall(spawn, dir) {
        return (spawn, dir);
      }
    }
    self.random_candidate(&mut rng)
  }

  fn random_candidate(&self, rng: &mut impl Rng) -> (Vector, Vector) {
    let half = self.half_extent();
    let low = -half + SPAWN_BORDER_MARGIN;
    let high = half - SPAWN_BORDER_MARGIN;
    let x = if high > low { rng.gen_range(low..high) } else { 0.0 };
    let y = if high > low { rng.gen_range(low..high) } else { 0.0 };
    let dir = match rng.gen_range(0..4) {
      0 => Vector::new(0.0, 1.0),
      1 => Vector::new(1.0, 0.0),
      2 => Vector::new(-1.0, 0.0),
      _ => Vector::new(0.0, -1.0),
    };
    (Vector::new(x, y), dir)
  }

  fn candidate_hits_wall(&self, spawn: Vector, dir: Vector) -> bool {
    let tip = spawn + dir * self.settings.starting_length;
    let min = Vector::new(spawn.x.min(tip.x), spawn.y.min(tip.y));
    let max = Vector::new(spawn.x.max(tip.x), spawn.y.max(tip.y));
    self.walls.values().any(|wall| {
      let wall_min = wall.min();
      let wall_max = wall.max();
      min.x < wall_max.x + SPAWN_WALL_PADDING
        && max.x > wall_min.x - SPAWN_WALL_PADDING
        && min.y < wall_max.y + SPAWN_WALL_PADDING
        && max.y > wall_min.y - SPAWN_WALL_PADDING
    })
  }

  /// Five probe heads, the candidate tip and four diagonal offsets, each
  /// tested against every living snake's segments.
  fn candidate_near_snake(
    &self,
    spawn: Vector,
    dir: Vector,
    snapshots: &[BodySnapshot],
  ) -> bool {
    let offsets = [
      Vector::new(0.0, 0.0),
      Vector::new(-SPAWN_PROBE_OFFSET, -SPAWN_PROBE_OFFSET),
      Vector::new(SPAWN_PROBE_OFFSET, -SPAWN_PROBE_OFFSET),
      Vector::new(-SPAWN_PROBE_OFFSET, SPAWN_PROBE_OFFSET),
      Vector::new(SPAWN_PROBE_OFFSET, SPAWN_PROBE_OFFSET),
    ];
    for offset in offsets {
      let head = spawn + offset + dir * self.settings.starting_length;
      for snapshot in snapshots {
        if !snapshot.alive {
          continue;
        }
        for pair in snapshot.body.windows(2) {
          if point_in_padded_segment(head, pair[0], pair[1]) {
            return true;
          }
        }
      }
    }
    false
  }
}

fn point_in_padded_segment(point: Vector, a: Vector, b: Vector) -> bool {
  point.x > a.x.min(b.x) - SEGMENT_COLLISION_PADDING
    && point.x < a.x.max(b.x) + SEGMENT_COLLISION_PADDING
    && point.y > a.y.min(b.y) - SEGMENT_COLLISION_PADDING
    && point.y < a.y.max(b.y) + SEGMENT_COLLISION_PADDING
}

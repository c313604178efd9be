use super::constants::{MIN_TURN_SEGMENT, SEGMENT_COLLISION_PADDING};
use super::input::Direction;
use super::math::Vector;
use super::types::Wall;
use crate::settings::GameSettings;
use serde::{Deserialize, Serialize};

/// A player snake. The serialized fields are exactly what goes on the wire
/// each tick; everything else is server-side bookkeeping. The movement
/// scalars are copied from the settings at creation time so a reloaded
/// config never retroactively changes a live snake.
///
/// `body[0]` is the tail and the last point is the head. The body always
/// holds at least two points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snake {
    #[serde(rename = "snake")]
    pub id: u64,
    pub name: String,
    pub body: Vec<Vector>,
    pub dir: Vector,
    pub score: u32,
    pub died: bool,
    pub alive: bool,
    pub dc: bool,
    pub join: bool,
    #[serde(skip)]
    velocity: f64,
    #[serde(skip)]
    respawn_delay: u64,
    #[serde(skip)]
    start_length: f64,
    #[serde(skip)]
    growth_amount: u32,
    #[serde(skip)]
    flip_on_powerup: bool,
    #[serde(skip)]
    half_extent: f64,
    #[serde(skip)]
    growing: bool,
    #[serde(skip)]
    grow_count: u32,
    #[serde(skip)]
    time_of_death: u64,
}

/// The post-movement view of one snake the collision pass works against.
/// Taking a snapshot first keeps the pass independent of update order.
#[derive(Debug, Clone)]
pub struct BodySnapshot {
    pub id: u64,
    pub alive: bool,
    pub body: Vec<Vector>,
}

impl BodySnapshot {
    pub fn of(snake: &Snake) -> Self {
        Self {
            id: snake.id,
            alive: snake.alive,
            body: snake.body.clone(),
        }
    }
}

impl Snake {
    pub fn new(id: u64, name: String, spawn: Vector, dir: Vector, settings: &GameSettings) -> Self {
        let mut snake = Self {
            id,
            name,
            body: Vec::new(),
            dir,
            score: 0,
            died: false,
            alive: true,
            dc: false,
            join: true,
            velocity: settings.velocity,
            respawn_delay: settings.respawn_rate,
            start_length: settings.starting_length,
            growth_amount: settings.snake_growth,
            flip_on_powerup: settings.gamemode,
            half_extent: settings.universe_size / 2.0,
            growing: false,
            grow_count: 0,
            time_of_death: 0,
        };
        snake.new_life(spawn, dir);
        snake
    }

    pub fn head(&self) -> Vector {
        self.body[self.body.len() - 1]
    }

    /// True once the respawn delay has elapsed since death.
    pub fn ready_to_respawn(&self, tick: u64) -> bool {
        !self.alive && tick.saturating_sub(self.time_of_death) >= self.respawn_delay
    }

    /// Advances the snake by one tick. Dead snakes do not move.
    pub fn update(&mut self) {
        if self.died {
            // `died` is a one-tick signal to clients.
            self.died = false;
        }
        if !self.alive {
            return;
        }

        // A tail point that has been caught collapses into its neighbor.
        if self.body.len() > 2 && (self.body[0] - self.body[1]).length() < self.velocity {
            self.body.remove(0);
        }

        if self.growing {
            // The tail holds still for the growth window, lengthening the
            // snake by one tail step per frozen tick.
            self.grow_count += 1;
            if self.grow_count >= self.growth_amount {
                self.growing = false;
            }
        } else {
            let tail_dir = (self.body[1] - self.body[0]).clamped_axis();
            self.body[0] = self.body[0] + tail_dir * self.velocity;
        }

        let last = self.body.len() - 1;
        self.body[last] = self.body[last] + self.dir * self.velocity;
        self.wrap_edges();
    }

    /// Toroidal continuation: a head past the border re-enters from the
    /// opposite edge as a fresh two-point stub, and a tail that has fully
    /// crossed off the trailing edge is dropped together with its edge
    /// point so the stored geometry never double-counts the seam.
    fn wrap_edges(&mut self) {
        let half = self.half_extent;
        let head = self.head();
        if head.x < -half {
            self.body.push(Vector::new(half, head.y));
            self.body.push(Vector::new(half - self.velocity, head.y));
        } else if head.x > half {
            self.body.push(Vector::new(-half, head.y));
            self.body.push(Vector::new(-half + self.velocity, head.y));
        } else if head.y < -half {
            self.body.push(Vector::new(head.x, half));
            self.body.push(Vector::new(head.x, half - self.velocity));
        } else if head.y > half {
            self.body.push(Vector::new(head.x, -half));
            self.body.push(Vector::new(head.x, -half + self.velocity));
        }

        let tail = self.body[0];
        let out_of_bounds =
            tail.x < -half || tail.x > half || tail.y < -half || tail.y > half;
        if out_of_bounds && self.body.len() > 2 {
            self.body.remove(0);
            if self.body.len() > 2 {
                self.body.remove(0);
            }
        }
    }

    pub fn hits_wall<'a>(&self, mut walls: impl Iterator<Item = &'a Wall>) -> bool {
        let head = self.head();
        walls.any(|wall| wall.collides(head))
    }

    /// Checks the head against every other living snake's segments, and
    /// against the eligible part of its own body.
    pub fn hits_snake(&self, others: &[BodySnapshot]) -> bool {
        for other in others {
            if other.id == self.id {
                if self.hits_self() {
                    return true;
                }
            } else if other.alive {
                for pair in other.body.windows(2) {
                    if self.segment_hit(pair[0], pair[1]) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Walks the body backward from the head. Segments only become
    /// eligible after the first one pointing exactly opposite the current
    /// heading; the stub left right behind a turn can therefore never
    /// register a hit.
    fn hits_self(&self) -> bool {
        if self.body.len() == 2 {
            return false;
        }
        let mut can_collide = false;
        let mut i = self.body.len() - 2;
        while i > 0 {
            if !can_collide {
                let seg_dir = (self.body[i] - self.body[i - 1]).clamped_axis();
                if seg_dir.dot(self.dir) == -1.0 {
                    can_collide = true;
                }
            } else if self.segment_hit(self.body[i], self.body[i - 1]) {
                return true;
            }
            i -= 1;
        }
        false
    }

    fn segment_hit(&self, a: Vector, b: Vector) -> bool {
        let head = self.head();
        head.x > a.x.min(b.x) - SEGMENT_COLLISION_PADDING
            && head.x < a.x.max(b.x) + SEGMENT_COLLISION_PADDING
            && head.y > a.y.min(b.y) - SEGMENT_COLLISION_PADDING
            && head.y < a.y.max(b.y) + SEGMENT_COLLISION_PADDING
    }

    pub fn kill(&mut self, tick: u64) {
        self.died = true;
        self.alive = false;
        self.time_of_death = tick;
        self.score = 0;
    }

    /// Applies one eaten powerup: score, a fresh growth window, and in the
    /// alternate gamemode a full body reversal.
    pub fn eat_powerup(&mut self) {
        self.growing = true;
        self.grow_count = 0;
        self.score += 1;
        if self.flip_on_powerup {
            self.flip();
        }
    }

    /// Reverses the snake so the tail becomes the head. The new heading
    /// comes from the first tail segment with real length; degenerate
    /// caught-up tail points are discarded first.
    fn flip(&mut self) {
        let mut new_dir = self.body[0] - self.body[1];
        while new_dir.length() < 1.0 && self.body.len() > 2 {
            self.body.remove(0);
            new_dir = self.body[0] - self.body[1];
        }
        self.dir = new_dir.clamped_axis();
        self.body.reverse();
    }

    /// Applies a movement intent. Only perpendicular turns are legal, and
    /// a turn is ignored while the head segment is still shorter than the
    /// collision padding, which would fold the head back onto itself.
    pub fn change_dir(&mut self, moving: Direction) {
        let len = self.body.len();
        if !self.alive || (self.body[len - 1] - self.body[len - 2]).length() < MIN_TURN_SEGMENT {
            return;
        }
        let perpendicular = match moving {
            Direction::Left | Direction::Right => self.dir.x == 0.0,
            Direction::Up | Direction::Down => self.dir.y == 0.0,
        };
        if !perpendicular {
            return;
        }
        self.dir = moving.vector();
        let head = self.head();
        self.body.push(head);
    }

    /// Resets the snake onto a fresh two-point body at the spawn location,
    /// head at the far end.
    pub fn new_life(&mut self, spawn: Vector, dir: Vector) {
        self.alive = true;
        self.growing = false;
        self.grow_count = 0;
        self.dir = dir;
        self.body.clear();
        self.body.push(spawn);
        self.body.push(spawn + dir * self.start_length);
    }
}

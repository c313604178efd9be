// Collision paddings are in world units and match the sizes the reference
// client draws: snake segments 10 wide, walls 50, powerups 16.
pub const SEGMENT_COLLISION_PADDING: f64 = 10.0;
pub const WALL_COLLISION_PADDING: f64 = 30.0;
pub const POWERUP_COLLISION_RADIUS: f64 = 13.0;

// A turn is rejected while the head is this close to the previous body
// point, otherwise the fresh stub behind the head registers a self hit.
pub const MIN_TURN_SEGMENT: f64 = 11.0;

pub const SPAWN_BORDER_MARGIN: f64 = 150.0;
pub const SPAWN_WALL_PADDING: f64 = 125.0;
pub const SPAWN_PROBE_OFFSET: f64 = 25.0;
pub const MAX_SPAWN_ATTEMPTS: usize = 32;

pub const MAX_PLAYER_NAME_LENGTH: usize = 32;

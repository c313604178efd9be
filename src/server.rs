use crate::game::constants::MAX_PLAYER_NAME_LENGTH;
use crate::game::world::World;
use crate::net::connection::{Connection, ConnectionId};
use crate::protocol::{self, WorldFrame};
use crate::settings::GameSettings;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// The authoritative server. One coarse lock guards the world and the
/// session table together; handshakes, direction updates and the whole
/// tick-and-broadcast pass all serialize behind it. A connection's own
/// receive buffer has its finer lock inside `Connection`.
pub struct Server {
  state: Mutex<ServerState>,
  ms_per_frame: u64,
  max_clients: usize,
}

struct ServerState {
  sessions: HashMap<ConnectionId, SessionEntry>,
  world: World,
  // Connections whose snake must be dropped at the next tick boundary.
  // Removal never happens mid-broadcast.
  disconnected: HashSet<ConnectionId>,
}

struct SessionEntry {
  conn: Arc<Connection>,
  stage: Stage,
}

/// Per-connection protocol stage. A connection starts unnamed; the first
/// framed line is its display name, everything after that is movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
  AwaitingName,
  Joined,
}

impl Server {
  pub fn new(settings: GameSettings, max_clients: usize) -> Self {
    Self {
      ms_per_frame: settings.ms_per_frame.max(1),
      max_clients,
      state: Mutex::new(ServerState {
        sessions: HashMap::new(),
        world: World::from_settings(settings),
        disconnected: HashSet::new(),
      }),
    }
  }

  /// Registers a freshly accepted connection. Over capacity, the client
  /// gets a one-shot notice and the connection closes before its receive
  /// loop ever arms.
  pub async fn register(&self, conn: &Arc<Connection>) {
    let mut state = self.state.lock().await;
    if state.sessions.len() >= self.max_clients {
      tracing::warn!(id = conn.id, "server full, rejecting connection");
      conn.send_and_close("server is full\n");
      return;
    }
    state.sessions.insert(
      conn.id,
      SessionEntry {
        conn: Arc::clone(conn),
        stage: Stage::AwaitingName,
      },
    );
  }

  /// Drains every complete line buffered on the connection. The return
  /// value tells the receive loop whether to arm the next read.
  pub async fn on_data(&self, conn: &Arc<Connection>) -> bool {
    let mut state = self.state.lock().await;
    while let Some(line) = conn.next_line() {
      state.handle_line(conn, &line);
    }
    !conn.is_closed()
  }

  /// Called once when a connection's receive loop ends. The snake stays in
  /// the world, flagged, until the next tick finalizes the removal.
  pub async fn on_disconnect(&self, conn: &Arc<Connection>) {
    let mut state = self.state.lock().await;
    if let Some(reason) = conn.error() {
      tracing::debug!(id = conn.id, reason, "connection errored");
    }
    state.mark_disconnected(conn.id);
  }

  /// The fixed-tick loop. The interval blocks on a monotonic timer; when a
  /// tick runs long the next one fires immediately rather than being
  /// skipped.
  pub async fn run_ticks(&self) {
    let mut interval = tokio::time::interval(Duration::from_millis(self.ms_per_frame));
    let mut ticks_since_report: u32 = 0;
    let mut last_report = Instant::now();
    loop {
      interval.tick().await;
      let mut state = self.state.lock().await;
      state.tick();

      ticks_since_report += 1;
      if last_report.elapsed() >= Duration::from_secs(1) {
        tracing::debug!(
          ticks_per_second = ticks_since_report,
          players = state.world.player_count(),
          "tick rate"
        );
        ticks_since_report = 0;
        last_report = Instant::now();
      }
    }
  }
}

impl ServerState {
  fn handle_line(&mut self, conn: &Arc<Connection>, line: &str) {
    let stage = match self.sessions.get(&conn.id) {
      Some(entry) => entry.stage,
      None => return,
    };
    match stage {
      Stage::AwaitingName => self.handle_join(conn, line),
      Stage::Joined => {
        // Movement intents only; anything else is silence.
        let Some(intent) = protocol::parse_move(line) else { return };
        if let Some(snake) = self.world.player_mut(conn.id) {
          snake.change_dir(intent.moving);
        }
      }
    }
  }

  /// The handshake: the line is the display name. Reply with the assigned
  /// id, the world half-extent and one line per wall, in that order, and
  /// only then start treating lines as movement.
  fn handle_join(&mut self, conn: &Arc<Connection>, line: &str) {
    let name = sanitize_name(line);
    let (spawn, dir) = self.world.pick_spawn();
    self.world.add_player(conn.id, name.clone(), spawn, dir);
    if let Some(entry) = self.sessions.get_mut(&conn.id) {
      entry.stage = Stage::Joined;
    }
    tracing::info!(id = conn.id, name = %name, "player joined");

    conn.send(format!("{}\n", conn.id));
    conn.send(format!("{}\n", self.world.half_extent() as i64));
    for wall in self.world.walls() {
      conn.send(protocol::encode_frame(&WorldFrame::Wall(wall.clone())));
    }
  }

  fn mark_disconnected(&mut self, id: ConnectionId) {
    self.disconnected.insert(id);
    if let Some(snake) = self.world.player_mut(id) {
      snake.dc = true;
      snake.alive = false;
    }
  }

  /// One full tick: finalize disconnects, advance the world, broadcast,
  /// then physically drop the powerups everyone just saw die.
  fn tick(&mut self) {
    for id in std::mem::take(&mut self.disconnected) {
      if self.sessions.remove(&id).is_some() {
        tracing::info!(id, "client removed");
      }
      self.world.remove_player(id);
    }

    self.world.update();
    self.broadcast();
    self.world.remove_dead_powerups();
  }

  /// Sends the full snake and powerup sets to every joined session. Each
  /// entity is encoded once and the line shared. A failed send flags that
  /// session's snake as gone so other clients stop rendering it; the
  /// session itself is reaped at the next tick.
  fn broadcast(&mut self) {
    let mut frames: Vec<String> =
      Vec::with_capacity(self.world.player_count() + self.world.powerups().count());
    for snake in self.world.players() {
      frames.push(protocol::encode_frame(&WorldFrame::Snake(snake.clone())));
    }
    for powerup in self.world.powerups() {
      frames.push(protocol::encode_frame(&WorldFrame::Powerup(powerup.clone())));
    }

    let mut failed: Vec<ConnectionId> = Vec::new();
    for (id, entry) in &self.sessions {
      if entry.stage != Stage::Joined {
        continue;
      }
      if self.world.player(*id).map_or(false, |snake| snake.dc) {
        self.disconnected.insert(*id);
        continue;
      }
      for frame in &frames {
        if !entry.conn.send(frame.clone()) {
          failed.push(*id);
          break;
        }
      }
    }
    for id in failed {
      self.mark_disconnected(id);
    }
  }
}

/// The protocol itself puts no bound on names, so the server does:
/// whitespace collapsed, at most MAX_PLAYER_NAME_LENGTH characters, and an
/// empty submission becomes "Player". Duplicates are allowed; ids keep
/// players apart.
fn sanitize_name(raw: &str) -> String {
  let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
  if cleaned.is_empty() {
    return "Player".to_string();
  }
  cleaned.chars().take(MAX_PLAYER_NAME_LENGTH).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::game::math::Vector;
  use crate::net::connection::Outbound;
  use tokio::sync::mpsc;

  fn test_settings() -> GameSettings {
    GameSettings {
      universe_size: 2000.0,
      velocity: 3.0,
      respawn_rate: 10,
      starting_length: 120.0,
      max_powerup: 2,
      max_powerup_delay: 5,
      ms_per_frame: 5,
      walls: vec![
        crate::game::types::Wall {
          id: 0,
          p1: Vector::new(-900.0, -900.0),
          p2: Vector::new(900.0, -900.0),
        },
        crate::game::types::Wall {
          id: 1,
          p1: Vector::new(-900.0, 900.0),
          p2: Vector::new(900.0, 900.0),
        },
      ],
      ..GameSettings::default()
    }
  }

  fn make_conn(id: ConnectionId) -> (Arc<Connection>, mpsc::UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let peer = "127.0.0.1:0".parse().unwrap();
    (Arc::new(Connection::new(id, peer, tx)), rx)
  }

  fn sent_lines(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(message) = rx.try_recv() {
      if let Outbound::Data(text) = message {
        for line in text.lines() {
          lines.push(line.to_string());
        }
      }
    }
    lines
  }

  async fn feed(server: &Server, conn: &Arc<Connection>, text: &str) {
    conn.append_received(text);
    server.on_data(conn).await;
  }

  #[tokio::test]
  async fn handshake_replies_with_id_size_then_walls() {
    let server = Server::new(test_settings(), 16);
    let (conn, mut rx) = make_conn(1);
    server.register(&conn).await;
    feed(&server, &conn, "Ann\n").await;

    let lines = sent_lines(&mut rx);
    assert_eq!(lines[0], "1");
    assert_eq!(lines[1], "1000");
    assert_eq!(lines.len(), 4);
    for wall_line in &lines[2..] {
      match protocol::decode_frame(wall_line) {
        Some(WorldFrame::Wall(_)) => {}
        other => panic!("expected wall lines after the size, got {other:?}"),
      }
    }

    let state = server.state.lock().await;
    let snake = state.world.player(1).expect("snake created on join");
    assert_eq!(snake.name, "Ann");
    assert!(snake.alive);
  }

  #[tokio::test]
  async fn movement_lines_steer_the_snake_after_joining() {
    let server = Server::new(test_settings(), 16);
    let (conn, _rx) = make_conn(1);
    server.register(&conn).await;
    feed(&server, &conn, "Ann\n").await;

    let dir_before = server.state.lock().await.world.player(1).unwrap().dir;
    let intent = if dir_before.x == 0.0 {
      "{\"moving\":\"left\"}\n"
    } else {
      "{\"moving\":\"up\"}\n"
    };
    feed(&server, &conn, intent).await;

    let state = server.state.lock().await;
    let snake = state.world.player(1).unwrap();
    assert_ne!(snake.dir, dir_before);
    assert_eq!(snake.body.len(), 3);
  }

  #[tokio::test]
  async fn junk_after_joining_is_ignored() {
    let server = Server::new(test_settings(), 16);
    let (conn, _rx) = make_conn(1);
    server.register(&conn).await;
    feed(&server, &conn, "Ann\n").await;

    let before = {
      let state = server.state.lock().await;
      let snake = state.world.player(1).unwrap();
      (snake.dir, snake.body.len())
    };
    feed(&server, &conn, "not json\n{\"moving\":\"diagonal\"}\n\n").await;

    let state = server.state.lock().await;
    let snake = state.world.player(1).unwrap();
    assert_eq!((snake.dir, snake.body.len()), before);
    assert!(!conn.is_closed());
  }

  #[tokio::test]
  async fn name_and_movement_split_across_chunks_still_work() {
    let server = Server::new(test_settings(), 16);
    let (conn, mut rx) = make_conn(1);
    server.register(&conn).await;

    feed(&server, &conn, "An").await;
    assert!(sent_lines(&mut rx).is_empty());
    feed(&server, &conn, "n\n{\"moving\":").await;
    assert_eq!(sent_lines(&mut rx)[0], "1");

    let state = server.state.lock().await;
    assert_eq!(state.world.player(1).unwrap().name, "Ann");
  }

  #[tokio::test]
  async fn capacity_rejection_sends_one_shot_notice() {
    let server = Server::new(test_settings(), 1);
    let (first, _rx1) = make_conn(1);
    server.register(&first).await;

    let (second, mut rx2) = make_conn(2);
    server.register(&second).await;
    assert!(second.is_closed());
    assert!(matches!(rx2.try_recv().unwrap(), Outbound::Data(_)));
    assert!(matches!(rx2.try_recv().unwrap(), Outbound::Close));

    // The rejected connection never became a session.
    let state = server.state.lock().await;
    assert_eq!(state.sessions.len(), 1);
  }

  #[tokio::test]
  async fn broadcast_sends_snakes_and_powerups_to_joined_sessions() {
    let server = Server::new(test_settings(), 16);
    let (joined, mut joined_rx) = make_conn(1);
    let (pending, mut pending_rx) = make_conn(2);
    server.register(&joined).await;
    server.register(&pending).await;
    feed(&server, &joined, "Ann\n").await;
    let _ = sent_lines(&mut joined_rx);

    server.state.lock().await.tick();

    let lines = sent_lines(&mut joined_rx);
    let mut snakes = 0;
    let mut powerups = 0;
    for line in &lines {
      match protocol::decode_frame(line) {
        Some(WorldFrame::Snake(snake)) => {
          snakes += 1;
          assert_eq!(snake.name, "Ann");
        }
        Some(WorldFrame::Powerup(_)) => powerups += 1,
        other => panic!("unexpected broadcast line {other:?}"),
      }
    }
    assert_eq!(snakes, 1);
    // The two seeded powerups, plus possibly a same-tick refill if the
    // snake spawned on top of one.
    assert!(powerups >= 2);

    // The unnamed session gets nothing.
    assert!(sent_lines(&mut pending_rx).is_empty());
  }

  #[tokio::test]
  async fn disconnect_defers_removal_to_the_tick_boundary() {
    let server = Server::new(test_settings(), 16);
    let (conn, _rx) = make_conn(1);
    server.register(&conn).await;
    feed(&server, &conn, "Ann\n").await;

    conn.set_error("connection closed by peer");
    server.on_disconnect(&conn).await;

    {
      let state = server.state.lock().await;
      let snake = state.world.player(1).expect("still present mid-tick");
      assert!(snake.dc);
      assert!(!snake.alive);
    }

    let mut state = server.state.lock().await;
    state.tick();
    assert!(state.world.player(1).is_none());
    assert!(state.sessions.is_empty());
  }

  #[tokio::test]
  async fn failed_send_marks_the_snake_disconnected() {
    let server = Server::new(test_settings(), 16);
    let (conn, rx) = make_conn(1);
    server.register(&conn).await;
    feed(&server, &conn, "Ann\n").await;

    // Drop the receiver: every further send fails like a dead socket.
    drop(rx);
    let mut state = server.state.lock().await;
    state.tick();

    let snake = state.world.player(1).expect("removal waits one more tick");
    assert!(snake.dc);
    assert!(!snake.alive);

    state.tick();
    assert!(state.world.player(1).is_none());
  }

  #[test]
  fn names_are_sanitized_and_bounded() {
    assert_eq!(sanitize_name("Ann"), "Ann");
    assert_eq!(sanitize_name("  Ann   Bee \n"), "Ann Bee");
    assert_eq!(sanitize_name(""), "Player");
    assert_eq!(sanitize_name(" \t "), "Player");
    let long = "x".repeat(100);
    assert_eq!(sanitize_name(&long).chars().count(), MAX_PLAYER_NAME_LENGTH);
  }
}

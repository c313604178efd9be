use crate::game::types::Wall;
use anyhow::Context;
use std::env;

use serde::Deserialize;

/// The settings-file shape. Field names match the original settings file,
/// so existing configs keep working. `frames_per_shot` is part of that
/// shape but nothing in the server reads it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct GameSettings {
  pub frames_per_shot: u32,
  #[serde(rename = "MSPerFrame")]
  pub ms_per_frame: u64,
  /// Respawn delay, in ticks.
  pub respawn_rate: u64,
  /// Full edge length of the square world; coordinates span half of it in
  /// each direction.
  pub universe_size: f64,
  pub walls: Vec<Wall>,
  pub velocity: f64,
  pub max_powerup: usize,
  pub max_powerup_delay: u64,
  pub starting_length: f64,
  pub snake_growth: u32,
  /// Alternate gamemode: eating a powerup reverses the snake.
  pub gamemode: bool,
}

impl Default for GameSettings {
  fn default() -> Self {
    Self {
      frames_per_shot: 0,
      ms_per_frame: 34,
      respawn_rate: 300,
      universe_size: 2000.0,
      walls: Vec::new(),
      velocity: 3.0,
      max_powerup: 20,
      max_powerup_delay: 200,
      starting_length: 120.0,
      snake_growth: 12,
      gamemode: false,
    }
  }
}

/// Loads settings from SETTINGS_PATH (default `settings.json`). A missing
/// or unreadable file is not fatal; the server runs on defaults.
pub fn load() -> GameSettings {
  let path = env::var("SETTINGS_PATH").unwrap_or_else(|_| "settings.json".to_string());
  match load_from_file(&path) {
    Ok(settings) => {
      tracing::info!(path, walls = settings.walls.len(), "settings loaded");
      settings
    }
    Err(error) => {
      tracing::warn!(?error, path, "could not load settings, using defaults");
      GameSettings::default()
    }
  }
}

pub fn load_from_file(path: &str) -> anyhow::Result<GameSettings> {
  let text = std::fs::read_to_string(path)
    .with_context(|| format!("could not read settings file {path}"))?;
  serde_json::from_str(&text).with_context(|| format!("could not parse settings file {path}"))
}

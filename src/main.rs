use snake_arena_backend::{net, server::Server, settings};
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let settings = settings::load();

  let port: u16 = env::var("PORT")
    .ok()
    .and_then(|value| value.parse().ok())
    .unwrap_or(11000);
  let max_clients: usize = env::var("MAX_CLIENTS")
    .ok()
    .and_then(|value| value.parse().ok())
    .unwrap_or(25);

  let server = Arc::new(Server::new(settings, max_clients));

  let listener = net::listen(port).await?;
  tracing::info!(port, max_clients, "server started");

  // Losing the accept loop is fatal for new connections only; the tick
  // loop keeps serving whoever is already in the arena.
  tokio::spawn(net::accept_loop(listener, Arc::clone(&server)));

  server.run_ticks().await;
  Ok(())
}

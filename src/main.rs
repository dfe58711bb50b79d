mod app;
mod commands;
mod event;

use clap::Parser;
use color_eyre::Result;
use listcache::config::Config;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "listcache")]
#[command(about = "An interactive shell over a cached paginated list endpoint")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/listcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// List endpoint URL, overriding the config file
  #[arg(short, long)]
  endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration; --endpoint alone is enough to run
  let config = match args.endpoint {
    Some(url) => match Config::load_optional(args.config.as_deref())? {
      Some(mut config) => {
        config.endpoint.url = url;
        config
      }
      None => Config::for_endpoint(url),
    },
    None => Config::load(args.config.as_deref())?,
  };

  let _log_guard = listcache::logging::init(&config.logging)?;
  tracing::info!(endpoint = %config.endpoint.url, "starting listcache");

  // Initialize and run the app
  let mut app = app::App::new(&config)?;
  app.run().await?;

  Ok(())
}

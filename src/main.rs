use std::io;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mousetools::cache::{SqliteStorage, SyncManager};
use mousetools::config::Config;
use mousetools::park::{sync_facilities, Attraction, OperatingHours, ParkClient};
use mousetools::Error;

#[derive(Parser, Debug)]
#[command(name = "mousetools")]
#[command(about = "Show cached details, live status and hours for a park attraction")]
#[command(version)]
struct Args {
  /// Attraction id, e.g. 80010190
  id: Option<String>,

  /// Path to config file (default: $XDG_CONFIG_HOME/mousetools/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Cache database to use instead of the configured one
  #[arg(short, long)]
  database: Option<PathBuf>,

  /// Show hours for this date (YYYY-MM-DD) instead of today
  #[arg(long)]
  date: Option<NaiveDate>,

  /// List the ids of all cached attractions
  #[arg(short, long)]
  list: bool,

  /// Use the cached facility data without syncing it first
  #[arg(long)]
  offline: bool,
}

/// Log to stderr and to a daily file. `RUST_LOG` controls the level.
fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
  let (file_writer, guard) =
    tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "mousetools.log"));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(io::stderr))
    .with(fmt::layer().with_ansi(false).with_writer(file_writer))
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = init_tracing(&config.log_dir()?)?;

  let database = match args.database {
    Some(path) => path,
    None => config.database_path()?,
  };
  let storage = SqliteStorage::open(&database)?;
  let client = ParkClient::new(&config)?;
  let mut manager = SyncManager::new(storage, client);
  if let Some(ttl) = config.status_ttl() {
    manager = manager.with_status_ttl(ttl);
  }
  if let Some(ttl) = config.facility_ttl() {
    manager = manager.with_facility_ttl(ttl);
  }

  if config.sync_on_init && !args.offline {
    for destination in &config.destinations {
      if let Err(e) = sync_facilities(&manager, destination).await {
        tracing::warn!(
          destination = %destination,
          error = %e,
          "facility sync failed, using cached data"
        );
      }
    }
  }

  if args.list {
    for id in Attraction::possible_ids(&manager)? {
      println!("{}", id);
    }
    return Ok(());
  }

  let id = args
    .id
    .ok_or_else(|| eyre!("An attraction id is required (or use --list)"))?;

  let attraction = match Attraction::load(&manager, &id) {
    Ok(attraction) => attraction.with_rollover(config.rollover()),
    Err(Error::NotFound(what)) => {
      eprintln!("That attraction is not available ({}).", what);
      std::process::exit(1);
    }
    Err(e) => return Err(e.into()),
  };

  print_attraction(&attraction).await?;

  let hours = match args.date {
    Some(date) => {
      attraction
        .schedule_for_date(date.year(), date.month(), date.day())
        .await?
    }
    None => attraction.todays_schedule().await?,
  };
  print_hours(&hours);

  Ok(())
}

async fn print_attraction(attraction: &Attraction<'_, ParkClient>) -> Result<()> {
  println!("{}", attraction.name());
  println!("  id:          {}", attraction.id());
  println!(
    "  type:        {}{}",
    attraction.entity_type(),
    attraction
      .sub_type()
      .map(|s| format!(" ({})", s))
      .unwrap_or_default()
  );
  if let Some(park) = attraction.ancestor_park_id() {
    println!("  park:        {}", park);
  }
  if let Some(land) = attraction.ancestor_land_id() {
    println!("  land:        {}", land);
  }
  if let Ok((lat, lon)) = attraction.coordinates() {
    println!("  location:    {:.5}, {:.5}", lat, lon);
  }

  let status = attraction.status().await?;
  println!("  status:      {}", status.as_deref().unwrap_or("unknown"));

  match attraction.wait_time().await? {
    Some(minutes) => println!("  wait:        {} min", minutes),
    None => println!("  wait:        none posted"),
  }

  match attraction.fast_pass_window().await? {
    Some(window) => println!(
      "  fastpass:    {} - {}",
      window.start.format("%H:%M"),
      window.end.format("%H:%M")
    ),
    None => println!("  fastpass:    unavailable"),
  }

  Ok(())
}

fn print_hours(hours: &OperatingHours) {
  if hours.is_empty() {
    println!("  hours:       none published");
    return;
  }

  let slot = |t: Option<NaiveDateTime>| {
    t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
      .unwrap_or_else(|| "-".to_string())
  };
  println!(
    "  hours:       {} to {}",
    slot(hours.operating_open),
    slot(hours.operating_close)
  );
  if hours.extra_open.is_some() || hours.extra_close.is_some() {
    println!(
      "  extra hours: {} to {}",
      slot(hours.extra_open),
      slot(hours.extra_close)
    );
  }
}

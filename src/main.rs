use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use tmsdash::api::{EntityId, HttpBackend, Record};
use tmsdash::cache::CacheSource;
use tmsdash::collections::Collection;
use tmsdash::config::Config;
use tmsdash::dashboard::{ListView, Workspace};
use tmsdash::navigation::LeftNavMode;
use tmsdash::store::{KeyValueStore, SqliteBackend};
use tmsdash::{logging, role::CanonicalRole};

#[derive(Parser, Debug)]
#[command(name = "tmsdash")]
#[command(about = "Inspect the training dashboard's cache, scope and navigation")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tmsdash/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Resolve the signed-in user's role, scope and menu
  Whoami,
  /// List one page of a collection, with labels for referenced ids
  List {
    collection: Collection,
    #[arg(short, long, default_value_t = 1)]
    page: u32,
    /// Bypass the cache
    #[arg(short, long)]
    force: bool,
  },
  /// Show one record of a collection
  Show {
    collection: Collection,
    id: String,
    /// Bypass the cache
    #[arg(short, long)]
    force: bool,
  },
  /// Drop every cached page of a collection
  Invalidate { collection: Collection },
  /// Read or set the left navigation mode
  NavMode { mode: Option<NavModeArg> },
  /// Forget the persisted scope of the signed-in user
  Logout,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum NavModeArg {
  Expanded,
  Collapsed,
  Hidden,
}

impl From<NavModeArg> for LeftNavMode {
  fn from(arg: NavModeArg) -> Self {
    match arg {
      NavModeArg::Expanded => LeftNavMode::Expanded,
      NavModeArg::Collapsed => LeftNavMode::Collapsed,
      NavModeArg::Hidden => LeftNavMode::Hidden,
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = logging::init()?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let store = KeyValueStore::new(SqliteBackend::open_at(&config.store_path()?)?);
  let backend = Arc::new(HttpBackend::new(&config)?);
  let workspace = Workspace::new(backend, store, config.hydration.concurrency);

  match args.command {
    Command::Whoami => {
      let session = workspace.open(&config.current_user()?).await;
      let role = match session.role {
        CanonicalRole::Unknown => "(none)",
        role => role.as_str(),
      };
      println!("user:      {}", session.user.id);
      println!("role:      {}", role);
      println!("scope:     {:?}", session.scope.tier);
      println!("dashboard: {:?}", session.ui.dashboard);
      if let Some(block) = session.scope.scope.primary_block() {
        println!("block:     {}", block);
      }
      if let Some(error) = &session.scope.fetch_error {
        println!("warning:   {}", error);
      }
      for group in session.ui.menu() {
        println!("\n{}", group.label);
        for item in group.items {
          println!("  {:<28} {}", item.label, item.route);
        }
      }
      if session.scope.is_unavailable() {
        println!("\nNo dashboard is available for this account.");
      }
    }
    Command::List {
      collection,
      page,
      force,
    } => {
      let session = workspace.open(&config.current_user()?).await;
      let view = workspace.load_list(&session, collection, page, force).await?;
      print_list(&view);
    }
    Command::Show {
      collection,
      id,
      force,
    } => {
      let id = EntityId::new(id);
      let result = workspace.load_detail(collection, &id, force).await?;
      if let Some(error) = &result.refresh_error {
        eprintln!("refresh failed, showing cached record: {}", error);
      }
      println!("{}", serde_json::to_string_pretty(&result.data)?);
    }
    Command::Invalidate { collection } => {
      let removed = workspace.invalidate(collection);
      println!("removed {} cached entries of {}", removed, collection);
    }
    Command::NavMode { mode } => {
      if let Some(mode) = mode {
        workspace.set_nav_mode(mode.into());
      }
      println!("{:?}", workspace.nav_mode());
    }
    Command::Logout => {
      workspace.logout();
      println!("persisted scope removed");
    }
  }

  Ok(())
}

fn print_list(view: &ListView) {
  let source = match view.source {
    CacheSource::Network => "network".to_string(),
    CacheSource::Cache | CacheSource::Stale => match view.cached_at {
      Some(at) => format!("cache, written {}", at.format("%Y-%m-%d %H:%M")),
      None => "cache".to_string(),
    },
  };
  println!("{}: {} total ({})", view.collection, view.count, source);
  if let Some(error) = &view.refresh_error {
    eprintln!("refresh failed, showing cached rows: {}", error);
  }

  let labels: Vec<String> = view
    .collection
    .hydrate_fields()
    .iter()
    .map(|spec| spec.label_field())
    .collect();
  for row in &view.rows {
    let mut line = format!("{:>8}", cell(row, "id"));
    for label in &labels {
      line.push_str(&format!("  {}", cell(row, label)));
    }
    println!("{}", line);
  }

  if !view.unresolved.is_empty() {
    eprintln!("{} ids could not be labeled", view.unresolved.len());
  }
}

fn cell(row: &Record, field: &str) -> String {
  match row.get(field) {
    Some(Value::String(s)) => s.clone(),
    Some(Value::Null) | None => "-".to_string(),
    Some(other) => other.to_string(),
  }
}


use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use prototyp3d::chat::DEFAULT_BACKEND;
use prototyp3d::server::{self, AppState, STATIC_PREFIX};
use prototyp3d::session::{self, SessionConfig};
use prototyp3d::DirStore;

/// prototyp3d - edit, preview and AI-iterate HTML/CSS/JS prototypes
#[derive(Parser, Debug)]
#[command(name = "prototyp3d")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Serve the project files over /api/load and /api/save
  Serve(ServeArgs),
  /// Interactive session: sync, autosave, preview and chat
  Session(SessionArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
  /// Server port
  #[arg(short, long, default_value = "3000", env = "PROTOTYP3D_PORT")]
  port: u16,

  /// Bind address
  #[arg(long, default_value = "127.0.0.1", env = "PROTOTYP3D_HOST")]
  host: String,

  /// Directory the project files are loaded from and served under /static/product
  #[arg(long, default_value = "static/product", env = "PROTOTYP3D_PRODUCT_DIR")]
  product_dir: PathBuf,

  /// Directory saves are written to (defaults to the product directory)
  #[arg(long, env = "PROTOTYP3D_SAVE_DIR")]
  save_dir: Option<PathBuf>,

  /// Write the starter project if the product directory has no index.html
  #[arg(long)]
  seed: bool,

  /// Auto-open browser on startup
  #[arg(short, long)]
  open: bool,

  /// Show keyboard shortcuts
  #[arg(long)]
  help_keys: bool,

  /// Show available settings
  #[arg(long)]
  help_settings: bool,
}

#[derive(Args, Debug)]
struct SessionArgs {
  /// Base URL of a running `prototyp3d serve`
  #[arg(long, default_value = "http://127.0.0.1:3000", env = "PROTOTYP3D_SERVER")]
  server: String,

  /// Base URL of the prototype backend
  #[arg(long, default_value = DEFAULT_BACKEND, env = "PROTOTYP3D_BACKEND")]
  backend: String,

  /// Project name sent along with every prompt
  #[arg(long, env = "PROTOTYP3D_PROJECT")]
  project_name: Option<String>,

  /// Seconds between polls for remote file changes
  #[arg(long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
  poll_secs: u64,

  /// Seconds between autosaves
  #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
  autosave_secs: u64,

  /// Start with the autosave timer off
  #[arg(long)]
  no_autosave: bool,

  /// Where /run writes the compiled preview
  #[arg(long, default_value = "preview.html")]
  preview_path: PathBuf,
}

fn print_keyboard_help() {
  println!("prototyp3d - Keyboard Shortcuts\n");
  println!("Editor:");
  println!("  Tab              Insert two spaces");
  println!("  Ctrl/Cmd+S       Save files now");
  println!("  Ctrl/Cmd+Enter   Render preview");
  println!();
  println!("Preview:");
  println!("  Escape           Exit full screen");
  println!();
  println!("In `prototyp3d session`: /save, /run, /indent <file> <line>, /esc,");
  println!("or any combination above via /key, e.g. /key ctrl+s.");
  println!();
}

fn print_settings_help() {
  println!("prototyp3d - Available Settings\n");
  println!("serve:");
  println!("  -p, --port <PORT>           Server port (default: 3000)");
  println!("      --host <HOST>           Bind address (default: 127.0.0.1)");
  println!("      --product-dir <PATH>    Project directory (default: static/product)");
  println!("      --save-dir <PATH>       Save directory (default: product directory)");
  println!("      --seed                  Write the starter project if missing");
  println!("  -o, --open                  Auto-open browser on startup");
  println!();
  println!("session:");
  println!("      --server <URL>          prototyp3d server (default: http://127.0.0.1:3000)");
  println!("      --backend <URL>         Prototype backend (default: {DEFAULT_BACKEND})");
  println!("      --project-name <NAME>   Project name sent with prompts");
  println!("      --poll-secs <N>         Poll interval (default: 5)");
  println!("      --autosave-secs <N>     Autosave interval (default: 30)");
  println!("      --no-autosave           Start with autosave off");
  println!("      --preview-path <PATH>   Preview output (default: preview.html)");
  println!();
  println!("Environment:");
  println!("  RUST_LOG                    Log filter (default: prototyp3d=info,tower_http=info)");
  println!("  PROTOTYP3D_*                Fallbacks for the flags above");
  println!();
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
  if args.help_keys {
    print_keyboard_help();
    return Ok(());
  }

  if args.help_settings {
    print_settings_help();
    return Ok(());
  }

  let mut store = DirStore::new(&args.product_dir);
  if let Some(save_dir) = &args.save_dir {
    store = store.with_save_dir(save_dir);
  }
  if args.seed {
    store.seed().await?;
  }

  let app = server::router(AppState::new(store));

  let addr = format!("{}:{}", args.host, args.port);
  let listener = tokio::net::TcpListener::bind(&addr).await?;

  println!("prototyp3d running at http://{}", addr);
  println!("Project directory: {:?}", args.product_dir);
  if let Some(save_dir) = &args.save_dir {
    println!("Saving to: {:?}", save_dir);
  }
  println!("Static files under {STATIC_PREFIX}/");

  if args.open {
    println!("Opening browser...");
    let url = format!("http://{}", addr);
    if let Err(e) = open::that(&url) {
      tracing::warn!("could not open browser: {e}");
    }
  } else {
    println!("Open your browser to http://{}", addr);
  }

  info!(%addr, "listening");
  axum::serve(listener, app).await?;
  Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new("prototyp3d=info,tower_http=info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Command::Serve(args) => serve(args).await,
    Command::Session(args) => {
      session::run(SessionConfig {
        server: args.server,
        backend: args.backend,
        project_name: args.project_name,
        poll_interval: Duration::from_secs(args.poll_secs),
        autosave_interval: Duration::from_secs(args.autosave_secs),
        autosave: !args.no_autosave,
        preview_path: args.preview_path,
      })
      .await
    }
  }
}

//! Process entry point: parses arguments, loads configuration, optionally
//! patches client GTK settings, then runs the daemon until `SIGINT`/`SIGTERM`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gmenu_proxy::{Config, Daemon};

/// Bridges GTK's `org.gtk.Menus`/`org.gtk.Actions` to `com.canonical.dbusmenu`
/// shells, one window at a time.
#[derive(Parser, Debug)]
#[command(name = "gmenu-proxyd", version, about)]
struct Args {
    /// Load configuration from this file instead of the XDG search path.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (stackable: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log verbosity (stackable: -q, -qq).
    #[arg(short, long, action = clap::ArgAction::Count)]
    quiet: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    init_logging(&config.log_level, args.verbose, args.quiet);

    if config.write_gtk_settings {
        gmenu_proxy::gtk_settings::ensure_appmenu_module_enabled();
    }

    smol::block_on(async {
        let daemon = Daemon::new(config).await?;
        daemon.run(shutdown_signal()?).await?;
        Ok(())
    })
}

/// Env filter wins when set; otherwise the configured level, adjusted by
/// `-v`/`-q` stacks (each step moves one level on the usual
/// error/warn/info/debug/trace ladder).
fn init_logging(configured: &str, verbose: u8, quiet: u8) {
    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::init();
        return;
    }

    let levels = ["error", "warn", "info", "debug", "trace"];
    let base = levels.iter().position(|l| *l == configured).unwrap_or(2);
    let shifted = (base as i32 + verbose as i32 - quiet as i32).clamp(0, levels.len() as i32 - 1);
    let level = levels[shifted as usize];

    env_logger::Builder::new().parse_filters(level).init();
}

/// Resolves once `SIGINT` or `SIGTERM` arrives. Registration just flips a
/// signal-safe atomic flag; we poll it from the async side instead of
/// spawning an OS thread, keeping the whole daemon on one.
fn shutdown_signal() -> anyhow::Result<impl std::future::Future<Output = ()>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, flag.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, flag.clone())?;

    Ok(async move {
        while !flag.load(Ordering::Relaxed) {
            smol::Timer::after(Duration::from_millis(100)).await;
        }
        log::info!("shutdown signal received");
    })
}

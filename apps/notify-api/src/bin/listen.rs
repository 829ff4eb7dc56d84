//! Terminal notification listener.
//!
//! Usage:
//!   notify-listen <server-url> <user-id> [--mute | --unmute]
//!
//! Prints status changes, toasts and list refreshes. `--mute` and `--unmute`
//! update the local preference file before connecting.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notify_api::client::{driver, ClientConfig, ClientEvent, ClientPreferences};

const PREFS_FILE: &str = ".notify-prefs.json";

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    let (Some(server_url), Some(user_id)) = (positional.first(), positional.get(1)) else {
        eprintln!("usage: notify-listen <server-url> <user-id> [--mute | --unmute]");
        std::process::exit(2);
    };

    let prefs_path = std::env::var("NOTIFY_PREFS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(PREFS_FILE));
    let mut prefs = ClientPreferences::load(&prefs_path).unwrap_or_else(|err| {
        eprintln!("ignoring unreadable preferences: {err}");
        ClientPreferences::default()
    });

    let toggle = if args.iter().any(|a| a == "--mute") {
        Some(true)
    } else if args.iter().any(|a| a == "--unmute") {
        Some(false)
    } else {
        None
    };
    if let Some(muted) = toggle {
        prefs.muted = muted;
        if let Err(err) = prefs.save(&prefs_path) {
            eprintln!("failed to save preferences: {err}");
        }
    }

    let mut config = ClientConfig::new(server_url.as_str(), user_id.as_str());
    config.muted = prefs.muted;

    let (tx, mut rx) = mpsc::channel(32);
    let driver = tokio::spawn(driver::run(config, tx));

    while let Some(event) = rx.recv().await {
        match event {
            ClientEvent::StateChanged { state, status } => {
                println!("[{status}] {state:?}");
            }
            ClientEvent::Toast(n) => println!("** {} ({}): {}", n.title, n.kind, n.message),
            ClientEvent::Notifications {
                notifications,
                unread_count,
            } => println!("{} notifications, {unread_count} unread", notifications.len()),
            ClientEvent::Pushed(_) => {}
        }
    }

    match driver.await {
        Ok(Err(err)) => eprintln!("listener stopped: {err}"),
        Err(err) => eprintln!("listener crashed: {err}"),
        Ok(Ok(())) => {}
    }
}

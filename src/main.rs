//! Matchday - a local-first match listing with an offline cache layer.
//!
//! The match list and the admin credential live in a file-backed key-value
//! store; the offline worker keeps a versioned cache generation of the
//! application shell so pages keep loading without a network.

mod app;
mod auth;
mod config;
mod models;
mod store;
mod worker;

use std::io::{self, Write};

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use config::Config;
use models::MatchEntry;
use worker::{CacheController, DiskCache, HttpFetcher, Request};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Set up logging with environment-based filter
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn print_usage() {
    eprintln!("Usage: matchday <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  list                                      Show the match list (default)");
    eprintln!("  add <time> <team1> <team2> [link] [note]  Add a match to the top of the list");
    eprintln!("  remove <id>                               Delete a match by id");
    eprintln!("  admin <password> export [file]            Export the list as JSON");
    eprintln!("  admin <password> import <file>            Prepend-merge an exported list");
    eprintln!("  admin <password> wipe                     Delete all matches permanently");
    eprintln!("  admin <password> set-password <new>       Change the admin password");
    eprintln!("  admin <password> reset-password           Reset the admin password to default");
    eprintln!("  warm                                      Install and activate the offline cache");
    eprintln!("  fetch <url> [--navigate]                  Fetch a URL through the offline layer");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    info!("Matchday starting");

    let config = Config::load()?;
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("list");

    match command {
        "list" => cmd_list(&config),
        "add" => cmd_add(&config, &args[2..]),
        "remove" => cmd_remove(&config, &args[2..]),
        "admin" => cmd_admin(&config, &args[2..]),
        "warm" => cmd_warm(&config).await,
        "fetch" => cmd_fetch(&config, &args[2..]).await,
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(2);
        }
    }
}

fn cmd_list(config: &Config) -> Result<()> {
    let app = App::new(config)?;
    if app.matches.is_empty() {
        println!("No matches listed.");
        return Ok(());
    }
    println!("Matches ({}):", app.matches.len());
    for m in app.matches.iter() {
        let mut line = format!("  {}  {} x {}", m.display_time(), m.team1, m.team2);
        if !m.link.is_empty() {
            line.push_str(&format!("  {}", m.link));
        }
        if !m.note.is_empty() {
            line.push_str(&format!("  ({})", m.note));
        }
        println!("{}  [{}]", line, m.id);
    }
    Ok(())
}

fn cmd_add(config: &Config, args: &[String]) -> Result<()> {
    let (Some(time), Some(team1), Some(team2)) = (args.first(), args.get(1), args.get(2)) else {
        eprintln!("Both team names are required.");
        print_usage();
        std::process::exit(2);
    };
    let link = args.get(3).map(String::as_str).unwrap_or("");
    let note = args.get(4).map(String::as_str).unwrap_or("");

    let mut app = App::new(config)?;
    let entry = MatchEntry::new(time, team1, team2, link, note);
    let id = entry.id.clone();
    app.add_match(entry)?;
    println!("Added match {}.", id);
    Ok(())
}

fn cmd_remove(config: &Config, args: &[String]) -> Result<()> {
    let Some(id) = args.first() else {
        eprintln!("A match id is required.");
        std::process::exit(2);
    };
    let mut app = App::new(config)?;
    if app.remove_match(id)? {
        println!("Removed match {}.", id);
    } else {
        eprintln!("No match with id {}.", id);
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_admin(config: &Config, args: &[String]) -> Result<()> {
    let (Some(password), Some(action)) = (args.first(), args.get(1)) else {
        eprintln!("Usage: matchday admin <password> <action>");
        std::process::exit(2);
    };

    let mut app = App::new(config)?;
    if !app.login(password) {
        // Absent record and wrong password read the same on purpose.
        eprintln!("Incorrect password.");
        std::process::exit(1);
    }

    match action.as_str() {
        "export" => {
            let json = app.export_matches()?;
            match args.get(2) {
                Some(file) => {
                    std::fs::write(file, &json)?;
                    println!("Exported {} matches to {}.", app.matches.len(), file);
                }
                None => println!("{}", json),
            }
        }
        "import" => {
            let Some(file) = args.get(2) else {
                eprintln!("Usage: matchday admin <password> import <file>");
                std::process::exit(2);
            };
            let raw = std::fs::read_to_string(file)?;
            match app.import_matches(&raw) {
                Ok(count) => println!("Imported {} matches.", count),
                Err(e) => {
                    eprintln!("Import failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        "wipe" => {
            app.wipe_matches()?;
            println!("All matches deleted.");
        }
        "set-password" => {
            let Some(new_password) = args.get(2) else {
                eprintln!("Usage: matchday admin <password> set-password <new>");
                std::process::exit(2);
            };
            app.credentials.set_password(new_password)?;
            println!("Password updated.");
        }
        "reset-password" => {
            app.credentials.reset()?;
            println!("Password reset to default.");
        }
        other => {
            eprintln!("Unknown admin action: {}", other);
            std::process::exit(2);
        }
    }
    Ok(())
}

/// Install a fresh cache generation and activate it, deleting any
/// superseded generations.
async fn cmd_warm(config: &Config) -> Result<()> {
    let storage = DiskCache::new(config.cache_dir()?)?;
    let fetcher = HttpFetcher::new()?;
    let controller = CacheController::new(storage, fetcher, config.origin());

    let handle = worker::spawn(controller);
    handle.install().await?;
    handle.activate().await?;
    println!("Offline cache ready ({}).", worker::CACHE_NAME);
    Ok(())
}

/// Fetch one URL through the offline layer: cache-first, then network with
/// write-through, then the offline document for navigations.
async fn cmd_fetch(config: &Config, args: &[String]) -> Result<()> {
    let Some(url) = args.first() else {
        eprintln!("A URL is required.");
        std::process::exit(2);
    };
    let navigate = args.iter().any(|a| a == "--navigate");

    let storage = DiskCache::new(config.cache_dir()?)?;
    let fetcher = HttpFetcher::new()?;
    let controller = CacheController::new(storage, fetcher, config.origin());
    let handle = worker::spawn(controller);

    let request = if navigate {
        Request::navigate(url.as_str())
    } else {
        Request::get(url.as_str())
    };

    match handle.fetch(request).await {
        Ok(response) => {
            eprintln!(
                "HTTP {} ({})",
                response.status,
                response.content_type.as_deref().unwrap_or("unknown")
            );
            io::stdout().write_all(&response.body)?;
            Ok(())
        }
        Err(e) => {
            eprintln!("Fetch failed: {}", e);
            std::process::exit(1);
        }
    }
}

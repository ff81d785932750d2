//! sensorlink - operator CLI for the sensor reporting client
//!
//! This tool provides commands for:
//! - Checking sensor configuration and the local store
//! - Verifying the collector login
//! - Querying and controlling collector-side services
//! - Sending manual account, image and stat reports
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/sensorlink/sensor.db (~/.local/share/sensorlink/sensor.db)
//! - Config: $XDG_CONFIG_HOME/sensorlink/config.toml (~/.config/sensorlink/config.toml)
//! - Logs: $XDG_STATE_HOME/sensorlink/ (~/.local/state/sensorlink/)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sensorlink_core::{
    AccountOutcome, AccountRecord, Config, Database, ImageOutcome, Mode, SensorClient,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sensorlink")]
#[command(about = "Report sensor findings to a local store or a remote collector")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/sensorlink/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs to the state directory
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show sensor configuration and local store contents
    Status,

    /// Log in to the collector and report success
    Login,

    /// Show collector-side service status
    Services,

    /// Start a collector-side service
    Start {
        /// Service (parser) name
        name: String,
    },

    /// Stop a collector-side service
    Stop {
        /// Service (parser) name
        name: String,
    },

    /// Ask the collector to reset a data set
    Reset {
        /// Data set to reset (e.g. images, accounts)
        env: String,
    },

    /// Report a captured credential
    Account {
        username: String,
        password: String,

        /// Free-text context
        #[arg(short, long, default_value = "")]
        info: String,

        /// Protocol the credential was seen on
        #[arg(short, long, default_value = "manual")]
        proto: String,

        /// Parser name recorded with the credential
        #[arg(long, default_value = "sensorlink")]
        parser: String,
    },

    /// Report a captured image file
    Image {
        path: PathBuf,
    },

    /// Report a packet count for one protocol
    Stat {
        proto: String,
        count: i64,
    },
}

/// Returns $HOME or panics
fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .expect("HOME environment variable not set")
}

/// Sets XDG environment variables to ensure the core library uses XDG paths
fn ensure_xdg_env() {
    let home = home_dir();

    if std::env::var("XDG_DATA_HOME").is_err() {
        std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
    }

    if std::env::var("XDG_STATE_HOME").is_err() {
        std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
    }

    if std::env::var("XDG_CONFIG_HOME").is_err() {
        std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    ensure_xdg_env();

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };

    // Held until exit so buffered records are flushed
    let _log_guard = if args.verbose {
        Some(
            sensorlink_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config),
        Command::Login => cmd_login(&config),
        Command::Services => cmd_service(&config, |client| client.services()),
        Command::Start { name } => cmd_service(&config, |client| client.start(&name)),
        Command::Stop { name } => cmd_service(&config, |client| client.stop(&name)),
        Command::Reset { env } => cmd_reset(&config, &env),
        Command::Account {
            username,
            password,
            info,
            proto,
            parser,
        } => cmd_account(
            &config,
            AccountRecord::new(username, password, info, proto, parser),
        ),
        Command::Image { path } => cmd_image(&config, path),
        Command::Stat { proto, count } => cmd_stat(&config, &proto, count),
    }
}

fn connect(config: &Config) -> Result<SensorClient> {
    SensorClient::connect(config).with_context(|| {
        format!(
            "failed to log in to collector at {}",
            config.sensor.identity().base_url()
        )
    })
}

/// Wait for queued posts so the process does not exit underneath them
fn flush(config: &Config, client: &SensorClient) {
    let grace = Duration::from_secs(config.transport.drain_timeout_secs);
    if !client.flush(grace) {
        eprintln!("Warning: some reports were still in flight after {:?}", grace);
    }
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("Sensor Configuration");
    println!("====================");
    println!();

    let sensor = &config.sensor;
    let identity = sensor.identity();
    let mode = sensor.resolved_mode();

    println!("Username:        {}", identity.username);
    println!("Collector:       {}", identity.base_url());
    println!(
        "Password:        {}",
        if sensor.password.is_empty() {
            "<not set>"
        } else {
            "<set>"
        }
    );
    println!("Mode:            {}", mode);
    println!("Anonymize:       {}", identity.anonymize);
    println!("Workers:         {}", config.transport.workers);
    println!("Timeout:         {}s", config.transport.timeout_secs);
    println!("Max Retries:     {}", config.transport.max_retries);

    if mode == Mode::Remote {
        println!();
        println!("Reports are posted to the collector; no local store is used.");
        return Ok(());
    }

    let db_path = config.database.resolved_path();
    println!();
    println!("Database:        {}", db_path.display());

    if !db_path.exists() {
        println!("Store:           <not created yet>");
        return Ok(());
    }

    let db = Database::open_with(&db_path, &config.database).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let images = db.list_images()?;
    let sightings: i64 = images.iter().map(|image| image.count).sum();

    println!("Accounts:        {}", db.count_accounts()?);
    println!("Images:          {} ({} sightings)", images.len(), sightings);
    println!("Stats:           {}", db.count_stats(None)?);

    Ok(())
}

fn cmd_login(config: &Config) -> Result<()> {
    let client = connect(config)?;
    println!(
        "Logged in to {} as {} ({} mode)",
        client.identity().base_url(),
        client.identity().username,
        client.mode()
    );
    Ok(())
}

fn cmd_service<F>(config: &Config, query: F) -> Result<()>
where
    F: FnOnce(&SensorClient) -> sensorlink_core::Result<serde_json::Value>,
{
    let client = connect(config)?;
    let services = query(&client).context("service request failed")?;
    println!("{}", serde_json::to_string_pretty(&services)?);
    Ok(())
}

fn cmd_reset(config: &Config, env: &str) -> Result<()> {
    let client = connect(config)?;
    client.reset(env);
    flush(config, &client);
    println!("Requested reset of '{}'", env);
    Ok(())
}

fn cmd_account(config: &Config, account: AccountRecord) -> Result<()> {
    let client = connect(config)?;
    let outcome = client
        .account(&account)
        .context("failed to record account")?;
    flush(config, &client);

    match outcome {
        AccountOutcome::Inserted => println!("Account stored"),
        AccountOutcome::Duplicate => println!("Account already stored"),
        AccountOutcome::EmptyPassword => println!("Account ignored: empty password"),
        AccountOutcome::Queued => println!("Account sent to collector"),
    }
    Ok(())
}

fn cmd_image(config: &Config, path: PathBuf) -> Result<()> {
    let client = connect(config)?;
    let outcome = client.image(&path).context("failed to record image")?;
    flush(config, &client);

    match outcome {
        ImageOutcome::Inserted { hash } => println!("Image stored: {}", hash),
        ImageOutcome::Updated { hash, count } => {
            println!("Image already stored: {} (seen {} times)", hash, count)
        }
        ImageOutcome::Queued => println!("Image sent to collector"),
        ImageOutcome::Skipped => println!("Image not found: {}", path.display()),
    }
    Ok(())
}

fn cmd_stat(config: &Config, proto: &str, count: i64) -> Result<()> {
    let client = connect(config)?;
    client.stat(proto, count).context("failed to record stat")?;
    flush(config, &client);
    println!("Recorded {} packets for {}", count, proto);
    Ok(())
}

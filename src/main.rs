use std::path::PathBuf;

use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use ledc_scheduler::*;
use tokio::time::Duration;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    device: DeviceArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct DeviceArgs {
    /// Controller base URL
    #[arg(short, long, env = "LEDC_DEVICE", default_value = "http://192.168.4.1")]
    device: String,

    /// Request timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum Curve {
    /// Smoothstep, eases in and out
    Cubic,
    /// Straight line
    Linear,
}

#[derive(Subcommand)]
enum Commands {
    /// Print timers, channels and schedule
    Show,
    /// Save the device settings into a file named after its hostname
    Backup {
        /// Target directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
    /// Load settings from a backup file
    Restore {
        /// Backup file
        file: PathBuf,
        /// Send the restored settings to the device
        #[arg(short, long)]
        save: bool,
    },
    /// Add an intensity ramp to the schedule and save it
    Sweep {
        /// Channel id (0-7)
        #[arg(short, long)]
        channel: u8,
        /// Start time (HH:MM)
        #[arg(long)]
        from: String,
        /// Intensity at the start (0-100)
        #[arg(long, default_value_t = 0)]
        from_level: i32,
        /// End time (HH:MM)
        #[arg(long)]
        to: String,
        /// Intensity at the end (0-100)
        #[arg(long, default_value_t = 100)]
        to_level: i32,
        /// Minutes between rows
        #[arg(short, long, default_value_t = 10.0, conflicts_with = "count")]
        step: f64,
        /// Split the ramp into this many steps instead
        #[arg(long)]
        count: Option<f64>,
        /// Ramp shape
        #[arg(long, value_enum, default_value_t = Curve::Cubic)]
        curve: Curve,
        /// Round fractional minutes to the nearest minute instead of down
        #[arg(long)]
        nearest: bool,
        /// Print the resulting schedule without saving
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the chart series of every enabled channel
    Dataset,
    /// Print the schedule columns of every enabled channel
    Columns,
    /// Show the next schedule event and current channel levels
    Now {
        /// Time of day to evaluate (HH:MM), defaults to the local clock
        #[arg(long)]
        at: Option<String>,
    },
}

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    // Initialize tracing with pretty colors
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("ledc_scheduler=info")),
        )
        .compact()
        .init();

    // Initialize color-eyre for pretty error reporting
    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let config = SyncConfig::new(cli.device.device)
        .with_timeout(Duration::from_millis(cli.device.timeout_ms));
    let sync = Synchronizer::new(HttpTransport::new(&config)?, config);

    match cli.command.unwrap_or(Commands::Show) {
        Commands::Show => {
            load(&sync).await?;
            print_state(&sync.state());
        }
        Commands::Backup { dir } => {
            let path = report(&sync, sync.backup(&dir).await)?;
            println!("{}", path.display());
        }
        Commands::Restore { file, save } => {
            report(&sync, sync.restore(&file, |_| save).await)?;
            if !save {
                print_state(&sync.state());
            }
        }
        Commands::Sweep {
            channel,
            from,
            from_level,
            to,
            to_level,
            step,
            count,
            curve,
            nearest,
            dry_run,
        } => {
            let step = match count {
                Some(count) => StepMode::Count(count),
                None => StepMode::Time(step),
            };
            let interpolation = match curve {
                Curve::Cubic => Interpolation::Cubic,
                Curve::Linear => Interpolation::Linear,
            };
            let rounding = if nearest {
                MinuteRounding::Nearest
            } else {
                MinuteRounding::Floor
            };
            let sweep = SweepRequest::new(
                channel,
                &from,
                from_level,
                &to,
                to_level,
                step,
                interpolation,
            )?
            .with_rounding(rounding);

            load(&sync).await?;
            let rows = sync.update(|state| state.schedule.apply_sweep(&sweep));
            info!("Sweep produced {} rows", rows);

            if dry_run {
                print_schedule(&sync.state().schedule);
            } else {
                report(&sync, sync.save().await)?;
            }
        }
        Commands::Dataset => {
            load(&sync).await?;
            let series = sync.state().dataset();
            println!("{}", serde_json::to_string_pretty(&series)?);
        }
        Commands::Columns => {
            load(&sync).await?;
            let columns = sync.state().columns();
            println!("{}", serde_json::to_string_pretty(&columns)?);
        }
        Commands::Now { at } => {
            let now = match at {
                Some(at) => at.parse::<TimeOfDay>()?,
                None => TimeOfDay::from_time(Local::now().time()),
            };
            load(&sync).await?;
            print_now(&sync.state(), now);
        }
    }

    Ok(())
}

async fn load<T: SettingsTransport>(sync: &Synchronizer<T>) -> Result<()> {
    report(sync, sync.load().await)
}

/// Prints the final status line and turns a failure into a report
fn report<T: SettingsTransport, R>(
    sync: &Synchronizer<T>,
    result: ledc_scheduler::Result<R>,
) -> Result<R> {
    let status = sync.status();
    match result {
        Ok(value) => {
            eprintln!("{}", status);
            Ok(value)
        }
        Err(e) => {
            warn!("{}", e);
            Err(eyre!("{}", status))
        }
    }
}

fn print_state(state: &AppState) {
    println!("Host: {} ({})", state.system.hostname, state.system.timezone);
    println!("NTP:  {}", state.system.ntp_servers.join(", "));

    println!("\nTimers");
    for timer in state.timers.all() {
        println!("  {:<8} {:>6} Hz", timer.name(), timer.freq);
    }

    println!("\nChannels");
    for channel in state.channels.all() {
        let gpio = channel
            .gpio
            .map_or_else(|| "-".to_string(), |gpio| gpio.to_string());
        println!(
            "  {} {:<16} gpio {:>2}  {:<8} {}",
            channel.id,
            channel.name,
            gpio,
            state.timers.name_of(channel.timer),
            if channel.enabled { "enabled" } else { "disabled" }
        );
    }

    println!("\nSchedule");
    print_schedule(&state.schedule);
}

fn print_schedule(schedule: &Schedule) {
    for entry in schedule.entries() {
        let levels: Vec<String> = entry
            .levels()
            .map(|(channel, value)| format!("{channel}={value}"))
            .collect();
        println!("  {}  {}", entry.tod, levels.join(" "));
    }
}

fn print_now(state: &AppState, now: TimeOfDay) {
    match state.schedule.next_event(now) {
        Some(next) => {
            let minutes = next
                .time_of_day()
                .map(|t| Schedule::minutes_until(t, now))
                .unwrap_or_default();
            println!("{now}: next event at {} (in {} min)", next.tod, minutes);
        }
        None => println!("{now}: schedule is empty"),
    }

    for channel in state.channels.enabled() {
        match state.schedule.level_at(channel.id, now) {
            Some(level) => println!("  {:<16} {:>3}", channel.name, level),
            None => println!("  {:<16}   -", channel.name),
        }
    }
}

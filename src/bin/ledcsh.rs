use ledc_scheduler::*;
use std::env;
use std::time::Duration;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Get the device URL from command line arguments or the environment.
    let usage = "Usage: ledcsh <device url> [timeout ms]";
    let args: Vec<_> = env::args().collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        eprintln!("{usage}");
        std::process::exit(0);
    }
    let Some(url) = args.get(1).cloned().or_else(|| env::var("LEDC_DEVICE").ok()) else {
        eprintln!("{usage}");
        std::process::exit(1);
    };
    let timeout = match args.get(2) {
        Some(ms) => Duration::from_millis(parse(ms, "timeout")?),
        None => DEFAULT_TIMEOUT,
    };

    // Logs go to stderr, stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("ledc_scheduler=warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = SyncConfig::new(url).with_timeout(timeout);
    let sync = Synchronizer::new(HttpTransport::new(&config)?, config);

    // Inform about successful initialization
    println!("OK");

    // Mainloop: wait for user input, line by line
    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match run(&sync, line).await {
            Ok(Some(output)) => println!("{output}"),
            Ok(None) => println!("OK"),
            Err(e) => eprintln!("ERR {}", describe(&e)),
        }
    }

    Ok(())
}

/// Executes one command line. `Some` output replaces the plain `OK` reply.
async fn run<T: SettingsTransport>(
    sync: &Synchronizer<T>,
    line: &str,
) -> Result<Option<String>> {
    let (command, args) = line.split_once(':').unwrap_or((line, ""));
    match command {
        "load" => {
            sync.load().await.map_err(|e| failure(sync, e))?;
        }
        "save" => {
            sync.save().await.map_err(|e| failure(sync, e))?;
        }
        "timer" => {
            let [id, freq] = fields::<2>(args)?;
            let id: u8 = parse(id, "timer id")?;
            let freq: u32 = parse(freq, "frequency")?;
            sync.update(|state| {
                let timer = state
                    .timers
                    .get_mut(id)
                    .ok_or(Error::ValueOutOfRange(id.into(), 0, TIMER_COUNT as i64 - 1))?;
                timer.freq = freq;
                Ok::<_, Error>(())
            })?;
        }
        "channel" => {
            let [id, gpio, timer, enabled] = fields::<4>(args)?;
            let id: u8 = parse(id, "channel id")?;
            let gpio = optional(gpio, "gpio")?;
            let timer = optional(timer, "timer")?;
            let enabled: bool = parse(enabled, "enabled")?;
            sync.update(|state| state.channels.assign(id, gpio, timer, enabled))?;
        }
        "name" => {
            let (id, name) = args
                .split_once(',')
                .ok_or_else(|| Error::General("Expected name:<id>,<name>".into()))?;
            let id: u8 = parse(id, "channel id")?;
            let name = name.trim().to_string();
            sync.update(|state| match state.channels.get_mut(id) {
                Some(channel) => {
                    channel.name = name;
                    Ok(())
                }
                None => Err(Error::ValueOutOfRange(id.into(), 0, CHANNEL_COUNT as i64 - 1)),
            })?;
        }
        "row" => {
            let mut parts = args.split(',');
            let tod = parts.next().unwrap_or_default().trim().to_string();
            let mut levels = Vec::new();
            for part in parts {
                let (channel, value) = part.split_once('=').ok_or_else(|| {
                    Error::General(format!("Expected <channel>=<value>, got '{part}'"))
                })?;
                let channel: u8 = parse(channel, "channel")?;
                levels.push((channel, optional(value, "intensity")?));
            }
            sync.update(|state| {
                if state.schedule.get(&tod).is_none() {
                    state.schedule.push_row(ScheduleEntry::new(tod.as_str()));
                }
                if let Some(entry) = state.schedule.get_mut(&tod) {
                    for (channel, value) in levels {
                        entry.set_level(channel, value);
                    }
                }
                state.schedule.sort();
            });
        }
        "delete" => {
            let tod = args.trim();
            sync.update(|state| state.schedule.remove(tod))
                .ok_or_else(|| Error::General(format!("No schedule row at {tod}")))?;
        }
        "sweep" => {
            let sweep = parse_sweep(args)?;
            let rows = sync.update(|state| state.schedule.apply_sweep(&sweep));
            return Ok(Some(format!("OK {rows}")));
        }
        "dataset" => {
            let series = sync.state().dataset();
            return Ok(Some(serde_json::to_string(&series)?));
        }
        "columns" => {
            let columns = sync.state().columns();
            return Ok(Some(serde_json::to_string(&columns)?));
        }
        "status" => {
            return Ok(Some(format!("OK {}", sync.status().message)));
        }
        other => {
            return Err(Error::General(format!("Unknown command: {other}")));
        }
    }
    Ok(None)
}

/// Settings operation failures are reported with their status line
fn failure<T: SettingsTransport>(sync: &Synchronizer<T>, error: Error) -> Error {
    match error {
        Error::Busy => error,
        _ => Error::General(sync.status().message),
    }
}

fn describe(error: &Error) -> String {
    match error {
        Error::General(message) => message.clone(),
        other => other.to_string(),
    }
}

/// `<ch>,<start>,<from>,<end>,<to>,<step>` followed by any of
/// `cubic|linear`, `time|count` and `floor|nearest`
fn parse_sweep(args: &str) -> Result<SweepRequest> {
    let parts: Vec<&str> = args.split(',').collect();
    if parts.len() < 6 {
        return Err(Error::General(
            "Expected sweep:<ch>,<start>,<from>,<end>,<to>,<step>[,cubic|linear][,time|count][,floor|nearest]"
                .into(),
        ));
    }
    let (fields, options) = parts.split_at(6);

    let mut interpolation = Interpolation::Cubic;
    let mut count = false;
    let mut rounding = MinuteRounding::Floor;
    for option in options {
        match option.trim() {
            "cubic" => interpolation = Interpolation::Cubic,
            "linear" => interpolation = Interpolation::Linear,
            "time" => count = false,
            "count" => count = true,
            "floor" => rounding = MinuteRounding::Floor,
            "nearest" => rounding = MinuteRounding::Nearest,
            other => return Err(Error::General(format!("Unknown sweep option: {other}"))),
        }
    }

    let step: f64 = parse(fields[5], "step")?;
    let step = if count {
        StepMode::Count(step)
    } else {
        StepMode::Time(step)
    };
    Ok(SweepRequest::new(
        parse(fields[0], "channel")?,
        fields[1].trim(),
        parse(fields[2], "intensity")?,
        fields[3].trim(),
        parse(fields[4], "intensity")?,
        step,
        interpolation,
    )?
    .with_rounding(rounding))
}

fn fields<const N: usize>(args: &str) -> Result<[&str; N]> {
    let parts: Vec<&str> = args.split(',').collect();
    parts
        .try_into()
        .map_err(|parts: Vec<&str>| {
            Error::General(format!("Expected {N} fields, got {}", parts.len()))
        })
}

fn parse<V: std::str::FromStr>(value: &str, what: &str) -> Result<V> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::General(format!("Invalid {what}: '{}'", value.trim())))
}

/// Empty or `-` means not assigned
fn optional<V: std::str::FromStr>(value: &str, what: &str) -> Result<Option<V>> {
    match value.trim() {
        "" | "-" => Ok(None),
        _ => parse(value, what).map(Some),
    }
}

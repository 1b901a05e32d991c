use std::{path::Path, thread, time::Duration};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};

use people_counter::{
    counting_config::{CountingConfig, load_config_from_file},
    error::CounterError,
    persistence::{JsonLinesStore, RunResult, RunStore, persist},
    pipeline::{EventCallback, FramePipeline, LogOverlay},
    sources::{FrameSource, JsonLinesSource, MsgPackSource, ThreadedSource},
    systems::crossing::{CrossingEvent, Direction},
};

use cli::{Cli, InputFormat};

mod cli;

const PERSIST_ATTEMPTS: usize = 3;
const PERSIST_RETRY_DELAY: Duration = Duration::from_millis(200);

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger from the environment

    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    debug!("Started; args: {:?}", cli);

    let config = build_config(&cli)?;

    if cli.write_config {
        return config.write_config_to_file(&cli.config_path);
    }

    let mut store = JsonLinesStore::new(Path::new(&config.store_path));

    if cli.list_records {
        return print_records(&store, cli.user_filter());
    }

    let input = cli
        .input
        .as_ref()
        .ok_or_else(|| anyhow!("--input is required"))?;

    let mut source = open_source(input, cli.input_format(), config.queue_capacity)?;

    let mut pipeline = FramePipeline::new(&config, &cli.user)
        .with_observer(EventCallback(|e: &CrossingEvent| {
            let label = match e.direction {
                Direction::Inbound => "IN",
                Direction::Outbound => "OUT",
            };
            println!("{} +1 (track {}, frame {})", label, e.track_id, e.frame_index);
        }))
        .with_observer(LogOverlay::new(30));

    if let Some(seconds) = cli.max_seconds {
        let stop = pipeline.stop_handle();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(seconds));
            warn!("Time limit of {}s reached; stopping", seconds);
            stop.stop();
        });
    }

    let result = pipeline.run(&mut source)?;

    if cli.no_store {
        info!("Not storing run {} (--noStore)", result.run_id);
    } else {
        save_with_retry(&mut store, result.clone())?;
    }

    println!(
        "Final Count -> IN: {} | OUT: {}{}",
        result.in_count,
        result.out_count,
        if result.cancelled { " (stopped early)" } else { "" }
    );

    Ok(())
}

fn build_config(cli: &Cli) -> Result<CountingConfig> {
    let mut config = load_config_from_file(&cli.config_path)?;
    if let Some(line_position) = cli.line_position {
        config.line_position = line_position;
    }
    if let Some(margin) = cli.margin {
        config.margin = margin;
    }
    if cli.max_frames.is_some() {
        config.max_frames = cli.max_frames;
    }
    if let Some(store_path) = &cli.store_path {
        config.store_path = store_path.clone();
    }
    config.validate()?;
    debug!("Effective config: {:?}", config);
    Ok(config)
}

/// The recording is parsed on a reader thread; frames reach the counter in file order
fn open_source(
    input: &Path,
    format: InputFormat,
    queue_capacity: usize,
) -> Result<ThreadedSource> {
    let source = match format {
        InputFormat::Json => ThreadedSource::spawn(
            JsonLinesSource::open(input).map_err(|e| unavailable(input, e.to_string()))?,
            queue_capacity,
        ),
        InputFormat::Msgpack => ThreadedSource::spawn(
            MsgPackSource::open(input).map_err(|e| unavailable(input, e.to_string()))?,
            queue_capacity,
        ),
    };
    info!("Reading {:?} frames from {}", format, source.name());
    Ok(source)
}

fn unavailable(input: &Path, reason: String) -> CounterError {
    CounterError::SourceUnavailable {
        name: input.to_string_lossy().into_owned(),
        reason,
    }
}

fn save_with_retry(store: &mut dyn RunStore, result: RunResult) -> Result<()> {
    let mut result = result;
    for attempt in 1..=PERSIST_ATTEMPTS {
        match persist(store, &result) {
            Ok(()) => return Ok(()),
            Err(CounterError::PersistenceFailure { result: returned, source }) => {
                warn!(
                    "Attempt {}/{} to store run failed: {}",
                    attempt, PERSIST_ATTEMPTS, source
                );
                result = *returned;
                if attempt < PERSIST_ATTEMPTS {
                    thread::sleep(PERSIST_RETRY_DELAY * attempt as u32);
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    error!(
        "Giving up storing run {}: IN {} | OUT {}",
        result.run_id, result.in_count, result.out_count
    );
    Err(anyhow!("could not store run {}", result.run_id))
}

fn print_records(store: &JsonLinesStore, user: Option<&str>) -> Result<()> {
    let records = store
        .list(user)
        .with_context(|| format!("failed to read records from {:?}", store.path()))?;

    if records.is_empty() {
        println!("No records found");
        return Ok(());
    }

    println!(
        "{:<12} {:<28} {:>6} {:>6}  {}",
        "user", "source", "in", "out", "completed"
    );
    for r in records.iter() {
        println!(
            "{:<12} {:<28} {:>6} {:>6}  {}",
            r.user,
            r.source_name,
            r.in_count,
            r.out_count,
            r.completed_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

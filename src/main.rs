//! pave-ingest - Main entry point
//!
//! Connects to every active drone, decodes its PaVE video stream and
//! republishes the frames until interrupted.

mod args;

use args::Args;
use clap::Parser;
use crossbeam::channel::bounded;
use futures::future::join_all;
use log::{error, info, warn};
use parking_lot::Mutex;
use pave_ingest::config::Config;
use pave_ingest::pave::{FrameAssembler, StreamStats};
use pave_ingest::publish::{ChannelSink, FramePublisher, StreamFrame};
use pave_ingest::transport::TcpByteSource;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();
    let loaded = args.load_config();

    // Initialize logging
    let log_level = match (&loaded, args.verbose) {
        (_, true) => "debug".to_string(),
        (Ok(cfg), false) => cfg.logging.level.clone(),
        (Err(_), false) => "info".to_string(),
    };
    env_logger::Builder::new()
        .parse_filters(&env_var("PAVE_LOG").unwrap_or(log_level))
        .init();

    info!("pave-ingest v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; a missing file means defaults, a broken one is fatal
    let mut config = match loaded {
        Ok(cfg) => {
            info!("Loaded configuration from {:?}", args.config);
            cfg
        }
        Err(e) => {
            error!("Failed to load config {:?}: {}", args.config, e);
            return Err(e);
        }
    };

    apply_stream_overrides(&mut config, &args);
    apply_drone_overrides(&mut config, &args);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e);
    }

    let running = Arc::new(AtomicBool::new(true));
    let (frame_tx, frame_rx) = bounded::<StreamFrame>(config.stream.queue_depth);

    // Start the publisher
    let publisher_running = running.clone();
    let output = config.output.output();
    let mut publisher_handle = task::spawn_blocking(move || {
        let mut publisher = FramePublisher::new(output);
        publisher.run(frame_rx, &publisher_running);
        Ok::<(), String>(())
    });

    // Start one decode loop per drone
    let mut stream_handles = Vec::new();
    let mut stream_stats = Vec::new();
    for drone in config.active_drones() {
        let addr = drone.socket_addr()?;
        let name = drone.name.clone();
        let assembler_config = config.stream.assembler();
        let timeout = config.stream.timeout();
        let sink = ChannelSink::new(name.as_str(), frame_tx.clone());
        let stats = Arc::new(Mutex::new(StreamStats::default()));
        stream_stats.push((name.clone(), stats.clone()));

        info!(
            "[{}]Streaming from {} (buffer {} bytes, timeout {:?})",
            name, addr, assembler_config.buffer_size, timeout
        );
        let stream_running = running.clone();
        stream_handles.push(task::spawn_blocking(move || {
            let source = TcpByteSource::connect(name.as_str(), addr, timeout, stream_running.clone());
            let mut assembler =
                FrameAssembler::new(name.as_str(), &assembler_config, source, sink).with_stats(stats);
            assembler.run(&stream_running);
            Ok::<(), String>(())
        }));
    }
    drop(frame_tx);

    // Periodic stream statistics
    let stats_running = running.clone();
    let stats_handle = task::spawn(async move {
        while stats_running.load(Ordering::Relaxed) {
            tokio::time::sleep(STATS_INTERVAL).await;
            for (name, stats) in &stream_stats {
                info!("[{}]{}", name, stats.lock());
            }
        }
    });

    // Wait for shutdown signal
    let mut streams = Box::pin(join_all(stream_handles));
    let mut streams_done = false;
    let mut publisher_done = false;
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        results = &mut streams => {
            streams_done = true;
            for result in results {
                log_blocking_task_result("Stream loop", result);
            }
        }
        result = &mut publisher_handle => {
            publisher_done = true;
            log_blocking_task_result("Publisher", result);
        }
    }

    // Cleanup
    running.store(false, Ordering::Relaxed);
    info!("Stopping all tasks...");

    stats_handle.abort();
    let _ = stats_handle.await;

    // Decode loops notice the flag within one receive timeout
    if !streams_done {
        for result in streams.await {
            if let Err(err) = result {
                error!("Stream loop join error: {}", err);
            }
        }
    }

    if !publisher_done {
        if let Err(err) = publisher_handle.await {
            error!("Publisher join error: {}", err);
        }
    }

    info!("pave-ingest stopped");
    Ok(())
}

fn log_blocking_task_result(task: &str, result: Result<Result<(), String>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => warn!("{} stopped unexpectedly", task),
        Ok(Err(err)) => error!("{} failed: {}", task, err),
        Err(err) => error!("{} join error: {}", task, err),
    }
}

fn apply_stream_overrides(config: &mut Config, args: &Args) {
    if let Some(size) = args.buffer_size.or(parse_usize(&env_var("PAVE_BUFFER_SIZE"))) {
        info!("Overriding buffer size to {} bytes", size);
        config.stream.buffer_size = size;
    }
    if let Some(timeout) = args.timeout {
        config.stream.timeout_ms = timeout;
    }
    if let Some(ref dir) = args.output_dir {
        config.output.directory = Some(dir.clone());
    }
    if args.metadata {
        config.output.metadata = true;
    }
}

fn apply_drone_overrides(config: &mut Config, args: &Args) {
    let ip = args.drone_ip.clone().or(env_var("PAVE_DRONE_IP"));
    let port = args.drone_port.or(parse_u16(&env_var("PAVE_DRONE_PORT")));
    if let Some(ref ip) = ip {
        info!("[{}]Using drone IP {} from the command line", args.name, ip);
    }
    if !config.override_drone(&args.name, ip, port) {
        warn!("[{}]Drone port override ignored: no such drone, pass --drone-ip too", args.name);
    }
}

fn env_var(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn parse_u16(value: &Option<String>) -> Option<u16> {
    value.as_ref()?.trim().parse::<u16>().ok()
}

fn parse_usize(value: &Option<String>) -> Option<usize> {
    value.as_ref()?.trim().parse::<usize>().ok()
}

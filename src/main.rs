use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use orbit_capture::capture_client::{
    call_ops, instrumented_functions, CaptureClient, CaptureClientGgpServer,
    CaptureClientGgpService,
};
use orbit_capture::capture_data::CaptureData;
use orbit_capture::capture_file::{load_from_path, CaptureFileWriter, LoadOutcome};
use orbit_capture::capture_listener::RecordingCaptureListener;
use orbit_capture::capture_service::{CaptureServer, CaptureServiceImpl};
use orbit_capture::perfetto::export_capture;
use orbit_capture::producer_side_service::{ProducerSideServer, ProducerSideServiceImpl};
use orbit_capture::protos::capture::ops_request::Request as OpsCall;
use orbit_capture::protos::capture::{
    CaptureOptions, ShutdownServiceRequest, StartCaptureRequest, StopCaptureRequest,
    UpdateSelectedFunctionsRequest,
};
use orbit_capture::Config;

#[derive(Debug, Parser)]
#[command(name = "orbit-capture")]
#[command(about = "Run the Orbit capture services and work with capture files")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the producer-side, capture and ops servers until Ctrl-C
    Service {
        #[arg(long)]
        producer_socket: Option<PathBuf>,
        #[arg(long)]
        capture_socket: Option<PathBuf>,
        #[arg(long)]
        ops_socket: Option<PathBuf>,
        /// Persist every capture under this directory
        #[arg(long)]
        capture_output_dir: Option<PathBuf>,
        /// How long a stopping capture waits for producers, in milliseconds
        #[arg(long)]
        max_wait_ms: Option<u64>,
        /// Process captured through the ops server; no ops server without it
        #[arg(long)]
        ops_pid: Option<u32>,
    },
    /// Capture a process for a fixed duration and save it
    Capture {
        #[arg(short, long)]
        pid: u32,
        #[arg(short, long, default_value = "1000")]
        duration_ms: u64,
        #[arg(short, long)]
        output: PathBuf,
        /// Function to instrument, may be repeated
        #[arg(short, long)]
        function: Vec<String>,
        #[arg(long, default_value = "0")]
        samples_per_second: f64,
        #[arg(long)]
        trace_thread_state: bool,
        #[arg(long)]
        trace_gpu_driver: bool,
    },
    /// Start a capture through the ops server
    Start,
    /// Stop the capture started through the ops server
    Stop,
    /// Replace the functions instrumented by ops captures
    UpdateFunctions { functions: Vec<String> },
    /// Shut the ops server down
    Shutdown,
    /// Load a capture file and print how often each callback fired
    Load { file: PathBuf },
    /// Convert a capture file to a Perfetto trace
    ExportPerfetto { file: PathBuf, output: PathBuf },
}

fn run_service(config: Config, ops_pid: Option<u32>) -> Result<()> {
    let producer_side_service = Arc::new(ProducerSideServiceImpl::new());
    producer_side_service
        .set_max_wait_for_all_capture_events_ms(config.max_wait_for_all_events_sent_ms);
    let producer_side_server =
        ProducerSideServer::start(&config.producer_socket, producer_side_service.clone())?;

    let capture_service = Arc::new(
        CaptureServiceImpl::new()
            .with_capture_output_dir(config.capture_output_dir.clone())
            .with_dispatcher_capacity(config.dispatcher_capacity),
    );
    capture_service.add_capture_start_stop_listener(producer_side_service.clone());
    let capture_server = CaptureServer::start(&config.capture_socket, capture_service)?;

    let (stop_tx, stop_rx) = channel();
    let ops_server = match ops_pid {
        Some(pid) => {
            let output_dir = config
                .capture_output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("."));
            let ggp_service = Arc::new(CaptureClientGgpService::new(
                &config.capture_socket,
                pid,
                &output_dir,
            ));
            let server = CaptureClientGgpServer::start(&config.ops_socket, ggp_service.clone())?;
            let stop_tx = stop_tx.clone();
            thread::Builder::new()
                .name("ops-shutdown".to_string())
                .spawn(move || {
                    ggp_service.wait_for_shutdown();
                    let _ = stop_tx.send(());
                })
                .context("Failed to spawn ops shutdown thread")?;
            Some(server)
        }
        None => None,
    };

    {
        let producer_side_service = producer_side_service.clone();
        ctrlc::set_handler(move || {
            producer_side_service.on_exit_request();
            let _ = stop_tx.send(());
        })
        .context("Error setting Ctrl-C handler")?;
    }
    println!("Press Ctrl-C to stop");
    stop_rx
        .recv()
        .context("Could not receive signal on channel")?;

    println!("Stopping...");
    if let Some(server) = ops_server {
        server.shutdown();
    }
    capture_server.shutdown();
    producer_side_server.shutdown_and_wait();
    Ok(())
}

fn run_capture(
    config: &Config,
    capture_options: CaptureOptions,
    duration: Duration,
    output: &Path,
) -> Result<()> {
    let writer = CaptureFileWriter::create(output)?;
    let client = CaptureClient::new(&config.capture_socket);
    let handle = client.start_capture(capture_options, writer)?;

    println!("Capturing for {} ms", duration.as_millis());
    thread::sleep(duration);

    let mut outcome = handle.stop_and_wait()?;
    outcome.listener.finish()?;
    println!(
        "Received {} events, saved {} timers to {}",
        outcome.events_received,
        outcome.listener.timer_count(),
        output.display()
    );
    if let Some(stats) = outcome.gpu_correlation_stats {
        println!(
            "GPU: {} unmatched submissions, {} unmatched jobs, {} skipped timers",
            stats.unmatched_submissions, stats.unmatched_jobs, stats.skipped_timers
        );
    }
    if !outcome.status.ok {
        bail!("Capture failed: {}", outcome.status.message);
    }
    println!("{}", outcome.status.message);
    Ok(())
}

fn cancellation_on_ctrlc() -> Result<Arc<AtomicBool>> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let handler_flag = cancelled.clone();
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed))
        .context("Error setting Ctrl-C handler")?;
    Ok(cancelled)
}

fn run_load(file: &Path) -> Result<()> {
    let cancelled = cancellation_on_ctrlc()?;
    let mut listener = RecordingCaptureListener::new();
    let outcome = load_from_path(file, &mut listener, &cancelled)?;
    for (callback, count) in listener.counts() {
        println!("{:<24} {}", callback, count);
    }
    if outcome == LoadOutcome::Cancelled {
        println!("Loading was cancelled");
    }
    Ok(())
}

fn run_export(file: &Path, output: &Path) -> Result<()> {
    let cancelled = cancellation_on_ctrlc()?;
    let mut capture = CaptureData::new();
    if load_from_path(file, &mut capture, &cancelled)? == LoadOutcome::Cancelled {
        bail!("Loading {} was cancelled", file.display());
    }
    export_capture(&capture, output)?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn run_ops(config: &Config, request: OpsCall) -> Result<()> {
    let result = call_ops(&config.ops_socket, request)?;
    println!("{}", result);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    let mut config = Config::load(cli.config.as_deref())?;
    info!("Using {:?}", config);

    match cli.command {
        Commands::Service {
            producer_socket,
            capture_socket,
            ops_socket,
            capture_output_dir,
            max_wait_ms,
            ops_pid,
        } => {
            if let Some(path) = producer_socket {
                config.producer_socket = path;
            }
            if let Some(path) = capture_socket {
                config.capture_socket = path;
            }
            if let Some(path) = ops_socket {
                config.ops_socket = path;
            }
            if capture_output_dir.is_some() {
                config.capture_output_dir = capture_output_dir;
            }
            if let Some(ms) = max_wait_ms {
                config.max_wait_for_all_events_sent_ms = ms;
            }
            run_service(config, ops_pid)
        }
        Commands::Capture {
            pid,
            duration_ms,
            output,
            function,
            samples_per_second,
            trace_thread_state,
            trace_gpu_driver,
        } => {
            let capture_options = CaptureOptions {
                pid,
                samples_per_second,
                instrumented_functions: instrumented_functions(pid, &function),
                trace_thread_state,
                trace_gpu_driver,
                ..Default::default()
            };
            run_capture(
                &config,
                capture_options,
                Duration::from_millis(duration_ms),
                &output,
            )
        }
        Commands::Start => run_ops(&config, OpsCall::StartCapture(StartCaptureRequest {})),
        Commands::Stop => run_ops(&config, OpsCall::StopCapture(StopCaptureRequest {})),
        Commands::UpdateFunctions { functions } => run_ops(
            &config,
            OpsCall::UpdateSelectedFunctions(UpdateSelectedFunctionsRequest { functions }),
        ),
        Commands::Shutdown => run_ops(&config, OpsCall::ShutdownService(ShutdownServiceRequest {})),
        Commands::Load { file } => run_load(&file),
        Commands::ExportPerfetto { file, output } => run_export(&file, &output),
    }
}

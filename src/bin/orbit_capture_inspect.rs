//! orbit_capture_inspect: Print the contents of a capture file
//!
//! Shows the header, a summary of the capture info section, the first timers
//! and how many records of each kind follow, without loading the whole capture
//! into memory.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use orbit_capture::capture_file::CaptureFileReader;
use orbit_capture::protos::capture_data::capture_record::Record;
use orbit_capture::protos::capture_data::TimerType;

#[derive(Parser)]
#[command(name = "orbit_capture_inspect")]
#[command(about = "Print the header, info summary and first timers of a capture file")]
#[command(version)]
struct Cli {
    /// Capture file
    file: PathBuf,

    /// Number of timers to print
    #[arg(short, long, default_value = "10")]
    timers: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let mut reader = CaptureFileReader::open(&cli.file)?;

    println!("version: {}", reader.header().version);

    let info = reader.capture_info();
    if let Some(started) = &info.capture_started {
        println!(
            "process: {} ({}) {}",
            started.process_name, started.process_id, started.executable_path
        );
        println!("capture start: {} ns", started.capture_start_timestamp_ns);
        println!("selected functions: {}", started.selected_functions.len());
    }
    println!("strings: {}", info.key_and_strings.len());
    println!("address infos: {}", info.address_infos.len());
    println!("thread names: {}", info.thread_names.len());
    println!("unique callstacks: {}", info.callstacks.len());
    println!("tracepoint infos: {}", info.tracepoint_infos.len());

    let mut printed = 0;
    let mut timers = 0u64;
    let mut callstack_events = info.callstack_events.len() as u64;
    let mut thread_state_slices = info.thread_state_slices.len() as u64;
    let mut tracepoint_events = info.tracepoint_events.len() as u64;
    let mut errors = info.errors.clone();
    while let Some(record) = reader.next_record()? {
        match record {
            Record::Timer(timer) => {
                if printed < cli.timers {
                    let timer_type = TimerType::try_from(timer.timer_type)
                        .map(|t| format!("{:?}", t))
                        .unwrap_or_else(|_| format!("unknown({})", timer.timer_type));
                    println!(
                        "{:>20} {:>20} pid {:>7} tid {:>7} depth {:>3} {}",
                        timer.start,
                        timer.end,
                        timer.process_id,
                        timer.thread_id,
                        timer.depth,
                        timer_type
                    );
                    printed += 1;
                }
                timers += 1;
            }
            Record::CallstackEvent(_) => callstack_events += 1,
            Record::ThreadStateSlice(_) => thread_state_slices += 1,
            Record::TracepointEvent(_) => tracepoint_events += 1,
            Record::ErrorEvent(error) => errors.push(error),
        }
    }
    println!("timers: {}", timers);
    println!("callstack events: {}", callstack_events);
    println!("thread state slices: {}", thread_state_slices);
    println!("tracepoint events: {}", tracepoint_events);
    println!("errors: {}", errors.len());
    for error in &errors {
        println!("  [{}] {}", error.producer_id, error.message);
    }
    Ok(())
}

//! On-disk capture format.
//!
//! A capture file is a sequence of length-prefixed protobuf messages: one
//! [`CaptureHeader`], one [`CaptureInfo`] and then one [`CaptureRecord`] per
//! timer, callstack sample, thread state slice, tracepoint event or error until
//! end of file. Every frame stays small however long the capture ran.
//!
//! [`CaptureFileWriter`] is a [`CaptureListener`]: it keeps the process details
//! and interned tables in memory, spools the records to `<output>.timers.tmp`
//! while the capture runs and assembles the final file in
//! [`CaptureFileWriter::finish`].
//! [`CaptureFileRecorder`] puts a client side processor in front of it so it can
//! consume the canonical event stream as a [`CaptureEventSink`].

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};

use crate::capture_event_processor::CaptureEventProcessor;
use crate::capture_listener::CaptureListener;
use crate::error::CaptureLoadError;
use crate::event_buffer::CaptureEventSink;
use crate::framing::{read_message, write_message};
use crate::protos::capture::{ClientCaptureEvent, ErrorEvent, TracepointInfo};
use crate::protos::capture_data::capture_record::Record;
use crate::protos::capture_data::{
    CallstackEvent, CallstackInfo, CaptureHeader, CaptureInfo, CaptureRecord, CaptureStartedInfo,
    KeyAndString, LinuxAddressInfo, ThreadNameInfo, ThreadStateSliceInfo, TimerInfo, TimerType,
    TracepointEventInfo, UniqueCallstack, UniqueTracepointInfo,
};

/// The only version this crate reads and writes.
pub const REQUIRED_CAPTURE_VERSION: &str = "1.59";

fn spool_path_for(path: &Path) -> PathBuf {
    let mut spool = path.as_os_str().to_owned();
    spool.push(".timers.tmp");
    PathBuf::from(spool)
}

pub struct CaptureFileWriter {
    path: PathBuf,
    spool_path: PathBuf,
    spool: Option<BufWriter<File>>,
    capture_info: CaptureInfo,
    timer_count: u64,
    // First failure; later callbacks are no-ops for the spool.
    error: Option<io::Error>,
    finished: bool,
}

impl CaptureFileWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let spool_path = spool_path_for(path);
        let spool = File::create(&spool_path)
            .with_context(|| format!("Failed to create {}", spool_path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            spool_path,
            spool: Some(BufWriter::new(spool)),
            capture_info: CaptureInfo::default(),
            timer_count: 0,
            error: None,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timer_count(&self) -> u64 {
        self.timer_count
    }

    /// Returns the first write failure, if any, once.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    fn spool_record(&mut self, record: Record) -> bool {
        if self.error.is_some() {
            return false;
        }
        let Some(spool) = self.spool.as_mut() else {
            return false;
        };
        match write_message(spool, &CaptureRecord::from(record)) {
            Ok(()) => true,
            Err(e) => {
                self.error = Some(io::Error::other(e));
                false
            }
        }
    }

    fn spool_timer(&mut self, timer: TimerInfo) {
        if self.spool_record(Record::Timer(timer)) {
            self.timer_count += 1;
        }
    }

    /// Writes header, capture info and the spooled timers to the output file.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if let Some(e) = self.error.take() {
            let _ = fs::remove_file(&self.spool_path);
            return Err(anyhow!(e).context(format!(
                "Failed to spool records for {}",
                self.path.display()
            )));
        }
        let spool = self
            .spool
            .take()
            .context("Capture file writer has no spool")?;
        spool
            .into_inner()
            .map_err(|e| e.into_error())
            .context("Failed to flush timer spool")?;

        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        write_message(
            &mut writer,
            &CaptureHeader {
                version: REQUIRED_CAPTURE_VERSION.to_string(),
            },
        )?;
        write_message(&mut writer, &self.capture_info)?;

        let mut spooled = File::open(&self.spool_path)
            .with_context(|| format!("Failed to reopen {}", self.spool_path.display()))?;
        io::copy(&mut spooled, &mut writer).context("Failed to copy spooled timers")?;

        let file = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .context("Failed to flush capture file")?;
        file.sync_all().context("Failed to sync capture file")?;
        fs::remove_file(&self.spool_path)
            .with_context(|| format!("Failed to remove {}", self.spool_path.display()))?;

        info!(
            "Wrote capture to {} ({} timers)",
            self.path.display(),
            self.timer_count
        );
        Ok(())
    }
}

impl Drop for CaptureFileWriter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = fs::remove_file(&self.spool_path);
        }
    }
}

impl CaptureListener for CaptureFileWriter {
    fn on_capture_started(&mut self, capture_started: CaptureStartedInfo) {
        self.capture_info.capture_started = Some(capture_started);
    }
    fn on_capture_complete(&mut self) {}
    fn on_scheduling_slice(&mut self, timer: TimerInfo) {
        self.spool_timer(timer);
    }
    fn on_callstack_event(&mut self, callstack_event: CallstackEvent) {
        self.spool_record(Record::CallstackEvent(callstack_event));
    }
    fn on_unique_callstack(&mut self, callstack_id: u64, callstack: CallstackInfo) {
        self.capture_info.callstacks.push(UniqueCallstack {
            callstack_id,
            callstack: Some(callstack),
        });
    }
    fn on_function_call(&mut self, timer: TimerInfo) {
        self.spool_timer(timer);
    }
    fn on_thread_name(&mut self, thread_name: ThreadNameInfo) {
        self.capture_info.thread_names.push(thread_name);
    }
    fn on_thread_state_slice(&mut self, slice: ThreadStateSliceInfo) {
        self.spool_record(Record::ThreadStateSlice(slice));
    }
    fn on_address_info(&mut self, address_info: LinuxAddressInfo) {
        self.capture_info.address_infos.push(address_info);
    }
    fn on_key_and_string(&mut self, key: u64, string: String) {
        self.capture_info
            .key_and_strings
            .push(KeyAndString { key, str: string });
    }
    fn on_unique_tracepoint_info(&mut self, key: u64, tracepoint_info: TracepointInfo) {
        self.capture_info.tracepoint_infos.push(UniqueTracepointInfo {
            key,
            info: Some(tracepoint_info),
        });
    }
    fn on_tracepoint_event(&mut self, tracepoint_event: TracepointEventInfo) {
        self.spool_record(Record::TracepointEvent(tracepoint_event));
    }
    fn on_gpu_job(&mut self, timer: TimerInfo) {
        self.spool_timer(timer);
    }
    fn on_gpu_queue_submission(&mut self, timer: TimerInfo) {
        self.spool_timer(timer);
    }
    fn on_api_scope(&mut self, timer: TimerInfo) {
        self.spool_timer(timer);
    }
    fn on_error_event(&mut self, error_event: ErrorEvent) {
        self.spool_record(Record::ErrorEvent(error_event));
    }
}

/// Event buffer consumer that persists the capture to a file.
pub struct CaptureFileRecorder {
    processor: CaptureEventProcessor<CaptureFileWriter>,
}

impl CaptureFileRecorder {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            processor: CaptureEventProcessor::new(CaptureFileWriter::create(path)?),
        })
    }
}

impl CaptureEventSink for CaptureFileRecorder {
    fn name(&self) -> &str {
        "capture file"
    }

    fn write_event(&mut self, event: &ClientCaptureEvent) -> Result<()> {
        self.processor.process_event(event.clone());
        match self.processor.listener_mut().take_error() {
            Some(e) => Err(anyhow!(e).context(format!(
                "Failed to write {}",
                self.processor.listener().path().display()
            ))),
            None => Ok(()),
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.processor.listener_mut().finish()
    }
}

/// How a load ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Completed,
    Cancelled,
}

/// Sequential reader over a capture file. The header is validated on open.
pub struct CaptureFileReader<R: Read> {
    reader: R,
    header: CaptureHeader,
    capture_info: CaptureInfo,
}

impl<R: Read> CaptureFileReader<R> {
    pub fn new(mut reader: R) -> Result<Self, CaptureLoadError> {
        let header: CaptureHeader =
            read_message(&mut reader)?.ok_or(CaptureLoadError::MissingHeader)?;
        if header.version.is_empty() {
            return Err(CaptureLoadError::MissingVersion);
        }
        if header.version != REQUIRED_CAPTURE_VERSION {
            return Err(CaptureLoadError::VersionMismatch {
                found: header.version,
                required: REQUIRED_CAPTURE_VERSION.to_string(),
            });
        }
        let capture_info: CaptureInfo =
            read_message(&mut reader)?.ok_or(CaptureLoadError::MissingCaptureInfo)?;
        Ok(Self {
            reader,
            header,
            capture_info,
        })
    }

    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }

    pub fn capture_info(&self) -> &CaptureInfo {
        &self.capture_info
    }

    /// Next record after the capture info, `None` at end of file.
    pub fn next_record(&mut self) -> Result<Option<Record>, CaptureLoadError> {
        while let Some(record) = read_message::<_, CaptureRecord>(&mut self.reader)? {
            match record.record {
                Some(record) => return Ok(Some(record)),
                None => warn!("Skipping empty capture record"),
            }
        }
        Ok(None)
    }

    /// Next timer, skipping the other records. `None` at end of file.
    pub fn next_timer(&mut self) -> Result<Option<TimerInfo>, CaptureLoadError> {
        while let Some(record) = self.next_record()? {
            if let Record::Timer(timer) = record {
                return Ok(Some(timer));
            }
        }
        Ok(None)
    }
}

impl CaptureFileReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, CaptureLoadError> {
        let file = File::open(path).map_err(|source| CaptureLoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(BufReader::new(file))
    }
}

/// Replays a capture into `listener`.
///
/// The capture info goes first: process start, address infos, thread names,
/// unique callstacks, callstack events and strings, then thread state slices,
/// tracepoint infos, tracepoint events and errors. The records follow in file
/// order.
///
/// `cancellation_requested` is polled between items; a cancelled load returns
/// `LoadOutcome::Cancelled` without calling `on_capture_complete`. Nothing is
/// delivered when the header is rejected.
pub fn load<R: Read>(
    reader: R,
    listener: &mut dyn CaptureListener,
    cancellation_requested: &AtomicBool,
) -> Result<LoadOutcome, CaptureLoadError> {
    let mut reader = CaptureFileReader::new(reader)?;
    let cancelled = || cancellation_requested.load(Ordering::Relaxed);

    let info = std::mem::take(&mut reader.capture_info);
    if let Some(capture_started) = info.capture_started {
        listener.on_capture_started(capture_started);
    }

    macro_rules! deliver {
        ($items:expr, $item:pat => $call:expr) => {
            for $item in $items {
                if cancelled() {
                    return Ok(LoadOutcome::Cancelled);
                }
                $call;
            }
        };
    }

    deliver!(info.address_infos, address_info => listener.on_address_info(address_info));
    deliver!(info.thread_names, thread_name => listener.on_thread_name(thread_name));
    deliver!(info.callstacks, unique => listener.on_unique_callstack(
        unique.callstack_id,
        unique.callstack.unwrap_or_default()
    ));
    deliver!(info.callstack_events, event => listener.on_callstack_event(event));
    deliver!(info.key_and_strings, entry => listener.on_key_and_string(entry.key, entry.str));
    deliver!(info.thread_state_slices, slice => listener.on_thread_state_slice(slice));
    deliver!(info.tracepoint_infos, unique => listener.on_unique_tracepoint_info(
        unique.key,
        unique.info.unwrap_or_default()
    ));
    deliver!(info.tracepoint_events, event => listener.on_tracepoint_event(event));
    deliver!(info.errors, error_event => listener.on_error_event(error_event));

    let mut records = 0u64;
    let mut timers = 0u64;
    while let Some(record) = reader.next_record()? {
        if cancelled() {
            return Ok(LoadOutcome::Cancelled);
        }
        match record {
            Record::Timer(timer) => {
                deliver_timer(listener, timer)?;
                timers += 1;
            }
            Record::CallstackEvent(event) => listener.on_callstack_event(event),
            Record::ThreadStateSlice(slice) => listener.on_thread_state_slice(slice),
            Record::TracepointEvent(event) => listener.on_tracepoint_event(event),
            Record::ErrorEvent(error_event) => listener.on_error_event(error_event),
        }
        records += 1;
    }
    debug!("Loaded {} records, {} of them timers", records, timers);

    listener.on_capture_complete();
    Ok(LoadOutcome::Completed)
}

fn deliver_timer(
    listener: &mut dyn CaptureListener,
    timer: TimerInfo,
) -> Result<(), CaptureLoadError> {
    match TimerType::try_from(timer.timer_type) {
        Ok(TimerType::FunctionCall) => listener.on_function_call(timer),
        Ok(TimerType::CoreActivity) => listener.on_scheduling_slice(timer),
        Ok(TimerType::GpuActivity) => listener.on_gpu_job(timer),
        Ok(TimerType::GpuCommandBuffer) | Ok(TimerType::GpuDebugMarker) => {
            listener.on_gpu_queue_submission(timer)
        }
        Ok(TimerType::ApiScope) | Ok(TimerType::ApiScopeAsync) => listener.on_api_scope(timer),
        Err(_) => return Err(CaptureLoadError::UnknownTimerType(timer.timer_type)),
    }
    Ok(())
}

pub fn load_from_path(
    path: &Path,
    listener: &mut dyn CaptureListener,
    cancellation_requested: &AtomicBool,
) -> Result<LoadOutcome, CaptureLoadError> {
    let file = File::open(path).map_err(|source| CaptureLoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let outcome = load(BufReader::new(file), listener, cancellation_requested)?;
    if outcome == LoadOutcome::Cancelled {
        warn!("Loading {} was cancelled", path.display());
    }
    Ok(outcome)
}

/// Writes a capture file with the given header version and no content. Used to
/// produce files an older or newer release would have written.
pub fn write_empty_capture<W: Write>(writer: &mut W, version: &str) -> Result<()> {
    write_message(
        writer,
        &CaptureHeader {
            version: version.to_string(),
        },
    )?;
    write_message(writer, &CaptureInfo::default())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture_listener::{RecordedCall, RecordingCaptureListener};
    use std::io::Cursor;

    fn timer(timer_type: TimerType, start: u64) -> TimerInfo {
        TimerInfo {
            start,
            end: start + 10,
            process_id: 1,
            thread_id: 2,
            timer_type: timer_type as i32,
            ..Default::default()
        }
    }

    #[test]
    fn test_writer_assembles_file_and_removes_spool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.orbit");

        let mut writer = CaptureFileWriter::create(&path).unwrap();
        assert!(spool_path_for(&path).exists());
        writer.on_key_and_string(5, "gfx".to_string());
        writer.on_function_call(timer(TimerType::FunctionCall, 100));
        writer.on_gpu_job(timer(TimerType::GpuActivity, 200));
        writer.finish().unwrap();
        assert_eq!(writer.timer_count(), 2);
        assert!(!spool_path_for(&path).exists());

        let mut reader = CaptureFileReader::open(&path).unwrap();
        assert_eq!(reader.header().version, REQUIRED_CAPTURE_VERSION);
        assert_eq!(reader.capture_info().key_and_strings.len(), 1);
        assert_eq!(reader.next_timer().unwrap().unwrap().start, 100);
        assert_eq!(reader.next_timer().unwrap().unwrap().start, 200);
        assert!(reader.next_timer().unwrap().is_none());
    }

    #[test]
    fn test_per_event_records_stay_out_of_capture_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.orbit");

        let mut writer = CaptureFileWriter::create(&path).unwrap();
        writer.on_unique_callstack(
            9,
            CallstackInfo {
                frames: vec![0x10, 0x20],
                callstack_type: 0,
            },
        );
        for time in 0..100 {
            writer.on_callstack_event(CallstackEvent {
                time,
                callstack_id: 9,
                thread_id: 2,
                process_id: 1,
            });
        }
        writer.on_thread_state_slice(ThreadStateSliceInfo {
            thread_id: 2,
            ..Default::default()
        });
        writer.on_error_event(ErrorEvent {
            timestamp_ns: 5,
            producer_id: 1,
            message: "lost samples".to_string(),
        });
        writer.on_function_call(timer(TimerType::FunctionCall, 300));
        writer.finish().unwrap();
        assert_eq!(writer.timer_count(), 1);

        let mut reader = CaptureFileReader::open(&path).unwrap();
        let info = reader.capture_info();
        assert_eq!(info.callstacks.len(), 1);
        assert!(info.callstack_events.is_empty());
        assert!(info.thread_state_slices.is_empty());
        assert!(info.errors.is_empty());

        let mut callstack_events = 0;
        let mut others = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            match record {
                Record::CallstackEvent(_) => callstack_events += 1,
                other => others.push(other),
            }
        }
        assert_eq!(callstack_events, 100);
        assert_eq!(others.len(), 3);
        assert!(matches!(others[2], Record::Timer(ref t) if t.start == 300));
    }

    #[test]
    fn test_capture_info_replay_order() {
        let mut bytes = Vec::new();
        write_message(
            &mut bytes,
            &CaptureHeader {
                version: REQUIRED_CAPTURE_VERSION.to_string(),
            },
        )
        .unwrap();
        write_message(
            &mut bytes,
            &CaptureInfo {
                capture_started: Some(CaptureStartedInfo::default()),
                address_infos: vec![LinuxAddressInfo::default()],
                thread_names: vec![ThreadNameInfo::default()],
                thread_state_slices: vec![ThreadStateSliceInfo::default()],
                key_and_strings: vec![KeyAndString {
                    key: 1,
                    str: "main".to_string(),
                }],
                callstacks: vec![UniqueCallstack {
                    callstack_id: 1,
                    callstack: None,
                }],
                callstack_events: vec![CallstackEvent::default()],
                tracepoint_infos: vec![UniqueTracepointInfo { key: 1, info: None }],
                tracepoint_events: vec![TracepointEventInfo::default()],
                errors: vec![ErrorEvent::default()],
            },
        )
        .unwrap();

        let mut listener = RecordingCaptureListener::new();
        load(Cursor::new(bytes), &mut listener, &AtomicBool::new(false)).unwrap();
        let names: Vec<_> = listener.calls.iter().map(|call| call.name()).collect();
        assert_eq!(
            names,
            vec![
                "capture_started",
                "address_info",
                "thread_name",
                "unique_callstack",
                "callstack_event",
                "key_and_string",
                "thread_state_slice",
                "unique_tracepoint_info",
                "tracepoint_event",
                "error_event",
                "capture_complete",
            ]
        );
    }

    #[test]
    fn test_dropped_writer_removes_spool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.orbit");
        {
            let mut writer = CaptureFileWriter::create(&path).unwrap();
            writer.on_function_call(timer(TimerType::FunctionCall, 1));
        }
        assert!(!spool_path_for(&path).exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_timers_dispatched_by_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.orbit");
        let mut writer = CaptureFileWriter::create(&path).unwrap();
        for (i, timer_type) in [
            TimerType::FunctionCall,
            TimerType::CoreActivity,
            TimerType::GpuActivity,
            TimerType::GpuCommandBuffer,
            TimerType::GpuDebugMarker,
            TimerType::ApiScope,
            TimerType::ApiScopeAsync,
        ]
        .into_iter()
        .enumerate()
        {
            writer.spool_timer(timer(timer_type, i as u64));
        }
        writer.finish().unwrap();

        let mut listener = RecordingCaptureListener::new();
        let outcome = load_from_path(&path, &mut listener, &AtomicBool::new(false)).unwrap();
        assert_eq!(outcome, LoadOutcome::Completed);
        let counts = listener.counts();
        assert_eq!(counts.get("function_call"), Some(&1));
        assert_eq!(counts.get("scheduling_slice"), Some(&1));
        assert_eq!(counts.get("gpu_job"), Some(&1));
        assert_eq!(counts.get("gpu_queue_submission"), Some(&2));
        assert_eq!(counts.get("api_scope"), Some(&2));
        assert_eq!(listener.calls.last(), Some(&RecordedCall::CaptureComplete));
    }

    #[test]
    fn test_version_mismatch_rejected_without_callbacks() {
        let mut bytes = Vec::new();
        write_empty_capture(&mut bytes, "1.51").unwrap();

        let mut listener = RecordingCaptureListener::new();
        let err = load(Cursor::new(bytes), &mut listener, &AtomicBool::new(false)).unwrap_err();
        assert!(matches!(
            err,
            CaptureLoadError::VersionMismatch { ref found, .. } if found == "1.51"
        ));
        assert!(err.to_string().contains("1.51"));
        assert!(listener.calls.is_empty());
    }

    #[test]
    fn test_missing_version_and_empty_file() {
        let mut bytes = Vec::new();
        write_empty_capture(&mut bytes, "").unwrap();
        let mut listener = RecordingCaptureListener::new();
        assert!(matches!(
            load(Cursor::new(bytes), &mut listener, &AtomicBool::new(false)),
            Err(CaptureLoadError::MissingVersion)
        ));
        assert!(matches!(
            load(Cursor::new(Vec::new()), &mut listener, &AtomicBool::new(false)),
            Err(CaptureLoadError::MissingHeader)
        ));
        assert!(listener.calls.is_empty());
    }

    #[test]
    fn test_unknown_timer_type_is_an_error() {
        let mut bytes = Vec::new();
        write_empty_capture(&mut bytes, REQUIRED_CAPTURE_VERSION).unwrap();
        write_message(
            &mut bytes,
            &CaptureRecord::from(Record::Timer(TimerInfo {
                timer_type: 42,
                ..Default::default()
            })),
        )
        .unwrap();
        let mut listener = RecordingCaptureListener::new();
        assert!(matches!(
            load(Cursor::new(bytes), &mut listener, &AtomicBool::new(false)),
            Err(CaptureLoadError::UnknownTimerType(42))
        ));
    }

    #[test]
    fn test_cancelled_load_stops_early() {
        let mut bytes = Vec::new();
        write_message(
            &mut bytes,
            &CaptureHeader {
                version: REQUIRED_CAPTURE_VERSION.to_string(),
            },
        )
        .unwrap();
        write_message(
            &mut bytes,
            &CaptureInfo {
                key_and_strings: vec![KeyAndString {
                    key: 1,
                    str: "a".to_string(),
                }],
                ..Default::default()
            },
        )
        .unwrap();

        let mut listener = RecordingCaptureListener::new();
        let outcome = load(Cursor::new(bytes), &mut listener, &AtomicBool::new(true)).unwrap();
        assert_eq!(outcome, LoadOutcome::Cancelled);
        assert!(listener.calls_named("capture_complete").is_empty());
        assert!(listener.calls_named("key_and_string").is_empty());
    }
}

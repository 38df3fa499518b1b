//! Messages persisted in capture files and handed to capture listeners.

use super::capture::{CallstackType, Color, ErrorEvent, ThreadState, TracepointInfo};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CaptureHeader {
    #[prost(string, tag = "1")]
    pub version: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FunctionInfo {
    #[prost(uint64, tag = "1")]
    pub function_id: u64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub module_path: String,
    #[prost(uint64, tag = "4")]
    pub file_offset: u64,
}

/// Process level details of a capture, delivered through `on_capture_started`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CaptureStartedInfo {
    #[prost(int32, tag = "1")]
    pub process_id: i32,
    #[prost(string, tag = "2")]
    pub process_name: String,
    #[prost(string, tag = "3")]
    pub executable_path: String,
    #[prost(uint64, tag = "4")]
    pub capture_start_timestamp_ns: u64,
    #[prost(message, repeated, tag = "5")]
    pub selected_functions: Vec<FunctionInfo>,
}

/// Address info with its strings resolved.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LinuxAddressInfo {
    #[prost(uint64, tag = "1")]
    pub absolute_address: u64,
    #[prost(uint64, tag = "2")]
    pub offset_in_function: u64,
    #[prost(string, tag = "3")]
    pub function_name: String,
    #[prost(string, tag = "4")]
    pub module_path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyAndString {
    #[prost(uint64, tag = "1")]
    pub key: u64,
    #[prost(string, tag = "2")]
    pub str: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallstackInfo {
    #[prost(uint64, repeated, tag = "1")]
    pub frames: Vec<u64>,
    #[prost(enumeration = "CallstackType", tag = "2")]
    pub callstack_type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UniqueCallstack {
    #[prost(uint64, tag = "1")]
    pub callstack_id: u64,
    #[prost(message, optional, tag = "2")]
    pub callstack: Option<CallstackInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallstackEvent {
    #[prost(uint64, tag = "1")]
    pub time: u64,
    #[prost(uint64, tag = "2")]
    pub callstack_id: u64,
    #[prost(int32, tag = "3")]
    pub thread_id: i32,
    #[prost(int32, tag = "4")]
    pub process_id: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThreadNameInfo {
    #[prost(int32, tag = "1")]
    pub process_id: i32,
    #[prost(int32, tag = "2")]
    pub thread_id: i32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(uint64, tag = "4")]
    pub timestamp_ns: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThreadStateSliceInfo {
    #[prost(int32, tag = "1")]
    pub thread_id: i32,
    #[prost(enumeration = "ThreadState", tag = "2")]
    pub thread_state: i32,
    #[prost(uint64, tag = "3")]
    pub begin_timestamp_ns: u64,
    #[prost(uint64, tag = "4")]
    pub end_timestamp_ns: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UniqueTracepointInfo {
    #[prost(uint64, tag = "1")]
    pub key: u64,
    #[prost(message, optional, tag = "2")]
    pub info: Option<TracepointInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TracepointEventInfo {
    #[prost(int32, tag = "1")]
    pub pid: i32,
    #[prost(int32, tag = "2")]
    pub tid: i32,
    #[prost(int32, tag = "3")]
    pub cpu: i32,
    #[prost(uint64, tag = "4")]
    pub time: u64,
    #[prost(uint64, tag = "5")]
    pub tracepoint_info_key: u64,
    #[prost(bool, tag = "6")]
    pub is_same_pid_as_target: bool,
}

/// Process details and interned tables. Written once, after the header.
///
/// The per-event lists only hold what was known when the capture started;
/// events recorded during the capture follow as [`CaptureRecord`]s.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CaptureInfo {
    #[prost(message, optional, tag = "1")]
    pub capture_started: Option<CaptureStartedInfo>,
    #[prost(message, repeated, tag = "2")]
    pub address_infos: Vec<LinuxAddressInfo>,
    #[prost(message, repeated, tag = "3")]
    pub thread_names: Vec<ThreadNameInfo>,
    #[prost(message, repeated, tag = "4")]
    pub thread_state_slices: Vec<ThreadStateSliceInfo>,
    #[prost(message, repeated, tag = "5")]
    pub key_and_strings: Vec<KeyAndString>,
    #[prost(message, repeated, tag = "6")]
    pub callstacks: Vec<UniqueCallstack>,
    #[prost(message, repeated, tag = "7")]
    pub callstack_events: Vec<CallstackEvent>,
    #[prost(message, repeated, tag = "8")]
    pub tracepoint_infos: Vec<UniqueTracepointInfo>,
    #[prost(message, repeated, tag = "9")]
    pub tracepoint_events: Vec<TracepointEventInfo>,
    #[prost(message, repeated, tag = "10")]
    pub errors: Vec<ErrorEvent>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TimerType {
    FunctionCall = 0,
    CoreActivity = 1,
    GpuActivity = 2,
    GpuCommandBuffer = 3,
    GpuDebugMarker = 4,
    ApiScope = 5,
    ApiScopeAsync = 6,
}

/// Thread id used for timers that are not tied to one thread.
pub const UNKNOWN_THREAD_ID: i32 = -1;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TimerInfo {
    #[prost(uint64, tag = "1")]
    pub start: u64,
    #[prost(uint64, tag = "2")]
    pub end: u64,
    #[prost(int32, tag = "3")]
    pub process_id: i32,
    #[prost(int32, tag = "4")]
    pub thread_id: i32,
    #[prost(uint32, tag = "5")]
    pub depth: u32,
    /// Cpu for scheduling slices, -1 otherwise.
    #[prost(int32, tag = "6")]
    pub processor: i32,
    #[prost(enumeration = "TimerType", tag = "7")]
    pub timer_type: i32,
    #[prost(uint64, tag = "8")]
    pub function_id: u64,
    /// String key of the label (GPU timers, API scopes).
    #[prost(uint64, tag = "9")]
    pub user_data_key: u64,
    /// String key of the GPU timeline.
    #[prost(uint64, tag = "10")]
    pub timeline_hash: u64,
    #[prost(uint64, tag = "11")]
    pub return_value: u64,
    #[prost(uint64, repeated, tag = "12")]
    pub registers: Vec<u64>,
    #[prost(message, optional, tag = "13")]
    pub color: Option<Color>,
    #[prost(uint64, tag = "14")]
    pub group_id: u64,
}

/// One entry of the stream that follows [`CaptureInfo`] until end of file.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CaptureRecord {
    #[prost(oneof = "capture_record::Record", tags = "1, 2, 3, 4, 5")]
    pub record: Option<capture_record::Record>,
}

pub mod capture_record {
    use super::*;

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Record {
        #[prost(message, tag = "1")]
        Timer(TimerInfo),
        #[prost(message, tag = "2")]
        CallstackEvent(CallstackEvent),
        #[prost(message, tag = "3")]
        ThreadStateSlice(ThreadStateSliceInfo),
        #[prost(message, tag = "4")]
        TracepointEvent(TracepointEventInfo),
        #[prost(message, tag = "5")]
        ErrorEvent(ErrorEvent),
    }
}

impl From<capture_record::Record> for CaptureRecord {
    fn from(record: capture_record::Record) -> Self {
        CaptureRecord {
            record: Some(record),
        }
    }
}

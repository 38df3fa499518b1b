//! Wire messages exchanged between producers, the capture service and capture clients.
//!
//! Producers send [`ProducerCaptureEvent`]s whose interned keys are local to the
//! producer. The service rewrites them into [`ClientCaptureEvent`]s whose keys are
//! unique for the whole capture.

/// Producer id of the capture service itself (capture started/finished events).
pub const ROOT_PRODUCER_ID: u64 = 0;
/// Producer id of the internal kernel-side tracer.
pub const LINUX_TRACING_PRODUCER_ID: u64 = 1;
/// Producer id of the Orbit API / introspection producer.
pub const ORBIT_API_PRODUCER_ID: u64 = 2;
/// External producers connecting to the producer-side service are numbered from here.
pub const EXTERNAL_PRODUCER_STARTING_ID: u64 = 100;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstrumentedFunction {
    #[prost(uint64, tag = "1")]
    pub function_id: u64,
    #[prost(string, tag = "2")]
    pub file_path: String,
    #[prost(uint64, tag = "3")]
    pub file_offset: u64,
    #[prost(string, tag = "4")]
    pub function_name: String,
}

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct TracepointInfo {
    #[prost(string, tag = "1")]
    pub category: String,
    #[prost(string, tag = "2")]
    pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CaptureOptions {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(double, tag = "2")]
    pub samples_per_second: f64,
    #[prost(message, repeated, tag = "3")]
    pub instrumented_functions: Vec<InstrumentedFunction>,
    #[prost(bool, tag = "4")]
    pub trace_thread_state: bool,
    #[prost(bool, tag = "5")]
    pub trace_gpu_driver: bool,
    #[prost(bool, tag = "6")]
    pub enable_api: bool,
    #[prost(message, repeated, tag = "7")]
    pub selected_tracepoints: Vec<TracepointInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SchedulingSlice {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(uint32, tag = "3")]
    pub core: u32,
    #[prost(uint64, tag = "4")]
    pub in_timestamp_ns: u64,
    #[prost(uint64, tag = "5")]
    pub out_timestamp_ns: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FunctionCall {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(uint64, tag = "3")]
    pub function_id: u64,
    #[prost(uint64, tag = "4")]
    pub begin_timestamp_ns: u64,
    #[prost(uint64, tag = "5")]
    pub end_timestamp_ns: u64,
    #[prost(int32, tag = "6")]
    pub depth: i32,
    #[prost(uint64, tag = "7")]
    pub return_value: u64,
    /// Integer argument registers at function entry.
    #[prost(uint64, repeated, tag = "8")]
    pub registers: Vec<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum CallstackType {
    Complete = 0,
    DwarfUnwindingError = 1,
    FramePointerUnwindingError = 2,
    InUprobes = 3,
    CallstackPatchingFailed = 4,
}

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Callstack {
    /// Absolute virtual addresses, innermost frame first.
    #[prost(uint64, repeated, tag = "1")]
    pub pcs: Vec<u64>,
    #[prost(enumeration = "CallstackType", tag = "2")]
    pub callstack_type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternedCallstack {
    #[prost(uint64, tag = "1")]
    pub key: u64,
    #[prost(message, optional, tag = "2")]
    pub intern: Option<Callstack>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallstackSample {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(uint64, tag = "3")]
    pub callstack_id: u64,
    #[prost(uint64, tag = "4")]
    pub timestamp_ns: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FullCallstackSample {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(message, optional, tag = "3")]
    pub callstack: Option<Callstack>,
    #[prost(uint64, tag = "4")]
    pub timestamp_ns: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternedString {
    #[prost(uint64, tag = "1")]
    pub key: u64,
    #[prost(string, tag = "2")]
    pub intern: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternedTracepointInfo {
    #[prost(uint64, tag = "1")]
    pub key: u64,
    #[prost(message, optional, tag = "2")]
    pub intern: Option<TracepointInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TracepointEvent {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(uint32, tag = "3")]
    pub cpu: u32,
    #[prost(uint64, tag = "4")]
    pub timestamp_ns: u64,
    #[prost(uint64, tag = "5")]
    pub tracepoint_info_key: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FullTracepointEvent {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(uint32, tag = "3")]
    pub cpu: u32,
    #[prost(uint64, tag = "4")]
    pub timestamp_ns: u64,
    #[prost(message, optional, tag = "5")]
    pub tracepoint_info: Option<TracepointInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThreadName {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(uint64, tag = "4")]
    pub timestamp_ns: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ThreadState {
    Running = 0,
    Runnable = 1,
    InterruptibleSleep = 2,
    UninterruptibleSleep = 3,
    Stopped = 4,
    Traced = 5,
    Dead = 6,
    Zombie = 7,
    Parked = 8,
    Idle = 9,
}

impl ThreadState {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Runnable => "Runnable",
            Self::InterruptibleSleep => "Interruptible sleep",
            Self::UninterruptibleSleep => "Uninterruptible sleep",
            Self::Stopped => "Stopped",
            Self::Traced => "Traced",
            Self::Dead => "Dead",
            Self::Zombie => "Zombie",
            Self::Parked => "Parked",
            Self::Idle => "Idle",
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThreadStateSlice {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(enumeration = "ThreadState", tag = "3")]
    pub thread_state: i32,
    #[prost(uint64, tag = "4")]
    pub begin_timestamp_ns: u64,
    #[prost(uint64, tag = "5")]
    pub end_timestamp_ns: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddressInfo {
    #[prost(uint64, tag = "1")]
    pub absolute_address: u64,
    #[prost(uint64, tag = "2")]
    pub function_name_key: u64,
    #[prost(uint64, tag = "3")]
    pub offset_in_function: u64,
    #[prost(uint64, tag = "4")]
    pub module_path_key: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FullAddressInfo {
    #[prost(uint64, tag = "1")]
    pub absolute_address: u64,
    #[prost(string, tag = "2")]
    pub function_name: String,
    #[prost(uint64, tag = "3")]
    pub offset_in_function: u64,
    #[prost(string, tag = "4")]
    pub module_path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GpuJob {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(uint32, tag = "3")]
    pub context: u32,
    #[prost(uint32, tag = "4")]
    pub seqno: u32,
    #[prost(uint64, tag = "5")]
    pub timeline_key: u64,
    #[prost(int32, tag = "6")]
    pub depth: i32,
    #[prost(uint64, tag = "7")]
    pub amdgpu_cs_ioctl_time_ns: u64,
    #[prost(uint64, tag = "8")]
    pub amdgpu_sched_run_job_time_ns: u64,
    #[prost(uint64, tag = "9")]
    pub gpu_hardware_start_time_ns: u64,
    #[prost(uint64, tag = "10")]
    pub dma_fence_signaled_time_ns: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FullGpuJob {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(uint32, tag = "3")]
    pub context: u32,
    #[prost(uint32, tag = "4")]
    pub seqno: u32,
    #[prost(string, tag = "5")]
    pub timeline: String,
    #[prost(int32, tag = "6")]
    pub depth: i32,
    #[prost(uint64, tag = "7")]
    pub amdgpu_cs_ioctl_time_ns: u64,
    #[prost(uint64, tag = "8")]
    pub amdgpu_sched_run_job_time_ns: u64,
    #[prost(uint64, tag = "9")]
    pub gpu_hardware_start_time_ns: u64,
    #[prost(uint64, tag = "10")]
    pub dma_fence_signaled_time_ns: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GpuQueueSubmissionMetaInfo {
    #[prost(uint32, tag = "1")]
    pub tid: u32,
    #[prost(uint32, tag = "2")]
    pub pid: u32,
    #[prost(uint64, tag = "3")]
    pub pre_submission_cpu_timestamp: u64,
    #[prost(uint64, tag = "4")]
    pub post_submission_cpu_timestamp: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GpuCommandBuffer {
    #[prost(uint64, tag = "1")]
    pub begin_gpu_timestamp_ns: u64,
    #[prost(uint64, tag = "2")]
    pub end_gpu_timestamp_ns: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GpuSubmitInfo {
    #[prost(message, repeated, tag = "1")]
    pub command_buffers: Vec<GpuCommandBuffer>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Color {
    #[prost(float, tag = "1")]
    pub red: f32,
    #[prost(float, tag = "2")]
    pub green: f32,
    #[prost(float, tag = "3")]
    pub blue: f32,
    #[prost(float, tag = "4")]
    pub alpha: f32,
}

/// Where and when the begin of a debug marker was recorded.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GpuDebugMarkerBeginInfo {
    #[prost(message, optional, tag = "1")]
    pub meta_info: Option<GpuQueueSubmissionMetaInfo>,
    #[prost(uint64, tag = "2")]
    pub gpu_timestamp_ns: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GpuDebugMarker {
    #[prost(uint64, tag = "1")]
    pub text_key: u64,
    #[prost(message, optional, tag = "2")]
    pub color: Option<Color>,
    #[prost(int32, tag = "3")]
    pub depth: i32,
    #[prost(uint64, tag = "4")]
    pub end_gpu_timestamp_ns: u64,
    /// Unset when the begin was recorded before the capture started.
    #[prost(message, optional, tag = "5")]
    pub begin_marker: Option<GpuDebugMarkerBeginInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GpuQueueSubmission {
    #[prost(message, optional, tag = "1")]
    pub meta_info: Option<GpuQueueSubmissionMetaInfo>,
    #[prost(message, repeated, tag = "2")]
    pub submit_infos: Vec<GpuSubmitInfo>,
    #[prost(message, repeated, tag = "3")]
    pub completed_markers: Vec<GpuDebugMarker>,
    /// Markers begun in this submission whose end is still outstanding.
    #[prost(uint32, tag = "4")]
    pub num_begin_markers: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApiScope {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(uint64, tag = "3")]
    pub name_key: u64,
    #[prost(uint64, tag = "4")]
    pub begin_timestamp_ns: u64,
    #[prost(uint64, tag = "5")]
    pub end_timestamp_ns: u64,
    #[prost(int32, tag = "6")]
    pub depth: i32,
    #[prost(uint64, tag = "7")]
    pub group_id: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApiScopeAsync {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(uint64, tag = "3")]
    pub name_key: u64,
    #[prost(uint64, tag = "4")]
    pub begin_timestamp_ns: u64,
    #[prost(uint64, tag = "5")]
    pub end_timestamp_ns: u64,
    #[prost(int32, tag = "6")]
    pub depth: i32,
    #[prost(uint64, tag = "7")]
    pub group_id: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CaptureStarted {
    #[prost(uint32, tag = "1")]
    pub process_id: u32,
    #[prost(string, tag = "2")]
    pub executable_path: String,
    #[prost(uint64, tag = "3")]
    pub capture_start_timestamp_ns: u64,
    #[prost(uint64, tag = "4")]
    pub capture_start_unix_time_ns: u64,
    #[prost(message, optional, tag = "5")]
    pub capture_options: Option<CaptureOptions>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum CaptureFinishedStatus {
    Successful = 0,
    Failed = 1,
    Incomplete = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CaptureFinished {
    #[prost(enumeration = "CaptureFinishedStatus", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorEvent {
    #[prost(uint64, tag = "1")]
    pub timestamp_ns: u64,
    #[prost(uint64, tag = "2")]
    pub producer_id: u64,
    #[prost(string, tag = "3")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProducerCaptureEvent {
    #[prost(
        oneof = "producer_capture_event::Event",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20"
    )]
    pub event: Option<producer_capture_event::Event>,
}

pub mod producer_capture_event {
    use super::*;

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Event {
        #[prost(message, tag = "1")]
        SchedulingSlice(SchedulingSlice),
        #[prost(message, tag = "2")]
        FunctionCall(FunctionCall),
        #[prost(message, tag = "3")]
        InternedCallstack(InternedCallstack),
        #[prost(message, tag = "4")]
        CallstackSample(CallstackSample),
        #[prost(message, tag = "5")]
        FullCallstackSample(FullCallstackSample),
        #[prost(message, tag = "6")]
        InternedString(InternedString),
        #[prost(message, tag = "7")]
        InternedTracepointInfo(InternedTracepointInfo),
        #[prost(message, tag = "8")]
        TracepointEvent(TracepointEvent),
        #[prost(message, tag = "9")]
        FullTracepointEvent(FullTracepointEvent),
        #[prost(message, tag = "10")]
        ThreadName(ThreadName),
        #[prost(message, tag = "11")]
        ThreadStateSlice(ThreadStateSlice),
        #[prost(message, tag = "12")]
        AddressInfo(AddressInfo),
        #[prost(message, tag = "13")]
        FullAddressInfo(FullAddressInfo),
        #[prost(message, tag = "14")]
        GpuJob(GpuJob),
        #[prost(message, tag = "15")]
        FullGpuJob(FullGpuJob),
        #[prost(message, tag = "16")]
        GpuQueueSubmission(GpuQueueSubmission),
        #[prost(message, tag = "17")]
        ApiScope(ApiScope),
        #[prost(message, tag = "18")]
        ApiScopeAsync(ApiScopeAsync),
        #[prost(message, tag = "19")]
        CaptureStarted(CaptureStarted),
        #[prost(message, tag = "20")]
        CaptureFinished(CaptureFinished),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientCaptureEvent {
    #[prost(
        oneof = "client_capture_event::Event",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17"
    )]
    pub event: Option<client_capture_event::Event>,
}

pub mod client_capture_event {
    use super::*;

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Event {
        #[prost(message, tag = "1")]
        SchedulingSlice(SchedulingSlice),
        #[prost(message, tag = "2")]
        FunctionCall(FunctionCall),
        #[prost(message, tag = "3")]
        InternedCallstack(InternedCallstack),
        #[prost(message, tag = "4")]
        CallstackSample(CallstackSample),
        #[prost(message, tag = "5")]
        InternedString(InternedString),
        #[prost(message, tag = "6")]
        InternedTracepointInfo(InternedTracepointInfo),
        #[prost(message, tag = "7")]
        TracepointEvent(TracepointEvent),
        #[prost(message, tag = "8")]
        ThreadName(ThreadName),
        #[prost(message, tag = "9")]
        ThreadStateSlice(ThreadStateSlice),
        #[prost(message, tag = "10")]
        AddressInfo(AddressInfo),
        #[prost(message, tag = "11")]
        GpuJob(GpuJob),
        #[prost(message, tag = "12")]
        GpuQueueSubmission(GpuQueueSubmission),
        #[prost(message, tag = "13")]
        ApiScope(ApiScope),
        #[prost(message, tag = "14")]
        ApiScopeAsync(ApiScopeAsync),
        #[prost(message, tag = "15")]
        CaptureStarted(CaptureStarted),
        #[prost(message, tag = "16")]
        CaptureFinished(CaptureFinished),
        #[prost(message, tag = "17")]
        ErrorEvent(ErrorEvent),
    }
}

impl From<client_capture_event::Event> for ClientCaptureEvent {
    fn from(event: client_capture_event::Event) -> Self {
        ClientCaptureEvent { event: Some(event) }
    }
}

impl From<producer_capture_event::Event> for ProducerCaptureEvent {
    fn from(event: producer_capture_event::Event) -> Self {
        ProducerCaptureEvent { event: Some(event) }
    }
}

// ReceiveCommandsAndSendEvents: producer <-> producer-side service.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BufferedCaptureEvents {
    #[prost(message, repeated, tag = "1")]
    pub capture_events: Vec<ProducerCaptureEvent>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AllEventsSent {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReceiveCommandsAndSendEventsRequest {
    #[prost(oneof = "receive_commands_and_send_events_request::Event", tags = "1, 2")]
    pub event: Option<receive_commands_and_send_events_request::Event>,
}

pub mod receive_commands_and_send_events_request {
    use super::*;

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Event {
        #[prost(message, tag = "1")]
        BufferedCaptureEvents(BufferedCaptureEvents),
        #[prost(message, tag = "2")]
        AllEventsSent(AllEventsSent),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartCaptureCommand {
    #[prost(message, optional, tag = "1")]
    pub capture_options: Option<CaptureOptions>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StopCaptureCommand {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CaptureFinishedCommand {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReceiveCommandsAndSendEventsResponse {
    #[prost(oneof = "receive_commands_and_send_events_response::Command", tags = "1, 2, 3")]
    pub command: Option<receive_commands_and_send_events_response::Command>,
}

pub mod receive_commands_and_send_events_response {
    use super::*;

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Command {
        #[prost(message, tag = "1")]
        StartCaptureCommand(StartCaptureCommand),
        #[prost(message, tag = "2")]
        StopCaptureCommand(StopCaptureCommand),
        #[prost(message, tag = "3")]
        CaptureFinishedCommand(CaptureFinishedCommand),
    }
}

// CaptureService.Capture: client <-> capture service.

/// The first request starts the capture. Any later request, or the client
/// closing its sending half, stops it.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CaptureRequest {
    #[prost(message, optional, tag = "1")]
    pub capture_options: Option<CaptureOptions>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CaptureStatus {
    #[prost(bool, tag = "1")]
    pub ok: bool,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CaptureResponse {
    #[prost(message, repeated, tag = "1")]
    pub capture_events: Vec<ClientCaptureEvent>,
    /// Only set on the last response of the stream.
    #[prost(message, optional, tag = "2")]
    pub status: Option<CaptureStatus>,
}

// CaptureClientGgpService: unary ops helper.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateSelectedFunctionsRequest {
    #[prost(string, repeated, tag = "1")]
    pub functions: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OpsRequest {
    #[prost(oneof = "ops_request::Request", tags = "1, 2, 3, 4")]
    pub request: Option<ops_request::Request>,
}

pub mod ops_request {
    use super::*;

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        StartCapture(super::StartCaptureRequest),
        #[prost(message, tag = "2")]
        StopCapture(super::StopCaptureRequest),
        #[prost(message, tag = "3")]
        UpdateSelectedFunctions(UpdateSelectedFunctionsRequest),
        #[prost(message, tag = "4")]
        ShutdownService(super::ShutdownServiceRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartCaptureRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StopCaptureRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ShutdownServiceRequest {}

/// 1 on success, 0 on failure.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OpsReply {
    #[prost(int32, tag = "1")]
    pub capture_result: i32,
}

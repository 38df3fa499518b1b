//! Callbacks through which a capture is delivered, live or loaded from a file.

use std::collections::BTreeMap;

use crate::protos::capture::{ErrorEvent, TracepointInfo};
use crate::protos::capture_data::{
    CallstackEvent, CallstackInfo, CaptureStartedInfo, LinuxAddressInfo, ThreadNameInfo,
    ThreadStateSliceInfo, TimerInfo, TracepointEventInfo,
};

/// Consumer of a reconstructed capture.
///
/// Keys passed to `on_key_and_string`, `on_unique_callstack` and
/// `on_unique_tracepoint_info` are always announced before any callback that
/// refers to them.
pub trait CaptureListener {
    fn on_capture_started(&mut self, capture_started: CaptureStartedInfo);
    fn on_capture_complete(&mut self);
    fn on_scheduling_slice(&mut self, timer: TimerInfo);
    fn on_callstack_event(&mut self, callstack_event: CallstackEvent);
    fn on_unique_callstack(&mut self, callstack_id: u64, callstack: CallstackInfo);
    fn on_function_call(&mut self, timer: TimerInfo);
    fn on_thread_name(&mut self, thread_name: ThreadNameInfo);
    fn on_thread_state_slice(&mut self, slice: ThreadStateSliceInfo);
    fn on_address_info(&mut self, address_info: LinuxAddressInfo);
    fn on_key_and_string(&mut self, key: u64, string: String);
    fn on_unique_tracepoint_info(&mut self, key: u64, tracepoint_info: TracepointInfo);
    fn on_tracepoint_event(&mut self, tracepoint_event: TracepointEventInfo);
    fn on_gpu_job(&mut self, timer: TimerInfo);
    fn on_gpu_queue_submission(&mut self, timer: TimerInfo);
    fn on_api_scope(&mut self, timer: TimerInfo);
    fn on_error_event(&mut self, error_event: ErrorEvent);
}

impl<L: CaptureListener + ?Sized> CaptureListener for &mut L {
    fn on_capture_started(&mut self, capture_started: CaptureStartedInfo) {
        (**self).on_capture_started(capture_started)
    }
    fn on_capture_complete(&mut self) {
        (**self).on_capture_complete()
    }
    fn on_scheduling_slice(&mut self, timer: TimerInfo) {
        (**self).on_scheduling_slice(timer)
    }
    fn on_callstack_event(&mut self, callstack_event: CallstackEvent) {
        (**self).on_callstack_event(callstack_event)
    }
    fn on_unique_callstack(&mut self, callstack_id: u64, callstack: CallstackInfo) {
        (**self).on_unique_callstack(callstack_id, callstack)
    }
    fn on_function_call(&mut self, timer: TimerInfo) {
        (**self).on_function_call(timer)
    }
    fn on_thread_name(&mut self, thread_name: ThreadNameInfo) {
        (**self).on_thread_name(thread_name)
    }
    fn on_thread_state_slice(&mut self, slice: ThreadStateSliceInfo) {
        (**self).on_thread_state_slice(slice)
    }
    fn on_address_info(&mut self, address_info: LinuxAddressInfo) {
        (**self).on_address_info(address_info)
    }
    fn on_key_and_string(&mut self, key: u64, string: String) {
        (**self).on_key_and_string(key, string)
    }
    fn on_unique_tracepoint_info(&mut self, key: u64, tracepoint_info: TracepointInfo) {
        (**self).on_unique_tracepoint_info(key, tracepoint_info)
    }
    fn on_tracepoint_event(&mut self, tracepoint_event: TracepointEventInfo) {
        (**self).on_tracepoint_event(tracepoint_event)
    }
    fn on_gpu_job(&mut self, timer: TimerInfo) {
        (**self).on_gpu_job(timer)
    }
    fn on_gpu_queue_submission(&mut self, timer: TimerInfo) {
        (**self).on_gpu_queue_submission(timer)
    }
    fn on_api_scope(&mut self, timer: TimerInfo) {
        (**self).on_api_scope(timer)
    }
    fn on_error_event(&mut self, error_event: ErrorEvent) {
        (**self).on_error_event(error_event)
    }
}

/// One listener callback and its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    CaptureStarted(CaptureStartedInfo),
    CaptureComplete,
    SchedulingSlice(TimerInfo),
    CallstackEvent(CallstackEvent),
    UniqueCallstack(u64, CallstackInfo),
    FunctionCall(TimerInfo),
    ThreadName(ThreadNameInfo),
    ThreadStateSlice(ThreadStateSliceInfo),
    AddressInfo(LinuxAddressInfo),
    KeyAndString(u64, String),
    UniqueTracepointInfo(u64, TracepointInfo),
    TracepointEvent(TracepointEventInfo),
    GpuJob(TimerInfo),
    GpuQueueSubmission(TimerInfo),
    ApiScope(TimerInfo),
    ErrorEvent(ErrorEvent),
}

impl RecordedCall {
    pub fn name(&self) -> &'static str {
        match self {
            RecordedCall::CaptureStarted(_) => "capture_started",
            RecordedCall::CaptureComplete => "capture_complete",
            RecordedCall::SchedulingSlice(_) => "scheduling_slice",
            RecordedCall::CallstackEvent(_) => "callstack_event",
            RecordedCall::UniqueCallstack(..) => "unique_callstack",
            RecordedCall::FunctionCall(_) => "function_call",
            RecordedCall::ThreadName(_) => "thread_name",
            RecordedCall::ThreadStateSlice(_) => "thread_state_slice",
            RecordedCall::AddressInfo(_) => "address_info",
            RecordedCall::KeyAndString(..) => "key_and_string",
            RecordedCall::UniqueTracepointInfo(..) => "unique_tracepoint_info",
            RecordedCall::TracepointEvent(_) => "tracepoint_event",
            RecordedCall::GpuJob(_) => "gpu_job",
            RecordedCall::GpuQueueSubmission(_) => "gpu_queue_submission",
            RecordedCall::ApiScope(_) => "api_scope",
            RecordedCall::ErrorEvent(_) => "error_event",
        }
    }
}

/// Listener that remembers every callback in order.
#[derive(Debug, Default)]
pub struct RecordingCaptureListener {
    pub calls: Vec<RecordedCall>,
}

impl RecordingCaptureListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invocations per callback name.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for call in &self.calls {
            *counts.entry(call.name()).or_insert(0) += 1;
        }
        counts
    }

    pub fn calls_named(&self, name: &str) -> Vec<&RecordedCall> {
        self.calls.iter().filter(|call| call.name() == name).collect()
    }
}

impl CaptureListener for RecordingCaptureListener {
    fn on_capture_started(&mut self, capture_started: CaptureStartedInfo) {
        self.calls.push(RecordedCall::CaptureStarted(capture_started));
    }
    fn on_capture_complete(&mut self) {
        self.calls.push(RecordedCall::CaptureComplete);
    }
    fn on_scheduling_slice(&mut self, timer: TimerInfo) {
        self.calls.push(RecordedCall::SchedulingSlice(timer));
    }
    fn on_callstack_event(&mut self, callstack_event: CallstackEvent) {
        self.calls.push(RecordedCall::CallstackEvent(callstack_event));
    }
    fn on_unique_callstack(&mut self, callstack_id: u64, callstack: CallstackInfo) {
        self.calls
            .push(RecordedCall::UniqueCallstack(callstack_id, callstack));
    }
    fn on_function_call(&mut self, timer: TimerInfo) {
        self.calls.push(RecordedCall::FunctionCall(timer));
    }
    fn on_thread_name(&mut self, thread_name: ThreadNameInfo) {
        self.calls.push(RecordedCall::ThreadName(thread_name));
    }
    fn on_thread_state_slice(&mut self, slice: ThreadStateSliceInfo) {
        self.calls.push(RecordedCall::ThreadStateSlice(slice));
    }
    fn on_address_info(&mut self, address_info: LinuxAddressInfo) {
        self.calls.push(RecordedCall::AddressInfo(address_info));
    }
    fn on_key_and_string(&mut self, key: u64, string: String) {
        self.calls.push(RecordedCall::KeyAndString(key, string));
    }
    fn on_unique_tracepoint_info(&mut self, key: u64, tracepoint_info: TracepointInfo) {
        self.calls
            .push(RecordedCall::UniqueTracepointInfo(key, tracepoint_info));
    }
    fn on_tracepoint_event(&mut self, tracepoint_event: TracepointEventInfo) {
        self.calls.push(RecordedCall::TracepointEvent(tracepoint_event));
    }
    fn on_gpu_job(&mut self, timer: TimerInfo) {
        self.calls.push(RecordedCall::GpuJob(timer));
    }
    fn on_gpu_queue_submission(&mut self, timer: TimerInfo) {
        self.calls.push(RecordedCall::GpuQueueSubmission(timer));
    }
    fn on_api_scope(&mut self, timer: TimerInfo) {
        self.calls.push(RecordedCall::ApiScope(timer));
    }
    fn on_error_event(&mut self, error_event: ErrorEvent) {
        self.calls.push(RecordedCall::ErrorEvent(error_event));
    }
}

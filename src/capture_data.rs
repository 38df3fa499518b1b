//! In-memory model of a capture, filled through [`CaptureListener`].
//!
//! [`CallstackData`] and [`TracepointData`] are partitioned by thread and ordered
//! by time so a viewer can ask for the events of one thread in a time range.
//! Both lock internally; they are written by the thread delivering the capture
//! and read by whoever renders it.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::capture_listener::CaptureListener;
use crate::protos::capture::{ErrorEvent, TracepointInfo};
use crate::protos::capture_data::{
    CallstackEvent, CallstackInfo, CaptureStartedInfo, LinuxAddressInfo, ThreadNameInfo,
    ThreadStateSliceInfo, TimerInfo, TimerType, TracepointEventInfo,
};

/// Pseudo thread id under which tracepoint events of other processes are kept.
pub const NOT_TARGET_PROCESS_TID: i32 = -2;

type TimeOrdered<T> = BTreeMap<u64, Vec<T>>;

fn events_in_range<T: Clone>(events: &TimeOrdered<T>, min_time: u64, max_time: u64) -> Vec<T> {
    if min_time > max_time {
        return Vec::new();
    }
    events
        .range(min_time..=max_time)
        .flat_map(|(_, at_time)| at_time.iter().cloned())
        .collect()
}

#[derive(Default)]
pub struct CallstackData {
    unique_callstacks: RwLock<HashMap<u64, CallstackInfo>>,
    callstack_events_by_tid: RwLock<HashMap<i32, TimeOrdered<CallstackEvent>>>,
}

impl CallstackData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unique_callstack(&self, callstack_id: u64, callstack: CallstackInfo) {
        self.unique_callstacks
            .write()
            .expect("Failed to acquire unique callstacks lock")
            .insert(callstack_id, callstack);
    }

    pub fn get_unique_callstack(&self, callstack_id: u64) -> Option<CallstackInfo> {
        self.unique_callstacks
            .read()
            .expect("Failed to acquire unique callstacks lock")
            .get(&callstack_id)
            .cloned()
    }

    pub fn unique_callstack_count(&self) -> usize {
        self.unique_callstacks
            .read()
            .expect("Failed to acquire unique callstacks lock")
            .len()
    }

    pub fn add_callstack_event(&self, event: CallstackEvent) {
        self.callstack_events_by_tid
            .write()
            .expect("Failed to acquire callstack events lock")
            .entry(event.thread_id)
            .or_default()
            .entry(event.time)
            .or_default()
            .push(event);
    }

    pub fn callstack_event_count(&self) -> usize {
        self.callstack_events_by_tid
            .read()
            .expect("Failed to acquire callstack events lock")
            .values()
            .flat_map(|events| events.values())
            .map(Vec::len)
            .sum()
    }

    /// Events of `thread_id` with `min_time <= time <= max_time`, oldest first.
    pub fn get_callstack_events_of_tid_in_time_range(
        &self,
        thread_id: i32,
        min_time: u64,
        max_time: u64,
    ) -> Vec<CallstackEvent> {
        self.callstack_events_by_tid
            .read()
            .expect("Failed to acquire callstack events lock")
            .get(&thread_id)
            .map(|events| events_in_range(events, min_time, max_time))
            .unwrap_or_default()
    }

    /// Events of all threads in the range, oldest first.
    pub fn get_callstack_events_in_time_range(
        &self,
        min_time: u64,
        max_time: u64,
    ) -> Vec<CallstackEvent> {
        let by_tid = self
            .callstack_events_by_tid
            .read()
            .expect("Failed to acquire callstack events lock");
        let mut events: Vec<_> = by_tid
            .values()
            .flat_map(|events| events_in_range(events, min_time, max_time))
            .collect();
        events.sort_by_key(|event| (event.time, event.thread_id));
        events
    }

    /// Thread ids that have at least one sample.
    pub fn thread_ids(&self) -> Vec<i32> {
        let mut tids: Vec<_> = self
            .callstack_events_by_tid
            .read()
            .expect("Failed to acquire callstack events lock")
            .keys()
            .copied()
            .collect();
        tids.sort_unstable();
        tids
    }
}

#[derive(Default)]
pub struct TracepointData {
    unique_tracepoints: RwLock<HashMap<u64, TracepointInfo>>,
    events_by_tid: RwLock<HashMap<i32, TimeOrdered<TracepointEventInfo>>>,
}

impl TracepointData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `key` was already known.
    pub fn add_unique_tracepoint_info(&self, key: u64, info: TracepointInfo) -> bool {
        let mut unique = self
            .unique_tracepoints
            .write()
            .expect("Failed to acquire unique tracepoints lock");
        if unique.contains_key(&key) {
            return false;
        }
        unique.insert(key, info);
        true
    }

    pub fn get_tracepoint_info(&self, key: u64) -> Option<TracepointInfo> {
        self.unique_tracepoints
            .read()
            .expect("Failed to acquire unique tracepoints lock")
            .get(&key)
            .cloned()
    }

    /// Events of the target process are kept per thread, all others under
    /// [`NOT_TARGET_PROCESS_TID`].
    pub fn emplace_tracepoint_event(&self, event: TracepointEventInfo) {
        let tid = if event.is_same_pid_as_target {
            event.tid
        } else {
            NOT_TARGET_PROCESS_TID
        };
        self.events_by_tid
            .write()
            .expect("Failed to acquire tracepoint events lock")
            .entry(tid)
            .or_default()
            .entry(event.time)
            .or_default()
            .push(event);
    }

    pub fn get_tracepoint_events_of_tid_in_time_range(
        &self,
        thread_id: i32,
        min_time: u64,
        max_time: u64,
    ) -> Vec<TracepointEventInfo> {
        self.events_by_tid
            .read()
            .expect("Failed to acquire tracepoint events lock")
            .get(&thread_id)
            .map(|events| events_in_range(events, min_time, max_time))
            .unwrap_or_default()
    }

    pub fn num_tracepoint_events_for_thread(&self, thread_id: i32) -> usize {
        self.events_by_tid
            .read()
            .expect("Failed to acquire tracepoint events lock")
            .get(&thread_id)
            .map(|events| events.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn num_total_tracepoint_events(&self) -> usize {
        self.events_by_tid
            .read()
            .expect("Failed to acquire tracepoint events lock")
            .values()
            .flat_map(|events| events.values())
            .map(Vec::len)
            .sum()
    }
}

/// Lane a timer is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackKey {
    Thread { process_id: i32, thread_id: i32 },
    Core(i32),
    GpuTimeline(u64),
    /// Async API scopes have no thread; they are grouped by name.
    AsyncScope(u64),
}

impl TrackKey {
    pub fn for_timer(timer: &TimerInfo) -> Self {
        match TimerType::try_from(timer.timer_type) {
            Ok(TimerType::CoreActivity) => TrackKey::Core(timer.processor),
            Ok(
                TimerType::GpuActivity | TimerType::GpuCommandBuffer | TimerType::GpuDebugMarker,
            ) => TrackKey::GpuTimeline(timer.timeline_hash),
            Ok(TimerType::ApiScopeAsync) => TrackKey::AsyncScope(timer.user_data_key),
            Ok(TimerType::FunctionCall | TimerType::ApiScope) | Err(_) => TrackKey::Thread {
                process_id: timer.process_id,
                thread_id: timer.thread_id,
            },
        }
    }
}

/// Aggregate listener holding a whole capture.
#[derive(Default)]
pub struct CaptureData {
    capture_started: Option<CaptureStartedInfo>,
    strings: HashMap<u64, String>,
    address_infos: HashMap<u64, LinuxAddressInfo>,
    thread_names: HashMap<i32, String>,
    thread_state_slices: HashMap<i32, Vec<ThreadStateSliceInfo>>,
    callstack_data: CallstackData,
    tracepoint_data: TracepointData,
    timers_by_track: BTreeMap<TrackKey, Vec<TimerInfo>>,
    errors: Vec<ErrorEvent>,
    complete: bool,
}

impl CaptureData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture_started(&self) -> Option<&CaptureStartedInfo> {
        self.capture_started.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn string(&self, key: u64) -> Option<&str> {
        self.strings.get(&key).map(String::as_str)
    }

    pub fn address_info(&self, absolute_address: u64) -> Option<&LinuxAddressInfo> {
        self.address_infos.get(&absolute_address)
    }

    pub fn thread_name(&self, thread_id: i32) -> Option<&str> {
        self.thread_names.get(&thread_id).map(String::as_str)
    }

    pub fn thread_names(&self) -> &HashMap<i32, String> {
        &self.thread_names
    }

    pub fn thread_state_slices(&self, thread_id: i32) -> &[ThreadStateSliceInfo] {
        self.thread_state_slices
            .get(&thread_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn callstack_data(&self) -> &CallstackData {
        &self.callstack_data
    }

    pub fn tracepoint_data(&self) -> &TracepointData {
        &self.tracepoint_data
    }

    pub fn timers_by_track(&self) -> &BTreeMap<TrackKey, Vec<TimerInfo>> {
        &self.timers_by_track
    }

    pub fn timer_count(&self) -> usize {
        self.timers_by_track.values().map(Vec::len).sum()
    }

    pub fn errors(&self) -> &[ErrorEvent] {
        &self.errors
    }

    pub fn function_name(&self, function_id: u64) -> Option<&str> {
        self.capture_started
            .as_ref()?
            .selected_functions
            .iter()
            .find(|function| function.function_id == function_id)
            .map(|function| function.name.as_str())
    }

    /// Display name of a timer: the function for calls, the label otherwise.
    pub fn timer_name(&self, timer: &TimerInfo) -> String {
        match TimerType::try_from(timer.timer_type) {
            Ok(TimerType::FunctionCall) => self
                .function_name(timer.function_id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("function {}", timer.function_id)),
            Ok(TimerType::CoreActivity) => match self.thread_name(timer.thread_id) {
                Some(name) => format!("{} ({})", name, timer.thread_id),
                None => format!("tid {}", timer.thread_id),
            },
            _ => self
                .string(timer.user_data_key)
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", timer.user_data_key)),
        }
    }

    fn add_timer(&mut self, timer: TimerInfo) {
        self.timers_by_track
            .entry(TrackKey::for_timer(&timer))
            .or_default()
            .push(timer);
    }
}

impl CaptureListener for CaptureData {
    fn on_capture_started(&mut self, capture_started: CaptureStartedInfo) {
        self.capture_started = Some(capture_started);
    }
    fn on_capture_complete(&mut self) {
        for timers in self.timers_by_track.values_mut() {
            timers.sort_by_key(|timer| (timer.start, timer.depth));
        }
        self.complete = true;
    }
    fn on_scheduling_slice(&mut self, timer: TimerInfo) {
        self.add_timer(timer);
    }
    fn on_callstack_event(&mut self, callstack_event: CallstackEvent) {
        self.callstack_data.add_callstack_event(callstack_event);
    }
    fn on_unique_callstack(&mut self, callstack_id: u64, callstack: CallstackInfo) {
        self.callstack_data.add_unique_callstack(callstack_id, callstack);
    }
    fn on_function_call(&mut self, timer: TimerInfo) {
        self.add_timer(timer);
    }
    fn on_thread_name(&mut self, thread_name: ThreadNameInfo) {
        self.thread_names
            .insert(thread_name.thread_id, thread_name.name);
    }
    fn on_thread_state_slice(&mut self, slice: ThreadStateSliceInfo) {
        self.thread_state_slices
            .entry(slice.thread_id)
            .or_default()
            .push(slice);
    }
    fn on_address_info(&mut self, address_info: LinuxAddressInfo) {
        self.address_infos
            .insert(address_info.absolute_address, address_info);
    }
    fn on_key_and_string(&mut self, key: u64, string: String) {
        self.strings.insert(key, string);
    }
    fn on_unique_tracepoint_info(&mut self, key: u64, tracepoint_info: TracepointInfo) {
        self.tracepoint_data
            .add_unique_tracepoint_info(key, tracepoint_info);
    }
    fn on_tracepoint_event(&mut self, tracepoint_event: TracepointEventInfo) {
        self.tracepoint_data.emplace_tracepoint_event(tracepoint_event);
    }
    fn on_gpu_job(&mut self, timer: TimerInfo) {
        self.add_timer(timer);
    }
    fn on_gpu_queue_submission(&mut self, timer: TimerInfo) {
        self.add_timer(timer);
    }
    fn on_api_scope(&mut self, timer: TimerInfo) {
        self.add_timer(timer);
    }
    fn on_error_event(&mut self, error_event: ErrorEvent) {
        self.errors.push(error_event);
    }
}

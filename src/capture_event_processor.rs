//! Client side reconstruction of a capture from its canonical event stream.
//!
//! Interned payloads are kept in local tables and only handed to the listener
//! the first time an event refers to them, so every key the listener sees has
//! been announced right before.

use std::collections::HashSet;
use std::path::Path;

use log::{debug, error, info, warn};

use crate::capture_listener::CaptureListener;
use crate::gpu_queue_submission_processor::{
    gpu_job_timers, label_key, GpuCorrelationStats, GpuQueueSubmissionProcessor, GPU_TIMER_LABELS,
};
use crate::intern::InterningTable;
use crate::protos::capture::client_capture_event::Event;
use crate::protos::capture::{
    AddressInfo, ApiScope, ApiScopeAsync, CallstackSample, CaptureFinished,
    CaptureFinishedStatus, CaptureStarted, ClientCaptureEvent, FunctionCall, GpuJob,
    GpuQueueSubmission, SchedulingSlice, ThreadName, ThreadStateSlice, TracepointEvent,
    TracepointInfo, Callstack,
};
use crate::protos::capture_data::{
    CallstackEvent, CallstackInfo, CaptureStartedInfo, FunctionInfo, LinuxAddressInfo,
    ThreadNameInfo, ThreadStateSliceInfo, TimerInfo, TimerType, TracepointEventInfo,
};

pub struct CaptureEventProcessor<L: CaptureListener> {
    listener: L,
    string_intern_pool: InterningTable<String>,
    callstack_intern_pool: InterningTable<Callstack>,
    tracepoint_intern_pool: InterningTable<TracepointInfo>,
    announced_strings: HashSet<u64>,
    announced_callstacks: HashSet<u64>,
    announced_tracepoints: HashSet<u64>,
    gpu_queue_submission_processor: GpuQueueSubmissionProcessor,
    begin_capture_time_ns: u64,
    target_pid: Option<u32>,
    skipped_events: u64,
    gpu_correlation_stats: Option<GpuCorrelationStats>,
}

impl<L: CaptureListener> CaptureEventProcessor<L> {
    pub fn new(listener: L) -> Self {
        let string_intern_pool = InterningTable::new();
        for label in GPU_TIMER_LABELS {
            if let Err(e) = string_intern_pool.try_insert(label_key(label), label.to_string()) {
                error!("Cannot register GPU label \"{}\": {}", label, e);
            }
        }
        Self {
            listener,
            string_intern_pool,
            callstack_intern_pool: InterningTable::new(),
            tracepoint_intern_pool: InterningTable::new(),
            announced_strings: HashSet::new(),
            announced_callstacks: HashSet::new(),
            announced_tracepoints: HashSet::new(),
            gpu_queue_submission_processor: GpuQueueSubmissionProcessor::new(),
            begin_capture_time_ns: u64::MAX,
            target_pid: None,
            skipped_events: 0,
            gpu_correlation_stats: None,
        }
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    pub fn into_listener(self) -> L {
        self.listener
    }

    /// First timestamp of the capture, `u64::MAX` until one was observed.
    pub fn begin_capture_time_ns(&self) -> u64 {
        self.begin_capture_time_ns
    }

    /// Events dropped because they referred to unknown keys.
    pub fn skipped_events(&self) -> u64 {
        self.skipped_events
    }

    /// GPU leftovers, available once `CaptureFinished` was processed.
    pub fn gpu_correlation_stats(&self) -> Option<GpuCorrelationStats> {
        self.gpu_correlation_stats
    }

    pub fn process_events(&mut self, events: impl IntoIterator<Item = ClientCaptureEvent>) {
        for event in events {
            self.process_event(event);
        }
    }

    pub fn process_event(&mut self, event: ClientCaptureEvent) {
        let Some(event) = event.event else {
            warn!("Ignoring capture event without payload");
            return;
        };
        match event {
            Event::InternedCallstack(interned) => {
                let callstack = interned.intern.unwrap_or_default();
                if let Err(e) = self.callstack_intern_pool.try_insert(interned.key, callstack) {
                    error!("Dropping interned callstack: {}", e);
                }
            }
            Event::InternedString(interned) => {
                if let Err(e) = self
                    .string_intern_pool
                    .try_insert(interned.key, interned.intern)
                {
                    error!("Dropping interned string: {}", e);
                }
            }
            Event::InternedTracepointInfo(interned) => {
                let info = interned.intern.unwrap_or_default();
                if let Err(e) = self.tracepoint_intern_pool.try_insert(interned.key, info) {
                    error!("Dropping interned tracepoint info: {}", e);
                }
            }
            Event::SchedulingSlice(slice) => self.process_scheduling_slice(slice),
            Event::FunctionCall(function_call) => self.process_function_call(function_call),
            Event::CallstackSample(sample) => self.process_callstack_sample(sample),
            Event::TracepointEvent(tracepoint_event) => {
                self.process_tracepoint_event(tracepoint_event)
            }
            Event::ThreadName(thread_name) => self.process_thread_name(thread_name),
            Event::ThreadStateSlice(slice) => self.process_thread_state_slice(slice),
            Event::AddressInfo(address_info) => self.process_address_info(address_info),
            Event::GpuJob(job) => self.process_gpu_job(job),
            Event::GpuQueueSubmission(submission) => self.process_gpu_queue_submission(submission),
            Event::ApiScope(scope) => self.process_api_scope(scope),
            Event::ApiScopeAsync(scope) => self.process_api_scope_async(scope),
            Event::CaptureStarted(capture_started) => self.process_capture_started(capture_started),
            Event::CaptureFinished(capture_finished) => {
                self.process_capture_finished(capture_finished)
            }
            Event::ErrorEvent(error_event) => {
                self.observe_timestamp(error_event.timestamp_ns);
                self.listener.on_error_event(error_event);
            }
        }
    }

    fn observe_timestamp(&mut self, timestamp_ns: u64) {
        if self.begin_capture_time_ns == u64::MAX {
            self.begin_capture_time_ns = timestamp_ns;
        }
    }

    /// Announces the string for `key` unless that already happened.
    fn send_string_to_listener_if_necessary(&mut self, key: u64) -> bool {
        if self.announced_strings.contains(&key) {
            return true;
        }
        let Some(string) = self.string_intern_pool.get(key) else {
            warn!("Unknown string key {}", key);
            return false;
        };
        self.listener.on_key_and_string(key, string);
        self.announced_strings.insert(key);
        true
    }

    fn send_callstack_to_listener_if_necessary(&mut self, callstack_id: u64) -> bool {
        if self.announced_callstacks.contains(&callstack_id) {
            return true;
        }
        let Some(callstack) = self.callstack_intern_pool.get(callstack_id) else {
            return false;
        };
        self.listener.on_unique_callstack(
            callstack_id,
            CallstackInfo {
                frames: callstack.pcs,
                callstack_type: callstack.callstack_type,
            },
        );
        self.announced_callstacks.insert(callstack_id);
        true
    }

    fn send_tracepoint_info_to_listener_if_necessary(&mut self, key: u64) -> bool {
        if self.announced_tracepoints.contains(&key) {
            return true;
        }
        let Some(info) = self.tracepoint_intern_pool.get(key) else {
            return false;
        };
        self.listener.on_unique_tracepoint_info(key, info);
        self.announced_tracepoints.insert(key);
        true
    }

    /// Labels and timelines of GPU and API timers are string keys.
    fn send_timer_strings_to_listener(&mut self, timer: &TimerInfo) {
        if timer.user_data_key != 0 {
            self.send_string_to_listener_if_necessary(timer.user_data_key);
        }
        if timer.timeline_hash != 0 {
            self.send_string_to_listener_if_necessary(timer.timeline_hash);
        }
    }

    fn process_capture_started(&mut self, capture_started: CaptureStarted) {
        self.observe_timestamp(capture_started.capture_start_timestamp_ns);
        self.target_pid = Some(capture_started.process_id);

        let selected_functions = capture_started
            .capture_options
            .map(|options| {
                options
                    .instrumented_functions
                    .into_iter()
                    .map(|function| FunctionInfo {
                        function_id: function.function_id,
                        name: function.function_name,
                        module_path: function.file_path,
                        file_offset: function.file_offset,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let process_name = Path::new(&capture_started.executable_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        info!(
            "Capture of pid {} ({}) started",
            capture_started.process_id, process_name
        );
        self.listener.on_capture_started(CaptureStartedInfo {
            process_id: capture_started.process_id as i32,
            process_name,
            executable_path: capture_started.executable_path,
            capture_start_timestamp_ns: capture_started.capture_start_timestamp_ns,
            selected_functions,
        });
    }

    fn process_capture_finished(&mut self, capture_finished: CaptureFinished) {
        let stats = self.gpu_queue_submission_processor.finish();
        self.gpu_correlation_stats = Some(stats);

        match CaptureFinishedStatus::try_from(capture_finished.status) {
            Ok(CaptureFinishedStatus::Successful) => info!("Capture finished"),
            Ok(status) => warn!(
                "Capture finished with status {:?}: {}",
                status, capture_finished.error_message
            ),
            Err(_) => warn!(
                "Capture finished with unknown status {}",
                capture_finished.status
            ),
        }
        if self.skipped_events > 0 {
            warn!(
                "{} events referring to unknown keys were skipped",
                self.skipped_events
            );
        }
        self.listener.on_capture_complete();
    }

    fn process_scheduling_slice(&mut self, slice: SchedulingSlice) {
        self.observe_timestamp(slice.in_timestamp_ns);
        self.listener.on_scheduling_slice(TimerInfo {
            start: slice.in_timestamp_ns,
            end: slice.out_timestamp_ns,
            process_id: slice.pid as i32,
            thread_id: slice.tid as i32,
            processor: slice.core as i32,
            timer_type: TimerType::CoreActivity as i32,
            ..Default::default()
        });
    }

    fn process_function_call(&mut self, function_call: FunctionCall) {
        self.observe_timestamp(function_call.begin_timestamp_ns);
        self.listener.on_function_call(TimerInfo {
            start: function_call.begin_timestamp_ns,
            end: function_call.end_timestamp_ns,
            process_id: function_call.pid as i32,
            thread_id: function_call.tid as i32,
            depth: function_call.depth.max(0) as u32,
            processor: -1,
            timer_type: TimerType::FunctionCall as i32,
            function_id: function_call.function_id,
            return_value: function_call.return_value,
            registers: function_call.registers,
            ..Default::default()
        });
    }

    fn process_callstack_sample(&mut self, sample: CallstackSample) {
        self.observe_timestamp(sample.timestamp_ns);
        if !self.send_callstack_to_listener_if_necessary(sample.callstack_id) {
            warn!(
                "Skipping callstack sample of tid {} with unknown callstack {}",
                sample.tid, sample.callstack_id
            );
            self.skipped_events += 1;
            return;
        }
        self.listener.on_callstack_event(CallstackEvent {
            time: sample.timestamp_ns,
            callstack_id: sample.callstack_id,
            thread_id: sample.tid as i32,
            process_id: sample.pid as i32,
        });
    }

    fn process_tracepoint_event(&mut self, tracepoint_event: TracepointEvent) {
        self.observe_timestamp(tracepoint_event.timestamp_ns);
        let tracepoint_info_key = tracepoint_event.tracepoint_info_key;
        if !self.send_tracepoint_info_to_listener_if_necessary(tracepoint_info_key) {
            warn!(
                "Skipping tracepoint event with unknown tracepoint key {}",
                tracepoint_event.tracepoint_info_key
            );
            self.skipped_events += 1;
            return;
        }
        let is_same_pid_as_target = self.target_pid == Some(tracepoint_event.pid);
        self.listener.on_tracepoint_event(TracepointEventInfo {
            pid: tracepoint_event.pid as i32,
            tid: tracepoint_event.tid as i32,
            cpu: tracepoint_event.cpu as i32,
            time: tracepoint_event.timestamp_ns,
            tracepoint_info_key: tracepoint_event.tracepoint_info_key,
            is_same_pid_as_target,
        });
    }

    fn process_thread_name(&mut self, thread_name: ThreadName) {
        self.listener.on_thread_name(ThreadNameInfo {
            process_id: thread_name.pid as i32,
            thread_id: thread_name.tid as i32,
            name: thread_name.name,
            timestamp_ns: thread_name.timestamp_ns,
        });
    }

    fn process_thread_state_slice(&mut self, slice: ThreadStateSlice) {
        self.observe_timestamp(slice.begin_timestamp_ns);
        self.listener.on_thread_state_slice(ThreadStateSliceInfo {
            thread_id: slice.tid as i32,
            thread_state: slice.thread_state,
            begin_timestamp_ns: slice.begin_timestamp_ns,
            end_timestamp_ns: slice.end_timestamp_ns,
        });
    }

    fn process_address_info(&mut self, address_info: AddressInfo) {
        let function_name = self.string_intern_pool.get(address_info.function_name_key);
        let module_path = self.string_intern_pool.get(address_info.module_path_key);
        let (Some(function_name), Some(module_path)) = (function_name, module_path) else {
            warn!(
                "Skipping address info for {:#x} with unknown strings",
                address_info.absolute_address
            );
            self.skipped_events += 1;
            return;
        };
        self.listener.on_address_info(LinuxAddressInfo {
            absolute_address: address_info.absolute_address,
            offset_in_function: address_info.offset_in_function,
            function_name,
            module_path,
        });
    }

    fn process_gpu_job(&mut self, job: GpuJob) {
        self.observe_timestamp(job.amdgpu_cs_ioctl_time_ns);
        for timer in gpu_job_timers(&job) {
            self.send_timer_strings_to_listener(&timer);
            self.listener.on_gpu_job(timer);
        }
        let timers = self.gpu_queue_submission_processor.process_gpu_job(
            &job,
            &self.string_intern_pool,
            self.begin_capture_time_ns,
        );
        self.send_gpu_queue_submission_timers(timers);
    }

    fn process_gpu_queue_submission(&mut self, submission: GpuQueueSubmission) {
        if let Some(meta_info) = &submission.meta_info {
            self.observe_timestamp(meta_info.pre_submission_cpu_timestamp);
        }
        let timers = self.gpu_queue_submission_processor.process_gpu_queue_submission(
            submission,
            &self.string_intern_pool,
            self.begin_capture_time_ns,
        );
        self.send_gpu_queue_submission_timers(timers);
    }

    fn send_gpu_queue_submission_timers(&mut self, timers: Vec<TimerInfo>) {
        if !timers.is_empty() {
            debug!("Matched GPU submission produced {} timers", timers.len());
        }
        for timer in timers {
            self.send_timer_strings_to_listener(&timer);
            self.listener.on_gpu_queue_submission(timer);
        }
    }

    fn process_api_scope(&mut self, scope: ApiScope) {
        self.observe_timestamp(scope.begin_timestamp_ns);
        let timer = TimerInfo {
            start: scope.begin_timestamp_ns,
            end: scope.end_timestamp_ns,
            process_id: scope.pid as i32,
            thread_id: scope.tid as i32,
            depth: scope.depth.max(0) as u32,
            processor: -1,
            timer_type: TimerType::ApiScope as i32,
            user_data_key: scope.name_key,
            group_id: scope.group_id,
            ..Default::default()
        };
        self.send_timer_strings_to_listener(&timer);
        self.listener.on_api_scope(timer);
    }

    fn process_api_scope_async(&mut self, scope: ApiScopeAsync) {
        self.observe_timestamp(scope.begin_timestamp_ns);
        let timer = TimerInfo {
            start: scope.begin_timestamp_ns,
            end: scope.end_timestamp_ns,
            process_id: scope.pid as i32,
            thread_id: scope.tid as i32,
            depth: scope.depth.max(0) as u32,
            processor: -1,
            timer_type: TimerType::ApiScopeAsync as i32,
            user_data_key: scope.name_key,
            group_id: scope.group_id,
            ..Default::default()
        };
        self.send_timer_strings_to_listener(&timer);
        self.listener.on_api_scope(timer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture_listener::{RecordedCall, RecordingCaptureListener};
    use crate::gpu_queue_submission_processor::{COMMAND_BUFFER_LABEL, SW_QUEUE_LABEL};
    use crate::protos::capture::{
        CaptureOptions, ErrorEvent, GpuCommandBuffer, GpuQueueSubmissionMetaInfo, GpuSubmitInfo,
        InstrumentedFunction, InternedCallstack, InternedString, InternedTracepointInfo,
    };

    fn processor() -> CaptureEventProcessor<RecordingCaptureListener> {
        CaptureEventProcessor::new(RecordingCaptureListener::new())
    }

    fn capture_started(pid: u32) -> ClientCaptureEvent {
        Event::CaptureStarted(CaptureStarted {
            process_id: pid,
            executable_path: "/usr/bin/game".to_string(),
            capture_start_timestamp_ns: 100,
            capture_start_unix_time_ns: 1,
            capture_options: Some(CaptureOptions {
                pid,
                instrumented_functions: vec![InstrumentedFunction {
                    function_id: 1,
                    file_path: "/usr/bin/game".to_string(),
                    file_offset: 0x40,
                    function_name: "main".to_string(),
                }],
                ..Default::default()
            }),
        })
        .into()
    }

    fn interned_string(key: u64, s: &str) -> ClientCaptureEvent {
        Event::InternedString(InternedString {
            key,
            intern: s.to_string(),
        })
        .into()
    }

    #[test]
    fn test_capture_started_and_function_call() {
        let mut processor = processor();
        processor.process_event(capture_started(100));
        processor.process_event(
            Event::FunctionCall(FunctionCall {
                pid: 100,
                tid: 100,
                function_id: 1,
                begin_timestamp_ns: 1000,
                end_timestamp_ns: 2000,
                depth: 0,
                return_value: 3,
                registers: vec![1, 2, 3, 4, 5, 6],
            })
            .into(),
        );
        assert_eq!(processor.begin_capture_time_ns(), 100);

        let listener = processor.into_listener();
        let RecordedCall::CaptureStarted(started) = &listener.calls[0] else {
            panic!("expected capture started, got {:?}", listener.calls[0]);
        };
        assert_eq!(started.process_name, "game");
        assert_eq!(started.selected_functions[0].name, "main");

        let RecordedCall::FunctionCall(timer) = &listener.calls[1] else {
            panic!("expected function call, got {:?}", listener.calls[1]);
        };
        assert_eq!((timer.start, timer.end), (1000, 2000));
        assert_eq!(timer.process_id, 100);
        assert_eq!(timer.thread_id, 100);
        assert_eq!(timer.function_id, 1);
        assert_eq!(timer.return_value, 3);
        assert_eq!(timer.registers.len(), 6);
    }

    #[test]
    fn test_unique_callstack_announced_once_before_events() {
        let mut processor = processor();
        processor.process_event(
            Event::InternedCallstack(InternedCallstack {
                key: 4,
                intern: Some(Callstack {
                    pcs: vec![0x10, 0x20],
                    callstack_type: 0,
                }),
            })
            .into(),
        );
        for timestamp_ns in [10, 20] {
            processor.process_event(
                Event::CallstackSample(CallstackSample {
                    pid: 1,
                    tid: 2,
                    callstack_id: 4,
                    timestamp_ns,
                })
                .into(),
            );
        }
        // Unknown callstack.
        processor.process_event(
            Event::CallstackSample(CallstackSample {
                pid: 1,
                tid: 2,
                callstack_id: 5,
                timestamp_ns: 30,
            })
            .into(),
        );

        assert_eq!(processor.skipped_events(), 1);
        let listener = processor.into_listener();
        let names: Vec<_> = listener.calls.iter().map(RecordedCall::name).collect();
        assert_eq!(
            names,
            vec!["unique_callstack", "callstack_event", "callstack_event"]
        );
        assert_eq!(
            listener.calls[0],
            RecordedCall::UniqueCallstack(
                4,
                CallstackInfo {
                    frames: vec![0x10, 0x20],
                    callstack_type: 0
                }
            )
        );
    }

    #[test]
    fn test_tracepoint_event_marks_target_pid() {
        let mut processor = processor();
        processor.process_event(capture_started(100));
        processor.process_event(
            Event::InternedTracepointInfo(InternedTracepointInfo {
                key: 2,
                intern: Some(TracepointInfo {
                    category: "sched".to_string(),
                    name: "sched_switch".to_string(),
                }),
            })
            .into(),
        );
        for pid in [100, 200] {
            processor.process_event(
                Event::TracepointEvent(TracepointEvent {
                    pid,
                    tid: pid,
                    cpu: 1,
                    timestamp_ns: 500,
                    tracepoint_info_key: 2,
                })
                .into(),
            );
        }

        let listener = processor.into_listener();
        assert_eq!(listener.calls_named("unique_tracepoint_info").len(), 1);
        let flags: Vec<_> = listener
            .calls_named("tracepoint_event")
            .into_iter()
            .map(|call| match call {
                RecordedCall::TracepointEvent(event) => event.is_same_pid_as_target,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(flags, vec![true, false]);
    }

    #[test]
    fn test_address_info_strings_are_resolved() {
        let mut processor = processor();
        processor.process_event(interned_string(1, "libfoo.so"));
        processor.process_event(interned_string(2, "foo"));
        processor.process_event(
            Event::AddressInfo(AddressInfo {
                absolute_address: 0x1234,
                function_name_key: 2,
                offset_in_function: 4,
                module_path_key: 1,
            })
            .into(),
        );
        let listener = processor.into_listener();
        assert_eq!(
            listener.calls,
            vec![RecordedCall::AddressInfo(LinuxAddressInfo {
                absolute_address: 0x1234,
                offset_in_function: 4,
                function_name: "foo".to_string(),
                module_path: "libfoo.so".to_string(),
            })]
        );
    }

    #[test]
    fn test_gpu_match_announces_labels_and_timeline() {
        let mut processor = processor();
        processor.process_event(interned_string(9, "gfx"));
        processor.process_event(
            Event::GpuJob(GpuJob {
                pid: 1,
                tid: 7,
                timeline_key: 9,
                amdgpu_cs_ioctl_time_ns: 500,
                amdgpu_sched_run_job_time_ns: 550,
                gpu_hardware_start_time_ns: 600,
                dma_fence_signaled_time_ns: 900,
                ..Default::default()
            })
            .into(),
        );
        processor.process_event(
            Event::GpuQueueSubmission(GpuQueueSubmission {
                meta_info: Some(GpuQueueSubmissionMetaInfo {
                    tid: 7,
                    pid: 1,
                    pre_submission_cpu_timestamp: 400,
                    post_submission_cpu_timestamp: 600,
                }),
                submit_infos: vec![GpuSubmitInfo {
                    command_buffers: vec![GpuCommandBuffer {
                        begin_gpu_timestamp_ns: 610,
                        end_gpu_timestamp_ns: 890,
                    }],
                }],
                completed_markers: vec![],
                num_begin_markers: 0,
            })
            .into(),
        );

        let listener = processor.into_listener();
        assert_eq!(listener.calls_named("gpu_job").len(), 3);
        let submissions = listener.calls_named("gpu_queue_submission");
        assert_eq!(submissions.len(), 1);
        let RecordedCall::GpuQueueSubmission(timer) = submissions[0] else {
            unreachable!();
        };
        assert_eq!((timer.start, timer.end, timer.timeline_hash), (610, 890, 9));

        let announced: Vec<_> = listener
            .calls_named("key_and_string")
            .into_iter()
            .map(|call| match call {
                RecordedCall::KeyAndString(key, string) => (*key, string.clone()),
                _ => unreachable!(),
            })
            .collect();
        assert!(announced.contains(&(9, "gfx".to_string())));
        assert!(announced.contains(&(label_key(SW_QUEUE_LABEL), SW_QUEUE_LABEL.to_string())));
        assert!(announced.contains(&(
            label_key(COMMAND_BUFFER_LABEL),
            COMMAND_BUFFER_LABEL.to_string()
        )));
        // Each key is announced exactly once.
        let unique: HashSet<_> = announced.iter().map(|(key, _)| *key).collect();
        assert_eq!(unique.len(), announced.len());
    }

    #[test]
    fn test_api_scope_name_announced_before_scope() {
        let mut processor = processor();
        processor.process_event(interned_string(3, "LoadLevel"));
        processor.process_event(
            Event::ApiScopeAsync(ApiScopeAsync {
                pid: 1,
                tid: 1,
                name_key: 3,
                begin_timestamp_ns: 10,
                end_timestamp_ns: 20,
                depth: 0,
                group_id: 5,
            })
            .into(),
        );
        let listener = processor.into_listener();
        assert_eq!(
            listener.calls[0],
            RecordedCall::KeyAndString(3, "LoadLevel".to_string())
        );
        let RecordedCall::ApiScope(timer) = &listener.calls[1] else {
            panic!("expected api scope, got {:?}", listener.calls[1]);
        };
        assert_eq!(timer.timer_type, TimerType::ApiScopeAsync as i32);
        assert_eq!(timer.group_id, 5);
    }

    #[test]
    fn test_capture_finished_reports_gpu_leftovers() {
        let mut processor = processor();
        processor.process_event(
            Event::GpuJob(GpuJob {
                tid: 7,
                amdgpu_cs_ioctl_time_ns: 500,
                amdgpu_sched_run_job_time_ns: 500,
                gpu_hardware_start_time_ns: 500,
                dma_fence_signaled_time_ns: 500,
                ..Default::default()
            })
            .into(),
        );
        processor.process_event(
            Event::ErrorEvent(ErrorEvent {
                timestamp_ns: 600,
                producer_id: 100,
                message: "unknown key".to_string(),
            })
            .into(),
        );
        processor.process_event(
            Event::CaptureFinished(CaptureFinished {
                status: CaptureFinishedStatus::Successful as i32,
                error_message: String::new(),
            })
            .into(),
        );

        let stats = processor.gpu_correlation_stats().unwrap();
        assert_eq!(stats.unmatched_jobs, 1);
        let listener = processor.into_listener();
        assert_eq!(listener.calls_named("error_event").len(), 1);
        assert_eq!(listener.calls.last(), Some(&RecordedCall::CaptureComplete));
    }
}

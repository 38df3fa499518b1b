//! Canonicalization of producer events.
//!
//! Every producer interns callstacks, strings and tracepoint descriptors with keys
//! of its own choosing. The [`ProducerEventProcessor`] promotes those keys to keys
//! that are unique for the whole capture, emits each distinct payload once, before
//! the first event that references it, and forwards everything else untouched.
//!
//! One processor exists per capture and is shared by all producer sessions. All
//! work happens under a single mutex, so an interned payload always reaches the
//! collector before any event that refers to it, whichever producer sent it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use log::{error, warn};

use crate::event_buffer::ClientCaptureEventCollector;
use crate::intern::InternPool;
use crate::protos::capture::client_capture_event::Event as ClientEvent;
use crate::protos::capture::producer_capture_event::Event as ProducerEvent;
use crate::protos::capture::{
    AddressInfo, ApiScope, ApiScopeAsync, Callstack, CallstackSample, ErrorEvent,
    FullAddressInfo, FullCallstackSample, FullGpuJob, FullTracepointEvent, GpuJob,
    GpuQueueSubmission, InternedCallstack, InternedString, InternedTracepointInfo,
    ProducerCaptureEvent, TracepointEvent, TracepointInfo,
};
use crate::utils::monotonic_timestamp_ns;

type ProducerKey = (u64, u64);

#[derive(Default)]
struct ProcessorState {
    callstack_pool: InternPool<Callstack>,
    string_pool: InternPool<String>,
    tracepoint_pool: InternPool<TracepointInfo>,

    // (producer_id, producer-local key) -> global key
    callstack_keys: HashMap<ProducerKey, u64>,
    string_keys: HashMap<ProducerKey, u64>,
    tracepoint_keys: HashMap<ProducerKey, u64>,

    failed_producers: HashSet<u64>,
    errors: Vec<String>,
    dropped_events: u64,
}

/// Counters describing what a processor did over a capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub unique_callstacks: usize,
    pub unique_strings: usize,
    pub unique_tracepoints: usize,
    pub dropped_events: u64,
    pub errors: Vec<String>,
}

pub struct ProducerEventProcessor {
    collector: Arc<dyn ClientCaptureEventCollector>,
    state: Mutex<ProcessorState>,
}

impl ProducerEventProcessor {
    pub fn new(collector: Arc<dyn ClientCaptureEventCollector>) -> Self {
        Self {
            collector,
            state: Mutex::new(ProcessorState::default()),
        }
    }

    pub fn process_event(&self, producer_id: u64, event: ProducerCaptureEvent) {
        let Some(event) = event.event else {
            warn!("Producer {} sent a capture event without payload", producer_id);
            return;
        };

        let mut state = self
            .state
            .lock()
            .expect("Failed to acquire producer event processor lock");
        let state = &mut *state;

        match event {
            ProducerEvent::SchedulingSlice(slice) => self.emit(ClientEvent::SchedulingSlice(slice)),
            ProducerEvent::FunctionCall(call) => self.emit(ClientEvent::FunctionCall(call)),
            ProducerEvent::ThreadName(name) => self.emit(ClientEvent::ThreadName(name)),
            ProducerEvent::ThreadStateSlice(slice) => {
                self.emit(ClientEvent::ThreadStateSlice(slice))
            }
            ProducerEvent::CaptureStarted(started) => {
                self.emit(ClientEvent::CaptureStarted(started))
            }
            ProducerEvent::CaptureFinished(finished) => {
                self.emit(ClientEvent::CaptureFinished(finished))
            }
            ProducerEvent::InternedCallstack(interned) => {
                self.process_interned_callstack(state, producer_id, interned)
            }
            ProducerEvent::InternedString(interned) => {
                self.process_interned_string(state, producer_id, interned)
            }
            ProducerEvent::InternedTracepointInfo(interned) => {
                self.process_interned_tracepoint_info(state, producer_id, interned)
            }
            ProducerEvent::CallstackSample(sample) => {
                self.process_callstack_sample(state, producer_id, sample)
            }
            ProducerEvent::FullCallstackSample(sample) => {
                self.process_full_callstack_sample(state, sample)
            }
            ProducerEvent::AddressInfo(info) => self.process_address_info(state, producer_id, info),
            ProducerEvent::FullAddressInfo(info) => self.process_full_address_info(state, info),
            ProducerEvent::TracepointEvent(tracepoint) => {
                self.process_tracepoint_event(state, producer_id, tracepoint)
            }
            ProducerEvent::FullTracepointEvent(tracepoint) => {
                self.process_full_tracepoint_event(state, tracepoint)
            }
            ProducerEvent::GpuJob(job) => self.process_gpu_job(state, producer_id, job),
            ProducerEvent::FullGpuJob(job) => self.process_full_gpu_job(state, job),
            ProducerEvent::GpuQueueSubmission(submission) => {
                self.process_gpu_queue_submission(state, producer_id, submission)
            }
            ProducerEvent::ApiScope(scope) => self.process_api_scope(state, producer_id, scope),
            ProducerEvent::ApiScopeAsync(scope) => {
                self.process_api_scope_async(state, producer_id, scope)
            }
        }
    }

    pub fn stats(&self) -> ProcessorStats {
        let state = self
            .state
            .lock()
            .expect("Failed to acquire producer event processor lock");
        ProcessorStats {
            unique_callstacks: state.callstack_pool.len(),
            unique_strings: state.string_pool.len(),
            unique_tracepoints: state.tracepoint_pool.len(),
            dropped_events: state.dropped_events,
            errors: state.errors.clone(),
        }
    }

    /// True once any producer referenced a key it never interned.
    pub fn has_fatal_error(&self) -> bool {
        !self
            .state
            .lock()
            .expect("Failed to acquire producer event processor lock")
            .errors
            .is_empty()
    }

    fn emit(&self, event: ClientEvent) {
        self.collector.add_event(event.into());
    }

    fn intern_callstack(&self, state: &mut ProcessorState, callstack: Callstack) -> u64 {
        let (key, assigned) = state.callstack_pool.get_or_assign_id(callstack.clone());
        if assigned {
            self.emit(ClientEvent::InternedCallstack(InternedCallstack {
                key,
                intern: Some(callstack),
            }));
        }
        key
    }

    fn intern_string(&self, state: &mut ProcessorState, string: String) -> u64 {
        let (key, assigned) = state.string_pool.get_or_assign_id(string.clone());
        if assigned {
            self.emit(ClientEvent::InternedString(InternedString {
                key,
                intern: string,
            }));
        }
        key
    }

    fn intern_tracepoint_info(&self, state: &mut ProcessorState, info: TracepointInfo) -> u64 {
        let (key, assigned) = state.tracepoint_pool.get_or_assign_id(info.clone());
        if assigned {
            self.emit(ClientEvent::InternedTracepointInfo(InternedTracepointInfo {
                key,
                intern: Some(info),
            }));
        }
        key
    }

    fn process_interned_callstack(
        &self,
        state: &mut ProcessorState,
        producer_id: u64,
        interned: InternedCallstack,
    ) {
        let global_key = self.intern_callstack(state, interned.intern.unwrap_or_default());
        self.record_key(state, KeyKind::Callstack, producer_id, interned.key, global_key);
    }

    fn process_interned_string(
        &self,
        state: &mut ProcessorState,
        producer_id: u64,
        interned: InternedString,
    ) {
        let global_key = self.intern_string(state, interned.intern);
        self.record_key(state, KeyKind::String, producer_id, interned.key, global_key);
    }

    fn process_interned_tracepoint_info(
        &self,
        state: &mut ProcessorState,
        producer_id: u64,
        interned: InternedTracepointInfo,
    ) {
        let global_key = self.intern_tracepoint_info(state, interned.intern.unwrap_or_default());
        self.record_key(state, KeyKind::Tracepoint, producer_id, interned.key, global_key);
    }

    fn record_key(
        &self,
        state: &mut ProcessorState,
        kind: KeyKind,
        producer_id: u64,
        local_key: u64,
        global_key: u64,
    ) {
        let existing = kind.map_mut(state).get(&(producer_id, local_key)).copied();
        match existing {
            None => {
                kind.map_mut(state)
                    .insert((producer_id, local_key), global_key);
            }
            Some(existing) if existing == global_key => {}
            Some(_) => self.fail_producer(
                state,
                producer_id,
                format!(
                    "Producer {} interned {} key {} twice with different contents",
                    producer_id,
                    kind.name(),
                    local_key
                ),
            ),
        }
    }

    /// Translates a producer-local key, failing the producer on a miss.
    fn translate(
        &self,
        state: &mut ProcessorState,
        kind: KeyKind,
        producer_id: u64,
        local_key: u64,
    ) -> Option<u64> {
        if let Some(&global_key) = kind.map_mut(state).get(&(producer_id, local_key)) {
            return Some(global_key);
        }
        self.fail_producer(
            state,
            producer_id,
            format!(
                "Producer {} referenced {} key {} before interning it",
                producer_id,
                kind.name(),
                local_key
            ),
        );
        None
    }

    /// Events of a failed producer that reference interned keys are dropped.
    fn drop_if_failed(state: &mut ProcessorState, producer_id: u64) -> bool {
        if state.failed_producers.contains(&producer_id) {
            state.dropped_events += 1;
            return true;
        }
        false
    }

    fn fail_producer(&self, state: &mut ProcessorState, producer_id: u64, message: String) {
        state.dropped_events += 1;
        error!("{}", message);
        state.errors.push(message.clone());
        if state.failed_producers.insert(producer_id) {
            self.emit(ClientEvent::ErrorEvent(ErrorEvent {
                timestamp_ns: monotonic_timestamp_ns(),
                producer_id,
                message,
            }));
        }
    }

    fn process_callstack_sample(
        &self,
        state: &mut ProcessorState,
        producer_id: u64,
        mut sample: CallstackSample,
    ) {
        if Self::drop_if_failed(state, producer_id) {
            return;
        }
        let Some(key) = self.translate(state, KeyKind::Callstack, producer_id, sample.callstack_id)
        else {
            return;
        };
        sample.callstack_id = key;
        self.emit(ClientEvent::CallstackSample(sample));
    }

    fn process_full_callstack_sample(
        &self,
        state: &mut ProcessorState,
        sample: FullCallstackSample,
    ) {
        let callstack_id = self.intern_callstack(state, sample.callstack.unwrap_or_default());
        self.emit(ClientEvent::CallstackSample(CallstackSample {
            pid: sample.pid,
            tid: sample.tid,
            callstack_id,
            timestamp_ns: sample.timestamp_ns,
        }));
    }

    fn process_address_info(
        &self,
        state: &mut ProcessorState,
        producer_id: u64,
        mut info: AddressInfo,
    ) {
        if Self::drop_if_failed(state, producer_id) {
            return;
        }
        let Some(function_name_key) =
            self.translate(state, KeyKind::String, producer_id, info.function_name_key)
        else {
            return;
        };
        let Some(module_path_key) =
            self.translate(state, KeyKind::String, producer_id, info.module_path_key)
        else {
            return;
        };
        info.function_name_key = function_name_key;
        info.module_path_key = module_path_key;
        self.emit(ClientEvent::AddressInfo(info));
    }

    fn process_full_address_info(&self, state: &mut ProcessorState, info: FullAddressInfo) {
        let function_name_key = self.intern_string(state, info.function_name);
        let module_path_key = self.intern_string(state, info.module_path);
        self.emit(ClientEvent::AddressInfo(AddressInfo {
            absolute_address: info.absolute_address,
            function_name_key,
            offset_in_function: info.offset_in_function,
            module_path_key,
        }));
    }

    fn process_tracepoint_event(
        &self,
        state: &mut ProcessorState,
        producer_id: u64,
        mut tracepoint: TracepointEvent,
    ) {
        if Self::drop_if_failed(state, producer_id) {
            return;
        }
        let Some(key) = self.translate(
            state,
            KeyKind::Tracepoint,
            producer_id,
            tracepoint.tracepoint_info_key,
        ) else {
            return;
        };
        tracepoint.tracepoint_info_key = key;
        self.emit(ClientEvent::TracepointEvent(tracepoint));
    }

    fn process_full_tracepoint_event(
        &self,
        state: &mut ProcessorState,
        tracepoint: FullTracepointEvent,
    ) {
        let tracepoint_info_key =
            self.intern_tracepoint_info(state, tracepoint.tracepoint_info.unwrap_or_default());
        self.emit(ClientEvent::TracepointEvent(TracepointEvent {
            pid: tracepoint.pid,
            tid: tracepoint.tid,
            cpu: tracepoint.cpu,
            timestamp_ns: tracepoint.timestamp_ns,
            tracepoint_info_key,
        }));
    }

    fn process_gpu_job(&self, state: &mut ProcessorState, producer_id: u64, mut job: GpuJob) {
        if Self::drop_if_failed(state, producer_id) {
            return;
        }
        let Some(timeline_key) =
            self.translate(state, KeyKind::String, producer_id, job.timeline_key)
        else {
            return;
        };
        job.timeline_key = timeline_key;
        self.emit(ClientEvent::GpuJob(job));
    }

    fn process_full_gpu_job(&self, state: &mut ProcessorState, job: FullGpuJob) {
        let timeline_key = self.intern_string(state, job.timeline);
        self.emit(ClientEvent::GpuJob(GpuJob {
            pid: job.pid,
            tid: job.tid,
            context: job.context,
            seqno: job.seqno,
            timeline_key,
            depth: job.depth,
            amdgpu_cs_ioctl_time_ns: job.amdgpu_cs_ioctl_time_ns,
            amdgpu_sched_run_job_time_ns: job.amdgpu_sched_run_job_time_ns,
            gpu_hardware_start_time_ns: job.gpu_hardware_start_time_ns,
            dma_fence_signaled_time_ns: job.dma_fence_signaled_time_ns,
        }));
    }

    fn process_gpu_queue_submission(
        &self,
        state: &mut ProcessorState,
        producer_id: u64,
        mut submission: GpuQueueSubmission,
    ) {
        if Self::drop_if_failed(state, producer_id) {
            return;
        }
        for marker in submission.completed_markers.iter_mut() {
            let Some(text_key) =
                self.translate(state, KeyKind::String, producer_id, marker.text_key)
            else {
                return;
            };
            marker.text_key = text_key;
        }
        self.emit(ClientEvent::GpuQueueSubmission(submission));
    }

    fn process_api_scope(&self, state: &mut ProcessorState, producer_id: u64, mut scope: ApiScope) {
        if Self::drop_if_failed(state, producer_id) {
            return;
        }
        let Some(name_key) = self.translate(state, KeyKind::String, producer_id, scope.name_key)
        else {
            return;
        };
        scope.name_key = name_key;
        self.emit(ClientEvent::ApiScope(scope));
    }

    fn process_api_scope_async(
        &self,
        state: &mut ProcessorState,
        producer_id: u64,
        mut scope: ApiScopeAsync,
    ) {
        if Self::drop_if_failed(state, producer_id) {
            return;
        }
        let Some(name_key) = self.translate(state, KeyKind::String, producer_id, scope.name_key)
        else {
            return;
        };
        scope.name_key = name_key;
        self.emit(ClientEvent::ApiScopeAsync(scope));
    }
}

#[derive(Clone, Copy)]
enum KeyKind {
    Callstack,
    String,
    Tracepoint,
}

impl KeyKind {
    fn map_mut(self, state: &mut ProcessorState) -> &mut HashMap<ProducerKey, u64> {
        match self {
            KeyKind::Callstack => &mut state.callstack_keys,
            KeyKind::String => &mut state.string_keys,
            KeyKind::Tracepoint => &mut state.tracepoint_keys,
        }
    }

    fn name(self) -> &'static str {
        match self {
            KeyKind::Callstack => "callstack",
            KeyKind::String => "string",
            KeyKind::Tracepoint => "tracepoint",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_buffer::InMemoryEventCollector;
    use crate::protos::capture::{
        FunctionCall, GpuDebugMarker, GpuQueueSubmissionMetaInfo, SchedulingSlice,
    };

    fn setup() -> (Arc<InMemoryEventCollector>, ProducerEventProcessor) {
        let collector = Arc::new(InMemoryEventCollector::new());
        let processor = ProducerEventProcessor::new(collector.clone());
        (collector, processor)
    }

    fn interned_callstack(key: u64, pcs: Vec<u64>) -> ProducerCaptureEvent {
        ProducerEvent::InternedCallstack(InternedCallstack {
            key,
            intern: Some(Callstack {
                pcs,
                callstack_type: 0,
            }),
        })
        .into()
    }

    fn interned_string(key: u64, s: &str) -> ProducerCaptureEvent {
        ProducerEvent::InternedString(InternedString {
            key,
            intern: s.to_string(),
        })
        .into()
    }

    fn sample(callstack_id: u64, timestamp_ns: u64) -> ProducerCaptureEvent {
        ProducerEvent::CallstackSample(CallstackSample {
            pid: 1,
            tid: 2,
            callstack_id,
            timestamp_ns,
        })
        .into()
    }

    fn address_info(function_name_key: u64, module_path_key: u64) -> ProducerCaptureEvent {
        ProducerEvent::AddressInfo(AddressInfo {
            absolute_address: 0x4000,
            function_name_key,
            offset_in_function: 4,
            module_path_key,
        })
        .into()
    }

    #[test]
    fn test_pass_through_events_are_unchanged() {
        let (collector, processor) = setup();
        let call = FunctionCall {
            pid: 100,
            tid: 100,
            function_id: 1,
            begin_timestamp_ns: 1000,
            end_timestamp_ns: 2000,
            depth: 0,
            return_value: 0,
            registers: vec![1, 2, 3, 4, 5, 6],
        };
        let slice = SchedulingSlice {
            pid: 1,
            tid: 2,
            core: 3,
            in_timestamp_ns: 10,
            out_timestamp_ns: 20,
        };
        processor.process_event(7, ProducerEvent::FunctionCall(call.clone()).into());
        processor.process_event(7, ProducerEvent::SchedulingSlice(slice.clone()).into());

        assert_eq!(
            collector.events(),
            vec![
                ClientEvent::FunctionCall(call).into(),
                ClientEvent::SchedulingSlice(slice).into()
            ]
        );
    }

    #[test]
    fn test_equal_callstacks_from_two_producers_share_one_key() {
        let (collector, processor) = setup();
        processor.process_event(100, interned_callstack(5, vec![0x10, 0x20]));
        processor.process_event(101, interned_callstack(9, vec![0x10, 0x20]));
        processor.process_event(101, interned_callstack(10, vec![0x30]));
        processor.process_event(100, sample(5, 1));
        processor.process_event(101, sample(9, 2));
        processor.process_event(101, sample(10, 3));

        let events = collector.events();
        let interned: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.event {
                Some(ClientEvent::InternedCallstack(c)) => Some(c.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(interned.len(), 2);
        assert_ne!(interned[0].key, interned[1].key);

        let sample_ids: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.event {
                Some(ClientEvent::CallstackSample(s)) => Some(s.callstack_id),
                _ => None,
            })
            .collect();
        assert_eq!(sample_ids, vec![interned[0].key, interned[0].key, interned[1].key]);
    }

    #[test]
    fn test_definition_precedes_reference() {
        let (collector, processor) = setup();
        processor.process_event(
            100,
            ProducerEvent::FullCallstackSample(FullCallstackSample {
                pid: 1,
                tid: 1,
                callstack: Some(Callstack {
                    pcs: vec![1, 2, 3],
                    callstack_type: 0,
                }),
                timestamp_ns: 10,
            })
            .into(),
        );
        processor.process_event(100, interned_callstack(1, vec![4]));
        processor.process_event(100, sample(1, 11));

        let mut defined = HashSet::new();
        for event in collector.events() {
            match event.event {
                Some(ClientEvent::InternedCallstack(c)) => {
                    defined.insert(c.key);
                }
                Some(ClientEvent::CallstackSample(s)) => {
                    assert!(defined.contains(&s.callstack_id));
                }
                _ => {}
            }
        }
        assert_eq!(defined.len(), 2);
    }

    #[test]
    fn test_interned_string_dedup_across_producers() {
        let (collector, processor) = setup();
        for producer_id in [100, 101] {
            processor.process_event(producer_id, interned_string(1, "libfoo.so"));
            processor.process_event(producer_id, address_info(1, 1));
        }

        let events = collector.events();
        let strings: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.event {
                Some(ClientEvent::InternedString(s)) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(strings.len(), 1);
        assert_eq!(strings[0].intern, "libfoo.so");

        let infos: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.event {
                Some(ClientEvent::AddressInfo(a)) => Some(a.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(infos.len(), 2);
        assert!(infos.iter().all(|a| a.module_path_key == strings[0].key));
    }

    #[test]
    fn test_translation_miss_fails_producer_only() {
        let (collector, processor) = setup();
        processor.process_event(100, sample(42, 1));
        processor.process_event(100, interned_callstack(1, vec![0x10]));
        processor.process_event(100, sample(1, 2));
        processor.process_event(101, interned_callstack(1, vec![0x10]));
        processor.process_event(101, sample(1, 3));

        let events = collector.events();
        let errors: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.event {
                Some(ClientEvent::ErrorEvent(err)) => Some(err.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].producer_id, 100);
        assert!(errors[0].message.contains("42"));

        let samples: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.event {
                Some(ClientEvent::CallstackSample(s)) => Some(s.timestamp_ns),
                _ => None,
            })
            .collect();
        assert_eq!(samples, vec![3]);

        let stats = processor.stats();
        assert!(processor.has_fatal_error());
        assert_eq!(stats.dropped_events, 2);
        assert_eq!(stats.unique_callstacks, 1);
    }

    #[test]
    fn test_gpu_submission_marker_keys_are_translated() {
        let (collector, processor) = setup();
        processor.process_event(100, interned_string(3, "unused"));
        processor.process_event(100, interned_string(4, "Frame"));
        let submission = GpuQueueSubmission {
            meta_info: Some(GpuQueueSubmissionMetaInfo {
                tid: 7,
                pid: 7,
                pre_submission_cpu_timestamp: 1,
                post_submission_cpu_timestamp: 2,
            }),
            submit_infos: vec![],
            completed_markers: vec![GpuDebugMarker {
                text_key: 4,
                color: None,
                depth: 0,
                end_gpu_timestamp_ns: 10,
                begin_marker: None,
            }],
            num_begin_markers: 0,
        };
        processor.process_event(100, ProducerEvent::GpuQueueSubmission(submission).into());

        let events = collector.events();
        let Some(ClientEvent::GpuQueueSubmission(forwarded)) = &events[2].event else {
            panic!("expected a submission, got {:?}", events[2]);
        };
        assert_eq!(forwarded.completed_markers[0].text_key, 2);
    }

    #[test]
    fn test_full_gpu_job_interns_timeline() {
        let (collector, processor) = setup();
        let job = FullGpuJob {
            pid: 1,
            tid: 7,
            context: 1,
            seqno: 2,
            timeline: "gfx".to_string(),
            depth: 0,
            amdgpu_cs_ioctl_time_ns: 500,
            amdgpu_sched_run_job_time_ns: 550,
            gpu_hardware_start_time_ns: 600,
            dma_fence_signaled_time_ns: 900,
        };
        processor.process_event(100, ProducerEvent::FullGpuJob(job.clone()).into());
        processor.process_event(101, ProducerEvent::FullGpuJob(job).into());

        let events = collector.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0].event,
            Some(ClientEvent::InternedString(s)) if s.intern == "gfx" && s.key == 1
        ));
        for event in &events[1..] {
            assert!(matches!(
                &event.event,
                Some(ClientEvent::GpuJob(j))
                    if j.timeline_key == 1 && j.amdgpu_cs_ioctl_time_ns == 500
            ));
        }
    }

    #[test]
    fn test_conflicting_reinterning_is_reported() {
        let (collector, processor) = setup();
        processor.process_event(100, interned_string(1, "a"));
        processor.process_event(100, interned_string(1, "b"));
        assert!(processor.has_fatal_error());
        assert!(collector
            .events()
            .iter()
            .any(|e| matches!(&e.event, Some(ClientEvent::ErrorEvent(_)))));
    }
}

//! Correlation of Vulkan queue submissions with kernel GPU jobs.
//!
//! The Vulkan layer reports a [`GpuQueueSubmission`] per `vkQueueSubmit`, with the
//! CPU timestamps right before and after the call, the GPU timestamps of every
//! command buffer and the debug markers that completed in it. The kernel side
//! reports a [`GpuJob`] per submission with the time of the `amdgpu_cs_ioctl` and
//! the GPU timeline it ran on. Both come from the submitting thread, so a
//! submission `[pre, post]` on thread T matches the job of T whose ioctl time lies
//! in `[pre, post]`.
//!
//! Whichever record arrives first is kept until its partner shows up. A matched
//! submission that still has begun-but-not-ended debug markers is kept (with its
//! job) until submissions carrying the ends of all those markers were processed.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use log::{debug, info, warn};
use regex::Regex;

use crate::intern::{fnv1a_64, InterningTable};
use crate::protos::capture::{
    GpuDebugMarker, GpuJob, GpuQueueSubmission, GpuQueueSubmissionMetaInfo,
};
use crate::protos::capture_data::{TimerInfo, TimerType, UNKNOWN_THREAD_ID};

pub const SW_QUEUE_LABEL: &str = "sw queue";
pub const HW_QUEUE_LABEL: &str = "hw queue";
pub const HW_EXECUTION_LABEL: &str = "hw execution";
pub const COMMAND_BUFFER_LABEL: &str = "command buffer";

/// Labels used as `user_data_key` of GPU timers, keyed by their FNV-1a hash.
pub const GPU_TIMER_LABELS: [&str; 4] = [
    SW_QUEUE_LABEL,
    HW_QUEUE_LABEL,
    HW_EXECUTION_LABEL,
    COMMAND_BUFFER_LABEL,
];

pub fn label_key(label: &str) -> u64 {
    fnv1a_64(label.as_bytes())
}

/// The three stages of a GPU job: waiting in the software queue, waiting in the
/// hardware queue and executing.
pub fn gpu_job_timers(job: &GpuJob) -> Vec<TimerInfo> {
    let stages = [
        (
            SW_QUEUE_LABEL,
            job.amdgpu_cs_ioctl_time_ns,
            job.amdgpu_sched_run_job_time_ns,
        ),
        (
            HW_QUEUE_LABEL,
            job.amdgpu_sched_run_job_time_ns,
            job.gpu_hardware_start_time_ns,
        ),
        (
            HW_EXECUTION_LABEL,
            job.gpu_hardware_start_time_ns,
            job.dma_fence_signaled_time_ns,
        ),
    ];
    stages
        .into_iter()
        .filter_map(|(label, start, end)| {
            if end < start {
                warn!(
                    "Skipping \"{}\" of GPU job {} on tid {}: end {} before start {}",
                    label, job.seqno, job.tid, end, start
                );
                return None;
            }
            Some(TimerInfo {
                start,
                end,
                process_id: job.pid as i32,
                thread_id: job.tid as i32,
                depth: job.depth.max(0) as u32,
                processor: -1,
                timer_type: TimerType::GpuActivity as i32,
                user_data_key: label_key(label),
                timeline_hash: job.timeline_key,
                ..Default::default()
            })
        })
        .collect()
}

/// Extracts `N` from DXVK marker names of the form `DXVK__name#N`.
fn dxvk_group_id(text: &str) -> Option<u64> {
    static DXVK_MARKER: OnceLock<Regex> = OnceLock::new();
    let regex = DXVK_MARKER
        .get_or_init(|| Regex::new(r"^DXVK__[^#]*#(\d+)$").expect("DXVK marker regex is valid"));
    regex
        .captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|group| group.as_str().parse().ok())
}

/// Leftovers reported when a capture ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuCorrelationStats {
    pub unmatched_submissions: usize,
    pub unmatched_jobs: usize,
    pub skipped_timers: u64,
}

#[derive(Default)]
pub struct GpuQueueSubmissionProcessor {
    tid_to_submission_time_to_gpu_job: HashMap<u32, BTreeMap<u64, GpuJob>>,
    tid_to_post_submission_time_to_gpu_submission: HashMap<u32, BTreeMap<u64, GpuQueueSubmission>>,
    tid_to_post_submission_time_to_num_begin_markers: HashMap<u32, BTreeMap<u64, u32>>,
    skipped_timers: u64,
}

impl GpuQueueSubmissionProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the timers of the submission if its job was already seen.
    pub fn process_gpu_queue_submission(
        &mut self,
        submission: GpuQueueSubmission,
        strings: &InterningTable<String>,
        begin_capture_time_ns: u64,
    ) -> Vec<TimerInfo> {
        let Some(meta_info) = submission.meta_info.clone() else {
            warn!("Skipping GPU queue submission without meta info");
            return Vec::new();
        };
        let tid = meta_info.tid;
        let post_submission_time = meta_info.post_submission_cpu_timestamp;

        if submission.num_begin_markers > 0 {
            self.tid_to_post_submission_time_to_num_begin_markers
                .entry(tid)
                .or_default()
                .insert(post_submission_time, submission.num_begin_markers);
        }

        let Some(job_time) = self.find_matching_gpu_job(
            tid,
            meta_info.pre_submission_cpu_timestamp,
            post_submission_time,
        ) else {
            self.save_gpu_submission(tid, post_submission_time, submission);
            return Vec::new();
        };
        let job = self.tid_to_submission_time_to_gpu_job[&tid][&job_time].clone();

        let has_begin_markers = submission.num_begin_markers > 0;
        let timers = self.process_matching_pair(&submission, &job, strings, begin_capture_time_ns);
        if has_begin_markers && self.has_unprocessed_begin_markers(tid, post_submission_time) {
            // Ends of these markers will arrive in later submissions.
            self.save_gpu_submission(tid, post_submission_time, submission);
        } else {
            self.delete_saved_gpu_job(tid, job_time);
        }
        timers
    }

    /// Returns the timers of the job's submission if it was already seen.
    pub fn process_gpu_job(
        &mut self,
        job: &GpuJob,
        strings: &InterningTable<String>,
        begin_capture_time_ns: u64,
    ) -> Vec<TimerInfo> {
        let tid = job.tid;
        let Some(post_submission_time) =
            self.find_matching_gpu_submission(tid, job.amdgpu_cs_ioctl_time_ns)
        else {
            self.save_gpu_job(job.clone());
            return Vec::new();
        };
        let submission = self.tid_to_post_submission_time_to_gpu_submission[&tid]
            [&post_submission_time]
            .clone();

        let keep_job = self.has_unprocessed_begin_markers(tid, post_submission_time);
        if keep_job {
            self.save_gpu_job(job.clone());
        }
        let timers = self.process_matching_pair(&submission, job, strings, begin_capture_time_ns);
        if !self.has_unprocessed_begin_markers(tid, post_submission_time) {
            self.delete_saved_gpu_submission(tid, post_submission_time);
            if keep_job {
                self.delete_saved_gpu_job(tid, job.amdgpu_cs_ioctl_time_ns);
            }
        }
        timers
    }

    /// Drops everything still pending and reports what was left.
    pub fn finish(&mut self) -> GpuCorrelationStats {
        let mut stats = GpuCorrelationStats {
            skipped_timers: self.skipped_timers,
            ..Default::default()
        };
        for (tid, submissions) in &self.tid_to_post_submission_time_to_gpu_submission {
            for submission in submissions.values() {
                let meta_info = submission.meta_info.clone().unwrap_or_default();
                if self
                    .find_matching_gpu_job(
                        *tid,
                        meta_info.pre_submission_cpu_timestamp,
                        meta_info.post_submission_cpu_timestamp,
                    )
                    .is_none()
                {
                    stats.unmatched_submissions += 1;
                }
            }
        }
        for (tid, jobs) in &self.tid_to_submission_time_to_gpu_job {
            for &job_time in jobs.keys() {
                if self.find_matching_gpu_submission(*tid, job_time).is_none() {
                    stats.unmatched_jobs += 1;
                }
            }
        }
        if stats.unmatched_submissions > 0 || stats.unmatched_jobs > 0 {
            info!(
                "Dropping {} GPU queue submissions without a job; {} GPU jobs had no submission",
                stats.unmatched_submissions, stats.unmatched_jobs
            );
        }

        self.tid_to_submission_time_to_gpu_job.clear();
        self.tid_to_post_submission_time_to_gpu_submission.clear();
        self.tid_to_post_submission_time_to_num_begin_markers.clear();
        stats
    }

    pub fn num_saved_gpu_jobs(&self) -> usize {
        self.tid_to_submission_time_to_gpu_job
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    pub fn num_saved_gpu_submissions(&self) -> usize {
        self.tid_to_post_submission_time_to_gpu_submission
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    fn find_matching_gpu_job(
        &self,
        tid: u32,
        pre_submission_time: u64,
        post_submission_time: u64,
    ) -> Option<u64> {
        if pre_submission_time > post_submission_time {
            return None;
        }
        self.tid_to_submission_time_to_gpu_job
            .get(&tid)?
            .range(pre_submission_time..=post_submission_time)
            .next()
            .map(|(&job_time, _)| job_time)
    }

    fn find_matching_gpu_submission(&self, tid: u32, submission_time: u64) -> Option<u64> {
        let (&post_submission_time, submission) = self
            .tid_to_post_submission_time_to_gpu_submission
            .get(&tid)?
            .range(submission_time..)
            .next()?;
        let pre_submission_time = submission
            .meta_info
            .as_ref()
            .map(|meta_info| meta_info.pre_submission_cpu_timestamp)?;
        (pre_submission_time <= submission_time).then_some(post_submission_time)
    }

    fn has_unprocessed_begin_markers(&self, tid: u32, post_submission_time: u64) -> bool {
        self.tid_to_post_submission_time_to_num_begin_markers
            .get(&tid)
            .is_some_and(|counts| counts.contains_key(&post_submission_time))
    }

    fn save_gpu_job(&mut self, job: GpuJob) {
        self.tid_to_submission_time_to_gpu_job
            .entry(job.tid)
            .or_default()
            .insert(job.amdgpu_cs_ioctl_time_ns, job);
    }

    fn save_gpu_submission(
        &mut self,
        tid: u32,
        post_submission_time: u64,
        submission: GpuQueueSubmission,
    ) {
        self.tid_to_post_submission_time_to_gpu_submission
            .entry(tid)
            .or_default()
            .insert(post_submission_time, submission);
    }

    fn delete_saved_gpu_job(&mut self, tid: u32, job_time: u64) {
        if let Some(jobs) = self.tid_to_submission_time_to_gpu_job.get_mut(&tid) {
            jobs.remove(&job_time);
            if jobs.is_empty() {
                self.tid_to_submission_time_to_gpu_job.remove(&tid);
            }
        }
    }

    fn delete_saved_gpu_submission(&mut self, tid: u32, post_submission_time: u64) {
        if let Some(submissions) = self
            .tid_to_post_submission_time_to_gpu_submission
            .get_mut(&tid)
        {
            submissions.remove(&post_submission_time);
            if submissions.is_empty() {
                self.tid_to_post_submission_time_to_gpu_submission.remove(&tid);
            }
        }
    }

    /// One of the markers begun in the submission `begin_meta_info` has ended.
    /// Once all of them have, the submission and its job are forgotten.
    fn decrement_unprocessed_begin_markers(
        &mut self,
        begin_meta_info: &GpuQueueSubmissionMetaInfo,
    ) {
        let tid = begin_meta_info.tid;
        let post_submission_time = begin_meta_info.post_submission_cpu_timestamp;
        let Some(counts) = self
            .tid_to_post_submission_time_to_num_begin_markers
            .get_mut(&tid)
        else {
            debug!("No outstanding begin markers for tid {}", tid);
            return;
        };
        let Some(count) = counts.get_mut(&post_submission_time) else {
            debug!(
                "No outstanding begin markers for the submission of tid {} at {}",
                tid, post_submission_time
            );
            return;
        };
        *count = count.saturating_sub(1);
        if *count > 0 {
            return;
        }
        counts.remove(&post_submission_time);
        if counts.is_empty() {
            self.tid_to_post_submission_time_to_num_begin_markers.remove(&tid);
        }

        // A begin submission still waiting for its job is processed when the job arrives.
        if let Some(job_time) = self.find_matching_gpu_job(
            tid,
            begin_meta_info.pre_submission_cpu_timestamp,
            post_submission_time,
        ) {
            self.delete_saved_gpu_job(tid, job_time);
            self.delete_saved_gpu_submission(tid, post_submission_time);
        }
    }

    fn process_matching_pair(
        &mut self,
        submission: &GpuQueueSubmission,
        job: &GpuJob,
        strings: &InterningTable<String>,
        begin_capture_time_ns: u64,
    ) -> Vec<TimerInfo> {
        let meta_info = submission.meta_info.clone().unwrap_or_default();
        let mut timers = Vec::new();

        let mut first_command_buffer_begin = None;
        for command_buffer in submission
            .submit_infos
            .iter()
            .flat_map(|submit_info| submit_info.command_buffers.iter())
        {
            // Recorded before the capture started.
            let begin = if command_buffer.begin_gpu_timestamp_ns == 0 {
                begin_capture_time_ns
            } else {
                command_buffer.begin_gpu_timestamp_ns
            };
            first_command_buffer_begin.get_or_insert(begin);
            if command_buffer.end_gpu_timestamp_ns < begin {
                warn!(
                    "Skipping command buffer of tid {}: end {} before begin {}",
                    meta_info.tid, command_buffer.end_gpu_timestamp_ns, begin
                );
                self.skipped_timers += 1;
                continue;
            }
            timers.push(TimerInfo {
                start: begin,
                end: command_buffer.end_gpu_timestamp_ns,
                process_id: job.pid as i32,
                thread_id: job.tid as i32,
                depth: job.depth.max(0) as u32,
                processor: -1,
                timer_type: TimerType::GpuCommandBuffer as i32,
                user_data_key: label_key(COMMAND_BUFFER_LABEL),
                timeline_hash: job.timeline_key,
                ..Default::default()
            });
        }

        let mut ended_begin_markers = Vec::new();
        for marker in &submission.completed_markers {
            if let Some(timer) = self.marker_timer(
                marker,
                &meta_info,
                job,
                first_command_buffer_begin,
                strings,
                &mut ended_begin_markers,
            ) {
                timers.push(timer);
            }
        }
        for begin_meta_info in &ended_begin_markers {
            self.decrement_unprocessed_begin_markers(begin_meta_info);
        }
        timers
    }

    fn marker_timer(
        &mut self,
        marker: &GpuDebugMarker,
        meta_info: &GpuQueueSubmissionMetaInfo,
        job: &GpuJob,
        first_command_buffer_begin: Option<u64>,
        strings: &InterningTable<String>,
        ended_begin_markers: &mut Vec<GpuQueueSubmissionMetaInfo>,
    ) -> Option<TimerInfo> {
        let (begin, thread_id) = match &marker.begin_marker {
            Some(begin_marker) => {
                let begin_meta_info = begin_marker.meta_info.clone().unwrap_or_default();
                let thread_id = if begin_meta_info.tid == meta_info.tid {
                    meta_info.tid as i32
                } else {
                    UNKNOWN_THREAD_ID
                };
                ended_begin_markers.push(begin_meta_info);
                (begin_marker.gpu_timestamp_ns, thread_id)
            }
            None => match first_command_buffer_begin {
                Some(begin) => (begin, meta_info.tid as i32),
                None => {
                    warn!(
                        "Skipping debug marker of tid {} without begin and without command buffers",
                        meta_info.tid
                    );
                    self.skipped_timers += 1;
                    return None;
                }
            },
        };

        if marker.end_gpu_timestamp_ns < begin {
            warn!(
                "Skipping debug marker of tid {}: end {} before begin {}",
                meta_info.tid, marker.end_gpu_timestamp_ns, begin
            );
            self.skipped_timers += 1;
            return None;
        }

        let group_id = strings
            .with_payload(marker.text_key, |text| dxvk_group_id(text))
            .flatten()
            .unwrap_or(0);
        Some(TimerInfo {
            start: begin,
            end: marker.end_gpu_timestamp_ns,
            process_id: meta_info.pid as i32,
            thread_id,
            depth: marker.depth.max(0) as u32,
            processor: -1,
            timer_type: TimerType::GpuDebugMarker as i32,
            user_data_key: marker.text_key,
            timeline_hash: job.timeline_key,
            color: marker.color.clone(),
            group_id,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protos::capture::{GpuCommandBuffer, GpuDebugMarkerBeginInfo, GpuSubmitInfo};

    const TIMELINE_KEY: u64 = 77;

    fn job(tid: u32, t_ioctl: u64) -> GpuJob {
        GpuJob {
            pid: 1,
            tid,
            context: 1,
            seqno: 1,
            timeline_key: TIMELINE_KEY,
            depth: 0,
            amdgpu_cs_ioctl_time_ns: t_ioctl,
            amdgpu_sched_run_job_time_ns: t_ioctl + 10,
            gpu_hardware_start_time_ns: t_ioctl + 100,
            dma_fence_signaled_time_ns: t_ioctl + 400,
        }
    }

    fn meta(tid: u32, pre: u64, post: u64) -> GpuQueueSubmissionMetaInfo {
        GpuQueueSubmissionMetaInfo {
            tid,
            pid: 1,
            pre_submission_cpu_timestamp: pre,
            post_submission_cpu_timestamp: post,
        }
    }

    fn submission(
        tid: u32,
        pre: u64,
        post: u64,
        command_buffers: Vec<(u64, u64)>,
        completed_markers: Vec<GpuDebugMarker>,
        num_begin_markers: u32,
    ) -> GpuQueueSubmission {
        GpuQueueSubmission {
            meta_info: Some(meta(tid, pre, post)),
            submit_infos: vec![GpuSubmitInfo {
                command_buffers: command_buffers
                    .into_iter()
                    .map(|(begin, end)| GpuCommandBuffer {
                        begin_gpu_timestamp_ns: begin,
                        end_gpu_timestamp_ns: end,
                    })
                    .collect(),
            }],
            completed_markers,
            num_begin_markers,
        }
    }

    fn straddling_marker(
        text_key: u64,
        begin: GpuQueueSubmissionMetaInfo,
        begin_ts: u64,
        end: u64,
    ) -> GpuDebugMarker {
        GpuDebugMarker {
            text_key,
            color: None,
            depth: 0,
            end_gpu_timestamp_ns: end,
            begin_marker: Some(GpuDebugMarkerBeginInfo {
                meta_info: Some(begin),
                gpu_timestamp_ns: begin_ts,
            }),
        }
    }

    fn spans(timers: &[TimerInfo]) -> Vec<(u64, u64)> {
        timers.iter().map(|t| (t.start, t.end)).collect()
    }

    #[test]
    fn test_job_then_submission_matches() {
        let strings = InterningTable::new();
        let mut processor = GpuQueueSubmissionProcessor::new();

        assert!(processor.process_gpu_job(&job(7, 500), &strings, 0).is_empty());
        let timers = processor.process_gpu_queue_submission(
            submission(7, 400, 600, vec![(610, 890)], vec![], 0),
            &strings,
            0,
        );

        assert_eq!(spans(&timers), vec![(610, 890)]);
        assert_eq!(timers[0].timeline_hash, TIMELINE_KEY);
        assert_eq!(timers[0].timer_type, TimerType::GpuCommandBuffer as i32);
        assert_eq!(timers[0].user_data_key, label_key(COMMAND_BUFFER_LABEL));
        assert_eq!(processor.num_saved_gpu_jobs(), 0);
        assert_eq!(processor.num_saved_gpu_submissions(), 0);
    }

    #[test]
    fn test_submission_then_job_matches() {
        let strings = InterningTable::new();
        let mut processor = GpuQueueSubmissionProcessor::new();

        assert!(processor
            .process_gpu_queue_submission(
                submission(7, 400, 600, vec![(610, 890), (900, 950)], vec![], 0),
                &strings,
                0
            )
            .is_empty());
        let timers = processor.process_gpu_job(&job(7, 500), &strings, 0);

        assert_eq!(spans(&timers), vec![(610, 890), (900, 950)]);
        assert_eq!(processor.num_saved_gpu_submissions(), 0);
        assert_eq!(processor.num_saved_gpu_jobs(), 0);
    }

    #[test]
    fn test_matching_bounds_are_inclusive() {
        let strings = InterningTable::new();
        for t_ioctl in [400, 600] {
            let mut processor = GpuQueueSubmissionProcessor::new();
            processor.process_gpu_job(&job(7, t_ioctl), &strings, 0);
            let timers = processor.process_gpu_queue_submission(
                submission(7, 400, 600, vec![(610, 890)], vec![], 0),
                &strings,
                0,
            );
            assert_eq!(timers.len(), 1, "t_ioctl={t_ioctl}");
        }
    }

    #[test]
    fn test_no_match_outside_window_or_other_thread() {
        let strings = InterningTable::new();
        for (tid, t_ioctl) in [(7, 399), (7, 601), (8, 500)] {
            let mut processor = GpuQueueSubmissionProcessor::new();
            processor.process_gpu_job(&job(tid, t_ioctl), &strings, 0);
            let timers = processor.process_gpu_queue_submission(
                submission(7, 400, 600, vec![(610, 890)], vec![], 0),
                &strings,
                0,
            );
            assert!(timers.is_empty(), "tid={tid} t_ioctl={t_ioctl}");
            assert_eq!(processor.num_saved_gpu_jobs(), 1);
            assert_eq!(processor.num_saved_gpu_submissions(), 1);

            let stats = processor.finish();
            assert_eq!(stats.unmatched_jobs, 1);
            assert_eq!(stats.unmatched_submissions, 1);
            assert_eq!(processor.num_saved_gpu_jobs(), 0);
        }
    }

    #[test]
    fn test_straddling_marker() {
        let strings = InterningTable::new();
        strings.try_insert(5, "Frame".to_string()).unwrap();
        let mut processor = GpuQueueSubmissionProcessor::new();

        processor.process_gpu_job(&job(7, 150), &strings, 0);
        let timers_a = processor.process_gpu_queue_submission(
            submission(7, 100, 200, vec![], vec![], 1),
            &strings,
            0,
        );
        assert!(timers_a.is_empty());
        assert_eq!(processor.num_saved_gpu_submissions(), 1);
        assert_eq!(processor.num_saved_gpu_jobs(), 1);

        processor.process_gpu_job(&job(7, 350), &strings, 0);
        let timers_b = processor.process_gpu_queue_submission(
            submission(
                7,
                300,
                400,
                vec![],
                vec![straddling_marker(5, meta(7, 100, 200), 650, 800)],
                0,
            ),
            &strings,
            0,
        );

        assert_eq!(spans(&timers_b), vec![(650, 800)]);
        assert_eq!(timers_b[0].user_data_key, 5);
        assert_eq!(timers_b[0].timer_type, TimerType::GpuDebugMarker as i32);
        assert_eq!(timers_b[0].timeline_hash, TIMELINE_KEY);
        assert_eq!(processor.num_saved_gpu_submissions(), 0);
        assert_eq!(processor.num_saved_gpu_jobs(), 0);
    }

    #[test]
    fn test_straddling_marker_when_jobs_arrive_last() {
        let strings = InterningTable::new();
        let mut processor = GpuQueueSubmissionProcessor::new();

        processor.process_gpu_queue_submission(
            submission(7, 100, 200, vec![(120, 130)], vec![], 1),
            &strings,
            0,
        );
        let timers_a = processor.process_gpu_job(&job(7, 150), &strings, 0);
        assert_eq!(spans(&timers_a), vec![(120, 130)]);
        assert_eq!(processor.num_saved_gpu_submissions(), 1);

        processor.process_gpu_queue_submission(
            submission(
                7,
                300,
                400,
                vec![],
                vec![straddling_marker(5, meta(7, 100, 200), 650, 800)],
                0,
            ),
            &strings,
            0,
        );
        let timers_b = processor.process_gpu_job(&job(7, 350), &strings, 0);
        assert_eq!(spans(&timers_b), vec![(650, 800)]);
        assert_eq!(processor.num_saved_gpu_submissions(), 0);
        assert_eq!(processor.num_saved_gpu_jobs(), 0);
    }

    #[test]
    fn test_marker_without_begin_uses_first_command_buffer() {
        let strings = InterningTable::new();
        let mut processor = GpuQueueSubmissionProcessor::new();
        let marker = GpuDebugMarker {
            text_key: 3,
            color: None,
            depth: 1,
            end_gpu_timestamp_ns: 700,
            begin_marker: None,
        };
        processor.process_gpu_job(&job(7, 500), &strings, 0);
        let timers = processor.process_gpu_queue_submission(
            submission(7, 400, 600, vec![(610, 690)], vec![marker.clone()], 0),
            &strings,
            0,
        );
        assert_eq!(spans(&timers), vec![(610, 690), (610, 700)]);
        assert_eq!(timers[1].depth, 1);

        // Without command buffers the marker has no anchor and is skipped.
        processor.process_gpu_job(&job(7, 1500), &strings, 0);
        let timers = processor.process_gpu_queue_submission(
            submission(7, 1400, 1600, vec![], vec![marker], 0),
            &strings,
            0,
        );
        assert!(timers.is_empty());
        assert_eq!(processor.finish().skipped_timers, 1);
    }

    #[test]
    fn test_end_before_begin_is_skipped() {
        let strings = InterningTable::new();
        let mut processor = GpuQueueSubmissionProcessor::new();
        processor.process_gpu_job(&job(7, 500), &strings, 0);
        let timers = processor.process_gpu_queue_submission(
            submission(7, 400, 600, vec![(890, 610), (900, 950)], vec![], 0),
            &strings,
            0,
        );
        assert_eq!(spans(&timers), vec![(900, 950)]);
    }

    #[test]
    fn test_command_buffer_begun_before_capture() {
        let strings = InterningTable::new();
        let mut processor = GpuQueueSubmissionProcessor::new();
        processor.process_gpu_job(&job(7, 500), &strings, 0);
        let timers = processor.process_gpu_queue_submission(
            submission(7, 400, 600, vec![(0, 890)], vec![], 0),
            &strings,
            300,
        );
        assert_eq!(spans(&timers), vec![(300, 890)]);
    }

    #[test]
    fn test_dxvk_group_id() {
        assert_eq!(dxvk_group_id("DXVK__vkCmdDraw#42"), Some(42));
        assert_eq!(dxvk_group_id("DXVK__#7"), Some(7));
        assert_eq!(dxvk_group_id("vkCmdDraw#42"), None);
        assert_eq!(dxvk_group_id("DXVK__draw"), None);

        let strings = InterningTable::new();
        strings.try_insert(9, "DXVK__pass#12".to_string()).unwrap();
        let mut processor = GpuQueueSubmissionProcessor::new();
        processor.process_gpu_job(&job(7, 500), &strings, 0);
        let marker = straddling_marker(9, meta(7, 400, 600), 620, 640);
        let timers = processor.process_gpu_queue_submission(
            submission(7, 400, 600, vec![(610, 890)], vec![marker], 0),
            &strings,
            0,
        );
        assert_eq!(timers[1].group_id, 12);
    }

    #[test]
    fn test_gpu_job_timers() {
        let timers = gpu_job_timers(&job(7, 500));
        assert_eq!(spans(&timers), vec![(500, 510), (510, 600), (600, 900)]);
        let labels: Vec<_> = timers.iter().map(|t| t.user_data_key).collect();
        assert_eq!(
            labels,
            vec![
                label_key(SW_QUEUE_LABEL),
                label_key(HW_QUEUE_LABEL),
                label_key(HW_EXECUTION_LABEL)
            ]
        );
        assert!(timers.iter().all(|t| {
            t.timer_type == TimerType::GpuActivity as i32 && t.timeline_hash == TIMELINE_KEY
        }));
    }
}

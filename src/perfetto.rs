//! Conversion of a loaded capture into a Perfetto trace.
//!
//! Function calls and API scopes land on thread tracks below a process track.
//! Core activity, GPU timelines and async scopes get their own top level track,
//! with one child track per depth so overlapping slices stay separate.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use perfetto_protos::process_descriptor::ProcessDescriptor;
use perfetto_protos::thread_descriptor::ThreadDescriptor;
use perfetto_protos::trace::Trace;
use perfetto_protos::trace_packet::TracePacket;
use perfetto_protos::track_descriptor::TrackDescriptor;
use perfetto_protos::track_event::track_event::Type;
use perfetto_protos::track_event::TrackEvent;
use protobuf::Message;

use crate::capture_data::{CaptureData, TrackKey};
use crate::protos::capture_data::TimerInfo;

const SEQUENCE_ID: u32 = 1;

#[derive(Default)]
struct TrackAllocator {
    next_uuid: u64,
    process_uuids: HashMap<i32, u64>,
    child_uuids: HashMap<(u64, u32), u64>,
    descriptors: Vec<TracePacket>,
}

impl TrackAllocator {
    fn alloc_uuid(&mut self) -> u64 {
        self.next_uuid += 1;
        self.next_uuid
    }

    fn push_descriptor(&mut self, desc: TrackDescriptor) {
        let mut packet = TracePacket::default();
        packet.set_track_descriptor(desc);
        self.descriptors.push(packet);
    }

    fn process_track(&mut self, capture: &CaptureData, pid: i32) -> u64 {
        if let Some(uuid) = self.process_uuids.get(&pid) {
            return *uuid;
        }
        let uuid = self.alloc_uuid();
        let name = capture
            .capture_started()
            .filter(|started| started.process_id == pid)
            .map(|started| started.process_name.clone());

        let mut desc = TrackDescriptor::default();
        desc.set_uuid(uuid);
        let mut process = ProcessDescriptor::default();
        process.set_pid(pid);
        if let Some(n) = name {
            desc.set_name(n.clone());
            process.set_process_name(n);
        }
        desc.process = Some(process).into();
        self.push_descriptor(desc);
        self.process_uuids.insert(pid, uuid);
        uuid
    }

    fn thread_track(&mut self, capture: &CaptureData, pid: i32, tid: i32) -> u64 {
        self.process_track(capture, pid);
        let uuid = self.alloc_uuid();
        let mut desc = TrackDescriptor::default();
        desc.set_uuid(uuid);
        let mut thread = ThreadDescriptor::default();
        thread.set_pid(pid);
        thread.set_tid(tid);
        if let Some(name) = capture.thread_name(tid) {
            desc.set_name(name.to_string());
            thread.set_thread_name(name.to_string());
        }
        desc.thread = Some(thread).into();
        self.push_descriptor(desc);
        uuid
    }

    fn named_track(&mut self, name: String) -> u64 {
        let uuid = self.alloc_uuid();
        let mut desc = TrackDescriptor::default();
        desc.set_uuid(uuid);
        desc.set_name(name);
        self.push_descriptor(desc);
        uuid
    }

    fn depth_track(&mut self, parent_uuid: u64, depth: u32) -> u64 {
        if let Some(uuid) = self.child_uuids.get(&(parent_uuid, depth)) {
            return *uuid;
        }
        let uuid = self.alloc_uuid();
        let mut desc = TrackDescriptor::default();
        desc.set_uuid(uuid);
        desc.set_parent_uuid(parent_uuid);
        desc.set_name(format!("depth {}", depth));
        self.push_descriptor(desc);
        self.child_uuids.insert((parent_uuid, depth), uuid);
        uuid
    }
}

fn slice_packets(track_uuid: u64, name: String, timer: &TimerInfo) -> [TracePacket; 2] {
    let mut begin_event = TrackEvent::default();
    begin_event.set_type(Type::TYPE_SLICE_BEGIN);
    begin_event.set_track_uuid(track_uuid);
    begin_event.set_name(name);

    let mut begin_packet = TracePacket::default();
    begin_packet.set_timestamp(timer.start);
    begin_packet.set_track_event(begin_event);
    begin_packet.set_trusted_packet_sequence_id(SEQUENCE_ID);

    let mut end_event = TrackEvent::default();
    end_event.set_type(Type::TYPE_SLICE_END);
    end_event.set_track_uuid(track_uuid);

    let mut end_packet = TracePacket::default();
    end_packet.set_timestamp(timer.end);
    end_packet.set_track_event(end_event);
    end_packet.set_trusted_packet_sequence_id(SEQUENCE_ID);

    [begin_packet, end_packet]
}

pub fn capture_to_trace(capture: &CaptureData) -> Trace {
    let mut tracks = TrackAllocator::default();
    let mut slices: Vec<TracePacket> = Vec::new();

    for (key, timers) in capture.timers_by_track() {
        let (track_uuid, split_by_depth) = match key {
            TrackKey::Thread {
                process_id,
                thread_id,
            } => (tracks.thread_track(capture, *process_id, *thread_id), false),
            TrackKey::Core(core) => (tracks.named_track(format!("Core {}", core)), true),
            TrackKey::GpuTimeline(timeline) => {
                let name = capture
                    .string(*timeline)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("GPU timeline {:#x}", timeline));
                (tracks.named_track(name), true)
            }
            TrackKey::AsyncScope(name_key) => {
                let name = capture
                    .string(*name_key)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("async {:#x}", name_key));
                (tracks.named_track(name), true)
            }
        };
        for timer in timers {
            let uuid = if split_by_depth {
                tracks.depth_track(track_uuid, timer.depth)
            } else {
                track_uuid
            };
            slices.extend(slice_packets(uuid, capture.timer_name(timer), timer));
        }
    }

    // Ends are emitted right after their begins; a stable sort keeps that order
    // for slices that end exactly when the next one starts.
    slices.sort_by_key(|packet| packet.timestamp());

    let mut trace = Trace::default();
    trace.packet.extend(tracks.descriptors);
    trace.packet.extend(slices);
    trace
}

pub fn export_capture(capture: &CaptureData, output: &Path) -> Result<()> {
    let trace = capture_to_trace(capture);
    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    trace
        .write_to_writer(&mut writer)
        .with_context(|| format!("Failed to write trace to {}", output.display()))?;
    writer.flush()?;
    info!(
        "Wrote {} trace packets to {}",
        trace.packet.len(),
        output.display()
    );
    Ok(())
}

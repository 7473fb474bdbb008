//! Optional per-dispatch GPU timing
//!
//! Each compute pass writes a begin and an end timestamp into a query set.
//! Timing is off unless the device was created with
//! [`wgpu::Features::TIMESTAMP_QUERY`] and the caller enables it.

use std::sync::mpsc;
use std::sync::Arc;

use crate::{Error, Result};

/// Average GPU time of every dispatch of one kernel since the last collection
#[derive(Debug, Clone, PartialEq)]
pub struct PassTiming {
    pub label: &'static str,
    pub dispatches: u32,
    pub total_ms: f64,
}

impl PassTiming {
    pub fn average_ms(&self) -> f64 {
        if self.dispatches == 0 {
            0.0
        } else {
            self.total_ms / self.dispatches as f64
        }
    }
}

/// Fold raw begin/end timestamp pairs into per-label totals, keeping the
/// order in which labels first appeared. `period` is nanoseconds per tick.
pub fn summarize(labels: &[&'static str], timestamps: &[u64], period: f32) -> Vec<PassTiming> {
    let mut timings: Vec<PassTiming> = Vec::new();
    for (label, pair) in labels.iter().zip(timestamps.chunks_exact(2)) {
        // Disjoint or reordered queries come back as end < begin
        let ticks = pair[1].saturating_sub(pair[0]);
        let ms = ticks as f64 * period as f64 / 1_000_000.0;
        match timings.iter_mut().find(|t| t.label == *label) {
            Some(timing) => {
                timing.dispatches += 1;
                timing.total_ms += ms;
            }
            None => timings.push(PassTiming {
                label: *label,
                dispatches: 1,
                total_ms: ms,
            }),
        }
    }
    timings
}

pub struct PassTimer {
    device: Arc<wgpu::Device>,
    query_set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    staging: wgpu::Buffer,
    labels: Vec<&'static str>,
    capacity: u32,
}

impl PassTimer {
    /// Dispatches timed between two collections; later ones go untimed.
    pub const MAX_PASSES: u32 = 256;

    /// `None` when the device cannot write timestamps.
    pub fn new(device: Arc<wgpu::Device>) -> Option<Self> {
        if !device.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
            log::warn!("Timestamp queries not supported; pass timing stays off");
            return None;
        }
        let count = Self::MAX_PASSES * 2;
        let size = count as u64 * std::mem::size_of::<u64>() as u64;

        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("penumbra-pass-timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count,
        });
        let resolve = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("penumbra-timestamp-resolve"),
            size,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("penumbra-timestamp-staging"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        log::info!("GPU pass timing enabled ({} passes per collection)", Self::MAX_PASSES);
        Some(Self {
            device,
            query_set,
            resolve,
            staging,
            labels: Vec::new(),
            capacity: Self::MAX_PASSES,
        })
    }

    pub fn pending(&self) -> usize {
        self.labels.len()
    }

    /// Timestamp writes for the next compute pass, if there is room left.
    pub fn begin(&mut self, label: &'static str) -> Option<wgpu::ComputePassTimestampWrites<'_>> {
        let slot = self.labels.len() as u32;
        if slot >= self.capacity {
            return None;
        }
        self.labels.push(label);
        Some(wgpu::ComputePassTimestampWrites {
            query_set: &self.query_set,
            beginning_of_pass_write_index: Some(slot * 2),
            end_of_pass_write_index: Some(slot * 2 + 1),
        })
    }

    /// Resolve every recorded pass and reset. Work that wrote the
    /// timestamps must already be submitted on `queue`.
    pub fn collect(&mut self, queue: &wgpu::Queue) -> Result<Vec<PassTiming>> {
        if self.labels.is_empty() {
            return Ok(Vec::new());
        }
        let count = self.labels.len() as u32 * 2;
        let size = count as u64 * std::mem::size_of::<u64>() as u64;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("penumbra-timestamp-encoder"),
        });
        encoder.resolve_query_set(&self.query_set, 0..count, &self.resolve, 0);
        encoder.copy_buffer_to_buffer(&self.resolve, 0, &self.staging, 0, size);
        queue.submit(std::iter::once(encoder.finish()));

        let slice = self.staging.slice(..size);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| Error::Readback("timestamp map callback channel dropped".into()))?
            .map_err(|err| Error::Readback(err.to_string()))?;

        let timestamps = {
            let data = slice.get_mapped_range();
            data.chunks_exact(8)
                .map(|bytes| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(bytes);
                    u64::from_le_bytes(raw)
                })
                .collect::<Vec<_>>()
        };
        self.staging.unmap();

        let timings = summarize(&self.labels, &timestamps, queue.get_timestamp_period());
        self.labels.clear();
        for timing in &timings {
            log::debug!(
                "GPU pass `{}`: {:.3} ms average over {} dispatches",
                timing.label,
                timing.average_ms(),
                timing.dispatches
            );
        }
        Ok(timings)
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Client-owned frame buffers.
//!
//! A [`Frame`] accumulates one rotation of sensor data. The client allocates
//! it once with [`Frame::with_capacity`] and lends it mutably to the driver
//! for each packet; the driver only writes into the pre-allocated buffers
//! and flips [`Frame::scan_complete`] when the rotation closes. After
//! consuming a complete frame the client calls [`Frame::reset`] and keeps
//! reusing the same allocation.

use crate::lidar::PointWriter;

/// One laser channel's reading within one block of one packet, exactly as
/// decoded from the wire (plus the optional fire-time azimuth adjustment).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RawSample {
    /// Raw distance in sensor units (scale in [`Frame::distance_unit`]).
    pub distance: u16,
    /// Block azimuth in centidegrees; fractional once fire-time corrected.
    pub azimuth: f32,
    pub reflectivity: u8,
    pub confidence: u8,
}

/// An accumulating, pre-allocated buffer representing one (possibly partial)
/// rotation.
///
/// Samples and points are indexed by
/// `packet_index * per_points_num + block_id * laser_num + channel_id`.
/// Output slots skipped by FOV clipping are left untouched, so a frame
/// reused across rotations without clearing carries stale points in those
/// slots.
pub struct Frame<P> {
    pub(crate) samples: Vec<RawSample>,
    pub(crate) points: Vec<P>,
    pub(crate) sensor_timestamp: Vec<u64>,
    /// Packets decoded into this frame so far.
    pub packet_num: usize,
    /// Blocks per packet, as reported by the packet header.
    pub block_num: usize,
    /// Channels per block, as reported by the packet header.
    pub laser_num: usize,
    /// Samples per packet (`block_num * laser_num`).
    pub per_points_num: usize,
    /// Metres per raw distance unit.
    pub distance_unit: f32,
    /// Motor speed in RPM from the most recent packet.
    pub spin_speed: u16,
    /// Shutdown/work-mode flag from the most recent packet tail.
    pub work_mode: u8,
    /// Set when the frame-split detector sees the rotation close.
    pub scan_complete: bool,
    /// Host monotonic time of the most recent decode, microseconds.
    pub host_timestamp: u64,
}

impl<P: PointWriter> Frame<P> {
    /// Allocate a frame able to hold `max_packets` packets of up to
    /// `max_points_per_packet` samples each. No further allocation happens
    /// during decoding.
    pub fn with_capacity(max_packets: usize, max_points_per_packet: usize) -> Self {
        let capacity = max_packets * max_points_per_packet;
        Self {
            samples: vec![RawSample::default(); capacity],
            points: vec![P::default(); capacity],
            sensor_timestamp: vec![0; max_packets],
            packet_num: 0,
            block_num: 0,
            laser_num: 0,
            per_points_num: 0,
            distance_unit: 0.0,
            spin_speed: 0,
            work_mode: 0,
            scan_complete: false,
            host_timestamp: 0,
        }
    }

    /// Number of valid samples accumulated so far.
    pub fn len(&self) -> usize {
        (self.packet_num * self.per_points_num).min(self.samples.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of packets this frame can hold.
    pub fn max_packets(&self) -> usize {
        self.sensor_timestamp.len()
    }

    /// Raw samples decoded so far.
    pub fn samples(&self) -> &[RawSample] {
        &self.samples[..self.len()]
    }

    /// Computed Cartesian points for the samples decoded so far.
    ///
    /// Slots skipped by FOV clipping retain their previous contents.
    pub fn points(&self) -> &[P] {
        &self.points[..self.len()]
    }

    /// Per-packet timestamps (device or host receive time, per the driver
    /// configuration), in epoch microseconds.
    pub fn sensor_timestamps(&self) -> &[u64] {
        &self.sensor_timestamp[..self.packet_num.min(self.sensor_timestamp.len())]
    }

    /// Rewind the frame for the next rotation. Buffer contents are not
    /// cleared; only the write cursor and completion flag are.
    pub fn reset(&mut self) {
        self.packet_num = 0;
        self.scan_complete = false;
        self.host_timestamp = 0;
    }
}

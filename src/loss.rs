// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Packet-loss and timestamp-disorder accounting.
//!
//! Purely observational: the counters never block or alter decoding. The
//! caller polls them to decide whether the network path or the sensor clock
//! is misbehaving.

/// Device timestamps further apart than this count as a delivery gap.
const MAX_PACKET_GAP_US: u64 = 100_000;

/// Minimum sensor-time spacing between warning logs.
const REPORT_INTERVAL_US: u64 = 1_000_000;

/// Sequence-number and device-timestamp continuity counters.
#[derive(Debug, Default)]
pub struct LossStats {
    last_seqnum: Option<u32>,
    last_timestamp: Option<u64>,
    total_packets: u64,
    lost_packets: u64,
    disordered_packets: u64,
    last_report: u64,
}

impl LossStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets observed (decoded) so far.
    pub fn total_packets(&self) -> u64 {
        self.total_packets
    }

    /// Packets missed, inferred from sequence-number gaps.
    pub fn lost_packets(&self) -> u64 {
        self.lost_packets
    }

    /// Packets whose device timestamp ran backwards or arrived after an
    /// excessive gap.
    pub fn disordered_packets(&self) -> u64 {
        self.disordered_packets
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn update_seqnum(&mut self, seqnum: u32) {
        if let Some(last) = self.last_seqnum {
            let gap = seqnum.wrapping_sub(last).wrapping_sub(1);
            if gap > 0 {
                self.lost_packets += gap as u64;
            }
        }
        self.total_packets += 1;
        self.last_seqnum = Some(seqnum);
    }

    pub(crate) fn update_timestamp(&mut self, timestamp: u64) {
        if let Some(last) = self.last_timestamp {
            if timestamp < last || timestamp - last > MAX_PACKET_GAP_US {
                self.disordered_packets += 1;
            }
        }
        self.last_timestamp = Some(timestamp);
        self.maybe_report(timestamp);
    }

    fn maybe_report(&mut self, now: u64) {
        if self.lost_packets == 0 && self.disordered_packets == 0 {
            return;
        }
        if now.saturating_sub(self.last_report) < REPORT_INTERVAL_US {
            return;
        }
        log::warn!(
            "packet loss: {} lost, {} disordered of {} received",
            self.lost_packets,
            self.disordered_packets,
            self.total_packets
        );
        self.last_report = now;
    }
}

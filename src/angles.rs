// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Fixed-point angle arithmetic and calibration tables.
//!
//! Azimuths arrive on the wire as `u16` centidegrees (0.01°). All geometry
//! runs in "fine units" of 1/256 centidegree so that per-channel calibration
//! offsets and fire-time corrections keep sub-centidegree precision without
//! accumulating floating-point drift over a rotation. Only the final
//! Cartesian conversion touches floating point, through a sine/cosine lookup
//! spanning every representable fine angle.

use crate::lidar::Error;
use std::sync::OnceLock;

/// Centidegrees per degree (wire azimuth resolution).
pub const RESOLUTION: i32 = 100;

/// Fine units per centidegree.
pub const FINE_RESOLUTION: i32 = 256;

/// Fine units per degree.
pub const ALL_FINE_RESOLUTION: i32 = RESOLUTION * FINE_RESOLUTION;

/// Fine units in one full rotation.
pub const CIRCLE: i32 = 360 * ALL_FINE_RESOLUTION;

pub(crate) const MICROSECOND_TO_SECOND: f64 = 1_000_000.0;

/// Wrap a fine-unit angle into `[0, CIRCLE)`.
#[inline]
pub(crate) fn wrap_fine(angle: i32) -> i32 {
    ((angle % CIRCLE) + CIRCLE) % CIRCLE
}

/// Short-range spot-distortion bucket for a metric distance, if any.
///
/// Eight buckets of 0.5 m covering [0.25 m, 4.25 m); the last bucket absorbs
/// the rounding edge.
#[inline]
pub(crate) fn spot_bucket(distance: f32) -> Option<usize> {
    if (0.25..4.25).contains(&distance) {
        Some((((distance - 0.25) / 0.5) as usize).min(7))
    } else {
        None
    }
}

/// Process-wide sine/cosine lookup indexed by fine-unit angle.
///
/// One entry per fine unit over the full rotation, built once on first use
/// and shared by every driver instance. The hot path then indexes instead of
/// calling libm per point.
pub struct AngleLut {
    sin: Vec<f32>,
    cos: Vec<f32>,
}

impl AngleLut {
    fn build() -> Self {
        let mut sin = Vec::with_capacity(CIRCLE as usize);
        let mut cos = Vec::with_capacity(CIRCLE as usize);
        for fine in 0..CIRCLE {
            let radians = (fine as f64 / ALL_FINE_RESOLUTION as f64).to_radians();
            sin.push(radians.sin() as f32);
            cos.push(radians.cos() as f32);
        }
        Self { sin, cos }
    }

    /// Shared table, built on first access.
    pub fn global() -> &'static AngleLut {
        static LUT: OnceLock<AngleLut> = OnceLock::new();
        LUT.get_or_init(Self::build)
    }

    /// Sine of a fine-unit angle in `[0, CIRCLE)`.
    #[inline]
    pub fn sin(&self, fine: i32) -> f32 {
        self.sin[fine as usize]
    }

    /// Cosine of a fine-unit angle in `[0, CIRCLE)`.
    #[inline]
    pub fn cos(&self, fine: i32) -> f32 {
        self.cos[fine as usize]
    }
}

/// Per-channel angle calibration, loaded from the sensor's correction file
/// by an external collaborator and handed in fully parsed.
///
/// Offsets are stored in degrees as shipped by the sensor and converted to
/// wrapped fine units at lookup time.
#[derive(Clone, Debug)]
pub struct CorrectionTable {
    azimuth: Vec<f32>,
    elevation: Vec<f32>,
    spot_correction: Option<[f32; 8]>,
}

impl CorrectionTable {
    /// Build a table from per-channel azimuth and elevation offsets in
    /// degrees. Both vectors must cover the same channel count.
    pub fn new(azimuth: Vec<f32>, elevation: Vec<f32>) -> Result<Self, Error> {
        if azimuth.len() != elevation.len() {
            return Err(Error::Config(format!(
                "correction table channel mismatch: {} azimuth vs {} elevation entries",
                azimuth.len(),
                elevation.len()
            )));
        }
        Ok(Self {
            azimuth,
            elevation,
            spot_correction: None,
        })
    }

    /// Attach the 8-bucket short-range azimuth correction used by the M1
    /// sensor variants, in degrees per bucket.
    pub fn with_spot_correction(mut self, table: [f32; 8]) -> Self {
        self.spot_correction = Some(table);
        self
    }

    /// Number of channels this table covers.
    pub fn laser_num(&self) -> usize {
        self.azimuth.len()
    }

    /// Azimuth offset for a channel, in wrapped fine units.
    #[inline]
    pub fn azimuth_fine(&self, channel: usize) -> i32 {
        wrap_fine((self.azimuth[channel] * ALL_FINE_RESOLUTION as f32) as i32)
    }

    /// Elevation angle for a channel, in wrapped fine units.
    #[inline]
    pub fn elevation_fine(&self, channel: usize) -> i32 {
        wrap_fine((self.elevation[channel] * ALL_FINE_RESOLUTION as f32) as i32)
    }

    pub(crate) fn spot_correction(&self) -> Option<&[f32; 8]> {
        self.spot_correction.as_ref()
    }
}

/// Per-channel fire-time delays.
///
/// Channels fire sequentially within a block, so each channel's true azimuth
/// leads or lags the block azimuth by an amount proportional to the motor
/// speed. The table stores the per-channel delay factor from the sensor's
/// firetime file.
#[derive(Clone, Debug)]
pub struct FiretimeTable {
    delays: Vec<f32>,
}

impl FiretimeTable {
    pub fn new(delays: Vec<f32>) -> Self {
        Self { delays }
    }

    /// Azimuth offset in degrees for a channel at the given motor speed (RPM).
    #[inline]
    pub fn azimuth_offset_deg(&self, channel: usize, motor_speed: u16) -> f32 {
        self.delays.get(channel).copied().unwrap_or(0.0) * motor_speed as f32 * 6e-6
    }
}

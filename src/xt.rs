// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Hesai Pandar XT LiDAR driver implementation (XT16/XT32 and M1 variants).
//!
//! The XT is a spinning LiDAR streaming point-cloud packets over UDP.
//!
//! # Packet structure (UDP protocol v6.1)
//!
//! All multi-byte integers little-endian. An XT32 single-return packet is
//! 1080 bytes:
//!
//! - Pre-header: 6 bytes (0xEE 0xFF magic, protocol 6.1, reserved)
//! - Header: 6 bytes (laser count, block count, distance unit, ...)
//! - Body: `block` groups of (azimuth u16 + `laser` × 4-byte channel records)
//! - Tail: 28 bytes (work mode, return mode, motor speed, UTC time,
//!   microseconds, sequence number) at an offset computed from the
//!   header-reported counts
//!
//! Frames are cut by azimuth: the driver tracks the last two distinct block
//! azimuths to infer rotation direction and flags `scan_complete` on the
//! packet whose azimuth crosses the configured frame start angle.

use crate::{
    angles::{
        self, AngleLut, CorrectionTable, FiretimeTable, ALL_FINE_RESOLUTION, FINE_RESOLUTION,
        MICROSECOND_TO_SECOND, RESOLUTION,
    },
    frame::Frame,
    lidar::{self, Error, PointWriter, RawPacket},
    loss::LossStats,
};

/// Point-cloud packet magic bytes.
const MAGIC: [u8; 2] = [0xEE, 0xFF];

/// Pre-header size in bytes (magic + protocol version + reserved).
const PRE_HEADER_SIZE: usize = 6;

/// Header size in bytes.
const HEADER_SIZE: usize = 6;

/// Shared per-block azimuth field size in bytes.
const AZIMUTH_SIZE: usize = 2;

/// Channel record size in bytes (distance, reflectivity, confidence).
const CHANNEL_SIZE: usize = 4;

/// Tail size in bytes, sequence number included.
const TAIL_SIZE: usize = 28;

/// Return-mode values at or above this report multiple echoes per shot.
const DUAL_RETURN_THRESHOLD: u8 = 0x39;

/// Channels on an XT32.
pub const XT32_LASER_NUM: usize = 32;

/// Channels on an XT16.
pub const XT16_LASER_NUM: usize = 16;

/// Blocks per single-return packet.
pub const XT_BLOCK_NUM: usize = 8;

/// Sensor model variant. The M1 variants apply the short-range spot
/// correction when the correction table carries one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Model {
    Xt16,
    #[default]
    Xt32,
    Xt16M1,
    Xt32M1,
}

impl Model {
    fn has_spot_correction(self) -> bool {
        matches!(self, Model::Xt16M1 | Model::Xt32M1)
    }
}

/// Which clock stamps each packet in the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimestampSource {
    /// Device time reported in the packet tail.
    #[default]
    Sensor,
    /// Host receive time attached by the reception layer.
    Host,
}

/// Rigid transform applied to every computed point.
///
/// Built from a translation and Z-Y-X Euler angles (yaw, pitch, roll in
/// radians); the rotation matrix is precomputed so the per-point cost is one
/// matrix multiply.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    translation: [f32; 3],
    rotation: [[f32; 3]; 3],
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    pub fn new(x: f32, y: f32, z: f32, roll: f32, pitch: f32, yaw: f32) -> Self {
        let (sr, cr) = roll.sin_cos();
        let (sp, cp) = pitch.sin_cos();
        let (sy, cy) = yaw.sin_cos();
        Self {
            translation: [x, y, z],
            rotation: [
                [cy * cp, cy * sp * sr - sy * cr, cy * sp * cr + sy * sr],
                [sy * cp, sy * sp * sr + cy * cr, sy * sp * cr - cy * sr],
                [-sp, cp * sr, cp * cr],
            ],
        }
    }

    #[inline]
    pub fn apply(&self, x: f32, y: f32, z: f32) -> (f32, f32, f32) {
        let r = &self.rotation;
        let t = &self.translation;
        (
            r[0][0] * x + r[0][1] * y + r[0][2] * z + t[0],
            r[1][0] * x + r[1][1] * y + r[1][2] * z + t[1],
            r[2][0] * x + r[2][1] * y + r[2][2] * z + t[2],
        )
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Driver configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub model: Model,
    /// FOV window start in whole degrees; -1 disables clipping.
    pub fov_start: i32,
    /// FOV window end in whole degrees; -1 disables clipping.
    pub fov_end: i32,
    /// Frame boundary azimuth in degrees. Values outside [0, 360) fall back
    /// to 0 at driver construction.
    pub frame_start_azimuth: f32,
    pub timestamp_source: TimestampSource,
    pub transform: Transform,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: Model::default(),
            fov_start: -1,
            fov_end: -1,
            frame_start_azimuth: 0.0,
            timestamp_source: TimestampSource::default(),
            transform: Transform::identity(),
        }
    }
}

/// Bounds-checked view of the packet pre-header and header.
struct HeaderSlice<'a> {
    slice: &'a [u8],
}

impl<'a> HeaderSlice<'a> {
    fn from_slice(slice: &'a [u8]) -> Result<HeaderSlice<'a>, Error> {
        if slice.len() < PRE_HEADER_SIZE + HEADER_SIZE {
            return Err(Error::UnexpectedEnd(slice.len()));
        }
        if slice[0..2] != MAGIC {
            return Err(Error::InvalidPacket(format!(
                "bad magic {:#04x} {:#04x}",
                slice[0], slice[1]
            )));
        }
        Ok(HeaderSlice { slice })
    }

    fn laser_num(&self) -> usize {
        self.slice[PRE_HEADER_SIZE] as usize
    }

    fn block_num(&self) -> usize {
        self.slice[PRE_HEADER_SIZE + 1] as usize
    }

    /// Metres per raw distance unit (wire value is millimetres).
    fn dist_unit(&self) -> f32 {
        self.slice[PRE_HEADER_SIZE + 3] as f32 / 1000.0
    }

    fn body_offset(&self) -> usize {
        PRE_HEADER_SIZE + HEADER_SIZE
    }

    fn block_size(&self) -> usize {
        AZIMUTH_SIZE + CHANNEL_SIZE * self.laser_num()
    }

    /// Tail offset depends on the header-reported counts because the body
    /// size varies with `block_num * laser_num`.
    fn tail_offset(&self) -> usize {
        self.body_offset() + self.block_size() * self.block_num()
    }
}

/// Bounds-checked view of the packet tail.
struct TailSlice<'a> {
    slice: &'a [u8],
}

impl<'a> TailSlice<'a> {
    fn from_slice(slice: &'a [u8], offset: usize) -> Result<TailSlice<'a>, Error> {
        if slice.len() < offset + TAIL_SIZE {
            return Err(Error::UnexpectedEnd(slice.len()));
        }
        Ok(TailSlice {
            slice: &slice[offset..offset + TAIL_SIZE],
        })
    }

    fn work_mode(&self) -> u8 {
        self.slice[6]
    }

    fn return_mode(&self) -> u8 {
        self.slice[10]
    }

    fn is_dual_return(&self) -> bool {
        self.return_mode() >= DUAL_RETURN_THRESHOLD
    }

    fn motor_speed(&self) -> u16 {
        u16::from_le_bytes([self.slice[11], self.slice[12]])
    }

    /// Device time in epoch microseconds from the tail's UTC fields
    /// (years since 2000) plus the in-second microsecond counter.
    fn micro_lidar_time(&self) -> u64 {
        let utc = &self.slice[13..19];
        let micros = u32::from_le_bytes([
            self.slice[19],
            self.slice[20],
            self.slice[21],
            self.slice[22],
        ]);
        epoch_micros(utc, micros)
    }

    fn seqnum(&self) -> u32 {
        u32::from_le_bytes([
            self.slice[24],
            self.slice[25],
            self.slice[26],
            self.slice[27],
        ])
    }
}

fn epoch_micros(utc: &[u8], micros: u32) -> u64 {
    let days = days_from_civil(2000 + utc[0] as i32, utc[1] as i32, utc[2] as i32);
    let secs = days * 86_400 + utc[3] as i64 * 3_600 + utc[4] as i64 * 60 + utc[5] as i64;
    secs.max(0) as u64 * 1_000_000 + micros as u64
}

/// Days since 1970-01-01 for a proleptic Gregorian civil date.
fn days_from_civil(year: i32, month: i32, day: i32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = if year >= 0 { year } else { year - 399 } / 400;
    let yoe = (year - era * 400) as i64;
    let doy = (153 * ((month + 9) % 12) as i64 + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era as i64 * 146_097 + doe - 719_468
}

/// Hesai Pandar XT driver.
///
/// Owns the decoding state carried across packets: azimuth history for
/// frame splitting, rotation direction, motor speed, and loss counters.
/// One driver instance decodes one sensor stream into one client-owned
/// [`Frame`] at a time.
pub struct XtDriver {
    config: Config,
    correction: Option<CorrectionTable>,
    firetimes: Option<FiretimeTable>,
    lut: &'static AngleLut,
    /// Last distinct block azimuth in centidegrees, -1 until seen.
    last_azimuth: i32,
    /// Second-to-last distinct block azimuth, -1 until seen.
    last_last_azimuth: i32,
    /// +1 clockwise, -1 counter-clockwise.
    rotation_flag: i32,
    spin_speed: u16,
    dual_return: bool,
    warned_missing_correction: bool,
    loss: LossStats,
}

impl XtDriver {
    pub fn new(mut config: Config) -> Self {
        if !(0.0..360.0).contains(&config.frame_start_azimuth) {
            config.frame_start_azimuth = 0.0;
        }
        Self {
            config,
            correction: None,
            firetimes: None,
            lut: AngleLut::global(),
            last_azimuth: -1,
            last_last_azimuth: -1,
            rotation_flag: 1,
            spin_speed: 0,
            dual_return: false,
            warned_missing_correction: false,
            loss: LossStats::new(),
        }
    }

    /// Load the per-channel angle correction table. Decoding is refused
    /// until this has been called.
    pub fn set_correction(&mut self, table: CorrectionTable) {
        self.correction = Some(table);
    }

    /// Load the per-channel fire-time table, enabling the fine azimuth
    /// correction during decode.
    pub fn set_firetimes(&mut self, table: FiretimeTable) {
        self.firetimes = Some(table);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn loss(&self) -> &LossStats {
        &self.loss
    }

    /// Inferred rotation direction: +1 clockwise, -1 counter-clockwise.
    pub fn rotation_flag(&self) -> i32 {
        self.rotation_flag
    }

    /// Motor speed in RPM from the most recent packet.
    pub fn spin_speed(&self) -> u16 {
        self.spin_speed
    }

    /// Whether the sensor reported dual-return mode in the last packet.
    pub fn is_dual_return(&self) -> bool {
        self.dual_return
    }

    /// Decode one packet into the frame.
    ///
    /// Validates framing, extracts raw samples at the frame's write cursor,
    /// updates loss accounting and azimuth history, and sets
    /// [`Frame::scan_complete`] when the rotation closes. The frame is never
    /// cleared here; consuming and resetting it is the caller's job.
    ///
    /// Fails without touching frame or driver state when the packet is
    /// malformed or no correction table is loaded.
    pub fn process<P: PointWriter>(
        &mut self,
        frame: &mut Frame<P>,
        packet: &RawPacket,
    ) -> Result<(), Error> {
        if self.correction.is_none() {
            if !self.warned_missing_correction {
                log::warn!("no angle correction table loaded, dropping point cloud packets");
                self.warned_missing_correction = true;
            }
            return Err(Error::MissingCorrection);
        }
        let header = HeaderSlice::from_slice(packet.data)?;
        let tail = TailSlice::from_slice(packet.data, header.tail_offset())?;

        let laser_num = header.laser_num();
        let block_num = header.block_num();
        if let Some(correction) = &self.correction {
            if laser_num > correction.laser_num() {
                return Err(Error::InvalidPacket(format!(
                    "{} channels exceed the {}-channel correction table",
                    laser_num,
                    correction.laser_num()
                )));
            }
        }

        let per_points_num = block_num * laser_num;
        let mut index = frame.packet_num * per_points_num;
        if index + per_points_num > frame.samples.len()
            || frame.packet_num >= frame.sensor_timestamp.len()
        {
            return Err(Error::BufferOverflow);
        }

        let device_time = tail.micro_lidar_time();
        frame.sensor_timestamp[frame.packet_num] = match self.config.timestamp_source {
            TimestampSource::Sensor => device_time,
            TimestampSource::Host => packet.recv_timestamp,
        };
        self.loss.update_seqnum(tail.seqnum());
        self.loss.update_timestamp(device_time);

        frame.host_timestamp = lidar::monotonic_us().unwrap_or_default();
        self.spin_speed = tail.motor_speed();
        self.dual_return = tail.is_dual_return();
        frame.spin_speed = self.spin_speed;
        frame.work_mode = tail.work_mode();
        frame.scan_complete = false;
        frame.distance_unit = header.dist_unit();
        frame.block_num = block_num;
        frame.laser_num = laser_num;
        frame.per_points_num = per_points_num;

        let body = &packet.data[header.body_offset()..header.tail_offset()];
        let block_size = header.block_size();
        let mut azimuth = 0u16;
        for block in 0..block_num {
            let block_data = &body[block * block_size..(block + 1) * block_size];
            azimuth = u16::from_le_bytes([block_data[0], block_data[1]]);
            for channel in 0..laser_num {
                let record = &block_data[AZIMUTH_SIZE + channel * CHANNEL_SIZE..][..CHANNEL_SIZE];
                let sample = &mut frame.samples[index];
                sample.azimuth = match &self.firetimes {
                    Some(firetimes) => {
                        azimuth as f32
                            + self.rotation_flag as f32
                                * firetimes.azimuth_offset_deg(channel, self.spin_speed)
                                * RESOLUTION as f32
                    }
                    None => azimuth as f32,
                };
                sample.distance = u16::from_le_bytes([record[0], record[1]]);
                sample.reflectivity = record[2];
                sample.confidence = record[3];
                index += 1;
            }
        }

        if self.observe_azimuth(azimuth) {
            frame.scan_complete = true;
        }
        frame.packet_num += 1;
        Ok(())
    }

    /// Feed the last block azimuth of a packet to the frame-split detector
    /// and advance the azimuth history.
    ///
    /// Returns true when the rotation just crossed the configured start
    /// angle. History only advances on a distinct azimuth so repeated
    /// readings cannot disturb direction tracking.
    fn observe_azimuth(&mut self, azimuth: u16) -> bool {
        let split = self.is_frame_split(azimuth);
        if azimuth as i32 != self.last_azimuth {
            self.last_last_azimuth = self.last_azimuth;
            self.last_azimuth = azimuth as i32;
        }
        split
    }

    /// Rotation-direction-aware frame boundary decision.
    ///
    /// Needs two prior distinct azimuths: three consecutive samples are the
    /// minimum to establish direction, distinguish a true wrap across 0°
    /// from jitter, and survive duplicate packets. The smaller of the two
    /// successive deltas bounds what still counts as regular motion; a jump
    /// beyond it is a wrap. The comparison semantics (including the
    /// `division == 0` early return and the `min` tie-break) match the
    /// sensor firmware's framing behavior and must not be "simplified".
    fn is_frame_split(&mut self, azimuth: u16) -> bool {
        if self.last_last_azimuth < 0 {
            return false;
        }
        let azimuth = azimuth as i32;
        let division1 = (self.last_azimuth - self.last_last_azimuth).unsigned_abs() as u16;
        let division2 = (self.last_azimuth - azimuth).unsigned_abs() as u16;
        let division = division1.min(division2) as i32;
        if division == 0 {
            return false;
        }
        if self.last_last_azimuth - self.last_azimuth == division
            || self.last_azimuth - azimuth == division
        {
            self.rotation_flag = -1;
        } else {
            self.rotation_flag = 1;
        }

        let start = (self.config.frame_start_azimuth * RESOLUTION as f32) as i32;
        if self.rotation_flag == 1 {
            if self.last_azimuth - azimuth > division {
                // Angle jump: crossed 0 going clockwise
                return start > self.last_azimuth || start <= azimuth;
            }
            self.last_azimuth < azimuth && self.last_azimuth < start && azimuth >= start
        } else {
            if azimuth - self.last_azimuth > division {
                return start <= self.last_azimuth || start > azimuth;
            }
            self.last_azimuth > azimuth && self.last_azimuth > start && azimuth <= start
        }
    }

    /// Convert one packet's raw samples into Cartesian points.
    ///
    /// Applies the per-channel calibration offsets, the optional short-range
    /// spot correction (M1 variants), FOV clipping, and the configured rigid
    /// transform. Samples outside the FOV window leave their output slot
    /// untouched.
    pub fn compute_points<P: PointWriter>(
        &self,
        frame: &mut Frame<P>,
        packet_index: usize,
    ) -> Result<(), Error> {
        let correction = self.correction.as_ref().ok_or(Error::MissingCorrection)?;
        if frame.laser_num > correction.laser_num() {
            return Err(Error::InvalidPacket(format!(
                "{} channels exceed the {}-channel correction table",
                frame.laser_num,
                correction.laser_num()
            )));
        }
        if packet_index >= frame.packet_num {
            return Err(Error::InvalidPacket(format!(
                "packet index {} out of range ({} packets decoded)",
                packet_index, frame.packet_num
            )));
        }
        let spot = if self.config.model.has_spot_correction() {
            correction.spot_correction()
        } else {
            None
        };
        let timestamp = frame.sensor_timestamp[packet_index] as f64 / MICROSECOND_TO_SECOND;

        for block in 0..frame.block_num {
            for channel in 0..frame.laser_num {
                let index = packet_index * frame.per_points_num + block * frame.laser_num + channel;
                let sample = frame.samples[index];
                let distance = sample.distance as f32 * frame.distance_unit;

                let elevation = correction.elevation_fine(channel);
                let mut azimuth = (sample.azimuth * FINE_RESOLUTION as f32) as i32
                    + correction.azimuth_fine(channel);
                if let Some(table) = spot {
                    if let Some(bucket) = angles::spot_bucket(distance) {
                        // Table entries are degrees, same as the calibration offsets
                        azimuth -= (table[bucket] * ALL_FINE_RESOLUTION as f32) as i32;
                    }
                }
                let azimuth = angles::wrap_fine(azimuth);

                if self.config.fov_start != -1 && self.config.fov_end != -1 {
                    let degrees = azimuth / FINE_RESOLUTION / RESOLUTION;
                    if degrees < self.config.fov_start || degrees > self.config.fov_end {
                        continue;
                    }
                }

                let xy_distance = distance * self.lut.cos(elevation);
                let x = xy_distance * self.lut.sin(azimuth);
                let y = xy_distance * self.lut.cos(azimuth);
                let z = distance * self.lut.sin(elevation);
                let (x, y, z) = self.config.transform.apply(x, y, z);

                let point = &mut frame.points[index];
                point.set_position(x, y, z);
                point.set_intensity(sample.reflectivity);
                point.set_confidence(sample.confidence);
                point.set_timestamp(timestamp);
                point.set_ring(channel as u16);
            }
        }
        Ok(())
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common types shared by the decoding pipeline: the crate error type, the
//! generic point output trait, the raw packet input type, and clock helpers.

use std::fmt;

/// Common error type for decoder operations.
#[derive(Debug)]
pub enum Error {
    /// I/O error (socket, file operations)
    Io(std::io::Error),
    /// Invalid packet data
    InvalidPacket(String),
    /// Unexpected end of data at given byte position
    UnexpectedEnd(usize),
    /// No angle correction table has been loaded into the driver
    MissingCorrection,
    /// Frame buffers cannot hold another packet's worth of samples
    BufferOverflow,
    /// System time error
    SystemTime(std::time::SystemTimeError),
    /// Configuration error
    Config(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::InvalidPacket(msg) => write!(f, "invalid packet: {}", msg),
            Error::UnexpectedEnd(len) => write!(f, "unexpected end of data at {} bytes", len),
            Error::MissingCorrection => write!(f, "no angle correction table loaded"),
            Error::BufferOverflow => write!(f, "frame buffer overflow"),
            Error::SystemTime(err) => write!(f, "system time error: {}", err),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<std::time::SystemTimeError> for Error {
    fn from(err: std::time::SystemTimeError) -> Self {
        Error::SystemTime(err)
    }
}

/// One received UDP payload plus the host receive time attached by the
/// reception layer, in epoch microseconds.
///
/// The decoder borrows the bytes for the duration of one `process` call and
/// never retains them.
#[derive(Clone, Copy, Debug)]
pub struct RawPacket<'a> {
    pub data: &'a [u8],
    pub recv_timestamp: u64,
}

impl<'a> RawPacket<'a> {
    pub fn new(data: &'a [u8], recv_timestamp: u64) -> Self {
        Self {
            data,
            recv_timestamp,
        }
    }
}

/// Output point abstraction.
///
/// The geometry engine writes each computed point through these setters, so
/// any concrete point representation (ROS-style structs, serialization
/// buffers, ...) can receive decoder output without an intermediate copy.
pub trait PointWriter: Clone + Default + Send {
    fn set_position(&mut self, x: f32, y: f32, z: f32);
    fn set_intensity(&mut self, intensity: u8);
    fn set_confidence(&mut self, confidence: u8);
    /// Device time of the owning packet, in seconds.
    fn set_timestamp(&mut self, seconds: f64);
    /// Channel index of the emitting laser.
    fn set_ring(&mut self, ring: u16);
}

/// Default concrete point: position, intensity, confidence, timestamp, ring.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: u8,
    pub confidence: u8,
    pub timestamp: f64,
    pub ring: u16,
}

impl PointWriter for Point {
    fn set_position(&mut self, x: f32, y: f32, z: f32) {
        self.x = x;
        self.y = y;
        self.z = z;
    }

    fn set_intensity(&mut self, intensity: u8) {
        self.intensity = intensity;
    }

    fn set_confidence(&mut self, confidence: u8) {
        self.confidence = confidence;
    }

    fn set_timestamp(&mut self, seconds: f64) {
        self.timestamp = seconds;
    }

    fn set_ring(&mut self, ring: u16) {
        self.ring = ring;
    }
}

/// Get the current monotonic time in microseconds.
///
/// On Linux, uses `CLOCK_MONOTONIC_RAW` for best accuracy.
/// On other platforms, falls back to `SystemTime`.
#[cfg(target_os = "linux")]
pub fn monotonic_us() -> Result<u64, Error> {
    let mut tp = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let err = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut tp) };
    if err != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    Ok(tp.tv_sec as u64 * 1_000_000 + tp.tv_nsec as u64 / 1_000)
}

#[cfg(not(target_os = "linux"))]
pub fn monotonic_us() -> Result<u64, Error> {
    wall_us()
}

/// Get the current wall-clock time in epoch microseconds.
pub fn wall_us() -> Result<u64, Error> {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH)?;
    Ok(duration.as_micros() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_writer_roundtrip() {
        let mut point = Point::default();
        point.set_position(1.0, -2.0, 3.0);
        point.set_intensity(200);
        point.set_confidence(17);
        point.set_timestamp(1.5);
        point.set_ring(31);

        assert_eq!(point.x, 1.0);
        assert_eq!(point.y, -2.0);
        assert_eq!(point.z, 3.0);
        assert_eq!(point.intensity, 200);
        assert_eq!(point.confidence, 17);
        assert_eq!(point.timestamp, 1.5);
        assert_eq!(point.ring, 31);
    }

    #[test]
    fn test_monotonic_advances() {
        let a = monotonic_us().unwrap();
        let b = monotonic_us().unwrap();
        assert!(b >= a);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::MissingCorrection.to_string(),
            "no angle correction table loaded"
        );
        assert_eq!(
            Error::UnexpectedEnd(42).to_string(),
            "unexpected end of data at 42 bytes"
        );
    }
}

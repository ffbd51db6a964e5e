// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! End-to-end decode tests against synthetic Pandar XT32 packets.

use pandar_xt::{
    Config, CorrectionTable, Error, FiretimeTable, Frame, Model, Point, RawPacket,
    TimestampSource, XtDriver,
};

const LASER_NUM: usize = 32;
const BLOCK_NUM: usize = 8;
const PACKET_SIZE: usize = 12 + BLOCK_NUM * (2 + LASER_NUM * 4) + 28;
const POINTS_PER_PACKET: usize = BLOCK_NUM * LASER_NUM;

/// Builds a valid XT32 single-return packet. All eight blocks share the same
/// azimuth and every channel record carries the same reading, which keeps the
/// expected decoder output easy to state.
struct PacketBuilder {
    azimuth: u16,
    distance: u16,
    reflectivity: u8,
    confidence: u8,
    seqnum: u32,
    motor_speed: u16,
    return_mode: u8,
    work_mode: u8,
    utc: [u8; 6],
    timestamp_us: u32,
}

impl Default for PacketBuilder {
    fn default() -> Self {
        Self {
            azimuth: 0,
            distance: 2500, // 10 m at the 4 mm unit
            reflectivity: 100,
            confidence: 3,
            seqnum: 0,
            motor_speed: 600,
            return_mode: 0x33,
            work_mode: 0,
            utc: [26, 1, 1, 0, 0, 0],
            timestamp_us: 0,
        }
    }
}

impl PacketBuilder {
    fn azimuth(mut self, azimuth: u16) -> Self {
        self.azimuth = azimuth;
        self
    }

    fn distance(mut self, distance: u16) -> Self {
        self.distance = distance;
        self
    }

    fn seqnum(mut self, seqnum: u32) -> Self {
        self.seqnum = seqnum;
        self
    }

    fn return_mode(mut self, return_mode: u8) -> Self {
        self.return_mode = return_mode;
        self
    }

    fn utc(mut self, utc: [u8; 6], timestamp_us: u32) -> Self {
        self.utc = utc;
        self.timestamp_us = timestamp_us;
        self
    }

    fn build(&self) -> Vec<u8> {
        let mut packet = vec![0u8; PACKET_SIZE];

        // Pre-header
        packet[0] = 0xEE;
        packet[1] = 0xFF;
        packet[2] = 6; // protocol major
        packet[3] = 1; // protocol minor

        // Header
        packet[6] = LASER_NUM as u8;
        packet[7] = BLOCK_NUM as u8;
        packet[9] = 4; // distance unit in mm

        // Body
        let block_size = 2 + LASER_NUM * 4;
        for block in 0..BLOCK_NUM {
            let base = 12 + block * block_size;
            packet[base..base + 2].copy_from_slice(&self.azimuth.to_le_bytes());
            for channel in 0..LASER_NUM {
                let record = base + 2 + channel * 4;
                packet[record..record + 2].copy_from_slice(&self.distance.to_le_bytes());
                packet[record + 2] = self.reflectivity;
                packet[record + 3] = self.confidence;
            }
        }

        // Tail
        let tail = 12 + BLOCK_NUM * block_size;
        packet[tail + 6] = self.work_mode;
        packet[tail + 10] = self.return_mode;
        packet[tail + 11..tail + 13].copy_from_slice(&self.motor_speed.to_le_bytes());
        packet[tail + 13..tail + 19].copy_from_slice(&self.utc);
        packet[tail + 19..tail + 23].copy_from_slice(&self.timestamp_us.to_le_bytes());
        packet[tail + 24..tail + 28].copy_from_slice(&self.seqnum.to_le_bytes());

        packet
    }
}

fn zero_correction() -> CorrectionTable {
    CorrectionTable::new(vec![0.0; LASER_NUM], vec![0.0; LASER_NUM]).unwrap()
}

fn driver_with_correction(config: Config) -> XtDriver {
    let mut driver = XtDriver::new(config);
    driver.set_correction(zero_correction());
    driver
}

fn frame() -> Frame<Point> {
    Frame::with_capacity(16, POINTS_PER_PACKET)
}

#[test]
fn test_refuses_without_correction() {
    let mut driver = XtDriver::new(Config::default());
    let mut frame = frame();
    let data = PacketBuilder::default().build();

    let result = driver.process(&mut frame, &RawPacket::new(&data, 0));
    assert!(matches!(result, Err(Error::MissingCorrection)));
    assert_eq!(frame.packet_num, 0);
    assert!(frame.is_empty());
}

#[test]
fn test_rejects_bad_magic() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame = frame();
    let mut data = PacketBuilder::default().build();
    data[0] = 0x00;

    let result = driver.process(&mut frame, &RawPacket::new(&data, 0));
    assert!(matches!(result, Err(Error::InvalidPacket(_))));
    assert_eq!(frame.packet_num, 0);
    // A rejected packet never reaches loss accounting
    assert_eq!(driver.loss().total_packets(), 0);
}

#[test]
fn test_rejects_truncated_packet() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame = frame();
    let data = PacketBuilder::default().build();

    let result = driver.process(&mut frame, &RawPacket::new(&data[..500], 0));
    assert!(matches!(result, Err(Error::UnexpectedEnd(500))));
    assert_eq!(frame.packet_num, 0);
}

#[test]
fn test_decode_accumulates_samples() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame = frame();

    for (i, azimuth) in [1_000u16, 2_000, 3_000].into_iter().enumerate() {
        let data = PacketBuilder::default()
            .azimuth(azimuth)
            .seqnum(i as u32)
            .build();
        driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
    }

    assert_eq!(frame.packet_num, 3);
    assert_eq!(frame.len(), 3 * POINTS_PER_PACKET);
    assert_eq!(frame.block_num, BLOCK_NUM);
    assert_eq!(frame.laser_num, LASER_NUM);
    assert_eq!(frame.per_points_num, POINTS_PER_PACKET);
    assert!((frame.distance_unit - 0.004).abs() < 1e-9);
    assert_eq!(frame.spin_speed, 600);
    assert!(!frame.scan_complete);

    let first = frame.samples()[0];
    assert_eq!(first.distance, 2500);
    assert_eq!(first.azimuth, 1_000.0);
    assert_eq!(first.reflectivity, 100);
    assert_eq!(first.confidence, 3);
    // Second packet's samples start at the next packet stride
    assert_eq!(frame.samples()[POINTS_PER_PACKET].azimuth, 2_000.0);
}

#[test]
fn test_scan_complete_on_zero_crossing() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame = frame();

    for azimuth in [34_000u16, 35_000] {
        let data = PacketBuilder::default().azimuth(azimuth).build();
        driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
        assert!(!frame.scan_complete);
    }

    let data = PacketBuilder::default().azimuth(500).build();
    driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
    assert!(frame.scan_complete);
    assert_eq!(driver.rotation_flag(), 1);
    assert_eq!(frame.packet_num, 3);
}

#[test]
fn test_duplicate_azimuth_never_splits() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame = frame();

    for azimuth in [1_000u16, 2_000, 2_000, 2_000, 3_000] {
        let data = PacketBuilder::default().azimuth(azimuth).build();
        driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
        assert!(!frame.scan_complete);
    }
}

#[test]
fn test_frame_reuse_after_reset() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame = frame();

    for azimuth in [34_000u16, 35_000, 500] {
        let data = PacketBuilder::default().azimuth(azimuth).build();
        driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
    }
    assert!(frame.scan_complete);

    frame.reset();
    assert_eq!(frame.packet_num, 0);
    assert!(!frame.scan_complete);

    let data = PacketBuilder::default().azimuth(1_500).build();
    driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
    assert_eq!(frame.packet_num, 1);
    assert!(!frame.scan_complete);
    assert_eq!(frame.samples()[0].azimuth, 1_500.0);
}

#[test]
fn test_compute_points_geometry() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame = frame();

    // 2500 raw units at 4 mm each is 10 m, straight ahead at 0°
    let data = PacketBuilder::default().azimuth(0).distance(2500).build();
    driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
    driver.compute_points(&mut frame, 0).unwrap();

    let point = frame.points()[0];
    assert!(point.x.abs() < 0.01);
    assert!((point.y - 10.0).abs() < 0.01);
    assert!(point.z.abs() < 0.01);
    assert_eq!(point.intensity, 100);
    assert_eq!(point.confidence, 3);
    assert_eq!(point.ring, 0);
    // Last channel of the first block carries its channel index as ring
    assert_eq!(frame.points()[LASER_NUM - 1].ring, (LASER_NUM - 1) as u16);
}

#[test]
fn test_compute_points_at_135_degrees() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame = frame();

    let data = PacketBuilder::default().azimuth(13_500).distance(2500).build();
    driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
    driver.compute_points(&mut frame, 0).unwrap();

    let point = frame.points()[0];
    let expected = 10.0 * std::f32::consts::FRAC_1_SQRT_2;
    assert!((point.x - expected).abs() < 0.01);
    assert!((point.y + expected).abs() < 0.01);
    assert!(point.z.abs() < 0.01);
}

#[test]
fn test_fov_clipping_leaves_slot_untouched() {
    let config = Config {
        fov_start: 90,
        fov_end: 180,
        ..Config::default()
    };
    let mut driver = driver_with_correction(config);
    let mut frame = frame();

    // 45° is outside the window, 135° inside
    for azimuth in [4_500u16, 13_500] {
        let data = PacketBuilder::default().azimuth(azimuth).distance(2500).build();
        driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
    }
    driver.compute_points(&mut frame, 0).unwrap();
    driver.compute_points(&mut frame, 1).unwrap();

    let clipped = frame.points()[0];
    assert_eq!((clipped.x, clipped.y, clipped.z), (0.0, 0.0, 0.0));
    assert_eq!(clipped.intensity, 0);

    let kept = frame.points()[POINTS_PER_PACKET];
    let expected = 10.0 * std::f32::consts::FRAC_1_SQRT_2;
    assert!((kept.x - expected).abs() < 0.01);
    assert!((kept.y + expected).abs() < 0.01);
}

#[test]
fn test_compute_points_out_of_range_packet() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame = frame();

    let data = PacketBuilder::default().build();
    driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();

    assert!(driver.compute_points(&mut frame, 0).is_ok());
    assert!(matches!(
        driver.compute_points(&mut frame, 1),
        Err(Error::InvalidPacket(_))
    ));
}

#[test]
fn test_sensor_timestamp_from_tail() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame = frame();

    // 2026-08-27T12:00:00Z plus 500 us
    let data = PacketBuilder::default().utc([26, 8, 27, 12, 0, 0], 500).build();
    driver
        .process(&mut frame, &RawPacket::new(&data, 999))
        .unwrap();

    assert_eq!(frame.sensor_timestamps()[0], 1_787_832_000_000_500);
}

#[test]
fn test_host_timestamp_source() {
    let config = Config {
        timestamp_source: TimestampSource::Host,
        ..Config::default()
    };
    let mut driver = driver_with_correction(config);
    let mut frame = frame();

    let data = PacketBuilder::default().utc([26, 8, 27, 12, 0, 0], 500).build();
    driver
        .process(&mut frame, &RawPacket::new(&data, 123_456))
        .unwrap();

    assert_eq!(frame.sensor_timestamps()[0], 123_456);
}

#[test]
fn test_point_timestamp_in_seconds() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame = frame();

    let data = PacketBuilder::default().utc([26, 1, 1, 0, 0, 0], 250_000).build();
    driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
    driver.compute_points(&mut frame, 0).unwrap();

    assert!((frame.points()[0].timestamp - 1_767_225_600.25).abs() < 1e-6);
}

#[test]
fn test_loss_accounting_from_seqnums() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame = frame();

    for seqnum in [1u32, 2, 5] {
        let data = PacketBuilder::default().seqnum(seqnum).build();
        driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
    }

    assert_eq!(driver.loss().total_packets(), 3);
    assert_eq!(driver.loss().lost_packets(), 2);
}

#[test]
fn test_dual_return_flag() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame = frame();

    let data = PacketBuilder::default().return_mode(0x33).build();
    driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
    assert!(!driver.is_dual_return());

    let data = PacketBuilder::default().return_mode(0x39).build();
    driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
    assert!(driver.is_dual_return());
}

#[test]
fn test_buffer_overflow_when_frame_full() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame: Frame<Point> = Frame::with_capacity(2, POINTS_PER_PACKET);

    for azimuth in [1_000u16, 2_000] {
        let data = PacketBuilder::default().azimuth(azimuth).build();
        driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
    }

    let data = PacketBuilder::default().azimuth(3_000).build();
    let result = driver.process(&mut frame, &RawPacket::new(&data, 0));
    assert!(matches!(result, Err(Error::BufferOverflow)));
    assert_eq!(frame.packet_num, 2);
}

#[test]
fn test_firetime_correction_shifts_sample_azimuth() {
    let mut driver = driver_with_correction(Config::default());
    let mut delays = vec![0.0; LASER_NUM];
    delays[1] = 10.0;
    driver.set_firetimes(FiretimeTable::new(delays));
    let mut frame = frame();

    let data = PacketBuilder::default().azimuth(1_000).build();
    driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();

    // delay 10 × 600 rpm × 6e-6 = 0.036°, stored as 3.6 centidegrees
    // clockwise on top of the shared block azimuth
    assert_eq!(frame.samples()[0].azimuth, 1_000.0);
    assert!((frame.samples()[1].azimuth - 1_003.6).abs() < 1e-3);
}

#[test]
fn test_spot_correction_applies_to_m1_models_only() {
    let spot_table = [1.0; 8];
    let config = Config {
        model: Model::Xt32M1,
        ..Config::default()
    };
    let mut driver = XtDriver::new(config);
    driver.set_correction(zero_correction().with_spot_correction(spot_table));
    let mut frame = frame();

    // 500 raw units at 4 mm is 2 m, inside the short-range window; the
    // one-degree bucket entry pulls the 90.00° block azimuth back to 89.00°
    let data = PacketBuilder::default().azimuth(9_000).distance(500).build();
    driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();
    driver.compute_points(&mut frame, 0).unwrap();

    let point = frame.points()[0];
    let expected_x = 2.0 * 89.0f32.to_radians().sin();
    let expected_y = 2.0 * 89.0f32.to_radians().cos();
    assert!((point.x - expected_x).abs() < 0.001);
    assert!((point.y - expected_y).abs() < 0.001);

    // The same table on a non-M1 model leaves the azimuth at 90°
    let mut plain = XtDriver::new(Config::default());
    plain.set_correction(zero_correction().with_spot_correction(spot_table));
    let mut frame2 = self::frame();
    plain.process(&mut frame2, &RawPacket::new(&data, 0)).unwrap();
    plain.compute_points(&mut frame2, 0).unwrap();
    assert!(frame2.points()[0].y.abs() < 0.001);
    assert!((frame2.points()[0].x - 2.0).abs() < 0.001);
}

#[test]
fn test_compute_points_after_correction_table_shrinks() {
    let mut driver = driver_with_correction(Config::default());
    let mut frame = frame();

    let data = PacketBuilder::default().build();
    driver.process(&mut frame, &RawPacket::new(&data, 0)).unwrap();

    // A smaller table swapped in after decode must be refused, not indexed
    driver.set_correction(CorrectionTable::new(vec![0.0; 16], vec![0.0; 16]).unwrap());
    assert!(matches!(
        driver.compute_points(&mut frame, 0),
        Err(Error::InvalidPacket(_))
    ));
}

#[test]
fn test_laser_count_exceeding_correction_table() {
    let mut driver = XtDriver::new(Config::default());
    driver.set_correction(CorrectionTable::new(vec![0.0; 16], vec![0.0; 16]).unwrap());
    let mut frame = frame();

    let data = PacketBuilder::default().build();
    let result = driver.process(&mut frame, &RawPacket::new(&data, 0));
    assert!(matches!(result, Err(Error::InvalidPacket(_))));
}

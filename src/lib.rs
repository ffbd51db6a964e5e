// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Hesai Pandar XT LiDAR Decoder Library
//!
//! This library decodes the UDP point-cloud stream of the Hesai Pandar
//! XT16/XT32 spinning LiDAR (and the M1 short-range variants) into
//! calibrated Cartesian point clouds.
//!
//! # Architecture
//!
//! The library uses a **client-owned frame** pattern for zero-allocation
//! operation:
//!
//! ```text
//! ┌─────────────────┐     ┌───────────────┐     ┌─────────────────┐
//! │  PacketSource   │ ──► │   XtDriver    │ ──► │    Frame<P>     │
//! │  (UDP/pcap/test)│     │ (decode+split)│     │  (client-owned) │
//! └─────────────────┘     └───────────────┘     └─────────────────┘
//!                                                       │
//!                                                       ▼
//!                               ┌─────────────────────────────────────┐
//!                               │  XtDriver::compute_points           │
//!                               │  (calibration, FOV, transform)      │
//!                               └─────────────────────────────────────┘
//! ```
//!
//! The client owns all frame objects and provides mutable references to the
//! driver:
//! 1. Client creates a frame: `Frame::<Point>::with_capacity(packets, points)`
//! 2. Client provides a mutable reference: `driver.process(&mut frame, &packet)`
//! 3. Driver writes raw samples and metadata into the frame
//! 4. When `frame.scan_complete` is set, the rotation has closed; the client
//!    runs [`xt::XtDriver::compute_points`] per packet, consumes the frame,
//!    and calls [`frame::Frame::reset`] to reuse the allocation
//!
//! # Modules
//!
//! - [`angles`]: Fixed-point angle units, sin/cos lookup, correction tables
//! - [`frame`]: Client-owned frame buffers
//! - [`lidar`]: Common types, traits, and error handling
//! - [`loss`]: Packet-loss and timestamp-disorder accounting
//! - [`packet_source`]: Packet source abstraction for live and test input
//! - [`xt`]: The Pandar XT packet decoder and frame-split state machine
//!
//! # Example
//!
//! ```ignore
//! use pandar_xt::{Config, CorrectionTable, Frame, Point, RawPacket, XtDriver};
//!
//! let mut driver = XtDriver::new(Config::default());
//! driver.set_correction(CorrectionTable::new(azimuths, elevations)?);
//! let mut frame = Frame::<Point>::with_capacity(700, 256);
//!
//! // Process packets
//! loop {
//!     let (len, recv_timestamp) = source.recv(&mut buf).await?;
//!     let packet = RawPacket::new(&buf[..len], recv_timestamp);
//!     driver.process(&mut frame, &packet)?;
//!     if frame.scan_complete {
//!         for index in 0..frame.packet_num {
//!             driver.compute_points(&mut frame, index)?;
//!         }
//!         // Frame complete - consume frame.points(), then reuse
//!         frame.reset();
//!     }
//! }
//! ```

pub mod angles;
pub mod frame;
pub mod lidar;
pub mod loss;
pub mod packet_source;
#[cfg(feature = "pcap")]
pub mod pcap_source;
pub mod xt;

// Re-exports for convenience
pub use angles::{CorrectionTable, FiretimeTable};
pub use frame::{Frame, RawSample};
pub use lidar::{Error, Point, PointWriter, RawPacket};
pub use loss::LossStats;
pub use packet_source::PacketSource;
#[cfg(feature = "pcap")]
pub use pcap_source::PcapSource;
pub use xt::{Config, Model, TimestampSource, Transform, XtDriver};

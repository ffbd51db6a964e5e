// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! PCAP file packet source for testing and offline replay.
//!
//! This module provides [`PcapSource`], a [`PacketSource`] implementation
//! that reads UDP packets from PCAP/PCAPNG files. Each capture record's
//! timestamp is carried through as the packet receive timestamp, so
//! host-timestamp decoding behaves the same against a capture as against a
//! live sensor.
//!
//! # Example
//!
//! ```ignore
//! use pandar_xt::PcapSource;
//! use pandar_xt::packet_source::PacketSource;
//!
//! // Load PCAP file, filtering by the sensor's point-cloud port
//! let mut source = PcapSource::from_file("sensor_data.pcap", Some(2368))?;
//!
//! let mut buf = [0u8; 2048];
//! while source.has_more() {
//!     let (len, recv_timestamp) = source.recv(&mut buf).await?;
//!     // Process buf[..len] with the driver
//! }
//! ```

use crate::{lidar::Error, packet_source::PacketSource};
use pcap_parser::traits::PcapReaderIterator;
use std::{future::Future, path::Path, pin::Pin};

/// Extracted UDP packet with metadata.
#[derive(Clone)]
struct ExtractedPacket {
    /// UDP payload data
    payload: Vec<u8>,
    /// Capture timestamp in epoch microseconds
    timestamp: u64,
}

/// PCAP file packet source for testing and offline replay.
///
/// Loads the entire file into memory and provides packets via the
/// [`PacketSource`] trait. Supports both legacy PCAP and PCAPNG formats.
pub struct PcapSource {
    /// Pre-extracted UDP payloads
    packets: Vec<ExtractedPacket>,
    /// Current packet index
    index: usize,
}

impl PcapSource {
    /// Load PCAP file from disk, optionally filtering by port.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to PCAP or PCAPNG file
    /// * `port` - Optional port filter (matches source OR destination)
    pub fn from_file<P: AsRef<Path>>(path: P, port: Option<u16>) -> Result<Self, Error> {
        let data = std::fs::read(path.as_ref()).map_err(Error::Io)?;
        Self::from_bytes(&data, port)
    }

    /// Load PCAP from bytes, optionally filtering by port.
    pub fn from_bytes(data: &[u8], port: Option<u16>) -> Result<Self, Error> {
        let packets = Self::extract_packets(data, port)?;
        Ok(Self { packets, index: 0 })
    }

    /// Extract UDP packets from PCAP data.
    fn extract_packets(data: &[u8], port: Option<u16>) -> Result<Vec<ExtractedPacket>, Error> {
        let mut packets = Vec::new();

        if data.len() >= 4 && data[0..4] == [0x0a, 0x0d, 0x0d, 0x0a] {
            // PCAPNG format (Section Header Block magic)
            Self::extract_pcapng(data, port, &mut packets)?;
        } else {
            Self::extract_legacy_pcap(data, port, &mut packets)?;
        }

        Ok(packets)
    }

    /// Extract packets from legacy PCAP format.
    fn extract_legacy_pcap(
        data: &[u8],
        port: Option<u16>,
        packets: &mut Vec<ExtractedPacket>,
    ) -> Result<(), Error> {
        use pcap_parser::*;

        // Buffer size must be at least as large as the data to avoid Incomplete errors
        let mut reader = LegacyPcapReader::new(data.len(), data)
            .map_err(|e| Error::InvalidPacket(format!("Failed to create PCAP reader: {:?}", e)))?;

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    match block {
                        PcapBlockOwned::Legacy(packet) => {
                            let timestamp =
                                packet.ts_sec as u64 * 1_000_000 + packet.ts_usec as u64;
                            if let Some(extracted) =
                                Self::extract_udp_payload(packet.data, timestamp, port)
                            {
                                packets.push(extracted);
                            }
                        }
                        PcapBlockOwned::LegacyHeader(_) => {
                            // Skip header
                        }
                        _ => {}
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => {
                    // Need more data but we loaded everything, so just break
                    break;
                }
                Err(e) => {
                    return Err(Error::InvalidPacket(format!("PCAP parse error: {:?}", e)));
                }
            }
        }

        Ok(())
    }

    /// Extract packets from PCAPNG format.
    fn extract_pcapng(
        data: &[u8],
        port: Option<u16>,
        packets: &mut Vec<ExtractedPacket>,
    ) -> Result<(), Error> {
        use pcap_parser::*;

        let mut reader = PcapNGReader::new(data.len(), data).map_err(|e| {
            Error::InvalidPacket(format!("Failed to create PCAPNG reader: {:?}", e))
        })?;

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    match block {
                        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                            // Default interface resolution is microseconds
                            let timestamp = (epb.ts_high as u64) << 32 | epb.ts_low as u64;
                            if let Some(extracted) =
                                Self::extract_udp_payload(epb.data, timestamp, port)
                            {
                                packets.push(extracted);
                            }
                        }
                        PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                            if let Some(extracted) = Self::extract_udp_payload(spb.data, 0, port) {
                                packets.push(extracted);
                            }
                        }
                        _ => {
                            // Skip other block types (SHB, IDB, etc.)
                        }
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => {
                    // Need more data but we loaded everything
                    break;
                }
                Err(e) => {
                    return Err(Error::InvalidPacket(format!("PCAPNG parse error: {:?}", e)));
                }
            }
        }

        Ok(())
    }

    /// Extract UDP payload from raw packet data.
    ///
    /// Uses etherparse to handle Ethernet/IP/UDP headers.
    fn extract_udp_payload(
        data: &[u8],
        timestamp: u64,
        port: Option<u16>,
    ) -> Option<ExtractedPacket> {
        use etherparse::SlicedPacket;

        let packet = SlicedPacket::from_ethernet(data).ok()?;

        let udp = match packet.transport {
            Some(etherparse::TransportSlice::Udp(udp)) => udp,
            _ => return None,
        };

        if let Some(filter_port) = port {
            let src_port = udp.source_port();
            let dst_port = udp.destination_port();
            if src_port != filter_port && dst_port != filter_port {
                return None;
            }
        }

        let payload = udp.payload().to_vec();
        if payload.is_empty() {
            return None;
        }

        Some(ExtractedPacket { payload, timestamp })
    }

    /// Reset source to beginning for replay.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Get the total number of packets.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Check if the source contains no packets.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Get the current packet index.
    pub fn current_index(&self) -> usize {
        self.index
    }

    /// Get remaining packet count.
    pub fn remaining(&self) -> usize {
        self.packets.len().saturating_sub(self.index)
    }
}

impl PacketSource for PcapSource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(usize, u64), Error>> + Send + 'a>> {
        Box::pin(async move {
            if self.index >= self.packets.len() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "no more packets in PCAP",
                )));
            }

            let packet = &self.packets[self.index];
            let len = packet.payload.len().min(buf.len());
            buf[..len].copy_from_slice(&packet.payload[..len]);
            self.index += 1;
            Ok((len, packet.timestamp))
        })
    }

    fn has_more(&self) -> bool {
        self.index < self.packets.len()
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Packet source abstraction for the decoder.
//!
//! A [`PacketSource`] yields raw UDP payloads together with the host receive
//! timestamp the decoder needs for [`crate::lidar::RawPacket`]:
//!
//! - **Live operation**: [`UdpSource`] reads from a UDP socket and stamps
//!   each payload on arrival.
//! - **Testing**: [`TestSource`] replays pre-defined packets with
//!   deterministic timestamps.
//! - **Pcap replay**: [`crate::pcap_source::PcapSource`] (feature `pcap`)
//!   replays captures, carrying the capture timestamps through.
//!
//! # Example
//!
//! ```ignore
//! let mut buf = [0u8; 2048];
//! while source.has_more() {
//!     let (len, recv_timestamp) = source.recv(&mut buf).await?;
//!     let packet = RawPacket::new(&buf[..len], recv_timestamp);
//!     driver.process(&mut frame, &packet)?;
//! }
//! ```

use crate::lidar::{self, Error};
use std::{future::Future, pin::Pin};

/// Trait for packet sources.
pub trait PacketSource: Send {
    /// Receive the next payload into the provided buffer.
    ///
    /// # Returns
    /// - `Ok((len, recv_timestamp))` - payload length and host receive time
    ///   in epoch microseconds
    /// - `Err` - I/O or source error
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(usize, u64), Error>> + Send + 'a>>;

    /// Check if more packets are available.
    ///
    /// For infinite sources (like UDP), always returns `true`.
    /// For finite sources (test, pcap), returns `false` when exhausted.
    fn has_more(&self) -> bool;
}

/// UDP socket packet source for live sensor operation.
pub struct UdpSource {
    socket: tokio::net::UdpSocket,
}

impl UdpSource {
    /// Create a new UDP source from an existing socket.
    pub fn new(socket: tokio::net::UdpSocket) -> Self {
        Self { socket }
    }

    /// Bind to an address and create a UDP source.
    pub async fn bind(addr: &str) -> Result<Self, Error> {
        let socket = tokio::net::UdpSocket::bind(addr).await?;
        Ok(Self { socket })
    }
}

impl PacketSource for UdpSource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(usize, u64), Error>> + Send + 'a>> {
        Box::pin(async move {
            let len = self.socket.recv(buf).await?;
            let recv_timestamp = lidar::wall_us()?;
            Ok((len, recv_timestamp))
        })
    }

    fn has_more(&self) -> bool {
        true // UDP sources are infinite
    }
}

/// Test packet source for unit testing.
///
/// Replays a sequence of pre-defined payloads with deterministic receive
/// timestamps, so driver logic can be exercised without hardware.
pub struct TestSource {
    packets: Vec<(Vec<u8>, u64)>,
    index: usize,
}

impl TestSource {
    /// Create a test source stamping packets 1 ms apart starting at zero.
    pub fn new(packets: Vec<Vec<u8>>) -> Self {
        let packets = packets
            .into_iter()
            .enumerate()
            .map(|(i, data)| (data, i as u64 * 1_000))
            .collect();
        Self { packets, index: 0 }
    }

    /// Create a test source with explicit receive timestamps.
    pub fn with_timestamps(packets: Vec<(Vec<u8>, u64)>) -> Self {
        Self { packets, index: 0 }
    }

    /// Reset the source to the beginning.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Get the number of packets.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Get the current index.
    pub fn current_index(&self) -> usize {
        self.index
    }
}

impl PacketSource for TestSource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(usize, u64), Error>> + Send + 'a>> {
        Box::pin(async move {
            if self.index >= self.packets.len() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "no more packets",
                )));
            }

            let (packet, recv_timestamp) = &self.packets[self.index];
            let len = packet.len().min(buf.len());
            buf[..len].copy_from_slice(&packet[..len]);
            self.index += 1;
            Ok((len, *recv_timestamp))
        })
    }

    fn has_more(&self) -> bool {
        self.index < self.packets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_test_source() {
        let packets = vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8, 9, 10], vec![11, 12]];
        let mut source = TestSource::new(packets);

        assert!(source.has_more());
        assert_eq!(source.len(), 3);

        let mut buf = [0u8; 100];

        let (len, ts) = source.recv(&mut buf).await.unwrap();
        assert_eq!(len, 4);
        assert_eq!(ts, 0);
        assert_eq!(&buf[..len], &[1, 2, 3, 4]);

        let (len, ts) = source.recv(&mut buf).await.unwrap();
        assert_eq!(len, 6);
        assert_eq!(ts, 1_000);
        assert_eq!(&buf[..len], &[5, 6, 7, 8, 9, 10]);

        assert!(source.has_more());
        let (len, _) = source.recv(&mut buf).await.unwrap();
        assert_eq!(len, 2);
        assert_eq!(&buf[..len], &[11, 12]);

        assert!(!source.has_more());
        assert!(source.recv(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_test_source_explicit_timestamps() {
        let mut source =
            TestSource::with_timestamps(vec![(vec![1, 2], 42), (vec![3, 4], 1_000_000)]);
        let mut buf = [0u8; 100];

        let (_, ts) = source.recv(&mut buf).await.unwrap();
        assert_eq!(ts, 42);
        let (_, ts) = source.recv(&mut buf).await.unwrap();
        assert_eq!(ts, 1_000_000);
    }

    #[tokio::test]
    async fn test_test_source_reset() {
        let packets = vec![vec![1, 2], vec![3, 4]];
        let mut source = TestSource::new(packets);
        let mut buf = [0u8; 100];

        source.recv(&mut buf).await.unwrap();
        source.recv(&mut buf).await.unwrap();
        assert!(!source.has_more());

        source.reset();
        assert!(source.has_more());
        assert_eq!(source.current_index(), 0);

        let (len, _) = source.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[1, 2]);
    }

    #[tokio::test]
    async fn test_empty_test_source() {
        let mut source = TestSource::new(Vec::new());
        assert!(!source.has_more());
        assert!(source.is_empty());

        let mut buf = [0u8; 100];
        assert!(source.recv(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_buffer_truncation() {
        let packets = vec![vec![1, 2, 3, 4, 5, 6, 7, 8]];
        let mut source = TestSource::new(packets);

        // Small buffer
        let mut buf = [0u8; 4];
        let (len, _) = source.recv(&mut buf).await.unwrap();
        assert_eq!(len, 4);
        assert_eq!(&buf[..len], &[1, 2, 3, 4]);
    }
}

//! Common types shared across transport implementations.

use std::fmt;

/// Bulk endpoint pair discovered on a CCID interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Interface number that was claimed.
    pub interface: u8,

    /// Bulk-in (device to host) endpoint address.
    pub bulk_in: u8,

    /// Bulk-out (host to device) endpoint address.
    pub bulk_out: u8,

    /// Maximum packet size of the bulk-in endpoint.
    pub in_max_packet_size: u16,

    /// Maximum packet size of the bulk-out endpoint.
    pub out_max_packet_size: u16,
}

impl EndpointInfo {
    /// Create endpoint info with 64-byte full-speed packets.
    pub fn new(interface: u8, bulk_in: u8, bulk_out: u8) -> Self {
        Self {
            interface,
            bulk_in,
            bulk_out,
            in_max_packet_size: 64,
            out_max_packet_size: 64,
        }
    }

    /// Set the maximum packet sizes.
    pub fn with_max_packet_sizes(mut self, in_size: u16, out_size: u16) -> Self {
        self.in_max_packet_size = in_size;
        self.out_max_packet_size = out_size;
        self
    }
}

impl fmt::Display for EndpointInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interface {} IN=0x{:02x}/{} OUT=0x{:02x}/{}",
            self.interface,
            self.bulk_in,
            self.in_max_packet_size,
            self.bulk_out,
            self.out_max_packet_size
        )
    }
}

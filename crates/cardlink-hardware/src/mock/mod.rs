//! Mock device implementations for testing and development.
//!
//! This module provides a scripted bulk transport and device provider that
//! can be controlled programmatically without a physical reader.

pub mod provider;
pub mod transport;

// Re-export commonly used types
pub use provider::{MockDeviceProvider, MockProviderHandle, PermissionPolicy};
pub use transport::{MockReply, MockResponse, MockTransport, MockTransportHandle, MockWrite};

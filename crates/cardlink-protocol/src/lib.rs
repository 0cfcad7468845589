//! CCID bulk-transfer framing.
//!
//! Pure encode/decode logic for the messages exchanged with a USB smart-card
//! reader. Nothing in this crate performs I/O.

pub mod frame;
pub mod message;
pub mod status;

pub use frame::{CommandFrame, DecodeError, ResponseFrame, decode_response, encode_command};
pub use message::{CommandType, ResponseType, VoltageSelect};
pub use status::{CommandStatus, IccStatus, SlotError, classify_status};

use crate::constants::CCID_INTERFACE_CLASS;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a physical reader as reported by discovery.
///
/// The `name` is the identifier handed to applications by `list_readers` and
/// accepted back by `connect`. Everything else is informational.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReaderDescriptor {
    /// Reader identifier (device path or slot name).
    pub name: String,

    /// USB vendor ID, zero when not applicable.
    pub vendor_id: u16,

    /// USB product ID, zero when not applicable.
    pub product_id: u16,

    /// Class codes of every interface the device exposes.
    pub interface_classes: Vec<u8>,
}

impl ReaderDescriptor {
    /// Create a descriptor with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vendor_id: 0,
            product_id: 0,
            interface_classes: Vec::new(),
        }
    }

    /// Set the USB vendor and product IDs.
    #[must_use]
    pub fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    /// Add an interface class code.
    #[must_use]
    pub fn with_interface_class(mut self, class: u8) -> Self {
        self.interface_classes.push(class);
        self
    }

    /// Whether the device presents a CCID interface.
    pub fn is_smart_card_reader(&self) -> bool {
        self.interface_classes.contains(&CCID_INTERFACE_CLASS)
    }
}

impl fmt::Display for ReaderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({:04x}:{:04x})",
            self.name, self.vendor_id, self.product_id
        )
    }
}

/// Power state of the card in the active slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PowerState {
    /// No power applied, or power state unknown after a failure.
    #[default]
    Unpowered,

    /// Power-on command in flight or settle delay running.
    PoweringOn,

    /// Card acknowledged power-on and accepts APDUs.
    Powered,
}

impl PowerState {
    pub fn is_powered(&self) -> bool {
        matches!(self, Self::Powered)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Unpowered => "unpowered",
            Self::PoweringOn => "powering-on",
            Self::Powered => "powered",
        };
        write!(f, "{s}")
    }
}

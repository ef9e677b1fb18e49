use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

pub mod config;
pub mod diff;
pub mod enumerator;
pub mod inspector;
pub mod monitor;
pub mod process;
pub mod tui;
pub mod workflow;

pub use diff::difference;
pub use enumerator::CommandEnumerator;
pub use inspector::{CommandInspector, InspectionReport};
pub use monitor::{ChangeMonitor, MonitorMode};
pub use workflow::{Outcome, Workflow, WorkflowEvent, WorkflowState};

/// Description used when the enumeration line carries no text after the ID.
pub const UNKNOWN_DEVICE: &str = "Unknown device";

/// One USB device as reported by the enumeration command at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub bus: String,
    /// Slot on the bus, reassigned on every reconnect.
    pub device_number: String,
    pub vendor_id: String,
    pub product_id: String,
    pub description: String,
}

impl DeviceRecord {
    pub fn new(
        bus: impl Into<String>,
        device_number: impl Into<String>,
        vendor_id: impl Into<String>,
        product_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            bus: bus.into(),
            device_number: device_number.into(),
            vendor_id: vendor_id.into(),
            product_id: product_id.into(),
            description: description.into(),
        }
    }

    /// Key used when comparing captures.
    /// Bus and device number are left out because they change on every replug.
    pub fn identity(&self) -> Identity<'_> {
        Identity {
            vendor_id: &self.vendor_id,
            product_id: &self.product_id,
            description: &self.description,
        }
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {} Device {}: ID {}:{} {}",
            self.bus, self.device_number, self.vendor_id, self.product_id, self.description
        )
    }
}

/// Identity tuple of a [`DeviceRecord`]: (vendor, product, description).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity<'a> {
    pub vendor_id: &'a str,
    pub product_id: &'a str,
    pub description: &'a str,
}

/// The device table as seen by a single enumeration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Capture(Vec<DeviceRecord>);

impl Capture {
    pub fn devices(&self) -> &[DeviceRecord] {
        &self.0
    }
}

impl From<Vec<DeviceRecord>> for Capture {
    fn from(devices: Vec<DeviceRecord>) -> Self {
        Self(devices)
    }
}

impl Deref for Capture {
    type Target = [DeviceRecord];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Source of device tables.
///
/// Implemented by [`CommandEnumerator`] for the real system; tests plug in
/// scripted sources.
pub trait DeviceSource: Send + Sync {
    /// Enumerate the devices currently attached. Never fails: a source that
    /// cannot read the table reports it as empty.
    fn enumerate(&self) -> Vec<DeviceRecord>;

    /// Take one atomic capture of the device table.
    fn capture(&self) -> Capture {
        Capture::from(self.enumerate())
    }
}

/// Gathers the verbose diagnostic report for one identified device.
pub trait DeviceInspector: Send + Sync {
    fn inspect(&self, device: &DeviceRecord) -> InspectionReport;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_bus_and_device_number() {
        let a = DeviceRecord::new("001", "002", "abcd", "1234", "Mouse");
        let b = DeviceRecord::new("003", "017", "abcd", "1234", "Mouse");
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a, b);
    }

    #[test]
    fn display_matches_lsusb_layout() {
        let dev = DeviceRecord::new("001", "004", "0951", "1666", "Kingston Flash Drive");
        assert_eq!(
            dev.to_string(),
            "Bus 001 Device 004: ID 0951:1666 Kingston Flash Drive"
        );
    }
}

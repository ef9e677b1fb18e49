//! Detailed inspection of the identified device.
//!
//! The report has three sections: the fields parsed from the listing, the
//! verbose `lsusb -v` dump for the vendor/product pair, and the `udevadm`
//! view of the first matching sysfs node. A failing command only costs its
//! own section a line of explanation.

use std::fmt;

use serde::Serialize;

use crate::config::InspectionSettings;
use crate::process::{self, CommandOutcome};
use crate::{DeviceInspector, DeviceRecord};

/// Plain-text diagnostic report for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectionReport {
    pub vendor_id: String,
    pub product_id: String,
    pub bus: String,
    text: String,
}

impl InspectionReport {
    pub fn new(device: &DeviceRecord, text: impl Into<String>) -> Self {
        Self {
            vendor_id: device.vendor_id.clone(),
            product_id: device.product_id.clone(),
            bus: device.bus.clone(),
            text: text.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for InspectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Inspector backed by `lsusb`, `find` and `udevadm`.
#[derive(Debug, Clone, Default)]
pub struct CommandInspector {
    settings: InspectionSettings,
}

impl CommandInspector {
    pub fn new(settings: InspectionSettings) -> Self {
        Self { settings }
    }

    fn verbose_section(&self, device: &DeviceRecord, out: &mut Vec<String>) {
        out.push("=== DETAILED USB INFORMATION (lsusb -v) ===".to_string());

        let filter = format!("{}:{}", device.vendor_id, device.product_id);
        let program = &self.settings.lsusb_program;
        match process::run_with_timeout(
            program,
            ["-v", "-d", filter.as_str()],
            self.settings.verbose_timeout(),
        ) {
            CommandOutcome::Finished {
                success: true,
                stdout,
                ..
            } if !stdout.is_empty() => out.push(stdout),
            CommandOutcome::Finished { stderr, .. } => {
                out.push("Could not retrieve detailed USB information".to_string());
                if !stderr.is_empty() {
                    out.push(format!("Error: {}", stderr));
                }
            }
            CommandOutcome::TimedOut => {
                log::warn!("{} -v -d {} timed out", program, filter);
                out.push("Timeout while retrieving detailed USB information".to_string());
            }
            CommandOutcome::LaunchFailed(e) => {
                out.push(format!("Error running {}: {}", program, e));
            }
        }
    }

    fn system_section(&self, device: &DeviceRecord, out: &mut Vec<String>) {
        out.push("=== SYSTEM DEVICE INFORMATION (udevadm) ===".to_string());

        let pattern = bus_glob(&device.bus);
        let find = &self.settings.find_program;
        let search = process::run_with_timeout(
            find,
            [
                self.settings.device_tree_root.as_str(),
                "-name",
                pattern.as_str(),
            ],
            self.settings.lookup_timeout(),
        );

        let listing = match search {
            CommandOutcome::Finished {
                success: true,
                stdout,
                ..
            } if !stdout.trim().is_empty() => stdout,
            CommandOutcome::Finished { .. } => {
                out.push("Could not find device in sysfs".to_string());
                return;
            }
            CommandOutcome::TimedOut => {
                out.push("Timeout while searching sysfs for the device".to_string());
                return;
            }
            CommandOutcome::LaunchFailed(e) => {
                out.push(format!("Error running {}: {}", find, e));
                return;
            }
        };

        let candidates: Vec<&str> = listing
            .lines()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        // Only the first path that answers is queried to completion.
        // 只使用第一个成功应答的路径
        match candidates.iter().find_map(|path| self.query_metadata(path)) {
            Some(section) => out.push(section),
            None => out.push(format!(
                "Could not query {} for any of {} sysfs paths",
                self.settings.udevadm_program,
                candidates.len()
            )),
        }
    }

    fn query_metadata(&self, path: &str) -> Option<String> {
        let udevadm = &self.settings.udevadm_program;
        let outcome = process::run_with_timeout(
            udevadm,
            ["info", "--path", path],
            self.settings.lookup_timeout(),
        );
        match outcome.success_stdout() {
            Some(stdout) => Some(format!("Device path: {}\n{}", path, stdout)),
            None => {
                log::debug!("{} info --path {} failed: {:?}", udevadm, path, outcome);
                None
            }
        }
    }
}

impl DeviceInspector for CommandInspector {
    fn inspect(&self, device: &DeviceRecord) -> InspectionReport {
        log::info!(
            "inspecting {}:{} on bus {}",
            device.vendor_id,
            device.product_id,
            device.bus
        );

        let mut sections = basic_section(device);
        sections.push(String::new());
        self.verbose_section(device, &mut sections);
        sections.push(String::new());
        self.system_section(device, &mut sections);

        InspectionReport::new(device, sections.join("\n"))
    }
}

fn basic_section(device: &DeviceRecord) -> Vec<String> {
    vec![
        "=== BASIC DEVICE INFORMATION ===".to_string(),
        format!("Device Name: {}", device.description),
        format!("USB Bus: {}", device.bus),
        format!("Device Number: {}", device.device_number),
        format!("Vendor ID: {}", device.vendor_id),
        format!("Product ID: {}", device.product_id),
    ]
}

/// sysfs names USB devices `<bus>-<port path>` with an unpadded bus number,
/// while listings print it zero-padded.
pub fn bus_glob(bus: &str) -> String {
    let trimmed = bus.trim_start_matches('0');
    let number = if trimmed.is_empty() { "0" } else { trimmed };
    format!("{}-*", number)
}

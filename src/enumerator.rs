//! Device enumeration via `lsusb`.
//!
//! Each line of `lsusb` output looks like:
//!
//! ```text
//! Bus 001 Device 004: ID 0951:1666 Kingston Technology DataTraveler 100 G3
//! ```
//!
//! Tokens 1 and 3 are the bus and device slot, token 5 is `vendor:product`,
//! and everything after it is the free-text description.

use crate::config::EnumerationSettings;
use crate::process::{self, CommandOutcome};
use crate::{DeviceRecord, DeviceSource, UNKNOWN_DEVICE};

const BUS_TOKEN: usize = 1;
const DEVICE_TOKEN: usize = 3;
const ID_TOKEN: usize = 5;
const MIN_TOKENS: usize = 6;

/// Enumerates devices by running an external listing command.
pub struct CommandEnumerator {
    program: String,
    args: Vec<String>,
}

impl Default for CommandEnumerator {
    fn default() -> Self {
        Self::from_settings(&EnumerationSettings::default())
    }
}

impl CommandEnumerator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_settings(settings: &EnumerationSettings) -> Self {
        Self::new(settings.program.clone(), settings.args.clone())
    }
}

impl DeviceSource for CommandEnumerator {
    fn enumerate(&self) -> Vec<DeviceRecord> {
        // A failed listing is reported as an empty table, never as an error.
        // 枚举失败时返回空列表，而不是报错
        match process::run(&self.program, &self.args) {
            CommandOutcome::Finished {
                success: true,
                stdout,
                ..
            } => parse_listing(&stdout),
            CommandOutcome::Finished { code, stderr, .. } => {
                log::warn!(
                    "{} exited with {:?}: {}",
                    self.program,
                    code,
                    stderr.trim()
                );
                Vec::new()
            }
            CommandOutcome::LaunchFailed(e) => {
                log::warn!("failed to run {}: {}", self.program, e);
                Vec::new()
            }
            CommandOutcome::TimedOut => {
                log::warn!("{} timed out", self.program);
                Vec::new()
            }
        }
    }
}

/// Parse a whole listing, skipping every line that is not a device entry.
pub fn parse_listing(output: &str) -> Vec<DeviceRecord> {
    output.lines().filter_map(parse_line).collect()
}

/// Parse one listing line.
/// Banner lines and anything else that does not fit the layout yield `None`.
pub fn parse_line(line: &str) -> Option<DeviceRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < MIN_TOKENS {
        return None;
    }

    // `vendor:product` must split into exactly two halves
    // `vendor:product` 必须恰好分成两部分
    let mut id = tokens[ID_TOKEN].split(':');
    let (vendor_id, product_id) = match (id.next(), id.next(), id.next()) {
        (Some(vendor), Some(product), None) => (vendor, product),
        _ => return None,
    };

    let description = if tokens.len() > MIN_TOKENS {
        tokens[MIN_TOKENS..].join(" ")
    } else {
        UNKNOWN_DEVICE.to_string()
    };

    Some(DeviceRecord {
        bus: strip_separator(tokens[BUS_TOKEN]).to_string(),
        device_number: strip_separator(tokens[DEVICE_TOKEN]).to_string(),
        vendor_id: vendor_id.to_string(),
        product_id: product_id.to_string(),
        description,
    })
}

fn strip_separator(token: &str) -> &str {
    token.trim_end_matches(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Bus 002 Device 001: ID 1d6b:0003 Linux Foundation 3.0 root hub
Bus 001 Device 004: ID 0951:1666 Kingston Technology DataTraveler 100 G3
Bus 001 Device 003: ID abcd:1234
Bus 001 Device 001: ID 1d6b:0002 Linux Foundation 2.0 root hub
";

    #[test]
    fn parses_every_device_line_in_order() {
        let devices = parse_listing(LISTING);
        assert_eq!(devices.len(), 4);
        assert_eq!(
            devices[1],
            DeviceRecord::new(
                "001",
                "004",
                "0951",
                "1666",
                "Kingston Technology DataTraveler 100 G3"
            )
        );
        assert_eq!(devices[3].description, "Linux Foundation 2.0 root hub");
    }

    #[test]
    fn missing_description_becomes_unknown_device() {
        let dev = parse_line("Bus 001 Device 003: ID abcd:1234").unwrap();
        assert_eq!(dev.description, UNKNOWN_DEVICE);
        assert_eq!(dev.device_number, "003");
    }

    #[test]
    fn description_whitespace_is_collapsed() {
        let dev = parse_line("Bus 003 Device 002: ID 046d:c52b   Logitech,  Inc.   Receiver").unwrap();
        assert_eq!(dev.description, "Logitech, Inc. Receiver");
    }

    #[test]
    fn short_lines_are_skipped() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("Bus 001 Device 003: ID"), None);
        assert_eq!(parse_line("  Couldn't open device, some information will be missing"), None);
    }

    #[test]
    fn id_without_exactly_one_colon_is_skipped() {
        assert_eq!(parse_line("Bus 001 Device 003: ID abcd1234 Mouse"), None);
        assert_eq!(parse_line("Bus 001 Device 003: ID ab:cd:12 Mouse"), None);
    }

    #[test]
    fn malformed_lines_do_not_abort_the_listing() {
        let listing = "garbage\nBus 001 Device 002: ID abcd:1234 Mouse\nBus x y z ID nocolon\n";
        let devices = parse_listing(listing);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].description, "Mouse");
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_yields_empty_table() {
        let missing = CommandEnumerator::new("/nonexistent/lsusb", Vec::new());
        assert!(missing.enumerate().is_empty());

        let failing = CommandEnumerator::new("false", Vec::new());
        assert!(failing.enumerate().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn runs_configured_command() {
        let echo = CommandEnumerator::new(
            "echo",
            vec!["Bus 001 Device 002: ID abcd:1234 Mouse".to_string()],
        );
        let devices = echo.capture();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].vendor_id, "abcd");
    }
}

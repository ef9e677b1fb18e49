use std::collections::HashSet;

use crate::DeviceRecord;

/// Records of `observed` whose identity does not appear in `baseline`.
///
/// `observed` order is kept and duplicates are not collapsed, so two copies
/// of a new identity are both returned. Pass the captures the other way
/// round to get the records that vanished.
pub fn difference(baseline: &[DeviceRecord], observed: &[DeviceRecord]) -> Vec<DeviceRecord> {
    let known: HashSet<_> = baseline.iter().map(DeviceRecord::identity).collect();
    observed
        .iter()
        .filter(|dev| !known.contains(&dev.identity()))
        .cloned()
        .collect()
}

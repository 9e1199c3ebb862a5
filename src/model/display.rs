use serde::Serialize;

/// Presentation toggles. They travel with the collection but never change
/// what is collected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DisplayOptions {
    /// Show byte counts unscaled.
    pub raw_bytes: bool,
    /// Leave the packet counters out of each record.
    pub simple_mode: bool,
}

use serde::{Deserialize, Serialize};

use crate::version::FormatVersion;

/// Knobs for [`DataWin::parse_with`](crate::DataWin::parse_with).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Format version to assume instead of the one GEN8 reports.
    pub version_override: Option<FormatVersion>,
}

/// Knobs for [`DataWin::to_bytes_with`](crate::DataWin::to_bytes_with).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Format version to encode for instead of the loaded one.
    pub version_override: Option<FormatVersion>,
    /// Zero-pad after every chunk so the next one starts at a multiple of
    /// this many bytes.
    pub chunk_alignment: Option<u32>,
}

/// Both option sets, as loaded from a JSON config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub read: ReadOptions,
    pub write: WriteOptions,
}

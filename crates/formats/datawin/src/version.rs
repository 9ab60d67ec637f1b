use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bytecode version extracted from GEN8.
///
/// Known versions:
/// - 13: Early GameMaker: Studio
/// - 14: GameMaker: Studio 1.x (old instruction format)
/// - 15: GameMaker: Studio 1.4.x (new instruction format, VARI extended)
/// - 16: GameMaker: Studio 1.4.9999+ (adds LANG, GLOB chunks)
/// - 17: GameMaker Studio 2.x
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BytecodeVersion(pub u8);

impl BytecodeVersion {
    pub const V15: Self = Self(15);
    pub const V17: Self = Self(17);

    /// Whether the instruction encoding and the CODE/VARI/FUNC layouts are
    /// ones we can read (v15+). v14 and below use a different opcode
    /// numbering and headerless chunks.
    pub fn is_supported(self) -> bool {
        self.0 >= 15
    }
}

impl fmt::Display for BytecodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// IDE/runtime version that produced the file (`major.minor.release.build`).
///
/// This is the value that gates the pointer encoding variants. GEN8 carries
/// one, but 2.3+ games commonly still report 2.0 there, so readers and writers
/// accept an override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
    pub release: u32,
    pub build: u32,
}

impl FormatVersion {
    pub const fn new(major: u32, minor: u32, release: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            release,
            build,
        }
    }

    pub fn is_at_least(self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }

    /// Whether FUNC/VARI `first_address` points to the operand word (4 bytes
    /// into the instruction) rather than the instruction word itself.
    pub fn first_address_is_operand(self) -> bool {
        self.is_at_least(2, 3)
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.release, self.build)
    }
}

impl FromStr for FormatVersion {
    type Err = String;

    /// Accepts `major.minor`, `major.minor.release` or the full four parts.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts = s
            .split('.')
            .map(|p| p.trim().parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid version {s:?}: {e}"))?;
        match parts[..] {
            [major, minor] => Ok(Self::new(major, minor, 0, 0)),
            [major, minor, release] => Ok(Self::new(major, minor, release, 0)),
            [major, minor, release, build] => Ok(Self::new(major, minor, release, build)),
            _ => Err(format!("invalid version {s:?}: expected 2 to 4 components")),
        }
    }
}

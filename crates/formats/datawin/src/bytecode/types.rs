use crate::chunks::vari::VariableId;
use crate::refchain::LINK_MASK;

/// Data type for instruction operands (4-bit field).
///
/// For branch instructions, the "type" nibbles are really part of the branch
/// offset encoding and may hold values outside the known set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Double,
    Float,
    Int32,
    Int64,
    Bool,
    Variable,
    String,
    Int16,
    /// Raw 4-bit value not matching any known type (e.g. branch offset bits).
    Raw(u8),
}

impl DataType {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0x0 => Self::Double,
            0x1 => Self::Float,
            0x2 => Self::Int32,
            0x3 => Self::Int64,
            0x4 => Self::Bool,
            0x5 => Self::Variable,
            0x6 => Self::String,
            0xF => Self::Int16,
            _ => Self::Raw(v),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Double => 0x0,
            Self::Float => 0x1,
            Self::Int32 => 0x2,
            Self::Int64 => 0x3,
            Self::Bool => 0x4,
            Self::Variable => 0x5,
            Self::String => 0x6,
            Self::Int16 => 0xF,
            Self::Raw(v) => v,
        }
    }
}

/// Comparison kind for Cmp instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ComparisonKind {
    Less = 1,
    LessEqual = 2,
    Equal = 3,
    NotEqual = 4,
    GreaterEqual = 5,
    Greater = 6,
}

impl ComparisonKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Less),
            2 => Some(Self::LessEqual),
            3 => Some(Self::Equal),
            4 => Some(Self::NotEqual),
            5 => Some(Self::GreaterEqual),
            6 => Some(Self::Greater),
            _ => None,
        }
    }
}

/// A function or variable reference embedded in an operand word.
///
/// Freshly decoded bytecode holds the raw chain link (forward distance in
/// bytes to the next occurrence, 0 at the end). Once the reference chains
/// are walked every link is replaced by the id it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reference<T> {
    Link(u32),
    Target(T),
}

impl<T> Reference<T> {
    pub fn target(self) -> Option<T> {
        match self {
            Self::Target(t) => Some(t),
            Self::Link(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reference<U> {
        match self {
            Self::Link(link) => Reference::Link(link),
            Self::Target(t) => Reference::Target(f(t)),
        }
    }

    /// Value of the link bits when encoding; resolved targets are threaded
    /// later and start out as 0.
    pub(crate) fn raw_link(&self) -> u32 {
        match self {
            Self::Link(link) => link & LINK_MASK,
            Self::Target(_) => 0,
        }
    }
}

/// Variable operand: chain reference plus reference-type bits.
///
/// On the wire the operand word is `ref_type << 24 | link` with the link in
/// the low 27 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableOperand {
    pub target: Reference<VariableId>,
    /// Reference type bits (top five bits of the operand word).
    pub ref_type: u8,
}

impl VariableOperand {
    pub fn from_raw(raw: u32) -> Self {
        Self {
            target: Reference::Link(raw & LINK_MASK),
            ref_type: ((raw >> 24) & 0xF8) as u8,
        }
    }

    /// Encode back to the raw u32 format.
    pub fn to_raw(self) -> u32 {
        ((self.ref_type as u32) << 24) | self.target.raw_link()
    }
}

//! Scalar types and address spaces of the virtual ISA.
//!
//! Every register, immediate and memory operand of a kernel carries one of the
//! [`ScalarType`]s defined here. Layout decisions (call-parameter packing, external
//! shared alignment) and code generation both key off [`ScalarType::bytes`].


/// Address space an instruction or declaration refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[derive(strum::Display, strum::EnumString, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum AddressSpace {
    /// Unqualified address; resolved by the layout passes or treated as a host pointer.
    #[default]
    Generic,
    /// Device global memory, bound to concrete allocations at link time.
    Global,
    /// Per-block shared memory.
    Shared,
    /// Read-only constant bank.
    Const,
    /// Per-thread local memory.
    Local,
    /// Kernel arguments and call parameters.
    Param,
    /// Texture references.
    Texture,
}

/// Scalar types of the virtual ISA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumString, strum::EnumIter, strum::EnumCount)]
#[strum(serialize_all = "lowercase")]
pub enum ScalarType {
    Pred,

    B8,
    B16,
    B32,
    B64,

    U8,
    U16,
    U32,
    U64,

    S8,
    S16,
    S32,
    S64,

    F16,
    F32,
    F64,
}

impl ScalarType {
    /// Width of one element in bytes.
    ///
    /// Predicates occupy a single byte when spilled to memory.
    pub const fn bytes(&self) -> u32 {
        match self {
            Self::Pred => 1,
            Self::B8 | Self::U8 | Self::S8 => 1,
            Self::B16 | Self::U16 | Self::S16 | Self::F16 => 2,
            Self::B32 | Self::U32 | Self::S32 | Self::F32 => 4,
            Self::B64 | Self::U64 | Self::S64 | Self::F64 => 8,
        }
    }

    pub const fn bits(&self) -> u32 {
        self.bytes() * 8
    }

    pub const fn is_pred(&self) -> bool {
        matches!(self, Self::Pred)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::S8 | Self::S16 | Self::S32 | Self::S64)
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    /// Untyped bit containers (`.b32` and friends).
    pub const fn is_bits(&self) -> bool {
        matches!(self, Self::B8 | Self::B16 | Self::B32 | Self::B64)
    }

    pub const fn is_int(&self) -> bool {
        self.is_signed() || self.is_unsigned() || self.is_bits()
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::F16 | Self::F32 | Self::F64)
    }
}

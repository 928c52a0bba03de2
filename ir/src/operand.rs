//! Instruction operands.

use std::fmt;

use warpjit_dtype::ScalarType;

/// How an operand denotes its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    /// Virtual register `reg`.
    Register,
    /// Literal value.
    Immediate,
    /// Read-only special register (thread/block coordinates).
    Special,
    /// Named storage location plus `offset` (`[sym+4]`).
    Address,
    /// Register holding an address plus `offset` (`[%r1+4]`).
    Indirect,
    /// Target of a call.
    FunctionName,
    /// Branch target.
    Label,
    /// Parenthesized argument list of a call.
    ArgumentList,
    /// Operand slot is unused.
    #[default]
    Invalid,
}

/// Memory region an address operand has been resolved into.
///
/// Assigned by the layout passes; `offset` is then relative to the start of the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Region {
    Global,
    Argument,
    Parameter,
    Shared,
    Constant,
    Local,
    Texture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Dim {
    X,
    Y,
    Z,
}

impl Dim {
    pub const fn index(&self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialRegister {
    /// `%tid`
    ThreadId(Dim),
    /// `%ntid`
    BlockDim(Dim),
    /// `%ctaid`
    BlockId(Dim),
    /// `%nctaid`
    GridDim(Dim),
}

impl fmt::Display for SpecialRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadId(d) => write!(f, "%tid.{d}"),
            Self::BlockDim(d) => write!(f, "%ntid.{d}"),
            Self::BlockId(d) => write!(f, "%ctaid.{d}"),
            Self::GridDim(d) => write!(f, "%nctaid.{d}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    Int(i64),
    Float(f64),
}

impl Default for Immediate {
    fn default() -> Self {
        Self::Int(0)
    }
}

/// A single operand of an [`Instruction`](crate::Instruction).
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub mode: AddressMode,
    pub ty: ScalarType,
    /// Symbol, function or label name; register name for indirect operands.
    pub identifier: String,
    /// Register number, or the binding slot of a resolved texture symbol.
    pub reg: u32,
    /// Byte offset; after layout, relative to the start of `region`.
    pub offset: i64,
    pub imm: Immediate,
    pub special: Option<SpecialRegister>,
    pub region: Option<Region>,
    /// Elements of an argument list.
    pub array: Vec<Operand>,
}

impl Default for Operand {
    fn default() -> Self {
        Self {
            mode: AddressMode::Invalid,
            ty: ScalarType::B32,
            identifier: String::new(),
            reg: 0,
            offset: 0,
            imm: Immediate::default(),
            special: None,
            region: None,
            array: Vec::new(),
        }
    }
}

impl Operand {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn register(reg: u32, ty: ScalarType) -> Self {
        Self { mode: AddressMode::Register, ty, identifier: format!("%r{reg}"), reg, ..Self::default() }
    }

    pub fn immediate(value: i64, ty: ScalarType) -> Self {
        Self { mode: AddressMode::Immediate, ty, imm: Immediate::Int(value), ..Self::default() }
    }

    pub fn float(value: f64, ty: ScalarType) -> Self {
        Self { mode: AddressMode::Immediate, ty, imm: Immediate::Float(value), ..Self::default() }
    }

    pub fn special(special: SpecialRegister, ty: ScalarType) -> Self {
        Self { mode: AddressMode::Special, ty, special: Some(special), ..Self::default() }
    }

    /// Symbolic address of a named storage location.
    pub fn address(symbol: impl Into<String>) -> Self {
        Self { mode: AddressMode::Address, ty: ScalarType::U64, identifier: symbol.into(), ..Self::default() }
    }

    /// Address held in register `reg`, displaced by `offset`.
    pub fn indirect(reg: u32, offset: i64) -> Self {
        Self {
            mode: AddressMode::Indirect,
            ty: ScalarType::U64,
            identifier: format!("%r{reg}"),
            reg,
            offset,
            ..Self::default()
        }
    }

    pub fn function(name: impl Into<String>) -> Self {
        Self { mode: AddressMode::FunctionName, identifier: name.into(), ..Self::default() }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self { mode: AddressMode::Label, identifier: name.into(), ..Self::default() }
    }

    pub fn arguments(elements: impl IntoIterator<Item = Operand>) -> Self {
        Self { mode: AddressMode::ArgumentList, array: elements.into_iter().collect(), ..Self::default() }
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_type(mut self, ty: ScalarType) -> Self {
        self.ty = ty;
        self
    }

    /// Whether the operand refers to memory by name or through a register.
    ///
    /// Only such operands are rewritten by the layout passes.
    pub fn is_memory_reference(&self) -> bool {
        matches!(self.mode, AddressMode::Address | AddressMode::Indirect)
    }

    pub fn is_argument(&self) -> bool {
        self.region == Some(Region::Argument)
    }

    pub fn is_valid(&self) -> bool {
        self.mode != AddressMode::Invalid
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            AddressMode::Register => write!(f, "%r{}", self.reg),
            AddressMode::Immediate => match self.imm {
                Immediate::Int(v) => write!(f, "{v}"),
                Immediate::Float(v) => write!(f, "{v:?}"),
            },
            AddressMode::Special => match self.special {
                Some(special) => write!(f, "{special}"),
                None => f.write_str("%special"),
            },
            AddressMode::Address | AddressMode::Indirect => {
                if self.offset == 0 {
                    write!(f, "[{}]", self.identifier)
                } else {
                    write!(f, "[{}+{}]", self.identifier, self.offset)
                }
            }
            AddressMode::FunctionName | AddressMode::Label => f.write_str(&self.identifier),
            AddressMode::ArgumentList => {
                f.write_str("(")?;
                for (i, element) in self.array.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&element.identifier)?;
                }
                f.write_str(")")
            }
            AddressMode::Invalid => Ok(()),
        }
    }
}

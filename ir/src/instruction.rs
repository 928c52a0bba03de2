//! Virtual-ISA instructions.
//!
//! Operand roles follow the ISA's textual order:
//!
//! | opcode | `d` | `a` | `b` | `c` |
//! |---|---|---|---|---|
//! | `mov`, `cvta`, `cvt` | destination | source | | |
//! | `ld` | destination register | address | | |
//! | `st` | address | value | | |
//! | arithmetic, `setp` | destination | lhs | rhs | addend (`mad`) |
//! | `selp` | destination | if true | if false | predicate |
//! | `call` | return arguments | callee | input arguments | |
//! | `tex` | destination | texture symbol | | coordinate |
//! | `bra` | label | | | |

use std::fmt;

use warpjit_dtype::{AddressSpace, ScalarType};

use crate::kernel::SubkernelId;
use crate::operand::{AddressMode, Operand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Opcode {
    Mov,
    Ld,
    St,
    Cvta,
    Cvt,
    Add,
    Sub,
    Mul,
    Mad,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Setp,
    Selp,
    Bra,
    Call,
    Tex,
    Bar,
    Ret,
    Exit,
}

impl Opcode {
    /// Opcodes after which control never falls through to the next instruction.
    pub const fn is_terminator(&self) -> bool {
        matches!(self, Self::Bra | Self::Ret | Self::Exit | Self::Bar)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Predicate guard (`@%p1` / `@!%p1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guard {
    pub reg: u32,
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub ty: ScalarType,
    pub space: AddressSpace,
    pub compare: Option<CompareOp>,
    pub guard: Option<Guard>,
    /// Call reuses the caller's parameter frame.
    pub tail_call: bool,
    /// Subkernel a call transfers to, once resolved.
    pub target: Option<SubkernelId>,
    pub d: Operand,
    pub a: Operand,
    pub b: Operand,
    pub c: Operand,
}

impl Instruction {
    pub fn new(opcode: Opcode, ty: ScalarType) -> Self {
        Self {
            opcode,
            ty,
            space: AddressSpace::Generic,
            compare: None,
            guard: None,
            tail_call: false,
            target: None,
            d: Operand::none(),
            a: Operand::none(),
            b: Operand::none(),
            c: Operand::none(),
        }
    }

    pub fn mov(ty: ScalarType, d: Operand, a: Operand) -> Self {
        Self::new(Opcode::Mov, ty).with_d(d).with_a(a)
    }

    pub fn ld(space: AddressSpace, ty: ScalarType, reg: u32, address: Operand) -> Self {
        Self::new(Opcode::Ld, ty).with_space(space).with_d(Operand::register(reg, ty)).with_a(address.with_type(ty))
    }

    pub fn st(space: AddressSpace, ty: ScalarType, address: Operand, value: Operand) -> Self {
        Self::new(Opcode::St, ty).with_space(space).with_d(address.with_type(ty)).with_a(value)
    }

    pub fn binary(opcode: Opcode, ty: ScalarType, d: u32, a: Operand, b: Operand) -> Self {
        Self::new(opcode, ty).with_d(Operand::register(d, ty)).with_a(a).with_b(b)
    }

    pub fn setp(compare: CompareOp, ty: ScalarType, d: u32, a: Operand, b: Operand) -> Self {
        let mut inst = Self::new(Opcode::Setp, ty).with_d(Operand::register(d, ScalarType::Pred)).with_a(a).with_b(b);
        inst.compare = Some(compare);
        inst
    }

    /// `call (outputs), callee, (inputs)`.
    pub fn call(
        callee: impl Into<String>,
        outputs: impl IntoIterator<Item = Operand>,
        inputs: impl IntoIterator<Item = Operand>,
    ) -> Self {
        Self::new(Opcode::Call, ScalarType::B32)
            .with_d(Operand::arguments(outputs))
            .with_a(Operand::function(callee))
            .with_b(Operand::arguments(inputs))
    }

    /// Tail call emitted by the partitioner with its target already known.
    pub fn tail_call(callee: impl Into<String>, target: SubkernelId) -> Self {
        let mut inst = Self::call(callee, [], []);
        inst.tail_call = true;
        inst.target = Some(target);
        inst
    }

    pub fn tex(ty: ScalarType, d: u32, texture: impl Into<String>, coordinate: Operand) -> Self {
        Self::new(Opcode::Tex, ty)
            .with_space(AddressSpace::Texture)
            .with_d(Operand::register(d, ty))
            .with_a(Operand::address(texture))
            .with_c(coordinate)
    }

    pub fn bra(label: impl Into<String>) -> Self {
        Self::new(Opcode::Bra, ScalarType::B32).with_d(Operand::label(label))
    }

    pub fn bar() -> Self {
        Self::new(Opcode::Bar, ScalarType::B32)
    }

    pub fn ret() -> Self {
        Self::new(Opcode::Ret, ScalarType::B32)
    }

    pub fn exit() -> Self {
        Self::new(Opcode::Exit, ScalarType::B32)
    }

    pub fn with_space(mut self, space: AddressSpace) -> Self {
        self.space = space;
        self
    }

    pub fn with_guard(mut self, reg: u32, negated: bool) -> Self {
        self.guard = Some(Guard { reg, negated });
        self
    }

    pub fn with_d(mut self, d: Operand) -> Self {
        self.d = d;
        self
    }

    pub fn with_a(mut self, a: Operand) -> Self {
        self.a = a;
        self
    }

    pub fn with_b(mut self, b: Operand) -> Self {
        self.b = b;
        self
    }

    pub fn with_c(mut self, c: Operand) -> Self {
        self.c = c;
        self
    }

    pub fn operands(&self) -> [&Operand; 4] {
        [&self.d, &self.a, &self.b, &self.c]
    }

    pub fn operands_mut(&mut self) -> [&mut Operand; 4] {
        [&mut self.d, &mut self.a, &mut self.b, &mut self.c]
    }

    /// Whether `a` names a function (calls and function-pointer moves).
    pub fn references_function(&self) -> bool {
        matches!(self.opcode, Opcode::Call | Opcode::Mov) && self.a.mode == AddressMode::FunctionName
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(guard) = self.guard {
            write!(f, "@{}%r{} ", if guard.negated { "!" } else { "" }, guard.reg)?;
        }
        write!(f, "{}", self.opcode)?;
        if let Some(compare) = self.compare {
            write!(f, ".{compare}")?;
        }
        if self.space != AddressSpace::Generic {
            write!(f, ".{}", self.space)?;
        }
        if !matches!(self.opcode, Opcode::Bra | Opcode::Call | Opcode::Bar | Opcode::Ret | Opcode::Exit) {
            write!(f, ".{}", self.ty)?;
        }
        let mut first = true;
        for operand in self.operands().into_iter().filter(|o| o.is_valid()) {
            f.write_str(if first { " " } else { ", " })?;
            write!(f, "{operand}")?;
            first = false;
        }
        Ok(())
    }
}

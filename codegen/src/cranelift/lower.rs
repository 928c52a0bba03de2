//! Lowering of layout-resolved subkernels to Cranelift IR.
//!
//! Every subkernel becomes one function `fn(ctx: *mut LaunchContext)`. Virtual registers
//! map to frontend variables, basic blocks map one-to-one onto Cranelift blocks, and every
//! exit from the subkernel stores a [`ResumeStatus`] (and, for calls, the target subkernel)
//! into the reserved local slots before returning.

use std::collections::{BTreeMap, HashMap};

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::immediates::Imm64;
use cranelift_codegen::ir::instructions::BlockArg;
use cranelift_codegen::ir::{
    AbiParam, Block, ExternalName, Function, GlobalValue, GlobalValueData, InstBuilder, MemFlags, Signature,
    UserExternalName, UserFuncName, Value, types,
};
use cranelift_codegen::isa::CallConv;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};
use snafu::OptionExt;
use tracing::trace;

use warpjit_dtype::{AddressSpace, ScalarType};
use warpjit_ir::{
    AddressMode, CompareOp, DIVERGENCE_MARKER, Guard, Immediate, Instruction, Opcode, Operand, Region, SpecialRegister,
    Subkernel,
};

use super::types::{convert, int_immediate, reinterpret, scalar_to_cranelift_type};
use crate::abi::{ExitSlots, LaunchContext, ResumeStatus};
use crate::error::{
    OffsetOutOfRangeSnafu, Result, UnknownLabelSnafu, UnresolvedCallSnafu, UnresolvedSymbolSnafu,
    UnsupportedInstructionSnafu,
};

/// External-name namespace of imported data symbols (namespace 0 holds functions).
pub(crate) const DATA_NAMESPACE: u32 = 1;

/// A lowered function and the data symbols it imports, in import-index order.
pub(crate) struct Lowered {
    pub func: Function,
    pub symbols: Vec<String>,
}

pub(crate) fn lower_subkernel(subkernel: &Subkernel, name: &str, call_conv: CallConv, exits: ExitSlots) -> Result<Lowered> {
    let mut signature = Signature::new(call_conv);
    signature.params.push(AbiParam::new(types::I64));

    let mut func = Function::with_name_signature(UserFuncName::testcase(name), signature);
    let mut func_ctx = FunctionBuilderContext::new();

    let symbols = {
        let builder = FunctionBuilder::new(&mut func, &mut func_ctx);
        let mut lowering = Lowering::new(subkernel, builder, exits)?;
        lowering.lower_blocks()?;
        lowering.finish()
    };

    trace!(function = name, symbols = symbols.len(), "lowered subkernel");
    Ok(Lowered { func, symbols })
}

struct Lowering<'a, 'f> {
    subkernel: &'a Subkernel,
    builder: FunctionBuilder<'f>,
    context: Value,
    exits: ExitSlots,
    registers: HashMap<u32, (Variable, ScalarType)>,
    blocks: Vec<Block>,
    symbols: Vec<String>,
    globals: HashMap<String, GlobalValue>,
    terminated: bool,
}

impl<'a, 'f> Lowering<'a, 'f> {
    fn new(subkernel: &'a Subkernel, mut builder: FunctionBuilder<'f>, exits: ExitSlots) -> Result<Self> {
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        let context = builder.block_params(entry)[0];

        // First use fixes a register's type; address registers default to u64.
        let mut declared: BTreeMap<u32, ScalarType> = BTreeMap::new();
        for inst in subkernel.cfg.instructions() {
            if let Some(guard) = inst.guard {
                declared.entry(guard.reg).or_insert(ScalarType::Pred);
            }
            for operand in inst.operands() {
                collect_registers(operand, &mut declared);
            }
        }

        let mut registers = HashMap::with_capacity(declared.len());
        for (reg, ty) in declared {
            let cl_type = scalar_to_cranelift_type(ty)?;
            let var = builder.declare_var(cl_type);
            let zero = match ty {
                ScalarType::F32 => builder.ins().f32const(0.0),
                ScalarType::F64 => builder.ins().f64const(0.0),
                _ => builder.ins().iconst(cl_type, 0),
            };
            builder.def_var(var, zero);
            registers.insert(reg, (var, ty));
        }

        let blocks: Vec<Block> = subkernel.cfg.blocks().iter().map(|_| builder.create_block()).collect();

        let mut lowering = Self {
            subkernel,
            builder,
            context,
            exits,
            registers,
            blocks,
            symbols: Vec::new(),
            globals: HashMap::new(),
            terminated: false,
        };

        match lowering.blocks.first().copied() {
            Some(first) => {
                lowering.builder.ins().jump(first, &[]);
            }
            None => lowering.exit(ResumeStatus::Exit, None)?,
        }

        Ok(lowering)
    }

    fn finish(mut self) -> Vec<String> {
        self.builder.seal_all_blocks();
        self.builder.finalize();
        self.symbols
    }

    fn lower_blocks(&mut self) -> Result<()> {
        let subkernel = self.subkernel;
        for (index, block) in subkernel.cfg.blocks().iter().enumerate() {
            self.builder.switch_to_block(self.blocks[index]);
            self.terminated = false;

            for inst in &block.instructions {
                if self.terminated {
                    // Code after a terminator is unreachable but must still be well-formed.
                    let dead = self.builder.create_block();
                    self.builder.switch_to_block(dead);
                    self.terminated = false;
                }
                self.lower_instruction(inst)?;
            }

            if !self.terminated {
                match self.blocks.get(index + 1).copied() {
                    Some(next) => {
                        self.builder.ins().jump(next, &[]);
                    }
                    None => self.exit(ResumeStatus::Exit, None)?,
                }
            }
        }
        Ok(())
    }

    fn lower_instruction(&mut self, inst: &Instruction) -> Result<()> {
        let Some(guard) = inst.guard else {
            return self.lower_body(inst);
        };

        let condition = self.guard_condition(guard)?;
        let empty_args: &[BlockArg] = &[];

        if inst.opcode == Opcode::Bra {
            let target = self.label_block(&inst.d)?;
            let fallthrough = self.builder.create_block();
            self.builder.ins().brif(condition, target, empty_args, fallthrough, empty_args);
            self.builder.switch_to_block(fallthrough);
            return Ok(());
        }

        let then_block = self.builder.create_block();
        let merge_block = self.builder.create_block();
        self.builder.ins().brif(condition, then_block, empty_args, merge_block, empty_args);

        self.builder.switch_to_block(then_block);
        self.lower_body(inst)?;
        if !self.terminated {
            self.builder.ins().jump(merge_block, empty_args);
        }

        self.builder.switch_to_block(merge_block);
        self.terminated = false;
        Ok(())
    }

    fn lower_body(&mut self, inst: &Instruction) -> Result<()> {
        let ty = inst.ty;
        match inst.opcode {
            Opcode::Mov => {
                if inst.a.mode == AddressMode::FunctionName {
                    if inst.a.identifier == DIVERGENCE_MARKER {
                        return Ok(());
                    }
                    let target = inst.target.context(UnresolvedCallSnafu {
                        subkernel: self.subkernel.name.as_str(),
                        callee: inst.a.identifier.as_str(),
                    })?;
                    let value = self.builder.ins().iconst(scalar_to_cranelift_type(ty)?, i64::from(target.0));
                    return self.assign(inst, &inst.d, value, ty);
                }
                let value = self.value(inst, &inst.a, ty)?;
                self.assign(inst, &inst.d, value, ty)
            }
            Opcode::Cvta => {
                let value = match (inst.a.mode, window_base(inst.space)) {
                    (AddressMode::Address, _) => {
                        let address = self.address(inst, &inst.a)?;
                        reinterpret(address, ScalarType::U64, ty, &mut self.builder)?
                    }
                    (_, Some(field)) => {
                        let offset = self.value(inst, &inst.a, ScalarType::U64)?;
                        let base = self.context_pointer(field);
                        let address = self.builder.ins().iadd(base, offset);
                        reinterpret(address, ScalarType::U64, ty, &mut self.builder)?
                    }
                    (_, None) => self.value(inst, &inst.a, ty)?,
                };
                self.assign(inst, &inst.d, value, ty)
            }
            Opcode::Cvt => {
                let source = self.value(inst, &inst.a, inst.a.ty)?;
                let value = convert(source, inst.a.ty, ty, &mut self.builder)?;
                self.assign(inst, &inst.d, value, ty)
            }
            Opcode::Ld => {
                let address = self.address(inst, &inst.a)?;
                let value = self.builder.ins().load(scalar_to_cranelift_type(ty)?, MemFlags::new(), address, 0);
                self.assign(inst, &inst.d, value, ty)
            }
            Opcode::St => {
                let address = self.address(inst, &inst.d)?;
                let value = self.value(inst, &inst.a, ty)?;
                self.builder.ins().store(MemFlags::new(), value, address, 0);
                Ok(())
            }
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Mad
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Shl
            | Opcode::Shr => self.lower_arithmetic(inst),
            Opcode::Setp => self.lower_compare(inst),
            Opcode::Selp => {
                let on_true = self.value(inst, &inst.a, ty)?;
                let on_false = self.value(inst, &inst.b, ty)?;
                let predicate = self.value(inst, &inst.c, ScalarType::Pred)?;
                let value = self.builder.ins().select(predicate, on_true, on_false);
                self.assign(inst, &inst.d, value, ty)
            }
            Opcode::Bra => {
                let target = self.label_block(&inst.d)?;
                self.builder.ins().jump(target, &[]);
                self.terminated = true;
                Ok(())
            }
            Opcode::Call => {
                if inst.a.identifier == DIVERGENCE_MARKER {
                    return Ok(());
                }
                let target = inst.target.context(UnresolvedCallSnafu {
                    subkernel: self.subkernel.name.as_str(),
                    callee: inst.a.identifier.as_str(),
                })?;
                let status = if inst.tail_call { ResumeStatus::TailCall } else { ResumeStatus::Call };
                self.exit(status, Some(target.0))
            }
            Opcode::Tex => self.lower_texture_fetch(inst),
            Opcode::Bar => self.exit(ResumeStatus::Barrier, None),
            Opcode::Ret | Opcode::Exit => self.exit(ResumeStatus::Exit, None),
        }
    }

    fn lower_arithmetic(&mut self, inst: &Instruction) -> Result<()> {
        let ty = inst.ty;
        let lhs = self.value(inst, &inst.a, ty)?;
        let rhs = self.value(inst, &inst.b, ty)?;
        let float = ty.is_float();

        let value = match (inst.opcode, float) {
            (Opcode::Add, false) => self.builder.ins().iadd(lhs, rhs),
            (Opcode::Add, true) => self.builder.ins().fadd(lhs, rhs),
            (Opcode::Sub, false) => self.builder.ins().isub(lhs, rhs),
            (Opcode::Sub, true) => self.builder.ins().fsub(lhs, rhs),
            (Opcode::Mul, false) => self.builder.ins().imul(lhs, rhs),
            (Opcode::Mul, true) => self.builder.ins().fmul(lhs, rhs),
            (Opcode::Mad, false) => {
                let addend = self.value(inst, &inst.c, ty)?;
                let product = self.builder.ins().imul(lhs, rhs);
                self.builder.ins().iadd(product, addend)
            }
            (Opcode::Mad, true) => {
                let addend = self.value(inst, &inst.c, ty)?;
                self.builder.ins().fma(lhs, rhs, addend)
            }
            (Opcode::And, false) => self.builder.ins().band(lhs, rhs),
            (Opcode::Or, false) => self.builder.ins().bor(lhs, rhs),
            (Opcode::Xor, false) => self.builder.ins().bxor(lhs, rhs),
            (Opcode::Shl, false) => self.builder.ins().ishl(lhs, rhs),
            (Opcode::Shr, false) if ty.is_signed() => self.builder.ins().sshr(lhs, rhs),
            (Opcode::Shr, false) => self.builder.ins().ushr(lhs, rhs),
            _ => return self.unsupported(inst),
        };

        self.assign(inst, &inst.d, value, ty)
    }

    fn lower_compare(&mut self, inst: &Instruction) -> Result<()> {
        let ty = inst.ty;
        let Some(compare) = inst.compare else {
            return self.unsupported(inst);
        };
        let lhs = self.value(inst, &inst.a, ty)?;
        let rhs = self.value(inst, &inst.b, ty)?;

        let value = if ty.is_float() {
            let cc = match compare {
                CompareOp::Eq => FloatCC::Equal,
                CompareOp::Ne => FloatCC::OrderedNotEqual,
                CompareOp::Lt => FloatCC::LessThan,
                CompareOp::Le => FloatCC::LessThanOrEqual,
                CompareOp::Gt => FloatCC::GreaterThan,
                CompareOp::Ge => FloatCC::GreaterThanOrEqual,
            };
            self.builder.ins().fcmp(cc, lhs, rhs)
        } else {
            let signed = ty.is_signed();
            let cc = match (compare, signed) {
                (CompareOp::Eq, _) => IntCC::Equal,
                (CompareOp::Ne, _) => IntCC::NotEqual,
                (CompareOp::Lt, true) => IntCC::SignedLessThan,
                (CompareOp::Lt, false) => IntCC::UnsignedLessThan,
                (CompareOp::Le, true) => IntCC::SignedLessThanOrEqual,
                (CompareOp::Le, false) => IntCC::UnsignedLessThanOrEqual,
                (CompareOp::Gt, true) => IntCC::SignedGreaterThan,
                (CompareOp::Gt, false) => IntCC::UnsignedGreaterThan,
                (CompareOp::Ge, true) => IntCC::SignedGreaterThanOrEqual,
                (CompareOp::Ge, false) => IntCC::UnsignedGreaterThanOrEqual,
            };
            self.builder.ins().icmp(cc, lhs, rhs)
        };

        self.assign(inst, &inst.d, value, ScalarType::Pred)
    }

    /// Point-sampled 1D fetch: `textures[slot][coordinate]`.
    fn lower_texture_fetch(&mut self, inst: &Instruction) -> Result<()> {
        if inst.a.region != Some(Region::Texture) {
            return UnresolvedSymbolSnafu {
                subkernel: self.subkernel.name.as_str(),
                symbol: inst.a.identifier.as_str(),
                instruction: inst.to_string(),
            }
            .fail();
        }

        let ty = inst.ty;
        let table = self.context_pointer(LaunchContext::TEXTURES);
        let slot = self.displacement(u64::from(inst.a.reg) * 8)?;
        let base = self.builder.ins().load(types::I64, MemFlags::trusted(), table, slot);

        let coordinate = self.value(inst, &inst.c, ScalarType::S64)?;
        let scaled = self.builder.ins().imul_imm(coordinate, i64::from(ty.bytes()));
        let address = self.builder.ins().iadd(base, scaled);
        let value = self.builder.ins().load(scalar_to_cranelift_type(ty)?, MemFlags::new(), address, 0);
        self.assign(inst, &inst.d, value, ty)
    }

    /// Store the resume status (and resume point) into the local region and return.
    fn exit(&mut self, status: ResumeStatus, resume_point: Option<u32>) -> Result<()> {
        let status_slot = self.displacement(u64::from(self.exits.resume_status))?;
        let local = self.context_pointer(LaunchContext::LOCAL);
        let status = self.builder.ins().iconst(types::I32, status as i64);
        self.builder.ins().store(MemFlags::trusted(), status, local, status_slot);
        if let Some(point) = resume_point {
            let point_slot = self.displacement(u64::from(self.exits.resume_point))?;
            let point = self.builder.ins().iconst(types::I32, i64::from(point));
            self.builder.ins().store(MemFlags::trusted(), point, local, point_slot);
        }
        self.builder.ins().return_(&[]);
        self.terminated = true;
        Ok(())
    }

    /// Immediate displacement of a load or store; must fit the 32-bit offset field.
    fn displacement(&self, offset: u64) -> Result<i32> {
        i32::try_from(offset)
            .ok()
            .context(OffsetOutOfRangeSnafu { subkernel: self.subkernel.name.as_str(), offset })
    }

    fn guard_condition(&mut self, guard: Guard) -> Result<Value> {
        let predicate = self.register_value(guard.reg, ScalarType::Pred)?;
        if guard.negated { Ok(self.builder.ins().icmp_imm(IntCC::Equal, predicate, 0)) } else { Ok(predicate) }
    }

    fn label_block(&self, operand: &Operand) -> Result<Block> {
        let index = self.subkernel.cfg.find_label(&operand.identifier).context(UnknownLabelSnafu {
            subkernel: self.subkernel.name.as_str(),
            label: operand.identifier.as_str(),
        })?;
        Ok(self.blocks[index.0])
    }

    /// Read an operand as a value of type `ty`.
    fn value(&mut self, inst: &Instruction, operand: &Operand, ty: ScalarType) -> Result<Value> {
        match operand.mode {
            AddressMode::Register => self.register_value(operand.reg, ty),
            AddressMode::Immediate => {
                let cl_type = scalar_to_cranelift_type(ty)?;
                let value = match (operand.imm, ty) {
                    (Immediate::Float(v), ScalarType::F32) => self.builder.ins().f32const(v as f32),
                    (Immediate::Float(v), ScalarType::F64) => self.builder.ins().f64const(v),
                    (Immediate::Int(v), ScalarType::F32) => self.builder.ins().f32const(v as f32),
                    (Immediate::Int(v), ScalarType::F64) => self.builder.ins().f64const(v as f64),
                    (Immediate::Float(v), _) => self.builder.ins().iconst(cl_type, int_immediate(cl_type, v as i64)),
                    (Immediate::Int(v), _) => self.builder.ins().iconst(cl_type, int_immediate(cl_type, v)),
                };
                Ok(value)
            }
            AddressMode::Special => {
                let Some(special) = operand.special else {
                    return self.unsupported(inst);
                };
                let (field, dim) = match special {
                    SpecialRegister::ThreadId(d) => (LaunchContext::THREAD_ID, d),
                    SpecialRegister::BlockDim(d) => (LaunchContext::BLOCK_DIM, d),
                    SpecialRegister::BlockId(d) => (LaunchContext::BLOCK_ID, d),
                    SpecialRegister::GridDim(d) => (LaunchContext::GRID_DIM, d),
                };
                let offset = field + 4 * dim.index() as i32;
                let raw = self.builder.ins().load(types::I32, MemFlags::trusted(), self.context, offset);
                convert(raw, ScalarType::U32, ty, &mut self.builder)
            }
            AddressMode::Address => {
                // Symbols outside the global window evaluate to their window offset.
                let address = match operand.region {
                    Some(Region::Global) => self.address(inst, operand)?,
                    Some(_) => self.builder.ins().iconst(types::I64, operand.offset),
                    None => return self.unresolved(inst, operand),
                };
                reinterpret(address, ScalarType::U64, ty, &mut self.builder)
            }
            AddressMode::Indirect => {
                let base = self.register_value(operand.reg, ScalarType::U64)?;
                let address = self.builder.ins().iadd_imm(base, operand.offset);
                reinterpret(address, ScalarType::U64, ty, &mut self.builder)
            }
            AddressMode::FunctionName
            | AddressMode::Label
            | AddressMode::ArgumentList
            | AddressMode::Invalid => self.unsupported(inst),
        }
    }

    /// Host address referenced by a memory operand of `inst`.
    fn address(&mut self, inst: &Instruction, operand: &Operand) -> Result<Value> {
        match operand.mode {
            AddressMode::Address => {
                let base = match operand.region {
                    Some(Region::Global) => {
                        let global = self.global(&operand.identifier);
                        self.builder.ins().symbol_value(types::I64, global)
                    }
                    Some(Region::Argument) => self.context_pointer(LaunchContext::ARGUMENT),
                    Some(Region::Parameter) => self.context_pointer(LaunchContext::PARAMETER),
                    Some(Region::Shared) => self.context_pointer(LaunchContext::SHARED),
                    Some(Region::Constant) => self.context_pointer(LaunchContext::CONSTANT),
                    Some(Region::Local) => self.context_pointer(LaunchContext::LOCAL),
                    Some(Region::Texture) | None => return self.unresolved(inst, operand),
                };
                Ok(if operand.offset != 0 { self.builder.ins().iadd_imm(base, operand.offset) } else { base })
            }
            AddressMode::Indirect => {
                let register = self.register_value(operand.reg, ScalarType::U64)?;
                let address = match window_base(inst.space) {
                    Some(field) => {
                        let base = self.context_pointer(field);
                        self.builder.ins().iadd(base, register)
                    }
                    None => register,
                };
                Ok(if operand.offset != 0 { self.builder.ins().iadd_imm(address, operand.offset) } else { address })
            }
            _ => self.unsupported(inst),
        }
    }

    fn register_value(&mut self, reg: u32, ty: ScalarType) -> Result<Value> {
        let (var, declared) = self.register(reg)?;
        let value = self.builder.use_var(var);
        reinterpret(value, declared, ty, &mut self.builder)
    }

    fn assign(&mut self, inst: &Instruction, operand: &Operand, value: Value, ty: ScalarType) -> Result<()> {
        if operand.mode != AddressMode::Register {
            return self.unsupported(inst);
        }
        let (var, declared) = self.register(operand.reg)?;
        let value = reinterpret(value, ty, declared, &mut self.builder)?;
        self.builder.def_var(var, value);
        Ok(())
    }

    fn register(&self, reg: u32) -> Result<(Variable, ScalarType)> {
        self.registers.get(&reg).copied().context(UnsupportedInstructionSnafu {
            subkernel: self.subkernel.name.as_str(),
            instruction: format!("use of undeclared register %r{reg}"),
        })
    }

    fn context_pointer(&mut self, field: i32) -> Value {
        self.builder.ins().load(types::I64, MemFlags::trusted(), self.context, field)
    }

    /// Imported data symbol for a module global, declared on first use.
    fn global(&mut self, symbol: &str) -> GlobalValue {
        if let Some(&global) = self.globals.get(symbol) {
            return global;
        }

        let index = self.symbols.len() as u32;
        let name = self.builder.func.declare_imported_user_function(UserExternalName::new(DATA_NAMESPACE, index));
        let global = self.builder.func.create_global_value(GlobalValueData::Symbol {
            name: ExternalName::user(name),
            offset: Imm64::new(0),
            colocated: false,
            tls: false,
        });

        self.symbols.push(symbol.to_string());
        self.globals.insert(symbol.to_string(), global);
        global
    }

    fn unsupported<T>(&self, inst: &Instruction) -> Result<T> {
        UnsupportedInstructionSnafu { subkernel: self.subkernel.name.as_str(), instruction: inst.to_string() }.fail()
    }

    fn unresolved<T>(&self, inst: &Instruction, operand: &Operand) -> Result<T> {
        UnresolvedSymbolSnafu {
            subkernel: self.subkernel.name.as_str(),
            symbol: operand.identifier.as_str(),
            instruction: inst.to_string(),
        }
        .fail()
    }
}

fn collect_registers(operand: &Operand, declared: &mut BTreeMap<u32, ScalarType>) {
    match operand.mode {
        AddressMode::Register => {
            declared.entry(operand.reg).or_insert(operand.ty);
        }
        AddressMode::Indirect => {
            declared.entry(operand.reg).or_insert(ScalarType::U64);
        }
        AddressMode::ArgumentList => {
            for element in &operand.array {
                collect_registers(element, declared);
            }
        }
        _ => {}
    }
}

/// Context field holding the base of a state-space window, if the space has one.
fn window_base(space: AddressSpace) -> Option<i32> {
    match space {
        AddressSpace::Shared => Some(LaunchContext::SHARED),
        AddressSpace::Const => Some(LaunchContext::CONSTANT),
        AddressSpace::Local => Some(LaunchContext::LOCAL),
        AddressSpace::Param => Some(LaunchContext::PARAMETER),
        AddressSpace::Generic | AddressSpace::Global | AddressSpace::Texture => None,
    }
}

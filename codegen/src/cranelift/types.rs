//! Cranelift type mappings and value conversions.

use cranelift_codegen::ir::{InstBuilder, MemFlags, Type, Value, types};
use cranelift_frontend::FunctionBuilder;
use warpjit_dtype::ScalarType;

use crate::error::{Result, UnsupportedTypeSnafu};

/// Convert a scalar type to its Cranelift register type.
pub fn scalar_to_cranelift_type(ty: ScalarType) -> Result<Type> {
    let cl = match ty {
        ScalarType::Pred => types::I8, // Cranelift has no i1, use i8
        ScalarType::B8 | ScalarType::U8 | ScalarType::S8 => types::I8,
        ScalarType::B16 | ScalarType::U16 | ScalarType::S16 => types::I16,
        ScalarType::B32 | ScalarType::U32 | ScalarType::S32 => types::I32,
        ScalarType::B64 | ScalarType::U64 | ScalarType::S64 => types::I64,
        ScalarType::F32 => types::F32,
        ScalarType::F64 => types::F64,
        ScalarType::F16 => return UnsupportedTypeSnafu { ty }.fail(),
    };
    Ok(cl)
}

/// Immediate for `iconst`, zero-extended from the type's width.
pub fn int_immediate(ty: Type, value: i64) -> i64 {
    match ty.bits() {
        64 => value,
        bits => value & ((1i64 << bits) - 1),
    }
}

/// Reinterpret the bits of a register value as another type.
///
/// Same-width int/float pairs are bitcast; integer width changes truncate or
/// extend according to the source signedness.
pub fn reinterpret(value: Value, from: ScalarType, to: ScalarType, builder: &mut FunctionBuilder) -> Result<Value> {
    let src = scalar_to_cranelift_type(from)?;
    let dst = scalar_to_cranelift_type(to)?;
    if src == dst {
        return Ok(value);
    }

    if src.bits() == dst.bits() {
        return Ok(builder.ins().bitcast(dst, MemFlags::new(), value));
    }

    // Width change through the integer domain.
    let value = if src.is_float() { builder.ins().bitcast(src.as_int(), MemFlags::new(), value) } else { value };
    let int_dst = dst.as_int();
    let resized = resize_int(value, src.as_int(), int_dst, from.is_signed(), builder);
    if dst.is_float() { Ok(builder.ins().bitcast(dst, MemFlags::new(), resized)) } else { Ok(resized) }
}

/// Numeric conversion as performed by `cvt`.
pub fn convert(value: Value, from: ScalarType, to: ScalarType, builder: &mut FunctionBuilder) -> Result<Value> {
    if from == to {
        return Ok(value);
    }

    let src = scalar_to_cranelift_type(from)?;
    let dst = scalar_to_cranelift_type(to)?;

    let result = match (from.is_float(), to.is_float()) {
        (true, true) => {
            if src.bits() > dst.bits() {
                builder.ins().fdemote(dst, value)
            } else if src.bits() < dst.bits() {
                builder.ins().fpromote(dst, value)
            } else {
                value
            }
        }
        (true, false) => {
            // Saturating, so out-of-range values do not trap.
            let wide = if dst.bits() < 32 { types::I32 } else { dst };
            let converted = if to.is_signed() {
                builder.ins().fcvt_to_sint_sat(wide, value)
            } else {
                builder.ins().fcvt_to_uint_sat(wide, value)
            };
            if wide != dst { builder.ins().ireduce(dst, converted) } else { converted }
        }
        (false, true) => {
            let value = if src.bits() < 32 { resize_int(value, src, types::I32, from.is_signed(), builder) } else { value };
            if from.is_signed() {
                builder.ins().fcvt_from_sint(dst, value)
            } else {
                builder.ins().fcvt_from_uint(dst, value)
            }
        }
        (false, false) => resize_int(value, src, dst, from.is_signed(), builder),
    };

    Ok(result)
}

fn resize_int(value: Value, src: Type, dst: Type, signed: bool, builder: &mut FunctionBuilder) -> Value {
    if src.bits() > dst.bits() {
        builder.ins().ireduce(dst, value)
    } else if src.bits() < dst.bits() {
        if signed { builder.ins().sextend(dst, value) } else { builder.ins().uextend(dst, value) }
    } else {
        value
    }
}

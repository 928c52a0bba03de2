use proptest::prelude::*;
use test_case::test_case;
use warpjit_codegen::OptimizationLevel;
use warpjit_device::{HostDevice, Texture};
use warpjit_dtype::{AddressSpace, ScalarType};
use warpjit_ir::{
    BasicBlock, ControlFlowGraph, Declaration, Instruction, Kernel, Module, Operand, Parameter, Region, Subkernel,
    SubkernelId,
};

use crate::error::Error;
use crate::layout::local::{BARRIER_NEXT_SUBKERNEL, SPILL_AREA};
use crate::layout::{self, argument, global, local, parameter, shared, texture};
use crate::metadata::{Metadata, MetadataBuilder};
use crate::pad;

fn subkernel(instructions: Vec<Instruction>) -> Subkernel {
    let cfg: ControlFlowGraph = std::iter::once(BasicBlock::new("entry", instructions)).collect();
    Subkernel::new(SubkernelId(0), "sk", cfg)
}

fn builder() -> MetadataBuilder {
    MetadataBuilder::new("k", SubkernelId(0), OptimizationLevel::Basic, 1)
}

fn load(ty: ScalarType, space: AddressSpace, symbol: &str, offset: i64) -> Instruction {
    Instruction::ld(space, ty, 0, Operand::address(symbol).with_offset(offset))
}

/// `(identifier, offset, region)` of every memory operand, in program order.
fn references(subkernel: &Subkernel) -> Vec<(String, i64, Option<Region>)> {
    subkernel
        .cfg
        .instructions()
        .flat_map(|inst| inst.operands())
        .filter(|operand| operand.is_memory_reference())
        .map(|operand| (operand.identifier.clone(), operand.offset, operand.region))
        .collect()
}

fn analyze(module: &Module, kernel: &Kernel, subkernel: &mut Subkernel, device: &HostDevice) -> Metadata {
    let mut metadata = builder();
    layout::analyze(module, kernel, subkernel, device, &mut metadata).unwrap();
    metadata.build()
}

#[test_case(0, 4 => 0; "empty region")]
#[test_case(4, 8 => 4; "half aligned")]
#[test_case(5, 4 => 3; "one past")]
#[test_case(16, 16 => 0; "already aligned")]
#[test_case(7, 1 => 0; "byte alignment")]
#[test_case(3, 0 => 0; "zero alignment is byte alignment")]
fn test_pad(size: u32, alignment: u32) -> u32 {
    pad(size, alignment)
}

#[test]
fn test_int_then_double_arguments() {
    let kernel = Kernel::new("k", "m")
        .with_parameter(Parameter::new("n", ScalarType::S32))
        .with_parameter(Parameter::new("x", ScalarType::F64));
    let mut sk = subkernel(vec![
        load(ScalarType::S32, AddressSpace::Param, "n", 0),
        load(ScalarType::F64, AddressSpace::Param, "x", 0),
        load(ScalarType::U32, AddressSpace::Param, "x", 4),
    ]);

    let mut metadata = builder();
    argument::layout_arguments(&kernel, &mut sk, &mut metadata);

    assert_eq!(metadata.build().argument_size, 16);
    assert_eq!(
        references(&sk),
        vec![
            ("n".to_string(), 0, Some(Region::Argument)),
            ("x".to_string(), 8, Some(Region::Argument)),
            ("x".to_string(), 12, Some(Region::Argument)),
        ]
    );
}

#[test]
fn test_registers_and_immediates_untouched() {
    let kernel = Kernel::new("k", "m").with_parameter(Parameter::new("n", ScalarType::U32));
    let mut sk = subkernel(vec![Instruction::mov(
        ScalarType::U32,
        Operand::register(1, ScalarType::U32),
        Operand::immediate(3, ScalarType::U32),
    )]);
    let before = sk.clone();

    argument::layout_arguments(&kernel, &mut sk, &mut builder());

    assert_eq!(sk, before);
}

#[test]
fn test_globals_tagged() {
    let module = Module::new("m").with_global(Declaration::global("g", ScalarType::U32));
    let mut sk = subkernel(vec![
        load(ScalarType::U32, AddressSpace::Generic, "g", 0),
        load(ScalarType::U32, AddressSpace::Generic, "other", 0),
    ]);

    assert_eq!(global::tag_globals(&module, &mut sk), 1);
    let refs = references(&sk);
    assert_eq!(refs[0], ("g".to_string(), 0, Some(Region::Global)));
    assert_eq!(refs[1].2, None);
    assert_eq!(sk.cfg.blocks()[0].instructions[0].space, AddressSpace::Global);
}

#[test]
fn test_call_sites_pad_to_type_width() {
    let call = Instruction::call(
        "callee",
        [Operand::address("ret").with_type(ScalarType::U8)],
        [Operand::address("a").with_type(ScalarType::U64), Operand::address("b").with_type(ScalarType::U16)],
    );
    let small = Instruction::call("callee", [], [Operand::address("c").with_type(ScalarType::U32)]);
    let mut sk = subkernel(vec![
        call,
        small,
        load(ScalarType::U64, AddressSpace::Param, "a", 0),
        load(ScalarType::U16, AddressSpace::Param, "b", 0),
    ]);

    let mut metadata = builder();
    let size = parameter::layout_parameters(&Module::new("m"), &Kernel::new("k", "m"), &mut sk, &mut metadata).unwrap();

    // ret@0, a@8, b@16
    assert_eq!(size, 18);
    let refs: Vec<_> = references(&sk).into_iter().filter(|(_, _, region)| region.is_some()).collect();
    assert_eq!(
        refs,
        vec![("a".to_string(), 8, Some(Region::Parameter)), ("b".to_string(), 16, Some(Region::Parameter))]
    );
}

#[test]
fn test_divergence_marker_has_no_frame() {
    let marker =
        Instruction::call(warpjit_ir::DIVERGENCE_MARKER, [], [Operand::address("mask").with_type(ScalarType::U64)]);
    let mut sk = subkernel(vec![marker]);

    let size = parameter::layout_parameters(&Module::new("m"), &Kernel::new("k", "m"), &mut sk, &mut builder());
    assert_eq!(size.unwrap(), 0);
}

#[test]
fn test_parameter_frame_covers_module_functions() {
    let caller = Kernel::new("caller", "m")
        .with_subkernel(subkernel(vec![Instruction::call("f", [], [Operand::address("p").with_type(ScalarType::U32)])]));
    let callee = Kernel::new("f", "m")
        .with_parameter(Parameter::new("a", ScalarType::U64))
        .with_parameter(Parameter::new("b", ScalarType::U64))
        .with_parameter(Parameter::new("c", ScalarType::U32));
    let module = Module::new("m").with_kernel(caller).with_kernel(callee);

    let mut sk = module.kernels[0].subkernels[0].clone();
    let size = parameter::layout_parameters(&module, &module.kernels[0], &mut sk, &mut builder()).unwrap();
    assert_eq!(size, 20);
}

#[test]
fn test_call_site_registers_take_frame_slots() {
    let call = Instruction::call(
        "f",
        [],
        [Operand::register(1, ScalarType::U64), Operand::address("p").with_type(ScalarType::U32)],
    );
    let mut sk = subkernel(vec![call, load(ScalarType::U32, AddressSpace::Param, "p", 0)]);

    let size = parameter::layout_parameters(&Module::new("m"), &Kernel::new("k", "m"), &mut sk, &mut builder());

    // %r1@0, p@8
    assert_eq!(size.unwrap(), 12);
    assert_eq!(references(&sk)[0], ("p".to_string(), 8, Some(Region::Parameter)));
}

#[test]
fn test_call_sites_agreeing_on_symbol_offset() {
    let value = || Operand::address("v").with_type(ScalarType::U32);
    let mut sk = subkernel(vec![
        Instruction::call("f", [], [Operand::address("a").with_type(ScalarType::U32), value()]),
        Instruction::call("g", [], [Operand::immediate(7, ScalarType::U32), value()]),
        load(ScalarType::U32, AddressSpace::Param, "v", 0),
    ]);

    let size = parameter::layout_parameters(&Module::new("m"), &Kernel::new("k", "m"), &mut sk, &mut builder());

    assert_eq!(size.unwrap(), 8);
    assert_eq!(references(&sk)[0], ("v".to_string(), 4, Some(Region::Parameter)));
}

#[test]
fn test_call_sites_disagreeing_on_symbol_offset() {
    let mut sk = subkernel(vec![
        Instruction::call("f", [], [Operand::address("x").with_type(ScalarType::U32)]),
        Instruction::call(
            "g",
            [],
            [Operand::address("y").with_type(ScalarType::U32), Operand::address("x").with_type(ScalarType::U32)],
        ),
        load(ScalarType::U32, AddressSpace::Param, "x", 0),
    ]);

    let err = parameter::layout_parameters(&Module::new("m"), &Kernel::new("k", "m"), &mut sk, &mut builder())
        .unwrap_err();
    assert!(
        matches!(&err, Error::ConflictingParameter { symbol, first: 0, second: 4, .. } if symbol == "x"),
        "{err}"
    );
    assert_eq!(references(&sk)[0].2, None);
}

#[test]
fn test_duplicate_extern_shared_rejected() {
    let module = Module::new("m").with_global(Declaration::extern_shared("dynamic", ScalarType::U32));
    let kernel = Kernel::new("k", "m");
    let mut sk = subkernel(vec![]).with_local(Declaration::extern_shared("dynamic", ScalarType::U32));

    let err = shared::layout_shared(&module, &kernel, &mut sk, &mut builder()).unwrap_err();
    assert!(
        matches!(&err, Error::DuplicateExternShared { symbol, subkernel, .. } if symbol == "dynamic" && subkernel == "sk"),
        "{err}"
    );
}

#[test_case(ScalarType::F64, 0 => (8, 8); "element width")]
#[test_case(ScalarType::U32, 16 => (16, 16); "declared alignment")]
#[test_case(ScalarType::U8, 0 => (4, 4); "packed region already aligned")]
fn test_extern_shared_at_aligned_tail(ty: ScalarType, alignment: u32) -> (u32, i64) {
    let module = Module::new("m")
        .with_global(Declaration::shared("flag", ScalarType::U8))
        .with_global(Declaration::shared("word", ScalarType::U16))
        .with_global(Declaration::extern_shared("dynamic", ty).with_alignment(alignment));
    let kernel = Kernel::new("k", "m");
    let mut sk = subkernel(vec![
        load(ScalarType::U16, AddressSpace::Generic, "word", 0),
        Instruction::new(warpjit_ir::Opcode::Cvta, ScalarType::U64)
            .with_d(Operand::register(1, ScalarType::U64))
            .with_a(Operand::address("dynamic")),
    ]);

    let mut metadata = builder();
    shared::layout_shared(&module, &kernel, &mut sk, &mut metadata).unwrap();
    let metadata = metadata.build();

    let refs = references(&sk);
    assert_eq!(refs[0], ("word".to_string(), 2, Some(Region::Shared)));
    assert_eq!(refs[1].2, Some(Region::Shared));
    assert_eq!(metadata.shared_size as i64, refs[1].1);
    (metadata.shared_size, refs[1].1)
}

#[test]
fn test_constants_packed() {
    let module = Module::new("m")
        .with_global(Declaration::constant("a", ScalarType::U8))
        .with_global(Declaration::constant("table", ScalarType::F32).with_elements(4));
    let mut sk = subkernel(vec![load(ScalarType::F32, AddressSpace::Const, "table", 8)]);

    let mut metadata = builder();
    layout::constant::layout_constants(&module, &mut sk, &mut metadata);

    assert_eq!(metadata.build().constant_size, 20);
    assert_eq!(references(&sk)[0], ("table".to_string(), 12, Some(Region::Constant)));
}

#[test]
fn test_reserved_locals_first_and_spill_last() {
    let mut sk = subkernel(vec![
        load(ScalarType::U64, AddressSpace::Local, "x", 0),
        load(ScalarType::U32, AddressSpace::Local, SPILL_AREA, 4),
    ])
    .with_local(Declaration::local(SPILL_AREA, ScalarType::U8).with_elements(64))
    .with_local(Declaration::local("x", ScalarType::U64))
    .with_local(Declaration::local(BARRIER_NEXT_SUBKERNEL, ScalarType::U32))
    .with_local(Declaration::local("y", ScalarType::U32));

    let mut metadata = builder();
    let reserved = local::layout_locals(&mut sk, &mut metadata);
    let metadata = metadata.build();

    assert_eq!(reserved.barrier_resume, Some(0));
    assert_eq!(reserved.resume_status, 4);
    assert_eq!(reserved.resume_point, 8);
    assert_eq!(reserved.spill_area, Some(28));
    assert_eq!(metadata.local_size, 28 + 64);
    assert_eq!(metadata.reserved, reserved);
    assert_eq!(
        references(&sk),
        vec![("x".to_string(), 16, Some(Region::Local)), (SPILL_AREA.to_string(), 32, Some(Region::Local))]
    );
}

#[test]
fn test_reserved_locals_without_barrier_slot() {
    let mut sk = subkernel(vec![]);
    let reserved = local::layout_locals(&mut sk, &mut builder());

    assert_eq!(reserved.barrier_resume, None);
    assert_eq!((reserved.resume_status, reserved.resume_point), (0, 4));
    assert_eq!(reserved.spill_area, None);
}

#[test]
fn test_reserved_names_outside_local_space_ignored() {
    let mut sk = subkernel(vec![])
        .with_local(Declaration::shared(BARRIER_NEXT_SUBKERNEL, ScalarType::U32))
        .with_local(Declaration::shared(SPILL_AREA, ScalarType::U8).with_elements(64))
        .with_local(Declaration::local("x", ScalarType::U32));

    let mut metadata = builder();
    let reserved = local::layout_locals(&mut sk, &mut metadata);

    assert_eq!(reserved.barrier_resume, None);
    assert_eq!((reserved.resume_status, reserved.resume_point), (0, 4));
    assert_eq!(reserved.spill_area, None);
    assert_eq!(metadata.build().local_size, 12);
}

#[test]
fn test_texture_slots_in_first_use_order() {
    let device = HostDevice::new("host");
    let module = Module::new("m");
    let first = device.register_texture(&module.path, "first", Texture::from_f32(&[1.0])).unwrap();
    let second = device.register_texture(&module.path, "second", Texture::from_f32(&[2.0])).unwrap();
    let coordinate = Operand::register(0, ScalarType::S32);
    let mut sk = subkernel(vec![
        Instruction::tex(ScalarType::F32, 1, "second", coordinate.clone()),
        Instruction::tex(ScalarType::F32, 2, "first", coordinate.clone()),
        Instruction::tex(ScalarType::F32, 3, "second", coordinate),
    ]);

    let mut metadata = builder();
    texture::layout_textures(&module, &Kernel::new("k", "m"), &mut sk, &device, &mut metadata).unwrap();
    let metadata = metadata.build();

    let slots: Vec<u32> = sk.cfg.instructions().map(|inst| inst.a.reg).collect();
    assert_eq!(slots, vec![0, 1, 0]);
    assert_eq!(metadata.textures.len(), 2);
    assert_eq!((metadata.textures[0].symbol.as_str(), metadata.textures[0].handle), ("second", second));
    assert_eq!((metadata.textures[1].symbol.as_str(), metadata.textures[1].handle), ("first", first));
}

#[test]
fn test_missing_texture() {
    let device = HostDevice::new("host");
    let mut sk = subkernel(vec![Instruction::tex(ScalarType::F32, 1, "absent", Operand::register(0, ScalarType::S32))]);

    let err = texture::layout_textures(&Module::new("m"), &Kernel::new("k", "m"), &mut sk, &device, &mut builder())
        .unwrap_err();
    assert!(matches!(&err, Error::MissingTexture { symbol, .. } if symbol == "absent"), "{err}");
}

#[test]
fn test_analyze_fills_every_region() {
    let device = HostDevice::new("host");
    let module = Module::new("m")
        .with_global(Declaration::global("g", ScalarType::U32))
        .with_global(Declaration::shared("tile", ScalarType::F32).with_elements(8))
        .with_global(Declaration::constant("c", ScalarType::U64));
    let kernel = Kernel::new("k", "m").with_parameter(Parameter::new("out", ScalarType::U64));
    let mut sk = subkernel(vec![
        load(ScalarType::U64, AddressSpace::Param, "out", 0),
        load(ScalarType::U32, AddressSpace::Global, "g", 0),
        load(ScalarType::F32, AddressSpace::Shared, "tile", 4),
        load(ScalarType::U64, AddressSpace::Const, "c", 0),
    ]);

    let metadata = analyze(&module, &kernel, &mut sk, &device);

    assert_eq!(metadata.argument_size, 8);
    assert_eq!(metadata.shared_size, 32);
    assert_eq!(metadata.constant_size, 8);
    assert_eq!(metadata.local_size, 8);
    let regions: Vec<_> = references(&sk).into_iter().map(|(_, _, region)| region).collect();
    assert_eq!(
        regions,
        vec![Some(Region::Argument), Some(Region::Global), Some(Region::Shared), Some(Region::Constant)]
    );
}

fn scalar() -> impl Strategy<Value = ScalarType> {
    prop::sample::select(vec![
        ScalarType::U8,
        ScalarType::S16,
        ScalarType::U32,
        ScalarType::F32,
        ScalarType::S64,
        ScalarType::F64,
    ])
}

proptest! {
    #[test]
    fn prop_argument_size_is_padded_sum(
        parameters in prop::collection::vec((scalar(), 1u32..4, prop::sample::select(vec![0u32, 1, 4, 16])), 0..8),
        displacement in 0i64..8,
    ) {
        let mut kernel = Kernel::new("k", "m");
        let mut expected = Vec::new();
        let mut size = 0;
        for (i, &(ty, elements, alignment)) in parameters.iter().enumerate() {
            let parameter = Parameter::new(format!("p{i}"), ty).with_elements(elements).with_alignment(alignment);
            size += pad(size, parameter.alignment());
            expected.push((format!("p{i}"), i64::from(size) + displacement, Some(Region::Argument)));
            size += parameter.size();
            kernel = kernel.with_parameter(parameter);
        }
        let mut sk = subkernel(
            (0..parameters.len())
                .map(|i| load(ScalarType::U8, AddressSpace::Param, &format!("p{i}"), displacement))
                .collect(),
        );

        let mut metadata = builder();
        argument::layout_arguments(&kernel, &mut sk, &mut metadata);

        prop_assert_eq!(metadata.build().argument_size, size);
        prop_assert_eq!(references(&sk), expected);
    }

    #[test]
    fn prop_parameter_layout_idempotent(sites in prop::collection::vec(prop::collection::vec(scalar(), 0..5), 0..4)) {
        let mut instructions = Vec::new();
        for (s, site) in sites.iter().enumerate() {
            let inputs: Vec<Operand> = site
                .iter()
                .enumerate()
                .map(|(i, &ty)| Operand::address(format!("s{s}_{i}")).with_type(ty))
                .collect();
            for (i, &ty) in site.iter().enumerate() {
                instructions.push(Instruction::st(
                    AddressSpace::Param,
                    ty,
                    Operand::address(format!("s{s}_{i}")),
                    Operand::register(0, ty),
                ));
            }
            instructions.push(Instruction::call("callee", [], inputs));
        }
        let module = Module::new("m");
        let mut sk = subkernel(instructions);

        let kernel = Kernel::new("k", "m");

        let first = parameter::layout_parameters(&module, &kernel, &mut sk, &mut builder()).unwrap();
        let once = references(&sk);
        let second = parameter::layout_parameters(&module, &kernel, &mut sk, &mut builder()).unwrap();

        prop_assert_eq!(first, second);
        prop_assert_eq!(references(&sk), once);
    }
}

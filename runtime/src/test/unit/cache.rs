use std::sync::Arc;
use std::time::Duration;

use test_case::test_case;
use tracing_test::traced_test;
use warpjit_codegen::OptimizationLevel;
use warpjit_device::{Device, HostDevice};
use warpjit_dtype::{AddressSpace, ScalarType};
use warpjit_ir::{BasicBlock, Instruction, Kernel, Module, Operand, Parameter, Subkernel, SubkernelId};

use crate::error::Error;
use crate::test::backend::CountingBackend;
use crate::{CacheConfig, Specialization, TranslationCache};

fn subkernel(id: u32, name: &str, instructions: Vec<Instruction>) -> Subkernel {
    Subkernel::new(SubkernelId(id), name, std::iter::once(BasicBlock::new("entry", instructions)).collect())
}

fn simple_kernel(name: &str, first_id: u32) -> Kernel {
    Kernel::new(name, "m")
        .with_parameter(Parameter::new("out", ScalarType::U64))
        .with_subkernel(subkernel(
            first_id,
            "sk0",
            vec![Instruction::ld(AddressSpace::Param, ScalarType::U64, 1, Operand::address("out")), Instruction::bar()],
        ))
        .with_subkernel(subkernel(first_id + 1, "sk1", vec![Instruction::exit()]))
}

fn device() -> Arc<dyn Device> {
    Arc::new(HostDevice::new("host"))
}

fn cache_with(backend: CountingBackend, module: Module) -> (TranslationCache<CountingBackend>, Arc<Module>) {
    let cache = TranslationCache::new(backend, CacheConfig::default());
    let module = Arc::new(module);
    cache.load_module(Arc::clone(&module), device());
    (cache, module)
}

fn registered() -> (TranslationCache<CountingBackend>, Arc<Kernel>) {
    let (cache, module) = cache_with(CountingBackend::default(), Module::new("m").with_kernel(simple_kernel("k", 0)));
    let kernel = Arc::clone(&module.kernels[0]);
    cache.register_kernel(&kernel).unwrap();
    (cache, kernel)
}

#[test]
fn test_load_module_declares_then_replaces() {
    let cache = TranslationCache::new(CountingBackend::default(), CacheConfig::default());

    assert!(cache.load_module(Arc::new(Module::new("m")), device()));
    assert!(!cache.load_module(Arc::new(Module::new("m")), device()));
    assert!(cache.is_module_loaded("m"));
    assert!(!cache.is_module_loaded("other"));
}

#[test]
#[traced_test]
fn test_same_key_same_translation() {
    let (cache, _) = registered();

    let first = cache.get_or_insert_translation(4, SubkernelId(0), Specialization::default()).unwrap();
    let second = cache.get_or_insert_translation(4, SubkernelId(0), Specialization::default()).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.backend().optimized(), 1);
    assert_eq!(cache.backend().jitted(), 1);
    assert_eq!(first.entry().name(), "translated_sk0_opt1_ws4");
    assert!(logs_contain("specialization published"));
}

#[test]
fn test_widths_share_metadata() {
    let (cache, _) = registered();

    let narrow = cache.get_or_insert_translation(1, SubkernelId(0), Specialization::default()).unwrap();
    let wide = cache.get_or_insert_translation(8, SubkernelId(0), Specialization::default()).unwrap();

    assert!(!Arc::ptr_eq(&narrow, &wide));
    assert!(Arc::ptr_eq(narrow.metadata(), wide.metadata()));
    assert_eq!((narrow.warp_width(), wide.warp_width()), (1, 8));
    assert_eq!(narrow.metadata().argument_size, 8);

    let translated = cache.translated_kernel("m", "k").unwrap();
    assert_eq!(translated.subkernel(SubkernelId(0)).unwrap().specialization_count(), 2);
    assert!(Arc::ptr_eq(&cache.metadata(SubkernelId(0)).unwrap(), narrow.metadata()));
}

#[test]
fn test_first_specialization_wins() {
    let (cache, _) = registered();

    let first = cache.get_or_insert_translation(2, SubkernelId(1), Specialization(0b01)).unwrap();
    let again = cache.get_or_insert_translation(2, SubkernelId(1), Specialization(0b10)).unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(again.specialization(), Specialization(0b01));
}

#[test_case(2; "two threads")]
#[test_case(8; "eight threads")]
fn test_concurrent_miss_builds_once(threads: usize) {
    let backend = CountingBackend { optimize_delay: Some(Duration::from_millis(20)), ..CountingBackend::default() };
    let (cache, module) = cache_with(backend, Module::new("m").with_kernel(simple_kernel("k", 0)));
    cache.register_kernel(&module.kernels[0]).unwrap();

    let translations: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| scope.spawn(|| cache.get_or_insert_translation(4, SubkernelId(0), Specialization::default())))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap().unwrap()).collect()
    });

    assert!(translations.iter().all(|t| Arc::ptr_eq(t, &translations[0])));
    assert_eq!(cache.backend().optimized(), 1);
    assert_eq!(cache.backend().jitted(), 1);
}

#[test_case(2; "two threads")]
#[test_case(8; "eight threads")]
fn test_concurrent_registration_translates_once(threads: usize) {
    let backend = CountingBackend { translate_delay: Some(Duration::from_millis(20)), ..CountingBackend::default() };
    let (cache, module) = cache_with(backend, Module::new("m").with_kernel(simple_kernel("k", 0)));

    let kernels: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads).map(|_| scope.spawn(|| cache.register_kernel(&module.kernels[0]))).collect();
        handles.into_iter().map(|handle| handle.join().unwrap().unwrap()).collect()
    });

    assert!(kernels.iter().all(|k| Arc::ptr_eq(k, &kernels[0])));
    assert_eq!(cache.backend().translated(), module.kernels[0].subkernels.len());
}

#[test]
fn test_unrelated_kernels_register_concurrently() {
    let backend = CountingBackend { translate_delay: Some(Duration::from_millis(20)), ..CountingBackend::default() };
    let module = Module::new("m").with_kernel(simple_kernel("a", 0)).with_kernel(simple_kernel("b", 2));
    let (cache, module) = cache_with(backend, module);

    let cache = &cache;
    std::thread::scope(|scope| {
        let handles: Vec<_> =
            module.kernels.iter().map(|kernel| scope.spawn(move || cache.register_kernel(kernel))).collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
    });

    assert_eq!(cache.backend().translated(), 4);
    assert!(cache.metadata(SubkernelId(3)).is_some());
}

#[test]
fn test_concurrent_conflicting_kernels_publish_one_owner() {
    let backend = CountingBackend { translate_delay: Some(Duration::from_millis(20)), ..CountingBackend::default() };
    let module = Module::new("m").with_kernel(simple_kernel("a", 0)).with_kernel(simple_kernel("b", 1));
    let (cache, module) = cache_with(backend, module);

    let cache = &cache;
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> =
            module.kernels.iter().map(|kernel| scope.spawn(move || cache.register_kernel(kernel))).collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results.iter().any(|result| matches!(result, Err(Error::SubkernelConflict { subkernel: SubkernelId(1), .. }))));
    let published = ["a", "b"].iter().filter(|name| cache.translated_kernel("m", name).is_some()).count();
    assert_eq!(published, 1);
}

#[test]
#[traced_test]
fn test_reregistration_does_not_translate() {
    let (cache, kernel) = registered();
    assert_eq!(cache.backend().translated(), 2);

    let first = cache.translated_kernel("m", "k").unwrap();
    let again = cache.register_kernel(&kernel).unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(cache.backend().translated(), 2);
    assert_eq!(again.with_backend_module(|module| module.functions.len()), 2);
}

#[test]
fn test_unknown_module() {
    let cache = TranslationCache::new(CountingBackend::default(), CacheConfig::default());
    let kernel = Arc::new(Kernel::new("k", "missing"));

    let err = cache.register_kernel(&kernel).err().unwrap();
    assert!(matches!(&err, Error::UnknownModule { module, kernel } if module == "missing" && kernel == "k"), "{err}");
}

#[test]
fn test_unknown_subkernel_and_width() {
    let (cache, _) = registered();

    let err = cache.get_or_insert_translation(4, SubkernelId(99), Specialization::default()).err().unwrap();
    assert!(matches!(err, Error::UnknownSubkernel { subkernel: SubkernelId(99) }), "{err}");

    let err = cache.get_or_insert_translation(0, SubkernelId(0), Specialization::default()).err().unwrap();
    assert!(matches!(err, Error::InvalidWarpWidth), "{err}");
}

#[test]
fn test_subkernel_owned_by_other_kernel() {
    let module = Module::new("m").with_kernel(simple_kernel("a", 0)).with_kernel(simple_kernel("b", 1));
    let (cache, module) = cache_with(CountingBackend::default(), module);
    cache.register_kernel(&module.kernels[0]).unwrap();

    let err = cache.register_kernel(&module.kernels[1]).err().unwrap();
    assert!(
        matches!(&err, Error::SubkernelConflict { kernel, subkernel: SubkernelId(1), owner } if kernel == "b" && owner == "a"),
        "{err}"
    );
    assert!(cache.translated_kernel("m", "b").is_none());
}

#[test]
#[traced_test]
fn test_failed_specialization_not_cached() {
    let (cache, _) = registered();
    cache.backend().fail_next_jit.store(true, std::sync::atomic::Ordering::SeqCst);

    let err = cache.get_or_insert_translation(4, SubkernelId(0), Specialization::default()).err().unwrap();
    assert!(
        matches!(&err, Error::Backend { kernel, subkernel, .. } if kernel == "k" && subkernel == "sk0"),
        "{err}"
    );

    let translation = cache.get_or_insert_translation(4, SubkernelId(0), Specialization::default()).unwrap();
    assert_eq!(translation.warp_width(), 4);
    assert_eq!(cache.backend().optimized(), 2);
    assert_eq!(cache.backend().jitted(), 1);
}

#[test]
#[traced_test]
fn test_failed_verification_publishes_nothing() {
    let backend = CountingBackend::default();
    backend.fail_verify.store(true, std::sync::atomic::Ordering::SeqCst);
    let (cache, module) = cache_with(backend, Module::new("m").with_kernel(simple_kernel("k", 0)));

    let err = cache.register_kernel(&module.kernels[0]).err().unwrap();
    assert!(matches!(&err, Error::KernelBackend { kernel, .. } if kernel == "k"), "{err}");
    assert!(cache.translated_kernel("m", "k").is_none());
    assert!(cache.metadata(SubkernelId(0)).is_none());
    assert!(logs_contain("kernel module failed verification"));
}

#[test]
fn test_parameter_frame_sized_by_widest_kernel() {
    let caller = Kernel::new("caller", "m")
        .with_subkernel(subkernel(
            0,
            "entry",
            vec![
                Instruction::call("helper", [], [Operand::address("x").with_type(ScalarType::U32)]),
                Instruction::exit(),
            ],
        ))
        .with_subkernel(subkernel(1, "helper", vec![Instruction::ret()]));
    let wide = Kernel::new("wide", "m")
        .with_parameter(Parameter::new("a", ScalarType::U64))
        .with_parameter(Parameter::new("b", ScalarType::U64))
        .with_parameter(Parameter::new("c", ScalarType::U32))
        .with_subkernel(subkernel(2, "body", vec![Instruction::exit()]));
    let (cache, module) = cache_with(CountingBackend::default(), Module::new("m").with_kernel(caller).with_kernel(wide));

    let translated = cache.register_kernel(&module.kernels[0]).unwrap();

    let entry = translated.subkernel(SubkernelId(0)).unwrap();
    assert_eq!(entry.metadata().parameter_size, 20);
    assert_eq!(entry.resolved().cfg.blocks()[0].instructions[0].target, Some(SubkernelId(1)));
}

#[test]
fn test_configured_level_names_specializations() {
    let config = CacheConfig::builder().optimization_level(OptimizationLevel::Full).build();
    let cache = TranslationCache::new(CountingBackend::default(), config);
    let module = Arc::new(Module::new("m").with_kernel(simple_kernel("k", 0)));
    cache.load_module(Arc::clone(&module), device());
    cache.register_kernel(&module.kernels[0]).unwrap();

    let translation = cache.get_or_insert_translation(16, SubkernelId(1), Specialization::default()).unwrap();

    assert_eq!(translation.entry().name(), "translated_sk1_opt3_ws16");
    assert_eq!(translation.metadata().level, OptimizationLevel::Full);
}

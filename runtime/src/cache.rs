//! Translation cache.
//!
//! Owns the module registry, the translated kernels and the two-level translation map
//! `subkernel -> warp width -> Translation`. Everything is per instance: there is no
//! process-wide state.
//!
//! # Thread Safety
//!
//! Published translations are read without locking through papaya's lock-free maps.
//! A miss takes the owning kernel's backend-module lock, re-checks, and only then builds,
//! so every `(subkernel, warp width)` key is constructed exactly once. Kernel registration
//! holds a lock per `(module, kernel)` key while translating, so unrelated kernels translate
//! in parallel; only the final owner check and publication are serialized.
//!
//! # Failure
//!
//! Nothing is published until every step of a registration or specialization succeeded.
//! Failures are not cached; a later call with the same key retries.

use std::collections::HashMap as StdHashMap;
use std::sync::Arc;

use papaya::HashMap;
use parking_lot::{Mutex, RwLock};
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, error, instrument, trace};
use warpjit_codegen::Backend;
use warpjit_codegen::cranelift::CraneliftBackend;
use warpjit_device::Device;
use warpjit_ir::{Kernel, Module, Subkernel, SubkernelId};

use crate::config::CacheConfig;
use crate::error::{
    BackendSnafu, BackendUnavailableSnafu, InvalidWarpWidthSnafu, KernelBackendSnafu, Result, SubkernelConflictSnafu,
    UnknownModuleSnafu, UnknownSubkernelSnafu,
};
use crate::layout;
use crate::metadata::{Metadata, MetadataBuilder};
use crate::resolver;
use crate::translation::{Specialization, Translation};

/// Registry key of a kernel: (module name, kernel name).
type KernelKey = (String, String);

/// Cache key of a translation: (subkernel, warp width).
type TranslationKey = (SubkernelId, u32);

/// Warp width the layout is computed for; specializations never re-derive it.
const LAYOUT_WARP_WIDTH: u32 = 1;

#[derive(Clone)]
struct LoadedModule {
    module: Arc<Module>,
    device: Arc<dyn Device>,
}

/// Base translation of one subkernel.
pub struct TranslatedSubkernel<B: Backend> {
    resolved: Subkernel,
    metadata: Arc<Metadata>,
    base: B::Function,
    specializations: HashMap<u32, Arc<Translation>>,
}

impl<B: Backend> TranslatedSubkernel<B> {
    /// The subkernel after layout and call resolution.
    pub fn resolved(&self) -> &Subkernel {
        &self.resolved
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    pub fn base(&self) -> &B::Function {
        &self.base
    }

    pub fn specialization_count(&self) -> usize {
        self.specializations.len()
    }
}

/// Translation state of a registered kernel.
///
/// The backend module is shared by every specialization derived from the kernel and is
/// only touched under its lock.
pub struct TranslatedKernel<B: Backend> {
    kernel: Arc<Kernel>,
    module: Arc<Module>,
    backend_module: Mutex<B::Module>,
    subkernels: StdHashMap<SubkernelId, TranslatedSubkernel<B>>,
}

impl<B: Backend> TranslatedKernel<B> {
    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn subkernel(&self, id: SubkernelId) -> Option<&TranslatedSubkernel<B>> {
        self.subkernels.get(&id)
    }

    pub fn subkernels(&self) -> impl Iterator<Item = (&SubkernelId, &TranslatedSubkernel<B>)> {
        self.subkernels.iter()
    }

    /// Run `f` with exclusive access to the backend module.
    pub fn with_backend_module<R>(&self, f: impl FnOnce(&B::Module) -> R) -> R {
        f(&self.backend_module.lock())
    }

    fn specialize(
        &self,
        backend: &B,
        config: &CacheConfig,
        id: SubkernelId,
        warp_width: u32,
        specialization: Specialization,
    ) -> Result<Arc<Translation>> {
        let entry = self.subkernels.get(&id).context(UnknownSubkernelSnafu { subkernel: id })?;
        let context = BackendSnafu { kernel: self.kernel.name.as_str(), subkernel: entry.resolved.name.as_str() };

        let mut module = self.backend_module.lock();

        // Another thread may have built this width while we waited for the lock.
        let specializations = entry.specializations.guard();
        if let Some(existing) = entry.specializations.get(&warp_width, &specializations) {
            trace!(subkernel = %id, warp_width, "specialization built concurrently");
            return Ok(Arc::clone(existing));
        }

        let function =
            backend.optimize(&mut module, &entry.base, config.optimization_level, warp_width).context(context)?;
        if config.verify_specializations {
            backend
                .verify_function(&function)
                .inspect_err(|source| error!(subkernel = %entry.resolved.name, %source, "specialization failed verification"))
                .context(context)?;
        }
        let native = backend.jit(&mut module, &function, warp_width).context(context)?;

        let translation = Arc::new(Translation::new(
            self.kernel.name.clone(),
            id,
            warp_width,
            specialization,
            Arc::clone(&entry.metadata),
            native,
        ));
        entry.specializations.insert(warp_width, Arc::clone(&translation), &specializations);
        debug!(subkernel = %entry.resolved.name, warp_width, entry = translation.entry().name(), "specialization published");
        Ok(translation)
    }
}

/// Dynamic translation cache over a code generation [`Backend`].
pub struct TranslationCache<B: Backend> {
    backend: B,
    config: CacheConfig,
    modules: RwLock<StdHashMap<String, LoadedModule>>,
    /// One lock per kernel key, held for the whole of that kernel's registration.
    registrations: HashMap<KernelKey, Arc<Mutex<()>>>,
    /// Serializes the subkernel-owner check with publication.
    publication: Mutex<()>,
    kernels: HashMap<KernelKey, Arc<TranslatedKernel<B>>>,
    owners: HashMap<SubkernelId, Arc<TranslatedKernel<B>>>,
    translations: HashMap<TranslationKey, Arc<Translation>>,
}

impl TranslationCache<CraneliftBackend> {
    /// Cache JIT-compiling for the host through Cranelift.
    pub fn cranelift(config: CacheConfig) -> Result<Self> {
        let backend = CraneliftBackend::new().context(BackendUnavailableSnafu)?;
        Ok(Self::new(backend, config))
    }
}

impl<B: Backend> TranslationCache<B> {
    pub fn new(backend: B, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            modules: RwLock::new(StdHashMap::new()),
            registrations: HashMap::new(),
            publication: Mutex::new(()),
            kernels: HashMap::new(),
            owners: HashMap::new(),
            translations: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Declare or replace `module`, owned by `device`.
    ///
    /// Returns `true` if no module of that name was loaded before. Kernels already
    /// registered against a replaced module keep the module they were translated from.
    pub fn load_module(&self, module: Arc<Module>, device: Arc<dyn Device>) -> bool {
        let name = module.name.clone();
        let previous = self.modules.write().insert(name.clone(), LoadedModule { module, device });
        debug!(module = %name, replaced = previous.is_some(), "module loaded");
        previous.is_none()
    }

    pub fn is_module_loaded(&self, name: &str) -> bool {
        self.modules.read().contains_key(name)
    }

    /// The translated kernel registered under `module`/`kernel`, if any.
    pub fn translated_kernel(&self, module: &str, kernel: &str) -> Option<Arc<TranslatedKernel<B>>> {
        let guard = self.kernels.guard();
        self.kernels.get(&(module.to_string(), kernel.to_string()), &guard).cloned()
    }

    /// Metadata of a registered subkernel.
    pub fn metadata(&self, subkernel: SubkernelId) -> Option<Arc<Metadata>> {
        let guard = self.owners.guard();
        let owner = self.owners.get(&subkernel, &guard)?;
        owner.subkernel(subkernel).map(|entry| Arc::clone(&entry.metadata))
    }

    /// Translate every subkernel of `kernel`, unless it is already registered.
    ///
    /// Runs layout, call resolution, `translate` and `link` per subkernel, then verifies
    /// the kernel's backend module. Nothing is published if any step fails.
    #[instrument(skip_all, fields(module = %kernel.module, kernel = %kernel.name))]
    pub fn register_kernel(&self, kernel: &Arc<Kernel>) -> Result<Arc<TranslatedKernel<B>>> {
        let key = (kernel.module.clone(), kernel.name.clone());
        if let Some(existing) = self.lookup_kernel(&key) {
            trace!("kernel already registered");
            return Ok(existing);
        }

        let registration = self.registration_lock(&key);
        let _registration = registration.lock();
        if let Some(existing) = self.lookup_kernel(&key) {
            trace!("kernel registered concurrently");
            return Ok(existing);
        }

        let loaded = self
            .modules
            .read()
            .get(&kernel.module)
            .cloned()
            .context(UnknownModuleSnafu { module: kernel.module.as_str(), kernel: kernel.name.as_str() })?;

        self.ensure_unowned(kernel)?;
        let translated = Arc::new(self.translate_kernel(kernel, &loaded)?);

        // A kernel sharing subkernel ids may have been published while we translated.
        let _publication = self.publication.lock();
        self.ensure_unowned(kernel)?;
        let owners = self.owners.guard();
        for id in translated.subkernels.keys() {
            self.owners.insert(*id, Arc::clone(&translated), &owners);
        }
        let kernels = self.kernels.guard();
        self.kernels.insert(key, Arc::clone(&translated), &kernels);
        debug!(subkernels = translated.subkernels.len(), "kernel registered");
        Ok(translated)
    }

    /// The translation of `subkernel` for `warp_width`, building it on first request.
    ///
    /// At most one translation ever exists per `(subkernel, warp_width)`. The
    /// specialization flags of the first request are the ones recorded.
    #[instrument(skip_all, fields(subkernel = %subkernel, warp_width = warp_width))]
    pub fn get_or_insert_translation(
        &self,
        warp_width: u32,
        subkernel: SubkernelId,
        specialization: Specialization,
    ) -> Result<Arc<Translation>> {
        ensure!(warp_width >= 1, InvalidWarpWidthSnafu);
        let key = (subkernel, warp_width);

        if let Some(existing) = self.lookup_translation(&key) {
            trace!("translation cache hit");
            return Ok(existing);
        }
        debug!("translation cache miss");

        let owner = {
            let guard = self.owners.guard();
            self.owners.get(&subkernel, &guard).cloned()
        }
        .context(UnknownSubkernelSnafu { subkernel })?;

        let translation = owner.specialize(&self.backend, &self.config, subkernel, warp_width, specialization)?;

        let guard = self.translations.guard();
        Ok(Arc::clone(self.translations.get_or_insert(key, translation, &guard)))
    }

    fn registration_lock(&self, key: &KernelKey) -> Arc<Mutex<()>> {
        let guard = self.registrations.guard();
        Arc::clone(self.registrations.get_or_insert_with(key.clone(), || Arc::new(Mutex::new(())), &guard))
    }

    fn ensure_unowned(&self, kernel: &Kernel) -> Result<()> {
        let owners = self.owners.guard();
        for subkernel in &kernel.subkernels {
            if let Some(owner) = self.owners.get(&subkernel.id, &owners) {
                return SubkernelConflictSnafu {
                    kernel: kernel.name.as_str(),
                    subkernel: subkernel.id,
                    owner: owner.kernel.name.as_str(),
                }
                .fail();
            }
        }
        Ok(())
    }

    fn lookup_kernel(&self, key: &KernelKey) -> Option<Arc<TranslatedKernel<B>>> {
        let guard = self.kernels.guard();
        self.kernels.get(key, &guard).cloned()
    }

    fn lookup_translation(&self, key: &TranslationKey) -> Option<Arc<Translation>> {
        let guard = self.translations.guard();
        self.translations.get(key, &guard).cloned()
    }

    fn translate_kernel(&self, kernel: &Arc<Kernel>, loaded: &LoadedModule) -> Result<TranslatedKernel<B>> {
        let level = self.config.optimization_level;
        let mut backend_module =
            self.backend.create_module(&kernel.name).context(KernelBackendSnafu { kernel: kernel.name.as_str() })?;

        let mut subkernels = StdHashMap::with_capacity(kernel.subkernels.len());
        for subkernel in &kernel.subkernels {
            let mut resolved = subkernel.clone();
            let mut builder = MetadataBuilder::new(&kernel.name, subkernel.id, level, LAYOUT_WARP_WIDTH);
            layout::analyze(&loaded.module, kernel, &mut resolved, loaded.device.as_ref(), &mut builder)?;
            let calls = resolver::resolve_calls(kernel, &mut resolved)?;
            let metadata = Arc::new(builder.build());

            let context = BackendSnafu { kernel: kernel.name.as_str(), subkernel: resolved.name.as_str() };
            let base =
                self.backend.translate(&mut backend_module, &resolved, metadata.exit_slots(), level).context(context)?;
            self.backend
                .link(&mut backend_module, &resolved, &loaded.module, loaded.device.as_ref())
                .context(context)?;

            debug!(subkernel = %resolved.name, id = %subkernel.id, calls, "subkernel translated");
            subkernels
                .insert(subkernel.id, TranslatedSubkernel { resolved, metadata, base, specializations: HashMap::new() });
        }

        self.backend
            .verify(&backend_module)
            .inspect_err(|source| error!(%source, "kernel module failed verification"))
            .context(KernelBackendSnafu { kernel: kernel.name.as_str() })?;

        Ok(TranslatedKernel {
            kernel: Arc::clone(kernel),
            module: Arc::clone(&loaded.module),
            backend_module: Mutex::new(backend_module),
            subkernels,
        })
    }
}

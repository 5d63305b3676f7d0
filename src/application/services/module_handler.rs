//! Module handler - owns the live module index and every lifecycle transition

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use once_cell::sync::OnceCell;

use super::CommandRegistry;
use crate::application::errors::{ModuleError, ModuleResult};
use crate::domain::entities::{Command, ModuleDescriptor, ModuleHandle, RootCommand};
use crate::domain::traits::Module;
use crate::infrastructure::modules::{LoadingContext, ModuleLoader, ModulePackage};

const CONFIG_FILE: &str = "config.json";

/// A module instance in the live index
pub struct LoadedModule {
    // Fields drop in declaration order: the instance must go before the
    // loading context that may hold the library its code lives in.
    instance: Box<dyn Module>,
    handle: ModuleHandle,
    descriptor: ModuleDescriptor,
    builtin: bool,
    data_dir: PathBuf,
    data_ready: OnceCell<()>,
    config: Mutex<Option<serde_json::Value>>,
    // Shared with every command the module registers
    context: Arc<LoadingContext>,
}

impl LoadedModule {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    pub fn handle(&self) -> &ModuleHandle {
        &self.handle
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_enabled()
    }

    /// The always-present base module
    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    pub fn loading_context(&self) -> &Arc<LoadingContext> {
        &self.context
    }

    /// `modules/<name>/`, created on first access
    pub fn data_dir(&self) -> ModuleResult<&Path> {
        self.data_ready.get_or_try_init(|| std::fs::create_dir_all(&self.data_dir))?;
        Ok(&self.data_dir)
    }

    /// The module's JSON config, loaded once. A missing file is first written
    /// from the module's bundled default.
    pub fn config(&self) -> ModuleResult<serde_json::Value> {
        let mut cached = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(config) = cached.as_ref() {
            return Ok(config.clone());
        }

        let path = self.data_dir()?.join(CONFIG_FILE);
        if !path.exists() {
            let default = self.instance.default_config();
            write_json(&path, &default)?;
            tracing::info!("Created default config for {} at {}", self.name(), path.display());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: serde_json::Value = serde_json::from_str(&content).map_err(|e| ModuleError::Hook {
            module: self.name().to_string(),
            hook: "config",
            reason: format!("invalid {}: {}", path.display(), e),
        })?;

        *cached = Some(config.clone());
        Ok(config)
    }

    pub fn save_config(&self, config: serde_json::Value) -> ModuleResult<()> {
        let path = self.data_dir()?.join(CONFIG_FILE);
        write_json(&path, &config)?;
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = Some(config);
        Ok(())
    }
}

fn write_json(path: &Path, value: &serde_json::Value) -> ModuleResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| ModuleError::Internal(e.to_string()))?;
    std::fs::write(path, text)?;
    Ok(())
}

/// What a module sees from inside its lifecycle hooks
pub struct ModuleContext<'a> {
    module: &'a LoadedModule,
    registry: &'a CommandRegistry,
}

impl<'a> ModuleContext<'a> {
    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn module(&self) -> &LoadedModule {
        self.module
    }

    pub fn registry(&self) -> &CommandRegistry {
        self.registry
    }

    /// Register root commands owned by this module
    pub fn register_commands(&self, commands: impl IntoIterator<Item = Command>) -> ModuleResult<()> {
        let roots = commands
            .into_iter()
            .map(|command| RootCommand::new(command).map(|root| root.with_code(self.module.context.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        self.registry.register_root_commands(&self.module.handle, roots)?;
        Ok(())
    }

    pub fn register_command(&self, command: Command) -> ModuleResult<()> {
        self.register_commands([command])
    }

    pub fn data_dir(&self) -> ModuleResult<&Path> {
        self.module.data_dir()
    }

    pub fn config(&self) -> ModuleResult<serde_json::Value> {
        self.module.config()
    }
}

/// Outcome of loading and enabling a whole directory
#[derive(Debug, Default)]
pub struct BatchReport {
    pub loaded: Vec<String>,
    pub enabled: Vec<String>,
    pub errors: Vec<ModuleError>,
}

/// Module handler
pub struct ModuleHandler {
    modules: RwLock<HashMap<String, Arc<LoadedModule>>>,
    registry: Arc<CommandRegistry>,
    loader: ModuleLoader,
    data_root: PathBuf,
    /// Held for the duration of every transition
    transition: Mutex<()>,
}

impl ModuleHandler {
    pub fn new(registry: Arc<CommandRegistry>, loader: ModuleLoader) -> Self {
        let data_root = loader.directory().to_path_buf();
        Self {
            modules: RwLock::new(HashMap::new()),
            registry,
            loader,
            data_root,
            transition: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    fn lock_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn context<'a>(&'a self, module: &'a LoadedModule) -> ModuleContext<'a> {
        ModuleContext {
            module,
            registry: &self.registry,
        }
    }

    // -- index --------------------------------------------------------------

    pub fn get(&self, name: &str) -> Option<Arc<LoadedModule>> {
        self.modules.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// Snapshot of every loaded module, sorted by name
    pub fn modules(&self) -> Vec<Arc<LoadedModule>> {
        let mut modules: Vec<_> = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        modules.sort_by(|a, b| a.name().cmp(b.name()));
        modules
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).map_or(false, |m| m.is_enabled())
    }

    /// Enabled modules that declare `name` as a required dependency
    pub fn dependents(&self, name: &str) -> Vec<Arc<LoadedModule>> {
        self.modules()
            .into_iter()
            .filter(|m| m.is_enabled() && m.descriptor.depend.iter().any(|d| d == name))
            .collect()
    }

    // -- transitions --------------------------------------------------------

    /// Load and immediately enable the base module, skipping dependency checks
    pub fn bootstrap(&self, descriptor: ModuleDescriptor, instance: Box<dyn Module>) -> ModuleResult<Arc<LoadedModule>> {
        let context = LoadingContext::host_only(descriptor.name.clone(), self.loader.host().clone());
        let module = {
            let _guard = self.lock_transition();
            let module = self.insert(descriptor, instance, context, true)?;
            self.enable_locked(&module)?;
            module
        };
        Ok(module)
    }

    /// Instantiate a package in its own loading context, run `on_load` and
    /// add it to the index. Does not enable.
    pub fn load(&self, package: &ModulePackage) -> ModuleResult<Arc<LoadedModule>> {
        let _guard = self.lock_transition();

        if self.get(package.name()).is_some() {
            return Err(ModuleError::DuplicateName(package.name().to_string()));
        }

        let (instance, context) = self.loader.instantiate(package)?;
        self.insert(package.descriptor.clone(), instance, context, false)
    }

    fn insert(
        &self,
        descriptor: ModuleDescriptor,
        instance: Box<dyn Module>,
        context: LoadingContext,
        builtin: bool,
    ) -> ModuleResult<Arc<LoadedModule>> {
        if self.get(&descriptor.name).is_some() {
            return Err(ModuleError::DuplicateName(descriptor.name));
        }

        let module = Arc::new(LoadedModule {
            instance,
            handle: ModuleHandle::new(descriptor.name.clone()),
            data_dir: self.data_root.join(&descriptor.name),
            descriptor,
            builtin,
            data_ready: OnceCell::new(),
            config: Mutex::new(None),
            context: Arc::new(context),
        });

        module.instance.on_load(&self.context(&module)).map_err(|e| hook_error(&module, "on_load", e))?;

        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module.name().to_string(), module.clone());

        tracing::info!("Loaded module {}", module.descriptor.full_name());
        Ok(module)
    }

    /// Enable a loaded module once all of its required dependencies are enabled
    pub fn enable(&self, module: &LoadedModule) -> ModuleResult<()> {
        let _guard = self.lock_transition();
        self.enable_locked(module)
    }

    fn enable_locked(&self, module: &LoadedModule) -> ModuleResult<()> {
        if module.is_enabled() {
            return Ok(());
        }
        self.ensure_indexed(module)?;

        if !module.builtin {
            for dependency in &module.descriptor.depend {
                if !self.is_enabled(dependency) {
                    return Err(ModuleError::MissingDependency {
                        module: module.name().to_string(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        module.handle.set_enabled(true);
        if let Err(e) = module.instance.on_enable(&self.context(module)) {
            self.registry.unregister_all(&module.handle);
            module.handle.set_enabled(false);
            return Err(hook_error(module, "on_enable", e));
        }

        tracing::info!(
            "Enabled module {} ({} command(s))",
            module.name(),
            self.registry.owned_by(&module.handle).len()
        );
        Ok(())
    }

    /// Disable a module and drop every command it registered.
    ///
    /// Dependents stay enabled; cascading is left to the caller.
    pub fn disable(&self, module: &LoadedModule) -> ModuleResult<()> {
        let _guard = self.lock_transition();
        self.disable_locked(module);
        Ok(())
    }

    fn disable_locked(&self, module: &LoadedModule) {
        if !module.is_enabled() {
            return;
        }

        if let Err(e) = module.instance.on_disable(&self.context(module)) {
            tracing::error!("Module {} failed in on_disable: {}", module.name(), e);
        }
        let removed = self.registry.unregister_all(&module.handle);
        module.handle.set_enabled(false);

        tracing::info!("Disabled module {} ({} command(s) removed)", module.name(), removed);
    }

    /// Disable if needed, run `on_unload` and drop the module from the index.
    ///
    /// The loading context goes away with the last reference to the module
    /// or to one of its commands.
    pub fn unload(&self, module: &LoadedModule) -> ModuleResult<()> {
        let _guard = self.lock_transition();
        self.ensure_indexed(module)?;

        self.disable_locked(module);
        if let Err(e) = module.instance.on_unload(&self.context(module)) {
            tracing::error!("Module {} failed in on_unload: {}", module.name(), e);
        }

        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(module.name());

        tracing::info!("Unloaded module {}", module.name());
        Ok(())
    }

    fn ensure_indexed(&self, module: &LoadedModule) -> ModuleResult<()> {
        match self.get(module.name()) {
            Some(indexed) if std::ptr::eq(Arc::as_ptr(&indexed), module) => Ok(()),
            _ => Err(ModuleError::NotFound(module.name().to_string())),
        }
    }

    // -- batch --------------------------------------------------------------

    /// Load a single package from the modules directory by name
    pub fn load_by_name(&self, name: &str) -> ModuleResult<Arc<LoadedModule>> {
        let package = self.loader.find(name)?;
        self.load(&package)
    }

    /// Discover, order, load and enable everything in the modules directory.
    ///
    /// Failures are collected per module; one module failing never stops the
    /// rest of the batch.
    pub fn load_all(&self) -> BatchReport {
        let mut report = BatchReport::default();

        let discovery = self.loader.discover();
        report.errors.extend(discovery.errors);

        let plan = ModuleLoader::plan(discovery.packages);
        report.errors.extend(plan.rejected);

        let mut loaded = Vec::new();
        for package in &plan.ordered {
            match self.load(package) {
                Ok(module) => {
                    report.loaded.push(module.name().to_string());
                    loaded.push(module);
                }
                Err(e) => {
                    tracing::error!("Failed to load module {}: {}", package.name(), e);
                    report.errors.push(e);
                }
            }
        }

        for module in &loaded {
            match self.enable(module) {
                Ok(()) => report.enabled.push(module.name().to_string()),
                Err(e) => {
                    tracing::warn!("Module {} stays disabled: {}", module.name(), e);
                    report.errors.push(e);
                }
            }
        }

        tracing::info!(
            "Module batch: {} loaded, {} enabled, {} error(s)",
            report.loaded.len(),
            report.enabled.len(),
            report.errors.len()
        );
        report
    }
}

fn hook_error(module: &LoadedModule, hook: &'static str, error: ModuleError) -> ModuleError {
    match error {
        ModuleError::Hook { .. } | ModuleError::MissingDependency { .. } => error,
        other => ModuleError::Hook {
            module: module.name().to_string(),
            hook,
            reason: other.to_string(),
        },
    }
}

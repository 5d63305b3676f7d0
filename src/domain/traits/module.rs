use crate::application::errors::ModuleResult;
use crate::application::services::ModuleContext;

/// Module trait - lifecycle hooks every feature package implements
///
/// Hooks run on the thread driving the transition. `on_enable` is where a
/// module registers its root commands through the context; anything it
/// registers is removed again when the module is disabled.
pub trait Module: Send + Sync {
    fn on_load(&self, _ctx: &ModuleContext<'_>) -> ModuleResult<()> {
        Ok(())
    }

    fn on_enable(&self, ctx: &ModuleContext<'_>) -> ModuleResult<()>;

    fn on_disable(&self, _ctx: &ModuleContext<'_>) -> ModuleResult<()> {
        Ok(())
    }

    fn on_unload(&self, _ctx: &ModuleContext<'_>) -> ModuleResult<()> {
        Ok(())
    }

    /// Bundled default for `modules/<name>/config.json`
    fn default_config(&self) -> serde_json::Value {
        serde_json::json!({})
    }
}

/// Factory producing a fresh module instance
pub type ModuleFactory = fn() -> Box<dyn Module>;

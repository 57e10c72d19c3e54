//! Seam to the embedded proxy engine.
//!
//! The engine itself lives outside this crate. An embedding build installs
//! an [`EngineFactory`] once at load time; the session lifecycle then
//! constructs, starts and closes engines through it.

use std::sync::{Arc, Mutex, PoisonError};

use crate::config::{self, Options};
use crate::context::Context;
use crate::error::{AppError, Result};
use crate::platform::PlatformInterface;

pub trait Engine: Send {
    fn start(&mut self) -> anyhow::Result<()>;

    /// Release listeners and the tunnel. Closing twice must be harmless.
    fn close(&mut self) -> anyhow::Result<()>;
}

pub trait EngineFactory: Send + Sync {
    /// Build an engine bound to `ctx`. `platform` is present when the
    /// tunnel descriptor is delegated instead of spliced into `options`.
    fn create(
        &self,
        ctx: &Context,
        options: Options,
        platform: Option<Arc<dyn PlatformInterface>>,
    ) -> anyhow::Result<Box<dyn Engine>>;
}

static FACTORY: Mutex<Option<Arc<dyn EngineFactory>>> = Mutex::new(None);

/// Register the process-wide factory used by the exported entry points.
pub fn install(factory: Arc<dyn EngineFactory>) {
    let mut slot = FACTORY.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        tracing::warn!("engine factory replaced");
    }
    *slot = Some(factory);
}

pub fn uninstall() {
    FACTORY.lock().unwrap_or_else(PoisonError::into_inner).take();
}

#[must_use]
pub fn installed() -> Option<Arc<dyn EngineFactory>> {
    FACTORY.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Construct an engine from an unmodified document; the tunnel reaches it
/// through `platform`. Performs its own context-aware decode.
pub fn new_service(
    ctx: &Context,
    config_text: &str,
    platform: Arc<dyn PlatformInterface>,
    factory: &dyn EngineFactory,
) -> Result<Box<dyn Engine>> {
    let options = config::parse_typed(config_text, ctx.registry())?;
    factory
        .create(ctx, options, Some(platform))
        .map_err(|e| AppError::engine_construct(&e))
}

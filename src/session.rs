//! Session lifecycle: owns the single live engine and its cancellation scope.
//!
//! ```text
//!   Idle --start--> Running --stop--> Stopping --> Idle
//!                      |                  ^
//!                      +----start---------+   (newest start wins)
//! ```
//!
//! Every transition happens under one mutex. A failed start always lands
//! in `Idle` with any half-built engine closed.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::config::{self, InjectionStrategy, Registry};
use crate::context::Context;
use crate::engine::{self, Engine, EngineFactory};
use crate::error::{AppError, Result};
use crate::memory;
use crate::platform::{tracing_log_sink, HostPlatform, LogSink, PlatformInterface};

const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_WORKER_THREADS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
}

#[derive(Clone)]
pub struct SessionOptions {
    /// Pause after a successful start so the engine's first log lines
    /// reach the host before control returns.
    pub settle_delay: Duration,
    pub worker_threads: usize,
    pub strategy: InjectionStrategy,
    /// Where the platform adapter sends engine log lines.
    pub log_sink: LogSink,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            worker_threads: DEFAULT_WORKER_THREADS,
            strategy: InjectionStrategy::default(),
            log_sink: tracing_log_sink(),
        }
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("settle_delay", &self.settle_delay)
            .field("worker_threads", &self.worker_threads)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

struct ActiveSession {
    ctx: Context,
    engine: Box<dyn Engine>,
    runtime: Runtime,
}

struct Inner {
    state: SessionState,
    active: Option<ActiveSession>,
    options: SessionOptions,
}

pub struct SessionManager {
    background: Context,
    inner: Mutex<Inner>,
}

static SESSION: OnceLock<SessionManager> = OnceLock::new();

/// Process-wide session behind the exported entry points.
pub fn global() -> &'static SessionManager {
    SESSION.get_or_init(|| SessionManager::new(SessionOptions::default()))
}

impl SessionManager {
    #[must_use]
    pub fn new(options: SessionOptions) -> Self {
        Self::with_registry(options, Registry::standard())
    }

    #[must_use]
    pub fn with_registry(options: SessionOptions, registry: Registry) -> Self {
        Self {
            background: Context::background(registry),
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                active: None,
                options,
            }),
        }
    }

    /// Replace the options used by the next `start`.
    pub fn set_options(&self, options: SessionOptions) {
        self.lock().options = options;
    }

    /// Replace only the engine log sink, keeping the other options.
    pub fn set_log_sink(&self, sink: LogSink) {
        self.lock().options.log_sink = sink;
    }

    #[must_use]
    pub fn options(&self) -> SessionOptions {
        self.lock().options.clone()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Start a new engine, tearing down any running one first.
    pub fn start(&self, factory: &dyn EngineFactory, config_text: &str, tun_fd: i32) -> Result<()> {
        let settle_delay = {
            let mut inner = self.lock();
            if inner.active.is_some() {
                info!("start requested while running; stopping previous session");
                teardown(&mut inner);
            }

            let active = self.launch(&inner.options, factory, config_text, tun_fd)?;
            inner.active = Some(active);
            inner.state = SessionState::Running;
            info!(strategy = %inner.options.strategy, tun_fd, "session_started");
            inner.options.settle_delay
        };

        if !settle_delay.is_zero() {
            std::thread::sleep(settle_delay);
        }
        Ok(())
    }

    /// Cancel, close and forget the running engine. Safe to call when idle.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if inner.active.is_none() {
            debug!("stop requested while idle");
            inner.state = SessionState::Idle;
            return;
        }
        teardown(&mut inner);
        info!("session_stopped");
    }

    fn launch(
        &self,
        options: &SessionOptions,
        factory: &dyn EngineFactory,
        config_text: &str,
        tun_fd: i32,
    ) -> Result<ActiveSession> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(options.worker_threads.max(1))
            .thread_name("slux-engine")
            .enable_all()
            .build()?;
        let ctx = self.background.child().with_runtime(runtime.handle().clone());
        let tun_fd = config::usable_fd(Some(tun_fd));

        let built = match options.strategy {
            InjectionStrategy::RawSplice => config::transform(config_text, tun_fd, ctx.registry())
                .and_then(|typed| {
                    factory
                        .create(&ctx, typed, None)
                        .map_err(|e| AppError::engine_construct(&e))
                }),
            InjectionStrategy::PlatformDelegate => {
                let platform: Arc<dyn PlatformInterface> =
                    Arc::new(HostPlatform::new(tun_fd, Arc::clone(&options.log_sink)));
                engine::new_service(&ctx, config_text, platform, factory)
            }
        };

        let mut engine = match built {
            Ok(engine) => engine,
            Err(err) => {
                warn!(error = %err, "session_build_failed");
                abandon(&ctx, runtime);
                return Err(err);
            }
        };

        if let Err(err) = engine.start() {
            warn!(error = %format!("{err:#}"), "engine_start_failed");
            close_engine(engine.as_mut());
            drop(engine);
            abandon(&ctx, runtime);
            return Err(AppError::engine_start(&err));
        }

        Ok(ActiveSession {
            ctx,
            engine,
            runtime,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn teardown(inner: &mut Inner) {
    inner.state = SessionState::Stopping;
    if let Some(active) = inner.active.take() {
        let ActiveSession {
            ctx,
            mut engine,
            runtime,
        } = active;
        ctx.cancel();
        close_engine(engine.as_mut());
        drop(engine);
        runtime.shutdown_background();
    }
    inner.state = SessionState::Idle;
    memory::reclaim();
}

fn abandon(ctx: &Context, runtime: Runtime) {
    ctx.cancel();
    runtime.shutdown_background();
}

fn close_engine(engine: &mut dyn Engine) {
    match panic::catch_unwind(AssertUnwindSafe(|| engine.close())) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %format!("{err:#}"), "engine_close_failed"),
        Err(_) => warn!("engine_close_panicked"),
    }
}

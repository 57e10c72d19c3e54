use std::sync::{Arc, Once, OnceLock, PoisonError, RwLock};

use slog::Drain;

use crate::platform::LogSink;

fn level_from_env_or_default(default: log::LevelFilter) -> log::LevelFilter {
    let Ok(value) = std::env::var("RUST_LOG") else {
        return default;
    };
    let lower = value.to_ascii_lowercase();
    if lower.contains("trace") {
        log::LevelFilter::Trace
    } else if lower.contains("debug") {
        log::LevelFilter::Debug
    } else if lower.contains("warn") {
        log::LevelFilter::Warn
    } else if lower.contains("error") {
        log::LevelFilter::Error
    } else if lower.contains("off") {
        log::LevelFilter::Off
    } else {
        log::LevelFilter::Info
    }
}

fn default_level(verbose: bool) -> log::LevelFilter {
    if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    }
}

fn install_logger(logger: slog::Logger, level: log::LevelFilter) {
    static LOGGER_GUARD: OnceLock<slog_scope::GlobalLoggerGuard> = OnceLock::new();
    static STDLOG_INIT: Once = Once::new();

    if LOGGER_GUARD.get().is_none() {
        let guard = slog_scope::set_global_logger(logger);
        let _ = LOGGER_GUARD.set(guard);
    }

    STDLOG_INIT.call_once(|| {
        let _ = slog_stdlog::init();
    });
    log::set_max_level(level);
}

pub fn init_terminal(verbose: bool) {
    let level = level_from_env_or_default(default_level(verbose));
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain)
        .overflow_strategy(slog_async::OverflowStrategy::Block)
        .build()
        .fuse();
    let logger = slog::Logger::root(drain, slog::o!());
    install_logger(logger, level);
}

/// Host sink that can be replaced or detached after the logger is
/// installed.
#[derive(Clone, Default)]
pub struct SinkSlot {
    sink: Arc<RwLock<Option<LogSink>>>,
}

impl SinkSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap the sink. Returns once no record is being written to the old one.
    pub fn set(&self, sink: Option<LogSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn write(&self, line: &str) {
        let guard = self.sink.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(sink) = guard.as_ref() {
            sink(line);
        }
    }
}

fn platform_slot() -> &'static SinkSlot {
    static SLOT: OnceLock<SinkSlot> = OnceLock::new();
    SLOT.get_or_init(SinkSlot::new)
}

/// Route this crate's logs into the host's log channel. Calling it again
/// replaces the previous sink.
pub fn init_platform(sink: LogSink, verbose: bool) {
    static PLATFORM_INIT: Once = Once::new();

    platform_slot().set(Some(sink));
    PLATFORM_INIT.call_once(|| {
        let level = level_from_env_or_default(default_level(verbose));
        let drain = SinkDrain::new(platform_slot().clone()).fuse();
        let drain = slog_async::Async::new(drain)
            .overflow_strategy(slog_async::OverflowStrategy::Block)
            .build()
            .fuse();
        let logger = slog::Logger::root(drain, slog::o!());
        install_logger(logger, level);
    });
}

/// Stop calling the host sink; records are dropped until the next
/// `init_platform`.
pub fn detach_platform() {
    platform_slot().set(None);
}

/// Whether a host sink currently receives this crate's records.
#[must_use]
pub fn platform_attached() -> bool {
    platform_slot().is_attached()
}

/// slog drain writing one `LEVEL target: message` line per record.
pub struct SinkDrain {
    slot: SinkSlot,
}

impl SinkDrain {
    #[must_use]
    pub fn new(slot: SinkSlot) -> Self {
        Self { slot }
    }
}

impl Drain for SinkDrain {
    type Ok = ();
    type Err = slog::Never;

    fn log(&self, record: &slog::Record, _values: &slog::OwnedKVList) -> Result<(), slog::Never> {
        let line = format!(
            "{} {}: {}",
            record.level().as_short_str(),
            record.module(),
            record.msg()
        );
        self.slot.write(&line);
        Ok(())
    }
}

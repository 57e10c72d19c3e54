// slux library crate
//
// Mobile runtime adapter: takes the host's JSON config and tunnel fd,
// hands them to the embedded proxy engine, and owns the one running
// engine between start() and stop(). The Android JNI crate and the C
// entry points both go through session::global().

pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod logging;
pub mod platform;
pub mod session;

mod memory;

pub use config::{InjectionStrategy, Options, Registry};
pub use context::Context;
pub use engine::{Engine, EngineFactory};
pub use error::{AppError, Result};
pub use platform::{HostPlatform, PlatformInterface, TunOptions};
pub use session::{SessionManager, SessionOptions, SessionState};

//! embridge Host Bridge
//!
//! Host capabilities for native code, exported across the C ABI and backed
//! by an embedded QuickJS environment.
//!
//! Features:
//! - Wall-clock provider (`now`, `emscripten_get_now`)
//! - Script evaluation bridge (`emEval`) with async slots (`emEvalAsync*`)
//! - In-place page navigation (`emBrowsePage`)
//! - Console, timers and `location` inside the evaluated environment

mod console;
mod timers;

pub mod bonds;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod environment;
pub mod ffi;
pub mod location;

pub use bonds::BondState;
pub use bridge::{eval_text, EvalOutcome};
pub use config::HostConfig;
pub use environment::HostEnvironment;
pub use location::{DisplaySurface, LocationManager, LoggingSurface};
pub use timers::TimerManager;
pub use url::Url;

use rquickjs::{Coerced, Ctx, Value};

/// Host bridge error
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("null pointer passed across the foreign boundary")]
    NullPointer,

    #[error("foreign string is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("JavaScript error: {0}")]
    Exception(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("result contains an interior NUL byte at offset {0}")]
    InteriorNul(usize),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("no async evaluation in slot {0}")]
    UnknownSlot(usize),

    #[error("async evaluation in slot {0} has not settled")]
    SlotPending(usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("host environment is already in use on this thread")]
    Reentrant,

    #[error("Failure on the javascript side, check console")]
    ScriptFailure,
}

impl HostError {
    /// Convert an engine error, pulling the pending exception out of `ctx`
    /// when the error is a thrown JavaScript value.
    pub fn from_js(ctx: &Ctx<'_>, err: rquickjs::Error) -> Self {
        if !matches!(err, rquickjs::Error::Exception) {
            return Self::Engine(err.to_string());
        }
        Self::Exception(describe_thrown(&ctx.catch()))
    }
}

impl From<rquickjs::Error> for HostError {
    fn from(err: rquickjs::Error) -> Self {
        Self::Engine(err.to_string())
    }
}

/// Render a thrown value as "message" plus stack when available.
pub fn describe_thrown(thrown: &Value<'_>) -> String {
    if let Some(exception) = thrown.as_exception() {
        let message = exception.message().unwrap_or_default();
        return match exception.stack() {
            Some(stack) if !stack.trim().is_empty() => format!("{message}\n{}", stack.trim_end()),
            _ => message,
        };
    }
    thrown
        .get::<Coerced<String>>()
        .map(|text| text.0)
        .unwrap_or_else(|_| "<unprintable exception>".to_string())
}

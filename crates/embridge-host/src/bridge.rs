//! Script evaluation bridge
//!
//! Classifies an evaluation result into what the foreign caller receives:
//! nothing for `undefined`, strings verbatim, and everything else as JSON.

use crate::{HostEnvironment, HostError};
use rquickjs::{Ctx, Value};
use std::ffi::CString;

/// Result of a successful evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalOutcome {
    /// The script evaluated to `undefined`
    Absent,
    /// A string result, or the JSON text of any other value
    Text(String),
}

impl EvalOutcome {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Absent => None,
            Self::Text(text) => Some(text),
        }
    }

    /// Encode for the foreign caller. `None` stands for absence.
    pub fn into_c_string(self) -> Result<Option<CString>, HostError> {
        match self {
            Self::Absent => Ok(None),
            Self::Text(text) => CString::new(text)
                .map(Some)
                .map_err(|e| HostError::InteriorNul(e.nul_position())),
        }
    }
}

pub(crate) fn classify<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Result<EvalOutcome, HostError> {
    if value.is_undefined() {
        return Ok(EvalOutcome::Absent);
    }
    if let Some(text) = value.as_string() {
        return Ok(EvalOutcome::Text(text.to_string()?));
    }
    match ctx.json_stringify(value) {
        Ok(Some(json)) => Ok(EvalOutcome::Text(json.to_string()?)),
        Ok(None) => Err(HostError::Serialization("value has no JSON representation".to_string())),
        Err(err) => match HostError::from_js(ctx, err) {
            HostError::Exception(message) => Err(HostError::Serialization(message)),
            other => Err(other),
        },
    }
}

/// Evaluate `code` the way native callers consume the bridge: absence reads
/// as an empty string and any failure is reported after logging it.
pub fn eval_text(env: &HostEnvironment, code: &str) -> Result<String, HostError> {
    match env.eval_bridge(code) {
        Ok(EvalOutcome::Absent) => Ok(String::new()),
        Ok(EvalOutcome::Text(text)) => Ok(text),
        Err(err) => {
            tracing::error!("{}", err);
            Err(HostError::ScriptFailure)
        }
    }
}

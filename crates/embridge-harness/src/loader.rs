//! Module loader
//!
//! CommonJS-style loading: the source runs inside a function that receives
//! `module`, `exports` and `require`, and whatever ends up in
//! `module.exports` is the module's entry point.

use crate::HarnessError;
use embridge_host::HostError;
use rquickjs::{Ctx, Exception, Function, Object, Value};
use std::path::Path;

/// A test module: display name plus source text
#[derive(Debug, Clone)]
pub struct ModuleSource {
    pub name: String,
    pub code: String,
}

impl ModuleSource {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }

    /// Read a module from disk
    pub fn read(path: &Path) -> Result<Self, HarnessError> {
        let code = std::fs::read_to_string(path).map_err(|source| HarnessError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(path.display().to_string(), code))
    }

    /// Source wrapped as a function expression; a leading shebang line is
    /// blanked so line numbers stay put.
    fn wrapped(&self) -> String {
        let body = match self.code.strip_prefix("#!") {
            Some(rest) => rest.find('\n').map_or("", |at| &rest[at..]),
            None => self.code.as_str(),
        };
        format!("(function (module, exports, require, __filename) {{{body}\n}})")
    }
}

/// Evaluate the module and return its exported entry function.
///
/// `module.exports` may be the function itself or an object whose
/// `default` is one.
pub(crate) fn load<'js>(ctx: &Ctx<'js>, module: &ModuleSource) -> Result<Function<'js>, HarnessError> {
    let factory: Function = ctx
        .eval(module.wrapped())
        .map_err(|e| HostError::from_js(ctx, e))?;

    let record = Object::new(ctx.clone())?;
    let exports = Object::new(ctx.clone())?;
    record.set("exports", exports.clone())?;
    let require = Function::new(ctx.clone(), |ctx: Ctx<'_>, name: String| -> rquickjs::Result<()> {
        Err(Exception::throw_message(&ctx, &format!("require({name:?}) is not available in the harness")))
    })?;

    factory
        .call::<_, Value>((record.clone(), exports, require, module.name.as_str()))
        .map_err(|e| HostError::from_js(ctx, e))?;

    let exported: Value = record.get("exports")?;
    if let Some(entry) = exported.as_function() {
        return Ok(entry.clone());
    }
    if let Some(object) = exported.as_object() {
        if let Some(entry) = object.get::<_, Option<Function>>("default")? {
            return Ok(entry);
        }
    }
    Err(HarnessError::NotCallable(module.name.clone()))
}

//! Console API
//!
//! Routes console.log, console.warn, console.error, etc. to `tracing`.

use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Object, Value};
use std::fmt::Write;

#[derive(Clone, Copy)]
enum ConsoleLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

const METHODS: [(&str, ConsoleLevel); 6] = [
    ("log", ConsoleLevel::Info),
    ("info", ConsoleLevel::Info),
    ("warn", ConsoleLevel::Warn),
    ("error", ConsoleLevel::Error),
    ("debug", ConsoleLevel::Debug),
    ("trace", ConsoleLevel::Trace),
];

/// Install console API into the global object
pub fn install_console<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<()> {
    let console = Object::new(ctx.clone())?;

    for (name, level) in METHODS {
        console.set(
            name,
            Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
                emit(level, &format_args_line(&ctx, &args.0));
                Ok::<(), rquickjs::Error>(())
            })?
            .with_name(name)?,
        )?;
    }

    ctx.globals().set("console", console)?;
    Ok(())
}

fn emit(level: ConsoleLevel, line: &str) {
    match level {
        ConsoleLevel::Error => tracing::error!("[JS] {}", line),
        ConsoleLevel::Warn => tracing::warn!("[JS] {}", line),
        ConsoleLevel::Info => tracing::info!("[JS] {}", line),
        ConsoleLevel::Debug => tracing::debug!("[JS] {}", line),
        ConsoleLevel::Trace => tracing::trace!("[JS] {}", line),
    }
}

/// Join console arguments the way a browser console prints them.
pub(crate) fn format_args_line<'js>(ctx: &Ctx<'js>, values: &[Value<'js>]) -> String {
    let mut output = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            output.push(' ');
        }
        format_value(&mut output, ctx, value);
    }
    output
}

fn format_value<'js>(out: &mut String, ctx: &Ctx<'js>, value: &Value<'js>) {
    if value.is_undefined() {
        out.push_str("undefined");
    } else if value.is_null() {
        out.push_str("null");
    } else if let Some(b) = value.as_bool() {
        write!(out, "{}", b).ok();
    } else if let Some(n) = value.as_int() {
        write!(out, "{}", n).ok();
    } else if let Some(n) = value.as_float() {
        write!(out, "{}", n).ok();
    } else if let Some(s) = value.as_string() {
        if let Ok(s) = s.to_string() {
            out.push_str(&s);
        }
    } else if value.as_exception().is_some() {
        out.push_str(&crate::describe_thrown(value));
    } else if value.is_function() {
        out.push_str("[Function]");
    } else if value.is_object() {
        match ctx.json_stringify(value.clone()) {
            Ok(Some(json)) => out.push_str(&json.to_string().unwrap_or_default()),
            _ => out.push_str(if value.is_array() { "[Array]" } else { "[Object]" }),
        }
    } else {
        out.push_str("[unknown]");
    }
}

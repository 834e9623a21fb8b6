//! Console API
//!
//! Implements console.log, console.warn, console.error, etc. on top of
//! `tracing`.

use std::rc::Rc;

use crate::engine::{ScriptEngine, Value};
use crate::error::ScriptError;
use crate::value::ScriptValue;

#[derive(Debug, Clone, Copy)]
enum Level {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

const LEVELS: [(&str, Level); 5] = [
    ("log", Level::Log),
    ("info", Level::Info),
    ("warn", Level::Warn),
    ("error", Level::Error),
    ("debug", Level::Debug),
];

/// Install console API into the global object
pub fn install_console<E: ScriptEngine>(engine: &mut E) -> Result<(), ScriptError> {
    let global = engine.global();
    let console = engine.create_object()?;

    for (name, level) in LEVELS {
        let f = engine.create_function(
            name,
            Rc::new(move |engine, _, args| {
                let output = format_args_list(engine, args)?;
                log_with_level(level, &output);
                Ok(ScriptValue::Undefined)
            }),
        )?;
        engine.set(&console, name, ScriptValue::Object(f))?;
    }

    engine.set(&global, "console", ScriptValue::Object(console))
}

/// Join the arguments the way the browser console prints them
fn format_args_list<E: ScriptEngine>(engine: &mut E, values: &[Value<E>]) -> Result<String, ScriptError> {
    let mut output = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            output.push(' ');
        }
        output.push_str(&engine.to_string(value)?);
    }
    Ok(output)
}

fn log_with_level(level: Level, output: &str) {
    match level {
        Level::Error => tracing::error!("[JS] {}", output),
        Level::Warn => tracing::warn!("[JS] {}", output),
        Level::Debug => tracing::debug!("[JS] {}", output),
        Level::Log | Level::Info => tracing::info!("[JS] {}", output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapEngine;

    #[test]
    fn test_console_exists() {
        let mut engine = HeapEngine::default();
        install_console(&mut engine).unwrap();
        let result = engine.eval("typeof console.log").unwrap();
        assert_eq!(result, ScriptValue::from("function"));
    }

    #[test]
    fn test_console_log_returns_undefined() {
        let mut engine = HeapEngine::default();
        install_console(&mut engine).unwrap();
        let result = engine.eval("console.log('a', 1, true, null, {})").unwrap();
        assert!(result.is_undefined());
    }
}

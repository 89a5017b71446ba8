//! `command` and `type`

use crate::bytes::{self, Bytes};
use crate::interp::builtins::{is_builtin, BuiltinOutcome};
use crate::interp::engine::{Executor, InputStream};
use crate::interp::interrupt::ExecResult;
use crate::interp::state::ShellState;

fn resolution(ex: &Executor<'_>, st: &ShellState, name: &str) -> Option<String> {
    if st.aliases.contains_key(name) {
        return Some(format!("alias {}='{}'", name, st.aliases.get(name).cloned().unwrap_or_default()));
    }
    if st.functions.contains_key(name) {
        return Some(name.to_string());
    }
    if is_builtin(name) {
        return Some(name.to_string());
    }
    if ex.is_registered(name) {
        return Some(format!("/usr/bin/{}", name));
    }
    None
}

pub fn command(
    ex: &Executor<'_>,
    st: &mut ShellState,
    args: &[Bytes],
    input: &InputStream,
) -> BuiltinOutcome {
    let mut verbose = false;
    let mut describe = false;
    let mut rest = 0;
    for (i, arg) in args.iter().enumerate() {
        match bytes::lossy_string(arg).as_str() {
            "-v" => verbose = true,
            "-V" => {
                verbose = true;
                describe = true;
            }
            "-p" | "--" => {}
            _ => {
                rest = i;
                break;
            }
        }
        rest = i + 1;
    }
    let rest = &args[rest..];

    if verbose {
        let mut out = String::new();
        let mut code = 0;
        for arg in rest {
            let name = bytes::lossy_string(arg);
            match resolution(ex, st, &name) {
                Some(what) => {
                    if describe {
                        out.push_str(&describe_name(ex, st, &name));
                    } else {
                        out.push_str(&what);
                        out.push('\n');
                    }
                }
                None => code = 1,
            }
        }
        return Ok(ExecResult::new(out.into_bytes(), Bytes::new(), code));
    }

    if rest.is_empty() {
        return Ok(ExecResult::ok());
    }
    // Execute, bypassing shell functions.
    ex.dispatch_simple(st, rest, input, true)
}

fn describe_name(ex: &Executor<'_>, st: &ShellState, name: &str) -> String {
    if let Some(value) = st.aliases.get(name) {
        return format!("{} is aliased to `{}'\n", name, value);
    }
    if st.functions.contains_key(name) {
        return format!("{} is a function\n", name);
    }
    if is_builtin(name) {
        return format!("{} is a shell builtin\n", name);
    }
    if ex.is_registered(name) {
        return format!("{} is /usr/bin/{}\n", name, name);
    }
    format!("{}: not found\n", name)
}

pub fn type_cmd(ex: &Executor<'_>, st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    let mut terse = false;
    let mut names: Vec<String> = Vec::new();
    for arg in args {
        match bytes::lossy_string(arg).as_str() {
            "-t" => terse = true,
            "-a" | "-p" | "--" => {}
            name => names.push(name.to_string()),
        }
    }

    let mut out = String::new();
    let mut err = String::new();
    let mut code = 0;
    for name in names {
        let kind = if st.aliases.contains_key(&name) {
            Some("alias")
        } else if st.functions.contains_key(&name) {
            Some("function")
        } else if is_builtin(&name) {
            Some("builtin")
        } else if ex.is_registered(&name) {
            Some("file")
        } else {
            None
        };
        match kind {
            Some(kind) if terse => {
                out.push_str(kind);
                out.push('\n');
            }
            Some("alias") => {
                let value = st.aliases.get(&name).cloned().unwrap_or_default();
                out.push_str(&format!("{} is aliased to `{}'\n", name, value));
            }
            Some("function") => out.push_str(&format!("{} is a function\n", name)),
            Some("builtin") => out.push_str(&format!("{} is a shell builtin\n", name)),
            Some(_) => out.push_str(&format!("{} is /usr/bin/{}\n", name, name)),
            None => {
                if !terse {
                    err.push_str(&format!("bash: type: {}: not found\n", name));
                }
                code = 1;
            }
        }
    }
    Ok(ExecResult::new(out.into_bytes(), err.into_bytes(), code))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    // Resolution behavior is exercised end to end in the engine tests,
    // where an executor with a registry exists.
}

//! Variable Builtins
//!
//! `export`, `readonly`, `local`, `unset`, `set`, `shopt`, `let`.

use crate::bytes::{self, Bytes};
use crate::interp::arith::eval_arith;
use crate::interp::builtins::BuiltinOutcome;
use crate::interp::engine::Executor;
use crate::interp::interrupt::{ExecResult, InterruptKind};
use crate::interp::state::ShellState;

/// Split `name=value` / `name+=value`; None when the arg is a bare name.
fn split_assignment(arg: &[u8]) -> Option<(String, bool, Bytes)> {
    let eq = arg.iter().position(|&b| b == b'=')?;
    let (name_part, value) = arg.split_at(eq);
    let (name_part, append) = match name_part.strip_suffix(b"+") {
        Some(stripped) => (stripped, true),
        None => (name_part, false),
    };
    let name = String::from_utf8(name_part.to_vec()).ok()?;
    Some((name, append, value[1..].to_vec()))
}

pub fn export(_ex: &Executor<'_>, st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    let mut names: Vec<&Bytes> = Vec::new();
    let mut unexport = false;
    let mut list = args.is_empty();
    for arg in args {
        match bytes::lossy_string(arg).as_str() {
            "-p" => list = true,
            "-n" => unexport = true,
            "--" => continue,
            _ => names.push(arg),
        }
    }
    if list && names.is_empty() {
        let mut out = Bytes::new();
        for (name, var) in st.scopes.visible() {
            if var.exported {
                if let Some(value) = var.value.scalar() {
                    out.extend_from_slice(b"declare -x ");
                    out.extend_from_slice(name.as_bytes());
                    out.extend_from_slice(b"=\"");
                    out.extend_from_slice(value);
                    out.extend_from_slice(b"\"\n");
                }
            }
        }
        return Ok(ExecResult::new(out, Bytes::new(), 0));
    }

    for arg in names {
        match split_assignment(arg) {
            Some((name, append, value)) => {
                if !bytes::is_valid_name(&name) {
                    return Ok(invalid_identifier("export", arg));
                }
                let result = if append {
                    st.scopes.append_scalar(&name, &value)
                } else {
                    st.scopes.set_scalar(&name, value)
                };
                if let Err(msg) = result {
                    return Ok(ExecResult::failure(format!("export: {}", msg), 1));
                }
                st.scopes.set_exported(&name, !unexport);
            }
            None => {
                let name = bytes::lossy_string(arg);
                if !bytes::is_valid_name(&name) {
                    return Ok(invalid_identifier("export", arg));
                }
                st.scopes.set_exported(&name, !unexport);
            }
        }
    }
    Ok(ExecResult::ok())
}

pub fn readonly(_ex: &Executor<'_>, st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    if args.is_empty() || args.iter().any(|a| a.as_slice() == b"-p") {
        let mut out = Bytes::new();
        for (name, var) in st.scopes.visible() {
            if var.readonly {
                if let Some(value) = var.value.scalar() {
                    out.extend_from_slice(b"declare -r ");
                    out.extend_from_slice(name.as_bytes());
                    out.extend_from_slice(b"=\"");
                    out.extend_from_slice(value);
                    out.extend_from_slice(b"\"\n");
                }
            }
        }
        return Ok(ExecResult::new(out, Bytes::new(), 0));
    }

    for arg in args {
        if arg.as_slice() == b"--" {
            continue;
        }
        match split_assignment(arg) {
            Some((name, _, value)) => {
                if !bytes::is_valid_name(&name) {
                    return Ok(invalid_identifier("readonly", arg));
                }
                if let Err(msg) = st.scopes.set_scalar(&name, value) {
                    return Ok(ExecResult::failure(format!("readonly: {}", msg), 1));
                }
                st.scopes.set_readonly(&name);
            }
            None => {
                let name = bytes::lossy_string(arg);
                if !bytes::is_valid_name(&name) {
                    return Ok(invalid_identifier("readonly", arg));
                }
                st.scopes.set_readonly(&name);
            }
        }
    }
    Ok(ExecResult::ok())
}

pub fn local(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    if st.func_depth == 0 {
        return Ok(ExecResult::failure("local: can only be used in a function", 1));
    }
    for arg in args {
        if arg.as_slice() == b"--" {
            continue;
        }
        match split_assignment(arg) {
            Some((name, _, value)) => {
                if !bytes::is_valid_name(&name) {
                    return Ok(invalid_identifier("local", arg));
                }
                if let Err(msg) = st.scopes.set_local(&name, Some(value)) {
                    return Ok(ExecResult::failure(format!("local: {}", msg), 1));
                }
            }
            None => {
                let name = bytes::lossy_string(arg);
                if !bytes::is_valid_name(&name) {
                    return Ok(invalid_identifier("local", arg));
                }
                if let Err(msg) = st.scopes.set_local(&name, None) {
                    return Ok(ExecResult::failure(format!("local: {}", msg), 1));
                }
            }
        }
    }
    Ok(ExecResult::ok())
}

pub fn unset(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    let mut functions_only = false;
    let mut vars_only = false;
    let mut names: Vec<String> = Vec::new();
    for arg in args {
        match bytes::lossy_string(arg).as_str() {
            "-f" => functions_only = true,
            "-v" => vars_only = true,
            "--" => continue,
            name => names.push(name.to_string()),
        }
    }
    for name in names {
        if functions_only {
            st.functions.remove(&name);
            continue;
        }
        if vars_only || st.scopes.is_set(&name) {
            if let Err(msg) = st.scopes.unset(&name) {
                return Ok(ExecResult::failure(format!("unset: {}", msg), 1));
            }
        } else {
            st.functions.remove(&name);
        }
    }
    Ok(ExecResult::ok())
}

// ----------------------------------------------------------------------------
// set
// ----------------------------------------------------------------------------

fn set_option(st: &mut ShellState, name: &str, enable: bool) -> bool {
    match name {
        "errexit" => st.flags.errexit = enable,
        "nounset" => st.flags.nounset = enable,
        "pipefail" => st.flags.pipefail = enable,
        "xtrace" => st.flags.xtrace = enable,
        "verbose" => st.flags.verbose = enable,
        "noglob" => st.flags.noglob = enable,
        "noclobber" => st.flags.noclobber = enable,
        "noexec" => st.flags.noexec = enable,
        "allexport" => st.flags.allexport = enable,
        "posix" => st.flags.posix = enable,
        _ => return false,
    }
    true
}

fn set_flag_letter(st: &mut ShellState, letter: char, enable: bool) -> bool {
    match letter {
        'e' => st.flags.errexit = enable,
        'u' => st.flags.nounset = enable,
        'x' => st.flags.xtrace = enable,
        'v' => st.flags.verbose = enable,
        'f' => st.flags.noglob = enable,
        'n' => st.flags.noexec = enable,
        'C' => st.flags.noclobber = enable,
        'a' => st.flags.allexport = enable,
        _ => return false,
    }
    true
}

pub fn set(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    if args.is_empty() {
        let mut out = Bytes::new();
        for (name, var) in st.scopes.visible() {
            if let Some(value) = var.value.scalar() {
                out.extend_from_slice(name.as_bytes());
                out.push(b'=');
                out.extend_from_slice(&bytes::shell_quote(value));
                out.push(b'\n');
            }
        }
        return Ok(ExecResult::new(out, Bytes::new(), 0));
    }

    let mut i = 0;
    while i < args.len() {
        let text = bytes::lossy_string(&args[i]);
        if text == "--" {
            st.set_positional(args[i + 1..].to_vec());
            return Ok(ExecResult::ok());
        }
        if text == "-o" || text == "+o" {
            let enable = text.starts_with('-');
            match args.get(i + 1) {
                Some(name_arg) => {
                    let name = bytes::lossy_string(name_arg);
                    if !set_option(st, &name, enable) {
                        return Ok(ExecResult::failure(
                            format!("set: {}: invalid option name", name),
                            2,
                        ));
                    }
                    i += 2;
                    continue;
                }
                None => {
                    let listing = [
                        ("allexport", st.flags.allexport),
                        ("errexit", st.flags.errexit),
                        ("noclobber", st.flags.noclobber),
                        ("noexec", st.flags.noexec),
                        ("noglob", st.flags.noglob),
                        ("nounset", st.flags.nounset),
                        ("pipefail", st.flags.pipefail),
                        ("posix", st.flags.posix),
                        ("verbose", st.flags.verbose),
                        ("xtrace", st.flags.xtrace),
                    ];
                    let mut out = String::new();
                    for (name, on) in listing {
                        out.push_str(&format!(
                            "{:<15} {}\n",
                            name,
                            if on { "on" } else { "off" }
                        ));
                    }
                    return Ok(ExecResult::stdout_text(out));
                }
            }
        }
        if let Some(rest) = text.strip_prefix('-').filter(|_| text.len() > 1) {
            for letter in rest.chars() {
                if !set_flag_letter(st, letter, true) {
                    return Ok(ExecResult::failure(format!("set: -{}: invalid option", letter), 2));
                }
            }
            i += 1;
            continue;
        }
        if let Some(rest) = text.strip_prefix('+').filter(|_| text.len() > 1) {
            for letter in rest.chars() {
                if !set_flag_letter(st, letter, false) {
                    return Ok(ExecResult::failure(format!("set: +{}: invalid option", letter), 2));
                }
            }
            i += 1;
            continue;
        }
        // First non-option argument: the rest become the positionals.
        st.set_positional(args[i..].to_vec());
        return Ok(ExecResult::ok());
    }
    Ok(ExecResult::ok())
}

// ----------------------------------------------------------------------------
// shopt
// ----------------------------------------------------------------------------

fn shopt_get(st: &ShellState, name: &str) -> Option<bool> {
    Some(match name {
        "extglob" => st.options.extglob,
        "globstar" => st.options.globstar,
        "nullglob" => st.options.nullglob,
        "failglob" => st.options.failglob,
        "dotglob" => st.options.dotglob,
        "nocaseglob" => st.options.nocaseglob,
        "nocasematch" => st.options.nocasematch,
        "expand_aliases" => st.options.expand_aliases,
        "xpg_echo" => st.options.xpg_echo,
        _ => return None,
    })
}

fn shopt_set(st: &mut ShellState, name: &str, enable: bool) -> bool {
    match name {
        "extglob" => st.options.extglob = enable,
        "globstar" => st.options.globstar = enable,
        "nullglob" => st.options.nullglob = enable,
        "failglob" => st.options.failglob = enable,
        "dotglob" => st.options.dotglob = enable,
        "nocaseglob" => st.options.nocaseglob = enable,
        "nocasematch" => st.options.nocasematch = enable,
        "expand_aliases" => st.options.expand_aliases = enable,
        "xpg_echo" => st.options.xpg_echo = enable,
        _ => return false,
    }
    true
}

const SHOPT_NAMES: &[&str] = &[
    "dotglob", "expand_aliases", "extglob", "failglob", "globstar", "nocaseglob", "nocasematch",
    "nullglob", "xpg_echo",
];

pub fn shopt(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    let mut mode: Option<bool> = None;
    let mut quiet = false;
    let mut names: Vec<String> = Vec::new();
    for arg in args {
        match bytes::lossy_string(arg).as_str() {
            "-s" => mode = Some(true),
            "-u" => mode = Some(false),
            "-q" => quiet = true,
            "-p" | "--" => continue,
            name => names.push(name.to_string()),
        }
    }

    if names.is_empty() {
        let mut out = String::new();
        for name in SHOPT_NAMES {
            if let Some(on) = shopt_get(st, name) {
                if mode.map(|m| m == on).unwrap_or(true) {
                    out.push_str(&format!("{}\t{}\n", name, if on { "on" } else { "off" }));
                }
            }
        }
        return Ok(ExecResult::stdout_text(out));
    }

    let mut all_on = true;
    let mut out = String::new();
    for name in &names {
        match mode {
            Some(enable) => {
                if !shopt_set(st, name, enable) {
                    return Ok(ExecResult::failure(
                        format!("shopt: {}: invalid shell option name", name),
                        1,
                    ));
                }
            }
            None => match shopt_get(st, name) {
                Some(on) => {
                    all_on &= on;
                    if !quiet {
                        out.push_str(&format!("{}\t{}\n", name, if on { "on" } else { "off" }));
                    }
                }
                None => {
                    return Ok(ExecResult::failure(
                        format!("shopt: {}: invalid shell option name", name),
                        1,
                    ));
                }
            },
        }
    }
    if mode.is_some() {
        Ok(ExecResult::ok())
    } else {
        Ok(ExecResult::new(out.into_bytes(), Bytes::new(), if all_on { 0 } else { 1 }))
    }
}

// ----------------------------------------------------------------------------
// let
// ----------------------------------------------------------------------------

pub fn let_cmd(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    if args.is_empty() {
        return Ok(ExecResult::failure("let: expression expected", 2));
    }
    let mut last = 0;
    for arg in args {
        let expr = bytes::lossy_string(arg);
        match eval_arith(st, &expr) {
            Ok(value) => last = value,
            Err(int) if matches!(int.kind, InterruptKind::Arithmetic { .. }) => {
                return Ok(ExecResult::new(int.stdout, int.stderr, 1));
            }
            Err(int) => return Err(int),
        }
    }
    Ok(ExecResult::code(if last != 0 { 0 } else { 1 }))
}

fn invalid_identifier(builtin: &str, arg: &[u8]) -> ExecResult {
    ExecResult::failure(
        format!("{}: `{}': not a valid identifier", builtin, bytes::lossy_string(arg)),
        1,
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_assignment() {
        assert_eq!(
            split_assignment(b"x=1"),
            Some(("x".to_string(), false, b"1".to_vec()))
        );
        assert_eq!(
            split_assignment(b"x+=ab"),
            Some(("x".to_string(), true, b"ab".to_vec()))
        );
        assert_eq!(split_assignment(b"x="), Some(("x".to_string(), false, Bytes::new())));
        assert_eq!(split_assignment(b"plain"), None);
    }

    #[test]
    fn test_set_positional_reset() {
        let mut st = ShellState::new();
        set(&mut st, &[b"--".to_vec(), b"a".to_vec(), b"b".to_vec()]).unwrap();
        assert_eq!(st.positional(), &[b"a".to_vec(), b"b".to_vec()]);
        set(&mut st, &[b"--".to_vec()]).unwrap();
        assert!(st.positional().is_empty());
    }

    #[test]
    fn test_set_flags() {
        let mut st = ShellState::new();
        set(&mut st, &[b"-eu".to_vec()]).unwrap();
        assert!(st.flags.errexit);
        assert!(st.flags.nounset);
        set(&mut st, &[b"+e".to_vec()]).unwrap();
        assert!(!st.flags.errexit);
    }

    #[test]
    fn test_set_o_names() {
        let mut st = ShellState::new();
        set(&mut st, &[b"-o".to_vec(), b"pipefail".to_vec()]).unwrap();
        assert!(st.flags.pipefail);
        set(&mut st, &[b"+o".to_vec(), b"pipefail".to_vec()]).unwrap();
        assert!(!st.flags.pipefail);
        let bad = set(&mut st, &[b"-o".to_vec(), b"bogus".to_vec()]).unwrap();
        assert_eq!(bad.exit_code, 2);
    }

    #[test]
    fn test_local_outside_function() {
        let mut st = ShellState::new();
        let result = local(&mut st, &[b"x=1".to_vec()]).unwrap();
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn test_unset_variable_then_function() {
        let mut st = ShellState::new();
        st.scopes.set_scalar("x", b"1".to_vec()).unwrap();
        unset(&mut st, &[b"x".to_vec()]).unwrap();
        assert!(!st.scopes.is_set("x"));
    }

    #[test]
    fn test_shopt_set_and_query() {
        let mut st = ShellState::new();
        shopt(&mut st, &[b"-s".to_vec(), b"extglob".to_vec()]).unwrap();
        assert!(st.options.extglob);
        let q = shopt(&mut st, &[b"-q".to_vec(), b"extglob".to_vec()]).unwrap();
        assert_eq!(q.exit_code, 0);
        shopt(&mut st, &[b"-u".to_vec(), b"extglob".to_vec()]).unwrap();
        let q = shopt(&mut st, &[b"-q".to_vec(), b"extglob".to_vec()]).unwrap();
        assert_eq!(q.exit_code, 1);
    }

    #[test]
    fn test_let_cmd() {
        let mut st = ShellState::new();
        let ok = let_cmd(&mut st, &[b"x = 2 + 3".to_vec()]).unwrap();
        assert_eq!(ok.exit_code, 0);
        assert_eq!(st.scopes.get_scalar("x"), Some(&b"5"[..]));
        let zero = let_cmd(&mut st, &[b"0".to_vec()]).unwrap();
        assert_eq!(zero.exit_code, 1);
    }
}

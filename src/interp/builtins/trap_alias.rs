//! `trap`, `alias`, `unalias`, `history`

use crate::bytes::{self, Bytes};
use crate::interp::builtins::BuiltinOutcome;
use crate::interp::interrupt::ExecResult;
use crate::interp::state::ShellState;

const KNOWN_SIGNALS: &[&str] = &[
    "EXIT", "ERR", "DEBUG", "RETURN", "HUP", "INT", "QUIT", "ABRT", "KILL", "ALRM", "TERM",
    "USR1", "USR2", "PIPE", "CHLD", "CONT", "STOP", "TSTP", "WINCH",
];

/// Normalize a trap event spec: numbers map to their conventional
/// names, `SIG` prefixes drop, case folds up.
fn normalize_signal(spec: &str) -> Option<String> {
    let upper = spec.to_ascii_uppercase();
    let name = match upper.as_str() {
        "0" => "EXIT",
        "1" => "HUP",
        "2" => "INT",
        "3" => "QUIT",
        "6" => "ABRT",
        "9" => "KILL",
        "13" => "PIPE",
        "14" => "ALRM",
        "15" => "TERM",
        other => other.strip_prefix("SIG").unwrap_or(other),
    };
    if KNOWN_SIGNALS.contains(&name) {
        Some(name.to_string())
    } else {
        None
    }
}

pub fn trap(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    let texts: Vec<String> = args.iter().map(|a| bytes::lossy_string(a)).collect();

    if texts.is_empty() || texts[0] == "-p" {
        let mut entries: Vec<(&String, &String)> = st.traps.iter().collect();
        entries.sort();
        let mut out = String::new();
        for (event, action) in entries {
            out.push_str(&format!("trap -- '{}' {}\n", action.replace('\'', "'\\''"), event));
        }
        return Ok(ExecResult::stdout_text(out));
    }
    if texts[0] == "-l" {
        let mut out = String::new();
        for (i, name) in KNOWN_SIGNALS.iter().enumerate() {
            out.push_str(&format!("{:2}) SIG{}\n", i + 1, name));
        }
        return Ok(ExecResult::stdout_text(out));
    }

    let mut rest = texts.as_slice();
    let mut clearing = false;
    if rest[0] == "-" {
        clearing = true;
        rest = &rest[1..];
    } else if rest[0] == "--" {
        rest = &rest[1..];
    }

    // `trap SIGNAL` alone also clears.
    let (action, signals) = if clearing {
        (None, rest)
    } else if rest.len() == 1 {
        (None, rest)
    } else {
        (Some(rest[0].clone()), &rest[1..])
    };

    for spec in signals {
        let Some(event) = normalize_signal(spec) else {
            return Ok(ExecResult::failure(format!("trap: {}: invalid signal specification", spec), 1));
        };
        match &action {
            Some(body) => {
                st.traps.insert(event, body.clone());
            }
            None => {
                st.traps.remove(&event);
            }
        }
    }
    Ok(ExecResult::ok())
}

fn quote_alias_value(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

pub fn alias(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    if args.is_empty() {
        let mut out = String::new();
        for (name, value) in &st.aliases {
            out.push_str(&format!("alias {}={}\n", name, quote_alias_value(value)));
        }
        return Ok(ExecResult::stdout_text(out));
    }
    let mut out = String::new();
    for arg in args {
        let text = bytes::lossy_string(arg);
        if text == "-p" {
            for (name, value) in &st.aliases {
                out.push_str(&format!("alias {}={}\n", name, quote_alias_value(value)));
            }
            continue;
        }
        match text.split_once('=') {
            Some((name, value)) => {
                st.aliases.insert(name.to_string(), value.to_string());
            }
            None => match st.aliases.get(&text) {
                Some(value) => {
                    out.push_str(&format!("alias {}={}\n", text, quote_alias_value(value)));
                }
                None => {
                    return Ok(ExecResult::new(
                        out.into_bytes(),
                        format!("bash: alias: {}: not found\n", text).into_bytes(),
                        1,
                    ));
                }
            },
        }
    }
    Ok(ExecResult::new(out.into_bytes(), Bytes::new(), 0))
}

pub fn unalias(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    if args.iter().any(|a| a.as_slice() == b"-a") {
        st.aliases.clear();
        return Ok(ExecResult::ok());
    }
    let mut code = 0;
    let mut err = Bytes::new();
    for arg in args {
        let name = bytes::lossy_string(arg);
        if st.aliases.shift_remove(&name).is_none() {
            err.extend_from_slice(format!("bash: unalias: {}: not found\n", name).as_bytes());
            code = 1;
        }
    }
    Ok(ExecResult::new(Bytes::new(), err, code))
}

pub fn history(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    if args.iter().any(|a| a.as_slice() == b"-c") {
        st.history.clear();
        return Ok(ExecResult::ok());
    }
    let mut out = String::new();
    for (i, line) in st.history.iter().enumerate() {
        out.push_str(&format!("{:5}  {}\n", i + 1, line));
    }
    Ok(ExecResult::stdout_text(out))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_signal() {
        assert_eq!(normalize_signal("INT").as_deref(), Some("INT"));
        assert_eq!(normalize_signal("SIGTERM").as_deref(), Some("TERM"));
        assert_eq!(normalize_signal("exit").as_deref(), Some("EXIT"));
        assert_eq!(normalize_signal("0").as_deref(), Some("EXIT"));
        assert_eq!(normalize_signal("2").as_deref(), Some("INT"));
        assert!(normalize_signal("NOPE").is_none());
    }

    #[test]
    fn test_trap_register_and_clear() {
        let mut st = ShellState::new();
        trap(&mut st, &[b"echo bye".to_vec(), b"EXIT".to_vec()]).unwrap();
        assert_eq!(st.traps.get("EXIT").map(|s| s.as_str()), Some("echo bye"));
        trap(&mut st, &[b"-".to_vec(), b"EXIT".to_vec()]).unwrap();
        assert!(!st.traps.contains_key("EXIT"));
    }

    #[test]
    fn test_trap_single_arg_clears() {
        let mut st = ShellState::new();
        st.traps.insert("INT".to_string(), "x".to_string());
        trap(&mut st, &[b"INT".to_vec()]).unwrap();
        assert!(!st.traps.contains_key("INT"));
    }

    #[test]
    fn test_trap_listing() {
        let mut st = ShellState::new();
        st.traps.insert("EXIT".to_string(), "echo done".to_string());
        let result = trap(&mut st, &[]).unwrap();
        let text = String::from_utf8_lossy(&result.stdout).into_owned();
        assert!(text.contains("trap -- 'echo done' EXIT"));
    }

    #[test]
    fn test_trap_invalid_signal() {
        let mut st = ShellState::new();
        let result = trap(&mut st, &[b"x".to_vec(), b"BOGUS".to_vec()]).unwrap();
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn test_alias_define_and_list() {
        let mut st = ShellState::new();
        alias(&mut st, &[b"ll=ls -l".to_vec()]).unwrap();
        assert_eq!(st.aliases.get("ll").map(|s| s.as_str()), Some("ls -l"));
        let result = alias(&mut st, &[b"ll".to_vec()]).unwrap();
        assert!(String::from_utf8_lossy(&result.stdout).contains("alias ll='ls -l'"));
    }

    #[test]
    fn test_alias_not_found() {
        let mut st = ShellState::new();
        let result = alias(&mut st, &[b"nope".to_vec()]).unwrap();
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn test_unalias() {
        let mut st = ShellState::new();
        st.aliases.insert("x".to_string(), "y".to_string());
        unalias(&mut st, &[b"x".to_vec()]).unwrap();
        assert!(st.aliases.is_empty());
        let result = unalias(&mut st, &[b"x".to_vec()]).unwrap();
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn test_history_list_and_clear() {
        let mut st = ShellState::new();
        st.history.push("echo one".to_string());
        st.history.push("echo two".to_string());
        let result = history(&mut st, &[]).unwrap();
        let text = String::from_utf8_lossy(&result.stdout).into_owned();
        assert!(text.contains("1  echo one"));
        assert!(text.contains("2  echo two"));
        history(&mut st, &[b"-c".to_vec()]).unwrap();
        assert!(st.history.is_empty());
    }
}

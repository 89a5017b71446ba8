//! Control-Flow Builtins
//!
//! `exit`, `return`, `break`, `continue`, `shift`, `exec`.

use crate::bytes::{self, Bytes};
use crate::interp::builtins::BuiltinOutcome;
use crate::interp::engine::{Executor, InputStream};
use crate::interp::interrupt::{ExecResult, Interrupt, InterruptKind};
use crate::interp::state::ShellState;

pub fn exit(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    if args.len() > 1 {
        return Ok(ExecResult::failure("exit: too many arguments", 1));
    }
    let code = match args.first() {
        Some(arg) => match bytes::parse_i32(arg) {
            Some(n) => n & 0xff,
            None => {
                let mut int = Interrupt::exit(2);
                int.stderr = format!(
                    "bash: exit: {}: numeric argument required\n",
                    bytes::lossy_string(arg)
                )
                .into_bytes();
                return Err(int);
            }
        },
        None => st.last_exit,
    };
    Err(Interrupt::exit(code))
}

pub fn return_cmd(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    if st.func_depth == 0 && st.source_depth == 0 {
        return Ok(ExecResult::failure(
            "return: can only `return' from a function or sourced script",
            1,
        ));
    }
    let code = match args.first() {
        Some(arg) => match bytes::parse_i32(arg) {
            Some(n) => n & 0xff,
            None => {
                let mut int = Interrupt::new(InterruptKind::Return(2));
                int.stderr = format!(
                    "bash: return: {}: numeric argument required\n",
                    bytes::lossy_string(arg)
                )
                .into_bytes();
                return Err(int);
            }
        },
        None => st.last_exit,
    };
    Err(Interrupt::new(InterruptKind::Return(code)))
}

fn loop_count(builtin: &str, args: &[Bytes]) -> Result<u32, ExecResult> {
    match args.first() {
        None => Ok(1),
        Some(arg) => match bytes::parse_i64(arg) {
            Some(n) if n >= 1 => Ok(n.min(u32::MAX as i64) as u32),
            Some(n) => Err(ExecResult::failure(
                format!("{}: {}: loop count out of range", builtin, n),
                1,
            )),
            None => Err(ExecResult::failure(
                format!("{}: {}: numeric argument required", builtin, bytes::lossy_string(arg)),
                1,
            )),
        },
    }
}

pub fn break_cmd(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    let levels = match loop_count("break", args) {
        Ok(n) => n,
        Err(failure) => return Ok(failure),
    };
    if st.loop_depth == 0 {
        if st.in_subshell {
            return Err(Interrupt::new(InterruptKind::SubshellExit));
        }
        return Ok(ExecResult::new(
            Bytes::new(),
            b"bash: break: only meaningful in a `for', `while', or `until' loop\n".to_vec(),
            0,
        ));
    }
    Err(Interrupt::new(InterruptKind::Break(levels)))
}

pub fn continue_cmd(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    let levels = match loop_count("continue", args) {
        Ok(n) => n,
        Err(failure) => return Ok(failure),
    };
    if st.loop_depth == 0 {
        if st.in_subshell {
            return Err(Interrupt::new(InterruptKind::SubshellExit));
        }
        return Ok(ExecResult::new(
            Bytes::new(),
            b"bash: continue: only meaningful in a `for', `while', or `until' loop\n".to_vec(),
            0,
        ));
    }
    Err(Interrupt::new(InterruptKind::Continue(levels)))
}

pub fn shift(st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    let n = match args.first() {
        None => 1i64,
        Some(arg) => match bytes::parse_i64(arg) {
            Some(n) => n,
            None => {
                return Ok(ExecResult::failure(
                    format!("shift: {}: numeric argument required", bytes::lossy_string(arg)),
                    1,
                ));
            }
        },
    };
    if n < 0 {
        return Ok(ExecResult::failure(format!("shift: {}: shift count out of range", n), 1));
    }
    let params = st.positional().to_vec();
    if n as usize > params.len() {
        return Ok(ExecResult::code(1));
    }
    st.set_positional(params[n as usize..].to_vec());
    Ok(ExecResult::ok())
}

/// Sandboxed `exec`: with arguments, run the resolved command and leave
/// the script with its exit code; with none, succeed. Descriptor
/// manipulation beyond the command's own redirects is host-shell
/// territory.
pub fn exec(
    ex: &Executor<'_>,
    st: &mut ShellState,
    args: &[Bytes],
    input: &InputStream,
) -> BuiltinOutcome {
    if args.is_empty() {
        return Ok(ExecResult::ok());
    }
    let result = ex.dispatch_simple(st, args, input, true)?;
    Err(Interrupt::with_output(
        InterruptKind::Exit(result.exit_code),
        result.stdout,
        result.stderr,
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_uses_last_code() {
        let mut st = ShellState::new();
        st.last_exit = 7;
        let err = exit(&mut st, &[]).unwrap_err();
        assert_eq!(err.kind, InterruptKind::Exit(7));
    }

    #[test]
    fn test_exit_with_code() {
        let mut st = ShellState::new();
        let err = exit(&mut st, &[b"42".to_vec()]).unwrap_err();
        assert_eq!(err.kind, InterruptKind::Exit(42));
    }

    #[test]
    fn test_exit_non_numeric() {
        let mut st = ShellState::new();
        let err = exit(&mut st, &[b"nope".to_vec()]).unwrap_err();
        assert_eq!(err.kind, InterruptKind::Exit(2));
        assert!(String::from_utf8_lossy(&err.stderr).contains("numeric argument required"));
    }

    #[test]
    fn test_return_outside_function() {
        let mut st = ShellState::new();
        let result = return_cmd(&mut st, &[]).unwrap();
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn test_return_inside_function() {
        let mut st = ShellState::new();
        st.func_depth = 1;
        let err = return_cmd(&mut st, &[b"3".to_vec()]).unwrap_err();
        assert_eq!(err.kind, InterruptKind::Return(3));
    }

    #[test]
    fn test_break_outside_loop_warns() {
        let mut st = ShellState::new();
        let result = break_cmd(&mut st, &[]).unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(!result.stderr.is_empty());
    }

    #[test]
    fn test_break_in_subshell_outside_loop() {
        let mut st = ShellState::new();
        st.in_subshell = true;
        let err = break_cmd(&mut st, &[]).unwrap_err();
        assert_eq!(err.kind, InterruptKind::SubshellExit);
    }

    #[test]
    fn test_break_levels() {
        let mut st = ShellState::new();
        st.loop_depth = 3;
        let err = break_cmd(&mut st, &[b"2".to_vec()]).unwrap_err();
        assert_eq!(err.kind, InterruptKind::Break(2));
    }

    #[test]
    fn test_break_zero_is_error() {
        let mut st = ShellState::new();
        st.loop_depth = 1;
        let result = break_cmd(&mut st, &[b"0".to_vec()]).unwrap();
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn test_shift() {
        let mut st = ShellState::new();
        st.set_positional(vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        shift(&mut st, &[]).unwrap();
        assert_eq!(st.positional().len(), 2);
        shift(&mut st, &[b"2".to_vec()]).unwrap();
        assert!(st.positional().is_empty());
        let too_far = shift(&mut st, &[b"1".to_vec()]).unwrap();
        assert_eq!(too_far.exit_code, 1);
    }
}

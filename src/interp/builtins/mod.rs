//! Shell Builtins
//!
//! Commands that need access to interpreter state. Dispatch happens
//! after function lookup and before the registered-command registry.
//! POSIX special builtins additionally promote their failures to fatal
//! under `set -o posix`, and keep their prefix assignments.

mod cd;
mod command_type;
mod eval_source;
mod flow;
mod getopts;
mod read;
mod trap_alias;
mod vars;

use crate::bytes::Bytes;
use crate::interp::engine::{Executor, InputStream};
use crate::interp::interrupt::{ExecResult, Flow};
use crate::interp::state::ShellState;

pub type BuiltinOutcome = Flow<ExecResult>;

const BUILTINS: &[&str] = &[
    ":", ".", "alias", "break", "cd", "command", "continue", "eval", "exec", "exit", "export",
    "false", "getopts", "history", "let", "local", "pwd", "read", "readonly", "return", "set",
    "shift", "shopt", "source", "trap", "true", "type", "unalias", "unset",
];

/// POSIX special builtins (POSIX 2.14): assignment persistence and
/// posix-mode fatality apply to these.
const SPECIAL_BUILTINS: &[&str] = &[
    ":", ".", "break", "continue", "eval", "exec", "exit", "export", "readonly", "return", "set",
    "shift", "source", "trap", "unset",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

pub fn is_special_builtin(name: &str) -> bool {
    SPECIAL_BUILTINS.contains(&name)
}

/// Run a builtin; None if the name is not one. `args` excludes the
/// command name itself.
pub fn run_builtin(
    name: &str,
    ex: &Executor<'_>,
    st: &mut ShellState,
    args: &[Bytes],
    input: &InputStream,
) -> Option<BuiltinOutcome> {
    let outcome = match name {
        ":" | "true" => Ok(ExecResult::ok()),
        "false" => Ok(ExecResult::code(1)),
        "cd" => cd::cd(ex, st, args),
        "pwd" => cd::pwd(st, args),
        "export" => vars::export(ex, st, args),
        "readonly" => vars::readonly(ex, st, args),
        "local" => vars::local(st, args),
        "unset" => vars::unset(st, args),
        "set" => vars::set(st, args),
        "shopt" => vars::shopt(st, args),
        "let" => vars::let_cmd(st, args),
        "exit" => flow::exit(st, args),
        "return" => flow::return_cmd(st, args),
        "break" => flow::break_cmd(st, args),
        "continue" => flow::continue_cmd(st, args),
        "shift" => flow::shift(st, args),
        "exec" => flow::exec(ex, st, args, input),
        "eval" => eval_source::eval(ex, st, args, input),
        "source" | "." => eval_source::source(ex, st, args, input),
        "read" => read::read(st, args, input),
        "getopts" => getopts::getopts(st, args),
        "trap" => trap_alias::trap(st, args),
        "alias" => trap_alias::alias(st, args),
        "unalias" => trap_alias::unalias(st, args),
        "history" => trap_alias::history(st, args),
        "command" => command_type::command(ex, st, args, input),
        "type" => command_type::type_cmd(ex, st, args),
        _ => return None,
    };
    Some(outcome)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_builtin() {
        assert!(is_builtin("cd"));
        assert!(is_builtin(":"));
        assert!(is_builtin("getopts"));
        assert!(!is_builtin("ls"));
        assert!(!is_builtin("echo"));
    }

    #[test]
    fn test_special_builtins() {
        assert!(is_special_builtin("set"));
        assert!(is_special_builtin("exit"));
        assert!(!is_special_builtin("cd"));
        assert!(!is_special_builtin("read"));
    }
}

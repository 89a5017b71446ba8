//! `cd` and `pwd`

use crate::bytes::{self, Bytes};
use crate::interp::builtins::BuiltinOutcome;
use crate::interp::engine::Executor;
use crate::interp::interrupt::ExecResult;
use crate::interp::state::ShellState;

pub fn cd(ex: &Executor<'_>, st: &mut ShellState, args: &[Bytes]) -> BuiltinOutcome {
    let mut target: Option<String> = None;
    let mut print_target = false;
    for arg in args {
        let text = bytes::lossy_string(arg);
        match text.as_str() {
            "-L" | "-P" | "--" => continue,
            "-" => {
                target = Some(st.prev_dir.clone());
                print_target = true;
            }
            _ => {
                target = Some(text);
                break;
            }
        }
    }

    let target = match target {
        Some(t) => t,
        None => match st.scopes.get_string("HOME") {
            Some(home) => home,
            None => return Ok(ExecResult::failure("cd: HOME not set", 1)),
        },
    };

    let resolved = ex.fs.resolve_path(&st.cwd, &target);
    match ex.fs.stat(&resolved) {
        Ok(stat) if stat.is_directory => {}
        Ok(_) => {
            return Ok(ExecResult::failure(format!("cd: {}: Not a directory", target), 1));
        }
        Err(_) => {
            return Ok(ExecResult::failure(
                format!("cd: {}: No such file or directory", target),
                1,
            ));
        }
    }

    st.prev_dir = st.cwd.clone();
    st.cwd = resolved.clone();
    let _ = st.scopes.set_scalar("OLDPWD", st.prev_dir.clone().into_bytes());
    let _ = st.scopes.set_scalar("PWD", resolved.clone().into_bytes());
    st.scopes.set_exported("OLDPWD", true);
    st.scopes.set_exported("PWD", true);

    if print_target {
        Ok(ExecResult::stdout_text(format!("{}\n", resolved)))
    } else {
        Ok(ExecResult::ok())
    }
}

pub fn pwd(st: &ShellState, args: &[Bytes]) -> BuiltinOutcome {
    for arg in args {
        let text = bytes::lossy_string(arg);
        if text != "-L" && text != "-P" && text != "--" {
            return Ok(ExecResult::failure(format!("pwd: {}: invalid option", text), 2));
        }
    }
    Ok(ExecResult::stdout_text(format!("{}\n", st.cwd)))
}

//! `eval` and `source` / `.`

use crate::bytes::{self, Bytes};
use crate::interp::builtins::BuiltinOutcome;
use crate::interp::engine::{Executor, InputStream};
use crate::interp::interrupt::{ExecResult, InterruptKind};
use crate::interp::state::ShellState;
use crate::parser::parse_with_aliases;

pub fn eval(
    ex: &Executor<'_>,
    st: &mut ShellState,
    args: &[Bytes],
    input: &InputStream,
) -> BuiltinOutcome {
    if args.is_empty() {
        return Ok(ExecResult::ok());
    }
    let source = bytes::lossy_string(&bytes::join(args, b" "));
    let aliases = if st.options.expand_aliases {
        st.aliases.clone()
    } else {
        Default::default()
    };
    let statements = match parse_with_aliases(&source, &aliases) {
        Ok(statements) => statements,
        Err(e) => {
            return Ok(ExecResult::failure(format!("eval: {}", e), 2));
        }
    };
    ex.counters.borrow_mut().push_depth(ex.limits)?;
    let result = ex.run_sequence(st, &statements, input);
    ex.counters.borrow_mut().pop_depth();
    result
}

pub fn source(
    ex: &Executor<'_>,
    st: &mut ShellState,
    args: &[Bytes],
    input: &InputStream,
) -> BuiltinOutcome {
    let Some(path_arg) = args.first() else {
        return Ok(ExecResult::failure("source: filename argument required", 2));
    };
    let target = bytes::lossy_string(path_arg);
    let path = ex.fs.resolve_path(&st.cwd, &target);
    let text = match ex.fs.read_file(&path) {
        Ok(text) => text,
        Err(e) => {
            return Ok(ExecResult::failure(
                format!("source: {}: {}", target, e.shell_message()),
                1,
            ));
        }
    };

    let aliases = if st.options.expand_aliases {
        st.aliases.clone()
    } else {
        Default::default()
    };
    let statements = match parse_with_aliases(&text, &aliases) {
        Ok(statements) => statements,
        Err(e) => {
            return Ok(ExecResult::failure(format!("source: {}: {}", target, e), 2));
        }
    };

    ex.counters.borrow_mut().push_depth(ex.limits)?;
    let pushed_args = args.len() > 1;
    if pushed_args {
        st.push_positional(args[1..].to_vec());
    }
    st.source_depth += 1;

    let outcome = ex.run_sequence(st, &statements, input);

    st.source_depth -= 1;
    if pushed_args {
        st.pop_positional();
    }
    ex.counters.borrow_mut().pop_depth();

    match outcome {
        Ok(result) => Ok(result),
        // `return` inside a sourced script ends the script normally.
        Err(int) => match int.kind {
            InterruptKind::Return(code) => Ok(ExecResult::new(int.stdout, int.stderr, code)),
            _ => Err(int),
        },
    }
}

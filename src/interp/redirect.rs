//! Redirection Planning
//!
//! Targets are expanded (without splitting) and resolved before the
//! command runs; the command then executes against plain byte buffers
//! and the plan routes them afterwards: stdout/stderr to files, dup'd
//! descriptors merged, here-documents materialized as stdin. noclobber
//! blocks `>` onto an existing file unless `>|` was used.

use crate::bytes::{self, Bytes};
use crate::fs::FsError;
use crate::interp::engine::Executor;
use crate::interp::expand::{expand_heredoc, expand_word_single, ExpandSide};
use crate::interp::interrupt::{ExecResult, Flow};
use crate::interp::state::ShellState;
use crate::parser::ast::{Redirect, RedirectOp, RedirectTarget};

/// Where a command's output stream ends up.
#[derive(Debug, Clone, PartialEq)]
pub enum Sink {
    /// The surrounding stdout buffer.
    Out,
    /// The surrounding stderr buffer.
    Err,
    File { path: String, append: bool },
    Null,
}

#[derive(Debug, Clone)]
pub struct RedirPlan {
    /// Replacement stdin, if any redirect provided one.
    pub stdin: Option<Bytes>,
    pub out: Sink,
    pub err: Sink,
}

impl Default for RedirPlan {
    fn default() -> Self {
        Self { stdin: None, out: Sink::Out, err: Sink::Err }
    }
}

/// Either a ready plan, or the failure result of a redirect that could
/// not be opened (the command does not run).
pub enum PlanOutcome {
    Ready(RedirPlan),
    Failed(ExecResult),
}

pub fn plan_redirects(
    ex: &Executor<'_>,
    st: &mut ShellState,
    redirects: &[Redirect],
    side: &mut ExpandSide,
) -> Flow<PlanOutcome> {
    let mut plan = RedirPlan::default();
    for redirect in redirects {
        match apply(ex, st, redirect, &mut plan, side)? {
            Some(failure) => return Ok(PlanOutcome::Failed(failure)),
            None => {}
        }
    }
    Ok(PlanOutcome::Ready(plan))
}

fn apply(
    ex: &Executor<'_>,
    st: &mut ShellState,
    redirect: &Redirect,
    plan: &mut RedirPlan,
    side: &mut ExpandSide,
) -> Flow<Option<ExecResult>> {
    let target_word = |ex: &Executor<'_>, st: &mut ShellState, side: &mut ExpandSide| -> Flow<String> {
        match &redirect.target {
            RedirectTarget::Word(word) => {
                Ok(bytes::lossy_string(&expand_word_single(ex, st, word, side)?))
            }
            RedirectTarget::HereDoc(_) => Ok(String::new()),
        }
    };

    match redirect.op {
        RedirectOp::Read | RedirectOp::ReadWrite => {
            let target = target_word(ex, st, side)?;
            let path = ex.fs.resolve_path(&st.cwd, &target);
            if path == "/dev/null" {
                plan.stdin = Some(Bytes::new());
                return Ok(None);
            }
            match ex.fs.read_file_buffer(&path) {
                Ok(data) => plan.stdin = Some(data),
                Err(FsError::NotFound { .. }) if redirect.op == RedirectOp::ReadWrite => {
                    // `<>` creates the file when missing.
                    if let Err(e) = ex.fs.write_file(&path, b"") {
                        return Ok(Some(ExecResult::failure(
                            format!("{}: {}", target, e.shell_message()),
                            1,
                        )));
                    }
                    plan.stdin = Some(Bytes::new());
                }
                Err(e) => {
                    return Ok(Some(ExecResult::failure(
                        format!("{}: {}", target, e.shell_message()),
                        1,
                    )));
                }
            }
        }
        RedirectOp::HereDoc => {
            if let RedirectTarget::HereDoc(doc) = &redirect.target {
                plan.stdin = Some(expand_heredoc(ex, st, doc, side)?);
            }
        }
        RedirectOp::HereString => {
            if let RedirectTarget::Word(word) = &redirect.target {
                let mut data = expand_word_single(ex, st, word, side)?;
                data.push(b'\n');
                plan.stdin = Some(data);
            }
        }
        RedirectOp::Write { clobber } => {
            let target = target_word(ex, st, side)?;
            let path = ex.fs.resolve_path(&st.cwd, &target);
            if st.flags.noclobber && !clobber && path != "/dev/null" && ex.fs.is_file(&path) {
                return Ok(Some(ExecResult::failure(
                    format!("{}: cannot overwrite existing file", target),
                    1,
                )));
            }
            set_sink(plan, redirect.fd.unwrap_or(1), file_sink(&path, false));
        }
        RedirectOp::Append => {
            let target = target_word(ex, st, side)?;
            let path = ex.fs.resolve_path(&st.cwd, &target);
            set_sink(plan, redirect.fd.unwrap_or(1), file_sink(&path, true));
        }
        RedirectOp::WriteBoth | RedirectOp::AppendBoth => {
            let target = target_word(ex, st, side)?;
            let path = ex.fs.resolve_path(&st.cwd, &target);
            let append = redirect.op == RedirectOp::AppendBoth;
            plan.out = file_sink(&path, append);
            plan.err = file_sink(&path, append);
        }
        RedirectOp::DupOut => {
            let target = target_word(ex, st, side)?;
            let fd = redirect.fd.unwrap_or(1);
            match target.as_str() {
                "1" => {
                    let sink = plan.out.clone();
                    set_sink(plan, fd, sink);
                }
                "2" => {
                    let sink = plan.err.clone();
                    set_sink(plan, fd, sink);
                }
                "-" => set_sink(plan, fd, Sink::Null),
                other => {
                    if other.parse::<i32>().is_ok() {
                        // Duplicating an untracked descriptor: drop it.
                        set_sink(plan, fd, Sink::Null);
                    } else {
                        // `>&file` is the historical both-streams form.
                        let path = ex.fs.resolve_path(&st.cwd, other);
                        plan.out = file_sink(&path, false);
                        plan.err = file_sink(&path, false);
                    }
                }
            }
        }
        RedirectOp::DupIn => {
            let target = target_word(ex, st, side)?;
            if target == "-" {
                plan.stdin = Some(Bytes::new());
            }
            // Numeric dups of input descriptors are untracked; stdin
            // stays as-is.
        }
    }
    Ok(None)
}

fn file_sink(path: &str, append: bool) -> Sink {
    if path == "/dev/null" {
        Sink::Null
    } else {
        Sink::File { path: path.to_string(), append }
    }
}

fn set_sink(plan: &mut RedirPlan, fd: i32, sink: Sink) {
    match fd {
        1 => plan.out = sink,
        2 => plan.err = sink,
        // Other descriptors are accepted syntactically but untracked.
        _ => {}
    }
}

/// Route a finished command's output through the plan. File sinks are
/// written even when empty, so `> file` truncates.
pub fn finish(ex: &Executor<'_>, plan: &RedirPlan, result: ExecResult) -> ExecResult {
    let mut routed = ExecResult::code(result.exit_code);
    let mut failures: Vec<String> = Vec::new();
    let mut writes: Vec<(String, bool, Bytes)> = Vec::new();

    match &plan.out {
        Sink::Out => routed.stdout.extend_from_slice(&result.stdout),
        Sink::Err => routed.stderr.extend_from_slice(&result.stdout),
        Sink::Null => {}
        Sink::File { path, append } => writes.push((path.clone(), *append, result.stdout)),
    }
    match &plan.err {
        Sink::Err => routed.stderr.extend_from_slice(&result.stderr),
        Sink::Out => routed.stdout.extend_from_slice(&result.stderr),
        Sink::Null => {}
        Sink::File { path, append } => {
            // When both streams target one file, stderr lands after the
            // stdout bytes already written there.
            let same_as_out =
                matches!(&plan.out, Sink::File { path: out_path, .. } if out_path == path);
            writes.push((path.clone(), *append || same_as_out, result.stderr));
        }
    }

    for (path, append, data) in writes {
        let write_result = if append {
            ex.fs.append_file(&path, &data)
        } else {
            ex.fs.write_file(&path, &data)
        };
        if let Err(e) = write_result {
            failures.push(format!("bash: {}: {}\n", path, e.shell_message()));
        }
    }
    for failure in failures {
        routed.stderr.extend_from_slice(failure.as_bytes());
        routed.exit_code = 1;
    }
    routed
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_routes_through() {
        let plan = RedirPlan::default();
        assert_eq!(plan.out, Sink::Out);
        assert_eq!(plan.err, Sink::Err);
        assert!(plan.stdin.is_none());
    }

    #[test]
    fn test_set_sink_fd_mapping() {
        let mut plan = RedirPlan::default();
        set_sink(&mut plan, 2, Sink::Out);
        assert_eq!(plan.err, Sink::Out);
        set_sink(&mut plan, 1, Sink::Null);
        assert_eq!(plan.out, Sink::Null);
    }

    #[test]
    fn test_file_sink_dev_null() {
        assert_eq!(file_sink("/dev/null", false), Sink::Null);
        assert!(matches!(file_sink("/tmp/x", true), Sink::File { append: true, .. }));
    }
}

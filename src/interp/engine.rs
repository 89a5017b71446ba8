//! Execution Engine
//!
//! The statement executor: lists with short-circuiting, sequential
//! pipeline byte-wiring, compound commands, function calls, subshell
//! snapshots, redirection application, the dispatch chain
//! (functions → builtins → registered commands → 127), errexit policy,
//! trap firing, cooperative cancellation, and metering.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bytes::{self, Bytes};
use crate::commands::{CommandContext, CommandRegistry};
use crate::fs::SyncFs;
use crate::interp::arith::eval_arith;
use crate::interp::builtins;
use crate::interp::expand::{
    expand_word_fields, expand_word_pattern, expand_word_single, expand_words, ExpandSide,
};
use crate::interp::glob::match_pattern;
use crate::interp::interrupt::{ExecResult, Flow, Interrupt, InterruptKind};
use crate::interp::limits::{Counters, ExecutionLimits};
use crate::interp::redirect::{self, plan_redirects, PlanOutcome, RedirPlan};
use crate::interp::scope::VarValue;
use crate::interp::state::{FunctionDef, ShellState};
use crate::parser::ast::{
    Assignment, CaseTerminator, List, ListOp, Pipeline, Redirect, SimpleCommand, Statement, Word,
};
use crate::parser::{parse_with_aliases, ParseError};

/// A consumable byte stream standing in for a command's stdin. Shared
/// by reference so `read` in a loop body advances the same cursor.
pub struct InputStream {
    data: Bytes,
    pos: Cell<usize>,
}

impl InputStream {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: Cell::new(0) }
    }

    pub fn empty() -> Self {
        Self::new(Bytes::new())
    }

    /// Read up to (and consuming) `delim`. Returns the chunk and whether
    /// the delimiter was found; None at EOF.
    pub fn read_until(&self, delim: u8) -> Option<(Bytes, bool)> {
        let pos = self.pos.get();
        if pos >= self.data.len() {
            return None;
        }
        match self.data[pos..].iter().position(|&b| b == delim) {
            Some(offset) => {
                self.pos.set(pos + offset + 1);
                Some((self.data[pos..pos + offset].to_vec(), true))
            }
            None => {
                self.pos.set(self.data.len());
                Some((self.data[pos..].to_vec(), false))
            }
        }
    }

    /// Consume everything that remains.
    pub fn read_all(&self) -> Bytes {
        let pos = self.pos.get();
        self.pos.set(self.data.len());
        self.data[pos..].to_vec()
    }
}

pub struct Executor<'a> {
    pub fs: SyncFs,
    pub limits: &'a ExecutionLimits,
    pub counters: RefCell<Counters>,
    pub registry: &'a RefCell<CommandRegistry>,
    pub cancel: Option<Arc<AtomicBool>>,
    pub cancel_code: i32,
}

impl<'a> Executor<'a> {
    pub fn new(
        fs: SyncFs,
        limits: &'a ExecutionLimits,
        registry: &'a RefCell<CommandRegistry>,
    ) -> Self {
        Self {
            fs,
            limits,
            counters: RefCell::new(Counters::new()),
            registry,
            cancel: None,
            cancel_code: 130,
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.borrow().contains(name)
    }

    fn check_cancel(&self) -> Flow<()> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(Interrupt::new(InterruptKind::Cancelled(self.cancel_code)));
            }
        }
        Ok(())
    }

    // ==================================================================
    // Scripts and sequences
    // ==================================================================

    /// Execute a parsed script against fresh (empty) stdin.
    pub fn run_script(&self, st: &mut ShellState, statements: &[Statement]) -> Flow<ExecResult> {
        let input = InputStream::empty();
        self.run_sequence(st, statements, &input)
    }

    /// Execute statements in order, accumulating output, updating `$?`,
    /// firing the ERR trap, and applying the errexit policy.
    pub fn run_sequence(
        &self,
        st: &mut ShellState,
        statements: &[Statement],
        input: &InputStream,
    ) -> Flow<ExecResult> {
        let mut acc = ExecResult::ok();
        for statement in statements {
            if let Err(int) = self.check_cancel() {
                return Err(int.prepend(&acc.stdout, &acc.stderr));
            }
            match self.run_statement(st, statement, input) {
                Ok(result) => {
                    let code = result.exit_code;
                    acc.absorb(result);
                    st.last_exit = code;
                    if code != 0 && !st.in_condition && !st.errexit_safe {
                        match self.fire_trap(st, "ERR", input) {
                            Ok((out, err)) => {
                                acc.stdout.extend_from_slice(&out);
                                acc.stderr.extend_from_slice(&err);
                            }
                            Err(int) => return Err(int.prepend(&acc.stdout, &acc.stderr)),
                        }
                        if st.flags.errexit {
                            return Err(Interrupt::errexit(code, acc.stdout, acc.stderr));
                        }
                    }
                }
                Err(int) => return Err(int.prepend(&acc.stdout, &acc.stderr)),
            }
        }
        Ok(acc)
    }

    /// Parse and run a source line in the current state, folding any
    /// interrupt into a plain result. The re-entry path for commands
    /// like xargs.
    pub fn run_line(&self, st: &mut ShellState, line: &str) -> ExecResult {
        let aliases = if st.options.expand_aliases {
            st.aliases.clone()
        } else {
            Default::default()
        };
        match parse_with_aliases(line, &aliases) {
            Ok(statements) => match self.run_script(st, &statements) {
                Ok(result) => result,
                Err(int) => int.into_result(),
            },
            Err(e) => syntax_failure(&e),
        }
    }

    // ==================================================================
    // Statements
    // ==================================================================

    pub fn run_statement(
        &self,
        st: &mut ShellState,
        statement: &Statement,
        input: &InputStream,
    ) -> Flow<ExecResult> {
        match statement {
            Statement::Simple(cmd) => {
                st.errexit_safe = false;
                self.run_simple(st, cmd, input)
            }
            Statement::Pipeline(pipeline) => {
                st.errexit_safe = false;
                self.run_pipeline(st, pipeline, input)
            }
            Statement::List(list) => self.run_list(st, list, input),
            Statement::Subshell { body, redirects } => {
                st.errexit_safe = false;
                self.with_redirects(st, redirects, input, |ex, st, input| {
                    ex.run_subshell(st, body, input)
                })
            }
            Statement::Group { body, redirects } => {
                self.with_redirects(st, redirects, input, |ex, st, input| {
                    ex.run_sequence(st, body, input)
                })
            }
            Statement::If { clauses, else_body, redirects } => {
                self.with_redirects(st, redirects, input, |ex, st, input| {
                    ex.run_if(st, clauses, else_body.as_deref(), input)
                })
            }
            Statement::While { cond, body, until, redirects } => {
                self.with_redirects(st, redirects, input, |ex, st, input| {
                    ex.run_while(st, cond, body, *until, input)
                })
            }
            Statement::For { var, words, body, redirects, line } => {
                st.current_line = *line;
                self.with_redirects(st, redirects, input, |ex, st, input| {
                    ex.run_for(st, var, words.as_deref(), body, input)
                })
            }
            Statement::ForArith { init, cond, step, body, redirects } => {
                self.with_redirects(st, redirects, input, |ex, st, input| {
                    ex.run_for_arith(
                        st,
                        init.as_deref(),
                        cond.as_deref(),
                        step.as_deref(),
                        body,
                        input,
                    )
                })
            }
            Statement::Case { word, arms, redirects } => {
                self.with_redirects(st, redirects, input, |ex, st, input| {
                    ex.run_case(st, word, arms, input)
                })
            }
            Statement::Select { var, words, body, redirects, line } => {
                st.current_line = *line;
                self.with_redirects(st, redirects, input, |ex, st, input| {
                    ex.run_select(st, var, words.as_deref(), body, input)
                })
            }
            Statement::Conditional { expr, redirects, line } => {
                st.current_line = *line;
                st.errexit_safe = false;
                self.with_redirects(st, redirects, input, |ex, st, _input| {
                    ex.run_conditional(st, expr)
                })
            }
            Statement::Function { name, body } => {
                st.functions.insert(
                    name.clone(),
                    FunctionDef { body: Arc::new((**body).clone()) },
                );
                Ok(ExecResult::ok())
            }
            Statement::Arithmetic { expr, redirects, line } => {
                st.current_line = *line;
                st.errexit_safe = false;
                self.with_redirects(st, redirects, input, |ex, st, _input| {
                    ex.run_arith_command(st, expr)
                })
            }
        }
    }

    fn run_arith_command(&self, st: &mut ShellState, expr: &str) -> Flow<ExecResult> {
        self.counters.borrow_mut().tick_command(self.limits)?;
        match eval_arith(st, expr) {
            Ok(value) => Ok(ExecResult::code(if value != 0 { 0 } else { 1 })),
            Err(int) => match &int.kind {
                InterruptKind::Arithmetic { fatal: false, .. } => Ok(int.into_result()),
                _ => Err(int),
            },
        }
    }

    fn run_conditional(
        &self,
        st: &mut ShellState,
        expr: &crate::parser::ast::CondExpr,
    ) -> Flow<ExecResult> {
        self.counters.borrow_mut().tick_command(self.limits)?;
        let mut side = ExpandSide::default();
        match crate::interp::cond::eval_cond(self, st, expr, &mut side) {
            Ok(code) => Ok(ExecResult::new(Bytes::new(), side.stderr, code)),
            Err(int) => expansion_outcome(int, side),
        }
    }

    // ==================================================================
    // Lists
    // ==================================================================

    fn run_list(&self, st: &mut ShellState, list: &List, input: &InputStream) -> Flow<ExecResult> {
        match list.op {
            ListOp::Seq => {
                let left = self.run_statement(st, &list.left, input)?;
                let mut acc = left;
                st.last_exit = acc.exit_code;
                if acc.exit_code != 0 && !st.in_condition && !st.errexit_safe {
                    match self.fire_trap(st, "ERR", input) {
                        Ok((out, err)) => {
                            acc.stdout.extend_from_slice(&out);
                            acc.stderr.extend_from_slice(&err);
                        }
                        Err(int) => return Err(int.prepend(&acc.stdout, &acc.stderr)),
                    }
                    if st.flags.errexit {
                        return Err(Interrupt::errexit(acc.exit_code, acc.stdout, acc.stderr));
                    }
                }
                if let Some(right) = &list.right {
                    match self.run_statement(st, right, input) {
                        Ok(result) => {
                            let code = result.exit_code;
                            acc.absorb(result);
                            st.last_exit = code;
                        }
                        Err(int) => return Err(int.prepend(&acc.stdout, &acc.stderr)),
                    }
                }
                Ok(acc)
            }
            ListOp::Background => {
                // `&` is emulated synchronously: the job runs to
                // completion; its pid token lands in `$!` and the
                // launch itself reports success.
                let left = self.run_statement(st, &list.left, input)?;
                st.last_bg_pid = st.fresh_pid();
                let mut acc = ExecResult::new(left.stdout, left.stderr, 0);
                st.last_exit = 0;
                if let Some(right) = &list.right {
                    match self.run_statement(st, right, input) {
                        Ok(result) => {
                            let code = result.exit_code;
                            acc.absorb(result);
                            st.last_exit = code;
                        }
                        Err(int) => return Err(int.prepend(&acc.stdout, &acc.stderr)),
                    }
                }
                Ok(acc)
            }
            ListOp::And | ListOp::Or => {
                // Non-final members of an and-or chain never trip
                // errexit; run the left as a condition.
                let saved = st.in_condition;
                st.in_condition = true;
                let left_outcome = self.run_statement(st, &list.left, input);
                st.in_condition = saved;
                let mut acc = left_outcome?;
                st.last_exit = acc.exit_code;
                let proceed = (list.op == ListOp::And) == (acc.exit_code == 0);
                if proceed {
                    if let Some(right) = &list.right {
                        st.errexit_safe = false;
                        match self.run_statement(st, right, input) {
                            Ok(result) => {
                                let code = result.exit_code;
                                acc.absorb(result);
                                st.last_exit = code;
                            }
                            Err(int) => return Err(int.prepend(&acc.stdout, &acc.stderr)),
                        }
                    }
                } else {
                    st.errexit_safe = true;
                }
                Ok(acc)
            }
        }
    }

    // ==================================================================
    // Pipelines
    // ==================================================================

    fn run_pipeline(
        &self,
        st: &mut ShellState,
        pipeline: &Pipeline,
        input: &InputStream,
    ) -> Flow<ExecResult> {
        let stages = &pipeline.stages;
        let mut result = if stages.len() == 1 {
            let result = self.run_statement(st, &stages[0], input)?;
            st.set_pipestatus(vec![result.exit_code]);
            result
        } else {
            let mut codes: Vec<i32> = Vec::new();
            let mut total_stderr = Bytes::new();
            let mut final_stdout = Bytes::new();
            let mut piped: Option<Bytes> = None;

            for (i, stage) in stages.iter().enumerate() {
                let last = i == stages.len() - 1;
                let owned;
                let stage_input: &InputStream = match piped.take() {
                    Some(data) => {
                        owned = InputStream::new(data);
                        &owned
                    }
                    None if i == 0 => input,
                    None => {
                        owned = InputStream::empty();
                        &owned
                    }
                };
                let stage_result = match self.run_statement(st, stage, stage_input) {
                    Ok(result) => result,
                    // A stage unwinding via errexit just makes that
                    // stage fail; the pipeline carries on.
                    Err(int) => match int.kind {
                        InterruptKind::Errexit(_) => int.into_result(),
                        _ => return Err(int.prepend(b"", &total_stderr)),
                    },
                };
                codes.push(stage_result.exit_code);
                st.last_exit = stage_result.exit_code;
                if last {
                    final_stdout = stage_result.stdout;
                    total_stderr.extend_from_slice(&stage_result.stderr);
                } else if pipeline.stderr_pipes.get(i).copied().unwrap_or(false) {
                    let mut next = stage_result.stderr;
                    next.extend_from_slice(&stage_result.stdout);
                    piped = Some(next);
                } else {
                    total_stderr.extend_from_slice(&stage_result.stderr);
                    piped = Some(stage_result.stdout);
                }
            }

            let code = if st.flags.pipefail {
                codes.iter().rev().find(|&&c| c != 0).copied().unwrap_or(0)
            } else {
                codes.last().copied().unwrap_or(0)
            };
            st.set_pipestatus(codes);
            ExecResult::new(final_stdout, total_stderr, code)
        };

        if pipeline.negated {
            result.exit_code = if result.exit_code == 0 { 1 } else { 0 };
            st.errexit_safe = true;
        }
        if pipeline.timed {
            // No wall clocks in the sandbox; the report shape matches
            // bash, the figures are deterministic zeros.
            let report = if pipeline.time_posix {
                "real 0.00\nuser 0.00\nsys 0.00\n"
            } else {
                "\nreal\t0m0.000s\nuser\t0m0.000s\nsys\t0m0.000s\n"
            };
            result.stderr.extend_from_slice(report.as_bytes());
        }
        Ok(result)
    }

    // ==================================================================
    // Simple commands
    // ==================================================================

    fn run_simple(
        &self,
        st: &mut ShellState,
        cmd: &SimpleCommand,
        input: &InputStream,
    ) -> Flow<ExecResult> {
        self.counters.borrow_mut().tick_command(self.limits)?;
        st.current_line = cmd.line;
        let mut side = ExpandSide::default();

        let argv = match expand_words(self, st, &cmd.words, &mut side) {
            Ok(argv) => argv,
            Err(int) => return expansion_outcome(int, side),
        };

        // Assignment-only command.
        if argv.is_empty() {
            match self.apply_assignments(st, &cmd.assignments, true, &mut side) {
                Ok(Ok(())) => {}
                Ok(Err(message)) => {
                    let mut failure = ExecResult::failure(&message, 1);
                    let mut err = std::mem::take(&mut side.stderr);
                    err.extend_from_slice(&failure.stderr);
                    failure.stderr = err;
                    return Ok(failure);
                }
                Err(int) => return expansion_outcome(int, side),
            }
            let code = side.last_status.unwrap_or(0);
            let base = ExecResult::new(Bytes::new(), std::mem::take(&mut side.stderr), code);
            // Redirects without a command still open their targets.
            return match plan_redirects(self, st, &cmd.redirects, &mut side)? {
                PlanOutcome::Ready(plan) => Ok(redirect::finish(self, &plan, base)),
                PlanOutcome::Failed(failure) => Ok(failure),
            };
        }

        let name = bytes::lossy_string(&argv[0]);

        // DEBUG trap, then xtrace, both ahead of the command itself.
        let mut pre = ExecResult::ok();
        match self.fire_trap(st, "DEBUG", input) {
            Ok((out, err)) => {
                pre.stdout.extend_from_slice(&out);
                pre.stderr.extend_from_slice(&err);
            }
            Err(int) => return Err(int),
        }
        if st.flags.xtrace {
            let ps4 = st.scopes.get_scalar("PS4").map(|b| b.to_vec()).unwrap_or_else(|| b"+ ".to_vec());
            pre.stderr.extend_from_slice(&ps4);
            pre.stderr.extend_from_slice(&bytes::join(&argv, b" "));
            pre.stderr.push(b'\n');
        }

        // Prefix assignments: ephemeral unless the target is a POSIX
        // special builtin.
        let persistent = builtins::is_special_builtin(&name);
        let ephemeral = !cmd.assignments.is_empty() && !persistent;
        if ephemeral {
            st.scopes.push_frame();
        }
        match self.apply_assignments(st, &cmd.assignments, !ephemeral, &mut side) {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                if ephemeral {
                    st.scopes.pop_frame();
                }
                let mut failure = ExecResult::failure(&message, 1);
                failure.stdout = pre.stdout;
                let mut err = pre.stderr;
                err.extend_from_slice(&side.stderr);
                err.extend_from_slice(&failure.stderr);
                failure.stderr = err;
                return Ok(failure);
            }
            Err(int) => {
                if ephemeral {
                    st.scopes.pop_frame();
                }
                return expansion_outcome(int, side);
            }
        }

        // Redirections, after assignments.
        let plan = match plan_redirects(self, st, &cmd.redirects, &mut side) {
            Ok(PlanOutcome::Ready(plan)) => plan,
            Ok(PlanOutcome::Failed(failure)) => {
                if ephemeral {
                    st.scopes.pop_frame();
                }
                let mut combined = pre;
                combined.stderr.extend_from_slice(&side.stderr);
                combined.absorb(failure);
                return Ok(combined);
            }
            Err(int) => {
                if ephemeral {
                    st.scopes.pop_frame();
                }
                return Err(int);
            }
        };

        let owned_input;
        let eff_input: &InputStream = match plan.stdin.clone() {
            Some(data) => {
                owned_input = InputStream::new(data);
                &owned_input
            }
            None => input,
        };

        let dispatched = self.dispatch_simple(st, &argv, eff_input, false);
        if ephemeral {
            st.scopes.pop_frame();
        }
        let raw = match dispatched {
            Ok(result) => result,
            Err(int) => {
                return Err(route_interrupt(self, &plan, int, &pre, &side));
            }
        };

        // POSIX mode: special-builtin failures end the script.
        if raw.exit_code != 0
            && st.flags.posix
            && builtins::is_special_builtin(&name)
            && builtins::is_builtin(&name)
        {
            let int = Interrupt::with_output(
                InterruptKind::PosixFatal(raw.exit_code),
                raw.stdout,
                raw.stderr,
            );
            return Err(route_interrupt(self, &plan, int, &pre, &side));
        }

        let routed = redirect::finish(self, &plan, raw);
        let mut result = pre;
        result.stderr.extend_from_slice(&side.stderr);
        result.absorb(routed);
        if let Some(last) = argv.last() {
            st.last_arg = last.clone();
        }
        Ok(result)
    }

    /// The dispatch chain. `argv[0]` names the command; when
    /// `bypass_functions` is set (the `command` and `exec` builtins),
    /// function lookup is skipped.
    pub fn dispatch_simple(
        &self,
        st: &mut ShellState,
        argv: &[Bytes],
        input: &InputStream,
        bypass_functions: bool,
    ) -> Flow<ExecResult> {
        let name = match argv.first() {
            Some(first) => bytes::lossy_string(first),
            None => return Ok(ExecResult::ok()),
        };

        if !bypass_functions && st.functions.contains_key(&name) {
            return self.call_function(st, &name, argv, input);
        }
        if let Some(outcome) = builtins::run_builtin(&name, self, st, &argv[1..], input) {
            return outcome;
        }
        let command = self.registry.borrow_mut().resolve(&name);
        if let Some(command) = command {
            let stdin = input.read_all();
            let mut ctx = CommandContext { exec: self, state: st, stdin: &stdin };
            return Ok(command.execute(argv, &mut ctx));
        }
        Ok(ExecResult::failure(format!("{}: command not found", name), 127))
    }

    // ==================================================================
    // Functions
    // ==================================================================

    fn call_function(
        &self,
        st: &mut ShellState,
        name: &str,
        argv: &[Bytes],
        input: &InputStream,
    ) -> Flow<ExecResult> {
        self.counters.borrow_mut().push_depth(self.limits)?;
        let def = match st.functions.get(name) {
            Some(def) => def.clone(),
            None => {
                self.counters.borrow_mut().pop_depth();
                return Err(Interrupt::internal(format!("function vanished: {}", name)));
            }
        };

        st.func_depth += 1;
        st.func_stack.push(name.to_string());
        st.scopes.push_frame();
        st.push_positional(argv[1..].to_vec());
        let saved_loop_depth = st.loop_depth;
        st.loop_depth = 0;

        let outcome = self.run_statement(st, &def.body, input);

        st.loop_depth = saved_loop_depth;
        st.pop_positional();
        st.scopes.pop_frame();
        st.func_stack.pop();
        st.func_depth -= 1;
        self.counters.borrow_mut().pop_depth();

        let mut result = match outcome {
            Ok(result) => result,
            Err(int) => match int.kind {
                InterruptKind::Return(code) => ExecResult::new(int.stdout, int.stderr, code),
                _ => return Err(int),
            },
        };
        match self.fire_trap(st, "RETURN", input) {
            Ok((out, err)) => {
                result.stdout.extend_from_slice(&out);
                result.stderr.extend_from_slice(&err);
            }
            Err(int) => return Err(int.prepend(&result.stdout, &result.stderr)),
        }
        Ok(result)
    }

    // ==================================================================
    // Subshells and substitutions
    // ==================================================================

    fn run_subshell(
        &self,
        st: &mut ShellState,
        body: &[Statement],
        input: &InputStream,
    ) -> Flow<ExecResult> {
        let mut sub = st.clone();
        sub.in_subshell = true;
        sub.loop_depth = 0;
        let outcome = self.run_sequence(&mut sub, body, input);
        // Mutations in the snapshot are discarded; only output and the
        // exit code survive.
        match outcome {
            Ok(result) => Ok(result),
            Err(int) => match int.kind {
                InterruptKind::Exit(code)
                | InterruptKind::Errexit(code)
                | InterruptKind::Return(code) => {
                    Ok(ExecResult::new(int.stdout, int.stderr, code))
                }
                InterruptKind::SubshellExit => Ok(ExecResult::new(int.stdout, int.stderr, 0)),
                _ => Err(int),
            },
        }
    }

    /// `$(…)`: run statements against a subshell snapshot; the caller
    /// captures stdout and `$?`.
    pub fn run_substitution(
        &self,
        st: &mut ShellState,
        statements: &[Statement],
    ) -> Flow<ExecResult> {
        self.counters.borrow_mut().push_substitution(self.limits)?;
        let depth_check = self.counters.borrow_mut().push_depth(self.limits);
        if let Err(int) = depth_check {
            self.counters.borrow_mut().pop_substitution();
            return Err(int);
        }
        let input = InputStream::empty();
        let mut sub = st.clone();
        sub.in_subshell = true;
        sub.loop_depth = 0;
        let outcome = self.run_sequence(&mut sub, statements, &input);
        self.counters.borrow_mut().pop_depth();
        self.counters.borrow_mut().pop_substitution();
        match outcome {
            Ok(result) => Ok(result),
            Err(int) => match int.kind {
                InterruptKind::Exit(code)
                | InterruptKind::Errexit(code)
                | InterruptKind::Return(code) => {
                    Ok(ExecResult::new(int.stdout, int.stderr, code))
                }
                InterruptKind::SubshellExit => Ok(ExecResult::new(int.stdout, int.stderr, 0)),
                _ => Err(int),
            },
        }
    }

    /// `<(…)` / `>(…)`: materialize a fifo-like stand-in under
    /// `/dev/fd/` and substitute its path.
    pub fn process_substitution(
        &self,
        st: &mut ShellState,
        write: bool,
        statements: &[Statement],
        side: &mut ExpandSide,
    ) -> Flow<Bytes> {
        let path = format!("/dev/fd/{}", st.fresh_pid());
        if write {
            let _ = self.fs.write_file(&path, b"");
            return Ok(path.into_bytes());
        }
        let result = self.run_substitution(st, statements)?;
        side.stderr.extend_from_slice(&result.stderr);
        if let Err(e) = self.fs.write_file(&path, &result.stdout) {
            return Err(Interrupt::internal(format!("process substitution: {}", e)));
        }
        Ok(path.into_bytes())
    }

    // ==================================================================
    // Conditionals and loops
    // ==================================================================

    fn run_if(
        &self,
        st: &mut ShellState,
        clauses: &[crate::parser::ast::IfClause],
        else_body: Option<&[Statement]>,
        input: &InputStream,
    ) -> Flow<ExecResult> {
        let mut acc = ExecResult::ok();
        for clause in clauses {
            let saved = st.in_condition;
            st.in_condition = true;
            let cond_outcome = self.run_sequence(st, &clause.cond, input);
            st.in_condition = saved;
            let cond = match cond_outcome {
                Ok(cond) => cond,
                Err(int) => return Err(int.prepend(&acc.stdout, &acc.stderr)),
            };
            let cond_code = cond.exit_code;
            acc.stdout.extend_from_slice(&cond.stdout);
            acc.stderr.extend_from_slice(&cond.stderr);
            st.last_exit = cond_code;
            if cond_code == 0 {
                match self.run_sequence(st, &clause.body, input) {
                    Ok(result) => {
                        acc.absorb(result);
                        return Ok(acc);
                    }
                    Err(int) => return Err(int.prepend(&acc.stdout, &acc.stderr)),
                }
            }
        }
        if let Some(body) = else_body {
            match self.run_sequence(st, body, input) {
                Ok(result) => {
                    acc.absorb(result);
                    return Ok(acc);
                }
                Err(int) => return Err(int.prepend(&acc.stdout, &acc.stderr)),
            }
        }
        acc.exit_code = 0;
        Ok(acc)
    }

    fn run_while(
        &self,
        st: &mut ShellState,
        cond: &[Statement],
        body: &[Statement],
        until: bool,
        input: &InputStream,
    ) -> Flow<ExecResult> {
        st.loop_depth += 1;
        let mut acc = ExecResult::ok();
        let outcome = loop {
            if let Err(int) = self.counters.borrow_mut().tick_iteration(self.limits) {
                break Err(int);
            }
            if let Err(int) = self.check_cancel() {
                break Err(int);
            }
            let saved = st.in_condition;
            st.in_condition = true;
            let cond_outcome = self.run_sequence(st, cond, input);
            st.in_condition = saved;
            let cond_result = match cond_outcome {
                Ok(result) => result,
                Err(int) => break Err(int),
            };
            let cond_code = cond_result.exit_code;
            acc.stdout.extend_from_slice(&cond_result.stdout);
            acc.stderr.extend_from_slice(&cond_result.stderr);
            st.last_exit = cond_code;
            let proceed = if until { cond_code != 0 } else { cond_code == 0 };
            if !proceed {
                break Ok(());
            }
            match self.run_sequence(st, body, input) {
                Ok(result) => {
                    let code = result.exit_code;
                    acc.stdout.extend_from_slice(&result.stdout);
                    acc.stderr.extend_from_slice(&result.stderr);
                    acc.exit_code = code;
                }
                Err(int) => match self.loop_interrupt(&mut acc, int) {
                    LoopSignal::Break => {
                        acc.exit_code = 0;
                        break Ok(());
                    }
                    LoopSignal::Continue => continue,
                    LoopSignal::Raise(int) => break Err(int),
                },
            }
        };
        st.loop_depth -= 1;
        match outcome {
            Ok(()) => Ok(acc),
            Err(int) => Err(int.prepend(&acc.stdout, &acc.stderr)),
        }
    }

    fn run_for(
        &self,
        st: &mut ShellState,
        var: &str,
        words: Option<&[Word]>,
        body: &[Statement],
        input: &InputStream,
    ) -> Flow<ExecResult> {
        let mut side = ExpandSide::default();
        let items: Vec<Bytes> = match words {
            Some(words) => match expand_words(self, st, words, &mut side) {
                Ok(items) => items,
                Err(int) => return expansion_outcome(int, side),
            },
            None => st.positional().to_vec(),
        };

        st.loop_depth += 1;
        let mut acc = ExecResult::new(Bytes::new(), side.stderr, 0);
        let mut iter = items.into_iter();
        let outcome = loop {
            if let Err(int) = self.counters.borrow_mut().tick_iteration(self.limits) {
                break Err(int);
            }
            if let Err(int) = self.check_cancel() {
                break Err(int);
            }
            let Some(item) = iter.next() else { break Ok(()) };
            if let Err(message) = st.scopes.set_scalar(var, item) {
                acc.stderr.extend_from_slice(format!("bash: {}\n", message).as_bytes());
                acc.exit_code = 1;
                break Ok(());
            }
            match self.run_sequence(st, body, input) {
                Ok(result) => {
                    let code = result.exit_code;
                    acc.stdout.extend_from_slice(&result.stdout);
                    acc.stderr.extend_from_slice(&result.stderr);
                    acc.exit_code = code;
                }
                Err(int) => match self.loop_interrupt(&mut acc, int) {
                    LoopSignal::Break => {
                        acc.exit_code = 0;
                        break Ok(());
                    }
                    LoopSignal::Continue => continue,
                    LoopSignal::Raise(int) => break Err(int),
                },
            }
        };
        st.loop_depth -= 1;
        match outcome {
            Ok(()) => Ok(acc),
            Err(int) => Err(int.prepend(&acc.stdout, &acc.stderr)),
        }
    }

    fn run_for_arith(
        &self,
        st: &mut ShellState,
        init: Option<&str>,
        cond: Option<&str>,
        step: Option<&str>,
        body: &[Statement],
        input: &InputStream,
    ) -> Flow<ExecResult> {
        if let Some(init) = init {
            if let Err(int) = eval_arith(st, init) {
                return arith_outcome(int);
            }
        }
        st.loop_depth += 1;
        let mut acc = ExecResult::ok();
        let outcome = loop {
            if let Err(int) = self.counters.borrow_mut().tick_iteration(self.limits) {
                break Err(int);
            }
            if let Err(int) = self.check_cancel() {
                break Err(int);
            }
            if let Some(cond) = cond {
                match eval_arith(st, cond) {
                    Ok(value) => {
                        if value == 0 {
                            break Ok(());
                        }
                    }
                    Err(int) => break Err(int),
                }
            }
            let body_outcome = self.run_sequence(st, body, input);
            let advanced = match body_outcome {
                Ok(result) => {
                    let code = result.exit_code;
                    acc.stdout.extend_from_slice(&result.stdout);
                    acc.stderr.extend_from_slice(&result.stderr);
                    acc.exit_code = code;
                    true
                }
                Err(int) => match self.loop_interrupt(&mut acc, int) {
                    LoopSignal::Break => {
                        acc.exit_code = 0;
                        break Ok(());
                    }
                    LoopSignal::Continue => true,
                    LoopSignal::Raise(int) => break Err(int),
                },
            };
            if advanced {
                if let Some(step) = step {
                    if let Err(int) = eval_arith(st, step) {
                        break Err(int);
                    }
                }
            }
        };
        st.loop_depth -= 1;
        match outcome {
            Ok(()) => Ok(acc),
            Err(int) => Err(int.prepend(&acc.stdout, &acc.stderr)),
        }
    }

    fn run_case(
        &self,
        st: &mut ShellState,
        word: &Word,
        arms: &[crate::parser::ast::CaseArm],
        input: &InputStream,
    ) -> Flow<ExecResult> {
        let mut side = ExpandSide::default();
        let scrutinee = match expand_word_single(self, st, word, &mut side) {
            Ok(value) => value,
            Err(int) => return expansion_outcome(int, side),
        };

        let mut acc = ExecResult::new(Bytes::new(), side.stderr, 0);
        let mut side = ExpandSide::default();
        let mut fall_through = false;
        for arm in arms {
            let mut matched = fall_through;
            if !matched {
                for pattern in &arm.patterns {
                    let field = match expand_word_pattern(self, st, pattern, &mut side) {
                        Ok(field) => field,
                        Err(int) => {
                            return Err(int.prepend(&acc.stdout, &acc.stderr));
                        }
                    };
                    if match_pattern(st, &field).matches(&scrutinee) {
                        matched = true;
                        break;
                    }
                }
            }
            if !matched {
                continue;
            }
            match self.run_sequence(st, &arm.body, input) {
                Ok(result) => {
                    let code = result.exit_code;
                    acc.stdout.extend_from_slice(&result.stdout);
                    acc.stderr.extend_from_slice(&result.stderr);
                    acc.exit_code = code;
                }
                Err(int) => return Err(int.prepend(&acc.stdout, &acc.stderr)),
            }
            match arm.terminator {
                CaseTerminator::Break => {
                    fall_through = false;
                    break;
                }
                CaseTerminator::FallThrough => {
                    fall_through = true;
                }
                CaseTerminator::Continue => {
                    fall_through = false;
                }
            }
        }
        acc.stderr.extend_from_slice(&side.stderr);
        Ok(acc)
    }

    /// `select`: print the numbered menu and the PS3 prompt on stderr,
    /// read a reply, bind the variable (empty for out-of-range input),
    /// and run the body; loops until break or end of stdin. An empty
    /// reply redisplays the menu, as bash does.
    fn run_select(
        &self,
        st: &mut ShellState,
        var: &str,
        words: Option<&[Word]>,
        body: &[Statement],
        input: &InputStream,
    ) -> Flow<ExecResult> {
        let mut side = ExpandSide::default();
        let items: Vec<Bytes> = match words {
            Some(words) => match expand_words(self, st, words, &mut side) {
                Ok(items) => items,
                Err(int) => return expansion_outcome(int, side),
            },
            None => st.positional().to_vec(),
        };

        st.loop_depth += 1;
        let mut acc = ExecResult::new(Bytes::new(), side.stderr, 0);
        let mut show_menu = true;
        let outcome = loop {
            if let Err(int) = self.counters.borrow_mut().tick_iteration(self.limits) {
                break Err(int);
            }
            if let Err(int) = self.check_cancel() {
                break Err(int);
            }
            if show_menu {
                for (i, item) in items.iter().enumerate() {
                    acc.stderr
                        .extend_from_slice(format!("{}) ", i + 1).as_bytes());
                    acc.stderr.extend_from_slice(item);
                    acc.stderr.push(b'\n');
                }
                show_menu = false;
            }
            let ps3 = st
                .scopes
                .get_scalar("PS3")
                .map(|b| b.to_vec())
                .unwrap_or_else(|| b"#? ".to_vec());
            acc.stderr.extend_from_slice(&ps3);

            let Some((reply, _)) = input.read_until(b'\n') else { break Ok(()) };
            let text = bytes::lossy_string(&reply).trim().to_string();
            if text.is_empty() {
                show_menu = true;
                continue;
            }
            let _ = st.scopes.set_scalar("REPLY", text.clone().into_bytes());
            let choice = text
                .parse::<usize>()
                .ok()
                .filter(|n| (1..=items.len()).contains(n));
            let value = choice.map(|n| items[n - 1].clone()).unwrap_or_default();
            if let Err(message) = st.scopes.set_scalar(var, value) {
                acc.stderr
                    .extend_from_slice(format!("bash: {}\n", message).as_bytes());
                acc.exit_code = 1;
                break Ok(());
            }

            match self.run_sequence(st, body, input) {
                Ok(result) => {
                    let code = result.exit_code;
                    acc.stdout.extend_from_slice(&result.stdout);
                    acc.stderr.extend_from_slice(&result.stderr);
                    acc.exit_code = code;
                }
                Err(int) => match self.loop_interrupt(&mut acc, int) {
                    LoopSignal::Break => {
                        acc.exit_code = 0;
                        break Ok(());
                    }
                    LoopSignal::Continue => continue,
                    LoopSignal::Raise(int) => break Err(int),
                },
            }
        };
        st.loop_depth -= 1;
        match outcome {
            Ok(()) => Ok(acc),
            Err(int) => Err(int.prepend(&acc.stdout, &acc.stderr)),
        }
    }

    // ==================================================================
    // Assignments, redirects, traps
    // ==================================================================

    /// Apply assignments. `persistent` writes through the scope stack;
    /// otherwise bindings land in the already-pushed ephemeral frame and
    /// are exported for the command's environment. Returns a user-level
    /// error message (readonly violations) in the inner Err.
    fn apply_assignments(
        &self,
        st: &mut ShellState,
        assignments: &[Assignment],
        persistent: bool,
        side: &mut ExpandSide,
    ) -> Flow<Result<(), String>> {
        for assignment in assignments {
            if let Some(elements) = &assignment.array {
                let mut items: Vec<Bytes> = Vec::new();
                for word in elements {
                    items.extend(expand_word_fields(self, st, word, side)?);
                }
                if !persistent {
                    if let Err(message) = st.scopes.set_local(&assignment.name, None) {
                        return Ok(Err(message));
                    }
                }
                if let Err(message) = st.scopes.set_array(&assignment.name, items) {
                    return Ok(Err(message));
                }
                continue;
            }

            let value = match &assignment.value {
                Some(word) => expand_word_single(self, st, word, side)?,
                None => Bytes::new(),
            };

            if let Some(subscript) = &assignment.subscript {
                let is_assoc = matches!(
                    st.scopes.get(&assignment.name).map(|v| &v.value),
                    Some(VarValue::Assoc(_))
                );
                let outcome = if is_assoc {
                    st.scopes.set_assoc(&assignment.name, subscript.clone().into_bytes(), value)
                } else {
                    let index = eval_arith(st, subscript)?;
                    if assignment.append {
                        let mut current = match st.scopes.get(&assignment.name).map(|v| &v.value) {
                            Some(VarValue::Indexed(map)) => {
                                map.get(&index).cloned().unwrap_or_default()
                            }
                            _ => Bytes::new(),
                        };
                        current.extend_from_slice(&value);
                        st.scopes.set_index(&assignment.name, index, current)
                    } else {
                        st.scopes.set_index(&assignment.name, index, value)
                    }
                };
                if let Err(message) = outcome {
                    return Ok(Err(message));
                }
                continue;
            }

            if assignment.name == "RANDOM" {
                let seed = bytes::parse_i64(&value).unwrap_or(0) as u64;
                st.reseed_random(seed);
                continue;
            }

            let outcome = if assignment.append {
                st.scopes.append_scalar(&assignment.name, &value)
            } else if persistent {
                st.scopes.set_scalar(&assignment.name, value)
            } else {
                st.scopes.set_local(&assignment.name, Some(value))
            };
            if let Err(message) = outcome {
                return Ok(Err(message));
            }
            if !persistent || st.flags.allexport {
                st.scopes.set_exported(&assignment.name, true);
            }
        }
        Ok(Ok(()))
    }

    fn with_redirects<F>(
        &self,
        st: &mut ShellState,
        redirects: &[Redirect],
        input: &InputStream,
        f: F,
    ) -> Flow<ExecResult>
    where
        F: FnOnce(&Self, &mut ShellState, &InputStream) -> Flow<ExecResult>,
    {
        if redirects.is_empty() {
            return f(self, st, input);
        }
        let mut side = ExpandSide::default();
        let plan = match plan_redirects(self, st, redirects, &mut side)? {
            PlanOutcome::Ready(plan) => plan,
            PlanOutcome::Failed(failure) => {
                let mut err = side.stderr;
                err.extend_from_slice(&failure.stderr);
                return Ok(ExecResult::new(failure.stdout, err, failure.exit_code));
            }
        };
        let owned_input;
        let eff_input: &InputStream = match plan.stdin.clone() {
            Some(data) => {
                owned_input = InputStream::new(data);
                &owned_input
            }
            None => input,
        };
        match f(self, st, eff_input) {
            Ok(mut result) => {
                if !side.stderr.is_empty() {
                    let mut err = side.stderr;
                    err.extend_from_slice(&result.stderr);
                    result.stderr = err;
                }
                Ok(redirect::finish(self, &plan, result))
            }
            Err(int) => Err(route_interrupt(self, &plan, int, &ExecResult::ok(), &side)),
        }
    }

    /// Run a trap body if registered; output is returned for the caller
    /// to append. `$?` is preserved across the handler and handlers do
    /// not recurse.
    pub fn fire_trap(
        &self,
        st: &mut ShellState,
        event: &str,
        input: &InputStream,
    ) -> Flow<(Bytes, Bytes)> {
        if st.in_trap {
            return Ok((Bytes::new(), Bytes::new()));
        }
        let Some(source) = st.traps.get(event).cloned() else {
            return Ok((Bytes::new(), Bytes::new()));
        };
        if source.is_empty() {
            return Ok((Bytes::new(), Bytes::new()));
        }
        let statements = match crate::parser::parse(&source) {
            Ok(statements) => statements,
            Err(e) => {
                return Ok((Bytes::new(), syntax_failure(&e).stderr));
            }
        };
        st.in_trap = true;
        let saved_exit = st.last_exit;
        let outcome = self.run_sequence(st, &statements, input);
        st.in_trap = false;
        st.last_exit = saved_exit;
        match outcome {
            Ok(result) => Ok((result.stdout, result.stderr)),
            Err(int) => Ok((int.stdout, int.stderr)),
        }
    }
}

enum LoopSignal {
    Break,
    Continue,
    Raise(Interrupt),
}

impl<'a> Executor<'a> {
    /// Fold a body interrupt at a loop boundary: break/continue absorb
    /// their carried output and either stop here or re-raise with one
    /// fewer level.
    fn loop_interrupt(&self, acc: &mut ExecResult, int: Interrupt) -> LoopSignal {
        match int.kind {
            InterruptKind::Break(levels) => {
                acc.stdout.extend_from_slice(&int.stdout);
                acc.stderr.extend_from_slice(&int.stderr);
                if levels > 1 {
                    LoopSignal::Raise(Interrupt::new(InterruptKind::Break(levels - 1)))
                } else {
                    LoopSignal::Break
                }
            }
            InterruptKind::Continue(levels) => {
                acc.stdout.extend_from_slice(&int.stdout);
                acc.stderr.extend_from_slice(&int.stderr);
                if levels > 1 {
                    LoopSignal::Raise(Interrupt::new(InterruptKind::Continue(levels - 1)))
                } else {
                    LoopSignal::Continue
                }
            }
            _ => LoopSignal::Raise(int),
        }
    }
}

/// Expansion failures that bash reports and survives become ordinary
/// exit-1 results; the rest unwind.
fn expansion_outcome(int: Interrupt, side: ExpandSide) -> Flow<ExecResult> {
    let recoverable = matches!(
        int.kind,
        InterruptKind::Arithmetic { fatal: false, .. }
            | InterruptKind::BadSubstitution(_)
            | InterruptKind::Glob(_)
            | InterruptKind::Brace(_)
    );
    if recoverable {
        let mut err = side.stderr;
        err.extend_from_slice(&int.stderr);
        Ok(ExecResult::new(int.stdout, err, 1))
    } else {
        Err(int.prepend(b"", &side.stderr))
    }
}

fn arith_outcome(int: Interrupt) -> Flow<ExecResult> {
    match &int.kind {
        InterruptKind::Arithmetic { fatal: false, .. } => Ok(int.into_result()),
        _ => Err(int),
    }
}

/// Route an interrupt's carried output through a redirect plan, then
/// prepend the pre-command output.
fn route_interrupt(
    ex: &Executor<'_>,
    plan: &RedirPlan,
    int: Interrupt,
    pre: &ExecResult,
    side: &ExpandSide,
) -> Interrupt {
    let routed = redirect::finish(
        ex,
        plan,
        ExecResult::new(int.stdout.clone(), int.stderr.clone(), 0),
    );
    let mut out = pre.stdout.clone();
    out.extend_from_slice(&routed.stdout);
    let mut err = pre.stderr.clone();
    err.extend_from_slice(&side.stderr);
    err.extend_from_slice(&routed.stderr);
    Interrupt { kind: int.kind, stdout: out, stderr: err }
}

fn syntax_failure(e: &ParseError) -> ExecResult {
    ExecResult::failure(e.to_string(), 2)
}

// ============================================================================
// Tests
// ============================================================================

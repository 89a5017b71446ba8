//! Control-Flow Interrupts
//!
//! Shell control flow (`break`, `continue`, `return`, `exit`, errexit,
//! nounset, limits, …) is implemented as a single carrier type that
//! propagates through `Result`. Every interrupt carries the stdout and
//! stderr accumulated below the frame that raised it; each unwinding
//! frame prepends its own buffered output so nothing is lost.

use std::fmt;

use crate::bytes::Bytes;
use crate::interp::limits::LimitKind;

/// Result of executing a command or script fragment: plain data, not an
/// error. Nonzero exits become errexit-eligible at the statement level.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub stdout: Bytes,
    pub stderr: Bytes,
    pub exit_code: i32,
}

impl ExecResult {
    pub fn new(stdout: Bytes, stderr: Bytes, exit_code: i32) -> Self {
        Self { stdout, stderr, exit_code }
    }

    pub fn ok() -> Self {
        Self::default()
    }

    pub fn code(exit_code: i32) -> Self {
        Self { stdout: Bytes::new(), stderr: Bytes::new(), exit_code }
    }

    pub fn stdout_text(text: impl Into<String>) -> Self {
        Self { stdout: text.into().into_bytes(), stderr: Bytes::new(), exit_code: 0 }
    }

    /// Failure with a `bash: …` diagnostic on stderr.
    pub fn failure(message: impl AsRef<str>, exit_code: i32) -> Self {
        Self {
            stdout: Bytes::new(),
            stderr: format!("bash: {}\n", message.as_ref()).into_bytes(),
            exit_code,
        }
    }

    /// Append another result's output, keeping its exit code.
    pub fn absorb(&mut self, other: ExecResult) {
        self.stdout.extend_from_slice(&other.stdout);
        self.stderr.extend_from_slice(&other.stderr);
        self.exit_code = other.exit_code;
    }
}

/// What kind of non-local exit is unwinding.
#[derive(Debug, Clone, PartialEq)]
pub enum InterruptKind {
    /// `break [n]` — exit n enclosing loops.
    Break(u32),
    /// `continue [n]` — next iteration of the n-th enclosing loop.
    Continue(u32),
    /// `return [n]` — leave the current function or sourced script.
    Return(i32),
    /// `exit [n]` — terminate the script; the EXIT trap still runs.
    Exit(i32),
    /// `set -e` tripped on a nonzero exit.
    Errexit(i32),
    /// `set -u` read of an unset variable.
    Nounset(String),
    /// Arithmetic evaluation failure; fatal ones abort the script.
    Arithmetic { message: String, fatal: bool },
    /// `${…}` operator misuse.
    BadSubstitution(String),
    /// `${var:?}` style expansion failure.
    ParamError { name: String, message: String },
    /// failglob with no matches.
    Glob(String),
    /// Invalid brace expansion (mixed-case range).
    Brace(String),
    /// A metering cap was hit; exit 126.
    Limit(LimitKind),
    /// break/continue crossing a subshell boundary: the subshell exits
    /// cleanly and the parent keeps going.
    SubshellExit,
    /// Special-builtin failure under `set -o posix`.
    PosixFatal(i32),
    /// Host cancel token observed.
    Cancelled(i32),
    /// An internal invariant failed; reported, never swallowed.
    Internal(String),
}

/// A non-local exit carrying the output accumulated so far.
#[derive(Debug, Clone, PartialEq)]
pub struct Interrupt {
    pub kind: InterruptKind,
    pub stdout: Bytes,
    pub stderr: Bytes,
}

pub type Flow<T> = Result<T, Interrupt>;

impl Interrupt {
    pub fn new(kind: InterruptKind) -> Self {
        Self { kind, stdout: Bytes::new(), stderr: Bytes::new() }
    }

    pub fn with_output(kind: InterruptKind, stdout: Bytes, stderr: Bytes) -> Self {
        Self { kind, stdout, stderr }
    }

    pub fn exit(code: i32) -> Self {
        Self::new(InterruptKind::Exit(code))
    }

    pub fn errexit(code: i32, stdout: Bytes, stderr: Bytes) -> Self {
        Self::with_output(InterruptKind::Errexit(code), stdout, stderr)
    }

    pub fn nounset(name: &str) -> Self {
        let mut int = Self::new(InterruptKind::Nounset(name.to_string()));
        int.stderr = format!("bash: {}: unbound variable\n", name).into_bytes();
        int
    }

    pub fn arithmetic(message: impl Into<String>, fatal: bool) -> Self {
        let message = message.into();
        let mut int = Self::new(InterruptKind::Arithmetic { message: message.clone(), fatal });
        int.stderr = format!("bash: {}\n", message).into_bytes();
        int
    }

    pub fn bad_substitution(what: impl Into<String>) -> Self {
        let what = what.into();
        let mut int = Self::new(InterruptKind::BadSubstitution(what.clone()));
        int.stderr = format!("bash: {}: bad substitution\n", what).into_bytes();
        int
    }

    pub fn param_error(name: &str, message: &str) -> Self {
        let mut int = Self::new(InterruptKind::ParamError {
            name: name.to_string(),
            message: message.to_string(),
        });
        int.stderr = format!("bash: {}: {}\n", name, message).into_bytes();
        int
    }

    pub fn glob(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let mut int = Self::new(InterruptKind::Glob(pattern.clone()));
        int.stderr = format!("bash: no match: {}\n", pattern).into_bytes();
        int
    }

    pub fn brace(message: impl Into<String>) -> Self {
        let message = message.into();
        let mut int = Self::new(InterruptKind::Brace(message.clone()));
        int.stderr = format!("bash: {}\n", message).into_bytes();
        int
    }

    pub fn limit(kind: LimitKind, message: impl AsRef<str>) -> Self {
        let mut int = Self::new(InterruptKind::Limit(kind));
        int.stderr = format!("bash: {}\n", message.as_ref()).into_bytes();
        int
    }

    pub fn internal(message: impl AsRef<str>) -> Self {
        let mut int = Self::new(InterruptKind::Internal(message.as_ref().to_string()));
        int.stderr = format!("bash: internal error: {}\n", message.as_ref()).into_bytes();
        int
    }

    /// Prepend output buffered by the unwinding frame.
    pub fn prepend(mut self, stdout: &[u8], stderr: &[u8]) -> Self {
        if !stdout.is_empty() {
            let mut out = stdout.to_vec();
            out.extend_from_slice(&self.stdout);
            self.stdout = out;
        }
        if !stderr.is_empty() {
            let mut err = stderr.to_vec();
            err.extend_from_slice(&self.stderr);
            self.stderr = err;
        }
        self
    }

    /// The exit code this interrupt resolves to if it reaches the host.
    pub fn exit_code(&self) -> i32 {
        match &self.kind {
            InterruptKind::Break(_) | InterruptKind::Continue(_) => 0,
            InterruptKind::Return(code)
            | InterruptKind::Exit(code)
            | InterruptKind::Errexit(code)
            | InterruptKind::PosixFatal(code)
            | InterruptKind::Cancelled(code) => *code,
            InterruptKind::Nounset(_)
            | InterruptKind::Arithmetic { .. }
            | InterruptKind::BadSubstitution(_)
            | InterruptKind::ParamError { .. }
            | InterruptKind::Glob(_)
            | InterruptKind::Brace(_)
            | InterruptKind::Internal(_) => 1,
            InterruptKind::Limit(_) => 126,
            InterruptKind::SubshellExit => 0,
        }
    }

    /// Fold into a final result for a frame that absorbs this interrupt.
    pub fn into_result(self) -> ExecResult {
        let code = self.exit_code();
        ExecResult::new(self.stdout, self.stderr, code)
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            InterruptKind::Break(n) => write!(f, "break {}", n),
            InterruptKind::Continue(n) => write!(f, "continue {}", n),
            InterruptKind::Return(code) => write!(f, "return {}", code),
            InterruptKind::Exit(code) => write!(f, "exit {}", code),
            InterruptKind::Errexit(code) => write!(f, "errexit ({})", code),
            InterruptKind::Nounset(name) => write!(f, "{}: unbound variable", name),
            InterruptKind::Arithmetic { message, .. } => write!(f, "{}", message),
            InterruptKind::BadSubstitution(what) => write!(f, "{}: bad substitution", what),
            InterruptKind::ParamError { name, message } => write!(f, "{}: {}", name, message),
            InterruptKind::Glob(pattern) => write!(f, "no match: {}", pattern),
            InterruptKind::Brace(message) => write!(f, "{}", message),
            InterruptKind::Limit(kind) => write!(f, "{} limit exceeded", kind),
            InterruptKind::SubshellExit => write!(f, "subshell exit"),
            InterruptKind::PosixFatal(code) => write!(f, "fatal error ({})", code),
            InterruptKind::Cancelled(code) => write!(f, "cancelled ({})", code),
            InterruptKind::Internal(message) => write!(f, "internal error: {}", message),
        }
    }
}

impl std::error::Error for Interrupt {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_preserves_order() {
        let int = Interrupt::with_output(InterruptKind::Exit(3), b"late".to_vec(), b"e2".to_vec());
        let int = int.prepend(b"early", b"e1");
        assert_eq!(int.stdout, b"earlylate");
        assert_eq!(int.stderr, b"e1e2");
        assert_eq!(int.exit_code(), 3);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Interrupt::new(InterruptKind::Break(1)).exit_code(), 0);
        assert_eq!(Interrupt::nounset("x").exit_code(), 1);
        assert_eq!(Interrupt::new(InterruptKind::Limit(LimitKind::Commands)).exit_code(), 126);
        assert_eq!(Interrupt::exit(42).exit_code(), 42);
    }

    #[test]
    fn test_nounset_message() {
        let int = Interrupt::nounset("FOO");
        assert_eq!(int.stderr, b"bash: FOO: unbound variable\n");
    }

    #[test]
    fn test_into_result() {
        let int = Interrupt::with_output(InterruptKind::Errexit(2), b"out".to_vec(), Bytes::new());
        let result = int.into_result();
        assert_eq!(result.stdout, b"out");
        assert_eq!(result.exit_code, 2);
    }

    #[test]
    fn test_absorb() {
        let mut a = ExecResult::stdout_text("one");
        a.absorb(ExecResult::new(b"two".to_vec(), b"err".to_vec(), 7));
        assert_eq!(a.stdout, b"onetwo");
        assert_eq!(a.stderr, b"err");
        assert_eq!(a.exit_code, 7);
    }
}

//! Execution Limits & Metering
//!
//! Host-configured caps with live counters. Every bump checks its cap
//! and raises an exit-126 interrupt before runtime would diverge; there
//! is no silent truncation. Counters belong to the engine, so subshell
//! state snapshots never reset them.

use std::fmt;

use crate::interp::interrupt::{Flow, Interrupt};

/// Which cap was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Recursion,
    Commands,
    Iterations,
    Expansion,
    GlobOps,
    Substitution,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::Recursion => write!(f, "recursion"),
            LimitKind::Commands => write!(f, "command count"),
            LimitKind::Iterations => write!(f, "iteration"),
            LimitKind::Expansion => write!(f, "expansion length"),
            LimitKind::GlobOps => write!(f, "glob operation"),
            LimitKind::Substitution => write!(f, "substitution depth"),
        }
    }
}

/// Host-configured execution caps.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    /// Function calls + source + eval + command substitution nesting.
    pub max_recursion_depth: u32,
    /// Total commands executed per `execute` call.
    pub max_commands: u64,
    /// Total loop iterations per `execute` call.
    pub max_iterations: u64,
    /// Byte length of any single expansion result.
    pub max_expansion_len: usize,
    /// Filesystem operations spent on pathname expansion.
    pub max_glob_ops: u64,
    /// Nesting depth of command/process substitutions.
    pub max_substitution_depth: u32,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_recursion_depth: 200,
            max_commands: 100_000,
            max_iterations: 1_000_000,
            max_expansion_len: 16 * 1024 * 1024,
            max_glob_ops: 100_000,
            max_substitution_depth: 64,
        }
    }
}

impl ExecutionLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_recursion_depth(mut self, depth: u32) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn max_commands(mut self, count: u64) -> Self {
        self.max_commands = count;
        self
    }

    pub fn max_iterations(mut self, count: u64) -> Self {
        self.max_iterations = count;
        self
    }

    pub fn max_expansion_len(mut self, len: usize) -> Self {
        self.max_expansion_len = len;
        self
    }

    pub fn max_glob_ops(mut self, count: u64) -> Self {
        self.max_glob_ops = count;
        self
    }

    pub fn max_substitution_depth(mut self, depth: u32) -> Self {
        self.max_substitution_depth = depth;
        self
    }
}

/// Live counters, checked on every bump.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub commands: u64,
    pub iterations: u64,
    pub glob_ops: u64,
    pub depth: u32,
    pub substitution_depth: u32,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick_command(&mut self, limits: &ExecutionLimits) -> Flow<()> {
        self.commands += 1;
        if self.commands > limits.max_commands {
            return Err(Interrupt::limit(
                LimitKind::Commands,
                format!(
                    "maximum command count ({}) exceeded (possible runaway script)",
                    limits.max_commands
                ),
            ));
        }
        Ok(())
    }

    pub fn tick_iteration(&mut self, limits: &ExecutionLimits) -> Flow<()> {
        self.iterations += 1;
        if self.iterations > limits.max_iterations {
            return Err(Interrupt::limit(
                LimitKind::Iterations,
                format!("maximum loop iterations ({}) exceeded", limits.max_iterations),
            ));
        }
        Ok(())
    }

    pub fn tick_glob(&mut self, limits: &ExecutionLimits) -> Flow<()> {
        self.glob_ops += 1;
        if self.glob_ops > limits.max_glob_ops {
            return Err(Interrupt::limit(
                LimitKind::GlobOps,
                format!("maximum glob operations ({}) exceeded", limits.max_glob_ops),
            ));
        }
        Ok(())
    }

    /// Enter a function call, eval, source, or substitution frame.
    pub fn push_depth(&mut self, limits: &ExecutionLimits) -> Flow<()> {
        if self.depth >= limits.max_recursion_depth {
            return Err(Interrupt::limit(
                LimitKind::Recursion,
                format!("maximum recursion depth ({}) exceeded", limits.max_recursion_depth),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn pop_depth(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn push_substitution(&mut self, limits: &ExecutionLimits) -> Flow<()> {
        if self.substitution_depth >= limits.max_substitution_depth {
            return Err(Interrupt::limit(
                LimitKind::Substitution,
                format!(
                    "maximum substitution depth ({}) exceeded",
                    limits.max_substitution_depth
                ),
            ));
        }
        self.substitution_depth += 1;
        Ok(())
    }

    pub fn pop_substitution(&mut self) {
        self.substitution_depth = self.substitution_depth.saturating_sub(1);
    }

    pub fn check_expansion_len(&self, len: usize, limits: &ExecutionLimits) -> Flow<()> {
        if len > limits.max_expansion_len {
            return Err(Interrupt::limit(
                LimitKind::Expansion,
                format!("expansion exceeds maximum length ({})", limits.max_expansion_len),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::interrupt::InterruptKind;

    #[test]
    fn test_builder() {
        let limits = ExecutionLimits::new().max_commands(5).max_iterations(10);
        assert_eq!(limits.max_commands, 5);
        assert_eq!(limits.max_iterations, 10);
    }

    #[test]
    fn test_command_cap() {
        let limits = ExecutionLimits::new().max_commands(3);
        let mut counters = Counters::new();
        for _ in 0..3 {
            counters.tick_command(&limits).unwrap();
        }
        let err = counters.tick_command(&limits).unwrap_err();
        assert_eq!(err.kind, InterruptKind::Limit(LimitKind::Commands));
        assert_eq!(err.exit_code(), 126);
    }

    #[test]
    fn test_iteration_cap() {
        let limits = ExecutionLimits::new().max_iterations(2);
        let mut counters = Counters::new();
        counters.tick_iteration(&limits).unwrap();
        counters.tick_iteration(&limits).unwrap();
        assert!(counters.tick_iteration(&limits).is_err());
    }

    #[test]
    fn test_depth_push_pop() {
        let limits = ExecutionLimits::new().max_recursion_depth(2);
        let mut counters = Counters::new();
        counters.push_depth(&limits).unwrap();
        counters.push_depth(&limits).unwrap();
        assert!(counters.push_depth(&limits).is_err());
        counters.pop_depth();
        assert!(counters.push_depth(&limits).is_ok());
    }

    #[test]
    fn test_expansion_len() {
        let limits = ExecutionLimits::new().max_expansion_len(8);
        let counters = Counters::new();
        assert!(counters.check_expansion_len(8, &limits).is_ok());
        assert!(counters.check_expansion_len(9, &limits).is_err());
    }

    #[test]
    fn test_limit_carries_output_message() {
        let limits = ExecutionLimits::new().max_glob_ops(0);
        let mut counters = Counters::new();
        let err = counters.tick_glob(&limits).unwrap_err();
        assert!(String::from_utf8_lossy(&err.stderr).contains("glob"));
    }
}

//! Interpreter State
//!
//! Everything a running script can observe or mutate: the scope stack,
//! positional parameters, shell flags and options, aliases, functions,
//! traps, and the bookkeeping behind special parameters. Cloneable so a
//! subshell can snapshot, run, and be discarded.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::bytes::Bytes;
use crate::interp::scope::ScopeStack;
use crate::parser::ast::Statement;

/// `set` flags.
#[derive(Debug, Clone, Default)]
pub struct ShellFlags {
    /// -e
    pub errexit: bool,
    /// -u
    pub nounset: bool,
    /// -o pipefail
    pub pipefail: bool,
    /// -x
    pub xtrace: bool,
    /// -v
    pub verbose: bool,
    /// -C
    pub noclobber: bool,
    /// -f
    pub noglob: bool,
    /// -n
    pub noexec: bool,
    /// -a
    pub allexport: bool,
    /// -o posix
    pub posix: bool,
}

impl ShellFlags {
    /// Letters for `$-`.
    pub fn short_string(&self) -> String {
        let mut out = String::new();
        if self.allexport {
            out.push('a');
        }
        if self.noclobber {
            out.push('C');
        }
        if self.errexit {
            out.push('e');
        }
        if self.noglob {
            out.push('f');
        }
        if self.noexec {
            out.push('n');
        }
        if self.nounset {
            out.push('u');
        }
        if self.verbose {
            out.push('v');
        }
        if self.xtrace {
            out.push('x');
        }
        out.push('h');
        out.push('B');
        out
    }
}

/// `shopt` options.
#[derive(Debug, Clone)]
pub struct ShoptOptions {
    pub extglob: bool,
    pub globstar: bool,
    pub nullglob: bool,
    pub failglob: bool,
    pub dotglob: bool,
    pub nocaseglob: bool,
    pub nocasematch: bool,
    pub expand_aliases: bool,
    pub xpg_echo: bool,
}

impl Default for ShoptOptions {
    fn default() -> Self {
        Self {
            extglob: false,
            globstar: false,
            nullglob: false,
            failglob: false,
            dotglob: false,
            nocaseglob: false,
            nocasematch: false,
            // The sandbox behaves like an interactive shell here: alias
            // definitions take effect on later execute calls.
            expand_aliases: true,
            xpg_echo: false,
        }
    }
}

/// A defined shell function. The body is shared, so cloning state for a
/// subshell never deep-copies ASTs.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub body: Arc<Statement>,
}

/// `getopts` cursor: OPTIND lives in the environment; this tracks the
/// character offset inside a bundled option word.
#[derive(Debug, Clone, Default)]
pub struct GetoptsCursor {
    pub char_index: usize,
    pub last_optind: i64,
}

#[derive(Debug, Clone)]
pub struct ShellState {
    pub scopes: ScopeStack,
    /// Positional-parameter frames; the last entry is current. Index 0
    /// of the stack is the script-level vector.
    pub positional_stack: Vec<Vec<Bytes>>,
    /// `$0`.
    pub script_name: String,

    pub cwd: String,
    pub prev_dir: String,

    /// `$?`.
    pub last_exit: i32,
    /// `$_`.
    pub last_arg: Bytes,
    /// `$LINENO`.
    pub current_line: u32,

    pub flags: ShellFlags,
    pub options: ShoptOptions,

    pub aliases: IndexMap<String, String>,
    pub functions: HashMap<String, FunctionDef>,
    /// Event name (EXIT, ERR, DEBUG, RETURN, signal names) → handler source.
    pub traps: HashMap<String, String>,

    /// Per-stage codes of the last pipeline.
    pub pipestatus: Vec<i32>,

    pub in_condition: bool,
    pub loop_depth: u32,
    pub func_depth: u32,
    pub source_depth: u32,
    /// FUNCNAME stack, innermost first.
    pub func_stack: Vec<String>,
    /// Re-entrancy guard for trap handlers.
    pub in_trap: bool,
    /// Set inside `(…)` snapshots: break/continue crossing the boundary
    /// become a clean subshell exit.
    pub in_subshell: bool,
    /// Set when the last list/pipeline result must not trip errexit
    /// (short-circuited `&&`/`||`, `!`-negated pipelines).
    pub errexit_safe: bool,

    /// `$$`.
    pub shell_pid: u32,
    /// `$!`.
    pub last_bg_pid: u32,
    next_pid: u32,

    /// Deterministic RANDOM generator state.
    random_state: u64,

    pub getopts: GetoptsCursor,
    pub history: Vec<String>,
}

impl Default for ShellState {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellState {
    pub fn new() -> Self {
        Self {
            scopes: ScopeStack::new(),
            positional_stack: vec![Vec::new()],
            script_name: "bash".to_string(),
            cwd: "/".to_string(),
            prev_dir: "/".to_string(),
            last_exit: 0,
            last_arg: Bytes::new(),
            current_line: 1,
            flags: ShellFlags::default(),
            options: ShoptOptions::default(),
            aliases: IndexMap::new(),
            functions: HashMap::new(),
            traps: HashMap::new(),
            pipestatus: Vec::new(),
            in_condition: false,
            loop_depth: 0,
            func_depth: 0,
            source_depth: 0,
            func_stack: Vec::new(),
            in_trap: false,
            in_subshell: false,
            errexit_safe: false,
            shell_pid: std::process::id(),
            last_bg_pid: 0,
            next_pid: 1000,
            random_state: 0x2545_f491_4f6c_dd1d,
            getopts: GetoptsCursor::default(),
            history: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Positional parameters
    // ------------------------------------------------------------------

    pub fn positional(&self) -> &[Bytes] {
        self.positional_stack.last().map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn set_positional(&mut self, params: Vec<Bytes>) {
        if let Some(top) = self.positional_stack.last_mut() {
            *top = params;
        }
    }

    pub fn push_positional(&mut self, params: Vec<Bytes>) {
        self.positional_stack.push(params);
    }

    pub fn pop_positional(&mut self) {
        if self.positional_stack.len() > 1 {
            self.positional_stack.pop();
        }
    }

    // ------------------------------------------------------------------
    // Special parameters
    // ------------------------------------------------------------------

    /// Current IFS bytes (default space, tab, newline).
    pub fn ifs(&self) -> Bytes {
        self.scopes
            .get_scalar("IFS")
            .map(|b| b.to_vec())
            .unwrap_or_else(|| b" \t\n".to_vec())
    }

    /// First IFS byte, used to join `$*`.
    pub fn ifs_joiner(&self) -> Bytes {
        let ifs = self.ifs();
        match ifs.first() {
            Some(&b) => vec![b],
            None => Bytes::new(),
        }
    }

    /// A fresh virtual pid for `&` jobs and subshells.
    pub fn fresh_pid(&mut self) -> u32 {
        self.next_pid += 1;
        self.next_pid
    }

    /// Next value of `$RANDOM` (0..32768), xorshift-based.
    pub fn next_random(&mut self) -> u16 {
        let mut x = self.random_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.random_state = x;
        (x % 32768) as u16
    }

    /// Assigning to RANDOM reseeds the generator.
    pub fn reseed_random(&mut self, seed: u64) {
        self.random_state = seed | 1;
    }

    /// `PIPESTATUS` refresh after a pipeline.
    pub fn set_pipestatus(&mut self, codes: Vec<i32>) {
        let elements: Vec<Bytes> =
            codes.iter().map(|c| c.to_string().into_bytes()).collect();
        self.pipestatus = codes;
        let _ = self.scopes.set_array("PIPESTATUS", elements);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_stack() {
        let mut st = ShellState::new();
        st.set_positional(vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(st.positional().len(), 2);
        st.push_positional(vec![b"x".to_vec()]);
        assert_eq!(st.positional().len(), 1);
        st.pop_positional();
        assert_eq!(st.positional().len(), 2);
        // The script-level frame never pops away.
        st.pop_positional();
        assert_eq!(st.positional().len(), 2);
    }

    #[test]
    fn test_ifs_default() {
        let st = ShellState::new();
        assert_eq!(st.ifs(), b" \t\n".to_vec());
        assert_eq!(st.ifs_joiner(), b" ".to_vec());
    }

    #[test]
    fn test_ifs_custom() {
        let mut st = ShellState::new();
        st.scopes.set_scalar("IFS", b",".to_vec()).unwrap();
        assert_eq!(st.ifs(), b",".to_vec());
        assert_eq!(st.ifs_joiner(), b",".to_vec());
    }

    #[test]
    fn test_random_deterministic_and_bounded() {
        let mut a = ShellState::new();
        let mut b = ShellState::new();
        let seq_a: Vec<u16> = (0..8).map(|_| a.next_random()).collect();
        let seq_b: Vec<u16> = (0..8).map(|_| b.next_random()).collect();
        assert_eq!(seq_a, seq_b);
        assert!(seq_a.iter().all(|&v| v < 32768));
        a.reseed_random(42);
        b.reseed_random(43);
        assert_ne!(a.next_random(), b.next_random());
    }

    #[test]
    fn test_pipestatus_mirror() {
        let mut st = ShellState::new();
        st.set_pipestatus(vec![0, 1, 2]);
        assert_eq!(st.pipestatus, vec![0, 1, 2]);
        assert_eq!(st.scopes.get("PIPESTATUS").unwrap().value.len_elements(), 3);
    }

    #[test]
    fn test_fresh_pid_monotonic() {
        let mut st = ShellState::new();
        let a = st.fresh_pid();
        let b = st.fresh_pid();
        assert!(b > a);
    }

    #[test]
    fn test_flags_short_string() {
        let mut st = ShellState::new();
        st.flags.errexit = true;
        st.flags.nounset = true;
        let s = st.flags.short_string();
        assert!(s.contains('e'));
        assert!(s.contains('u'));
    }
}

//! husk - a sandboxed, in-process shell interpreter
//!
//! A host hands [`Shell::execute`] a bash-family source string; the
//! crate parses, expands, and executes it against a virtual filesystem
//! and per-instance shell state, returning accumulated stdout/stderr as
//! byte buffers plus the final exit status. Everything is deterministic
//! and single-process; there is no host-shell escape.
//!
//! ```no_run
//! use husk::{Shell, ShellOptions};
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() {
//!     let mut shell = Shell::new(ShellOptions::default()).await;
//!     let result = shell.execute("echo hello | tr a-z A-Z").await;
//!     assert_eq!(result.stdout, b"HELLO\n");
//!     assert_eq!(result.exit_code, 0);
//! }
//! ```

pub mod bytes;
pub mod commands;
pub mod fs;
pub mod interp;
pub mod parser;
pub mod shell;

pub use commands::{Command, CommandContext, CommandRegistry};
pub use fs::{DirEntry, FileStat, FileSystem, FsError, MemFs, SyncFs};
pub use interp::{ExecResult, ExecutionLimits, Interrupt, InterruptKind, ShellState};
pub use parser::{parse, ParseError};
pub use shell::{Shell, ShellOptions, ShellResult};

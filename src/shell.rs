//! Shell Environment
//!
//! The host entry point: ties the parser, interpreter, and filesystem
//! together. A `Shell` owns one interpreter state that persists across
//! `execute` calls; each call parses, runs, folds any unwinding
//! interrupt into a result, fires the EXIT trap, and returns the
//! accumulated byte buffers plus an environment snapshot.

use std::collections::HashMap;
use std::cell::RefCell;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::bytes::Bytes;
use crate::commands::{Command, CommandRegistry};
use crate::fs::{FileSystem, MemFs, SyncFs};
use crate::interp::engine::{Executor, InputStream};
use crate::interp::interrupt::ExecResult;
use crate::interp::limits::ExecutionLimits;
use crate::interp::state::ShellState;
use crate::parser::parse_with_aliases;

/// Options for creating a shell environment.
#[derive(Default)]
pub struct ShellOptions {
    /// Working directory (default `/home/user` with the stock layout).
    pub cwd: Option<String>,
    /// Initial environment variables, exported.
    pub env: Option<HashMap<String, String>>,
    /// Files to seed into the filesystem before the first command.
    pub files: Option<Vec<(String, Vec<u8>)>>,
    /// Filesystem backend (defaults to an in-memory one).
    pub filesystem: Option<Arc<dyn FileSystem>>,
    pub limits: Option<ExecutionLimits>,
    /// Extra commands; may shadow the bundled set.
    pub custom_commands: Vec<Box<dyn Command>>,
    /// Make `echo` interpret escapes by default.
    pub xpg_echo: bool,
    /// POSIX mode: special-builtin failures are fatal.
    pub posix: bool,
    /// Cooperative cancellation token, checked between statements.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Result of one `execute` call.
#[derive(Debug, Clone)]
pub struct ShellResult {
    pub stdout: Bytes,
    pub stderr: Bytes,
    pub exit_code: i32,
    /// Exported variables after the run, decoded lossily.
    pub env: HashMap<String, String>,
}

impl ShellResult {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// A sandboxed shell environment.
pub struct Shell {
    pub fs: Arc<dyn FileSystem>,
    limits: ExecutionLimits,
    registry: RefCell<CommandRegistry>,
    state: ShellState,
    cancel: Option<Arc<AtomicBool>>,
}

impl Shell {
    pub async fn new(options: ShellOptions) -> Self {
        let stock_layout = options.cwd.is_none();
        let cwd = options.cwd.unwrap_or_else(|| "/home/user".to_string());
        let fs: Arc<dyn FileSystem> =
            options.filesystem.unwrap_or_else(|| Arc::new(MemFs::new()));

        init_filesystem(&*fs, stock_layout).await;
        let _ = fs.mkdir(&cwd, true).await;
        if let Some(files) = options.files {
            for (path, content) in files {
                let resolved = fs.resolve_path(&cwd, &path);
                let _ = fs.write_file(&resolved, &content).await;
            }
        }

        let mut state = ShellState::new();
        state.cwd = cwd.clone();
        state.prev_dir = cwd.clone();
        state.flags.posix = options.posix;
        state.options.xpg_echo = options.xpg_echo;

        let home = if stock_layout { "/home/user" } else { "/" };
        let defaults: &[(&str, String)] = &[
            ("HOME", home.to_string()),
            ("PATH", "/usr/bin:/bin".to_string()),
            ("PWD", cwd.clone()),
            ("OLDPWD", cwd.clone()),
            ("IFS", " \t\n".to_string()),
            ("OPTIND", "1".to_string()),
            ("PS4", "+ ".to_string()),
            ("HOSTNAME", "sandbox".to_string()),
            ("OSTYPE", "linux-gnu".to_string()),
        ];
        for (name, value) in defaults {
            let _ = state.scopes.set_scalar(name, value.clone().into_bytes());
        }
        for name in ["HOME", "PATH", "PWD", "OLDPWD"] {
            state.scopes.set_exported(name, true);
        }
        if let Some(env) = options.env {
            for (name, value) in env {
                let _ = state.scopes.set_scalar(&name, value.into_bytes());
                state.scopes.set_exported(&name, true);
            }
        }

        let mut registry = CommandRegistry::with_defaults();
        for command in options.custom_commands {
            registry.register(command);
        }

        Self {
            fs,
            limits: options.limits.unwrap_or_default(),
            registry: RefCell::new(registry),
            state,
            cancel: options.cancel,
        }
    }

    /// Parse and execute shell source. Requires a multi-thread tokio
    /// runtime (the engine bridges into the async filesystem).
    pub async fn execute(&mut self, source: &str) -> ShellResult {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return self.result(ExecResult::ok());
        }
        self.state.history.push(trimmed.to_string());

        let aliases = if self.state.options.expand_aliases {
            self.state.aliases.clone()
        } else {
            Default::default()
        };
        let statements = match parse_with_aliases(source, &aliases) {
            Ok(statements) => statements,
            Err(e) => {
                return self.result(ExecResult::failure(e.to_string(), 2));
            }
        };

        let fs = self.fs.clone();
        let limits = self.limits.clone();
        let cancel = self.cancel.clone();
        let state = &mut self.state;
        let registry = &self.registry;

        let folded = tokio::task::block_in_place(|| {
            let sync_fs = SyncFs::new(fs, tokio::runtime::Handle::current());
            let mut executor = Executor::new(sync_fs, &limits, registry);
            executor.cancel = cancel;

            let mut folded = match executor.run_script(state, &statements) {
                Ok(result) => result,
                Err(int) => int.into_result(),
            };

            // EXIT trap fires while unwinding back to the host; `$?`
            // inside the handler is the script's exit status.
            state.last_exit = folded.exit_code;
            let input = InputStream::empty();
            if let Ok((out, err)) = executor.fire_trap(state, "EXIT", &input) {
                folded.stdout.extend_from_slice(&out);
                folded.stderr.extend_from_slice(&err);
            }
            folded
        });

        self.state.last_exit = folded.exit_code;
        self.result(folded)
    }

    fn result(&self, result: ExecResult) -> ShellResult {
        ShellResult {
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
            env: self.state.scopes.exported_env(),
        }
    }

    pub fn cwd(&self) -> &str {
        &self.state.cwd
    }

    pub fn env(&self) -> HashMap<String, String> {
        self.state.scopes.exported_env()
    }

    /// Read a file relative to the shell's working directory.
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>, crate::fs::FsError> {
        let resolved = self.fs.resolve_path(&self.state.cwd, path);
        self.fs.read_file_buffer(&resolved).await
    }

    /// Write a file relative to the shell's working directory.
    pub async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), crate::fs::FsError> {
        let resolved = self.fs.resolve_path(&self.state.cwd, path);
        self.fs.write_file(&resolved, content).await
    }
}

/// Standard directories and device files.
async fn init_filesystem(fs: &dyn FileSystem, stock_layout: bool) {
    let _ = fs.mkdir("/bin", true).await;
    let _ = fs.mkdir("/usr/bin", true).await;
    let _ = fs.mkdir("/dev", true).await;
    let _ = fs.mkdir("/dev/fd", true).await;
    let _ = fs.write_file("/dev/null", b"").await;
    if stock_layout {
        let _ = fs.mkdir("/home/user", true).await;
        let _ = fs.mkdir("/tmp", true).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandContext;

    async fn shell() -> Shell {
        Shell::new(ShellOptions::default()).await
    }

    async fn exec(sh: &mut Shell, source: &str) -> ShellResult {
        sh.execute(source).await
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_defaults() {
        let sh = shell().await;
        assert_eq!(sh.cwd(), "/home/user");
        assert_eq!(sh.env().get("HOME"), Some(&"/home/user".to_string()));
        assert_eq!(sh.env().get("PATH"), Some(&"/usr/bin:/bin".to_string()));
        assert!(sh.fs.exists("/dev/null").await);
        assert!(sh.fs.exists("/tmp").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_source() {
        let mut sh = shell().await;
        let result = exec(&mut sh, "   ").await;
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_syntax_error_is_exit_2() {
        let mut sh = shell().await;
        let result = exec(&mut sh, "if then").await;
        assert_eq!(result.exit_code, 2);
        assert!(result.stderr_text().contains("syntax error"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_if_true() {
        let mut sh = shell().await;
        let result = exec(&mut sh, "if true; then echo yes; fi").await;
        assert_eq!(result.stdout_text(), "yes\n");
        assert!(result.stderr.is_empty());
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_arithmetic() {
        let mut sh = shell().await;
        let result = exec(&mut sh, "a=1; b=2; echo $((a+b))").await;
        assert_eq!(result.stdout_text(), "3\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_loop_pipeline() {
        let mut sh = shell().await;
        let result = exec(&mut sh, "for i in 1 2 3; do echo $i; done | tr '\\n' ','").await;
        assert_eq!(result.stdout_text(), "1,2,3,");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_function_locals() {
        let mut sh = shell().await;
        let result = exec(&mut sh, "f(){ local x=inner; echo $x; }; x=outer; f; echo $x").await;
        assert_eq!(result.stdout_text(), "inner\nouter\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_errexit() {
        let mut sh = shell().await;
        let result = exec(&mut sh, "set -e; false; echo nope").await;
        assert_eq!(result.stdout, b"");
        assert_eq!(result.exit_code, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_raw_byte_through_pipe() {
        let mut sh = shell().await;
        let result = exec(&mut sh, "echo $'\\xff' | wc -c").await;
        assert_eq!(result.stdout_text(), "2\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_getopts_driver() {
        let mut sh = shell().await;
        let result = exec(
            &mut sh,
            "set -- -a -b val; while getopts ab: opt \"$@\"; do echo \"$opt=${OPTARG-}\"; done; echo \"OPTIND=$OPTIND\"",
        )
        .await;
        assert_eq!(result.stdout_text(), "a=\nb=val\nOPTIND=4\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_state_persists_across_calls() {
        let mut sh = shell().await;
        exec(&mut sh, "x=keep; cd /tmp").await;
        let result = exec(&mut sh, "echo $x; pwd").await;
        assert_eq!(result.stdout_text(), "keep\n/tmp\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exit_code_and_env_snapshot() {
        let mut sh = shell().await;
        let result = exec(&mut sh, "export GREETING=hi; exit 7").await;
        assert_eq!(result.exit_code, 7);
        assert_eq!(result.env.get("GREETING"), Some(&"hi".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exit_trap_runs_on_exit() {
        let mut sh = shell().await;
        let result = exec(&mut sh, "trap 'echo cleanup' EXIT; echo main; exit 3").await;
        assert_eq!(result.stdout_text(), "main\ncleanup\n");
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exit_trap_sees_status() {
        let mut sh = shell().await;
        let result = exec(&mut sh, "trap 'echo code=$?' EXIT; exit 5").await;
        assert_eq!(result.stdout_text(), "code=5\n");
        assert_eq!(result.exit_code, 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_files_seed() {
        let mut sh = Shell::new(ShellOptions {
            files: Some(vec![("notes/a.txt".to_string(), b"seeded".to_vec())]),
            ..Default::default()
        })
        .await;
        let result = exec(&mut sh, "cat notes/a.txt").await;
        assert_eq!(result.stdout_text(), "seeded");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_initial_env_option() {
        let mut sh = Shell::new(ShellOptions {
            env: Some(HashMap::from([("TOKEN".to_string(), "abc".to_string())])),
            ..Default::default()
        })
        .await;
        let result = exec(&mut sh, "echo $TOKEN").await;
        assert_eq!(result.stdout_text(), "abc\n");
        assert_eq!(result.env.get("TOKEN"), Some(&"abc".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_custom_command_registration() {
        struct Greet;
        impl Command for Greet {
            fn name(&self) -> &str {
                "greet"
            }
            fn execute(&self, argv: &[Bytes], _ctx: &mut CommandContext<'_, '_>) -> ExecResult {
                let who = argv
                    .get(1)
                    .map(|a| String::from_utf8_lossy(a).into_owned())
                    .unwrap_or_else(|| "world".to_string());
                ExecResult::stdout_text(format!("hello {}\n", who))
            }
        }
        let mut sh = Shell::new(ShellOptions {
            custom_commands: vec![Box::new(Greet)],
            ..Default::default()
        })
        .await;
        let result = exec(&mut sh, "greet rust").await;
        assert_eq!(result.stdout_text(), "hello rust\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_custom_command_reentry() {
        struct Twice;
        impl Command for Twice {
            fn name(&self) -> &str {
                "twice"
            }
            fn execute(&self, argv: &[Bytes], ctx: &mut CommandContext<'_, '_>) -> ExecResult {
                let line = argv
                    .get(1)
                    .map(|a| String::from_utf8_lossy(a).into_owned())
                    .unwrap_or_default();
                let mut first = ctx.run(&line);
                let second = ctx.run(&line);
                first.absorb(second);
                first
            }
        }
        let mut sh = Shell::new(ShellOptions {
            custom_commands: vec![Box::new(Twice)],
            ..Default::default()
        })
        .await;
        let result = exec(&mut sh, "twice 'echo ping'").await;
        assert_eq!(result.stdout_text(), "ping\nping\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_xpg_echo_option() {
        let mut sh = Shell::new(ShellOptions { xpg_echo: true, ..Default::default() }).await;
        let result = exec(&mut sh, "echo 'a\\tb'").await;
        assert_eq!(result.stdout_text(), "a\tb\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_posix_mode() {
        let mut sh = Shell::new(ShellOptions { posix: true, ..Default::default() }).await;
        let result = exec(&mut sh, "shift 5; echo unreachable").await;
        assert_eq!(result.exit_code, 1);
        assert!(result.stdout.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancellation_token() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut sh = Shell::new(ShellOptions { cancel: Some(flag), ..Default::default() }).await;
        let result = exec(&mut sh, "echo never").await;
        assert_eq!(result.exit_code, 130);
        assert!(result.stdout.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_deterministic_repeat() {
        let script = "for i in 1 2 3; do echo line-$i; done; echo $((6 * 7))";
        let mut a = shell().await;
        let mut b = shell().await;
        let ra = exec(&mut a, script).await;
        let rb = exec(&mut b, script).await;
        assert_eq!(ra.stdout, rb.stdout);
        assert_eq!(ra.exit_code, rb.exit_code);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_subshell_leaves_parent_untouched() {
        let mut sh = shell().await;
        exec(&mut sh, "x=1").await;
        let result = exec(&mut sh, "(x=2; cd /tmp; exit 3); echo $x; pwd; echo $?").await;
        // $? after echo/pwd is 0; the subshell's code was visible right
        // after it finished.
        assert_eq!(result.stdout_text(), "1\n/home/user\n0\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_read_write_helpers() {
        let sh = shell().await;
        sh.write_file("data.bin", &[0xff, 0x00]).await.unwrap();
        assert_eq!(sh.read_file("data.bin").await.unwrap(), vec![0xff, 0x00]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_history_accumulates() {
        let mut sh = shell().await;
        exec(&mut sh, "echo one").await;
        exec(&mut sh, "echo two").await;
        let result = exec(&mut sh, "history").await;
        let text = result.stdout_text();
        assert!(text.contains("echo one"));
        assert!(text.contains("echo two"));
    }
}

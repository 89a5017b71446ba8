//! Registered Commands
//!
//! External utilities plug in through the [`Command`] trait; the
//! interpreter sees them only through dispatch. Registration is eager
//! (a boxed instance) or lazy (a loader invoked and cached on first
//! use). A bundled starter set keeps the crate usable out of the box;
//! hosts may shadow or extend it.

mod echo;
mod printf;
mod testcmd;
mod textutil;

use std::collections::HashMap;
use std::sync::Arc;

use crate::bytes::{self, Bytes};
use crate::fs::SyncFs;
use crate::interp::engine::Executor;
use crate::interp::interrupt::ExecResult;
use crate::interp::state::ShellState;

/// A command visible to the dispatcher. `argv[0]` is the command name.
pub trait Command: Send + Sync {
    fn name(&self) -> &str;
    fn execute(&self, argv: &[Bytes], ctx: &mut CommandContext<'_, '_>) -> ExecResult;
}

/// Everything a command may touch: the filesystem, the live environment,
/// its stdin bytes, and a re-entrant `run` callback into the
/// interpreter (used by xargs-style commands).
pub struct CommandContext<'a, 'b> {
    pub exec: &'a Executor<'b>,
    pub state: &'a mut ShellState,
    pub stdin: &'a [u8],
}

impl<'a, 'b> CommandContext<'a, 'b> {
    pub fn fs(&self) -> &SyncFs {
        &self.exec.fs
    }

    pub fn cwd(&self) -> &str {
        &self.state.cwd
    }

    pub fn resolve_path(&self, path: &str) -> String {
        self.exec.fs.resolve_path(&self.state.cwd, path)
    }

    /// Live environment read (any visible variable).
    pub fn env_get(&self, name: &str) -> Option<Bytes> {
        self.state.scopes.get_scalar(name).map(|b| b.to_vec())
    }

    /// Live environment write.
    pub fn env_set(&mut self, name: &str, value: Bytes) {
        let _ = self.state.scopes.set_scalar(name, value);
    }

    pub fn xpg_echo(&self) -> bool {
        self.state.options.xpg_echo
    }

    /// Re-enter the interpreter on a source line, in the current state.
    pub fn run(&mut self, line: &str) -> ExecResult {
        self.exec.run_line(self.state, line)
    }
}

type Loader = Box<dyn Fn() -> Box<dyn Command> + Send + Sync>;

enum Slot {
    Loaded(Arc<dyn Command>),
    Lazy(Loader),
}

/// Name → command table with lazy loading.
#[derive(Default)]
pub struct CommandRegistry {
    slots: HashMap<String, Slot>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self { slots: HashMap::new() }
    }

    /// The bundled starter utilities.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(echo::Echo));
        registry.register(Box::new(printf::Printf));
        registry.register(Box::new(testcmd::Test));
        registry.register(Box::new(testcmd::Bracket));
        registry.register(Box::new(textutil::Cat));
        registry.register(Box::new(textutil::Head));
        registry.register(Box::new(textutil::Tail));
        registry.register(Box::new(textutil::Wc));
        registry.register(Box::new(textutil::Tr));
        registry.register(Box::new(textutil::Seq));
        registry.register(Box::new(textutil::Sort));
        registry.register(Box::new(textutil::Uniq));
        registry
    }

    pub fn register(&mut self, command: Box<dyn Command>) {
        self.slots
            .insert(command.name().to_string(), Slot::Loaded(Arc::from(command)));
    }

    /// Register a command loaded on first dispatch and cached after.
    pub fn register_lazy(
        &mut self,
        name: impl Into<String>,
        loader: impl Fn() -> Box<dyn Command> + Send + Sync + 'static,
    ) {
        self.slots.insert(name.into(), Slot::Lazy(Box::new(loader)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.keys().cloned().collect();
        names.sort();
        names
    }

    /// Look up a command, loading and caching a lazy registration.
    pub fn resolve(&mut self, name: &str) -> Option<Arc<dyn Command>> {
        match self.slots.get(name) {
            Some(Slot::Loaded(command)) => Some(command.clone()),
            Some(Slot::Lazy(_)) => {
                let loaded = match self.slots.remove(name) {
                    Some(Slot::Lazy(loader)) => Arc::from(loader()),
                    Some(Slot::Loaded(command)) => command,
                    None => return None,
                };
                self.slots
                    .insert(name.to_string(), Slot::Loaded(loaded.clone()));
                Some(loaded)
            }
            None => None,
        }
    }
}

/// Shared option scan for the simple `-xyz` flag style the bundled
/// utilities use.
pub(crate) fn split_flags(argv: &[Bytes]) -> (Vec<char>, Vec<Bytes>) {
    let mut flags = Vec::new();
    let mut rest = Vec::new();
    let mut done = false;
    for arg in argv.iter().skip(1) {
        let text = bytes::lossy_string(arg);
        if !done && text == "--" {
            done = true;
        } else if !done && text.len() > 1 && text.starts_with('-') && !text.starts_with("--") {
            flags.extend(text.chars().skip(1));
        } else {
            rest.push(arg.clone());
        }
    }
    (flags, rest)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;

    impl Command for Probe {
        fn name(&self) -> &str {
            "probe"
        }
        fn execute(&self, _argv: &[Bytes], _ctx: &mut CommandContext<'_, '_>) -> ExecResult {
            ExecResult::stdout_text("probed\n")
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(Probe));
        assert!(registry.contains("probe"));
        assert!(registry.resolve("probe").is_some());
        assert!(registry.resolve("missing").is_none());
    }

    #[test]
    fn test_lazy_loads_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static LOADS: AtomicUsize = AtomicUsize::new(0);

        let mut registry = CommandRegistry::new();
        registry.register_lazy("probe", || {
            LOADS.fetch_add(1, Ordering::SeqCst);
            Box::new(Probe)
        });
        assert_eq!(LOADS.load(Ordering::SeqCst), 0);
        registry.resolve("probe").unwrap();
        registry.resolve("probe").unwrap();
        assert_eq!(LOADS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_defaults_present() {
        let registry = CommandRegistry::with_defaults();
        for name in ["echo", "printf", "cat", "wc", "tr", "test", "["] {
            assert!(registry.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn test_custom_shadows_bundled() {
        let mut registry = CommandRegistry::with_defaults();
        registry.register(Box::new(Probe));
        // Re-registering an existing name replaces it.
        struct FakeEcho;
        impl Command for FakeEcho {
            fn name(&self) -> &str {
                "echo"
            }
            fn execute(&self, _: &[Bytes], _: &mut CommandContext<'_, '_>) -> ExecResult {
                ExecResult::stdout_text("shadowed")
            }
        }
        registry.register(Box::new(FakeEcho));
        assert!(registry.contains("echo"));
    }

    #[test]
    fn test_split_flags() {
        let argv: Vec<Bytes> = vec![
            b"cmd".to_vec(),
            b"-ab".to_vec(),
            b"--".to_vec(),
            b"-c".to_vec(),
            b"file".to_vec(),
        ];
        let (flags, rest) = split_flags(&argv);
        assert_eq!(flags, vec!['a', 'b']);
        assert_eq!(rest, vec![b"-c".to_vec(), b"file".to_vec()]);
    }
}

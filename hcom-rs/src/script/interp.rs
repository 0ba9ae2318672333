//! The HCOM interpreter session.
//!
//! [`InterpreterSession`] owns the injected collaborators (model host,
//! log-data store, console, optimizer) together with the script state:
//! local scalars, user functions, `ans`, history and the working directory.
//! It runs parsed [`Script`]s statement by statement, checking the shared
//! abort flag and calling the host's yield callback before each line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::error::{HcomError, HcomResult};
use crate::host::{
    BufferSink, ConsoleSink, LogDataStore, MemoryLogStore, MemoryModel, ModelHost, NullOptimizer,
    OptimizationBridge,
};

use super::functionoids::FunctionoidRegistry;
use super::names::{quote_segments, NameTable, Resolver};
use super::stmt::{parse_lines, parse_prefix, Script, Stmt};
use super::value::{ScriptValue, ValueKind};

/// Locals that always exist and cannot be reassigned.
pub const PROTECTED_LOCALS: &[(&str, f64)] = &[("true", 1.0), ("false", 0.0)];

/// Outcome of running a block or script.
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    /// The block fell off its end; the caller continues.
    Running,
    /// The abort flag was raised.
    Aborted,
    /// The script ran to its end.
    Completed,
    /// A `stop` statement ended the script.
    Stopped,
    /// A `goto` waiting to be resolved by the enclosing script.
    Goto(String),
}

/// A `define` … `enddefine` body.
#[derive(Debug, Clone)]
pub struct UserFunction {
    pub lines: Vec<String>,
    pub body: Rc<Script>,
}

pub struct InterpreterSession {
    pub(crate) model: Box<dyn ModelHost>,
    pub(crate) store: Box<dyn LogDataStore>,
    pub(crate) sink: Box<dyn ConsoleSink>,
    pub(crate) optimizer: Box<dyn OptimizationBridge>,
    pub(crate) names: NameTable,
    pub(crate) functionoids: Rc<FunctionoidRegistry>,

    pub(crate) locals: HashMap<String, f64>,
    pub(crate) functions: HashMap<String, UserFunction>,
    pub(crate) ans: ScriptValue,

    abort: Arc<AtomicBool>,
    abort_reported: bool,
    depth: usize,
    yield_callback: Option<Box<dyn FnMut()>>,

    pub(crate) history: Vec<String>,
    history_limit: Option<usize>,
    pub(crate) pwd: PathBuf,
    pub(crate) echo: bool,
    pub(crate) exit_requested: bool,
    pub(crate) rng: StdRng,
}

impl InterpreterSession {
    pub fn new(
        model: Box<dyn ModelHost>,
        store: Box<dyn LogDataStore>,
        sink: Box<dyn ConsoleSink>,
    ) -> Self {
        let mut session = InterpreterSession {
            model,
            store,
            sink,
            optimizer: Box::new(NullOptimizer),
            names: NameTable::with_defaults(),
            functionoids: Rc::new(FunctionoidRegistry::with_builtins()),
            locals: HashMap::new(),
            functions: HashMap::new(),
            ans: ScriptValue::Undefined,
            abort: Arc::new(AtomicBool::new(false)),
            abort_reported: false,
            depth: 0,
            yield_callback: None,
            history: Vec::new(),
            history_limit: None,
            pwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            echo: true,
            exit_requested: false,
            rng: StdRng::from_entropy(),
        };
        session.restore_protected_locals();
        session
    }

    pub fn with_optimizer(mut self, optimizer: Box<dyn OptimizationBridge>) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Seed `rand()` for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// A session over an empty in-memory model and store whose output is
    /// discarded into an unreachable buffer.
    pub fn in_memory() -> Self {
        Self::buffered().0
    }

    /// A session over an empty in-memory model and store, plus a handle on
    /// the console buffer it writes to.
    pub fn buffered() -> (Self, BufferSink) {
        Self::buffered_with(MemoryModel::new(), MemoryLogStore::new())
    }

    pub fn buffered_with(model: MemoryModel, store: MemoryLogStore) -> (Self, BufferSink) {
        let sink = BufferSink::new();
        let session = Self::new(Box::new(model), Box::new(store), Box::new(sink.clone()));
        (session, sink)
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn store(&self) -> &dyn LogDataStore {
        &*self.store
    }

    pub fn store_mut(&mut self) -> &mut dyn LogDataStore {
        &mut *self.store
    }

    pub fn model(&self) -> &dyn ModelHost {
        &*self.model
    }

    pub fn model_mut(&mut self) -> &mut dyn ModelHost {
        &mut *self.model
    }

    pub fn names_mut(&mut self) -> &mut NameTable {
        &mut self.names
    }

    /// Register an extra functionoid before the session starts running.
    pub fn functionoids_mut(&mut self) -> Option<&mut FunctionoidRegistry> {
        Rc::get_mut(&mut self.functionoids)
    }

    pub(crate) fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&*self.store, &*self.model, &self.names)
    }

    /// Shared flag another thread may raise to cancel the running script.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Lower an abort raised while nothing was running.
    pub fn clear_abort(&mut self) {
        self.abort.store(false, Ordering::SeqCst);
        self.abort_reported = false;
    }

    /// Install the callback run before every executed line.
    pub fn set_yield_callback(&mut self, callback: impl FnMut() + 'static) {
        self.yield_callback = Some(Box::new(callback));
    }

    pub fn local(&self, name: &str) -> Option<f64> {
        self.locals.get(name).copied()
    }

    pub fn set_local(&mut self, name: &str, value: f64) -> HcomResult<()> {
        if is_protected(name) {
            return Err(HcomError::Argument("Illegal variable name.".to_owned()));
        }
        self.locals.insert(name.to_owned(), value);
        Ok(())
    }

    pub fn ans(&self) -> &ScriptValue {
        &self.ans
    }

    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Keep at most `limit` history entries; `None` is unbounded.
    pub fn set_history_limit(&mut self, limit: Option<usize>) {
        self.history_limit = limit;
        self.trim_history();
    }

    pub fn pwd(&self) -> &Path {
        &self.pwd
    }

    pub fn set_pwd(&mut self, dir: impl Into<PathBuf>) {
        self.pwd = dir.into();
    }

    pub fn echo(&self) -> bool {
        self.echo
    }

    pub fn set_echo(&mut self, on: bool) {
        self.echo = on;
    }

    /// Whether `exit` ran in this session.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Forget locals, functions, `ans` and history.
    pub fn reset(&mut self) {
        self.locals.clear();
        self.restore_protected_locals();
        self.functions.clear();
        self.ans = ScriptValue::Undefined;
        self.history.clear();
        self.abort.store(false, Ordering::SeqCst);
        self.abort_reported = false;
    }

    fn restore_protected_locals(&mut self) {
        for (name, value) in PROTECTED_LOCALS {
            self.locals.insert((*name).to_owned(), *value);
        }
    }

    fn trim_history(&mut self) {
        if let Some(limit) = self.history_limit {
            if self.history.len() > limit {
                let excess = self.history.len() - limit;
                self.history.drain(..excess);
            }
        }
    }

    // ── Console channels ──────────────────────────────────────────────────────

    pub(crate) fn print(&mut self, text: &str) {
        if self.echo {
            self.sink.print(text);
        }
    }

    pub(crate) fn info(&mut self, text: &str) {
        if self.echo {
            self.sink.print_info(text);
        }
    }

    pub(crate) fn warning(&mut self, text: &str) {
        self.sink.print_warning(text);
    }

    pub(crate) fn error(&mut self, text: &str) {
        self.sink.print_error(text);
    }

    // ── Entry points ──────────────────────────────────────────────────────────

    /// Record an interactive line in the history, then execute it.
    pub fn submit(&mut self, line: &str) {
        let trimmed = line.trim();
        if !trimmed.is_empty() && self.history.last().map(String::as_str) != Some(trimmed) {
            self.history.push(trimmed.to_owned());
            self.trim_history();
        }
        self.execute(trimmed);
    }

    /// Parse and run a whole script.  Lines before a broken block still run;
    /// the syntax error is reported when execution reaches it and the
    /// script ends there.
    pub fn run_script(&mut self, src: &str) -> RunState {
        let (script, syntax_error) = parse_prefix(src.lines());
        let state = self.run_parsed(&script);
        if let (RunState::Completed, Some(e)) = (&state, syntax_error) {
            self.error(&e.to_string());
        }
        state
    }

    /// Read and run a script file with `$1`… replaced by `args`.
    pub fn run_file(&mut self, path: &Path, args: &[String]) -> HcomResult<RunState> {
        let src = std::fs::read_to_string(path)
            .map_err(|_| HcomError::Io("Unable to read file.".to_owned()))?;
        let src = substitute_arguments(&src, args);
        debug!(path = %path.display(), args = args.len(), "running script file");
        Ok(self.run_script(&src))
    }

    /// Run a user function defined with `define`.
    pub fn call_user_function(&mut self, name: &str) -> HcomResult<RunState> {
        let body = match self.functions.get(name) {
            Some(f) => Rc::clone(&f.body),
            None => return Err(HcomError::Resolution("Undefined function.".to_owned())),
        };
        debug!(function = name, "call");
        let state = self.run_parsed(&body);
        if state == RunState::Aborted {
            self.print("Function aborted");
        }
        Ok(state)
    }

    /// Run a parsed script, resolving `goto` against its label index.
    pub(crate) fn run_parsed(&mut self, script: &Script) -> RunState {
        self.depth += 1;
        let state = self.exec_script(script);
        self.depth -= 1;
        if self.depth == 0 {
            self.abort.store(false, Ordering::SeqCst);
            self.abort_reported = false;
        }
        state
    }

    fn exec_script(&mut self, script: &Script) -> RunState {
        let mut start = 0;
        loop {
            let stmts = script.stmts.get(start..).unwrap_or(&[]);
            match self.exec_block(stmts) {
                RunState::Running | RunState::Completed => return RunState::Completed,
                RunState::Goto(label) => match script.label_target(&label) {
                    Some(target) => {
                        debug!(label = %label, target, "goto");
                        start = target;
                    }
                    None => {
                        self.error(&format!("Label not found: {label}"));
                        return RunState::Completed;
                    }
                },
                other => return other,
            }
        }
    }

    /// Whether the abort flag is raised; reports it once per run.
    fn check_abort(&mut self) -> bool {
        if !self.abort.load(Ordering::SeqCst) {
            return false;
        }
        if !self.abort_reported {
            self.abort_reported = true;
            self.print("Script aborted.");
        }
        true
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> RunState {
        for stmt in stmts {
            if self.check_abort() {
                return RunState::Aborted;
            }
            if let Some(cb) = self.yield_callback.as_mut() {
                cb();
            }
            match self.exec_stmt(stmt) {
                RunState::Running => {}
                other => return other,
            }
        }
        RunState::Running
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> RunState {
        match stmt {
            Stmt::Command(line) => {
                self.execute(line);
                RunState::Running
            }
            Stmt::Label(_) => RunState::Running,
            Stmt::Goto(label) => RunState::Goto(label.clone()),
            Stmt::Stop => RunState::Stopped,
            Stmt::Define { name, lines, body } => {
                debug!(function = %name, "define");
                self.print(&format!("Defined function: {name}"));
                self.functions.insert(
                    name.clone(),
                    UserFunction {
                        lines: lines.clone(),
                        body: Rc::clone(body),
                    },
                );
                RunState::Running
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => match self.evaluate(cond, Some(ValueKind::Scalar)).as_scalar() {
                Some(v) if v > 0.0 => self.exec_block(then_block),
                Some(_) => self.exec_block(else_block),
                None => {
                    self.error("Evaluation of if-statement argument failed.");
                    RunState::Running
                }
            },
            Stmt::While { cond, body } => self.exec_while(cond, body),
            Stmt::Foreach {
                var, filter, lines, ..
            } => self.exec_foreach(var, filter, lines),
        }
    }

    fn exec_while(&mut self, cond: &str, body: &[Stmt]) -> RunState {
        loop {
            if self.check_abort() {
                return RunState::Aborted;
            }
            match self.evaluate(cond, Some(ValueKind::Scalar)).as_scalar() {
                Some(v) if v > 0.0 => {}
                Some(_) => return RunState::Running,
                None => {
                    self.error("Evaluation of while-statement argument failed.");
                    return RunState::Running;
                }
            }
            match self.exec_block(body) {
                RunState::Running => {}
                other => return other,
            }
        }
    }

    fn exec_foreach(&mut self, var: &str, filter: &str, lines: &[String]) -> RunState {
        let matches = match self.resolver().matching_variables(filter) {
            Ok(m) => m,
            Err(e) => {
                self.error(&e);
                return RunState::Running;
            }
        };
        let token = format!("${var}");
        for name in matches {
            let quoted = quote_segments(&name);
            let body: Vec<String> = lines.iter().map(|l| l.replace(&token, &quoted)).collect();
            let script = match parse_lines(&body) {
                Ok(s) => s,
                Err(e) => {
                    self.error(&e.to_string());
                    return RunState::Running;
                }
            };
            match self.exec_block(&script.stmts) {
                RunState::Running => {}
                other => return other,
            }
        }
        RunState::Running
    }
}

pub(crate) fn is_protected(name: &str) -> bool {
    PROTECTED_LOCALS.iter().any(|(n, _)| *n == name)
}

/// Replace `$1`, `$2`, … with script arguments, highest index first so `$1`
/// does not eat the prefix of `$10`.
pub fn substitute_arguments(src: &str, args: &[String]) -> String {
    let mut out = src.to_owned();
    for (i, arg) in args.iter().enumerate().rev() {
        out = out.replace(&format!("${}", i + 1), arg);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ConsoleLine;

    fn run(src: &str) -> (InterpreterSession, BufferSink) {
        let (mut s, sink) = InterpreterSession::buffered();
        s.run_script(src);
        (s, sink)
    }

    fn output(src: &str) -> Vec<String> {
        run(src).1.texts()
    }

    #[test]
    fn protected_locals_exist_and_survive_reset() {
        let (mut s, _) = run("x = 2");
        assert_eq!(s.local("true"), Some(1.0));
        assert_eq!(s.local("x"), Some(2.0));
        assert!(s.set_local("false", 3.0).is_err());
        s.reset();
        assert_eq!(s.local("x"), None);
        assert_eq!(s.local("false"), Some(0.0));
    }

    #[test]
    fn while_counts() {
        let (s, _) = run("i = 0\nwhile(i < 5)\n i = i + 1\nrepeat");
        assert_eq!(s.local("i"), Some(5.0));
    }

    #[test]
    fn while_false_on_entry_runs_zero_times() {
        let (s, _) = run("n = 0\nwhile(0)\n n = n + 1\nrepeat");
        assert_eq!(s.local("n"), Some(0.0));
    }

    #[test]
    fn if_runs_exactly_one_block() {
        let (s, _) = run("if(1)\n a = 1\nelse\n a = 2\nendif\nif(0)\n b = 1\nelse\n b = 2\nendif");
        assert_eq!(s.local("a"), Some(1.0));
        assert_eq!(s.local("b"), Some(2.0));
    }

    #[test]
    fn if_condition_failure_reports_and_skips() {
        let (s, sink) = run("if(nosuch > 1)\n a = 1\nendif");
        assert_eq!(s.local("a"), None);
        assert_eq!(sink.errors(), vec!["Evaluation of if-statement argument failed."]);
    }

    #[test]
    fn define_and_call() {
        let (mut s, _) =
            run("n = 0\ndefine bump\n n = n + 1\nenddefine\ncall bump\ncall bump");
        assert_eq!(s.local("n"), Some(2.0));
        assert_eq!(s.function_names(), vec!["bump"]);
        s.call_user_function("bump").unwrap();
        assert_eq!(s.local("n"), Some(3.0));
        assert!(s.call_user_function("other").is_err());
    }

    #[test]
    fn goto_jumps_back_to_label() {
        let (s, _) = run("i = 0\n&again\ni = i + 1\nif(i < 3)\n goto again\nendif");
        assert_eq!(s.local("i"), Some(3.0));
    }

    #[test]
    fn goto_unknown_label_ends_script() {
        let (s, sink) = run("goto nowhere\nx = 1");
        assert_eq!(s.local("x"), None);
        assert_eq!(sink.errors(), vec!["Label not found: nowhere"]);
    }

    #[test]
    fn stop_ends_script_from_inside_loop() {
        let (s, _) = run("i = 0\nwhile(1)\n i = i + 1\n if(i == 2)\n  stop\n endif\nrepeat\ni = 100");
        assert_eq!(s.local("i"), Some(2.0));
    }

    #[test]
    fn stop_inside_function_returns_to_caller() {
        let (s, _) = run("define f\n a = 1\n stop\n a = 2\nenddefine\ncall f\nb = 1");
        assert_eq!(s.local("a"), Some(1.0));
        assert_eq!(s.local("b"), Some(1.0));
    }

    #[test]
    fn syntax_error_runs_lines_before_the_broken_block() {
        let (s, sink) = run("x = 1\nwhile(x < 3)\n x = x + 1\ny = 2");
        assert_eq!(s.local("x"), Some(1.0));
        assert_eq!(s.local("y"), None);
        assert_eq!(sink.errors(), vec!["Missing REPEAT in while loop."]);
    }

    #[test]
    fn stop_before_a_broken_block_is_silent() {
        let (s, sink) = run("x = 1\nstop\nif(x)\n x = 2");
        assert_eq!(s.local("x"), Some(1.0));
        assert!(sink.errors().is_empty(), "{:?}", sink.errors());
    }

    #[test]
    fn define_announces_the_function() {
        let texts = output("define f\n a = 1\nenddefine");
        assert_eq!(texts, vec!["Defined function: f"]);
    }

    #[test]
    fn abort_mid_while_stops_and_keeps_locals() {
        let (mut s, sink) = InterpreterSession::buffered();
        let flag = s.abort_handle();
        let mut lines = 0;
        s.set_yield_callback(move || {
            lines += 1;
            if lines == 7 {
                flag.store(true, Ordering::SeqCst);
            }
        });
        let state = s.run_script("i = 0\nwhile(1)\n i = i + 1\nrepeat");
        assert_eq!(state, RunState::Aborted);
        let i = s.local("i").unwrap();
        assert!(i >= 5.0 && i <= 6.0, "i = {i}");
        let aborted = sink
            .lines()
            .iter()
            .filter(|l| l.text() == "Script aborted.")
            .count();
        assert_eq!(aborted, 1);
        // flag resets for the next run
        assert_eq!(s.run_script("j = 1"), RunState::Completed);
        assert_eq!(s.local("j"), Some(1.0));
    }

    #[test]
    fn cleared_idle_abort_does_not_cancel_the_next_script() {
        let (mut s, sink) = InterpreterSession::buffered();
        s.abort_handle().store(true, Ordering::SeqCst);
        s.clear_abort();
        assert_eq!(s.run_script("k = 1\nk = k + 1"), RunState::Completed);
        assert_eq!(s.local("k"), Some(2.0));
        assert!(!sink.texts().contains(&"Script aborted.".to_owned()));
    }

    #[test]
    fn abort_inside_call_reports_function_aborted() {
        let (mut s, sink) = InterpreterSession::buffered();
        let flag = s.abort_handle();
        s.run_script("define spin\n while(1)\n  x = 1\n repeat\nenddefine");
        s.set_yield_callback(move || flag.store(true, Ordering::SeqCst));
        s.run_script("call spin");
        let texts = sink.texts();
        assert!(texts.contains(&"Script aborted.".to_owned()));
        assert!(texts.contains(&"Function aborted".to_owned()));
    }

    #[test]
    fn yield_runs_once_per_line() {
        use std::cell::Cell;
        let count = Rc::new(Cell::new(0));
        let (mut s, _) = InterpreterSession::buffered();
        let c = Rc::clone(&count);
        s.set_yield_callback(move || c.set(c.get() + 1));
        s.run_script("a = 1\n# comment\n\nb = 2\nc = 3");
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn foreach_substitutes_matches() {
        let (mut s, sink) = InterpreterSession::buffered();
        let store = s.store_mut();
        store.define("A#x", Some(0), vec![1.0], None);
        store.define("B#x", Some(0), vec![2.0], None);
        sink.take();
        s.run_script("n = 0\nforeach v *.x\n n = n + peek($v, 0)\nendforeach");
        assert_eq!(s.local("n"), Some(3.0));
    }

    #[test]
    fn submit_records_history() {
        let (mut s, _) = InterpreterSession::buffered();
        s.set_history_limit(Some(2));
        s.submit("a = 1");
        s.submit("a = 1");
        s.submit("b = 2");
        s.submit("c = 3");
        assert_eq!(s.history(), &["b = 2".to_owned(), "c = 3".to_owned()]);
    }

    #[test]
    fn argument_substitution_prefers_longer_indices() {
        let args: Vec<String> = (1..=10).map(|i| format!("a{i}")).collect();
        assert_eq!(substitute_arguments("$1 $10", &args), "a1 a10");
    }

    #[test]
    fn echo_off_hides_print_but_not_errors() {
        let (mut s, sink) = InterpreterSession::buffered();
        s.set_echo(false);
        s.run_script("x = 1\nnosuchcommand");
        assert!(matches!(sink.lines().as_slice(), [ConsoleLine::Error(_)]));
        let texts = output("x = 1");
        assert_eq!(texts, vec!["Assigning scalar x with 1"]);
    }
}

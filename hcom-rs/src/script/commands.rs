//! Command dispatcher and the built-in HCOM command table.
//!
//! Every command is a [`CommandSpec`]: a name, an optional help group, a
//! one-line description, usage text and a plain `fn` handler.  Handlers
//! receive the raw argument text after the command word and report failure
//! by returning an [`HcomError`]; the dispatcher prints it and moves on.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{HcomError, HcomResult};
use crate::host::logfile::LogFileFormat;
use crate::pattern::{wildcard_match, Pattern};

use super::interp::InterpreterSession;
use super::names::{parse_generation, split_generation, GenerationSpecifier};
use super::text::{collapse_whitespace, contains_unquoted, split_command_arguments, split_respecting, split_word, unquote};
use super::value::{format_samples, format_scalar, ScriptValue, ValueKind};

pub type CommandHandler = fn(&mut InterpreterSession, &str) -> HcomResult<()>;

/// One registered command.
pub struct CommandSpec {
    pub name: &'static str,
    pub group: Option<&'static str>,
    pub description: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

const SIMULATION: Option<&str> = Some("Simulation Commands");
const PARAMETER: Option<&str> = Some("Parameter Commands");
const VARIABLE: Option<&str> = Some("Variable Commands");
const MODEL: Option<&str> = Some("Model Commands");
const FILE: Option<&str> = Some("File Commands");
const PLOT: Option<&str> = Some("Plot Commands");

const HELP_RULE: &str =
    "-------------------------------------------------------------------------";

macro_rules! command {
    ($name:literal, $group:expr, $desc:literal, $help:literal, $handler:path) => {
        CommandSpec {
            name: $name,
            group: $group,
            description: $desc,
            help: $help,
            handler: $handler,
        }
    };
}

pub static COMMANDS: &[CommandSpec] = &[
    command!("help", None, "Shows help information", " Usage: help [command]", help),
    command!("sim", SIMULATION, "Simulates current model (or all open models)",
        " Usage: sim\n Usage: sim all", sim),
    command!("info", None, "Show information about specified variable",
        " Usage: info [variable]", info),
    command!("exit", None, "Exits the program", " Usage: exit [no arguments]", exit),
    command!("dipa", PARAMETER, "Display parameter value", " Usage: dipa [parameter]", dipa),
    command!("adpa", PARAMETER, "Add (system) parameter", " Usage: adpa [parameter] [value]", adpa),
    command!("chpa", PARAMETER, "Change parameter value", " Usage: chpa [parameter] [value]", chpa),
    command!("chss", SIMULATION, "Change simulation settings",
        " Usage: chss [starttime] [timestep] [stoptime] [samples]\n Usage: chss [starttime] [timestep] [stoptime]",
        chss),
    command!("exec", FILE, "Executes a script file", " Usage: exec [filepath] [arg1] [arg2] ...", exec),
    command!("wrhi", FILE, "Writes history to file", " Usage: wrhi [filepath]", wrhi),
    command!("print", None, "Prints arguments on the screen",
        " Usage: print [-flag] [\"string\"]\n  Flags (optional):\n   -i Info message\n   -w Warning message\n   -e Error message\n  Variables can be printed by putting them in dollar signs.\n  Example:\n   >> print -w \"x=$x$\"\n   Warning: x=12",
        print),
    command!("disp", VARIABLE, "Shows a list of all variables matching specified name filter (using asterisks)",
        " Usage: disp [filter]", disp),
    command!("peek", VARIABLE, "Shows the value at a specified index in a specified data variable",
        " Usage: peek [variable] [index]", peek),
    command!("poke", VARIABLE, "Changes the value at a specified index in a specified data variable",
        " Usage: poke [variable] [index] [newvalue]", poke),
    command!("alias", VARIABLE, "Defines an alias for a variable", " Usage: alias [variable] [alias]", alias),
    command!("rmvar", VARIABLE, "Removes specified variable", " Usage: rmvar [variable] ...", rmvar),
    command!("set", None, "Sets Hopsan preferences",
        " Usage: set [preference] [value]\n  Available preferences:\n   multicore       [on/off]\n   threads         [number]\n   algorithm       [number]\n   cachetodisk     [on/off]\n   generationlimit [number]\n   samples         [number]",
        set),
    command!("load", MODEL, "Loads a model file", " Usage: load [filepath]", load),
    command!("reco", MODEL, "Renames a component", " Usage: reco [oldname] [newname]", reco),
    command!("rmco", MODEL, "Removes specified component(s)", " Usage: rmco [component]", rmco),
    command!("pwd", FILE, "Displays present working directory", " Usage: pwd [no arguments]", pwd),
    command!("mwd", FILE, "Displays working directory of current model", " Usage: mwd [no arguments]", mwd),
    command!("cd", FILE, "Changes present working directory",
        " Path may be relative or absolute and must be contained withing quotes \" \" if it contains spaces\n Usage: cd [directory]\n Usage: cd -mwd        Switch to current model working directory",
        cd),
    command!("ls", FILE, "List files in current directory", " Usage: ls [filter]", ls),
    command!("adco", MODEL, "Adds a new component to current model",
        " Usage: adco [typename] [name]\n Usage: adco [typename] [name] -a [x-coord] [y-coord] [rot-angle]",
        adco),
    command!("coco", MODEL, "Connect components in current model",
        " Usage: coco [comp1] [port1] [comp2] [port2]", coco),
    command!("crmo", MODEL, "Creates a new model", " Usage: crmo [no arguments]", crmo),
    command!("chts", SIMULATION, "Change time step of sub-component",
        " Usage: chts [component] [timestep]", chts),
    command!("ints", SIMULATION, "Inherit time step of sub-component from system time step",
        " Usage: ints [component]", ints),
    command!("abs", VARIABLE, "Irreversibly turn all vector elements into absolute values",
        " Usage: abs [var]", abs),
    command!("opt", None, "Set optimization values",
        " Usage: opt set obj [idx] [value]\n Usage: opt set limits [idx] [min] [max]", opt),
    command!("call", None, "Calls a pre-defined function", " Usage: call [funcname]", call),
    command!("echo", None, "Sets terminal output on or off", " Usage: echo [on/off]", echo),
    command!("dlog", VARIABLE, "Disables logging in specified ports",
        " Usage: dlog [ports]\n Usage: dlog [ports] -noalias", dlog),
    command!("elog", VARIABLE, "Enables logging in specified ports", " Usage: elog [ports]", elog),
    command!("sapl", PLOT, "Save log variables to file",
        " Usage: sapl [filepath] [-flags] [variables]\n  Flags (optional):\n   -csv    Use CSV format (default is PLO format)",
        sapl),
    command!("repl", PLOT, "Loads plot files from .CSV or .PLO", " Usage: repl [filepath]", repl),
    command!("sapa", PARAMETER, "Saves parameter set to file", " Usage: sapa [filepath]", sapa),
    command!("repa", PARAMETER, "Loads parameters from file", " Usage: repa [filepath]", repa),
    command!("semt", SIMULATION, "Change multi-threading settings",
        " Usage: semt [on/off] [numThreads] [algorithm]\n Usage: semt [on/off] [numThreads]", semt),
];

pub fn find_command(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.name == name)
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

impl InterpreterSession {
    /// Execute one console line.
    pub fn execute(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }
        if contains_unquoted(line, ';') {
            for part in split_respecting(line, ';') {
                self.execute(&part);
            }
            return;
        }
        let line = collapse_whitespace(line);
        let (word, rest) = split_word(&line);
        let result = match find_command(word) {
            Some(spec) => {
                debug!(command = spec.name, args = rest, "dispatch");
                (spec.handler)(self, rest)
            }
            None => self.assign_or_evaluate(&line),
        };
        if let Err(e) = result {
            self.error(&e.to_string());
        }
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn require_model(s: &InterpreterSession) -> HcomResult<()> {
    if s.model.has_model() {
        Ok(())
    } else {
        Err(HcomError::no_model())
    }
}

fn expect_args(args: &[String], n: usize) -> HcomResult<()> {
    if args.len() == n {
        Ok(())
    } else {
        Err(HcomError::wrong_arg_count())
    }
}

fn evaluate_scalar(s: &mut InterpreterSession, text: &str) -> Option<f64> {
    s.evaluate(text, Some(ValueKind::Scalar)).as_scalar()
}

fn host(msg: String) -> HcomError {
    HcomError::Host(msg)
}

fn on_off(value: &str) -> Option<bool> {
    match value {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

/// A user-typed path, relative to the working directory unless absolute.
fn resolve_path(s: &InterpreterSession, raw: &str) -> PathBuf {
    let cleaned = unquote(raw).replace('\\', "/");
    let path = Path::new(&cleaned);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        s.pwd.join(path)
    }
}

/// Set every parameter matching `pattern` to `value`, reporting how many
/// changed.
pub(crate) fn change_parameters(s: &mut InterpreterSession, pattern: &str, value: &str) -> HcomResult<()> {
    require_model(s)?;
    let targets: Vec<String> = {
        let resolver = s.resolver();
        let mut displays = resolver.matching_parameters(pattern);
        if displays.is_empty() {
            displays.push(pattern.to_owned());
        }
        displays
            .iter()
            .filter_map(|d| resolver.parameter_long_name(d))
            .collect()
    };
    if targets.is_empty() {
        return Err(HcomError::Resolution("Parameter(s) not found.".to_owned()));
    }
    let mut changed = 0;
    let mut failed = 0;
    for long in &targets {
        match s.model.set_parameter(long, value) {
            Ok(()) => changed += 1,
            Err(e) => {
                debug!(parameter = %long, error = %e, "parameter rejected");
                failed += 1;
            }
        }
    }
    if changed > 0 {
        s.print(&format!("Changed value for {changed} parameters."));
    }
    if failed > 0 {
        return Err(host(format!("Failed to change value for {failed} parameters.")));
    }
    Ok(())
}

/// Replace each `$expr$` with its value; failed evaluations stay verbatim.
fn interpolate(s: &mut InterpreterSession, text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('$') {
        let after = &rest[start + 1..];
        let Some(len) = after.find('$') else {
            break;
        };
        let expr = &after[..len];
        out.push_str(&rest[..start]);
        match s.evaluate(expr, None) {
            ScriptValue::Scalar(x) => out.push_str(&format_scalar(x)),
            ScriptValue::Vector(v) => out.push_str(&format_samples(&v.borrow().data)),
            _ => {
                out.push('$');
                out.push_str(expr);
                out.push('$');
            }
        }
        rest = &after[len + 1..];
    }
    out.push_str(rest);
    out
}

// ── Simulation ────────────────────────────────────────────────────────────────

fn sim(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    let all = match args.as_slice() {
        [] => false,
        [a] if a == "all" => true,
        [_] => return Err(HcomError::Argument("Unknown argument.".to_owned())),
        _ => return Err(HcomError::wrong_arg_count()),
    };
    s.model.simulate(all).map_err(host)
}

fn chss(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let cleaned = rest.replace('"', "");
    let args: Vec<&str> = cleaned.split_whitespace().collect();
    if args.len() != 3 && args.len() != 4 {
        return Err(HcomError::wrong_arg_count());
    }
    require_model(s)?;
    let failed = || host("Failed to apply simulation settings.".to_owned());
    let mut settings = s.model.simulation_settings();
    settings.start = evaluate_scalar(s, args[0]).ok_or_else(failed)?;
    settings.step = evaluate_scalar(s, args[1]).ok_or_else(failed)?;
    settings.stop = evaluate_scalar(s, args[2]).ok_or_else(failed)?;
    if let Some(samples) = args.get(3) {
        settings.samples = Some(samples.parse::<usize>().map_err(|_| failed())?);
    }
    s.model.set_simulation_settings(settings).map_err(host)
}

fn require_component(s: &InterpreterSession, name: &str) -> HcomResult<()> {
    require_model(s)?;
    if s.model.component_names().iter().any(|c| c == name) {
        Ok(())
    } else {
        Err(HcomError::Resolution("Component not found.".to_owned()))
    }
}

fn chts(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    require_model(s)?;
    let args = split_command_arguments(rest);
    expect_args(&args, 2)?;
    let component = unquote(&args[0]).to_owned();
    let step = evaluate_scalar(s, &args[1])
        .ok_or_else(|| HcomError::Argument("Second argument is not a number.".to_owned()))?;
    require_component(s, &component)?;
    s.model.set_time_step(&component, step).map_err(host)?;
    s.print(&format!("Setting time step of {component} to {}", format_scalar(step)));
    Ok(())
}

fn ints(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 1)?;
    let component = unquote(&args[0]).to_owned();
    require_component(s, &component)?;
    s.model.inherit_time_step(&component).map_err(host)?;
    s.print(&format!("Setting time step of {component} to inherited."));
    Ok(())
}

fn semt(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    if args.is_empty() || args.len() > 3 {
        return Err(HcomError::wrong_arg_count());
    }
    let on = on_off(&args[0])
        .ok_or_else(|| HcomError::Argument("Unknown argument, use \"on\" or \"off\"".to_owned()))?;
    let mut numbers = Vec::new();
    for (i, a) in args.iter().enumerate().skip(1) {
        let n = a.parse::<i64>().map_err(|_| {
            HcomError::Argument(format!(
                "Unknown data type. Only int is supported for argument {}.",
                i + 1
            ))
        })?;
        numbers.push(n);
    }
    s.model
        .set_preference("multicore", if on { "on" } else { "off" })
        .map_err(host)?;
    for (key, n) in ["threads", "algorithm"].iter().zip(numbers) {
        s.model.set_preference(key, &n.to_string()).map_err(host)?;
    }
    Ok(())
}

// ── Parameters ────────────────────────────────────────────────────────────────

fn dipa(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let filter = if rest.is_empty() { "*" } else { rest };
    let rows: Vec<(String, String)> = {
        let resolver = s.resolver();
        resolver
            .matching_parameters(filter)
            .into_iter()
            .map(|p| {
                let value = resolver.parameter_value(&p).unwrap_or_else(|| "NaN".to_owned());
                (p, value)
            })
            .collect()
    };
    let width = rows.iter().map(|(p, _)| p.len()).max().unwrap_or(0) + 3;
    for (name, value) in rows {
        s.print(&format!("{name:<width$}{value}"));
    }
    Ok(())
}

fn adpa(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 2)?;
    require_model(s)?;
    s.model
        .add_system_parameter(unquote(&args[0]), unquote(&args[1]))
        .map_err(host)
}

fn chpa(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 2)?;
    require_model(s)?;
    let raw = unquote(&args[1]);
    // A system-parameter name or unevaluable text is stored as written.
    let value = if s.model.system_parameter_names().iter().any(|p| p == raw) {
        raw.to_owned()
    } else {
        match evaluate_scalar(s, raw) {
            Some(x) => x.to_string(),
            None => raw.to_owned(),
        }
    };
    change_parameters(s, &args[0], &value)
}

fn sapa(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 1)?;
    require_model(s)?;
    let path = resolve_path(s, &args[0]);
    s.model.save_parameters(&path).map_err(host)
}

fn repa(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 1)?;
    require_model(s)?;
    let path = resolve_path(s, &args[0]);
    let applied = s.model.load_parameters(&path).map_err(host)?;
    debug!(path = %path.display(), applied, "parameter set loaded");
    Ok(())
}

// ── Variables ─────────────────────────────────────────────────────────────────

fn disp(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    if split_command_arguments(rest).len() > 1 {
        return Err(HcomError::wrong_arg_count());
    }
    let filter = if rest.is_empty() { "*@H" } else { rest };
    let names = s.resolver().matching_variables(filter).map_err(HcomError::Argument)?;
    for name in names {
        s.print(&name);
    }
    Ok(())
}

/// Index text to a sample index, tolerating float noise.
fn sample_index(value: f64) -> Option<usize> {
    let idx = (value + 0.01).floor();
    (idx >= 0.0).then_some(idx as usize)
}

fn peek(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 2)?;
    let vector = s
        .find_vector(&args[0])
        .ok_or_else(|| HcomError::Resolution(format!("Data variable: {} not found", args[0])))?;
    let index = evaluate_scalar(s, &args[1])
        .and_then(sample_index)
        .ok_or_else(|| HcomError::Argument(format!("Illegal index value: {}", args[1])))?;
    let value = vector.borrow().peek(index).map_err(HcomError::Argument)?;
    s.print(&format_scalar(value));
    s.ans = ScriptValue::Scalar(value);
    Ok(())
}

fn poke(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 3)?;
    let vector = s
        .find_vector(&args[0])
        .ok_or_else(|| HcomError::Resolution("Data variable not found.".to_owned()))?;
    let illegal = || HcomError::Argument("Illegal value or index!".to_owned());
    let index = evaluate_scalar(s, &args[1]).and_then(sample_index).ok_or_else(illegal)?;
    let value = evaluate_scalar(s, &args[2]).ok_or_else(illegal)?;
    let stored = vector.borrow_mut().poke(index, value).map_err(HcomError::Argument)?;
    s.print(&format_scalar(stored));
    s.ans = ScriptValue::Scalar(stored);
    Ok(())
}

fn alias(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 2)?;
    require_model(s)?;
    let variable = s.names.to_long_name(unquote(&args[0]));
    let name = &args[1];
    match s.model.set_alias(&variable, name) {
        Ok(()) => {
            s.info(&format!("Successfully assigned variable alias {name}"));
            Ok(())
        }
        Err(e) => {
            debug!(alias = %name, error = %e, "alias rejected");
            Err(host(format!("Failed to assign variable alias {name}")))
        }
    }
}

fn rmvar(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    if args.is_empty() {
        return Err(HcomError::wrong_arg_count());
    }
    for pattern in &args {
        let matches = s.resolver().matching_variables(pattern).map_err(HcomError::Argument)?;
        for name in matches {
            let (base, suffix) = split_generation(&name);
            let long = s.resolver().long_variable_name(base);
            let generation = match suffix.map(parse_generation) {
                Some(Ok(GenerationSpecifier::Explicit(g))) => Some(g),
                _ => None,
            };
            if s.store.remove(&long, generation) {
                debug!(variable = %long, ?generation, "removed");
            }
        }
    }
    Ok(())
}

fn info(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 1)?;
    let name = &args[0];
    if let Some(v) = s.find_vector(name) {
        let text = {
            let v = v.borrow();
            let kind = if v.time.is_some() { "TimeDomain" } else { "Vector" };
            let generations = s.store.generations(&v.name).len();
            format!(
                "\n       Name: {}\n       Type: {kind}\n     Length: {}\nGenerations: {generations}",
                v.name,
                v.len()
            )
        };
        s.print(&text);
        return Ok(());
    }
    if let Some(x) = s.local(name) {
        s.print(&format!(
            "\n       Name: {name}\n       Type: Scalar\n      Value: {}",
            format_scalar(x)
        ));
        return Ok(());
    }
    Err(HcomError::Resolution(format!("Could not find a variable matching: {name}")))
}

fn abs(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 1)?;
    if let Some(v) = s.find_vector(&args[0]) {
        v.borrow_mut().abs_in_place();
        s.warning(
            "This 'abs' command will irreversibly turn your vector elements into absolute values, you should use the abs() function instead!",
        );
        return Ok(());
    }
    match evaluate_scalar(s, &args[0]) {
        Some(x) => {
            let value = x.abs();
            s.print(&format_scalar(value));
            s.ans = ScriptValue::Scalar(value);
            Ok(())
        }
        None => {
            s.ans = ScriptValue::Undefined;
            Err(HcomError::Resolution("Variable not found.".to_owned()))
        }
    }
}

/// `Component#Port` names matching a dotted port filter such as `*.P1`.
fn matching_ports(s: &InterpreterSession, filter: &str) -> HcomResult<Vec<String>> {
    let long = unquote(filter).replace('.', "#");
    let pattern = Pattern::wildcard(&long).map_err(|e| HcomError::Argument(e.to_string()))?;
    let ports = pattern.filter(&s.model.port_names());
    if ports.is_empty() {
        return Err(HcomError::Resolution("Port(s) not found.".to_owned()));
    }
    Ok(ports)
}

fn set_port_logging(s: &mut InterpreterSession, ports: &[String], enabled: bool) -> HcomResult<()> {
    for port in ports {
        let Some((component, name)) = port.split_once('#') else {
            continue;
        };
        s.model.set_logging(component, name, enabled).map_err(host)?;
    }
    Ok(())
}

fn dlog(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    let keep_aliases = match args.as_slice() {
        [_] => false,
        [_, flag] if flag == "-noalias" => true,
        [_, _] => return Err(HcomError::Argument("Unknown argument.".to_owned())),
        _ => return Err(HcomError::wrong_arg_count()),
    };
    require_model(s)?;
    let ports = matching_ports(s, &args[0])?;
    set_port_logging(s, &ports, false)?;
    if keep_aliases {
        // ports carrying an aliased variable stay logged
        let aliased: Vec<String> = s
            .model
            .alias_names()
            .iter()
            .filter_map(|a| s.model.full_name_from_alias(a))
            .filter_map(|full| {
                let mut parts = full.split('#');
                Some(format!("{}#{}", parts.next()?, parts.next()?))
            })
            .filter(|p| ports.contains(p))
            .collect();
        set_port_logging(s, &aliased, true)?;
    }
    Ok(())
}

fn elog(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 1)?;
    require_model(s)?;
    let ports = matching_ports(s, &args[0])?;
    set_port_logging(s, &ports, true)
}

// ── Model ─────────────────────────────────────────────────────────────────────

fn load(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 1)?;
    let path = resolve_path(s, &args[0]);
    s.model.load_model(&path).map_err(host)
}

fn reco(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 2)?;
    require_model(s)?;
    s.model
        .rename_component(unquote(&args[0]), unquote(&args[1]))
        .map_err(host)
}

fn rmco(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 1)?;
    require_model(s)?;
    let pattern = Pattern::wildcard(unquote(&args[0])).map_err(|e| HcomError::Argument(e.to_string()))?;
    let doomed = pattern.filter(&s.model.component_names());
    if doomed.is_empty() {
        return Err(HcomError::Resolution("Component not found.".to_owned()));
    }
    for name in doomed {
        s.model.remove_component(&name).map_err(host)?;
    }
    Ok(())
}

fn adco(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    match args.len() {
        2 => {}
        6 if matches!(args[2].as_str(), "-a" | "-e" | "-w" | "-n" | "-s") => {
            debug!(placement = %args[2], "placement arguments ignored");
        }
        _ => return Err(HcomError::wrong_arg_count()),
    }
    require_model(s)?;
    s.model
        .add_component(unquote(&args[0]), unquote(&args[1]))
        .map_err(host)
}

fn coco(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 4)?;
    require_model(s)?;
    let a: Vec<&str> = args.iter().map(|x| unquote(x)).collect();
    s.model.connect(a[0], a[1], a[2], a[3]).map_err(host)
}

fn crmo(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    if !rest.is_empty() {
        return Err(HcomError::wrong_arg_count());
    }
    s.model.new_model();
    Ok(())
}

// ── Files ─────────────────────────────────────────────────────────────────────

fn script_candidates(s: &InterpreterSession, raw: &str) -> Vec<PathBuf> {
    let cleaned = unquote(raw).replace('\\', "/");
    let direct = PathBuf::from(&cleaned);
    let relative = s.pwd.join(&cleaned);
    vec![
        direct.clone(),
        PathBuf::from(format!("{}.hcom", direct.display())),
        relative.clone(),
        PathBuf::from(format!("{}.hcom", relative.display())),
    ]
}

fn exec(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    let Some(first) = args.first() else {
        return Err(HcomError::Argument("Too few arguments.".to_owned()));
    };
    let path = script_candidates(s, first)
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| HcomError::Io("Unable to read file.".to_owned()))?;
    let script_args: Vec<String> = args[1..].iter().map(|a| unquote(a).to_owned()).collect();
    s.run_file(&path, &script_args)?;
    Ok(())
}

fn wrhi(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 1)?;
    let path = resolve_path(s, &args[0]);
    let mut text = s.history.join("\n");
    text.push('\n');
    std::fs::write(&path, text).map_err(|e| {
        debug!(path = %path.display(), error = %e, "history write failed");
        HcomError::Io("Unable to write to file.".to_owned())
    })
}

fn pwd(s: &mut InterpreterSession, _rest: &str) -> HcomResult<()> {
    let dir = s.pwd.display().to_string();
    s.print(&dir);
    Ok(())
}

fn mwd(s: &mut InterpreterSession, _rest: &str) -> HcomResult<()> {
    let dir = s.model.model_directory().ok_or_else(HcomError::no_model)?;
    s.print(&dir.display().to_string());
    Ok(())
}

fn cd(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 1)?;
    if args[0] == "-mwd" {
        let dir = s.model.model_directory().ok_or_else(HcomError::no_model)?;
        s.pwd = dir;
    } else {
        let target = resolve_path(s, &args[0]);
        if !target.is_dir() {
            return Err(HcomError::Argument("Illegal directory.".to_owned()));
        }
        s.pwd = std::fs::canonicalize(&target).unwrap_or(target);
    }
    let dir = s.pwd.display().to_string();
    s.print(&dir);
    Ok(())
}

fn ls(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    if args.len() > 1 {
        return Err(HcomError::wrong_arg_count());
    }
    let filter = args.first().map(|a| unquote(a).to_owned()).unwrap_or_else(|| "*".to_owned());
    let entries = std::fs::read_dir(&s.pwd).map_err(|e| HcomError::Io(e.to_string()))?;
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| wildcard_match(&filter, n))
        .collect();
    names.sort();
    for name in names {
        s.print(&name);
    }
    Ok(())
}

// ── Log files ─────────────────────────────────────────────────────────────────

fn sapl(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let mut args = split_command_arguments(rest);
    let csv = args.iter().any(|a| a == "-csv");
    args.retain(|a| a != "-csv");
    if args.len() < 2 {
        return Err(HcomError::Argument("Too few arguments.".to_owned()));
    }
    let format = if csv { LogFileFormat::Csv } else { LogFileFormat::Plo };
    let path = resolve_path(s, &args[0]);
    let filters: Vec<String> = args[1..].iter().map(|a| unquote(a).to_owned()).collect();

    // `*@g` exports one whole generation
    if let [only] = filters.as_slice() {
        if let Some(spec) = only.strip_prefix("*@") {
            let generation = match parse_generation(spec) {
                Ok(GenerationSpecifier::Explicit(g)) => Some(g),
                Ok(GenerationSpecifier::Lowest) => s.store.lowest_generation(),
                Ok(GenerationSpecifier::Highest | GenerationSpecifier::Latest) => s.store.highest_generation(),
                Ok(GenerationSpecifier::All) => {
                    return Err(HcomError::Argument(
                        "sapl can not export different generations to the same file".to_owned(),
                    ))
                }
                Err(_) => {
                    return Err(HcomError::Argument("Could not parse generation specifier".to_owned()))
                }
            };
            let vectors = generation.map(|g| s.store.generation_vectors(g)).unwrap_or_default();
            if vectors.is_empty() {
                return Err(HcomError::Resolution("No matching variables found.".to_owned()));
            }
            return s.store.export_log(&path, &vectors, format).map_err(HcomError::Io);
        }
    }

    let mut vectors = Vec::new();
    for filter in &filters {
        let names = s.resolver().matching_variables(filter).map_err(HcomError::Argument)?;
        for name in names {
            if let Some(v) = s.find_vector(&name) {
                vectors.push(v);
            }
        }
    }
    if vectors.is_empty() {
        return Err(HcomError::Resolution("No matching variables found.".to_owned()));
    }
    debug!(path = %path.display(), variables = vectors.len(), ?format, "exporting log data");
    s.store.export_log(&path, &vectors, format).map_err(HcomError::Io)
}

fn repl(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 1)?;
    let path = resolve_path(s, &args[0]);
    if !path.is_file() {
        return Err(HcomError::Io("File not found!".to_owned()));
    }
    let format = match LogFileFormat::from_extension(&path) {
        Some(f) => f,
        None => {
            s.warning("Unknown file extension, assuming that it is a PLO file.");
            LogFileFormat::Plo
        }
    };
    let generation = s.store.import_log(&path, format).map_err(HcomError::Io)?;
    debug!(path = %path.display(), generation, "imported log data");
    Ok(())
}

// ── Other ─────────────────────────────────────────────────────────────────────

fn help(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let topic: String = rest.chars().filter(|c| !c.is_whitespace()).collect();
    if topic.is_empty() {
        let text = overview_help(s);
        s.print(HELP_RULE);
        s.print(" Hopsan HCOM Terminal v0.1");
        s.print(&text);
        s.print(" Type: \"help [command]\" for more information about a specific command.");
        s.print(HELP_RULE);
        return Ok(());
    }
    if let Some(func) = topic.strip_suffix("()") {
        if let Some(entry) = s.functionoids.help_entries().get(func) {
            let text = detail_help(&entry.description, &entry.help);
            s.print(&text);
            return Ok(());
        }
    }
    match find_command(&topic) {
        Some(spec) => {
            s.print(&detail_help(spec.description, spec.help));
            Ok(())
        }
        None => Err(HcomError::Resolution(
            "Command not found or no help available for this command.".to_owned(),
        )),
    }
}

fn overview_help(s: &InterpreterSession) -> String {
    let width = COMMANDS.iter().map(|c| c.name.len()).max().unwrap_or(0) + 4;
    let mut groups: Vec<Option<&str>> = Vec::new();
    for c in COMMANDS.iter().filter(|c| c.group.is_some()) {
        if !groups.contains(&c.group) {
            groups.push(c.group);
        }
    }
    groups.push(None);

    let mut out = String::new();
    for group in groups {
        match group {
            Some(g) => out.push_str(&format!("\n {g}:\n\n")),
            None => out.push_str("\n Other commands:\n\n"),
        }
        for c in COMMANDS.iter().filter(|c| c.group == group) {
            out.push_str(&format!("   {:<width$}{}\n", c.name, c.description));
        }
    }
    out.push_str("\n Custom Functions:\n\n");
    for (name, entry) in s.functionoids.help_entries() {
        let pad = width.saturating_sub(name.len() + 2);
        out.push_str(&format!("   {name}(){}{}\n", " ".repeat(pad), entry.description));
    }
    out
}

fn detail_help(description: &str, help: &str) -> String {
    format!(
        "{HELP_RULE}\n {description}\n {}\n{HELP_RULE}",
        help.replace('\n', "\n ")
    )
}

fn print(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    let Some(first) = args.first() else {
        return Err(HcomError::wrong_arg_count());
    };
    let flag = matches!(first.as_str(), "-e" | "-w" | "-i").then(|| first.clone());
    let text = match &flag {
        Some(f) => rest[f.len()..].trim_start(),
        None => rest,
    };
    if text.len() < 2 || !text.starts_with('"') || !text.ends_with('"') {
        return Err(HcomError::Argument("Expected a string enclosed in \" \".".to_owned()));
    }
    let body = interpolate(s, &text[1..text.len() - 1]);
    match flag.as_deref() {
        Some("-e") => s.error(&body),
        Some("-w") => s.warning(&body),
        Some("-i") => s.info(&body),
        _ => s.print(&body),
    }
    Ok(())
}

fn echo(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 1)?;
    let on = on_off(&args[0])
        .ok_or_else(|| HcomError::Argument("Unknown argument, use \"on\" or \"off\"".to_owned()))?;
    s.echo = on;
    Ok(())
}

fn call(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args = split_command_arguments(rest);
    expect_args(&args, 1)?;
    s.call_user_function(&args[0])?;
    s.ans = ScriptValue::Undefined;
    Ok(())
}

fn set(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    let args: Vec<&str> = rest.split(' ').filter(|a| !a.is_empty()).collect();
    let [pref, value] = args.as_slice() else {
        return Err(HcomError::wrong_arg_count());
    };
    let unknown_value = || HcomError::Argument("Unknown value.".to_owned());
    match *pref {
        "multicore" | "cachetodisk" => {
            on_off(value).ok_or_else(unknown_value)?;
        }
        "threads" | "algorithm" | "generationlimit" | "samples" => {
            value.parse::<i64>().map_err(|_| unknown_value())?;
        }
        _ => return Err(HcomError::Argument("Unknown command.".to_owned())),
    }
    s.model.set_preference(pref, value).map_err(host)
}

fn opt(s: &mut InterpreterSession, rest: &str) -> HcomResult<()> {
    if !s.optimizer.accepts_commands() {
        s.info("This console does not accept optimization commands.\nUse the optimization dialog instead.");
        return Ok(());
    }
    require_model(s)?;
    let args = split_command_arguments(rest);
    let words: Vec<&str> = args.iter().map(String::as_str).collect();
    match words.as_slice() {
        ["set", "obj", ..] if words.len() == 4 => {
            let idx = optimizer_index(number_arg(s, &args, 2)?)?;
            let value = number_arg(s, &args, 3)?;
            s.optimizer.set_objective(idx, value).map_err(host)
        }
        ["set", "limits", ..] if words.len() == 5 => {
            let idx = optimizer_index(number_arg(s, &args, 2)?)?;
            let min = number_arg(s, &args, 3)?;
            let max = number_arg(s, &args, 4)?;
            s.optimizer.set_limits(idx, min, max).map_err(host)
        }
        _ => Err(HcomError::Argument("Unknown command.".to_owned())),
    }
}

fn number_arg(s: &mut InterpreterSession, args: &[String], i: usize) -> HcomResult<f64> {
    evaluate_scalar(s, &args[i])
        .ok_or_else(|| HcomError::Argument(format!("Argument number {i} must be a number.")))
}

fn optimizer_index(x: f64) -> HcomResult<usize> {
    if x >= 0.0 {
        Ok(x as usize)
    } else {
        Err(HcomError::Argument("Index out of range.".to_owned()))
    }
}

fn exit(s: &mut InterpreterSession, _rest: &str) -> HcomResult<()> {
    s.exit_requested = true;
    s.model.request_exit();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{BufferSink, ConsoleLine, MemoryLogStore, MemoryModel, MemoryOptimizer};

    fn model() -> MemoryModel {
        MemoryModel::new()
            .with_component("Mass", "MechanicTranslationalMass", &[("m", "100"), ("B", "10")])
            .with_component("Spring", "MechanicTranslationalSpring", &[("k", "500")])
            .with_system_parameter("Gain", "2")
            .with_ports("Mass", &["P1", "P2"])
            .with_ports("Spring", &["P1"])
    }

    fn session() -> (InterpreterSession, BufferSink) {
        let (mut s, sink) = InterpreterSession::buffered_with(model(), MemoryLogStore::new());
        let t = s.store_mut().define("time", Some(0), vec![0.0, 0.5, 1.0], None);
        s.store_mut()
            .define("Mass#P1#Position", Some(0), vec![-1.0, 2.0, -3.0], Some(t));
        (s, sink)
    }

    fn run(lines: &[&str]) -> (InterpreterSession, BufferSink) {
        let (mut s, sink) = session();
        sink.take();
        for l in lines {
            s.execute(l);
        }
        (s, sink)
    }

    fn output(lines: &[&str]) -> Vec<String> {
        run(lines).1.texts()
    }

    #[test]
    fn every_command_is_unique() {
        let mut names: Vec<_> = COMMANDS.iter().map(|c| c.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), COMMANDS.len());
    }

    #[test]
    fn semicolons_split_outside_quotes() {
        let (s, sink) = run(&["a = 1; b = 2", "print \"x;y\""]);
        assert_eq!(s.local("a"), Some(1.0));
        assert_eq!(s.local("b"), Some(2.0));
        assert_eq!(sink.texts().last().map(String::as_str), Some("x;y"));
    }

    #[test]
    fn unknown_command() {
        let (_, sink) = run(&["frobnicate now"]);
        assert_eq!(
            sink.errors(),
            vec!["Unknown command or failed to evaluate: frobnicate now"]
        );
    }

    #[test]
    fn help_overview_layout() {
        let out = output(&["help"]);
        assert_eq!(out[0], HELP_RULE);
        assert_eq!(out[1], " Hopsan HCOM Terminal v0.1");
        let body = &out[2];
        let sim_group = body.find("\n Simulation Commands:\n\n").expect("group");
        let other = body.find("\n Other commands:\n\n").expect("other");
        let funcs = body.find("\n Custom Functions:\n\n").expect("functions");
        assert!(sim_group < other && other < funcs);
        assert!(body.contains("   sim      Simulates current model (or all open models)\n"));
        assert!(body.contains("   aver()  "));
        assert_eq!(out.last().map(String::as_str), Some(HELP_RULE));
    }

    #[test]
    fn help_for_command_and_function() {
        let out = output(&["help chpa", "help ones()", "help nosuch"]);
        assert_eq!(
            out[0],
            format!("{HELP_RULE}\n Change parameter value\n  Usage: chpa [parameter] [value]\n{HELP_RULE}")
        );
        assert!(out[1].contains(" Usage: ones(size)"));
        assert_eq!(out[2], "Command not found or no help available for this command.");
    }

    #[test]
    fn sim_arguments() {
        let (s, sink) = run(&["sim", "sim all", "sim some", "sim a b"]);
        assert_eq!(s.model().last_simulation_time(), Some(10.0));
        assert_eq!(sink.errors(), vec!["Unknown argument.", "Wrong number of arguments."]);
    }

    #[test]
    fn chss_evaluates_each_value() {
        let (s, sink) = run(&["t = 2", "chss 0 t/1000 t*3 500", "chss 0 1", "chss 0 x 1"]);
        let settings = s.model().simulation_settings();
        assert_eq!((settings.start, settings.step, settings.stop), (0.0, 0.002, 6.0));
        assert_eq!(settings.samples, Some(500));
        assert_eq!(
            sink.errors(),
            vec!["Wrong number of arguments.", "Failed to apply simulation settings."]
        );
    }

    #[test]
    fn time_step_commands() {
        let out = output(&["chts Mass 1e-4", "ints Mass", "chts Ghost 1", "chts Mass x"]);
        assert_eq!(out[0], "Setting time step of Mass to 0.0001");
        assert_eq!(out[1], "Setting time step of Mass to inherited.");
        assert_eq!(out[2], "Component not found.");
        assert_eq!(out[3], "Second argument is not a number.");
    }

    #[test]
    fn semt_validates_arguments() {
        let (_, sink) = run(&["semt on 4 2", "semt maybe", "semt on x", "semt off 2 y"]);
        assert_eq!(
            sink.errors(),
            vec![
                "Unknown argument, use \"on\" or \"off\"",
                "Unknown data type. Only int is supported for argument 2.",
                "Unknown data type. Only int is supported for argument 3.",
            ]
        );
    }

    #[test]
    fn dipa_aligns_values() {
        let out = output(&["dipa Mass.*"]);
        assert_eq!(out, vec!["Mass.B   10", "Mass.m   100"]);
    }

    #[test]
    fn chpa_changes_matching_parameters() {
        let (s, sink) = run(&["chpa Mass.* 7*2", "chpa Spring.k Gain", "chpa Ghost.x 1", "chpa Mass.B mB"]);
        assert_eq!(s.model().parameter_value("Mass#m").as_deref(), Some("14"));
        assert_eq!(s.model().parameter_value("Mass#B").as_deref(), Some("mB"));
        assert_eq!(s.model().parameter_value("Spring#k").as_deref(), Some("Gain"));
        assert_eq!(sink.errors(), vec!["Parameter(s) not found."]);
        assert_eq!(sink.texts()[0], "Changed value for 2 parameters.");
    }

    #[test]
    fn adpa_adds_system_parameter() {
        let (s, _) = run(&["adpa Offset 3.5"]);
        assert_eq!(s.model().parameter_value("Offset").as_deref(), Some("3.5"));
    }

    #[test]
    fn disp_lists_variables() {
        let out = output(&["disp", "disp Mass.*", "disp a b"]);
        assert_eq!(out[..3].to_vec(), vec!["Mass.P1.x@1", "time@1", "Mass.P1.x"]);
        assert_eq!(out[3], "Wrong number of arguments.");
    }

    #[test]
    fn peek_and_poke() {
        let (s, sink) = run(&["peek Mass.P1.x 7", "peek Ghost 0", "peek Mass.P1.x 1", "poke Mass.P1.x 0 9"]);
        let texts = sink.texts();
        assert_eq!(texts[2], "2");
        assert_eq!(texts[3], "9");
        assert_eq!(s.ans(), &ScriptValue::Scalar(9.0));
        assert_eq!(
            sink.errors(),
            vec!["Index out of range", "Data variable: Ghost not found"]
        );
        let v = s.store().latest("Mass#P1#Position").unwrap();
        assert_eq!(v.borrow().data[0], 9.0);
    }

    #[test]
    fn info_describes_vectors_and_scalars() {
        let out = output(&["info Mass.P1.x", "k = 4", "info k", "info nope"]);
        assert_eq!(
            out[0],
            "\n       Name: Mass#P1#Position\n       Type: TimeDomain\n     Length: 3\nGenerations: 1"
        );
        assert_eq!(out[2], "\n       Name: k\n       Type: Scalar\n      Value: 4");
        assert_eq!(out[3], "Could not find a variable matching: nope");
    }

    #[test]
    fn abs_command_is_in_place() {
        let (s, sink) = run(&["abs Mass.P1.x", "abs -3"]);
        let v = s.store().latest("Mass#P1#Position").unwrap();
        assert_eq!(v.borrow().data, vec![1.0, 2.0, 3.0]);
        assert!(matches!(sink.lines()[0], ConsoleLine::Warning(_)));
        assert_eq!(sink.texts()[1], "3");
    }

    #[test]
    fn rmvar_removes_matches() {
        let (s, _) = run(&["v = ones(2)", "rmvar v Mass.*"]);
        assert!(s.store().latest("v").is_none());
        assert!(s.store().latest("Mass#P1#Position").is_none());
        assert!(s.store().latest("time").is_some());
    }

    #[test]
    fn alias_registers_through_model() {
        let (mut s, sink) = run(&["alias Mass.P1.x pos"]);
        assert!(matches!(sink.lines()[0], ConsoleLine::Info(_)));
        assert_eq!(s.evaluate("peek(pos, 1)", None), ScriptValue::Scalar(2.0));
    }

    #[test]
    fn component_commands() {
        let (s, sink) = run(&[
            "adco MechanicTranslationalMass Mass2",
            "coco Mass P1 Mass2 P2",
            "reco Mass2 Load",
            "rmco Spr*",
            "rmco Nothing*",
        ]);
        let names = s.model().component_names();
        assert_eq!(names, vec!["Load", "Mass"]);
        assert_eq!(sink.errors(), vec!["Component not found."]);
    }

    #[test]
    fn print_flags_and_interpolation() {
        let (_, sink) = run(&[
            "x = 12",
            "print -w \"x=$x$\"",
            "print \"$nope$ and $x*2$\"",
            "print unquoted",
            "print",
        ]);
        let lines = sink.lines();
        assert_eq!(lines[1], ConsoleLine::Warning("x=12".into()));
        assert_eq!(lines[2], ConsoleLine::Print("$nope$ and 24".into()));
        assert_eq!(
            sink.errors(),
            vec!["Expected a string enclosed in \" \".", "Wrong number of arguments."]
        );
    }

    #[test]
    fn print_vector_data() {
        let out = output(&["print \"$Mass.P1.x$\""]);
        assert_eq!(out, vec!["-1 2 -3"]);
    }

    #[test]
    fn echo_toggles_output() {
        let (_, sink) = run(&["echo off", "x = 1", "print -i \"hidden\"", "echo on", "y = 2", "echo loud"]);
        assert_eq!(
            sink.texts(),
            vec!["Assigning scalar y with 2", "Unknown argument, use \"on\" or \"off\""]
        );
    }

    #[test]
    fn set_preferences() {
        let (_, sink) = run(&["set multicore on", "set threads four", "set colour blue", "set samples"]);
        assert_eq!(
            sink.errors(),
            vec!["Unknown value.", "Unknown command.", "Wrong number of arguments."]
        );
    }

    #[test]
    fn opt_requires_bridge() {
        let (_, sink) = run(&["opt set obj 0 1"]);
        assert!(matches!(sink.lines()[0], ConsoleLine::Info(_)));

        let (s, sink) = session();
        let mut s = s.with_optimizer(Box::new(MemoryOptimizer::new(2, 1, 1)));
        s.execute("opt set obj 1 4.5");
        s.execute("opt set limits 0 -1 1");
        s.execute("opt set obj 5 1");
        s.execute("opt set obj x 1");
        assert_eq!(s.evaluate("obj(1)", None), ScriptValue::Scalar(4.5));
        assert_eq!(
            sink.errors(),
            vec!["Index out of range.", "Argument number 2 must be a number."]
        );
    }

    #[test]
    fn call_unknown_function() {
        let (_, sink) = run(&["call nothing", "call"]);
        assert_eq!(sink.errors(), vec!["Undefined function.", "Wrong number of arguments."]);
    }

    #[test]
    fn exit_flags_session() {
        let (s, _) = run(&["exit"]);
        assert!(s.exit_requested());
    }

    #[test]
    fn closed_model_reports() {
        let (mut s, sink) = InterpreterSession::buffered_with(MemoryModel::closed(), MemoryLogStore::new());
        s.execute("sim");
        s.execute("chpa a 1");
        s.execute("mwd");
        assert_eq!(sink.errors(), vec!["No model is open."; 3]);
    }

    #[test]
    fn exec_without_path() {
        let (_, sink) = run(&["exec", "exec /no/such/file"]);
        assert_eq!(sink.errors(), vec!["Too few arguments.", "Unable to read file."]);
    }

    fn in_tempdir() -> (InterpreterSession, BufferSink, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let (mut s, sink) = session();
        s.pwd = dir.path().to_path_buf();
        sink.take();
        (s, sink, dir)
    }

    #[test]
    fn sapl_plo_then_repl_adds_a_generation() {
        let (mut s, sink, dir) = in_tempdir();
        s.execute("sapl run.plo Mass.P1.x");
        assert!(dir.path().join("run.plo").is_file());
        s.execute("repl run.plo");
        assert!(sink.errors().is_empty(), "{:?}", sink.errors());
        assert_eq!(s.store().generations("Mass#P1#Position"), vec![0, 1]);
        let v = s.store().get("Mass#P1#Position", 1).unwrap();
        assert_eq!(v.borrow().data, vec![-1.0, 2.0, -3.0]);
        let time = v.borrow().time.clone().unwrap();
        assert_eq!(time.borrow().data, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn sapl_csv_whole_generation() {
        let (mut s, sink, dir) = in_tempdir();
        s.execute("sapl run.csv -csv *@1");
        let text = std::fs::read_to_string(dir.path().join("run.csv")).unwrap();
        assert_eq!(text, "time,,,0,0.5,1\nMass#P1#Position,,,-1,2,-3\n");
        s.execute("repl run.csv");
        assert!(sink.errors().is_empty(), "{:?}", sink.errors());
        assert_eq!(s.store().generations("time"), vec![0, 1]);
    }

    #[test]
    fn sapl_argument_errors() {
        let (mut s, sink, _dir) = in_tempdir();
        s.execute("sapl run.plo");
        s.execute("sapl run.plo *@a");
        s.execute("sapl run.plo Ghost");
        assert_eq!(
            sink.errors(),
            vec![
                "Too few arguments.",
                "sapl can not export different generations to the same file",
                "No matching variables found.",
            ]
        );
    }

    #[test]
    fn repl_missing_or_unknown_extension() {
        let (mut s, sink, dir) = in_tempdir();
        s.execute("repl nothing.plo");
        assert_eq!(sink.errors(), vec!["File not found!"]);
        sink.take();

        s.execute("sapl data.plo Mass.P1.x");
        std::fs::rename(dir.path().join("data.plo"), dir.path().join("data.txt")).unwrap();
        s.execute("repl data.txt");
        let lines = sink.lines();
        assert_eq!(
            lines[0],
            ConsoleLine::Warning("Unknown file extension, assuming that it is a PLO file.".into())
        );
        assert!(sink.errors().is_empty());
        assert_eq!(s.store().generations("Mass#P1#Position"), vec![0, 1]);
    }

    #[test]
    fn sapa_then_repa_restores_parameters() {
        let (mut s, sink, dir) = in_tempdir();
        s.execute("sapa set.txt");
        s.execute("chpa Spring.k 1");
        s.execute("repa set.txt");
        assert!(sink.errors().is_empty(), "{:?}", sink.errors());
        assert_eq!(s.model().parameter_value("Spring#k").as_deref(), Some("500"));
        assert!(dir.path().join("set.txt").is_file());
        s.execute("repa");
        s.execute("repa missing.txt");
        assert_eq!(sink.errors(), vec!["Wrong number of arguments.", "Unable to read file."]);
    }

    #[test]
    fn dlog_and_elog_toggle_ports() {
        let (mut s, sink) = session();
        s.execute("dlog Mass.*");
        assert_eq!(s.model().logging_enabled("Mass", "P1"), Some(false));
        assert_eq!(s.model().logging_enabled("Mass", "P2"), Some(false));
        assert_eq!(s.model().logging_enabled("Spring", "P1"), Some(true));
        s.execute("elog *.P1");
        assert_eq!(s.model().logging_enabled("Mass", "P1"), Some(true));
        assert_eq!(s.model().logging_enabled("Mass", "P2"), Some(false));
        assert!(sink.errors().is_empty());
    }

    #[test]
    fn dlog_noalias_keeps_aliased_ports() {
        let (mut s, sink) = session();
        s.execute("alias Mass.P1.x pos");
        s.execute("dlog * -noalias");
        assert_eq!(s.model().logging_enabled("Mass", "P1"), Some(true));
        assert_eq!(s.model().logging_enabled("Mass", "P2"), Some(false));
        assert_eq!(s.model().logging_enabled("Spring", "P1"), Some(false));
        sink.take();
        s.execute("dlog * -all");
        s.execute("elog Ghost.P1");
        s.execute("elog");
        assert_eq!(
            sink.errors(),
            vec!["Unknown argument.", "Port(s) not found.", "Wrong number of arguments."]
        );
    }
}

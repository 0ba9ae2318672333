//! In-process collaborators: a model held in maps, a log-data store held in
//! maps, a buffered console and optimizer stand-ins.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use super::{
    ConsoleSink, LogDataStore, LogVector, ModelHost, OptimizationBridge, SimulationSettings,
    VectorRef,
};

// ── MemoryLogStore ────────────────────────────────────────────────────────────

/// Series keyed by long name, then generation.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    series: BTreeMap<String, BTreeMap<usize, VectorRef>>,
    current: Option<usize>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a logged series.  A newer generation becomes the current one.
    pub fn insert(&mut self, vector: LogVector) -> VectorRef {
        let generation = vector.generation;
        let name = vector.name.clone();
        let handle = vector.into_ref();
        self.series
            .entry(name)
            .or_default()
            .insert(generation, handle.clone());
        if self.current.map_or(true, |c| generation > c) {
            self.current = Some(generation);
        }
        handle
    }

    pub fn set_current_generation(&mut self, generation: usize) {
        self.current = Some(generation);
    }

    fn all_generations(&self) -> impl Iterator<Item = usize> + '_ {
        self.series.values().flat_map(|g| g.keys().copied())
    }
}

impl LogDataStore for MemoryLogStore {
    fn variable_names(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    fn generations(&self, name: &str) -> Vec<usize> {
        self.series
            .get(name)
            .map(|g| g.keys().copied().collect())
            .unwrap_or_default()
    }

    fn get(&self, name: &str, generation: usize) -> Option<VectorRef> {
        self.series.get(name)?.get(&generation).cloned()
    }

    fn current_generation(&self) -> Option<usize> {
        self.current
    }

    fn lowest_generation(&self) -> Option<usize> {
        self.all_generations().min()
    }

    fn highest_generation(&self) -> Option<usize> {
        self.all_generations().max()
    }

    fn define(
        &mut self,
        name: &str,
        generation: Option<usize>,
        data: Vec<f64>,
        time: Option<VectorRef>,
    ) -> VectorRef {
        let generation = generation.or(self.current).unwrap_or(0);
        let handle = LogVector {
            name: name.to_owned(),
            generation,
            data,
            time,
            orphan: true,
            alias: None,
        }
        .into_ref();
        self.series
            .entry(name.to_owned())
            .or_default()
            .insert(generation, handle.clone());
        handle
    }

    fn remove(&mut self, name: &str, generation: Option<usize>) -> bool {
        let Some(gens) = self.series.get_mut(name) else {
            return false;
        };
        let removed = match generation {
            Some(g) => gens.remove(&g).is_some(),
            None => {
                let any = !gens.is_empty();
                gens.clear();
                any
            }
        };
        if gens.is_empty() {
            self.series.remove(name);
        }
        removed
    }

    fn begin_generation(&mut self) -> usize {
        let generation = self.highest_generation().max(self.current).map_or(0, |g| g + 1);
        self.current = Some(generation);
        generation
    }
}

// ── MemoryModel ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct Component {
    type_name: String,
    parameters: BTreeMap<String, String>,
    time_step: Option<f64>,
    /// Port name → logging enabled.
    ports: BTreeMap<String, bool>,
}

const PARAMETER_SET_HEADER: &str = "# hcom parameter set";

/// A model made of named components with string-valued parameters.
///
/// Simulating does not produce data; it counts runs and records the stop
/// time as the last simulation time.
#[derive(Debug)]
pub struct MemoryModel {
    open: bool,
    components: BTreeMap<String, Component>,
    system_parameters: BTreeMap<String, String>,
    aliases: BTreeMap<String, String>,
    connections: Vec<[String; 4]>,
    settings: SimulationSettings,
    last_time: Option<f64>,
    preferences: BTreeMap<String, String>,
    directory: Option<PathBuf>,
    simulations: usize,
    exit_requested: bool,
}

impl Default for MemoryModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryModel {
    /// An open, empty model.
    pub fn new() -> Self {
        MemoryModel {
            open: true,
            components: BTreeMap::new(),
            system_parameters: BTreeMap::new(),
            aliases: BTreeMap::new(),
            connections: Vec::new(),
            settings: SimulationSettings::default(),
            last_time: None,
            preferences: BTreeMap::new(),
            directory: None,
            simulations: 0,
            exit_requested: false,
        }
    }

    /// No model open; every model command reports so.
    pub fn closed() -> Self {
        MemoryModel {
            open: false,
            ..Self::new()
        }
    }

    pub fn with_component(mut self, name: &str, type_name: &str, parameters: &[(&str, &str)]) -> Self {
        self.components.insert(
            name.to_owned(),
            Component {
                type_name: type_name.to_owned(),
                parameters: parameters
                    .iter()
                    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                    .collect(),
                ..Default::default()
            },
        );
        self
    }

    /// Give `component` logged ports (added if missing).
    pub fn with_ports(mut self, component: &str, ports: &[&str]) -> Self {
        let comp = self.components.entry(component.to_owned()).or_default();
        for port in ports {
            comp.ports.insert((*port).to_owned(), true);
        }
        self
    }

    pub fn with_system_parameter(mut self, name: &str, value: &str) -> Self {
        self.system_parameters.insert(name.to_owned(), value.to_owned());
        self
    }

    pub fn with_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    pub fn simulation_count(&self) -> usize {
        self.simulations
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn preference(&self, name: &str) -> Option<&str> {
        self.preferences.get(name).map(String::as_str)
    }

    pub fn component_type(&self, name: &str) -> Option<&str> {
        self.components.get(name).map(|c| c.type_name.as_str())
    }

    /// `Some(None)` means the component inherits the system time step.
    pub fn component_time_step(&self, name: &str) -> Option<Option<f64>> {
        self.components.get(name).map(|c| c.time_step)
    }

    pub fn connections(&self) -> &[[String; 4]] {
        &self.connections
    }

    fn require_open(&self) -> Result<(), String> {
        if self.open {
            Ok(())
        } else {
            Err("No model is open.".to_owned())
        }
    }

    fn component_mut(&mut self, name: &str) -> Result<&mut Component, String> {
        self.components
            .get_mut(name)
            .ok_or_else(|| "Component not found.".to_owned())
    }
}

impl ModelHost for MemoryModel {
    fn has_model(&self) -> bool {
        self.open
    }

    fn parameter_names(&self) -> Vec<String> {
        self.components
            .iter()
            .flat_map(|(comp, c)| c.parameters.keys().map(move |p| format!("{comp}#{p}")))
            .collect()
    }

    fn system_parameter_names(&self) -> Vec<String> {
        self.system_parameters.keys().cloned().collect()
    }

    fn parameter_value(&self, name: &str) -> Option<String> {
        if !self.open {
            return None;
        }
        match name.split_once('#') {
            Some((comp, par)) => self.components.get(comp)?.parameters.get(par).cloned(),
            None => self.system_parameters.get(name).cloned(),
        }
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> Result<(), String> {
        self.require_open()?;
        let slot = match name.split_once('#') {
            Some((comp, par)) => self
                .components
                .get_mut(comp)
                .and_then(|c| c.parameters.get_mut(par)),
            None => self.system_parameters.get_mut(name),
        };
        match slot {
            Some(v) => {
                *v = value.to_owned();
                Ok(())
            }
            None => Err(format!("Parameter {name} not found.")),
        }
    }

    fn add_system_parameter(&mut self, name: &str, value: &str) -> Result<(), String> {
        self.require_open()?;
        self.system_parameters.insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    fn set_alias(&mut self, full_name: &str, alias: &str) -> Result<(), String> {
        self.require_open()?;
        if alias.is_empty() || alias.contains(|c: char| matches!(c, '#' | '.' | ' ')) {
            return Err(format!("Illegal alias name: {alias}"));
        }
        self.aliases.insert(alias.to_owned(), full_name.to_owned());
        Ok(())
    }

    fn full_name_from_alias(&self, alias: &str) -> Option<String> {
        self.aliases.get(alias).cloned()
    }

    fn alias_names(&self) -> Vec<String> {
        self.aliases.keys().cloned().collect()
    }

    fn component_names(&self) -> Vec<String> {
        self.components.keys().cloned().collect()
    }

    fn add_component(&mut self, type_name: &str, name: &str) -> Result<(), String> {
        self.require_open()?;
        if self.components.contains_key(name) {
            return Err(format!("Component {name} already exists."));
        }
        self.components.insert(
            name.to_owned(),
            Component {
                type_name: type_name.to_owned(),
                ..Default::default()
            },
        );
        Ok(())
    }

    fn remove_component(&mut self, name: &str) -> Result<(), String> {
        self.require_open()?;
        self.components
            .remove(name)
            .ok_or_else(|| "Component not found.".to_owned())?;
        self.connections
            .retain(|c| c[0] != name && c[2] != name);
        Ok(())
    }

    fn rename_component(&mut self, old: &str, new: &str) -> Result<(), String> {
        self.require_open()?;
        if self.components.contains_key(new) {
            return Err(format!("Component {new} already exists."));
        }
        let comp = self
            .components
            .remove(old)
            .ok_or_else(|| "Component not found.".to_owned())?;
        self.components.insert(new.to_owned(), comp);
        for c in &mut self.connections {
            for slot in [0, 2] {
                if c[slot] == old {
                    c[slot] = new.to_owned();
                }
            }
        }
        Ok(())
    }

    fn connect(&mut self, comp1: &str, port1: &str, comp2: &str, port2: &str) -> Result<(), String> {
        self.require_open()?;
        if !self.components.contains_key(comp1) || !self.components.contains_key(comp2) {
            return Err("Component not found.".to_owned());
        }
        for (comp, port) in [(comp1, port1), (comp2, port2)] {
            if let Some(c) = self.components.get_mut(comp) {
                c.ports.entry(port.to_owned()).or_insert(true);
            }
        }
        self.connections.push([
            comp1.to_owned(),
            port1.to_owned(),
            comp2.to_owned(),
            port2.to_owned(),
        ]);
        Ok(())
    }

    fn new_model(&mut self) {
        *self = MemoryModel {
            preferences: std::mem::take(&mut self.preferences),
            ..MemoryModel::new()
        };
    }

    fn load_model(&mut self, path: &Path) -> Result<(), String> {
        if !path.is_file() {
            return Err(format!("File not found: {}", path.display()));
        }
        self.new_model();
        self.directory = path.parent().map(Path::to_path_buf);
        Ok(())
    }

    fn model_directory(&self) -> Option<PathBuf> {
        if self.open {
            self.directory.clone()
        } else {
            None
        }
    }

    fn simulate(&mut self, _all_models: bool) -> Result<(), String> {
        self.require_open()?;
        self.simulations += 1;
        self.last_time = Some(self.settings.stop);
        Ok(())
    }

    fn simulation_settings(&self) -> SimulationSettings {
        self.settings
    }

    fn set_simulation_settings(&mut self, settings: SimulationSettings) -> Result<(), String> {
        self.require_open()?;
        if settings.step <= 0.0 || settings.stop <= settings.start {
            return Err("Failed to apply simulation settings.".to_owned());
        }
        self.settings = settings;
        Ok(())
    }

    fn last_simulation_time(&self) -> Option<f64> {
        self.last_time
    }

    fn set_time_step(&mut self, component: &str, step: f64) -> Result<(), String> {
        self.require_open()?;
        self.component_mut(component)?.time_step = Some(step);
        Ok(())
    }

    fn inherit_time_step(&mut self, component: &str) -> Result<(), String> {
        self.require_open()?;
        self.component_mut(component)?.time_step = None;
        Ok(())
    }

    fn port_names(&self) -> Vec<String> {
        self.components
            .iter()
            .flat_map(|(comp, c)| c.ports.keys().map(move |p| format!("{comp}#{p}")))
            .collect()
    }

    fn set_logging(&mut self, component: &str, port: &str, enabled: bool) -> Result<(), String> {
        self.require_open()?;
        let slot = self
            .component_mut(component)?
            .ports
            .get_mut(port)
            .ok_or_else(|| format!("Port {component}#{port} not found."))?;
        *slot = enabled;
        Ok(())
    }

    fn logging_enabled(&self, component: &str, port: &str) -> Option<bool> {
        self.components.get(component)?.ports.get(port).copied()
    }

    /// One `name = value` line per parameter, system parameters included.
    fn save_parameters(&self, path: &Path) -> Result<(), String> {
        self.require_open()?;
        let mut text = format!("{PARAMETER_SET_HEADER}\n");
        for name in self.parameter_names().iter().chain(&self.system_parameter_names()) {
            if let Some(value) = self.parameter_value(name) {
                let _ = writeln!(text, "{name} = {value}");
            }
        }
        std::fs::write(path, text).map_err(|_| "Unable to write to file.".to_owned())
    }

    /// Unknown names are skipped.
    fn load_parameters(&mut self, path: &Path) -> Result<usize, String> {
        self.require_open()?;
        let text = std::fs::read_to_string(path).map_err(|_| "Unable to read file.".to_owned())?;
        let mut applied = 0;
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                return Err(format!("Malformed parameter file, line {}.", n + 1));
            };
            match self.set_parameter(name.trim(), value.trim()) {
                Ok(()) => applied += 1,
                Err(e) => debug!(line = n + 1, error = %e, "parameter skipped"),
            }
        }
        Ok(applied)
    }

    fn set_preference(&mut self, name: &str, value: &str) -> Result<(), String> {
        self.preferences.insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    fn request_exit(&mut self) {
        self.exit_requested = true;
    }
}

// ── BufferSink ────────────────────────────────────────────────────────────────

/// One line written to a [`BufferSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleLine {
    Print(String),
    Info(String),
    Warning(String),
    Error(String),
}

impl ConsoleLine {
    pub fn text(&self) -> &str {
        match self {
            ConsoleLine::Print(s)
            | ConsoleLine::Info(s)
            | ConsoleLine::Warning(s)
            | ConsoleLine::Error(s) => s,
        }
    }
}

/// Records console output.  Clones share one buffer, so a test can keep a
/// handle while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    lines: Rc<RefCell<Vec<ConsoleLine>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<ConsoleLine> {
        self.lines.borrow().clone()
    }

    /// Text of every line, regardless of channel.
    pub fn texts(&self) -> Vec<String> {
        self.lines.borrow().iter().map(|l| l.text().to_owned()).collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter_map(|l| match l {
                ConsoleLine::Error(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn take(&self) -> Vec<ConsoleLine> {
        std::mem::take(&mut *self.lines.borrow_mut())
    }

    fn push(&self, line: ConsoleLine) {
        self.lines.borrow_mut().push(line);
    }
}

impl ConsoleSink for BufferSink {
    fn print(&mut self, text: &str) {
        self.push(ConsoleLine::Print(text.to_owned()));
    }
    fn print_info(&mut self, text: &str) {
        self.push(ConsoleLine::Info(text.to_owned()));
    }
    fn print_warning(&mut self, text: &str) {
        self.push(ConsoleLine::Warning(text.to_owned()));
    }
    fn print_error(&mut self, text: &str) {
        self.push(ConsoleLine::Error(text.to_owned()));
    }
}

// ── Optimizers ────────────────────────────────────────────────────────────────

/// Refuses every optimization request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOptimizer;

impl OptimizationBridge for NullOptimizer {
    fn accepts_commands(&self) -> bool {
        false
    }
    fn objective(&self, _index: usize) -> Option<f64> {
        None
    }
    fn set_objective(&mut self, _index: usize, _value: f64) -> Result<(), String> {
        Err("No optimization is running.".to_owned())
    }
    fn parameter(&self, _point: usize, _index: usize) -> Option<f64> {
        None
    }
    fn set_limits(&mut self, _index: usize, _min: f64, _max: f64) -> Result<(), String> {
        Err("No optimization is running.".to_owned())
    }
    fn variable(&self, _name: &str) -> Option<f64> {
        None
    }
}

/// Fixed-size optimizer state for scripts that drive an optimization loop.
#[derive(Debug, Clone, Default)]
pub struct MemoryOptimizer {
    pub objectives: Vec<f64>,
    /// `points[point][parameter]`
    pub points: Vec<Vec<f64>>,
    pub limits: Vec<(f64, f64)>,
    pub variables: BTreeMap<String, f64>,
}

impl MemoryOptimizer {
    pub fn new(objectives: usize, parameters: usize, points: usize) -> Self {
        MemoryOptimizer {
            objectives: vec![0.0; objectives],
            points: vec![vec![0.0; parameters]; points],
            limits: vec![(0.0, 0.0); parameters],
            variables: BTreeMap::new(),
        }
    }
}

impl OptimizationBridge for MemoryOptimizer {
    fn accepts_commands(&self) -> bool {
        true
    }
    fn objective(&self, index: usize) -> Option<f64> {
        self.objectives.get(index).copied()
    }
    fn set_objective(&mut self, index: usize, value: f64) -> Result<(), String> {
        let slot = self
            .objectives
            .get_mut(index)
            .ok_or_else(|| "Index out of range.".to_owned())?;
        *slot = value;
        Ok(())
    }
    fn parameter(&self, point: usize, index: usize) -> Option<f64> {
        self.points.get(point)?.get(index).copied()
    }
    fn set_limits(&mut self, index: usize, min: f64, max: f64) -> Result<(), String> {
        let slot = self
            .limits
            .get_mut(index)
            .ok_or_else(|| "Index out of range.".to_owned())?;
        *slot = (min, max);
        Ok(())
    }
    fn variable(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }
}

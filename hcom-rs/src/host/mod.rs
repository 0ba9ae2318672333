//! Collaborators the interpreter talks to.
//!
//! The interpreter never owns a simulation engine, a plot window or a
//! schematic.  It reaches them through four traits:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`ModelHost`] | parameters, aliases, components, simulation control |
//! | [`LogDataStore`] | named, generation-indexed time series |
//! | [`ConsoleSink`] | the four console output channels |
//! | [`OptimizationBridge`] | objective / parameter exchange with an optimizer |
//!
//! [`memory`] provides in-process implementations used by the binary and the
//! tests; [`terminal`] provides the colored stdout sink; [`logfile`] reads
//! and writes PLO and CSV log files.

pub mod logfile;
pub mod memory;
pub mod numeric;
pub mod terminal;

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use logfile::{Column, LogFileFormat, TIME_NAME};

pub use memory::{
    BufferSink, ConsoleLine, MemoryLogStore, MemoryModel, MemoryOptimizer, NullOptimizer,
};
pub use terminal::TerminalSink;

// ── LogVector ─────────────────────────────────────────────────────────────────

/// Shared handle to a stored series.
pub type VectorRef = Rc<RefCell<LogVector>>;

/// One generation of one logged (or script-created) series.
#[derive(Debug, Clone, Default)]
pub struct LogVector {
    /// Full long name, e.g. `Mass#P1#Position`; orphans use the bare name.
    pub name: String,
    /// Zero-based simulation generation.
    pub generation: usize,
    pub data: Vec<f64>,
    /// Shared time (or frequency) axis.
    pub time: Option<VectorRef>,
    /// Created by a script rather than logged by a simulation.
    pub orphan: bool,
    pub alias: Option<String>,
}

impl LogVector {
    pub fn new(name: impl Into<String>, generation: usize, data: Vec<f64>) -> Self {
        LogVector {
            name: name.into(),
            generation,
            data,
            ..Default::default()
        }
    }

    pub fn with_time(mut self, time: VectorRef) -> Self {
        self.time = Some(time);
        self
    }

    pub fn into_ref(self) -> VectorRef {
        Rc::new(RefCell::new(self))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn peek(&self, index: usize) -> Result<f64, String> {
        self.data
            .get(index)
            .copied()
            .ok_or_else(|| "Index out of range".to_owned())
    }

    /// Overwrite one sample and return the stored value.
    pub fn poke(&mut self, index: usize, value: f64) -> Result<f64, String> {
        let slot = self
            .data
            .get_mut(index)
            .ok_or_else(|| "Index out of range".to_owned())?;
        *slot = value;
        Ok(value)
    }

    pub fn average(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }

    /// Smallest sample and its index (first occurrence).
    pub fn min_with_index(&self) -> Option<(f64, usize)> {
        self.data
            .iter()
            .enumerate()
            .fold(None, |best, (i, &v)| match best {
                Some((b, _)) if b <= v => best,
                _ => Some((v, i)),
            })
    }

    /// Largest sample and its index (first occurrence).
    pub fn max_with_index(&self) -> Option<(f64, usize)> {
        self.data
            .iter()
            .enumerate()
            .fold(None, |best, (i, &v)| match best {
                Some((b, _)) if b >= v => best,
                _ => Some((v, i)),
            })
    }

    pub fn abs_in_place(&mut self) {
        for v in &mut self.data {
            *v = v.abs();
        }
    }

    pub fn compare(&self, other: &LogVector, eps: f64) -> bool {
        numeric::compare(&self.data, &other.data, eps)
    }
}

// ── ModelHost ─────────────────────────────────────────────────────────────────

/// Simulation settings as passed by `chss`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    pub start: f64,
    pub step: f64,
    pub stop: f64,
    pub samples: Option<usize>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            start: 0.0,
            step: 0.001,
            stop: 10.0,
            samples: None,
        }
    }
}

/// The open model and the application around it.
///
/// Parameter names are long names: `Component#Parameter` for component
/// parameters, `Component#Port#Value` for start values, bare names for
/// system parameters.  Every fallible method returns the console message.
pub trait ModelHost {
    fn has_model(&self) -> bool;

    // parameters
    fn parameter_names(&self) -> Vec<String>;
    fn system_parameter_names(&self) -> Vec<String>;
    fn parameter_value(&self, name: &str) -> Option<String>;
    fn set_parameter(&mut self, name: &str, value: &str) -> Result<(), String>;
    fn add_system_parameter(&mut self, name: &str, value: &str) -> Result<(), String>;

    // aliases
    fn set_alias(&mut self, full_name: &str, alias: &str) -> Result<(), String>;
    fn full_name_from_alias(&self, alias: &str) -> Option<String>;
    fn alias_names(&self) -> Vec<String>;

    // components
    fn component_names(&self) -> Vec<String>;
    fn add_component(&mut self, type_name: &str, name: &str) -> Result<(), String>;
    fn remove_component(&mut self, name: &str) -> Result<(), String>;
    fn rename_component(&mut self, old: &str, new: &str) -> Result<(), String>;
    fn connect(&mut self, comp1: &str, port1: &str, comp2: &str, port2: &str) -> Result<(), String>;
    fn new_model(&mut self);
    fn load_model(&mut self, path: &Path) -> Result<(), String>;
    fn model_directory(&self) -> Option<PathBuf>;

    // simulation
    fn simulate(&mut self, all_models: bool) -> Result<(), String>;
    fn simulation_settings(&self) -> SimulationSettings;
    fn set_simulation_settings(&mut self, settings: SimulationSettings) -> Result<(), String>;
    fn last_simulation_time(&self) -> Option<f64>;
    fn set_time_step(&mut self, component: &str, step: f64) -> Result<(), String>;
    fn inherit_time_step(&mut self, component: &str) -> Result<(), String>;

    // logging
    /// `Component#Port` for every port in the model.
    fn port_names(&self) -> Vec<String>;
    fn set_logging(&mut self, component: &str, port: &str, enabled: bool) -> Result<(), String>;
    /// `None` when the port does not exist.
    fn logging_enabled(&self, component: &str, port: &str) -> Option<bool>;

    // parameter sets
    fn save_parameters(&self, path: &Path) -> Result<(), String>;
    /// Apply a saved parameter set; returns how many parameters were set.
    fn load_parameters(&mut self, path: &Path) -> Result<usize, String>;

    /// Application preference as used by `set` and `semt`
    /// (`multicore`, `threads`, `algorithm`, `cachetodisk`,
    /// `generationlimit`, `samples`).
    fn set_preference(&mut self, name: &str, value: &str) -> Result<(), String>;

    fn request_exit(&mut self);
}

// ── LogDataStore ──────────────────────────────────────────────────────────────

/// Generation-indexed series storage plus the vector arithmetic the
/// evaluator needs.
///
/// Operation results are *temporary* vectors: orphans that are not
/// registered under a name and inherit the first operand's time axis and
/// generation.  Assignment registers them through [`define`](Self::define).
pub trait LogDataStore {
    /// All stored long names, sorted.
    fn variable_names(&self) -> Vec<String>;
    /// Generations held for `name`, ascending.
    fn generations(&self, name: &str) -> Vec<usize>;
    fn get(&self, name: &str, generation: usize) -> Option<VectorRef>;
    fn current_generation(&self) -> Option<usize>;
    fn lowest_generation(&self) -> Option<usize>;
    fn highest_generation(&self) -> Option<usize>;
    /// Register (or replace) a named series.  `generation = None` means the
    /// current generation.
    fn define(
        &mut self,
        name: &str,
        generation: Option<usize>,
        data: Vec<f64>,
        time: Option<VectorRef>,
    ) -> VectorRef;
    /// Remove one generation, or all of them when `generation` is `None`.
    /// Returns whether anything was removed.
    fn remove(&mut self, name: &str, generation: Option<usize>) -> bool;
    /// Open a new, empty generation above every existing one and make it
    /// current.
    fn begin_generation(&mut self) -> usize;

    // ── Provided operations ──────────────────────────────────────────────────

    fn latest(&self, name: &str) -> Option<VectorRef> {
        let generation = *self.generations(name).last()?;
        self.get(name, generation)
    }

    fn contains(&self, name: &str) -> bool {
        !self.generations(name).is_empty()
    }

    /// Build an unregistered result vector shaped like `like`.
    fn temporary(&self, name: String, data: Vec<f64>, like: &VectorRef) -> VectorRef {
        let like = like.borrow();
        LogVector {
            name,
            generation: like.generation,
            data,
            time: like.time.clone(),
            orphan: true,
            alias: None,
        }
        .into_ref()
    }

    fn apply_scalar(&self, a: &VectorRef, label: &str, f: &dyn Fn(f64) -> f64) -> VectorRef {
        let (name, data) = {
            let v = a.borrow();
            (format!("{}{}", v.name, label), numeric::map(&v.data, f))
        };
        self.temporary(name, data, a)
    }

    fn apply_pair(
        &self,
        a: &VectorRef,
        b: &VectorRef,
        sep: &str,
        f: &dyn Fn(f64, f64) -> f64,
    ) -> Result<VectorRef, String> {
        let (name, data) = {
            let (va, vb) = (a.borrow(), b.borrow());
            (
                format!("{}{}{}", va.name, sep, vb.name),
                numeric::zip_with(&va.data, &vb.data, f)?,
            )
        };
        Ok(self.temporary(name, data, a))
    }

    fn add(&self, a: &VectorRef, b: &VectorRef) -> Result<VectorRef, String> {
        self.apply_pair(a, b, "+", &|x, y| x + y)
    }

    fn sub(&self, a: &VectorRef, b: &VectorRef) -> Result<VectorRef, String> {
        self.apply_pair(a, b, "-", &|x, y| x - y)
    }

    fn mul(&self, a: &VectorRef, b: &VectorRef) -> Result<VectorRef, String> {
        self.apply_pair(a, b, "*", &|x, y| x * y)
    }

    fn div(&self, a: &VectorRef, b: &VectorRef) -> Result<VectorRef, String> {
        self.apply_pair(a, b, "/", &|x, y| x / y)
    }

    fn add_scalar(&self, a: &VectorRef, x: f64) -> VectorRef {
        self.apply_scalar(a, &format!("+{x}"), &|v| v + x)
    }

    fn mul_scalar(&self, a: &VectorRef, x: f64) -> VectorRef {
        self.apply_scalar(a, &format!("*{x}"), &|v| v * x)
    }

    fn div_scalar(&self, a: &VectorRef, x: f64) -> VectorRef {
        self.apply_scalar(a, &format!("/{x}"), &|v| v / x)
    }

    fn abs(&self, a: &VectorRef) -> VectorRef {
        let name = format!("Abs{}", a.borrow().name);
        let data = numeric::map(&a.borrow().data, f64::abs);
        self.temporary(name, data, a)
    }

    /// Derivative of `a` with respect to `by`.
    fn ddt(&self, a: &VectorRef, by: &VectorRef) -> Result<VectorRef, String> {
        let (name, data) = {
            let (va, vb) = (a.borrow(), b_data(by));
            (format!("{}_Diff", va.name), numeric::diff(&va.data, &vb)?)
        };
        Ok(self.temporary(name, data, a))
    }

    fn integrate(&self, a: &VectorRef, by: &VectorRef) -> Result<VectorRef, String> {
        let (name, data) = {
            let (va, vb) = (a.borrow(), b_data(by));
            (format!("{}_Int", va.name), numeric::integrate(&va.data, &vb)?)
        };
        Ok(self.temporary(name, data, a))
    }

    fn lowpass1(&self, a: &VectorRef, time: &VectorRef, freq: f64) -> Result<VectorRef, String> {
        let (name, data) = {
            let (va, vt) = (a.borrow(), b_data(time));
            (format!("{}_Lp1", va.name), numeric::lowpass1(&va.data, &vt, freq)?)
        };
        Ok(self.temporary(name, data, a))
    }

    /// Frequency spectrum; the result's axis is the frequency vector.
    fn fft(&self, a: &VectorRef, time: &VectorRef, power: bool) -> Result<VectorRef, String> {
        let va = a.borrow();
        let (freq, mag) = numeric::spectrum(&va.data, &b_data(time), power)?;
        let axis = LogVector {
            name: "Frequency".to_owned(),
            generation: va.generation,
            data: freq,
            orphan: true,
            ..Default::default()
        };
        Ok(LogVector {
            name: format!("{}_Fft", va.name),
            generation: va.generation,
            data: mag,
            time: Some(axis.into_ref()),
            orphan: true,
            alias: None,
        }
        .into_ref())
    }

    fn greater_than(&self, a: &VectorRef, threshold: f64) -> VectorRef {
        let name = format!("{}_gt", a.borrow().name);
        let data = numeric::greater_than(&a.borrow().data, threshold);
        self.temporary(name, data, a)
    }

    fn less_than(&self, a: &VectorRef, threshold: f64) -> VectorRef {
        let name = format!("{}_lt", a.borrow().name);
        let data = numeric::less_than(&a.borrow().data, threshold);
        self.temporary(name, data, a)
    }

    fn greater_than_each(&self, a: &VectorRef, b: &VectorRef) -> Result<VectorRef, String> {
        let name = format!("{}_gt", a.borrow().name);
        let data = numeric::greater_than_each(&a.borrow().data, &b.borrow().data)?;
        Ok(self.temporary(name, data, a))
    }

    fn less_than_each(&self, a: &VectorRef, b: &VectorRef) -> Result<VectorRef, String> {
        let name = format!("{}_lt", a.borrow().name);
        let data = numeric::less_than_each(&a.borrow().data, &b.borrow().data)?;
        Ok(self.temporary(name, data, a))
    }

    fn equal_to(&self, a: &VectorRef, value: f64, eps: f64) -> VectorRef {
        let name = format!("{}_eq", a.borrow().name);
        let data = numeric::equal_to(&a.borrow().data, value, eps);
        self.temporary(name, data, a)
    }

    fn equal_each(&self, a: &VectorRef, b: &VectorRef, eps: f64) -> Result<VectorRef, String> {
        let name = format!("{}_eq", a.borrow().name);
        let data = numeric::equal_each(&a.borrow().data, &b.borrow().data, eps)?;
        Ok(self.temporary(name, data, a))
    }

    fn max_of_scalar(&self, a: &VectorRef, x: f64) -> VectorRef {
        self.apply_scalar(a, "_maxof", &|v| v.max(x))
    }

    fn min_of_scalar(&self, a: &VectorRef, x: f64) -> VectorRef {
        self.apply_scalar(a, "_minof", &|v| v.min(x))
    }

    fn max_of(&self, a: &VectorRef, b: &VectorRef) -> VectorRef {
        let name = format!("{}_maxof", a.borrow().name);
        let data = numeric::zip_shortest(&a.borrow().data, &b.borrow().data, f64::max);
        self.temporary(name, data, a)
    }

    fn min_of(&self, a: &VectorRef, b: &VectorRef) -> VectorRef {
        let name = format!("{}_minof", a.borrow().name);
        let data = numeric::zip_shortest(&a.borrow().data, &b.borrow().data, f64::min);
        self.temporary(name, data, a)
    }

    // ── Log files ────────────────────────────────────────────────────────────

    /// Every series stored in `generation` except the time axis.
    fn generation_vectors(&self, generation: usize) -> Vec<VectorRef> {
        self.variable_names()
            .iter()
            .filter(|n| n.as_str() != TIME_NAME)
            .filter_map(|n| self.get(n, generation))
            .collect()
    }

    /// Write `vectors` to `path`.  The time axis is that of the first
    /// vector, else the stored `time` series; PLO files require one.
    fn export_log(&self, path: &Path, vectors: &[VectorRef], format: LogFileFormat) -> Result<(), String> {
        let vectors: Vec<&VectorRef> = vectors.iter().filter(|v| v.borrow().name != TIME_NAME).collect();
        let time = vectors
            .first()
            .and_then(|v| v.borrow().time.clone())
            .or_else(|| self.latest(TIME_NAME))
            .map(|t| t.borrow().data.clone());
        let columns: Vec<Column> = vectors
            .iter()
            .map(|v| {
                let v = v.borrow();
                Column {
                    name: v.name.clone(),
                    alias: v.alias.clone().unwrap_or_default(),
                    data: v.data.clone(),
                }
            })
            .collect();

        let file = File::create(path)
            .map_err(|_| format!("Failed to open file for writing: {}", path.display()))?;
        let mut out = BufWriter::new(file);
        let written = match format {
            LogFileFormat::Csv => {
                let time_row = time.map(|t| Column::new(TIME_NAME, t));
                let rows: Vec<Column> = time_row.into_iter().chain(columns).collect();
                logfile::write_csv_rows(&mut out, &rows)
            }
            LogFileFormat::Plo => {
                let time = time.ok_or_else(|| "No time vector to export.".to_owned())?;
                let title = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                logfile::write_plo(&mut out, &title, &time, &columns)
            }
        };
        written
            .and_then(|()| out.flush())
            .map_err(|e| format!("Failed to write {}: {e}", path.display()))
    }

    /// Read a log file into a fresh generation and return that generation.
    fn import_log(&mut self, path: &Path, format: LogFileFormat) -> Result<usize, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| format!("Could not open file: {}", path.display()))?;
        let table = match format {
            LogFileFormat::Csv => logfile::read_csv(&text)?,
            LogFileFormat::Plo => logfile::read_plo(&text)?,
        };
        let generation = self.begin_generation();
        let time = table
            .time
            .map(|t| self.define(TIME_NAME, Some(generation), t, None));
        for column in table.columns {
            let v = self.define(&column.name, Some(generation), column.data, time.clone());
            let mut v = v.borrow_mut();
            v.orphan = false;
            if !column.alias.is_empty() {
                v.alias = Some(column.alias);
            }
        }
        if let Some(t) = time {
            t.borrow_mut().orphan = false;
        }
        Ok(generation)
    }

    /// A free-standing generated series (`linspace`, `ones`, ...).
    fn generated(&self, name: &str, data: Vec<f64>) -> VectorRef {
        LogVector {
            name: name.to_owned(),
            generation: self.current_generation().unwrap_or(0),
            data,
            orphan: true,
            ..Default::default()
        }
        .into_ref()
    }
}

fn b_data(v: &VectorRef) -> Vec<f64> {
    v.borrow().data.clone()
}

// ── ConsoleSink ───────────────────────────────────────────────────────────────

/// The four console channels.
pub trait ConsoleSink {
    fn print(&mut self, text: &str);
    fn print_info(&mut self, text: &str);
    fn print_warning(&mut self, text: &str);
    fn print_error(&mut self, text: &str);
}

// ── OptimizationBridge ────────────────────────────────────────────────────────

/// Data exchange with an external optimizer.
pub trait OptimizationBridge {
    /// Whether this console runs optimization scripts at all.
    fn accepts_commands(&self) -> bool;
    fn objective(&self, index: usize) -> Option<f64>;
    fn set_objective(&mut self, index: usize, value: f64) -> Result<(), String>;
    fn parameter(&self, point: usize, index: usize) -> Option<f64>;
    fn set_limits(&mut self, index: usize, min: f64, max: f64) -> Result<(), String>;
    fn variable(&self, name: &str) -> Option<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(data: &[f64]) -> VectorRef {
        LogVector::new("A#P1#Pressure", 0, data.to_vec()).into_ref()
    }

    #[test]
    fn peek_and_poke_bounds() {
        let v = vector(&[1.0, 2.0]);
        assert_eq!(v.borrow().peek(1), Ok(2.0));
        assert_eq!(v.borrow().peek(2), Err("Index out of range".to_owned()));
        assert_eq!(v.borrow_mut().poke(0, 5.0), Ok(5.0));
        assert_eq!(v.borrow().data, vec![5.0, 2.0]);
        assert!(v.borrow_mut().poke(9, 1.0).is_err());
    }

    #[test]
    fn extrema_report_first_index() {
        let v = LogVector::new("x", 0, vec![3.0, 1.0, 4.0, 1.0, 4.0]);
        assert_eq!(v.min_with_index(), Some((1.0, 1)));
        assert_eq!(v.max_with_index(), Some((4.0, 2)));
        assert_eq!(LogVector::default().max_with_index(), None);
        assert!((v.average() - 2.6).abs() < 1e-12);
    }

    #[test]
    fn store_ops_inherit_time_axis_and_stay_unregistered() {
        let mut store = MemoryLogStore::new();
        let time = store.define("time", Some(0), vec![0.0, 1.0, 2.0], None);
        let a = store.define("A#P1#Pressure", Some(0), vec![1.0, 2.0, 3.0], Some(time.clone()));

        let r = store.mul_scalar(&a, 2.0);
        assert_eq!(r.borrow().data, vec![2.0, 4.0, 6.0]);
        assert!(r.borrow().orphan);
        assert!(Rc::ptr_eq(r.borrow().time.as_ref().unwrap(), &time));
        assert_eq!(store.variable_names(), vec!["A#P1#Pressure", "time"]);

        let d = store.ddt(&a, &time).unwrap();
        assert_eq!(d.borrow().name, "A#P1#Pressure_Diff");
        assert_eq!(d.borrow().data, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn pair_ops_check_length() {
        let store = MemoryLogStore::new();
        let a = vector(&[1.0, 2.0]);
        let b = vector(&[1.0]);
        assert_eq!(store.add(&a, &b).unwrap_err(), numeric::LENGTH_MISMATCH);
        assert_eq!(store.max_of(&a, &b).borrow().data, vec![1.0]);
    }
}

//! End-to-end scripts against the in-memory host, including the file
//! commands (`exec`, `wrhi`, `cd`, `ls`, `load`).

use std::fs;
use std::path::Path;

use hcom::host::{BufferSink, ConsoleLine, LogDataStore, LogVector, MemoryLogStore, MemoryModel};
use hcom::{InterpreterSession, RunState};

fn hydraulic_session() -> (InterpreterSession, BufferSink) {
    let model = MemoryModel::new()
        .with_component("Pump", "HydraulicFixedDisplacementPump", &[("n_p", "1000"), ("D_p", "5e-5")])
        .with_component("Orifice", "HydraulicTurbulentOrificeG", &[("Cq", "0.67"), ("A", "Area")])
        .with_system_parameter("Area", "1e-5");
    let mut store = MemoryLogStore::new();
    let time = store.insert(LogVector::new("time", 0, vec![0.0, 1.0, 2.0, 3.0]));
    store.insert(LogVector::new("Pump#P2#Pressure", 0, vec![1e5, 2e5, 3e5, 4e5]).with_time(time.clone()));
    store.insert(LogVector::new("Orifice#P1#Flow", 0, vec![0.1, 0.3, 0.2, 0.4]).with_time(time));
    InterpreterSession::buffered_with(model, store)
}

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

// ── Scripts ───────────────────────────────────────────────────────────────────

#[test]
fn parameter_sweep_with_while() {
    let (mut s, sink) = hydraulic_session();
    let state = s.run_script(
        "\
# sweep the pump speed
speed = 500
runs = 0
while (speed < 2000)
  chpa Pump.n_p speed
  sim
  runs = runs + 1
  speed = speed + 500
repeat
",
    );
    assert_eq!(state, RunState::Completed);
    assert_eq!(s.local("runs"), Some(3.0));
    assert_eq!(s.model().parameter_value("Pump#n_p").as_deref(), Some("1500"));
    assert!(sink.errors().is_empty(), "{:?}", sink.errors());
}

#[test]
fn vector_arithmetic_defines_new_series() {
    let (mut s, sink) = hydraulic_session();
    s.run_script("power = Pump.P2.p * Orifice.P1.q\nm = max(power)\nprint \"peak=$m$\"");
    let power = s.store().latest("power").expect("defined");
    assert_eq!(power.borrow().data, vec![1e4, 6e4, 6e4, 1.6e5]);
    assert!(power.borrow().orphan);
    assert_eq!(sink.texts().last().map(String::as_str), Some("peak=160000"));
}

#[test]
fn foreach_over_pressures() {
    let (mut s, _) = hydraulic_session();
    s.run_script("total = 0\nforeach p *.P2.p\n  total = total + aver($p)\nendforeach");
    assert_eq!(s.local("total"), Some(2.5e5));
}

#[test]
fn functions_and_labels_combine() {
    let (mut s, sink) = hydraulic_session();
    s.run_script(
        "\
define bump
  count = count + 1
enddefine
count = 0
&again
call bump
if (count < 4)
  goto again
endif
print \"count=$count$\"
",
    );
    assert_eq!(s.local("count"), Some(4.0));
    assert_eq!(sink.texts().last().map(String::as_str), Some("count=4"));
}

#[test]
fn system_parameter_indirection() {
    let (mut s, _) = hydraulic_session();
    s.execute("a = Orifice.A * 2");
    assert_eq!(s.local("a"), Some(2e-5));
    s.execute("chpa Area 3e-5");
    s.execute("b = Orifice.A");
    assert_eq!(s.local("b"), Some(3e-5));
}

#[test]
fn abort_flag_stops_long_loop() {
    let (mut s, sink) = hydraulic_session();
    let abort = s.abort_handle();
    let mut lines = 0;
    s.set_yield_callback(move || {
        lines += 1;
        if lines == 50 {
            abort.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });
    let state = s.run_script("i = 0\nwhile (1)\n  i = i + 1\nrepeat");
    assert_eq!(state, RunState::Aborted);
    assert!(s.local("i").is_some_and(|i| i > 0.0 && i < 50.0));
    let aborted = sink
        .lines()
        .iter()
        .filter(|l| l.text() == "Script aborted.")
        .count();
    assert_eq!(aborted, 1);
}

// ── File commands ─────────────────────────────────────────────────────────────

#[test]
fn exec_finds_hcom_extension_and_substitutes_args() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "double.hcom", "x = $1 * 2\ny = $2\n");
    let (mut s, sink) = hydraulic_session();
    s.set_pwd(dir.path());
    s.execute("exec double 21 7");
    assert_eq!(s.local("x"), Some(42.0));
    assert_eq!(s.local("y"), Some(7.0));
    assert!(sink.errors().is_empty(), "{:?}", sink.errors());
}

#[test]
fn exec_absolute_path_and_nested_scripts() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "inner.hcom", "z = 5\nstop\nz = 6\n");
    let inner = dir.path().join("inner.hcom");
    write(dir.path(), "outer.hcom", &format!("exec \"{}\"\nw = z + 1\n", inner.display()));
    let (mut s, _) = hydraulic_session();
    s.execute(&format!("exec {}", dir.path().join("outer").display()));
    assert_eq!(s.local("z"), Some(5.0));
    assert_eq!(s.local("w"), Some(6.0));
}

#[test]
fn exec_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let (mut s, sink) = hydraulic_session();
    s.set_pwd(dir.path());
    s.execute("exec nothing_here");
    assert_eq!(sink.errors(), vec!["Unable to read file."]);
}

#[test]
fn wrhi_writes_history_oldest_first() {
    let dir = tempfile::tempdir().unwrap();
    let (mut s, _) = hydraulic_session();
    s.set_pwd(dir.path());
    s.submit("a = 1");
    s.submit("b = 2");
    s.submit("wrhi hist.txt");
    let text = fs::read_to_string(dir.path().join("hist.txt")).unwrap();
    assert_eq!(text, "a = 1\nb = 2\nwrhi hist.txt\n");
}

#[test]
fn wrhi_reports_unwritable_path() {
    let dir = tempfile::tempdir().unwrap();
    let (mut s, sink) = hydraulic_session();
    s.set_pwd(dir.path());
    s.execute("wrhi no/such/dir/hist.txt");
    assert_eq!(sink.errors(), vec!["Unable to write to file."]);
}

#[test]
fn cd_and_pwd() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("models")).unwrap();
    let (mut s, sink) = hydraulic_session();
    s.set_pwd(dir.path());
    s.execute("cd models");
    let expected = fs::canonicalize(dir.path().join("models")).unwrap();
    assert_eq!(s.pwd(), expected.as_path());
    s.execute("cd nowhere");
    assert_eq!(sink.errors(), vec!["Illegal directory."]);
    sink.take();
    s.execute("pwd");
    assert_eq!(sink.texts(), vec![expected.display().to_string()]);
}

#[test]
fn ls_filters_sorted_entries() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["c.hcom", "a.hcom", "b.txt"] {
        write(dir.path(), name, "");
    }
    let (mut s, sink) = hydraulic_session();
    s.set_pwd(dir.path());
    sink.take();
    s.execute("ls *.hcom");
    assert_eq!(sink.texts(), vec!["a.hcom", "c.hcom"]);
    sink.take();
    s.execute("ls");
    assert_eq!(sink.texts(), vec!["a.hcom", "b.txt", "c.hcom"]);
}

#[test]
fn load_then_mwd_and_cd_mwd() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("elsewhere")).unwrap();
    write(dir.path(), "circuit.hmf", "<hopsanmodelfile/>");
    let (mut s, sink) = hydraulic_session();
    s.set_pwd(dir.path());
    s.execute("load circuit.hmf");
    assert!(sink.errors().is_empty(), "{:?}", sink.errors());
    sink.take();
    s.execute("mwd");
    assert_eq!(sink.texts(), vec![dir.path().display().to_string()]);
    s.execute("cd elsewhere");
    s.execute("cd -mwd");
    assert_eq!(s.pwd(), dir.path());
}

#[test]
fn echo_off_script_still_reports_errors() {
    let (mut s, sink) = hydraulic_session();
    s.run_script("echo off\nx = 1\nchpa Ghost.p 1\necho on");
    let lines = sink.lines();
    assert_eq!(lines, vec![ConsoleLine::Error("Parameter(s) not found.".into())]);
}

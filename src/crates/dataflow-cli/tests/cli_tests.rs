//! End-to-end tests against the `dataflow` binary's subcommands, driving the
//! same compile -> scheduler-loop path a real operator would use.

use std::io::Write;
use std::process::Command;

use tempfile::NamedTempFile;

fn dataflow_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_dataflow"))
}

fn write_ops(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("tempfile");
    write!(file, "{json}").expect("write ops file");
    file
}

#[test]
fn compile_prints_commands_for_a_simple_func_chain() {
    let ops = write_ops(
        r#"[
            {"WithInput": {"x": 1}},
            {"Func": {"func_id": "double", "cfg": {"func_id": "double", "args": {}}}}
        ]"#,
    );

    let output = dataflow_cmd()
        .arg("compile")
        .arg(ops.path())
        .output()
        .expect("run dataflow compile");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("flow_id:"));
    assert!(stdout.contains("top-level nodes: 1"));
    assert!(stdout.contains("CreateNode"));
}

#[test]
fn compile_rejects_a_malformed_op_list() {
    let ops = write_ops(r#"{"not": "a list"}"#);

    let output = dataflow_cmd().arg("compile").arg(ops.path()).output().expect("run dataflow compile");

    assert!(!output.status.success());
}

#[test]
fn run_reports_no_input_data_for_a_requirement_only_node() {
    // A func node with no input ever supplied must be reported as
    // undispatchable by the scheduler loop, not hang.
    let ops = write_ops(
        r#"[
            {"Func": {"func_id": "needs_x", "cfg": {"func_id": "needs_x", "args": {}}}}
        ]"#,
    );

    let output = dataflow_cmd().arg("run").arg(ops.path()).output().expect("run dataflow run");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("flow_id:"));
}

#[test]
fn run_dispatches_a_root_ready_node_then_stops() {
    let ops = write_ops(
        r#"[
            {"WithInput": {"x": 1}},
            {"Func": {"func_id": "double", "cfg": {"func_id": "double", "args": {}}}}
        ]"#,
    );

    let output = dataflow_cmd().arg("run").arg(ops.path()).output().expect("run dataflow run");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ExecuteNodes"));
    assert!(stdout.contains("dry run"));
}

#[test]
fn inspect_reports_missing_flow_in_a_fresh_process() {
    let output = dataflow_cmd()
        .arg("inspect")
        .arg(uuid::Uuid::new_v4().to_string())
        .output()
        .expect("run dataflow inspect");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("no flow found"));
}

#[test]
fn compile_errors_on_a_dangling_route_target() {
    let ops = write_ops(
        r#"[
            {"WithInput": {"x": 1}},
            {"To": {"target": "nowhere", "input_key": null, "transform": null}}
        ]"#,
    );

    let output = dataflow_cmd().arg("compile").arg(ops.path()).output().expect("run dataflow compile");

    assert!(!output.status.success());
}

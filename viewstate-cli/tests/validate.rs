//! Tests for the `viewstate validate` subcommand.
#![cfg(all(test, not(miri)))]

use assert_cmd::Command;
use assert_fs::{NamedTempFile, fixture::FileWriteStr};
use predicates::{prelude::*, str::contains};
use rstest::{fixture, rstest};
use serde_json::json;
use viewstate_cli::validate::VALID_PRINT;

#[fixture]
fn cmd() -> Command {
    Command::cargo_bin("viewstate").unwrap()
}

#[fixture]
fn val_cmd(mut cmd: Command) -> Command {
    cmd.arg("validate");
    cmd
}

/// A state with a delta root, an unchanged facet and a child saved in full.
#[fixture]
fn test_state() -> String {
    json!({
        "state": {
            "mode": "delta",
            "properties": ["title", {"t": "str", "v": "Hi"}, "style_class", {"t": "null"}]
        },
        "facets": {"header": {}},
        "children": [{
            "state": {
                "mode": "full",
                "id": "name",
                "listeners": {"t": "list", "v": [
                    {"t": "attached", "v": {"ty": "visits", "state": {"t": "int", "v": 1}}}
                ]},
                "properties": ["value", {"t": "str", "v": "ada"}]
            }
        }]
    })
    .to_string()
}

#[fixture]
fn test_state_file(test_state: String) -> NamedTempFile {
    let file = NamedTempFile::new("state.json").unwrap();
    file.write_str(&test_state).unwrap();
    file
}

#[rstest]
fn test_doesnt_exist(mut val_cmd: Command) {
    val_cmd.arg("foobar");
    val_cmd
        .assert()
        .failure()
        .stderr(contains("No such file or directory"));
}

#[rstest]
fn test_validate(test_state_file: NamedTempFile, mut val_cmd: Command) {
    val_cmd.arg(test_state_file.path());
    val_cmd.assert().success().stderr(contains(VALID_PRINT));
}

#[rstest]
fn test_stdin(test_state: String, mut val_cmd: Command) {
    val_cmd.write_stdin(test_state);
    val_cmd.arg("-");
    val_cmd.assert().success().stderr(contains(VALID_PRINT));
}

#[rstest]
fn test_stdin_silent(test_state: String, mut val_cmd: Command) {
    val_cmd.args(["-", "-q"]);
    val_cmd.write_stdin(test_state);
    val_cmd
        .assert()
        .success()
        .stderr(contains(VALID_PRINT).not());
}

#[rstest]
fn test_delta_marker_in_full_state(mut val_cmd: Command) {
    let state = json!({
        "children": [{
            "state": {"mode": "full", "properties": ["value", {"t": "null"}]}
        }]
    });
    val_cmd.write_stdin(state.to_string());
    val_cmd
        .assert()
        .failure()
        .stderr(contains("invalid state at /children/0"))
        .stderr(contains("null marker for property `value`"));
}

#[rstest]
fn test_unpaired_property(mut val_cmd: Command) {
    val_cmd.write_stdin(r#"{"state": {"mode": "delta", "properties": ["value"]}}"#);
    val_cmd
        .assert()
        .failure()
        .stderr(contains("Error parsing input"));
}

#[rstest]
fn test_not_json(mut val_cmd: Command) {
    val_cmd.write_stdin("not a state");
    val_cmd
        .assert()
        .failure()
        .stderr(contains("Error parsing input"));
}

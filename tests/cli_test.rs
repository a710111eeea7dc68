//! Integration tests for top-level CLI behavior

mod common;

use common::{stderr, stdout, TestWorkdir};

#[test]
fn test_help_lists_subcommands() {
    let workdir = TestWorkdir::new();
    let output = workdir.run(&["--help"], &[]);

    assert!(output.status.success());
    let out = stdout(&output);
    for command in ["run", "sync", "plan", "doctor"] {
        assert!(out.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_version_flag() {
    let workdir = TestWorkdir::new();
    let output = workdir.run(&["--version"], &[]);

    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_subcommand_is_rejected() {
    let workdir = TestWorkdir::new();
    let output = workdir.run(&["bogus"], &[]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("bogus"));
}

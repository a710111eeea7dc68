//! Integration tests for `comfyboot plan`

mod common;

use common::{stdout, TestWorkdir, SAMPLE_CONFIG};

#[test]
fn test_plan_empty_workdir() {
    let workdir = TestWorkdir::new();
    let output = workdir.run(&["plan"], &[]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("No config files found"));
    assert!(out.contains("Nothing to do"));
}

#[test]
fn test_plan_lists_first_boot_operations() {
    let workdir = TestWorkdir::with_comfyui();
    workdir.create_file("boot_config/10-base.toml", SAMPLE_CONFIG);

    let output = workdir.run(&["plan"], &[]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Install nodes (2):"));
    assert!(out.contains("comfyui-kjnodes (registry) @ 1.0.5"));
    assert!(out.contains("comfyui_essentials (git)"));
    assert!(out.contains("Download models (1):"));
    assert!(!workdir.file_exists(".cache/prev-state.json"));
}

#[test]
fn test_plan_json_reflects_previous_state() {
    let workdir = TestWorkdir::with_comfyui();
    workdir.create_file("boot_config/base.toml", SAMPLE_CONFIG);
    let previous = serde_json::json!({
        "custom_nodes": [
            {"name": "comfyui-kjnodes", "source": "registry", "version": "1.0.5",
             "path": workdir.path().join("comfyui/custom_nodes/comfyui-kjnodes")},
            {"name": "was-node-suite", "source": "registry", "version": "nightly",
             "path": workdir.path().join("comfyui/custom_nodes/was-node-suite")}
        ],
        "models": []
    });
    workdir.create_file(".cache/prev-state.json", &previous.to_string());

    let output = workdir.run(&["--json", "plan"], &[]);
    assert!(output.status.success());
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    let install = plan["nodes"]["install"].as_array().unwrap();
    assert_eq!(install.len(), 1);
    assert_eq!(install[0]["name"], "comfyui_essentials");
    let remove = plan["nodes"]["remove"].as_array().unwrap();
    assert_eq!(remove[0]["name"], "was-node-suite");
    assert_eq!(plan["changes"], true);
}

#[test]
fn test_plan_respects_exclude_filter() {
    let workdir = TestWorkdir::new();
    workdir.create_file("boot_config/base.toml", SAMPLE_CONFIG);

    let output = workdir.run(&["--json", "plan"], &[("BOOT_CONFIG_EXCLUDE", "base")]);
    assert!(output.status.success());
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["config_files"].as_array().unwrap().len(), 0);
    assert_eq!(plan["changes"], false);
}

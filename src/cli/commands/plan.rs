//! CLI command for `comfyboot plan`
//!
//! Prints the operations the next boot would perform.

use anyhow::Result;

use crate::cli::output::{is_json, print_detail, print_info, print_success};
use crate::config::Settings;
use crate::core::plan::{build_plan, BootPlan};

/// Execute the plan command
pub async fn execute(settings: &Settings) -> Result<()> {
    let plan = build_plan(settings);

    if is_json() {
        println!("{}", serde_json::to_string_pretty(&plan_json(&plan))?);
        return Ok(());
    }

    if plan.config_files.is_empty() {
        print_info("No config files found");
    } else {
        print_info(&format!("Config files ({}):", plan.config_files.len()));
        for file in &plan.config_files {
            print_detail(&file.display().to_string());
        }
    }

    if plan.is_empty() {
        print_success("Nothing to do");
        return Ok(());
    }

    if let Some(nodes) = &plan.nodes {
        print_section("Install nodes", nodes.install.iter());
        print_section("Remove nodes", nodes.remove.iter());
    }
    if let Some(models) = &plan.models {
        print_section("Move models", models.moves.iter());
        print_section("Remove models", models.remove.iter());
        print_section("Download models", plan.missing_models().into_iter());
    }
    Ok(())
}

fn print_section<T: std::fmt::Display>(title: &str, items: impl ExactSizeIterator<Item = T>) {
    if items.len() == 0 {
        return;
    }
    print_info(&format!("{title} ({}):", items.len()));
    for item in items {
        print_detail(&item.to_string());
    }
}

fn plan_json(plan: &BootPlan) -> serde_json::Value {
    let nodes = plan.nodes.as_ref().map(|nodes| {
        serde_json::json!({
            "install": nodes.install,
            "remove": nodes.remove,
            "setup_existing": nodes.setup_existing,
        })
    });
    let models = plan.models.as_ref().map(|models| {
        serde_json::json!({
            "move": models.moves.iter().map(|m| serde_json::json!({
                "from": m.from.path,
                "to": m.to.path,
            })).collect::<Vec<_>>(),
            "remove": models.remove,
            "download": plan.missing_models(),
        })
    });
    serde_json::json!({
        "config_files": plan.config_files,
        "nodes": nodes,
        "models": models,
        "changes": !plan.is_empty(),
    })
}

//! Dry-run planning
//!
//! Resolves config and previous state into the operations the next boot would
//! perform, without touching the installation.

use std::path::PathBuf;

use crate::config::Settings;
use crate::core::boot_config::{load_boot_config, BootConfig};
use crate::core::launcher::BootInputs;
use crate::core::models::{plan_models, Model, ModelPlan};
use crate::core::nodes::{plan_nodes, NodePlan};
use crate::core::state::peek_state;

/// Operations the next boot would perform
#[derive(Debug, Clone, Default)]
pub struct BootPlan {
    /// Config files that would be merged, in merge order
    pub config_files: Vec<PathBuf>,
    /// Node operations, `None` when node sync is disabled or has nothing to do
    pub nodes: Option<NodePlan>,
    /// Model operations, `None` when model sync is disabled or nothing is configured
    pub models: Option<ModelPlan>,
}

impl BootPlan {
    /// Models queued for download that are not on disk yet
    pub fn missing_models(&self) -> Vec<&Model> {
        self.models
            .iter()
            .flat_map(|plan| plan.download.iter())
            .filter(|m| !m.exists())
            .collect()
    }

    /// Whether the next boot would change nothing
    pub fn is_empty(&self) -> bool {
        self.nodes.is_none()
            && self.models.as_ref().map_or(true, |plan| {
                plan.moves.is_empty() && plan.remove.is_empty() && self.missing_models().is_empty()
            })
    }
}

/// Plan the next boot
pub fn build_plan(settings: &Settings) -> BootPlan {
    let previous = peek_state(&settings.state_path());
    let config = if settings.config_dir().is_file() {
        BootConfig::default()
    } else {
        load_boot_config(
            &settings.config_dir(),
            settings.config_include.as_deref(),
            settings.config_exclude.as_deref(),
        )
    };
    let config_files = config.files.clone();
    let inputs = BootInputs::resolve(settings, config, &previous);

    let nodes = (settings.init_node && !inputs.nodes.is_empty())
        .then(|| plan_nodes(&inputs.nodes, &inputs.previous_nodes))
        .filter(|plan| !plan.is_empty());
    let models = (settings.init_model && !inputs.models.is_empty())
        .then(|| plan_models(&inputs.models, &inputs.previous_models));

    BootPlan {
        config_files,
        nodes,
        models,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::settings_for;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_config(workdir: &Path, name: &str, content: &str) {
        let dir = workdir.join("boot_config");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), content).unwrap();
    }

    const CONFIG: &str = r#"
[[custom_nodes]]
node_id = "comfyui-kjnodes"

[[custom_nodes]]
url = "https://github.com/cubiq/ComfyUI_essentials.git"

[[models]]
url = "https://huggingface.co/org/repo/resolve/main/vae.safetensors"
filename = "vae.safetensors"
dir = "models/vae"
"#;

    #[test]
    fn test_first_boot_installs_everything() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "10-base.toml", CONFIG);

        let plan = build_plan(&settings_for(temp.path(), &[]));
        assert_eq!(plan.config_files.len(), 1);
        let nodes = plan.nodes.as_ref().unwrap();
        assert_eq!(nodes.install.len(), 2);
        assert!(nodes.setup_existing);
        assert_eq!(plan.missing_models().len(), 1);
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_disabled_categories_are_not_planned() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "base.toml", CONFIG);

        let settings = settings_for(temp.path(), &[("INIT_NODE", "0"), ("INIT_MODEL", "no")]);
        let plan = build_plan(&settings);
        assert!(plan.nodes.is_none());
        assert!(plan.models.is_none());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_has_no_side_effects() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("boot_config"), "not a dir").unwrap();
        std::fs::create_dir_all(temp.path().join(".cache/prev-state.json")).unwrap();

        let plan = build_plan(&settings_for(temp.path(), &[]));
        assert!(plan.is_empty());
        assert!(temp.path().join("boot_config").is_file());
        assert!(temp.path().join(".cache/prev-state.json").is_dir());
    }
}

//! Test utilities for property-based testing
//!
//! This module provides generators for proptest and settings fixtures.

use std::collections::HashMap;
use std::path::Path;

use crate::config::Settings;

/// Settings rooted at `workdir`, with `extra` variables set
pub fn settings_for(workdir: &Path, extra: &[(&str, &str)]) -> Settings {
    let mut vars: HashMap<String, String> = extra
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    vars.insert("WORKDIR".to_string(), workdir.display().to_string());
    Settings::from_lookup(|key| vars.get(key).cloned())
}

pub mod generators {
    use proptest::prelude::*;

    /// Generate a registry node id (lowercase alphanumeric with hyphens)
    pub fn node_id() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,30}[a-z0-9]?".prop_filter("Id must not be empty", |s| !s.is_empty())
    }

    /// Generate a model filename
    pub fn model_filename() -> impl Strategy<Value = String> {
        (
            "[A-Za-z0-9][A-Za-z0-9_-]{0,30}",
            prop_oneof!["safetensors", "ckpt", "pth", "bin"],
        )
            .prop_map(|(stem, ext)| format!("{stem}.{ext}"))
    }

    /// Generate a model directory relative to ComfyUI
    pub fn model_dir() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("models/checkpoints".to_string()),
            Just("models/loras".to_string()),
            Just("models/vae".to_string()),
            Just("models/upscale_models".to_string()),
        ]
    }

    /// Generate a valid SHA256 hash (64 hex characters)
    pub fn sha256_hash() -> impl Strategy<Value = String> {
        "[0-9a-f]{64}"
    }

    /// Generate a Hugging Face resolve URL
    pub fn hf_url() -> impl Strategy<Value = String> {
        ("[a-z][a-z0-9-]{1,12}", "[a-z][a-z0-9_-]{1,20}", model_filename()).prop_map(
            |(org, repo, file)| format!("https://huggingface.co/{org}/{repo}/resolve/main/{file}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_settings_for_roots_paths() {
        let settings = settings_for(Path::new("/tmp/boot"), &[("INIT_MODEL", "false")]);
        assert_eq!(settings.comfyui_path, Path::new("/tmp/boot/comfyui"));
        assert!(!settings.init_model);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_node_id_generator(id in node_id()) {
            prop_assert!(!id.is_empty());
            prop_assert!(id.chars().next().unwrap().is_ascii_lowercase());
        }

        #[test]
        fn test_model_filename_generator(name in model_filename()) {
            prop_assert!(!name.contains('/'));
            prop_assert!(name.contains('.'));
        }

        #[test]
        fn test_sha256_generator(hash in sha256_hash()) {
            prop_assert_eq!(hash.len(), 64);
        }

        #[test]
        fn test_hf_url_generator(url in hf_url()) {
            prop_assert!(crate::core::url::is_huggingface_url(&url));
        }
    }
}

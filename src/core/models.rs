//! Model file synchronization
//!
//! Models are plain files under the ComfyUI root, identified by their path.
//! The previous boot is matched by URL so a model whose `dir` or `filename`
//! changed is moved instead of downloaded again.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::progress::{print_list_tree, warn_list_tree, Progress};
use crate::core::url::{is_civitai_url, is_huggingface_url, preprocess_url, set_query_param, HostRewrites};
use crate::error::{DownloadError, ModelError};
use crate::infra::download::{partial_path, progress_reporter, DownloadManager};
use crate::infra::filesystem;

/// Hugging Face download cache left next to models by `huggingface-cli`
const HF_CACHE_DIR: &str = ".cache";

/// aria2 control file suffix of an interrupted download
const ARIA2_SUFFIX: &str = ".aria2";

/// A model file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Source URL as configured
    pub url: String,
    /// File name inside `dir`
    pub filename: String,
    /// Directory relative to the ComfyUI root
    pub dir: PathBuf,
    /// Expected SHA256 of the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Absolute file location
    pub path: PathBuf,
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Model {}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir.join(&self.filename).display())
    }
}

impl Model {
    /// Whether the file is present
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Directory holding the file
    pub fn target_dir(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }

    /// Delete leftovers of interrupted downloads
    ///
    /// Removes the Hugging Face cache dir next to the model and, when an
    /// aria2 control file or `.part` file is found, that file together with
    /// the incomplete target.
    pub fn purge_redundancy(&self) -> Result<(), ModelError> {
        let io_err = |path: &Path, e: crate::error::FilesystemError| ModelError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        };

        let hf_cache = self.target_dir().join(HF_CACHE_DIR);
        if hf_cache.is_dir() {
            tracing::warn!("Found huggingface cache directory: {}, removing...", hf_cache.display());
            filesystem::remove_dir_all(&hf_cache).map_err(|e| io_err(hf_cache.as_path(), e))?;
        }

        let mut aria2_name = self.filename.clone();
        aria2_name.push_str(ARIA2_SUFFIX);
        let markers = [self.target_dir().join(aria2_name), partial_path(&self.path)];
        for marker in markers.iter().filter(|m| m.exists()) {
            tracing::warn!("Found incomplete download: {}, removing...", self.path.display());
            filesystem::remove_file(marker).map_err(|e| io_err(marker.as_path(), e))?;
            filesystem::remove_file(&self.path).map_err(|e| io_err(self.path.as_path(), e))?;
        }
        Ok(())
    }
}

/// Raw `models` entry
#[derive(Debug, Deserialize)]
struct ModelEntry {
    url: Option<String>,
    filename: Option<String>,
    dir: Option<String>,
    sha256: Option<String>,
}

/// Builds models from config entries relative to a ComfyUI root
#[derive(Debug, Clone)]
pub struct ModelFactory {
    comfyui_path: PathBuf,
}

impl ModelFactory {
    /// Create a factory placing models under `comfyui_path`
    pub fn new(comfyui_path: PathBuf) -> Self {
        Self { comfyui_path }
    }

    /// Parse and validate one config entry
    pub fn from_entry(&self, value: &toml::Value) -> Result<Model, ModelError> {
        let entry: ModelEntry = value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| ModelError::InvalidEntry(e.message().to_string()))?;
        let missing = |field: &str| ModelError::InvalidEntry(format!("missing '{field}'"));

        let url = entry.url.filter(|u| !u.trim().is_empty()).ok_or_else(|| missing("url"))?;
        let filename = entry
            .filename
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| missing("filename"))?;
        let dir = entry.dir.filter(|d| !d.trim().is_empty()).ok_or_else(|| missing("dir"))?;

        preprocess_url(&url, None).map_err(ModelError::InvalidEntry)?;
        if filename.contains('/') || filename.contains('\\') || filename == "." || filename == ".." {
            return Err(ModelError::InvalidEntry(format!("invalid filename '{filename}'")));
        }
        let dir = PathBuf::from(dir);
        if !dir.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
            return Err(ModelError::InvalidEntry(format!(
                "dir must be relative to ComfyUI: '{}'",
                dir.display()
            )));
        }

        Ok(Model {
            path: self.comfyui_path.join(&dir).join(&filename),
            url,
            filename,
            dir,
            sha256: entry.sha256.map(|s| s.trim().to_lowercase()),
        })
    }

    /// Re-anchor a model recorded by a previous boot to this installation
    pub fn rebase(&self, mut model: Model) -> Model {
        model.path = self.comfyui_path.join(&model.dir).join(&model.filename);
        model
    }

    /// Parse every entry, skipping invalid ones and duplicate paths
    pub fn load(&self, entries: &[toml::Value]) -> Vec<Model> {
        let models = entries
            .iter()
            .filter_map(|entry| match self.from_entry(entry) {
                Ok(model) => Some(model),
                Err(e) => {
                    tracing::warn!("Skip invalid model config: {e}\n{entry}");
                    None
                }
            })
            .collect();
        dedupe(models)
    }

    /// Re-anchor previously recorded models, dropping duplicates
    pub fn load_previous(&self, models: &[Model]) -> Vec<Model> {
        dedupe(models.iter().cloned().map(|m| self.rebase(m)).collect())
    }
}

fn dedupe(models: Vec<Model>) -> Vec<Model> {
    let mut unique: Vec<Model> = Vec::with_capacity(models.len());
    for model in models {
        if unique.contains(&model) {
            tracing::warn!("Skip duplicate model: {model}");
        } else {
            unique.push(model);
        }
    }
    unique
}

/// Relocation of a model recorded by the previous boot
#[derive(Debug, Clone)]
pub struct ModelMove {
    /// Previously recorded model
    pub from: Model,
    /// Configured model with the same URL
    pub to: Model,
}

impl fmt::Display for ModelMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from.path.display(), self.to.path.display())
    }
}

/// What a model sync will do
#[derive(Debug, Clone, Default)]
pub struct ModelPlan {
    /// Models to relocate
    pub moves: Vec<ModelMove>,
    /// Models to delete
    pub remove: Vec<Model>,
    /// Models to download (skipped when present)
    pub download: Vec<Model>,
}

impl ModelPlan {
    /// Whether there is nothing to do
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty() && self.remove.is_empty() && self.download.is_empty()
    }
}

/// Diff the configured models against the previous boot, keyed by URL
pub fn plan_models(current: &[Model], previous: &[Model]) -> ModelPlan {
    if previous.is_empty() {
        return ModelPlan {
            download: current.to_vec(),
            ..ModelPlan::default()
        };
    }

    let mut plan = ModelPlan::default();
    let mut handled: Vec<&str> = Vec::new();

    for model in current {
        if handled.contains(&model.url.as_str()) {
            plan.download.push(model.clone());
            continue;
        }
        handled.push(&model.url);
        match previous.iter().find(|p| p.url == model.url) {
            Some(prev) if prev.path != model.path => plan.moves.push(ModelMove {
                from: prev.clone(),
                to: model.clone(),
            }),
            _ => plan.download.push(model.clone()),
        }
    }

    plan.remove = previous
        .iter()
        .filter(|p| !current.iter().any(|c| c.url == p.url))
        .cloned()
        .collect();
    plan
}

/// Download credentials
#[derive(Debug, Clone, Default)]
pub struct ModelAuth {
    /// Hugging Face token, sent as a bearer header
    pub hf_token: Option<String>,
    /// Civitai token, sent as the `token` query parameter
    pub civitai_token: Option<String>,
}

/// Request URL and header for a model download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Final URL, rewritten and with credentials applied
    pub url: String,
    /// Extra header
    pub header: Option<(String, String)>,
}

/// Results of a model sync
#[derive(Debug, Clone, Default)]
pub struct ModelReport {
    /// Downloaded models
    pub downloaded: Vec<Model>,
    /// Deleted models
    pub removed: Vec<Model>,
    /// Relocated models
    pub moved: Vec<Model>,
    /// Models already present
    pub existed: Vec<Model>,
    /// Failed operations
    pub failed: Vec<Model>,
    /// Models to record as applied
    pub state: Vec<Model>,
    /// Configured models that ended up in place
    pub succeeded: usize,
    /// Configured model count
    pub total: usize,
}

enum StepOutcome {
    Done,
    Unchanged,
    Failed,
}

/// Synchronizes model files
#[derive(Debug, Clone)]
pub struct ModelSync {
    downloader: DownloadManager,
    auth: ModelAuth,
    rewrites: Option<HostRewrites>,
}

impl ModelSync {
    /// Create a synchronizer
    pub fn new(downloader: DownloadManager, auth: ModelAuth, rewrites: Option<HostRewrites>) -> Self {
        Self {
            downloader,
            auth,
            rewrites,
        }
    }

    /// Resolve the URL and header used to fetch `model`
    pub fn request_for(&self, model: &Model) -> Result<DownloadRequest, ModelError> {
        let mut url = preprocess_url(&model.url, self.rewrites.as_ref()).map_err(ModelError::InvalidEntry)?;
        let mut header = None;
        if is_huggingface_url(&url) {
            if let Some(token) = &self.auth.hf_token {
                header = Some(("Authorization".to_string(), format!("Bearer {token}")));
            }
        } else if is_civitai_url(&url) {
            if let Some(token) = &self.auth.civitai_token {
                url = set_query_param(&url, "token", token).map_err(ModelError::InvalidEntry)?;
            }
        }
        Ok(DownloadRequest { url, header })
    }

    /// Download `model` unless present
    async fn download(&self, model: &Model) -> StepOutcome {
        if model.exists() {
            tracing::info!("{} already exists in {}. Skipped.", model.filename, model.dir.display());
            return StepOutcome::Unchanged;
        }
        let request = match self.request_for(model) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!("Failed to download {}: {e}", model.filename);
                return StepOutcome::Failed;
            }
        };

        tracing::info!("Downloading {} to {}", model.filename, model.target_dir().display());
        let header = request.header.as_ref().map(|(k, v)| (k.as_str(), v.as_str()));
        let result = self
            .downloader
            .download_verified(
                &request.url,
                &model.path,
                header,
                model.sha256.as_deref(),
                Some(progress_reporter(&model.filename)),
            )
            .await;

        match result {
            Ok(done) => {
                tracing::info!("Downloaded {} ({} bytes)", model.filename, done.size);
                StepOutcome::Done
            }
            Err(e) => {
                let hint = match &e {
                    DownloadError::Unauthorized { .. } if is_huggingface_url(&request.url) => {
                        " Check HF_API_TOKEN."
                    }
                    DownloadError::Unauthorized { .. } if is_civitai_url(&request.url) => {
                        " Check CIVITAI_API_TOKEN."
                    }
                    _ => "",
                };
                let err = ModelError::Download {
                    filename: model.filename.clone(),
                    source: e,
                };
                tracing::error!("{err}{hint}");
                StepOutcome::Failed
            }
        }
    }

    fn remove(model: &Model) -> StepOutcome {
        if !model.exists() {
            tracing::info!("{} not found in {}. Skipped.", model.filename, model.dir.display());
            return StepOutcome::Unchanged;
        }
        tracing::info!("Removing model: {}", model.filename);
        match filesystem::remove_path(&model.path) {
            Ok(()) => {
                tracing::info!("Removed model: {}", model.filename);
                StepOutcome::Done
            }
            Err(e) => {
                tracing::error!("Failed to remove model {}: {e}", model.filename);
                StepOutcome::Failed
            }
        }
    }

    /// Bring model files in line with `current`
    ///
    /// Returns `None` when no models are configured.
    pub async fn sync(&self, current: &[Model], previous: &[Model]) -> Option<ModelReport> {
        if current.is_empty() {
            tracing::info!("No models in config");
            return None;
        }

        for model in current {
            if let Err(e) = model.purge_redundancy() {
                tracing::error!("{e}");
            }
        }

        let plan = plan_models(current, previous);
        let mut report = ModelReport {
            total: current.len(),
            ..ModelReport::default()
        };
        let mut retry_previous: Vec<Model> = Vec::new();
        let mut failed_current: Vec<Model> = Vec::new();
        let mut download = Vec::new();

        if !plan.moves.is_empty() {
            tracing::info!("Moving {} models:", plan.moves.len());
            print_list_tree(&plan.moves);
            let mut progress = Progress::new(plan.moves.len());
            for step in &plan.moves {
                progress.advance();
                tracing::info!("{progress} {step}");
                if !step.from.exists() {
                    tracing::warn!("{} not found, downloading instead", step.from.path.display());
                    download.push(step.to.clone());
                } else if step.to.exists() {
                    tracing::info!("{} already exists. Skipped.", step.to.path.display());
                    report.existed.push(step.to.clone());
                } else {
                    match filesystem::move_file(&step.from.path, &step.to.path) {
                        Ok(()) => report.moved.push(step.to.clone()),
                        Err(e) => {
                            tracing::error!("Failed to move model {}: {e}", step.from.filename);
                            report.failed.push(step.from.clone());
                            retry_previous.push(step.from.clone());
                            failed_current.push(step.to.clone());
                        }
                    }
                }
            }
        }

        if !plan.remove.is_empty() {
            tracing::info!("Removing {} models:", plan.remove.len());
            print_list_tree(&plan.remove);
            let mut progress = Progress::new(plan.remove.len());
            for model in &plan.remove {
                progress.advance();
                tracing::info!("{progress} {model}");
                match Self::remove(model) {
                    StepOutcome::Done => report.removed.push(model.clone()),
                    StepOutcome::Unchanged => {}
                    StepOutcome::Failed => {
                        report.failed.push(model.clone());
                        retry_previous.push(model.clone());
                    }
                }
            }
        }

        download.extend(plan.download);
        if !download.is_empty() {
            tracing::info!("Downloading {} models:", download.len());
            print_list_tree(&download);
            let mut progress = Progress::new(download.len());
            for model in &download {
                progress.advance();
                tracing::info!("{progress} {model}");
                match self.download(model).await {
                    StepOutcome::Done => report.downloaded.push(model.clone()),
                    StepOutcome::Unchanged => report.existed.push(model.clone()),
                    StepOutcome::Failed => {
                        report.failed.push(model.clone());
                        failed_current.push(model.clone());
                    }
                }
            }
        }

        if !report.failed.is_empty() {
            tracing::warn!("{} model operations failed:", report.failed.len());
            warn_list_tree(&report.failed);
        }

        report.state = current
            .iter()
            .filter(|m| !failed_current.contains(m))
            .cloned()
            .chain(retry_previous.into_iter().filter(|m| !current.contains(m)))
            .collect();
        report.succeeded = current.iter().filter(|m| !failed_current.contains(m)).count();
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::generators::{hf_url, model_dir, model_filename};
    use proptest::prelude::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entries(toml_src: &str) -> Vec<toml::Value> {
        let table: toml::Table = toml_src.parse().unwrap();
        table["models"].as_array().unwrap().clone()
    }

    fn model(root: &Path, url: &str, dir: &str, filename: &str) -> Model {
        ModelFactory::new(root.to_path_buf())
            .from_entry(&toml::Value::Table(
                [
                    ("url".to_string(), toml::Value::String(url.to_string())),
                    ("dir".to_string(), toml::Value::String(dir.to_string())),
                    ("filename".to_string(), toml::Value::String(filename.to_string())),
                ]
                .into_iter()
                .collect(),
            ))
            .unwrap()
    }

    fn syncer() -> ModelSync {
        ModelSync::new(DownloadManager::with_config(1, 10), ModelAuth::default(), None)
    }

    #[test]
    fn test_entry_validation() {
        let temp = TempDir::new().unwrap();
        let models = ModelFactory::new(temp.path().to_path_buf()).load(&entries(
            r#"models = [
                { url = "https://huggingface.co/a/b/resolve/main/x.safetensors", dir = "models/checkpoints", filename = "x.safetensors" },
                { url = "https://example.com/y", dir = "models/loras" },
                { url = "https://example.com/y", dir = "/etc", filename = "y" },
                { url = "https://example.com/y", dir = "models/../../etc", filename = "y" },
                { url = "https://example.com/y", dir = "models", filename = "sub/y" },
                { url = "nope", dir = "models", filename = "y" },
            ]"#,
        ));
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].path, temp.path().join("models/checkpoints/x.safetensors"));
        assert_eq!(models[0].to_string(), "models/checkpoints/x.safetensors");
    }

    #[test]
    fn test_duplicate_paths_are_skipped_in_order() {
        let temp = TempDir::new().unwrap();
        let models = ModelFactory::new(temp.path().to_path_buf()).load(&entries(
            r#"models = [
                { url = "https://a.example/2", dir = "models/vae", filename = "b.pt" },
                { url = "https://a.example/1", dir = "models/vae", filename = "a.pt" },
                { url = "https://a.example/3", dir = "models/vae", filename = "b.pt" },
            ]"#,
        ));
        let urls: Vec<_> = models.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(urls, ["https://a.example/2", "https://a.example/1"]);
    }

    #[test]
    fn test_plan_moves_removes_and_downloads() {
        let root = Path::new("/comfy");
        let previous = vec![
            model(root, "https://x/1", "models/loras", "one.safetensors"),
            model(root, "https://x/2", "models/loras", "two.safetensors"),
            model(root, "https://x/3", "models/loras", "three.safetensors"),
        ];
        let current = vec![
            model(root, "https://x/1", "models/loras/style", "one.safetensors"),
            model(root, "https://x/2", "models/loras", "two.safetensors"),
            model(root, "https://x/1", "models/checkpoints", "one-copy.safetensors"),
            model(root, "https://x/4", "models/vae", "four.pt"),
        ];

        let plan = plan_models(&current, &previous);
        assert_eq!(plan.moves.len(), 1);
        assert_eq!(plan.moves[0].to.dir, PathBuf::from("models/loras/style"));
        assert_eq!(
            plan.remove.iter().map(|m| m.url.as_str()).collect::<Vec<_>>(),
            ["https://x/3"]
        );
        assert_eq!(
            plan.download.iter().map(|m| m.filename.as_str()).collect::<Vec<_>>(),
            ["two.safetensors", "one-copy.safetensors", "four.pt"]
        );
    }

    #[test]
    fn test_plan_without_previous_downloads_all() {
        let root = Path::new("/comfy");
        let current = vec![model(root, "https://x/1", "models", "a")];
        let plan = plan_models(&current, &[]);
        assert_eq!(plan.download.len(), 1);
        assert!(plan.moves.is_empty() && plan.remove.is_empty());
    }

    #[test]
    fn test_request_adds_credentials() {
        let root = Path::new("/comfy");
        let sync = ModelSync::new(
            DownloadManager::new(),
            ModelAuth {
                hf_token: Some("hf_abc".to_string()),
                civitai_token: Some("civ".to_string()),
            },
            None,
        );

        let hf = sync
            .request_for(&model(root, "https://huggingface.co/o/r/resolve/main/m.gguf", "models", "m.gguf"))
            .unwrap();
        assert_eq!(hf.header, Some(("Authorization".to_string(), "Bearer hf_abc".to_string())));

        let civitai = sync
            .request_for(&model(root, "https://civitai.com/api/download/models/9?token=old", "models", "c"))
            .unwrap();
        assert_eq!(civitai.url, "https://civitai.com/api/download/models/9?token=civ");
        assert!(civitai.header.is_none());

        let other = sync
            .request_for(&model(root, "https://example.com/f.bin", "models", "f.bin"))
            .unwrap();
        assert_eq!(other.url, "https://example.com/f.bin");
        assert!(other.header.is_none());
    }

    #[test]
    fn test_request_rewrites_to_mirror_with_token() {
        let root = Path::new("/comfy");
        let sync = ModelSync::new(
            DownloadManager::new(),
            ModelAuth {
                hf_token: Some("hf_abc".to_string()),
                civitai_token: None,
            },
            Some(HostRewrites::new("https://hf-mirror.com", "https://civitai.work")),
        );
        let request = sync
            .request_for(&model(root, "https://huggingface.co/o/r/resolve/main/m.gguf", "models", "m.gguf"))
            .unwrap();
        assert_eq!(request.url, "https://hf-mirror.com/o/r/resolve/main/m.gguf");
        assert!(request.header.is_some());
    }

    #[test]
    fn test_purge_removes_partial_downloads() {
        let temp = TempDir::new().unwrap();
        let m = model(temp.path(), "https://x/1", "models/unet", "flux.safetensors");
        let dir = temp.path().join("models/unet");
        std::fs::create_dir_all(dir.join(".cache/huggingface")).unwrap();
        std::fs::write(&m.path, b"half").unwrap();
        std::fs::write(dir.join("flux.safetensors.aria2"), b"ctl").unwrap();

        m.purge_redundancy().unwrap();
        assert!(!dir.join(".cache").exists());
        assert!(!dir.join("flux.safetensors.aria2").exists());
        assert!(!m.path.exists());
    }

    #[test]
    fn test_purge_keeps_complete_files() {
        let temp = TempDir::new().unwrap();
        let m = model(temp.path(), "https://x/1", "models/unet", "flux.safetensors");
        std::fs::create_dir_all(m.target_dir()).unwrap();
        std::fs::write(&m.path, b"whole").unwrap();

        m.purge_redundancy().unwrap();
        assert!(m.path.exists());
    }

    #[tokio::test]
    async fn test_sync_downloads_and_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vae.pt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"vae".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.pt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let current = vec![
            model(temp.path(), &format!("{}/vae.pt", server.uri()), "models/vae", "vae.pt"),
            model(temp.path(), &format!("{}/missing.pt", server.uri()), "models/vae", "missing.pt"),
        ];

        let report = syncer().sync(&current, &[]).await.unwrap();
        assert_eq!(report.downloaded.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.total, 2);
        assert_eq!(report.state, vec![current[0].clone()]);
        assert_eq!(std::fs::read(&current[0].path).unwrap(), b"vae");
    }

    #[tokio::test]
    async fn test_sync_existing_file_is_not_downloaded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new".to_vec()))
            .expect(0)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let m = model(temp.path(), &format!("{}/a.pt", server.uri()), "models", "a.pt");
        std::fs::create_dir_all(m.target_dir()).unwrap();
        std::fs::write(&m.path, b"old").unwrap();

        let report = syncer().sync(&[m.clone()], &[m.clone()]).await.unwrap();
        assert_eq!(report.existed.len(), 1);
        assert_eq!(std::fs::read(&m.path).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_sync_moves_and_removes() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let old = model(root, "https://x/1", "models/loras", "a.safetensors");
        let stale = model(root, "https://x/2", "models/loras", "b.safetensors");
        for m in [&old, &stale] {
            std::fs::create_dir_all(m.target_dir()).unwrap();
            std::fs::write(&m.path, b"w").unwrap();
        }
        let moved = model(root, "https://x/1", "models/loras/sdxl", "a.safetensors");

        let report = syncer()
            .sync(&[moved.clone()], &[old.clone(), stale.clone()])
            .await
            .unwrap();
        assert_eq!(report.moved.len(), 1);
        assert_eq!(report.removed.len(), 1);
        assert!(moved.path.exists());
        assert!(!old.path.exists());
        assert!(!stale.path.exists());
        assert_eq!(report.state, vec![moved]);
    }

    #[tokio::test]
    async fn test_move_with_missing_source_downloads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let url = format!("{}/a", server.uri());
        let old = model(temp.path(), &url, "models/old", "a");
        let new = model(temp.path(), &url, "models/new", "a");

        let report = syncer().sync(&[new.clone()], &[old]).await.unwrap();
        assert_eq!(report.downloaded.len(), 1);
        assert_eq!(std::fs::read(&new.path).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_empty_config_does_nothing() {
        let temp = TempDir::new().unwrap();
        let prev = model(temp.path(), "https://x/1", "models", "a");
        assert!(syncer().sync(&[], &[prev]).await.is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every configured model is either moved or queued for download,
        /// and only URLs that left the config are removed
        #[test]
        fn prop_plan_covers_every_model(
            entries in proptest::collection::vec((hf_url(), model_dir(), model_filename()), 1..6),
            moved in proptest::collection::vec(model_dir(), 1..6),
            keep in 0usize..6,
        ) {
            let root = Path::new("/workspace/comfyui");
            let current: Vec<Model> = entries
                .iter()
                .map(|(url, dir, file)| model(root, url, dir, file))
                .collect();
            let previous: Vec<Model> = entries
                .iter()
                .zip(moved.iter().cycle())
                .take(keep)
                .map(|((url, _, file), dir)| model(root, url, dir, file))
                .chain(std::iter::once(model(root, "https://gone.example/x", "models", "x")))
                .collect();

            let plan = plan_models(&current, &previous);
            prop_assert_eq!(plan.moves.len() + plan.download.len(), current.len());
            prop_assert!(plan.moves.iter().all(|m| m.from.url == m.to.url && m.from.path != m.to.path));
            prop_assert!(plan.remove.iter().all(|p| !current.iter().any(|c| c.url == p.url)));
            prop_assert!(plan.remove.iter().any(|p| p.url == "https://gone.example/x"));
        }
    }
}

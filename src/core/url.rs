//! URL helpers
//!
//! Host classification, mirror rewriting and query manipulation for node and
//! model URLs.

use regex::Regex;
use reqwest::Url;

use crate::config::urls::{CIVITAI_HOSTS, CIVITAI_ENDPOINT, HF_ENDPOINT, HF_HOSTS};

/// Host and port of a URL, as it appears in the authority
pub fn netloc(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Host rewrites from official hosts to mirror endpoints
#[derive(Debug, Clone)]
pub struct HostRewrites {
    rules: Vec<(String, Url)>,
}

impl HostRewrites {
    /// Build rewrites sending Hugging Face and Civitai to the given endpoints
    pub fn new(hf_endpoint: &str, civitai_endpoint: &str) -> Self {
        let mut rules = Vec::new();
        let pairs = [(HF_ENDPOINT, hf_endpoint), (CIVITAI_ENDPOINT, civitai_endpoint)];
        for (official_raw, endpoint) in pairs {
            let (Ok(official), Ok(target)) = (Url::parse(official_raw), Url::parse(endpoint)) else {
                tracing::warn!("Ignoring invalid mirror endpoint: {endpoint}");
                continue;
            };
            rules.push((netloc(&official), target));
        }
        Self { rules }
    }

    /// Rewrite the host of `url` when it matches a rule
    fn apply(&self, url: &mut Url) {
        let current = netloc(url);
        let Some((_, target)) = self.rules.iter().find(|(from, _)| *from == current) else {
            return;
        };
        if url.set_host(target.host_str()).is_ok() {
            let _ = url.set_port(target.port());
        }
    }
}

/// Validate a config URL and apply mirror rewrites
///
/// scp-like git remotes (`git@host:owner/repo.git`) pass through untouched.
pub fn preprocess_url(raw: &str, rewrites: Option<&HostRewrites>) -> Result<String, String> {
    if scp_like_parts(raw).is_some() {
        return Ok(raw.to_string());
    }
    let mut url = Url::parse(raw).map_err(|_| format!("Invalid URL: {raw}"))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(format!("Invalid URL: {raw}"));
    }
    if let Some(rewrites) = rewrites {
        rewrites.apply(&mut url);
        return Ok(url.to_string());
    }
    Ok(raw.to_string())
}

fn host_in(url: &str, hosts: &[&str]) -> bool {
    Url::parse(url)
        .ok()
        .is_some_and(|u| hosts.contains(&netloc(&u).as_str()))
}

/// Whether `url` points at Hugging Face or its mirror
pub fn is_huggingface_url(url: &str) -> bool {
    host_in(url, HF_HOSTS)
}

/// Whether `url` points at Civitai or its mirror
pub fn is_civitai_url(url: &str) -> bool {
    host_in(url, CIVITAI_HOSTS)
}

/// Set (or replace) a query parameter, keeping the other parameters in order
pub fn set_query_param(url: &str, key: &str, value: &str) -> Result<String, String> {
    let mut parsed = Url::parse(url).map_err(|e| format!("Invalid URL '{url}': {e}"))?;
    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    match pairs.iter_mut().find(|(k, _)| k == key) {
        Some(pair) => pair.1 = value.to_string(),
        None => pairs.push((key.to_string(), value.to_string())),
    }
    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    Ok(parsed.to_string())
}

fn scp_like_parts(raw: &str) -> Option<(String, String)> {
    if raw.contains("://") {
        return None;
    }
    let re = Regex::new(r"^[A-Za-z0-9._-]+@([^:/]+):(.+)$").ok()?;
    let caps = re.captures(raw)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Repository name of a git remote, lowercased, without `.git`
pub fn git_repo_name(raw: &str) -> Option<String> {
    let path = match scp_like_parts(raw) {
        Some((_, path)) => path,
        None => {
            let url = Url::parse(raw).ok()?;
            url.host_str()?;
            url.path().to_string()
        }
    };
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    let name = segment.strip_suffix(".git").unwrap_or(segment);
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_netloc_with_port() {
        let url = Url::parse("http://localhost:8080/a").unwrap();
        assert_eq!(netloc(&url), "localhost:8080");
        let url = Url::parse("https://huggingface.co/a").unwrap();
        assert_eq!(netloc(&url), "huggingface.co");
    }

    #[test]
    fn test_preprocess_rejects_hostless() {
        assert!(preprocess_url("not a url", None).is_err());
        assert!(preprocess_url("file:///tmp/x", None).is_err());
    }

    #[test]
    fn test_preprocess_without_rewrites_is_identity() {
        let raw = "https://github.com/ltdrdata/ComfyUI-Impact-Pack";
        assert_eq!(preprocess_url(raw, None).unwrap(), raw);
    }

    #[test]
    fn test_preprocess_rewrites_official_hosts() {
        let rewrites = HostRewrites::new("https://hf-mirror.com", "https://civitai.work");
        let hf = preprocess_url(
            "https://huggingface.co/org/repo/resolve/main/model.safetensors",
            Some(&rewrites),
        )
        .unwrap();
        assert_eq!(hf, "https://hf-mirror.com/org/repo/resolve/main/model.safetensors");

        let civitai =
            preprocess_url("https://civitai.com/api/download/models/1?type=Model", Some(&rewrites))
                .unwrap();
        assert_eq!(civitai, "https://civitai.work/api/download/models/1?type=Model");

        let github = preprocess_url("https://github.com/a/b", Some(&rewrites)).unwrap();
        assert_eq!(github, "https://github.com/a/b");
    }

    #[test]
    fn test_rewrite_to_endpoint_with_port() {
        let rewrites = HostRewrites::new("http://127.0.0.1:9000", "https://civitai.com");
        let url = preprocess_url("https://huggingface.co/a/b", Some(&rewrites)).unwrap();
        assert_eq!(url, "https://127.0.0.1:9000/a/b");
    }

    #[test]
    fn test_host_classification() {
        assert!(is_huggingface_url("https://huggingface.co/a/b"));
        assert!(is_huggingface_url("https://hf-mirror.com/a/b"));
        assert!(is_huggingface_url("https://hf.co/a"));
        assert!(!is_huggingface_url("https://example.com/huggingface.co"));
        assert!(is_civitai_url("https://civitai.com/api/download/models/1"));
        assert!(is_civitai_url("https://civitai.work/api/download/models/1"));
        assert!(!is_civitai_url("https://huggingface.co/a"));
    }

    #[test]
    fn test_set_query_param_appends() {
        let url = set_query_param("https://civitai.com/api/download/models/1?type=Model", "token", "abc")
            .unwrap();
        assert_eq!(url, "https://civitai.com/api/download/models/1?type=Model&token=abc");
    }

    #[test]
    fn test_set_query_param_replaces_in_place() {
        let url = set_query_param("https://civitai.com/x?token=old&format=SafeTensor", "token", "new")
            .unwrap();
        assert_eq!(url, "https://civitai.com/x?token=new&format=SafeTensor");
    }

    #[test]
    fn test_git_repo_name() {
        assert_eq!(
            git_repo_name("https://github.com/ltdrdata/ComfyUI-Impact-Pack").as_deref(),
            Some("comfyui-impact-pack")
        );
        assert_eq!(
            git_repo_name("https://github.com/cubiq/ComfyUI_IPAdapter_plus.git").as_deref(),
            Some("comfyui_ipadapter_plus")
        );
        assert_eq!(
            git_repo_name("git@github.com:kijai/ComfyUI-KJNodes.git").as_deref(),
            Some("comfyui-kjnodes")
        );
        assert_eq!(
            git_repo_name("https://github.com/owner/repo/").as_deref(),
            Some("repo")
        );
        assert_eq!(git_repo_name("https://github.com/"), None);
        assert_eq!(git_repo_name("nonsense"), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Repository names are derived the same way with or without `.git`
        #[test]
        fn prop_git_suffix_ignored(owner in "[a-z][a-z0-9-]{0,10}", repo in "[A-Za-z][A-Za-z0-9_-]{0,20}") {
            let plain = git_repo_name(&format!("https://github.com/{owner}/{repo}"));
            let suffixed = git_repo_name(&format!("https://github.com/{owner}/{repo}.git"));
            prop_assert_eq!(plain.clone(), suffixed);
            prop_assert_eq!(plain, Some(repo.to_lowercase()));
        }
    }
}

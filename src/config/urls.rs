//! Upstream and mirror endpoints

/// Official Hugging Face endpoint
pub const HF_ENDPOINT: &str = "https://huggingface.co";

/// Hugging Face mirror used with `CN_NETWORK`
pub const HF_MIRROR_ENDPOINT: &str = "https://hf-mirror.com";

/// Official Civitai endpoint
pub const CIVITAI_ENDPOINT: &str = "https://civitai.com";

/// Civitai mirror used with `CN_NETWORK`
pub const CIVITAI_MIRROR_ENDPOINT: &str = "https://civitai.work";

/// PyPI mirror used with `CN_NETWORK`
pub const PIP_MIRROR_INDEX: &str = "https://mirrors.ustc.edu.cn/pypi/web/simple";

/// Hosts that serve Hugging Face files
pub const HF_HOSTS: &[&str] = &["hf.co", "huggingface.co", "huggingface.com", "hf-mirror.com"];

/// Hosts that serve Civitai files
pub const CIVITAI_HOSTS: &[&str] = &["civitai.com", "civitai.work"];

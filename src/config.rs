use std::path::PathBuf;

use crate::gate::GatePolicy;

/// Shared rate series used to align J in the normalized layout.
pub const DEFAULT_RATE_FILE: &str = "SELIC_D_11.csv";

#[derive(Debug, Clone)]
pub struct Config {
    pub results_dir: PathBuf,
    pub core_dir: PathBuf,
    pub normalized_dir: PathBuf,
    pub rate_file: String,
    pub asset_dictionary: PathBuf,
    pub bind: String,
    pub policy: GatePolicy,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            results_dir: env_path("ASSYNTRAX_RESULTS_DIR", "results"),
            core_dir: env_path("ASSYNTRAX_CORE_DIR", "data/realestate/core"),
            normalized_dir: env_path("ASSYNTRAX_NORMALIZED_DIR", "data/realestate/normalized"),
            rate_file: std::env::var("ASSYNTRAX_RATE_FILE").unwrap_or_else(|_| DEFAULT_RATE_FILE.to_string()),
            asset_dictionary: env_path("ASSYNTRAX_ASSET_DICTIONARY", "data/realestate/assets_dictionary.json"),
            bind: std::env::var("ASSYNTRAX_BIND").unwrap_or_else(|_| "127.0.0.1:3100".to_string()),
            policy: GatePolicy::from_env(),
        }
    }

    /// Layout rooted at a single directory, used by tests and the CLI `--root` flag.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            results_dir: root.join("results"),
            core_dir: root.join("data/realestate/core"),
            normalized_dir: root.join("data/realestate/normalized"),
            rate_file: DEFAULT_RATE_FILE.to_string(),
            asset_dictionary: root.join("data/realestate/assets_dictionary.json"),
            bind: "127.0.0.1:0".to_string(),
            policy: GatePolicy::default(),
        }
    }

    pub fn regimes_dir(&self) -> PathBuf {
        self.results_dir.join("realestate").join("assets")
    }

    pub fn hmm_dir(&self) -> PathBuf {
        self.results_dir.join("realestate").join("hmm")
    }
}

fn env_path(name: &str, default: &str) -> PathBuf {
    std::env::var(name)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_layout_derives_result_subdirs() {
        let cfg = Config::rooted("/srv/assyntrax");
        assert_eq!(cfg.regimes_dir(), PathBuf::from("/srv/assyntrax/results/realestate/assets"));
        assert_eq!(cfg.hmm_dir(), PathBuf::from("/srv/assyntrax/results/realestate/hmm"));
        assert_eq!(cfg.core_dir, PathBuf::from("/srv/assyntrax/data/realestate/core"));
        assert_eq!(cfg.rate_file, DEFAULT_RATE_FILE);
    }
}

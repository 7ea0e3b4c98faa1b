//! Check run configuration

use crate::platform::host_system;
use crate::store::DEFAULT_STORE_DIR;
use serde::{Deserialize, Serialize};

/// Configuration for one check run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Current platform; only `checks.<system>` targets are built
    pub system: String,
    /// Build collected targets after a successful validation pass
    pub build: bool,
    /// Store directory that derivation and program paths must live in
    pub store_dir: String,
    /// Program used to realise store derivations
    pub nix_store_program: String,
    /// Build timeout in seconds (0 = no timeout)
    pub build_timeout_secs: u64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        CheckConfig {
            system: std::env::var("FLAKE_CHECK_SYSTEM").unwrap_or_else(|_| host_system()),
            build: true,
            store_dir: std::env::var("NIX_STORE_DIR")
                .unwrap_or_else(|_| DEFAULT_STORE_DIR.to_string()),
            nix_store_program: std::env::var("FLAKE_CHECK_NIX_STORE")
                .unwrap_or_else(|_| "nix-store".to_string()),
            build_timeout_secs: std::env::var("FLAKE_CHECK_BUILD_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }
}

impl CheckConfig {
    /// Create a config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create a config for a specific platform, ignoring the environment
    pub fn new(system: &str) -> Self {
        CheckConfig {
            system: system.to_string(),
            build: true,
            store_dir: DEFAULT_STORE_DIR.to_string(),
            nix_store_program: "nix-store".to_string(),
            build_timeout_secs: 0,
        }
    }

    pub fn with_system(mut self, system: &str) -> Self {
        self.system = system.to_string();
        self
    }

    /// Validation-only mode when `build` is false
    pub fn with_build(mut self, build: bool) -> Self {
        self.build = build;
        self
    }

    pub fn with_store_dir(mut self, store_dir: &str) -> Self {
        self.store_dir = store_dir.to_string();
        self
    }

    pub fn with_nix_store_program(mut self, program: &str) -> Self {
        self.nix_store_program = program.to_string();
        self
    }

    pub fn with_build_timeout(mut self, secs: u64) -> Self {
        self.build_timeout_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ignores_environment() {
        let config = CheckConfig::new("aarch64-darwin");
        assert_eq!(config.system, "aarch64-darwin");
        assert!(config.build);
        assert_eq!(config.store_dir, "/nix/store");
        assert_eq!(config.nix_store_program, "nix-store");
        assert_eq!(config.build_timeout_secs, 0);
    }

    #[test]
    fn test_builders() {
        let config = CheckConfig::new("x86_64-linux")
            .with_build(false)
            .with_system("i686-linux")
            .with_store_dir("/tmp/store")
            .with_nix_store_program("true")
            .with_build_timeout(60);

        assert!(!config.build);
        assert_eq!(config.system, "i686-linux");
        assert_eq!(config.store_dir, "/tmp/store");
        assert_eq!(config.nix_store_program, "true");
        assert_eq!(config.build_timeout_secs, 60);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = CheckConfig::new("x86_64-linux").with_build(false);
        let json = serde_json::to_string(&config).unwrap();
        let back: CheckConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}

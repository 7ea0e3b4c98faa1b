//! Skeleton `flake.nix` creation

use crate::error::FlakeError;
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::info;

/// Contents written by [`init_flake`]
pub const FLAKE_TEMPLATE: &str = r#"{
  description = "A flake";

  inputs.nixpkgs.url = "github:NixOS/nixpkgs/nixos-unstable";

  outputs = { self, nixpkgs }: {

    packages.x86_64-linux.hello = nixpkgs.legacyPackages.x86_64-linux.hello;

    defaultPackage.x86_64-linux = self.packages.x86_64-linux.hello;

    checks.x86_64-linux.build = self.packages.x86_64-linux.hello;

  };
}
"#;

/// Write a skeleton `flake.nix` into `dir`, which must be a git checkout.
/// Returns the path of the new file.
pub fn init_flake(dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let dir = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(dir)
    };

    if !dir.join(".git").exists() {
        return Err(FlakeError::NotAGitRepository(dir.display().to_string()));
    }

    let flake_path = dir.join("flake.nix");
    if flake_path.exists() {
        return Err(FlakeError::AlreadyExists(flake_path.display().to_string()));
    }

    std::fs::write(&flake_path, FLAKE_TEMPLATE)?;
    info!(path = %flake_path.display(), "wrote flake skeleton");
    Ok(flake_path)
}

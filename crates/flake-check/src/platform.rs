//! Platform identifiers (`x86_64-linux`, `aarch64-darwin`, ...)

use crate::error::CheckFailure;
use crate::value::{AttrPath, SourcePos};

/// Reject names that cannot be a `<arch>-<os>` platform identifier.
///
/// Runs before anything below the name is forced.
pub fn check_system_name(
    system: &str,
    pos: &SourcePos,
    attr_path: AttrPath,
) -> Result<(), CheckFailure> {
    if system.contains('-') {
        Ok(())
    } else {
        Err(CheckFailure::invalid_platform(
            attr_path,
            format!("'{}' is not a valid system type, at {}", system, pos),
        ))
    }
}

/// Platform identifier of the running host
pub fn host_system() -> String {
    let arch = match std::env::consts::ARCH {
        "x86" => "i686",
        "arm" => "armv7l",
        other => other,
    };
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    format!("{}-{}", arch, os)
}

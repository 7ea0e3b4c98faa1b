use super::{force_attrs, CheckResult};
use crate::context::Frame;
use crate::error::CheckFailure;
use crate::session::CheckSession;
use crate::value::{AttrPath, OutputNode, SourcePos};
use tracing::debug;

const TOPLEVEL: [&str; 4] = ["config", "system", "build", "toplevel"];

/// Check that a NixOS configuration has a derivation at
/// `config.system.build.toplevel`.
pub(crate) fn check_nixos_configuration<N: OutputNode>(
    session: &mut CheckSession<'_>,
    path: &AttrPath,
    node: &N,
    pos: &SourcePos,
) -> CheckResult<()> {
    let frame = Frame::new(
        format!("while checking the NixOS configuration '{}'", path),
        path.clone(),
    )
    .at(pos.clone());

    session.scoped(frame, |_| {
        debug!(configuration = %path, "checking NixOS configuration");
        let selection = TOPLEVEL.join(".");

        let mut current = node;
        let mut current_path = path.clone();
        for segment in TOPLEVEL {
            let attrs = force_attrs(current, &current_path)?;
            let attr = attrs.get(segment).ok_or_else(|| {
                CheckFailure::missing_attribute(
                    &current_path,
                    format!(
                        "attribute '{}' in selection path '{}' not found",
                        segment, selection
                    ),
                )
            })?;
            current = attr.value;
            current_path = current_path.child(segment);
        }

        let toplevel = force_attrs(current, &current_path)?;
        if toplevel.is_derivation() {
            Ok(())
        } else {
            Err(CheckFailure::structural(
                &current_path,
                format!("attribute '{}' is not a derivation", selection),
            ))
        }
    })
}

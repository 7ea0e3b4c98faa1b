use super::{force, CheckResult};
use crate::context::Frame;
use crate::error::CheckFailure;
use crate::session::CheckSession;
use crate::value::{AttrPath, OutputNode, SourcePos, Value};

/// Check a NixOS module: a function over an open attribute set, or an
/// attribute set whose options all evaluate.
pub(crate) fn check_module<N: OutputNode>(
    session: &mut CheckSession<'_>,
    path: &AttrPath,
    node: &N,
    pos: &SourcePos,
) -> CheckResult<()> {
    let frame = Frame::new(format!("while checking the NixOS module '{}'", path), path.clone())
        .at(pos.clone());

    session.scoped(frame, |session| match force(node, path)? {
        Value::Lambda(lambda) => {
            if lambda.is_open_pattern() {
                Ok(())
            } else {
                Err(CheckFailure::structural(
                    path,
                    "module must match an open attribute set ('{ config, ... }')",
                ))
            }
        }
        Value::Attrs(options) => {
            for option in options.iter() {
                let option_path = path.child(option.name);
                let frame = Frame::new(
                    format!("while evaluating the option '{}'", option.name),
                    option_path.clone(),
                )
                .at(option.pos.clone());
                session.scoped(frame, |_| force(option.value, &option_path).map(|_| ()))?;
            }
            Ok(())
        }
        _ => Err(CheckFailure::structural(
            path,
            "module must be a function or an attribute set",
        )),
    })
}

use super::{force, CheckResult};
use crate::context::Frame;
use crate::error::CheckFailure;
use crate::session::CheckSession;
use crate::value::{AttrPath, OutputNode, SourcePos, Value};

/// Check that an overlay is `final: prev: ...`.
///
/// Only the syntactic shape is inspected; the overlay is never applied.
pub(crate) fn check_overlay<N: OutputNode>(
    session: &mut CheckSession<'_>,
    path: &AttrPath,
    node: &N,
    pos: &SourcePos,
) -> CheckResult<()> {
    let frame = Frame::new(format!("while checking the overlay '{}'", path), path.clone())
        .at(pos.clone());

    session.scoped(frame, |_| {
        let lambda = match force(node, path)? {
            Value::Lambda(lambda) if lambda.ident_name() == Some("final") => lambda,
            _ => {
                return Err(CheckFailure::structural(
                    path,
                    "overlay does not take an argument named 'final'",
                ))
            }
        };
        match lambda.body.as_deref() {
            Some(body) if body.ident_name() == Some("prev") => Ok(()),
            _ => Err(CheckFailure::structural(
                path,
                "overlay does not take an argument named 'prev'",
            )),
        }
    })
}

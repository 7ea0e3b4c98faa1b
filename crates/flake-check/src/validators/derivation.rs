use super::{force, CheckResult};
use crate::context::Frame;
use crate::error::CheckFailure;
use crate::session::CheckSession;
use crate::store::StorePath;
use crate::value::{AttrPath, OutputNode, SourcePos, Value};

/// Check that `node` is a derivation and return its derivation path.
pub(crate) fn check_derivation<N: OutputNode>(
    session: &mut CheckSession<'_>,
    path: &AttrPath,
    node: &N,
    pos: &SourcePos,
) -> CheckResult<StorePath> {
    let frame = Frame::new(format!("while checking the derivation '{}'", path), path.clone())
        .at(pos.clone());

    session.scoped(frame, |_| {
        let derivation = match force(node, path)? {
            Value::Attrs(attrs) => attrs.derivation_info().cloned(),
            _ => None,
        };
        derivation.map(|drv| drv.drv_path).ok_or_else(|| {
            CheckFailure::structural(path, format!("flake attribute '{}' is not a derivation", path))
        })
    })
}

use super::{force_attrs, CheckResult};
use crate::context::Frame;
use crate::error::CheckFailure;
use crate::session::CheckSession;
use crate::value::{AttrPath, AttrSet, OutputNode, SourcePos};

fn jobset_frame(path: &AttrPath, pos: &SourcePos) -> Frame {
    Frame::new(format!("while checking the Hydra jobset '{}'", path), path.clone()).at(pos.clone())
}

/// Check a Hydra jobset: a nested tree of attribute sets whose leaves are
/// derivations. The top level itself must not be a derivation.
pub(crate) fn check_hydra_jobs<N: OutputNode>(
    session: &mut CheckSession<'_>,
    path: &AttrPath,
    node: &N,
    pos: &SourcePos,
) -> CheckResult<()> {
    session.scoped(jobset_frame(path, pos), |session| {
        let jobs = force_attrs(node, path)?;
        if jobs.is_derivation() {
            return Err(CheckFailure::structural(
                path,
                "jobset should not be a derivation at top-level",
            ));
        }
        check_jobs(session, path, &jobs)
    })
}

// Every node is forced exactly once: children are forced here and the
// forced set is handed down instead of the node.
fn check_jobs<N: OutputNode>(
    session: &mut CheckSession<'_>,
    path: &AttrPath,
    jobs: &AttrSet<'_, N>,
) -> CheckResult<()> {
    for job in jobs.iter() {
        let job_path = path.child(job.name);
        let nested = force_attrs(job.value, &job_path)?;
        if !nested.is_derivation() {
            session.scoped(jobset_frame(&job_path, &job.pos), |session| {
                check_jobs(session, &job_path, &nested)
            })?;
        }
    }
    Ok(())
}

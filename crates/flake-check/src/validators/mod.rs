//! Per-category output validators
//!
//! Each top-level function here checks one output category. They share the
//! session for context frames, warnings and collected build targets.

mod app;
mod derivation;
mod hydra;
mod module;
mod nixos;
mod overlay;

pub(crate) use app::check_app;
pub(crate) use derivation::check_derivation;
pub(crate) use hydra::check_hydra_jobs;
pub(crate) use module::check_module;
pub(crate) use nixos::check_nixos_configuration;
pub(crate) use overlay::check_overlay;

use crate::error::CheckFailure;
use crate::platform::check_system_name;
use crate::session::CheckSession;
use crate::value::{Attr, AttrPath, AttrSet, OutputNode, StringValue, Value};

/// Result of a validator
pub type CheckResult<T> = std::result::Result<T, CheckFailure>;

/// Force a node, attributing evaluation errors to `path`
pub(crate) fn force<'n, N: OutputNode>(node: &'n N, path: &AttrPath) -> CheckResult<Value<'n, N>> {
    node.force().map_err(|err| CheckFailure::evaluation(path, err))
}

/// Force a node that must be an attribute set
pub(crate) fn force_attrs<'n, N: OutputNode>(
    node: &'n N,
    path: &AttrPath,
) -> CheckResult<AttrSet<'n, N>> {
    match force(node, path)? {
        Value::Attrs(attrs) => Ok(attrs),
        other => Err(CheckFailure::structural(
            path,
            format!("value is {} while a set was expected", other.type_name()),
        )),
    }
}

/// Force a node that must be a string
pub(crate) fn force_string<N: OutputNode>(node: &N, path: &AttrPath) -> CheckResult<StringValue> {
    match force(node, path)? {
        Value::String(s) => Ok(s),
        other => Err(CheckFailure::structural(
            path,
            format!("value is {} while a string was expected", other.type_name()),
        )),
    }
}

/// Walk `<output>.<system>` entries, guarding each platform name before
/// handing the entry to `check`.
fn per_platform<N, F>(
    session: &mut CheckSession<'_>,
    output: &Attr<'_, N>,
    mut check: F,
) -> CheckResult<()>
where
    N: OutputNode,
    F: FnMut(&mut CheckSession<'_>, &AttrPath, &Attr<'_, N>) -> CheckResult<()>,
{
    let path = AttrPath::root(output.name);
    let systems = force_attrs(output.value, &path)?;
    for system in systems.iter() {
        let system_path = path.child(system.name);
        check_system_name(system.name, &system.pos, system_path.clone())?;
        check(session, &system_path, system)?;
    }
    Ok(())
}

/// `checks.<system>.<name>`: derivations; current-platform ones are built
pub(crate) fn checks<N: OutputNode>(
    session: &mut CheckSession<'_>,
    output: &Attr<'_, N>,
) -> CheckResult<()> {
    per_platform(session, output, |session, path, system| {
        let entries = force_attrs(system.value, path)?;
        for check in entries.iter() {
            let drv_path = check_derivation(session, &path.child(check.name), check.value, &check.pos)?;
            if system.name == session.system() {
                session.collect(drv_path);
            }
        }
        Ok(())
    })
}

/// `packages.<system>.<name>`: derivations
pub(crate) fn packages<N: OutputNode>(
    session: &mut CheckSession<'_>,
    output: &Attr<'_, N>,
) -> CheckResult<()> {
    per_platform(session, output, |session, path, system| {
        let entries = force_attrs(system.value, path)?;
        for package in entries.iter() {
            check_derivation(session, &path.child(package.name), package.value, &package.pos)?;
        }
        Ok(())
    })
}

/// `apps.<system>.<name>`: app definitions
pub(crate) fn apps<N: OutputNode>(
    session: &mut CheckSession<'_>,
    output: &Attr<'_, N>,
) -> CheckResult<()> {
    per_platform(session, output, |session, path, system| {
        let entries = force_attrs(system.value, path)?;
        for app in entries.iter() {
            check_app(session, &path.child(app.name), app.value, &app.pos)?;
        }
        Ok(())
    })
}

/// `defaultPackage.<system>` and `devShell.<system>`: one derivation each
pub(crate) fn default_packages<N: OutputNode>(
    session: &mut CheckSession<'_>,
    output: &Attr<'_, N>,
) -> CheckResult<()> {
    per_platform(session, output, |session, path, system| {
        check_derivation(session, path, system.value, &system.pos).map(|_| ())
    })
}

/// `defaultApp.<system>`: one app each
pub(crate) fn default_apps<N: OutputNode>(
    session: &mut CheckSession<'_>,
    output: &Attr<'_, N>,
) -> CheckResult<()> {
    per_platform(session, output, |session, path, system| {
        check_app(session, path, system.value, &system.pos)
    })
}

/// `legacyPackages.<system>`: only the platform names are checked
pub(crate) fn legacy_packages<N: OutputNode>(
    session: &mut CheckSession<'_>,
    output: &Attr<'_, N>,
) -> CheckResult<()> {
    per_platform(session, output, |_, _, _| Ok(()))
}

pub(crate) fn overlay<N: OutputNode>(
    session: &mut CheckSession<'_>,
    output: &Attr<'_, N>,
) -> CheckResult<()> {
    check_overlay(session, &AttrPath::root(output.name), output.value, &output.pos)
}

pub(crate) fn overlays<N: OutputNode>(
    session: &mut CheckSession<'_>,
    output: &Attr<'_, N>,
) -> CheckResult<()> {
    let path = AttrPath::root(output.name);
    let overlays = force_attrs(output.value, &path)?;
    for overlay in overlays.iter() {
        check_overlay(session, &path.child(overlay.name), overlay.value, &overlay.pos)?;
    }
    Ok(())
}

pub(crate) fn nixos_module<N: OutputNode>(
    session: &mut CheckSession<'_>,
    output: &Attr<'_, N>,
) -> CheckResult<()> {
    check_module(session, &AttrPath::root(output.name), output.value, &output.pos)
}

pub(crate) fn nixos_modules<N: OutputNode>(
    session: &mut CheckSession<'_>,
    output: &Attr<'_, N>,
) -> CheckResult<()> {
    let path = AttrPath::root(output.name);
    let modules = force_attrs(output.value, &path)?;
    for module in modules.iter() {
        check_module(session, &path.child(module.name), module.value, &module.pos)?;
    }
    Ok(())
}

pub(crate) fn nixos_configurations<N: OutputNode>(
    session: &mut CheckSession<'_>,
    output: &Attr<'_, N>,
) -> CheckResult<()> {
    let path = AttrPath::root(output.name);
    let configurations = force_attrs(output.value, &path)?;
    for configuration in configurations.iter() {
        check_nixos_configuration(
            session,
            &path.child(configuration.name),
            configuration.value,
            &configuration.pos,
        )?;
    }
    Ok(())
}

pub(crate) fn hydra_jobs<N: OutputNode>(
    session: &mut CheckSession<'_>,
    output: &Attr<'_, N>,
) -> CheckResult<()> {
    check_hydra_jobs(session, &AttrPath::root(output.name), output.value, &output.pos)
}

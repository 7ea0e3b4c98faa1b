use super::{force_attrs, force_string, CheckResult};
use crate::context::Frame;
use crate::error::CheckFailure;
use crate::session::CheckSession;
use crate::store::{decode_context, is_in_store, StorePath};
use crate::value::{AttrPath, AttrSet, OutputNode, SourcePos, StringValue};
use tracing::debug;

/// A parsed app definition: `{ type = "app"; program = "..."; }`
#[derive(Debug)]
struct App {
    program: StringValue,
}

/// Check an app definition and register the derivations its program
/// refers to. Collection is not filtered by platform.
pub(crate) fn check_app<N: OutputNode>(
    session: &mut CheckSession<'_>,
    path: &AttrPath,
    node: &N,
    pos: &SourcePos,
) -> CheckResult<()> {
    let frame = Frame::new(format!("while checking the app definition '{}'", path), path.clone())
        .at(pos.clone());

    session.scoped(frame, |session| {
        let app = parse_app(session.store_dir(), path, node)?;
        for element in &app.program.context {
            let (raw_path, output) = decode_context(element);
            let store_path = StorePath::parse(raw_path, session.store_dir())
                .map_err(|err| CheckFailure::structural(path, err.to_string()))?;
            if !output.is_empty() && store_path.is_derivation() {
                debug!(app = %path, target = %store_path, "registering app build target");
                session.collect(store_path);
            }
        }
        Ok(())
    })
}

fn parse_app<N: OutputNode>(store_dir: &str, path: &AttrPath, node: &N) -> CheckResult<App> {
    let attrs = force_attrs(node, path)?;

    let app_type = required_string(&attrs, path, "type")?;
    if app_type.has_context() {
        return Err(CheckFailure::structural(
            &path.child("type"),
            format!(
                "the string '{}' is not allowed to refer to a store path",
                app_type.value
            ),
        ));
    }
    if app_type.value != "app" {
        return Err(CheckFailure::structural(
            &path.child("type"),
            format!("value does not have type 'app', but '{}'", app_type.value),
        ));
    }

    let program = required_string(&attrs, path, "program")?;
    if !is_in_store(&program.value, store_dir) {
        return Err(CheckFailure::structural(
            &path.child("program"),
            format!("app program '{}' is not in the Nix store", program.value),
        ));
    }

    Ok(App { program })
}

fn required_string<N: OutputNode>(
    attrs: &AttrSet<'_, N>,
    path: &AttrPath,
    name: &str,
) -> CheckResult<StringValue> {
    let attr = attrs.get(name).ok_or_else(|| {
        CheckFailure::missing_attribute(path, format!("attribute '{}' missing", name))
    })?;
    force_string(attr.value, &path.child(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckConfig;
    use crate::error::FailureKind;
    use crate::fakes::{fake_drv_path, fake_store_path};
    use crate::manifest::ManifestNode;

    fn app_node(program: &str, context: Vec<String>) -> ManifestNode {
        ManifestNode::attrs([
            ("type", ManifestNode::string("app")),
            ("program", ManifestNode::string_with_context(program, context)),
        ])
    }

    fn path() -> AttrPath {
        AttrPath::from_segments(["apps", "x86_64-linux", "hello"])
    }

    #[test]
    fn test_registers_output_derivations_from_context() {
        let config = CheckConfig::new("x86_64-linux");
        let mut session = CheckSession::new(&config);

        let drv = fake_drv_path("hello");
        let out = fake_store_path("hello");
        let node = app_node(
            &format!("{}/bin/hello", out),
            vec![format!("!out!{}", drv), out.to_string()],
        );

        check_app(&mut session, &path(), &node, &SourcePos::unknown()).unwrap();

        assert_eq!(session.collected(), vec![drv]);
    }

    #[test]
    fn test_plain_context_paths_are_not_collected() {
        let config = CheckConfig::new("x86_64-linux");
        let mut session = CheckSession::new(&config);

        let out = fake_store_path("script");
        let drv = fake_drv_path("script");
        let node = app_node(&format!("{}", out), vec![out.to_string(), drv.to_string()]);

        check_app(&mut session, &path(), &node, &SourcePos::unknown()).unwrap();
        assert!(session.collected().is_empty());
    }

    #[test]
    fn test_wrong_type_fails() {
        let config = CheckConfig::new("x86_64-linux");
        let mut session = CheckSession::new(&config);
        let node = ManifestNode::attrs([
            ("type", ManifestNode::string("derivation")),
            ("program", ManifestNode::string("/nix/store/x")),
        ]);

        let err = check_app(&mut session, &path(), &node, &SourcePos::unknown()).unwrap_err();
        assert_eq!(err.kind, FailureKind::StructuralMismatch);
        assert!(err.message.contains("does not have type 'app'"));
        assert_eq!(
            err.frames[0].label,
            "while checking the app definition 'apps.x86_64-linux.hello'"
        );
    }

    #[test]
    fn test_missing_program_fails() {
        let config = CheckConfig::new("x86_64-linux");
        let mut session = CheckSession::new(&config);
        let node = ManifestNode::attrs([("type", ManifestNode::string("app"))]);

        let err = check_app(&mut session, &path(), &node, &SourcePos::unknown()).unwrap_err();
        assert_eq!(err.kind, FailureKind::MissingRequiredAttribute);
        assert_eq!(err.message, "attribute 'program' missing");
    }

    #[test]
    fn test_program_outside_store_fails() {
        let config = CheckConfig::new("x86_64-linux");
        let mut session = CheckSession::new(&config);
        let node = app_node("/usr/bin/hello", Vec::new());

        let err = check_app(&mut session, &path(), &node, &SourcePos::unknown()).unwrap_err();
        assert_eq!(err.kind, FailureKind::StructuralMismatch);
        assert_eq!(err.message, "app program '/usr/bin/hello' is not in the Nix store");
        assert_eq!(err.attr_path.to_string(), "apps.x86_64-linux.hello.program");
    }

    #[test]
    fn test_invalid_context_path_fails() {
        let config = CheckConfig::new("x86_64-linux");
        let mut session = CheckSession::new(&config);
        let out = fake_store_path("hello");
        let node = app_node(&out.to_string(), vec!["!out!/nix/store/not-a-hash.drv".to_string()]);

        let err = check_app(&mut session, &path(), &node, &SourcePos::unknown()).unwrap_err();
        assert!(err.message.contains("is not a valid store path"));
        assert!(session.collected().is_empty());
    }
}

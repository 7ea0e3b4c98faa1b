//! End-to-end checks of a whole output tree against a recording build backend

use flake_check::fakes::{fake_drv_path, fake_store_path, RecordingTrigger};
use flake_check::value::Lambda;
use flake_check::{check_outputs, CheckConfig, CheckSession, FailureKind, ManifestNode, Warning};

fn config() -> CheckConfig {
    CheckConfig::new("x86_64-linux")
}

fn app(name: &str) -> ManifestNode {
    let out = fake_store_path(name);
    ManifestNode::attrs([
        ("type", ManifestNode::string("app")),
        (
            "program",
            ManifestNode::string_with_context(
                &format!("{}/bin/{}", out, name),
                vec![format!("!out!{}", fake_drv_path(name))],
            ),
        ),
    ])
}

const FULL_FLAKE_OUTPUTS: [&str; 13] = [
    "checks",
    "packages",
    "defaultPackage",
    "devShell",
    "apps",
    "defaultApp",
    "overlay",
    "overlays",
    "nixosModule",
    "nixosModules",
    "nixosConfigurations",
    "hydraJobs",
    "legacyPackages",
];

/// Current-platform checks plus every app derivation, sorted
fn full_flake_targets() -> Vec<flake_check::StorePath> {
    let mut targets = vec![
        fake_drv_path("unit"),
        fake_drv_path("lint"),
        fake_drv_path("hello"),
        fake_drv_path("tool"),
    ];
    targets.sort();
    targets
}

fn full_flake() -> ManifestNode {
    ManifestNode::attrs([
        (
            "checks",
            ManifestNode::attrs([
                (
                    "x86_64-linux",
                    ManifestNode::attrs([
                        ("unit", ManifestNode::derivation(fake_drv_path("unit"))),
                        ("lint", ManifestNode::derivation(fake_drv_path("lint"))),
                    ]),
                ),
                (
                    "aarch64-darwin",
                    ManifestNode::attrs([("unit", ManifestNode::derivation(fake_drv_path("unit-darwin")))]),
                ),
            ]),
        ),
        (
            "packages",
            ManifestNode::attrs([(
                "x86_64-linux",
                ManifestNode::attrs([("hello", ManifestNode::derivation(fake_drv_path("hello")))]),
            )]),
        ),
        (
            "defaultPackage",
            ManifestNode::attrs([("x86_64-linux", ManifestNode::derivation(fake_drv_path("hello")))]),
        ),
        (
            "devShell",
            ManifestNode::attrs([("x86_64-linux", ManifestNode::derivation(fake_drv_path("shell")))]),
        ),
        (
            "apps",
            ManifestNode::attrs([("x86_64-linux", ManifestNode::attrs([("hello", app("hello"))]))]),
        ),
        (
            "defaultApp",
            ManifestNode::attrs([("aarch64-darwin", app("tool"))]),
        ),
        (
            "overlay",
            ManifestNode::lambda(Lambda::ident("final").returning(Lambda::ident("prev"))),
        ),
        (
            "overlays",
            ManifestNode::attrs([(
                "default",
                ManifestNode::lambda(Lambda::ident("final").returning(Lambda::ident("prev"))),
            )]),
        ),
        (
            "nixosModule",
            ManifestNode::lambda(Lambda::formals(["config", "pkgs"], true)),
        ),
        (
            "nixosModules",
            ManifestNode::attrs([(
                "default",
                ManifestNode::lambda(Lambda::formals(["config", "lib"], true)),
            )]),
        ),
        (
            "nixosConfigurations",
            ManifestNode::attrs([(
                "machine",
                ManifestNode::attrs([(
                    "config",
                    ManifestNode::attrs([(
                        "system",
                        ManifestNode::attrs([(
                            "build",
                            ManifestNode::attrs([(
                                "toplevel",
                                ManifestNode::derivation(fake_drv_path("nixos-system")),
                            )]),
                        )]),
                    )]),
                )]),
            )]),
        ),
        (
            "hydraJobs",
            ManifestNode::attrs([(
                "build",
                ManifestNode::attrs([("x86_64-linux", ManifestNode::derivation(fake_drv_path("hello")))]),
            )]),
        ),
        (
            "legacyPackages",
            ManifestNode::attrs([(
                "x86_64-linux",
                ManifestNode::attrs([("hello", ManifestNode::throw("legacy packages are not evaluated"))]),
            )]),
        ),
        ("formatter", ManifestNode::throw("unknown outputs are not evaluated")),
    ])
}

#[tokio::test]
async fn test_single_check_is_submitted_once() {
    let a = fake_drv_path("unit");
    let outputs = ManifestNode::attrs([
        (
            "checks",
            ManifestNode::attrs([(
                "x86_64-linux",
                ManifestNode::attrs([("unit", ManifestNode::derivation(a.clone()))]),
            )]),
        ),
        ("apps", ManifestNode::attrs(Vec::<(&str, ManifestNode)>::new())),
    ]);
    let trigger = RecordingTrigger::new();

    let report = check_outputs(&outputs, &config(), &trigger).await.unwrap();

    assert_eq!(report.build_targets, vec![a.clone()]);
    assert_eq!(trigger.batches(), vec![vec![a]]);
    assert!(report.build.unwrap().success());
    assert_eq!(report.checked, vec!["checks".to_string(), "apps".to_string()]);
}

#[tokio::test]
async fn test_overlay_with_wrong_parameter_names_fails() {
    let outputs = ManifestNode::attrs([(
        "overlay",
        ManifestNode::lambda(Lambda::ident("x").returning(Lambda::ident("y"))),
    )]);
    let trigger = RecordingTrigger::new();

    let err = check_outputs(&outputs, &config(), &trigger).await.unwrap_err();

    assert_eq!(err.kind, FailureKind::StructuralMismatch);
    assert_eq!(err.attr_path.to_string(), "overlay");
    assert_eq!(err.message, "overlay does not take an argument named 'final'");
    assert_eq!(
        err.render(),
        "while checking flake output 'overlay':\n\
         while checking the overlay 'overlay':\n\
         overlay does not take an argument named 'final'"
    );
    assert_eq!(trigger.call_count(), 0);
}

#[tokio::test]
async fn test_bad_platform_name_forces_nothing_below_it() {
    let outputs = ManifestNode::attrs([(
        "legacyPackages",
        ManifestNode::attrs([(
            "bad_platform_no_dash",
            ManifestNode::attrs([("hello", ManifestNode::throw("must not be forced"))]),
        )]),
    )]);
    let trigger = RecordingTrigger::new();

    let err = check_outputs(&outputs, &config(), &trigger).await.unwrap_err();

    assert_eq!(err.kind, FailureKind::InvalidPlatformIdentifier);
    assert_eq!(err.attr_path.to_string(), "legacyPackages.bad_platform_no_dash");
    assert!(err.message.starts_with("'bad_platform_no_dash' is not a valid system type"));
    let legacy = outputs.get("legacyPackages").unwrap();
    assert_eq!(legacy.get("bad_platform_no_dash").unwrap().total_force_count(), 0);
}

#[tokio::test]
async fn test_non_derivation_check_reports_its_path() {
    let outputs = ManifestNode::attrs([(
        "checks",
        ManifestNode::attrs([(
            "x86_64-linux",
            ManifestNode::attrs([
                ("good", ManifestNode::derivation(fake_drv_path("good"))),
                ("broken", ManifestNode::attrs([("name", ManifestNode::string("broken"))])),
            ]),
        )]),
    )]);
    let trigger = RecordingTrigger::new();

    let err = check_outputs(&outputs, &config(), &trigger).await.unwrap_err();

    assert_eq!(err.kind, FailureKind::StructuralMismatch);
    assert_eq!(err.attr_path.to_string(), "checks.x86_64-linux.broken");
    assert_eq!(
        err.message,
        "flake attribute 'checks.x86_64-linux.broken' is not a derivation"
    );
    assert_eq!(
        err.innermost_frame().unwrap().label,
        "while checking the derivation 'checks.x86_64-linux.broken'"
    );
    // validation failed, so the good check was never submitted
    assert_eq!(trigger.call_count(), 0);
}

#[tokio::test]
async fn test_full_flake_collects_current_platform_checks_and_apps() {
    let outputs = full_flake();
    let trigger = RecordingTrigger::new();

    let report = check_outputs(&outputs, &config(), &trigger).await.unwrap();

    let expected = full_flake_targets();
    assert_eq!(report.build_targets, expected);
    assert!(!report.build_targets.contains(&fake_drv_path("unit-darwin")));
    assert!(!report.build_targets.contains(&fake_drv_path("nixos-system")));
    assert_eq!(report.checked, FULL_FLAKE_OUTPUTS);
    assert_eq!(trigger.batches(), vec![expected]);
    assert_eq!(
        report.warnings,
        vec![Warning::UnrecognizedCategory {
            name: "formatter".to_string()
        }]
    );
    assert_eq!(outputs.get("formatter").unwrap().force_count(), 0);
    let legacy = outputs.get("legacyPackages").unwrap();
    assert_eq!(legacy.get("x86_64-linux").unwrap().total_force_count(), 0);
}

#[tokio::test]
async fn test_apps_are_collected_for_every_platform() {
    let outputs = ManifestNode::attrs([(
        "apps",
        ManifestNode::attrs([("aarch64-darwin", ManifestNode::attrs([("tool", app("tool"))]))]),
    )]);
    let trigger = RecordingTrigger::new();

    let report = check_outputs(&outputs, &config(), &trigger).await.unwrap();

    assert_eq!(report.build_targets, vec![fake_drv_path("tool")]);
    assert_eq!(trigger.call_count(), 1);
}

#[tokio::test]
async fn test_build_disabled_submits_nothing() {
    let outputs = full_flake();
    let trigger = RecordingTrigger::new();

    let report = check_outputs(&outputs, &config().with_build(false), &trigger)
        .await
        .unwrap();

    assert_eq!(report.build_targets, full_flake_targets());
    assert!(report.build.is_none());
    assert_eq!(trigger.call_count(), 0);
}

#[tokio::test]
async fn test_empty_collector_submits_nothing() {
    let outputs = ManifestNode::attrs([(
        "packages",
        ManifestNode::attrs([(
            "x86_64-linux",
            ManifestNode::attrs([("hello", ManifestNode::derivation(fake_drv_path("hello")))]),
        )]),
    )]);
    let trigger = RecordingTrigger::new();

    let report = check_outputs(&outputs, &config(), &trigger).await.unwrap();
    assert!(report.build_targets.is_empty());
    assert_eq!(trigger.call_count(), 0);
}

#[tokio::test]
async fn test_failed_target_is_build_failure() {
    let outputs = full_flake();
    let lint = fake_drv_path("lint");
    let trigger = RecordingTrigger::failing([lint.clone()]);

    let err = check_outputs(&outputs, &config(), &trigger).await.unwrap_err();

    assert_eq!(err.kind, FailureKind::BuildFailure);
    assert_eq!(err.message, format!("1 of 4 build targets failed: {}", lint));
    assert_eq!(trigger.call_count(), 1);
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let outputs = full_flake();
    let first = RecordingTrigger::new();
    let second = RecordingTrigger::new();

    let a = check_outputs(&outputs, &config(), &first).await.unwrap();
    let b = check_outputs(&outputs, &config(), &second).await.unwrap();

    assert_eq!(a.build_targets, b.build_targets);
    assert_eq!(a.checked, b.checked);
    assert_eq!(a.warnings, b.warnings);
    assert_eq!(first.batches(), second.batches());
}

#[test]
fn test_validate_without_trigger() {
    let config = config();
    let report = CheckSession::new(&config).validate(&full_flake()).unwrap();

    assert!(report.build.is_none());
    assert_eq!(report.system, "x86_64-linux");
    assert_eq!(report.checked, FULL_FLAKE_OUTPUTS);
}

#[tokio::test]
async fn test_repeated_failing_runs_are_identical() {
    let outputs = ManifestNode::attrs([
        (
            "checks",
            ManifestNode::attrs([(
                "x86_64-linux",
                ManifestNode::attrs([("unit", ManifestNode::derivation(fake_drv_path("unit")))]),
            )]),
        ),
        (
            "overlays",
            ManifestNode::attrs([(
                "broken",
                ManifestNode::lambda(Lambda::ident("self").returning(Lambda::ident("super"))),
            )]),
        ),
    ]);
    let config = config().with_build(false);
    let trigger = RecordingTrigger::new();

    let first = check_outputs(&outputs, &config, &trigger).await.unwrap_err();
    let second = check_outputs(&outputs, &config, &trigger).await.unwrap_err();

    assert_eq!(first, second);
    assert_eq!(first.attr_path.to_string(), "overlays.broken");
    let labels: Vec<_> = first.frames.iter().map(|f| f.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "while checking flake output 'overlays'",
            "while checking the overlay 'overlays.broken'",
        ]
    );
    assert_eq!(first.render(), second.render());
    assert_eq!(trigger.call_count(), 0);
}

#[test]
fn test_evaluation_errors_keep_frame_chain() {
    let outputs = ManifestNode::attrs([(
        "nixosConfigurations",
        ManifestNode::attrs([(
            "machine",
            ManifestNode::attrs([("config", ManifestNode::throw("infinite recursion encountered"))]),
        )]),
    )]);
    let config = config();

    let err = CheckSession::new(&config).validate(&outputs).unwrap_err();

    assert_eq!(err.kind, FailureKind::EvaluationFailure);
    assert_eq!(err.message, "infinite recursion encountered");
    assert_eq!(err.attr_path.to_string(), "nixosConfigurations.machine.config");
    let labels: Vec<_> = err.frames.iter().map(|f| f.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "while checking flake output 'nixosConfigurations'",
            "while checking the NixOS configuration 'nixosConfigurations.machine'",
        ]
    );
}

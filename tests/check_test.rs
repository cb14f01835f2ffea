//! Integration tests for `stackforge check`

mod common;

use common::{stderr, stdout, TestProject};

#[test]
fn test_valid_repository() {
    let project = TestProject::new().with_cernbox();
    let output = project.run(&["check", "--all-services"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(
        stderr(&output).contains("Configuration valid: 2 services, 5 images"),
        "stderr: {}",
        stderr(&output)
    );
}

#[test]
fn test_json_summary() {
    let project = TestProject::new().with_cernbox();
    let output = project.run(&["--json", "check", "revad-base"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let summary: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(summary["valid"], true);
    assert_eq!(summary["images"], 4);
}

#[test]
fn test_every_violation_reported_at_once() {
    let project = TestProject::new();
    project.add_service(
        "bad-platform",
        "dockerfile = \"services/bad-platform/Dockerfile\"\n",
        Some("default = \"Debian_12\"\n[[platforms]]\nname = \"Debian_12\"\n"),
        "default = \"v1\"\n[[versions]]\nname = \"v1\"\n",
    );
    project.add_service(
        "bad-layer",
        "dockerfile = \"services/bad-layer/Dockerfile\"\n",
        Some(
            r#"
default = "debian"
[[platforms]]
name = "debian"
dockerfile = "services/bad-layer/Dockerfile"
[platforms.sources.app]
path = "src"
"#,
        ),
        r#"
default = "v1"
[[versions]]
name = "v1"
[versions.overrides.tls]
enabled = true
"#,
    );

    let output = project.run(&["check", "--all-services"]);

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("Invalid configuration"), "stderr: {err}");
    assert!(err.contains("Debian_12"), "stderr: {err}");
    assert!(err.contains("'sources' is not allowed in the platform layer"), "stderr: {err}");
    assert!(err.contains("'tls' is only allowed in the base config"), "stderr: {err}");
}

#[test]
fn test_missing_dockerfile_is_reported() {
    let project = TestProject::new().with_cernbox();
    std::fs::remove_file(project.path().join("services/cernbox-web/Dockerfile")).unwrap();

    let output = project.run(&["check", "cernbox-web"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Failed to read file"), "stderr: {}", stderr(&output));
}

#[test]
fn test_requires_a_selection() {
    let project = TestProject::new().with_cernbox();
    let output = project.run(&["check"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Specify a service"));
}

//! Integration tests for `stackforge build --show-build-order`
//!
//! Planning only: no container builder is invoked.

mod common;

use common::{stderr, stdout, stdout_lines, TestProject, PLAIN_SERVICE, PLAIN_VERSIONS};

fn single(project: &TestProject, name: &str, deps: &[&str]) {
    let mut service = format!("dockerfile = \"services/{name}/Dockerfile\"\n");
    for dep in deps {
        service.push_str(&format!(
            "[dependencies.{dep}]\nbuild_arg = \"{}_IMAGE\"\n",
            dep.to_uppercase()
        ));
    }
    project.add_service(
        name,
        &service,
        None,
        "default = \"v1\"\n[[versions]]\nname = \"v1\"\n",
    );
}

#[test]
fn test_dependency_precedes_dependent() {
    let project = TestProject::new().with_cernbox();
    let output = project.run(&["build", "cernbox-web", "--show-build-order"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout_lines(&output),
        vec!["revad-base:v3.3.3:debian", "cernbox-web:v1.0.0:debian"]
    );
}

#[test]
fn test_platform_suffix_inheritance_is_warned() {
    let project = TestProject::new().with_cernbox();
    let output = project.run(&["build", "cernbox-web", "--show-build-order"]);

    assert!(output.status.success());
    assert!(
        stderr(&output).contains("inheriting '-debian' from the parent"),
        "stderr: {}",
        stderr(&output)
    );
}

#[test]
fn test_every_platform_without_selector() {
    let project = TestProject::new().with_cernbox();
    let output = project.run(&["build", "revad-base", "--show-build-order"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout_lines(&output),
        vec!["revad-base:v3.3.3:debian", "revad-base:v3.3.3:alpine"]
    );
}

#[test]
fn test_platform_flag_and_suffix_select_one_platform() {
    let project = TestProject::new().with_cernbox();

    let by_flag = project.run(&["build", "revad-base", "--platform", "alpine", "--show-build-order"]);
    assert!(by_flag.status.success(), "stderr: {}", stderr(&by_flag));
    assert_eq!(stdout_lines(&by_flag), vec!["revad-base:v3.3.3:alpine"]);

    let by_suffix = project.run(&[
        "build",
        "revad-base",
        "--version",
        "v3.3.3-alpine",
        "--show-build-order",
    ]);
    assert!(by_suffix.status.success(), "stderr: {}", stderr(&by_suffix));
    assert_eq!(stdout_lines(&by_suffix), vec!["revad-base:v3.3.3:alpine"]);
}

#[test]
fn test_conflicting_platform_signals_fail() {
    let project = TestProject::new().with_cernbox();
    let output = project.run(&[
        "build",
        "revad-base",
        "--version",
        "v3.3.3-alpine",
        "--platform",
        "debian",
        "--show-build-order",
    ]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Platform mismatch"), "stderr: {}", stderr(&output));
}

#[test]
fn test_version_aliases() {
    let project = TestProject::new().with_cernbox();

    for alias in ["latest", "v3.3"] {
        let output = project.run(&[
            "build",
            "revad-base",
            "--version",
            alias,
            "--platform",
            "debian",
            "--show-build-order",
        ]);
        assert!(output.status.success(), "{alias}: {}", stderr(&output));
        assert_eq!(stdout_lines(&output), vec!["revad-base:v3.3.3:debian"]);
    }
}

#[test]
fn test_unknown_version_lists_available() {
    let project = TestProject::new().with_cernbox();
    let output = project.run(&["build", "revad-base", "--version", "v9", "--show-build-order"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
    let err = stderr(&output);
    assert!(err.contains("error: revad-base:v9: "), "stderr: {err}");
    assert!(err.contains("Version 'v9' not found"), "stderr: {err}");
    assert!(err.contains("v3.3.3, v3.2.0"), "stderr: {err}");
}

#[test]
fn test_all_versions_in_manifest_order() {
    let project = TestProject::new();
    project.add_service("tools", PLAIN_SERVICE, None, PLAIN_VERSIONS);

    let output = project.run(&["build", "tools", "--all-versions", "--show-build-order"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout_lines(&output), vec!["tools:v1", "tools:v2"]);

    let listed = project.run(&["build", "tools", "--versions", "v2,v1", "--show-build-order"]);
    assert_eq!(stdout_lines(&listed), vec!["tools:v2", "tools:v1"]);
}

#[test]
fn test_cycle_is_reported_and_nothing_is_ordered() {
    let project = TestProject::new();
    single(&project, "a", &["b"]);
    single(&project, "b", &["a"]);

    let output = project.run(&["build", "a", "--show-build-order"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
    let err = stderr(&output);
    assert!(err.contains("Circular dependency detected (1 cycle)"), "stderr: {err}");
    assert!(err.contains("a:v1 -> b:v1 -> a:v1"), "stderr: {err}");
}

#[test]
fn test_all_services_orders_shared_dependencies_first() {
    let project = TestProject::new();
    single(&project, "base", &[]);
    single(&project, "lib", &["base"]);
    single(&project, "app", &["lib", "base"]);
    single(&project, "tool", &["base"]);

    let output = project.run(&["build", "--all-services", "--show-build-order"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let order = stdout_lines(&output);
    assert_eq!(order.len(), 4);
    let pos = |key: &str| order.iter().position(|k| k == key).unwrap();
    assert!(pos("base:v1") < pos("lib:v1"));
    assert!(pos("lib:v1") < pos("app:v1"));
    assert!(pos("base:v1") < pos("tool:v1"));
}

#[test]
fn test_json_build_order() {
    let project = TestProject::new().with_cernbox();
    let output = project.run(&["--json", "build", "cernbox-web", "--show-build-order"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let keys: Vec<String> = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(keys, vec!["revad-base:v3.3.3:debian", "cernbox-web:v1.0.0:debian"]);
}

#[test]
fn test_missing_version_manifest_is_fatal() {
    let project = TestProject::new();
    project.create_file("services/orphan/service.toml", "dockerfile = \"Dockerfile\"\n");

    let output = project.run(&["build", "orphan", "--show-build-order"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("has no version manifest"), "stderr: {}", stderr(&output));
}

#[test]
fn test_requires_a_selection() {
    let project = TestProject::new().with_cernbox();
    let output = project.run(&["build", "--show-build-order"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Specify a service"));
}

const TWO_PLATFORMS: &str = r#"
default = "debian"

[[platforms]]
name = "debian"
dockerfile = "Dockerfile"

[[platforms]]
name = "alpine"
dockerfile = "Dockerfile"
"#;

#[test]
fn test_single_platform_dependency_reuse_is_logged() {
    let project = TestProject::new();
    project.add_service("tools", PLAIN_SERVICE, None, PLAIN_VERSIONS);
    project.add_service(
        "web",
        "[dependencies.tools]\nbuild_arg = \"TOOLS_IMAGE\"\n",
        Some(TWO_PLATFORMS),
        "default = \"v1\"\n[[versions]]\nname = \"v1\"\n",
    );
    project.add_service(
        "silent",
        "[dependencies.tools]\nbuild_arg = \"TOOLS_IMAGE\"\nsingle_platform = true\n",
        Some(TWO_PLATFORMS),
        "default = \"v1\"\n[[versions]]\nname = \"v1\"\n",
    );

    let output = project.run(&["-v", "build", "web", "--show-build-order"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout_lines(&output),
        vec!["tools:v1", "web:v1:debian", "web:v1:alpine"]
    );
    let err = stderr(&output);
    assert!(
        err.contains("web:v1:debian: dependency 'tools' is single-platform; reusing one image across all platforms"),
        "stderr: {err}"
    );
    assert!(err.contains("web:v1:alpine: dependency 'tools' is single-platform"), "stderr: {err}");

    let output = project.run(&["-v", "build", "silent", "--show-build-order"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(!stderr(&output).contains("is single-platform"), "stderr: {}", stderr(&output));
}

#[test]
fn test_platform_suffix_beats_single_platform_flag() {
    let project = TestProject::new().with_cernbox();
    project.add_service(
        "mixer",
        "[dependencies.revad-base]\nbuild_arg = \"REVAD_BASE_IMAGE\"\nsingle_platform = true\n",
        Some("default = \"debian\"\n[[platforms]]\nname = \"debian\"\ndockerfile = \"Dockerfile\"\n"),
        r#"
default = "v1"

[[versions]]
name = "v1"

[versions.overrides.dependencies.revad-base]
version = "v3.3.3-alpine"
"#,
    );

    let output = project.run(&["build", "mixer", "--show-build-order"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout_lines(&output),
        vec!["revad-base:v3.3.3:alpine", "mixer:v1:debian"]
    );
    let err = stderr(&output);
    assert!(
        err.contains("dependency 'revad-base' is marked single_platform but version 'v3.3.3-alpine' names platform 'alpine'; the suffix wins"),
        "stderr: {err}"
    );
}

#[test]
fn test_invalid_dependency_manifests_reported_together() {
    let project = TestProject::new();
    single(&project, "web", &["a", "b"]);
    for (name, default) in [("a", "v9"), ("b", "v8")] {
        project.add_service(
            name,
            &format!("dockerfile = \"services/{name}/Dockerfile\"\n"),
            None,
            &format!("default = \"{default}\"\n[[versions]]\nname = \"v1\"\n"),
        );
    }

    let output = project.run(&["build", "web", "--show-build-order"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
    let err = stderr(&output);
    assert!(err.contains("Invalid configuration (2 violations)"), "stderr: {err}");
    assert!(err.contains("a/versions.toml: default version 'v9'"), "stderr: {err}");
    assert!(err.contains("b/versions.toml: default version 'v8'"), "stderr: {err}");
}

//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test repository context
///
/// Creates a temporary directory for a test repository and provides
/// utilities for writing services and running the binary against it.
pub struct TestProject {
    /// Temporary directory for the test repository
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test repository in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test repository
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test repository
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Read a file from the test repository
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Write `services/<name>/` with a Dockerfile
    pub fn add_service(&self, name: &str, service: &str, platforms: Option<&str>, versions: &str) {
        self.create_file(&format!("services/{name}/service.toml"), service);
        self.create_file(&format!("services/{name}/versions.toml"), versions);
        if let Some(platforms) = platforms {
            self.create_file(&format!("services/{name}/platforms.toml"), platforms);
        }
        self.create_file(
            &format!("services/{name}/Dockerfile"),
            &format!("FROM scratch\nLABEL service={name}\n"),
        );
    }

    /// `revad-base` (debian, alpine) and `cernbox-web` (debian) depending on it
    pub fn with_cernbox(self) -> Self {
        self.add_service(
            "revad-base",
            "",
            Some(REVAD_PLATFORMS),
            REVAD_VERSIONS,
        );
        self.add_service(
            "cernbox-web",
            CERNBOX_WEB_SERVICE,
            Some(CERNBOX_WEB_PLATFORMS),
            CERNBOX_WEB_VERSIONS,
        );
        self
    }

    /// Install a fake container builder and point `stackforge.toml` at it.
    ///
    /// The builder logs every invocation to `builder.log`, reports every
    /// image as absent, and fails builds of services named `broken`.
    #[cfg(unix)]
    pub fn with_fake_builder(self) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let script = self.dir.path().join("fake-builder.sh");
        std::fs::write(&script, FAKE_BUILDER).expect("Failed to write fake builder");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to make fake builder executable");
        self.create_file(
            "stackforge.toml",
            &format!("builder = \"{}\"\n", script.display()),
        );
        self
    }

    /// Builder invocations recorded by the fake builder
    pub fn builder_log(&self) -> Vec<String> {
        let path = self.dir.path().join("builder.log");
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Run stackforge against this repository
    pub fn run(&self, args: &[&str]) -> Output {
        self.run_with_env(args, &[])
    }

    /// Run stackforge with extra environment variables
    pub fn run_with_env(&self, args: &[&str], envs: &[(&str, &str)]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_stackforge"))
            .arg("-C")
            .arg(self.path())
            .args(args)
            .env_remove("CI")
            .env_remove("RUST_LOG")
            .env_remove("CI_COMMIT_SHORT_SHA")
            .env_remove("GITHUB_SHA")
            .env_remove("STACKFORGE_DEP_CACHE")
            .env_remove("TLS_MODE")
            .envs(envs.iter().copied())
            .output()
            .expect("Failed to execute stackforge")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Stdout of a run as a string
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Stderr of a run as a string
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Non-empty stdout lines
pub fn stdout_lines(output: &Output) -> Vec<String> {
    stdout(output)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

pub const REVAD_PLATFORMS: &str = r#"
default = "debian"

[defaults]
dockerfile = "services/revad-base/Dockerfile"

[[platforms]]
name = "debian"

[[platforms]]
name = "alpine"
"#;

pub const REVAD_VERSIONS: &str = r#"
default = "v3.3.3"

[[versions]]
name = "v3.3.3"
latest = true
tags = ["v3.3"]

[[versions]]
name = "v3.2.0"
"#;

pub const CERNBOX_WEB_SERVICE: &str = r#"
[dependencies.revad-base]
build_arg = "REVAD_BASE_IMAGE"
"#;

pub const CERNBOX_WEB_PLATFORMS: &str = r#"
default = "debian"

[[platforms]]
name = "debian"
dockerfile = "services/cernbox-web/Dockerfile"
"#;

pub const CERNBOX_WEB_VERSIONS: &str = r#"
default = "v1.0.0"

[[versions]]
name = "v1.0.0"

[versions.overrides.dependencies.revad-base]
version = "v3.3.3"
"#;

/// Single-platform service with no dependencies
pub const PLAIN_SERVICE: &str = r#"
dockerfile = "services/tools/Dockerfile"
"#;

pub const PLAIN_VERSIONS: &str = r#"
default = "v1"

[[versions]]
name = "v1"

[[versions]]
name = "v2"
"#;

const FAKE_BUILDER: &str = r#"#!/bin/sh
echo "$*" >> "$(dirname "$0")/builder.log"
case "$1" in
  build)
    case "$*" in
      *services/broken/*) echo "boom" >&2; exit 1 ;;
    esac
    exit 0
    ;;
  *)
    exit 1
    ;;
esac
"#;

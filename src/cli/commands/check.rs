//! Check command implementation
//!
//! Implements `stackforge check`: resolve every version and platform of
//! the selected services, build the graph, sort it and hash it, reporting
//! every configuration violation in one message.

use anyhow::{bail, Result};
use clap::Args;
use std::path::Path;
use tracing::info;

use super::open_workspace;
use crate::cli::output::{print_status, status, OutputConfig};
use crate::core::builder::{plan, BuildTarget};
use crate::core::hash::compute_hashes;
use crate::core::version::resolve_root_variants;
use crate::core::workspace::Workspace;
use crate::error::{ConfigValidationError, ForgeError, ResolveError};

/// Check options
#[derive(Args, Debug, Clone, Default)]
pub struct CheckOptions {
    /// Service name
    #[arg(conflicts_with = "all_services")]
    pub service: Option<String>,

    /// Every service in the repository
    #[arg(long)]
    pub all_services: bool,
}

/// Result of a successful check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub services: usize,
    pub images: usize,
}

/// Execute the check command
pub async fn execute(repo: &Path, options: CheckOptions) -> Result<()> {
    let workspace = open_workspace(repo)?;
    let services = match (&options.service, options.all_services) {
        (Some(service), _) => vec![service.clone()],
        (None, true) => workspace.list_services()?,
        (None, false) => bail!("Specify a service or use --all-services"),
    };

    let summary = check_services(&workspace, &services)?;

    if OutputConfig::current().json {
        println!(
            "{}",
            serde_json::json!({
                "valid": true,
                "services": summary.services,
                "images": summary.images,
            })
        );
    } else {
        print_status(
            status::SUCCESS,
            &format!(
                "Configuration valid: {} services, {} images",
                summary.services, summary.images
            ),
        );
    }
    Ok(())
}

/// Resolve every `version × platform` of `services`.
///
/// Manifest violations of one service do not hide those of another; they
/// are reported together with the graph violations. A resolution error
/// met after violations were found is reported as one more violation.
pub fn check_services(workspace: &Workspace, services: &[String]) -> Result<CheckSummary, ForgeError> {
    let mut violations = ConfigValidationError::new();
    let mut targets = Vec::new();

    for service in services {
        let files = match workspace.load_service(service) {
            Ok(files) => files,
            Err(ResolveError::Config(errors)) => {
                violations.extend(errors);
                continue;
            }
            Err(e) => return Err(merge_violations(violations, service, e.into())),
        };

        for version in files.versions.version_names() {
            let variants = match resolve_root_variants(&files, Some(version.as_str()), None) {
                Ok(variants) => variants,
                Err(e) => {
                    let location = format!("{service}:{version}");
                    return Err(merge_violations(violations, &location, e.into()));
                }
            };
            for variant in variants {
                targets.push(BuildTarget {
                    service: service.clone(),
                    variant,
                });
            }
        }
    }

    let checked = match plan(workspace, &targets) {
        Ok(plan) => Some(plan),
        Err(ForgeError::Config(errors)) => {
            violations.extend(errors);
            None
        }
        Err(e) => return Err(merge_violations(violations, "dependency graph", e)),
    };
    violations.into_result()?;

    let images = match checked {
        Some(plan) => {
            compute_hashes(&plan.graph, &plan.order, workspace)?;
            info!("Checked {} images", plan.order.len());
            plan.order.len()
        }
        None => 0,
    };

    Ok(CheckSummary {
        services: services.len(),
        images,
    })
}

/// `error` alone, or appended to the violations already found
fn merge_violations(
    mut violations: ConfigValidationError,
    location: &str,
    error: ForgeError,
) -> ForgeError {
    if violations.is_empty() {
        return error;
    }
    violations.push(location, error.to_string());
    violations.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::RepoSettings;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn service(root: &Path, name: &str, versions: &str) {
        write(
            root,
            &format!("services/{name}/service.toml"),
            &format!("dockerfile = \"services/{name}/Dockerfile\"\n"),
        );
        write(root, &format!("services/{name}/versions.toml"), versions);
        write(root, &format!("services/{name}/Dockerfile"), "FROM scratch\n");
    }

    #[test]
    fn test_counts_every_version() {
        let dir = TempDir::new().unwrap();
        service(
            dir.path(),
            "api",
            "default = \"v1\"\n[[versions]]\nname = \"v1\"\n[[versions]]\nname = \"v2\"\n",
        );
        let ws = Workspace::new(dir.path(), RepoSettings::default());
        let summary = check_services(&ws, &["api".to_string()]).unwrap();
        assert_eq!(summary, CheckSummary { services: 1, images: 2 });
    }

    #[test]
    fn test_violations_from_several_services_reported_together() {
        let dir = TempDir::new().unwrap();
        service(
            dir.path(),
            "api",
            "default = \"v9\"\n[[versions]]\nname = \"v1\"\n",
        );
        service(
            dir.path(),
            "web",
            "default = \"v1\"\n[[versions]]\nname = \"v1\"\n[[versions]]\nname = \"v1\"\n",
        );
        let ws = Workspace::new(dir.path(), RepoSettings::default());
        let err = check_services(&ws, &["api".to_string(), "web".to_string()]).unwrap_err();
        match err {
            ForgeError::Config(errors) => assert_eq!(errors.violations.len(), 2, "{errors}"),
            other => panic!("expected violations, got {other}"),
        }
    }

    fn depends_on(root: &Path, name: &str, deps: &[&str]) {
        let mut base = format!("dockerfile = \"services/{name}/Dockerfile\"\n");
        for dep in deps {
            base.push_str(&format!("[dependencies.{dep}]\nbuild_arg = \"{}\"\n", dep.to_uppercase()));
        }
        write(root, &format!("services/{name}/service.toml"), &base);
    }

    #[test]
    fn test_dependency_manifest_violations_join_service_violations() {
        let dir = TempDir::new().unwrap();
        let one = "[[versions]]\nname = \"v1\"\n";
        service(dir.path(), "other", &format!("default = \"v7\"\n{one}"));
        service(dir.path(), "web", &format!("default = \"v1\"\n{one}"));
        depends_on(dir.path(), "web", &["a", "b"]);
        service(dir.path(), "a", &format!("default = \"v9\"\n{one}"));
        service(dir.path(), "b", &format!("default = \"v8\"\n{one}"));

        let ws = Workspace::new(dir.path(), RepoSettings::default());
        let err = check_services(&ws, &["other".to_string(), "web".to_string()]).unwrap_err();
        match err {
            ForgeError::Config(errors) => {
                let msg = errors.to_string();
                assert_eq!(errors.violations.len(), 3, "{msg}");
                for default in ["'v7'", "'v8'", "'v9'"] {
                    assert!(msg.contains(&format!("default version {default}")), "{msg}");
                }
            }
            other => panic!("expected violations, got {other}"),
        }
    }

    #[test]
    fn test_resolution_error_keeps_earlier_violations() {
        let dir = TempDir::new().unwrap();
        let one = "[[versions]]\nname = \"v1\"\n";
        service(dir.path(), "api", &format!("default = \"v9\"\n{one}"));
        service(dir.path(), "web", &format!("default = \"v1\"\n{one}"));
        depends_on(dir.path(), "web", &["ghost"]);

        let ws = Workspace::new(dir.path(), RepoSettings::default());
        let err = check_services(&ws, &["api".to_string(), "web".to_string()]).unwrap_err();
        match err {
            ForgeError::Config(errors) => {
                let msg = errors.to_string();
                assert_eq!(errors.violations.len(), 2, "{msg}");
                assert!(msg.contains("default version 'v9'"), "{msg}");
                assert!(msg.contains("Service 'ghost' not found"), "{msg}");
            }
            other => panic!("expected violations, got {other}"),
        }
    }
}

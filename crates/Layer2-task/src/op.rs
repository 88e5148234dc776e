//! Container operations and their external argv mapping
//!
//! Every request the engine accepts is one variant of [`Operation`]. The
//! variant carries the full payload, validates it, and renders the argument
//! vector passed to the external container tool. Rendering is pure: the same
//! operation always produces the same argv.

use boxforge_foundation::{Error, Result};
use serde::{Deserialize, Serialize};

/// In-container helper invoked for app export and unexport
const EXPORT_HELPER: &str = "distrobox-export";

/// Staging file stem used when copying a package into a container
const PACKAGE_STAGING_STEM: &str = "boxforge.user-package";

// ============================================================================
// Operation Kinds
// ============================================================================

/// Discriminant for [`Operation`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Create,
    Clone,
    Delete,
    Upgrade,
    UpgradeAll,
    Stop,
    StopAll,
    ExportApp,
    UnexportApp,
    InstallPackage,
    GenerateEntry,
    DeleteEntry,
}

impl OpKind {
    /// Stable lowercase identifier (for logs)
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::Clone => "clone",
            OpKind::Delete => "delete",
            OpKind::Upgrade => "upgrade",
            OpKind::UpgradeAll => "upgrade-all",
            OpKind::Stop => "stop",
            OpKind::StopAll => "stop-all",
            OpKind::ExportApp => "export-app",
            OpKind::UnexportApp => "unexport-app",
            OpKind::InstallPackage => "install-package",
            OpKind::GenerateEntry => "generate-entry",
            OpKind::DeleteEntry => "delete-entry",
        }
    }

    /// Get display name for the operation kind
    pub fn display_name(&self) -> &'static str {
        match self {
            OpKind::Create => "Create Container",
            OpKind::Clone => "Clone Container",
            OpKind::Delete => "Delete Container",
            OpKind::Upgrade => "Upgrade Container",
            OpKind::UpgradeAll => "Upgrade All Containers",
            OpKind::Stop => "Stop Container",
            OpKind::StopAll => "Stop All Containers",
            OpKind::ExportApp => "Export App",
            OpKind::UnexportApp => "Unexport App",
            OpKind::InstallPackage => "Install Package",
            OpKind::GenerateEntry => "Generate Desktop Entry",
            OpKind::DeleteEntry => "Delete Desktop Entry",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Package Kinds
// ============================================================================

/// Package formats that can be installed into a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageKind {
    Deb,
    Rpm,
}

impl PackageKind {
    /// Recognize a package file by extension (case-insensitive)
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_lowercase();
        if lower.ends_with(".deb") {
            Some(PackageKind::Deb)
        } else if lower.ends_with(".rpm") {
            Some(PackageKind::Rpm)
        } else {
            None
        }
    }

    /// File extension without the leading dot
    pub fn ext(&self) -> &'static str {
        match self {
            PackageKind::Deb => "deb",
            PackageKind::Rpm => "rpm",
        }
    }

    /// Installer invocation run inside the container
    pub fn install_command(&self) -> &'static str {
        match self {
            PackageKind::Deb => "sudo apt-get install -y",
            PackageKind::Rpm => "sudo dnf install -y",
        }
    }
}

// ============================================================================
// Operations
// ============================================================================

/// A container operation and its full payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Create a container from an image
    Create {
        name: String,
        image: String,
        /// Pass the host NVIDIA driver into the container
        nvidia: bool,
        /// Run an init system (systemd) inside the container
        init: bool,
        /// Custom home directory on the host
        home: Option<String>,
        /// Extra volume mounts, `host:container`
        volumes: Vec<String>,
    },

    /// Clone an existing container under a new name
    Clone { source: String, new_name: String },

    /// Delete a container
    Delete { name: String },

    /// Upgrade the packages of one container
    Upgrade { name: String },

    /// Upgrade the packages of every container
    UpgradeAll,

    /// Stop one running container
    Stop { name: String },

    /// Stop every running container
    StopAll,

    /// Export an application from a container to the host
    ExportApp {
        container: String,
        /// Absolute path of the .desktop file inside the container
        desktop_file: String,
    },

    /// Remove a previously exported application from the host
    UnexportApp {
        container: String,
        desktop_file: String,
    },

    /// Copy a package file into a container and install it there
    InstallPackage {
        container: String,
        /// Host path of the .deb or .rpm file
        package_path: String,
    },

    /// Generate the host desktop entry for a container
    GenerateEntry {
        container: String,
        /// Icon path recorded in the entry
        icon: Option<String>,
    },

    /// Delete the host desktop entry of a container
    DeleteEntry { container: String },
}

impl Operation {
    /// Kind discriminant of this operation
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Create { .. } => OpKind::Create,
            Operation::Clone { .. } => OpKind::Clone,
            Operation::Delete { .. } => OpKind::Delete,
            Operation::Upgrade { .. } => OpKind::Upgrade,
            Operation::UpgradeAll => OpKind::UpgradeAll,
            Operation::Stop { .. } => OpKind::Stop,
            Operation::StopAll => OpKind::StopAll,
            Operation::ExportApp { .. } => OpKind::ExportApp,
            Operation::UnexportApp { .. } => OpKind::UnexportApp,
            Operation::InstallPackage { .. } => OpKind::InstallPackage,
            Operation::GenerateEntry { .. } => OpKind::GenerateEntry,
            Operation::DeleteEntry { .. } => OpKind::DeleteEntry,
        }
    }

    /// Primary container this operation acts on, if it has one
    pub fn target(&self) -> Option<&str> {
        match self {
            Operation::Create { name, .. }
            | Operation::Delete { name }
            | Operation::Upgrade { name }
            | Operation::Stop { name } => Some(name),
            Operation::Clone { source, .. } => Some(source),
            Operation::ExportApp { container, .. }
            | Operation::UnexportApp { container, .. }
            | Operation::InstallPackage { container, .. }
            | Operation::GenerateEntry { container, .. }
            | Operation::DeleteEntry { container } => Some(container),
            Operation::UpgradeAll | Operation::StopAll => None,
        }
    }

    /// Check the payload before the operation is accepted
    pub fn validate(&self) -> Result<()> {
        match self {
            Operation::Create { name, image, .. } => {
                require("container name", name)?;
                require("image", image)
            }
            Operation::Clone { source, new_name } => {
                require("source container name", source)?;
                require("new container name", new_name)
            }
            Operation::Delete { name }
            | Operation::Upgrade { name }
            | Operation::Stop { name } => require("container name", name),
            Operation::UpgradeAll | Operation::StopAll => Ok(()),
            Operation::ExportApp {
                container,
                desktop_file,
            }
            | Operation::UnexportApp {
                container,
                desktop_file,
            } => {
                require("container name", container)?;
                require("desktop file path", desktop_file)
            }
            Operation::InstallPackage {
                container,
                package_path,
            } => {
                require("container name", container)?;
                require("package path", package_path)?;
                if PackageKind::from_path(package_path).is_none() {
                    return Err(Error::InvalidRequest(format!(
                        "unsupported package format: {} (only .deb and .rpm are supported)",
                        package_path
                    )));
                }
                Ok(())
            }
            Operation::GenerateEntry { container, .. }
            | Operation::DeleteEntry { container } => require("container name", container),
        }
    }

    /// Render the argument vector passed to the external tool.
    ///
    /// The tool executable itself is not part of the result.
    pub fn build_args(&self) -> Result<Vec<String>> {
        let args = match self {
            Operation::Create {
                name,
                image,
                nvidia,
                init,
                home,
                volumes,
            } => {
                let mut args = strings(&["create", "--yes", "--name"]);
                args.push(name.clone());
                args.push("--image".to_string());
                args.push(image.clone());
                if let Some(home) = home {
                    args.push("--home".to_string());
                    args.push(home.clone());
                }
                if *init {
                    args.push("--init".to_string());
                    args.push("--additional-packages".to_string());
                    args.push("systemd".to_string());
                }
                if *nvidia {
                    args.push("--nvidia".to_string());
                }
                for volume in volumes {
                    args.push("--volume".to_string());
                    args.push(volume.clone());
                }
                args
            }

            Operation::Clone { source, new_name } => {
                let mut args = strings(&["create", "--clone"]);
                args.push(source.clone());
                args.push("--name".to_string());
                args.push(new_name.clone());
                args
            }

            Operation::Delete { name } => {
                let mut args = strings(&["rm", "--force"]);
                args.push(name.clone());
                args
            }

            Operation::Upgrade { name } => vec!["upgrade".to_string(), name.clone()],

            Operation::UpgradeAll => strings(&["upgrade", "--all"]),

            Operation::Stop { name } => vec!["stop".to_string(), name.clone()],

            Operation::StopAll => strings(&["stop", "--all"]),

            Operation::ExportApp {
                container,
                desktop_file,
            } => vec![
                "enter".to_string(),
                container.clone(),
                "--".to_string(),
                EXPORT_HELPER.to_string(),
                "--app".to_string(),
                desktop_file.clone(),
            ],

            Operation::UnexportApp {
                container,
                desktop_file,
            } => vec![
                "enter".to_string(),
                container.clone(),
                "--".to_string(),
                EXPORT_HELPER.to_string(),
                "-d".to_string(),
                "--app".to_string(),
                desktop_file.clone(),
            ],

            Operation::InstallPackage {
                container,
                package_path,
            } => {
                let kind = PackageKind::from_path(package_path).ok_or_else(|| {
                    Error::InvalidRequest(format!(
                        "unsupported package format: {}",
                        package_path
                    ))
                })?;
                let staged = format!("/tmp/{}.{}", PACKAGE_STAGING_STEM, kind.ext());
                let src = sh_quote(package_path);
                let dst = sh_quote(&staged);
                let script =
                    format!("cp {} {} && {} {}", src, dst, kind.install_command(), dst);
                vec![
                    "enter".to_string(),
                    container.clone(),
                    "--".to_string(),
                    "sh".to_string(),
                    "-c".to_string(),
                    script,
                ]
            }

            Operation::GenerateEntry { container, icon } => {
                let mut args = vec!["generate-entry".to_string(), container.clone()];
                if let Some(icon) = icon {
                    args.push("--icon".to_string());
                    args.push(icon.clone());
                }
                args
            }

            Operation::DeleteEntry { container } => vec![
                "generate-entry".to_string(),
                container.clone(),
                "--delete".to_string(),
            ],
        };
        Ok(args)
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidRequest(format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Single-quote a value for interpolation into an `sh -c` script
fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(op: &Operation) -> Vec<String> {
        op.build_args().unwrap()
    }

    #[test]
    fn test_create_full_args() {
        let op = Operation::Create {
            name: "devbox".to_string(),
            image: "docker.io/library/ubuntu:24.04".to_string(),
            nvidia: true,
            init: true,
            home: Some("/home/user/boxes/devbox".to_string()),
            volumes: vec!["/data:/data".to_string(), "/opt/tools:/tools".to_string()],
        };
        assert_eq!(
            args(&op),
            vec![
                "create",
                "--yes",
                "--name",
                "devbox",
                "--image",
                "docker.io/library/ubuntu:24.04",
                "--home",
                "/home/user/boxes/devbox",
                "--init",
                "--additional-packages",
                "systemd",
                "--nvidia",
                "--volume",
                "/data:/data",
                "--volume",
                "/opt/tools:/tools",
            ]
        );
    }

    #[test]
    fn test_create_minimal_args() {
        let op = Operation::Create {
            name: "plain".to_string(),
            image: "quay.io/fedora/fedora:40".to_string(),
            nvidia: false,
            init: false,
            home: None,
            volumes: Vec::new(),
        };
        assert_eq!(
            args(&op),
            vec![
                "create",
                "--yes",
                "--name",
                "plain",
                "--image",
                "quay.io/fedora/fedora:40",
            ]
        );
    }

    #[test]
    fn test_clone_args() {
        let op = Operation::Clone {
            source: "devbox".to_string(),
            new_name: "devbox-backup".to_string(),
        };
        assert_eq!(
            args(&op),
            vec!["create", "--clone", "devbox", "--name", "devbox-backup"]
        );
    }

    #[test]
    fn test_delete_args() {
        let op = Operation::Delete {
            name: "old".to_string(),
        };
        assert_eq!(args(&op), vec!["rm", "--force", "old"]);
    }

    #[test]
    fn test_upgrade_and_stop_args() {
        assert_eq!(
            args(&Operation::Upgrade {
                name: "devbox".to_string()
            }),
            vec!["upgrade", "devbox"]
        );
        assert_eq!(args(&Operation::UpgradeAll), vec!["upgrade", "--all"]);
        assert_eq!(
            args(&Operation::Stop {
                name: "devbox".to_string()
            }),
            vec!["stop", "devbox"]
        );
        assert_eq!(args(&Operation::StopAll), vec!["stop", "--all"]);
    }

    #[test]
    fn test_export_and_unexport_args() {
        let export = Operation::ExportApp {
            container: "devbox".to_string(),
            desktop_file: "/usr/share/applications/firefox.desktop".to_string(),
        };
        assert_eq!(
            args(&export),
            vec![
                "enter",
                "devbox",
                "--",
                "distrobox-export",
                "--app",
                "/usr/share/applications/firefox.desktop",
            ]
        );

        let unexport = Operation::UnexportApp {
            container: "devbox".to_string(),
            desktop_file: "/usr/share/applications/firefox.desktop".to_string(),
        };
        assert_eq!(
            args(&unexport),
            vec![
                "enter",
                "devbox",
                "--",
                "distrobox-export",
                "-d",
                "--app",
                "/usr/share/applications/firefox.desktop",
            ]
        );
    }

    #[test]
    fn test_install_package_deb() {
        let op = Operation::InstallPackage {
            container: "devbox".to_string(),
            package_path: "/home/user/Downloads/tool.deb".to_string(),
        };
        let built = args(&op);
        assert_eq!(built[..5], ["enter", "devbox", "--", "sh", "-c"]);
        assert_eq!(
            built[5],
            "cp '/home/user/Downloads/tool.deb' '/tmp/boxforge.user-package.deb' \
             && sudo apt-get install -y '/tmp/boxforge.user-package.deb'"
        );
    }

    #[test]
    fn test_install_package_rpm_quotes_spaces() {
        let op = Operation::InstallPackage {
            container: "fedbox".to_string(),
            package_path: "/home/user/My Downloads/tool.rpm".to_string(),
        };
        let built = args(&op);
        assert_eq!(
            built[5],
            "cp '/home/user/My Downloads/tool.rpm' '/tmp/boxforge.user-package.rpm' \
             && sudo dnf install -y '/tmp/boxforge.user-package.rpm'"
        );
    }

    #[test]
    fn test_install_package_rejects_unknown_format() {
        let op = Operation::InstallPackage {
            container: "devbox".to_string(),
            package_path: "/tmp/tool.tar.gz".to_string(),
        };
        assert!(matches!(op.validate(), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_package_kind_is_case_insensitive() {
        assert_eq!(PackageKind::from_path("A.DEB"), Some(PackageKind::Deb));
        assert_eq!(PackageKind::from_path("b.Rpm"), Some(PackageKind::Rpm));
        assert_eq!(PackageKind::from_path("c.txt"), None);
    }

    #[test]
    fn test_generate_entry_args() {
        let with_icon = Operation::GenerateEntry {
            container: "devbox".to_string(),
            icon: Some("/usr/share/icons/box.png".to_string()),
        };
        assert_eq!(
            args(&with_icon),
            vec![
                "generate-entry",
                "devbox",
                "--icon",
                "/usr/share/icons/box.png",
            ]
        );

        let plain = Operation::GenerateEntry {
            container: "devbox".to_string(),
            icon: None,
        };
        assert_eq!(args(&plain), vec!["generate-entry", "devbox"]);

        let delete = Operation::DeleteEntry {
            container: "devbox".to_string(),
        };
        assert_eq!(args(&delete), vec!["generate-entry", "devbox", "--delete"]);
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let empty_name = Operation::Create {
            name: String::new(),
            image: "img".to_string(),
            nvidia: false,
            init: false,
            home: None,
            volumes: Vec::new(),
        };
        assert!(matches!(
            empty_name.validate(),
            Err(Error::InvalidRequest(_))
        ));

        let empty_image = Operation::Create {
            name: "a".to_string(),
            image: String::new(),
            nvidia: false,
            init: false,
            home: None,
            volumes: Vec::new(),
        };
        assert!(matches!(
            empty_image.validate(),
            Err(Error::InvalidRequest(_))
        ));

        assert!(Operation::UpgradeAll.validate().is_ok());
        assert!(matches!(
            Operation::Stop {
                name: String::new()
            }
            .validate(),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_build_args_is_pure() {
        let op = Operation::Stop {
            name: "devbox".to_string(),
        };
        assert_eq!(args(&op), args(&op));
    }

    #[test]
    fn test_target() {
        assert_eq!(
            Operation::Delete {
                name: "x".to_string()
            }
            .target(),
            Some("x")
        );
        assert_eq!(
            Operation::Clone {
                source: "src".to_string(),
                new_name: "dst".to_string()
            }
            .target(),
            Some("src")
        );
        assert_eq!(Operation::StopAll.target(), None);
    }
}

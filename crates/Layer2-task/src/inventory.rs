//! Container and application inventory
//!
//! Short-lived queries against the external tool, separate from the task
//! machinery: output is captured whole, parsed, and returned. Parsing is
//! split out as pure functions over the captured text.

use crate::distro::{self, DistroInfo};
use boxforge_foundation::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// One container reported by the external tool
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    /// Raw status text, e.g. "Up 2 hours" or "Created"
    pub status: String,
    pub image: String,
    /// Distribution family detected from the image URL
    pub distro: Option<DistroInfo>,
}

/// An application inside a container that can be exported to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportableApp {
    /// Name from the desktop entry
    pub name: String,
    /// Full path of the desktop file inside the container
    pub path: String,
    /// Whether the app is currently exported to the host
    pub exported: bool,
}

/// Run the tool once and capture stdout, mapping a non-zero exit to an error
pub(crate) async fn run_capture(tool: &str, args: &[&str]) -> Result<String> {
    debug!("Running {} {}", tool, args.join(" "));
    let output = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::LaunchFailure(format!("failed to start {}: {}", tool, e)))?;

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::process_failure(code, stderr.trim().to_string()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `ls --no-color` output.
///
/// The first non-empty line is the header; every following line is
/// `ID | NAME | STATUS | IMAGE`. Lines with fewer fields are ignored.
pub fn parse_container_list(output: &str) -> Vec<ContainerInfo> {
    let mut containers = Vec::new();

    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    for line in lines.iter().skip(1) {
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < 4 {
            continue;
        }
        let image = parts[3].trim().to_string();
        containers.push(ContainerInfo {
            id: parts[0].trim().to_string(),
            name: parts[1].trim().to_string(),
            status: parts[2].trim().to_string(),
            distro: distro::detect_from_image(&image).copied(),
            image,
        });
    }

    containers
}

/// Shell script run inside a container to enumerate its desktop entries and
/// the ones already exported to the host
pub(crate) fn exportable_apps_script(container: &str) -> String {
    format!(
        "echo \"EXPORTED_APPS:\" && \
         ls ${{XDG_DATA_HOME:-$HOME/.local/share}}/applications/{container}-*.desktop 2>/dev/null; \
         echo \"DESKTOP_FILES:\" && \
         for file in $(grep --files-without-match \"NoDisplay=true\" /usr/share/applications/*.desktop); \
         do echo \"# START FILE $file\"; cat \"$file\"; done"
    )
}

/// Parse the output of [`exportable_apps_script`].
///
/// The `EXPORTED_APPS:` section lists the desktop files already exported to
/// the host. The `DESKTOP_FILES:` section concatenates every displayable
/// desktop entry, each preceded by a `# START FILE <path>` marker. An app
/// counts as exported when `<home>/.local/share/applications/` contains
/// `<container>-<file name>`.
pub fn parse_exportable_apps(output: &str, container: &str, home: &str) -> Vec<ExportableApp> {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut exported = HashSet::new();
    let mut in_exported = false;
    for line in &lines {
        match *line {
            "EXPORTED_APPS:" => in_exported = true,
            "DESKTOP_FILES:" => in_exported = false,
            other if in_exported => {
                exported.insert(other.to_string());
            }
            _ => {}
        }
    }

    let mut apps = Vec::new();
    let mut current_path: Option<String> = None;
    let mut current_name: Option<String> = None;

    let mut flush = |path: &mut Option<String>, name: &mut Option<String>| {
        if let (Some(path), Some(name)) = (path.take(), name.take()) {
            let file_name = path.rsplit('/').next().unwrap_or(path.as_str());
            let exported_path =
                format!("{}/.local/share/applications/{}-{}", home, container, file_name);
            apps.push(ExportableApp {
                name,
                exported: exported.contains(&exported_path),
                path,
            });
        }
    };

    for line in &lines {
        if let Some(path) = line.strip_prefix("# START FILE ") {
            flush(&mut current_path, &mut current_name);
            current_path = Some(path.trim().to_string());
        } else if let Some(name) = line.strip_prefix("Name=") {
            // First Name= wins: it belongs to the main desktop entry group
            if current_path.is_some() && current_name.is_none() {
                current_name = Some(name.to_string());
            }
        }
    }
    flush(&mut current_path, &mut current_name);

    apps
}

//! Host environment detection
//!
//! Detects whether the process runs inside an application sandbox. Commands
//! that must reach the host (terminal emulators, the container tool itself
//! when attached to a terminal) are rewritten accordingly.

use std::env;
use std::path::Path;

/// Application sandbox the process runs inside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sandbox {
    None,
    Flatpak,
}

impl Sandbox {
    pub fn detect() -> Self {
        if env::var_os("FLATPAK_ID").is_some() || Path::new("/.flatpak-info").exists() {
            Self::Flatpak
        } else {
            Self::None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Flatpak => "flatpak",
        }
    }

    pub fn is_sandboxed(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Host environment info
#[derive(Debug, Clone)]
pub struct HostEnv {
    pub sandbox: Sandbox,
}

impl HostEnv {
    /// Detect the current host environment
    pub fn detect() -> Self {
        Self {
            sandbox: Sandbox::detect(),
        }
    }

    /// Rewrite an argv so it executes on the host rather than in the sandbox.
    ///
    /// Inside Flatpak the host command runs through `flatpak-spawn --host`;
    /// outside a sandbox the argv is returned unchanged.
    pub fn wrap_host_command(&self, argv: Vec<String>) -> Vec<String> {
        match self.sandbox {
            Sandbox::None => argv,
            Sandbox::Flatpak => {
                let mut wrapped = Vec::with_capacity(argv.len() + 2);
                wrapped.push("flatpak-spawn".to_string());
                wrapped.push("--host".to_string());
                wrapped.extend(argv);
                wrapped
            }
        }
    }
}

impl Default for HostEnv {
    fn default() -> Self {
        Self::detect()
    }
}

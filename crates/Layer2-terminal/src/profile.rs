//! Terminal launch profiles.
//!
//! A profile describes how a terminal emulator accepts a command to run:
//! the binary to invoke and the separator flag that introduces the payload
//! (`--` for gnome-terminal, `-e` for konsole, and so on).

// ============================================================================
// Terminal Profile
// ============================================================================

/// A terminal emulator launch profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalProfile {
    /// Stable identifier, unique within the registry.
    pub name: String,
    /// Human-readable name shown in listings.
    pub display_name: String,
    /// Binary invoked to open a window.
    pub command: String,
    /// Flag that introduces the payload command, e.g. `--` or `-e`.
    /// Empty for emulators that take the payload directly.
    pub separator: String,
    /// Built-in profiles ship with the application and cannot be edited
    /// or removed.
    pub built_in: bool,
}

impl TerminalProfile {
    /// Create a user-defined profile.
    pub fn custom(
        name: impl Into<String>,
        display_name: impl Into<String>,
        command: impl Into<String>,
        separator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            command: command.into(),
            separator: separator.into(),
            built_in: false,
        }
    }
}

// ============================================================================
// Built-in Catalog
// ============================================================================

/// (name, display name, separator). The command equals the name for every
/// built-in. Order is the detection priority.
const BUILT_IN_TABLE: &[(&str, &str, &str)] = &[
    ("gnome-terminal", "GNOME Terminal", "--"),
    ("konsole", "Konsole", "-e"),
    ("xfce4-terminal", "Xfce Terminal", "-x"),
    ("deepin-terminal", "Deepin Terminal", "-e"),
    ("kitty", "Kitty", "--"),
    ("alacritty", "Alacritty", "-e"),
    ("tilix", "Tilix", "-e"),
    ("terminator", "Terminator", "-x"),
];

/// Return the built-in profiles in detection priority order.
pub fn built_in_profiles() -> Vec<TerminalProfile> {
    BUILT_IN_TABLE
        .iter()
        .map(|(name, display_name, separator)| TerminalProfile {
            name: (*name).to_string(),
            display_name: (*display_name).to_string(),
            command: (*name).to_string(),
            separator: (*separator).to_string(),
            built_in: true,
        })
        .collect()
}

// ============================================================================
// Launch Argument Resolution
// ============================================================================

/// Compute the argument vector that opens `payload` in the given terminal:
/// `[command, separator tokens..., payload tokens...]`.
///
/// The separator segment is omitted entirely when the separator is empty.
/// Both the separator and the payload are split shell-style, so a payload
/// like `distrobox enter devbox` becomes three tokens.
pub fn build_launch_args(profile: &TerminalProfile, payload: &str) -> Vec<String> {
    let mut args = vec![profile.command.clone()];
    args.extend(tokenize(&profile.separator));
    args.extend(tokenize(payload));
    args
}

/// Split a string into shell-style tokens, falling back to whitespace
/// splitting if the input is not valid shell syntax (e.g. an unclosed
/// quote).
fn tokenize(input: &str) -> Vec<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    shlex::split(trimmed)
        .unwrap_or_else(|| trimmed.split_whitespace().map(String::from).collect())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_catalog_is_priority_ordered() {
        let profiles = built_in_profiles();
        assert_eq!(profiles.len(), 8);
        assert_eq!(profiles[0].name, "gnome-terminal");
        assert_eq!(profiles[0].separator, "--");
        assert_eq!(profiles[7].name, "terminator");
        assert!(profiles.iter().all(|p| p.built_in));
        assert!(profiles.iter().all(|p| p.command == p.name));
    }

    #[test]
    fn launch_args_for_a_custom_profile() {
        let profile = TerminalProfile::custom("mate", "My Terminal", "mate-terminal", "-x");
        assert_eq!(
            build_launch_args(&profile, "bash"),
            vec!["mate-terminal", "-x", "bash"]
        );
    }

    #[test]
    fn empty_separator_is_omitted() {
        let profile = TerminalProfile::custom("plain", "Plain", "myterm", "");
        assert_eq!(
            build_launch_args(&profile, "distrobox enter devbox"),
            vec!["myterm", "distrobox", "enter", "devbox"]
        );
    }

    #[test]
    fn multi_token_separator_is_split() {
        let profile = TerminalProfile::custom("tabbed", "Tabbed", "myterm", "--tab -e");
        assert_eq!(
            build_launch_args(&profile, "htop"),
            vec!["myterm", "--tab", "-e", "htop"]
        );
    }

    #[test]
    fn quoted_payload_tokens_stay_together() {
        let profile = TerminalProfile::custom("k", "K", "kitty", "--");
        assert_eq!(
            build_launch_args(&profile, "sh -c 'echo hi'"),
            vec!["kitty", "--", "sh", "-c", "echo hi"]
        );
    }

    #[test]
    fn whitespace_only_payload_yields_no_tokens() {
        let profile = TerminalProfile::custom("k", "K", "kitty", "--");
        assert_eq!(build_launch_args(&profile, "   "), vec!["kitty", "--"]);
    }
}

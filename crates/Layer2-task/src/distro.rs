//! Known distribution catalog
//!
//! Maps container image URLs to the distribution family they are built on.
//! Matching is a case-insensitive substring scan over the catalog keys, in
//! key order, with a fallback for toolbx images that name their base distro
//! elsewhere in the URL.

use serde::Serialize;

/// Package manager of a distribution family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PackageManager {
    Apt,
    Dnf,
    Pacman,
    Zypper,
    Xbps,
    Apk,
}

impl PackageManager {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt",
            PackageManager::Dnf => "dnf",
            PackageManager::Pacman => "pacman",
            PackageManager::Zypper => "zypper",
            PackageManager::Xbps => "xbps",
            PackageManager::Apk => "apk",
        }
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A known distribution and how to recognize it in an image URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DistroInfo {
    /// Catalog key, matched as a substring of the lowercased image URL
    pub name: &'static str,

    /// Human-readable name
    pub display_name: &'static str,

    /// Badge color as a `#rrggbb` hex string
    pub color: &'static str,

    /// Package manager, if the family has a supported one
    pub package_manager: Option<PackageManager>,

    /// Extension of locally installable package files, if the family has one
    pub package_ext: Option<&'static str>,
}

const fn distro(
    name: &'static str,
    display_name: &'static str,
    color: &'static str,
    package_manager: Option<PackageManager>,
    package_ext: Option<&'static str>,
) -> DistroInfo {
    DistroInfo {
        name,
        display_name,
        color,
        package_manager,
        package_ext,
    }
}

use self::PackageManager::{Apk, Apt, Dnf, Pacman, Xbps, Zypper};

/// The catalog, ordered by key; image matching scans in this order
pub const KNOWN_DISTROS: &[DistroInfo] = &[
    distro("alma", "AlmaLinux", "#dadada", Some(Dnf), Some(".rpm")),
    distro("alpine", "Alpine Linux", "#2147ea", Some(Apk), Some(".apk")),
    distro("amazon", "Amazon Linux", "#de5412", Some(Dnf), Some(".rpm")),
    distro("arch", "Arch Linux", "#12aaff", Some(Pacman), Some(".pkg.tar.xz")),
    distro("centos", "CentOS", "#ff6600", Some(Dnf), Some(".rpm")),
    distro("clearlinux", "Clear Linux", "#56bbff", None, None),
    distro("crystal", "Crystal Linux", "#8839ef", Some(Pacman), Some(".pkg.tar.xz")),
    distro("debian", "Debian", "#da5555", Some(Apt), Some(".deb")),
    distro("deepin", "Deepin", "#0050ff", Some(Apt), Some(".deb")),
    distro("fedora", "Fedora", "#3b6db3", Some(Dnf), Some(".rpm")),
    distro("gentoo", "Gentoo", "#daaada", None, None),
    distro("kali", "Kali Linux", "#000000", Some(Apt), Some(".deb")),
    distro("mageia", "Mageia", "#b612b6", Some(Dnf), Some(".rpm")),
    distro("mint", "Linux Mint", "#6fbd20", Some(Apt), Some(".deb")),
    distro("neon", "KDE Neon", "#27ae60", Some(Apt), Some(".deb")),
    distro("opensuse", "openSUSE", "#daff00", Some(Zypper), Some(".rpm")),
    distro("oracle", "Oracle Linux", "#ff0000", Some(Dnf), Some(".rpm")),
    distro("redhat", "Red Hat", "#ff6662", Some(Dnf), Some(".rpm")),
    distro("rhel", "RHEL", "#ff6662", Some(Dnf), Some(".rpm")),
    distro("rocky", "Rocky Linux", "#91ff91", Some(Dnf), Some(".rpm")),
    distro("slackware", "Slackware", "#6145a7", None, None),
    distro("ubuntu", "Ubuntu", "#FF4400", Some(Apt), Some(".deb")),
    distro("vanilla", "Vanilla OS", "#7f11e0", Some(Apt), Some(".deb")),
    distro("void", "Void Linux", "#abff12", Some(Xbps), Some(".xbps")),
];

/// Look up a catalog entry by key
pub fn find(name: &str) -> Option<&'static DistroInfo> {
    KNOWN_DISTROS.iter().find(|distro| distro.name == name)
}

/// Detect the distribution family of a container image URL
pub fn detect_from_image(image: &str) -> Option<&'static DistroInfo> {
    let lower = image.to_lowercase();

    for distro in KNOWN_DISTROS {
        if lower.contains(distro.name) {
            return Some(distro);
        }
    }

    // toolbx images are usually based on specific distros
    if lower.contains("toolbx") {
        for base in ["fedora", "arch", "ubuntu"] {
            if lower.contains(base) {
                return find(base);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_common_images() {
        let ubuntu = detect_from_image("docker.io/library/ubuntu:24.04").unwrap();
        assert_eq!(ubuntu.name, "ubuntu");
        assert_eq!(ubuntu.package_manager, Some(PackageManager::Apt));
        assert_eq!(ubuntu.color, "#FF4400");
        assert_eq!(ubuntu.package_ext, Some(".deb"));

        let fedora = detect_from_image("quay.io/fedora/fedora:40").unwrap();
        assert_eq!(fedora.display_name, "Fedora");

        let arch = detect_from_image("docker.io/library/ARCHLINUX:latest").unwrap();
        assert_eq!(arch.name, "arch");
        assert_eq!(arch.package_ext, Some(".pkg.tar.xz"));
    }

    #[test]
    fn test_detect_unknown_image() {
        assert!(detect_from_image("docker.io/library/busybox:latest").is_none());
        assert!(detect_from_image("").is_none());
    }

    #[test]
    fn test_detect_respects_catalog_order() {
        // "alma" sorts before "debian", so a URL containing both matches alma
        let hit = detect_from_image("registry.example.com/debian/almalinux:9").unwrap();
        assert_eq!(hit.name, "alma");
    }

    #[test]
    fn test_catalog_is_sorted_and_unique() {
        for pair in KNOWN_DISTROS.windows(2) {
            assert!(pair[0].name < pair[1].name);
        }
    }

    #[test]
    fn test_find() {
        assert_eq!(find("void").unwrap().package_manager, Some(PackageManager::Xbps));
        assert!(find("windows").is_none());
    }

    #[test]
    fn test_distros_without_package_manager() {
        for name in ["clearlinux", "gentoo", "slackware"] {
            let hit = find(name).unwrap();
            assert_eq!(hit.package_manager, None);
            assert_eq!(hit.package_ext, None);
        }
    }

    #[test]
    fn test_catalog_colors_are_hex() {
        for distro in KNOWN_DISTROS {
            assert!(
                distro.color.len() == 7
                    && distro.color.starts_with('#')
                    && distro.color[1..].chars().all(|c| c.is_ascii_hexdigit()),
                "bad color {} for {}",
                distro.color,
                distro.name
            );
        }
    }

    #[test]
    fn test_package_ext_matches_the_package_manager() {
        for distro in KNOWN_DISTROS {
            let expected = match distro.package_manager {
                Some(Apt) => Some(".deb"),
                Some(Dnf) | Some(Zypper) => Some(".rpm"),
                Some(Pacman) => Some(".pkg.tar.xz"),
                Some(Xbps) => Some(".xbps"),
                Some(Apk) => Some(".apk"),
                None => None,
            };
            assert_eq!(distro.package_ext, expected, "distro {}", distro.name);
        }
    }
}

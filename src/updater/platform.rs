//! Static knowledge about the platforms Spectra ships launchers for.

use crate::updater::consts::APP_BUNDLE;

/// All concrete platform tags a catalog entry may be scoped to
pub const PLATFORM_TAGS: &[&str] = &[
    "linux32",
    "linux64",
    "linux-arm64",
    "macos",
    "macos-arm64",
    "win32",
    "win64",
];

/// Wildcard family tags; each matches every concrete tag of its OS family
pub const PLATFORM_FAMILIES: &[&str] = &["linuxx", "macosx", "winx"];

/// Maps each known launcher's relative path to the platform it belongs to
pub const LAUNCHERS: &[(&str, &str)] = &[
    ("Spectra-linux32", "linux32"),
    ("Spectra-linux64", "linux64"),
    ("Spectra-linux-arm64", "linux-arm64"),
    ("Contents/MacOS/Spectra-macos", "macos"),
    ("Contents/MacOS/Spectra-macos-arm64", "macos-arm64"),
    ("Spectra-win32.exe", "win32"),
    ("Spectra-win64.exe", "win64"),
];

/// Top-level directories whose second path component may scope a file to a platform
const PLATFORM_PREFIXES: &[&str] = &["jars", "lib"];

/// Returns true if the tag names a concrete platform or a wildcard family
pub fn is_known_tag(tag: &str) -> bool {
    PLATFORM_TAGS.contains(&tag) || PLATFORM_FAMILIES.contains(&tag)
}

/// The tag of the platform this process is running on
pub fn current_platform() -> &'static str {
    if cfg!(target_os = "linux") {
        if cfg!(target_arch = "aarch64") {
            "linux-arm64"
        } else if cfg!(target_pointer_width = "32") {
            "linux32"
        } else {
            "linux64"
        }
    } else if cfg!(target_os = "macos") {
        if cfg!(target_arch = "aarch64") {
            "macos-arm64"
        } else {
            "macos"
        }
    } else if cfg!(target_pointer_width = "32") {
        "win32"
    } else {
        "win64"
    }
}

/// Returns true if `tag` applies to `platform`. Family tags such as `linuxx`
/// match every concrete tag of the family.
pub fn matches_platform(tag: &str, platform: &str) -> bool {
    if tag == platform {
        return true;
    }

    match tag {
        "linuxx" => platform.starts_with("linux"),
        "macosx" => platform.starts_with("macos"),
        "winx" => platform.starts_with("win"),
        _ => false,
    }
}

/// The platform a launcher path belongs to, if it is a known launcher.
/// Anything inside a top-level `*.app` directory counts as a macOS-bundle
/// launcher.
pub fn launcher_platform(path: &str) -> Option<&'static str> {
    for (launcher, tag) in LAUNCHERS {
        if path == *launcher {
            return Some(tag);
        }
    }

    if in_app_bundle(path) {
        return Some("macosx");
    }

    None
}

/// Returns true if the path's first component is a top-level `*.app` directory
pub fn in_app_bundle(path: &str) -> bool {
    match path.split('/').next() {
        Some(first) => first.ends_with(".app"),
        None => false,
    }
}

/// Returns true if the path sits inside the application's own platform bundle
pub fn in_platform_bundle(path: &str) -> bool {
    path.split('/').next() == Some(APP_BUNDLE)
}

/// The platform a path is scoped to by its directory layout: the first
/// component must be a platform prefix and the second a known tag.
pub fn path_platform(path: &str) -> Option<&str> {
    let mut parts = path.split('/');
    let first = parts.next()?;
    let second = parts.next()?;

    // The tag directory must not itself be the filename
    parts.next()?;

    if PLATFORM_PREFIXES.contains(&first) && is_known_tag(second) {
        return Some(second);
    }

    None
}

/// Returns true if a file with the given platform set applies to `platform`.
/// An empty set means the file applies everywhere.
pub fn applies_to<'a>(platforms: impl IntoIterator<Item = &'a String>, platform: &str) -> bool {
    let mut any = false;
    for tag in platforms {
        if matches_platform(tag, platform) {
            return true;
        }
        any = true;
    }
    !any
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launchers_map_to_tags() {
        assert_eq!(Some("linux64"), launcher_platform("Spectra-linux64"));
        assert_eq!(Some("win32"), launcher_platform("Spectra-win32.exe"));
        assert_eq!(
            Some("macos-arm64"),
            launcher_platform("Contents/MacOS/Spectra-macos-arm64")
        );
        assert_eq!(None, launcher_platform("jars/core.jar"));
    }

    #[test]
    fn app_bundle_counts_as_macos_launcher() {
        assert_eq!(
            Some("macosx"),
            launcher_platform("Spectra.app/Contents/MacOS/Spectra-macos")
        );
    }

    #[test]
    fn family_tags_match_concrete_platforms() {
        assert!(matches_platform("linuxx", "linux64"));
        assert!(matches_platform("linuxx", "linux-arm64"));
        assert!(matches_platform("macosx", "macos-arm64"));
        assert!(!matches_platform("winx", "linux64"));
    }

    #[test]
    fn platform_scoped_paths() {
        assert_eq!(Some("win64"), path_platform("jars/win64/native.jar"));
        assert_eq!(Some("linuxx"), path_platform("lib/linuxx/libstub.so"));
        assert_eq!(None, path_platform("jars/core.jar"));
        assert_eq!(None, path_platform("plugins/win64/tool.jar"));
        assert_eq!(None, path_platform("jars/win64"));
    }

    #[test]
    fn empty_platform_set_applies_everywhere() {
        let none: Vec<String> = Vec::new();
        assert!(applies_to(&none, "linux64"));

        let win = vec!["win64".to_string()];
        assert!(!applies_to(&win, "linux64"));
        assert!(applies_to(&win, "win64"));
    }
}

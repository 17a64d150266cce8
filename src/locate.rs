//! Source locator: maps (host OS, browser) to the on-disk history artifact.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::config::{Browser, BrowserSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    MacOs,
    Linux,
}

impl HostOs {
    pub fn current() -> HostOs {
        if cfg!(windows) {
            HostOs::Windows
        } else if cfg!(target_os = "macos") {
            HostOs::MacOs
        } else {
            HostOs::Linux
        }
    }
}

/// Find the browser's history artifact, expanding path templates against the
/// user's home directory. `None` is the normal "not found" outcome; the
/// caller prompts for a manual path.
pub fn locate(browser: Browser, spec: &BrowserSpec, os: HostOs, home: &Path) -> Option<PathBuf> {
    // Impossible pairings short-circuit: the ESE family is Windows-only and
    // the Safari family is macOS-only.
    if browser == Browser::Ie11 && os != HostOs::Windows {
        return None;
    }
    if browser == Browser::Safari && os != HostOs::MacOs {
        return None;
    }

    let templates = match os {
        HostOs::Windows => &spec.paths.windows,
        HostOs::MacOs => &spec.paths.macos,
        HostOs::Linux => &spec.paths.linux,
    };

    for template in templates {
        let dir = PathBuf::from(template.replace("{home}", &home.to_string_lossy()));
        if !dir.is_dir() {
            continue;
        }
        if let Some(pattern) = spec.profile_pattern.as_deref() {
            if let Some(path) = scan_profiles(&dir, pattern, &spec.file_names) {
                return Some(path);
            }
        } else {
            for file_name in &spec.file_names {
                let path = dir.join(file_name);
                if path.is_file() {
                    return Some(path);
                }
            }
        }
    }
    debug!("no history artifact found for {}", browser.label());
    None
}

/// Scan a profiles directory for a subdirectory matching the default-profile
/// pattern and containing one of the artifact file names.
fn scan_profiles(dir: &Path, pattern: &str, file_names: &[String]) -> Option<PathBuf> {
    let pattern = Regex::new(pattern).ok()?;
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !pattern.is_match(&name.to_string_lossy()) {
            continue;
        }
        for file_name in file_names {
            let path = entry.path().join(file_name);
            if path.is_file() {
                return Some(path);
            }
        }
    }
    None
}

/// Convenience wrapper against the real host environment.
pub fn locate_on_host(browser: Browser, spec: &BrowserSpec) -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    locate(browser, spec, HostOs::current(), &home)
}

/// Human-readable host OS description for export rows. Darwin kernel
/// releases are mapped to their marketing names where known.
pub fn os_description() -> String {
    let os = std::env::consts::OS;
    if os == "macos" {
        return macos_name(darwin_major().unwrap_or(0));
    }
    format!("{} {}", os, std::env::consts::ARCH)
}

fn darwin_major() -> Option<u32> {
    let output = std::process::Command::new("uname").arg("-r").output().ok()?;
    let release = String::from_utf8_lossy(&output.stdout);
    release.trim().split('.').next()?.parse().ok()
}

fn macos_name(major: u32) -> String {
    let name = match major {
        10 => "Mac OS X Snow Leopard",
        11 => "Mac OS X Lion",
        12 => "OS X Mountain Lion",
        13 => "OS X Mavericks",
        14 => "OS X Yosemite",
        15 => "OS X El Capitan",
        16 => "macOS Sierra",
        17 => "macOS High Sierra",
        _ => return format!("macOS (Darwin {major})"),
    };
    name.to_string()
}

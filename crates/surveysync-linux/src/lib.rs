//! Linux-specific implementation for surveysync
//!
//! This crate reads the kernel's view of network interfaces from sysfs and
//! turns it into the native online/offline signal used by the connectivity
//! monitor.

#![cfg(target_os = "linux")]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::fs;
use std::path::Path;

/// Where the kernel exposes network interfaces.
pub const SYSFS_NET: &str = "/sys/class/net";

/// Operational state of a single interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// Interface name, e.g. `wlan0`.
    pub name: String,
    /// Contents of `operstate` (`up`, `down`, `dormant`, `unknown`, ...).
    pub operstate: String,
    /// Contents of `carrier`, when readable.
    pub carrier: Option<bool>,
}

impl Interface {
    /// Whether this interface can carry traffic to the outside world.
    ///
    /// Loopback never counts. Some virtual and tunnel devices report
    /// `unknown` even when usable, so those count as up when a carrier is
    /// present.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        if self.name == "lo" {
            return false;
        }
        match self.operstate.as_str() {
            "up" => true,
            "unknown" => self.carrier == Some(true),
            _ => false,
        }
    }
}

/// List the interfaces found under the given sysfs directory.
///
/// Unreadable entries are skipped rather than reported.
#[must_use]
pub fn interfaces_in(root: &Path) -> Vec<Interface> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };

    let mut found: Vec<Interface> = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let dir = entry.path();
            let operstate = fs::read_to_string(dir.join("operstate")).ok()?;
            let carrier = fs::read_to_string(dir.join("carrier"))
                .ok()
                .map(|raw| raw.trim() == "1");
            Some(Interface {
                name,
                operstate: operstate.trim().to_string(),
                carrier,
            })
        })
        .collect();

    found.sort_by(|a, b| a.name.cmp(&b.name));
    found
}

/// List the interfaces currently known to the kernel.
#[must_use]
pub fn interfaces() -> Vec<Interface> {
    interfaces_in(Path::new(SYSFS_NET))
}

/// Whether any non-loopback interface under `root` is up.
#[must_use]
pub fn link_is_up_in(root: &Path) -> bool {
    interfaces_in(root).iter().any(Interface::is_usable)
}

/// Whether any non-loopback interface is up.
///
/// This is the platform's native signal; it says nothing about whether the
/// submission endpoint is actually reachable.
#[must_use]
pub fn link_is_up() -> bool {
    link_is_up_in(Path::new(SYSFS_NET))
}

/// Get platform name
#[must_use]
pub fn platform_name() -> &'static str {
    "Linux"
}

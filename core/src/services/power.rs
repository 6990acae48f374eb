use std::{
    fs,
    path::{Path, PathBuf},
};

/// Source of the device power state consulted before background work runs.
pub trait DeviceState: Send + Sync {
    fn is_charging(&self) -> bool;
}

/// Used when the charging constraint is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysCharging;

impl DeviceState for AlwaysCharging {
    fn is_charging(&self) -> bool {
        true
    }
}

/// Reads the Linux `power_supply` class.
#[derive(Debug, Clone)]
pub struct SysfsPowerSupply {
    root: PathBuf,
}

impl SysfsPowerSupply {
    pub fn new() -> Self {
        Self::with_root("/sys/class/power_supply")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsPowerSupply {
    fn default() -> Self {
        Self::new()
    }
}

fn read_attr(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name))
        .ok()
        .map(|s| s.trim().to_string())
}

impl DeviceState for SysfsPowerSupply {
    /// A machine without any power supply entries (desktop, VM) is treated as
    /// running on mains power.
    fn is_charging(&self) -> bool {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return true,
        };
        let mut saw_supply = false;
        for entry in entries.flatten() {
            saw_supply = true;
            let dir = entry.path();
            match read_attr(&dir, "type").as_deref() {
                Some("Mains") | Some("USB") => {
                    if read_attr(&dir, "online").as_deref() == Some("1") {
                        return true;
                    }
                }
                Some("Battery") => {
                    if matches!(read_attr(&dir, "status").as_deref(), Some("Charging") | Some("Full")) {
                        return true;
                    }
                }
                _ => {}
            }
        }
        !saw_supply
    }
}

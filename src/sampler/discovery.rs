use glob::glob;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Find the event device whose sysfs name contains `name_hint`.
///
/// Scans `<sysfs_root>/class/input/event*/device/name` in sorted order and
/// maps the first match to `/dev/input/eventN`.
pub fn find_device(sysfs_root: &Path, name_hint: &str) -> Option<PathBuf> {
    let pattern = format!("{}/class/input/event*/device/name", sysfs_root.display());
    let Ok(entries) = glob(&pattern) else {
        debug!("Invalid discovery pattern {}", pattern);
        return None;
    };

    for name_file in entries.flatten() {
        let Ok(name) = fs::read_to_string(&name_file) else {
            continue;
        };
        if !name.contains(name_hint) {
            continue;
        }

        let Some(event) = name_file
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
        else {
            continue;
        };

        let device = Path::new("/dev/input").join(event);
        info!("Found \"{}\" at {}", name.trim(), device.display());
        return Some(device);
    }

    debug!("No input device name contains \"{}\"", name_hint);
    None
}

//! Path utilities.

use std::path::{Component, Path, PathBuf};

/// Get the amaya configuration directory.
///
/// Prefers `~/.config/amaya` on Unix when it exists, otherwise the
/// platform configuration directory.
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(unix)]
    {
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("amaya");
            if xdg.exists() {
                return Some(xdg);
            }
        }
    }
    dirs::config_dir().map(|p| p.join("amaya"))
}

/// Get the amaya data directory (conversations, reminders, logs).
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("amaya"))
}

/// Normalize a path by removing `.` and `..` components.
///
/// Unlike `canonicalize`, this doesn't require the path to exist and
/// doesn't follow symlinks. `..` never climbs above the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            _ => result.push(component),
        }
    }

    result
}

/// Symlink hops followed before giving up, matching the usual `ELOOP` limit.
const MAX_LINK_HOPS: usize = 40;

/// Resolve a path to an absolute, symlink-resolved form.
///
/// Relative paths are joined onto `base`. When the path doesn't exist yet,
/// the deepest existing ancestor is canonicalized and the rest appended,
/// so a symlinked parent directory is still followed. A dangling symlink
/// resolves to where it points, since writing through it lands there.
pub fn resolve(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    resolve_links(normalize(&joined), 0)
}

fn resolve_links(normalized: PathBuf, hops: usize) -> PathBuf {
    if let Ok(canonical) = normalized.canonicalize() {
        return canonical;
    }

    // `symlink_metadata` sees dangling links, which `exists` reports as missing.
    let mut existing = normalized.clone();
    let mut rest = Vec::new();
    while existing.symlink_metadata().is_err() {
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                rest.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return normalized,
        }
    }

    let is_link = existing
        .symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    if is_link && hops < MAX_LINK_HOPS {
        if let (Ok(target), Some(parent)) = (std::fs::read_link(&existing), existing.parent()) {
            let parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
            let mut next = normalize(&parent.join(target));
            for name in rest.into_iter().rev() {
                next.push(name);
            }
            return resolve_links(normalize(&next), hops + 1);
        }
    }

    let mut resolved = existing.canonicalize().unwrap_or(existing);
    for name in rest.into_iter().rev() {
        resolved.push(name);
    }
    resolved
}

/// Make a path relative to a base directory.
///
/// Returns `None` if the path is not within the base directory.
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    path.strip_prefix(base).ok().map(|p| p.to_path_buf())
}

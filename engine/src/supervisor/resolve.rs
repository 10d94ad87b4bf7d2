//! Mapping caller paths onto the sandbox.
//!
//! Callers address files relative to their current view, but often pass paths
//! written relative to the sandbox root instead. Creation kinds always anchor
//! to the view; everything else prefers whichever of `{view, root}` already
//! holds the target.

use std::path::{Path, PathBuf};

use crate::core::action::ActionKind;

/// Unvalidated absolute candidate for `raw`.
pub(super) fn candidate(root: &Path, view: &Path, raw: &str, kind: ActionKind) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let in_view = view.join(path);
    if kind.creates_new_path() || in_view.exists() {
        return in_view;
    }
    let in_root = root.join(path);
    if in_root.exists() { in_root } else { in_view }
}

/// Like [`candidate`], but only existing directories count as a hit.
pub(super) fn directory_candidate(root: &Path, view: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let in_view = view.join(path);
    if in_view.is_dir() {
        return in_view;
    }
    let in_root = root.join(path);
    if in_root.is_dir() { in_root } else { in_view }
}

/// `<view>/<view name>/rest` -> `<view>/rest`, when the view is strictly
/// inside the root. Only this exact repetition is collapsed.
pub(super) fn collapse_doubled_segment(root: &Path, view: &Path, resolved: &Path) -> Option<PathBuf> {
    if view == root || !view.starts_with(root) {
        return None;
    }
    let name = view.file_name()?;
    let rest = resolved.strip_prefix(view.join(name)).ok()?;
    Some(view.join(rest))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn creation_anchors_to_view() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let view = root.join("demo");
        fs::create_dir_all(&view).expect("mkdir");
        fs::write(root.join("notes.txt"), "x").expect("write");
        let path = candidate(root, &view, "notes.txt", ActionKind::CreateFile);
        assert_eq!(path, view.join("notes.txt"));
    }

    #[test]
    fn existing_target_under_root_wins_over_missing_view_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let view = root.join("demo");
        fs::create_dir_all(&view).expect("mkdir");
        fs::write(root.join("notes.txt"), "x").expect("write");
        assert_eq!(candidate(root, &view, "notes.txt", ActionKind::ReadFile), root.join("notes.txt"));
        assert_eq!(candidate(root, &view, "missing.txt", ActionKind::ReadFile), view.join("missing.txt"));
    }

    #[test]
    fn view_wins_when_both_exist() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let view = root.join("demo");
        fs::create_dir_all(&view).expect("mkdir");
        fs::write(root.join("a.txt"), "root").expect("write");
        fs::write(view.join("a.txt"), "view").expect("write");
        assert_eq!(candidate(root, &view, "a.txt", ActionKind::EditFile), view.join("a.txt"));
    }

    #[test]
    fn doubled_view_segment_collapses() {
        let root = Path::new("/ws");
        let view = Path::new("/ws/demo");
        assert_eq!(
            collapse_doubled_segment(root, view, Path::new("/ws/demo/demo/app.py")),
            Some(PathBuf::from("/ws/demo/app.py"))
        );
        assert_eq!(collapse_doubled_segment(root, view, Path::new("/ws/demo/app.py")), None);
        assert_eq!(collapse_doubled_segment(root, view, Path::new("/ws/demo/demos/app.py")), None);
    }

    #[test]
    fn no_collapse_when_view_is_root() {
        let root = Path::new("/ws");
        assert_eq!(collapse_doubled_segment(root, root, Path::new("/ws/ws/app.py")), None);
    }
}

//! Path resolution and manipulation utilities.
//!
//! Paths are `/`-separated. Empty segments are dropped, so repeated and
//! leading separators make no difference: resolution always starts at the
//! node id the caller hands in.

use crate::config::*;
use crate::DirItem;

/// Splits a path into its non-empty segments.
pub fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Joins segments back into an absolute path, `/` for no segments.
pub fn join<S: AsRef<str>>(parts: &[S]) -> String {
    if parts.is_empty() {
        return ROOT_NAME.to_string();
    }
    parts.iter().fold(String::new(), |mut path, part| {
        path.push('/');
        path.push_str(part.as_ref());
        path
    })
}

/// Walks `parts` from the directory `start`.
/// `.` stays, `..` goes to the parent (and stays at the root),
/// anything else has to name a directory among the current node's children.
fn walk(root: &DirItem, start: i32, parts: &[&str]) -> Option<i32> {
    let mut current = root.find_by_id(start)?;
    for &part in parts {
        match part {
            DOT_NAME => {}
            DOTDOT_NAME => {
                if !current.is_root() {
                    current = root.find_by_id(current.parent_id)?;
                }
            }
            name => current = current.child_dir(name)?,
        }
    }
    Some(current.id)
}

/// Resolves `path` to the id of a directory, starting from `start`.
/// An empty path and `/` always mean the root.
pub fn resolve(root: &DirItem, start: i32, path: &str) -> Option<i32> {
    let parts = split(path);
    if parts.is_empty() {
        return Some(root.id);
    }
    walk(root, start, &parts)
}

/// Splits `path` into the directory holding its last segment and that segment.
/// The last segment is returned as written and does not have to exist,
/// it is empty when the path has no segments at all.
pub fn parent_and_leaf<'p>(root: &DirItem, start: i32, path: &'p str) -> Option<(i32, &'p str)> {
    let parts = split(path);
    match parts.split_last() {
        None => Some((start, "")),
        Some((leaf, dirs)) => Some((walk(root, start, dirs)?, *leaf)),
    }
}

/// Absolute path of the node `id`, rebuilt by following parent ids up to the root.
pub fn absolute_path(root: &DirItem, id: i32) -> Option<String> {
    let mut parts = Vec::new();
    let mut current = root.find_by_id(id)?;
    while !current.is_root() {
        parts.push(current.name());
        current = root.find_by_id(current.parent_id)?;
    }
    parts.reverse();
    Some(join(&parts))
}

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

lazy_static! {
    static ref VIDEO_PATTERN: Regex = Regex::new(r"(?i)\.(mp4|mov|webm|avi|mkv)$").unwrap();
}

// Walk policy: symlinked directories are never descended, which rules out
// cycles. Symlinked files are listed. Unreadable subdirectories are skipped.

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    Dir {
        name: String,
        path: String,
        children: Vec<TreeNode>,
    },
    File {
        name: String,
        path: String,
    },
}

pub fn is_video(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| VIDEO_PATTERN.is_match(n))
}

/// Recursively lists the playable videos under `dir`, sorted.
///
/// Only a failure to read `dir` itself is an error, an empty result means
/// there is nothing to play.
pub fn list_videos(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut videos = Vec::new();
    for entry in sorted_entries(dir)? {
        collect_videos(entry, &mut videos);
    }
    Ok(videos)
}

fn collect_videos(entry: Entry, videos: &mut Vec<PathBuf>) {
    match entry.kind {
        Kind::Dir => match sorted_entries(&entry.path) {
            Ok(children) => {
                for child in children {
                    collect_videos(child, videos);
                }
            }
            Err(e) => warn!("Skipping unreadable directory {}: {}", entry.path.display(), e),
        },
        Kind::File if is_video(&entry.path) => videos.push(entry.path),
        Kind::File | Kind::Other => {}
    }
}

/// Directory and video listing of `root`, paths relative to `root`.
pub fn tree(root: &Path) -> io::Result<Vec<TreeNode>> {
    build_tree(root, root)
}

fn build_tree(root: &Path, dir: &Path) -> io::Result<Vec<TreeNode>> {
    let mut nodes = Vec::new();
    for entry in sorted_entries(dir)? {
        let Some(path) = relative_key(root, &entry.path) else {
            continue;
        };
        match entry.kind {
            Kind::Dir => {
                let children = build_tree(root, &entry.path).unwrap_or_else(|e| {
                    warn!("Skipping unreadable directory {}: {}", entry.path.display(), e);
                    Vec::new()
                });
                nodes.push(TreeNode::Dir {
                    name: entry.name,
                    path,
                    children,
                });
            }
            Kind::File if is_video(&entry.path) => nodes.push(TreeNode::File {
                name: entry.name,
                path,
            }),
            Kind::File | Kind::Other => {}
        }
    }
    Ok(nodes)
}

/// `/`-separated form of `path` relative to `root`, the key clients use.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Joins a client supplied relative path onto `root`.
///
/// Returns `None` for empty, absolute or escaping paths. A path made only of
/// `.` components is the root itself.
pub fn resolve_relative(root: &Path, rel: &str) -> Option<PathBuf> {
    let rel = Path::new(rel);
    let mut resolved = root.to_path_buf();
    let mut seen = 0;
    for component in rel.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
        seen += 1;
    }
    (seen > 0).then_some(resolved)
}

enum Kind {
    Dir,
    File,
    Other,
}

struct Entry {
    name: String,
    path: PathBuf,
    kind: Kind,
}

fn sorted_entries(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!("Skipping non UTF-8 name {}", path.display());
            continue;
        };
        let kind = match entry.file_type() {
            Ok(t) if t.is_dir() => Kind::Dir,
            Ok(t) if t.is_file() => Kind::File,
            // Follow the link only to see if it points at a file.
            Ok(t) if t.is_symlink() => match fs::metadata(&path) {
                Ok(m) if m.is_file() => Kind::File,
                _ => Kind::Other,
            },
            Ok(_) => Kind::Other,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        entries.push(Entry { name, path, kind });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

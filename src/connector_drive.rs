//! Google Drive folder walker.
//!
//! Resolves a folder id from a share URL and enumerates every file reachable
//! from it, following sub-folders down to a configurable depth.
//!
//! # Traversal
//!
//! An explicit stack of `(folder_id, depth)` replaces recursion. The root
//! folder is depth 0; a folder deeper than `max_depth` is never listed, so a
//! long chain of nested (or shared, cyclic) folders is cut off rather than
//! followed forever. Cycles are not detected, only bounded.
//!
//! Each folder's listing is paged to completion before its files are
//! emitted. Sub-folders are then visited in listing order, giving a
//! pre-order, deterministic result for a given remote state.
//!
//! # URL format
//!
//! ```text
//! https://drive.google.com/drive/folders/<FOLDER_ID>?usp=sharing
//! https://drive.google.com/drive/u/0/folders/<FOLDER_ID>
//! ```

use tracing::{debug, info};

use crate::config::DriveConfig;
use crate::drive_client::DriveApi;
use crate::error::{DriveError, Error, Result};
use crate::models::RemoteFile;

const FOLDER_SEGMENT: &str = "/folders/";

/// Traversal limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    pub page_size: u32,
    pub max_depth: usize,
}

impl WalkOptions {
    pub fn from_config(config: &DriveConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_depth: config.max_depth,
        }
    }
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            page_size: 40,
            max_depth: 10,
        }
    }
}

/// Extract the folder id following `/folders/`, dropping any query string
/// and trailing path.
pub fn folder_id_from_url(url: &str) -> Result<String> {
    let start = url
        .find(FOLDER_SEGMENT)
        .ok_or_else(|| Error::MalformedUrl(url.to_string()))?;
    let rest = &url[start + FOLDER_SEGMENT.len()..];
    let id = rest
        .split(['?', '#', '/'])
        .next()
        .unwrap_or_default()
        .trim();
    if id.is_empty() {
        return Err(Error::MalformedUrl(url.to_string()));
    }
    Ok(id.to_string())
}

/// List every non-folder item reachable from `root_id` within the depth
/// bound. Listing failures abort the walk.
pub async fn list_files(
    api: &dyn DriveApi,
    root_id: &str,
    opts: &WalkOptions,
) -> std::result::Result<Vec<RemoteFile>, DriveError> {
    let mut files = Vec::new();
    let mut stack: Vec<(String, usize)> = vec![(root_id.to_string(), 0)];

    while let Some((folder_id, depth)) = stack.pop() {
        if depth > opts.max_depth {
            debug!(folder_id = %folder_id, depth, "max depth reached, skipping folder");
            continue;
        }

        let children = list_all_children(api, &folder_id, opts.page_size).await?;
        if children.is_empty() {
            debug!(folder_id = %folder_id, "no files found");
            continue;
        }

        let mut subfolders = Vec::new();
        for item in children {
            if item.is_folder() {
                subfolders.push(item.id);
            } else {
                files.push(item);
            }
        }
        // reversed so the first listed sub-folder is visited first
        stack.extend(subfolders.into_iter().rev().map(|id| (id, depth + 1)));
    }

    info!(root_id, files = files.len(), "folder walk complete");
    Ok(files)
}

async fn list_all_children(
    api: &dyn DriveApi,
    folder_id: &str,
    page_size: u32,
) -> std::result::Result<Vec<RemoteFile>, DriveError> {
    let mut items = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = api
            .list_children(folder_id, page_size, token.as_deref())
            .await?;
        items.extend(page.files);
        match page.next_page_token {
            Some(next) if !next.is_empty() && token.as_deref() != Some(next.as_str()) => {
                token = Some(next)
            }
            _ => break,
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive_memory::MemoryDrive;
    use std::collections::HashSet;

    #[test]
    fn folder_id_from_share_url() {
        let id = folder_id_from_url(
            "https://drive.google.com/drive/folders/1AbC-xyz_9?usp=sharing",
        )
        .unwrap();
        assert_eq!(id, "1AbC-xyz_9");
    }

    #[test]
    fn folder_id_without_query() {
        assert_eq!(
            folder_id_from_url("https://drive.google.com/drive/u/0/folders/XYZ").unwrap(),
            "XYZ"
        );
        assert_eq!(
            folder_id_from_url("https://drive.google.com/drive/folders/XYZ/").unwrap(),
            "XYZ"
        );
    }

    #[test]
    fn url_without_folder_segment_is_malformed() {
        let err = folder_id_from_url("https://drive.google.com/file/d/abc/view").unwrap_err();
        assert!(matches!(err, Error::MalformedUrl(_)));
        assert!(matches!(
            folder_id_from_url("https://drive.google.com/drive/folders/?x=1").unwrap_err(),
            Error::MalformedUrl(_)
        ));
    }

    /// root -> chain of `levels` nested folders, one file per folder.
    fn chain(levels: usize) -> MemoryDrive {
        let drive = MemoryDrive::new();
        let mut parent = "root".to_string();
        drive.add_file("root", "file-0", "0.txt", "text/plain", "0");
        for level in 1..=levels {
            let folder = format!("dir-{}", level);
            drive.add_folder(&parent, &folder, &folder);
            drive.add_file(&folder, &format!("file-{}", level), &format!("{}.txt", level), "text/plain", "x");
            parent = folder;
        }
        drive
    }

    #[tokio::test]
    async fn returns_every_leaf_once_and_no_folders() {
        let drive = MemoryDrive::new();
        drive
            .add_file("root", "a", "a.txt", "text/plain", "a")
            .add_folder("root", "sub1", "sub1")
            .add_folder("root", "sub2", "sub2")
            .add_file("sub1", "b", "b.txt", "text/plain", "b")
            .add_folder("sub1", "deep", "deep")
            .add_file("deep", "c", "c.pdf", "application/pdf", "c")
            .add_file("sub2", "d", "d.txt", "text/plain", "d");

        let files = list_files(&drive, "root", &WalkOptions::default()).await.unwrap();
        let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(files.iter().all(|f| !f.is_folder()));
    }

    #[tokio::test]
    async fn depth_ten_is_fully_walked() {
        let drive = chain(10);
        let files = list_files(&drive, "root", &WalkOptions::default()).await.unwrap();
        let ids: HashSet<String> = files.into_iter().map(|f| f.id).collect();
        assert_eq!(ids.len(), 11);
        assert!(ids.contains("file-10"));
    }

    #[tokio::test]
    async fn files_beyond_max_depth_are_excluded() {
        let drive = chain(14);
        let files = list_files(&drive, "root", &WalkOptions::default()).await.unwrap();
        let ids: HashSet<String> = files.into_iter().map(|f| f.id).collect();
        assert_eq!(ids.len(), 11);
        assert!(!ids.contains("file-11"));
    }

    #[tokio::test]
    async fn self_referencing_folder_terminates() {
        let drive = MemoryDrive::new();
        drive
            .add_file("loop", "f", "f.txt", "text/plain", "f")
            .add_folder("loop", "loop", "loop");

        let files = list_files(&drive, "loop", &WalkOptions { page_size: 40, max_depth: 3 })
            .await
            .unwrap();
        // one copy per visited level (0..=3); bounded, not infinite
        assert_eq!(files.len(), 4);
    }

    #[tokio::test]
    async fn follows_every_listing_page() {
        let drive = MemoryDrive::new();
        for i in 0..95 {
            drive.add_file("root", &format!("f{}", i), &format!("{}.txt", i), "text/plain", "x");
        }
        let files = list_files(&drive, "root", &WalkOptions::default()).await.unwrap();
        assert_eq!(files.len(), 95);
        assert_eq!(drive.listing_count(), 3);
    }

    #[tokio::test]
    async fn empty_folder_contributes_nothing() {
        let drive = MemoryDrive::new();
        drive.add_folder("root", "empty", "empty");
        let files = list_files(&drive, "root", &WalkOptions::default()).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn listing_failure_propagates() {
        let drive = MemoryDrive::new();
        drive.add_folder("root", "locked", "locked").fail_listing("locked");
        let err = list_files(&drive, "root", &WalkOptions::default()).await.unwrap_err();
        assert!(matches!(err, DriveError::Unauthorized { .. }));
    }
}

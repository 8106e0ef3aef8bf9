//! In-memory [`DriveApi`] for tests and offline runs.
//!
//! Holds a folder tree with file contents, pages listings with numeric page
//! tokens, serves ranged downloads, and can be told to fail individual
//! listings or downloads.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::drive_client::{Credentials, DriveApi, DriveProvider, ListPage, MediaChunk, MediaSource};
use crate::error::DriveError;
use crate::models::{RemoteFile, MIME_GOOGLE_FOLDER, MIME_GOOGLE_SHEET};

struct Entry {
    file: RemoteFile,
    content: Vec<u8>,
    rows: Vec<Vec<String>>,
}

#[derive(Default)]
struct Tree {
    children: HashMap<String, Vec<String>>,
    entries: HashMap<String, Entry>,
    failing_listings: HashSet<String>,
    failing_downloads: HashSet<String>,
}

/// In-memory drive.
#[derive(Default)]
pub struct MemoryDrive {
    tree: RwLock<Tree>,
    fetches: AtomicUsize,
    listings: AtomicUsize,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&self, parent: &str, id: &str, name: &str) -> &Self {
        let file = RemoteFile::new(
            id,
            name,
            MIME_GOOGLE_FOLDER,
            Some(format!("https://drive.google.com/drive/folders/{}", id)),
        );
        self.insert(parent, file, Vec::new(), Vec::new())
    }

    pub fn add_file(&self, parent: &str, id: &str, name: &str, mime: &str, content: impl Into<Vec<u8>>) -> &Self {
        let file = RemoteFile::new(
            id,
            name,
            mime,
            Some(format!("https://drive.google.com/file/d/{}/view", id)),
        );
        self.insert(parent, file, content.into(), Vec::new())
    }

    pub fn add_sheet(&self, parent: &str, id: &str, name: &str, rows: Vec<Vec<String>>) -> &Self {
        let file = RemoteFile::new(
            id,
            name,
            MIME_GOOGLE_SHEET,
            Some(format!("https://docs.google.com/spreadsheets/d/{}/edit", id)),
        );
        self.insert(parent, file, Vec::new(), rows)
    }

    /// Make every download of `file_id` fail.
    pub fn fail_downloads(&self, file_id: &str) -> &Self {
        self.write().failing_downloads.insert(file_id.to_string());
        self
    }

    /// Make every listing of `folder_id` fail.
    pub fn fail_listing(&self, folder_id: &str) -> &Self {
        self.write().failing_listings.insert(folder_id.to_string());
        self
    }

    /// Number of ranged fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of listing pages served so far.
    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    fn insert(&self, parent: &str, file: RemoteFile, content: Vec<u8>, rows: Vec<Vec<String>>) -> &Self {
        let mut tree = self.write();
        tree.children
            .entry(parent.to_string())
            .or_default()
            .push(file.id.clone());
        tree.entries.insert(file.id.clone(), Entry { file, content, rows });
        drop(tree);
        self
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn not_found(id: &str) -> DriveError {
    DriveError::Status {
        status: 404,
        message: format!("File not found: {}", id),
    }
}

#[async_trait]
impl DriveApi for MemoryDrive {
    async fn list_children(
        &self,
        folder_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListPage, DriveError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        let tree = self.read();
        if tree.failing_listings.contains(folder_id) {
            return Err(DriveError::Unauthorized { status: 403 });
        }

        let ids = tree.children.get(folder_id).map(Vec::as_slice).unwrap_or(&[]);
        let start: usize = match page_token {
            Some(t) => t
                .parse()
                .map_err(|_| DriveError::Decode(format!("bad page token {:?}", t)))?,
            None => 0,
        };
        let end = (start + page_size.max(1) as usize).min(ids.len());
        let files = ids
            .get(start..end)
            .unwrap_or(&[])
            .iter()
            .filter_map(|id| tree.entries.get(id).map(|e| e.file.clone()))
            .collect();

        Ok(ListPage {
            files,
            next_page_token: (end < ids.len()).then(|| end.to_string()),
        })
    }

    async fn fetch_chunk(
        &self,
        source: &MediaSource,
        offset: u64,
        len: u64,
    ) -> Result<MediaChunk, DriveError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let tree = self.read();
        let id = source.file_id();
        if tree.failing_downloads.contains(id) {
            return Err(DriveError::Status {
                status: 500,
                message: "backend error".to_string(),
            });
        }
        let entry = tree.entries.get(id).ok_or_else(|| not_found(id))?;

        let total = entry.content.len() as u64;
        let start = offset.min(total) as usize;
        let end = offset.saturating_add(len).min(total) as usize;
        Ok(MediaChunk {
            data: entry.content[start..end].to_vec(),
            total_size: Some(total),
            partial: true,
        })
    }

    async fn sheet_values(
        &self,
        spreadsheet_id: &str,
        _range: &str,
    ) -> Result<Vec<Vec<String>>, DriveError> {
        let tree = self.read();
        if tree.failing_downloads.contains(spreadsheet_id) {
            return Err(DriveError::Status {
                status: 500,
                message: "backend error".to_string(),
            });
        }
        tree.entries
            .get(spreadsheet_id)
            .map(|e| e.rows.clone())
            .ok_or_else(|| not_found(spreadsheet_id))
    }
}

/// Hands out one shared [`MemoryDrive`] regardless of credentials, unless the
/// access token is listed as revoked.
pub struct MemoryDriveProvider {
    drive: Arc<MemoryDrive>,
    revoked: HashSet<String>,
}

impl MemoryDriveProvider {
    pub fn new(drive: Arc<MemoryDrive>) -> Self {
        Self {
            drive,
            revoked: HashSet::new(),
        }
    }

    pub fn revoke(mut self, access_token: &str) -> Self {
        self.revoked.insert(access_token.to_string());
        self
    }
}

impl DriveProvider for MemoryDriveProvider {
    fn open(&self, credentials: &Credentials) -> Result<Arc<dyn DriveApi>, DriveError> {
        if self.revoked.contains(&credentials.access_token) {
            return Err(DriveError::Unauthorized { status: 401 });
        }
        Ok(self.drive.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listing_pages_through_children() {
        let drive = MemoryDrive::new();
        for i in 0..5 {
            drive.add_file("root", &format!("f{}", i), &format!("{}.txt", i), "text/plain", "x");
        }

        let first = drive.list_children("root", 2, None).await.unwrap();
        assert_eq!(first.files.len(), 2);
        assert_eq!(first.next_page_token.as_deref(), Some("2"));

        let last = drive.list_children("root", 2, Some("4")).await.unwrap();
        assert_eq!(last.files.len(), 1);
        assert!(last.next_page_token.is_none());
    }

    #[tokio::test]
    async fn unknown_folder_lists_empty() {
        let drive = MemoryDrive::new();
        let page = drive.list_children("nope", 10, None).await.unwrap();
        assert!(page.files.is_empty());
    }

    #[tokio::test]
    async fn ranged_fetch_respects_bounds() {
        let drive = MemoryDrive::new();
        drive.add_file("root", "f", "f.txt", "text/plain", "abcdef");
        let src = MediaSource::Raw {
            file_id: "f".to_string(),
        };

        let chunk = drive.fetch_chunk(&src, 4, 10).await.unwrap();
        assert_eq!(chunk.data, b"ef");
        assert_eq!(chunk.total_size, Some(6));

        let past_end = drive.fetch_chunk(&src, 10, 10).await.unwrap();
        assert!(past_end.data.is_empty());
    }

    #[test]
    fn revoked_token_is_rejected() {
        let provider = MemoryDriveProvider::new(Arc::new(MemoryDrive::new())).revoke("bad");
        assert!(provider.open(&Credentials::new("bad", None)).is_err());
        assert!(provider.open(&Credentials::new("good", None)).is_ok());
    }
}

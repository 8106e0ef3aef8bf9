//! Data types flowing through ingestion.
//!
//! Document-level types live in `drivechat-core` and are re-exported here;
//! [`RemoteFile`] is the provider-facing listing item.

pub use drivechat_core::models::{
    Chunk, ContentKind, Document, DocumentCollection, DocumentOrigin, MIME_GOOGLE_DOC,
    MIME_GOOGLE_FOLDER, MIME_GOOGLE_SHEET, MIME_PDF, MIME_PLAIN_TEXT, MIME_XLSX,
};

use serde::Deserialize;

/// Substring of a view link that marks the item as a folder.
pub const FOLDER_LINK_MARKER: &str = "folder";

/// One item of a remote folder listing.
///
/// Produced by a listing call and consumed by extraction; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawDriveFile")]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub kind: ContentKind,
    pub web_view_link: Option<String>,
}

impl RemoteFile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        web_view_link: Option<String>,
    ) -> Self {
        let mime_type = mime_type.into();
        Self {
            id: id.into(),
            name: name.into(),
            kind: ContentKind::from_mime(&mime_type),
            mime_type,
            web_view_link,
        }
    }

    /// Folder classification follows the view link; items without one fall
    /// back to the declared MIME type.
    pub fn is_folder(&self) -> bool {
        match &self.web_view_link {
            Some(link) => link.contains(FOLDER_LINK_MARKER),
            None => self.kind == ContentKind::Folder,
        }
    }

    pub fn origin(&self) -> DocumentOrigin {
        DocumentOrigin {
            file_id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
        }
    }
}

/// Wire shape of a Drive v3 `files` entry.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    web_view_link: Option<String>,
}

impl From<RawDriveFile> for RemoteFile {
    fn from(raw: RawDriveFile) -> Self {
        RemoteFile::new(raw.id, raw.name, raw.mime_type, raw.web_view_link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_drive_listing_entry() {
        let file: RemoteFile = serde_json::from_str(
            r#"{"id":"abc","name":"notes.txt","mimeType":"text/plain",
                "webViewLink":"https://drive.google.com/file/d/abc/view"}"#,
        )
        .unwrap();
        assert_eq!(file.kind, ContentKind::PlainText);
        assert!(!file.is_folder());
    }

    #[test]
    fn folder_is_classified_by_view_link() {
        let folder = RemoteFile::new(
            "f1",
            "Reports",
            "application/vnd.google-apps.folder",
            Some("https://drive.google.com/drive/folders/f1".to_string()),
        );
        assert!(folder.is_folder());

        // link wins over MIME type
        let odd = RemoteFile::new(
            "f2",
            "x",
            "application/vnd.google-apps.folder",
            Some("https://drive.google.com/file/d/f2/view".to_string()),
        );
        assert!(!odd.is_folder());
    }

    #[test]
    fn missing_link_falls_back_to_mime() {
        let folder = RemoteFile::new("f1", "x", "application/vnd.google-apps.folder", None);
        assert!(folder.is_folder());
        let file = RemoteFile::new("f2", "x", "application/pdf", None);
        assert!(!file.is_folder());
    }
}

//! Core data models for the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// MIME type of a native Google document.
pub const MIME_GOOGLE_DOC: &str = "application/vnd.google-apps.document";
/// MIME type of a native Google spreadsheet.
pub const MIME_GOOGLE_SHEET: &str = "application/vnd.google-apps.spreadsheet";
/// MIME type of a Drive folder.
pub const MIME_GOOGLE_FOLDER: &str = "application/vnd.google-apps.folder";
pub const MIME_PLAIN_TEXT: &str = "text/plain";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Content-type tag of a remote file, derived from its declared MIME type.
///
/// The set is closed: anything the extractor has no decoder for maps to
/// [`ContentKind::Other`] and yields empty text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    PlainText,
    RichDocument,
    Pdf,
    SpreadsheetNative,
    SpreadsheetInterop,
    Folder,
    Other,
}

impl ContentKind {
    pub fn from_mime(mime: &str) -> Self {
        match mime {
            MIME_GOOGLE_DOC => ContentKind::RichDocument,
            MIME_PLAIN_TEXT => ContentKind::PlainText,
            MIME_PDF => ContentKind::Pdf,
            MIME_GOOGLE_SHEET => ContentKind::SpreadsheetNative,
            MIME_XLSX => ContentKind::SpreadsheetInterop,
            MIME_GOOGLE_FOLDER => ContentKind::Folder,
            _ => ContentKind::Other,
        }
    }

    /// Whether the extractor has a decoder for this kind.
    pub fn is_supported(self) -> bool {
        !matches!(self, ContentKind::Folder | ContentKind::Other)
    }
}

/// Where a [`Document`] came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOrigin {
    pub file_id: String,
    pub name: String,
    pub kind: ContentKind,
}

/// Plain text extracted from one remote file.
///
/// Empty text is valid; the index builder skips it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    pub origin: DocumentOrigin,
}

impl Document {
    pub fn new(text: impl Into<String>, origin: DocumentOrigin) -> Self {
        Self {
            text: text.into(),
            origin,
        }
    }
}

/// Documents in traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentCollection {
    docs: Vec<Document>,
}

impl DocumentCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, doc: Document) {
        self.docs.push(doc);
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.docs.iter()
    }

    /// Number of documents that carry any non-whitespace text.
    pub fn non_empty_count(&self) -> usize {
        self.docs.iter().filter(|d| !d.text.trim().is_empty()).count()
    }
}

impl FromIterator<Document> for DocumentCollection {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        Self {
            docs: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for DocumentCollection {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.into_iter()
    }
}

impl<'a> IntoIterator for &'a DocumentCollection {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.iter()
    }
}

/// A chunk of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_types_map_to_kinds() {
        assert_eq!(ContentKind::from_mime("text/plain"), ContentKind::PlainText);
        assert_eq!(ContentKind::from_mime(MIME_GOOGLE_DOC), ContentKind::RichDocument);
        assert_eq!(ContentKind::from_mime(MIME_PDF), ContentKind::Pdf);
        assert_eq!(
            ContentKind::from_mime(MIME_GOOGLE_SHEET),
            ContentKind::SpreadsheetNative
        );
        assert_eq!(ContentKind::from_mime(MIME_XLSX), ContentKind::SpreadsheetInterop);
        assert_eq!(ContentKind::from_mime(MIME_GOOGLE_FOLDER), ContentKind::Folder);
        assert_eq!(ContentKind::from_mime("image/png"), ContentKind::Other);
    }

    #[test]
    fn folder_and_other_are_unsupported() {
        assert!(!ContentKind::Folder.is_supported());
        assert!(!ContentKind::Other.is_supported());
        assert!(ContentKind::Pdf.is_supported());
    }

    #[test]
    fn collection_keeps_insertion_order() {
        let origin = |n: &str| DocumentOrigin {
            file_id: n.to_string(),
            name: n.to_string(),
            kind: ContentKind::PlainText,
        };
        let docs: DocumentCollection = vec![
            Document::new("b", origin("2")),
            Document::new("", origin("1")),
            Document::new("a", origin("3")),
        ]
        .into_iter()
        .collect();

        let ids: Vec<&str> = docs.iter().map(|d| d.origin.file_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1", "3"]);
        assert_eq!(docs.non_empty_count(), 2);
    }
}

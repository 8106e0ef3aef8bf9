//! Ingestion pipeline orchestration.
//!
//! Coordinates the full load: folder URL → folder walk → per-file
//! extraction → [`DocumentCollection`]. Per-file failures are absorbed by
//! [`extract_or_empty`](crate::extract::extract_or_empty); anything that
//! stops the walk itself aborts the whole ingestion.

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::info;

use crate::config::DriveConfig;
use crate::connector_drive::{folder_id_from_url, list_files, WalkOptions};
use crate::drive_client::DriveApi;
use crate::error::{Error, Result};
use crate::extract::{extract_or_empty, ExtractOptions, Outcome};
use crate::models::{Document, DocumentCollection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    pub walk: WalkOptions,
    pub extract: ExtractOptions,
    /// Files extracted at once; results keep traversal order.
    pub concurrency: usize,
}

impl IngestOptions {
    pub fn from_config(config: &DriveConfig) -> Self {
        Self {
            walk: WalkOptions::from_config(config),
            extract: ExtractOptions::from_config(config),
            concurrency: config.extract_concurrency,
        }
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            walk: WalkOptions::default(),
            extract: ExtractOptions::default(),
            concurrency: 4,
        }
    }
}

/// Counts from one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub files_found: usize,
    pub documents_with_text: usize,
    pub failed: usize,
    pub unsupported: usize,
}

#[derive(Debug)]
pub struct Ingested {
    pub documents: DocumentCollection,
    pub report: IngestReport,
}

/// Load every reachable file under `folder_url` as a document.
///
/// A malformed URL is returned as-is; listing failures are wrapped in
/// [`Error::Ingestion`].
pub async fn ingest(api: &dyn DriveApi, folder_url: &str, opts: &IngestOptions) -> Result<Ingested> {
    let folder_id = folder_id_from_url(folder_url)?;
    info!(folder_id = %folder_id, "ingesting drive folder");

    let files = list_files(api, &folder_id, &opts.walk)
        .await
        .map_err(Error::ingestion)?;

    let mut report = IngestReport {
        files_found: files.len(),
        ..IngestReport::default()
    };

    let outcomes: Vec<_> = stream::iter(files.into_iter())
        .map(|file| async move {
            let outcome = extract_or_empty(api, &file, &opts.extract).await;
            (file, outcome)
        })
        .buffered(opts.concurrency.max(1))
        .collect()
        .await;

    let mut documents = DocumentCollection::new();
    for (file, outcome) in outcomes {
        match &outcome {
            Outcome::Failed => report.failed += 1,
            Outcome::Unsupported => report.unsupported += 1,
            Outcome::Text(text) if !text.trim().is_empty() => report.documents_with_text += 1,
            Outcome::Text(_) => {}
        }
        documents.push(Document::new(outcome.into_text(), file.origin()));
    }

    info!(
        files = report.files_found,
        with_text = report.documents_with_text,
        failed = report.failed,
        unsupported = report.unsupported,
        "ingestion complete"
    );
    Ok(Ingested { documents, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive_memory::MemoryDrive;
    use crate::error::DriveError;
    use crate::models::{MIME_PDF, MIME_PLAIN_TEXT};

    const URL: &str = "https://drive.google.com/drive/folders/root?usp=sharing";

    #[tokio::test]
    async fn documents_follow_traversal_order() {
        let drive = MemoryDrive::new();
        drive
            .add_file("root", "1", "one.txt", MIME_PLAIN_TEXT, "first")
            .add_folder("root", "sub", "sub")
            .add_file("root", "2", "two.txt", MIME_PLAIN_TEXT, "second")
            .add_file("sub", "3", "three.txt", MIME_PLAIN_TEXT, "third");

        let ingested = ingest(&drive, URL, &IngestOptions { concurrency: 3, ..Default::default() })
            .await
            .unwrap();
        let texts: Vec<&str> = ingested.documents.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(ingested.report.files_found, 3);
        assert_eq!(ingested.report.documents_with_text, 3);
    }

    #[tokio::test]
    async fn failures_and_unsupported_files_become_empty_documents() {
        let drive = MemoryDrive::new();
        drive
            .add_file("root", "p", "bad.pdf", MIME_PDF, "garbage")
            .add_file("root", "i", "img.png", "image/png", vec![1, 2, 3])
            .add_file("root", "t", "a.txt", MIME_PLAIN_TEXT, "hello");

        let ingested = ingest(&drive, URL, &IngestOptions::default()).await.unwrap();
        assert_eq!(ingested.documents.len(), 3);
        assert_eq!(ingested.documents.non_empty_count(), 1);
        assert_eq!(
            ingested.report,
            IngestReport {
                files_found: 3,
                documents_with_text: 1,
                failed: 1,
                unsupported: 1,
            }
        );
    }

    #[tokio::test]
    async fn malformed_url_is_not_wrapped() {
        let drive = MemoryDrive::new();
        let err = ingest(&drive, "https://example.com/nothing", &IngestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedUrl(_)));
        assert_eq!(drive.listing_count(), 0);
    }

    #[tokio::test]
    async fn listing_failure_is_wrapped_in_ingestion_error() {
        let drive = MemoryDrive::new();
        drive.fail_listing("root");
        let err = ingest(&drive, URL, &IngestOptions::default()).await.unwrap_err();
        match err {
            Error::Ingestion { source } => {
                assert!(matches!(*source, Error::RemoteApi(DriveError::Unauthorized { .. })))
            }
            other => panic!("expected ingestion error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ingestion_runs_on_a_spawned_task() {
        let drive = std::sync::Arc::new(MemoryDrive::new());
        drive
            .add_file("root", "1", "one.txt", MIME_PLAIN_TEXT, "first")
            .add_file("root", "2", "two.txt", MIME_PLAIN_TEXT, "second");

        let handle = tokio::spawn({
            let drive = drive.clone();
            async move {
                let opts = IngestOptions { concurrency: 2, ..Default::default() };
                ingest(drive.as_ref(), URL, &opts).await
            }
        });
        let ingested = handle.await.unwrap().unwrap();
        assert_eq!(ingested.report.files_found, 2);
        assert_eq!(ingested.documents.non_empty_count(), 2);
    }

    #[tokio::test]
    async fn empty_folder_gives_empty_collection() {
        let drive = MemoryDrive::new();
        let ingested = ingest(&drive, URL, &IngestOptions::default()).await.unwrap();
        assert!(ingested.documents.is_empty());
        assert_eq!(ingested.report, IngestReport::default());
    }
}

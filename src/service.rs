//! The three operations exposed to callers: index a folder, ask a question,
//! check whether an owner has an index.
//!
//! [`DriveChat`] owns the record pool, the on-disk [`IndexStore`], the drive
//! provider and the answer generator. Identity is resolved by the caller;
//! every operation takes a plain owner id.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use drivechat_core::index::Index;

use crate::answer::{answer, create_generator, AnswerGenerator, AnswerStream};
use crate::config::Config;
use crate::drive_client::{Credentials, DriveProvider, GoogleDriveProvider};
use crate::error::{Error, Result};
use crate::index_store::{validate_owner, IndexStore};
use crate::ingest::{ingest, IngestOptions, IngestReport};
use crate::records::{delete_record, get_record, replace_record, IndexRecord, DEFAULT_DISPLAY_NAME};
use crate::{db, migrate};

/// Whether an owner has a usable index, and where it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    pub found: bool,
    pub source_url: Option<String>,
    pub display_name: Option<String>,
}

pub struct DriveChat {
    config: Config,
    pool: SqlitePool,
    store: IndexStore,
    provider: Arc<dyn DriveProvider>,
    generator: Arc<dyn AnswerGenerator>,
}

impl DriveChat {
    /// Connect the record database, apply migrations, and wire the Google
    /// Drive provider plus the configured answer generator.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::connect(&config.db).await?;
        migrate::run_migrations(&pool).await?;
        let generator = create_generator(&config.llm)?;
        Ok(Self {
            store: IndexStore::new(config.storage.index_dir.clone()),
            provider: Arc::new(GoogleDriveProvider::new(config.drive.clone())),
            generator,
            pool,
            config,
        })
    }

    pub fn with_provider(mut self, provider: Arc<dyn DriveProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Ingest `folder_url`, build its index, persist it for `owner_id` and
    /// replace the owner's record. Nothing is written unless ingestion and
    /// the build succeed; if the record write fails, the owner's previous
    /// index is put back.
    pub async fn ingest_and_index(
        &self,
        folder_url: &str,
        owner_id: &str,
        credentials: &Credentials,
        display_name: Option<&str>,
    ) -> Result<IngestReport> {
        validate_owner(owner_id)?;
        let api = self.provider.open(credentials).map_err(Error::ingestion)?;

        let opts = IngestOptions::from_config(&self.config.drive);
        let ingested = ingest(api.as_ref(), folder_url, &opts).await?;

        let index = Index::build(&ingested.documents, self.config.chunking.max_tokens);
        let previous = self.store.load(owner_id).ok();
        self.store.persist(&index, owner_id)?;

        let display_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME);
        let record = IndexRecord {
            owner_id: owner_id.to_string(),
            source_url: folder_url.to_string(),
            display_name: display_name.to_string(),
            indexed_at: Utc::now().timestamp(),
        };
        if let Err(e) = replace_record(&self.pool, &record).await {
            self.restore_index(owner_id, previous.as_ref());
            return Err(e);
        }

        info!(
            owner_id,
            chunks = index.chunks().len(),
            documents = ingested.report.files_found,
            "index rebuilt"
        );
        Ok(ingested.report)
    }

    /// Delete the owner's record and index. Returns whether either existed.
    pub async fn remove_index(&self, owner_id: &str) -> Result<bool> {
        validate_owner(owner_id)?;
        let had_record = delete_record(&self.pool, owner_id).await?;
        let had_index = self.store.remove(owner_id)?;
        info!(owner_id, had_record, had_index, "index removed");
        Ok(had_record || had_index)
    }

    fn restore_index(&self, owner_id: &str, previous: Option<&Index>) {
        let restored = match previous {
            Some(index) => self.store.persist(index, owner_id),
            None => self.store.remove(owner_id).map(|_| ()),
        };
        if let Err(e) = restored {
            warn!(owner_id, error = %e, "could not restore previous index");
        }
    }

    /// Answer `question` from the owner's index.
    pub async fn query_index(&self, owner_id: &str, question: &str) -> Result<AnswerStream> {
        let index = self.store.load(owner_id)?;
        answer(
            &index,
            question,
            self.config.retrieval.top_k,
            self.generator.as_ref(),
        )
        .await
    }

    /// Report whether the owner has both a record and a loadable index.
    /// An unknown or invalid owner is simply not indexed.
    pub async fn is_indexed(&self, owner_id: &str) -> Result<IndexStatus> {
        if validate_owner(owner_id).is_err() {
            return Ok(IndexStatus::default());
        }
        let Some(record) = get_record(&self.pool, owner_id).await? else {
            return Ok(IndexStatus::default());
        };
        if self.store.load(owner_id).is_err() {
            return Ok(IndexStatus::default());
        }
        Ok(IndexStatus {
            found: true,
            source_url: Some(record.source_url),
            display_name: Some(record.display_name),
        })
    }
}

//! # drivechat
//!
//! Index a Google Drive folder per user and answer questions against it.
//!
//! A folder share URL is walked (sub-folders included, to a depth limit),
//! every supported file is downloaded in chunks and turned into plain text,
//! and the resulting documents are chunked into a keyword index persisted
//! per owner. Questions retrieve the best passages from that index and are
//! answered as a token stream, either by a chat-completion model or by
//! quoting the passages directly.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Drive walker │──▶│  Extractor   │──▶│ Index store  │
//! │ list + depth │   │ txt/pdf/xlsx │   │ json per user│
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!                         ┌────────────────────┤
//!                         ▼                    ▼
//!                   ┌──────────┐         ┌──────────┐
//!                   │   CLI    │         │   HTTP   │
//!                   └──────────┘         └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Listing items and re-exported document types |
//! | [`drive_client`] | Storage provider trait and Google Drive client |
//! | [`drive_memory`] | In-memory provider |
//! | [`connector_drive`] | Folder URL parsing and depth-bounded walk |
//! | [`download`] | Chunked download loop |
//! | [`extract`] | Per-format text extraction |
//! | [`ingest`] | Walk + extract into a document collection |
//! | [`index_store`] | Per-owner index persistence |
//! | [`records`] | Per-owner index records |
//! | [`answer`] | Retrieval and streamed answers |
//! | [`service`] | Index / ask / status operations |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod config;
pub mod connector_drive;
pub mod db;
pub mod download;
pub mod drive_client;
pub mod drive_memory;
pub mod error;
pub mod extract;
pub mod index_store;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod records;
pub mod server;
pub mod service;

//! # drivechat core
//!
//! Runtime-free logic shared by the drivechat service: document models,
//! paragraph chunking, and the retrievable keyword index that is built from
//! an ingested folder and persisted per owner.
//!
//! This crate has no tokio, HTTP, or filesystem dependencies. Everything that
//! talks to the network or to disk lives in the `drivechat` package.

pub mod chunk;
pub mod index;
pub mod models;

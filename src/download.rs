//! Chunked, resumable download.
//!
//! Requests successive byte ranges until the transfer reports completion:
//! the reported total is reached, a chunk comes back short, or the provider
//! ignored the range and sent the whole body.

use tracing::debug;

use crate::drive_client::{DriveApi, MediaSource};
use crate::error::DriveError;

pub async fn download_all(
    api: &dyn DriveApi,
    source: &MediaSource,
    chunk_size: u64,
) -> Result<Vec<u8>, DriveError> {
    let chunk_size = chunk_size.max(1);
    let mut buf: Vec<u8> = Vec::new();
    let mut offset = 0u64;

    loop {
        let chunk = api.fetch_chunk(source, offset, chunk_size).await?;
        let received = chunk.data.len() as u64;

        if !chunk.partial {
            // whole body regardless of the requested range
            buf = chunk.data;
            debug!(file_id = source.file_id(), bytes = buf.len(), "download 100%");
            break;
        }

        buf.extend_from_slice(&chunk.data);
        offset += received;

        if let Some(total) = chunk.total_size {
            if total > 0 {
                debug!(
                    file_id = source.file_id(),
                    "download {}%",
                    (offset.min(total) * 100) / total
                );
            }
            if offset >= total {
                break;
            }
        }
        if received < chunk_size {
            break;
        }
    }

    Ok(buf)
}

/*
[INPUT]:  Task id of a completed job, TransferApi client, destination path
[OUTPUT]: Artifact written to the destination only when the download succeeds
[POS]:    Output layer - saving annotated videos to disk
[UPDATE]: When changing how downloaded artifacts reach the filesystem
*/

use emovid_adapter::{TransferApi, TransferError};
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

/// Stream a job's artifact to `output`.
///
/// Bytes go to a temp file beside `output`, which is moved into place only
/// after the download finished. On failure `output` is left as it was.
pub async fn save_artifact<C>(client: &C, task_id: &str, output: &Path) -> Result<u64, TransferError>
where
    C: TransferApi + ?Sized,
{
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let staging = NamedTempFile::new_in(parent)?;
    let mut file = tokio::fs::File::from_std(staging.as_file().try_clone()?);

    let written = client.download_to(task_id, &mut file).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    // dropping `staging` on an earlier return removes the partial file
    staging.persist(output).map_err(|err| TransferError::from(err.error))?;
    tracing::info!(task_id = %task_id, bytes = written, path = %output.display(), "artifact saved");
    Ok(written)
}

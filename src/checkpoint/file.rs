use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::{bounded, CheckpointError, CheckpointStore};

/// One JSON file per stanza inside a directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    timeout: Duration,
}

impl FileCheckpointStore {
    /// Use `dir` for checkpoint files, creating it (owner-only) if needed.
    /// Each read and write is bounded by `timeout`.
    pub fn open(dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700)) {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to set checkpoint directory permissions");
            }
        }
        Ok(Self { dir, timeout })
    }

    /// File holding `stanza`'s checkpoint. Stanza names are percent-encoded,
    /// so any name maps to a single file inside the directory.
    pub fn path_for(&self, stanza: &str) -> PathBuf {
        let encoded: String = url::form_urlencoded::byte_serialize(stanza.as_bytes()).collect();
        self.dir.join(format!("{}.json", encoded))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn read(&self, stanza: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        let path = self.path_for(stanza);
        bounded(self.timeout, async move {
            match tokio::fs::read(path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn write(&self, stanza: &str, bytes: &[u8]) -> Result<(), CheckpointError> {
        let path = self.path_for(stanza);
        let bytes = bytes.to_vec();
        // On timeout the blocking write keeps running; the rename keeps the file whole either way
        bounded(self.timeout, async move {
            tokio::task::spawn_blocking(move || atomic_write(&path, &bytes))
                .await
                .map_err(std::io::Error::other)??;
            Ok(())
        })
        .await
    }
}

/// Replace `dst` with `content` via a temp file, fsync and rename, so the
/// destination is never left in a partial state.
fn atomic_write(dst: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};

    // Unpredictable temp name; create_new refuses a pre-planted file or symlink.
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut temp_file = options.open(&temp_path)?;

    let written = temp_file
        .write_all(content)
        .and_then(|()| temp_file.sync_all());
    drop(temp_file);
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    // On Windows, rename fails if destination exists, so remove it first
    #[cfg(windows)]
    if dst.exists() {
        std::fs::remove_file(dst)?;
    }

    if let Err(e) = std::fs::rename(&temp_path, dst) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}

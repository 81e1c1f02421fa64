//! Model artifact acquisition and cache.
//!
//! Downloads stream to a temporary path and are renamed into their final
//! location only on full success, so a partial or failed transfer never
//! leaves a valid-looking artifact behind. Archives are unpacked into a
//! staging directory and the unpacked model directory is renamed into place
//! the same way. At most one download per model id runs at a time; different
//! models may download concurrently.

use std::collections::HashSet;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::error::{DiktaError, Result};
use crate::model::registry::{EngineKind, ModelDescriptor, REGISTRY};

const CHUNK_SIZE: usize = 8 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TERMINAL_SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Streaming progress of one download.
///
/// `downloaded` is monotonically non-decreasing within one transfer; `total`
/// falls back to the descriptor's nominal size when the server does not
/// report a content length.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub model_id: String,
    pub downloaded: u64,
    pub total: u64,
    pub done: bool,
    pub error: Option<String>,
}

impl DownloadProgress {
    fn tick(desc: &ModelDescriptor, downloaded: u64, total: u64) -> Self {
        Self {
            model_id: desc.id.to_string(),
            downloaded,
            total,
            done: false,
            error: None,
        }
    }

    fn finished(desc: &ModelDescriptor, total: u64) -> Self {
        Self {
            model_id: desc.id.to_string(),
            downloaded: total,
            total,
            done: true,
            error: None,
        }
    }

    fn failed(desc: &ModelDescriptor, error: &DiktaError) -> Self {
        Self {
            model_id: desc.id.to_string(),
            downloaded: 0,
            total: 0,
            done: true,
            error: Some(error.to_string()),
        }
    }
}

/// Cooperative cancellation flag checked at every chunk boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Manages model artifacts under a models directory tree.
pub struct ModelStore {
    models_dir: PathBuf,
    in_flight: Mutex<HashSet<&'static str>>,
}

/// Removes the model id from the in-flight set when the download ends.
struct FlightGuard<'a> {
    store: &'a ModelStore,
    id: &'static str,
}

impl std::fmt::Debug for FlightGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightGuard").field("id", &self.id).finish()
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.store
            .in_flight
            .lock()
            .expect("in-flight set poisoned")
            .remove(self.id);
    }
}

impl ModelStore {
    /// Open the store at the default location
    /// (`<data dir>/dikta/models/{whisper,vosk,llm}`).
    pub fn new() -> Result<Self> {
        let dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dikta")
            .join("models");
        Self::with_dir(dir)
    }

    /// Open the store rooted at an explicit directory.
    pub fn with_dir(models_dir: PathBuf) -> Result<Self> {
        for kind in [EngineKind::Whisper, EngineKind::Vosk, EngineKind::Llm] {
            fs::create_dir_all(models_dir.join(kind.subdir()))?;
        }
        Ok(Self {
            models_dir,
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Full path of a model artifact (file, or directory for archives).
    pub fn model_path(&self, desc: &ModelDescriptor) -> PathBuf {
        self.models_dir
            .join(desc.engine.subdir())
            .join(desc.filename)
    }

    /// Whether the artifact is present on disk. Archive models must be a
    /// directory; single files must be non-empty. Pure query.
    pub fn is_downloaded(&self, desc: &ModelDescriptor) -> bool {
        let path = self.model_path(desc);
        match fs::metadata(&path) {
            Ok(meta) if desc.is_archive => meta.is_dir(),
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }

    /// All registry models present on disk.
    pub fn list_downloaded(&self) -> Vec<&'static ModelDescriptor> {
        REGISTRY.iter().filter(|m| self.is_downloaded(m)).collect()
    }

    /// Remove the artifact (file or directory tree). Missing artifacts are
    /// not an error.
    pub fn delete(&self, desc: &ModelDescriptor) -> Result<()> {
        let path = self.model_path(desc);
        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path)?,
            Ok(_) => fs::remove_file(&path)?,
            Err(_) => {}
        }
        Ok(())
    }

    /// Download the artifact, streaming progress to `progress` (best-effort:
    /// transfer ticks are dropped rather than block when the channel is
    /// full). Idempotent: an already-downloaded model reports completion
    /// immediately. A second call for a model id still in flight returns
    /// [`DiktaError::DownloadInProgress`].
    pub fn download(
        &self,
        desc: &ModelDescriptor,
        cancel: &CancelToken,
        progress: Option<&Sender<DownloadProgress>>,
    ) -> Result<()> {
        if self.is_downloaded(desc) {
            send_terminal(progress, DownloadProgress::finished(desc, desc.size));
            return Ok(());
        }

        let _guard = self.begin_flight(desc)?;

        let result = if desc.is_archive {
            self.download_archive(desc, cancel, progress)
        } else {
            self.download_file(desc, cancel, progress)
        };

        if let Err(ref err) = result {
            send_terminal(progress, DownloadProgress::failed(desc, err));
        }
        result
    }

    /// Register `desc` as in flight, or fail if it already is.
    fn begin_flight(&self, desc: &ModelDescriptor) -> Result<FlightGuard<'_>> {
        let mut flights = self.in_flight.lock().expect("in-flight set poisoned");
        if !flights.insert(desc.id) {
            return Err(DiktaError::DownloadInProgress(desc.id.to_string()));
        }
        Ok(FlightGuard {
            store: self,
            id: desc.id,
        })
    }

    fn download_file(
        &self,
        desc: &ModelDescriptor,
        cancel: &CancelToken,
        progress: Option<&Sender<DownloadProgress>>,
    ) -> Result<()> {
        let dest = self.model_path(desc);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = part_path(&dest);
        let total = match self.stream_to(desc, &tmp, cancel, progress) {
            Ok(total) => total,
            Err(err) => {
                let _ = fs::remove_file(&tmp);
                return Err(err);
            }
        };

        fs::rename(&tmp, &dest)?;
        send_terminal(progress, DownloadProgress::finished(desc, total));
        Ok(())
    }

    fn download_archive(
        &self,
        desc: &ModelDescriptor,
        cancel: &CancelToken,
        progress: Option<&Sender<DownloadProgress>>,
    ) -> Result<()> {
        let dest = self.model_path(desc);
        let parent = dest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.models_dir.clone());
        fs::create_dir_all(&parent)?;

        // Spool the archive next to its destination so the final rename
        // stays on one filesystem.
        let spool = tempfile::Builder::new()
            .prefix("model-")
            .suffix(".zip")
            .tempfile_in(&parent)?;

        let total = self.stream_to(desc, spool.path(), cancel, progress)?;
        self.unpack_into_place(desc, spool.path())?;
        send_terminal(progress, DownloadProgress::finished(desc, total));
        Ok(())
    }

    /// Extract a downloaded zip into a staging directory, then rename the
    /// unpacked model directory into its final location. A failed extraction
    /// leaves nothing `is_downloaded` would accept.
    fn unpack_into_place(&self, desc: &ModelDescriptor, archive_path: &Path) -> Result<()> {
        let dest = self.model_path(desc);
        let parent = dest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.models_dir.clone());

        let staging = tempfile::tempdir_in(&parent)?;

        let file = fs::File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| DiktaError::Download(format!("open archive: {e}")))?;
        archive
            .extract(staging.path())
            .map_err(|e| DiktaError::Download(format!("unpack archive: {e}")))?;

        let unpacked = staging.path().join(desc.filename);
        if !unpacked.is_dir() {
            return Err(DiktaError::Download(format!(
                "archive did not contain directory {}",
                desc.filename
            )));
        }
        fs::rename(&unpacked, &dest)?;
        Ok(())
    }

    /// Stream the artifact body into `tmp`, emitting throttled progress.
    /// Returns the byte count on success.
    fn stream_to(
        &self,
        desc: &ModelDescriptor,
        tmp: &Path,
        cancel: &CancelToken,
        progress: Option<&Sender<DownloadProgress>>,
    ) -> Result<u64> {
        if cancel.is_cancelled() {
            return Err(DiktaError::Cancelled);
        }

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            // Multi-hundred-megabyte artifacts on slow links: no overall
            // deadline, cancellation is cooperative per chunk.
            .timeout(None)
            .build()
            .map_err(|e| DiktaError::Download(e.to_string()))?;

        let mut response = client
            .get(desc.url)
            .send()
            .map_err(|e| DiktaError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DiktaError::Download(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let total = response.content_length().unwrap_or(desc.size);
        let mut file = fs::File::create(tmp)?;
        let mut buffer = [0u8; CHUNK_SIZE];
        let mut downloaded: u64 = 0;
        let mut last_emitted: u64 = 0;

        send_tick(progress, DownloadProgress::tick(desc, 0, total));

        loop {
            if cancel.is_cancelled() {
                return Err(DiktaError::Cancelled);
            }

            let n = response
                .read(&mut buffer)
                .map_err(|e| DiktaError::Download(format!("read: {e}")))?;
            if n == 0 {
                break;
            }

            file.write_all(&buffer[..n])?;
            downloaded += n as u64;

            // Emit roughly every 1% or 500 KB, whichever is more frequent.
            let threshold = if total > 0 {
                (total / 100).clamp(1, 500_000)
            } else {
                500_000
            };
            if downloaded - last_emitted >= threshold {
                send_tick(progress, DownloadProgress::tick(desc, downloaded, total));
                last_emitted = downloaded;
            }
        }

        Ok(downloaded)
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

fn send_tick(progress: Option<&Sender<DownloadProgress>>, p: DownloadProgress) {
    if let Some(tx) = progress {
        let _ = tx.try_send(p);
    }
}

fn send_terminal(progress: Option<&Sender<DownloadProgress>>, p: DownloadProgress) {
    if let Some(tx) = progress {
        let _ = tx.send_timeout(p, TERMINAL_SEND_TIMEOUT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::registry;

    fn store() -> (tempfile::TempDir, ModelStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::with_dir(dir.path().join("models")).unwrap();
        (dir, store)
    }

    fn whisper_desc() -> &'static ModelDescriptor {
        registry::get("whisper-tiny-q5").unwrap()
    }

    fn vosk_desc() -> &'static ModelDescriptor {
        registry::get("vosk-ru-small").unwrap()
    }

    fn place_file(store: &ModelStore, desc: &ModelDescriptor, bytes: &[u8]) {
        let path = store.model_path(desc);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).unwrap();
    }

    #[test]
    fn model_path_uses_engine_subdir() {
        let (_dir, store) = store();
        let path = store.model_path(whisper_desc());
        assert!(path.ends_with("whisper/ggml-tiny-q5_1.bin"));
        let path = store.model_path(vosk_desc());
        assert!(path.ends_with("vosk/vosk-model-small-ru-0.22"));
    }

    #[test]
    fn is_downloaded_requires_nonempty_file() {
        let (_dir, store) = store();
        let desc = whisper_desc();
        assert!(!store.is_downloaded(desc));

        place_file(&store, desc, b"");
        assert!(!store.is_downloaded(desc));

        place_file(&store, desc, b"ggml");
        assert!(store.is_downloaded(desc));
    }

    #[test]
    fn is_downloaded_requires_directory_for_archives() {
        let (_dir, store) = store();
        let desc = vosk_desc();
        assert!(!store.is_downloaded(desc));

        // A stray file at the directory path does not count.
        place_file(&store, desc, b"not a directory");
        assert!(!store.is_downloaded(desc));

        fs::remove_file(store.model_path(desc)).unwrap();
        fs::create_dir_all(store.model_path(desc)).unwrap();
        assert!(store.is_downloaded(desc));
    }

    #[test]
    fn delete_removes_file_and_tree() {
        let (_dir, store) = store();
        let desc = whisper_desc();
        place_file(&store, desc, b"ggml");
        store.delete(desc).unwrap();
        assert!(!store.is_downloaded(desc));

        let vosk = vosk_desc();
        fs::create_dir_all(store.model_path(vosk).join("am")).unwrap();
        store.delete(vosk).unwrap();
        assert!(!store.is_downloaded(vosk));

        // Deleting something never downloaded is fine.
        store.delete(desc).unwrap();
    }

    #[test]
    fn download_is_idempotent_when_present() {
        let (_dir, store) = store();
        let desc = whisper_desc();
        place_file(&store, desc, b"ggml");

        let (tx, rx) = crossbeam_channel::bounded(4);
        let cancel = CancelToken::new();
        store.download(desc, &cancel, Some(&tx)).unwrap();
        store.download(desc, &cancel, Some(&tx)).unwrap();

        let first = rx.try_recv().unwrap();
        assert!(first.done);
        assert_eq!(first.downloaded, first.total);
        assert!(first.error.is_none());
        assert!(rx.try_recv().unwrap().done);
    }

    #[test]
    fn duplicate_flight_is_rejected() {
        let (_dir, store) = store();
        let desc = whisper_desc();

        let guard = store.begin_flight(desc).unwrap();
        match store.begin_flight(desc) {
            Err(DiktaError::DownloadInProgress(id)) => assert_eq!(id, desc.id),
            other => panic!("expected DownloadInProgress, got {other:?}"),
        }

        // A different model id is unaffected.
        let other = store.begin_flight(vosk_desc()).unwrap();
        drop(other);

        // Releasing the flight allows a retry.
        drop(guard);
        store.begin_flight(desc).unwrap();
    }

    #[test]
    fn cancelled_download_leaves_no_artifact() {
        let (_dir, store) = store();
        let desc = whisper_desc();

        let cancel = CancelToken::new();
        cancel.cancel();

        match store.download(desc, &cancel, None) {
            Err(DiktaError::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }
        assert!(!store.is_downloaded(desc));
        assert!(!part_path(&store.model_path(desc)).exists());
    }

    #[test]
    fn unpack_stages_then_renames() {
        let (dir, store) = store();
        let desc = vosk_desc();

        // Build a zip whose single top-level directory matches the
        // descriptor's directory name.
        let zip_path = dir.path().join("model.zip");
        let file = fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer
            .start_file(format!("{}/am/final.mdl", desc.filename), options)
            .unwrap();
        writer.write_all(b"acoustic model").unwrap();
        writer
            .start_file(format!("{}/conf/mfcc.conf", desc.filename), options)
            .unwrap();
        writer.write_all(b"conf").unwrap();
        writer.finish().unwrap();

        store.unpack_into_place(desc, &zip_path).unwrap();
        assert!(store.is_downloaded(desc));
        assert!(store.model_path(desc).join("am").join("final.mdl").exists());
    }

    #[test]
    fn unpack_without_expected_directory_fails_clean() {
        let (dir, store) = store();
        let desc = vosk_desc();

        let zip_path = dir.path().join("bad.zip");
        let file = fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("unrelated.txt", options).unwrap();
        writer.write_all(b"nope").unwrap();
        writer.finish().unwrap();

        assert!(store.unpack_into_place(desc, &zip_path).is_err());
        assert!(!store.is_downloaded(desc));
    }

    #[test]
    fn part_path_appends_suffix() {
        let p = part_path(Path::new("/x/ggml-tiny-q5_1.bin"));
        assert_eq!(p, Path::new("/x/ggml-tiny-q5_1.bin.part"));
    }
}

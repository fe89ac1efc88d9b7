// THEORY:
// The output store is the filesystem sink for processed images. Both front doors
// hand it decoded pixel buffers; it encodes them off the async runtime and writes
// them under a configurable root directory.
//
// Key architectural principles:
// 1.  **One id per request**: every admitted request gets a process-unique id, and
//     its files live in `<root>/<id>/`, so concurrent requests never overwrite each
//     other and any id a client is handed can be fed back to `load`. The legacy single shared file (`udp_processed.<ext>`, last writer
//     wins) is still available through `Naming::Shared`.
// 2.  **Atomic files**: each file is written to a hidden temp name in the target
//     directory and renamed into place. Readers see either the old file or the
//     complete new one, never a torn write.
// 3.  **Encoding is blocking work**: JPEG/PNG encoding runs on tokio's blocking
//     pool; the frames of one pipeline run are encoded concurrently.
// 4.  **Retrieval is confined**: `load` only accepts single, non-hidden path
//     segments, so a caller can never escape the request directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::try_join_all;

use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::core_modules::utils::image_helper::{self, OutputFormat};
use crate::error::OutputError;
use crate::pipeline::{Frame, PipelineRun};

/// Stem of the datagram result file in shared mode.
pub const SHARED_DATAGRAM_STEM: &str = "udp_processed";

/// Stem of the datagram result inside its request directory.
pub const DATAGRAM_RESULT_STEM: &str = "result";

const MAX_SEGMENT_LEN: usize = 128;

/// How datagram results are named on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Naming {
    /// `<request-id>/result.<ext>`; the id is echoed in the acknowledgement.
    #[default]
    PerRequest,
    /// One `udp_processed.<ext>` for every request; last writer wins.
    Shared,
}

impl FromStr for Naming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-request" | "per_request" | "unique" => Ok(Naming::PerRequest),
            "shared" | "legacy" => Ok(Naming::Shared),
            other => Err(format!("unknown naming mode {other:?} (expected per-request or shared)")),
        }
    }
}

impl fmt::Display for Naming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Naming::PerRequest => "per-request",
            Naming::Shared => "shared",
        })
    }
}

/// Identifier assigned to a request at admission: `<start-millis hex>-<counter>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Validates an id received from outside (e.g. a URL segment).
    pub fn parse(raw: &str) -> Result<Self, OutputError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SEGMENT_LEN
            && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(OutputError::InvalidName(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A frame that has been written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFrame {
    pub label: String,
    pub file_name: String,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct OutputStore {
    root: PathBuf,
    naming: Naming,
    format: OutputFormat,
    /// Process start, in milliseconds since the Unix epoch.
    epoch: u64,
    next_id: AtomicU64,
    next_temp: AtomicU64,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>, naming: Naming, format: OutputFormat) -> Self {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        Self {
            root: root.into(),
            naming,
            format,
            epoch,
            next_id: AtomicU64::new(0),
            next_temp: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn naming(&self) -> Naming {
        self.naming
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn allocate_request_id(&self) -> RequestId {
        let sequence = self.next_id.fetch_add(1, Ordering::Relaxed);
        RequestId(format!("{:x}-{}", self.epoch, sequence))
    }

    /// Where the result of datagram request `id` is written under the current naming mode.
    pub fn datagram_result_path(&self, id: &RequestId) -> PathBuf {
        match self.naming {
            Naming::PerRequest => self.frame_path(id, DATAGRAM_RESULT_STEM),
            Naming::Shared => self.root.join(self.frame_file_name(SHARED_DATAGRAM_STEM)),
        }
    }

    pub fn request_dir(&self, id: &RequestId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn frame_file_name(&self, label: &str) -> String {
        format!("{label}.{}", self.format.extension())
    }

    pub fn frame_path(&self, id: &RequestId, label: &str) -> PathBuf {
        self.request_dir(id).join(self.frame_file_name(label))
    }

    pub async fn persist_datagram_result(
        &self,
        id: &RequestId,
        buffer: PixelBuffer,
    ) -> Result<PathBuf, OutputError> {
        let path = self.datagram_result_path(id);
        create_dir(path.parent().unwrap_or(self.root.as_path())).await?;
        let bytes = self.encode(buffer).await?;
        self.write_atomic(&path, &bytes).await?;
        Ok(path)
    }

    /// Writes one frame into the directory of request `id`.
    pub async fn persist_frame(&self, id: &RequestId, frame: Frame) -> Result<StoredFrame, OutputError> {
        create_dir(&self.request_dir(id)).await?;
        self.write_frame(id, frame).await
    }

    /// Writes every frame of `run`, in frame order, encoding them concurrently.
    pub async fn persist_run(&self, id: &RequestId, run: PipelineRun) -> Result<Vec<StoredFrame>, OutputError> {
        create_dir(&self.request_dir(id)).await?;
        try_join_all(run.into_frames().into_iter().map(|frame| self.write_frame(id, frame))).await
    }

    /// Reads back a stored frame or per-request datagram result. Both segments must
    /// be plain file names.
    pub async fn load(&self, id: &str, file: &str) -> Result<Vec<u8>, OutputError> {
        let id = RequestId::parse(id)?;
        validate_file_name(file)?;
        let path = self.request_dir(&id).join(file);
        tokio::fs::read(&path).await.map_err(|source| OutputError::io(path, source))
    }

    async fn write_frame(&self, id: &RequestId, frame: Frame) -> Result<StoredFrame, OutputError> {
        let file_name = self.frame_file_name(&frame.label);
        let path = self.request_dir(id).join(&file_name);
        let bytes = self.encode(frame.buffer).await?;
        self.write_atomic(&path, &bytes).await?;
        Ok(StoredFrame {
            label: frame.label,
            file_name,
            path,
        })
    }

    async fn encode(&self, buffer: PixelBuffer) -> Result<Vec<u8>, OutputError> {
        let format = self.format;
        let bytes = tokio::task::spawn_blocking(move || image_helper::encode(&buffer, format)).await??;
        Ok(bytes)
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), OutputError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sequence = self.next_temp.fetch_add(1, Ordering::Relaxed);
        let temp = path.with_file_name(format!(".{name}.{sequence}.tmp"));

        let written = match tokio::fs::write(&temp, bytes).await {
            Ok(()) => tokio::fs::rename(&temp, path)
                .await
                .map_err(|source| OutputError::io(path, source)),
            Err(source) => Err(OutputError::io(&temp, source)),
        };
        if written.is_err() {
            // A failed write can leave a partial temp file behind.
            let _ = tokio::fs::remove_file(&temp).await;
        }
        written
    }
}

async fn create_dir(dir: &Path) -> Result<(), OutputError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| OutputError::io(dir, source))
}

fn validate_file_name(file: &str) -> Result<(), OutputError> {
    let valid = !file.is_empty()
        && file.len() <= MAX_SEGMENT_LEN
        && !file.starts_with('.')
        && !file.contains("..")
        && !file.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(OutputError::InvalidName(file.to_string()))
    }
}

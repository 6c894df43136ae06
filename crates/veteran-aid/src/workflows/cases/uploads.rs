//! Evidence file intake: allow-list, signature sniffing and size enforcement.
//!
//! An [`UploadSession`] writes chunks straight into a [`DocumentStore`] and removes the
//! partial output whenever the upload is rejected or abandoned, so a rejected upload never
//! leaves a file behind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use mime::Mime;

use super::domain::StoredFile;

/// File kinds accepted as evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptedKind {
    Pdf,
    Jpeg,
    Png,
}

impl AcceptedKind {
    fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    fn from_mime(content_type: &Mime) -> Option<Self> {
        let essence = content_type.essence_str();
        if essence == mime::APPLICATION_PDF.essence_str() {
            Some(Self::Pdf)
        } else if essence == mime::IMAGE_JPEG.essence_str() {
            Some(Self::Jpeg)
        } else if essence == mime::IMAGE_PNG.essence_str() {
            Some(Self::Png)
        } else {
            None
        }
    }

    pub fn mime(self) -> Mime {
        match self {
            Self::Pdf => mime::APPLICATION_PDF,
            Self::Jpeg => mime::IMAGE_JPEG,
            Self::Png => mime::IMAGE_PNG,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn signature(self) -> &'static [u8] {
        match self {
            Self::Pdf => b"%PDF",
            Self::Jpeg => &[0xFF, 0xD8, 0xFF],
            Self::Png => &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
        }
    }
}

/// Reasons an evidence file is refused.
#[derive(Debug, thiserror::Error)]
pub enum UploadRejection {
    #[error("unsupported file extension for '{file_name}'; allowed: pdf, jpg, jpeg, png")]
    UnsupportedExtension { file_name: String },
    #[error("unsupported content type '{content_type}'")]
    UnsupportedContentType { content_type: String },
    #[error("file extension does not match content type '{content_type}'")]
    MismatchedType { content_type: String },
    #[error("file content does not look like a {expected} file")]
    SignatureMismatch { expected: &'static str },
    #[error("file exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("file is empty")]
    Empty,
    #[error("storage failure: {0}")]
    Storage(#[from] io::Error),
}

/// Allow-list and size limit applied to every upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    max_bytes: u64,
}

impl UploadPolicy {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Both the extension and the declared MIME type must be on the allow-list and agree.
    pub fn classify(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<AcceptedKind, UploadRejection> {
        let by_extension = Path::new(file_name)
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase)
            .and_then(|extension| AcceptedKind::from_extension(&extension))
            .ok_or_else(|| UploadRejection::UnsupportedExtension {
                file_name: file_name.to_string(),
            })?;

        let by_mime = content_type
            .trim()
            .parse::<Mime>()
            .ok()
            .and_then(|parsed| AcceptedKind::from_mime(&parsed))
            .ok_or_else(|| UploadRejection::UnsupportedContentType {
                content_type: content_type.to_string(),
            })?;

        if by_extension != by_mime {
            return Err(UploadRejection::MismatchedType {
                content_type: content_type.to_string(),
            });
        }
        Ok(by_extension)
    }

    /// Classifies the file and opens `{key_stem}.{ext}` in `store`.
    pub fn begin<S: DocumentStore>(
        &self,
        store: Arc<S>,
        key_stem: &str,
        file_name: &str,
        content_type: &str,
    ) -> Result<UploadSession<S>, UploadRejection> {
        let kind = self.classify(file_name, content_type)?;
        let key = format!("{key_stem}.{}", kind.extension());
        let writer = store.create(&key)?;

        Ok(UploadSession {
            store,
            key,
            file_name: file_name.to_string(),
            kind,
            limit: self.max_bytes,
            writer: Some(writer),
            head: Vec::with_capacity(kind.signature().len()),
            written: 0,
            committed: false,
        })
    }
}

/// Destination for evidence bytes, addressed by relative keys.
pub trait DocumentStore: Send + Sync {
    type Writer: Write + Send;

    /// Opens a new entry. Fails with [`io::ErrorKind::AlreadyExists`] when `key` is taken.
    fn create(&self, key: &str) -> io::Result<Self::Writer>;
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// Stores evidence under a root directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalDirectoryStore {
    root: PathBuf,
}

impl LocalDirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid storage key '{key}'"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl DocumentStore for LocalDirectoryStore {
    type Writer = BufWriter<File>;

    fn create(&self, key: &str) -> io::Result<Self::Writer> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(BufWriter::new(file))
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)?) {
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// One in-flight upload. Dropping it without [`UploadSession::finish`] discards the output.
pub struct UploadSession<S: DocumentStore> {
    store: Arc<S>,
    key: String,
    file_name: String,
    kind: AcceptedKind,
    limit: u64,
    writer: Option<S::Writer>,
    head: Vec<u8>,
    written: u64,
    committed: bool,
}

impl<S: DocumentStore> UploadSession<S> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> AcceptedKind {
        self.kind
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Appends a chunk. The size limit and the file signature are checked before any byte
    /// of the chunk reaches the store.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), UploadRejection> {
        let result = self.accept(chunk);
        if result.is_err() {
            self.discard();
        }
        result
    }

    fn accept(&mut self, chunk: &[u8]) -> Result<(), UploadRejection> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(UploadRejection::Storage(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "upload session already closed",
            )));
        };

        let total = self.written + chunk.len() as u64;
        if total > self.limit {
            return Err(UploadRejection::TooLarge { limit: self.limit });
        }

        let signature = self.kind.signature();
        if self.head.len() < signature.len() {
            let wanted = (signature.len() - self.head.len()).min(chunk.len());
            self.head.extend_from_slice(&chunk[..wanted]);
            if !signature.starts_with(&self.head) {
                return Err(UploadRejection::SignatureMismatch {
                    expected: self.kind.extension(),
                });
            }
        }

        writer.write_all(chunk)?;
        self.written = total;
        Ok(())
    }

    /// Flushes the output and hands back the stored file reference.
    pub fn finish(mut self) -> Result<StoredFile, UploadRejection> {
        self.complete()
    }

    fn complete(&mut self) -> Result<StoredFile, UploadRejection> {
        if self.written == 0 {
            return Err(UploadRejection::Empty);
        }
        if self.head.len() < self.kind.signature().len() {
            return Err(UploadRejection::SignatureMismatch {
                expected: self.kind.extension(),
            });
        }

        let mut writer = self.writer.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "upload session already closed")
        })?;
        writer.flush()?;
        drop(writer);

        self.committed = true;
        Ok(StoredFile {
            file_name: self.file_name.clone(),
            path: self.key.clone(),
            content_type: self.kind.mime().essence_str().to_string(),
            size_bytes: self.written,
        })
    }

    fn discard(&mut self) {
        self.writer.take();
        if let Err(error) = self.store.remove(&self.key) {
            tracing::warn!(key = %self.key, %error, "failed to remove rejected upload");
        }
    }
}

impl<S: DocumentStore> Drop for UploadSession<S> {
    fn drop(&mut self) {
        if !self.committed {
            self.discard();
        }
    }
}

//! Paired on-disk snapshot of the index: vectors plus catalog metadata.
//!
//! File format: vectors.bin
//!
//! Header (79 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - catalog_digest: [u8; 32] (SHA256 of the content.json bytes)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated entry_count times, in catalog order):
//! - embedding: [f32; dimensions] (little-endian)
//!
//! content.json holds the catalog items as a JSON array, in the same order.
//! Both files are written to a temp file and renamed into place. The catalog
//! digest ties a vectors.bin to the exact content.json it was written with,
//! so a pair left half-updated by a crash is rejected on load.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::catalog::ContentItem;
use crate::semantic::index::VectorIndex;

pub const VECTORS_FILE: &str = "vectors.bin";
pub const CONTENT_FILE: &str = "content.json";

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + catalog_digest(32) +
/// dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 79;

/// Offset of the checksum field, i.e. the length of the checksummed prefix
const CHECKSUM_OFFSET: usize = HEADER_SIZE - 4;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Snapshot mismatch: vectors were written for a different content.json")]
    CatalogMismatch,

    #[error("Snapshot mismatch: {vectors} vectors but {items} catalog items")]
    CountMismatch { vectors: usize, items: usize },
}

/// Storage manager for the vectors.bin / content.json pair.
pub struct SnapshotStorage {
    dir: PathBuf,
}

impl SnapshotStorage {
    /// Create a new storage manager writing into `dir`.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    pub fn content_path(&self) -> PathBuf {
        self.dir.join(CONTENT_FILE)
    }

    /// Check if both snapshot files exist.
    pub fn exists(&self) -> bool {
        self.vectors_path().exists() && self.content_path().exists()
    }

    /// Check if at least one snapshot file exists.
    pub fn any_exists(&self) -> bool {
        self.vectors_path().exists() || self.content_path().exists()
    }

    /// Load the snapshot, validating that both halves belong together and
    /// were produced with the expected model.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
    ) -> Result<(VectorIndex, Vec<ContentItem>), VectorStorageError> {
        let content = std::fs::read(self.content_path())?;
        let vectors = std::fs::read(self.vectors_path())?;

        let index = decode_vectors(&vectors, expected_model_id, &digest(&content))?;
        let items: Vec<ContentItem> = serde_json::from_slice(&content)?;

        if index.len() != items.len() {
            return Err(VectorStorageError::CountMismatch {
                vectors: index.len(),
                items: items.len(),
            });
        }

        Ok((index, items))
    }

    /// Save the snapshot.
    ///
    /// content.json is written first; vectors.bin goes last and carries the
    /// digest of the content it belongs to.
    pub fn save(
        &self,
        index: &VectorIndex,
        items: &[ContentItem],
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        if index.len() != items.len() {
            return Err(VectorStorageError::CountMismatch {
                vectors: index.len(),
                items: items.len(),
            });
        }

        std::fs::create_dir_all(&self.dir)?;

        let content = serde_json::to_vec(items)?;
        let vectors = encode_vectors(index, model_id, &digest(&content))?;

        self.write_atomic(&self.content_path(), &content)?;
        self.write_atomic(&self.vectors_path(), &vectors)?;

        Ok(())
    }

    /// Write `data` to `path` via temp file -> fsync -> rename.
    /// The temp file lives in the same directory so the rename stays atomic,
    /// and is removed automatically if anything fails before the rename.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), VectorStorageError> {
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            writer.write_all(data)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;

        // make the rename itself durable
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        Ok(())
    }
}

/// Compute a model identifier from its name.
pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    digest(model_name.as_bytes())
}

fn digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    catalog_digest: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

impl Header {
    fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];

        bytes[0] = self.version;
        bytes[1..33].copy_from_slice(&self.model_id);
        bytes[33..65].copy_from_slice(&self.catalog_digest);
        bytes[65..67].copy_from_slice(&self.dimensions.to_le_bytes());
        bytes[67..75].copy_from_slice(&self.entry_count.to_le_bytes());

        let checksum = crc32fast::hash(&bytes[..CHECKSUM_OFFSET]);
        bytes[CHECKSUM_OFFSET..].copy_from_slice(&checksum.to_le_bytes());

        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, VectorStorageError> {
        if bytes.len() < HEADER_SIZE {
            return Err(VectorStorageError::InvalidFormat(format!(
                "file is {} bytes, shorter than the {} byte header",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let version = bytes[0];

        // Version check first
        if version > FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let stored_checksum = u32::from_le_bytes(read_array(&bytes[CHECKSUM_OFFSET..HEADER_SIZE]));
        if stored_checksum != crc32fast::hash(&bytes[..CHECKSUM_OFFSET]) {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        Ok(Header {
            version,
            model_id: read_array(&bytes[1..33]),
            catalog_digest: read_array(&bytes[33..65]),
            dimensions: u16::from_le_bytes(read_array(&bytes[65..67])),
            entry_count: u64::from_le_bytes(read_array(&bytes[67..75])),
        })
    }
}

/// Copy a slice of known length into an array.
fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut array = [0u8; N];
    array.copy_from_slice(&bytes[..N]);
    array
}

fn encode_vectors(
    index: &VectorIndex,
    model_id: &[u8; 32],
    catalog_digest: &[u8; 32],
) -> Result<Vec<u8>, VectorStorageError> {
    let dimensions = u16::try_from(index.dimensions()).map_err(|_| {
        VectorStorageError::InvalidFormat(format!(
            "{} dimensions do not fit the header",
            index.dimensions()
        ))
    })?;

    let header = Header {
        version: FORMAT_VERSION,
        model_id: *model_id,
        catalog_digest: *catalog_digest,
        dimensions,
        entry_count: index.len() as u64,
    };

    let mut bytes = Vec::with_capacity(HEADER_SIZE + index.len() * index.dimensions() * 4);
    bytes.extend_from_slice(&header.to_bytes());
    for vector in index.iter() {
        for value in vector {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }

    Ok(bytes)
}

fn decode_vectors(
    bytes: &[u8],
    expected_model_id: &[u8; 32],
    expected_digest: &[u8; 32],
) -> Result<VectorIndex, VectorStorageError> {
    let header = Header::from_bytes(bytes)?;

    if header.model_id != *expected_model_id {
        return Err(VectorStorageError::ModelMismatch);
    }

    if header.catalog_digest != *expected_digest {
        return Err(VectorStorageError::CatalogMismatch);
    }

    let dimensions = header.dimensions as usize;
    let entry_count = usize::try_from(header.entry_count)
        .map_err(|_| VectorStorageError::InvalidFormat("entry count overflow".to_string()))?;

    let body = &bytes[HEADER_SIZE..];
    let expected_len = entry_count
        .checked_mul(dimensions)
        .and_then(|values| values.checked_mul(4))
        .ok_or_else(|| VectorStorageError::InvalidFormat("entry count overflow".to_string()))?;

    if body.len() != expected_len {
        return Err(VectorStorageError::InvalidFormat(format!(
            "expected {} bytes of vectors, found {}",
            expected_len,
            body.len()
        )));
    }

    let mut index = VectorIndex::with_capacity(dimensions, entry_count);
    if dimensions > 0 {
        let mut vector = Vec::with_capacity(dimensions);
        for chunk in body.chunks_exact(dimensions * 4) {
            vector.clear();
            vector.extend(
                chunk
                    .chunks_exact(4)
                    .map(|value| f32::from_le_bytes(read_array(value))),
            );
            index
                .push(&vector)
                .map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))?;
        }
    }

    Ok(index)
}

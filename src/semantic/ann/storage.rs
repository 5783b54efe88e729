//! On-disk ANN artifact: the vectors an index was built from, plus a JSON
//! sidecar describing the build.
//!
//! Vector file format: `semantic_<model>.idx`
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - entry_id: i64 (little-endian)
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid meta file: {0}")]
    Meta(#[from] serde_json::Error),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension {0} does not fit the file format")]
    DimensionTooLarge(usize),
}

/// Build description stored next to the vector file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub model: String,
    pub backend: String,
    pub dim: usize,
    pub count: usize,
    pub built_at: DateTime<Utc>,
}

/// Paths of the artifact for one model.
#[derive(Debug, Clone)]
pub struct AnnArtifact {
    model: String,
    index_path: PathBuf,
    meta_path: PathBuf,
}

pub fn model_id_hash(model: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.finalize().into()
}

fn safe_model_name(model: &str) -> String {
    model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl AnnArtifact {
    /// Artifact for `model` under `<base>/ann/`.
    pub fn for_model(base: &Path, model: &str) -> Self {
        let dir = base.join("ann");
        let stem = format!("semantic_{}", safe_model_name(model));
        Self {
            model: model.to_string(),
            index_path: dir.join(format!("{stem}.idx")),
            meta_path: dir.join(format!("{stem}.json")),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn exists(&self) -> bool {
        self.index_path.exists()
    }

    pub fn read_meta(&self) -> Result<Option<ArtifactMeta>, StorageError> {
        if !self.meta_path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.meta_path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Write vectors then meta. Each file is replaced atomically
    /// (temp file -> fsync -> rename).
    pub fn save(&self, items: &[(i64, Vec<f32>)], meta: &ArtifactMeta) -> Result<(), StorageError> {
        if meta.dim > u16::MAX as usize {
            return Err(StorageError::DimensionTooLarge(meta.dim));
        }
        if let Some(dir) = self.index_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let temp_path = self.index_path.with_extension("tmp");
        if let Err(e) = self.write_vectors(&temp_path, items, meta.dim) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }
        std::fs::rename(&temp_path, &self.index_path)?;

        let temp_meta = self.meta_path.with_extension("json.tmp");
        std::fs::write(&temp_meta, serde_json::to_string_pretty(meta)?)?;
        std::fs::rename(&temp_meta, &self.meta_path)?;

        Ok(())
    }

    /// Read back the vectors. Returns the file's dimension with them.
    pub fn load(&self) -> Result<(usize, Vec<(i64, Vec<f32>)>), StorageError> {
        let file = File::open(&self.index_path)?;
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;
        if header.model_id != model_id_hash(&self.model) {
            return Err(StorageError::ModelMismatch);
        }

        let dimensions = header.dimensions as usize;
        let mut items = Vec::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            items.push(read_entry(&mut reader, dimensions)?);
        }

        Ok((dimensions, items))
    }

    pub fn delete(&self) -> Result<(), StorageError> {
        for path in [&self.index_path, &self.meta_path] {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn write_vectors(
        &self,
        path: &Path,
        items: &[(i64, Vec<f32>)],
        dimensions: usize,
    ) -> Result<(), StorageError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            version: FORMAT_VERSION,
            model_id: model_id_hash(&self.model),
            dimensions: dimensions as u16,
            entry_count: items.len() as u64,
        };
        write_header(&mut writer, &header)?;

        for (id, embedding) in items {
            writer.write_all(&id.to_le_bytes())?;
            for &value in embedding {
                writer.write_all(&value.to_le_bytes())?;
            }
        }

        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        Ok(())
    }
}

#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

fn read_header(reader: &mut impl Read) -> Result<Header, StorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes)?;

    let version = header_bytes[0];
    if version > FORMAT_VERSION {
        return Err(StorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    let stored_checksum = u32::from_le_bytes([
        header_bytes[43],
        header_bytes[44],
        header_bytes[45],
        header_bytes[46],
    ]);
    if stored_checksum != crc32fast::hash(&header_bytes[0..43]) {
        return Err(StorageError::ChecksumMismatch);
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[1..33]);

    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header_bytes[35..43]);

    Ok(Header {
        version,
        model_id,
        dimensions: u16::from_le_bytes([header_bytes[33], header_bytes[34]]),
        entry_count: u64::from_le_bytes(count_bytes),
    })
}

fn write_header(writer: &mut impl Write, header: &Header) -> Result<(), StorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = header.version;
    header_bytes[1..33].copy_from_slice(&header.model_id);
    header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

fn read_entry(reader: &mut impl Read, dimensions: usize) -> Result<(i64, Vec<f32>), StorageError> {
    let mut id_bytes = [0u8; 8];
    reader.read_exact(&mut id_bytes)?;
    let id = i64::from_le_bytes(id_bytes);

    let mut embedding = Vec::with_capacity(dimensions);
    for _ in 0..dimensions {
        let mut float_bytes = [0u8; 4];
        reader.read_exact(&mut float_bytes)?;
        embedding.push(f32::from_le_bytes(float_bytes));
    }

    Ok((id, embedding))
}

//! Binary persistence for [`VectorIndex`].
//!
//! # Blob Format
//!
//! All integers are little-endian.
//!
//! - Header: magic `DSKX`, format version (u32), metric tag (u8), variant
//!   tag (u8), reserved (u16), dimension (u32), document count (u64), model
//!   tag (u16 length + UTF-8), corpus fingerprint (32 bytes)
//! - Rows: `count` times (id u64, `dimension` f32 values)
//! - Partitioned only: partitions (u32), probes (u32), seed (u64), centroids
//!   (`partitions * dimension` f32), then per partition a member count (u32)
//!   followed by that many row numbers (u32)
//!
//! The header carries the dimension and metric so a mismatched index is
//! refused before its body is decoded. Files are written to a temporary file
//! in the target directory and renamed into place, and read back through a
//! memory map.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use memmap2::Mmap;
use tempfile::NamedTempFile;

use crate::error::{EngineError, EngineResult};
use crate::vector::flat::{FlatIndex, VectorStore};
use crate::vector::index::{CorpusFingerprint, IndexKind, IndexProvenance, VectorIndex};
use crate::vector::partitioned::PartitionedIndex;
use crate::vector::types::{DocumentId, Metric, VectorDimension};

/// Current blob format version.
pub const FORMAT_VERSION: u32 = 1;

/// Magic bytes identifying an index blob.
const MAGIC_BYTES: &[u8; 4] = b"DSKX";

const VARIANT_FLAT: u8 = 1;
const VARIANT_PARTITIONED: u8 = 2;

const BYTES_PER_F32: usize = 4;
const BYTES_PER_ID: usize = 8;

/// Decoded blob header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    pub version: u32,
    pub metric: Metric,
    pub variant: &'static str,
    pub dimension: VectorDimension,
    pub count: usize,
    pub model: String,
    pub corpus_fingerprint: CorpusFingerprint,
}

impl VectorIndex {
    /// Serializes the index into a self-describing blob.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let store = self.store();
        let dim = self.dimension().get();
        let model = truncate_utf8(self.model(), u16::MAX as usize);

        let mut out = Vec::with_capacity(
            64 + model.len() + store.len() * (BYTES_PER_ID + dim * BYTES_PER_F32),
        );
        out.extend_from_slice(MAGIC_BYTES);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.push(self.metric().tag());
        out.push(match self.kind() {
            IndexKind::Flat(_) => VARIANT_FLAT,
            IndexKind::Partitioned(_) => VARIANT_PARTITIONED,
        });
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(dim as u32).to_le_bytes());
        out.extend_from_slice(&(store.len() as u64).to_le_bytes());
        out.extend_from_slice(&(model.len() as u16).to_le_bytes());
        out.extend_from_slice(model.as_bytes());
        out.extend_from_slice(self.corpus_fingerprint());

        for (id, vector) in store.iter() {
            out.extend_from_slice(&id.to_bytes());
            write_f32s(&mut out, vector);
        }

        if let IndexKind::Partitioned(partitioned) = self.kind() {
            out.extend_from_slice(&(partitioned.partitions() as u32).to_le_bytes());
            out.extend_from_slice(&(partitioned.probes() as u32).to_le_bytes());
            out.extend_from_slice(&partitioned.seed().to_le_bytes());
            for centroid in partitioned.centroids() {
                write_f32s(&mut out, centroid);
            }
            for members in partitioned.lists() {
                out.extend_from_slice(&(members.len() as u32).to_le_bytes());
                for row in members {
                    out.extend_from_slice(&row.to_le_bytes());
                }
            }
        }

        out
    }

    /// Decodes a blob without checking it against an embedder.
    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        let mut reader = BlobReader::new(bytes);
        let header = read_header_from(&mut reader)?;
        decode_body(reader, header)
    }

    /// Decodes a blob, refusing it when its dimension or metric differ from
    /// what the caller serves with.
    ///
    /// Both checks happen on the header, before any vector is decoded.
    pub fn from_bytes_checked(
        bytes: &[u8],
        expected_dimension: VectorDimension,
        expected_metric: Metric,
    ) -> EngineResult<Self> {
        let mut reader = BlobReader::new(bytes);
        let header = read_header_from(&mut reader)?;

        if header.dimension != expected_dimension {
            return Err(EngineError::IndexDimensionMismatch {
                index: header.dimension.get(),
                embedder: expected_dimension.get(),
            });
        }
        if header.metric != expected_metric {
            return Err(EngineError::MetricMismatch {
                expected: expected_metric,
                found: header.metric,
            });
        }

        decode_body(reader, header)
    }
}

/// Reads only the header of a blob.
pub fn read_header(bytes: &[u8]) -> EngineResult<IndexHeader> {
    read_header_from(&mut BlobReader::new(bytes))
}

/// Writes `index` to `path` atomically.
///
/// The blob goes to a temporary file next to `path`, which is then renamed
/// over the destination, so readers never observe a partial file.
pub fn save_index(index: &VectorIndex, path: &Path) -> EngineResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|source| EngineError::io(dir, source))?;

    let bytes = index.to_bytes();
    let mut tmp = NamedTempFile::new_in(dir).map_err(|source| EngineError::io(dir, source))?;
    tmp.write_all(&bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|source| EngineError::io(tmp.path(), source))?;
    tmp.persist(path)
        .map_err(|e| EngineError::io(path, e.error))?;

    tracing::debug!("saved index ({} bytes) to {}", bytes.len(), path.display());
    Ok(())
}

/// Loads an index file, checking it against the serving dimension and metric.
pub fn load_index(
    path: &Path,
    expected_dimension: VectorDimension,
    expected_metric: Metric,
) -> EngineResult<VectorIndex> {
    let mmap = map_file(path)?;
    let index = VectorIndex::from_bytes_checked(&mmap, expected_dimension, expected_metric)?;
    tracing::debug!(
        "loaded {} index with {} documents from {}",
        index.variant_name(),
        index.len(),
        path.display()
    );
    Ok(index)
}

/// Loads an index file without any compatibility check.
pub fn load_index_unchecked(path: &Path) -> EngineResult<VectorIndex> {
    let mmap = map_file(path)?;
    VectorIndex::from_bytes(&mmap)
}

fn map_file(path: &Path) -> EngineResult<Mmap> {
    let file = File::open(path).map_err(|source| EngineError::io(path, source))?;
    let len = file
        .metadata()
        .map_err(|source| EngineError::io(path, source))?
        .len();
    if len == 0 {
        return Err(EngineError::CorruptIndex(format!(
            "{} is empty",
            path.display()
        )));
    }

    // Index files are only ever replaced by rename, never rewritten in place.
    unsafe { Mmap::map(&file) }.map_err(|source| EngineError::io(path, source))
}

fn write_f32s(out: &mut Vec<u8>, values: &[f32]) {
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn read_header_from(reader: &mut BlobReader<'_>) -> EngineResult<IndexHeader> {
    if reader.take(MAGIC_BYTES.len())? != MAGIC_BYTES {
        return Err(EngineError::CorruptIndex(
            "missing index magic bytes".to_string(),
        ));
    }

    let version = reader.u32()?;
    if version != FORMAT_VERSION {
        return Err(EngineError::UnsupportedVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }

    let metric_tag = reader.u8()?;
    let metric = Metric::from_tag(metric_tag)
        .ok_or_else(|| EngineError::CorruptIndex(format!("unknown metric tag {metric_tag}")))?;

    let variant = match reader.u8()? {
        VARIANT_FLAT => "flat",
        VARIANT_PARTITIONED => "partitioned",
        other => {
            return Err(EngineError::CorruptIndex(format!(
                "unknown variant tag {other}"
            )));
        }
    };
    let _reserved = reader.u16()?;

    let dimension = VectorDimension::new(reader.u32()? as usize)
        .map_err(|e| EngineError::CorruptIndex(e.to_string()))?;
    let count = usize::try_from(reader.u64()?)
        .map_err(|_| EngineError::CorruptIndex("document count overflows".to_string()))?;

    let model_len = reader.u16()? as usize;
    let model = std::str::from_utf8(reader.take(model_len)?)
        .map_err(|_| EngineError::CorruptIndex("model tag is not UTF-8".to_string()))?
        .to_string();

    let mut corpus_fingerprint = [0u8; 32];
    corpus_fingerprint.copy_from_slice(reader.take(32)?);

    Ok(IndexHeader {
        version,
        metric,
        variant,
        dimension,
        count,
        model,
        corpus_fingerprint,
    })
}

fn decode_body(mut reader: BlobReader<'_>, header: IndexHeader) -> EngineResult<VectorIndex> {
    let dim = header.dimension.get();
    let row_bytes = BYTES_PER_ID + dim * BYTES_PER_F32;
    if header
        .count
        .checked_mul(row_bytes)
        .is_none_or(|needed| needed > reader.remaining())
    {
        return Err(EngineError::CorruptIndex(format!(
            "blob is too short for {} rows of dimension {dim}",
            header.count
        )));
    }

    let mut store = VectorStore::with_capacity(header.dimension, header.count);
    let mut vector = Vec::with_capacity(dim);
    for _ in 0..header.count {
        let id = DocumentId::new(reader.u64()?);
        reader.f32s(dim, &mut vector)?;
        if !store.push(id, &vector) {
            return Err(EngineError::CorruptIndex(format!(
                "document id {id} appears twice"
            )));
        }
    }

    let provenance = IndexProvenance {
        model: header.model,
        corpus_fingerprint: header.corpus_fingerprint,
    };

    let index = if header.variant == "partitioned" {
        VectorIndex::partitioned(
            decode_partitions(&mut reader, header.metric, store)?,
            provenance,
        )
    } else {
        VectorIndex::flat(FlatIndex::new(header.metric, store), provenance)
    };

    if reader.remaining() != 0 {
        return Err(EngineError::CorruptIndex(format!(
            "{} trailing bytes after index body",
            reader.remaining()
        )));
    }
    Ok(index)
}

fn decode_partitions(
    reader: &mut BlobReader<'_>,
    metric: Metric,
    store: VectorStore,
) -> EngineResult<PartitionedIndex> {
    let dim = store.dimension().get();
    let rows = store.len();

    let partitions = reader.u32()? as usize;
    let probes = reader.u32()? as usize;
    let seed = reader.u64()?;

    if partitions == 0 || partitions > rows.max(1) {
        return Err(EngineError::CorruptIndex(format!(
            "{partitions} partitions for {rows} documents"
        )));
    }
    if partitions
        .checked_mul(dim * BYTES_PER_F32)
        .is_none_or(|needed| needed > reader.remaining())
    {
        return Err(EngineError::CorruptIndex(
            "blob is too short for its centroids".to_string(),
        ));
    }

    let mut centroids = Vec::with_capacity(partitions);
    for _ in 0..partitions {
        let mut centroid = Vec::with_capacity(dim);
        reader.f32s(dim, &mut centroid)?;
        centroids.push(centroid);
    }

    let mut seen = vec![false; rows];
    let mut lists = Vec::with_capacity(partitions);
    for _ in 0..partitions {
        let members = reader.u32()? as usize;
        if members > rows {
            return Err(EngineError::CorruptIndex(format!(
                "partition lists {members} members for {rows} documents"
            )));
        }
        let mut list = Vec::with_capacity(members);
        for _ in 0..members {
            let row = reader.u32()?;
            match seen.get_mut(row as usize) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(EngineError::CorruptIndex(format!(
                        "row {row} belongs to more than one partition"
                    )));
                }
                None => {
                    return Err(EngineError::CorruptIndex(format!(
                        "member row {row} is out of range"
                    )));
                }
            }
            list.push(row);
        }
        lists.push(list);
    }

    if seen.iter().any(|assigned| !assigned) {
        return Err(EngineError::CorruptIndex(
            "some documents belong to no partition".to_string(),
        ));
    }

    Ok(PartitionedIndex::from_parts(
        metric, store, centroids, lists, probes, seed,
    ))
}

/// Bounds-checked little-endian cursor over a blob.
struct BlobReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BlobReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> EngineResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(EngineError::CorruptIndex(format!(
                "blob truncated at byte {} (needed {len} more)",
                self.pos
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> EngineResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> EngineResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> EngineResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> EngineResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> EngineResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// Reads `count` finite f32 values into `out`, replacing its contents.
    fn f32s(&mut self, count: usize, out: &mut Vec<f32>) -> EngineResult<()> {
        let bytes = self.take(count * BYTES_PER_F32)?;
        out.clear();
        for chunk in bytes.chunks_exact(BYTES_PER_F32) {
            let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if !value.is_finite() {
                return Err(EngineError::CorruptIndex(
                    "blob contains a non-finite value".to_string(),
                ));
            }
            out.push(value);
        }
        Ok(())
    }
}

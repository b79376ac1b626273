//! .fspace binary file format reader/writer for feature-space snapshots.
//!
//! Layout: a 64-byte little-endian header, then the mean vector (D f64s) and
//! the D×k basis (row-major) when a reduction model is present, then the
//! n×k projected index (row-major), then a JSON descriptor holding the owner
//! ids, metric, eigenvalues and the preprocessing settings queries must use.
//! All parts are written together so they can never drift apart.

use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::index::{FeatureSpace, Preprocessing, ProjectionIndex};
use crate::similarity::Metric;
use crate::subspace::SubspaceModel;
use crate::types::{Modality, RetrievalError, RetrievalResult};

/// Magic bytes: "FSPC"
const FSPACE_MAGIC: u32 = 0x46535043;

/// Current format version.
const FORMAT_VERSION: u16 = 2;

/// Header size in bytes.
const HEADER_SIZE: usize = 64;

/// Header flag: mean and basis sections are present.
const FLAG_HAS_MODEL: u16 = 0b1;

/// Conventional file extension.
pub const FSPACE_EXTENSION: &str = "fspace";

/// Writer for .fspace files.
pub struct FeatureSpaceWriter;

/// Reader for .fspace files.
pub struct FeatureSpaceReader;

#[derive(Serialize)]
struct SerializedDescriptor<'a> {
    modality: Modality,
    preprocessing: &'a Preprocessing,
    metric: &'a Metric,
    eigenvalues: &'a [f64],
    owner_ids: &'a [String],
}

#[derive(Deserialize)]
struct Descriptor {
    modality: Modality,
    preprocessing: Preprocessing,
    metric: Metric,
    #[serde(default)]
    eigenvalues: Vec<f64>,
    owner_ids: Vec<String>,
}

struct Header {
    flags: u16,
    modality: Modality,
    dims: usize,
    components: usize,
    rows: usize,
    descriptor_len: usize,
    built_at: u64,
}

impl Header {
    fn has_model(&self) -> bool {
        self.flags & FLAG_HAS_MODEL != 0
    }

    /// Total byte length of the body that follows the header.
    fn body_len(&self) -> RetrievalResult<u64> {
        let model = if self.has_model() {
            let basis = checked(self.dims, self.components)?;
            self.dims
                .checked_add(basis)
                .ok_or_else(|| too_large("model"))?
        } else {
            0
        };
        let floats = model
            .checked_add(checked(self.rows, self.components)?)
            .ok_or_else(|| too_large("index"))?;
        (floats as u64)
            .checked_mul(8)
            .and_then(|b| b.checked_add(self.descriptor_len as u64))
            .ok_or_else(|| too_large("body"))
    }
}

fn checked(a: usize, b: usize) -> RetrievalResult<usize> {
    a.checked_mul(b).ok_or_else(|| too_large("matrix"))
}

fn too_large(what: &str) -> RetrievalError {
    RetrievalError::Storage(format!("Header declares an impossibly large {what} section"))
}

/// Sibling path used while a save is in flight.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl FeatureSpaceWriter {
    /// Write a feature space to a file.
    ///
    /// Data goes to a temporary sibling first and is renamed over `path`, so a
    /// reader never sees a half-written file.
    pub fn write_to_file(space: &FeatureSpace, path: &Path) -> RetrievalResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = temp_path(path);
        {
            let file = std::fs::File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            Self::write_to(space, &mut writer)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;

        tracing::info!(
            "Saved {} feature space ({} vectors) to {}",
            space.modality,
            space.index.len(),
            path.display()
        );
        Ok(())
    }

    /// Write a feature space to any writer.
    pub fn write_to<W: Write>(space: &FeatureSpace, writer: &mut W) -> RetrievalResult<()> {
        let empty: &[f64] = &[];
        let descriptor = serde_json::to_vec(&SerializedDescriptor {
            modality: space.modality,
            preprocessing: &space.preprocessing,
            metric: &space.metric,
            eigenvalues: space.model.as_ref().map(|m| m.eigenvalues()).unwrap_or(empty),
            owner_ids: space.index.owner_ids(),
        })
        .map_err(|e| RetrievalError::Storage(format!("Serialization failed: {e}")))?;

        let flags = if space.model.is_some() { FLAG_HAS_MODEL } else { 0 };

        // Write header
        let mut header = [0u8; HEADER_SIZE];
        write_u32(&mut header[0..4], FSPACE_MAGIC);
        write_u16(&mut header[4..6], FORMAT_VERSION);
        write_u16(&mut header[6..8], flags);
        header[8] = space.modality.code();
        write_u64(&mut header[16..24], space.input_dim() as u64);
        write_u64(&mut header[24..32], space.index.dim() as u64);
        write_u64(&mut header[32..40], space.index.len() as u64);
        write_u64(&mut header[40..48], descriptor.len() as u64);
        write_u64(&mut header[48..56], space.built_at);
        writer.write_all(&header)?;

        if let Some(model) = &space.model {
            write_f64s(writer, model.mean().iter())?;
            write_f64s(writer, model.basis().iter())?;
        }
        write_f64s(writer, space.index.projected().iter())?;
        writer.write_all(&descriptor)?;

        Ok(())
    }
}

impl FeatureSpaceReader {
    /// Read a feature space from a file.
    pub fn read_from_file(path: &Path) -> RetrievalResult<FeatureSpace> {
        let file = std::fs::File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;
        let expected = header.body_len()? + HEADER_SIZE as u64;
        if expected != file_len {
            return Err(RetrievalError::Storage(format!(
                "File is {file_len} bytes but header declares {expected}"
            )));
        }

        let space = read_body(&header, &mut reader)?;
        tracing::info!(
            "Loaded {} feature space ({} vectors, {} components) from {}",
            space.modality,
            space.index.len(),
            space.index.dim(),
            path.display()
        );
        Ok(space)
    }

    /// Read a feature space from any reader.
    pub fn read_from<R: Read>(reader: &mut R) -> RetrievalResult<FeatureSpace> {
        let header = read_header(reader)?;
        header.body_len()?;
        read_body(&header, reader)
    }
}

fn read_header<R: Read>(reader: &mut R) -> RetrievalResult<Header> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let magic = read_u32(&header[0..4]);
    if magic != FSPACE_MAGIC {
        return Err(RetrievalError::Storage(format!(
            "Invalid magic: expected 0x{FSPACE_MAGIC:08X}, got 0x{magic:08X}"
        )));
    }

    let version = read_u16(&header[4..6]);
    if version != FORMAT_VERSION {
        return Err(RetrievalError::Storage(format!(
            "Unsupported version: {version}"
        )));
    }

    let modality = Modality::from_code(header[8]).ok_or_else(|| {
        RetrievalError::Storage(format!("Unknown modality code: {}", header[8]))
    })?;

    Ok(Header {
        flags: read_u16(&header[6..8]),
        modality,
        dims: to_usize(read_u64(&header[16..24]))?,
        components: to_usize(read_u64(&header[24..32]))?,
        rows: to_usize(read_u64(&header[32..40]))?,
        descriptor_len: to_usize(read_u64(&header[40..48]))?,
        built_at: read_u64(&header[48..56]),
    })
}

fn read_body<R: Read>(header: &Header, reader: &mut R) -> RetrievalResult<FeatureSpace> {
    let model_parts = if header.has_model() {
        let mean = read_f64s(reader, header.dims)?;
        let basis = read_f64s(reader, checked(header.dims, header.components)?)?;
        Some((mean, basis))
    } else {
        None
    };
    let projected = read_f64s(reader, checked(header.rows, header.components)?)?;

    let mut payload = Vec::new();
    reader
        .take(header.descriptor_len as u64)
        .read_to_end(&mut payload)?;
    if payload.len() != header.descriptor_len {
        return Err(RetrievalError::Storage(
            "Descriptor section is truncated".to_string(),
        ));
    }
    let descriptor: Descriptor = serde_json::from_slice(&payload)
        .map_err(|e| RetrievalError::Storage(format!("Deserialization failed: {e}")))?;

    if descriptor.modality != header.modality {
        return Err(RetrievalError::Storage(format!(
            "Header says {} but descriptor says {}",
            header.modality, descriptor.modality
        )));
    }

    let model = match model_parts {
        Some((mean, basis)) => {
            let basis = Array2::from_shape_vec((header.dims, header.components), basis)
                .map_err(|e| RetrievalError::Storage(format!("Bad basis shape: {e}")))?;
            Some(SubspaceModel::from_parts(
                Array1::from(mean),
                basis,
                descriptor.eigenvalues,
            )?)
        }
        None => None,
    };

    let projected = Array2::from_shape_vec((header.rows, header.components), projected)
        .map_err(|e| RetrievalError::Storage(format!("Bad index shape: {e}")))?;
    let index = ProjectionIndex::new(projected, descriptor.owner_ids)?;

    if descriptor.preprocessing.modality() != header.modality {
        return Err(RetrievalError::Storage(format!(
            "{} space carries {} preprocessing settings",
            header.modality,
            descriptor.preprocessing.modality()
        )));
    }

    FeatureSpace::with_timestamp(
        descriptor.preprocessing,
        descriptor.metric,
        model,
        index,
        header.built_at,
    )
}

fn to_usize(v: u64) -> RetrievalResult<usize> {
    usize::try_from(v).map_err(|_| too_large("field"))
}

fn write_f64s<'a, W, I>(writer: &mut W, values: I) -> RetrievalResult<()>
where
    W: Write,
    I: Iterator<Item = &'a f64>,
{
    for v in values {
        writer.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn read_f64s<R: Read>(reader: &mut R, count: usize) -> RetrievalResult<Vec<f64>> {
    // Capacity is capped so a corrupt header cannot force a huge allocation.
    let mut out = Vec::with_capacity(count.min(1 << 16));
    let mut buf = [0u8; 8];
    for _ in 0..count {
        reader.read_exact(&mut buf)?;
        out.push(f64::from_le_bytes(buf));
    }
    Ok(out)
}

fn write_u16(buf: &mut [u8], val: u16) {
    buf[..2].copy_from_slice(&val.to_le_bytes());
}
fn write_u32(buf: &mut [u8], val: u32) {
    buf[..4].copy_from_slice(&val.to_le_bytes());
}
fn write_u64(buf: &mut [u8], val: u64) {
    buf[..8].copy_from_slice(&val.to_le_bytes());
}
fn read_u16(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}
fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}
fn read_u64(buf: &[u8]) -> u64 {
    u64::from_le_bytes([buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7]])
}

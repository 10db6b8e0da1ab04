//! Access to RPN-style "standard file" record containers.
//!
//! A standard file is a directory of named records, each holding a 2-D
//! gridded field plus the identifying codes (variable code, level and
//! forecast-hour codes, grid descriptors) the conversion needs. This module
//! reads the container subset the converter consumes: a fixed header, a
//! record directory, and per-record data blocks holding IEEE floats or
//! packed 16-bit integers. The full upstream format is read by the librmn
//! library, for which no Rust binding exists; this module is the seam where
//! one would go.
use std::{
    fmt::Display,
    fs::File,
    io::{Read, Seek},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Duration, Utc};
use ndarray::{Array2, ShapeBuilder};

pub mod constants;

pub type StdfileResult<T> = Result<T, StdfileError>;

#[derive(Debug, thiserror::Error)]
pub enum StdfileError {
    #[error("Error reading from standard file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("{descr} value did not match expected: expected {expected}, got {actual}")]
    StaticValueMismatch {
        descr: &'static str,
        expected: f64,
        actual: f64,
    },
    #[error("Invalid {pointer_descr} pointer: {inner}")]
    InvalidPointer {
        pointer_descr: &'static str,
        inner: PointerError,
    },
    #[error("Could not decode bytes as a UTF-8/ASCII string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("Record '{nomvar}' data block has {actual} bytes, expected {expected}")]
    DataLengthMismatch {
        nomvar: String,
        expected: usize,
        actual: usize,
    },
    #[error("Unknown data-kind code {0} in record directory")]
    UnknownDataKind(i32),
    #[error("Record origin date {0} is not representable as a timestamp")]
    InvalidTimestamp(i64),
    #[error("No record with variable code '{nomvar}' in {}", .path.display())]
    RecordNotFound { path: PathBuf, nomvar: String },
    #[error("Reading {0} is not supported")]
    Unsupported(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PointerError {
    #[error("pointer is negative")]
    Negative,
    #[error("pointer overlaps the file header")]
    OverlapsHeader,
    #[error("pointer is not on a word boundary")]
    NotOnWord,
    #[error("pointer runs past the end of the file")]
    PastEndOfFile,
}

/// How a record's data block encodes its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum DataKind {
    /// IEEE 754 32-bit floats, big endian.
    #[strum(serialize = "f32")]
    Float32,
    /// 16-bit integers with an f32 scale and offset prologue; each value
    /// decodes as `offset + scale * raw`.
    #[strum(serialize = "i16")]
    PackedInt16,
}

impl DataKind {
    fn from_code(code: i32) -> StdfileResult<Self> {
        match code {
            constants::DATYP_IEEE32 => Ok(Self::Float32),
            constants::DATYP_PACKED16 => Ok(Self::PackedInt16),
            _ => Err(StdfileError::UnknownDataKind(code)),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Float32 => constants::DATYP_IEEE32,
            Self::PackedInt16 => constants::DATYP_PACKED16,
        }
    }

    /// Bytes a data block of this kind occupies for `npts` values.
    fn block_nbytes(&self, npts: usize) -> usize {
        match self {
            Self::Float32 => npts * 4,
            // scale + offset prologue, then the packed values
            Self::PackedInt16 => 8 + npts * 2,
        }
    }
}

/// One entry of a standard file's record directory.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordInfo {
    /// Variable code, up to four characters (e.g. `PR`, `^^`).
    pub nomvar: String,
    /// Type-of-field code (e.g. `P` for forecast fields).
    pub typvar: String,
    /// Free-form record label.
    pub etiket: String,
    /// Origin (initialization) time of the model run.
    pub dateo: DateTime<Utc>,
    /// Model timestep length in seconds.
    pub deet: i32,
    /// Number of timesteps since the origin time.
    pub npas: i32,
    /// Level code.
    pub ip1: i32,
    /// Forecast-hour code.
    pub ip2: i32,
    /// User-defined code.
    pub ip3: i32,
    pub ni: usize,
    pub nj: usize,
    pub nk: usize,
    /// Grid type character (e.g. `Z` for variable-resolution grids).
    pub grtyp: char,
    pub ig1: i32,
    pub ig2: i32,
    pub ig3: i32,
    pub ig4: i32,
    pub kind: DataKind,
    data_pointer: u64,
    data_nbytes: usize,
}

impl RecordInfo {
    pub fn shape(&self) -> (usize, usize) {
        (self.ni, self.nj)
    }

    /// The time this record is valid at: origin time plus elapsed steps.
    pub fn valid_time(&self) -> DateTime<Utc> {
        self.dateo + Duration::seconds(self.deet as i64 * self.npas as i64)
    }
}

impl Display for RecordInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:4} {:2} ip1={} ip2={} {}x{}x{}",
            self.nomvar, self.typvar, self.ip1, self.ip2, self.ni, self.nj, self.nk
        )
    }
}

/// A record with its data decoded to floats.
///
/// `data` has shape `(ni, nj)`; values are stored column major in the file,
/// matching the Fortran layout of the upstream library.
#[derive(Debug, Clone)]
pub struct Record {
    pub info: RecordInfo,
    pub data: Array2<f32>,
}

/// An open standard file: the parsed record directory plus the path for
/// on-demand data reads.
#[derive(Debug)]
pub struct StandardFile {
    path: PathBuf,
    file_nbytes: u64,
    records: Vec<RecordInfo>,
}

impl StandardFile {
    /// Open a standard file and parse its record directory.
    ///
    /// No record data is read; data blocks are decoded on demand by
    /// [`read`](Self::read) and [`read_record`](Self::read_record).
    ///
    /// # Returns
    /// A [`Result`] with the open file. An `Err` is returned if the file
    /// cannot be opened, its magic number or container revision do not
    /// match, the directory pointer is invalid, or a directory entry
    /// carries an unknown data-kind code.
    pub fn open(path: &Path) -> StdfileResult<Self> {
        let mut f = File::open(path)?;
        let file_nbytes = f.metadata()?.len();
        let reader = ByteReader::default();

        let magic = reader.read_i32(&mut f)?;
        if magic != constants::MAGIC {
            return Err(StdfileError::StaticValueMismatch {
                descr: "magic",
                expected: constants::MAGIC.into(),
                actual: magic.into(),
            });
        }

        let version = reader.read_f64(&mut f)?;
        if (version - constants::VERSION).abs() > 0.01 {
            return Err(StdfileError::StaticValueMismatch {
                descr: "container revision",
                expected: constants::VERSION,
                actual: version,
            });
        }

        let dir_pointer = reader.read_i32(&mut f)?;
        check_pointer("directory", dir_pointer.into(), file_nbytes)?;

        let num_records = reader.read_i32(&mut f)?;
        if num_records < 0 {
            return Err(StdfileError::InvalidPointer {
                pointer_descr: "record count",
                inner: PointerError::Negative,
            });
        }

        f.seek(std::io::SeekFrom::Start(dir_pointer as u64))?;
        let mut records = Vec::with_capacity(num_records as usize);
        for _ in 0..num_records {
            records.push(Self::read_dir_entry(&reader, &mut f)?);
        }

        Ok(Self {
            path: path.to_owned(),
            file_nbytes,
            records,
        })
    }

    fn read_dir_entry(reader: &ByteReader, f: &mut File) -> StdfileResult<RecordInfo> {
        let nomvar = reader.read_string(f, constants::NOMVAR_NBYTES)?;
        let typvar = reader.read_string(f, constants::TYPVAR_NBYTES)?;
        let etiket = reader.read_string(f, constants::ETIKET_NBYTES)?;
        let dateo_secs = reader.read_i64(f)?;
        let dateo = DateTime::from_timestamp(dateo_secs, 0)
            .ok_or(StdfileError::InvalidTimestamp(dateo_secs))?;
        let deet = reader.read_i32(f)?;
        let npas = reader.read_i32(f)?;
        let ip1 = reader.read_i32(f)?;
        let ip2 = reader.read_i32(f)?;
        let ip3 = reader.read_i32(f)?;
        let ni = read_extent(reader, f)?;
        let nj = read_extent(reader, f)?;
        let nk = read_extent(reader, f)?;
        let grtyp = reader.read_bytes(f, 1)?[0] as char;
        let ig1 = reader.read_i32(f)?;
        let ig2 = reader.read_i32(f)?;
        let ig3 = reader.read_i32(f)?;
        let ig4 = reader.read_i32(f)?;
        let kind = DataKind::from_code(reader.read_i32(f)?)?;
        let data_pointer = reader.read_i32(f)?;
        let data_nbytes = reader.read_i32(f)?;
        if data_pointer < 0 || data_nbytes < 0 {
            return Err(StdfileError::InvalidPointer {
                pointer_descr: "data",
                inner: PointerError::Negative,
            });
        }

        Ok(RecordInfo {
            nomvar,
            typvar,
            etiket,
            dateo,
            deet,
            npas,
            ip1,
            ip2,
            ip3,
            ni,
            nj,
            nk,
            grtyp,
            ig1,
            ig2,
            ig3,
            ig4,
            kind,
            data_pointer: data_pointer as u64,
            data_nbytes: data_nbytes as usize,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The parsed directory, in file order.
    pub fn records(&self) -> &[RecordInfo] {
        &self.records
    }

    /// Whether at least one record carries the given variable code.
    pub fn contains(&self, nomvar: &str) -> bool {
        self.find(nomvar).is_some()
    }

    /// The first directory entry with the given variable code, if any.
    pub fn find(&self, nomvar: &str) -> Option<&RecordInfo> {
        self.records.iter().find(|r| r.nomvar == nomvar)
    }

    /// Locate the first record with the given variable code and decode its
    /// data.
    pub fn read(&self, nomvar: &str) -> StdfileResult<Record> {
        let info = self
            .find(nomvar)
            .ok_or_else(|| StdfileError::RecordNotFound {
                path: self.path.clone(),
                nomvar: nomvar.to_owned(),
            })?;
        self.read_record(info)
    }

    /// Decode the data block of a specific directory entry.
    ///
    /// # Returns
    /// A [`Result`] with the decoded [`Record`]. An `Err` is returned if:
    ///
    /// * the record spans more than one vertical level (`nk != 1`, outside
    ///   this container subset),
    /// * the data pointer runs past the end of the file,
    /// * the block length does not match the directory shape, or
    /// * reading the bytes fails.
    pub fn read_record(&self, info: &RecordInfo) -> StdfileResult<Record> {
        if info.nk != 1 {
            return Err(StdfileError::Unsupported(format!(
                "record '{}' with nk = {}",
                info.nomvar, info.nk
            )));
        }

        check_pointer("data", info.data_pointer as i64, self.file_nbytes)?;
        if info.data_pointer + info.data_nbytes as u64 > self.file_nbytes {
            return Err(StdfileError::InvalidPointer {
                pointer_descr: "data",
                inner: PointerError::PastEndOfFile,
            });
        }

        let npts = info.ni * info.nj;
        let expected = info.kind.block_nbytes(npts);
        if info.data_nbytes != expected {
            return Err(StdfileError::DataLengthMismatch {
                nomvar: info.nomvar.clone(),
                expected,
                actual: info.data_nbytes,
            });
        }

        let mut f = File::open(&self.path)?;
        f.seek(std::io::SeekFrom::Start(info.data_pointer))?;
        let mut buf = vec![0u8; info.data_nbytes];
        f.read_exact(&mut buf)?;

        let values = decode_values(&buf, info.kind);
        // Column major, to match the Fortran layout of the upstream library.
        let data = Array2::from_shape_vec((info.ni, info.nj).f(), values)
            .expect("decoded value count was validated against the directory shape");

        Ok(Record {
            info: info.clone(),
            data,
        })
    }
}

fn read_extent(reader: &ByteReader, f: &mut File) -> StdfileResult<usize> {
    let n = reader.read_i32(f)?;
    if n < 0 {
        return Err(StdfileError::InvalidPointer {
            pointer_descr: "array extent",
            inner: PointerError::Negative,
        });
    }
    Ok(n as usize)
}

fn check_pointer(descr: &'static str, pointer: i64, file_nbytes: u64) -> StdfileResult<()> {
    let err = |inner| StdfileError::InvalidPointer {
        pointer_descr: descr,
        inner,
    };
    if pointer < 0 {
        return Err(err(PointerError::Negative));
    }
    if (pointer as u64) < constants::HEADER_NBYTES as u64 {
        return Err(err(PointerError::OverlapsHeader));
    }
    if pointer % 4 != 0 {
        return Err(err(PointerError::NotOnWord));
    }
    if pointer as u64 > file_nbytes {
        return Err(err(PointerError::PastEndOfFile));
    }
    Ok(())
}

fn decode_values(buf: &[u8], kind: DataKind) -> Vec<f32> {
    match kind {
        DataKind::Float32 => buf
            .chunks_exact(4)
            .map(|b| f32::from_be_bytes(b.try_into().expect("chunks_exact yields 4-byte chunks")))
            .collect(),
        DataKind::PackedInt16 => {
            let scale = f32::from_be_bytes(buf[0..4].try_into().expect("prologue has 8 bytes"));
            let offset = f32::from_be_bytes(buf[4..8].try_into().expect("prologue has 8 bytes"));
            buf[8..]
                .chunks_exact(2)
                .map(|b| {
                    let raw =
                        i16::from_be_bytes(b.try_into().expect("chunks_exact yields 2-byte chunks"));
                    offset + scale * raw as f32
                })
                .collect()
        }
    }
}

/// Reads the primitive values a standard file is built from.
///
/// Standard files are big endian regardless of host byte order; the flag
/// exists so a little-endian variant could be handled without touching the
/// decode paths.
pub(crate) struct ByteReader {
    is_big_endian: bool,
}

impl Default for ByteReader {
    fn default() -> Self {
        Self { is_big_endian: true }
    }
}

impl ByteReader {
    /// Read four bytes and interpret them as an i32
    pub(crate) fn read_i32(&self, f: &mut File) -> StdfileResult<i32> {
        let mut buf = [0; 4];
        f.read_exact(&mut buf)?;

        if self.is_big_endian {
            Ok(i32::from_be_bytes(buf))
        } else {
            Ok(i32::from_le_bytes(buf))
        }
    }

    /// Read eight bytes and interpret them as an i64
    pub(crate) fn read_i64(&self, f: &mut File) -> StdfileResult<i64> {
        let mut buf = [0; 8];
        f.read_exact(&mut buf)?;

        if self.is_big_endian {
            Ok(i64::from_be_bytes(buf))
        } else {
            Ok(i64::from_le_bytes(buf))
        }
    }

    /// Read eight bytes and interpret them as an f64
    pub(crate) fn read_f64(&self, f: &mut File) -> StdfileResult<f64> {
        let mut buf = [0; 8];
        f.read_exact(&mut buf)?;

        if self.is_big_endian {
            Ok(f64::from_be_bytes(buf))
        } else {
            Ok(f64::from_le_bytes(buf))
        }
    }

    /// Read `string_length` bytes and interpret them as a UTF-8 string.
    ///
    /// Fields shorter than their reserved width are stored space padded, so
    /// trailing nulls and spaces are removed from the decoded value.
    pub(crate) fn read_string(&self, f: &mut File, string_length: usize) -> StdfileResult<String> {
        let buf = self.read_bytes(f, string_length)?;
        let inull = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        let s = String::from_utf8(buf[..inull].to_vec())?;
        Ok(s.trim_end().to_string())
    }

    pub(crate) fn read_bytes(&self, f: &mut File, nbytes: usize) -> StdfileResult<Vec<u8>> {
        let mut buf = vec![0; nbytes];
        f.read_exact(&mut buf)?;
        Ok(buf)
    }
}

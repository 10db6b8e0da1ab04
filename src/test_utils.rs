//! Support code for tests that need standard files on disk.
//!
//! Real standard files come out of the model post-processing chain and are
//! too large to ship as fixtures, so tests build their own with
//! [`StandardFileBuilder`], which emits the same container layout
//! [`crate::stdfile`] reads.
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::stdfile::constants;

/// A unique path in the system temp directory for one test's output.
///
/// Uniqueness across tests comes from `file_name`; pick a distinct stem per
/// test so parallel test threads do not collide.
pub fn scratch_path(file_name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rpncdf-rs-{}-{file_name}", std::process::id()))
}

/// A unique, created directory in the system temp directory.
///
/// For tests whose files must keep meaningful names (e.g. the
/// `mYYYYMMDDHH_HHH` model naming), which [`scratch_path`] would mangle.
pub fn scratch_dir(stem: &str) -> PathBuf {
    let d = std::env::temp_dir().join(format!("rpncdf-rs-{}-{stem}", std::process::id()));
    std::fs::create_dir_all(&d).expect("could not create scratch directory");
    d
}

/// One record to be written by [`StandardFileBuilder`].
///
/// [`TestRecord::new`] fills every identifying field with an innocuous
/// default; tests override the fields they actually assert on.
#[derive(Debug, Clone)]
pub struct TestRecord {
    pub nomvar: String,
    pub typvar: String,
    pub etiket: String,
    pub dateo_secs: i64,
    pub deet: i32,
    pub npas: i32,
    pub ip1: i32,
    pub ip2: i32,
    pub ip3: i32,
    pub grtyp: char,
    pub ig: [i32; 4],
    /// Store as packed 16-bit integers instead of IEEE floats.
    pub packed: bool,
    pub data: Array2<f32>,
}

impl TestRecord {
    pub fn new(nomvar: &str, data: Array2<f32>) -> Self {
        Self {
            nomvar: nomvar.to_owned(),
            typvar: "P".to_owned(),
            etiket: "TESTDATA".to_owned(),
            dateo_secs: 0,
            deet: 3600,
            npas: 0,
            ip1: 0,
            ip2: 0,
            ip3: 0,
            grtyp: 'Z',
            ig: [0; 4],
            packed: false,
            data,
        }
    }
}

/// Grid descriptor records (`^^` latitudes, `>>` longitudes) with the
/// shapes the upstream library uses: `(1, nlat)` and `(nlon, 1)`.
pub fn descriptor_records(lats: &[f32], lons: &[f32]) -> (TestRecord, TestRecord) {
    let lat_data = Array2::from_shape_vec((1, lats.len()), lats.to_vec())
        .expect("shape matches the input length");
    let lon_data = Array2::from_shape_vec((lons.len(), 1), lons.to_vec())
        .expect("shape matches the input length");
    let mut lat_rec = TestRecord::new("^^", lat_data);
    lat_rec.typvar = "X".to_owned();
    let mut lon_rec = TestRecord::new(">>", lon_data);
    lon_rec.typvar = "X".to_owned();
    (lat_rec, lon_rec)
}

/// Writes standard-file containers for tests.
#[derive(Debug, Default)]
pub struct StandardFileBuilder {
    records: Vec<TestRecord>,
}

// nomvar + typvar + etiket + dateo + 8 i32 codes/extents + grtyp + 4 ig
// + datyp + data pointer + data length
const DIR_ENTRY_NBYTES: usize = constants::NOMVAR_NBYTES
    + constants::TYPVAR_NBYTES
    + constants::ETIKET_NBYTES
    + 8
    + 4 * 8
    + 1
    + 4 * 4
    + 4
    + 4
    + 4;

impl StandardFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(mut self, rec: TestRecord) -> Self {
        self.records.push(rec);
        self
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let dir_pointer = constants::HEADER_NBYTES;
        let dir_nbytes = DIR_ENTRY_NBYTES * self.records.len();

        // Data blocks sit after the directory, each aligned to a word
        // boundary as the reader requires.
        let mut offsets = Vec::with_capacity(self.records.len());
        let mut blocks: Vec<Vec<u8>> = Vec::with_capacity(self.records.len());
        let mut cursor = align4(dir_pointer + dir_nbytes);
        for rec in &self.records {
            let block = encode_block(rec);
            offsets.push(cursor);
            cursor = align4(cursor + block.len());
            blocks.push(block);
        }

        let mut out = Vec::with_capacity(cursor);
        push_i32(&mut out, constants::MAGIC);
        push_f64(&mut out, constants::VERSION);
        push_i32(&mut out, dir_pointer as i32);
        push_i32(&mut out, self.records.len() as i32);

        for (rec, (&offset, block)) in self.records.iter().zip(offsets.iter().zip(&blocks)) {
            push_str(&mut out, &rec.nomvar, constants::NOMVAR_NBYTES);
            push_str(&mut out, &rec.typvar, constants::TYPVAR_NBYTES);
            push_str(&mut out, &rec.etiket, constants::ETIKET_NBYTES);
            push_i64(&mut out, rec.dateo_secs);
            push_i32(&mut out, rec.deet);
            push_i32(&mut out, rec.npas);
            push_i32(&mut out, rec.ip1);
            push_i32(&mut out, rec.ip2);
            push_i32(&mut out, rec.ip3);
            push_i32(&mut out, rec.data.nrows() as i32);
            push_i32(&mut out, rec.data.ncols() as i32);
            push_i32(&mut out, 1); // nk
            out.push(rec.grtyp as u8);
            for ig in rec.ig {
                push_i32(&mut out, ig);
            }
            let datyp = if rec.packed {
                constants::DATYP_PACKED16
            } else {
                constants::DATYP_IEEE32
            };
            push_i32(&mut out, datyp);
            push_i32(&mut out, offset as i32);
            push_i32(&mut out, block.len() as i32);
        }

        for (&offset, block) in offsets.iter().zip(&blocks) {
            out.resize(offset, 0);
            out.extend_from_slice(block);
        }
        out.resize(cursor, 0);

        std::fs::write(path, out)
    }
}

fn encode_block(rec: &TestRecord) -> Vec<u8> {
    // Column major, matching the Fortran layout the reader expects.
    let values: Vec<f32> = rec.data.t().iter().copied().collect();

    let mut block = Vec::new();
    if rec.packed {
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let scale = if max > min { (max - min) / 32767.0 } else { 1.0 };
        push_f32(&mut block, scale);
        push_f32(&mut block, min);
        for v in values {
            let raw = ((v - min) / scale).round() as i16;
            block.extend_from_slice(&raw.to_be_bytes());
        }
    } else {
        for v in values {
            push_f32(&mut block, v);
        }
    }
    block
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

fn push_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_i64(out: &mut Vec<u8>, v: i64) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_f32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_f64(out: &mut Vec<u8>, v: f64) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_str(out: &mut Vec<u8>, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    out.extend_from_slice(&bytes[..n]);
    // Space padded, like the upstream Fortran character fields
    out.resize(out.len() + (width - n), b' ');
}

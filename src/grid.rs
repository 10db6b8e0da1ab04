//! Latitude/longitude fields from a standard file's grid descriptors.
//!
//! Gridded records do not carry coordinates themselves; the grid is stored
//! once per file in two descriptor records, `^^` holding the latitude axis
//! with shape `(1, nlat)` and `>>` holding the longitude axis with shape
//! `(nlon, 1)`. The upstream library turns these into full 2-D coordinate
//! fields; this module does the same by broadcasting the two axes.
use std::path::PathBuf;

use ndarray::Array2;

use crate::stdfile::{StandardFile, StdfileError};

/// Variable code of the latitude descriptor record.
pub const LAT_DESCRIPTOR: &str = "^^";
/// Variable code of the longitude descriptor record.
pub const LON_DESCRIPTOR: &str = ">>";

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("File {} has no '{nomvar}' grid descriptor record, cannot georeference it", .path.display())]
    MissingDescriptor { path: PathBuf, nomvar: &'static str },
    #[error("Descriptor record '{nomvar}' has shape {ni}x{nj}, expected a single row or column")]
    OddDescriptorShape {
        nomvar: &'static str,
        ni: usize,
        nj: usize,
    },
    #[error("Error reading grid descriptor record")]
    ReadError(#[from] StdfileError),
}

/// 2-D coordinate fields for every gridded record in one file.
///
/// Both arrays have shape `(nlon, nlat)`, the same layout as the data
/// records they georeference.
#[derive(Debug, Clone)]
pub struct GridCoords {
    pub lat: Array2<f32>,
    pub lon: Array2<f32>,
}

impl GridCoords {
    /// Build the coordinate fields from a file's descriptor records.
    ///
    /// # Returns
    /// A [`Result`] with the broadcast coordinates. An `Err` is returned if
    /// either descriptor record is absent, cannot be read, or does not have
    /// the single-row/single-column shape descriptors are stored with.
    pub fn from_stdfile(file: &StandardFile) -> Result<Self, GridError> {
        let lat_axis = Self::descriptor_axis(file, LAT_DESCRIPTOR)?;
        let lon_axis = Self::descriptor_axis(file, LON_DESCRIPTOR)?;

        let (nlat, nlon) = (lat_axis.len(), lon_axis.len());
        let lat = Array2::from_shape_fn((nlon, nlat), |(_, j)| lat_axis[j]);
        let lon = Array2::from_shape_fn((nlon, nlat), |(i, _)| lon_axis[i]);

        Ok(Self { lat, lon })
    }

    fn descriptor_axis(file: &StandardFile, nomvar: &'static str) -> Result<Vec<f32>, GridError> {
        let info = file
            .find(nomvar)
            .ok_or_else(|| GridError::MissingDescriptor {
                path: file.path().to_owned(),
                nomvar,
            })?;
        if info.ni != 1 && info.nj != 1 {
            return Err(GridError::OddDescriptorShape {
                nomvar,
                ni: info.ni,
                nj: info.nj,
            });
        }
        let rec = file.read_record(info)?;
        Ok(rec.data.iter().copied().collect())
    }

    pub fn nlat(&self) -> usize {
        self.lat.ncols()
    }

    pub fn nlon(&self) -> usize {
        self.lat.nrows()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use crate::test_utils::{descriptor_records, scratch_path, StandardFileBuilder, TestRecord};

    use super::*;

    #[test]
    fn test_broadcasts_descriptor_axes() {
        let path = scratch_path("grid-broadcast");
        let (lat_rec, lon_rec) = descriptor_records(&[45.0, 46.0, 47.0], &[270.0, 271.0]);
        StandardFileBuilder::new()
            .record(lat_rec)
            .record(lon_rec)
            .write(&path)
            .unwrap();

        let f = StandardFile::open(&path).unwrap();
        let coords = GridCoords::from_stdfile(&f).unwrap();
        assert_eq!(coords.nlat(), 3);
        assert_eq!(coords.nlon(), 2);
        assert_eq!(
            coords.lat,
            array![[45.0, 46.0, 47.0], [45.0, 46.0, 47.0]]
        );
        assert_eq!(
            coords.lon,
            array![[270.0, 270.0, 270.0], [271.0, 271.0, 271.0]]
        );

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_descriptor_is_an_error() {
        let path = scratch_path("grid-missing-descriptor");
        StandardFileBuilder::new()
            .record(TestRecord::new("TT", array![[1.0]]))
            .write(&path)
            .unwrap();

        let f = StandardFile::open(&path).unwrap();
        let err = GridCoords::from_stdfile(&f).unwrap_err();
        assert!(matches!(
            err,
            GridError::MissingDescriptor {
                nomvar: LAT_DESCRIPTOR,
                ..
            }
        ));

        std::fs::remove_file(&path).unwrap();
    }
}

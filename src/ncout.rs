//! NetCDF output files and the shape-based dimension matching that places
//! extracted arrays onto them.
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::ArrayViewD;
use netcdf::Extents;

use crate::utils;

#[derive(Debug, thiserror::Error)]
pub enum NcWriteError {
    #[error("netCDF error writing {}: {inner}", .path.display())]
    Netcdf {
        path: PathBuf,
        inner: netcdf::Error,
    },
    #[error("Axis {axis} of variable '{varname}' has length {len}, which matches no unused dimension")]
    NoMatchingDimension {
        varname: String,
        axis: usize,
        len: usize,
    },
    #[error("Could not convert data for variable '{varname}' to a contiguous slice")]
    NotSliceable { varname: String },
}

/// An output dataset under construction.
///
/// Dimensions are remembered in declaration order so that variables can be
/// placed by matching their array shape against dimension lengths, which is
/// the only association a standard-file record offers.
pub struct NcOutput {
    file: netcdf::FileMut,
    path: PathBuf,
    dims: Vec<(String, usize)>,
}

impl NcOutput {
    /// Create the dataset and write the global attributes and time
    /// bookkeeping every output carries:
    ///
    /// * `history`: creation timestamp and user;
    /// * `datetime`: the valid (forecast) time as text;
    /// * a length-1 `time` dimension with a `datetime` variable holding the
    ///   valid time as Unix seconds.
    pub fn create(path: &Path, valid_time: DateTime<Utc>) -> Result<Self, NcWriteError> {
        let mut file = netcdf::create(path).map_err(|e| NcWriteError::Netcdf {
            path: path.to_owned(),
            inner: e,
        })?;

        let nc_err = |inner| NcWriteError::Netcdf {
            path: path.to_owned(),
            inner,
        };

        let history = format!(
            "Created on {} by {}",
            Utc::now().format("%Y-%m-%dT%H:%M:%S"),
            utils::current_user()
        );
        file.add_attribute("history", history.as_str())
            .map_err(nc_err)?;
        file.add_attribute(
            "datetime",
            format!("{} UTC", valid_time.format("%Y-%m-%d %H:%M:%S")).as_str(),
        )
        .map_err(nc_err)?;

        file.add_dimension("time", 1).map_err(nc_err)?;
        let mut var = file
            .add_variable::<i64>("datetime", &["time"])
            .map_err(nc_err)?;
        var.put_values(&[valid_time.timestamp()], Extents::All)
            .map_err(nc_err)?;
        var.put_attribute("units", "s").map_err(nc_err)?;
        var.put_attribute("long_name", "Epoch Unix Time Stamp (s)")
            .map_err(nc_err)?;

        Ok(Self {
            file,
            path: path.to_owned(),
            dims: vec![("time".to_owned(), 1)],
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_dimension(&mut self, name: &str, len: usize) -> Result<(), NcWriteError> {
        self.file
            .add_dimension(name, len)
            .map_err(|e| NcWriteError::Netcdf {
                path: self.path.clone(),
                inner: e,
            })?;
        self.dims.push((name.to_owned(), len));
        Ok(())
    }

    pub fn contains_variable(&self, name: &str) -> bool {
        self.file.variable(name).is_some()
    }

    /// Create a variable, placing each array axis on a declared dimension
    /// by length, and write its data and `units`/`long_name` attributes.
    ///
    /// Matching by length alone cannot tell apart dimensions of equal
    /// size: each axis takes the first not-yet-used dimension that fits,
    /// which is unambiguous for a 2-D lon/lat grid but not beyond it.
    pub fn add_var(
        &mut self,
        name: &str,
        data: ArrayViewD<f32>,
        units: &str,
        long_name: &str,
    ) -> Result<(), NcWriteError> {
        let dim_names = self.match_dims(name, data.shape())?;
        let dim_refs: Vec<&str> = dim_names.iter().map(|s| s.as_str()).collect();

        let nc_err = |inner| NcWriteError::Netcdf {
            path: self.path.clone(),
            inner,
        };

        let mut var = self
            .file
            .add_variable::<f32>(name, &dim_refs)
            .map_err(nc_err)?;

        // Record arrays come out of the standard file column major; the
        // netCDF layer wants row major.
        let standard = data.as_standard_layout();
        let values = standard
            .as_slice()
            .ok_or_else(|| NcWriteError::NotSliceable {
                varname: name.to_owned(),
            })?;
        var.put_values(values, Extents::All).map_err(nc_err)?;

        var.put_attribute("units", units).map_err(nc_err)?;
        var.put_attribute("long_name", long_name).map_err(nc_err)?;

        Ok(())
    }

    fn match_dims(&self, varname: &str, shape: &[usize]) -> Result<Vec<String>, NcWriteError> {
        let mut used: Vec<usize> = Vec::with_capacity(shape.len());
        let mut names = Vec::with_capacity(shape.len());
        for (axis, &len) in shape.iter().enumerate() {
            let hit = self
                .dims
                .iter()
                .enumerate()
                .find(|(i, (_, dim_len))| *dim_len == len && !used.contains(i));
            match hit {
                Some((i, (dim_name, _))) => {
                    used.push(i);
                    names.push(dim_name.clone());
                }
                None => {
                    return Err(NcWriteError::NoMatchingDimension {
                        varname: varname.to_owned(),
                        axis,
                        len,
                    })
                }
            }
        }
        Ok(names)
    }

    pub fn close(self) -> Result<(), NcWriteError> {
        self.file.close().map_err(|e| NcWriteError::Netcdf {
            path: self.path,
            inner: e,
        })
    }
}

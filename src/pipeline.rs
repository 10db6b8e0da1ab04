//! The per-file conversion pipeline: open, filter the dictionary, extract,
//! derive, write.
use std::path::Path;

use ndarray::Array2;

use crate::config::ConvertConfig;
use crate::error::TimestampError;
use crate::grid::{GridCoords, GridError};
use crate::ncout::{NcOutput, NcWriteError};
use crate::odict::{Odict, OdictError};
use crate::precip::{self, PrecipError};
use crate::stdfile::{StandardFile, StdfileError};
use crate::utils;

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Error reading the variable dictionary")]
    Odict(#[from] OdictError),
    #[error("Error reading a standard file")]
    Stdfile(#[from] StdfileError),
    #[error("Error building the grid coordinates")]
    Grid(#[from] GridError),
    #[error("Error deriving the accumulated precipitation")]
    Precip(#[from] PrecipError),
    #[error("Error writing the netCDF output")]
    NcWrite(#[from] NcWriteError),
    #[error("Error determining the valid time")]
    Timestamp(#[from] TimestampError),
}

impl std::fmt::Display for ConvertSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} variable(s) written, {} skipped",
            self.written.len() + self.derived.iter().count(),
            self.skipped.len()
        )
    }
}

/// What one conversion produced, for logging.
#[derive(Debug, Default)]
pub struct ConvertSummary {
    /// Data variables written from extracted records.
    pub written: Vec<String>,
    /// Eligible codes whose record could not be located.
    pub skipped: Vec<String>,
    /// Name of the derived precipitation variable, if one was written.
    pub derived: Option<String>,
}

/// Convert one standard file into one NetCDF dataset.
///
/// The steps, in order: open the input and filter `odict` down to the codes
/// it actually carries; take the valid time from the input's file name;
/// create the output with its time bookkeeping; declare `lat`/`lon`
/// dimensions from the grid descriptor records and write the 2-D coordinate
/// variables; extract and write each eligible code in sorted order; derive
/// the accumulated-precipitation variable when possible.
///
/// A code whose record has gone missing between the directory probe and the
/// read is logged and skipped, matching the presence/absence-only error
/// policy of the conversion; every other failure aborts the file.
pub fn convert_file(
    input: &Path,
    output: &Path,
    previous: Option<&Path>,
    odict: &Odict,
    cfg: &ConvertConfig,
) -> Result<ConvertSummary, ConvertError> {
    let file = StandardFile::open(input)?;
    let eligible = odict.retain_present(&file);
    log::debug!(
        "{}: {} of {} dictionary codes present",
        input.display(),
        eligible.len(),
        odict.len()
    );

    let valid_time = utils::valid_time_from_filename(input)?;
    let mut nc = NcOutput::create(output, valid_time)?;

    let coords = GridCoords::from_stdfile(&file)?;
    nc.add_dimension("lat", coords.nlat())?;
    nc.add_dimension("lon", coords.nlon())?;
    nc.add_var("lat", coords.lat.view().into_dyn(), "degrees", "Latitude")?;
    nc.add_var("lon", coords.lon.view().into_dyn(), "degrees", "Longitude")?;

    let previous = previous.map(StandardFile::open).transpose()?;

    let mut summary = ConvertSummary::default();
    let mut accum_now: Option<Array2<f32>> = None;
    let mut rate_now: Option<Array2<f32>> = None;
    for code in eligible.codes_sorted(&cfg.skip_codes) {
        let rec = match file.read(&code) {
            Ok(rec) => rec,
            Err(StdfileError::RecordNotFound { .. }) => {
                log::warn!("data for {code} not found in {}", input.display());
                summary.skipped.push(code);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let meta = eligible
            .get(&code)
            .expect("codes_sorted only yields dictionary codes");
        nc.add_var(&code, rec.data.view().into_dyn(), &meta.units, &meta.long_name)?;

        if code == cfg.precip.accum_var {
            accum_now = Some(rec.data);
        } else if code == cfg.precip.rate_var {
            rate_now = Some(rec.data);
        }
        summary.written.push(code);
    }

    // Units are looked up in the unfiltered dictionary so the accumulation
    // entry still applies when only the rate record exists in this file.
    let derived = precip::derive(
        &cfg.precip,
        odict,
        accum_now.as_ref(),
        rate_now.as_ref(),
        previous.as_ref(),
    )?;
    if let Some(d) = derived {
        if !nc.contains_variable(&d.name) {
            nc.add_var(&d.name, d.data.view().into_dyn(), &d.units, &d.long_name)?;
            summary.derived = Some(d.name);
        }
    }

    nc.close()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array2};
    use netcdf::Extents;

    use crate::odict::VarMeta;
    use crate::test_utils::{descriptor_records, scratch_dir, StandardFileBuilder, TestRecord};

    use super::*;

    fn sample_odict() -> Odict {
        let mut od = Odict::default();
        for (code, long_name, units) in [
            ("TT", "Air temperature", "deg C"),
            ("PR", "Accumulated precipitation", "m"),
            ("RT", "Precipitation rate", "m/s"),
            ("HU", "Specific humidity", "kg/kg"),
            ("^^", "Grid latitudes", "degrees"),
            (">>", "Grid longitudes", "degrees"),
        ] {
            od.insert(
                code.to_owned(),
                VarMeta {
                    long_name: long_name.to_owned(),
                    units: units.to_owned(),
                },
            );
        }
        od
    }

    fn write_model_file(path: &std::path::Path, pr: Array2<f32>) {
        let (lat_rec, lon_rec) = descriptor_records(&[45.0, 46.0, 47.0], &[270.0, 271.0]);
        StandardFileBuilder::new()
            .record(lat_rec)
            .record(lon_rec)
            .record(TestRecord::new(
                "TT",
                array![[-5.0, -4.0, -3.0], [-2.0, -1.0, 0.0]],
            ))
            .record(TestRecord::new("PR", pr))
            .write(path)
            .unwrap();
    }

    #[test]
    fn test_end_to_end_conversion() {
        let dir = scratch_dir("pipeline-e2e");
        let input = dir.join("m2015120600_042");
        let prev_input = dir.join("m2015120600_041");
        let output = dir.join("m2015120600_042.nc");
        write_model_file(&input, array![[0.5, 0.5, 0.5], [1.0, 1.0, 1.0]]);
        write_model_file(&prev_input, array![[0.25, 0.25, 0.25], [0.5, 0.5, 0.5]]);

        let summary = convert_file(
            &input,
            &output,
            Some(&prev_input),
            &sample_odict(),
            &ConvertConfig::default(),
        )
        .unwrap();

        assert_eq!(summary.written, ["PR", "TT"]);
        assert!(summary.skipped.is_empty());
        assert_eq!(summary.derived.as_deref(), Some("PR1h"));

        let ds = netcdf::open(&output).unwrap();
        assert_eq!(ds.dimension("lat").unwrap().len(), 3);
        assert_eq!(ds.dimension("lon").unwrap().len(), 2);
        // Descriptor codes never become data variables
        assert!(ds.variable("^^").is_none());

        let tt = ds.variable("TT").unwrap();
        let dim_names: Vec<String> = tt.dimensions().iter().map(|d| d.name()).collect();
        assert_eq!(dim_names, ["lon", "lat"]);
        let tt_vals = tt.get::<f32, _>(Extents::All).unwrap();
        assert_eq!(tt_vals[[0, 0]], -5.0);
        assert_eq!(tt_vals[[1, 2]], 0.0);

        let pr1h = ds
            .variable("PR1h")
            .expect("derived precipitation should be written");
        let pr1h_vals = pr1h.get::<f32, _>(Extents::All).unwrap();
        assert_eq!(pr1h_vals[[0, 0]], 0.25);
        assert_eq!(pr1h_vals[[1, 1]], 0.5);

        let lat = ds.variable("lat").unwrap().get::<f32, _>(Extents::All).unwrap();
        assert_eq!(lat[[0, 2]], 47.0);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_no_previous_file_no_derived_variable() {
        let dir = scratch_dir("pipeline-noprev");
        let input = dir.join("m2015120600_042");
        let output = dir.join("m2015120600_042.nc");
        write_model_file(&input, array![[0.5, 0.5, 0.5], [1.0, 1.0, 1.0]]);

        let summary = convert_file(
            &input,
            &output,
            None,
            &sample_odict(),
            &ConvertConfig::default(),
        )
        .unwrap();

        // PR alone cannot be differenced and there is no RT record
        assert!(summary.derived.is_none());
        let ds = netcdf::open(&output).unwrap();
        assert!(ds.variable("PR1h").is_none());
        assert!(ds.variable("PR").is_some());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rate_only_file_derives_from_rate() {
        let dir = scratch_dir("pipeline-rate");
        let input = dir.join("m2015120600_042");
        let output = dir.join("m2015120600_042.nc");
        let (lat_rec, lon_rec) = descriptor_records(&[45.0, 46.0], &[270.0]);
        StandardFileBuilder::new()
            .record(lat_rec)
            .record(lon_rec)
            .record(TestRecord::new("RT", array![[1.0e-4, 2.0e-4]]))
            .write(&input)
            .unwrap();

        let summary = convert_file(
            &input,
            &output,
            None,
            &sample_odict(),
            &ConvertConfig::default(),
        )
        .unwrap();

        assert_eq!(summary.written, ["RT"]);
        assert_eq!(summary.derived.as_deref(), Some("PR1h"));

        let ds = netcdf::open(&output).unwrap();
        let pr1h = ds.variable("PR1h").unwrap();
        let vals = pr1h.get::<f32, _>(Extents::All).unwrap();
        assert!((vals[[0, 0]] - 0.36).abs() < 1e-6);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_bad_file_name_is_an_error() {
        let dir = scratch_dir("pipeline-badname");
        let input = dir.join("not_a_model_file");
        let output = dir.join("not_a_model_file.nc");
        write_model_file(&input, array![[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]]);

        let err = convert_file(
            &input,
            &output,
            None,
            &sample_odict(),
            &ConvertConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::Timestamp(_)));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

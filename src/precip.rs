//! Derivation of the accumulated-precipitation output variable.
//!
//! Model outputs carry precipitation two ways: a running accumulation since
//! the run start (`PR`) and an instantaneous rate (`RT`). Downstream users
//! want the amount that fell over the last window, which exists in neither,
//! so the converter derives it: preferably as the difference between the
//! current file's accumulation and the previous window's file, otherwise by
//! scaling the rate over the window.
use ndarray::Array2;

use crate::config::PrecipConfig;
use crate::odict::Odict;
use crate::stdfile::{StandardFile, StdfileError};

#[derive(Debug, thiserror::Error)]
pub enum PrecipError {
    #[error("Accumulation record in the previous file has shape {prev_ni}x{prev_nj}, current file has {ni}x{nj}")]
    ShapeMismatch {
        ni: usize,
        nj: usize,
        prev_ni: usize,
        prev_nj: usize,
    },
    #[error("Error reading the previous file's accumulation record")]
    ReadError(#[from] StdfileError),
}

/// A derived variable ready to be written to the output.
#[derive(Debug, Clone)]
pub struct DerivedPrecip {
    pub name: String,
    pub long_name: String,
    pub units: String,
    pub data: Array2<f32>,
}

/// Derive the windowed accumulated precipitation, if the inputs allow it.
///
/// Branches, in order of preference:
///
/// 1. `accum_now` present, a previous file given, and that file carries the
///    accumulation record: difference of the two accumulations.
/// 2. `rate_now` present: rate times the window length in seconds.
///
/// Returns `Ok(None)` when neither branch applies; the conversion simply
/// proceeds without the derived variable. Units come from the accumulation
/// variable's odict entry (the difference and the scaled rate are both in
/// the accumulation's unit), falling back to the rate entry if the
/// accumulation code has no entry at all.
pub fn derive(
    cfg: &PrecipConfig,
    odict: &Odict,
    accum_now: Option<&Array2<f32>>,
    rate_now: Option<&Array2<f32>>,
    previous: Option<&StandardFile>,
) -> Result<Option<DerivedPrecip>, PrecipError> {
    if let (Some(now), Some(prev_file)) = (accum_now, previous) {
        if prev_file.contains(&cfg.accum_var) {
            let prev = prev_file.read(&cfg.accum_var)?;
            if prev.data.dim() != now.dim() {
                let (ni, nj) = now.dim();
                let (prev_ni, prev_nj) = prev.data.dim();
                return Err(PrecipError::ShapeMismatch {
                    ni,
                    nj,
                    prev_ni,
                    prev_nj,
                });
            }
            return Ok(Some(DerivedPrecip {
                name: cfg.derived_name.clone(),
                long_name: long_name(cfg.window_hours, &cfg.accum_var, "and previous file"),
                units: units(cfg, odict),
                data: now - &prev.data,
            }));
        }
    }

    if let Some(rate) = rate_now {
        let window_secs = cfg.window_hours as f32 * 3600.0;
        return Ok(Some(DerivedPrecip {
            name: cfg.derived_name.clone(),
            long_name: long_name(cfg.window_hours, &cfg.rate_var, "rate"),
            units: units(cfg, odict),
            data: rate * window_secs,
        }));
    }

    Ok(None)
}

fn long_name(window_hours: u32, source_var: &str, source_descr: &str) -> String {
    let window = if window_hours == 1 {
        "Hourly".to_owned()
    } else {
        format!("{window_hours}-hour")
    };
    format!("{window} accumulated precipitation (from {source_var} {source_descr})")
}

fn units(cfg: &PrecipConfig, odict: &Odict) -> String {
    odict
        .get(&cfg.accum_var)
        .or_else(|| odict.get(&cfg.rate_var))
        .map(|meta| meta.units.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use crate::odict::VarMeta;
    use crate::test_utils::{scratch_path, StandardFileBuilder, TestRecord};

    use super::*;

    fn sample_odict() -> Odict {
        let mut od = Odict::default();
        od.insert(
            "PR".to_owned(),
            VarMeta {
                long_name: "Accumulated precipitation".to_owned(),
                units: "m".to_owned(),
            },
        );
        od.insert(
            "RT".to_owned(),
            VarMeta {
                long_name: "Precipitation rate".to_owned(),
                units: "m/s".to_owned(),
            },
        );
        od
    }

    #[test]
    fn test_pair_difference_preferred() {
        let path = scratch_path("precip-pair");
        StandardFileBuilder::new()
            .record(TestRecord::new("PR", array![[1.0, 2.0], [3.0, 4.0]]))
            .write(&path)
            .unwrap();
        let prev = StandardFile::open(&path).unwrap();

        let now = array![[1.5, 2.25], [3.5, 5.0]];
        let rate = array![[9.0, 9.0], [9.0, 9.0]];
        let derived = derive(
            &PrecipConfig::default(),
            &sample_odict(),
            Some(&now),
            Some(&rate),
            Some(&prev),
        )
        .unwrap()
        .expect("pair branch should produce a variable");

        assert_eq!(derived.name, "PR1h");
        assert_eq!(derived.units, "m");
        assert_eq!(
            derived.long_name,
            "Hourly accumulated precipitation (from PR and previous file)"
        );
        assert_eq!(derived.data, array![[0.5, 0.25], [0.5, 1.0]]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_rate_fallback() {
        let rate = array![[1.0e-4, 2.0e-4]];
        let derived = derive(
            &PrecipConfig::default(),
            &sample_odict(),
            None,
            Some(&rate),
            None,
        )
        .unwrap()
        .expect("rate branch should produce a variable");

        assert_eq!(
            derived.long_name,
            "Hourly accumulated precipitation (from RT rate)"
        );
        // Still the accumulation's units, not the rate's
        assert_eq!(derived.units, "m");
        for (got, want) in derived.data.iter().zip([0.36_f32, 0.72].iter()) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rate_scaled_by_window() {
        let mut cfg = PrecipConfig::default();
        cfg.window_hours = 3;
        let rate = array![[1.0e-4]];
        let derived = derive(&cfg, &sample_odict(), None, Some(&rate), None)
            .unwrap()
            .unwrap();
        assert_eq!(derived.long_name, "3-hour accumulated precipitation (from RT rate)");
        assert!((derived.data[[0, 0]] - 1.08).abs() < 1e-6);
    }

    #[test]
    fn test_units_fall_back_to_rate_entry() {
        let mut od = Odict::default();
        od.insert(
            "RT".to_owned(),
            VarMeta {
                long_name: "Precipitation rate".to_owned(),
                units: "m/s".to_owned(),
            },
        );
        let rate = array![[0.0]];
        let derived = derive(&PrecipConfig::default(), &od, None, Some(&rate), None)
            .unwrap()
            .unwrap();
        assert_eq!(derived.units, "m/s");
    }

    #[test]
    fn test_missing_prev_record_falls_through_to_rate() {
        let path = scratch_path("precip-prev-without-accum");
        StandardFileBuilder::new()
            .record(TestRecord::new("TT", array![[1.0]]))
            .write(&path)
            .unwrap();
        let prev = StandardFile::open(&path).unwrap();

        let now = array![[2.0]];
        let rate = array![[1.0e-3]];
        let derived = derive(
            &PrecipConfig::default(),
            &sample_odict(),
            Some(&now),
            Some(&rate),
            Some(&prev),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            derived.long_name,
            "Hourly accumulated precipitation (from RT rate)"
        );

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_no_inputs_no_variable() {
        let derived = derive(&PrecipConfig::default(), &sample_odict(), None, None, None).unwrap();
        assert!(derived.is_none());
    }

    #[test]
    fn test_shape_mismatch_is_an_error() {
        let path = scratch_path("precip-shape-mismatch");
        StandardFileBuilder::new()
            .record(TestRecord::new("PR", array![[1.0, 2.0]]))
            .write(&path)
            .unwrap();
        let prev = StandardFile::open(&path).unwrap();

        let now = array![[1.0], [2.0]];
        let err = derive(
            &PrecipConfig::default(),
            &sample_odict(),
            Some(&now),
            None,
            Some(&prev),
        )
        .unwrap_err();
        assert!(matches!(err, PrecipError::ShapeMismatch { .. }));

        std::fs::remove_file(&path).unwrap();
    }
}

//! General helpers shared by the converter binaries and library modules.
use std::env;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::TimestampError;

/// Derive the valid (forecast) time of a model output file from its name.
///
/// Model outputs are named `mYYYYMMDDHH_HHH`, where the first token is the
/// run initialization time and the final underscore-separated token is the
/// forecast lead in hours. The valid time is the initialization time plus
/// the lead. For example, `m2015120600_042` is valid at 2015-12-07 18:00 UTC.
///
/// # Returns
/// A [`Result`] with the valid time as a UTC datetime. An `Err` is returned
/// if:
///
/// * the path has no UTF-8 base name,
/// * the base name does not start with `m` followed by ten digits,
/// * the trailing token cannot be parsed as a whole number of hours, or
/// * the encoded date does not exist (e.g. `m2015023000_000`).
pub fn valid_time_from_filename(path: &Path) -> Result<DateTime<Utc>, TimestampError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TimestampError::NoFileName(path.display().to_string()))?;

    let bad_name = |cause: &str| TimestampError::BadFileName {
        name: name.to_owned(),
        cause: cause.to_owned(),
    };

    let init_tok = name
        .split('_')
        .next()
        .ok_or_else(|| bad_name("empty name"))?;
    let digits = init_tok
        .strip_prefix('m')
        .ok_or_else(|| bad_name("missing leading 'm'"))?;
    if digits.len() != 10 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad_name("expected ten digits after the leading 'm'"));
    }

    // Infallible after the digit check above
    let year: i32 = digits[0..4].parse().unwrap();
    let month: u32 = digits[4..6].parse().unwrap();
    let day: u32 = digits[6..8].parse().unwrap();
    let hour: u32 = digits[8..10].parse().unwrap();

    let init = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .ok_or(TimestampError::InvalidDate(year, month, day, hour))?
        .and_utc();

    let lead_tok = name
        .rsplit('_')
        .next()
        .ok_or_else(|| bad_name("empty name"))?;
    if lead_tok == init_tok {
        return Err(bad_name("missing forecast-hour suffix"));
    }
    let lead_hours: i64 = lead_tok
        .parse()
        .map_err(|_| bad_name("forecast-hour suffix is not a whole number"))?;

    Ok(init + Duration::hours(lead_hours))
}

/// Compute the output path for a converted file.
///
/// The output keeps the full input file name with `.nc` appended (so
/// `m2015120600_042` becomes `m2015120600_042.nc`), placed in `output_dir`
/// when given, otherwise next to the input.
pub fn output_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let mut name = input
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".nc");
    match output_dir {
        Some(d) => d.join(name),
        None => input.with_file_name(name),
    }
}

/// The user name recorded in output-file history attributes.
pub fn current_user() -> String {
    env::var("USER").unwrap_or_else(|_| "unknown".to_owned())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("m2015120600_042", 2015, 12, 7, 18)]
    #[case("m2015120600_000", 2015, 12, 6, 0)]
    #[case("m2020022823_001", 2020, 2, 29, 0)]
    fn test_valid_time(
        #[case] name: &str,
        #[case] year: i32,
        #[case] month: u32,
        #[case] day: u32,
        #[case] hour: u32,
    ) {
        let t = valid_time_from_filename(&PathBuf::from(format!("test_data/{name}"))).unwrap();
        let expected = Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap();
        assert_eq!(t, expected);
    }

    #[rstest]
    #[case("2015120600_042")]
    #[case("m201512060_042")]
    #[case("m2015120600")]
    #[case("m2015023000_000")]
    #[case("m2015120600_abc")]
    fn test_valid_time_rejects_bad_names(#[case] name: &str) {
        assert!(valid_time_from_filename(&PathBuf::from(name)).is_err());
    }

    #[test]
    fn test_output_path() {
        let input = PathBuf::from("data/m2015120600_042");
        assert_eq!(
            output_path(&input, None),
            PathBuf::from("data/m2015120600_042.nc")
        );
        assert_eq!(
            output_path(&input, Some(&PathBuf::from("/tmp/out"))),
            PathBuf::from("/tmp/out/m2015120600_042.nc")
        );
    }
}

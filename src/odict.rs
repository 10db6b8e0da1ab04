//! Reading of the "odict" variable lookup table.
//!
//! The odict is a tab-separated text file mapping each standard-file
//! variable code to the descriptive metadata (long name and units) carried
//! into the NetCDF output. The upstream file is maintained for terminal
//! display, so codes for obsolete variables are wrapped in ANSI color
//! escapes and the file ends with a "VAR list" footer block; both must be
//! ignored when parsing.
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use indexmap::IndexMap;
use itertools::Itertools;

use crate::stdfile::StandardFile;

/// Number of footer lines in the upstream odict file.
pub const DEFAULT_FOOTER_LINES: usize = 22;

static ANSI_ESCAPE_REGEX: OnceLock<regex::Regex> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum OdictError {
    #[error("Could not open odict file {path}: {reason}")]
    CouldNotOpen { path: PathBuf, reason: String },
    #[error("Could not read odict file {path}: {reason}")]
    CouldNotRead { path: PathBuf, reason: String },
}

/// Descriptive metadata for one variable code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarMeta {
    pub long_name: String,
    pub units: String,
}

/// The variable lookup table, in file order.
#[derive(Debug, Clone, Default)]
pub struct Odict {
    entries: IndexMap<String, VarMeta>,
}

impl Odict {
    /// Parse an odict file.
    ///
    /// `skip_footer` lines at the end of the file are excluded; pass
    /// [`DEFAULT_FOOTER_LINES`] for the upstream dictionary. Each remaining
    /// line is expected to hold exactly three tab-separated fields (code,
    /// long name, units); lines with any other field count are skipped
    /// rather than treated as errors, which excludes comment and separator
    /// lines without needing a comment syntax. ANSI escape sequences are
    /// stripped from the code column and all fields are trimmed.
    pub fn from_file(fname: &Path, skip_footer: usize) -> Result<Self, OdictError> {
        let f = std::fs::File::open(fname).map_err(|e| OdictError::CouldNotOpen {
            path: fname.to_owned(),
            reason: e.to_string(),
        })?;
        Self::from_reader(BufReader::new(f), fname, skip_footer)
    }

    fn from_reader<R: BufRead>(
        reader: R,
        fname: &Path,
        skip_footer: usize,
    ) -> Result<Self, OdictError> {
        let lines: Vec<String> =
            reader
                .lines()
                .collect::<Result<_, _>>()
                .map_err(|e| OdictError::CouldNotRead {
                    path: fname.to_owned(),
                    reason: e.to_string(),
                })?;

        let ndata = lines.len().saturating_sub(skip_footer);
        let mut entries = IndexMap::new();
        for line in &lines[..ndata] {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 3 {
                log::debug!("odict line with {} fields skipped: {line:?}", fields.len());
                continue;
            }
            let code = strip_ansi_escapes(fields[0].trim());
            if code.is_empty() {
                continue;
            }
            entries.insert(
                code,
                VarMeta {
                    long_name: fields[1].trim().to_owned(),
                    units: fields[2].trim().to_owned(),
                },
            );
        }

        Ok(Self { entries })
    }

    /// Keep only the codes for which `file` has at least one record.
    ///
    /// This is a directory probe; no record data is read.
    pub fn retain_present(&self, file: &StandardFile) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(code, _)| file.contains(code))
            .map(|(code, meta)| (code.clone(), meta.clone()))
            .collect();
        Self { entries }
    }

    pub fn get(&self, code: &str) -> Option<&VarMeta> {
        self.entries.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    pub fn insert(&mut self, code: String, meta: VarMeta) {
        self.entries.insert(code, meta);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VarMeta)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Codes in alphabetical order, excluding those listed in `skip`.
    pub fn codes_sorted(&self, skip: &[String]) -> Vec<String> {
        self.entries
            .keys()
            .filter(|c| !skip.iter().any(|s| s == *c))
            .cloned()
            .sorted()
            .collect()
    }
}

fn strip_ansi_escapes(s: &str) -> String {
    let re = ANSI_ESCAPE_REGEX.get_or_init(|| {
        regex::Regex::new("\x1b[^m]*m").expect("Could not compile ANSI escape regex")
    });
    re.replace_all(s, "").into_owned()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const SAMPLE: &str = "PR\tAccumulated precipitation\tm\n\
        \u{1b}[31mP0\u{1b}[0m\tSurface pressure\thPa\n\
        TT\tAir temperature\tdeg C\tobsolete-extra-column\n\
        RT\tPrecipitation rate\tm/s\n\
        ^^\tGrid latitudes\tdegrees\n\
        >>\tGrid longitudes\tdegrees\n\
        VAR list footer\n\
        ZZ\tFooter entry that parses\tnone\n";

    fn parse(skip_footer: usize) -> Odict {
        Odict::from_reader(Cursor::new(SAMPLE), Path::new("o.dict"), skip_footer).unwrap()
    }

    #[test]
    fn test_parses_three_column_rows() {
        let od = parse(2);
        assert_eq!(od.len(), 5);
        let pr = od.get("PR").unwrap();
        assert_eq!(pr.long_name, "Accumulated precipitation");
        assert_eq!(pr.units, "m");
    }

    #[test]
    fn test_strips_ansi_escapes_from_codes() {
        let od = parse(2);
        let p0 = od.get("P0").expect("colored code should be readable");
        assert_eq!(p0.long_name, "Surface pressure");
    }

    #[test]
    fn test_skips_rows_with_wrong_field_count() {
        // TT carries a fourth column in the sample and must be excluded.
        let od = parse(2);
        assert!(!od.contains("TT"));
    }

    #[test]
    fn test_footer_lines_are_excluded() {
        // The last footer line would parse as a normal entry, so only the
        // footer skipping keeps it out.
        assert!(parse(0).contains("ZZ"));
        assert!(!parse(2).contains("ZZ"));
    }

    #[test]
    fn test_preserves_file_order() {
        let od = parse(2);
        let codes: Vec<&String> = od.iter().map(|(c, _)| c).collect();
        assert_eq!(codes, ["PR", "P0", "RT", "^^", ">>"]);
    }

    #[test]
    fn test_codes_sorted_with_skip_list() {
        let od = parse(2);
        let skip = ["^^".to_owned(), ">>".to_owned()];
        assert_eq!(od.codes_sorted(&skip), ["P0", "PR", "RT"]);
    }
}

//! Optional conversion settings.
//!
//! Everything here has a default matching the behavior of the operational
//! conversion, so most runs never supply a configuration file. The file
//! uses [TOML format](https://toml.io/en/); every key is optional:
//!
//! ```toml
//! # Variable codes never written as data variables. The defaults are the
//! # grid/level descriptor records, which become dimensions and coordinate
//! # variables instead.
//! skip_codes = ["!!", "^^", ">>"]
//!
//! # Lines of footer to discard from the odict file.
//! odict_footer_lines = 22
//!
//! [precip]
//! accum_var = "PR"      # accumulated-precipitation code
//! rate_var = "RT"       # precipitation-rate code
//! derived_name = "PR1h" # name of the derived output variable
//! window_hours = 1      # accumulation window
//! ```
use std::io::Read;
use std::path::Path;

use serde::{de::Error, Deserialize};

use crate::odict;

/// Settings for the whole conversion.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConvertConfig {
    #[serde(default = "default_skip_codes")]
    pub skip_codes: Vec<String>,
    #[serde(default = "default_odict_footer_lines")]
    pub odict_footer_lines: usize,
    #[serde(default)]
    pub precip: PrecipConfig,
}

/// Settings for the derived accumulated-precipitation variable.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrecipConfig {
    #[serde(default = "default_accum_var")]
    pub accum_var: String,
    #[serde(default = "default_rate_var")]
    pub rate_var: String,
    #[serde(default = "default_derived_name")]
    pub derived_name: String,
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            skip_codes: default_skip_codes(),
            odict_footer_lines: default_odict_footer_lines(),
            precip: PrecipConfig::default(),
        }
    }
}

impl Default for PrecipConfig {
    fn default() -> Self {
        Self {
            accum_var: default_accum_var(),
            rate_var: default_rate_var(),
            derived_name: default_derived_name(),
            window_hours: default_window_hours(),
        }
    }
}

impl ConvertConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_toml_file(p: &Path) -> Result<Self, toml::de::Error> {
        let mut f = std::fs::File::open(p).map_err(|e| {
            toml::de::Error::custom(format!("error opening TOML file {}: {e}", p.display()))
        })?;
        let mut buf = String::new();
        f.read_to_string(&mut buf).map_err(|e| {
            toml::de::Error::custom(format!("error reading TOML file {}: {e}", p.display()))
        })?;
        Self::from_toml_str(&buf)
    }
}

fn default_skip_codes() -> Vec<String> {
    // The level descriptor (!!) and the two grid descriptors; they are
    // handled as dimensions/coordinates, never as data variables.
    vec!["!!".to_owned(), "^^".to_owned(), ">>".to_owned()]
}

fn default_odict_footer_lines() -> usize {
    odict::DEFAULT_FOOTER_LINES
}

fn default_accum_var() -> String {
    "PR".to_owned()
}

fn default_rate_var() -> String {
    "RT".to_owned()
}

fn default_derived_name() -> String {
    "PR1h".to_owned()
}

fn default_window_hours() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let cfg = ConvertConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.skip_codes, ["!!", "^^", ">>"]);
        assert_eq!(cfg.odict_footer_lines, 22);
        assert_eq!(cfg.precip.accum_var, "PR");
        assert_eq!(cfg.precip.rate_var, "RT");
        assert_eq!(cfg.precip.derived_name, "PR1h");
        assert_eq!(cfg.precip.window_hours, 1);
    }

    #[test]
    fn test_partial_override() {
        let cfg = ConvertConfig::from_toml_str(
            "skip_codes = [\"!!\"]\n\n[precip]\nwindow_hours = 3\n",
        )
        .unwrap();
        assert_eq!(cfg.skip_codes, ["!!"]);
        assert_eq!(cfg.precip.window_hours, 3);
        // Untouched keys keep their defaults
        assert_eq!(cfg.precip.accum_var, "PR");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(ConvertConfig::from_toml_str("not_a_setting = 1\n").is_err());
    }
}

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use rpncdf_rs::stdfile::{RecordInfo, StandardFile, StdfileError};
use tabled::{Table, Tabled};

/// Print the record directory of a standard file
///
/// This reads only the directory, not the record data, so it is fast even
/// for large files. One row is printed per record with the identifying
/// codes and the origin/valid times from the directory entry.
///
/// Example:
///
/// ```bash
/// list_records test_data/m2015120600_042 --codes PR --codes RT
/// ```
#[derive(Debug, Parser)]
struct Cli {
    /// The standard file to inventory.
    file: PathBuf,

    /// Restrict the listing to these variable codes. May be given multiple
    /// times; all records are listed when absent.
    #[clap(long = "codes")]
    codes: Vec<String>,
}

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "nomvar")]
    nomvar: String,
    #[tabled(rename = "typvar")]
    typvar: String,
    #[tabled(rename = "etiket")]
    etiket: String,
    #[tabled(rename = "ip1")]
    ip1: i32,
    #[tabled(rename = "ip2")]
    ip2: i32,
    #[tabled(rename = "shape")]
    shape: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "origin (UTC)")]
    dateo: String,
    #[tabled(rename = "valid (UTC)")]
    valid: String,
}

impl From<&RecordInfo> for RecordRow {
    fn from(info: &RecordInfo) -> Self {
        Self {
            nomvar: info.nomvar.clone(),
            typvar: info.typvar.clone(),
            etiket: info.etiket.clone(),
            ip1: info.ip1,
            ip2: info.ip2,
            shape: format!("{}x{}x{}", info.ni, info.nj, info.nk),
            kind: info.kind.to_string(),
            dateo: info.dateo.format("%Y-%m-%d %H:%M").to_string(),
            valid: info.valid_time().format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

fn main() -> ExitCode {
    let clargs = Cli::parse();
    match run(&clargs) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Could not list {}: {e}", clargs.file.display());
            ExitCode::FAILURE
        }
    }
}

fn run(clargs: &Cli) -> Result<(), StdfileError> {
    let file = StandardFile::open(&clargs.file)?;
    let rows: Vec<RecordRow> = file
        .records()
        .iter()
        .filter(|r| clargs.codes.is_empty() || clargs.codes.iter().any(|c| c == &r.nomvar))
        .map(RecordRow::from)
        .collect();

    if rows.is_empty() {
        println!("No matching records in {}", clargs.file.display());
    } else {
        println!("{}", Table::new(rows));
    }
    Ok(())
}

//! CSV and JSON reports of a run.

use std::io::Write;
use std::path::Path;

use ns_core::{Direction, Error, Renormalisation, Result, RunResult};

/// Placeholder for absent yields and undefined factors.
pub const NOT_APPLICABLE: &str = "n/a";

/// CSV header.
pub const CSV_HEADER: [&str; 7] =
    ["flavour", "systematic", "nominal", "yield_up", "yield_down", "renorm_up", "renorm_down"];

/// One (flavour, systematic) line of the report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    /// Flavour name.
    pub flavour: String,
    /// Systematic base name.
    pub systematic: String,
    /// Nominal yield of the flavour.
    pub nominal: f64,
    /// Up yield, if computed.
    pub yield_up: Option<f64>,
    /// Down yield, if computed.
    pub yield_down: Option<f64>,
    /// Up factor.
    pub renorm_up: Renormalisation,
    /// Down factor.
    pub renorm_down: Renormalisation,
}

impl ReportRow {
    fn record(&self) -> [String; 7] {
        [
            self.flavour.clone(),
            self.systematic.clone(),
            self.nominal.to_string(),
            fmt_opt(self.yield_up),
            fmt_opt(self.yield_down),
            fmt_opt(self.renorm_up.factor()),
            fmt_opt(self.renorm_down.factor()),
        ]
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| NOT_APPLICABLE.to_string(), |x| x.to_string())
}

/// Rows sorted by flavour then systematic name. Flavours without
/// systematics contribute no rows.
pub fn report_rows(result: &RunResult) -> Vec<ReportRow> {
    result
        .flavours
        .iter()
        .flat_map(|(flavour, r)| {
            r.systematic_names().into_iter().map(move |name| ReportRow {
                flavour: flavour.clone(),
                systematic: name.to_string(),
                nominal: r.nominal,
                yield_up: r.yield_of(name, Direction::Up),
                yield_down: r.yield_of(name, Direction::Down),
                renorm_up: r.renormalisation_of(name, Direction::Up),
                renorm_down: r.renormalisation_of(name, Direction::Down),
            })
        })
        .collect()
}

/// Write the CSV table to `writer`.
pub fn write_csv<W: Write>(writer: W, result: &RunResult) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER).map_err(csv_error)?;
    for row in report_rows(result) {
        wtr.write_record(row.record()).map_err(csv_error)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the CSV table to `path`, creating parent directories.
pub fn write_csv_file(path: &Path, result: &RunResult) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_csv(std::io::BufWriter::new(file), result)
}

/// Pretty JSON of the full run result (`NotApplicable` → `null`).
pub fn to_json(result: &RunResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

fn csv_error(e: csv::Error) -> Error {
    Error::Io(e.into())
}

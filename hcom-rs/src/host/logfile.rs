//! Log data files: Hopsan PLO (version 2) and CSV.
//!
//! CSV comes in two shapes.  The row layout written by `sapl -csv` holds one
//! series per line as `name,alias,unit,v0,v1,...`.  A plain column file holds
//! only numbers; its first column is time and the others are named `CSV1`,
//! `CSV2`, and so on.

use std::io::{self, Write};
use std::path::Path;

/// Name of the shared time axis in the store.
pub const TIME_NAME: &str = "time";

const PLO_VERSION: u32 = 2;
const PLO_UNREADABLE: &str = "Unable to read .PLO file.";
const CSV_UNREADABLE: &str = "CSV file could not be parsed.";

/// On-disk layout of a log data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFileFormat {
    Plo,
    Csv,
}

impl LogFileFormat {
    /// Format implied by the extension; `None` if it is neither.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("csv") {
            Some(LogFileFormat::Csv)
        } else if ext.eq_ignore_ascii_case("plo") {
            Some(LogFileFormat::Plo)
        } else {
            None
        }
    }
}

/// One named series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Column {
    pub name: String,
    /// Empty when the series has no alias.
    pub alias: String,
    pub data: Vec<f64>,
}

impl Column {
    pub fn new(name: impl Into<String>, data: Vec<f64>) -> Self {
        Column {
            name: name.into(),
            data,
            ..Default::default()
        }
    }

    /// Alias when set, otherwise the full name.
    fn display_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.name
        } else {
            &self.alias
        }
    }
}

/// Series read from a file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogTable {
    pub time: Option<Vec<f64>>,
    pub columns: Vec<Column>,
}

/// Six-decimal scientific notation with a signed two-digit exponent,
/// e.g. `1.500000E+02`.
pub fn scientific(x: f64) -> String {
    let text = format!("{x:.6E}");
    let Some((mantissa, exp)) = text.split_once('E') else {
        return text;
    };
    match exp.parse::<i32>() {
        Ok(e) => format!("{mantissa}E{}{:02}", if e < 0 { '-' } else { '+' }, e.abs()),
        Err(_) => text,
    }
}

fn plo_cell(out: &mut impl Write, x: f64) -> io::Result<()> {
    let cell = scientific(x);
    if cell.starts_with('-') {
        write!(out, " {cell}")
    } else {
        write!(out, "  {cell}")
    }
}

// ── Writers ───────────────────────────────────────────────────────────────────

/// Write a PLO file with `time` as its first column.  Short columns are
/// padded with zeros.
pub fn write_plo(out: &mut impl Write, title: &str, time: &[f64], columns: &[Column]) -> io::Result<()> {
    writeln!(out, "    'VERSION'")?;
    writeln!(out, "    {PLO_VERSION}")?;
    writeln!(out, "    '{title}.PLO'")?;
    writeln!(out, "    {}    {}", columns.len() + 1, time.len())?;
    write!(out, "    'Time'")?;
    for c in columns {
        write!(out, ",    '{}'", c.display_name())?;
    }
    writeln!(out)?;
    for _ in 0..=columns.len() {
        plo_cell(out, 1.0)?;
    }
    writeln!(out)?;
    for (row, t) in time.iter().enumerate() {
        plo_cell(out, *t)?;
        for c in columns {
            plo_cell(out, c.data.get(row).copied().unwrap_or(0.0))?;
        }
        writeln!(out)?;
    }
    writeln!(out, "  {title}.PLO.DAT_-1")
}

/// Write one `name,alias,unit,values...` line per column.
pub fn write_csv_rows(out: &mut impl Write, columns: &[Column]) -> io::Result<()> {
    for c in columns {
        write!(out, "{},{},", c.name, c.alias)?;
        for x in &c.data {
            write!(out, ",{x}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

// ── Readers ───────────────────────────────────────────────────────────────────

/// Parse a PLO file.  The first column becomes the time axis.
pub fn read_plo(text: &str) -> Result<LogTable, String> {
    let mut lines = text.lines().map(str::trim);
    let mut header = Vec::with_capacity(6);
    for _ in 0..6 {
        header.push(lines.next().ok_or_else(|| PLO_UNREADABLE.to_owned())?);
    }
    let version: u32 = header[1].parse().map_err(|_| PLO_UNREADABLE.to_owned())?;
    let mut counts = header[3].split_whitespace().map(str::parse::<usize>);
    let (Some(Ok(mut n_cols)), Some(Ok(n_rows))) = (counts.next(), counts.next()) else {
        return Err(PLO_UNREADABLE.to_owned());
    };
    // version 1 does not count the time column
    if version == 1 && header[4].starts_with("'Time") {
        n_cols += 1;
    }
    let names: Vec<String> = header[4]
        .split(',')
        .map(|w| w.replace('\'', "").trim().to_owned())
        .collect();
    if n_cols == 0 || names.len() < n_cols {
        return Err(PLO_UNREADABLE.to_owned());
    }

    let mut data = vec![Vec::new(); n_cols];
    for _ in 0..n_rows {
        let line = lines.next().ok_or_else(|| PLO_UNREADABLE.to_owned())?;
        let mut cells = line.split_whitespace();
        for column in &mut data {
            let x = cells
                .next()
                .and_then(|c| c.parse::<f64>().ok())
                .ok_or_else(|| PLO_UNREADABLE.to_owned())?;
            column.push(x);
        }
    }

    let mut data = data.into_iter();
    let time = data.next();
    let columns = names
        .into_iter()
        .skip(1)
        .zip(data)
        .map(|(name, data)| Column::new(name, data))
        .collect();
    Ok(LogTable { time, columns })
}

/// Parse either CSV layout, chosen by whether the first field is a number.
pub fn read_csv(text: &str) -> Result<LogTable, String> {
    let first = text.lines().next().unwrap_or("");
    let numeric = first
        .split(',')
        .next()
        .is_some_and(|f| f.trim().parse::<f64>().is_ok());
    if numeric {
        read_plain_columns(text)
    } else {
        read_rows(text)
    }
}

fn parse_number(field: &str) -> Result<f64, String> {
    field.trim().parse().map_err(|_| CSV_UNREADABLE.to_owned())
}

fn read_plain_columns(text: &str) -> Result<LogTable, String> {
    let mut data: Vec<Vec<f64>> = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let row = line.split(',').map(parse_number).collect::<Result<Vec<_>, _>>()?;
        if data.is_empty() {
            data = vec![Vec::new(); row.len()];
        } else if row.len() != data.len() {
            return Err(CSV_UNREADABLE.to_owned());
        }
        for (column, x) in data.iter_mut().zip(row) {
            column.push(x);
        }
    }
    let mut data = data.into_iter();
    let time = data.next();
    let columns = data
        .enumerate()
        .map(|(i, d)| Column::new(format!("CSV{}", i + 1), d))
        .collect();
    Ok(LogTable { time, columns })
}

fn read_rows(text: &str) -> Result<LogTable, String> {
    let mut table = LogTable::default();
    for line in text.lines() {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() <= 3 {
            continue;
        }
        let data = fields[3..].iter().map(|f| parse_number(f)).collect::<Result<Vec<_>, _>>()?;
        if fields[0] == TIME_NAME {
            table.time = Some(data);
        } else {
            table.columns.push(Column {
                name: fields[0].to_owned(),
                alias: fields[1].to_owned(),
                data,
            });
        }
    }
    if table.time.is_none() && table.columns.is_empty() {
        return Err(CSV_UNREADABLE.to_owned());
    }
    Ok(table)
}

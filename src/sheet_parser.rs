//! Tabular file ingestion for CSV and spreadsheet workbooks (.xlsx/.xlsm/.xlsb/.xls/.ods),
//! plus image uploads that ride along as model attachments.

use crate::dataset::{CellValue, Dataset, Row, Sheet};
use crate::generator::Attachment;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;

fn extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// File name without directories or extension.
fn file_stem(filename: &str) -> &str {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    base.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(base)
}

/// True when the upload is a spreadsheet or CSV this module can parse.
pub fn is_tabular(filename: &str) -> bool {
    matches!(
        extension(filename).as_str(),
        "csv" | "xlsx" | "xlsm" | "xlsb" | "xls" | "ods"
    )
}

/// Dispatch file parsing by extension. The dataset is named after the uploaded file.
pub fn parse_file(filename: &str, data: &[u8]) -> Result<Dataset> {
    let sheets = match extension(filename).as_str() {
        "csv" => vec![parse_csv(filename, data)?],
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => parse_workbook(data)?,
        ext => anyhow::bail!(
            "Unsupported file type: .{}. Supported: .csv, .xlsx, .xlsm, .xlsb, .xls, .ods",
            ext
        ),
    };

    tracing::info!(
        "Parsed {}: {} sheet(s), {} row(s)",
        filename,
        sheets.len(),
        sheets.iter().map(|s| s.rows.len()).sum::<usize>()
    );
    Ok(Dataset::new(filename, sheets))
}

/// Parse a CSV file into a single sheet named after the file.
fn parse_csv(filename: &str, data: &[u8]) -> Result<Sheet> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        anyhow::bail!("CSV file has no headers");
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.context("Failed to read CSV record")?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rows.push(zip_row(&headers, record.iter().map(CellValue::from)));
    }

    Ok(Sheet::new(file_stem(filename), headers, rows))
}

/// Parse every worksheet of a workbook. The first row of each sheet is its header row.
fn parse_workbook(data: &[u8]) -> Result<Vec<Sheet>> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(data)).context("Failed to open workbook")?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::new();

    for name in &sheet_names {
        let range = match workbook.worksheet_range(name) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping sheet '{}': {}", name, e);
                continue;
            }
        };

        match range_to_sheet(name, &range) {
            Some(sheet) => sheets.push(sheet),
            None => tracing::debug!("Sheet '{}' has no header row, skipped", name),
        }
    }

    if sheets.is_empty() {
        anyhow::bail!("No sheets with data found in workbook");
    }

    Ok(sheets)
}

fn range_to_sheet(name: &str, range: &calamine::Range<Data>) -> Option<Sheet> {
    let mut row_iter = range.rows();

    let headers: Vec<String> = row_iter
        .next()?
        .iter()
        .map(|c| cell_to_value(c).to_string().trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return None;
    }

    let rows = row_iter
        .map(|row| row.iter().map(cell_to_value).collect::<Vec<_>>())
        .filter(|values| !values.iter().all(CellValue::is_empty))
        .map(|values| zip_row(&headers, values))
        .collect();

    Some(Sheet::new(name, headers, rows))
}

/// Key values by header. Cells beyond the header row are dropped; unnamed columns are skipped.
fn zip_row(headers: &[String], values: impl IntoIterator<Item = CellValue>) -> Row {
    headers
        .iter()
        .zip(values)
        .filter(|(h, _)| !h.is_empty())
        .map(|(h, v)| (h.clone(), v))
        .collect()
}

fn cell_to_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => CellValue::Text(excel_serial_to_date(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from(s.as_str()),
        Data::Error(e) => CellValue::Text(format!("#ERR:{:?}", e)),
    }
}

/// Render an Excel serial date (1900 system) as `YYYY-MM-DD`, with `HH:MM:SS` when there is a time part.
fn excel_serial_to_date(serial: f64) -> String {
    // Serial 25569 is 1970-01-01 once the fictional 1900-02-29 is accounted for.
    let whole = serial.floor() as i64;
    let days = if whole > 59 { whole - 25569 } else { whole - 25568 };
    let secs = ((serial - serial.floor()) * 86_400.0).round() as i64;

    let (year, month, day) = civil_from_days(days);
    if secs == 0 {
        return format!("{:04}-{:02}-{:02}", year, month, day);
    }
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year,
        month,
        day,
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Base64-encode an uploaded image so it can be sent alongside the prompt.
/// Returns `None` for anything that is not a supported image type.
pub fn attachment_from_image(filename: &str, data: &[u8]) -> Option<Attachment> {
    let mime_type = match extension(filename).as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => return None,
    };

    Some(Attachment {
        mime_type: mime_type.to_string(),
        data: STANDARD.encode(data),
    })
}

//! Encoders for the downloadable result files.
//!
//! Every encoder is a pure function of its input: the spreadsheet creation
//! date is pinned, so the same emails always produce the same bytes.

use rust_xlsxwriter::{Color, DocProperties, ExcelDateTime, Format, FormatAlign, Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::extractor::EmailExtractor;

const SHEET_NAME: &str = "Emails";
const EMAIL_HEADER: &str = "Email";
const HEADER_FILL: u32 = 0x366092;
const MAX_COLUMN_WIDTH: usize = 50;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("spreadsheet encoding failed: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Xlsx,
    Csv,
    Txt,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 3] = [ReportFormat::Xlsx, ReportFormat::Csv, ReportFormat::Txt];

    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Xlsx => "xlsx",
            ReportFormat::Csv => "csv",
            ReportFormat::Txt => "txt",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ReportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ReportFormat::Csv => "text/csv",
            ReportFormat::Txt => "text/plain",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xlsx" => Ok(ReportFormat::Xlsx),
            "csv" => Ok(ReportFormat::Csv),
            "txt" => Ok(ReportFormat::Txt),
            other => Err(format!("Unknown download format '{}'", other)),
        }
    }
}

/// Tabular view of the results fed to every encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn from_emails(emails: &[String]) -> Self {
        Sheet {
            headers: vec![EMAIL_HEADER.to_string()],
            rows: emails.iter().map(|e| vec![e.clone()]).collect(),
        }
    }

    /// Builds a sheet from emails carrying extra columns (name, company, ...).
    /// Column order comes from the first record; absent cells stay empty.
    /// Records whose `email` column is missing or not an address are skipped.
    pub fn from_records(records: &[Vec<(String, String)>]) -> Self {
        let extractor = EmailExtractor::new();
        let records: Vec<&Vec<(String, String)>> = records
            .iter()
            .filter(|record| {
                record
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(EMAIL_HEADER))
                    .is_some_and(|(_, value)| extractor.is_email(value))
            })
            .collect();

        let headers: Vec<String> = records
            .first()
            .map(|first| first.iter().map(|(key, _)| key.clone()).collect())
            .unwrap_or_default();

        let rows = records
            .iter()
            .map(|record| {
                headers
                    .iter()
                    .map(|header| {
                        record
                            .iter()
                            .find(|(key, _)| key == header)
                            .map(|(_, value)| value.clone())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();

        Sheet { headers, rows }
    }

    fn column_widths(&self) -> Vec<usize> {
        (0..self.headers.len())
            .map(|col| {
                let longest = std::iter::once(&self.headers[col])
                    .chain(self.rows.iter().filter_map(|row| row.get(col)))
                    .map(|cell| cell.chars().count())
                    .max()
                    .unwrap_or(0);
                (longest + 2).min(MAX_COLUMN_WIDTH)
            })
            .collect()
    }
}

pub fn render(format: ReportFormat, sheet: &Sheet) -> Result<Vec<u8>, ReportError> {
    match format {
        ReportFormat::Xlsx => to_xlsx(sheet),
        ReportFormat::Csv => to_csv(sheet),
        ReportFormat::Txt => Ok(to_txt(sheet)),
    }
}

pub fn to_xlsx(sheet: &Sheet) -> Result<Vec<u8>, ReportError> {
    let mut workbook = Workbook::new();
    let created = ExcelDateTime::from_ymd(2000, 1, 1)?;
    workbook.set_properties(&DocProperties::new().set_creation_datetime(&created));

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let cell_format = Format::new()
        .set_align(FormatAlign::Left)
        .set_align(FormatAlign::VerticalCenter);

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, header) in sheet.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header.as_str(), &header_format)?;
    }
    for (row_idx, row) in sheet.rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            worksheet.write_string_with_format(
                row_idx as u32 + 1,
                col as u16,
                value.as_str(),
                &cell_format,
            )?;
        }
    }

    worksheet.set_freeze_panes(1, 0)?;
    for (col, width) in sheet.column_widths().into_iter().enumerate() {
        worksheet.set_column_width(col as u16, width as f64)?;
    }

    Ok(workbook.save_to_buffer()?)
}

pub fn to_csv(sheet: &Sheet) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&sheet.headers)?;
    for row in &sheet.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    writer.into_inner().map_err(|e| ReportError::Io(e.into_error()))
}

/// One email per line; extra metadata columns are left out.
pub fn to_txt(sheet: &Sheet) -> Vec<u8> {
    let mut out = String::new();
    for row in &sheet.rows {
        if let Some(email) = row.first() {
            out.push_str(email);
            out.push('\n');
        }
    }
    out.into_bytes()
}

pub fn download_filename(keywords: &str, format: ReportFormat) -> String {
    let stem = keywords.trim().replace(' ', "_");
    if stem.is_empty() {
        format!("emails.{}", format.extension())
    } else {
        format!("emails_{}.{}", stem, format.extension())
    }
}

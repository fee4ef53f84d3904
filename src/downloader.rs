//! Exports of the group ledger for administrators.

use std::error::Error;

use crate::model::Group;
use crate::schema::{Record, header_row};

/// Escape one CSV field: quote it when it holds a comma, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line(cells: &[String]) -> String {
    let mut line = cells
        .iter()
        .map(|c| csv_field(c))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Convert groups to CSV, one row per group in the `groups` table layout.
///
/// # Examples
/// ```
/// use labgroups::downloader::groups_to_csv;
///
/// let csv = groups_to_csv(&[]);
/// assert!(csv.starts_with("timestamp,group_name,"));
/// ```
pub fn groups_to_csv<'a>(groups: impl IntoIterator<Item = &'a Group>) -> String {
    let mut csv_content = csv_line(&header_row::<Group>());
    for group in groups {
        csv_content.push_str(&csv_line(&group.to_cells()));
    }
    csv_content
}

/// Convert groups to an XLSX workbook with a single `groups` sheet.
#[cfg(feature = "web")]
pub fn groups_to_xlsx<'a>(
    groups: impl IntoIterator<Item = &'a Group>,
) -> Result<Vec<u8>, Box<dyn Error>> {
    use rust_xlsxwriter::{Format, Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("groups")?;

    let bold = Format::new().set_bold();
    for (c, title) in header_row::<Group>().iter().enumerate() {
        worksheet.write_string_with_format(0, c as u16, title, &bold)?;
    }
    for (r, group) in groups.into_iter().enumerate() {
        for (c, value) in group.to_cells().iter().enumerate() {
            worksheet.write_string((r + 1) as u32, c as u16, value)?;
        }
    }

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;
    Ok(buffer)
}

/// XLSX export is only built with the `web` feature.
#[cfg(not(feature = "web"))]
pub fn groups_to_xlsx<'a>(
    _groups: impl IntoIterator<Item = &'a Group>,
) -> Result<Vec<u8>, Box<dyn Error>> {
    Err("XLSX export requires the `web` feature".into())
}

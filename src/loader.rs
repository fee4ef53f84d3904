#![cfg(not(tarpaulin_include))]

use log::info;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::StoreError;
use crate::store::{RecordStore, Row};

/// Load a CSV file as table rows
///
/// The first line is kept as the header row. Blank lines are skipped and
/// quoted fields may contain commas and doubled quotes.
///
/// # Arguments
/// * `filepath` - Path to the CSV file to load
///
/// # Returns
/// * `Result<Vec<Row>, StoreError>` - The rows, header first
///
/// # Examples
/// ```no_run
/// use labgroups::loader::read_csv;
///
/// match read_csv("students.csv") {
///     Ok(rows) => println!("Loaded {} rows", rows.len()),
///     Err(e) => eprintln!("Error loading CSV: {}", e),
/// }
/// ```
pub fn read_csv(filepath: impl AsRef<Path>) -> Result<Vec<Row>, StoreError> {
    let file = File::open(filepath)?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        rows.push(parse_csv_row(line));
    }

    Ok(rows)
}

/// Import a CSV file into a table
///
/// With `replace` the table is rewritten with the file's contents. Otherwise
/// the data rows are appended, and the file's header is only written when the
/// table is still empty.
///
/// # Returns
/// * `Result<usize, StoreError>` - Number of data rows imported
pub fn import_csv(
    store: &dyn RecordStore,
    table: &str,
    filepath: impl AsRef<Path>,
    replace: bool,
) -> Result<usize, StoreError> {
    let rows = read_csv(filepath)?;
    let Some((header, data)) = rows.split_first() else {
        return Ok(0);
    };

    if replace {
        store.clear_and_rewrite(table, rows.clone())?;
    } else {
        if store.read_all(table)?.is_empty() {
            store.append(table, header.clone())?;
        }
        for row in data {
            store.append(table, row.clone())?;
        }
    }

    info!("imported {} rows into '{}'", data.len(), table);
    Ok(data.len())
}

/// Parse a single CSV line into fields
///
/// Handles quoted fields and escaped quotes (`""` inside a quoted field).
pub fn parse_csv_row(line: &str) -> Row {
    let mut result = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    // Double quote inside quoted field - add a single quote
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                result.push(current_field.trim().to_string());
                current_field = String::new();
            }
            _ => {
                current_field.push(c);
            }
        }
    }

    // Add the last field
    result.push(current_field.trim().to_string());

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::io::Write;

    #[test]
    fn parses_quoted_fields() {
        assert_eq!(
            parse_csv_row(r#"a@x.edu,"Lovelace, Ada","say ""hi""",x"#),
            vec!["a@x.edu", "Lovelace, Ada", r#"say "hi""#, "x"]
        );
        assert_eq!(parse_csv_row(""), vec![""]);
    }

    #[test]
    fn imports_into_an_empty_table_with_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "email,student_id").unwrap();
        writeln!(file, "a@x.edu,1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "b@x.edu,2").unwrap();

        let store = MemoryStore::new();
        let n = import_csv(&store, "Enrolled Students", file.path(), false).unwrap();
        assert_eq!(n, 2);
        let rows = store.read_all("Enrolled Students").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["email", "student_id"]);

        // appending again keeps the single header
        import_csv(&store, "Enrolled Students", file.path(), false).unwrap();
        assert_eq!(store.read_all("Enrolled Students").unwrap().len(), 5);

        import_csv(&store, "Enrolled Students", file.path(), true).unwrap();
        assert_eq!(store.read_all("Enrolled Students").unwrap().len(), 3);
    }
}

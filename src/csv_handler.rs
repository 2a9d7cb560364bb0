use log::warn;
use std::path::Path;

/// Tabular data for one slide: the ordered column names from the CSV
/// header plus each data record as an ordered list of cell values.
#[derive(Debug)]
pub struct SlideData {
    pub column_names: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Loads a CSV file into column names and ordered row values.
///
/// Rows keep the value order of the CSV record; cells are matched to table
/// columns positionally, never by column name. Records that cannot be read
/// are skipped with a warning.
pub fn load_csv_file(path: &Path) -> Result<SlideData, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let column_names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => rows.push(record.iter().map(str::to_string).collect()),
            Err(e) => {
                warn!("Failed to parse a record from the CSV file: {}. Skipping invalid record.", e);
            }
        }
    }

    Ok(SlideData { column_names, rows })
}

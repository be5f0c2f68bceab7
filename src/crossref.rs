use crate::error::{PresenceError, Result};
use log::{info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// File written to the output directory with the matching rows
pub const OUTPUT_FILE_NAME: &str = "species_by_category.csv";

/// Header fragments identifying the species column, matched case-insensitively
const SPECIES_COLUMN_HINTS: [&str; 4] = [
    "especie",
    "nombre_cientifico",
    "scientific_name",
    "scientificname",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossRefOptions {
    /// Field delimiter; guessed from the file extension when unset
    pub delimiter: Option<u8>,
    pub output_dir: PathBuf,
}

impl Default for CrossRefOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            output_dir: PathBuf::from("."),
        }
    }
}

/// Database rows describing the species found in the area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossReference {
    pub species_column: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Where the rows were written, if any matched
    pub written_to: Option<PathBuf>,
}

impl CrossReference {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Keep the database rows whose species is in `species` and write them to
/// [`OUTPUT_FILE_NAME`] in the output directory.
///
/// Problems with the database are logged and yield an empty result.
pub fn cross_reference<S: AsRef<str>>(
    species: &[S],
    database: &Path,
    options: &CrossRefOptions,
) -> CrossReference {
    match try_cross_reference(species, database, options) {
        Ok(result) => result,
        Err(e) => {
            warn!("Cross-reference with {} failed: {}", database.display(), e);
            CrossReference::default()
        }
    }
}

/// Delimiter to use for `path`: the configured one, else tab for `.tsv` and
/// `.tab` files, else comma
pub fn delimiter_for(path: &Path, configured: Option<u8>) -> u8 {
    if let Some(delimiter) = configured {
        return delimiter;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("tab") => b'\t',
        _ => b',',
    }
}

/// Index of the first header that names the species column
pub fn find_species_column<S: AsRef<str>>(headers: &[S]) -> Option<usize> {
    headers.iter().position(|header| {
        let header = header.as_ref().to_lowercase();
        SPECIES_COLUMN_HINTS.iter().any(|hint| header.contains(hint))
    })
}

fn try_cross_reference<S: AsRef<str>>(
    species: &[S],
    database: &Path,
    options: &CrossRefOptions,
) -> Result<CrossReference> {
    let delimiter = delimiter_for(database, options.delimiter);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(database)?;

    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    let column = find_species_column(&headers)
        .ok_or_else(|| PresenceError::MissingSpeciesColumn(database.to_path_buf()))?;
    let species_column = headers[column].clone();

    let wanted: HashSet<&str> = species.iter().map(|s| s.as_ref().trim()).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record
            .get(column)
            .is_some_and(|value| wanted.contains(value.trim()))
        {
            rows.push(record.iter().map(String::from).collect::<Vec<_>>());
        }
    }

    if rows.is_empty() {
        warn!(
            "None of the {} species appear in column '{}' of {}",
            species.len(),
            species_column,
            database.display()
        );
        return Ok(CrossReference {
            species_column: Some(species_column),
            headers,
            rows,
            written_to: None,
        });
    }

    fs::create_dir_all(&options.output_dir)?;
    let output = options.output_dir.join(OUTPUT_FILE_NAME);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(&output)?;
    writer.write_record(&headers)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    info!(
        "Wrote {} matching database row(s) to {}",
        rows.len(),
        output.display()
    );
    Ok(CrossReference {
        species_column: Some(species_column),
        headers,
        rows,
        written_to: Some(output),
    })
}

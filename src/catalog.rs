//! Word list loading (level-block text, CSV and Excel) and random word draws

use crate::error::{CatalogError, ValidationError};
use crate::word::{Level, Word};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Marker that opens a level block in the text format
const LEVEL_MARKER: char = '%';

/// One level's name and its full word pool
#[derive(Debug, Clone)]
pub struct LevelList {
    pub name: String,
    pub words: Vec<Word>,
}

/// All levels of a word list, in file order. Level 1 is the first block.
#[derive(Debug, Clone)]
pub struct WordCatalog {
    levels: Vec<LevelList>,
}

impl WordCatalog {
    /// Build a catalog from named word groups. Words are normalized and
    /// duplicates within a level are dropped.
    pub fn from_levels<S: AsRef<str>>(groups: Vec<(String, Vec<S>)>) -> Self {
        let levels = groups
            .into_iter()
            .enumerate()
            .map(|(i, (name, raw_words))| {
                let level = Level::new(i as u32 + 1);
                let mut seen = HashSet::new();
                let words = raw_words
                    .iter()
                    .map(|w| Word::new(w.as_ref(), level))
                    .filter(|w| !w.key().is_empty())
                    .filter(|w| seen.insert(w.key().to_string()))
                    .collect();
                LevelList { name: name.trim().to_string(), words }
            })
            .collect();

        WordCatalog { levels }
    }

    /// Load a word list, choosing the parser from the file extension
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let catalog = match extension.as_str() {
            "" | "txt" => Self::parse_text(&fs::read_to_string(path)?)?,
            "csv" => Self::parse_csv(path)?,
            "xlsx" | "xls" => Self::parse_excel(path)?,
            _ => return Err(CatalogError::UnsupportedFormat(extension)),
        };

        info!(
            "Loaded {} levels ({} words) from {}",
            catalog.level_count(),
            catalog.levels.iter().map(|l| l.words.len()).sum::<usize>(),
            path.display()
        );
        Ok(catalog)
    }

    /// Parse the level-block text format: a `%Name` line opens a level, every
    /// following non-blank line is one word.
    pub fn parse_text(input: &str) -> Result<Self, CatalogError> {
        let mut groups: Vec<(String, Vec<&str>)> = Vec::new();

        for (line_no, line) in input.lines().enumerate() {
            if let Some(name) = line.trim_start().strip_prefix(LEVEL_MARKER) {
                groups.push((name.to_string(), Vec::new()));
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            match groups.last_mut() {
                Some((_, words)) => words.push(line),
                None => return Err(CatalogError::WordBeforeLevel(line_no + 1)),
            }
        }

        if groups.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self::from_levels(groups))
    }

    /// Parse a CSV file with `Level` and `Word` header columns
    pub fn parse_csv(path: &Path) -> Result<Self, CatalogError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
        let mapping = detect_columns(&headers)?;

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let level = record.get(mapping.level).unwrap_or("").trim().to_string();
            let word = record.get(mapping.word).unwrap_or("").trim().to_string();
            rows.push((level, word));
        }

        group_rows(rows)
    }

    /// Parse the first sheet of a spreadsheet with `Level` and `Word` header columns
    pub fn parse_excel(path: &Path) -> Result<Self, CatalogError> {
        let mut workbook =
            open_workbook_auto(path).map_err(|e| CatalogError::Excel(e.to_string()))?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| CatalogError::Excel("No sheets found".to_string()))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| CatalogError::Excel(e.to_string()))?;

        let mut sheet_rows = range.rows();
        let header_row = sheet_rows.next().ok_or(CatalogError::Empty)?;
        let headers: Vec<String> = header_row.iter().map(get_cell_string).collect();
        let mapping = detect_columns(&headers)?;

        let rows = sheet_rows
            .map(|row| {
                let cell = |i: usize| row.get(i).map(get_cell_string).unwrap_or_default();
                (cell(mapping.level), cell(mapping.word))
            })
            .collect();

        group_rows(rows)
    }

    pub fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn max_level(&self) -> Level {
        Level::new(self.level_count())
    }

    /// Level names in level order
    pub fn level_names(&self) -> Vec<&str> {
        self.levels.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn level_name(&self, level: Level) -> Option<&str> {
        self.level(level).map(|l| l.name.as_str())
    }

    /// Reject level ids outside `1..=level_count`
    pub fn check_level(&self, level: Level) -> Result<(), ValidationError> {
        check_level_bounds(level, self.level_count())
    }

    /// Full word pool of a level; empty for unknown levels
    pub fn words(&self, level: Level) -> &[Word] {
        self.level(level).map(|l| l.words.as_slice()).unwrap_or(&[])
    }

    /// Uniform random, non-repeating draw of `min(count, available)` words
    pub fn draw_words(&self, level: Level, count: usize) -> Result<Vec<Word>, ValidationError> {
        self.draw_words_with(level, count, &mut rand::thread_rng())
    }

    pub fn draw_words_with<R: Rng + ?Sized>(
        &self,
        level: Level,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<Word>, ValidationError> {
        self.check_level(level)?;
        let mut drawn: Vec<Word> = self
            .words(level)
            .choose_multiple(rng, count)
            .cloned()
            .collect();
        // choose_multiple does not promise a random order
        drawn.shuffle(rng);
        debug!("Drew {} of {} requested words from level {}", drawn.len(), count, level);
        Ok(drawn)
    }

    fn level(&self, level: Level) -> Option<&LevelList> {
        if level.get() == 0 {
            return None;
        }
        self.levels.get(level.index())
    }
}

pub(crate) fn check_level_bounds(level: Level, max: u32) -> Result<(), ValidationError> {
    if level.get() == 0 || level.get() > max {
        return Err(ValidationError::LevelOutOfRange { level: level.get(), max });
    }
    Ok(())
}

/// Column index mapping for tabular word lists
#[derive(Debug, Default, Clone)]
struct ColumnMapping {
    level: usize,
    word: usize,
}

/// Detect column indices from header names
fn detect_columns(headers: &[String]) -> Result<ColumnMapping, CatalogError> {
    let mut level = None;
    let mut word = None;

    for (i, header) in headers.iter().enumerate() {
        match header.to_lowercase().trim() {
            "level" | "list" | "name" => level = level.or(Some(i)),
            "word" | "words" | "spelling" => word = word.or(Some(i)),
            _ => {}
        }
    }

    Ok(ColumnMapping {
        level: level.ok_or(CatalogError::MissingColumn("Level"))?,
        word: word.ok_or(CatalogError::MissingColumn("Word"))?,
    })
}

/// Group (level name, word) rows by level, keeping first-appearance order
fn group_rows(rows: Vec<(String, String)>) -> Result<WordCatalog, CatalogError> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();

    for (level, word) in rows {
        if level.is_empty() || word.is_empty() {
            continue;
        }
        match groups.iter_mut().find(|(name, _)| *name == level) {
            Some((_, words)) => words.push(word),
            None => groups.push((level, vec![word])),
        }
    }

    if groups.is_empty() {
        return Err(CatalogError::Empty);
    }
    Ok(WordCatalog::from_levels(groups))
}

/// Helper to extract string from Excel cell
fn get_cell_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
        Data::Empty => String::new(),
    }
}

//! Annotation-table store for the dictionary-style IHM input format.
//!
//! The input file holds named tables either as `loop_` blocks (a run of
//! `_table.field` header lines followed by whitespace-separated value rows)
//! or as bare `_table.field value` pairs that fold into one-row tables.
//! Values may be single- or double-quoted, or span lines as `;`-delimited
//! text fields. The store is parsed once, keeps only the tables the caller
//! asked for, and is read-only afterwards.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CifError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse {
        line: usize,
        kind: CifParseErrorKind,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CifParseErrorKind {
    #[error("Unterminated quoted value")]
    UnterminatedQuote,
    #[error("Unterminated multiline text field")]
    UnterminatedTextField,
    #[error("Value '{value}' outside any table")]
    LooseValue { value: String },
    #[error("Tag '{tag}' is not followed by a value")]
    TagWithoutValue { tag: String },
    #[error("Loop over table '{table}' ended mid-row ({given} of {expected} values)")]
    IncompleteLoopRow {
        table: String,
        given: usize,
        expected: usize,
    },
    #[error("Loop keyword is not followed by any tags")]
    EmptyLoop,
    #[error("Table '{table}' is given both as a loop and as key-value pairs")]
    MixedTableDefinition { table: String },
}

/// A required table or field was absent where the caller did not allow it.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SchemaError {
    #[error("Required table '{0}' is missing")]
    MissingTable(String),
    #[error("Table '{table}' has no field '{field}'")]
    MissingField { table: String, field: String },
}

/// True for the `?` (unknown) and `.` (omitted) placeholder values.
pub fn is_placeholder(value: &str) -> bool {
    value == "?" || value == "."
}

/// One named annotation table: an ordered field list and rows of string values.
///
/// Placeholder values (`?` unknown, `.` omitted) pass through verbatim;
/// callers test for them where the distinction matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    fields: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    /// Projects every row onto `names`, in the order given.
    ///
    /// A requested field absent from the table is a [`SchemaError`] unless
    /// `allow_missing` is set, in which case it yields an empty string in
    /// each row.
    pub fn fields(
        &self,
        names: &[&str],
        allow_missing: bool,
    ) -> Result<Vec<Vec<String>>, SchemaError> {
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            match self.fields.iter().position(|f| f == name) {
                Some(i) => indices.push(Some(i)),
                None if allow_missing => indices.push(None),
                None => {
                    return Err(SchemaError::MissingField {
                        table: self.name.clone(),
                        field: (*name).to_string(),
                    });
                }
            }
        }
        let rows = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|i| i.map_or_else(String::new, |i| row[i].clone()))
                    .collect()
            })
            .collect();
        Ok(rows)
    }
}

/// All wanted tables from one input file, plus the directory the file lives
/// in (every relative file reference inside the tables resolves against it).
#[derive(Debug)]
pub struct TableStore {
    directory: PathBuf,
    tables: HashMap<String, Table>,
}

impl TableStore {
    /// Reads `path`, keeping only tables named in `wanted` (all tables if
    /// `wanted` is empty).
    pub fn read(path: &Path, wanted: &[&str]) -> Result<Self, CifError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let directory = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
        Self::from_reader(&mut reader, directory, wanted)
    }

    pub fn from_reader(
        reader: &mut impl BufRead,
        directory: PathBuf,
        wanted: &[&str],
    ) -> Result<Self, CifError> {
        let lines = reader.lines().collect::<Result<Vec<_>, _>>()?;
        let tables = parse_tables(&lines, wanted)?;
        Ok(Self { directory, tables })
    }

    /// Table lookup; an absent table is `None`, never an error.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Table lookup for tables the import cannot proceed without.
    pub fn required(&self, name: &str) -> Result<&Table, SchemaError> {
        self.tables
            .get(name)
            .ok_or_else(|| SchemaError::MissingTable(name.to_string()))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Resolves a file reference from a table relative to the input file.
    pub fn resolve_path(&self, relative: &str) -> PathBuf {
        self.directory.join(relative)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    /// `_table.field`, split at the first dot.
    Tag { table: String, field: String },
    Value(String),
    Loop,
    DataBlock,
}

struct Tokenizer<'a> {
    lines: &'a [String],
    line_idx: usize,
    col: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(lines: &'a [String]) -> Self {
        Self {
            lines,
            line_idx: 0,
            col: 0,
        }
    }

    /// Current 1-based line number for error reporting.
    fn line_number(&self) -> usize {
        self.line_idx + 1
    }

    fn next_token(&mut self) -> Result<Option<Token>, CifError> {
        loop {
            let Some(line) = self.lines.get(self.line_idx) else {
                return Ok(None);
            };

            // Multiline text fields start with ';' in the first column.
            if self.col == 0 && line.starts_with(';') {
                return self.read_text_field().map(Some);
            }

            let rest = &line[self.col..];
            let trimmed = rest.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                self.line_idx += 1;
                self.col = 0;
                continue;
            }
            self.col += rest.len() - trimmed.len();

            let token = match trimmed.chars().next() {
                Some(quote @ ('\'' | '"')) => self.read_quoted(quote)?,
                _ => self.read_bare(),
            };
            return Ok(Some(classify(token)));
        }
    }

    fn read_bare(&mut self) -> String {
        let line = &self.lines[self.line_idx];
        let rest = &line[self.col..];
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let token = rest[..end].to_string();
        self.col += end;
        token
    }

    fn read_quoted(&mut self, quote: char) -> Result<String, CifError> {
        let line = &self.lines[self.line_idx];
        let rest = &line[self.col + 1..];
        // The closing quote must be followed by whitespace or end the line.
        let mut close = None;
        for (i, c) in rest.char_indices() {
            if c == quote {
                let followed = rest[i + 1..].chars().next();
                if followed.is_none() || followed.is_some_and(char::is_whitespace) {
                    close = Some(i);
                    break;
                }
            }
        }
        let Some(end) = close else {
            return Err(CifError::Parse {
                line: self.line_number(),
                kind: CifParseErrorKind::UnterminatedQuote,
            });
        };
        let value = rest[..end].to_string();
        self.col += 1 + end + 1;
        Ok(value)
    }

    fn read_text_field(&mut self) -> Result<Token, CifError> {
        let start_line = self.line_number();
        let mut text = self.lines[self.line_idx][1..].to_string();
        self.line_idx += 1;
        self.col = 0;
        loop {
            let Some(line) = self.lines.get(self.line_idx) else {
                return Err(CifError::Parse {
                    line: start_line,
                    kind: CifParseErrorKind::UnterminatedTextField,
                });
            };
            if line.starts_with(';') {
                self.line_idx += 1;
                self.col = 0;
                return Ok(Token::Value(text));
            }
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(line);
            self.line_idx += 1;
        }
    }
}

fn classify(token: String) -> Token {
    let lower = token.to_ascii_lowercase();
    if lower == "loop_" {
        Token::Loop
    } else if lower.starts_with("data_") {
        Token::DataBlock
    } else if let Some(tag) = token.strip_prefix('_') {
        match tag.split_once('.') {
            Some((table, field)) => Token::Tag {
                table: table.to_string(),
                field: field.to_string(),
            },
            None => Token::Tag {
                table: tag.to_string(),
                field: String::new(),
            },
        }
    } else {
        Token::Value(token)
    }
}

fn parse_tables(lines: &[String], wanted: &[&str]) -> Result<HashMap<String, Table>, CifError> {
    let mut tokenizer = Tokenizer::new(lines);
    let mut tables: HashMap<String, Table> = HashMap::new();

    let mut pending = tokenizer.next_token()?;
    while let Some(token) = pending.take() {
        match token {
            Token::DataBlock => {
                pending = tokenizer.next_token()?;
            }
            Token::Loop => {
                pending = parse_loop(&mut tokenizer, &mut tables)?;
            }
            Token::Tag { table, field } => {
                // Bare key-value pair; consecutive pairs for one table fold
                // into a single row.
                let line = tokenizer.line_number();
                match tokenizer.next_token()? {
                    Some(Token::Value(value)) => {
                        let entry = tables.entry(table.clone()).or_insert_with(|| Table {
                            name: table.clone(),
                            fields: Vec::new(),
                            rows: vec![Vec::new()],
                        });
                        // A pair may only extend the single folded row;
                        // appending a column to a loop table would leave its
                        // other rows short.
                        if entry.rows.len() != 1 || entry.fields.len() != entry.rows[0].len() {
                            return Err(CifError::Parse {
                                line,
                                kind: CifParseErrorKind::MixedTableDefinition { table },
                            });
                        }
                        entry.fields.push(field);
                        entry.rows[0].push(value);
                        pending = tokenizer.next_token()?;
                    }
                    _ => {
                        return Err(CifError::Parse {
                            line,
                            kind: CifParseErrorKind::TagWithoutValue { tag: field },
                        });
                    }
                }
            }
            Token::Value(value) => {
                return Err(CifError::Parse {
                    line: tokenizer.line_number(),
                    kind: CifParseErrorKind::LooseValue { value },
                });
            }
        }
    }

    if !wanted.is_empty() {
        tables.retain(|name, _| wanted.contains(&name.as_str()));
    }
    Ok(tables)
}

/// Parses one `loop_` block and returns the first token following it.
fn parse_loop(
    tokenizer: &mut Tokenizer,
    tables: &mut HashMap<String, Table>,
) -> Result<Option<Token>, CifError> {
    let loop_line = tokenizer.line_number();
    let mut table_name = None;
    let mut fields = Vec::new();

    let mut token = tokenizer.next_token()?;
    while let Some(Token::Tag { table, field }) = token {
        if table_name.is_none() {
            table_name = Some(table);
        }
        fields.push(field);
        token = tokenizer.next_token()?;
    }
    let Some(name) = table_name else {
        return Err(CifError::Parse {
            line: loop_line,
            kind: CifParseErrorKind::EmptyLoop,
        });
    };

    // Value rows may span physical lines; tokens accumulate until each row
    // has one value per header.
    let mut rows = Vec::new();
    let mut row = Vec::with_capacity(fields.len());
    while let Some(Token::Value(value)) = token {
        row.push(value);
        if row.len() == fields.len() {
            rows.push(std::mem::take(&mut row));
            row = Vec::with_capacity(fields.len());
        }
        token = tokenizer.next_token()?;
    }
    if !row.is_empty() {
        return Err(CifError::Parse {
            line: tokenizer.line_number(),
            kind: CifParseErrorKind::IncompleteLoopRow {
                table: name,
                given: row.len(),
                expected: fields.len(),
            },
        });
    }

    tables.insert(
        name.clone(),
        Table {
            name,
            fields,
            rows,
        },
    );
    Ok(token)
}

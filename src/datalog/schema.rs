// src/datalog/schema.rs
//
// Schema tracking for variable-width records.
// The sender decides how many values a record carries, so the schema is just
// a value count: `timestamp` followed by `field1..fieldN`.

pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const FIELD_DELIMITER: char = ',';

/// Column layout of the active log file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    value_count: usize,
}

impl Schema {
    /// Header-only placeholder used before the first record arrives
    pub fn placeholder() -> Self {
        Self { value_count: 0 }
    }

    pub fn with_values(value_count: usize) -> Self {
        Self { value_count }
    }

    pub fn value_count(&self) -> usize {
        self.value_count
    }

    /// Total columns, timestamp included
    pub fn width(&self) -> usize {
        self.value_count + 1
    }

    pub fn field_names(&self) -> Vec<String> {
        std::iter::once(TIMESTAMP_FIELD.to_string())
            .chain((1..=self.value_count).map(|i| format!("field{}", i)))
            .collect()
    }
}

/// Split a record into its raw values. Surrounding whitespace of the whole
/// line is trimmed; values themselves are kept verbatim.
pub fn split_record(line: &str) -> Vec<String> {
    line.trim()
        .split(FIELD_DELIMITER)
        .map(str::to_string)
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    Unchanged,
    Changed(Schema),
}

/// Holds the current schema and detects width changes record by record.
#[derive(Debug, Default)]
pub struct SchemaTracker {
    current: Schema,
}

impl SchemaTracker {
    pub fn new() -> Self {
        Self {
            current: Schema::placeholder(),
        }
    }

    pub fn current(&self) -> &Schema {
        &self.current
    }

    /// Compare the record's width with the current schema, adopting the
    /// candidate when it differs.
    pub fn classify<S: AsRef<str>>(&mut self, values: &[S]) -> Classification {
        let candidate = Schema::with_values(values.len());
        if candidate == self.current {
            Classification::Unchanged
        } else {
            self.current = candidate.clone();
            Classification::Changed(candidate)
        }
    }
}

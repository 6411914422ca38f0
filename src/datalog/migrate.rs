// src/datalog/migrate.rs
//
// Log migration on schema change.
// Existing rows are moved into a fresh file whose header matches the new
// schema, padded with empty values or truncated to the new width. The old
// file is deleted only once the new one is fully written and synced; on any
// earlier failure the old file stays active and untouched.

use std::path::PathBuf;

use super::log_file::{read_data_rows, LogFile, LogNaming};
use super::schema::Schema;
use crate::error::MigrationError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The file already matches the schema
    Unchanged,
    /// No data rows yet: the header was rewritten in place
    HeaderRewritten,
    /// Rows were moved into a new file and the old one deleted
    Migrated {
        from: PathBuf,
        to: PathBuf,
        rows: usize,
    },
}

/// Resize a row to exactly `width` columns, keeping its leading values in order.
pub fn fit_row(mut row: Vec<String>, width: usize) -> Vec<String> {
    row.resize(width, String::new());
    row
}

/// Bring `log` in line with `schema`. On success `log` refers to the file
/// that now holds every row; on failure it still refers to the old file,
/// except for `RemoveOld`, where the new file is already active.
pub fn migrate(
    log: &mut LogFile,
    schema: &Schema,
    naming: &LogNaming,
) -> Result<MigrationOutcome, MigrationError> {
    if log.schema() == schema {
        return Ok(MigrationOutcome::Unchanged);
    }

    if log.data_rows() == 0 {
        log.rewrite_header(schema).map_err(MigrationError::Header)?;
        return Ok(MigrationOutcome::HeaderRewritten);
    }

    log.flush().map_err(MigrationError::Read)?;
    let rows = read_data_rows(log.path()).map_err(MigrationError::Read)?;

    let mut replacement =
        LogFile::create_avoiding(naming, schema, Some(log.path())).map_err(MigrationError::Create)?;

    let width = schema.width();
    let transferred = rows
        .into_iter()
        .try_fold(0usize, |count, row| {
            replacement.write_row(&fit_row(row, width)).map(|_| count + 1)
        })
        .and_then(|count| replacement.flush().map(|_| count));

    let count = match transferred {
        Ok(count) => count,
        Err(source) => {
            let path = replacement.path().to_path_buf();
            drop(replacement);
            if let Err(e) = std::fs::remove_file(&path) {
                tlog_error!(
                    "[migrate] Could not remove incomplete file {}: {}",
                    path.display(),
                    e
                );
            }
            return Err(MigrationError::Transfer { path, source });
        }
    };

    let old = std::mem::replace(log, replacement);
    let from = old.path().to_path_buf();
    drop(old);

    std::fs::remove_file(&from).map_err(|source| MigrationError::RemoveOld {
        path: from.clone(),
        source,
    })?;

    Ok(MigrationOutcome::Migrated {
        from,
        to: log.path().to_path_buf(),
        rows: count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn csv_files(dir: &std::path::Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().map_or(false, |x| x == "csv"))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_fit_row_pads_and_truncates() {
        assert_eq!(fit_row(values(&["ts", "1"]), 4), values(&["ts", "1", "", ""]));
        assert_eq!(fit_row(values(&["ts", "1", "2", "3"]), 2), values(&["ts", "1"]));
        assert_eq!(fit_row(values(&["ts", "1"]), 2), values(&["ts", "1"]));
    }

    #[test]
    fn test_unchanged_schema_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let naming = LogNaming::new(dir.path(), "data");
        let mut log = LogFile::create(&naming, &Schema::with_values(2)).unwrap();
        log.append_record("t1", &values(&["1", "2"])).unwrap();
        let before = log.path().to_path_buf();

        let outcome = migrate(&mut log, &Schema::with_values(2), &naming).unwrap();

        assert_eq!(outcome, MigrationOutcome::Unchanged);
        assert_eq!(log.path(), before.as_path());
        assert_eq!(csv_files(dir.path()), vec![before]);
    }

    #[test]
    fn test_first_schema_rewrites_header_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let naming = LogNaming::new(dir.path(), "data");
        let mut log = LogFile::create(&naming, &Schema::placeholder()).unwrap();
        let path = log.path().to_path_buf();

        let outcome = migrate(&mut log, &Schema::with_values(2), &naming).unwrap();

        assert_eq!(outcome, MigrationOutcome::HeaderRewritten);
        assert_eq!(log.path(), path.as_path());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "timestamp,field1,field2\n"
        );
        assert_eq!(csv_files(dir.path()).len(), 1);
    }

    #[test]
    fn test_widening_pads_old_rows() {
        let dir = tempfile::tempdir().unwrap();
        let naming = LogNaming::new(dir.path(), "data");
        let mut log = LogFile::create(&naming, &Schema::with_values(2)).unwrap();
        log.append_record("t1", &values(&["10", "20"])).unwrap();
        log.append_record("t2", &values(&["11", "21"])).unwrap();
        let old_path = log.path().to_path_buf();

        let outcome = migrate(&mut log, &Schema::with_values(3), &naming).unwrap();

        match outcome {
            MigrationOutcome::Migrated { from, to, rows } => {
                assert_eq!(from, old_path);
                assert_eq!(to.as_path(), log.path());
                assert_eq!(rows, 2);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!old_path.exists());
        assert_eq!(csv_files(dir.path()), vec![log.path().to_path_buf()]);
        assert_eq!(
            std::fs::read_to_string(log.path()).unwrap(),
            "timestamp,field1,field2,field3\nt1,10,20,\nt2,11,21,\n"
        );
        assert_eq!(log.data_rows(), 2);
    }

    #[test]
    fn test_narrowing_truncates_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let naming = LogNaming::new(dir.path(), "data");
        let mut log = LogFile::create(&naming, &Schema::with_values(4)).unwrap();
        for i in 0..5 {
            let ts = format!("t{}", i);
            log.append_record(&ts, &values(&["a", "b", "c", "d"])).unwrap();
        }

        migrate(&mut log, &Schema::with_values(1), &naming).unwrap();

        let rows = read_data_rows(log.path()).unwrap();
        assert_eq!(rows.len(), 5);
        for (i, row) in rows.iter().enumerate() {
            let ts = format!("t{}", i);
            assert_eq!(row, &values(&[ts.as_str(), "a"]));
        }
    }

    #[test]
    fn test_unreadable_old_file_keeps_log() {
        let dir = tempfile::tempdir().unwrap();
        let naming = LogNaming::new(dir.path(), "data");
        let mut log = LogFile::create(&naming, &Schema::with_values(1)).unwrap();
        log.append_record("t1", &values(&["1"])).unwrap();
        let path = log.path().to_path_buf();

        // Simulate the old file vanishing underneath the session
        std::fs::remove_file(&path).unwrap();

        let err = migrate(&mut log, &Schema::with_values(2), &naming).unwrap_err();

        assert!(matches!(err, MigrationError::Read(_)));
        assert_eq!(log.path(), path.as_path());
        assert!(csv_files(dir.path()).is_empty());
    }

    #[test]
    fn test_uncreatable_new_file_keeps_old() {
        let dir = tempfile::tempdir().unwrap();
        let naming = LogNaming::new(dir.path(), "data");
        let mut log = LogFile::create(&naming, &Schema::with_values(1)).unwrap();
        log.append_record("t1", &values(&["1"])).unwrap();
        let path = log.path().to_path_buf();

        let broken = LogNaming::new(dir.path().join("gone"), "data");
        let err = migrate(&mut log, &Schema::with_values(2), &broken).unwrap_err();

        assert!(matches!(err, MigrationError::Create(_)));
        assert_eq!(log.path(), path.as_path());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "timestamp,field1\nt1,1\n"
        );

        // The old file keeps accepting rows
        log.append_record("t2", &values(&["2", "3"])).unwrap();
        assert_eq!(read_data_rows(&path).unwrap().len(), 2);
    }
}

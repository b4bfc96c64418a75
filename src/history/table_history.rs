use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, StringArray},
    datatypes::Schema as ArrowSchema,
    record_batch::RecordBatch,
};
use chrono::{NaiveDate, Utc};
use glob::glob;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::{
    collections::HashSet,
    fs::{self, File},
    io::BufWriter,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::{debug, info};

const CONSOLIDATED: &str = "consolidated.parquet";

/// A row type stored in a `TableHistory`.
/// - Defines schema, to_arrays, unique_key for writes.
/// - Names the key column so existing files can be scanned on open.
pub trait HistoryRow: Sized {
    /// Column index for the dedupe key in schema. Must be a Utf8 column.
    const KEY_COLUMN: usize;
    /// Partition date (UTC naive) for hive partitioning
    fn partition_date(&self) -> NaiveDate;
    /// Arrow schema for this row type
    fn schema() -> ArrowSchema;
    /// Convert this row into single-row column arrays matching the schema
    fn to_arrays(&self) -> Vec<ArrayRef>;
    /// Unique dedupe key for this row
    fn unique_key(&self) -> String;

    /// Extract the dedupe key from an existing batch row.
    fn extract_key(batch: &RecordBatch, row: usize) -> Option<String> {
        batch
            .column(Self::KEY_COLUMN)
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|arr| arr.value(row).to_string())
    }
}

/// Generic hive-partitioned history table:
/// `<base>/<table>/date=YYYYMMDD/<key>---<ts>.parquet`, one row per file until
/// `vacuum` folds a partition into a single `consolidated.parquet`.
pub struct TableHistory<R: HistoryRow> {
    base_dir: PathBuf,
    table: String,
    schema: Arc<ArrowSchema>,
    seen: Mutex<HashSet<String>>,
    _marker: PhantomData<R>,
}

/// Keys end up in file names; keep them to a portable character set.
fn safe_file_stem(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl<R: HistoryRow> TableHistory<R> {
    /// Open (creating if needed) the table and scan existing keys into `seen`.
    pub fn new(base_dir: impl Into<PathBuf>, table: &str) -> Result<Self> {
        let base_dir = base_dir.into();
        let table_dir = base_dir.join(table);
        fs::create_dir_all(&table_dir)
            .with_context(|| format!("could not create `{}`", table_dir.display()))?;

        let schema = Arc::new(R::schema());
        let mut seen = HashSet::new();

        for part in fs::read_dir(&table_dir)
            .with_context(|| format!("listing `{}`", table_dir.display()))?
        {
            let part = part?;
            if !part.file_type()?.is_dir() {
                continue;
            }
            for path in parquet_files(&part.path())? {
                scan_keys::<R>(&path, &mut seen)?;
            }
        }
        info!(table, keys = seen.len(), "history table opened");

        Ok(Self {
            base_dir,
            table: table.to_string(),
            schema,
            seen: Mutex::new(seen),
            _marker: PhantomData,
        })
    }

    fn table_dir(&self) -> PathBuf {
        self.base_dir.join(&self.table)
    }

    /// Add a new row. Returns `false` (and writes nothing) when its key is
    /// already present.
    pub fn add(&self, row: &R) -> Result<bool> {
        let key = row.unique_key();
        if self.contains(&key) {
            debug!(key = %key, "history row already present");
            return Ok(false);
        }

        let partition = format!("date={}", row.partition_date().format("%Y%m%d"));
        let dir = self.table_dir().join(partition);
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create `{}`", dir.display()))?;

        let ts = Utc::now().timestamp_micros();
        let fname = format!("{}---{}.parquet", safe_file_stem(&key), ts);
        let tmp = dir.join(format!("{}.tmp", fname));
        let final_path = dir.join(&fname);

        let file = File::create(&tmp)
            .with_context(|| format!("could not create temporary file `{}`", tmp.display()))?;
        let mut writer = ArrowWriter::try_new(BufWriter::new(file), self.schema.clone(), None)
            .context("creating ArrowWriter for history row")?;
        let batch = RecordBatch::try_new(self.schema.clone(), row.to_arrays())
            .context("building RecordBatch for history row")?;
        writer.write(&batch).context("writing history row")?;
        writer.close().context("closing history writer")?;
        fs::rename(&tmp, &final_path).with_context(|| {
            format!(
                "failed to rename `{}` to `{}`",
                tmp.display(),
                final_path.display()
            )
        })?;

        self.seen.lock().expect("history lock poisoned").insert(key);
        Ok(true)
    }

    /// Check if a row exists by its dedupe key
    pub fn contains(&self, key: &str) -> bool {
        self.seen.lock().expect("history lock poisoned").contains(key)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().expect("history lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vacuum each partition into one consolidated file, then delete the
    /// per-row files that were folded in.
    pub fn vacuum(&self) -> Result<()> {
        for part in fs::read_dir(self.table_dir())? {
            let part = part?;
            if !part.file_type()?.is_dir() {
                continue;
            }
            let dir = part.path();

            let files = parquet_files(&dir)?;
            let singles = files
                .iter()
                .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some(CONSOLIDATED))
                .count();
            if singles == 0 {
                continue;
            }

            let tmp = dir.join(format!("{}.tmp", CONSOLIDATED));
            let file = File::create(&tmp)
                .with_context(|| format!("could not create `{}`", tmp.display()))?;
            let mut writer =
                ArrowWriter::try_new(BufWriter::new(file), self.schema.clone(), None)
                    .context("creating ArrowWriter for consolidated Parquet")?;

            for p in &files {
                let f = File::open(p).with_context(|| format!("failed to open `{}`", p.display()))?;
                let mut reader = ParquetRecordBatchReaderBuilder::try_new(f)?
                    .with_batch_size(1024)
                    .build()?;
                while let Some(batch) = reader.next().transpose()? {
                    writer.write(&batch)?;
                }
            }
            writer
                .close()
                .context("closing ArrowWriter for consolidated Parquet")?;
            fs::rename(&tmp, dir.join(CONSOLIDATED))?;

            for p in files {
                if p.file_name().and_then(|n| n.to_str()) != Some(CONSOLIDATED) {
                    fs::remove_file(&p)
                        .with_context(|| format!("failed to delete `{}`", p.display()))?;
                }
            }
            info!(partition = %dir.display(), merged = singles, "vacuumed history partition");
        }
        Ok(())
    }
}

fn parquet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(glob(&format!("{}/*.parquet", dir.display()))?
        .filter_map(Result::ok)
        .collect())
}

fn scan_keys<R: HistoryRow>(path: &Path, seen: &mut HashSet<String>) -> Result<()> {
    let file = File::open(path).with_context(|| format!("failed to open `{}`", path.display()))?;
    let mut reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet metadata of `{}`", path.display()))?
        .with_batch_size(1024)
        .build()?;
    while let Some(batch) = reader.next().transpose()? {
        for i in 0..batch.num_rows() {
            if let Some(key) = R::extract_key(&batch, i) {
                seen.insert(key);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field};
    use tempfile::tempdir;

    struct Note {
        key: String,
        day: NaiveDate,
    }

    impl HistoryRow for Note {
        const KEY_COLUMN: usize = 0;

        fn partition_date(&self) -> NaiveDate {
            self.day
        }

        fn schema() -> ArrowSchema {
            ArrowSchema::new(vec![Field::new("key", DataType::Utf8, false)])
        }

        fn to_arrays(&self) -> Vec<ArrayRef> {
            vec![Arc::new(StringArray::from(vec![self.key.clone()]))]
        }

        fn unique_key(&self) -> String {
            self.key.clone()
        }
    }

    fn note(key: &str, d: u32) -> Note {
        Note {
            key: key.to_string(),
            day: NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
        }
    }

    fn count(tmp: &Path) -> usize {
        glob(&format!("{}/notes/*/*.parquet", tmp.display()))
            .unwrap()
            .filter_map(Result::ok)
            .count()
    }

    #[test]
    fn partitions_by_date() {
        let tmp = tempdir().unwrap();
        let hist = TableHistory::<Note>::new(tmp.path(), "notes").unwrap();
        hist.add(&note("a", 1)).unwrap();
        hist.add(&note("b", 2)).unwrap();

        assert!(tmp.path().join("notes/date=20240101").is_dir());
        assert!(tmp.path().join("notes/date=20240102").is_dir());
        assert_eq!(count(tmp.path()), 2);
    }

    #[test]
    fn unsafe_key_characters_are_replaced_in_file_names() {
        let tmp = tempdir().unwrap();
        let hist = TableHistory::<Note>::new(tmp.path(), "notes").unwrap();
        assert!(hist.add(&note("dir/report 1.png", 1)).unwrap());
        assert!(hist.contains("dir/report 1.png"));

        let names: Vec<String> = glob(&format!("{}/notes/*/*.parquet", tmp.path().display()))
            .unwrap()
            .filter_map(Result::ok)
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("dir_report_1.png---"));
    }

    #[test]
    fn vacuum_twice_keeps_one_file_per_partition() {
        let tmp = tempdir().unwrap();
        let hist = TableHistory::<Note>::new(tmp.path(), "notes").unwrap();
        hist.add(&note("a", 1)).unwrap();
        hist.add(&note("b", 1)).unwrap();
        hist.vacuum().unwrap();
        hist.add(&note("c", 1)).unwrap();
        hist.vacuum().unwrap();

        assert_eq!(count(tmp.path()), 1);
        let reopened = TableHistory::<Note>::new(tmp.path(), "notes").unwrap();
        assert_eq!(reopened.len(), 3);
    }
}

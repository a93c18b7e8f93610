/// Newline-delimited JSON table files
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Read every record of a table file. A missing file is an empty table;
/// lines that fail to parse are logged and skipped.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> io::Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist yet", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut records = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!("{}:{}: skipping malformed record: {}", path.display(), n + 1, e),
        }
    }
    Ok(records)
}

/// Serialize records one per line
pub fn to_lines<'a, T, I>(records: I) -> Result<Vec<String>, serde_json::Error>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    records.into_iter().map(serde_json::to_string).collect()
}

/// A pending table file write
#[derive(Debug, Clone)]
pub struct FileWrite {
    pub path: PathBuf,
    pub lines: Vec<String>,
}

impl FileWrite {
    pub fn new(path: PathBuf, lines: Vec<String>) -> Self {
        Self { path, lines }
    }

    /// Write to a sibling temp file, then rename over the target
    pub fn write(&self) -> io::Result<()> {
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for line in &self.lines {
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!("wrote {} records to {}", self.lines.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: String,
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let rows: Vec<Row> = read_records(&dir.path().join("none.jsonl")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_write_then_read_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.jsonl");
        let rows = vec![Row { id: "1".into() }, Row { id: "2".into() }];
        let mut lines = to_lines(&rows).unwrap();
        lines.insert(1, "{not json".to_string());
        FileWrite::new(path.clone(), lines).write().unwrap();

        let back: Vec<Row> = read_records(&path).unwrap();
        assert_eq!(back, rows);
        assert!(!path.with_extension("jsonl.tmp").exists());
    }
}

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, create_dir_all, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Manifest written next to every job output directory.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub job: String,
    pub created_at: String,
    pub counters: BTreeMap<String, u64>,
    pub version: u32,
}

pub const META_FILE: &str = "_meta.json";
pub const SUCCESS_FILE: &str = "_SUCCESS";

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// Name of the `n`th reduce output file, Hadoop style.
pub fn part_file_name(n: usize) -> String {
    format!("part-r-{n:05}")
}

/// Expand an input path: a file is used as is, a directory yields its data
/// files (names starting with `_` or `.` are bookkeeping and skipped).
pub fn resolve_inputs(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(Error::Config(format!("input path {} does not exist", path.display())));
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy();
            !name.starts_with('_') && !name.starts_with('.')
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

/// Lines of every file behind `path`, in file order.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for file in resolve_inputs(path)? {
        let reader = BufReader::new(File::open(&file)?);
        for line in reader.lines() {
            lines.push(line?);
        }
    }
    Ok(lines)
}

/// Stream the lines of every file behind `path` to `f`.
pub fn for_each_line<F>(path: &Path, mut f: F) -> Result<()>
where
    F: FnMut(&str),
{
    for file in resolve_inputs(path)? {
        let reader = BufReader::new(File::open(&file)?);
        for line in reader.lines() {
            f(&line?);
        }
    }
    Ok(())
}

/// Remove and recreate a job output directory.
pub fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    create_dir_all(dir)?;
    Ok(())
}

pub fn write_lines<I, S>(path: &Path, lines: I) -> Result<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = BufWriter::new(File::create(path)?);
    let mut written = 0;
    for line in lines {
        out.write_all(line.as_ref().as_bytes())?;
        out.write_all(b"\n")?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

/// Concatenate the data files of a job output directory into one file.
pub fn concat_parts(dir: &Path, dest: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(dest)?);
    for part in resolve_inputs(dir)? {
        let mut buf = Vec::new();
        File::open(part)?.read_to_end(&mut buf)?;
        out.write_all(&buf)?;
    }
    out.flush()?;
    Ok(())
}

pub fn save_meta(dir: &Path, meta: &MetaFile) -> Result<()> {
    create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(meta)?;
    fs::write(dir.join(META_FILE), json)?;
    fs::write(dir.join(SUCCESS_FILE), b"")?;
    Ok(())
}

pub fn load_meta(dir: &Path) -> Result<MetaFile> {
    let buf = fs::read_to_string(dir.join(META_FILE))?;
    Ok(serde_json::from_str(&buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn directory_inputs_skip_bookkeeping_files() {
        let dir = tempdir().unwrap();
        write_lines(&dir.path().join(part_file_name(1)), ["b"]).unwrap();
        write_lines(&dir.path().join(part_file_name(0)), ["a"]).unwrap();
        fs::write(dir.path().join(SUCCESS_FILE), b"").unwrap();
        fs::write(dir.path().join(".part-r-00000.crc"), b"junk").unwrap();

        assert_eq!(read_lines(dir.path()).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn missing_input_is_a_config_error() {
        let dir = tempdir().unwrap();
        let err = resolve_inputs(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

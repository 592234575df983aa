//! A small in-process map/reduce runtime.
//!
//! Map tasks run over contiguous splits of the input lines, reduce tasks over
//! hash partitions of the map output. Both phases run on the rayon pool.
//! Every task returns its own [`Counters`]; the driver sums them, so no task
//! shares mutable state with another.

use crate::error::{Error, Result};
use crate::persist::{part_file_name, read_lines, reset_dir, save_meta, write_lines, MetaFile};
use rayon::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const MAP_INPUT_RECORDS: &str = "map_input_records";
pub const MAP_SKIPPED_RECORDS: &str = "map_skipped_records";
pub const MAP_OUTPUT_RECORDS: &str = "map_output_records";
pub const REDUCE_INPUT_GROUPS: &str = "reduce_input_groups";
pub const REDUCE_OUTPUT_RECORDS: &str = "reduce_output_records";

/// Named 64-bit counters, summed across tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counters(BTreeMap<String, u64>);

impl Counters {
    pub fn incr(&mut self, name: &str, by: u64) {
        *self.0.entry(name.to_string()).or_insert(0) += by;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: Counters) {
        for (name, value) in other.0 {
            *self.0.entry(name).or_insert(0) += value;
        }
    }

    pub fn into_inner(self) -> BTreeMap<String, u64> { self.0 }
}

/// A batch job: `map` turns one input line into key/value pairs, `reduce`
/// turns all values of one key into at most one output line.
pub trait Job: Sync {
    type Key: Ord + Hash + Send;
    type Value: Send;

    fn name(&self) -> String;

    /// Emit pairs for one record. On error nothing emitted for the record is kept.
    fn map(&self, line: &str, out: &mut Vec<(Self::Key, Self::Value)>) -> anyhow::Result<()>;

    fn reduce(&self, key: &Self::Key, values: Vec<Self::Value>, counters: &mut Counters) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct JobConfig {
    pub map_tasks: usize,
    pub reduce_tasks: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        let threads = rayon::current_num_threads().max(1);
        Self { map_tasks: threads, reduce_tasks: threads.min(8) }
    }
}

impl JobConfig {
    pub fn validate(&self) -> Result<()> {
        if self.map_tasks == 0 || self.reduce_tasks == 0 {
            return Err(Error::Config("map and reduce task counts must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct JobReport {
    pub counters: Counters,
    pub output: PathBuf,
    pub parts: Vec<PathBuf>,
}

fn partition_of<K: Hash>(key: &K, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

fn map_split<J: Job>(job: &J, split: &[String], partitions: usize) -> (Vec<Vec<(J::Key, J::Value)>>, Counters) {
    let mut counters = Counters::default();
    let mut buckets: Vec<Vec<(J::Key, J::Value)>> = (0..partitions).map(|_| Vec::new()).collect();
    let mut out = Vec::new();

    for line in split {
        // The trailing empty line of a line-delimited file is expected.
        if line.trim().is_empty() {
            continue;
        }
        counters.incr(MAP_INPUT_RECORDS, 1);
        out.clear();
        if let Err(e) = job.map(line, &mut out) {
            counters.incr(MAP_SKIPPED_RECORDS, 1);
            tracing::warn!(job = %job.name(), error = %e, record = %line, "skipping unparsable record");
            continue;
        }
        counters.incr(MAP_OUTPUT_RECORDS, out.len() as u64);
        for (key, value) in out.drain(..) {
            let p = partition_of(&key, partitions);
            buckets[p].push((key, value));
        }
    }
    (buckets, counters)
}

fn reduce_partition<J: Job>(job: &J, mut pairs: Vec<(J::Key, J::Value)>, path: &Path) -> Result<Counters> {
    let mut counters = Counters::default();
    // Stable sort keeps map order among the values of one key.
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut lines = Vec::new();
    let mut iter = pairs.into_iter().peekable();
    while let Some((key, first)) = iter.next() {
        let mut values = vec![first];
        while iter.peek().map_or(false, |(next, _)| *next == key) {
            if let Some((_, v)) = iter.next() {
                values.push(v);
            }
        }
        counters.incr(REDUCE_INPUT_GROUPS, 1);
        if let Some(line) = job.reduce(&key, values, &mut counters) {
            lines.push(line);
        }
    }
    let written = write_lines(path, &lines)?;
    counters.incr(REDUCE_OUTPUT_RECORDS, written as u64);
    Ok(counters)
}

/// Run `job` over every line behind `input`, writing `part-r-NNNNN` files
/// plus `_meta.json` and `_SUCCESS` into a freshly reset `output`.
pub fn run<J: Job>(job: &J, input: &Path, output: &Path, config: &JobConfig) -> Result<JobReport> {
    config.validate()?;
    let start = Instant::now();
    let lines = read_lines(input)?;
    reset_dir(output)?;

    let split_len = lines.len().div_ceil(config.map_tasks).max(1);
    tracing::info!(
        job = %job.name(),
        records = lines.len(),
        map_tasks = lines.chunks(split_len).len(),
        reduce_tasks = config.reduce_tasks,
        "job started"
    );

    let mapped: Vec<_> = lines
        .par_chunks(split_len)
        .map(|split| map_split(job, split, config.reduce_tasks))
        .collect();

    let mut counters = Counters::default();
    let mut partitions: Vec<Vec<(J::Key, J::Value)>> = (0..config.reduce_tasks).map(|_| Vec::new()).collect();
    for (buckets, task_counters) in mapped {
        counters.merge(task_counters);
        for (p, bucket) in buckets.into_iter().enumerate() {
            partitions[p].extend(bucket);
        }
    }

    let parts: Vec<PathBuf> = (0..config.reduce_tasks).map(|n| output.join(part_file_name(n))).collect();
    let reduced: Vec<Result<Counters>> = partitions
        .into_par_iter()
        .zip(parts.par_iter())
        .map(|(pairs, path)| reduce_partition(job, pairs, path))
        .collect();
    for task_counters in reduced {
        counters.merge(task_counters.map_err(|e| Error::Job { job: job.name(), reason: e.to_string() })?);
    }

    save_meta(output, &MetaFile {
        job: job.name(),
        created_at: crate::persist::now_rfc3339(),
        counters: counters.clone().into_inner(),
        version: 1,
    })?;
    tracing::info!(job = %job.name(), ?counters, elapsed = ?start.elapsed(), "job complete");
    Ok(JobReport { counters, output: output.to_path_buf(), parts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{load_meta, read_lines, write_lines};
    use tempfile::tempdir;

    struct WordCount;

    impl Job for WordCount {
        type Key = String;
        type Value = u64;

        fn name(&self) -> String { "word-count".into() }

        fn map(&self, line: &str, out: &mut Vec<(String, u64)>) -> anyhow::Result<()> {
            for word in line.split_whitespace() {
                out.push((word.to_string(), 1));
                if word == "bad" {
                    anyhow::bail!("bad record");
                }
            }
            Ok(())
        }

        fn reduce(&self, key: &String, values: Vec<u64>, counters: &mut Counters) -> Option<String> {
            let total: u64 = values.iter().sum();
            counters.incr("words", total);
            Some(format!("{key}\t{total}"))
        }
    }

    #[test]
    fn groups_all_values_of_a_key_across_splits() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.txt");
        write_lines(&input, ["a b", "b c", "", "a a bad", "c"]).unwrap();
        let output = dir.path().join("out");

        let config = JobConfig { map_tasks: 3, reduce_tasks: 2 };
        let report = run(&WordCount, &input, &output, &config).unwrap();

        let mut lines = read_lines(&output).unwrap();
        lines.sort();
        assert_eq!(lines, vec!["a\t1", "b\t2", "c\t2"]);
        assert_eq!(report.counters.get(MAP_INPUT_RECORDS), 4);
        assert_eq!(report.counters.get(MAP_SKIPPED_RECORDS), 1);
        assert_eq!(report.counters.get("words"), 5);
        assert_eq!(report.parts.len(), 2);
        assert_eq!(load_meta(&output).unwrap().counters["words"], 5);
    }

    #[test]
    fn zero_tasks_is_rejected() {
        let dir = tempdir().unwrap();
        let config = JobConfig { map_tasks: 0, reduce_tasks: 1 };
        assert!(run(&WordCount, dir.path(), &dir.path().join("o"), &config).is_err());
    }
}

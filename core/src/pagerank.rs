//! PageRank Engine: iterative map/reduce over the link graph.
//!
//! Each iteration reads `docId,rank \t outlinks` lines and writes the same
//! shape. The reduce stage reports `|newRank - previousRank| / epsilon`
//! (truncated) through the `convergence` counter, which the driver sums
//! after the iteration to decide whether to stop.
//!
//! A page without outlinks shares its rank evenly among every other page,
//! so the ranks of each iteration sum to one.

use crate::codec::RankLine;
use crate::error::{Error, Result};
use crate::index::{DocId, LinkRecord};
use crate::mapreduce::{self, Counters, Job, JobConfig};
use crate::persist::{concat_parts, for_each_line, reset_dir, write_lines};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub const CONVERGENCE: &str = "convergence";
pub const LINK_INPUT: &str = "link-input";
pub const FINAL_OUTPUT: &str = "pagerank.txt";

#[derive(Debug, Clone)]
pub struct PageRankConfig {
    pub damping: f64,
    pub epsilon: f64,
    /// `None` iterates until convergence with no ceiling.
    pub max_iterations: Option<usize>,
    pub job: JobConfig,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self { damping: 0.85, epsilon: 1e-6, max_iterations: Some(100), job: JobConfig::default() }
    }
}

impl PageRankConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.damping > 0.0 && self.damping < 1.0) {
            return Err(Error::Config(format!("damping factor {} is outside (0, 1)", self.damping)));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(Error::Config(format!("convergence epsilon {} must be positive", self.epsilon)));
        }
        if self.max_iterations == Some(0) {
            return Err(Error::Config("max iterations must be at least 1".into()));
        }
        self.job.validate()
    }
}

/// Node id → outlinks, with references to unknown nodes removed.
#[derive(Debug, Default)]
pub struct LinkGraph {
    pub nodes: BTreeMap<DocId, Vec<DocId>>,
    pub dropped_links: usize,
}

impl LinkGraph {
    pub fn from_records(records: impl IntoIterator<Item = LinkRecord>) -> Self {
        Self::with_documents(records, std::iter::empty())
    }

    /// Graph over the link records plus every corpus document, so pages that
    /// are only ever linked to still become (dangling) nodes.
    pub fn with_documents(
        records: impl IntoIterator<Item = LinkRecord>,
        documents: impl IntoIterator<Item = DocId>,
    ) -> Self {
        let mut nodes: BTreeMap<DocId, Vec<DocId>> = documents.into_iter().map(|id| (id, Vec::new())).collect();
        for record in records {
            nodes.insert(record.id, record.links);
        }
        let known: BTreeSet<DocId> = nodes.keys().copied().collect();
        let mut dropped_links = 0;
        for links in nodes.values_mut() {
            let before = links.len();
            links.retain(|target| known.contains(target));
            dropped_links += before - links.len();
        }
        LinkGraph { nodes, dropped_links }
    }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn dangling(&self) -> usize { self.nodes.values().filter(|links| links.is_empty()).count() }
}

#[derive(Deserialize)]
struct DocumentRef {
    id: DocId,
}

/// Ids of a corpus index or data file.
pub fn read_document_ids(path: &Path) -> Result<BTreeSet<DocId>> {
    let mut ids = BTreeSet::new();
    for_each_line(path, |line| {
        if line.trim().is_empty() {
            return;
        }
        match serde_json::from_str::<DocumentRef>(line) {
            Ok(doc) => {
                ids.insert(doc.id);
            }
            Err(e) => tracing::warn!(error = %e, record = %line, "skipping unparsable document record"),
        }
    })?;
    Ok(ids)
}

pub fn read_link_graph(path: &Path, documents: Option<&Path>) -> Result<LinkGraph> {
    let mut records = Vec::new();
    for_each_line(path, |line| {
        if line.trim().is_empty() {
            return;
        }
        match serde_json::from_str::<LinkRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(error = %e, record = %line, "skipping unparsable link record"),
        }
    })?;
    let documents = match documents {
        Some(path) => read_document_ids(path)?,
        None => BTreeSet::new(),
    };
    Ok(LinkGraph::with_documents(records, documents))
}

/// Write the first iteration's input: every node at rank `1/N`.
pub fn write_link_input(graph: &LinkGraph, path: &Path) -> Result<()> {
    let initial = 1.0 / graph.len() as f64;
    let total = graph.len();
    let lines = graph.nodes.iter().enumerate().map(|(i, (&doc_id, links))| {
        if (i + 1) % 10_000 == 0 || i + 1 == total {
            tracing::info!(lines = i + 1, "link input progress");
        }
        RankLine { doc_id, rank: initial, outlinks: links.clone() }.to_string()
    });
    write_lines(path, lines)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub enum RankMessage {
    Contribution(f64),
    Outlinks(Vec<DocId>),
    PreviousRank(f64),
}

pub struct PageRankJob {
    pub damping: f64,
    pub documents: usize,
    pub scale: f64,
    pub iteration: usize,
    /// Summed previous rank of every node without outlinks.
    pub dangling_mass: f64,
}

impl Job for PageRankJob {
    type Key = DocId;
    type Value = RankMessage;

    fn name(&self) -> String { format!("pagerank-iteration-{}", self.iteration) }

    fn map(&self, line: &str, out: &mut Vec<(DocId, RankMessage)>) -> anyhow::Result<()> {
        let RankLine { doc_id, rank, outlinks } = line.parse::<RankLine>()?;
        if !outlinks.is_empty() {
            let share = rank / outlinks.len() as f64;
            out.extend(outlinks.iter().map(|&target| (target, RankMessage::Contribution(share))));
        }
        out.push((doc_id, RankMessage::Outlinks(outlinks)));
        out.push((doc_id, RankMessage::PreviousRank(rank)));
        Ok(())
    }

    fn reduce(&self, doc_id: &DocId, messages: Vec<RankMessage>, counters: &mut Counters) -> Option<String> {
        let mut received = 0.0;
        let mut previous = None;
        let mut outlinks = Vec::new();
        for message in messages {
            match message {
                RankMessage::Contribution(share) => received += share,
                RankMessage::Outlinks(links) => outlinks = links,
                RankMessage::PreviousRank(r) => previous = Some(r),
            }
        }
        let Some(previous) = previous else {
            tracing::warn!(doc_id, "contribution for a document outside the graph");
            return None;
        };
        // Dangling rank goes to every node except the one it came from; a
        // lone node keeps its own.
        if self.documents > 1 {
            let own = if outlinks.is_empty() { previous } else { 0.0 };
            received += (self.dangling_mass - own) / (self.documents - 1) as f64;
        } else {
            received += self.dangling_mass;
        }
        let rank = (1.0 - self.damping) / self.documents as f64 + self.damping * received;
        let scaled = ((rank - previous).abs() * self.scale) as u64;
        counters.incr(CONVERGENCE, scaled);
        Some(RankLine { doc_id: *doc_id, rank, outlinks }.to_string())
    }
}

#[derive(Debug)]
pub struct PageRankReport {
    pub documents: usize,
    pub dangling: usize,
    pub dropped_links: usize,
    pub iterations: usize,
    /// Summed scaled convergence counter of each iteration.
    pub convergence_history: Vec<u64>,
    pub converged: bool,
    pub output: PathBuf,
}

/// Summed rank of the nodes without outlinks in a rank file or directory.
pub fn dangling_mass(path: &Path) -> Result<f64> {
    let mut mass = 0.0;
    for_each_line(path, |line| {
        if let Ok(parsed) = line.parse::<RankLine>() {
            if parsed.outlinks.is_empty() {
                mass += parsed.rank;
            }
        }
    })?;
    Ok(mass)
}

/// Run PageRank over the link file(s) at `links`, writing iteration
/// directories and the final `pagerank.txt` into `output`.
///
/// `documents` (a corpus index or data file) adds every corpus page as a
/// node; without it the nodes are the link records alone.
pub fn run_pagerank(links: &Path, documents: Option<&Path>, output: &Path, config: &PageRankConfig) -> Result<PageRankReport> {
    config.validate()?;
    let graph = read_link_graph(links, documents)?;
    if graph.is_empty() {
        return Err(Error::Config(format!("no documents in link graph {}", links.display())));
    }
    reset_dir(output)?;
    tracing::info!(
        documents = graph.len(),
        dangling = graph.dangling(),
        dropped_links = graph.dropped_links,
        "link graph loaded"
    );

    let mut input = output.join(LINK_INPUT);
    write_link_input(&graph, &input)?;

    let mut history = Vec::new();
    let mut converged = false;
    let mut iteration = 0;
    loop {
        iteration += 1;
        let job = PageRankJob {
            damping: config.damping,
            documents: graph.len(),
            scale: 1.0 / config.epsilon,
            iteration,
            dangling_mass: dangling_mass(&input)?,
        };
        let iteration_output = output.join(format!("iteration-{iteration}"));
        let report = mapreduce::run(&job, &input, &iteration_output, &config.job)?;

        let scaled = report.counters.get(CONVERGENCE);
        let convergence = scaled as f64 * config.epsilon;
        history.push(scaled);
        tracing::info!(iteration, scaled_convergence = scaled, convergence, "pagerank iteration finished");
        input = iteration_output;

        if convergence < config.epsilon {
            converged = true;
            tracing::info!(iteration, "pagerank converged");
            break;
        }
        if config.max_iterations.map_or(false, |max| iteration >= max) {
            tracing::warn!(iteration, convergence, "pagerank stopped at the iteration limit before converging");
            break;
        }
    }

    let final_output = output.join(FINAL_OUTPUT);
    concat_parts(&input, &final_output)?;
    Ok(PageRankReport {
        documents: graph.len(),
        dangling: graph.dangling(),
        dropped_links: graph.dropped_links,
        iterations: iteration,
        convergence_history: history,
        converged,
        output: final_output,
    })
}

/// Ranks of a PageRank output file or directory.
pub fn read_ranks(path: &Path) -> Result<BTreeMap<DocId, f64>> {
    let mut ranks = BTreeMap::new();
    for_each_line(path, |line| {
        if let Ok(parsed) = line.parse::<RankLine>() {
            ranks.insert(parsed.doc_id, parsed.rank);
        }
    })?;
    Ok(ranks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn links_file(dir: &Path, records: &[(DocId, &[DocId])]) -> PathBuf {
        let path = dir.join("link.json");
        let lines: Vec<String> = records
            .iter()
            .map(|(id, links)| serde_json::json!({ "id": id, "links": links }).to_string())
            .collect();
        write_lines(&path, lines).unwrap();
        path
    }

    fn config(max_iterations: usize) -> PageRankConfig {
        PageRankConfig {
            max_iterations: Some(max_iterations),
            job: JobConfig { map_tasks: 2, reduce_tasks: 2 },
            ..Default::default()
        }
    }

    #[test]
    fn drops_links_to_unknown_documents() {
        let graph = LinkGraph::from_records(vec![
            LinkRecord { id: 0, links: vec![1, 99] },
            LinkRecord { id: 1, links: vec![0] },
        ]);
        assert_eq!(graph.dropped_links, 1);
        assert_eq!(graph.nodes[&0], vec![1]);
    }

    #[test]
    fn corpus_documents_become_nodes() {
        let graph = LinkGraph::with_documents(vec![LinkRecord { id: 0, links: vec![1, 5, 99] }], [0, 1, 5]);
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.dropped_links, 1);
        assert_eq!(graph.nodes[&0], vec![1, 5]);
        assert_eq!(graph.dangling(), 2);
    }

    #[test]
    fn pages_without_outlinks_share_their_rank() {
        let dir = tempdir().unwrap();
        let links = links_file(dir.path(), &[(0, &[1]), (1, &[0, 2])]);
        let index = dir.path().join("index.json");
        write_lines(&index, [r#"{"id":0,"title":"A"}"#, r#"{"id":1,"title":"B"}"#, r#"{"id":2,"title":"C"}"#]).unwrap();
        let out = dir.path().join("pr");
        let report = run_pagerank(&links, Some(&index), &out, &config(500)).unwrap();

        assert!(report.converged);
        assert_eq!((report.documents, report.dangling, report.dropped_links), (3, 1, 0));
        for iteration in 1..=report.iterations {
            let total: f64 = read_ranks(&out.join(format!("iteration-{iteration}"))).unwrap().values().sum();
            assert!((total - 1.0).abs() < 1e-9, "iteration {iteration} sums to {total}");
        }
        let ranks = read_ranks(&report.output).unwrap();
        assert_eq!(ranks.len(), 3);
        assert!(ranks[&1] > ranks[&0], "{ranks:?}");
        assert!(ranks[&0] > ranks[&2], "{ranks:?}");
        assert!((ranks[&2] - 0.2339).abs() < 1e-3, "{ranks:?}");
    }

    #[test]
    fn rank_mass_is_conserved_every_iteration() {
        let dir = tempdir().unwrap();
        let links = links_file(dir.path(), &[(0, &[1]), (1, &[0, 2]), (2, &[0])]);
        let out = dir.path().join("pr");
        let report = run_pagerank(&links, None, &out, &config(500)).unwrap();
        assert!(report.converged);

        for iteration in 1..=report.iterations {
            let ranks = read_ranks(&out.join(format!("iteration-{iteration}"))).unwrap();
            let total: f64 = ranks.values().sum();
            assert!((total - 1.0).abs() < 1e-9, "iteration {iteration} sums to {total}");
        }
    }

    #[test]
    fn convergence_counter_shrinks_to_zero() {
        let dir = tempdir().unwrap();
        let links = links_file(dir.path(), &[(0, &[1]), (1, &[0]), (2, &[0])]);
        let report = run_pagerank(&links, None, &dir.path().join("pr"), &config(500)).unwrap();

        assert!(report.converged);
        let history = &report.convergence_history;
        assert!(history.len() > 2);
        assert!(history.windows(2).all(|w| w[1] <= w[0]), "{history:?}");
        assert!(history[history.len() - 1] < history[0]);
        assert_eq!(*history.last().unwrap(), 0);
    }

    #[test]
    fn mutual_links_are_stable_from_the_start() {
        let dir = tempdir().unwrap();
        let links = links_file(dir.path(), &[(0, &[1]), (1, &[0])]);
        let report = run_pagerank(&links, None, &dir.path().join("pr"), &config(10)).unwrap();
        assert!(report.converged);
        assert_eq!(report.iterations, 1);
        let ranks = read_ranks(&report.output).unwrap();
        assert!((ranks[&0] - 0.5).abs() < 1e-12);
        assert!((ranks[&1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn iteration_limit_is_reported_not_fatal() {
        let dir = tempdir().unwrap();
        let links = links_file(dir.path(), &[(0, &[1]), (1, &[0]), (2, &[0])]);
        let report = run_pagerank(&links, None, &dir.path().join("pr"), &config(2)).unwrap();
        assert!(!report.converged);
        assert_eq!(report.iterations, 2);
        assert_eq!(read_ranks(&report.output).unwrap().len(), 3);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let bad = PageRankConfig { damping: 1.5, ..Default::default() };
        assert!(matches!(bad.validate(), Err(Error::Config(_))));
        let bad = PageRankConfig { epsilon: 0.0, ..Default::default() };
        assert!(bad.validate().is_err());
    }
}

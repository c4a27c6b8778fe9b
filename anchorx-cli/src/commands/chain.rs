//! Chain command - chain grouped anchors from a TSV file

use anchorx_accel::BackendKind;
use anchorx_core::{radix, Anchor, Arena, ChainOutput, Chainer};
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::CliError;

const STRAND_BIT: u64 = 1 << 63;

/// Chaining results of one anchor group
#[derive(Debug, Serialize)]
pub struct GroupResult {
    pub group: String,
    pub chains: Vec<ChainRecord>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChainRecord {
    pub score: i32,
    pub count: i32,
    pub strand: char,
    pub ref_start: u64,
    pub ref_end: u64,
    pub query_start: i32,
    pub query_end: i32,
}

impl ChainRecord {
    fn from_members(score: i32, count: i32, members: &[Anchor]) -> Self {
        let first = members.first().copied().unwrap_or_default();
        let last = members.last().copied().unwrap_or_default();
        Self {
            score,
            count,
            strand: char::from(first.strand()),
            ref_start: first.ref_key() & !STRAND_BIT,
            ref_end: last.ref_key() & !STRAND_BIT,
            query_start: first.query_pos(),
            query_end: last.query_pos(),
        }
    }
}

/// Read `group ref_pos query_pos span [segment]` lines, one Vec per group.
pub fn read_anchor_groups(path: &Path) -> Result<BTreeMap<String, Vec<Anchor>>> {
    if !path.exists() {
        return Err(CliError::file_not_found(path.to_path_buf()).into());
    }
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open anchor file: {}", path.display()))?;
    let name = path.display().to_string();

    let mut groups: BTreeMap<String, Vec<Anchor>> = BTreeMap::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(CliError::from)?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (group, anchor) = parse_anchor_line(line)
            .map_err(|message| CliError::parse(name.as_str(), format!("line {}: {}", line_no + 1, message)))?;
        groups.entry(group.to_string()).or_default().push(anchor);
    }
    Ok(groups)
}

fn parse_anchor_line(line: &str) -> std::result::Result<(&str, Anchor), String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 4 || fields.len() > 5 {
        return Err(format!("expected 4 or 5 columns, found {}", fields.len()));
    }
    let ref_pos: i64 = fields[1]
        .parse()
        .map_err(|_| format!("invalid reference position '{}'", fields[1]))?;
    let query_pos: u32 = fields[2]
        .parse()
        .map_err(|_| format!("invalid query position '{}'", fields[2]))?;
    let span: u8 = fields[3]
        .parse()
        .map_err(|_| format!("invalid span '{}' (0-255)", fields[3]))?;
    let segment: u8 = match fields.get(4) {
        Some(field) => field
            .parse()
            .map_err(|_| format!("invalid segment '{}' (0-255)", field))?,
        None => 0,
    };
    Ok((fields[0], Anchor::new(ref_pos, query_pos, span, segment)))
}

/// Chain every group in parallel, one arena and backend per worker.
pub fn chain_groups(
    config: &Config,
    kind: BackendKind,
    groups: BTreeMap<String, Vec<Anchor>>,
) -> Result<Vec<GroupResult>> {
    let chainer = Chainer::new(config.chain.clone()).map_err(CliError::from)?;
    // surface an unavailable device before spawning workers
    super::open_backend(kind)?;

    let groups: Vec<(String, Vec<Anchor>)> = groups.into_iter().collect();
    groups
        .into_par_iter()
        .map_init(
            || (Arena::from_config(&config.arena), super::open_backend(kind)),
            |(km, backend), (group, mut anchors)| -> Result<GroupResult> {
                let backend = backend
                    .as_mut()
                    .map_err(|err| CliError::backend(kind.to_string(), err.to_string()))?;
                radix::sort(&mut anchors);
                let output = chainer.chain(&anchors, Some(km), &mut **backend);
                log::debug!("Group {}: {} anchors, {} chains", group, anchors.len(), output.len());
                Ok(GroupResult {
                    chains: records(&output),
                    group,
                })
            },
        )
        .collect()
}

fn records(output: &ChainOutput) -> Vec<ChainRecord> {
    output
        .iter()
        .map(|(chain, members)| ChainRecord::from_members(chain.score, chain.count, members))
        .collect()
}

pub fn write_tsv<W: Write>(results: &[GroupResult], writer: &mut W) -> Result<()> {
    writeln!(writer, "#group\tchain\tscore\tcount\tstrand\tref_start\tref_end\tquery_start\tquery_end")?;
    for result in results {
        for (i, r) in result.chains.iter().enumerate() {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                result.group, i, r.score, r.count, r.strand, r.ref_start, r.ref_end, r.query_start, r.query_end
            )?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn execute(
    config: &Config,
    input: PathBuf,
    output: Option<PathBuf>,
    format: Option<String>,
    backend: Option<BackendKind>,
    min_score: Option<i32>,
    min_count: Option<i32>,
) -> Result<()> {
    // Use CLI args, then config, then defaults
    let mut config = config.clone();
    if let Some(min_score) = min_score {
        config.chain.min_score = min_score;
    }
    if let Some(min_count) = min_count {
        config.chain.min_count = min_count;
    }
    if let Some(format) = format {
        config.general.output_format = format;
    }
    config.validate()?;
    let kind = backend.unwrap_or(config.accel.backend);

    log::info!("Reading anchors from {}", input.display());
    let groups = read_anchor_groups(&input)?;
    let n_anchors: usize = groups.values().map(Vec::len).sum();
    log::info!("Loaded {} anchors in {} groups", n_anchors, groups.len());

    let results = chain_groups(&config, kind, groups)?;
    let n_chains: usize = results.iter().map(|r| r.chains.len()).sum();
    log::info!("Found {} chains using the {} backend", n_chains, kind);

    let mut writer: Box<dyn Write> = match &output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    match config.general.output_format.as_str() {
        "json" => {
            serde_json::to_writer_pretty(&mut writer, &results).context("Failed to write JSON output")?;
            writeln!(writer)?;
        }
        _ => write_tsv(&results, &mut writer).context("Failed to write TSV output")?,
    }
    writer.flush()?;
    Ok(())
}

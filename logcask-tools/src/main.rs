// Copyright 2025 LogCask contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! cask-filter CLI
//!
//! Filter pack tooling for the query orchestrator:
//!
//! ```bash
//! # Decide which archives a query could match
//! cask-filter scan --pack-path filters.clpf --archives a1,a2,a3 \
//!     --query 'msg: error' --output-json result.json
//!
//! # Build a filter pack from a manifest (archive_id<TAB>filter_path per line)
//! cask-filter pack --output filters.clpf --manifest manifest.tsv \
//!     --output-json result.json
//! ```
//!
//! Results are written as JSON to `--output-json` so the orchestrator can
//! consume them without parsing logs. Exit code is 0 on success and 1 on
//! any error.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use logcask_filter::pack::{FilterPackBuilder, FilterPackInput};
use logcask_filter::FilterPackReader;
use logcask_query::parse::parse_query;
use logcask_query::pipeline::{ArchiveScanOutcome, SkipDecisionPipeline};

/// Filter pack tooling for LogCask archives
#[derive(Parser)]
#[command(name = "cask-filter")]
#[command(about = "Build filter packs and scan them for query terms")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a filter pack to decide which archives a query could match
    #[command(alias = "filter-scan")]
    Scan {
        /// Path to the filter pack file
        #[arg(long, value_name = "PATH")]
        pack_path: PathBuf,

        /// Comma-separated archive ids to evaluate
        #[arg(long, value_name = "IDS")]
        archives: String,

        /// Query to extract filter terms from
        #[arg(short, long)]
        query: String,

        /// Treat the query as case-insensitive
        #[arg(long)]
        ignore_case: bool,

        /// Write the JSON result to this file
        #[arg(long, value_name = "PATH")]
        output_json: PathBuf,
    },

    /// Build a filter pack from a manifest
    Pack {
        /// Output filter pack path
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,

        /// Manifest file: one `archive_id<TAB>filter_path` per line
        #[arg(long, value_name = "PATH")]
        manifest: PathBuf,

        /// Write the JSON result to this file
        #[arg(long, value_name = "PATH")]
        output_json: PathBuf,
    },
}

#[derive(Serialize)]
struct PackOutput {
    num_filters: usize,
    size: u64,
    index_offset: u64,
    index_size: u64,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version requests are not failures
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    let result = match cli.command {
        Commands::Scan {
            pack_path,
            archives,
            query,
            ignore_case,
            output_json,
        } => run_scan(&pack_path, &archives, &query, ignore_case, &output_json),
        Commands::Pack {
            output,
            manifest,
            output_json,
        } => run_pack(&output, &manifest, &output_json),
    };

    if let Err(err) = result {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run_scan(
    pack_path: &Path,
    archives_csv: &str,
    query: &str,
    ignore_case: bool,
    output_json: &Path,
) -> Result<()> {
    let archive_ids = split_archives(archives_csv);
    if archive_ids.is_empty() {
        let outcome = ArchiveScanOutcome {
            supported: true,
            reason: None,
            passed: Vec::new(),
            total: 0,
            skipped: 0,
        };
        return emit_json(output_json, &outcome);
    }

    let expr = parse_query(query).context("failed to parse query")?;
    let pack = FilterPackReader::open(pack_path)
        .with_context(|| format!("failed to read filter pack {}", pack_path.display()))?;

    let mut pipeline = SkipDecisionPipeline::new();
    let outcome = pipeline
        .scan_archives(&pack, &archive_ids, &expr, ignore_case)
        .context("filter scan failed")?;

    emit_json(output_json, &outcome)
}

fn run_pack(output: &Path, manifest_path: &Path, output_json: &Path) -> Result<()> {
    let inputs = read_manifest(manifest_path)
        .with_context(|| format!("failed to read manifest {}", manifest_path.display()))?;

    let result = FilterPackBuilder::build(output, &inputs)
        .with_context(|| format!("failed to build filter pack {}", output.display()))?;

    emit_json(
        output_json,
        &PackOutput {
            num_filters: result.num_filters,
            size: result.size,
            index_offset: result.index_offset,
            index_size: result.index_size,
        },
    )
}

fn split_archives(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect()
}

fn read_manifest(path: &Path) -> Result<Vec<FilterPackInput>> {
    let file = File::open(path)?;
    let mut inputs = Vec::new();

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((archive_id, filter_path)) = line.split_once('\t') else {
            bail!("invalid manifest line {}", line_no + 1);
        };
        if archive_id.is_empty() || filter_path.is_empty() {
            bail!("invalid manifest line {}", line_no + 1);
        }

        inputs.push(FilterPackInput {
            archive_id: archive_id.to_owned(),
            filter_path: PathBuf::from(filter_path),
        });
    }

    if inputs.is_empty() {
        bail!("manifest contains no entries");
    }
    Ok(inputs)
}

fn emit_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("failed to open json output file {}", path.display()))?;
    serde_json::to_writer(&mut file, value).context("failed to write json output")?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_archives() {
        assert_eq!(split_archives("a, b ,c"), vec!["a", "b", "c"]);
        assert_eq!(split_archives(" , ,"), Vec::<String>::new());
    }

    #[test]
    fn test_read_manifest() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("manifest.tsv");
        std::fs::write(&path, "# comment\narch-1\t/tmp/a.filter\n\narch-2\t/tmp/b.filter\n").unwrap();

        let inputs = read_manifest(&path).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].archive_id, "arch-1");
        assert_eq!(inputs[1].filter_path, PathBuf::from("/tmp/b.filter"));
    }

    #[test]
    fn test_manifest_without_tab_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.tsv");
        std::fs::write(&path, "arch-1 /tmp/a.filter\n").unwrap();
        assert!(read_manifest(&path).is_err());
    }

    #[test]
    fn test_empty_manifest_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("empty.tsv");
        std::fs::write(&path, "# only comments\n").unwrap();
        assert!(read_manifest(&path).is_err());
    }
}

//! Per-document anonymize / deanonymize drivers.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use rayon::prelude::*;
use tracing::{error, info};

use crate::cli::{Args, Mode};
use deid_core::{OutputPaths, Result as DeidResult};
use deid_ingest::{
    collect_inputs, load_document, write_processed, write_report, write_restore_report,
    InputKind, LoadedDocument, OutputFormat, RedactionPlan, RestoreReport,
};
use deid_runtime::DeidEngine;
use deid_store::{JsonSnapshotFile, MappingSnapshot, MappingStore, SnapshotSink, SnapshotVault};

/// Outcome of a CLI invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub failed: usize,
}

/// Persists one snapshot to several destinations in order.
struct FanoutSink<'a>(Vec<&'a dyn SnapshotSink>);

impl SnapshotSink for FanoutSink<'_> {
    fn persist(&self, snapshot: &MappingSnapshot) -> DeidResult<()> {
        for sink in &self.0 {
            sink.persist(snapshot)?;
        }
        Ok(())
    }
}

pub fn run(args: &Args) -> anyhow::Result<RunSummary> {
    if args.mode == Mode::Deanonymize && args.mappings.is_none() && args.vault.is_none() {
        bail!("deanonymize requires --mappings or --vault");
    }

    let config = args.load_config().context("loading configuration")?;
    let engine = DeidEngine::new(config)?;
    let vault = args
        .vault
        .as_ref()
        .map(SnapshotVault::open)
        .transpose()
        .context("opening snapshot vault")?;

    if !args.input.is_dir() {
        process_file(args, &engine, vault.as_ref(), &args.input)?;
        return Ok(RunSummary {
            processed: 1,
            failed: 0,
        });
    }

    let inputs = collect_inputs(&args.input)
        .with_context(|| format!("listing {}", args.input.display()))?;
    if inputs.is_empty() {
        bail!("no supported input files in {}", args.input.display());
    }
    info!("Processing {} documents from {}", inputs.len(), args.input.display());

    // Each document owns its store, so documents run in parallel.
    let failures: Vec<(PathBuf, anyhow::Error)> = inputs
        .par_iter()
        .filter_map(|path| {
            process_file(args, &engine, vault.as_ref(), path)
                .err()
                .map(|e| (path.clone(), e))
        })
        .collect();
    for (path, e) in &failures {
        error!("{}: {:#}", path.display(), e);
    }

    Ok(RunSummary {
        processed: inputs.len() - failures.len(),
        failed: failures.len(),
    })
}

fn process_file(
    args: &Args,
    engine: &DeidEngine,
    vault: Option<&SnapshotVault>,
    path: &Path,
) -> anyhow::Result<()> {
    let doc = load_document(path).with_context(|| format!("loading {}", path.display()))?;
    let format = args.format.map(OutputFormat::from).unwrap_or(match doc.kind {
        InputKind::PlainText => OutputFormat::Txt,
        _ => OutputFormat::Json,
    });
    let paths = OutputPaths::new(&args.output, path, format.extension())
        .with_context(|| format!("creating {}", args.output.display()))?;

    match args.mode {
        Mode::Anonymize => anonymize_file(args, engine, vault, path, &doc, &paths, format),
        Mode::Deanonymize => deanonymize_file(args, engine, vault, path, &doc, &paths, format),
    }
}

fn anonymize_file(
    args: &Args,
    engine: &DeidEngine,
    vault: Option<&SnapshotVault>,
    path: &Path,
    doc: &LoadedDocument,
    paths: &OutputPaths,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let store = match &args.mappings {
        Some(mappings) => load_mappings(args, mappings, path, &doc.source_document)?,
        None => match vault {
            Some(v) => v.load_store(&doc.source_document)?,
            None => None,
        }
        .unwrap_or_else(|| MappingStore::new(&doc.source_document)),
    };
    if !store.is_empty() {
        info!("Reusing {} existing mappings", store.len());
    }

    let json_sink = JsonSnapshotFile::new(&paths.mappings);
    let mut sinks: Vec<&dyn SnapshotSink> = vec![&json_sink];
    if let Some(v) = vault {
        sinks.push(v);
    }

    let out = engine.anonymize_and_persist(&doc.pages, store, &FanoutSink(sinks))?;

    write_processed(&paths.processed, &doc.source_document, &out.pages, format)?;
    write_report(&paths.report_json, &paths.report_txt, &out.report)?;
    if engine.config().project_boxes {
        RedactionPlan::from_report(&out.report).write(&paths.redactions)?;
    }

    info!(
        "{}: {} substitutions -> {}",
        path.display(),
        out.report.total_occurrences(),
        paths.processed.display()
    );
    Ok(())
}

fn deanonymize_file(
    args: &Args,
    engine: &DeidEngine,
    vault: Option<&SnapshotVault>,
    path: &Path,
    doc: &LoadedDocument,
    paths: &OutputPaths,
    format: OutputFormat,
) -> anyhow::Result<()> {
    // A corrupt snapshot aborts here, before anything is written.
    let store = match (&args.mappings, vault) {
        (Some(mappings), _) => load_mappings(args, mappings, path, &doc.source_document)?,
        (None, Some(v)) => vault_store(v, &doc.source_document, path)?,
        (None, None) => bail!("deanonymize requires --mappings or --vault"),
    };

    let out = engine.deanonymize(&doc.page_texts(), &store)?;

    let stem = source_stem(path);
    let restored = paths.root.join(format!("{stem}_restored.{}", format.extension()));
    write_processed(&restored, &doc.source_document, &out.pages, format)?;
    write_restore_report(
        &paths.root.join(format!("{stem}_restore_report.json")),
        &RestoreReport {
            source_document: &doc.source_document,
            replacements: out.replacements,
            warnings: &out.warnings,
        },
    )?;

    info!(
        "{}: {} replacements, {} warnings -> {}",
        path.display(),
        out.replacements,
        out.warnings.len(),
        restored.display()
    );
    Ok(())
}

fn load_mappings(
    args: &Args,
    mappings: &Path,
    input: &Path,
    source_document: &str,
) -> anyhow::Result<MappingStore> {
    let file = JsonSnapshotFile::new(mappings_path(mappings, input));
    let store = if args.legacy_mappings {
        file.load_legacy(source_document)
    } else {
        file.load()
    };
    store.with_context(|| format!("loading mappings {}", file.path().display()))
}

/// Snapshot for `source_document`, or else the single vault document whose
/// stem matches the input's. Paged text output carries no source name, so
/// `contact_processed.txt` finds the snapshot saved for `contact.pdf`.
fn vault_store(
    vault: &SnapshotVault,
    source_document: &str,
    input: &Path,
) -> anyhow::Result<MappingStore> {
    if let Some(store) = vault.load_store(source_document)? {
        return Ok(store);
    }

    let stem = source_stem(input);
    let matches: Vec<String> = vault
        .list()?
        .into_iter()
        .map(|s| s.source_document)
        .filter(|doc| Path::new(doc).file_stem().and_then(|s| s.to_str()) == Some(stem))
        .collect();
    match matches.as_slice() {
        [only] => {
            info!("Using vault snapshot {:?} for {}", only, input.display());
            vault
                .load_store(only)?
                .ok_or_else(|| anyhow!("vault snapshot {:?} disappeared", only))
        }
        [] => bail!("no snapshot for {:?} in vault", source_document),
        _ => bail!(
            "several vault snapshots match {:?}: {}",
            stem,
            matches.join(", ")
        ),
    }
}

/// `mappings` itself, or `<stem>_mappings.json` inside it when it is a
/// directory. A `_processed` suffix on the input stem is ignored so an
/// anonymize output directory can be fed straight back.
fn mappings_path(mappings: &Path, input: &Path) -> PathBuf {
    if !mappings.is_dir() {
        return mappings.to_path_buf();
    }
    mappings.join(format!("{}_mappings.json", source_stem(input)))
}

/// Input stem with any `_processed` suffix removed.
fn source_stem(input: &Path) -> &str {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    stem.strip_suffix("_processed").unwrap_or(stem)
}

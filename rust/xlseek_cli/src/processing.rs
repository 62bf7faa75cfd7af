use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{
    debug,
    info,
    warn,
};
use xlseek::index::{
    SpecificCleavage,
    VariableModifications,
};
use xlseek::models::PeptideSource;
use xlseek::search::{
    BufferedSink,
    FilterSink,
    JsonLinesSink,
    QueueScanSource,
    SinkStack,
};
use xlseek::{
    CrossLinker,
    DecoyMarking,
    FragmentTable,
    IndexBuilder,
    Modification,
    Peptide,
    ResidueLadder,
    RunSummary,
    Scan,
    SearchOrchestrator,
    SearchPipeline,
};

use crate::config::{
    OutputConfig,
    SearchConfig,
};
use crate::errors::CliError;

#[derive(Debug, Deserialize)]
pub struct SearchInput {
    pub residue_masses: BTreeMap<char, f64>,
    pub crosslinkers: Vec<CrossLinker>,
    pub peptides: Vec<PeptideRecord>,
    #[serde(default)]
    pub variable_modifications: Option<VariableModifications>,
    /// Only used when variable modifications are given.
    #[serde(default)]
    pub digestion: Option<SpecificCleavage>,
    pub scans: Vec<Scan>,
}

#[derive(Debug, Deserialize)]
pub struct PeptideRecord {
    pub sequence: String,
    #[serde(default)]
    pub modifications: Vec<Modification>,
    #[serde(default)]
    pub decoy: bool,
    #[serde(default)]
    pub proteins: Vec<PeptideSource>,
    #[serde(default)]
    pub protein_n_term: bool,
    #[serde(default)]
    pub protein_c_term: bool,
}

impl SearchInput {
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let st = Instant::now();
        let file = std::fs::File::open(path).map_err(|e| CliError::io(e, path))?;
        let input: SearchInput = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| CliError::DataReading {
                source: format!("{}: {}", path.display(), e),
            })?;
        info!(
            "Loading {} peptides and {} scans took: {:?} for {}",
            input.peptides.len(),
            input.scans.len(),
            st.elapsed(),
            path.display()
        );
        Ok(input)
    }
}

/// Turns the input records into peptides, skipping the ones whose mass
/// cannot be computed with the given residue table.
fn materialize_peptides(records: Vec<PeptideRecord>, ladder: &ResidueLadder) -> Vec<Peptide> {
    let mut skipped = 0;
    let peptides: Vec<Peptide> = records
        .into_iter()
        .filter_map(|rec| {
            let Some(mass) = ladder.peptide_mass(&rec.sequence, &rec.modifications) else {
                debug!("Unknown residue in {}, skipping", rec.sequence);
                skipped += 1;
                return None;
            };
            let marking = if rec.decoy {
                DecoyMarking::Decoy
            } else {
                DecoyMarking::Target
            };
            let mut peptide = Peptide::new(rec.sequence, mass, marking)
                .with_modifications(rec.modifications)
                .with_terminals(rec.protein_n_term, rec.protein_c_term);
            for source in rec.proteins {
                peptide = peptide.with_source(source.protein, source.start);
            }
            Some(peptide)
        })
        .collect();
    if skipped > 0 {
        warn!("Skipped {} peptides with unknown residues", skipped);
    }
    peptides
}

pub fn build_pipeline(
    residue_masses: BTreeMap<char, f64>,
    crosslinkers: Vec<CrossLinker>,
    peptides: Vec<PeptideRecord>,
    variable_modifications: Option<VariableModifications>,
    digestion: Option<SpecificCleavage>,
    config: &SearchConfig,
) -> Result<SearchPipeline, CliError> {
    let ladder = Arc::new(ResidueLadder::new(residue_masses));
    let peptides = materialize_peptides(peptides, &ladder);

    let st = Instant::now();
    let digestion = digestion.unwrap_or_else(SpecificCleavage::trypsin);
    let mut builder = IndexBuilder::new(config.index.clone(), &crosslinkers);
    if let Some(mods) = variable_modifications.as_ref() {
        builder = builder.with_modifications(mods, &digestion);
    }
    let indices = builder.build(peptides);
    info!("Building the peptide indices took: {:?}", st.elapsed());
    if indices.is_empty() {
        return Err(CliError::DataReading {
            source: "no peptide survived index construction".to_string(),
        });
    }

    let st = Instant::now();
    let table = FragmentTable::build(
        indices.iter().cloned().collect(),
        ladder.as_ref(),
        config.scoring.fragment_tolerance,
    );
    info!("Building the fragment table took: {:?}", st.elapsed());

    let pipeline = SearchPipeline::new(
        config.scoring.clone(),
        Arc::new(indices),
        Arc::new(table),
        ladder,
        crosslinkers,
    )?;
    Ok(pipeline)
}

/// Results file at the bottom, then the optional filter, then the buffer the
/// workers write into.
fn build_sinks(config: &SearchConfig, out_path: &Path) -> Result<SinkStack, CliError> {
    let storage = JsonLinesSink::create(out_path)?;
    let mut stack = SinkStack::new(Arc::new(storage));
    if !config.filters.is_empty() {
        let filters = config.filters.clone();
        stack = stack.wrap(|inner| Ok(FilterSink::new(inner, filters)))?;
    }
    let capacity = config.buffer_capacity;
    stack = stack.wrap(|inner| BufferedSink::new(inner, capacity))?;
    Ok(stack)
}

pub fn process_input(
    path: PathBuf,
    config: &SearchConfig,
    output: &OutputConfig,
) -> Result<RunSummary, CliError> {
    info!("Building database from search input {:?}", path);
    let input = SearchInput::from_file(&path)?;
    let pipeline = build_pipeline(
        input.residue_masses,
        input.crosslinkers,
        input.peptides,
        input.variable_modifications,
        input.digestion,
        config,
    )?;

    let results_path = output.directory.join("results.jsonl");
    let sinks = build_sinks(config, &results_path)?;
    let source = QueueScanSource::from(input.scans);

    let orchestrator = SearchOrchestrator::new(
        Arc::new(pipeline),
        Arc::new(source),
        sinks,
        config.orchestrator.clone(),
    );
    let summary = orchestrator.run()?;

    let summary_path = output.directory.join("summary.json");
    let file = std::fs::File::create(&summary_path).map_err(|e| CliError::io(e, &summary_path))?;
    serde_json::to_writer_pretty(file, &summary).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(summary_path.to_string_lossy().to_string()),
    })?;
    info!(
        "Processed {} scans ({} failed), wrote {} results to {}",
        summary.scans_processed,
        summary.scans_failed,
        summary.results,
        results_path.display()
    );
    Ok(summary)
}

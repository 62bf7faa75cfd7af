use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;
use xlseek::search::MatchFilter;
use xlseek::{
    IndexParameters,
    OrchestratorConfig,
    SearchParameters,
};

use crate::cli::Cli;
use crate::errors::CliError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub input: Option<InputConfig>,
    #[serde(default)]
    pub search: SearchConfig,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum InputConfig {
    /// Residue masses, cross-linkers, peptides and scans in one JSON document.
    #[serde(rename = "json")]
    Json { path: PathBuf },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub index: IndexParameters,
    pub scoring: SearchParameters,
    pub orchestrator: OrchestratorConfig,
    /// Batches held between the workers and the results file.
    pub buffer_capacity: usize,
    pub filters: Vec<MatchFilter>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index: IndexParameters::default(),
            scoring: SearchParameters::default(),
            orchestrator: OrchestratorConfig::default(),
            buffer_capacity: 100,
            filters: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, CliError> {
        let file = std::fs::File::open(path).map_err(|e| CliError::io(e, path))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| CliError::ParseError { msg: e.to_string() })
    }

    /// Command line values win over the file.
    pub fn apply_cli_args(&mut self, args: &Cli) -> Result<(), CliError> {
        if let Some(input) = &args.input {
            self.input = Some(InputConfig::Json { path: input.clone() });
        }
        if let Some(output_dir) = &args.output_dir {
            self.output = Some(OutputConfig {
                directory: output_dir.clone(),
            });
        }
        if let Some(threads) = args.threads {
            if threads == 0 {
                return Err(CliError::Config {
                    source: "--threads must be at least 1".to_string(),
                });
            }
            self.search.orchestrator.threads = threads;
        }
        if args.progress {
            self.search.orchestrator.progress_bar = true;
        }
        if self.search.buffer_capacity == 0 {
            return Err(CliError::Config {
                source: "buffer_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

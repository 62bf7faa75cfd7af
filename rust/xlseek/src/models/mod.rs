pub mod crosslinker;
pub mod decoy;
pub mod decoy_strategy;
pub mod match_record;
pub mod peptide;
pub mod spectrum;

pub use crosslinker::CrossLinker;
pub use decoy::DecoyMarking;
pub use decoy_strategy::DecoyReconciliation;
pub use match_record::MatchRecord;
pub use peptide::{
    Modification,
    Peptide,
    PeptideSource,
};
pub use spectrum::{
    Peak,
    Scan,
};

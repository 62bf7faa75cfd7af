pub mod bucket;
pub mod decoy_synthesis;
pub mod expansion;
pub mod fragment_index;
pub mod mass_index;

pub use bucket::MassBucket;
pub use expansion::{
    DigestionRule,
    IndexBuilder,
    IndexParameters,
    IndexRole,
    ModificationExpander,
    PeptideIndices,
    SpecificCleavage,
    VariableModification,
    VariableModifications,
};
pub use fragment_index::{
    Fragment,
    FragmentIndex,
    FragmentSource,
    FragmentTable,
    ResidueLadder,
    Terminality,
};
pub use mass_index::{
    ExpansionSummary,
    InsertOutcome,
    MassIndex,
};

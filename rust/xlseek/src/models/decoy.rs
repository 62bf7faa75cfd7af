use serde::{
    Deserialize,
    Serialize,
};

/// The different labels that denote if a sequence is a decoy or not.
///
/// NOTE: Supplied decoys come from the digestion input. Synthesized decoys were
/// generated by the index itself while reconciling decoys that collided with
/// a sequence-identical target.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, std::hash::Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum DecoyMarking {
    Target,
    Decoy,
    SynthesizedDecoy,
}

impl Default for DecoyMarking {
    fn default() -> Self {
        DecoyMarking::Target
    }
}

impl DecoyMarking {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecoyMarking::Target => "Target",
            DecoyMarking::Decoy => "Decoy",
            DecoyMarking::SynthesizedDecoy => "Decoy",
        }
    }

    pub fn is_decoy(&self) -> bool {
        match self {
            DecoyMarking::Target => false,
            DecoyMarking::Decoy => true,
            DecoyMarking::SynthesizedDecoy => true,
        }
    }

    pub fn is_target(&self) -> bool {
        !self.is_decoy()
    }

    /// Two markings collide when they belong to the same target/decoy class.
    pub fn same_class(&self, other: &DecoyMarking) -> bool {
        self.is_decoy() == other.is_decoy()
    }
}

/// Residue order that reverses everything but the terminal residues, so
/// the cleavage residue stays in place.
pub(crate) fn reversed_inner_order(len: usize) -> Vec<usize> {
    if len < 3 {
        return (0..len).collect();
    }
    std::iter::once(0)
        .chain((1..len - 1).rev())
        .chain(std::iter::once(len - 1))
        .collect()
}

use serde::{
    Deserialize,
    Serialize,
};

/// How decoys evicted by a sequence-identical target get back into the index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecoyReconciliation {
    /// Admit the evicted decoys unchanged, next to their target (reproducible, but
    /// target and decoy become indistinguishable by sequence)
    Force,

    /// Walk residue permutations until one is not already indexed
    Permute,

    /// Draw seeded random residue shuffles until one is not already indexed (default)
    Random,
}

impl Default for DecoyReconciliation {
    fn default() -> Self {
        DecoyReconciliation::Random
    }
}

impl std::fmt::Display for DecoyReconciliation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecoyReconciliation::Force => write!(f, "force"),
            DecoyReconciliation::Permute => write!(f, "permute"),
            DecoyReconciliation::Random => write!(f, "random"),
        }
    }
}

impl std::str::FromStr for DecoyReconciliation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "force" | "forced" => Ok(DecoyReconciliation::Force),
            "permute" | "permutation" | "permuted" => Ok(DecoyReconciliation::Permute),
            "random" | "randomize" | "shuffle" => Ok(DecoyReconciliation::Random),
            _ => Err(format!(
                "Invalid decoy reconciliation mode: '{}'. Valid options: force, permute, random",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(
            "Permutation".parse::<DecoyReconciliation>().unwrap(),
            DecoyReconciliation::Permute
        );
        assert_eq!(
            "shuffle".parse::<DecoyReconciliation>().unwrap(),
            DecoyReconciliation::Random
        );
        assert!("reverse".parse::<DecoyReconciliation>().is_err());
    }

    #[test]
    fn test_display_matches_serde() {
        for mode in [
            DecoyReconciliation::Force,
            DecoyReconciliation::Permute,
            DecoyReconciliation::Random,
        ] {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{}\"", mode));
        }
    }
}

use super::peptide::Peptide;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;

/// A chemical bridge between two peptides.
///
/// The kinds differ in how they decide which residues can carry a link, so
/// every operation matches on the variant instead of dispatching through a
/// trait object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrossLinker {
    /// Both ends react with the same residues.
    Symmetric {
        name: String,
        mass: f64,
        /// One-letter codes of the linkable residues, e.g. `"KSTY"`.
        residues: String,
        #[serde(default)]
        protein_n_term: bool,
    },
    /// Any residue with a positive weight can link, heavier weights are the
    /// preferred sites.
    WeightedNary {
        name: String,
        mass: f64,
        residue_weights: BTreeMap<char, f64>,
        #[serde(default)]
        protein_n_term_weight: f64,
    },
}

impl CrossLinker {
    pub fn name(&self) -> &str {
        match self {
            CrossLinker::Symmetric { name, .. } => name,
            CrossLinker::WeightedNary { name, .. } => name,
        }
    }

    pub fn mass(&self) -> f64 {
        match self {
            CrossLinker::Symmetric { mass, .. } => *mass,
            CrossLinker::WeightedNary { mass, .. } => *mass,
        }
    }

    /// Weight of a potential link site, zero when the residue cannot link.
    ///
    /// The C-terminal residue of a peptide that is not the protein C-terminus
    /// is where the protease cut, so it never carries a link. Modified
    /// residues never link either.
    fn site_weight(&self, peptide: &Peptide, position: usize) -> f64 {
        let residues = peptide.residues();
        if position >= residues.len() {
            return 0.0;
        }
        if position + 1 == residues.len() && !peptide.is_protein_c_term() && residues.len() > 1 {
            return 0.0;
        }
        if peptide.modification_at(position).is_some() {
            return 0.0;
        }
        let aa = residues[position] as char;
        match self {
            CrossLinker::Symmetric {
                residues: linkable,
                protein_n_term,
                ..
            } => {
                if linkable.contains(aa) || (position == 0 && *protein_n_term && peptide.is_protein_n_term())
                {
                    1.0
                } else {
                    0.0
                }
            }
            CrossLinker::WeightedNary {
                residue_weights,
                protein_n_term_weight,
                ..
            } => {
                let w = residue_weights.get(&aa).copied().unwrap_or(0.0);
                if position == 0 && peptide.is_protein_n_term() {
                    w.max(*protein_n_term_weight)
                } else {
                    w
                }
            }
        }
    }

    /// Positions able to carry the link, preferred sites first.
    pub fn link_sites(&self, peptide: &Peptide) -> Vec<usize> {
        let mut sites: Vec<(usize, f64)> = (0..peptide.len())
            .map(|i| (i, self.site_weight(peptide, i)))
            .filter(|(_, w)| *w > 0.0)
            .collect();
        sites.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        sites.into_iter().map(|(i, _)| i).collect()
    }

    pub fn can_crosslink(&self, peptide: &Peptide) -> bool {
        (0..peptide.len()).any(|i| self.site_weight(peptide, i) > 0.0)
    }

    pub fn can_crosslink_pair(&self, alpha: &Peptide, beta: &Peptide) -> bool {
        self.can_crosslink(alpha) && self.can_crosslink(beta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DecoyMarking;

    fn bs3() -> CrossLinker {
        CrossLinker::Symmetric {
            name: "BS3".into(),
            mass: 138.06808,
            residues: "KSTY".into(),
            protein_n_term: true,
        }
    }

    #[test]
    fn test_cleaved_c_term_cannot_link() {
        let xl = bs3();
        let pep = Peptide::new("PEPTIDEK", 900.0, DecoyMarking::Target);
        assert_eq!(xl.link_sites(&pep), vec![3]);

        let pep = Peptide::new("PEPPIDEK", 900.0, DecoyMarking::Target);
        assert!(!xl.can_crosslink(&pep));

        let pep = Peptide::new("PEPPIDEK", 900.0, DecoyMarking::Target).with_terminals(true, false);
        assert_eq!(xl.link_sites(&pep), vec![0]);
    }

    #[test]
    fn test_weighted_sites_are_ordered() {
        let xl = CrossLinker::WeightedNary {
            name: "SDA".into(),
            mass: 82.04186,
            residue_weights: [('K', 1.0), ('S', 0.2), ('Y', 0.5)].into_iter().collect(),
            protein_n_term_weight: 0.0,
        };
        let pep = Peptide::new("SAYKAR", 700.0, DecoyMarking::Target);
        assert_eq!(xl.link_sites(&pep), vec![3, 2, 0]);
        assert!(xl.can_crosslink_pair(&pep, &pep));
    }

    #[test]
    fn test_config_shape() {
        let xl: CrossLinker = serde_json::from_str(
            r#"{"kind": "symmetric", "name": "DSS", "mass": 138.06808, "residues": "K"}"#,
        )
        .unwrap();
        assert_eq!(xl.name(), "DSS");
        assert_eq!(xl.mass(), 138.06808);
    }
}

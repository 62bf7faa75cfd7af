#![allow(dead_code)]

use std::sync::Arc;
use xlseek::index::FragmentSource;
use xlseek::{
    CrossLinker,
    DecoyMarking,
    FragmentTable,
    IndexBuilder,
    IndexParameters,
    Peak,
    Peptide,
    PeptideIndices,
    ResidueLadder,
    Scan,
    SearchParameters,
    SearchPipeline,
};

pub fn ladder() -> ResidueLadder {
    ResidueLadder::new(
        [
            ('G', 57.02146),
            ('A', 71.03711),
            ('S', 87.03203),
            ('P', 97.05276),
            ('V', 99.06841),
            ('T', 101.04768),
            ('L', 113.08406),
            ('N', 114.04293),
            ('D', 115.02694),
            ('K', 128.09496),
            ('E', 129.04259),
            ('F', 147.06841),
            ('R', 156.10111),
            ('Y', 163.06333),
        ]
        .into_iter()
        .collect(),
    )
}

pub fn dss() -> CrossLinker {
    CrossLinker::Symmetric {
        name: "DSS".into(),
        mass: 138.06808,
        residues: "K".into(),
        protein_n_term: false,
    }
}

pub fn peptide(seq: &str) -> Peptide {
    let mass = ladder().peptide_mass(seq, &[]).unwrap();
    Peptide::new(seq, mass, DecoyMarking::Target).with_source("PROT1", 0)
}

pub const LIBRARY: [&str; 10] = [
    "GAKLVPER",
    "SVKEPLR",
    "PEPTLDEK",
    "LVNDFYR",
    "TTKAGFER",
    "DYSNPLEK",
    "AGLFKSTR",
    "NNVLAPYR",
    "EFLGDKVR",
    "VVSDTLEK",
];

pub fn build_pipeline(
    sequences: &[&str],
    crosslinkers: Vec<CrossLinker>,
    params: SearchParameters,
) -> Arc<SearchPipeline> {
    let index_params = IndexParameters {
        min_length: 4,
        ..Default::default()
    };
    let indices: PeptideIndices = IndexBuilder::new(index_params, &crosslinkers)
        .build(sequences.iter().map(|s| peptide(s)));
    let ladder = Arc::new(ladder());
    let table = FragmentTable::build(
        indices.iter().cloned().collect(),
        ladder.as_ref(),
        params.fragment_tolerance,
    );
    Arc::new(
        SearchPipeline::new(
            params,
            Arc::new(indices),
            Arc::new(table),
            ladder,
            crosslinkers,
        )
        .unwrap(),
    )
}

fn peaks_with_intensity(mzs: impl IntoIterator<Item = f64>) -> Vec<Peak> {
    mzs.into_iter()
        .enumerate()
        .map(|(i, mz)| Peak {
            mz,
            intensity: 100.0 + (i % 7) as f64 * 10.0,
        })
        .collect()
}

/// Scan holding every b/y fragment of a linear peptide.
pub fn linear_scan(scan_number: u32, seq: &str) -> Scan {
    let l = ladder();
    let pep = peptide(seq);
    let peaks = peaks_with_intensity(l.fragments(&pep).into_iter().map(|f| f.mz));
    Scan::new("run1", scan_number, pep.mass(), 2, peaks)
}

/// Scan holding every fragment of two peptides linked on their first lysine.
pub fn crosslinked_scan(scan_number: u32, alpha: &str, beta: &str) -> Scan {
    let l = ladder();
    let xl = dss();
    let a = peptide(alpha);
    let b = peptide(beta);
    let site_a = xl.link_sites(&a)[0];
    let site_b = xl.link_sites(&b)[0];
    let mzs: Vec<f64> = l
        .crosslinked_fragments(&a, site_a, b.mass(), &xl)
        .into_iter()
        .chain(l.crosslinked_fragments(&b, site_b, a.mass(), &xl))
        .map(|f| f.mz)
        .collect();
    Scan::new(
        "run1",
        scan_number,
        a.mass() + b.mass() + xl.mass(),
        3,
        peaks_with_intensity(mzs),
    )
}

/// Natural log of `n!`.
pub fn lnfact(n: u32) -> f64 {
    if n < 2 {
        return 0.0;
    }
    if n < 128 {
        return (2..=n).map(|x| (x as f64).ln()).sum();
    }
    // Stirling with the first correction term, plenty for scoring purposes.
    let n = n as f64;
    n * n.ln() - n + 0.5 * (2.0 * std::f64::consts::PI * n).ln() + 1.0 / (12.0 * n)
}

/// `-ln(p)`, mapping a probability-like product onto an additive score.
/// Zero maps to `f64::INFINITY`.
pub fn neg_ln(p: f64) -> f64 {
    -p.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lnfact() {
        assert_eq!(lnfact(0), 0.0);
        assert_eq!(lnfact(1), 0.0);
        assert!((lnfact(5) - 120f64.ln()).abs() < 1e-12);
        let exact: f64 = (2..=200).map(|x| (x as f64).ln()).sum();
        assert!((lnfact(200) - exact).abs() < 1e-6);
    }

    #[test]
    fn test_neg_ln() {
        assert_eq!(neg_ln(1.0), 0.0);
        assert!(neg_ln(0.0).is_infinite());
    }
}

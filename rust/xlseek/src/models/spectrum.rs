use crate::errors::{
    Result,
    SearchError,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
}

/// One fragmentation spectrum. Peaks are always sorted by m/z.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ScanRecord")]
pub struct Scan {
    pub run: Arc<str>,
    pub scan_number: u32,
    /// Neutral precursor mass.
    pub precursor_mass: f64,
    pub precursor_charge: u8,
    peaks: Vec<Peak>,
}

#[derive(Deserialize)]
struct ScanRecord {
    run: Arc<str>,
    scan_number: u32,
    precursor_mass: f64,
    #[serde(default)]
    precursor_charge: u8,
    peaks: Vec<Peak>,
}

impl From<ScanRecord> for Scan {
    fn from(x: ScanRecord) -> Self {
        Scan::new(
            x.run,
            x.scan_number,
            x.precursor_mass,
            x.precursor_charge,
            x.peaks,
        )
    }
}

impl Scan {
    pub fn new(
        run: impl Into<Arc<str>>,
        scan_number: u32,
        precursor_mass: f64,
        precursor_charge: u8,
        mut peaks: Vec<Peak>,
    ) -> Self {
        peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
        Self {
            run: run.into(),
            scan_number,
            precursor_mass,
            precursor_charge,
            peaks,
        }
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn total_intensity(&self) -> f64 {
        self.peaks.iter().map(|p| p.intensity).sum()
    }

    /// Index range of the peaks with m/z in `[low, high)`.
    pub fn peak_range(&self, low: f64, high: f64) -> std::ops::Range<usize> {
        let start = self.peaks.partition_point(|p| p.mz < low);
        let end = self.peaks.partition_point(|p| p.mz < high);
        start..end.max(start)
    }

    /// Keeps the `per_window` most intense peaks of every `window` wide m/z
    /// slice. The result stays sorted by m/z.
    pub fn top_peaks(&self, per_window: usize, window: f64) -> Vec<Peak> {
        let mut out = Vec::with_capacity(self.peaks.len().min(per_window * 20));
        let mut start = 0;
        while start < self.peaks.len() {
            let bin = (self.peaks[start].mz / window).floor();
            let mut end = start;
            while end < self.peaks.len() && (self.peaks[end].mz / window).floor() == bin {
                end += 1;
            }
            let mut slice: Vec<Peak> = self.peaks[start..end].to_vec();
            slice.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));
            slice.truncate(per_window);
            out.extend(slice);
            start = end;
        }
        out.sort_by(|a, b| a.mz.total_cmp(&b.mz));
        out
    }

    /// A copy of this scan holding only the given peaks.
    pub fn with_peaks(&self, peaks: Vec<Peak>) -> Scan {
        Scan::new(
            self.run.clone(),
            self.scan_number,
            self.precursor_mass,
            self.precursor_charge,
            peaks,
        )
    }

    pub fn validate(&self) -> Result<()> {
        let reason = if !self.precursor_mass.is_finite() || self.precursor_mass <= 0.0 {
            "precursor mass is not a positive finite number"
        } else if self.peaks.is_empty() {
            "scan has no peaks"
        } else if self
            .peaks
            .iter()
            .any(|p| !p.mz.is_finite() || !p.intensity.is_finite())
        {
            "scan has non-finite peaks"
        } else {
            return Ok(());
        };
        Err(SearchError::InvalidScan {
            run: self.run.to_string(),
            scan_number: self.scan_number,
            reason,
        })
    }
}

impl std::fmt::Display for Scan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.run, self.scan_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(mz: f64, intensity: f64) -> Peak {
        Peak { mz, intensity }
    }

    #[test]
    fn test_top_peaks_per_window() {
        let scan = Scan::new(
            "run",
            1,
            1000.0,
            2,
            vec![
                peak(150.0, 1.0),
                peak(110.0, 5.0),
                peak(120.0, 3.0),
                peak(250.0, 2.0),
                peak(299.0, 9.0),
                peak(201.0, 4.0),
            ],
        );
        let top = scan.top_peaks(2, 100.0);
        let mzs: Vec<f64> = top.iter().map(|p| p.mz).collect();
        assert_eq!(mzs, vec![110.0, 120.0, 201.0, 299.0]);
    }

    #[test]
    fn test_peak_range() {
        let scan = Scan::new("run", 1, 1000.0, 2, vec![peak(100.0, 1.0), peak(200.0, 1.0)]);
        assert_eq!(scan.peak_range(99.0, 100.0), 0..0);
        assert_eq!(scan.peak_range(100.0, 200.0), 0..1);
        assert_eq!(scan.peak_range(150.0, 250.0), 1..2);
    }

    #[test]
    fn test_validate() {
        let scan = Scan::new("run", 3, f64::NAN, 2, vec![peak(100.0, 1.0)]);
        assert!(scan.validate().is_err());
        let scan = Scan::new("run", 3, 1000.0, 2, vec![]);
        assert!(scan.validate().is_err());
        let scan = Scan::new("run", 3, 1000.0, 2, vec![peak(100.0, 1.0)]);
        assert!(scan.validate().is_ok());
        assert_eq!(scan.to_string(), "run:3");
    }

    #[test]
    fn test_deserialize_sorts_peaks() {
        let scan: Scan = serde_json::from_str(
            r#"{"run": "r", "scan_number": 4, "precursor_mass": 900.0,
                "peaks": [{"mz": 300.0, "intensity": 1.0}, {"mz": 100.0, "intensity": 2.0}]}"#,
        )
        .unwrap();
        assert_eq!(scan.peaks()[0].mz, 100.0);
        assert_eq!(scan.precursor_charge, 0);
    }
}

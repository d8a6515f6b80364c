//! Manual traffic-scheduling matrix ("LB matrix")
//!
//! For every BFE cluster the matrix splits 100% of a service cluster's traffic
//! across its bound sub-clusters, with any unassigned share absorbed by the
//! reserved [`BLACKHOLE`] sink. Rows and columns live in sorted maps so that
//! serializing a matrix is deterministic.

use crate::errors::{Result, SwitchyardError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Reserved column absorbing traffic not assigned to a real sub-cluster
pub const BLACKHOLE: &str = "GSLB_BLACKHOLE";

/// Every row sums to exactly this
pub const TOTAL_WEIGHT: i32 = 100;

/// One BFE cluster's split: sub-cluster name (or [`BLACKHOLE`]) to percentage
pub type LbRow = BTreeMap<String, i32>;

/// BFE cluster name to row
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LbMatrix(BTreeMap<String, LbRow>);

impl LbMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: BTreeMap<String, LbRow>) -> Self {
        Self(rows)
    }

    pub fn rows(&self) -> &BTreeMap<String, LbRow> {
        &self.0
    }

    pub fn into_rows(self) -> BTreeMap<String, LbRow> {
        self.0
    }

    pub fn row(&self, bfe_cluster: &str) -> Option<&LbRow> {
        self.0.get(bfe_cluster)
    }

    pub fn insert_row(&mut self, bfe_cluster: impl Into<String>, row: LbRow) {
        self.0.insert(bfe_cluster.into(), row);
    }

    pub fn remove_row(&mut self, bfe_cluster: &str) -> Option<LbRow> {
        self.0.remove(bfe_cluster)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Even split across `sub_clusters` using integer division; the remainder
    /// goes to [`BLACKHOLE`] so the row always sums to [`TOTAL_WEIGHT`].
    pub fn default_row<S: AsRef<str>>(sub_clusters: &[S]) -> LbRow {
        let mut row = LbRow::new();
        if sub_clusters.is_empty() {
            row.insert(BLACKHOLE.to_string(), TOTAL_WEIGHT);
            return row;
        }

        let share = TOTAL_WEIGHT / sub_clusters.len() as i32;
        for name in sub_clusters {
            row.insert(name.as_ref().to_string(), share);
        }
        row.insert(BLACKHOLE.to_string(), TOTAL_WEIGHT - share * sub_clusters.len() as i32);
        row
    }

    /// Default scheduler: the same even split for every known BFE cluster
    pub fn default_for<B: AsRef<str>, S: AsRef<str>>(
        bfe_clusters: &[B],
        sub_clusters: &[S],
    ) -> Self {
        let row = Self::default_row(sub_clusters);
        Self(bfe_clusters.iter().map(|bfe| (bfe.as_ref().to_string(), row.clone())).collect())
    }

    /// Check every matrix invariant against the currently known BFE clusters
    /// and the cluster's bound sub-clusters.
    ///
    /// - no bound sub-cluster is named [`BLACKHOLE`]
    /// - exactly one row per known BFE cluster
    /// - non-blackhole columns are bound sub-clusters
    /// - every value is within `0..=100`
    /// - every row sums to exactly 100
    /// - every bound sub-cluster appears in every row
    pub fn check<B: AsRef<str>, S: AsRef<str>>(
        &self,
        bfe_clusters: &[B],
        sub_clusters: &[S],
    ) -> Result<()> {
        let known: BTreeSet<&str> = bfe_clusters.iter().map(AsRef::as_ref).collect();
        let bound: BTreeSet<&str> = sub_clusters.iter().map(AsRef::as_ref).collect();

        if bound.contains(BLACKHOLE) {
            return Err(SwitchyardError::param_field(
                format!("'{}' is reserved and cannot be bound as a sub cluster", BLACKHOLE),
                "sub_clusters",
            ));
        }

        if let Some(unknown) = self.0.keys().find(|bfe| !known.contains(bfe.as_str())) {
            return Err(SwitchyardError::param_field(
                format!("LB matrix has a row for unknown BFE cluster '{}'", unknown),
                "scheduler",
            ));
        }

        if let Some(missing) = known.iter().find(|bfe| !self.0.contains_key(**bfe)) {
            return Err(SwitchyardError::param_field(
                format!("LB matrix is missing the row for BFE cluster '{}'", missing),
                "scheduler",
            ));
        }

        for (bfe, row) in &self.0 {
            let mut sum = 0i64;
            for (sub_cluster, weight) in row {
                if sub_cluster != BLACKHOLE && !bound.contains(sub_cluster.as_str()) {
                    return Err(SwitchyardError::param_field(
                        format!(
                            "LB matrix row '{}' references sub cluster '{}' which is not bound to the cluster",
                            bfe, sub_cluster
                        ),
                        "scheduler",
                    ));
                }
                if !(0..=TOTAL_WEIGHT).contains(weight) {
                    return Err(SwitchyardError::param_field(
                        format!(
                            "LB matrix row '{}' gives sub cluster '{}' weight {}, expected 0..=100",
                            bfe, sub_cluster, weight
                        ),
                        "scheduler",
                    ));
                }
                sum += i64::from(*weight);
            }

            if sum != i64::from(TOTAL_WEIGHT) {
                return Err(SwitchyardError::param_field(
                    format!("LB matrix row '{}' sums to {}, expected 100", bfe, sum),
                    "scheduler",
                ));
            }

            if let Some(absent) = bound.iter().find(|sub| !row.contains_key(**sub)) {
                return Err(SwitchyardError::param_field(
                    format!(
                        "LB matrix row '{}' does not schedule bound sub cluster '{}'",
                        bfe,
                        absent
                    ),
                    "scheduler",
                ));
            }
        }

        Ok(())
    }

    /// Rewrite the matrix for a sub-cluster rebind.
    ///
    /// Removed sub-clusters must already be drained to 0% in every row; added
    /// sub-clusters enter every row at 0%.
    pub fn rebind<R: AsRef<str>, A: AsRef<str>>(&self, removed: &[R], added: &[A]) -> Result<Self> {
        let mut rows = self.0.clone();

        for (bfe, row) in rows.iter_mut() {
            for sub_cluster in removed {
                let sub_cluster = sub_cluster.as_ref();
                let weight = row.remove(sub_cluster).unwrap_or(0);
                if weight != 0 {
                    return Err(SwitchyardError::model(format!(
                        "Sub cluster '{}' still carries {}% of traffic in BFE cluster '{}'; set it to 0 before unbinding",
                        sub_cluster, weight, bfe
                    )));
                }
            }
            for sub_cluster in added {
                row.entry(sub_cluster.as_ref().to_string()).or_insert(0);
            }
        }

        Ok(Self(rows))
    }

    /// Parse a stored matrix. Unparsable stored data is an invariant breach.
    pub fn parse_stored(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| {
                SwitchyardError::dirty(format!("Stored LB matrix is not valid JSON: {}", e))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(entries: &[(&str, i32)]) -> LbRow {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn matrix(rows: &[(&str, &[(&str, i32)])]) -> LbMatrix {
        LbMatrix::from_rows(rows.iter().map(|(bfe, r)| (bfe.to_string(), row(r))).collect())
    }

    #[test]
    fn test_default_two_sub_clusters() {
        let m = LbMatrix::default_for(&["bfe1"], &["s1", "s2"]);
        assert_eq!(m, matrix(&[("bfe1", &[("s1", 50), ("s2", 50), (BLACKHOLE, 0)])]));
    }

    #[test]
    fn test_default_three_sub_clusters_sends_remainder_to_blackhole() {
        let row = LbMatrix::default_row(&["a", "b", "c"]);
        assert_eq!(row["a"], 33);
        assert_eq!(row[BLACKHOLE], 1);
        assert_eq!(row.values().sum::<i32>(), 100);
    }

    #[test]
    fn test_check_accepts_default() {
        let m = LbMatrix::default_for(&["bfe1", "bfe2"], &["s1", "s2", "s3"]);
        assert!(m.check(&["bfe1", "bfe2"], &["s1", "s2", "s3"]).is_ok());
    }

    #[test]
    fn test_check_rejects_missing_and_extra_rows() {
        let m = matrix(&[("bfe1", &[("s1", 100)])]);
        assert!(m.check(&["bfe1", "bfe2"], &["s1"]).is_err());
        assert!(m.check::<&str, _>(&[], &["s1"]).is_err());
    }

    #[test]
    fn test_check_rejects_unbound_column() {
        let m = matrix(&[("bfe1", &[("s1", 50), ("s9", 50)])]);
        let err = m.check(&["bfe1"], &["s1"]).unwrap_err();
        assert!(err.to_string().contains("s9"));
    }

    #[test]
    fn test_check_rejects_negative_weight() {
        let m = matrix(&[("bfe1", &[("s1", 110), (BLACKHOLE, -10)])]);
        assert!(m.check(&["bfe1"], &["s1"]).is_err());
    }

    #[test]
    fn test_check_rejects_bad_sum() {
        let m = matrix(&[("bfe1", &[("s1", 60), ("s2", 30)])]);
        let err = m.check(&["bfe1"], &["s1", "s2"]).unwrap_err();
        assert!(err.to_string().contains("sums to 90"));
    }

    #[test]
    fn test_check_rejects_omitted_sub_cluster() {
        let m = matrix(&[("bfe1", &[("s1", 100)])]);
        let err = m.check(&["bfe1"], &["s1", "s2"]).unwrap_err();
        assert!(err.to_string().contains("s2"));
    }

    #[test]
    fn test_check_rejects_blackhole_as_bound_sub_cluster() {
        let m = LbMatrix::default_for(&["bfe1"], &[BLACKHOLE]);
        let err = m.check(&["bfe1"], &[BLACKHOLE]).unwrap_err();
        assert!(matches!(err, SwitchyardError::ParamIllegal { .. }));
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_rebind_requires_drained_sub_cluster() {
        let m = LbMatrix::default_for(&["bfe1"], &["s1", "s2"]);
        let err = m.rebind(&["s1"], &["s3"]).unwrap_err();
        assert!(matches!(err, SwitchyardError::ModelViolation { .. }));

        let drained = matrix(&[("bfe1", &[("s1", 0), ("s2", 100), (BLACKHOLE, 0)])]);
        let rebound = drained.rebind(&["s1"], &["s3"]).unwrap();
        assert_eq!(rebound, matrix(&[("bfe1", &[("s2", 100), ("s3", 0), (BLACKHOLE, 0)])]));
        assert!(rebound.check(&["bfe1"], &["s2", "s3"]).is_ok());
    }

    #[test]
    fn test_parse_stored_dirty_data() {
        let err = LbMatrix::parse_stored("{not json").unwrap_err();
        assert!(matches!(err, SwitchyardError::DirtyData { .. }));

        let m = LbMatrix::parse_stored(r#"{"bfe1":{"s1":100}}"#).unwrap();
        assert_eq!(m.row("bfe1").unwrap()["s1"], 100);
    }

    proptest! {
        #[test]
        fn default_row_always_sums_to_100(n in 1usize..=150) {
            let names: Vec<String> = (0..n).map(|i| format!("s{}", i)).collect();
            let row = LbMatrix::default_row(&names);
            let share = 100 / n as i32;

            prop_assert_eq!(row.values().sum::<i32>(), 100);
            prop_assert_eq!(row[BLACKHOLE], 100 - share * n as i32);
            for name in &names {
                prop_assert_eq!(row[name.as_str()], share);
            }
        }

        #[test]
        fn default_matrix_passes_check(n in 1usize..=20, bfe_count in 0usize..=5) {
            let subs: Vec<String> = (0..n).map(|i| format!("s{}", i)).collect();
            let bfes: Vec<String> = (0..bfe_count).map(|i| format!("bfe{}", i)).collect();
            let m = LbMatrix::default_for(&bfes, &subs);
            prop_assert!(m.check(&bfes, &subs).is_ok());
        }
    }
}

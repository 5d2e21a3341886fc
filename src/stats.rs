use std::collections::HashMap;

use crate::pipeline::RepositoryResult;

/// Branch name -> number of occurrences across the successful repositories.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Histogram {
    counts: HashMap<String, usize>,
    repositories: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchPercentage {
    pub branch: String,
    pub count: usize,
    pub percentage: f64,
}

impl Histogram {
    /// Every listed name counts, so a name repeated within one repository's
    /// list is counted once per occurrence.
    pub fn from_results(results: &[RepositoryResult]) -> Self {
        let mut counts = HashMap::new();
        for repo in results {
            for branch in &repo.branches {
                *counts.entry(branch.clone()).or_insert(0) += 1;
            }
        }
        Self {
            counts,
            repositories: results.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Percentage of successful repositories listing each branch, highest
    /// first with ties ordered by name. Empty when no repository succeeded.
    pub fn percentages(&self) -> Vec<BranchPercentage> {
        if self.repositories == 0 {
            return Vec::new();
        }
        let total = self.repositories as f64;
        let mut rows: Vec<BranchPercentage> = self
            .counts
            .iter()
            .map(|(branch, &count)| BranchPercentage {
                branch: branch.clone(),
                count,
                percentage: count as f64 / total * 100.0,
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.branch.cmp(&b.branch)));
        rows
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

/// Rule deciding whether the next sorted point joins the current cluster.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClusterPolicy {
    /// Compare against the first member of the current cluster; a gap can
    /// never be bridged by chaining.
    #[default]
    Sequential,
    /// Compare against the running mean of the current cluster.
    Centroid,
}

/// How a cluster collapses to one index.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Representative {
    #[default]
    Median,
    Mean,
    First,
}

impl Representative {
    /// Representative of an ascending slice, rounded half-to-even.
    ///
    /// Returns `None` for an empty slice.
    pub fn of(self, sorted_values: &[usize]) -> Option<usize> {
        let first = *sorted_values.first()?;
        let value = match self {
            Self::First => return Some(first),
            Self::Median => {
                let mid = sorted_values.len() / 2;
                if sorted_values.len() % 2 == 1 {
                    return Some(sorted_values[mid]);
                }
                (sorted_values[mid - 1] as f64 + sorted_values[mid] as f64) / 2.0
            }
            Self::Mean => {
                let total = sorted_values.iter().map(|&v| v as u128).sum::<u128>();
                total as f64 / sorted_values.len() as f64
            }
        };
        Some(value.round_ties_even() as usize)
    }
}

/// A non-empty, ascending group of indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cluster {
    members: Vec<usize>,
}

impl Cluster {
    /// Builds a cluster from arbitrary members; `None` when empty.
    pub fn new(mut members: Vec<usize>) -> Option<Self> {
        if members.is_empty() {
            return None;
        }
        members.sort_unstable();
        Some(Self { members })
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn first(&self) -> usize {
        self.members[0]
    }

    pub fn last(&self) -> usize {
        self.members[self.members.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn representative(&self, strategy: Representative) -> usize {
        strategy.of(&self.members).unwrap_or(self.members[0])
    }

    /// True when `point` lies within `margin` of some member.
    pub fn is_near(&self, point: usize, margin: usize) -> bool {
        let insertion = self.members.partition_point(|&member| member < point);
        let right = self
            .members
            .get(insertion)
            .is_some_and(|&member| member.abs_diff(point) <= margin);
        let left = insertion > 0 && self.members[insertion - 1].abs_diff(point) <= margin;
        left || right
    }

    pub fn into_members(self) -> Vec<usize> {
        self.members
    }
}

/// Partitions `points` into clusters of mutually close indices.
///
/// Points are sorted first, so the output never depends on input order.
/// Duplicates are kept and always land in the same cluster. Clusters come out
/// in ascending order of their first member.
pub fn cluster_points(points: &[usize], margin: usize, policy: ClusterPolicy) -> Vec<Cluster> {
    let mut sorted = points.to_vec();
    sorted.sort_unstable();

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_sum = 0u128;

    for point in sorted {
        let joins = match current.first() {
            None => true,
            Some(&first) => match policy {
                ClusterPolicy::Sequential => point - first <= margin,
                ClusterPolicy::Centroid => {
                    let centroid = current_sum as f64 / current.len() as f64;
                    (point as f64 - centroid).abs() <= margin as f64
                }
            },
        };

        if !joins {
            clusters.push(Cluster {
                members: std::mem::take(&mut current),
            });
            current_sum = 0;
        }
        current.push(point);
        current_sum += point as u128;
    }

    if !current.is_empty() {
        clusters.push(Cluster { members: current });
    }
    clusters
}

/// Collapses near-duplicate detections of a single method into one point per
/// sequential cluster.
pub fn consolidate(points: &[usize], margin: usize, strategy: Representative) -> Vec<usize> {
    cluster_points(points, margin, ClusterPolicy::Sequential)
        .iter()
        .map(|cluster| cluster.representative(strategy))
        .collect()
}

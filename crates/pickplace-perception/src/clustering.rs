//! Euclidean cluster extraction.
//!
//! Points closer than `tolerance` to each other end up in the same cluster,
//! transitively.  Clusters outside `[min_size, max_size]` are dropped and
//! their points stay unassigned.

use std::collections::VecDeque;

use pickplace_types::{ClusterIndices, PointCloud};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::octree::{Octree, Point3};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Neighbour distance in metres.
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,
    #[serde(default = "default_min_size")]
    pub min_size: usize,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

fn default_tolerance() -> f32 {
    0.03
}
fn default_min_size() -> usize {
    30
}
fn default_max_size() -> usize {
    3000
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            min_size: default_min_size(),
            max_size: default_max_size(),
        }
    }
}

/// Group the points of `cloud` into clusters.
///
/// Seeds are taken in index order and grown breadth-first, so clusters come
/// out in the order of their lowest index.  The returned sets are pairwise
/// disjoint and index into `cloud`.
pub fn euclidean_clusters(cloud: &PointCloud, config: &ClusterConfig) -> Vec<ClusterIndices> {
    let tree = Octree::from_cloud(cloud);
    let mut visited = vec![false; cloud.len()];
    let mut clusters = Vec::new();
    let mut rejected = 0usize;

    for (seed, p) in cloud.iter().enumerate() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        if !p.is_finite() {
            continue;
        }

        let mut members = vec![seed];
        let mut queue = VecDeque::from([seed]);
        while let Some(current) = queue.pop_front() {
            let Some(point) = cloud.get(current) else {
                continue;
            };
            for neighbour in tree.radius_search(Point3::from(point), config.tolerance) {
                if !visited[neighbour] {
                    visited[neighbour] = true;
                    members.push(neighbour);
                    queue.push_back(neighbour);
                }
            }
        }

        if (config.min_size..=config.max_size).contains(&members.len()) {
            clusters.push(ClusterIndices::new(members));
        } else {
            rejected += 1;
        }
    }

    debug!(points = cloud.len(), clusters = clusters.len(), rejected, "clustered");
    clusters
}

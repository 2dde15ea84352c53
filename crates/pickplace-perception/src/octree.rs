//! Spatial index for neighbour queries over a point cloud.
//!
//! Partitions 3-D space using a recursive **Octree** so that the filters,
//! the clusterer and the normal estimator can answer "which points lie
//! within r of p?" and "which k points are closest to p?" without scanning
//! the whole cloud.  Entries carry the index of the point in its source
//! cloud; colour is ignored.
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`Point3`]   | A 3-D coordinate.                                      |
//! | [`Aabb`]     | An axis-aligned bounding box.                          |
//! | [`Octree`]   | Spatial index; radius and k-nearest queries.           |
//!
//! # Example
//!
//! ```rust
//! use pickplace_perception::octree::{Octree, Point3};
//! use pickplace_types::{PointCloud, PointXYZRGB};
//!
//! let cloud: PointCloud = [
//!     PointXYZRGB::new(0.0, 0.0, 0.0),
//!     PointXYZRGB::new(0.01, 0.0, 0.0),
//!     PointXYZRGB::new(1.0, 1.0, 1.0),
//! ]
//! .into_iter()
//! .collect();
//! let tree = Octree::from_cloud(&cloud);
//!
//! assert_eq!(tree.radius_search(Point3::new(0.0, 0.0, 0.0), 0.05), vec![0, 1]);
//! assert_eq!(tree.nearest_k(Point3::new(0.9, 0.9, 0.9), 1)[0].0, 2);
//! ```

use pickplace_types::{PointCloud, PointXYZRGB};

/// Points per leaf before a node subdivides.
const DEFAULT_CAPACITY: usize = 16;
/// Subdivision stops at this depth even when a leaf is over capacity, which
/// keeps coincident points from recursing forever.
const DEFAULT_MAX_DEPTH: usize = 12;

// ────────────────────────────────────────────────────────────────────────────
// Point3
// ────────────────────────────────────────────────────────────────────────────

/// A point in 3-D space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    /// Create a new point.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_squared(&self, other: Point3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

impl From<&PointXYZRGB> for Point3 {
    fn from(p: &PointXYZRGB) -> Self {
        Self::new(p.x, p.y, p.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Aabb
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    /// Create a bounding box from its two opposite corners.
    ///
    /// The constructor normalises the corners so that `min ≤ max` per axis.
    pub fn new(a: Point3, b: Point3) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Smallest box enclosing every finite point of `cloud`, grown by
    /// `padding` on each side.  `None` when the cloud has no finite point.
    pub fn enclosing(cloud: &PointCloud, padding: f32) -> Option<Self> {
        let mut iter = cloud.iter().filter(|p| p.is_finite());
        let first = Point3::from(iter.next()?);
        let (mut min, mut max) = (first, first);
        for p in iter {
            min = Point3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Point3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
        Some(Self {
            min: Point3::new(min.x - padding, min.y - padding, min.z - padding),
            max: Point3::new(max.x + padding, max.y + padding, max.z + padding),
        })
    }

    /// Return the centre point of the box.
    pub fn centre(&self) -> Point3 {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// True when the point lies inside or on the boundary of the box.
    pub fn contains_point(&self, p: Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Squared distance from `p` to the nearest point of the box (0 inside).
    pub fn distance_squared_to(&self, p: Point3) -> f32 {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dy = (self.min.y - p.y).max(0.0).max(p.y - self.max.y);
        let dz = (self.min.z - p.z).max(0.0).max(p.z - self.max.z);
        dx * dx + dy * dy + dz * dz
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Octree
// ────────────────────────────────────────────────────────────────────────────

/// A recursive spatial index that subdivides 3-D space into eight octants.
///
/// Entries are stored in the deepest node whose bounding box still contains
/// them.  Subdividing stops when either
/// - the number of entries in a node is ≤ `capacity`, or
/// - `max_depth` levels have already been created.
///
/// Built once per cloud with [`Octree::from_cloud`]; the index is never
/// shared across frames.
#[derive(Debug)]
pub struct Octree {
    root: OctreeNode,
    max_depth: usize,
    len: usize,
}

impl Octree {
    /// Create an empty octree covering `bounds`.
    pub fn new(bounds: Aabb, capacity: usize) -> Self {
        Self::with_max_depth(bounds, capacity, DEFAULT_MAX_DEPTH)
    }

    /// Create an empty octree with an explicit maximum subdivision depth.
    pub fn with_max_depth(bounds: Aabb, capacity: usize, max_depth: usize) -> Self {
        Self {
            root: OctreeNode::new(bounds, capacity.max(1)),
            max_depth,
            len: 0,
        }
    }

    /// Index every finite point of `cloud` under its position in the cloud.
    pub fn from_cloud(cloud: &PointCloud) -> Self {
        let bounds = Aabb::enclosing(cloud, 1e-3)
            .unwrap_or_else(|| Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0)));
        let mut tree = Self::new(bounds, DEFAULT_CAPACITY);
        for (i, p) in cloud.iter().enumerate() {
            if p.is_finite() {
                tree.insert(Point3::from(p), i);
            }
        }
        tree
    }

    /// Insert a point tagged with `index`.
    ///
    /// Points outside the root bounding box are silently ignored.
    pub fn insert(&mut self, point: Point3, index: usize) {
        if self.root.insert(Entry { point, index }, self.max_depth, 0) {
            self.len += 1;
        }
    }

    /// Return the total number of entries stored in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the tree contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Indices of every entry within `radius` of `query` (inclusive),
    /// sorted ascending.
    pub fn radius_search(&self, query: Point3, radius: f32) -> Vec<usize> {
        let mut out = Vec::new();
        self.root.radius_search(query, radius * radius, &mut out);
        out.sort_unstable();
        out
    }

    /// The `k` entries closest to `query` as `(index, squared distance)`,
    /// nearest first.  Ties are broken by the lower index.
    pub fn nearest_k(&self, query: Point3, k: usize) -> Vec<(usize, f32)> {
        if k == 0 {
            return Vec::new();
        }
        let mut best: Vec<(usize, f32)> = Vec::with_capacity(k + 1);
        self.root.nearest_k(query, k, &mut best);
        best
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OctreeNode – internal implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Entry {
    point: Point3,
    index: usize,
}

#[derive(Debug)]
struct OctreeNode {
    bounds: Aabb,
    capacity: usize,
    /// Entries stored at this node (only non-empty when the node is a leaf).
    entries: Vec<Entry>,
    /// Eight children; `None` while this node is a leaf.
    children: Option<Box<[OctreeNode; 8]>>,
}

/// Ordering used by the k-nearest buffer: distance, then index.
fn closer(a: (usize, f32), b: (usize, f32)) -> bool {
    a.1 < b.1 || (a.1 == b.1 && a.0 < b.0)
}

impl OctreeNode {
    fn new(bounds: Aabb, capacity: usize) -> Self {
        Self {
            bounds,
            capacity,
            entries: Vec::new(),
            children: None,
        }
    }

    fn insert(&mut self, entry: Entry, max_depth: usize, depth: usize) -> bool {
        if !self.bounds.contains_point(entry.point) {
            return false;
        }

        match self.children.as_mut() {
            None => {
                self.entries.push(entry);
                // Subdivide when over capacity and depth budget remains.
                if self.entries.len() > self.capacity && depth < max_depth {
                    self.subdivide(max_depth, depth);
                }
                true
            }
            Some(children) => children
                .iter_mut()
                .find(|c| c.bounds.contains_point(entry.point))
                .is_some_and(|c| c.insert(entry, max_depth, depth + 1)),
        }
    }

    fn radius_search(&self, query: Point3, radius_sq: f32, out: &mut Vec<usize>) {
        if self.bounds.distance_squared_to(query) > radius_sq {
            return;
        }
        match &self.children {
            None => out.extend(
                self.entries
                    .iter()
                    .filter(|e| e.point.distance_squared(query) <= radius_sq)
                    .map(|e| e.index),
            ),
            Some(children) => {
                for child in children.iter() {
                    child.radius_search(query, radius_sq, out);
                }
            }
        }
    }

    fn nearest_k(&self, query: Point3, k: usize, best: &mut Vec<(usize, f32)>) {
        if best.len() == k
            && let Some(&(_, worst)) = best.last()
            && self.bounds.distance_squared_to(query) > worst
        {
            return;
        }
        match &self.children {
            None => {
                for e in &self.entries {
                    let candidate = (e.index, e.point.distance_squared(query));
                    let pos = best.partition_point(|&b| closer(b, candidate));
                    if pos < k {
                        best.insert(pos, candidate);
                        best.truncate(k);
                    }
                }
            }
            Some(children) => {
                // Visit the octants nearest to the query first so the
                // pruning bound tightens early.
                let mut order: Vec<(usize, f32)> = children
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (i, c.bounds.distance_squared_to(query)))
                    .collect();
                order.sort_by(|a, b| a.1.total_cmp(&b.1));
                for (i, _) in order {
                    children[i].nearest_k(query, k, best);
                }
            }
        }
    }

    /// Split this leaf into eight children and redistribute existing entries.
    fn subdivide(&mut self, max_depth: usize, depth: usize) {
        let c = self.bounds.centre();
        let min = self.bounds.min;
        let max = self.bounds.max;

        // Build the eight octant AABBs around the centre point.
        let octants = [
            Aabb::new(min, c),
            Aabb::new(Point3::new(c.x, min.y, min.z), Point3::new(max.x, c.y, c.z)),
            Aabb::new(Point3::new(min.x, c.y, min.z), Point3::new(c.x, max.y, c.z)),
            Aabb::new(Point3::new(c.x, c.y, min.z), Point3::new(max.x, max.y, c.z)),
            Aabb::new(Point3::new(min.x, min.y, c.z), Point3::new(c.x, c.y, max.z)),
            Aabb::new(Point3::new(c.x, min.y, c.z), Point3::new(max.x, c.y, max.z)),
            Aabb::new(Point3::new(min.x, c.y, c.z), Point3::new(c.x, max.y, max.z)),
            Aabb::new(c, max),
        ];

        let cap = self.capacity;
        let mut children = Box::new(octants.map(|b| OctreeNode::new(b, cap)));

        let entries = std::mem::take(&mut self.entries);
        for e in entries {
            if let Some(child) = children.iter_mut().find(|c| c.bounds.contains_point(e.point)) {
                child.insert(e, max_depth, depth + 1);
            }
        }

        self.children = Some(children);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud(pts: &[[f32; 3]]) -> PointCloud {
        pts.iter()
            .map(|p| PointXYZRGB::new(p[0], p[1], p[2]))
            .collect()
    }

    fn grid_cloud(n: usize, step: f32) -> PointCloud {
        let mut pts = Vec::new();
        for ix in 0..n {
            for iy in 0..n {
                for iz in 0..n {
                    pts.push(PointXYZRGB::new(
                        ix as f32 * step,
                        iy as f32 * step,
                        iz as f32 * step,
                    ));
                }
            }
        }
        PointCloud::new(pts)
    }

    // ── Aabb ────────────────────────────────────────────────────────────────

    #[test]
    fn aabb_contains_boundary_point() {
        let b = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        assert!(b.contains_point(Point3::new(0.0, 0.0, 0.0)));
        assert!(b.contains_point(Point3::new(1.0, 1.0, 1.0)));
        assert!(!b.contains_point(Point3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn aabb_normalises_min_max() {
        let b = Aabb::new(Point3::new(2.0, 2.0, 2.0), Point3::new(0.0, 0.0, 0.0));
        assert_eq!(b.min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(b.max, Point3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn aabb_distance_is_zero_inside() {
        let b = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(b.distance_squared_to(Point3::new(0.5, 0.5, 0.5)), 0.0);
        assert!((b.distance_squared_to(Point3::new(3.0, 0.5, 0.5)) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn enclosing_skips_non_finite_points() {
        let c = cloud(&[[0.0, 0.0, 0.0], [f32::NAN, 5.0, 5.0], [1.0, 2.0, 3.0]]);
        let b = Aabb::enclosing(&c, 0.0).expect("finite points present");
        assert_eq!(b.max, Point3::new(1.0, 2.0, 3.0));
    }

    // ── Octree ──────────────────────────────────────────────────────────────

    #[test]
    fn empty_cloud_yields_empty_tree() {
        let tree = Octree::from_cloud(&PointCloud::default());
        assert!(tree.is_empty());
        assert!(tree.radius_search(Point3::new(0.0, 0.0, 0.0), 1.0).is_empty());
        assert!(tree.nearest_k(Point3::new(0.0, 0.0, 0.0), 3).is_empty());
    }

    #[test]
    fn insert_outside_bounds_is_ignored() {
        let bounds = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let mut tree = Octree::new(bounds, 4);
        tree.insert(Point3::new(5.0, 5.0, 5.0), 0);
        assert!(tree.is_empty());
    }

    #[test]
    fn subdivision_preserves_all_entries() {
        let c = grid_cloud(5, 0.1);
        let tree = Octree::from_cloud(&c);
        assert_eq!(tree.len(), 125);
        let all = tree.radius_search(Point3::new(0.2, 0.2, 0.2), 10.0);
        assert_eq!(all, (0..125).collect::<Vec<_>>());
    }

    #[test]
    fn radius_search_matches_brute_force() {
        let c = grid_cloud(6, 0.05);
        let tree = Octree::from_cloud(&c);
        let query = c.points()[43];
        let radius = 0.075;
        let expected: Vec<usize> = c
            .iter()
            .enumerate()
            .filter(|(_, p)| p.distance_squared(&query) <= radius * radius)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(tree.radius_search(Point3::from(&query), radius), expected);
    }

    #[test]
    fn nearest_k_matches_brute_force() {
        let c = grid_cloud(6, 0.05);
        let tree = Octree::from_cloud(&c);
        let query = Point3::new(0.111, 0.07, 0.2);
        let mut expected: Vec<(usize, f32)> = c
            .iter()
            .enumerate()
            .map(|(i, p)| (i, Point3::from(p).distance_squared(query)))
            .collect();
        expected.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        expected.truncate(7);
        assert_eq!(tree.nearest_k(query, 7), expected);
    }

    #[test]
    fn coincident_points_do_not_recurse_forever() {
        let pts = vec![[0.5, 0.5, 0.5]; 100];
        let c = cloud(&pts);
        let tree = Octree::from_cloud(&c);
        assert_eq!(tree.len(), 100);
        assert_eq!(tree.nearest_k(Point3::new(0.5, 0.5, 0.5), 3).len(), 3);
    }

    #[test]
    fn non_finite_points_are_not_indexed() {
        let c = cloud(&[[0.0, 0.0, 0.0], [f32::NAN, 0.0, 0.0], [0.01, 0.0, 0.0]]);
        let tree = Octree::from_cloud(&c);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.radius_search(Point3::new(0.0, 0.0, 0.0), 0.1), vec![0, 2]);
    }
}

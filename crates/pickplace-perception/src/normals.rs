//! Surface normal estimation.
//!
//! The classifier needs one normal per cluster point.  Estimation is behind
//! the [`NormalEstimator`] trait so a remote service (or a test double that
//! always fails) can stand in for the local PCA implementation.

use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use pickplace_types::PointCloud;
use thiserror::Error;

use crate::octree::{Octree, Point3};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalEstimationError {
    #[error("normal estimation needs at least {required} points, got {points}")]
    TooFewPoints { points: usize, required: usize },

    #[error("normal estimator unavailable: {0}")]
    Unavailable(String),
}

/// Computes one unit normal per point, in cloud order.
pub trait NormalEstimator: Send + Sync {
    fn estimate(&self, cloud: &PointCloud) -> Result<Vec<Vector3<f32>>, NormalEstimationError>;
}

/// Local PCA over the `k` nearest neighbours of each point.
///
/// The normal is the eigenvector of the neighbourhood covariance with the
/// smallest eigenvalue, flipped to face `viewpoint`.  Non-finite points get
/// a zero vector.
#[derive(Debug, Clone)]
pub struct PcaNormalEstimator {
    pub k: usize,
    pub viewpoint: [f32; 3],
}

impl Default for PcaNormalEstimator {
    fn default() -> Self {
        Self {
            k: 15,
            viewpoint: [0.0, 0.0, 0.0],
        }
    }
}

const MIN_POINTS: usize = 3;

impl NormalEstimator for PcaNormalEstimator {
    fn estimate(&self, cloud: &PointCloud) -> Result<Vec<Vector3<f32>>, NormalEstimationError> {
        let finite = cloud.iter().filter(|p| p.is_finite()).count();
        if finite < MIN_POINTS {
            return Err(NormalEstimationError::TooFewPoints {
                points: finite,
                required: MIN_POINTS,
            });
        }

        let tree = Octree::from_cloud(cloud);
        let k = self.k.max(MIN_POINTS);
        let viewpoint = Vector3::new(self.viewpoint[0] as f64, self.viewpoint[1] as f64, self.viewpoint[2] as f64);

        let normals = cloud
            .iter()
            .map(|p| {
                if !p.is_finite() {
                    return Vector3::zeros();
                }
                let neighbours: Vec<Vector3<f64>> = tree
                    .nearest_k(Point3::from(p), k)
                    .into_iter()
                    .filter_map(|(i, _)| cloud.get(i))
                    .map(|q| Vector3::new(q.x as f64, q.y as f64, q.z as f64))
                    .collect();
                let centre = Vector3::new(p.x as f64, p.y as f64, p.z as f64);
                let mut normal = pca_normal(&neighbours);
                if normal.dot(&(viewpoint - centre)) < 0.0 {
                    normal = -normal;
                }
                normal.cast::<f32>()
            })
            .collect();
        Ok(normals)
    }
}

/// Smallest-eigenvalue eigenvector of the covariance of `points`.
fn pca_normal(points: &[Vector3<f64>]) -> Vector3<f64> {
    if points.len() < MIN_POINTS {
        return Vector3::zeros();
    }
    let n = points.len() as f64;
    let mean = points.iter().fold(Vector3::zeros(), |acc, p| acc + p) / n;
    let mut cov = Matrix3::<f64>::zeros();
    for p in points {
        let d = p - mean;
        cov += d * d.transpose();
    }
    cov /= n;

    let eig = SymmetricEigen::new(cov);
    let smallest = eig.eigenvalues.imin();
    let normal = eig.eigenvectors.column(smallest).into_owned();
    let norm = normal.norm();
    if norm > 0.0 { normal / norm } else { Vector3::zeros() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickplace_types::PointXYZRGB;

    fn horizontal_patch(z: f32) -> PointCloud {
        let mut pts = Vec::new();
        for ix in 0..6 {
            for iy in 0..6 {
                pts.push(PointXYZRGB::new(ix as f32 * 0.01, iy as f32 * 0.01, z));
            }
        }
        pts.into_iter().collect()
    }

    #[test]
    fn flat_patch_normals_point_at_sensor() {
        let cloud = horizontal_patch(0.8);
        let normals = PcaNormalEstimator::default().estimate(&cloud).unwrap();
        assert_eq!(normals.len(), cloud.len());
        for n in normals {
            assert!((n.norm() - 1.0).abs() < 1e-4);
            // Sensor at the origin, patch above it: normals face -z.
            assert!(n.z < -0.99, "unexpected normal {n:?}");
        }
    }

    #[test]
    fn viewpoint_flips_orientation() {
        let cloud = horizontal_patch(0.8);
        let est = PcaNormalEstimator {
            k: 8,
            viewpoint: [0.0, 0.0, 2.0],
        };
        let normals = est.estimate(&cloud).unwrap();
        assert!(normals.iter().all(|n| n.z > 0.99));
    }

    #[test]
    fn too_few_points_is_an_error() {
        let cloud: PointCloud = [PointXYZRGB::new(0.0, 0.0, 0.0)].into_iter().collect();
        let err = PcaNormalEstimator::default().estimate(&cloud).unwrap_err();
        assert_eq!(err, NormalEstimationError::TooFewPoints { points: 1, required: 3 });
    }
}

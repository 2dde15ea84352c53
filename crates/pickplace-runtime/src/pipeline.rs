//! The per-frame pipeline.
//!
//! [`process_frame`] runs one [`SensorFrame`] from raw cloud to manifest:
//!
//! ```text
//! raw ─► preprocess ─► segment ─┬─► /pcl_table
//!                               └─► objects ─► cluster ─► classify ─► plan ─► manifest
//! ```
//!
//! Intermediate clouds, detections and markers are held back and published
//! on the bus only once the manifest is written, so an aborted frame emits
//! nothing.  Publishing never fails a frame.

use std::sync::Arc;
use std::time::Instant;

use pickplace_middleware::{EventBus, Topic};
use pickplace_perception::{
    ClassifyError, NormalEstimationError, SegmentationError, euclidean_clusters, preprocess, segment_plane,
};
use pickplace_planner::plan;
use pickplace_types::{
    ClusterIndices, DetectedObject, Event, EventPayload, FrameError, FrameReport, LabelMarker, PointCloud,
    PointXYZRGB, SensorFrame, pack_rgb,
};
use tracing::{debug, info, instrument, warn};

use crate::context::PipelineContext;

const SOURCE: &str = "pickplace-runtime::pipeline";

/// Process one frame to completion.
///
/// Returns the frame report on success.  Any [`FrameError`] aborts the
/// frame; `ctx` is left untouched either way.
#[instrument(skip_all, fields(frame_id = %frame.id, scene = ctx.scene_id()))]
pub fn process_frame(ctx: &PipelineContext, frame: &SensorFrame, bus: &EventBus) -> Result<FrameReport, FrameError> {
    let started = Instant::now();
    let raw = frame.cloud.as_ref();
    if raw.is_empty() {
        return Err(FrameError::SensorInput("frame contains no points".into()));
    }
    if !raw.iter().any(|p| p.is_finite()) {
        return Err(FrameError::SensorInput("frame contains no finite points".into()));
    }

    let config = ctx.config();
    let filtered = preprocess(raw, &config.preprocess);

    let segmentation = segment_plane(&filtered, &config.segmentation).map_err(|e| match e {
        SegmentationError::InsufficientSupport { inliers, required } => {
            FrameError::SegmentationFailure { inliers, required }
        }
    })?;
    let table = Arc::new(segmentation.table);
    let objects = Arc::new(segmentation.objects);
    let mut outputs = vec![
        (Topic::TableCloud, EventPayload::TableCloud(Arc::clone(&table))),
        (Topic::ObjectCloud, EventPayload::ObjectCloud(Arc::clone(&objects))),
    ];

    let clusters = euclidean_clusters(&objects, &config.clustering);
    if bus.receiver_count(Topic::ClusterCloud) > 0 {
        outputs.push((
            Topic::ClusterCloud,
            EventPayload::ClusterCloud(Arc::new(colour_clusters(&objects, &clusters))),
        ));
    }

    let mut detections = Vec::with_capacity(clusters.len());
    let mut markers = Vec::with_capacity(clusters.len());
    for (index, cluster) in clusters.iter().enumerate() {
        let cloud = objects.extract(cluster.as_slice());
        let label = ctx.classifier().classify(&cloud).map_err(|e| match e {
            ClassifyError::Normals(e @ NormalEstimationError::Unavailable(_)) => {
                FrameError::ClassificationServiceUnavailable(e.to_string())
            }
            ClassifyError::Normals(e) => FrameError::Classification(e.to_string()),
            ClassifyError::Model(e) => FrameError::Classification(e.to_string()),
        })?;
        if let Some(first) = cloud.get(0) {
            markers.push(LabelMarker {
                id: index,
                text: label.clone(),
                position: [first.x, first.y, first.z + config.markers.height],
            });
        }
        debug!(cluster = index, points = cloud.len(), label = %label, "detected object");
        detections.push(DetectedObject::new(label, cloud));
    }
    let labels: Vec<String> = detections.iter().map(|d| d.label().to_string()).collect();
    info!(count = detections.len(), labels = ?labels, "detected objects");

    outputs.push((Topic::ObjectMarkers, EventPayload::ObjectMarkers(markers)));
    let detections = Arc::new(detections);
    outputs.push((Topic::DetectedObjects, EventPayload::DetectedObjects(Arc::clone(&detections))));

    let params = ctx
        .params()
        .load()
        .map_err(|e| FrameError::Parameters(e.to_string()))?;
    let outcome = plan(&detections, &params, ctx.scene_id(), ctx.arm_policy());
    if !outcome.unmatched.is_empty() {
        debug!(unmatched = ?outcome.unmatched, "pick-list entries without detection");
    }

    let manifest_path = ctx
        .manifest()
        .emit(ctx.scene_id(), &outcome.assignments)
        .map_err(|e| FrameError::Manifest(e.to_string()))?;

    for (topic, payload) in outputs {
        publish(bus, topic, payload);
    }

    Ok(FrameReport {
        frame_id: frame.id,
        scene_id: ctx.scene_id(),
        input_points: raw.len(),
        filtered_points: filtered.len(),
        table_points: table.len(),
        object_points: objects.len(),
        clusters: clusters.len(),
        labels,
        assignments: outcome.assignments,
        unmatched: outcome.unmatched,
        duplicate_labels: outcome.duplicate_labels,
        missing_drop_groups: outcome.missing_drop_groups,
        manifest_path: Some(manifest_path),
        latency_us: started.elapsed().as_micros() as u64,
    })
}

fn publish(bus: &EventBus, topic: Topic, payload: EventPayload) {
    if let Err(e) = bus.publish_to(topic, Event::new(SOURCE, payload)) {
        warn!(topic = topic.name(), error = %e, "publish failed");
    }
}

/// Colour of cluster `index` out of `count`: hues evenly spread around the
/// colour wheel at full saturation and value.
pub fn cluster_colour(index: usize, count: usize) -> u32 {
    let hue = if count == 0 { 0.0 } else { index as f32 / count as f32 * 6.0 };
    let sector = hue.floor() as u32 % 6;
    let f = hue - hue.floor();
    let rise = (f * 255.0).round() as u8;
    let fall = 255 - rise;
    match sector {
        0 => pack_rgb(255, rise, 0),
        1 => pack_rgb(fall, 255, 0),
        2 => pack_rgb(0, 255, rise),
        3 => pack_rgb(0, fall, 255),
        4 => pack_rgb(rise, 0, 255),
        _ => pack_rgb(255, 0, fall),
    }
}

/// The points of every cluster, each cluster painted its own colour.
pub fn colour_clusters(objects: &PointCloud, clusters: &[ClusterIndices]) -> PointCloud {
    clusters
        .iter()
        .enumerate()
        .flat_map(|(i, cluster)| {
            let rgb = cluster_colour(i, clusters.len());
            cluster
                .iter()
                .filter_map(|&idx| objects.get(idx))
                .map(move |p| PointXYZRGB::with_rgb(p.x, p.y, p.z, rgb))
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickplace_types::unpack_rgb;

    #[test]
    fn palette_is_distinct_for_small_counts() {
        for count in 1..=12 {
            let colours: std::collections::HashSet<u32> = (0..count).map(|i| cluster_colour(i, count)).collect();
            assert_eq!(colours.len(), count, "duplicate colour for {count} clusters");
        }
        assert_eq!(unpack_rgb(cluster_colour(0, 3)), (255, 0, 0));
    }

    #[test]
    fn colour_clusters_keeps_only_clustered_points() {
        let objects: PointCloud = (0..5).map(|i| PointXYZRGB::new(i as f32, 0.0, 0.0)).collect();
        let clusters = vec![ClusterIndices::new(vec![0, 1]), ClusterIndices::new(vec![4])];
        let coloured = colour_clusters(&objects, &clusters);
        assert_eq!(coloured.len(), 3);
        assert_eq!(coloured.points()[0].rgb, coloured.points()[1].rgb);
        assert_ne!(coloured.points()[0].rgb, coloured.points()[2].rgb);
        assert_eq!(coloured.points()[2].x, 4.0);
    }
}

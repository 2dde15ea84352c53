//! Feeds sensor frames from the bus into [`process_frame`], one at a time.
//!
//! The dispatcher owns the queue policy: frames wait in the bounded
//! `SensorFrames` channel, and when the pipeline falls behind the oldest
//! queued frames are dropped (logged by the receiver).  A failed frame is
//! logged and published as a [`EventPayload::FrameFault`]; the next frame is
//! processed normally.

use std::future::Future;
use std::sync::Arc;

use pickplace_middleware::{EventBus, Topic, TopicReceiver};
use pickplace_types::{Event, EventPayload, FrameError, FrameReport, SensorFrame};
use tracing::{debug, error, info};

use crate::context::PipelineContext;
use crate::pipeline::process_frame;

const SOURCE: &str = "pickplace-runtime::dispatcher";

/// Counters returned when the dispatcher stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub processed: usize,
    pub failed: usize,
}

pub struct FrameDispatcher {
    ctx: Arc<PipelineContext>,
    bus: EventBus,
    frames: TopicReceiver,
    stats: DispatchStats,
}

impl FrameDispatcher {
    /// Subscribes to [`Topic::SensorFrames`] immediately, so frames published
    /// after this call are queued even before [`run_until`](Self::run_until) starts.
    pub fn new(ctx: Arc<PipelineContext>, bus: EventBus) -> Self {
        let frames = bus.subscribe_to(Topic::SensorFrames);
        Self {
            ctx,
            bus,
            frames,
            stats: DispatchStats::default(),
        }
    }

    /// Process one frame and publish its outcome.
    pub fn handle(&mut self, frame: &SensorFrame) -> Result<FrameReport, FrameError> {
        match process_frame(&self.ctx, frame, &self.bus) {
            Ok(report) => {
                self.stats.processed += 1;
                info!(
                    frame_id = %frame.id,
                    clusters = report.clusters,
                    assignments = report.assignments.len(),
                    latency_us = report.latency_us,
                    "frame processed"
                );
                self.publish(EventPayload::FrameReport(report.clone()));
                Ok(report)
            }
            Err(e) => {
                self.stats.failed += 1;
                error!(frame_id = %frame.id, kind = e.kind(), error = %e, "frame aborted");
                self.publish(EventPayload::FrameFault {
                    frame_id: frame.id,
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Process frames until `shutdown` resolves.
    ///
    /// Shutdown is only observed between frames.
    pub async fn run_until<F>(mut self, shutdown: F) -> DispatchStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(scene = self.ctx.scene_id(), "frame dispatcher started");
        loop {
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("frame dispatcher shutting down");
                    break;
                }
                event = self.frames.next() => event,
            };
            let Some(event) = event else { break };
            match event.payload {
                EventPayload::SensorFrame(frame) => {
                    let _ = self.handle(&frame);
                }
                _ => debug!(source = %event.source, "ignoring non-frame event on the sensor topic"),
            }
        }
        info!(processed = self.stats.processed, failed = self.stats.failed, "frame dispatcher stopped");
        self.stats
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    fn publish(&self, payload: EventPayload) {
        // No listener for reports is fine.
        let _ = self.bus.publish_to(Topic::FrameReports, Event::new(SOURCE, payload));
    }
}

//! Headless, typed, topic-based publish/subscribe bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  A subscriber that falls more than `capacity` messages behind
//! loses the oldest ones and is told how many it missed.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::SensorFrames`] | Raw RGB-D frames from the camera transport |
//! | [`Topic::TableCloud`] | Support-surface inliers |
//! | [`Topic::ObjectCloud`] | Points above the support surface |
//! | [`Topic::ClusterCloud`] | Object points recoloured per cluster |
//! | [`Topic::DetectedObjects`] | Labelled detections |
//! | [`Topic::ObjectMarkers`] | Label markers for the visualizer |
//! | [`Topic::FrameReports`] | Per-frame outcome and faults |

use pickplace_types::Event;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 16;

/// Errors raised by the bus itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Channel Error: {0}")]
    Channel(String),
}

/// Enumeration of all routing topics on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    SensorFrames,
    TableCloud,
    ObjectCloud,
    ClusterCloud,
    DetectedObjects,
    ObjectMarkers,
    FrameReports,
}

impl Topic {
    /// Conventional topic name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Topic::SensorFrames => "/pr2/world/points",
            Topic::TableCloud => "/pcl_table",
            Topic::ObjectCloud => "/pcl_objects",
            Topic::ClusterCloud => "/pcl_cluster",
            Topic::DetectedObjects => "/detected_objects",
            Topic::ObjectMarkers => "/object_markers",
            Topic::FrameReports => "/frame_reports",
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    sensor_frames: broadcast::Sender<Event>,
    table_cloud: broadcast::Sender<Event>,
    object_cloud: broadcast::Sender<Event>,
    cluster_cloud: broadcast::Sender<Event>,
    detected_objects: broadcast::Sender<Event>,
    object_markers: broadcast::Sender<Event>,
    frame_reports: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently and
    /// bounds the sensor-frame queue seen by the dispatcher.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (a [`broadcast`] channel restriction).
    pub fn new(capacity: usize) -> Self {
        let (sensor_frames, _) = broadcast::channel(capacity);
        let (table_cloud, _) = broadcast::channel(capacity);
        let (object_cloud, _) = broadcast::channel(capacity);
        let (cluster_cloud, _) = broadcast::channel(capacity);
        let (detected_objects, _) = broadcast::channel(capacity);
        let (object_markers, _) = broadcast::channel(capacity);
        let (frame_reports, _) = broadcast::channel(capacity);
        Self {
            sensor_frames,
            table_cloud,
            object_cloud,
            cluster_cloud,
            detected_objects,
            object_markers,
            frame_reports,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Returns `Ok(0)` when no subscribers are currently listening on the
    /// topic: visualization outputs are fire-and-forget.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, BusError> {
        match self.topic_sender(topic).send(event) {
            Ok(n) => Ok(n),
            Err(broadcast::error::SendError(_)) => Ok(0),
        }
    }

    /// Publish to a topic that must have at least one listener.
    ///
    /// Used for input frames: a frame nobody will process is an error for
    /// the producer.
    pub fn publish_required(&self, topic: Topic, event: Event) -> Result<usize, BusError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| BusError::Channel(format!("No subscribers for topic {}", topic.name())))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live receivers on `topic`.
    pub fn receiver_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::SensorFrames => &self.sensor_frames,
            Topic::TableCloud => &self.table_cloud,
            Topic::ObjectCloud => &self.object_cloud,
            Topic::ClusterCloud => &self.cluster_cloud,
            Topic::DetectedObjects => &self.detected_objects,
            Topic::ObjectMarkers => &self.object_markers,
            Topic::FrameReports => &self.frame_reports,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Wait for the next event, skipping over lag notifications.
    ///
    /// Dropped messages are logged.  Returns `None` once every sender has
    /// been dropped and the queue is drained.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = self.topic.name(), dropped = n, "subscriber lagged; oldest events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll; `None` when nothing is queued.
    pub fn try_next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = self.topic.name(), dropped = n, "subscriber lagged; oldest events dropped");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

use std::sync::{Arc, Mutex};

use super::{lock, Sink, TrackOutputProvider};
use crate::{format::TrackType, sample_queue::SampleQueue};

/// Routes extracted tracks to the sample queues of a media period by type.
pub struct BaseMediaChunkOutput {
    track_types: Vec<TrackType>,
    sample_queues: Vec<Arc<Mutex<SampleQueue>>>,
}

impl BaseMediaChunkOutput {
    pub fn new(track_types: Vec<TrackType>, sample_queues: Vec<Arc<Mutex<SampleQueue>>>) -> Self {
        assert_eq!(
            track_types.len(),
            sample_queues.len(),
            "every track type needs a sample queue"
        );
        Self {
            track_types,
            sample_queues,
        }
    }

    /// Current write index of every sample queue.
    pub fn write_indices(&self) -> Vec<usize> {
        self.sample_queues
            .iter()
            .map(|queue| lock(queue).write_index())
            .collect()
    }

    /// Sets the offset added to the timestamps of all samples written from
    /// now on.
    pub fn set_sample_offset_us(&self, sample_offset_us: i64) {
        for queue in &self.sample_queues {
            lock(queue).set_sample_offset_us(sample_offset_us);
        }
    }

    pub fn sample_queues(&self) -> &[Arc<Mutex<SampleQueue>>] {
        &self.sample_queues
    }
}

impl TrackOutputProvider for BaseMediaChunkOutput {
    fn track(&self, id: u32, track_type: TrackType) -> Sink {
        for (queue_type, queue) in self.track_types.iter().zip(&self.sample_queues) {
            if *queue_type == track_type {
                return Sink::Bound(queue.clone());
            }
        }

        tracing::error!(id, "Unmatched track of type: {track_type:?}");
        Sink::Discarding
    }
}

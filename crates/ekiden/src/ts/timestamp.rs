/// Maps stream timestamps onto the playback timeline.
///
/// The first adjusted sample lands at `first_sample_timestamp_us`. Without a
/// first sample timestamp, timestamps pass through unchanged.
#[derive(Debug, Clone, Default)]
pub struct TimestampAdjuster {
    first_sample_timestamp_us: Option<i64>,
    timestamp_offset_us: Option<i64>,
    last_unadjusted_timestamp_us: Option<i64>,
}

/// 33 bit MPEG presentation timestamps wrap around at this value.
const MAX_PTS_PLUS_ONE: i64 = 0x2_0000_0000;

impl TimestampAdjuster {
    pub fn new(first_sample_timestamp_us: Option<i64>) -> Self {
        Self {
            first_sample_timestamp_us,
            timestamp_offset_us: None,
            last_unadjusted_timestamp_us: None,
        }
    }

    /// Starts over with a new first sample timestamp.
    pub fn reset(&mut self, first_sample_timestamp_us: Option<i64>) {
        *self = Self::new(first_sample_timestamp_us);
    }

    pub fn first_sample_timestamp_us(&self) -> Option<i64> {
        self.first_sample_timestamp_us
    }

    /// The offset added to stream timestamps, once known.
    pub fn timestamp_offset_us(&self) -> Option<i64> {
        match self.first_sample_timestamp_us {
            Some(_) => self.timestamp_offset_us,
            None => Some(0),
        }
    }

    /// The last timestamp returned by an adjustment.
    pub fn last_adjusted_timestamp_us(&self) -> Option<i64> {
        let last = self.last_unadjusted_timestamp_us?;
        Some(last + self.timestamp_offset_us()?)
    }

    pub fn adjust_sample_timestamp(&mut self, time_us: i64) -> i64 {
        if let Some(first_sample_timestamp_us) = self.first_sample_timestamp_us {
            if self.timestamp_offset_us.is_none() {
                self.timestamp_offset_us = Some(first_sample_timestamp_us - time_us);
            }
        }
        self.last_unadjusted_timestamp_us = Some(time_us);
        time_us + self.timestamp_offset_us().unwrap_or(0)
    }

    /// Adjusts a 90 kHz presentation timestamp, unwrapping it to the value
    /// closest to the previous one.
    pub fn adjust_ts_timestamp(&mut self, pts: i64) -> i64 {
        let mut pts = pts;
        if let Some(last_us) = self.last_unadjusted_timestamp_us {
            let last_pts = us_to_pts(last_us);
            let wrap_count = (last_pts + MAX_PTS_PLUS_ONE / 2) / MAX_PTS_PLUS_ONE;
            let below = pts + MAX_PTS_PLUS_ONE * (wrap_count - 1);
            let above = pts + MAX_PTS_PLUS_ONE * wrap_count;
            pts = if (below - last_pts).abs() < (above - last_pts).abs() {
                below
            } else {
                above
            };
        }
        self.adjust_sample_timestamp(pts_to_us(pts))
    }
}

pub fn pts_to_us(pts: i64) -> i64 {
    pts * 1_000_000 / 90_000
}

pub fn us_to_pts(us: i64) -> i64 {
    us * 90_000 / 1_000_000
}

//! Occupancy status derivation.
//!
//! Pure functions of the current count, recomputed on every feed
//! delivery. Thresholds and capacity are fixed for the monitored room.

use serde::{Deserialize, Serialize};

/// Fixed capacity of the monitored room.
pub const ROOM_CAPACITY: u32 = 25;

/// Upper bound of the `Safe` band, inclusive.
const SAFE_MAX: u32 = 15;

/// Upper bound of the `Near` band, inclusive.
const NEAR_MAX: u32 = 20;

/// Safety tier derived from the current count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyStatus {
    Safe,
    Near,
    Over,
}

/// Display color class attached to each tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusColor {
    Green,
    Amber,
    Red,
}

impl OccupancyStatus {
    pub fn label(self) -> &'static str {
        match self {
            OccupancyStatus::Safe => "Safe",
            OccupancyStatus::Near => "Near Capacity",
            OccupancyStatus::Over => "Over Capacity",
        }
    }

    pub fn color(self) -> StatusColor {
        match self {
            OccupancyStatus::Safe => StatusColor::Green,
            OccupancyStatus::Near => StatusColor::Amber,
            OccupancyStatus::Over => StatusColor::Red,
        }
    }
}

/// Maps a count to its safety tier.
pub fn derive_status(count: u32) -> OccupancyStatus {
    if count <= SAFE_MAX {
        OccupancyStatus::Safe
    } else if count <= NEAR_MAX {
        OccupancyStatus::Near
    } else {
        OccupancyStatus::Over
    }
}

/// Percentage of capacity, rounded, clamped to 100.
pub fn occupancy_percentage(count: u32) -> u32 {
    ((count * 100 + ROOM_CAPACITY / 2) / ROOM_CAPACITY).min(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_band_covers_zero_through_fifteen() {
        for count in 0..=15 {
            assert_eq!(derive_status(count), OccupancyStatus::Safe, "count {count}");
        }
    }

    #[test]
    fn near_band_covers_sixteen_through_twenty() {
        for count in 16..=20 {
            assert_eq!(derive_status(count), OccupancyStatus::Near, "count {count}");
        }
    }

    #[test]
    fn over_band_starts_at_twenty_one() {
        for count in 21..=60 {
            assert_eq!(derive_status(count), OccupancyStatus::Over, "count {count}");
        }
    }

    #[test]
    fn percentage_follows_capacity_formula() {
        assert_eq!(occupancy_percentage(0), 0);
        assert_eq!(occupancy_percentage(5), 20);
        assert_eq!(occupancy_percentage(18), 72);
        assert_eq!(occupancy_percentage(25), 100);
    }

    #[test]
    fn percentage_clamps_above_capacity() {
        assert_eq!(occupancy_percentage(30), 100);
        assert_eq!(occupancy_percentage(250), 100);
    }

    #[test]
    fn status_colors_track_tiers() {
        assert_eq!(derive_status(3).color(), StatusColor::Green);
        assert_eq!(derive_status(18).color(), StatusColor::Amber);
        assert_eq!(derive_status(22).color(), StatusColor::Red);
    }
}

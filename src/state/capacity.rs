//! Seat accounting for a match: the organizer's seat plus one seat per approved request.

use serde::Serialize;
use utoipa::ToSchema;

/// Hard number of players a match can hold.
pub const MATCH_CAPACITY: usize = 4;
/// Seats held by the organizer, who is always on the roster.
pub const ORGANIZER_SEATS: usize = 1;

/// Raw number of occupied seats given the approved request count.
pub fn occupied(approved: usize) -> usize {
    ORGANIZER_SEATS + approved
}

/// Whether one more approval fits under `limit` occupied seats.
pub fn admits_one_more(approved: usize, limit: usize) -> bool {
    occupied(approved) < limit
}

/// Display view of a match's seats, derived from one approved-count read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CapacityView {
    /// Occupied seats, capped at [`MATCH_CAPACITY`].
    pub occupied: usize,
    /// Seats still open.
    pub available: usize,
    /// Total seats of the match.
    pub capacity: usize,
}

impl CapacityView {
    /// Build the view from the number of approved requests.
    pub fn from_approved(approved: usize) -> Self {
        let occupied = occupied(approved).min(MATCH_CAPACITY);
        Self {
            occupied,
            available: MATCH_CAPACITY.saturating_sub(occupied),
            capacity: MATCH_CAPACITY,
        }
    }

    /// Whether the match has no open seat left.
    pub fn is_full(&self) -> bool {
        self.available == 0
    }
}

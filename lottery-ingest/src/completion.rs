//! Tracks which agencies have signalled END.
//!
//! One flag per possible agency id plus a count of distinct agencies. A flag
//! only bumps the count on its first transition, so a repeated END from the
//! same agency is a no-op rather than a double count.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::{bet::AgencyId, error::CompletionError};

const AGENCY_SLOTS: usize = AgencyId::MAX as usize + 1;

#[derive(Debug)]
pub struct CompletionTracker {
    total: AgencyId,
    finished: [AtomicBool; AGENCY_SLOTS],
    finished_count: AtomicUsize,
}

impl CompletionTracker {
    /// Creates a tracker for agencies numbered `1..=total`.
    pub fn new(total: AgencyId) -> Self {
        Self {
            total,
            finished: std::array::from_fn(|_| AtomicBool::new(false)),
            finished_count: AtomicUsize::new(0),
        }
    }

    pub fn total(&self) -> AgencyId {
        self.total
    }

    /// Marks `agency` as finished.
    ///
    /// Returns `Ok(true)` the first time an agency is marked and `Ok(false)` on
    /// repeats.
    pub fn mark_finished(&self, agency: AgencyId) -> Result<bool, CompletionError> {
        if agency == 0 || agency > self.total {
            return Err(CompletionError::UnknownAgency {
                agency,
                total: self.total,
            });
        }

        let already = self.finished[agency as usize].swap(true, Ordering::AcqRel);
        if !already {
            self.finished_count.fetch_add(1, Ordering::AcqRel);
        }
        Ok(!already)
    }

    pub fn is_finished(&self, agency: AgencyId) -> bool {
        self.finished[agency as usize].load(Ordering::Acquire)
    }

    pub fn finished_count(&self) -> usize {
        self.finished_count.load(Ordering::Acquire)
    }

    /// True once every configured agency has signalled END.
    pub fn is_all_finished(&self) -> bool {
        self.finished_count() == self.total as usize
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn repeated_marks_do_not_inflate_the_count() {
        let tracker = CompletionTracker::new(3);
        assert_eq!(tracker.mark_finished(2), Ok(true));
        assert_eq!(tracker.mark_finished(2), Ok(false));
        assert_eq!(tracker.mark_finished(2), Ok(false));

        assert_eq!(tracker.finished_count(), 1);
        assert!(!tracker.is_all_finished());
    }

    #[test]
    fn barrier_opens_exactly_at_total_in_any_order() {
        let tracker = CompletionTracker::new(3);
        for agency in [3, 1, 3, 1] {
            tracker.mark_finished(agency).expect("in range");
            assert!(!tracker.is_all_finished());
        }
        tracker.mark_finished(2).expect("in range");
        assert!(tracker.is_all_finished());
        assert!(tracker.is_finished(2));
    }

    #[test]
    fn out_of_range_agencies_are_rejected() {
        let tracker = CompletionTracker::new(2);
        assert_eq!(
            tracker.mark_finished(0),
            Err(CompletionError::UnknownAgency { agency: 0, total: 2 })
        );
        assert!(tracker.mark_finished(3).is_err());
        assert_eq!(tracker.finished_count(), 0);
    }

    #[test]
    fn concurrent_duplicate_marks_count_each_agency_once() {
        let tracker = Arc::new(CompletionTracker::new(8));
        let threads: Vec<_> = (0..32)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    tracker.mark_finished((i % 8) as u8 + 1).expect("in range");
                })
            })
            .collect();
        for thread in threads {
            thread.join().expect("marker thread");
        }

        assert_eq!(tracker.finished_count(), 8);
        assert!(tracker.is_all_finished());
    }
}

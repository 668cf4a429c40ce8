//! Timestamp sources and the tolerance-window search

use tracing::trace;

use crate::config::{DEFAULT_TOLERANCE_MS, END_OF_LOG_STALENESS_MS};
use crate::timestamp::Timestamp;

/// A forward-moving sequence of timestamps with one step of undo.
///
/// Implementors supply the cursor primitives. The search algorithm that
/// answers "which record is valid at time T" is shared by every source.
pub trait TimestampSource {
    /// Move to the next timestamp.
    ///
    /// Returns whether a current timestamp is available afterwards. At the
    /// end of the sequence the current timestamp is kept, the source becomes
    /// exhausted, and the previous validity is returned unchanged.
    fn advance(&mut self) -> bool;

    /// Timestamp under the cursor
    fn current(&self) -> Option<Timestamp>;

    /// Timestamp most recently superseded by [`TimestampSource::advance`]
    fn previous(&self) -> Option<Timestamp>;

    /// Step back so the next [`TimestampSource::advance`] yields the previous
    /// timestamp again.
    ///
    /// Only one step is retained; a second call without advancing in between
    /// returns `false`. A successful rewind clears both current and previous.
    fn rewind_one_step(&mut self) -> bool;

    /// Whether the last advance ran out of data
    fn is_exhausted(&self) -> bool;

    /// How far past the final timestamp a request may lie and still match it
    fn end_of_log_staleness_ms(&self) -> i64 {
        END_OF_LOG_STALENESS_MS
    }

    /// Tolerance used by [`TimestampSource::search`]
    fn default_tolerance_ms(&self) -> i64 {
        DEFAULT_TOLERANCE_MS
    }

    /// Position the cursor on the record valid at `target`.
    ///
    /// A record matches when its timestamp equals `target`, when it is the
    /// last one and lies at most the staleness bound before `target`, or when
    /// it immediately precedes a later record and lies at most
    /// `tolerance_ms` before `target`. Records from the future never match.
    ///
    /// Calling this twice with the same arguments gives the same answer.
    fn search_for_timestamp(&mut self, target: Timestamp, tolerance_ms: i64) -> bool {
        if self.current().is_none() && !self.advance() {
            return false;
        }

        loop {
            let Some(current) = self.current() else {
                return false;
            };

            match target.cmp(&current) {
                std::cmp::Ordering::Equal => return true,
                std::cmp::Ordering::Greater => {
                    if self.is_exhausted() {
                        let behind = target.diff_millis(&current);
                        trace!(%target, %current, behind, "Search reached end of log");
                        return behind <= self.end_of_log_staleness_ms();
                    }
                    self.advance();
                }
                std::cmp::Ordering::Less => {
                    if self.is_exhausted() {
                        return false;
                    }
                    let Some(previous) = self.previous() else {
                        trace!(%target, %current, "First record is later than target");
                        return false;
                    };
                    let ahead = target.diff_millis(&previous);
                    if !(0..=tolerance_ms).contains(&ahead) {
                        return false;
                    }
                    return self.previous_record();
                }
            }
        }
    }

    /// [`TimestampSource::search_for_timestamp`] with the default tolerance
    fn search(&mut self, target: Timestamp) -> bool {
        let tolerance_ms = self.default_tolerance_ms();
        self.search_for_timestamp(target, tolerance_ms)
    }

    /// Rewind one step and advance, making the previous timestamp current
    fn previous_record(&mut self) -> bool {
        self.rewind_one_step() && self.advance()
    }
}

//! crates/writing_assistant_core/src/streak.rs
//!
//! Writing streaks: consecutive calendar days on which the user started a document.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WritingStreak {
    pub current: u32,
    pub longest: u32,
}

/// Computes the streak from document creation times.
///
/// The current streak only counts if the most recent writing day up to `today`
/// is `today` or yesterday; it then extends backwards over consecutive days. The longest
/// streak is the longest such run anywhere in history.
pub fn calculate_streak(created: &[DateTime<Utc>], today: NaiveDate) -> WritingStreak {
    let days: BTreeSet<NaiveDate> = created.iter().map(|ts| ts.date_naive()).collect();

    // most recent first
    let days: Vec<NaiveDate> = days.into_iter().rev().collect();
    if days.is_empty() {
        return WritingStreak::default();
    }

    // Days after `today` (server and database clocks disagree) never extend
    // the current streak.
    let up_to_today: Vec<NaiveDate> = days.iter().copied().filter(|day| *day <= today).collect();
    let current = match up_to_today.first() {
        Some(&latest) if matches!((today - latest).num_days(), 0 | 1) => run_length(&up_to_today),
        _ => 0,
    };

    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for &day in &days {
        run = match previous {
            Some(prev) if (prev - day).num_days() == 1 => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(day);
    }

    WritingStreak { current, longest }
}

/// Length of the run of consecutive days at the start of `days` (newest first).
fn run_length(days: &[NaiveDate]) -> u32 {
    1 + days
        .windows(2)
        .take_while(|pair| (pair[0] - pair[1]).num_days() == 1)
        .count() as u32
}

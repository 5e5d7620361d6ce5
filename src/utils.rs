/// Utility functions
use chrono::{Days, NaiveDate, Utc};
use rand::Rng;

/// Current UTC calendar day
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Parse a `YYYY-MM-DD` day
pub fn parse_day(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Check that `date` lies in `[first, last]`
pub fn in_range(date: NaiveDate, first: NaiveDate, last: NaiveDate) -> bool {
    first <= date && date <= last
}

/// Uniformly random day in `[first, last]`, both inclusive
pub fn random_day<R: Rng + ?Sized>(rng: &mut R, first: NaiveDate, last: NaiveDate) -> NaiveDate {
    if last <= first {
        return first;
    }
    let span = (last - first).num_days() as u64;
    let offset = rng.gen_range(0..=span);
    first.checked_add_days(Days::new(offset)).unwrap_or(last)
}

/// The `n` days ending at `last`, newest first
pub fn trailing_days(last: NaiveDate, n: u32) -> Vec<NaiveDate> {
    (0..n as u64)
        .filter_map(|back| last.checked_sub_days(Days::new(back)))
        .collect()
}

/// Index after `i` in a ring of `len` items
pub fn wrap_next(i: usize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (i + 1) % len
}

/// Index before `i` in a ring of `len` items
pub fn wrap_prev(i: usize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (i % len + len - 1) % len
}

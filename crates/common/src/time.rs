/// Current wall-clock time as unix milliseconds.
///
/// Used for every reported timestamp (config sync times, first/last-seen,
/// compressed-stats markers). Monotonic arithmetic (TTLs, rate-limit
/// windows) uses `std::time::Instant` instead.
pub fn unix_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_ms_is_plausible() {
        // 2020-01-01 in milliseconds.
        assert!(unix_ms() > 1_577_836_800_000);
    }
}

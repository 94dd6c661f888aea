//! Per-subject alert cooldown for one camera
//!
//! Owned by the camera's dispatcher; never shared.

use chrono::{DateTime, Duration, Local};
use std::collections::HashMap;

const PRUNE_EVERY_SECS: i64 = 60;

pub struct CooldownTracker {
    last_alert: HashMap<i64, DateTime<Local>>,
    window: Duration,
    evict_after: Duration,
    last_prune: Option<DateTime<Local>>,
}

impl CooldownTracker {
    /// `evict_after` is clamped to at least `window`
    pub fn new(window: std::time::Duration, evict_after: std::time::Duration) -> Self {
        let window = Duration::from_std(window).unwrap_or_else(|_| Duration::seconds(10));
        let evict_after = Duration::from_std(evict_after)
            .unwrap_or(window)
            .max(window);
        Self {
            last_alert: HashMap::new(),
            window,
            evict_after,
            last_prune: None,
        }
    }

    /// True while `now - last_alert <= window`
    pub fn is_cooling_down(&self, track_id: i64, now: DateTime<Local>) -> bool {
        self.last_alert
            .get(&track_id)
            .map(|last| now - *last <= self.window)
            .unwrap_or(false)
    }

    pub fn mark(&mut self, track_id: i64, now: DateTime<Local>) {
        self.last_alert.insert(track_id, now);
    }

    /// Drop entries idle longer than `evict_after`, at most once a minute
    pub fn prune(&mut self, now: DateTime<Local>) -> usize {
        if let Some(last) = self.last_prune {
            if now - last < Duration::seconds(PRUNE_EVERY_SECS) {
                return 0;
            }
        }
        self.last_prune = Some(now);

        let before = self.last_alert.len();
        let evict_after = self.evict_after;
        self.last_alert.retain(|_, last| now - *last <= evict_after);
        before - self.last_alert.len()
    }

    pub fn len(&self) -> usize {
        self.last_alert.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_alert.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn tracker() -> CooldownTracker {
        CooldownTracker::new(
            std::time::Duration::from_secs(10),
            std::time::Duration::from_secs(100),
        )
    }

    #[test]
    fn test_window_is_inclusive() {
        let mut cooldowns = tracker();
        assert!(!cooldowns.is_cooling_down(7, at(0)));
        cooldowns.mark(7, at(0));

        assert!(cooldowns.is_cooling_down(7, at(1)));
        assert!(cooldowns.is_cooling_down(7, at(10)));
        assert!(!cooldowns.is_cooling_down(7, at(11)));
        assert!(!cooldowns.is_cooling_down(8, at(1)));
    }

    #[test]
    fn test_prune_keeps_recent_entries() {
        let mut cooldowns = tracker();
        cooldowns.mark(1, at(0));
        cooldowns.mark(2, at(150));

        assert_eq!(cooldowns.prune(at(160)), 1);
        assert_eq!(cooldowns.len(), 1);
        assert!(cooldowns.is_cooling_down(2, at(160)));
    }

    #[test]
    fn test_prune_rate_limited() {
        let mut cooldowns = tracker();
        assert_eq!(cooldowns.prune(at(0)), 0);
        cooldowns.mark(1, at(0));
        // second prune within a minute is skipped even though entry is stale
        assert_eq!(cooldowns.prune(at(30)), 0);
        assert_eq!(cooldowns.prune(at(200)), 1);
        assert!(cooldowns.is_empty());
    }

    #[test]
    fn test_evict_after_never_below_window() {
        let mut cooldowns = CooldownTracker::new(
            std::time::Duration::from_secs(10),
            std::time::Duration::from_secs(1),
        );
        cooldowns.mark(1, at(0));
        assert_eq!(cooldowns.prune(at(5)), 0);
        assert!(cooldowns.is_cooling_down(1, at(5)));
    }
}

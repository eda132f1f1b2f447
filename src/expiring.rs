//! Freshness-tagged readings

use std::time::{Duration, Instant};

/// A value that goes stale after an optional expiration
///
/// Distinguishes "never updated" from "updated but stale or cleared".
#[derive(Debug, Clone, Copy)]
pub struct ExpiringValue<T: Copy> {
    value: Option<T>,
    updated_at: Option<Instant>,
    expiration: Option<Duration>,
}

impl<T: Copy> Default for ExpiringValue<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T: Copy> ExpiringValue<T> {
    pub fn new(expiration: Option<Duration>) -> Self {
        Self {
            value: None,
            updated_at: None,
            expiration,
        }
    }

    /// Build from seconds, 0 meaning "never expires"
    pub fn with_expiration_secs(secs: u64) -> Self {
        Self::new((secs > 0).then(|| Duration::from_secs(secs)))
    }

    pub fn update(&mut self, value: T) {
        self.update_at(value, Instant::now());
    }

    pub fn update_at(&mut self, value: T, now: Instant) {
        self.value = Some(value);
        self.updated_at = Some(now);
    }

    /// Record a sensor answer; `None` is an explicit invalid reading
    pub fn update_reading(&mut self, value: Option<T>) {
        match value {
            Some(v) => self.update(v),
            None => self.clear(),
        }
    }

    /// Drop the current value, keeping the "has been updated" mark
    pub fn clear(&mut self) {
        self.value = None;
        if self.updated_at.is_none() {
            self.updated_at = Some(Instant::now());
        }
    }

    pub fn never_updated(&self) -> bool {
        self.updated_at.is_none()
    }

    pub fn is_present(&self) -> bool {
        self.get().is_some()
    }

    /// Current value if present and fresh
    pub fn get(&self) -> Option<T> {
        self.get_at(Instant::now())
    }

    pub fn get_at(&self, now: Instant) -> Option<T> {
        let value = self.value?;
        match (self.expiration, self.updated_at) {
            (Some(expiration), Some(at)) if now.saturating_duration_since(at) >= expiration => {
                None
            }
            _ => Some(value),
        }
    }

    /// Current value or `fallback`
    pub fn or(&self, fallback: T) -> T {
        self.get().unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_updates_and_presence() {
        let mut v = ExpiringValue::<f32>::default();
        assert!(v.never_updated());
        assert!(!v.is_present());
        assert_eq!(v.or(1.5), 1.5);

        v.update(42.0);
        assert!(!v.never_updated());
        assert_eq!(v.get(), Some(42.0));

        v.update_reading(None);
        assert!(!v.never_updated());
        assert!(!v.is_present());
    }

    #[test]
    fn expires() {
        let mut v = ExpiringValue::<f32>::new(Some(Duration::from_secs(10)));
        let t0 = Instant::now();
        v.update_at(20.0, t0);
        assert_eq!(v.get_at(t0 + Duration::from_secs(9)), Some(20.0));
        assert_eq!(v.get_at(t0 + Duration::from_secs(10)), None);
        assert!(!v.never_updated());
    }

    #[test]
    fn zero_seconds_never_expires() {
        let mut v = ExpiringValue::<f32>::with_expiration_secs(0);
        let t0 = Instant::now();
        v.update_at(1.0, t0);
        assert_eq!(v.get_at(t0 + Duration::from_secs(1_000_000)), Some(1.0));
    }
}

//! Per-rule application counts backing "respond on the nth call".

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;

/// How a candidate relates to the request being matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Method, URL or body fragment does not match
    Skip,
    /// Matches with no call-count condition
    Always,
    /// Matches, but only applies on this call (1-based) of requests it matches
    Nth(u64),
}

/// Per-rule counts of matching requests.
///
/// Every `Nth` candidate that matches a request advances its own count,
/// whether or not it is the one selected; selection and all increments for a
/// request happen under one lock.
#[derive(Default)]
pub struct MockApplicationCounter {
    counts: Mutex<HashMap<String, u64>>,
}

impl MockApplicationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, key: &str) -> u64 {
        self.counts.lock().get(key).copied().unwrap_or(0)
    }

    /// Advance the count of every matching `Nth` candidate and return the
    /// first candidate that applies to this request.
    pub fn select_and_increment<'a, T, K, E>(
        &self,
        candidates: impl IntoIterator<Item = &'a T>,
        key: K,
        eligibility: E,
    ) -> Option<&'a T>
    where
        T: 'a,
        K: Fn(&T) -> &str,
        E: Fn(&T) -> Eligibility,
    {
        let mut counts = self.counts.lock();
        let mut selected = None;
        for candidate in candidates {
            let applies = match eligibility(candidate) {
                Eligibility::Skip => false,
                Eligibility::Always => true,
                Eligibility::Nth(nth) => {
                    let seen = counts.entry(key(candidate).to_string()).or_insert(0);
                    *seen += 1;
                    *seen == nth
                }
            };
            if applies && selected.is_none() {
                selected = Some(candidate);
            }
        }
        selected
    }

    pub fn reset(&self) {
        self.counts.lock().clear();
    }
}

impl fmt::Debug for MockApplicationCounter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MockApplicationCounter")
            .field("rules", &self.counts.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn nth(n: u64) -> impl Fn(&&str) -> Eligibility {
        move |_| Eligibility::Nth(n)
    }

    #[test]
    fn test_lone_nth_rule_fires_once() {
        let counter = MockApplicationCounter::new();
        let rules = ["x"];
        let hits: Vec<bool> = (0..3)
            .map(|_| {
                counter
                    .select_and_increment(rules.iter(), |r| *r, nth(2))
                    .is_some()
            })
            .collect();
        assert_eq!(hits, vec![false, true, false]);
        assert_eq!(counter.count("x"), 3);
    }

    #[test]
    fn test_unselected_nth_rules_still_advance() {
        let counter = MockApplicationCounter::new();
        let rules = ["always", "third"];
        let eligibility = |r: &&str| match *r {
            "always" => Eligibility::Always,
            _ => Eligibility::Nth(3),
        };
        for _ in 0..3 {
            let picked = counter.select_and_increment(rules.iter(), |r| *r, eligibility);
            assert_eq!(picked, Some(&"always"));
        }
        assert_eq!(counter.count("always"), 0);
        assert_eq!(counter.count("third"), 3);
    }

    #[test]
    fn test_skipped_rules_do_not_advance() {
        let counter = MockApplicationCounter::new();
        let picked = counter.select_and_increment(["x"].iter(), |r| *r, |_| Eligibility::Skip);
        assert!(picked.is_none());
        assert_eq!(counter.count("x"), 0);
    }

    #[test]
    fn test_concurrent_selection_never_double_counts() {
        let counter = Arc::new(MockApplicationCounter::new());
        let winners = Arc::new(Mutex::new(0u32));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let rules = ["only-once"];
                        if counter
                            .select_and_increment(rules.iter(), |r| *r, nth(1))
                            .is_some()
                        {
                            *winners.lock() += 1;
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*winners.lock(), 1);
        assert_eq!(counter.count("only-once"), 800);
    }

    #[test]
    fn test_reset() {
        let counter = MockApplicationCounter::new();
        counter.select_and_increment(["a"].iter(), |r| *r, nth(5));
        counter.reset();
        assert_eq!(counter.count("a"), 0);
    }
}

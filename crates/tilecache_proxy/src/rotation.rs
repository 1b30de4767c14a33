use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Process-wide request counter behind key rotation.
///
/// The only shared mutable state on the request path. It is advanced with a
/// single `fetch_add`, so concurrent requests may pick the same key but no
/// increment is ever lost.
#[derive(Debug, Default)]
pub struct RotationCounter(AtomicU64);

impl RotationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter and returns the new value.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Round-robin selection over the configured API keys.
#[derive(Clone)]
pub struct CredentialRotator {
    credentials: Arc<[String]>,
    counter: Arc<RotationCounter>,
}

impl std::fmt::Debug for CredentialRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRotator")
            .field("credentials", &self.credentials.len())
            .field("counter", &self.counter.current())
            .finish()
    }
}

impl CredentialRotator {
    pub fn new(credentials: Vec<String>, counter: Arc<RotationCounter>) -> Self {
        Self {
            credentials: credentials.into(),
            counter,
        }
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Picks the key for the next upstream request.
    ///
    /// With no keys configured this returns `None` and leaves the counter
    /// untouched.
    pub fn next(&self) -> Option<&str> {
        if self.credentials.is_empty() {
            return None;
        }
        let n = self.counter.advance();
        let idx = (n % self.credentials.len() as u64) as usize;
        Some(&self.credentials[idx])
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::{CredentialRotator, RotationCounter};

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn selects_after_increment() {
        let rotator = CredentialRotator::new(keys(&["a", "b", "c"]), Arc::new(RotationCounter::new()));
        let picked: Vec<_> = (0..6).map(|_| rotator.next().unwrap().to_string()).collect();
        assert_eq!(picked, keys(&["b", "c", "a", "b", "c", "a"]));
    }

    #[test]
    fn empty_set_injects_nothing_and_keeps_counter() {
        let counter = Arc::new(RotationCounter::new());
        let rotator = CredentialRotator::new(Vec::new(), counter.clone());
        assert!(rotator.next().is_none());
        assert_eq!(counter.current(), 0);
    }

    #[test]
    fn single_key_is_always_selected() {
        let rotator = CredentialRotator::new(keys(&["only"]), Arc::new(RotationCounter::new()));
        for _ in 0..10 {
            assert_eq!(rotator.next(), Some("only"));
        }
    }

    #[test]
    fn clones_share_the_counter() {
        let counter = Arc::new(RotationCounter::new());
        let a = CredentialRotator::new(keys(&["x", "y"]), counter.clone());
        let b = a.clone();
        a.next();
        b.next();
        assert_eq!(counter.current(), 2);
    }

    #[test]
    fn concurrent_selection_is_even() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 1_000;
        let names = keys(&["k0", "k1", "k2"]);
        let counter = Arc::new(RotationCounter::new());
        let rotator = CredentialRotator::new(names.clone(), counter.clone());

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let rotator = rotator.clone();
                std::thread::spawn(move || {
                    let mut local: HashMap<String, usize> = HashMap::new();
                    for _ in 0..PER_THREAD {
                        *local.entry(rotator.next().unwrap().to_string()).or_default() += 1;
                    }
                    local
                })
            })
            .collect();

        let mut totals: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for (key, count) in handle.join().expect("thread") {
                *totals.entry(key).or_default() += count;
            }
        }

        let m = THREADS * PER_THREAD;
        assert_eq!(counter.current() as usize, m);
        assert_eq!(totals.values().sum::<usize>(), m);

        let fair = m / names.len();
        for name in &names {
            let count = totals.get(name).copied().unwrap_or(0);
            assert!(count.abs_diff(fair) <= 1, "{name} selected {count} times, fair share {fair}");
        }
    }
}

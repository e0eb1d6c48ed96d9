use std::sync::atomic::{AtomicBool, Ordering};

/// Host-supplied network availability check.
///
/// The cache consults this before every network dispatch; when it reports
/// `false` no fetch is started and nothing is marked in flight.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

impl<F> Connectivity for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_online(&self) -> bool {
        self()
    }
}

/// Connectivity state that can be toggled at runtime.
#[derive(Debug)]
pub struct ConnectivityFlag(AtomicBool);

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self(AtomicBool::new(online))
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn set(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::online()
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Granted,
    Denied,
}

/// Allows at most one submission to be in flight at a time.
#[derive(Debug, Default)]
pub struct SingleFlightGuard {
    in_flight: AtomicBool,
}

impl SingleFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `Idle -> InFlight`. Denied if something is already in flight.
    pub fn acquire(&self) -> Acquire {
        match self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Acquire::Granted,
            Err(_) => Acquire::Denied,
        }
    }

    /// Back to `Idle`. Safe to call when already idle.
    pub fn release(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    pub fn state(&self) -> SubmissionState {
        if self.in_flight.load(Ordering::Acquire) {
            SubmissionState::InFlight
        } else {
            SubmissionState::Idle
        }
    }

    /// Like `acquire`, but the returned permit releases the guard when dropped,
    /// whichever way the holder exits.
    pub fn try_enter(&self) -> Option<FlightPermit<'_>> {
        match self.acquire() {
            Acquire::Granted => Some(FlightPermit { guard: self }),
            Acquire::Denied => None,
        }
    }
}

#[must_use = "dropping the permit immediately releases the guard"]
#[derive(Debug)]
pub struct FlightPermit<'a> {
    guard: &'a SingleFlightGuard,
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}

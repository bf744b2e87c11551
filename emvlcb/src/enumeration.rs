//! Bus address self-allocation
//!
//! A node enumerating the bus broadcasts a zero-length remote request. Every peer owning an
//! address answers with a zero-length data frame, so after a short window the node knows the
//! taken addresses and claims the lowest free one.

use embassy_time::{Duration, Instant};

use crate::core::BusAddress;
use crate::utils::AddressSet;

/// Result of a finished enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Outcome {
    pub address: BusAddress,
    pub from_peer_request: bool,
}

#[derive(Debug, Clone, Copy)]
struct Cycle {
    started: Instant,
    responses: AddressSet,
    from_peer_request: bool,
}

#[derive(Debug, Default)]
pub struct Enumerator {
    cycle: Option<Cycle>,
    required: bool,
}

impl Enumerator {
    pub const fn new() -> Self {
        Self {
            cycle: None,
            required: false,
        }
    }

    /// Begins a cycle. Returns false if one is already running, in which case the request is
    /// ignored and the caller must not send another remote request.
    pub fn start(&mut self, now: Instant, from_peer_request: bool) -> bool {
        if self.cycle.is_some() {
            return false;
        }
        self.cycle = Some(Cycle {
            started: now,
            responses: AddressSet::new(),
            from_peer_request,
        });
        true
    }

    pub fn is_active(&self) -> bool {
        self.cycle.is_some()
    }

    /// Records a peer answer. Address 0 is never recorded.
    pub fn record_response(&mut self, address: BusAddress) {
        if let Some(cycle) = &mut self.cycle {
            if address.is_assigned() {
                cycle.responses.insert(address.into_u8());
            }
        }
    }

    /// Finishes the cycle once `window` has elapsed.
    pub fn poll(&mut self, now: Instant, window: Duration) -> Option<Outcome> {
        let cycle = self.cycle.as_ref()?;
        if now.saturating_duration_since(cycle.started) < window {
            return None;
        }
        let outcome = Outcome {
            address: find_free_address(&cycle.responses),
            from_peer_request: cycle.from_peer_request,
        };
        self.cycle = None;
        Some(outcome)
    }

    /// Schedules an enumeration for the next cycle.
    pub fn require(&mut self) {
        self.required = true;
    }

    pub fn take_required(&mut self) -> bool {
        core::mem::take(&mut self.required)
    }
}

/// Lowest address in the assignable range absent from `taken`
///
/// Falls back to the lowest assignable address when every one is taken.
pub(crate) fn find_free_address(taken: &AddressSet) -> BusAddress {
    let min = BusAddress::MIN_ASSIGNABLE.into_u8();
    let max = BusAddress::MAX_ASSIGNABLE.into_u8();
    let address = (min..=max)
        .find(|address| !taken.contains(*address))
        .unwrap_or(min);
    BusAddress::from_u8_truncating(address)
}

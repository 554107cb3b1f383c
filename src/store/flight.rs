use super::{LineageStore, StoreError, StoreState};

/// Proof that the holder owns the store's single in-flight slot.
///
/// Dropping the guard frees the slot whether the operation succeeded, failed,
/// or returned early. A guard whose ticket was revoked by `reset()` leaves the
/// slot alone so it cannot free a newer operation's claim.
pub(super) struct FlightGuard<'a> {
    store: &'a LineageStore,
    ticket: u64,
}

impl<'a> FlightGuard<'a> {
    pub(super) fn acquire(store: &'a LineageStore) -> Result<Self, StoreError> {
        let mut state = store.state();
        if state.in_flight.is_some() {
            return Err(StoreError::Busy);
        }
        state.next_ticket += 1;
        let ticket = state.next_ticket;
        state.in_flight = Some(ticket);
        Ok(Self { store, ticket })
    }

    /// Whether this guard still owns the slot. `reset()` revokes it.
    pub(super) fn is_current(&self, state: &StoreState) -> bool {
        state.in_flight == Some(self.ticket)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.store.state();
        if self.is_current(&state) {
            state.in_flight = None;
        }
    }
}

//! Veto and callback registries shared between callers and the completion path.
//!
//! Every list lives behind an `embassy_sync` blocking mutex so registration can
//! happen from any context. Critical sections only move entries in and out of
//! the lists; user callbacks always run after the lock is released.

use alloc::boxed::Box;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::{Deque, Vec};

use crate::deferred::{DeferredMessage, DeferredQueue};
use crate::power::{PowerError, PowerState};

/// Maximum number of registered power-save vetoes.
pub const MAX_VETO_ENTRIES: usize = 8;
/// Maximum number of persistent state-change listeners.
pub const MAX_STATE_LISTENERS: usize = 8;
/// Maximum number of queued one-shot callbacks per request kind.
pub const MAX_QUEUED_CALLBACKS: usize = 8;

/// Predicate consulted before any sleep transition. `true` allows sleep.
pub type PowerSaveCheck = Box<dyn Fn() -> bool + Send>;
/// Persistent listener invoked on every state change.
pub type StateListener = Box<dyn FnMut(PowerState) + Send>;
/// One-shot callback fired when a pending request settles.
pub type CompletionCallback = Box<dyn FnOnce(Result<(), PowerError>) + Send>;

/// Handle returned by registration, used to deregister.
pub type RegistrationId = u16;

/// Errors raised by the persistent registries.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegistryError {
    /// Registry has reached its fixed capacity.
    RegistryFull,
}

impl core::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RegistryError::RegistryFull => f.write_str("registry full"),
        }
    }
}

/// One-shot callback lists, one per asynchronous request kind.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CallbackSlot {
    FullPower,
    Bmps,
    StartUapsd,
    /// Single entry.
    Standby,
    /// Single entry.
    EnterWowl,
}

struct VetoEntry {
    id: RegistrationId,
    check: Option<PowerSaveCheck>,
}

struct ListenerEntry {
    id: RegistrationId,
    listener: Option<StateListener>,
}

type CallbackQueue = Deque<CompletionCallback, MAX_QUEUED_CALLBACKS>;

struct HookState {
    vetoes: Vec<VetoEntry, MAX_VETO_ENTRIES>,
    listeners: Vec<ListenerEntry, MAX_STATE_LISTENERS>,
    full_power: CallbackQueue,
    bmps: CallbackQueue,
    start_uapsd: CallbackQueue,
    standby: Option<CompletionCallback>,
    enter_wowl: Option<CompletionCallback>,
    deferred: DeferredQueue,
    next_id: RegistrationId,
}

impl HookState {
    const fn new() -> Self {
        Self {
            vetoes: Vec::new(),
            listeners: Vec::new(),
            full_power: Deque::new(),
            bmps: Deque::new(),
            start_uapsd: Deque::new(),
            standby: None,
            enter_wowl: None,
            deferred: DeferredQueue::new(),
            next_id: 0,
        }
    }

    fn allocate_id(&mut self) -> RegistrationId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    fn queue_mut(&mut self, slot: CallbackSlot) -> Option<&mut CallbackQueue> {
        match slot {
            CallbackSlot::FullPower => Some(&mut self.full_power),
            CallbackSlot::Bmps => Some(&mut self.bmps),
            CallbackSlot::StartUapsd => Some(&mut self.start_uapsd),
            CallbackSlot::Standby | CallbackSlot::EnterWowl => None,
        }
    }

    fn single_mut(&mut self, slot: CallbackSlot) -> Option<&mut Option<CompletionCallback>> {
        match slot {
            CallbackSlot::Standby => Some(&mut self.standby),
            CallbackSlot::EnterWowl => Some(&mut self.enter_wowl),
            CallbackSlot::FullPower | CallbackSlot::Bmps | CallbackSlot::StartUapsd => None,
        }
    }

    fn drain(&mut self, slot: CallbackSlot) -> CallbackQueue {
        let mut drained = CallbackQueue::new();
        if let Some(queue) = self.queue_mut(slot) {
            core::mem::swap(queue, &mut drained);
        } else if let Some(callback) = self.single_mut(slot).and_then(Option::take) {
            // A fresh queue always has room for one entry.
            let _ = drained.push_back(callback);
        }
        drained
    }
}

/// Registries and the deferred message queue for one radio.
pub struct PowerHooks<M: RawMutex> {
    state: Mutex<M, RefCell<HookState>>,
}

impl<M: RawMutex> PowerHooks<M> {
    /// Creates empty registries guarded by `raw`.
    #[must_use]
    pub const fn new(raw: M) -> Self {
        Self {
            state: Mutex::const_new(raw, RefCell::new(HookState::new())),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut HookState) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Registers a veto. A `None` check occupies a slot but never votes.
    pub fn register_power_save_check(
        &self,
        check: Option<PowerSaveCheck>,
    ) -> Result<RegistrationId, RegistryError> {
        self.with(|state| {
            if state.vetoes.is_full() {
                return Err(RegistryError::RegistryFull);
            }
            let id = state.allocate_id();
            state
                .vetoes
                .push(VetoEntry { id, check })
                .map_err(|_| RegistryError::RegistryFull)?;
            Ok(id)
        })
    }

    /// Removes a veto. Returns `false` when `id` is unknown.
    pub fn deregister_power_save_check(&self, id: RegistrationId) -> bool {
        self.with(|state| {
            let Some(index) = state.vetoes.iter().position(|entry| entry.id == id) else {
                return false;
            };
            state.vetoes.remove(index);
            true
        })
    }

    /// Evaluates the vetoes in registration order.
    ///
    /// Any `false` denies immediately. Otherwise sleep is allowed only when at
    /// least one entry answered `true`; an empty or all-null list denies.
    ///
    /// Predicates are taken out of the list while they run, so only the
    /// owning controller evaluates them.
    pub(crate) fn power_save_check(&self) -> bool {
        let mut taken: Vec<(RegistrationId, PowerSaveCheck), MAX_VETO_ENTRIES> = Vec::new();
        self.with(|state| {
            for entry in &mut state.vetoes {
                if let Some(check) = entry.check.take() {
                    // Bounded by the veto list itself.
                    let _ = taken.push((entry.id, check));
                }
            }
        });

        let mut allowed = false;
        let mut denied = false;
        for (_, check) in &taken {
            if check() {
                allowed = true;
            } else {
                denied = true;
                break;
            }
        }

        self.with(|state| {
            for (id, check) in taken {
                if let Some(entry) = state.vetoes.iter_mut().find(|entry| entry.id == id) {
                    entry.check = Some(check);
                }
            }
        });

        allowed && !denied
    }

    /// Number of registered vetoes, including null ones.
    pub fn veto_count(&self) -> usize {
        self.with(|state| state.vetoes.len())
    }

    /// Registers a listener fired on every state change.
    pub fn register_state_listener(
        &self,
        listener: StateListener,
    ) -> Result<RegistrationId, RegistryError> {
        self.with(|state| {
            if state.listeners.is_full() {
                return Err(RegistryError::RegistryFull);
            }
            let id = state.allocate_id();
            state
                .listeners
                .push(ListenerEntry {
                    id,
                    listener: Some(listener),
                })
                .map_err(|_| RegistryError::RegistryFull)?;
            Ok(id)
        })
    }

    /// Removes a state listener. Returns `false` when `id` is unknown.
    pub fn deregister_state_listener(&self, id: RegistrationId) -> bool {
        self.with(|state| {
            let Some(index) = state.listeners.iter().position(|entry| entry.id == id) else {
                return false;
            };
            state.listeners.remove(index);
            true
        })
    }

    /// Invokes every listener in registration order without consuming them.
    pub(crate) fn notify_state_changed(&self, new_state: PowerState) {
        let mut taken: Vec<(RegistrationId, StateListener), MAX_STATE_LISTENERS> = Vec::new();
        self.with(|state| {
            for entry in &mut state.listeners {
                if let Some(listener) = entry.listener.take() {
                    let _ = taken.push((entry.id, listener));
                }
            }
        });

        for (_, listener) in &mut taken {
            listener(new_state);
        }

        self.with(|state| {
            for (id, listener) in taken {
                // Entries deregistered while firing are dropped here.
                if let Some(entry) = state.listeners.iter_mut().find(|entry| entry.id == id) {
                    entry.listener = Some(listener);
                }
            }
        });
    }

    /// Queues a one-shot callback for `slot`.
    pub(crate) fn queue(
        &self,
        slot: CallbackSlot,
        callback: CompletionCallback,
    ) -> Result<(), PowerError> {
        self.with(|state| {
            if let Some(queue) = state.queue_mut(slot) {
                return queue.push_back(callback).map_err(|_| PowerError::Resources);
            }
            match state.single_mut(slot) {
                Some(entry) if entry.is_none() => {
                    *entry = Some(callback);
                    Ok(())
                }
                _ => Err(PowerError::Resources),
            }
        })
    }

    /// Drops the most recently queued callback for `slot` without firing it.
    pub(crate) fn retract(&self, slot: CallbackSlot) -> bool {
        let retracted = self.with(|state| match state.queue_mut(slot) {
            Some(queue) => queue.pop_back(),
            None => state.single_mut(slot).and_then(Option::take),
        });
        retracted.is_some()
    }

    /// Drains `slot` and fires each callback with `result`, oldest first.
    pub(crate) fn fire(&self, slot: CallbackSlot, result: Result<(), PowerError>) -> usize {
        let mut drained = self.with(|state| state.drain(slot));
        let fired = drained.len();
        while let Some(callback) = drained.pop_front() {
            callback(result);
        }
        fired
    }

    /// Fails every queued one-shot callback.
    pub(crate) fn fail_all(&self, error: PowerError) {
        for slot in [
            CallbackSlot::FullPower,
            CallbackSlot::Bmps,
            CallbackSlot::StartUapsd,
            CallbackSlot::Standby,
            CallbackSlot::EnterWowl,
        ] {
            self.fire(slot, Err(error));
        }
    }

    /// Number of callbacks waiting on `slot`.
    pub fn pending_callbacks(&self, slot: CallbackSlot) -> usize {
        self.with(|state| match slot {
            CallbackSlot::FullPower => state.full_power.len(),
            CallbackSlot::Bmps => state.bmps.len(),
            CallbackSlot::StartUapsd => state.start_uapsd.len(),
            CallbackSlot::Standby => usize::from(state.standby.is_some()),
            CallbackSlot::EnterWowl => usize::from(state.enter_wowl.is_some()),
        })
    }

    pub(crate) fn push_deferred(&self, message: DeferredMessage) -> Result<(), PowerError> {
        self.with(|state| {
            state
                .deferred
                .push_back(message)
                .map_err(|_| PowerError::Resources)
        })
    }

    pub(crate) fn retract_deferred(&self) -> Option<DeferredMessage> {
        self.with(|state| state.deferred.pop_back())
    }

    pub(crate) fn pop_deferred(&self) -> Option<DeferredMessage> {
        self.with(|state| state.deferred.pop_front())
    }

    pub(crate) fn clear_deferred(&self) {
        self.with(|state| state.deferred.clear());
    }

    /// Number of messages waiting for full power.
    pub fn deferred_len(&self) -> usize {
        self.with(|state| state.deferred.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloc::sync::Arc;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use portable_atomic::{AtomicUsize, Ordering};

    fn hooks() -> PowerHooks<NoopRawMutex> {
        PowerHooks::new(NoopRawMutex::new())
    }

    #[test]
    fn empty_or_null_veto_list_denies() {
        let hooks = hooks();
        assert!(!hooks.power_save_check());

        hooks
            .register_power_save_check(None)
            .expect("room for null entry");
        assert!(!hooks.power_save_check());

        hooks
            .register_power_save_check(Some(Box::new(|| true)))
            .expect("room for check");
        assert!(hooks.power_save_check());
    }

    #[test]
    fn any_false_vetoes_regardless_of_order() {
        for deny_first in [true, false] {
            let hooks = hooks();
            let deny: PowerSaveCheck = Box::new(|| false);
            let allow: PowerSaveCheck = Box::new(|| true);
            let (first, second) = if deny_first {
                (deny, allow)
            } else {
                (allow, deny)
            };
            hooks.register_power_save_check(Some(first)).expect("room");
            hooks.register_power_save_check(Some(second)).expect("room");
            assert!(!hooks.power_save_check(), "deny_first={deny_first}");
        }
    }

    #[test]
    fn deregistered_veto_no_longer_votes() {
        let hooks = hooks();
        hooks
            .register_power_save_check(Some(Box::new(|| true)))
            .expect("room");
        let deny = hooks
            .register_power_save_check(Some(Box::new(|| false)))
            .expect("room");

        assert!(!hooks.power_save_check());
        assert!(hooks.deregister_power_save_check(deny));
        assert!(!hooks.deregister_power_save_check(deny));
        assert!(hooks.power_save_check());
    }

    #[test]
    fn veto_registry_reports_full() {
        let hooks = hooks();
        for _ in 0..MAX_VETO_ENTRIES {
            hooks.register_power_save_check(None).expect("room");
        }
        assert_eq!(
            hooks.register_power_save_check(None),
            Err(RegistryError::RegistryFull)
        );
    }

    #[test]
    fn listeners_persist_across_notifications() {
        let hooks = hooks();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        hooks
            .register_state_listener(Box::new(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            }))
            .expect("room");

        hooks.notify_state_changed(PowerState::Bmps);
        hooks.notify_state_changed(PowerState::FullPower);
        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn one_shot_callbacks_fire_once_in_fifo_order() {
        let hooks = hooks();
        let order = Arc::new(AtomicUsize::new(0));
        for expected in 0..3 {
            let order = Arc::clone(&order);
            hooks
                .queue(
                    CallbackSlot::FullPower,
                    Box::new(move |result| {
                        assert_eq!(result, Ok(()));
                        assert_eq!(order.fetch_add(1, Ordering::Relaxed), expected);
                    }),
                )
                .expect("room");
        }

        assert_eq!(hooks.fire(CallbackSlot::FullPower, Ok(())), 3);
        assert_eq!(hooks.fire(CallbackSlot::FullPower, Ok(())), 0);
        assert_eq!(order.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn single_slots_refuse_second_callback() {
        let hooks = hooks();
        hooks
            .queue(CallbackSlot::Standby, Box::new(|_| {}))
            .expect("slot free");
        assert_eq!(
            hooks.queue(CallbackSlot::Standby, Box::new(|_| {})),
            Err(PowerError::Resources)
        );
        assert!(hooks.retract(CallbackSlot::Standby));
        assert_eq!(hooks.pending_callbacks(CallbackSlot::Standby), 0);
    }

    #[test]
    fn fail_all_reports_failure_to_every_slot() {
        let hooks = hooks();
        let failures = Arc::new(AtomicUsize::new(0));
        for slot in [CallbackSlot::Bmps, CallbackSlot::EnterWowl] {
            let failures = Arc::clone(&failures);
            hooks
                .queue(
                    slot,
                    Box::new(move |result| {
                        assert_eq!(result, Err(PowerError::Failure));
                        failures.fetch_add(1, Ordering::Relaxed);
                    }),
                )
                .expect("room");
        }

        hooks.fail_all(PowerError::Failure);
        assert_eq!(failures.load(Ordering::Relaxed), 2);
    }
}

// ── Switch state machine ──
//
// One outlet of a device: a two-state relay with named change callbacks.
// `update_state` records what the device reported; `set_state` asks the
// device to change and only records the new state once it confirmed.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use ewelink_api::PowerState;

use crate::device::Device;
use crate::error::CoreError;

/// Notified after a switch changes state.
#[async_trait]
pub trait StateCallback: Send + Sync {
    async fn on_state_change(&self, switch: &Switch, new_state: bool);
}

/// A single outlet of a [`Device`].
pub struct Switch {
    device: Weak<Device>,
    index: usize,
    state: AtomicBool,
    callbacks: RwLock<IndexMap<String, Arc<dyn StateCallback>>>,
    /// Serializes `set_state` calls on this outlet.
    command_lock: Mutex<()>,
}

impl Switch {
    pub(crate) fn new(device: Weak<Device>, index: usize, initial: bool) -> Self {
        Self {
            device,
            index,
            state: AtomicBool::new(initial),
            callbacks: RwLock::new(IndexMap::new()),
            command_lock: Mutex::new(()),
        }
    }

    /// Outlet position on the owning device.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get_state(&self) -> bool {
        self.state.load(Ordering::Acquire)
    }

    /// The owning device, unless it has been dropped.
    pub fn device(&self) -> Option<Arc<Device>> {
        self.device.upgrade()
    }

    // ── Callbacks ────────────────────────────────────────────────────

    /// Register `callback` under `name`, replacing any callback already
    /// registered under that name (its position in the firing order is kept).
    pub fn add_state_callback(&self, name: impl Into<String>, callback: Arc<dyn StateCallback>) {
        self.callbacks
            .write()
            .expect("callback lock poisoned")
            .insert(name.into(), callback);
    }

    /// Returns `true` if a callback was registered under `name`.
    pub fn remove_callback(&self, name: &str) -> bool {
        self.callbacks
            .write()
            .expect("callback lock poisoned")
            .shift_remove(name)
            .is_some()
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Record a state reported by the device.
    ///
    /// No-op when `new_state` equals the current state. Otherwise every
    /// callback is awaited in registration order. Returns whether a
    /// transition happened.
    pub async fn update_state(&self, new_state: bool) -> bool {
        if self.state.swap(new_state, Ordering::AcqRel) == new_state {
            return false;
        }

        let callbacks: Vec<Arc<dyn StateCallback>> = self
            .callbacks
            .read()
            .expect("callback lock poisoned")
            .values()
            .cloned()
            .collect();

        debug!(
            outlet = self.index,
            state = PowerState::from(new_state).as_str(),
            callbacks = callbacks.len(),
            "switch state changed"
        );
        for callback in callbacks {
            callback.on_state_change(self, new_state).await;
        }
        true
    }

    /// Ask the device to switch this outlet to `desired`.
    ///
    /// Local state changes only after the device accepted the command; on
    /// failure the last confirmed state is kept and the error returned.
    pub async fn set_state(&self, desired: bool) -> Result<(), CoreError> {
        let _guard = self.command_lock.lock().await;

        if desired == self.get_state() {
            return Ok(());
        }

        let device = self
            .device
            .upgrade()
            .ok_or_else(|| CoreError::Internal("switch outlived its device".into()))?;

        info!(
            device_id = %device.device_id(),
            outlet = self.index,
            state = PowerState::from(desired).as_str(),
            "sending {device} state[{}]",
            self.index
        );

        device.client().send_switch_state(self.index, desired).await?;
        self.update_state(desired).await;
        Ok(())
    }
}

impl fmt::Debug for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Switch")
            .field("index", &self.index)
            .field("state", &self.get_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::device::tests::device_with_params;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Counts invocations and records the order callbacks ran in.
    struct Recorder {
        label: &'static str,
        calls: AtomicUsize,
        log: Arc<std::sync::Mutex<Vec<(&'static str, bool)>>>,
    }

    #[async_trait]
    impl StateCallback for Recorder {
        async fn on_state_change(&self, _switch: &Switch, new_state: bool) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push((self.label, new_state));
        }
    }

    fn recorder(
        label: &'static str,
        log: &Arc<std::sync::Mutex<Vec<(&'static str, bool)>>>,
    ) -> Arc<Recorder> {
        Arc::new(Recorder {
            label,
            calls: AtomicUsize::new(0),
            log: Arc::clone(log),
        })
    }

    #[tokio::test]
    async fn repeated_state_fires_once() {
        let device = device_with_params("a", json!({ "switch": "off" }));
        let switch = device.switch(0).unwrap();
        let log = Arc::default();
        let cb = recorder("one", &log);
        switch.add_state_callback("one", cb.clone());

        assert!(switch.update_state(true).await);
        assert!(!switch.update_state(true).await);

        assert_eq!(cb.calls.load(Ordering::SeqCst), 1);
        assert!(switch.get_state());
    }

    #[tokio::test]
    async fn callbacks_run_in_registration_order() {
        let device = device_with_params("a", json!({ "switch": "off" }));
        let switch = device.switch(0).unwrap();
        let log = Arc::default();
        switch.add_state_callback("first", recorder("first", &log));
        switch.add_state_callback("second", recorder("second", &log));
        // Re-registering keeps the original slot.
        switch.add_state_callback("first", recorder("first-again", &log));

        switch.update_state(true).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![("first-again", true), ("second", true)]
        );
    }

    #[tokio::test]
    async fn removed_callback_is_not_invoked() {
        let device = device_with_params("a", json!({ "switch": "on" }));
        let switch = device.switch(0).unwrap();
        let log = Arc::default();
        let cb = recorder("gone", &log);
        switch.add_state_callback("gone", cb.clone());

        assert!(switch.remove_callback("gone"));
        assert!(!switch.remove_callback("gone"));
        switch.update_state(false).await;

        assert_eq!(cb.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn set_state_without_location_keeps_state() {
        let device = device_with_params("a", json!({ "switch": "off" }));
        let switch = device.switch(0).unwrap();

        let result = switch.set_state(true).await;

        assert!(matches!(result, Err(CoreError::DeviceUnavailable { .. })));
        assert!(!switch.get_state());
    }

    #[tokio::test]
    async fn set_state_to_current_is_noop() {
        let device = device_with_params("a", json!({ "switch": "on" }));
        // No location: any send attempt would fail.
        device.switch(0).unwrap().set_state(true).await.unwrap();
    }
}

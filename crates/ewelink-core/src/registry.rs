// ── Device registry ──
//
// Concurrent device-id → Device map owned by `Discovery`. Additive only:
// LAN presence is tracked on the Device itself, never by removal here.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::device::Device;

/// Concurrent map of every device known to this process.
///
/// Insertion is atomic per id: two discovery passes racing on the same id
/// end up sharing a single `Device`.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: DashMap<String, Arc<Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `device`. Returns `false` (and keeps the existing entry)
    /// if the id is already present.
    pub fn add_device(&self, device: Arc<Device>) -> bool {
        match self.devices.entry(device.device_id().to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(device);
                true
            }
        }
    }

    /// Return the device registered under `device_id`, building and
    /// inserting it with `build` first if absent. The flag is `true` when
    /// `build` ran.
    pub fn get_or_insert_with(
        &self,
        device_id: &str,
        build: impl FnOnce() -> Arc<Device>,
    ) -> (Arc<Device>, bool) {
        match self.devices.entry(device_id.to_owned()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(slot) => (Arc::clone(slot.insert(build()).value()), true),
        }
    }

    pub fn get_device(&self, device_id: &str) -> Option<Arc<Device>> {
        self.devices.get(device_id).map(|r| Arc::clone(r.value()))
    }

    pub fn has_device(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    /// All devices, ordered by id.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        let mut all: Vec<Arc<Device>> = self
            .devices
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect();
        all.sort_by(|a, b| a.device_id().cmp(b.device_id()));
        all
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

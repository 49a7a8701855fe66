//! In-memory device store.
//!
//! Implements [`DeviceStore`] over a `HashMap`, the same key layout a
//! persistent settings backend uses:
//!
//! | Key                       | Value                    |
//! |---------------------------|--------------------------|
//! | `device_ip_<key>`         | IP reported by `<key>`   |
//! | `last_provisioned_ip`     | most recent IP           |
//! | `last_provisioned_device` | most recent `<key>`      |
//!
//! Credentials never reach the store.

use std::collections::HashMap;

use log::{info, warn};

use crate::app::events::{Outcome, ProvisioningEvent};
use crate::app::ports::{DeviceStore, StoreError};

const DEVICE_IP_PREFIX: &str = "device_ip_";
const LAST_IP_KEY: &str = "last_provisioned_ip";
const LAST_DEVICE_KEY: &str = "last_provisioned_device";

/// Longest key the store accepts, prefix included.
pub const MAX_KEY_LEN: usize = 64;

pub struct MemoryDeviceStore {
    entries: HashMap<String, String>,
    capacity: usize,
}

impl Default for MemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::with_capacity(128)
    }

    /// Store holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn put(&mut self, key: String, value: &str) -> Result<(), StoreError> {
        if key.len() > MAX_KEY_LEN {
            return Err(StoreError::KeyTooLong);
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            return Err(StoreError::Full);
        }
        self.entries.insert(key, value.to_owned());
        Ok(())
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn record_device_ip(&mut self, key: &str, ip: &str) -> Result<(), StoreError> {
        self.put(format!("{DEVICE_IP_PREFIX}{key}"), ip)?;
        self.put(LAST_IP_KEY.to_owned(), ip)?;
        self.put(LAST_DEVICE_KEY.to_owned(), key)?;
        Ok(())
    }

    fn device_ip(&self, key: &str) -> Option<String> {
        self.entries.get(&format!("{DEVICE_IP_PREFIX}{key}")).cloned()
    }

    fn last_provisioned(&self) -> Option<(String, String)> {
        let device = self.entries.get(LAST_DEVICE_KEY)?;
        let ip = self.entries.get(LAST_IP_KEY)?;
        Some((device.clone(), ip.clone()))
    }
}

/// Remember the IP of a successfully provisioned device.
///
/// Files it under the reported device id, falling back to the peripheral
/// address.  Returns `Ok(false)` for outcomes that carry no IP.
pub fn record_outcome(
    store: &mut impl DeviceStore,
    outcome: &Outcome,
) -> Result<bool, StoreError> {
    let ProvisioningEvent::Success(device) = &outcome.event else {
        return Ok(false);
    };
    let Some(ip) = device.ip_address.as_deref() else {
        return Ok(false);
    };
    let key = device
        .device_id
        .as_deref()
        .unwrap_or_else(|| device.peripheral.as_str());

    match store.record_device_ip(key, ip) {
        Ok(()) => {
            info!("recorded {key} -> {ip}");
            Ok(true)
        }
        Err(e) => {
            warn!("could not record ip for {key}: {e}");
            Err(e)
        }
    }
}

//! In-memory lease store
//!
//! Each network device owns zero or more leases. Leases live in a slot
//! arena and are referenced elsewhere through generation-stamped
//! [`LeaseHandle`]s: removing a lease bumps its slot generation, so stale
//! handles held by arbitration sources self-invalidate instead of
//! dangling.
//!
//! The store also allocates lease sequence numbers. Seqnos start at 1;
//! 0 is the "not installed" sentinel used by the updaters.

use std::collections::HashMap;
use uuid::Uuid;

use crate::lease::Lease;

/// Generation-stamped reference to a lease slot
///
/// Resolving a handle after the lease was withdrawn yields `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseHandle {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    lease: Option<Lease>,
}

/// Store of devices and the leases they own
#[derive(Debug, Default)]
pub struct LeaseStore {
    slots: Vec<Slot>,
    free: Vec<usize>,
    /// Device name -> slot indices of its leases
    devices: HashMap<String, Vec<usize>>,
    next_seqno: u64,
}

impl LeaseStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device; idempotent
    pub fn add_device(&mut self, name: impl Into<String>) {
        self.devices.entry(name.into()).or_default();
    }

    /// Whether the device is known
    pub fn has_device(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    /// Names of all registered devices
    pub fn device_names(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    /// Allocate the next lease sequence number
    pub fn allocate_seqno(&mut self) -> u64 {
        self.next_seqno += 1;
        self.next_seqno
    }

    /// Attach a lease to a device, assigning it a fresh seqno
    ///
    /// The device is registered implicitly if unknown.
    pub fn insert(&mut self, device: &str, mut lease: Lease) -> LeaseHandle {
        lease.seqno = self.allocate_seqno();

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index].lease = Some(lease);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    lease: Some(lease),
                });
                self.slots.len() - 1
            }
        };

        self.devices.entry(device.to_string()).or_default().push(index);

        LeaseHandle {
            index,
            generation: self.slots[index].generation,
        }
    }

    /// Resolve a handle to its lease, if still present
    pub fn get(&self, handle: LeaseHandle) -> Option<&Lease> {
        let slot = self.slots.get(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.lease.as_ref()
    }

    /// Withdraw a lease; stale handles to it resolve to `None` afterwards
    pub fn remove(&mut self, handle: LeaseHandle) -> Option<Lease> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        let lease = slot.lease.take()?;
        slot.generation += 1;
        self.free.push(handle.index);

        for indices in self.devices.values_mut() {
            indices.retain(|&index| index != handle.index);
        }

        Some(lease)
    }

    /// Withdraw a device's lease by identifier
    pub fn remove_by_uuid(&mut self, device: &str, uuid: Uuid) -> Option<Lease> {
        let handle = self
            .device_leases(device)
            .find(|(_, lease)| lease.uuid == uuid)
            .map(|(handle, _)| handle)?;
        self.remove(handle)
    }

    /// Iterate over one device's leases
    pub fn device_leases(&self, device: &str) -> impl Iterator<Item = (LeaseHandle, &Lease)> {
        self.devices
            .get(device)
            .into_iter()
            .flatten()
            .filter_map(|&index| {
                let slot = &self.slots[index];
                slot.lease.as_ref().map(|lease| {
                    (
                        LeaseHandle {
                            index,
                            generation: slot.generation,
                        },
                        lease,
                    )
                })
            })
    }

    /// Iterate over every lease of every device
    pub fn iter(&self) -> impl Iterator<Item = (LeaseHandle, &Lease)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.lease.as_ref().map(|lease| {
                (
                    LeaseHandle {
                        index,
                        generation: slot.generation,
                    },
                    lease,
                )
            })
        })
    }

    /// Total number of live leases
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.lease.is_some()).count()
    }

    /// Whether the store holds no leases
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::{AddressFamily, ProtocolKind};

    fn lease() -> Lease {
        Lease::new(ProtocolKind::Dhcp, AddressFamily::Ipv4)
    }

    #[test]
    fn test_insert_assigns_monotonic_seqnos() {
        let mut store = LeaseStore::new();

        let first = store.insert("eth0", lease());
        let second = store.insert("eth1", lease());

        let a = store.get(first).unwrap().seqno;
        let b = store.get(second).unwrap().seqno;
        assert!(a >= 1, "seqno 0 is the not-installed sentinel");
        assert!(b > a);
    }

    #[test]
    fn test_stale_handle_resolves_to_none() {
        let mut store = LeaseStore::new();

        let handle = store.insert("eth0", lease());
        assert!(store.get(handle).is_some());

        store.remove(handle).unwrap();
        assert!(store.get(handle).is_none());

        // The slot may be reused; the old handle must stay dead
        let reused = store.insert("eth0", lease());
        assert!(store.get(handle).is_none());
        assert!(store.get(reused).is_some());
    }

    #[test]
    fn test_remove_by_uuid() {
        let mut store = LeaseStore::new();

        let keep = lease();
        let drop = lease();
        let drop_uuid = drop.uuid;
        store.insert("eth0", keep);
        store.insert("eth0", drop);

        assert_eq!(store.device_leases("eth0").count(), 2);
        assert!(store.remove_by_uuid("eth0", drop_uuid).is_some());
        assert_eq!(store.device_leases("eth0").count(), 1);

        // A second removal of the same uuid finds nothing
        assert!(store.remove_by_uuid("eth0", drop_uuid).is_none());
    }

    #[test]
    fn test_device_scoping() {
        let mut store = LeaseStore::new();
        store.add_device("eth0");
        store.add_device("eth1");

        let l = lease();
        let uuid = l.uuid;
        store.insert("eth0", l);

        // uuid lookups are scoped to the owning device
        assert!(store.remove_by_uuid("eth1", uuid).is_none());
        assert_eq!(store.iter().count(), 1);
    }
}

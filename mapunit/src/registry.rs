//! Unit registry and scoped unit locks.
//!
//! The registry owns every known unit's metadata and the authoritative slot of
//! its opened handle. All metadata reads, lifecycle transitions and lock
//! counting happen under one registry-wide mutex; the handles themselves are
//! immutable and shared through `Arc` by every outstanding [`UnitLock`].
//!
//! Each slot carries a generation number that `update_unit` and `remove_unit`
//! bump. Locks remember the generation they were taken in, so a lock that
//! survives an update keeps the old handle alive without being mistaken for a
//! lock on the new one.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::container::ContainerOpener;
use crate::errors::{ErrorKind, MapError, MapResult};
use crate::geometry::BoundingRect;
use crate::handle_cache::IdleCache;
use crate::header::DataHeader;
use crate::unit::{UnitId, UnitInfo, UnitStatus, UnitValue};

/// Registry of map units.
///
/// Cloning is cheap and every clone refers to the same registry.
#[derive(Clone)]
pub struct UnitRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    opener: Arc<dyn ContainerOpener>,
    state: Mutex<RegistryState>,
}

struct RegistryState {
    slots: Vec<Slot>,
    idle: IdleCache<UnitId, Arc<UnitValue>>,
}

struct Slot {
    info: UnitInfo,
    /// Outstanding locks of every generation.
    lock_count: usize,
    /// Outstanding locks of the current generation.
    current_locks: usize,
    generation: u64,
    /// Present while `current_locks > 0`.
    handle: Option<Arc<UnitValue>>,
    /// Set when the container failed to open; cleared by update.
    broken: Option<MapError>,
}

impl Slot {
    fn new(info: UnitInfo) -> Self {
        Slot {
            info,
            lock_count: 0,
            current_locks: 0,
            generation: 0,
            handle: None,
            broken: None,
        }
    }

    fn is_active(&self) -> bool {
        self.info.status == UnitStatus::Registered
    }

    /// Starts a new generation, detaching the current handle.
    fn invalidate(&mut self) -> Option<Arc<UnitValue>> {
        self.generation += 1;
        self.current_locks = 0;
        self.handle.take()
    }

    fn retire(&mut self) {
        log::debug!("Retiring slot {} of unit {}", self.info.id, self.info.name);
        self.info.status = UnitStatus::Removed;
        self.broken = None;
    }
}

impl RegistryState {
    fn find_active(&self, name: &str) -> Option<UnitId> {
        self.slots
            .iter()
            .position(|slot| slot.is_active() && slot.info.name == name)
    }
}

impl UnitRegistry {
    /// Creates a registry opening units through `opener`.
    ///
    /// `handle_cache_size` bounds how many unlocked handles stay open for
    /// reuse; `None` keeps all of them.
    pub fn new(opener: Arc<dyn ContainerOpener>, handle_cache_size: Option<usize>) -> Self {
        UnitRegistry {
            inner: Arc::new(RegistryInner {
                opener,
                state: Mutex::new(RegistryState {
                    slots: Vec::new(),
                    idle: IdleCache::new(handle_cache_size),
                }),
            }),
        }
    }

    fn read_header(&self, name: &str) -> MapResult<DataHeader> {
        let container = self.inner.opener.open(name)?;
        DataHeader::read(container.as_ref())
    }

    fn duplicate_error(name: &str) -> MapError {
        log::error!("Unit {} is already registered", name);
        MapError::new(
            &format!("Unit {} is already registered", name),
            ErrorKind::DuplicateUnit,
        )
    }

    fn unknown_error(name: &str) -> MapError {
        log::error!("Unit {} is not registered", name);
        MapError::new(
            &format!("Unit {} is not registered", name),
            ErrorKind::UnknownUnit,
        )
    }

    /// Registers the unit published as `name`.
    ///
    /// Only the header is read; the handle is opened by the first lock. A
    /// retired slot is reused before the id space grows.
    pub fn register_unit(&self, name: &str) -> MapResult<UnitId> {
        if self.inner.state.lock().find_active(name).is_some() {
            return Err(Self::duplicate_error(name));
        }

        let header = self.read_header(name)?;

        let mut state = self.inner.state.lock();
        if state.find_active(name).is_some() {
            return Err(Self::duplicate_error(name));
        }
        let id = state
            .slots
            .iter()
            .position(|slot| slot.info.status == UnitStatus::Removed)
            .unwrap_or(state.slots.len());
        let mut slot = Slot::new(UnitInfo::from_header(id, name, &header));
        if id == state.slots.len() {
            state.slots.push(slot);
        } else {
            // Generations keep counting so an open racing the reuse is discarded.
            slot.generation = state.slots[id].generation + 1;
            state.slots[id] = slot;
        }

        log::debug!(
            "Registered unit {} as {} ({:?}, {}, scales {}..={})",
            name,
            id,
            header.category,
            header.bounds,
            header.min_scale,
            header.max_scale
        );
        Ok(id)
    }

    /// Re-reads the header of an active unit and replaces its metadata in a
    /// single step.
    ///
    /// Outstanding locks keep the handle they were taken on; the next lock
    /// opens the new version. Returns the unit's new bounds.
    pub fn update_unit(&self, name: &str) -> MapResult<BoundingRect> {
        if self.inner.state.lock().find_active(name).is_none() {
            return Err(Self::unknown_error(name));
        }

        let header = self.read_header(name);

        let mut state = self.inner.state.lock();
        let Some(id) = state.find_active(name) else {
            return Err(Self::unknown_error(name));
        };
        let RegistryState { slots, idle } = &mut *state;
        let slot = &mut slots[id];
        let detached = (slot.invalidate(), idle.remove(id));

        match header {
            Ok(header) => {
                slot.info = UnitInfo::from_header(id, name, &header);
                slot.broken = None;
                drop(state);
                drop(detached);
                log::debug!("Updated unit {} ({}) to {}", name, id, header.bounds);
                Ok(header.bounds)
            }
            Err(err) => {
                log::error!("Failed to update unit {}: {}", name, err);
                slot.broken = Some(err.clone());
                drop(state);
                drop(detached);
                Err(err)
            }
        }
    }

    /// Removes an active unit.
    ///
    /// The slot is retired right away when no lock is outstanding; otherwise
    /// the last lock to drop retires it.
    pub fn remove_unit(&self, name: &str) -> MapResult<()> {
        let mut state = self.inner.state.lock();
        let Some(id) = state.find_active(name) else {
            return Err(Self::unknown_error(name));
        };
        let RegistryState { slots, idle } = &mut *state;
        let slot = &mut slots[id];
        let detached = (slot.invalidate(), idle.remove(id));

        slot.info.status = UnitStatus::PendingRemoval;
        if slot.lock_count == 0 {
            slot.retire();
        } else {
            log::debug!(
                "Unit {} ({}) pending removal with {} outstanding locks",
                name,
                id,
                slot.lock_count
            );
        }
        drop(state);
        drop(detached);
        Ok(())
    }

    /// Locks unit `id`, opening its handle if no lock currently holds it.
    ///
    /// The container is opened outside the registry mutex. If the unit was
    /// updated or removed meanwhile the freshly opened handle is discarded and
    /// the lock is retried against the new state.
    ///
    /// Fails with `UnknownUnit` for removed or never registered ids and with
    /// the stored open error for broken units.
    pub fn try_lock_unit(&self, id: UnitId) -> MapResult<UnitLock> {
        loop {
            let (name, generation) = {
                let mut state = self.inner.state.lock();
                let RegistryState { slots, idle } = &mut *state;
                let slot = Self::lockable_slot(slots, id)?;
                let cached = match &slot.handle {
                    Some(handle) => Some(handle.clone()),
                    None => idle.take(id),
                };
                if let Some(value) = cached {
                    return Ok(self.install(slot, id, value));
                }
                (slot.info.name.clone(), slot.generation)
            };

            let opened = UnitValue::open(self.inner.opener.as_ref(), &name);

            let mut state = self.inner.state.lock();
            let RegistryState { slots, idle } = &mut *state;
            let slot = Self::lockable_slot(slots, id)?;
            if slot.generation != generation {
                drop(state);
                log::debug!("Unit {} ({}) changed while opening, retrying", name, id);
                continue;
            }

            let value = match opened {
                Ok(value) => value,
                Err(err) => {
                    log::error!("Failed to open unit {} ({}): {}", name, id, err);
                    slot.broken = Some(err.clone());
                    return Err(err);
                }
            };
            // Another lock may have opened or parked a handle meanwhile.
            let existing = match &slot.handle {
                Some(handle) => Some(handle.clone()),
                None => idle.take(id),
            };
            let (lock, unused) = match existing {
                Some(handle) => (self.install(slot, id, handle), Some(value)),
                None => (self.install(slot, id, Arc::new(value)), None),
            };
            drop(state);
            drop(unused);
            log::debug!("Opened unit {} ({})", name, id);
            return Ok(lock);
        }
    }

    fn lockable_slot(slots: &mut [Slot], id: UnitId) -> MapResult<&mut Slot> {
        let Some(slot) = slots.get_mut(id).filter(|slot| slot.is_active()) else {
            log::debug!("Cannot lock unit {}: not registered", id);
            return Err(MapError::new(
                &format!("Unit {} is not registered", id),
                ErrorKind::UnknownUnit,
            ));
        };
        if let Some(err) = &slot.broken {
            return Err(err.clone());
        }
        Ok(slot)
    }

    /// Counts a new lock of the slot's current generation on `value`.
    fn install(&self, slot: &mut Slot, id: UnitId, value: Arc<UnitValue>) -> UnitLock {
        slot.lock_count += 1;
        slot.current_locks += 1;
        if slot.handle.is_none() {
            slot.handle = Some(value.clone());
        }
        UnitLock {
            registry: Some(self.inner.clone()),
            id,
            generation: slot.generation,
            value: Some(value),
        }
    }

    /// Locks unit `id`; returns an empty lock if it cannot be locked.
    pub fn lock_unit(&self, id: UnitId) -> UnitLock {
        self.try_lock_unit(id).unwrap_or_else(|_| UnitLock::empty(id))
    }

    /// Point-in-time copy of every active unit's metadata, in id order.
    pub fn snapshot(&self) -> Vec<UnitInfo> {
        self.inner
            .state
            .lock()
            .slots
            .iter()
            .filter(|slot| slot.is_active())
            .map(|slot| slot.info.clone())
            .collect()
    }

    pub fn id_by_name(&self, name: &str) -> Option<UnitId> {
        self.inner.state.lock().find_active(name)
    }

    /// Metadata of slot `id` unless it has been retired.
    pub fn unit_info(&self, id: UnitId) -> Option<UnitInfo> {
        self.inner
            .state
            .lock()
            .slots
            .get(id)
            .filter(|slot| slot.info.status != UnitStatus::Removed)
            .map(|slot| slot.info.clone())
    }

    /// Number of active units.
    pub fn len(&self) -> usize {
        self.inner
            .state
            .lock()
            .slots
            .iter()
            .filter(|slot| slot.is_active())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Outstanding locks on slot `id`, across generations.
    pub fn lock_count(&self, id: UnitId) -> usize {
        self.inner
            .state
            .lock()
            .slots
            .get(id)
            .map_or(0, |slot| slot.lock_count)
    }

    /// True if the unit's container failed to open and it has not been
    /// updated since.
    pub fn is_broken(&self, id: UnitId) -> bool {
        self.inner
            .state
            .lock()
            .slots
            .get(id)
            .is_some_and(|slot| slot.broken.is_some())
    }

    /// Number of unlocked handles kept open for reuse.
    pub fn idle_handle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Closes every idle handle.
    pub fn clear_cache(&self) {
        let closed = self.inner.state.lock().idle.clear();
        if !closed.is_empty() {
            log::debug!("Closed {} idle unit handles", closed.len());
        }
    }
}

impl RegistryInner {
    fn acquire(&self, id: UnitId, generation: u64) {
        let mut state = self.state.lock();
        if let Some(slot) = state.slots.get_mut(id) {
            slot.lock_count += 1;
            if slot.generation == generation {
                slot.current_locks += 1;
            }
        }
    }

    fn release(&self, id: UnitId, generation: u64) {
        let mut evicted = Vec::new();
        let mut state = self.state.lock();
        let RegistryState { slots, idle } = &mut *state;
        let Some(slot) = slots.get_mut(id) else {
            return;
        };

        debug_assert!(slot.lock_count > 0, "unit {} lock count underflow", id);
        slot.lock_count = slot.lock_count.saturating_sub(1);
        if slot.generation == generation {
            slot.current_locks = slot.current_locks.saturating_sub(1);
            if slot.current_locks == 0 && slot.is_active() {
                if let Some(handle) = slot.handle.take() {
                    evicted = idle.insert(id, handle);
                }
            }
        }
        if slot.info.status == UnitStatus::PendingRemoval && slot.lock_count == 0 {
            slot.retire();
        }
        drop(state);

        for (evicted_id, _) in &evicted {
            log::debug!("Closing idle handle of unit {}", evicted_id);
        }
    }
}

/// Scoped lock on one unit.
///
/// While a non-empty lock is alive its unit's handle stays open and the
/// unit's slot is not retired, even if the unit is updated or removed in the
/// meantime. Cloning takes another lock on the same handle.
pub struct UnitLock {
    registry: Option<Arc<RegistryInner>>,
    id: UnitId,
    generation: u64,
    value: Option<Arc<UnitValue>>,
}

impl UnitLock {
    /// A lock holding nothing.
    pub fn empty(id: UnitId) -> Self {
        UnitLock {
            registry: None,
            id,
            generation: 0,
            value: None,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn value(&self) -> Option<&Arc<UnitValue>> {
        self.value.as_ref()
    }

    pub fn header(&self) -> Option<&DataHeader> {
        self.value.as_deref().map(UnitValue::header)
    }

    /// Name of the locked unit, or an empty string for an empty lock.
    pub fn file_name(&self) -> &str {
        self.value.as_deref().map_or("", UnitValue::name)
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    pub fn is_valid(&self) -> bool {
        !self.is_empty()
    }
}

impl Clone for UnitLock {
    fn clone(&self) -> Self {
        if let Some(registry) = &self.registry {
            registry.acquire(self.id, self.generation);
        }
        UnitLock {
            registry: self.registry.clone(),
            id: self.id,
            generation: self.generation,
            value: self.value.clone(),
        }
    }
}

impl Drop for UnitLock {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.release(self.id, self.generation);
        }
    }
}

impl std::fmt::Debug for UnitLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitLock")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("file_name", &self.file_name())
            .finish()
    }
}

//! The registration database.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::producer::{Producer, ProducerId};
use crate::registration::{Category, Registration, RegistrationFilter};

type ProducerMap = BTreeMap<ProducerId, Producer>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("registration not found: {0}")]
    NotFound(Registration),
    #[error("producer {id} not found under {key}")]
    ProducerNotFound { key: Registration, id: ProducerId },
}

/// Result of [`RegistrationDb::remove_producer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// The registration was present.
    pub entry_existed: bool,
    /// The producer was present under it and has been removed.
    pub removed: bool,
    /// Producers left under the registration.
    pub remaining: usize,
}

impl RemoveOutcome {
    /// The registration still exists and now has no producers.
    pub fn left_empty(&self) -> bool {
        self.entry_existed && self.remaining == 0
    }
}

/// What one sweep removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Producers evicted for inactivity, with every key they were removed from.
    pub evicted: Vec<(ProducerId, Vec<Registration>)>,
    /// Tombstoned entries whose grace period ran out.
    pub purged: Vec<(Registration, ProducerId)>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && self.purged.is_empty()
    }
}

/// Registration → producers, behind a single reader/writer lock.
///
/// Every mutation takes the write guard, every query the read guard, and no
/// guard outlives the method call. The registry holds topology metadata for
/// at most a few thousand keys, so one lock over the whole map is enough;
/// per-key locking would buy parallelism this workload does not need at the
/// cost of multi-key operations (channel plus parent topic, eviction from
/// every key) no longer being atomic.
#[derive(Debug, Default)]
pub struct RegistrationDb {
    registrations: RwLock<BTreeMap<Registration, ProducerMap>>,
}

impl RegistrationDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registrations, empty ones included.
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    /// Ensure an entry exists for `key` (and for its parent topic when `key`
    /// is a channel). Returns true if `key` was created.
    pub fn add_registration(&self, key: Registration) -> bool {
        let mut regs = self.registrations.write();
        if let Some(parent) = key.parent_topic() {
            regs.entry(parent).or_default();
        }
        if regs.contains_key(&key) {
            return false;
        }
        regs.insert(key, ProducerMap::new());
        true
    }

    /// Insert `producer` under `key`, or refresh its `last_update` if it is
    /// already there. A channel key also creates its parent topic entry.
    /// Returns true if the producer was newly inserted.
    ///
    /// Refreshing leaves an existing tombstone in place.
    pub fn add_producer(&self, key: Registration, producer: Producer) -> bool {
        let mut regs = self.registrations.write();
        if let Some(parent) = key.parent_topic() {
            regs.entry(parent).or_default();
        }
        let producers = regs.entry(key).or_default();
        match producers.get_mut(&producer.id()) {
            Some(existing) => {
                existing.refresh(producer.last_update());
                false
            }
            None => {
                producers.insert(producer.id(), producer);
                true
            }
        }
    }

    /// Remove one producer from one registration. The registration itself
    /// stays, even when left empty; see [`Self::prune_if_empty`].
    pub fn remove_producer(&self, key: &Registration, id: ProducerId) -> RemoveOutcome {
        let mut regs = self.registrations.write();
        match regs.get_mut(key) {
            Some(producers) => {
                let removed = producers.remove(&id).is_some();
                RemoveOutcome {
                    entry_existed: true,
                    removed,
                    remaining: producers.len(),
                }
            }
            None => RemoveOutcome {
                entry_existed: false,
                removed: false,
                remaining: 0,
            },
        }
    }

    /// Delete a registration and every producer under it. Deleting a topic
    /// takes its channels with it; see [`Self::remove_topic`].
    pub fn remove_registration(&self, key: &Registration) -> Result<(), RegistryError> {
        let found = match key.category {
            Category::Topic => !self.remove_topic(&key.topic).is_empty(),
            Category::Channel => self.registrations.write().remove(key).is_some(),
        };
        if found {
            Ok(())
        } else {
            Err(RegistryError::NotFound(key.clone()))
        }
    }

    /// Delete a topic and all of its channels under one write guard, so no
    /// channel can be left behind without its topic. Returns the removed
    /// keys, topic first.
    pub fn remove_topic(&self, topic: &str) -> Vec<Registration> {
        let mut regs = self.registrations.write();
        let channels: Vec<Registration> = regs
            .range(Registration::channel(topic, "")..)
            .take_while(|(key, _)| key.category == Category::Channel && key.topic == topic)
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = Vec::with_capacity(channels.len() + 1);
        let key = Registration::topic(topic);
        if regs.remove(&key).is_some() {
            removed.push(key);
        }
        for channel in channels {
            regs.remove(&channel);
            removed.push(channel);
        }
        removed
    }

    /// Hide the producer under `key` from [`Self::find_producers`] until the
    /// sweeper purges it.
    pub fn tombstone(&self, key: &Registration, id: ProducerId) -> Result<(), RegistryError> {
        let mut regs = self.registrations.write();
        let producers = regs
            .get_mut(key)
            .ok_or_else(|| RegistryError::NotFound(key.clone()))?;
        let producer = producers
            .get_mut(&id)
            .ok_or_else(|| RegistryError::ProducerNotFound {
                key: key.clone(),
                id,
            })?;
        producer.tombstone(Instant::now());
        Ok(())
    }

    /// Refresh `last_update` on every entry owned by `id`. Returns how many
    /// entries were refreshed.
    pub fn touch(&self, id: ProducerId) -> usize {
        let now = Instant::now();
        let mut regs = self.registrations.write();
        let mut touched = 0;
        for producers in regs.values_mut() {
            if let Some(producer) = producers.get_mut(&id) {
                producer.refresh(now);
                touched += 1;
            }
        }
        touched
    }

    /// Delete `key` if the pruning policy allows it and it has no producers.
    ///
    /// Only [`Registration::is_prunable`] keys qualify, and a topic is kept
    /// while any of its channels is still registered. Emptiness is checked
    /// under the write lock, so a producer added since the caller's removal
    /// keeps the entry alive.
    pub fn prune_if_empty(&self, key: &Registration) -> bool {
        if !key.is_prunable() {
            return false;
        }
        let mut regs = self.registrations.write();
        match regs.get(key) {
            Some(producers) if producers.is_empty() => {}
            _ => return false,
        }
        if key.category == Category::Topic && has_channels(&regs, &key.topic) {
            return false;
        }
        regs.remove(key);
        true
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Keys matching the three patterns (`*` = any), in key order.
    pub fn find_registrations(&self, category: &str, topic: &str, channel: &str) -> Vec<Registration> {
        self.find_registrations_by(&RegistrationFilter::new(category, topic, channel))
    }

    pub fn find_registrations_by(&self, filter: &RegistrationFilter) -> Vec<Registration> {
        let regs = self.registrations.read();
        if let Some(key) = filter.exact_key() {
            return if regs.contains_key(&key) {
                vec![key]
            } else {
                Vec::new()
            };
        }
        regs.keys().filter(|k| filter.matches(k)).cloned().collect()
    }

    /// Distinct producers across the matching keys, ordered by id.
    ///
    /// A producer is left out only if it is tombstoned under every matching
    /// key it appears under.
    pub fn find_producers(&self, category: &str, topic: &str, channel: &str) -> Vec<Producer> {
        self.find_producers_by(&RegistrationFilter::new(category, topic, channel))
    }

    pub fn find_producers_by(&self, filter: &RegistrationFilter) -> Vec<Producer> {
        let regs = self.registrations.read();
        let mut found: BTreeMap<ProducerId, Producer> = BTreeMap::new();
        let mut collect = |producers: &ProducerMap| {
            for (id, producer) in producers {
                if !producer.is_tombstoned() {
                    found.entry(*id).or_insert_with(|| producer.clone());
                }
            }
        };

        if let Some(key) = filter.exact_key() {
            if let Some(producers) = regs.get(&key) {
                collect(producers);
            }
        } else {
            regs.iter()
                .filter(|(k, _)| filter.matches(k))
                .for_each(|(_, producers)| collect(producers));
        }
        found.into_values().collect()
    }

    /// Every key the producer appears under, tombstoned entries included.
    pub fn lookup_registrations(&self, id: ProducerId) -> Vec<Registration> {
        self.registrations
            .read()
            .iter()
            .filter(|(_, producers)| producers.contains_key(&id))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// The producer's entry under one key.
    pub fn get_producer(&self, key: &Registration, id: ProducerId) -> Option<Producer> {
        self.registrations.read().get(key)?.get(&id).cloned()
    }

    /// Every distinct producer, tombstoned or not, ordered by id. Each is
    /// its most recently refreshed entry.
    pub fn all_producers(&self) -> Vec<Producer> {
        let regs = self.registrations.read();
        let mut found: BTreeMap<ProducerId, Producer> = BTreeMap::new();
        for producer in regs.values().flat_map(|producers| producers.values()) {
            match found.get(&producer.id()) {
                Some(seen) if seen.last_update() >= producer.last_update() => {}
                _ => {
                    found.insert(producer.id(), producer.clone());
                }
            }
        }
        found.into_values().collect()
    }

    /// Full ordered copy of the registry.
    pub fn snapshot(&self) -> Vec<(Registration, Vec<Producer>)> {
        self.registrations
            .read()
            .iter()
            .map(|(key, producers)| (key.clone(), producers.values().cloned().collect()))
            .collect()
    }

    // ── Expiry ────────────────────────────────────────────────────────────────

    /// Evict producers silent for longer than `inactive_timeout` and purge
    /// tombstones older than `tombstone_lifetime`, as of `now`.
    ///
    /// Candidates are gathered under the read lock. Each removal then takes
    /// the write lock on its own and re-checks its condition, so a heartbeat
    /// that lands mid-sweep saves the producer and sessions are never
    /// blocked for a whole pass.
    pub fn sweep(
        &self,
        now: Instant,
        inactive_timeout: Duration,
        tombstone_lifetime: Duration,
    ) -> SweepReport {
        let (stale, expired) = {
            let regs = self.registrations.read();
            let stale: Vec<ProducerId> = latest_entries(&regs)
                .into_iter()
                .filter(|(_, latest)| latest.is_stale(now, inactive_timeout))
                .map(|(id, _)| id)
                .collect();
            let expired: Vec<(Registration, ProducerId)> = regs
                .iter()
                .flat_map(|(key, producers)| {
                    producers
                        .values()
                        .filter(|p| p.tombstone_expired(now, tombstone_lifetime))
                        .map(move |p| (key.clone(), p.id()))
                })
                .collect();
            (stale, expired)
        };

        let mut report = SweepReport::default();
        for id in stale {
            let keys = self.evict_if_stale(id, now, inactive_timeout);
            if !keys.is_empty() {
                report.evicted.push((id, keys));
            }
        }
        for (key, id) in expired {
            if self.purge_if_expired(&key, id, now, tombstone_lifetime) {
                report.purged.push((key, id));
            }
        }
        report
    }

    fn evict_if_stale(&self, id: ProducerId, now: Instant, timeout: Duration) -> Vec<Registration> {
        let mut regs = self.registrations.write();
        let stale = regs
            .values()
            .filter_map(|producers| producers.get(&id))
            .max_by_key(|p| p.last_update())
            .is_some_and(|latest| latest.is_stale(now, timeout));
        if !stale {
            return Vec::new();
        }

        let mut keys = Vec::new();
        for (key, producers) in regs.iter_mut() {
            if producers.remove(&id).is_some() {
                keys.push(key.clone());
            }
        }
        keys
    }

    fn purge_if_expired(
        &self,
        key: &Registration,
        id: ProducerId,
        now: Instant,
        lifetime: Duration,
    ) -> bool {
        let mut regs = self.registrations.write();
        let Some(producers) = regs.get_mut(key) else {
            return false;
        };
        let expired = producers
            .get(&id)
            .is_some_and(|p| p.tombstone_expired(now, lifetime));
        if expired {
            producers.remove(&id);
        }
        expired
    }
}

/// Each producer's most recently refreshed entry.
fn latest_entries(regs: &BTreeMap<Registration, ProducerMap>) -> BTreeMap<ProducerId, &Producer> {
    let mut latest: BTreeMap<ProducerId, &Producer> = BTreeMap::new();
    for producer in regs.values().flat_map(|producers| producers.values()) {
        let slot = latest.entry(producer.id()).or_insert(producer);
        if producer.last_update() > slot.last_update() {
            *slot = producer;
        }
    }
    latest
}

fn has_channels(regs: &BTreeMap<Registration, ProducerMap>, topic: &str) -> bool {
    regs.range(Registration::channel(topic, "")..)
        .next()
        .is_some_and(|(key, _)| key.category == Category::Channel && key.topic == topic)
}

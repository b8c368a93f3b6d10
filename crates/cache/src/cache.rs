//! Slot cache — orchestrates lookups, on-demand provisioning and eviction.
//!
//! Per name the life cycle is `Absent → Provisioning → Resident → Absent`.
//! Calls for the same name are serialized through a per-name async lock, so
//! concurrent `ensure`s for a missing name provision it exactly once and the
//! later callers take the fast path.
//!
//! Capacity is reserved under the index lock before any platform call.
//! Concurrent provisioning of different names therefore evicts at
//! reservation time and `|store| <= capacity` holds even mid-flight.
//!
//! Names referenced by a message that is still being processed are pinned
//! (see [`SlotCache::pin`]) and are never chosen as eviction victims, so a
//! relayed message cannot point at a slot deleted on its behalf.

use chrono::Utc;
use emoterelay_core::error::{PlatformError, SlotError};
use emoterelay_core::event::{DomainEvent, EventBus};
use emoterelay_core::naming::SlotNaming;
use emoterelay_core::platform::SlotPlatform;
use emoterelay_core::slot::{Slot, SlotHandle};
use emoterelay_core::source::{FetchedSource, SourceFetcher};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::eviction;
use crate::store::SlotStore;

/// Resident slots plus capacity promised to in-flight provisioning.
#[derive(Debug)]
struct Index {
    store: SlotStore,
    reserved: usize,
    /// Pin counts of names that must not be evicted
    pinned: HashMap<String, usize>,
    /// Bumped by `clear`; reservations from an older epoch are discarded
    epoch: u64,
}

/// Outcome of the startup warm-start.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PopulateReport {
    /// Logical names adopted into the store
    pub adopted: Vec<String>,
    /// Bot-owned platform slots that were deleted (unknown name or over capacity)
    pub discarded: Vec<String>,
    /// Platform slots not owned by the bot
    pub ignored: usize,
}

/// Outcome of [`SlotCache::clear`].
#[derive(Debug, Default)]
pub struct ClearReport {
    pub removed: Vec<String>,
    /// Platform deletes that failed; the local entries are gone regardless
    pub failures: Vec<(String, PlatformError)>,
}

pub struct SlotCache {
    catalog: Arc<Catalog>,
    platform: Arc<dyn SlotPlatform>,
    fetcher: Arc<dyn SourceFetcher>,
    naming: SlotNaming,
    index: Mutex<Index>,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    events: Option<Arc<EventBus>>,
}

impl SlotCache {
    pub fn new(
        catalog: Arc<Catalog>,
        platform: Arc<dyn SlotPlatform>,
        fetcher: Arc<dyn SourceFetcher>,
        naming: SlotNaming,
        capacity: usize,
    ) -> Self {
        Self {
            catalog,
            platform,
            fetcher,
            naming,
            index: Mutex::new(Index {
                store: SlotStore::new(capacity),
                reserved: 0,
                pinned: HashMap::new(),
                epoch: 0,
            }),
            in_flight: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    /// Publish slot lifecycle events on a bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn naming(&self) -> &SlotNaming {
        &self.naming
    }

    pub fn capacity(&self) -> usize {
        self.lock_index().store.capacity()
    }

    pub fn len(&self) -> usize {
        self.lock_index().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_index().store.is_empty()
    }

    /// Resident slot without counting a use.
    pub fn get(&self, name: &str) -> Option<Slot> {
        self.lock_index().store.get(name).cloned()
    }

    pub fn is_resident(&self, name: &str) -> bool {
        self.lock_index().store.contains(name)
    }

    /// Every resident slot, insertion ordered.
    pub fn snapshot(&self) -> Vec<Slot> {
        self.lock_index().store.all()
    }

    /// Rebuild the index from whatever the platform already hosts.
    ///
    /// Run once at startup before accepting traffic. Bot-owned slots whose
    /// name the catalog does not know, or that exceed capacity, are deleted
    /// from the platform (best-effort).
    pub async fn populate(&self) -> Result<PopulateReport, PlatformError> {
        let enumerated = self.platform.enumerate_slots().await?;
        let mut report = PopulateReport::default();
        let mut known = Vec::new();
        let mut unknown = Vec::new();

        for entry in enumerated {
            let Some(logical) = self.naming.logical_name(&entry.platform_name) else {
                report.ignored += 1;
                continue;
            };
            let slot = Slot::new(logical, entry.handle, entry.is_animated);
            if self.catalog.contains(logical).await {
                known.push(slot);
            } else {
                unknown.push(slot);
            }
        }

        let overflow = {
            let mut index = self.lock_index();
            let overflow = index.store.populate(known);
            report.adopted = index.store.all().into_iter().map(|s| s.name).collect();
            overflow
        };

        for slot in unknown.into_iter().chain(overflow) {
            if let Err(e) = self.platform.delete_slot(&slot.handle).await {
                warn!(name = %slot.name, error = %e, "Failed to delete stale slot during warm start");
            }
            report.discarded.push(slot.name);
        }

        info!(
            adopted = report.adopted.len(),
            discarded = report.discarded.len(),
            ignored = report.ignored,
            "Slot store warm-started"
        );
        Ok(report)
    }

    /// Make sure `name` is resident and count one use of it.
    pub async fn ensure(&self, name: &str) -> Result<Slot, SlotError> {
        let lock = self.name_lock(name);
        let result = {
            let _guard = lock.lock().await;
            self.ensure_locked(name).await
        };
        self.release_name_lock(name, lock);
        result
    }

    /// Protect `names` from eviction until the guard is dropped.
    ///
    /// Pins nest: a name stays protected while any guard holds it. Names
    /// that are not resident yet are protected once they become resident.
    pub fn pin(&self, names: &[String]) -> PinGuard<'_> {
        let mut index = self.lock_index();
        for name in names {
            *index.pinned.entry(name.clone()).or_default() += 1;
        }
        PinGuard {
            cache: self,
            names: names.to_vec(),
        }
    }

    /// Add or overwrite `name` from an explicit URL.
    ///
    /// The URL is fetched first; a resident slot is only replaced once the
    /// new content is known to be a usable image. The catalog entry is
    /// published only once the new slot is resident, so a failed add leaves
    /// the catalog as it was.
    pub async fn add(&self, name: &str, url: &str) -> Result<Slot, SlotError> {
        if !self.naming.is_addressable(name) {
            return Err(SlotError::InvalidName(name.to_string()));
        }
        let lock = self.name_lock(name);
        let result = {
            let _guard = lock.lock().await;
            self.add_locked(name, url).await
        };
        self.release_name_lock(name, lock);
        result
    }

    /// Remove a resident slot and delete it from the platform.
    pub async fn remove(&self, name: &str) -> Result<Slot, SlotError> {
        let lock = self.name_lock(name);
        let result = {
            let _guard = lock.lock().await;
            match self.lock_index().store.remove(name) {
                Some(slot) => Ok(slot),
                None => Err(SlotError::NotResident(name.to_string())),
            }
        };
        self.release_name_lock(name, lock);

        let slot = result?;
        if let Err(e) = self.platform.delete_slot(&slot.handle).await {
            warn!(name = %name, error = %e, "Platform delete failed for removed slot");
        }
        info!(name = %name, "Removed slot");
        self.publish(DomainEvent::SlotRemoved {
            name: name.to_string(),
            timestamp: Utc::now(),
        });
        Ok(slot)
    }

    /// Empty the store, deleting every slot from the platform.
    ///
    /// Best-effort: local entries are dropped even when the platform delete
    /// fails; failures are collected in the report.
    ///
    /// Provisioning already in flight is not awaited. Its slot is deleted
    /// instead of being indexed, and that `ensure` fails with
    /// `ProvisioningFailed`, so the store is empty once `clear` returns and
    /// stays so until new work starts.
    pub async fn clear(&self) -> ClearReport {
        let drained = {
            let mut index = self.lock_index();
            index.epoch += 1;
            index.store.drain()
        };

        let deletes = drained.iter().map(|slot| async move {
            (slot, self.platform.delete_slot(&slot.handle).await)
        });

        let mut report = ClearReport::default();
        for (slot, result) in futures::future::join_all(deletes).await {
            match result {
                Ok(()) => debug!(name = %slot.name, "Deleted slot"),
                Err(e) => {
                    warn!(name = %slot.name, error = %e, "Platform delete failed during clear");
                    report.failures.push((slot.name.clone(), e));
                }
            }
            report.removed.push(slot.name.clone());
        }

        info!(
            removed = report.removed.len(),
            failed = report.failures.len(),
            "Cleared slot store"
        );
        report
    }

    async fn ensure_locked(&self, name: &str) -> Result<Slot, SlotError> {
        if let Some(slot) = self.touch(name) {
            return Ok(slot);
        }

        let url = self
            .catalog
            .lookup(name)
            .await
            .ok_or_else(|| SlotError::UnknownEmote(name.to_string()))?;

        let source = self.fetch_source(name, &url).await?;
        self.install(name, source).await
    }

    async fn add_locked(&self, name: &str, url: &str) -> Result<Slot, SlotError> {
        let source = self.fetch_source(name, url).await?;

        let previous = self.lock_index().store.remove(name);
        if let Some(previous) = previous {
            if let Err(e) = self.platform.delete_slot(&previous.handle).await {
                warn!(name = %name, error = %e, "Platform delete failed for overwritten slot");
            }
            info!(name = %name, "Deleted existing slot before overwrite");
        }

        let slot = self.install(name, source).await?;
        self.catalog.publish(name, url).await;
        Ok(slot)
    }

    /// Fast path: count a use of a resident slot.
    fn touch(&self, name: &str) -> Option<Slot> {
        self.lock_index().store.increment_use(name).cloned()
    }

    async fn fetch_source(&self, name: &str, url: &str) -> Result<FetchedSource, SlotError> {
        let source = self.fetcher.fetch(url).await.map_err(|e| {
            warn!(name = %name, url = %url, error = %e, "Source fetch failed");
            SlotError::SourceUnreachable {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;

        if !source.is_image() {
            warn!(name = %name, url = %url, content_type = %source.content_type, "Source is not an image");
            return Err(SlotError::SourceUnreachable {
                name: name.to_string(),
                reason: format!("content type '{}' is not an image", source.content_type),
            });
        }

        Ok(source)
    }

    /// Reserve capacity, create the platform slot and index it with one use.
    async fn install(&self, name: &str, source: FetchedSource) -> Result<Slot, SlotError> {
        let is_animated = source.is_animated();
        let (reservation, victim) = self.reserve(name, is_animated)?;
        if let Some(victim) = victim {
            self.delete_evicted(victim, name).await;
        }

        let handle = self.create_with_retry(name, &source, is_animated).await?;

        match reservation.commit(Slot::new(name, handle.clone(), is_animated)) {
            Ok(slot) => {
                info!(name = %name, animated = is_animated, "Provisioned slot");
                self.publish(DomainEvent::SlotProvisioned {
                    name: name.to_string(),
                    is_animated,
                    timestamp: Utc::now(),
                });
                Ok(slot)
            }
            Err(e) => {
                if let Err(delete_err) = self.platform.delete_slot(&handle).await {
                    warn!(name = %name, error = %delete_err, "Failed to delete unindexed slot");
                }
                Err(e)
            }
        }
    }

    /// Create on the platform. A capacity rejection gets exactly one more
    /// eviction and one retry; any other failure is final.
    async fn create_with_retry(
        &self,
        name: &str,
        source: &FetchedSource,
        is_animated: bool,
    ) -> Result<SlotHandle, SlotError> {
        let platform_name = self.naming.platform_name(name);
        let failed = |e: PlatformError| {
            warn!(name = %name, error = %e, "Slot provisioning failed");
            SlotError::ProvisioningFailed {
                name: name.to_string(),
                reason: e.to_string(),
            }
        };

        match self
            .platform
            .create_slot(&platform_name, &source.bytes, is_animated)
            .await
        {
            Ok(handle) => Ok(handle),
            Err(PlatformError::CapacityReached) => {
                warn!(name = %name, "Platform reported capacity reached, evicting once and retrying");
                let victim = {
                    let mut guard = self.lock_index();
                    let index = &mut *guard;
                    evict_from(&mut index.store, &index.pinned, is_animated)
                };
                if let Some(victim) = victim {
                    self.delete_evicted(victim, name).await;
                }
                self.platform
                    .create_slot(&platform_name, &source.bytes, is_animated)
                    .await
                    .map_err(failed)
            }
            Err(e) => Err(failed(e)),
        }
    }

    /// Claim one unit of capacity, evicting a resident slot if none is free.
    fn reserve(
        &self,
        name: &str,
        is_animated: bool,
    ) -> Result<(Reservation<'_>, Option<Slot>), SlotError> {
        let mut guard = self.lock_index();
        let index = &mut *guard;
        let mut victim = None;

        if index.store.len() + index.reserved >= index.store.capacity() {
            victim = evict_from(&mut index.store, &index.pinned, is_animated);
            if victim.is_none() {
                return Err(SlotError::ProvisioningFailed {
                    name: name.to_string(),
                    reason: "all capacity is held by in-flight provisioning or pinned slots"
                        .into(),
                });
            }
        }

        index.reserved += 1;
        Ok((
            Reservation {
                cache: self,
                active: true,
                epoch: index.epoch,
            },
            victim,
        ))
    }

    async fn delete_evicted(&self, victim: Slot, for_name: &str) {
        info!(
            evicted = %victim.name,
            use_count = victim.use_count,
            animated = victim.is_animated,
            for_name = %for_name,
            "Evicting slot"
        );
        if let Err(e) = self.platform.delete_slot(&victim.handle).await {
            warn!(name = %victim.name, error = %e, "Platform delete failed for evicted slot");
        }
        self.publish(DomainEvent::SlotEvicted {
            name: victim.name,
            use_count: victim.use_count,
            for_name: for_name.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn name_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.entry(name.to_string()).or_default().clone()
    }

    /// Drop the per-name lock entry once nobody else holds or awaits it.
    fn release_name_lock(&self, name: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if in_flight
            .get(name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            in_flight.remove(name);
        }
    }

    fn lock_index(&self) -> MutexGuard<'_, Index> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

fn evict_from(
    store: &mut SlotStore,
    pinned: &HashMap<String, usize>,
    want_animated: bool,
) -> Option<Slot> {
    let candidates: Vec<Slot> = store
        .all()
        .into_iter()
        .filter(|slot| !pinned.contains_key(&slot.name))
        .collect();
    let victim = eviction::choose(&candidates, want_animated)?;
    store.remove(victim)
}

/// Eviction protection for a set of names; see [`SlotCache::pin`].
pub struct PinGuard<'a> {
    cache: &'a SlotCache,
    names: Vec<String>,
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        let mut index = self.cache.lock_index();
        for name in &self.names {
            if let Some(count) = index.pinned.get_mut(name) {
                *count -= 1;
                if *count == 0 {
                    index.pinned.remove(name);
                }
            }
        }
    }
}

/// Capacity held for one in-flight provisioning.
///
/// Released on drop, so an abandoned `ensure` never leaks capacity.
struct Reservation<'a> {
    cache: &'a SlotCache,
    active: bool,
    epoch: u64,
}

impl Reservation<'_> {
    /// Index the new slot with one use, converting the reservation into residency.
    fn commit(mut self, slot: Slot) -> Result<Slot, SlotError> {
        let name = slot.name.clone();
        let cache = self.cache;
        self.active = false;
        let mut index = cache.lock_index();
        index.reserved = index.reserved.saturating_sub(1);
        if index.epoch != self.epoch {
            return Err(SlotError::ProvisioningFailed {
                name,
                reason: "slot store was cleared while provisioning".into(),
            });
        }
        index
            .store
            .put(slot)
            .map_err(|e| SlotError::ProvisioningFailed {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        index
            .store
            .increment_use(&name)
            .cloned()
            .ok_or(SlotError::NotResident(name))
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.active {
            let mut index = self.cache.lock_index();
            index.reserved = index.reserved.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use emoterelay_core::error::FetchError;
    use emoterelay_core::platform::EnumeratedSlot;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Platform mock that records calls and can be scripted to fail.
    #[derive(Default)]
    struct MockPlatform {
        creates: AtomicUsize,
        deletes: Mutex<Vec<String>>,
        next_id: AtomicUsize,
        /// Number of upcoming creates that fail with CapacityReached
        capacity_rejections: AtomicUsize,
        fail_deletes: bool,
        reject_all: bool,
        existing: Vec<EnumeratedSlot>,
        create_delay: Option<Duration>,
    }

    impl MockPlatform {
        fn creates(&self) -> usize {
            self.creates.load(Ordering::SeqCst)
        }

        fn deleted(&self) -> Vec<String> {
            self.deletes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SlotPlatform for MockPlatform {
        fn name(&self) -> &str {
            "mock"
        }

        fn capacity(&self) -> usize {
            50
        }

        async fn create_slot(
            &self,
            platform_name: &str,
            _image: &[u8],
            _is_animated: bool,
        ) -> Result<SlotHandle, PlatformError> {
            if let Some(delay) = self.create_delay {
                tokio::time::sleep(delay).await;
            }
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.reject_all {
                return Err(PlatformError::Rejected("invalid image".into()));
            }
            if self
                .capacity_rejections
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(PlatformError::CapacityReached);
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(SlotHandle {
                id: id.to_string(),
                platform_name: platform_name.to_string(),
            })
        }

        async fn delete_slot(&self, handle: &SlotHandle) -> Result<(), PlatformError> {
            self.deletes
                .lock()
                .unwrap()
                .push(handle.platform_name.clone());
            if self.fail_deletes {
                return Err(PlatformError::Network("connection reset".into()));
            }
            Ok(())
        }

        async fn enumerate_slots(&self) -> Result<Vec<EnumeratedSlot>, PlatformError> {
            Ok(self.existing.clone())
        }
    }

    /// Fetcher serving `.gif` URLs as animated, `.png` as static, anything
    /// containing `html` as a web page and `down` as unreachable.
    #[derive(Default)]
    struct MockFetcher {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl SourceFetcher for MockFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedSource, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if url.contains("down") {
                return Err(FetchError::Request {
                    url: url.into(),
                    reason: "connection refused".into(),
                });
            }
            let content_type = if url.contains("html") {
                "text/html"
            } else if url.ends_with(".gif") {
                "image/gif"
            } else {
                "image/png"
            };
            Ok(FetchedSource::new(vec![0u8; 4], content_type))
        }
    }

    fn catalog(entries: &[(&str, &str)]) -> Arc<Catalog> {
        Arc::new(Catalog::new(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }

    fn cache_with(
        entries: &[(&str, &str)],
        platform: Arc<MockPlatform>,
        capacity: usize,
    ) -> SlotCache {
        SlotCache::new(
            catalog(entries),
            platform,
            Arc::new(MockFetcher::default()),
            SlotNaming::default(),
            capacity,
        )
    }

    fn handle(name: &str, id: &str) -> SlotHandle {
        SlotHandle {
            id: id.into(),
            platform_name: format!("iwashiding__{name}"),
        }
    }

    #[tokio::test]
    async fn ensure_creates_then_hits() {
        let platform = Arc::new(MockPlatform::default());
        let cache = cache_with(&[("Kappa", "http://x/kappa.png")], platform.clone(), 2);

        let first = cache.ensure("Kappa").await.unwrap();
        assert_eq!(first.use_count, 1);
        assert!(!first.is_animated);
        assert_eq!(first.handle.platform_name, "iwashiding__Kappa");

        let second = cache.ensure("Kappa").await.unwrap();
        assert_eq!(second.handle, first.handle);
        assert_eq!(second.use_count, 2);
        assert_eq!(platform.creates(), 1);
    }

    #[tokio::test]
    async fn ensure_twice_on_resident_adds_two_uses() {
        let platform = Arc::new(MockPlatform::default());
        let cache = cache_with(&[("Kappa", "http://x/kappa.png")], platform.clone(), 2);
        cache.ensure("Kappa").await.unwrap();
        let before = cache.get("Kappa").unwrap().use_count;

        cache.ensure("Kappa").await.unwrap();
        cache.ensure("Kappa").await.unwrap();
        assert_eq!(cache.get("Kappa").unwrap().use_count, before + 2);
        assert_eq!(platform.creates(), 1);
    }

    #[tokio::test]
    async fn unknown_emote() {
        let platform = Arc::new(MockPlatform::default());
        let cache = cache_with(&[], platform.clone(), 2);
        assert_eq!(
            cache.ensure("Nope").await,
            Err(SlotError::UnknownEmote("Nope".into()))
        );
        assert_eq!(platform.creates(), 0);
    }

    #[tokio::test]
    async fn unreachable_and_non_image_sources() {
        let platform = Arc::new(MockPlatform::default());
        let cache = cache_with(
            &[("Down", "http://down/x.png"), ("Page", "http://x/page.html")],
            platform.clone(),
            2,
        );
        assert!(matches!(
            cache.ensure("Down").await,
            Err(SlotError::SourceUnreachable { .. })
        ));
        assert!(matches!(
            cache.ensure("Page").await,
            Err(SlotError::SourceUnreachable { .. })
        ));
        assert!(cache.is_empty());
        assert_eq!(platform.creates(), 0);
    }

    #[tokio::test]
    async fn full_store_evicts_mismatched_type_first() {
        let platform = Arc::new(MockPlatform::default());
        let cache = cache_with(
            &[("catJAM", "http://x/cat.gif"), ("Kappa", "http://x/kappa.png")],
            platform.clone(),
            1,
        );

        cache.ensure("catJAM").await.unwrap();
        for _ in 0..4 {
            cache.ensure("catJAM").await.unwrap();
        }
        assert_eq!(cache.get("catJAM").unwrap().use_count, 5);

        let kappa = cache.ensure("Kappa").await.unwrap();
        assert_eq!(kappa.use_count, 1);
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_resident("catJAM"));
        assert_eq!(platform.deleted(), vec!["iwashiding__catJAM".to_string()]);
    }

    #[tokio::test]
    async fn store_never_exceeds_capacity() {
        let platform = Arc::new(MockPlatform::default());
        let entries: Vec<(String, String)> = (0..6)
            .map(|i| (format!("e{i}"), format!("http://x/e{i}.png")))
            .collect();
        let refs: Vec<(&str, &str)> = entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let cache = cache_with(&refs, platform.clone(), 3);

        for (name, _) in &refs {
            cache.ensure(name).await.unwrap();
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(platform.creates(), 6);
        assert_eq!(platform.deleted().len(), 3);
    }

    #[tokio::test]
    async fn eviction_delete_failure_is_not_fatal() {
        let platform = Arc::new(MockPlatform {
            fail_deletes: true,
            ..MockPlatform::default()
        });
        let cache = cache_with(
            &[("a", "http://x/a.png"), ("b", "http://x/b.png")],
            platform.clone(),
            1,
        );
        cache.ensure("a").await.unwrap();
        let b = cache.ensure("b").await.unwrap();
        assert_eq!(b.name, "b");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn capacity_rejection_evicts_and_retries_once() {
        let platform = Arc::new(MockPlatform::default());
        let cache = cache_with(
            &[("a", "http://x/a.png"), ("b", "http://x/b.png")],
            platform.clone(),
            5,
        );
        cache.ensure("a").await.unwrap();

        // Platform is full of stale slots the index does not know about.
        platform.capacity_rejections.store(1, Ordering::SeqCst);
        let b = cache.ensure("b").await.unwrap();
        assert_eq!(b.use_count, 1);
        assert_eq!(platform.creates(), 3);
        assert!(!cache.is_resident("a"));
    }

    #[tokio::test]
    async fn persistent_capacity_rejection_fails_after_one_retry() {
        let platform = Arc::new(MockPlatform::default());
        let cache = cache_with(&[("a", "http://x/a.png")], platform.clone(), 5);

        platform.capacity_rejections.store(10, Ordering::SeqCst);
        let err = cache.ensure("a").await.unwrap_err();
        assert!(matches!(err, SlotError::ProvisioningFailed { .. }));
        assert_eq!(platform.creates(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn rejected_create_fails_without_retry_and_releases_capacity() {
        let platform = Arc::new(MockPlatform {
            reject_all: true,
            ..MockPlatform::default()
        });
        let cache = cache_with(&[("a", "http://x/a.png")], platform.clone(), 1);

        for _ in 0..3 {
            assert!(matches!(
                cache.ensure("a").await,
                Err(SlotError::ProvisioningFailed { .. })
            ));
        }
        assert_eq!(platform.creates(), 3);
        assert_eq!(cache.lock_index().reserved, 0);
    }

    #[tokio::test]
    async fn concurrent_ensures_provision_once() {
        let platform = Arc::new(MockPlatform {
            create_delay: Some(Duration::from_millis(20)),
            ..MockPlatform::default()
        });
        let cache = Arc::new(cache_with(
            &[("Kappa", "http://x/kappa.png")],
            platform.clone(),
            2,
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.ensure("Kappa").await })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap().handle);
        }

        assert_eq!(platform.creates(), 1);
        assert!(handles.iter().all(|h| *h == handles[0]));
        assert_eq!(cache.get("Kappa").unwrap().use_count, 8);
        assert!(cache.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_distinct_names_respect_capacity() {
        let platform = Arc::new(MockPlatform {
            create_delay: Some(Duration::from_millis(10)),
            ..MockPlatform::default()
        });
        let cache = Arc::new(cache_with(
            &[
                ("a", "http://x/a.png"),
                ("b", "http://x/b.png"),
                ("c", "http://x/c.png"),
            ],
            platform.clone(),
            2,
        ));
        cache.ensure("a").await.unwrap();

        let (b, c) = tokio::join!(cache.ensure("b"), cache.ensure("c"));
        assert!(b.is_ok());
        assert!(c.is_ok());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lock_index().reserved, 0);
    }

    #[tokio::test]
    async fn remove_and_miss() {
        let platform = Arc::new(MockPlatform::default());
        let cache = cache_with(&[("Kappa", "http://x/kappa.png")], platform.clone(), 2);
        cache.ensure("Kappa").await.unwrap();

        let removed = cache.remove("Kappa").await.unwrap();
        assert_eq!(removed.name, "Kappa");
        assert!(cache.is_empty());
        assert_eq!(platform.deleted(), vec!["iwashiding__Kappa".to_string()]);

        assert_eq!(
            cache.remove("Kappa").await,
            Err(SlotError::NotResident("Kappa".into()))
        );
    }

    #[tokio::test]
    async fn removed_name_comes_back_with_fresh_counter() {
        let platform = Arc::new(MockPlatform::default());
        let cache = cache_with(&[("Kappa", "http://x/kappa.png")], platform.clone(), 2);
        cache.ensure("Kappa").await.unwrap();
        cache.ensure("Kappa").await.unwrap();
        cache.remove("Kappa").await.unwrap();

        let again = cache.ensure("Kappa").await.unwrap();
        assert_eq!(again.use_count, 1);
        assert_eq!(platform.creates(), 2);
    }

    #[tokio::test]
    async fn clear_is_best_effort() {
        let platform = Arc::new(MockPlatform {
            fail_deletes: true,
            ..MockPlatform::default()
        });
        let cache = cache_with(
            &[("a", "http://x/a.png"), ("b", "http://x/b.gif")],
            platform.clone(),
            2,
        );
        cache.ensure("a").await.unwrap();
        cache.ensure("b").await.unwrap();

        let report = cache.clear().await;
        assert_eq!(report.removed.len(), 2);
        assert_eq!(report.failures.len(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn clear_discards_slot_created_while_clearing() {
        let platform = Arc::new(MockPlatform {
            create_delay: Some(Duration::from_millis(50)),
            ..MockPlatform::default()
        });
        let cache = Arc::new(cache_with(&[("a", "http://x/a.png")], platform.clone(), 2));

        let pending = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.ensure("a").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let report = cache.clear().await;
        assert!(report.removed.is_empty());

        assert!(matches!(
            pending.await.unwrap(),
            Err(SlotError::ProvisioningFailed { .. })
        ));
        assert!(cache.is_empty());
        assert_eq!(cache.lock_index().reserved, 0);
        assert_eq!(platform.deleted(), vec!["iwashiding__a".to_string()]);

        assert_eq!(cache.ensure("a").await.unwrap().use_count, 1);
    }

    #[tokio::test]
    async fn pinned_names_are_not_evicted() {
        let platform = Arc::new(MockPlatform::default());
        let cache = cache_with(
            &[
                ("X", "http://x/x.png"),
                ("Y", "http://x/y.png"),
                ("A", "http://x/a.png"),
            ],
            platform.clone(),
            2,
        );
        cache.ensure("X").await.unwrap();
        for _ in 0..3 {
            cache.ensure("Y").await.unwrap();
        }

        let pins = cache.pin(&["X".to_string(), "A".to_string()]);
        cache.ensure("X").await.unwrap();
        cache.ensure("A").await.unwrap();
        assert!(cache.is_resident("X"));
        assert!(cache.is_resident("A"));
        assert!(!cache.is_resident("Y"));

        assert!(matches!(
            cache.ensure("Y").await,
            Err(SlotError::ProvisioningFailed { .. })
        ));
        drop(pins);
        assert!(cache.lock_index().pinned.is_empty());
        assert!(cache.ensure("Y").await.is_ok());
    }

    #[tokio::test]
    async fn nested_pins_release_together() {
        let platform = Arc::new(MockPlatform::default());
        let cache = cache_with(&[("X", "http://x/x.png")], platform.clone(), 1);
        let outer = cache.pin(&["X".to_string()]);
        let inner = cache.pin(&["X".to_string()]);
        drop(inner);
        assert_eq!(cache.lock_index().pinned.get("X"), Some(&1));
        drop(outer);
        assert!(cache.lock_index().pinned.is_empty());
    }

    #[tokio::test]
    async fn add_overwrites_and_publishes_to_catalog() {
        let platform = Arc::new(MockPlatform::default());
        let cache = cache_with(&[("Kappa", "http://x/kappa.png")], platform.clone(), 2);
        let original = cache.ensure("Kappa").await.unwrap();

        let replaced = cache.add("Kappa", "http://y/kappa.gif").await.unwrap();
        assert_ne!(replaced.handle, original.handle);
        assert!(replaced.is_animated);
        assert_eq!(replaced.use_count, 1);
        assert_eq!(
            cache.catalog().lookup("Kappa").await.as_deref(),
            Some("http://y/kappa.gif")
        );

        let custom = cache.add("Custom", "http://y/custom.png").await.unwrap();
        assert_eq!(custom.name, "Custom");
        assert!(cache.catalog().contains("Custom").await);
    }

    #[tokio::test]
    async fn add_with_bad_url_keeps_existing_slot() {
        let platform = Arc::new(MockPlatform::default());
        let cache = cache_with(&[("Kappa", "http://x/kappa.png")], platform.clone(), 2);
        cache.ensure("Kappa").await.unwrap();

        assert!(cache.add("Kappa", "http://down/k.png").await.is_err());
        assert!(cache.is_resident("Kappa"));
        assert!(platform.deleted().is_empty());
    }

    #[tokio::test]
    async fn failed_overwrite_leaves_catalog_untouched() {
        let platform = Arc::new(MockPlatform {
            reject_all: true,
            ..MockPlatform::default()
        });
        let cache = cache_with(&[("Kappa", "http://x/kappa.png")], platform.clone(), 2);

        assert!(matches!(
            cache.add("Kappa", "http://x/other.png").await,
            Err(SlotError::ProvisioningFailed { .. })
        ));
        assert_eq!(
            cache.catalog().lookup("Kappa").await.as_deref(),
            Some("http://x/kappa.png")
        );

        assert!(cache.add("Fresh", "http://x/fresh.png").await.is_err());
        assert!(!cache.catalog().contains("Fresh").await);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn add_rejects_unaddressable_names() {
        let platform = Arc::new(MockPlatform::default());
        let cache = cache_with(&[], platform.clone(), 2);

        for name in ["bad-name", "two words", "", "iwashiding__Kappa"] {
            assert_eq!(
                cache.add(name, "http://x/ok.png").await,
                Err(SlotError::InvalidName(name.into()))
            );
            assert!(!cache.catalog().contains(name).await);
        }
        assert_eq!(platform.creates(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn populate_adopts_known_owned_slots() {
        let platform = Arc::new(MockPlatform {
            existing: vec![
                EnumeratedSlot {
                    platform_name: "iwashiding__Kappa".into(),
                    handle: handle("Kappa", "10"),
                    is_animated: false,
                },
                EnumeratedSlot {
                    platform_name: "iwashiding__Gone".into(),
                    handle: handle("Gone", "11"),
                    is_animated: false,
                },
                EnumeratedSlot {
                    platform_name: "partyparrot".into(),
                    handle: SlotHandle {
                        id: "12".into(),
                        platform_name: "partyparrot".into(),
                    },
                    is_animated: true,
                },
            ],
            ..MockPlatform::default()
        });
        let cache = cache_with(&[("Kappa", "http://x/kappa.png")], platform.clone(), 2);

        let report = cache.populate().await.unwrap();
        assert_eq!(report.adopted, vec!["Kappa".to_string()]);
        assert_eq!(report.discarded, vec!["Gone".to_string()]);
        assert_eq!(report.ignored, 1);

        let kappa = cache.get("Kappa").unwrap();
        assert_eq!(kappa.use_count, 0);
        assert_eq!(kappa.handle.id, "10");

        // Warm-started slot is a hit.
        cache.ensure("Kappa").await.unwrap();
        assert_eq!(platform.creates(), 0);
    }

    #[tokio::test]
    async fn populate_respects_capacity() {
        let existing = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, name)| EnumeratedSlot {
                platform_name: format!("iwashiding__{name}"),
                handle: handle(name, &i.to_string()),
                is_animated: false,
            })
            .collect();
        let platform = Arc::new(MockPlatform {
            existing,
            ..MockPlatform::default()
        });
        let cache = cache_with(
            &[("a", "http://x/a.png"), ("b", "http://x/b.png"), ("c", "http://x/c.png")],
            platform.clone(),
            2,
        );

        let report = cache.populate().await.unwrap();
        assert_eq!(report.adopted.len(), 2);
        assert_eq!(report.discarded, vec!["c".to_string()]);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn events_are_published() {
        let platform = Arc::new(MockPlatform::default());
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let cache = cache_with(&[("Kappa", "http://x/kappa.png")], platform, 2).with_events(bus);

        cache.ensure("Kappa").await.unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.as_ref(),
            DomainEvent::SlotProvisioned { name, .. } if name == "Kappa"
        ));
    }
}

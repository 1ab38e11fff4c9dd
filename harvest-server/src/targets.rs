use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;

/// A list of unique strings that keeps insertion order.
#[derive(Debug, Default)]
pub struct TargetList(RwLock<Vec<String>>);

fn push_unique(list: &mut Vec<String>, entry: String) {
    if !list.contains(&entry) {
        list.push(entry);
    }
}

impl TargetList {
    /// Creates a list from the given entries, dropping duplicates.
    pub fn new(entries: impl IntoIterator<Item = String>) -> Self {
        let list = Self::default();
        list.replace(entries);
        list
    }

    /// Returns a copy of the current entries.
    pub fn get(&self) -> Vec<String> {
        self.0.read().clone()
    }

    /// Replaces all entries and returns the new list.
    pub fn replace(&self, entries: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut list = Vec::new();
        for entry in entries {
            push_unique(&mut list, entry);
        }

        let mut guard = self.0.write();
        *guard = list;
        guard.clone()
    }

    /// Appends entries that are not in the list yet and returns the new list.
    pub fn extend(&self, entries: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut guard = self.0.write();
        for entry in entries {
            push_unique(&mut guard, entry);
        }
        guard.clone()
    }
}

/// Runtime-mutable scrape targets.
///
/// Seeded from the configuration and changed through the control API. Changes apply on the
/// poller's next tick.
#[derive(Debug, Default)]
pub struct Targets {
    /// Statically configured endpoint URLs.
    pub hosts: TargetList,
    /// Metric names that are never admitted to the intake queue.
    pub excludes: TargetList,
}

impl Targets {
    /// Creates targets from initial hosts and exclusions.
    pub fn new(hosts: &[String], excludes: &[String]) -> Self {
        Self {
            hosts: TargetList::new(hosts.iter().cloned()),
            excludes: TargetList::new(excludes.iter().cloned()),
        }
    }
}

/// Endpoint URLs found by registry discovery.
///
/// Replaced as a whole on every successful discovery round.
#[derive(Debug, Default)]
pub struct DiscoveredHosts(ArcSwap<Vec<String>>);

impl DiscoveredHosts {
    /// Returns the current list.
    pub fn load(&self) -> Arc<Vec<String>> {
        self.0.load_full()
    }

    /// Replaces the current list.
    pub fn store(&self, hosts: Vec<String>) {
        self.0.store(Arc::new(hosts));
    }
}

/// Merges static and discovered hosts, keeping the first occurrence of every URL.
pub fn effective_hosts(configured: Vec<String>, discovered: &[String]) -> Vec<String> {
    let mut hosts = configured;
    for host in discovered {
        if !hosts.contains(host) {
            hosts.push(host.clone());
        }
    }
    hosts
}

//! A client's standing interests and the visibility cache derived from them.

use otp_core::{DoId, Location, ZoneId, QUIET_ZONE};
use std::collections::{BTreeSet, HashMap, HashSet};

/// One interest: a parent and the expanded set of zones under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    pub parent_id: DoId,
    pub zones: BTreeSet<ZoneId>,
}

impl Interest {
    pub fn new(parent_id: DoId, zones: BTreeSet<ZoneId>) -> Self {
        Self { parent_id, zones }
    }

    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.zones.iter().map(move |zone| Location::new(self.parent_id, *zone))
    }
}

/// Interests keyed by client-chosen handle.
///
/// The `(parent, zone)` cache is never patched: every mutation rebuilds it
/// from the entries and bumps [`InterestSet::version`].
#[derive(Debug, Default)]
pub struct InterestSet {
    entries: HashMap<u16, Interest>,
    cache: HashSet<Location>,
    version: u64,
}

impl InterestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: u16) -> Option<&Interest> {
        self.entries.get(&handle)
    }

    /// Stores `interest` under `handle`, returning what it replaced.
    pub fn insert(&mut self, handle: u16, interest: Interest) -> Option<Interest> {
        let previous = self.entries.insert(handle, interest);
        self.rebuild();
        previous
    }

    pub fn remove(&mut self, handle: u16) -> Option<Interest> {
        let removed = self.entries.remove(&handle)?;
        self.rebuild();
        Some(removed)
    }

    /// Drops every interest without computing what became invisible.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.rebuild();
    }

    pub fn has_interest(&self, location: Location) -> bool {
        location.zone_id != QUIET_ZONE && self.cache.contains(&location)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of cache rebuilds so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn rebuild(&mut self) {
        self.cache = self
            .entries
            .values()
            .flat_map(Interest::locations)
            .filter(|location| location.zone_id != QUIET_ZONE)
            .collect();
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interest(parent_id: DoId, zones: &[ZoneId]) -> Interest {
        Interest::new(parent_id, zones.iter().copied().collect())
    }

    fn union(set: &InterestSet) -> HashSet<Location> {
        set.entries
            .values()
            .flat_map(Interest::locations)
            .filter(|location| location.zone_id != QUIET_ZONE)
            .collect()
    }

    #[test]
    fn cache_matches_the_union_after_every_change() {
        let mut set = InterestSet::new();
        let steps: Vec<Box<dyn Fn(&mut InterestSet)>> = vec![
            Box::new(|s| {
                s.insert(1, interest(100, &[10, 20]));
            }),
            Box::new(|s| {
                s.insert(2, interest(100, &[20, 30]));
            }),
            Box::new(|s| {
                s.insert(1, interest(200, &[10]));
            }),
            Box::new(|s| {
                s.remove(2);
            }),
            Box::new(|s| {
                s.insert(3, interest(100, &[1, 5]));
            }),
            Box::new(|s| s.clear()),
        ];

        for (i, step) in steps.iter().enumerate() {
            step(&mut set);
            assert_eq!(set.version(), i as u64 + 1);
            let expected = union(&set);
            for parent in [100, 200] {
                for zone in [1, 5, 10, 20, 30] {
                    let location = Location::new(parent, zone);
                    assert_eq!(set.has_interest(location), expected.contains(&location), "{location}");
                }
            }
        }
    }

    #[test]
    fn quiet_zone_never_matches() {
        let mut set = InterestSet::new();
        set.insert(0, interest(100, &[1]));
        assert!(!set.has_interest(Location::new(100, 1)));
    }

    #[test]
    fn remove_unknown_handle() {
        let mut set = InterestSet::new();
        assert!(set.remove(9).is_none());
        assert_eq!(set.version(), 0);
    }
}

//! Point-in-time resolution over the event log.
//!
//! Answers "what was the latest event per key as of instant T" by discarding
//! everything dated after T, grouping the rest by identity key, and keeping
//! the highest id in each group. Ids, not dates, break ties: two events can
//! share a timestamp at the store's clock resolution, but never an id.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};

use crate::types::{Deployment, EventId, Release};

/// An event that can take part in point-in-time resolution.
pub trait Keyed {
    /// Identity key; one representative per key survives resolution.
    type Key: Ord;

    fn id(&self) -> EventId;
    fn date(&self) -> DateTime<Utc>;
    fn group_key(&self) -> Self::Key;
}

impl Keyed for Deployment {
    type Key = (String, String, String);

    fn id(&self) -> EventId {
        self.id
    }

    fn date(&self) -> DateTime<Utc> {
        self.date
    }

    fn group_key(&self) -> Self::Key {
        (
            self.project.clone(),
            self.environment.clone(),
            self.service.clone(),
        )
    }
}

impl Keyed for Release {
    type Key = String;

    fn id(&self) -> EventId {
        self.id
    }

    fn date(&self) -> DateTime<Utc> {
        self.date
    }

    fn group_key(&self) -> Self::Key {
        self.project.clone()
    }
}

/// Every event dated at or before `as_of`, in insertion (id) order.
pub fn visible_as_of<T, I>(events: I, as_of: DateTime<Utc>) -> Vec<T>
where
    T: Keyed,
    I: IntoIterator<Item = T>,
{
    let mut visible: Vec<T> = events
        .into_iter()
        .filter(|event| event.date() <= as_of)
        .collect();
    visible.sort_by_key(|event| event.id());
    visible
}

/// The highest-id event per group key among those dated at or before `as_of`.
///
/// Groups come back in ascending id order of their representatives.
pub fn latest_per_key<T, I>(events: I, as_of: DateTime<Utc>) -> Vec<T>
where
    T: Keyed,
    I: IntoIterator<Item = T>,
{
    let mut latest: BTreeMap<T::Key, T> = BTreeMap::new();
    for event in events {
        if event.date() > as_of {
            continue;
        }
        match latest.entry(event.group_key()) {
            Entry::Vacant(slot) => {
                slot.insert(event);
            }
            Entry::Occupied(mut slot) => {
                if event.id() > slot.get().id() {
                    slot.insert(event);
                }
            }
        }
    }

    let mut resolved: Vec<T> = latest.into_values().collect();
    resolved.sort_by_key(|event| event.id());
    resolved
}

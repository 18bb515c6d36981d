//! Grouping and time-window helpers over stored events.
//!
//! Ages are measured from a caller-supplied `now` so that the same
//! collection always yields the same answer.

use crate::collector::types::{Event, EventKind};
use std::collections::{HashMap, HashSet};

/// One day in milliseconds.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Events grouped under one key, in first-seen order.
#[derive(Debug, Clone)]
pub struct Group<'a> {
    pub key: String,
    pub events: Vec<&'a Event>,
}

impl Group<'_> {
    pub fn count(&self) -> usize {
        self.events.len()
    }
}

/// Group events by key, keeping groups in the order their key first appears.
pub fn group_by<'a, I, F>(events: I, key: F) -> Vec<Group<'a>>
where
    I: IntoIterator<Item = &'a Event>,
    F: Fn(&Event) -> String,
{
    let mut groups: Vec<Group<'a>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for event in events {
        let k = key(event);
        match index.get(&k) {
            Some(&i) => groups[i].events.push(event),
            None => {
                index.insert(k.clone(), groups.len());
                groups.push(Group {
                    key: k,
                    events: vec![event],
                });
            }
        }
    }
    groups
}

/// The largest group. Ties go to the key seen first.
pub fn top_by_count<'a, I, F>(events: I, key: F) -> Option<Group<'a>>
where
    I: IntoIterator<Item = &'a Event>,
    F: Fn(&Event) -> String,
{
    let mut best: Option<Group<'a>> = None;
    for group in group_by(events, key) {
        if best.as_ref().map_or(true, |b| group.count() > b.count()) {
            best = Some(group);
        }
    }
    best
}

/// String property with `"unknown"` for missing, non-string or empty values.
pub fn prop_or_unknown(event: &Event, key: &str) -> String {
    first_prop(event, &[key])
}

/// First non-empty string among `keys`, else `"unknown"`.
pub fn first_prop(event: &Event, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| event.prop_str(k))
        .find(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// Events of one kind.
pub fn of_kind(events: &[Event], kind: EventKind) -> Vec<&Event> {
    events.iter().filter(|e| e.kind == kind).collect()
}

/// Events whose age at `now` lies in `[min_age_ms, max_age_ms)`.
///
/// A `min_age_ms` of `None` also admits events stamped after `now`.
pub fn aged_between<'a>(
    events: &[&'a Event],
    now: i64,
    min_age_ms: Option<i64>,
    max_age_ms: i64,
) -> Vec<&'a Event> {
    events
        .iter()
        .copied()
        .filter(|e| {
            let age = now - e.ts;
            min_age_ms.map_or(true, |min| age >= min) && age < max_age_ms
        })
        .collect()
}

/// Number of distinct sessions in `events`.
pub fn distinct_sessions<'a, I>(events: I) -> usize
where
    I: IntoIterator<Item = &'a Event>,
{
    events
        .into_iter()
        .map(|e| e.session.as_str())
        .collect::<HashSet<_>>()
        .len()
}

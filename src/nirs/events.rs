// Discrete events derived from recording annotations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::nirs::recording::Recording;

/// One trigger occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Sample index of the onset
    pub sample: usize,

    /// Event id from the accompanying id map
    pub id: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventSummary {
    /// Events sorted by sample
    pub events: Vec<Event>,

    /// Description -> id, ids assigned 1..n in sorted description order
    pub event_ids: BTreeMap<String, u32>,
}

impl EventSummary {
    /// Number of events carrying each id
    pub fn counts(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.id).or_insert(0) += 1;
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Convert annotations to events. Annotations starting past the end
/// of the recording are dropped.
pub fn events_from_annotations(recording: &Recording) -> EventSummary {
    let mut event_ids = BTreeMap::new();
    for annotation in &recording.annotations {
        event_ids.entry(annotation.description.clone()).or_insert(0);
    }
    for (idx, id) in event_ids.values_mut().enumerate() {
        *id = idx as u32 + 1;
    }

    let n_times = recording.n_times();
    let mut events: Vec<Event> = recording
        .annotations
        .iter()
        .filter(|a| a.onset >= 0.0)
        .filter_map(|a| {
            let sample = (a.onset * recording.sfreq).round() as usize;
            if sample >= n_times {
                return None;
            }
            Some(Event {
                sample,
                id: event_ids[&a.description],
            })
        })
        .collect();
    events.sort_by_key(|e| (e.sample, e.id));

    EventSummary { events, event_ids }
}

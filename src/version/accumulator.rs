use serde::Serialize;
use tracing::debug;

use super::classifier::IncrementClassifier;
use super::semver::{Increment, SemVer};
use crate::timeline::{Event, Timeline};

/// An event together with the version it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionedEvent {
    pub version: SemVer,
    pub increment: Increment,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accumulation {
    pub start_version: SemVer,
    pub final_version: SemVer,
    pub entries: Vec<VersionedEvent>,
}

pub struct VersionAccumulator<'a> {
    classifier: &'a IncrementClassifier,
}

impl<'a> VersionAccumulator<'a> {
    pub fn new(classifier: &'a IncrementClassifier) -> Self {
        Self { classifier }
    }

    /// Increment an event applies; anything without a configured label is a patch.
    pub fn increment_for(&self, event: &Event) -> Increment {
        self.classifier.classify(event).unwrap_or(Increment::Patch)
    }

    /// Replays `timeline` from `start`, bumping once per event.
    pub fn accumulate(&self, timeline: &Timeline, start: SemVer) -> Accumulation {
        let mut version = start;
        let mut entries = Vec::with_capacity(timeline.len());

        for event in timeline {
            let increment = self.increment_for(event);
            version = version.bump(increment);
            debug!(
                "{} {} -> {}",
                event.identifier(),
                increment,
                version
            );
            entries.push(VersionedEvent {
                version,
                increment,
                event: event.clone(),
            });
        }

        Accumulation {
            start_version: start,
            final_version: version,
            entries,
        }
    }

    pub fn calculate_current_version(&self, timeline: &Timeline, start: SemVer) -> SemVer {
        timeline
            .iter()
            .fold(start, |version, event| version.bump(self.increment_for(event)))
    }
}

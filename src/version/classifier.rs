use super::semver::Increment;
use crate::config::LabelIncrementConfig;
use crate::timeline::Event;

/// Maps an event's labels to the increment it asks for.
///
/// When a pull request carries more than one configured label the highest
/// impact wins: major, then minor, then patch. Labels outside the
/// configuration are ignored.
#[derive(Debug, Clone)]
pub struct IncrementClassifier {
    labels: LabelIncrementConfig,
}

impl IncrementClassifier {
    pub fn new(labels: LabelIncrementConfig) -> Self {
        Self { labels }
    }

    /// `None` means no explicit signal; callers treat it as a patch.
    pub fn classify(&self, event: &Event) -> Option<Increment> {
        let labels = event.labels()?;
        Increment::PRIORITY
            .into_iter()
            .find(|increment| labels.contains(self.labels.label_for(*increment)))
    }
}

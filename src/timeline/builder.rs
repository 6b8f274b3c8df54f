use regex::RegexSet;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

use super::event::{CommitEvent, Event, PullRequestEvent};

/// Commit messages that never stand on their own in the history: merge commits
/// of pull requests, commits made by a previous automated release, and CI skips.
static SKIPPED_MESSAGES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^Merge pull request #",
        r"(?i)^Automated Release: v",
        r"\[ci skip\]",
        r"\[skip ci\]",
    ])
    .expect("commit filter patterns are valid")
});

/// Release-relevant events in ascending date order.
///
/// Built once per run and passed along by value; nothing caches it behind the
/// caller's back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    events: Vec<Event>,
}

impl Timeline {
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

pub struct TimelineBuilder;

impl TimelineBuilder {
    /// Merges pull requests with the commits that are not already part of one,
    /// ordered by date. Ties keep input order, pull requests first.
    pub fn build<I, S>(
        merged_prs: Vec<PullRequestEvent>,
        commits: Vec<CommitEvent>,
        pr_commit_hashes: I,
    ) -> Timeline
    where
        I: IntoIterator,
        I::Item: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let claimed: HashSet<String> = pr_commit_hashes
            .into_iter()
            .flatten()
            .map(Into::into)
            .collect();

        let total_commits = commits.len();
        let independent = Self::independent_commits(commits, &claimed);
        debug!(
            "{} of {} commits are independent of pull requests",
            independent.len(),
            total_commits
        );

        let mut events: Vec<Event> = merged_prs
            .into_iter()
            .map(Event::PullRequest)
            .chain(independent.into_iter().map(Event::Commit))
            .collect();
        events.sort_by_key(Event::date);

        Timeline { events }
    }

    /// Commits not claimed by any pull request and not produced by merges,
    /// releases or CI-skipped automation.
    pub fn independent_commits(
        commits: Vec<CommitEvent>,
        claimed: &HashSet<String>,
    ) -> Vec<CommitEvent> {
        commits
            .into_iter()
            .filter(|commit| !SKIPPED_MESSAGES.is_match(&commit.message))
            .filter(|commit| !claimed.contains(&commit.hash))
            .collect()
    }

    pub fn is_automation_message(message: &str) -> bool {
        SKIPPED_MESSAGES.is_match(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn at(day: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 10, 0, 0).unwrap()
    }

    fn pr(number: u64, day: u32) -> PullRequestEvent {
        PullRequestEvent {
            date: at(day),
            number,
            title: format!("PR {}", number),
            author: "octocat".to_string(),
            url: format!("https://github.com/acme/widgets/pull/{}", number),
            labels: BTreeSet::new(),
        }
    }

    fn commit(hash: &str, message: &str, day: u32) -> CommitEvent {
        CommitEvent {
            date: at(day),
            hash: hash.to_string(),
            message: message.to_string(),
            author: None,
            author_name: "Jane Doe".to_string(),
            url: format!("https://github.com/acme/widgets/commit/{}", hash),
        }
    }

    fn ids(timeline: &Timeline) -> Vec<String> {
        timeline.iter().map(|e| e.identifier().to_string()).collect()
    }

    #[test]
    fn test_claimed_commits_are_dropped() {
        let timeline = TimelineBuilder::build(
            vec![pr(1, 2)],
            vec![commit("aaaaaaa1", "inside pr", 1), commit("bbbbbbb2", "direct push", 3)],
            vec![vec!["aaaaaaa1"]],
        );

        assert_eq!(ids(&timeline), vec!["1", "bbbbbbb"]);
    }

    #[test]
    fn test_automation_messages_are_dropped() {
        let commits = vec![
            commit("c1", "Merge pull request #4 from acme/feature", 1),
            commit("c2", "Automated Release: v1.0.0\n\n[ci skip]", 1),
            commit("c3", "automated release: v1.0.1", 1),
            commit("c4", "Bump docs [skip ci]", 1),
            commit("c5", "Tidy [ci skip]", 1),
            commit("c6", "Fix the build", 1),
        ];

        let timeline = TimelineBuilder::build(vec![], commits, Vec::<Vec<String>>::new());

        assert_eq!(ids(&timeline), vec!["c6"]);
    }

    #[test]
    fn test_release_pattern_only_matches_at_start() {
        assert!(TimelineBuilder::is_automation_message("AUTOMATED RELEASE: v2.0.0"));
        assert!(!TimelineBuilder::is_automation_message(
            "Revert Automated Release: v2.0.0"
        ));
    }

    #[test]
    fn test_sorted_ascending_with_stable_ties() {
        let mut late = commit("ffffffff", "late", 5);
        late.date = at(5) + Duration::hours(1);
        let timeline = TimelineBuilder::build(
            vec![pr(7, 5), pr(3, 1)],
            vec![late, commit("eeeeeeee", "same instant as pr 7", 5)],
            Vec::<Vec<String>>::new(),
        );

        assert_eq!(ids(&timeline), vec!["3", "7", "eeeeeee", "fffffff"]);
    }

    #[test]
    fn test_one_empty_side_keeps_the_other() {
        let only_prs =
            TimelineBuilder::build(vec![pr(1, 1), pr(2, 2)], vec![], Vec::<Vec<String>>::new());
        assert_eq!(only_prs.len(), 2);

        let only_commits = TimelineBuilder::build(
            vec![],
            vec![commit("a1", "one", 1), commit("b2", "two", 2)],
            Vec::<Vec<String>>::new(),
        );
        assert_eq!(only_commits.len(), 2);
        assert_eq!(only_commits.events().last().map(|e| e.summary()), Some("two".to_string()));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        /// Even minutes are pull requests, odd minutes direct commits.
        fn events_at(minutes: &[i64]) -> (Vec<PullRequestEvent>, Vec<CommitEvent>) {
            let mut prs = Vec::new();
            let mut commits = Vec::new();
            for &minute in minutes {
                let date = at(1) + Duration::minutes(minute);
                if minute % 2 == 0 {
                    let mut event = pr(minute as u64 + 1, 1);
                    event.date = date;
                    prs.push(event);
                } else {
                    let mut event = commit(&format!("{:08x}", minute), "change", 1);
                    event.date = date;
                    commits.push(event);
                }
            }
            (prs, commits)
        }

        proptest! {
            #[test]
            fn prop_input_order_does_not_change_the_timeline(
                (minutes, shuffled) in proptest::collection::btree_set(0i64..10_000, 0..24)
                    .prop_map(|set| set.into_iter().collect::<Vec<_>>())
                    .prop_flat_map(|minutes| (Just(minutes.clone()), Just(minutes).prop_shuffle())),
            ) {
                let (prs, commits) = events_at(&minutes);
                let expected = TimelineBuilder::build(prs, commits, Vec::<Vec<String>>::new());
                let (prs, commits) = events_at(&shuffled);
                let actual = TimelineBuilder::build(prs, commits, Vec::<Vec<String>>::new());

                prop_assert_eq!(actual, expected);
            }

            #[test]
            fn prop_same_instant_keeps_input_order(
                numbers in Just((1u64..16).collect::<Vec<_>>()).prop_shuffle(),
                hashes in Just((1u32..8).collect::<Vec<_>>()).prop_shuffle(),
            ) {
                let prs: Vec<PullRequestEvent> = numbers.iter().map(|n| pr(*n, 9)).collect();
                let commits: Vec<CommitEvent> = hashes
                    .iter()
                    .map(|h| commit(&format!("{:x}abcdef0", h), "change", 9))
                    .collect();
                let expected: Vec<String> = numbers
                    .iter()
                    .map(u64::to_string)
                    .chain(hashes.iter().map(|h| format!("{:x}abcdef", h)))
                    .collect();

                let timeline = TimelineBuilder::build(prs, commits, Vec::<Vec<String>>::new());

                prop_assert_eq!(ids(&timeline), expected);
            }

            #[test]
            fn prop_output_sorted_for_any_input_order(
                days in proptest::collection::vec(1u32..28, 0..20),
                claimed_mask in proptest::collection::vec(any::<bool>(), 20),
            ) {
                let commits: Vec<CommitEvent> = days
                    .iter()
                    .enumerate()
                    .map(|(i, day)| commit(&format!("{:08x}", i), "change", *day))
                    .collect();
                let prs: Vec<PullRequestEvent> = days
                    .iter()
                    .rev()
                    .enumerate()
                    .map(|(i, day)| pr(i as u64 + 1, *day))
                    .collect();
                let claimed: Vec<String> = commits
                    .iter()
                    .zip(&claimed_mask)
                    .filter(|(_, claimed)| **claimed)
                    .map(|(c, _)| c.hash.clone())
                    .collect();

                let timeline = TimelineBuilder::build(prs, commits, vec![claimed.clone()]);

                prop_assert!(timeline.events().windows(2).all(|w| w[0].date() <= w[1].date()));
                for event in &timeline {
                    if let Event::Commit(c) = event {
                        prop_assert!(!claimed.contains(&c.hash));
                    }
                }
            }
        }
    }
}

//! The fold: previous aggregate + next event → new aggregate.
//!
//! Pure and deterministic. No I/O, no clock reads; the only time it uses is
//! the timestamp recorded on the event. Folding the same ordered history from
//! the empty state always yields the same aggregate, which is what lets the
//! view be rebuilt from the log at any time.

use crate::events::{JobEvent, RecordedJobEvent};
use crate::types::{Job, JobId};

/// Apply one event to the current aggregate for `key`.
///
/// - `Posted` builds a fresh aggregate under `key` and overwrites whatever was
///   there. A payload id that disagrees with the key is logged and ignored.
/// - `Updated` replaces the mutable fields of the previous aggregate and sets
///   `modified_at`. Without a previous aggregate the update is ignored and the
///   key stays absent.
/// - `Deleted` always yields `None`.
/// - `Unknown` returns `previous` unchanged.
#[must_use]
pub fn fold(key: &JobId, previous: Option<Job>, recorded: &RecordedJobEvent) -> Option<Job> {
    match &recorded.event {
        JobEvent::Posted { id, vendor_id, data } => {
            if id != key {
                tracing::warn!(key = %key, payload_id = %id, "Posted payload id differs from its key, using the key");
            }
            Some(Job::posted(key.clone(), vendor_id.clone(), data.clone(), recorded.timestamp))
        },
        JobEvent::Updated { data } => match previous {
            Some(job) => Some(job.revised(data.clone(), recorded.timestamp)),
            None => {
                tracing::warn!(key = %key, "Update for a job that does not exist, ignoring");
                None
            },
        },
        JobEvent::Deleted => None,
        JobEvent::Unknown => previous,
    }
}

/// Fold an ordered history from the empty state.
#[must_use]
pub fn replay<'a>(
    key: &JobId,
    events: impl IntoIterator<Item = &'a RecordedJobEvent>,
) -> Option<Job> {
    events
        .into_iter()
        .fold(None, |previous, recorded| fold(key, previous, recorded))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::types::{Money, PostingData, VendorId};
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600 + seconds, 0).unwrap()
    }

    fn data(title: &str) -> PostingData {
        PostingData {
            title: title.to_string(),
            description: "Math help".to_string(),
            latitude: 51.5,
            longitude: -1.1,
            payment: Money::from_cents(799),
        }
    }

    fn key() -> JobId {
        JobId::from("job-1")
    }

    fn posted(vendor: &str, title: &str, t: i64) -> RecordedJobEvent {
        RecordedJobEvent::new(
            key(),
            at(t),
            JobEvent::Posted {
                id: key(),
                vendor_id: VendorId::from(vendor),
                data: data(title),
            },
        )
    }

    fn updated(title: &str, t: i64) -> RecordedJobEvent {
        RecordedJobEvent::new(key(), at(t), JobEvent::Updated { data: data(title) })
    }

    fn deleted(t: i64) -> RecordedJobEvent {
        RecordedJobEvent::new(key(), at(t), JobEvent::Deleted)
    }

    #[test]
    fn posted_creates_aggregate_stamped_with_event_time() {
        let job = fold(&key(), None, &posted("v1", "Tutoring", 0)).unwrap();

        assert_eq!(job.id, key());
        assert_eq!(job.vendor_id, VendorId::from("v1"));
        assert_eq!(job.title, "Tutoring");
        assert_eq!(job.payment, Money::from_cents(799));
        assert_eq!(job.created_at, at(0));
        assert_eq!(job.modified_at, None);
    }

    #[test]
    fn posted_aggregate_is_identified_by_its_key() {
        let mismatched = RecordedJobEvent::new(
            key(),
            at(0),
            JobEvent::Posted {
                id: JobId::from("job-2"),
                vendor_id: VendorId::from("v1"),
                data: data("Tutoring"),
            },
        );

        let job = replay(&key(), &[mismatched, updated("Math Tutoring", 1)]).unwrap();

        assert_eq!(job.id, key());
        assert_eq!(job.title, "Math Tutoring");
    }

    #[test]
    fn updated_replaces_content_and_keeps_identity() {
        let job = replay(&key(), &[posted("v1", "Tutoring", 0), updated("Math Tutoring", 5)]).unwrap();

        assert_eq!(job.title, "Math Tutoring");
        assert_eq!(job.vendor_id, VendorId::from("v1"));
        assert_eq!(job.created_at, at(0));
        assert_eq!(job.modified_at, Some(at(5)));
    }

    #[test]
    fn deleted_tombstones() {
        let after_post = fold(&key(), None, &posted("v1", "Tutoring", 0));
        assert_eq!(fold(&key(), after_post, &deleted(1)), None);
        assert_eq!(fold(&key(), None, &deleted(1)), None);
    }

    #[test]
    fn posted_overwrites_existing_aggregate() {
        let job = replay(
            &key(),
            &[posted("v1", "Tutoring", 0), updated("Edited", 1), posted("v2", "Gardening", 2)],
        )
        .unwrap();

        assert_eq!(job.vendor_id, VendorId::from("v2"));
        assert_eq!(job.title, "Gardening");
        assert_eq!(job.created_at, at(2));
        assert_eq!(job.modified_at, None);
    }

    #[test]
    fn update_without_previous_aggregate_is_ignored() {
        assert_eq!(fold(&key(), None, &updated("Orphan", 0)), None);
        assert_eq!(replay(&key(), &[posted("v1", "T", 0), deleted(1), updated("U", 2)]), None);
    }

    #[test]
    fn unknown_event_leaves_state_unchanged() {
        let job = fold(&key(), None, &posted("v1", "Tutoring", 0));
        let unknown = RecordedJobEvent::new(key(), at(9), JobEvent::Unknown);

        assert_eq!(fold(&key(), job.clone(), &unknown), job);
        assert_eq!(fold(&key(), None, &unknown), None);
    }

    #[test]
    fn repost_after_delete_revives_key() {
        let job = replay(&key(), &[posted("v1", "A", 0), deleted(1), posted("v1", "B", 2)]).unwrap();
        assert_eq!(job.title, "B");
        assert_eq!(job.created_at, at(2));
    }

    fn arb_event() -> impl Strategy<Value = RecordedJobEvent> {
        let vendor = prop_oneof![Just("v1"), Just("v2")];
        (0u8..4, vendor, "[a-z]{1,8}", 0i64..10_000).prop_map(|(kind, vendor, title, t)| {
            match kind {
                0 => posted(vendor, &title, t),
                1 => updated(&title, t),
                2 => deleted(t),
                _ => RecordedJobEvent::new(key(), at(t), JobEvent::Unknown),
            }
        })
    }

    proptest! {
        #[test]
        fn replay_is_deterministic(events in prop::collection::vec(arb_event(), 0..40)) {
            prop_assert_eq!(replay(&key(), &events), replay(&key(), &events));
        }

        #[test]
        fn identity_and_creation_survive_updates(
            events in prop::collection::vec(arb_event(), 0..40),
        ) {
            let mut state: Option<Job> = None;
            for recorded in &events {
                let next = fold(&key(), state.clone(), recorded);
                if let (Some(before), Some(after), JobEvent::Updated { .. }) =
                    (&state, &next, &recorded.event)
                {
                    prop_assert_eq!(&before.id, &after.id);
                    prop_assert_eq!(&before.vendor_id, &after.vendor_id);
                    prop_assert_eq!(before.created_at, after.created_at);
                }
                state = next;
            }
        }

        #[test]
        fn exists_iff_last_lifecycle_event_is_posted_or_update_after_post(
            events in prop::collection::vec(arb_event(), 0..40),
        ) {
            let mut alive = false;
            for recorded in &events {
                match recorded.event {
                    JobEvent::Posted { .. } => alive = true,
                    JobEvent::Deleted => alive = false,
                    JobEvent::Updated { .. } | JobEvent::Unknown => {},
                }
            }
            prop_assert_eq!(replay(&key(), &events).is_some(), alive);
        }
    }
}

//! Release status of discovered artifacts.

use std::path::PathBuf;

use chrono::NaiveDateTime;

use coursepub_shared::{Artifact, KeyPath, Universe};

/// An artifact with a release time worth reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEntry {
    pub key_path: KeyPath,
    /// Source file of the artifact.
    pub path: PathBuf,
    pub release_time: NaiveDateTime,
}

/// Unbuilt artifacts grouped by how their release time relates to now.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    /// Ready, but released later.
    pub pending: Vec<StatusEntry>,
    /// Past the release time, yet still marked `ready: false`.
    pub overdue: Vec<StatusEntry>,
}

impl Status {
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.overdue.is_empty()
    }
}

/// Classify the unbuilt artifacts of `universe` against `now`.
///
/// A publication's `ready` and `release_time` carry over to its artifacts:
/// an artifact is ready only if its publication is, and is released no
/// earlier than it.
pub fn status(universe: &Universe, now: NaiveDateTime) -> Status {
    let mut status = Status::default();

    for (key_path, publication) in universe.publications() {
        for (key, artifact) in &publication.artifacts {
            let Artifact::Unbuilt(artifact) = artifact else {
                continue;
            };
            let Some(release_time) = publication.release_time.max(artifact.release_time) else {
                continue;
            };

            let ready = publication.ready && artifact.ready;
            let entry = || StatusEntry {
                key_path: key_path.artifact(key.as_str()),
                path: artifact.source_path(),
                release_time,
            };

            if ready && release_time > now {
                status.pending.push(entry());
            } else if !ready && release_time <= now {
                status.overdue.push(entry());
            }
        }
    }

    status
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;
    use coursepub_shared::{Collection, Metadata, Publication, PublicationSchema, UnbuiltArtifact};

    use super::*;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 9, day)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    fn artifact(key: &str, release_day: Option<u32>, ready: bool) -> (String, Artifact) {
        let mut artifact = UnbuiltArtifact::new(key, "/src/homeworks/01");
        artifact.release_time = release_day.map(at);
        artifact.ready = ready;
        (key.to_string(), Artifact::Unbuilt(artifact))
    }

    fn universe(publication: Publication) -> Universe {
        let mut collection = Collection::new(PublicationSchema::permissive());
        collection.publications.insert("01".into(), publication);
        Universe::new(BTreeMap::from([("homeworks".to_string(), collection)]))
    }

    fn keys(entries: &[StatusEntry]) -> Vec<String> {
        entries.iter().map(|e| e.key_path.to_string()).collect()
    }

    #[test]
    fn pending_and_overdue_artifacts() {
        let mut publication = Publication::new(Metadata::new());
        publication.artifacts = BTreeMap::from([
            artifact("homework.pdf", None, true),
            artifact("solution.pdf", Some(10), true),
            artifact("rubric.pdf", Some(2), false),
            artifact("draft.pdf", Some(10), false),
            artifact("notes.pdf", Some(2), true),
        ]);

        let status = status(&universe(publication), at(5));

        assert_eq!(keys(&status.pending), ["homeworks/01/solution.pdf"]);
        assert_eq!(keys(&status.overdue), ["homeworks/01/rubric.pdf"]);
        assert_eq!(status.pending[0].release_time, at(10));
        assert_eq!(
            status.pending[0].path,
            PathBuf::from("/src/homeworks/01/solution.pdf")
        );
    }

    #[test]
    fn publication_settings_carry_over() {
        let mut publication = Publication::new(Metadata::new());
        publication.ready = false;
        publication.release_time = Some(at(3));
        publication.artifacts = BTreeMap::from([
            artifact("homework.pdf", None, true),
            artifact("solution.pdf", Some(8), true),
        ]);

        let status = status(&universe(publication), at(5));

        assert_eq!(keys(&status.overdue), ["homeworks/01/homework.pdf"]);
        // released later than its publication, so not overdue yet
        assert!(status.pending.is_empty());
    }

    #[test]
    fn nothing_to_report() {
        let mut publication = Publication::new(Metadata::new());
        publication.artifacts = BTreeMap::from([artifact("homework.pdf", Some(1), true)]);
        assert!(status(&universe(publication), at(5)).is_empty());
    }
}

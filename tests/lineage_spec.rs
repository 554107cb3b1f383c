use chrono::{Duration, TimeZone, Utc};
use prism::models::*;
use prism::{version_id, LineageError};
use speculate2::speculate;

fn version(number: u32, parent: Option<u32>, origin: VersionOrigin) -> Version {
    Version {
        id: version_id("s1", number),
        session_id: "s1".to_string(),
        version_number: number,
        parent_version: parent,
        origin,
        schema: PromptSchema::default(),
        prompt: format!("prompt {}", number),
        diff: None,
        image_url: format!("https://img.test/{}.png", number),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
            + Duration::minutes(number as i64),
    }
}

fn generated(number: u32, input: &str) -> Version {
    version(
        number,
        None,
        VersionOrigin::Generated {
            user_input: input.to_string(),
        },
    )
}

fn feedback(number: u32, parent: u32, text: &str) -> Version {
    version(
        number,
        Some(parent),
        VersionOrigin::Feedback {
            user_feedback: text.to_string(),
        },
    )
}

fn record(number: u32, id: &str, parent_id: Option<&str>) -> VersionRecord {
    VersionRecord {
        id: id.to_string(),
        session_id: "s1".to_string(),
        version_number: number,
        parent_version_id: parent_id.map(str::to_string),
        user_input: parent_id.is_none().then(|| "a red circle".to_string()),
        user_feedback: parent_id.map(|_| format!("edit {}", number)),
        schema: PromptSchema::default(),
        prompt: format!("prompt {}", number),
        diff: None,
        image_url: format!("https://img.test/{}.png", number),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
            + Duration::minutes(number as i64),
    }
}

fn history(versions: Vec<VersionRecord>) -> SessionHistory {
    SessionHistory {
        session_id: "s1".to_string(),
        name: None,
        description: None,
        created_at: None,
        updated_at: None,
        versions,
    }
}

speculate! {
    before {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut session = Session::new("s1", created);
    }

    describe "append" {
        it "accepts a generated root as the first version" {
            session.append(generated(1, "a red circle")).expect("root rejected");

            assert_eq!(session.versions.len(), 1);
            assert!(session.versions[0].is_root());
            assert_eq!(session.versions[0].id, "s1-v1");
        }

        it "rejects a first version that names a parent" {
            let err = session.append(feedback(1, 7, "blue")).unwrap_err();
            assert_eq!(err, LineageError::RootWithParent { version: 1 });
            assert!(session.versions.is_empty());
        }

        it "rejects numbers that do not increase" {
            session.append(generated(2, "a")).unwrap();
            let err = session.append(feedback(2, 2, "b")).unwrap_err();
            assert_eq!(err, LineageError::NotMonotonic { version: 2, latest: 2 });

            let err = session.append(feedback(1, 2, "b")).unwrap_err();
            assert_eq!(err, LineageError::NotMonotonic { version: 1, latest: 2 });
            assert_eq!(session.versions.len(), 1);
        }

        it "rejects a parent that is not in the session" {
            session.append(generated(1, "a")).unwrap();
            let err = session.append(feedback(2, 5, "b")).unwrap_err();
            assert_eq!(err, LineageError::DanglingParent { version: 2, parent: 5 });
        }

        it "rejects versions of another session" {
            let mut foreign = generated(1, "a");
            foreign.session_id = "other".to_string();
            let err = session.append(foreign).unwrap_err();
            assert!(matches!(err, LineageError::ForeignVersion { version: 1, .. }));
        }

        it "allows a second root from a later generation" {
            session.append(generated(1, "a")).unwrap();
            session.append(generated(2, "b")).unwrap();
            assert_eq!(session.tree().len(), 2);
        }

        it "advances updated_at to the newest version" {
            session.append(generated(1, "a")).unwrap();
            session.append(feedback(2, 1, "b")).unwrap();
            assert_eq!(session.updated_at, created + Duration::minutes(2));
        }

        it "never touches existing versions" {
            session.append(generated(1, "a")).unwrap();
            let before = session.versions[0].clone();
            session.append(feedback(2, 1, "b")).unwrap();
            session.append(version(3, Some(1), VersionOrigin::Rollback)).unwrap();
            assert_eq!(session.versions[0], before);
        }
    }

    describe "navigation" {
        before {
            session.append(generated(1, "a red circle")).unwrap();
            session.append(feedback(2, 1, "make it blue")).unwrap();
            session.append(version(3, Some(1), VersionOrigin::Rollback)).unwrap();
            session.append(feedback(4, 2, "thicker outline")).unwrap();
        }

        it "lists children in arrival order" {
            let kids: Vec<u32> = session.children(1).map(|v| v.version_number).collect();
            assert_eq!(kids, vec![2, 3]);
        }

        it "walks ancestry back to the root" {
            assert_eq!(session.ancestry(4), vec![4, 2, 1]);
            assert_eq!(session.ancestry(3), vec![3, 1]);
        }

        it "reports the latest appended version" {
            assert_eq!(session.latest().map(|v| v.version_number), Some(4));
        }

        it "derives parent ids from the session and parent number" {
            let v4 = session.version(4).unwrap();
            assert_eq!(v4.parent_version_id().as_deref(), Some("s1-v2"));
            assert_eq!(session.version(1).unwrap().parent_version_id(), None);
        }

        it "builds a single tree rooted at version 1" {
            let tree = session.tree();
            assert_eq!(tree.len(), 1);
            assert_eq!(tree[0].version.version_number, 1);
            assert_eq!(tree[0].children.len(), 2);
            assert_eq!(tree[0].children[0].children[0].version.version_number, 4);
        }
    }

    describe "from_history" {
        it "resolves backend parent ids to version numbers" {
            let loaded = Session::from_history(history(vec![
                record(1, "uuid-a", None),
                record(2, "uuid-b", Some("uuid-a")),
                record(3, "uuid-c", Some("uuid-a")),
            ])).expect("history rejected");

            let parents: Vec<Option<u32>> =
                loaded.versions.iter().map(|v| v.parent_version).collect();
            assert_eq!(parents, vec![None, Some(1), Some(1)]);
            assert_eq!(loaded.versions[1].id, "s1-v2");
        }

        it "accepts derived parent ids" {
            let loaded = Session::from_history(history(vec![
                record(1, "uuid-a", None),
                record(2, "uuid-b", Some("s1-v1")),
            ])).unwrap();
            assert_eq!(loaded.versions[1].parent_version, Some(1));
        }

        it "orders records by version number" {
            let loaded = Session::from_history(history(vec![
                record(2, "uuid-b", Some("uuid-a")),
                record(1, "uuid-a", None),
            ])).unwrap();
            let numbers: Vec<u32> = loaded.versions.iter().map(|v| v.version_number).collect();
            assert_eq!(numbers, vec![1, 2]);
        }

        it "derives the origin from the record's text fields" {
            let mut rollback = record(2, "uuid-b", Some("uuid-a"));
            rollback.user_feedback = None;
            let loaded = Session::from_history(history(vec![
                record(1, "uuid-a", None),
                rollback,
            ])).unwrap();

            assert!(matches!(loaded.versions[0].origin, VersionOrigin::Generated { .. }));
            assert_eq!(loaded.versions[1].origin, VersionOrigin::Rollback);
        }

        it "fails on a parent id nobody owns" {
            let err = Session::from_history(history(vec![
                record(1, "uuid-a", None),
                record(2, "uuid-b", Some("uuid-z")),
            ])).unwrap_err();
            assert_eq!(err, LineageError::UnresolvedParentId {
                version: 2,
                parent_id: "uuid-z".to_string(),
            });
        }

        it "yields an empty session for an empty history" {
            let loaded = Session::from_history(history(vec![])).unwrap();
            assert_eq!(loaded.id, "s1");
            assert!(loaded.versions.is_empty());
            assert!(loaded.latest().is_none());
        }
    }
}

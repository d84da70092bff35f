mod common;

use common::remote::{MAIN, project};
use gitwire::objects::object_id::ObjectId;
use gitwire::objects::reference::Ref;
use gitwire::{Client, GitError, MemoryRemote, error_kind};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
#[tokio::test]
async fn ref_lifecycle(project: (MemoryRemote, ObjectId)) {
    let (remote, head) = project;
    let client = Client::new(remote.clone());
    let feature = "refs/heads/feature";

    client.create_ref(Ref::new(feature.to_string(), head)).await.unwrap();
    let heads = client.list_refs(Some("refs/heads/")).await.unwrap();
    let mut names = heads.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
    names.sort();
    assert_eq!(names, vec![feature, MAIN]);

    client.delete_ref(feature).await.unwrap();
    let err = client.get_ref(feature).await.unwrap_err();
    assert!(matches!(error_kind(&err), Some(GitError::RefNotFound { .. })));
    assert_eq!(remote.ref_hash(MAIN), Some(head));
}

#[rstest]
#[case("")]
#[case("refs/heads/has space")]
#[case("refs/heads/double..dot")]
#[case("refs/heads/trailing.lock")]
#[tokio::test]
async fn malformed_names_are_rejected(project: (MemoryRemote, ObjectId), #[case] name: &str) {
    let (remote, head) = project;
    let client = Client::new(remote.clone());
    let pushes = remote.push_count();

    let err = client.create_ref(Ref::new(name.to_string(), head)).await.unwrap_err();

    assert!(matches!(
        error_kind(&err),
        Some(GitError::EmptyRefName | GitError::InvalidRefName { .. })
    ));
    assert_eq!(remote.push_count(), pushes);
}

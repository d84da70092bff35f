mod common;

use common::remote::{MAIN, author, open_writer, project};
use gitwire::objects::object_id::ObjectId;
use gitwire::{Client, GitError, MemoryRemote, error_kind};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
#[tokio::test]
async fn pushed_commit_reproduces_the_staged_view(project: (MemoryRemote, ObjectId)) {
    let (remote, head) = project;
    let client = Client::new(remote.clone());
    let mut writer = open_writer(&client, head).await;

    writer.create_blob("src/new.go", "package main\n\nfunc x() {}\n").unwrap();
    writer.update_blob("README.md", "# project, revised\n").unwrap();
    writer.delete_blob("docs/guide.md").unwrap();
    writer.move_blob("vendor/lib/x.go", "third_party/x.go").unwrap();
    let commit = writer.commit("rework layout", &author(), &author()).unwrap();
    writer.push().await.unwrap();

    let listing = client.get_flat_tree(commit.hash).await.unwrap();
    let paths = listing.entries.iter().map(|e| e.path.as_str()).collect::<Vec<_>>();
    assert_eq!(
        paths,
        vec![
            "README.md",
            "src",
            "src/main.go",
            "src/new.go",
            "src/util",
            "src/util/strings.go",
            "third_party",
            "third_party/x.go",
        ]
    );

    // no directory is left without a file below it
    for directory in listing.entries.iter().filter(|e| e.is_tree()) {
        let prefix = format!("{}/", directory.path);
        assert!(listing.files().any(|file| file.path.starts_with(&prefix)));
    }

    let readme = client.get_blob_by_path(commit.tree, "README.md").await.unwrap();
    assert_eq!(readme.as_str(), Some("# project, revised\n"));
    let moved = client.get_blob_by_path(commit.tree, "third_party/x.go").await.unwrap();
    assert_eq!(moved.as_str(), Some("package lib\n"));
    assert_eq!(remote.ref_hash(MAIN), Some(commit.hash));
    assert_eq!(remote.push_count(), 1);
}

#[rstest]
#[tokio::test]
async fn files_staged_in_one_directory_rebuild_it_once(project: (MemoryRemote, ObjectId)) {
    let (remote, head) = project;
    let client = Client::new(remote);
    let mut writer = open_writer(&client, head).await;

    for i in 0..10 {
        writer
            .create_blob(&format!("pkg/file{i:02}.go"), format!("package pkg // {i}\n"))
            .unwrap();
    }
    writer.commit("add pkg", &author(), &author()).unwrap();

    assert_eq!(writer.tree_builds(), 2);
}

#[rstest]
#[tokio::test]
async fn nested_changes_rebuild_each_ancestor_once(project: (MemoryRemote, ObjectId)) {
    let (remote, head) = project;
    let client = Client::new(remote);
    let mut writer = open_writer(&client, head).await;

    writer.update_blob("src/util/strings.go", "package util // v2\n").unwrap();
    writer.create_blob("src/util/numbers.go", "package util\n").unwrap();
    writer.update_blob("src/main.go", "package main // v2\n").unwrap();
    writer.commit("touch src", &author(), &author()).unwrap();

    // src/util, src and the root
    assert_eq!(writer.tree_builds(), 3);
}

#[rstest]
#[tokio::test]
async fn several_commits_go_out_in_one_push(project: (MemoryRemote, ObjectId)) {
    let (remote, head) = project;
    let client = Client::new(remote.clone());
    let mut writer = open_writer(&client, head).await;

    writer.create_blob("one.txt", "1").unwrap();
    let first = writer.commit("one", &author(), &author()).unwrap();
    writer.create_blob("two.txt", "2").unwrap();
    let second = writer.commit("two", &author(), &author()).unwrap();
    writer.push().await.unwrap();

    let fetched = client.get_commit(second.hash).await.unwrap();
    assert_eq!(fetched.parent, first.hash);
    assert_eq!(client.get_commit(first.hash).await.unwrap().parent, head);
    assert_eq!(remote.push_count(), 1);
}

#[rstest]
#[tokio::test]
async fn writer_keeps_working_after_a_push(project: (MemoryRemote, ObjectId)) {
    let (remote, head) = project;
    let client = Client::new(remote.clone());
    let mut writer = open_writer(&client, head).await;

    writer.create_blob("a.txt", "a").unwrap();
    writer.commit("a", &author(), &author()).unwrap();
    writer.push().await.unwrap();

    writer.delete_tree("docs").unwrap();
    let second = writer.commit("drop docs", &author(), &author()).unwrap();
    writer.push().await.unwrap();

    assert_eq!(remote.ref_hash(MAIN), Some(second.hash));
    let err = client.get_tree_by_path(second.tree, "docs").await.unwrap_err();
    assert!(matches!(error_kind(&err), Some(GitError::PathNotFound { .. })));
}

#[rstest]
#[tokio::test]
async fn stale_session_cannot_overwrite_the_remote(project: (MemoryRemote, ObjectId)) {
    let (remote, head) = project;
    let client = Client::new(remote.clone());
    let mut first = open_writer(&client, head).await;
    let mut second = open_writer(&client, head).await;

    first.create_blob("first.txt", "1").unwrap();
    let winner = first.commit("first", &author(), &author()).unwrap();
    first.push().await.unwrap();

    second.create_blob("second.txt", "2").unwrap();
    second.commit("second", &author(), &author()).unwrap();
    assert!(second.push().await.is_err());

    assert_eq!(remote.ref_hash(MAIN), Some(winner.hash));
}

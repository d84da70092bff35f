use chrono::{DateTime, FixedOffset};
use gitwire::objects::commit::Author;
use gitwire::objects::object_id::ObjectId;
use gitwire::objects::reference::Ref;
use gitwire::{Client, MemoryRemote, StagedWriter, WriterOptions};
use rstest::fixture;

pub const MAIN: &str = "refs/heads/main";

pub fn at(seconds: i64) -> DateTime<FixedOffset> {
    DateTime::from_timestamp(seconds, 0)
        .expect("timestamp in range")
        .fixed_offset()
}

pub fn author() -> Author {
    Author::new_with_timestamp("Grace Hopper", "grace@example.com", at(1_700_000_000))
}

#[fixture]
pub fn remote() -> MemoryRemote {
    MemoryRemote::new()
}

/// A repository whose `main` holds a small source tree
#[fixture]
pub fn project(remote: MemoryRemote) -> (MemoryRemote, ObjectId) {
    let head = remote
        .commit_files(
            MAIN,
            [
                ("README.md", "# project\n"),
                ("src/main.go", "package main\n"),
                ("src/util/strings.go", "package util\n"),
                ("docs/guide.md", "guide\n"),
                ("vendor/lib/x.go", "package lib\n"),
            ],
            "initial",
            at(1),
        )
        .expect("seed project");
    (remote, head)
}

/// Commit `count` snapshots on `main`, the i-th (1-based) at time `i * 100`
pub fn linear_history(remote: &MemoryRemote, count: usize) -> Vec<ObjectId> {
    (1..=count)
        .map(|i| {
            remote
                .commit_files(
                    MAIN,
                    [("CHANGELOG.md", format!("revision {i}\n"))],
                    &format!("commit {i}"),
                    at(i as i64 * 100),
                )
                .expect("seed history")
        })
        .collect()
}

pub async fn open_writer(client: &Client, head: ObjectId) -> StagedWriter {
    client
        .new_staged_writer(Ref::new(MAIN.to_string(), head), WriterOptions::default())
        .await
        .expect("open writer")
}

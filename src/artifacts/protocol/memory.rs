//! protocol::memory
//!
//! In-process [`Transport`] holding a remote's objects and refs.
//!
//! # Design
//!
//! The remote behaves like a smart HTTP server with a blob filter: a fetch
//! of a commit returns the commit (and up to `deepen` ancestors) together
//! with its trees, a fetch of a tree returns the whole subtree, and blobs
//! are only included when the blob filter is off or they are wanted
//! directly. `no_extra_objects` restricts a response to the wanted objects.
//!
//! Faults can be injected to exercise the client's retry paths:
//! objects omitted from multi-object responses, objects missing from the
//! first N responses, and 5xx answers. Every fetch is recorded.
//!
//! Clones share state, so a test can keep a handle while the client owns
//! another.

use crate::artifacts::objects::commit::Author;
use crate::artifacts::objects::entry_mode::{MODE_DIRECTORY, MODE_REGULAR};
use crate::artifacts::objects::object::PackfileObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::reference::Ref;
use crate::artifacts::objects::tree::PackfileTreeEntry;
use crate::artifacts::protocol::packfile::parse_packfile;
use crate::artifacts::protocol::pkt_line;
use crate::artifacts::protocol::transport::{
    FetchOptions, FetchResponse, PackReader, Transport, TransportError,
};
use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::AsyncReadExt;

/// In-memory remote repository
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    inner: Arc<Mutex<MemoryRemoteInner>>,
}

#[derive(Debug)]
struct MemoryRemoteInner {
    objects: HashMap<ObjectId, PackfileObject>,
    refs: BTreeMap<String, ObjectId>,
    /// Send subtrees along with wanted commits and trees
    tree_prefetch: bool,
    /// Withheld whenever a fetch wants more than one object
    omitted_from_batches: HashSet<ObjectId>,
    /// Withheld from the next N responses that want them
    flaky: HashMap<ObjectId, usize>,
    /// Statuses returned by the next fetches, in order
    failures: VecDeque<u16>,
    fetches: Vec<FetchOptions>,
    pushes: usize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        MemoryRemote {
            inner: Arc::new(Mutex::new(MemoryRemoteInner {
                objects: HashMap::new(),
                refs: BTreeMap::new(),
                tree_prefetch: true,
                omitted_from_batches: HashSet::new(),
                flaky: HashMap::new(),
                failures: VecDeque::new(),
                fetches: Vec::new(),
                pushes: 0,
            })),
        }
    }

    /// Only ever send the objects that were asked for
    pub fn without_tree_prefetch(self) -> Self {
        self.lock().tree_prefetch = false;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryRemoteInner> {
        // a panicking test thread must not hide the state from the others
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========== Seeding ==========

    pub fn insert_object(&self, object: PackfileObject) -> ObjectId {
        let id = object.hash;
        self.lock().objects.insert(id, object);
        id
    }

    pub fn set_ref(&self, name: impl Into<String>, hash: ObjectId) {
        self.lock().refs.insert(name.into(), hash);
    }

    /// Store a blob and return its id
    pub fn insert_blob(&self, content: impl Into<Bytes>) -> ObjectId {
        self.insert_object(PackfileObject::blob(content))
    }

    /// Store the nested trees for a set of files and return the root id
    ///
    /// Paths are `/`-separated and relative to the root.
    pub fn insert_tree<P, C>(
        &self,
        files: impl IntoIterator<Item = (P, u32, C)>,
    ) -> anyhow::Result<ObjectId>
    where
        P: AsRef<str>,
        C: Into<Bytes>,
    {
        let mut root = SeedDir::default();
        for (path, mode, content) in files {
            let blob = self.insert_blob(content);
            root.add_file(path.as_ref(), mode, blob)?;
        }

        self.store_dir(&root)
    }

    /// Commit a snapshot of regular files on top of `ref_name`
    ///
    /// The ref is created when missing and advanced to the new commit.
    pub fn commit_files<P, C>(
        &self,
        ref_name: &str,
        files: impl IntoIterator<Item = (P, C)>,
        message: &str,
        timestamp: DateTime<FixedOffset>,
    ) -> anyhow::Result<ObjectId>
    where
        P: AsRef<str>,
        C: Into<Bytes>,
    {
        let tree = self.insert_tree(
            files
                .into_iter()
                .map(|(path, content)| (path, MODE_REGULAR, content)),
        )?;

        Ok(self.commit_tree(ref_name, tree, message, timestamp))
    }

    /// Commit an existing tree on top of `ref_name`
    pub fn commit_tree(
        &self,
        ref_name: &str,
        tree: ObjectId,
        message: &str,
        timestamp: DateTime<FixedOffset>,
    ) -> ObjectId {
        let parents = self.ref_hash(ref_name).into_iter().collect();
        let author = Author::new_with_timestamp("Seed Author", "seed@example.com", timestamp);
        let commit = PackfileObject::commit(tree, parents, author.clone(), author, message);

        let id = self.insert_object(commit);
        self.set_ref(ref_name, id);
        id
    }

    fn store_dir(&self, dir: &SeedDir) -> anyhow::Result<ObjectId> {
        let mut entries = Vec::new();
        for (name, child) in &dir.entries {
            let entry = match child {
                SeedEntry::File { mode, hash } => PackfileTreeEntry::new(*mode, name, *hash),
                SeedEntry::Dir(sub) => {
                    PackfileTreeEntry::new(MODE_DIRECTORY, name, self.store_dir(sub)?)
                }
            };
            entries.push(entry);
        }

        Ok(self.insert_object(PackfileObject::tree(&entries)?))
    }

    // ========== Fault Injection ==========

    /// Withhold these objects from every response that wants more than one object
    pub fn omit_from_batches(&self, ids: impl IntoIterator<Item = ObjectId>) {
        self.lock().omitted_from_batches.extend(ids);
    }

    /// Withhold an object from the next `times` responses that want it
    pub fn make_flaky(&self, id: ObjectId, times: usize) {
        self.lock().flaky.insert(id, times);
    }

    /// Answer the next fetch with a server error
    pub fn fail_next_fetch(&self, status: u16) {
        self.lock().failures.push_back(status);
    }

    // ========== Inspection ==========

    pub fn ref_hash(&self, name: &str) -> Option<ObjectId> {
        self.lock().refs.get(name).copied()
    }

    pub fn object(&self, id: &ObjectId) -> Option<PackfileObject> {
        self.lock().objects.get(id).cloned()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.lock().objects.contains_key(id)
    }

    pub fn fetch_log(&self) -> Vec<FetchOptions> {
        self.lock().fetches.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetches.len()
    }

    pub fn push_count(&self) -> usize {
        self.lock().pushes
    }
}

impl MemoryRemoteInner {
    fn fetch(&mut self, options: FetchOptions) -> Result<FetchResponse, TransportError> {
        self.fetches.push(options.clone());

        if let Some(status) = self.failures.pop_front() {
            return Err(TransportError::ServerUnavailable {
                status,
                message: "injected failure".to_string(),
            });
        }

        if let Some(missing) = options.want.iter().find(|id| !self.objects.contains_key(id)) {
            return Err(TransportError::NotOurRef(*missing));
        }

        let batch = options.want.len() > 1;
        let mut response = FetchResponse::new();
        let mut skipped = HashSet::new();

        for want in &options.want {
            if batch && self.omitted_from_batches.contains(want) {
                skipped.insert(*want);
                continue;
            }
            if let Some(remaining) = self.flaky.get_mut(want)
                && *remaining > 0
            {
                *remaining -= 1;
                skipped.insert(*want);
                continue;
            }
            if let Some(object) = self.objects.get(want) {
                response.insert(*want, object.clone());
            }
        }

        if !options.no_extra_objects {
            for want in &options.want {
                self.add_reachable(*want, &options, batch, &mut response);
            }
        }
        // a withheld want must not sneak back in as a reachable object
        for id in skipped {
            response.remove(&id);
        }

        Ok(response)
    }

    fn add_reachable(
        &self,
        want: ObjectId,
        options: &FetchOptions,
        batch: bool,
        response: &mut FetchResponse,
    ) {
        let Some(object) = self.objects.get(&want) else {
            return;
        };

        match object.object_type {
            ObjectType::Commit => {
                let depth = if options.deepen == 0 { usize::MAX } else { options.deepen };
                let mut current = Some(want);
                let mut walked = 0;

                while let Some(id) = current
                    && walked < depth
                {
                    let Some(commit) = self.objects.get(&id) else { break };
                    self.add_extra(commit, batch, response);
                    if let Some(payload) = &commit.commit {
                        if self.tree_prefetch {
                            self.add_subtree(payload.tree, options, batch, response);
                        }
                        current = payload.parents.first().copied();
                    } else {
                        current = None;
                    }
                    walked += 1;
                }
            }
            ObjectType::Tree if self.tree_prefetch => {
                self.add_subtree(want, options, batch, response);
            }
            _ => {}
        }
    }

    fn add_subtree(
        &self,
        tree: ObjectId,
        options: &FetchOptions,
        batch: bool,
        response: &mut FetchResponse,
    ) {
        let mut stack = vec![tree];
        while let Some(id) = stack.pop() {
            let Some(object) = self.objects.get(&id) else { continue };
            self.add_extra(object, batch, response);

            for entry in &object.tree {
                match entry.object_type() {
                    ObjectType::Tree => stack.push(entry.hash),
                    ObjectType::Blob if options.no_blob_filter => {
                        if let Some(blob) = self.objects.get(&entry.hash) {
                            self.add_extra(blob, batch, response);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn add_extra(&self, object: &PackfileObject, batch: bool, response: &mut FetchResponse) {
        let withheld = (batch && self.omitted_from_batches.contains(&object.hash))
            || self.flaky.get(&object.hash).is_some_and(|remaining| *remaining > 0);

        if !withheld {
            response.entry(object.hash).or_insert_with(|| object.clone());
        }
    }

    fn receive_pack(&mut self, request: &[u8]) -> anyhow::Result<()> {
        self.pushes += 1;

        let (commands, offset) = pkt_line::decode_until_flush(request)?;
        let updates = commands
            .iter()
            .map(|line| parse_command(line))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let pack = &request[offset..];
        if !pack.is_empty() {
            for object in parse_packfile(pack).context("parse pushed packfile")? {
                self.objects.entry(object.hash).or_insert(object);
            }
        }

        // check every command before applying any of them
        for (old, new, name) in &updates {
            let current = self.refs.get(name).copied().unwrap_or(ObjectId::ZERO);
            let reason = if current != *old {
                Some(format!("expected {old}, ref is at {current}"))
            } else if !new.is_zero() && !self.objects.contains_key(new) {
                Some(format!("missing object {new}"))
            } else {
                None
            };

            if let Some(reason) = reason {
                return Err(TransportError::Rejected {
                    ref_name: name.clone(),
                    reason,
                }
                .into());
            }
        }

        for (_, new, name) in updates {
            if new.is_zero() {
                self.refs.remove(&name);
            } else {
                self.refs.insert(name, new);
            }
        }

        Ok(())
    }
}

fn parse_command(line: &[u8]) -> anyhow::Result<(ObjectId, ObjectId, String)> {
    let line = std::str::from_utf8(line).context("ref command is not UTF-8")?;
    let line = line.split('\0').next().unwrap_or_default().trim_end_matches('\n');

    let mut parts = line.splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(old), Some(new), Some(name)) => Ok((
            ObjectId::try_parse(old)?,
            ObjectId::try_parse(new)?,
            name.to_string(),
        )),
        _ => Err(TransportError::Protocol(format!("malformed ref command {line:?}")).into()),
    }
}

#[async_trait]
impl Transport for MemoryRemote {
    async fn ls_refs(&self, prefix: Option<&str>) -> anyhow::Result<Vec<Ref>> {
        let refs = self
            .lock()
            .refs
            .iter()
            .filter(|(name, _)| prefix.is_none_or(|prefix| name.starts_with(prefix)))
            .map(|(name, hash)| Ref::new(name.clone(), *hash))
            .collect();

        Ok(refs)
    }

    async fn fetch(&self, options: FetchOptions) -> anyhow::Result<FetchResponse> {
        Ok(self.lock().fetch(options)?)
    }

    async fn receive_pack(&self, mut pack: PackReader) -> anyhow::Result<()> {
        let mut request = Vec::new();
        pack.read_to_end(&mut request)
            .await
            .context("read receive-pack request")?;

        self.lock().receive_pack(&request)
    }
}

/// Directory under construction while seeding
#[derive(Debug, Default)]
struct SeedDir {
    entries: BTreeMap<String, SeedEntry>,
}

#[derive(Debug)]
enum SeedEntry {
    File { mode: u32, hash: ObjectId },
    Dir(SeedDir),
}

impl SeedDir {
    fn add_file(&mut self, path: &str, mode: u32, hash: ObjectId) -> anyhow::Result<()> {
        match path.split_once('/') {
            None => {
                self.entries
                    .insert(path.to_string(), SeedEntry::File { mode, hash });
            }
            Some((dir, rest)) => {
                let child = self
                    .entries
                    .entry(dir.to_string())
                    .or_insert_with(|| SeedEntry::Dir(SeedDir::default()));
                match child {
                    SeedEntry::Dir(sub) => sub.add_file(rest, mode, hash)?,
                    SeedEntry::File { .. } => {
                        anyhow::bail!("{dir} is a file and cannot contain {rest}")
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(seconds: i64) -> DateTime<FixedOffset> {
        DateTime::from_timestamp(seconds, 0).unwrap().fixed_offset()
    }

    fn seeded() -> (MemoryRemote, ObjectId) {
        let remote = MemoryRemote::new();
        let commit = remote
            .commit_files(
                "refs/heads/main",
                [("README.md", "hi"), ("src/lib.rs", "fn x() {}")],
                "initial",
                at(1_700_000_000),
            )
            .unwrap();
        (remote, commit)
    }

    #[tokio::test]
    async fn commit_fetch_includes_trees_but_not_blobs() {
        let (remote, commit) = seeded();

        let response = remote.fetch(FetchOptions::want(vec![commit]).deepen(1)).await.unwrap();

        let types = response.values().map(|o| o.object_type).collect::<Vec<_>>();
        assert_eq!(types.iter().filter(|t| **t == ObjectType::Tree).count(), 2);
        assert!(!types.contains(&ObjectType::Blob));
    }

    #[tokio::test]
    async fn unknown_wants_are_not_our_ref() {
        let (remote, _) = seeded();
        let unknown = ObjectId::hash_object("blob", b"nope");

        let err = remote.fetch(FetchOptions::want(vec![unknown])).await.unwrap_err();

        assert_eq!(
            err.downcast_ref::<TransportError>(),
            Some(&TransportError::NotOurRef(unknown))
        );
    }

    #[tokio::test]
    async fn omitted_objects_only_vanish_from_batches() {
        let remote = MemoryRemote::new();
        let a = remote.insert_blob("a");
        let b = remote.insert_blob("b");
        remote.omit_from_batches([a]);

        let batch = remote.fetch(FetchOptions::want(vec![a, b])).await.unwrap();
        let single = remote.fetch(FetchOptions::want(vec![a])).await.unwrap();

        assert!(!batch.contains_key(&a) && batch.contains_key(&b));
        assert!(single.contains_key(&a));
    }

    #[tokio::test]
    async fn flaky_objects_recover() {
        let remote = MemoryRemote::new();
        let a = remote.insert_blob("a");
        remote.make_flaky(a, 1);

        assert!(remote.fetch(FetchOptions::want(vec![a])).await.unwrap().is_empty());
        assert!(remote.fetch(FetchOptions::want(vec![a])).await.unwrap().contains_key(&a));
    }

    #[tokio::test]
    async fn ls_refs_filters_by_prefix() {
        let (remote, commit) = seeded();
        remote.set_ref("refs/tags/v1", commit);

        let refs = remote.ls_refs(Some("refs/tags/")).await.unwrap();

        assert_eq!(refs, vec![Ref::new("refs/tags/v1".to_string(), commit)]);
    }

    #[test]
    fn seeding_rejects_files_used_as_directories() {
        let remote = MemoryRemote::new();

        assert!(
            remote
                .insert_tree([("a", MODE_REGULAR, "x"), ("a/b", MODE_REGULAR, "y")])
                .is_err()
        );
    }
}

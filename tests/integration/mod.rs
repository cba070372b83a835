//! Integration tests for snapwatch
//!
//! Real directories, real stores, and a scripted listener standing in for
//! the ingestion pipeline. Also hosts the test harness and the in-memory
//! WebDAV fake shared with the other suites.

use ::snapwatch::*;
use filetime::{set_file_mtime, FileTime};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

/// How the scripted listener resolves completions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Succeed immediately
    Succeed,
    /// Fail immediately
    Fail,
    /// Keep the completion until the test releases it
    Hold,
    /// Drop the completion without resolving it
    Drop,
}

/// Listener that records events and resolves completions per [`Mode`]
pub struct ScriptedListener {
    mode: Mutex<Mode>,
    events: Mutex<Vec<(ChangeKind, String)>>,
    held: Mutex<Vec<(ChangedFile, Completion)>>,
    started: Mutex<usize>,
    stopped: Mutex<usize>,
}

impl ScriptedListener {
    pub fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            events: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            started: Mutex::new(0),
            stopped: Mutex::new(0),
        })
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock() = mode;
    }

    /// Drain recorded events
    pub fn take(&self) -> Vec<(ChangeKind, String)> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Drain recorded events and return the names of those of one kind
    pub fn names(&self, kind: ChangeKind) -> Vec<String> {
        self.take()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| name_of(&id))
            .collect()
    }

    /// Take the held completions without resolving them
    pub fn take_held(&self) -> Vec<(ChangedFile, Completion)> {
        std::mem::take(&mut *self.held.lock())
    }

    /// Resolve every held completion successfully
    pub fn release_all(&self) -> usize {
        let held = self.take_held();
        let count = held.len();
        for (_, completion) in held {
            completion.succeed();
        }
        count
    }

    pub fn lifecycle(&self) -> (usize, usize) {
        (*self.started.lock(), *self.stopped.lock())
    }

    fn handle(&self, file: ChangedFile, completion: Completion) {
        self.events.lock().push((file.kind(), file.identity().to_string()));
        let mode = *self.mode.lock();
        match mode {
            Mode::Succeed => completion.succeed(),
            Mode::Fail => completion.fail(ListenerError::rejected("scripted failure")),
            Mode::Hold => self.held.lock().push((file, completion)),
            Mode::Drop => drop(completion),
        }
    }
}

impl ChangeListener for ScriptedListener {
    fn on_start(&self, _detector: &ChangeDetector) {
        *self.started.lock() += 1;
    }

    fn on_stop(&self, _detector: &ChangeDetector) {
        *self.stopped.lock() += 1;
    }

    fn on_file_create(&self, file: ChangedFile, completion: Completion) {
        self.handle(file, completion)
    }

    fn on_file_change(&self, file: ChangedFile, completion: Completion) {
        self.handle(file, completion)
    }

    fn on_file_delete(&self, file: ChangedFile, completion: Completion) {
        self.handle(file, completion)
    }
}

/// Last path or URL segment of an identity
pub fn name_of(identity: &str) -> String {
    identity
        .trim_end_matches('/')
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(identity)
        .to_string()
}

/// A watched temp directory, a separate state directory and a detector
pub struct Harness {
    pub root_dir: TempDir,
    pub state_dir: TempDir,
    pub listener: Arc<ScriptedListener>,
    pub detector: ChangeDetector,
}

impl Harness {
    pub fn new(mode: Mode) -> Self {
        let root_dir = TempDir::new().unwrap();
        let state_dir = TempDir::new().unwrap();
        let listener = ScriptedListener::new(mode);
        let detector = Self::open_detector(root_dir.path(), state_dir.path(), &listener);
        Self {
            root_dir,
            state_dir,
            listener,
            detector,
        }
    }

    fn open_detector(root: &Path, state: &Path, listener: &Arc<ScriptedListener>) -> ChangeDetector {
        DetectorBuilder::new()
            .state_dir(state)
            .build_local(root, Arc::clone(listener) as Arc<dyn ChangeListener>)
            .unwrap()
    }

    pub fn root(&self) -> PathBuf {
        self.root_dir.path().to_path_buf()
    }

    /// Simulate a process restart: a new detector over the same state
    pub fn restart(&mut self) {
        self.detector.stop();
        self.detector = Self::open_detector(self.root_dir.path(), self.state_dir.path(), &self.listener);
    }

    /// Write a file with an explicit modification time
    pub fn write(&self, relative: &str, content: &str, mtime: i64) {
        let path = self.root_dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }
}

/// In-memory WebDAV server
#[derive(Debug, Default)]
pub struct FakeDav {
    collections: Mutex<BTreeMap<String, Vec<RemoteResource>>>,
    bodies: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Per-collection answers: `false` fails that listing call
    scripts: Mutex<BTreeMap<String, VecDeque<bool>>>,
    /// Collections that list as empty instead of their content
    blanked: Mutex<BTreeSet<String>>,
    down: Mutex<bool>,
}

impl FakeDav {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_collection(&self, url: &str) {
        self.collections.lock().entry(url.to_string()).or_default();
    }

    pub fn put_file(&self, collection: &str, name: &str, etag: &str, body: &[u8]) {
        let mut collections = self.collections.lock();
        let members = collections.entry(collection.to_string()).or_default();
        members.retain(|r| r.href != name);
        members.push(RemoteResource::file(name, Some(etag), body.len() as u64));
        self.bodies
            .lock()
            .insert(format!("{}{}", collection, name), body.to_vec());
    }

    pub fn put_subcollection(&self, collection: &str, name: &str) {
        let child = format!("{}{}/", collection, name);
        let mut collections = self.collections.lock();
        collections
            .entry(collection.to_string())
            .or_default()
            .push(RemoteResource::collection(format!("{}/", name)));
        collections.entry(child).or_default();
    }

    pub fn remove(&self, collection: &str, name: &str) {
        if let Some(members) = self.collections.lock().get_mut(collection) {
            members.retain(|r| r.href.trim_end_matches('/') != name);
        }
    }

    pub fn script(&self, collection: &str, answers: &[bool]) {
        self.scripts
            .lock()
            .entry(collection.to_string())
            .or_default()
            .extend(answers.iter().copied());
    }

    pub fn blank(&self, collection: &str, blanked: bool) {
        let mut set = self.blanked.lock();
        if blanked {
            set.insert(collection.to_string());
        } else {
            set.remove(collection);
        }
    }

    pub fn set_down(&self, down: bool) {
        *self.down.lock() = down;
    }
}

impl RemoteListing for FakeDav {
    fn list(&self, collection: &Url) -> Result<Vec<RemoteResource>> {
        if *self.down.lock() {
            return Err(WatchError::remote("connection refused"));
        }
        let key = collection.as_str().to_string();
        let answer = self
            .scripts
            .lock()
            .get_mut(&key)
            .and_then(|answers| answers.pop_front())
            .unwrap_or(true);
        if !answer {
            return Err(WatchError::remote(format!("502 listing {}", key)));
        }
        if self.blanked.lock().contains(&key) {
            return Ok(Vec::new());
        }
        self.collections
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| WatchError::remote(format!("404 {}", key)))
    }

    fn fetch(&self, resource: &Url, sink: &mut dyn Write) -> Result<u64> {
        let body = self
            .bodies
            .lock()
            .get(resource.as_str())
            .cloned()
            .ok_or_else(|| WatchError::remote(format!("404 {}", resource)))?;
        sink.write_all(&body)?;
        Ok(body.len() as u64)
    }
}

#[cfg(test)]
mod local {
    use super::*;

    #[test]
    fn test_create_change_delete() {
        let harness = Harness::new(Mode::Succeed);
        harness.write("a.txt", "one", 1_700_000_000);
        harness.write("docs/b.txt", "two", 1_700_000_000);

        harness.detector.poll();
        let mut created = harness.listener.names(ChangeKind::Create);
        created.sort();
        assert_eq!(created, vec!["a.txt".to_string(), "b.txt".to_string()]);

        harness.write("a.txt", "one more", 1_700_000_100);
        harness.detector.poll();
        assert_eq!(harness.listener.names(ChangeKind::Change), vec!["a.txt".to_string()]);

        fs::remove_dir_all(harness.root().join("docs")).unwrap();
        harness.detector.poll();
        assert_eq!(harness.listener.names(ChangeKind::Delete), vec!["b.txt".to_string()]);
        assert_eq!(harness.detector.root().count(), (1, 0));
    }

    #[test]
    fn test_idempotence() {
        let harness = Harness::new(Mode::Succeed);
        for i in 0..20 {
            harness.write(&format!("d{}/f{}.txt", i % 4, i), "x", 1_700_000_000);
        }
        harness.detector.poll();
        assert_eq!(harness.listener.take().len(), 20);

        for _ in 0..3 {
            assert!(harness.detector.poll());
            assert!(harness.listener.take().is_empty());
        }
    }

    #[test]
    fn test_commit_only_on_success() {
        let mut harness = Harness::new(Mode::Fail);
        harness.write("a.txt", "one", 1_700_000_000);
        harness.detector.poll();
        assert_eq!(harness.listener.take().len(), 1);
        assert_eq!(harness.detector.root().child_count(), 0);

        // A restart forgets failure records; the file is still new
        harness.listener.set_mode(Mode::Succeed);
        harness.restart();
        harness.detector.poll();
        assert_eq!(harness.listener.names(ChangeKind::Create), vec!["a.txt".to_string()]);
    }

    #[test]
    fn test_failure_suppression_by_mtime() {
        let harness = Harness::new(Mode::Fail);
        harness.write("bad.pdf", "broken", 1_700_000_000);
        harness.detector.poll();
        assert_eq!(harness.listener.take().len(), 1);

        // Unchanged modification time: zero dispatches
        harness.detector.poll();
        harness.detector.poll();
        assert!(harness.listener.take().is_empty());

        // New modification time: exactly one dispatch
        harness.listener.set_mode(Mode::Succeed);
        harness.write("bad.pdf", "fixed", 1_700_000_500);
        harness.detector.poll();
        assert_eq!(harness.listener.take().len(), 1);
        harness.detector.poll();
        assert!(harness.listener.take().is_empty());
        assert_eq!(harness.detector.failed_count(), 0);
    }

    #[test]
    fn test_failed_change_then_delete_is_reported() {
        let harness = Harness::new(Mode::Succeed);
        harness.write("a.txt", "v1", 1_700_000_000);
        harness.detector.poll();
        harness.listener.take();

        harness.listener.set_mode(Mode::Fail);
        harness.write("a.txt", "v2", 1_700_000_100);
        harness.detector.poll();
        assert_eq!(harness.detector.failed(), vec![harness.root().join("a.txt").to_string_lossy().into_owned()]);
        harness.listener.take();

        harness.listener.set_mode(Mode::Succeed);
        fs::remove_file(harness.root().join("a.txt")).unwrap();
        harness.detector.poll();
        assert_eq!(harness.listener.names(ChangeKind::Delete), vec!["a.txt".to_string()]);
        assert_eq!(harness.detector.failed_count(), 0);
        assert_eq!(harness.detector.root().child_count(), 0);
    }

    #[test]
    fn test_async_acknowledgement_from_worker_thread() {
        let harness = Harness::new(Mode::Hold);
        for i in 0..5 {
            harness.write(&format!("f{}.txt", i), "x", 1_700_000_000);
        }
        assert!(harness.detector.poll());
        assert!(!harness.detector.poll());

        let held = harness.listener.take_held();
        let worker = std::thread::spawn(move || {
            for (file, completion) in held {
                assert!(file.local_path().unwrap().exists());
                completion.succeed();
            }
        });
        assert!(harness.detector.wait_idle(Duration::from_secs(5)));
        worker.join().unwrap();

        assert_eq!(harness.detector.root().child_count(), 5);
        assert!(harness.detector.poll());
    }

    #[test]
    fn test_ignore_patterns() {
        let root_dir = TempDir::new().unwrap();
        let listener = ScriptedListener::new(Mode::Succeed);
        let detector = DetectorBuilder::new()
            .ignore_patterns(vec!["*.part".to_string(), "tmp/".to_string()])
            .store(Arc::new(MemoryStore::new()))
            .build_local(root_dir.path(), Arc::clone(&listener) as Arc<dyn ChangeListener>)
            .unwrap();

        fs::write(root_dir.path().join("keep.pdf"), "x").unwrap();
        fs::write(root_dir.path().join("upload.part"), "x").unwrap();
        fs::create_dir(root_dir.path().join("tmp")).unwrap();
        fs::write(root_dir.path().join("tmp/scratch.pdf"), "x").unwrap();

        detector.poll();
        assert_eq!(listener.names(ChangeKind::Create), vec!["keep.pdf".to_string()]);
    }

    #[test]
    fn test_lifecycle_callbacks() {
        let mut harness = Harness::new(Mode::Succeed);
        assert_eq!(harness.listener.lifecycle(), (1, 0));
        harness.restart();
        assert_eq!(harness.listener.lifecycle(), (2, 1));
        harness.detector.stop();
        harness.detector.stop();
        assert_eq!(harness.listener.lifecycle(), (2, 2));
    }

    #[test]
    fn test_missing_root_fails_open() {
        let temp_dir = TempDir::new().unwrap();
        let listener = ScriptedListener::new(Mode::Succeed);
        let result = DetectorBuilder::new().build_local(temp_dir.path().join("gone"), listener);
        assert!(matches!(result, Err(WatchError::RootUnavailable { .. })));
    }
}

#[cfg(test)]
mod remote {
    use super::*;

    const ROOT: &str = "https://dav.example.com/inbox/";

    fn open(dav: &Arc<FakeDav>, store: &Arc<MemoryStore>, listener: &Arc<ScriptedListener>) -> ChangeDetector {
        DetectorBuilder::new()
            .store(Arc::clone(store) as Arc<dyn PersistentStore>)
            .build_remote(
                Url::parse(ROOT).unwrap(),
                Arc::clone(dav),
                Arc::clone(listener) as Arc<dyn ChangeListener>,
            )
            .unwrap()
    }

    #[test]
    fn test_remote_create_change_delete() {
        let dav = FakeDav::new();
        dav.put_collection(ROOT);
        dav.put_file(ROOT, "a.pdf", "\"1\"", b"AAAA");
        dav.put_subcollection(ROOT, "sub");
        dav.put_file(&format!("{}sub/", ROOT), "b.pdf", "\"1\"", b"BB");

        let store = Arc::new(MemoryStore::new());
        let listener = ScriptedListener::new(Mode::Succeed);
        let detector = open(&dav, &store, &listener);

        detector.poll();
        let mut created = listener.names(ChangeKind::Create);
        created.sort();
        assert_eq!(created, vec!["a.pdf".to_string(), "b.pdf".to_string()]);

        // Same length, new entity tag
        dav.put_file(ROOT, "a.pdf", "\"2\"", b"CCCC");
        detector.poll();
        assert_eq!(listener.names(ChangeKind::Change), vec!["a.pdf".to_string()]);

        dav.remove(ROOT, "sub");
        detector.poll();
        assert_eq!(listener.names(ChangeKind::Delete), vec!["b.pdf".to_string()]);
        assert_eq!(detector.root().count(), (1, 0));
    }

    #[test]
    fn test_remote_content_fetched_and_released() {
        let dav = FakeDav::new();
        dav.put_collection(ROOT);
        dav.put_file(ROOT, "report%20q1.pdf", "\"1\"", b"%PDF-1.7");

        let store = Arc::new(MemoryStore::new());
        let listener = ScriptedListener::new(Mode::Hold);
        let detector = open(&dav, &store, &listener);
        detector.poll();

        let mut held = listener.take_held();
        assert_eq!(held.len(), 1);
        let (file, completion) = held.remove(0);
        assert_eq!(file.identity(), "https://dav.example.com/inbox/report%20q1.pdf");

        let path = file.local_path().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-1.7");
        completion.succeed();
        assert!(!path.exists());
        assert!(detector.wait_idle(Duration::from_secs(1)));
    }

    #[test]
    fn test_remote_content_released_on_failure() {
        let dav = FakeDav::new();
        dav.put_collection(ROOT);
        dav.put_file(ROOT, "a.pdf", "\"1\"", b"rejected");
        dav.put_file(ROOT, "b.pdf", "\"1\"", b"abandoned");

        let store = Arc::new(MemoryStore::new());
        let listener = ScriptedListener::new(Mode::Hold);
        let detector = open(&dav, &store, &listener);
        detector.poll();

        let mut held = listener.take_held();
        assert_eq!(held.len(), 2);
        let (dropped_file, dropped) = held.remove(1);
        let (failed_file, failed) = held.remove(0);

        let failed_path = failed_file.local_path().unwrap();
        assert_eq!(fs::read(&failed_path).unwrap(), b"rejected");
        failed.fail(ListenerError::rejected("cannot parse"));
        assert!(!failed_path.exists());

        let dropped_path = dropped_file.local_path().unwrap();
        assert!(dropped_path.exists());
        drop(dropped);
        assert!(!dropped_path.exists());

        assert!(detector.wait_idle(Duration::from_secs(1)));
        assert_eq!(detector.failed_count(), 2);
        assert_eq!(detector.root().child_count(), 0);
    }

    #[test]
    fn test_remote_failed_file_retried_on_new_etag() {
        let dav = FakeDav::new();
        dav.put_collection(ROOT);
        dav.put_file(ROOT, "a.pdf", "\"v1\"", b"AAAA");

        let store = Arc::new(MemoryStore::new());
        let listener = ScriptedListener::new(Mode::Fail);
        let detector = open(&dav, &store, &listener);
        detector.poll();
        assert_eq!(listener.take().len(), 1);
        assert_eq!(detector.failed(), vec![format!("{}a.pdf", ROOT)]);

        // No modification time from the server; the unchanged entity tag
        // keeps the file suppressed
        detector.poll();
        assert!(listener.take().is_empty());
        assert_eq!(detector.last_summary().unwrap().suppressed, 1);

        // New entity tag, same length: dispatched again
        listener.set_mode(Mode::Succeed);
        dav.put_file(ROOT, "a.pdf", "\"v2\"", b"BBBB");
        detector.poll();
        assert_eq!(listener.names(ChangeKind::Create), vec!["a.pdf".to_string()]);
        assert_eq!(detector.failed_count(), 0);
        assert_eq!(detector.root().child_count(), 1);
    }

    #[test]
    fn test_remote_restart_resumes_from_store() {
        let dav = FakeDav::new();
        dav.put_collection(ROOT);
        dav.put_file(ROOT, "a.pdf", "\"1\"", b"A");

        let store = Arc::new(MemoryStore::new());
        let listener = ScriptedListener::new(Mode::Succeed);
        let detector = open(&dav, &store, &listener);
        detector.poll();
        listener.take();
        detector.stop();

        dav.put_file(ROOT, "b.pdf", "\"1\"", b"B");
        let detector = open(&dav, &store, &listener);
        detector.poll();
        assert_eq!(listener.names(ChangeKind::Create), vec!["b.pdf".to_string()]);
    }
}

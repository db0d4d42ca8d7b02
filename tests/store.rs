mod common;

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{event, reader, writer};
use kernolog::embed::{self, Embedder, HashEmbedder};
use kernolog::event::Category;
use kernolog::store::{BatchSummary, Error, Mode, SearchOptions, Store};

#[test]
fn repeats_update_counts_and_new_templates_get_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = writer(dir.path(), Category::Error);

    let summary = store
        .add_batch(&[
            event("Disk <*> failed", &["SanDisk"], 2),
            event("Disk <*> failed", &["Kingston"], 2),
            event("thermal zone <*> critical", &["0"], 1),
        ])
        .unwrap();
    assert_eq!(
        summary,
        BatchSummary {
            occurrences: 3,
            new_templates: 2
        }
    );
    store
        .add_batch(&[event("Disk <*> failed", &["WD"], 3)])
        .unwrap();

    let disk = store.template("Disk <*> failed").unwrap().unwrap();
    assert_eq!(disk.count, 3);
    assert_eq!(disk.vector_index, 0);
    assert!(disk.last_seen > disk.first_seen);
    let thermal = store.template("thermal zone <*> critical").unwrap().unwrap();
    assert_eq!(thermal.count, 1);
    assert_eq!(thermal.vector_index, 1);
    assert_eq!(thermal.first_seen, thermal.last_seen);

    assert_eq!(store.occurrence_count().unwrap(), 4);
    assert_eq!(store.template_count().unwrap(), 2);
    assert_eq!(store.vector_count().unwrap(), 2);
}

#[test]
fn vector_indices_stay_dense_across_reopens() {
    let dir = tempfile::tempdir().unwrap();
    let templates = ["usb <*> connected", "usb <*> removed", "link <*> up", "link <*> down"];
    for pair in templates.chunks(2) {
        let mut store = writer(dir.path(), Category::Debug);
        let batch: Vec<_> = pair.iter().map(|t| event(t, &["x"], 6)).collect();
        store.add_batch(&batch).unwrap();
        store.close();
    }

    let store = writer(dir.path(), Category::Debug);
    for (i, text) in templates.iter().enumerate() {
        let template = store.template(text).unwrap().unwrap();
        assert_eq!(template.vector_index, i as i64);
    }
    assert_eq!(store.vector_count().unwrap(), 4);
    assert_eq!(store.template_count().unwrap(), 4);
}

#[test]
fn reopened_writer_knows_existing_templates() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = writer(dir.path(), Category::Warning);
    store
        .add_batch(&[event("fan <*> slow", &["1"], 4)])
        .unwrap();
    store.close();

    let mut store = writer(dir.path(), Category::Warning);
    let summary = store
        .add_batch(&[event("fan <*> slow", &["2"], 4)])
        .unwrap();
    assert_eq!(summary.new_templates, 0);
    assert_eq!(store.template("fan <*> slow").unwrap().unwrap().count, 2);
    assert_eq!(store.vector_count().unwrap(), 1);
}

#[test]
fn empty_batch_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = writer(dir.path(), Category::Error);
    assert_eq!(store.add_batch(&[]).unwrap(), BatchSummary::default());
    assert!(!dir.path().join("error.bin").exists());
    assert_eq!(store.template_count().unwrap(), 0);
    assert_eq!(store.occurrence_count().unwrap(), 0);
}

#[test]
fn categories_use_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut error = writer(dir.path(), Category::Error);
    let debug = writer(dir.path(), Category::Debug);
    error
        .add_batch(&[event("Disk <*> failed", &["SanDisk"], 2)])
        .unwrap();
    assert!(dir.path().join("error.bin").exists());
    assert!(dir.path().join("error.sqlite").exists());
    assert_eq!(debug.template_count().unwrap(), 0);
    assert_eq!(debug.vector_count().unwrap(), 0);
}

#[test]
fn reader_cannot_write() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = reader(dir.path(), Category::Error);
    match store.add_batch(&[event("x", &[], 1)]) {
        Err(Error::ReadOnly) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

/// Embedder that can be switched off to simulate a provider outage.
struct Flaky {
    inner: HashEmbedder,
    down: AtomicBool,
}

impl Embedder for Flaky {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, embed::Error> {
        if self.down.load(Ordering::SeqCst) {
            return Err(embed::Error::Inference("provider offline".to_string()));
        }
        self.inner.embed(texts)
    }
}

#[test]
fn embedding_failure_leaves_catalog_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let flaky = Arc::new(Flaky {
        inner: HashEmbedder::new(32),
        down: AtomicBool::new(true),
    });
    let mut store = Store::open(
        dir.path(),
        Category::Error,
        Mode::Writer,
        flaky.clone(),
        SearchOptions::default(),
    )
    .unwrap();

    let batch = [
        event("Disk <*> failed", &["SanDisk"], 2),
        event("Disk <*> failed", &["Kingston"], 2),
    ];
    match store.add_batch(&batch) {
        Err(Error::Embedding(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(store.template_count().unwrap(), 0);
    assert_eq!(store.occurrence_count().unwrap(), 0);
    assert_eq!(store.vector_count().unwrap(), 0);

    flaky.down.store(false, Ordering::SeqCst);
    store.add_batch(&batch).unwrap();
    let template = store.template("Disk <*> failed").unwrap().unwrap();
    assert_eq!(template.vector_index, 0);
    assert_eq!(template.count, 2);
}

/// Embedder that returns vectors of the wrong length.
struct Truncating;

impl Embedder for Truncating {
    fn dimension(&self) -> usize {
        8
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, embed::Error> {
        Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
    }
}

#[test]
fn wrong_dimension_embeddings_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = Store::open(
        dir.path(),
        Category::Debug,
        Mode::Writer,
        Arc::new(Truncating),
        SearchOptions::default(),
    )
    .unwrap();
    assert!(store.add_batch(&[event("hello", &[], 6)]).is_err());
    assert_eq!(store.vector_count().unwrap(), 0);
    assert_eq!(store.template_count().unwrap(), 0);
}

#[test]
fn partial_trailing_vector_is_ignored_and_repaired() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = writer(dir.path(), Category::Error);
    store
        .add_batch(&[event("Disk <*> failed", &["SanDisk"], 2)])
        .unwrap();
    store.close();

    let path = dir.path().join("error.bin");
    OpenOptions::new()
        .append(true)
        .open(&path)
        .unwrap()
        .write_all(&[1, 2, 3, 4, 5])
        .unwrap();

    let search = reader(dir.path(), Category::Error);
    assert_eq!(search.vector_count().unwrap(), 1);
    assert_eq!(search.search_text("disk", 5, false).unwrap().hits().len(), 1);

    let mut store = writer(dir.path(), Category::Error);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 384 * 4);
    store
        .add_batch(&[event("thermal zone <*> critical", &["0"], 1)])
        .unwrap();
    assert_eq!(store.vector_count().unwrap(), 2);
    assert_eq!(
        store
            .template("thermal zone <*> critical")
            .unwrap()
            .unwrap()
            .vector_index,
        1
    );
}

#[test]
fn uncommitted_vectors_are_dropped_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = writer(dir.path(), Category::Warning);
    store.add_batch(&[event("fan <*> slow", &["1"], 4)]).unwrap();
    store.close();

    let path = dir.path().join("warning.bin");
    OpenOptions::new()
        .append(true)
        .open(&path)
        .unwrap()
        .write_all(&vec![0_u8; 384 * 4])
        .unwrap();

    let store = writer(dir.path(), Category::Warning);
    assert_eq!(store.vector_count().unwrap(), 1);
    assert_eq!(store.template_count().unwrap(), 1);
}

#[test]
fn missing_vectors_fail_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = writer(dir.path(), Category::Warning);
    store.add_batch(&[event("fan <*> slow", &["1"], 4)]).unwrap();
    store.close();

    std::fs::remove_file(dir.path().join("warning.bin")).unwrap();
    match Store::open(
        dir.path(),
        Category::Warning,
        Mode::Writer,
        common::embedder(),
        SearchOptions::default(),
    ) {
        Err(Error::Inconsistent(_)) => {}
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("store opened without its vectors"),
    }
}

#[test]
fn failed_commit_cuts_vectors_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = writer(dir.path(), Category::Error);
    let mut second = writer(dir.path(), Category::Error);
    first
        .add_batch(&[event("Disk <*> failed", &["SanDisk"], 2)])
        .unwrap();

    // the second writer's cache does not know the template, so its insert
    // hits the unique text constraint
    match second.add_batch(&[event("Disk <*> failed", &["Kingston"], 2)]) {
        Err(Error::Query(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(second.vector_count().unwrap(), 1);
    assert_eq!(second.template_count().unwrap(), 1);
    assert_eq!(second.occurrence_count().unwrap(), 1);
    assert_eq!(first.template("Disk <*> failed").unwrap().unwrap().count, 1);
}

#[test]
fn stray_vectors_do_not_shift_new_indices() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = writer(dir.path(), Category::Debug);
    store
        .add_batch(&[event("usb <*> connected", &["1-1"], 6)])
        .unwrap();

    // records written after open without a matching commit
    OpenOptions::new()
        .append(true)
        .open(dir.path().join("debug.bin"))
        .unwrap()
        .write_all(&vec![0_u8; 2 * 384 * 4])
        .unwrap();
    assert_eq!(store.vector_count().unwrap(), 3);

    store
        .add_batch(&[event("link <*> up", &["eth0"], 6)])
        .unwrap();
    assert_eq!(store.template("link <*> up").unwrap().unwrap().vector_index, 1);
    assert_eq!(store.vector_count().unwrap(), 2);
    assert_eq!(store.template_count().unwrap(), 2);
}

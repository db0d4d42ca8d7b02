#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use kernolog::embed::{Embedder, HashEmbedder};
use kernolog::event::{Category, ProcessedEvent};
use kernolog::store::{Mode, SearchOptions, Store};

pub fn event(template: &str, params: &[&str], priority: u8) -> ProcessedEvent {
    let mut original = template.to_string();
    for p in params {
        original = original.replacen("<*>", p, 1);
    }
    ProcessedEvent {
        template: template.to_string(),
        params: params.iter().map(|p| (*p).to_string()).collect(),
        priority,
        original,
        unit: "kernel".to_string(),
    }
}

pub fn embedder() -> Arc<dyn Embedder> {
    Arc::new(HashEmbedder::default())
}

pub fn open(dir: &Path, category: Category, mode: Mode) -> Store {
    Store::open(dir, category, mode, embedder(), SearchOptions::default()).unwrap()
}

pub fn writer(dir: &Path, category: Category) -> Store {
    open(dir, category, Mode::Writer)
}

pub fn reader(dir: &Path, category: Category) -> Store {
    open(dir, category, Mode::Reader)
}

use std::sync::Arc;

use dashmap::DashMap;
use sightline_core::{DocumentFacts, FileId};
use sightline_lens::FactsSource;

/// Latest committed facts per file. Each file has a single writer: its scan job.
#[derive(Debug, Default)]
pub(crate) struct FactsStore {
    files: DashMap<FileId, Arc<DocumentFacts>>,
}

impl FactsStore {
    pub(crate) fn get(&self, file: FileId) -> Option<Arc<DocumentFacts>> {
        self.files.get(&file).map(|facts| Arc::clone(facts.value()))
    }

    pub(crate) fn insert(&self, file: FileId, facts: Arc<DocumentFacts>) {
        self.files.insert(file, facts);
    }

    pub(crate) fn remove(&self, file: FileId) -> Option<Arc<DocumentFacts>> {
        self.files.remove(&file).map(|(_, facts)| facts)
    }

    pub(crate) fn files(&self) -> Vec<FileId> {
        self.files.iter().map(|item| *item.key()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.files.len()
    }
}

impl FactsSource for FactsStore {
    fn document_facts(&self, file: FileId) -> Option<Arc<DocumentFacts>> {
        self.get(file)
    }

    fn files(&self) -> Vec<FileId> {
        FactsStore::files(self)
    }
}

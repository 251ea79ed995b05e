use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::catalog::{Catalog, CategoryId};
use crate::validate::ValidatedSpan;

/// Accepted-span counts per category, in catalog order. Zero counts are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    entries: Vec<(CategoryId, usize)>,
}

impl CategoryCounts {
    #[must_use]
    pub fn get(&self, id: &str) -> Option<usize> {
        self.entries.iter().find(|(category, _)| category.as_str() == id).map(|(_, count)| *count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CategoryId, usize)> {
        self.entries.iter().map(|(category, count)| (category, *count))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, count)| count).sum()
    }
}

impl Serialize for CategoryCounts {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer
            .collect_map(self.entries.iter().map(|(category, count)| (category.as_str(), count)))
    }
}

/// Count spans per category. Categories outside `catalog` follow the catalog entries in
/// lexicographic order.
#[must_use]
pub fn summarize(spans: &[ValidatedSpan], catalog: &Catalog) -> CategoryCounts {
    let mut counts: BTreeMap<&CategoryId, usize> = BTreeMap::new();
    for span in spans {
        *counts.entry(&span.category).or_insert(0) += 1;
    }

    let mut entries = Vec::with_capacity(counts.len());
    for category in catalog.categories() {
        if let Some(count) = counts.remove(category) {
            entries.push((category.clone(), count));
        }
    }
    entries.extend(counts.into_iter().map(|(category, count)| (category.clone(), count)));

    CategoryCounts { entries }
}

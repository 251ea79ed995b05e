use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::KernelError;

/// Declared order of the built-in catalog. Presentation order of summaries follows it.
pub const DEFAULT_CATEGORIES: [&str; 14] = [
    "NAME",
    "EMAIL",
    "PHONE",
    "ADDRESS",
    "SSN",
    "PASSPORT",
    "DOB",
    "NATIONAL_ID",
    "AADHAAR",
    "PAN",
    "DRIVERS_LICENSE",
    "CREDIT_CARD",
    "BANK_ACCOUNT",
    "IP_ADDRESS",
];

/// Canonical category identifier: `[A-Z][A-Z0-9_]*`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct CategoryId(String);

impl CategoryId {
    /// # Errors
    /// Returns [`KernelError::Validation`] when `value` is not an upper-case identifier.
    pub fn parse(value: &str) -> Result<Self, KernelError> {
        let mut chars = value.chars();
        let valid = matches!(chars.next(), Some(first) if first.is_ascii_uppercase())
            && chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_');
        if !valid {
            return Err(KernelError::Validation(format!(
                "invalid category identifier `{value}` (expected [A-Z][A-Z0-9_]*)"
            )));
        }
        Ok(Self(value.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CategoryId {
    type Error = KernelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CategoryId> for String {
    fn from(value: CategoryId) -> Self {
        value.0
    }
}

impl Display for CategoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of normalizing an oracle label.
#[derive(Debug, Clone, Serialize, Eq, PartialEq, Hash)]
#[serde(tag = "kind", content = "label", rename_all = "snake_case")]
pub enum Category {
    Known(CategoryId),
    /// Carries the label exactly as the oracle sent it.
    Unrecognized(String),
}

impl Category {
    #[must_use]
    pub fn known(&self) -> Option<&CategoryId> {
        match self {
            Self::Known(id) => Some(id),
            Self::Unrecognized(_) => None,
        }
    }

    #[must_use]
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Self::Unrecognized(_))
    }
}

/// Closed, ordered set of recognized category identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    categories: Vec<CategoryId>,
}

impl Catalog {
    /// Build a catalog from caller configuration, keeping the declared order.
    ///
    /// # Errors
    /// Returns [`KernelError::Validation`] when the list is empty, an identifier is malformed,
    /// or an identifier appears twice.
    pub fn new<I, S>(ids: I) -> Result<Self, KernelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let mut categories = Vec::new();
        for raw in ids {
            let id = CategoryId::parse(raw.as_ref().trim())?;
            if !seen.insert(id.clone()) {
                return Err(KernelError::Validation(format!(
                    "duplicate category identifier `{id}` in catalog"
                )));
            }
            categories.push(id);
        }

        if categories.is_empty() {
            return Err(KernelError::Validation("catalog must not be empty".to_string()));
        }

        Ok(Self { categories })
    }

    #[must_use]
    pub fn categories(&self) -> &[CategoryId] {
        &self.categories
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CategoryId> {
        self.categories.iter().find(|category| category.as_str() == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn position(&self, id: &CategoryId) -> Option<usize> {
        self.categories.iter().position(|category| category == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Every catalog member, used when the caller does not restrict the request.
    #[must_use]
    pub fn all(&self) -> BTreeSet<CategoryId> {
        self.categories.iter().cloned().collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES
                .iter()
                .map(|category| CategoryId((*category).to_string()))
                .collect(),
        }
    }
}

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{Catalog, Category, CategoryId};
use crate::KernelError;

/// Built-in label corrections, keyed by folded label.
pub const DEFAULT_CORRECTIONS: &[(&str, &str)] = &[
    ("EMAILS", "EMAIL"),
    ("EMAIL_ADDRESS", "EMAIL"),
    ("EMAIL_ADDRESSES", "EMAIL"),
    ("E_MAIL", "EMAIL"),
    ("EMIAL", "EMAIL"),
    ("PERSON", "NAME"),
    ("PERSON_NAME", "NAME"),
    ("FULL_NAME", "NAME"),
    ("NAMES", "NAME"),
    ("PHONE_NUMBER", "PHONE"),
    ("PHONE_NUMBERS", "PHONE"),
    ("PHONES", "PHONE"),
    ("TELEPHONE", "PHONE"),
    ("MOBILE", "PHONE"),
    ("MOBILE_NUMBER", "PHONE"),
    ("SOCIAL_SECURITY_NUMBER", "SSN"),
    ("SOCIAL_SECURITY", "SSN"),
    ("SSNS", "SSN"),
    ("DATE_OF_BIRTH", "DOB"),
    ("BIRTH_DATE", "DOB"),
    ("BIRTHDATE", "DOB"),
    ("ADDRESSES", "ADDRESS"),
    ("ADRESS", "ADDRESS"),
    ("PHYSICAL_ADDRESS", "ADDRESS"),
    ("STREET_ADDRESS", "ADDRESS"),
    ("PASSPORT_NUMBER", "PASSPORT"),
    ("PASPORT", "PASSPORT"),
    ("NATIONAL_ID_NUMBER", "NATIONAL_ID"),
    ("NATIONAL_IDS", "NATIONAL_ID"),
    ("AADHAR", "AADHAAR"),
    ("ADHAAR", "AADHAAR"),
    ("AADHAAR_NUMBER", "AADHAAR"),
    ("PAN_NUMBER", "PAN"),
    ("PAN_CARD", "PAN"),
    ("DRIVER_LICENSE", "DRIVERS_LICENSE"),
    ("DRIVERS_LICENCE", "DRIVERS_LICENSE"),
    ("DRIVING_LICENSE", "DRIVERS_LICENSE"),
    ("DRIVING_LICENCE", "DRIVERS_LICENSE"),
    ("CREDIT_CARD_NUMBER", "CREDIT_CARD"),
    ("CARD_NUMBER", "CREDIT_CARD"),
    ("BANK_ACCOUNT_NUMBER", "BANK_ACCOUNT"),
    ("IBAN", "BANK_ACCOUNT"),
    ("IP", "IP_ADDRESS"),
    ("IP_ADDRESSES", "IP_ADDRESS"),
];

/// Upper-case, trim, collapse separators to `_`, strip one leading `PII_`.
#[must_use]
pub fn fold_label(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    let mut folded = String::with_capacity(upper.len());
    let mut pending_separator = false;
    for ch in upper.chars() {
        if ch.is_whitespace() || matches!(ch, '-' | '.' | '_') {
            pending_separator = true;
            continue;
        }
        if pending_separator && !folded.is_empty() {
            folded.push('_');
        }
        pending_separator = false;
        folded.push(ch);
    }

    match folded.strip_prefix("PII_") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => folded,
    }
}

/// Explicit label corrections applied after folding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionTable {
    entries: BTreeMap<String, String>,
}

impl CorrectionTable {
    #[must_use]
    pub fn empty() -> Self {
        Self { entries: BTreeMap::new() }
    }

    /// Both sides are folded before insertion, so `"phone number"` and `"PHONE_NUMBER"`
    /// address the same entry.
    pub fn insert(&mut self, from: &str, to: &str) {
        self.entries.insert(fold_label(from), fold_label(to));
    }

    #[must_use]
    pub fn lookup(&self, folded: &str) -> Option<&str> {
        self.entries.get(folded).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(from, to)| (from.as_str(), to.as_str()))
    }
}

impl Default for CorrectionTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for (from, to) in DEFAULT_CORRECTIONS {
            table.insert(from, to);
        }
        table
    }
}

impl<K, V> Extend<(K, V)> for CorrectionTable
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (from, to) in iter {
            self.insert(from.as_ref(), to.as_ref());
        }
    }
}

/// Maps free-form oracle labels onto the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalizer {
    catalog: Catalog,
    corrections: CorrectionTable,
}

impl Normalizer {
    #[must_use]
    pub fn new(catalog: Catalog, corrections: CorrectionTable) -> Self {
        Self { catalog, corrections }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn corrections(&self) -> &CorrectionTable {
        &self.corrections
    }

    /// Total: labels that cannot be mapped degrade to [`Category::Unrecognized`].
    #[must_use]
    pub fn normalize(&self, raw_label: &str) -> Category {
        let folded = fold_label(raw_label);
        let corrected = self.corrections.lookup(&folded).unwrap_or(folded.as_str());
        if let Some(id) = self.catalog.get(corrected) {
            return Category::Known(id.clone());
        }

        let singular = corrected.strip_suffix('S');
        if let Some(id) = singular.and_then(|label| self.catalog.get(label)) {
            return Category::Known(id.clone());
        }

        Category::Unrecognized(raw_label.to_string())
    }

    /// Resolve caller-requested labels. `None` requests the whole catalog.
    ///
    /// # Errors
    /// Returns [`KernelError::UnknownCategory`] for the first label that does not normalize
    /// to a catalog member.
    pub fn resolve_requested<S>(
        &self,
        labels: Option<&[S]>,
    ) -> Result<BTreeSet<CategoryId>, KernelError>
    where
        S: AsRef<str>,
    {
        let Some(labels) = labels else {
            return Ok(self.catalog.all());
        };

        let mut requested = BTreeSet::new();
        for label in labels {
            match self.normalize(label.as_ref()) {
                Category::Known(id) => {
                    requested.insert(id);
                }
                Category::Unrecognized(raw) => return Err(KernelError::UnknownCategory(raw)),
            }
        }
        Ok(requested)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Catalog::default(), CorrectionTable::default())
    }
}

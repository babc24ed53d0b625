//! Content fingerprinting and the dedup gate.
//!
//! A record's fingerprint is an MD5 digest over `from`, `to`, `cc` and `body`.
//! The gate admits a fingerprint at most once per store lifetime.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

use crate::pipeline::types::EmailRecord;

// ── Fingerprint ─────────────────────────────────────────────────────

/// How the four fields are combined before hashing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FingerprintScheme {
    /// Plain concatenation, no delimiters. Boundary-shifted fields collide
    /// (`"ab" + "c"` == `"a" + "bc"`).
    #[default]
    Concatenated,
    /// Each field written as `<byte length>:<bytes>`, which keeps field
    /// boundaries distinct.
    LengthPrefixed,
}

impl FromStr for FingerprintScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "concatenated" | "concat" => Ok(Self::Concatenated),
            "length-prefixed" | "length_prefixed" => Ok(Self::LengthPrefixed),
            other => Err(format!(
                "unknown fingerprint scheme '{other}' (expected concatenated or length-prefixed)"
            )),
        }
    }
}

/// 128-bit content digest, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of four fields. Absent `cc` is passed as `""`.
    pub fn compute(from: &str, to: &str, cc: &str, body: &str, scheme: FingerprintScheme) -> Self {
        let content = match scheme {
            FingerprintScheme::Concatenated => format!("{from}{to}{cc}{body}"),
            FingerprintScheme::LengthPrefixed => [from, to, cc, body]
                .iter()
                .map(|field| format!("{}:{}", field.len(), field))
                .collect(),
        };
        Self(format!("{:x}", md5::compute(content.as_bytes())))
    }

    /// Fingerprint of an email record.
    pub fn of(record: &EmailRecord, scheme: FingerprintScheme) -> Self {
        Self::compute(
            &record.from,
            &record.to,
            record.cc_text(),
            &record.body,
            scheme,
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// Insert-only set of fingerprints already admitted.
pub trait DedupStore: Send + Sync {
    /// Atomically test and insert. Returns `true` when the fingerprint was
    /// not present before this call.
    fn check_and_insert(&self, fingerprint: &Fingerprint) -> bool;

    fn contains(&self, fingerprint: &Fingerprint) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory fingerprint set for one process run. Never evicts.
#[derive(Debug, Default)]
pub struct ProcessedSet {
    seen: Mutex<HashSet<String>>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock still holds a valid set: inserts are single calls.
    fn guard(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DedupStore for ProcessedSet {
    fn check_and_insert(&self, fingerprint: &Fingerprint) -> bool {
        self.guard().insert(fingerprint.0.clone())
    }

    fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.guard().contains(fingerprint.as_str())
    }

    fn len(&self) -> usize {
        self.guard().len()
    }
}

// ── Gate ────────────────────────────────────────────────────────────

/// Gate decision for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// First sighting; the fingerprint is now recorded.
    New(Fingerprint),
    /// Already recorded; the record must not be classified.
    Duplicate(Fingerprint),
}

impl GateDecision {
    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            Self::New(fp) | Self::Duplicate(fp) => fp,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Dedup gate in front of the classifier.
#[derive(Clone)]
pub struct DedupGate {
    store: Arc<dyn DedupStore>,
    scheme: FingerprintScheme,
}

impl DedupGate {
    pub fn new(store: Arc<dyn DedupStore>, scheme: FingerprintScheme) -> Self {
        Self { store, scheme }
    }

    /// Fingerprint the record and record it if new.
    ///
    /// The fingerprint is inserted before the caller classifies, so a failed
    /// classification still marks the content as seen.
    pub fn admit(&self, record: &EmailRecord) -> GateDecision {
        let fingerprint = Fingerprint::of(record, self.scheme);
        if self.store.check_and_insert(&fingerprint) {
            debug!(
                source = %record.source_name,
                fingerprint = %fingerprint,
                "New email content"
            );
            GateDecision::New(fingerprint)
        } else {
            debug!(
                source = %record.source_name,
                fingerprint = %fingerprint,
                "Duplicate email content"
            );
            GateDecision::Duplicate(fingerprint)
        }
    }

    pub fn store(&self) -> &Arc<dyn DedupStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(from: &str, to: &str, cc: Option<&str>, body: &str, name: &str) -> EmailRecord {
        EmailRecord {
            from: from.into(),
            to: to.into(),
            cc: cc.map(str::to_string),
            body: body.into(),
            source_name: name.into(),
            sequence_index: 0,
        }
    }

    fn gate() -> DedupGate {
        DedupGate::new(Arc::new(ProcessedSet::new()), FingerprintScheme::Concatenated)
    }

    // ── Fingerprint tests ───────────────────────────────────────────

    #[test]
    fn concatenated_matches_md5_of_joined_fields() {
        let fp = Fingerprint::compute(
            "test@example.com",
            "recipient@example.com",
            "cc@example.com",
            "This is a test email.",
            FingerprintScheme::Concatenated,
        );
        assert_eq!(fp.as_str(), "8dbff7cec63f0b4da0037aae5dd2959b");
    }

    #[test]
    fn absent_cc_hashes_as_empty() {
        let fp = Fingerprint::of(
            &record("a@x.com", "b@x.com", None, "Please reset my account.", "a.eml"),
            FingerprintScheme::Concatenated,
        );
        assert_eq!(fp.as_str(), "5c130e09c0c606a8898abba7f731c847");
        assert_eq!(
            fp,
            Fingerprint::of(
                &record("a@x.com", "b@x.com", Some(""), "Please reset my account.", "b.eml"),
                FingerprintScheme::Concatenated,
            )
        );
    }

    #[test]
    fn fingerprint_is_lowercase_hex_128_bit() {
        let fp = Fingerprint::compute("A", "B", "C", "D", FingerprintScheme::Concatenated);
        assert_eq!(fp.as_str().len(), 32);
        assert!(
            fp.as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
    }

    #[test]
    fn fingerprint_is_deterministic() {
        for scheme in [FingerprintScheme::Concatenated, FingerprintScheme::LengthPrefixed] {
            let a = Fingerprint::compute("a@x.com", "b@x.com", "", "hi", scheme);
            let b = Fingerprint::compute("a@x.com", "b@x.com", "", "hi", scheme);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn each_field_participates() {
        let base = Fingerprint::compute("a", "b", "c", "d", FingerprintScheme::Concatenated);
        assert_ne!(base, Fingerprint::compute("x", "b", "c", "d", FingerprintScheme::Concatenated));
        assert_ne!(base, Fingerprint::compute("a", "x", "c", "d", FingerprintScheme::Concatenated));
        assert_ne!(base, Fingerprint::compute("a", "b", "x", "d", FingerprintScheme::Concatenated));
        assert_ne!(base, Fingerprint::compute("a", "b", "c", "x", FingerprintScheme::Concatenated));
    }

    #[test]
    fn source_name_and_index_do_not_participate() {
        let mut first = record("a@x.com", "b@x.com", None, "hi", "one.eml");
        let mut second = first.clone();
        second.source_name = "two.eml".into();
        second.sequence_index = 9;
        first.sequence_index = 1;
        assert_eq!(
            Fingerprint::of(&first, FingerprintScheme::Concatenated),
            Fingerprint::of(&second, FingerprintScheme::Concatenated)
        );
    }

    #[test]
    fn concatenated_collides_on_boundary_shift() {
        let left = Fingerprint::compute("ab", "c", "", "body", FingerprintScheme::Concatenated);
        let right = Fingerprint::compute("a", "bc", "", "body", FingerprintScheme::Concatenated);
        assert_eq!(left, right);
    }

    #[test]
    fn length_prefixed_separates_boundary_shift() {
        let left = Fingerprint::compute("ab", "c", "", "body", FingerprintScheme::LengthPrefixed);
        let right = Fingerprint::compute("a", "bc", "", "body", FingerprintScheme::LengthPrefixed);
        assert_ne!(left, right);
    }

    #[test]
    fn scheme_parses() {
        assert_eq!(
            "length-prefixed".parse::<FingerprintScheme>(),
            Ok(FingerprintScheme::LengthPrefixed)
        );
        assert_eq!(
            "Concatenated".parse::<FingerprintScheme>(),
            Ok(FingerprintScheme::Concatenated)
        );
        assert!("sha1".parse::<FingerprintScheme>().is_err());
    }

    // ── Store tests ─────────────────────────────────────────────────

    #[test]
    fn processed_set_starts_empty_and_grows() {
        let set = ProcessedSet::new();
        assert!(set.is_empty());
        let fp = Fingerprint::compute("a", "b", "", "c", FingerprintScheme::Concatenated);
        assert!(set.check_and_insert(&fp));
        assert!(!set.check_and_insert(&fp));
        assert!(set.contains(&fp));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn check_and_insert_admits_once_across_threads() {
        let set = Arc::new(ProcessedSet::new());
        let fp = Fingerprint::compute("a", "b", "", "c", FingerprintScheme::Concatenated);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let set = Arc::clone(&set);
                let fp = fp.clone();
                std::thread::spawn(move || set.check_and_insert(&fp))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();

        assert_eq!(admitted, 1);
        assert_eq!(set.len(), 1);
    }

    // ── Gate tests ──────────────────────────────────────────────────

    #[test]
    fn gate_flags_second_identical_record() {
        let gate = gate();
        let first = record("a@x.com", "b@x.com", Some(""), "Please reset my account.", "1.eml");
        let second = record("a@x.com", "b@x.com", Some(""), "Please reset my account.", "2.eml");

        let d1 = gate.admit(&first);
        let d2 = gate.admit(&second);
        assert!(matches!(d1, GateDecision::New(_)));
        assert!(d2.is_duplicate());
        assert_eq!(d1.fingerprint(), d2.fingerprint());
        assert_eq!(gate.store().len(), 1);
    }

    #[test]
    fn gate_admits_distinct_records() {
        let gate = gate();
        assert!(!gate.admit(&record("a", "b", None, "one", "1.eml")).is_duplicate());
        assert!(!gate.admit(&record("a", "b", None, "two", "2.eml")).is_duplicate());
        assert_eq!(gate.store().len(), 2);
    }

    #[test]
    fn gate_shares_injected_store() {
        let store: Arc<dyn DedupStore> = Arc::new(ProcessedSet::new());
        let r = record("a", "b", None, "body", "1.eml");
        let fp = Fingerprint::of(&r, FingerprintScheme::Concatenated);
        store.check_and_insert(&fp);

        let gate = DedupGate::new(Arc::clone(&store), FingerprintScheme::Concatenated);
        assert!(gate.admit(&r).is_duplicate());
    }
}

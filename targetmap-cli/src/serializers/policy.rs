//! Which resolved values make it into the document.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use targetmap_graph::ValueSource;

/// Emit/suppress decision over a value's source.
///
/// The default policy emits only explicitly declared values.
#[derive(Clone)]
pub struct EmitPolicy {
    predicate: Arc<dyn Fn(ValueSource) -> bool + Send + Sync>,
    description: String,
}

impl EmitPolicy {
    /// Emit explicitly declared values only.
    pub fn explicit_only() -> Self {
        Self::sources([ValueSource::Explicit])
    }

    /// Emit values from any of `sources`.
    pub fn sources(sources: impl IntoIterator<Item = ValueSource>) -> Self {
        let allowed: BTreeSet<ValueSource> = sources.into_iter().collect();
        let description = allowed
            .iter()
            .map(ValueSource::as_str)
            .collect::<Vec<_>>()
            .join(",");
        Self {
            predicate: Arc::new(move |source| allowed.contains(&source)),
            description,
        }
    }

    /// Emit every resolved value.
    pub fn all() -> Self {
        Self::sources(ValueSource::all())
    }

    /// Custom predicate.
    pub fn from_fn(
        description: impl Into<String>,
        predicate: impl Fn(ValueSource) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            predicate: Arc::new(predicate),
            description: description.into(),
        }
    }

    pub fn allows(&self, source: ValueSource) -> bool {
        (self.predicate)(source)
    }
}

impl Default for EmitPolicy {
    fn default() -> Self {
        Self::explicit_only()
    }
}

impl fmt::Debug for EmitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EmitPolicy").field(&self.description).finish()
    }
}

impl fmt::Display for EmitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_explicit_only() {
        let policy = EmitPolicy::default();
        assert!(policy.allows(ValueSource::Explicit));
        assert!(!policy.allows(ValueSource::Default));
        assert!(!policy.allows(ValueSource::ComputedDefault));
        assert!(!policy.allows(ValueSource::Unknown));
    }

    #[test]
    fn test_sources() {
        let policy = EmitPolicy::sources([ValueSource::Unknown, ValueSource::Explicit]);
        assert!(policy.allows(ValueSource::Explicit));
        assert!(policy.allows(ValueSource::Unknown));
        assert!(!policy.allows(ValueSource::Default));
        assert_eq!(policy.to_string(), "explicit,unknown");
    }

    #[test]
    fn test_all_and_custom() {
        assert!(ValueSource::all().into_iter().all(|s| EmitPolicy::all().allows(s)));

        let nothing = EmitPolicy::from_fn("none", |_| false);
        assert!(!nothing.allows(ValueSource::Explicit));
        assert_eq!(format!("{:?}", nothing), "EmitPolicy(\"none\")");
    }
}

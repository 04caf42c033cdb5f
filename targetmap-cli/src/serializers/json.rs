//! JSON output for query results.
//!
//! Targets are pushed into a [`JsonStreamWriter`] in batches, possibly from
//! several threads at once. Each target becomes one entry of an in-memory
//! [`ResultDocument`]; the document is written to the sink once, when the
//! writer is closed.
//!
//! ## Output Schema
//!
//! ```json
//! {
//!   "//pkg:foo": {
//!     "srcs": ["//pkg:a.cc", "//pkg:b.cc"],
//!     "linkstatic": "true"
//!   },
//!   "//pkg:README.md": {}
//! }
//! ```
//!
//! Every value is a string or an array of strings. Only attributes whose
//! values pass the [`EmitPolicy`] appear; file targets map to `{}`.

use super::policy::EmitPolicy;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};
use targetmap_graph::{AttributeValueResolver, Target};
use thiserror::Error;

/// Errors from the writer lifecycle and the final write.
#[derive(Debug, Error)]
pub enum FormatError {
    /// A lifecycle call was made in the wrong state.
    #[error("Cannot {operation} output: writer is {state}")]
    Lifecycle {
        operation: &'static str,
        state: WriterState,
    },

    /// The sink rejected the document.
    #[error("Failed to write output: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One attribute's emitted form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EmittedValue {
    Scalar(String),
    List(Vec<String>),
}

/// Attribute name to emitted value, in schema order.
pub type TargetEntry = IndexMap<String, EmittedValue>;

/// Label to target entry, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultDocument {
    entries: IndexMap<String, TargetEntry>,
}

impl ResultDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. A label already present keeps its position and gets
    /// the new entry; the replaced one is returned.
    pub fn insert(&mut self, label: String, entry: TargetEntry) -> Option<TargetEntry> {
        self.entries.insert(label, entry)
    }

    pub fn get(&self, label: &str) -> Option<&TargetEntry> {
        self.entries.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pretty-printed JSON with two-space indentation.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the pretty-printed document with a single `write_all` and flush.
    /// Returns the number of bytes written.
    pub fn write_pretty<S: Write + ?Sized>(&self, sink: &mut S) -> Result<usize, FormatError> {
        let json = self.to_pretty_json()?;
        sink.write_all(json.as_bytes())?;
        sink.flush()?;
        Ok(json.len())
    }
}

/// Writer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Unstarted,
    Started,
    Closed,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriterState::Unstarted => "not started",
            WriterState::Started => "started",
            WriterState::Closed => "closed",
        })
    }
}

/// Result of a successful close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The document was written.
    Written { bytes: usize },
    /// Closed with `fail_fast`; nothing was written.
    Suppressed,
}

/// Receives query results in batches and produces output when closed.
pub trait OutputCallback: Send + Sync {
    fn start(&self) -> Result<(), FormatError>;

    /// Process one batch. Returns the number of targets accepted.
    fn accept(&self, batch: &[Target]) -> Result<usize, FormatError>;

    /// Finish the session. With `fail_fast` nothing is written.
    fn close(&self, fail_fast: bool) -> Result<CloseOutcome, FormatError>;
}

struct Session<W> {
    state: WriterState,
    document: ResultDocument,
    sink: W,
}

impl<W> Session<W> {
    fn require(&self, expected: WriterState, operation: &'static str) -> Result<(), FormatError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(FormatError::Lifecycle {
                operation,
                state: self.state,
            })
        }
    }
}

/// Accumulates targets into a [`ResultDocument`] and writes it once on close.
///
/// `accept` may be called concurrently through a shared reference. Values
/// are resolved without holding the lock; only the insertion is serialized.
/// Entries from concurrent batches land in lock acquisition order.
pub struct JsonStreamWriter<W> {
    resolver: AttributeValueResolver,
    policy: EmitPolicy,
    session: Mutex<Session<W>>,
}

impl<W: Write + Send> JsonStreamWriter<W> {
    /// Writer with no configuration context and the explicit-only policy.
    pub fn new(sink: W) -> Self {
        Self {
            resolver: AttributeValueResolver::new(),
            policy: EmitPolicy::default(),
            session: Mutex::new(Session {
                state: WriterState::Unstarted,
                document: ResultDocument::new(),
                sink,
            }),
        }
    }

    pub fn with_resolver(mut self, resolver: AttributeValueResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_policy(mut self, policy: EmitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &EmitPolicy {
        &self.policy
    }

    pub fn state(&self) -> WriterState {
        self.lock().state
    }

    /// Begin a session with an empty document.
    pub fn start(&self) -> Result<(), FormatError> {
        let mut session = self.lock();
        session.require(WriterState::Unstarted, "start")?;
        session.state = WriterState::Started;
        session.document = ResultDocument::new();
        Ok(())
    }

    /// Resolve a batch and add it to the document, in batch order.
    pub fn accept(&self, batch: &[Target]) -> Result<usize, FormatError> {
        self.lock().require(WriterState::Started, "accept")?;

        let entries: Vec<(String, TargetEntry)> = batch
            .iter()
            .map(|target| (target.label.to_string(), self.target_entry(target)))
            .collect();

        let mut session = self.lock();
        // close() may have run while the batch was resolving.
        session.require(WriterState::Started, "accept")?;
        for (label, entry) in entries {
            if session.document.insert(label.clone(), entry).is_some() {
                tracing::debug!(label = %label, "duplicate label replaces earlier entry");
            }
        }
        Ok(batch.len())
    }

    /// Close the session. Unless `fail_fast`, serialize the document and
    /// write it to the sink.
    ///
    /// On a write error the document is kept; see [`Self::into_document`].
    pub fn close(&self, fail_fast: bool) -> Result<CloseOutcome, FormatError> {
        let mut session = self.lock();
        session.require(WriterState::Started, "close")?;
        session.state = WriterState::Closed;

        if fail_fast {
            tracing::info!(
                "Output suppressed, discarding {} targets",
                session.document.len()
            );
            return Ok(CloseOutcome::Suppressed);
        }

        let Session { document, sink, .. } = &mut *session;
        let bytes = document.write_pretty(sink)?;
        tracing::info!("Wrote {} targets ({} bytes)", document.len(), bytes);
        Ok(CloseOutcome::Written { bytes })
    }

    /// The emitted attributes of one target.
    ///
    /// List attributes collect their surviving values into an array; scalar
    /// attributes keep the last one. Attributes with nothing left are omitted,
    /// except a list declared empty, which is emitted as `[]` when its
    /// declaration's source passes the policy.
    pub fn target_entry(&self, target: &Target) -> TargetEntry {
        let mut entry = TargetEntry::new();
        for (attribute, values) in self.resolver.resolve_all(target) {
            let resolved_nothing = values.is_empty();
            let mut emitted: Vec<String> = values
                .into_iter()
                .filter(|v| self.policy.allows(v.source))
                .map(|v| v.value.to_string())
                .collect();

            if attribute.is_list() {
                let keep = !emitted.is_empty()
                    || (resolved_nothing
                        && self
                            .resolver
                            .declaration_source(target, attribute)
                            .is_some_and(|source| self.policy.allows(source)));
                if keep {
                    entry.insert(attribute.name.clone(), EmittedValue::List(emitted));
                }
            } else if let Some(last) = emitted.pop() {
                entry.insert(attribute.name.clone(), EmittedValue::Scalar(last));
            }
        }
        entry
    }

    /// Take the accumulated document, e.g. to retry a failed write.
    pub fn into_document(self) -> ResultDocument {
        self.into_parts().0
    }

    pub fn into_parts(self) -> (ResultDocument, W) {
        let session = self
            .session
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        (session.document, session.sink)
    }

    fn lock(&self) -> MutexGuard<'_, Session<W>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> OutputCallback for JsonStreamWriter<W> {
    fn start(&self) -> Result<(), FormatError> {
        JsonStreamWriter::start(self)
    }

    fn accept(&self, batch: &[Target]) -> Result<usize, FormatError> {
        JsonStreamWriter::accept(self, batch)
    }

    fn close(&self, fail_fast: bool) -> Result<CloseOutcome, FormatError> {
        JsonStreamWriter::close(self, fail_fast)
    }
}

impl<W> fmt::Debug for JsonStreamWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonStreamWriter")
            .field("resolver", &self.resolver)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io;
    use std::sync::Arc;
    use targetmap_graph::{
        AttrType, Attribute, BuildConfiguration, DEFAULT_CONDITION, DefaultValue, Label, RuleBuilder,
        RuleClass, RuleClassRegistry, SelectBranch, ValueSource,
    };

    fn label(s: &str) -> Label {
        Label::parse(s).unwrap()
    }

    fn cc_library(name: &str) -> Target {
        RuleBuilder::new(RuleClassRegistry::builtin().get("cc_library").unwrap())
            .label(label(name))
            .attr("srcs", vec![label("//pkg:a.cc"), label("//pkg:b.cc")])
            .attr("linkstatic", true)
            .build()
            .unwrap()
    }

    fn written(writer: JsonStreamWriter<Vec<u8>>) -> String {
        let (_, sink) = writer.into_parts();
        String::from_utf8(sink).unwrap()
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_explicit_list_and_computed_default() {
        let class = Arc::new(RuleClass::new(
            "file_list",
            vec![
                Attribute::list("srcs", AttrType::String),
                Attribute::list("deps", AttrType::String)
                    .with_default(DefaultValue::copy_of("srcs")),
            ],
        ));
        let target = RuleBuilder::new(class)
            .label(label("//pkg:foo"))
            .attr("srcs", vec!["a.cc", "b.cc"])
            .build()
            .unwrap();

        // deps has a value, but only a computed one.
        let everything = JsonStreamWriter::new(Vec::new()).with_policy(EmitPolicy::all());
        assert_eq!(
            everything.target_entry(&target).get("deps"),
            Some(&EmittedValue::List(vec!["a.cc".to_string(), "b.cc".to_string()]))
        );

        let writer = JsonStreamWriter::new(Vec::new());
        writer.start().unwrap();
        writer.accept(&[target]).unwrap();
        let outcome = writer.close(false).unwrap();

        let expected = r#"{
  "//pkg:foo": {
    "srcs": [
      "a.cc",
      "b.cc"
    ]
  }
}"#;
        assert_eq!(outcome, CloseOutcome::Written { bytes: expected.len() });
        assert_eq!(written(writer), expected);
    }

    #[test]
    fn test_file_target_maps_to_empty_object() {
        let writer = JsonStreamWriter::new(Vec::new());
        writer.start().unwrap();
        writer
            .accept(&[Target::source_file(label("//pkg:foo.txt"))])
            .unwrap();
        writer.close(false).unwrap();

        assert_eq!(written(writer), "{\n  \"//pkg:foo.txt\": {}\n}");
    }

    #[test]
    fn test_scalar_and_list_values() {
        let writer = JsonStreamWriter::new(Vec::new());
        let entry = writer.target_entry(&cc_library("//pkg:foo"));

        let mut expected = TargetEntry::new();
        expected.insert(
            "srcs".to_string(),
            EmittedValue::List(vec!["//pkg:a.cc".to_string(), "//pkg:b.cc".to_string()]),
        );
        expected.insert(
            "linkstatic".to_string(),
            EmittedValue::Scalar("true".to_string()),
        );
        assert_eq!(entry, expected);
    }

    #[test]
    fn test_explicit_empty_list_is_emitted() {
        let target = RuleBuilder::new(RuleClassRegistry::builtin().get("cc_library").unwrap())
            .label(label("//pkg:foo"))
            .attr("srcs", Vec::<Label>::new())
            .attr("deps", vec![label("//pkg:bar")])
            .select(
                "copts",
                vec![
                    SelectBranch::new(label("//config:linux"), Vec::<&str>::new()),
                    SelectBranch::new(label(DEFAULT_CONDITION), vec!["-DOTHER"]),
                ],
            )
            .build()
            .unwrap();

        let mut expected = TargetEntry::new();
        expected.insert("srcs".to_string(), EmittedValue::List(Vec::new()));
        expected.insert(
            "deps".to_string(),
            EmittedValue::List(vec!["//pkg:bar".to_string()]),
        );
        expected.insert("copts".to_string(), EmittedValue::List(Vec::new()));

        let writer = JsonStreamWriter::new(Vec::new()).with_resolver(
            AttributeValueResolver::with_configuration(
                BuildConfiguration::new().with_condition(label("//config:linux")),
            ),
        );
        assert_eq!(writer.target_entry(&target), expected);

        // Without a configuration the empty branch is unknown, and the
        // default branch's value is unknown too.
        let unconfigured = JsonStreamWriter::new(Vec::new());
        let entry = unconfigured.target_entry(&target);
        assert_eq!(entry.get("srcs"), Some(&EmittedValue::List(Vec::new())));
        assert!(!entry.contains_key("copts"));

        // An undeclared list with no default stays absent under any policy.
        let everything = JsonStreamWriter::new(Vec::new()).with_policy(EmitPolicy::all());
        assert!(!everything.target_entry(&target).contains_key("tags"));
    }

    #[test]
    fn test_policy_controls_emission() {
        let target = cc_library("//pkg:foo");

        let explicit = JsonStreamWriter::new(Vec::new());
        assert!(!explicit.target_entry(&target).contains_key("visibility"));
        assert!(!explicit.target_entry(&target).contains_key("alwayslink"));

        let with_defaults = JsonStreamWriter::new(Vec::new())
            .with_policy(EmitPolicy::sources([ValueSource::Explicit, ValueSource::Default]));
        let entry = with_defaults.target_entry(&target);
        assert_eq!(
            entry.get("visibility"),
            Some(&EmittedValue::List(vec!["//visibility:private".to_string()]))
        );
        assert_eq!(
            entry.get("alwayslink"),
            Some(&EmittedValue::Scalar("false".to_string()))
        );
        // Explicit value still wins over the class default.
        assert_eq!(
            entry.get("linkstatic"),
            Some(&EmittedValue::Scalar("true".to_string()))
        );
    }

    #[test]
    fn test_scalar_select_keeps_last_candidate() {
        let target = RuleBuilder::new(RuleClassRegistry::builtin().get("cc_test").unwrap())
            .label(label("//pkg:foo_test"))
            .select(
                "size",
                vec![
                    SelectBranch::new(label("//config:ci"), "small"),
                    SelectBranch::new(label(DEFAULT_CONDITION), "large"),
                ],
            )
            .build()
            .unwrap();

        // Without a configuration every branch is a candidate.
        let unknown = JsonStreamWriter::new(Vec::new()).with_policy(EmitPolicy::all());
        assert_eq!(
            unknown.target_entry(&target).get("size"),
            Some(&EmittedValue::Scalar("large".to_string()))
        );
        let explicit = JsonStreamWriter::new(Vec::new());
        assert!(explicit.target_entry(&target).get("size").is_none());

        // With one, the matching branch is explicit.
        let configured = JsonStreamWriter::new(Vec::new()).with_resolver(
            AttributeValueResolver::with_configuration(
                BuildConfiguration::new().with_condition(label("//config:ci")),
            ),
        );
        assert_eq!(
            configured.target_entry(&target).get("size"),
            Some(&EmittedValue::Scalar("small".to_string()))
        );
    }

    #[test]
    fn test_fail_fast_writes_nothing() {
        let writer = JsonStreamWriter::new(Vec::new());
        writer.start().unwrap();
        writer.accept(&[cc_library("//pkg:foo")]).unwrap();

        assert_eq!(writer.close(true).unwrap(), CloseOutcome::Suppressed);
        assert_eq!(writer.state(), WriterState::Closed);

        let (document, sink) = writer.into_parts();
        assert!(sink.is_empty());
        assert_eq!(document.len(), 1);
    }

    #[test]
    fn test_lifecycle_errors() {
        let writer = JsonStreamWriter::new(Vec::new());
        assert_eq!(writer.state(), WriterState::Unstarted);

        assert!(matches!(
            writer.accept(&[]),
            Err(FormatError::Lifecycle {
                operation: "accept",
                state: WriterState::Unstarted
            })
        ));
        assert!(matches!(
            writer.close(false),
            Err(FormatError::Lifecycle { operation: "close", .. })
        ));

        writer.start().unwrap();
        assert!(matches!(
            writer.start(),
            Err(FormatError::Lifecycle {
                operation: "start",
                state: WriterState::Started
            })
        ));

        writer.close(false).unwrap();
        assert!(matches!(
            writer.accept(&[]),
            Err(FormatError::Lifecycle {
                state: WriterState::Closed,
                ..
            })
        ));
        assert!(matches!(
            writer.close(false),
            Err(FormatError::Lifecycle {
                operation: "close",
                state: WriterState::Closed
            })
        ));

        // The empty session wrote exactly one empty object.
        assert_eq!(written(writer), "{}");
    }

    #[test]
    fn test_lifecycle_error_message() {
        let error = FormatError::Lifecycle {
            operation: "accept",
            state: WriterState::Closed,
        };
        assert_eq!(error.to_string(), "Cannot accept output: writer is closed");
    }

    #[test]
    fn test_duplicate_label_last_write_wins() {
        let writer = JsonStreamWriter::new(Vec::new());
        writer.start().unwrap();
        writer
            .accept(&[
                cc_library("//pkg:foo"),
                Target::source_file(label("//pkg:bar.txt")),
            ])
            .unwrap();
        writer
            .accept(&[Target::source_file(label("//pkg:foo"))])
            .unwrap();

        let document = writer.into_document();
        assert_eq!(
            document.labels().collect::<Vec<_>>(),
            vec!["//pkg:foo", "//pkg:bar.txt"]
        );
        assert!(document.get("//pkg:foo").unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_accept_matches_sequential() {
        let batches: Vec<Vec<Target>> = (0..8)
            .map(|b| {
                (0..25)
                    .map(|i| cc_library(&format!("//pkg{}:lib{}", b, i)))
                    .collect()
            })
            .collect();

        let sequential = JsonStreamWriter::new(Vec::new());
        sequential.start().unwrap();
        for batch in &batches {
            sequential.accept(batch).unwrap();
        }

        let concurrent = JsonStreamWriter::new(Vec::new());
        concurrent.start().unwrap();
        std::thread::scope(|scope| {
            for batch in &batches {
                let writer = &concurrent;
                scope.spawn(move || writer.accept(batch).unwrap());
            }
        });

        let sequential = sequential.into_document();
        let concurrent = concurrent.into_document();
        assert_eq!(concurrent.len(), 200);
        // Same entries; order across batches is not guaranteed.
        assert_eq!(concurrent, sequential);
    }

    #[test]
    fn test_write_failure_keeps_document_for_retry() {
        let writer = JsonStreamWriter::new(FailingSink);
        writer.start().unwrap();
        writer.accept(&[cc_library("//pkg:foo")]).unwrap();

        let result = writer.close(false);
        assert!(matches!(result, Err(FormatError::Write(_))));
        assert_eq!(writer.state(), WriterState::Closed);

        let document = writer.into_document();
        let mut retry = Vec::new();
        let bytes = document.write_pretty(&mut retry).unwrap();
        assert_eq!(bytes, retry.len());
        assert!(String::from_utf8(retry).unwrap().contains("\"//pkg:foo\""));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let writer = JsonStreamWriter::new(Vec::new()).with_policy(EmitPolicy::all());
        let target = cc_library("//pkg:foo");
        assert_eq!(writer.target_entry(&target), writer.target_entry(&target));
    }
}

//! Implementation of the `targetmap format` command.
//!
//! 1. Load configuration from targetmap.yaml and apply CLI overrides
//! 2. Load every package of the workspace and build the target graph
//! 3. Select all targets, or those reachable from `--root` labels
//! 4. Split the selection into batches and feed them to one shared JSON
//!    writer from `jobs` blocking tasks
//! 5. Close the writer, suppressing output if any producer failed
//!
//! # Usage
//!
//! ```bash
//! # Every target in the workspace
//! targetmap format
//!
//! # Targets reachable from //app:server within two steps
//! targetmap format --root //app:server --depth 2
//!
//! # Resolve select() for linux, and include class defaults
//! targetmap format --define //config:linux --emit explicit,default
//! ```

use crate::config::{TargetmapConfig, split_list};
use crate::errors::CommandError;
use crate::output;
use crate::serializers::{CloseOutcome, JsonStreamWriter, OutputCallback};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use targetmap_graph::{AttributeValueResolver, Label, Target, TargetGraph};
use targetmap_load::WorkspaceLoader;
use tokio::task::JoinSet;

/// Options for the `targetmap format` command.
#[derive(Debug, Clone, Default)]
pub struct FormatOptions {
    /// Path to configuration file.
    pub config: Option<String>,
    /// Override workspace root.
    pub workspace: Option<String>,
    /// Labels to select from; all targets when empty.
    pub roots: Vec<String>,
    /// Maximum dependency depth from the roots.
    pub depth: Option<usize>,
    /// Override emitted sources (comma-separated).
    pub emit: Option<String>,
    /// Additional active conditions.
    pub defines: Vec<String>,
    /// Additional configuration values (`KEY=VALUE`).
    pub sets: Vec<String>,
    /// Override output file.
    pub output: Option<String>,
    pub batch_size: Option<usize>,
    pub jobs: Option<usize>,
}

/// What a format run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSummary {
    pub targets: usize,
    pub batches: usize,
    pub skipped_packages: usize,
    pub outcome: CloseOutcome,
}

/// Run the `targetmap format` command.
pub async fn run_format(options: FormatOptions) -> Result<FormatSummary, CommandError> {
    let mut config = TargetmapConfig::load(options.config.as_deref().map(Path::new))?;
    apply_options(&mut config, &options)?;
    config.expand_paths()?;
    config.validate()?;

    let policy = config.emit_policy()?;
    let resolver = match config.build_configuration()? {
        Some(configuration) => AttributeValueResolver::with_configuration(configuration),
        None => AttributeValueResolver::new(),
    };
    output::verbose(&format!("Emitting values from: {}", policy));

    let workspace = WorkspaceLoader::new(&config.workspace).load()?;
    for skipped in &workspace.skipped {
        output::warning(&format!(
            "Skipped package '{}': {}",
            skipped.package, skipped.reason
        ));
    }
    let skipped_packages = workspace.skipped.len();
    let graph = workspace.into_graph()?;
    output::verbose(&format!(
        "Loaded {} targets with {} dependency edges",
        graph.target_count(),
        graph.dependency_count()
    ));

    let selection = select_targets(&graph, &options.roots, options.depth)?;
    let targets = selection.len();
    let batches = into_batches(selection, config.batch_size);
    let batch_count = batches.len();

    let to_stdout = config.output.is_none();
    let sink = open_sink(config.output.as_deref())?;
    let writer = Arc::new(
        JsonStreamWriter::new(sink)
            .with_resolver(resolver)
            .with_policy(policy),
    );

    let outcome = feed_batches(writer, batches, config.jobs).await?;

    if to_stdout {
        // Keep the shell prompt off the last line of the document.
        println!();
    }
    if let (CloseOutcome::Written { bytes }, Some(path)) = (outcome, &config.output) {
        output::success(&format!(
            "Wrote {} targets to {} ({} bytes)",
            targets,
            path.display(),
            bytes
        ));
    }

    Ok(FormatSummary {
        targets,
        batches: batch_count,
        skipped_packages,
        outcome,
    })
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_options(config: &mut TargetmapConfig, options: &FormatOptions) -> Result<(), CommandError> {
    if let Some(workspace) = &options.workspace {
        config.workspace = PathBuf::from(workspace);
    }

    if let Some(output) = &options.output {
        config.output = Some(PathBuf::from(output));
    }

    if let Some(emit) = &options.emit {
        config.emit = split_list(emit);
    }

    if let Some(batch_size) = options.batch_size {
        config.batch_size = batch_size;
    }

    if let Some(jobs) = options.jobs {
        config.jobs = jobs;
    }

    if !options.defines.is_empty() {
        let section = config.configuration_mut();
        section.conditions.extend(options.defines.iter().cloned());
    }

    for set in &options.sets {
        let (key, value) = set
            .split_once('=')
            .filter(|(key, _)| !key.trim().is_empty())
            .ok_or_else(|| CommandError::InvalidArgument {
                flag: "--set",
                reason: format!("expected KEY=VALUE, got '{}'", set),
            })?;
        config
            .configuration_mut()
            .values
            .insert(key.trim().to_string(), value.to_string());
    }

    Ok(())
}

/// All targets in load order, or those reachable from `roots`.
fn select_targets(
    graph: &TargetGraph,
    roots: &[String],
    depth: Option<usize>,
) -> Result<Vec<Target>, CommandError> {
    if roots.is_empty() {
        return Ok(graph.targets().cloned().collect());
    }

    let roots = roots
        .iter()
        .map(|root| {
            Label::parse(root).map_err(|e| CommandError::InvalidArgument {
                flag: "--root",
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(graph
        .reachable(&roots, depth)?
        .into_iter()
        .cloned()
        .collect())
}

/// Split targets into batches of at most `size`, keeping order.
fn into_batches(targets: Vec<Target>, size: usize) -> Vec<Vec<Target>> {
    targets
        .chunks(size.max(1))
        .map(<[Target]>::to_vec)
        .collect()
}

fn open_sink(path: Option<&Path>) -> Result<Box<dyn Write + Send>, CommandError> {
    let Some(path) = path else {
        return Ok(Box::new(io::stdout()));
    };

    let open = || -> io::Result<File> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        File::create(path)
    };
    let file = open().map_err(|source| CommandError::OutputFile {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Box::new(file))
}

/// Feed `batches` to `callback` from `jobs` blocking tasks, then close it.
///
/// Batch `i` goes to task `i % jobs`, so each task accepts its batches in
/// order. If any task fails the callback is closed with `fail_fast` and the
/// first failure is returned.
pub async fn feed_batches<C>(
    callback: Arc<C>,
    batches: Vec<Vec<Target>>,
    jobs: usize,
) -> Result<CloseOutcome, CommandError>
where
    C: OutputCallback + 'static,
{
    callback.start()?;

    let jobs = jobs.max(1);
    let mut queues: Vec<Vec<Vec<Target>>> = (0..jobs).map(|_| Vec::new()).collect();
    for (i, batch) in batches.into_iter().enumerate() {
        queues[i % jobs].push(batch);
    }

    let mut workers = JoinSet::new();
    for (worker, queue) in queues.into_iter().enumerate() {
        if queue.is_empty() {
            continue;
        }
        let callback = Arc::clone(&callback);
        workers.spawn_blocking(move || {
            let mut accepted = 0;
            for batch in &queue {
                accepted += callback.accept(batch)?;
            }
            tracing::debug!("Producer {} accepted {} targets", worker, accepted);
            Ok::<usize, crate::serializers::FormatError>(accepted)
        });
    }

    let mut failure: Option<String> = None;
    while let Some(joined) = workers.join_next().await {
        let error = match joined {
            Ok(Ok(_)) => continue,
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };
        tracing::warn!("Batch producer failed: {}", error);
        failure.get_or_insert(error);
    }

    if let Some(error) = failure {
        if let Err(e) = callback.close(true) {
            tracing::warn!("Failed to discard output after producer failure: {}", e);
        }
        return Err(CommandError::Producer(error));
    }

    Ok(callback.close(false)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializers::{FormatError, WriterState};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use targetmap_graph::{RuleBuilder, RuleClassRegistry};

    fn label(s: &str) -> Label {
        Label::parse(s).unwrap()
    }

    fn files(count: usize) -> Vec<Target> {
        (0..count)
            .map(|i| Target::source_file(label(&format!("//pkg:f{}.txt", i))))
            .collect()
    }

    /// Records calls; fails `accept` for batches containing `poison` and
    /// `close` when `close_fails` is set.
    #[derive(Default)]
    struct Recorder {
        accepted: AtomicUsize,
        closed: Mutex<Vec<bool>>,
        poison: Option<Label>,
        close_fails: bool,
    }

    impl OutputCallback for Recorder {
        fn start(&self) -> Result<(), FormatError> {
            Ok(())
        }

        fn accept(&self, batch: &[Target]) -> Result<usize, FormatError> {
            if batch.iter().any(|t| Some(&t.label) == self.poison.as_ref()) {
                return Err(FormatError::Lifecycle {
                    operation: "accept",
                    state: WriterState::Closed,
                });
            }
            self.accepted.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(batch.len())
        }

        fn close(&self, fail_fast: bool) -> Result<CloseOutcome, FormatError> {
            self.closed.lock().unwrap().push(fail_fast);
            if self.close_fails {
                return Err(FormatError::Lifecycle {
                    operation: "close",
                    state: WriterState::Closed,
                });
            }
            if fail_fast {
                Ok(CloseOutcome::Suppressed)
            } else {
                Ok(CloseOutcome::Written { bytes: 0 })
            }
        }
    }

    #[test]
    fn test_into_batches() {
        let batches = into_batches(files(7), 3);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(batches[2][0].label.to_string(), "//pkg:f6.txt");

        assert!(into_batches(Vec::new(), 3).is_empty());
    }

    #[test]
    fn test_apply_options() {
        let mut config = TargetmapConfig::default();
        let options = FormatOptions {
            workspace: Some("/ws".to_string()),
            emit: Some("explicit,unknown".to_string()),
            defines: vec!["//config:linux".to_string()],
            sets: vec!["custom_malloc=//tools:tcmalloc".to_string()],
            batch_size: Some(10),
            jobs: Some(2),
            ..FormatOptions::default()
        };
        apply_options(&mut config, &options).unwrap();

        assert_eq!(config.workspace, PathBuf::from("/ws"));
        assert_eq!(config.emit, vec!["explicit", "unknown"]);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.jobs, 2);
        let section = config.configuration.unwrap();
        assert_eq!(section.conditions, vec!["//config:linux"]);
        assert_eq!(
            section.values.get("custom_malloc").map(String::as_str),
            Some("//tools:tcmalloc")
        );
    }

    #[test]
    fn test_apply_options_rejects_bad_set() {
        let mut config = TargetmapConfig::default();
        let options = FormatOptions {
            sets: vec!["no_equals_sign".to_string()],
            ..FormatOptions::default()
        };
        assert!(matches!(
            apply_options(&mut config, &options),
            Err(CommandError::InvalidArgument { flag: "--set", .. })
        ));
    }

    #[test]
    fn test_select_targets() {
        let registry = RuleClassRegistry::builtin();
        let graph = TargetGraph::from_targets(vec![
            RuleBuilder::new(registry.get("filegroup").unwrap())
                .label(label("//pkg:docs"))
                .attr("srcs", vec![label("//pkg:a.md")])
                .build()
                .unwrap(),
            Target::source_file(label("//pkg:a.md")),
            Target::source_file(label("//pkg:b.md")),
        ])
        .unwrap();

        assert_eq!(select_targets(&graph, &[], None).unwrap().len(), 3);

        let selected = select_targets(&graph, &["//pkg:docs".to_string()], None).unwrap();
        let labels: Vec<String> = selected.iter().map(|t| t.label.to_string()).collect();
        assert_eq!(labels, vec!["//pkg:docs", "//pkg:a.md"]);

        assert!(matches!(
            select_targets(&graph, &["pkg:docs".to_string()], None),
            Err(CommandError::InvalidArgument { flag: "--root", .. })
        ));
        assert!(matches!(
            select_targets(&graph, &["//pkg:missing".to_string()], None),
            Err(CommandError::Graph(_))
        ));
    }

    #[tokio::test]
    async fn test_feed_batches_accepts_everything() {
        let recorder = Arc::new(Recorder::default());
        let outcome = feed_batches(Arc::clone(&recorder), into_batches(files(10), 3), 3)
            .await
            .unwrap();

        assert_eq!(outcome, CloseOutcome::Written { bytes: 0 });
        assert_eq!(recorder.accepted.load(Ordering::SeqCst), 10);
        assert_eq!(*recorder.closed.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_feed_batches_fails_fast() {
        let recorder = Arc::new(Recorder {
            poison: Some(label("//pkg:f4.txt")),
            ..Recorder::default()
        });
        let result = feed_batches(Arc::clone(&recorder), into_batches(files(10), 2), 2).await;

        assert!(matches!(result, Err(CommandError::Producer(_))));
        assert_eq!(*recorder.closed.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_producer_error_survives_failed_close() {
        let recorder = Arc::new(Recorder {
            poison: Some(label("//pkg:f1.txt")),
            close_fails: true,
            ..Recorder::default()
        });
        let result = feed_batches(Arc::clone(&recorder), into_batches(files(4), 2), 2).await;

        match result {
            Err(CommandError::Producer(message)) => {
                assert!(message.contains("Cannot accept"), "message: {}", message);
            }
            other => panic!("expected producer error, got {:?}", other),
        }
        assert_eq!(*recorder.closed.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_feed_batches_into_json_writer() {
        let writer = Arc::new(JsonStreamWriter::new(Vec::new()));
        let outcome = feed_batches(Arc::clone(&writer), into_batches(files(5), 2), 4)
            .await
            .unwrap();
        assert!(matches!(outcome, CloseOutcome::Written { .. }));

        let writer = Arc::try_unwrap(writer).unwrap();
        let document = writer.into_document();
        assert_eq!(document.len(), 5);
        assert!(document.get("//pkg:f0.txt").unwrap().is_empty());
    }
}

//! Command implementations.

use std::path::Path;

use anyhow::{bail, Context};
use tdm_tree::{
    Announcement, CapabilityRegistry, ChangeKind, DeviceTree, DispatchOutcome, Dispatcher,
    ModelIndex, PersistenceBridge, TomlFileStore, TreeConfig, TreeObserver,
};
use tracing::info;

use crate::style;

pub fn load_config(path: Option<&Path>) -> anyhow::Result<TreeConfig> {
    match path {
        Some(path) => TreeConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(TreeConfig::default()),
    }
}

pub fn init_logging(config: &TreeConfig, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config
            .log_level
            .parse::<tracing::Level>()
            .with_context(|| format!("log level '{}'", config.log_level))?
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn open_tree(config: &TreeConfig) -> anyhow::Result<DeviceTree> {
    let store = TomlFileStore::open(&config.store_path)
        .with_context(|| format!("opening store {}", config.store_path.display()))?;
    let tree = DeviceTree::with_options(
        CapabilityRegistry::default_registry(),
        PersistenceBridge::new(store),
        config.tree_options(),
    )?;
    Ok(tree)
}

pub fn show(config: &TreeConfig) -> anyhow::Result<()> {
    let tree = open_tree(config)?;
    print!("{}", tree.dump());
    println!(
        "{}",
        style::success(format!("{} device(s)", tree.device_count()))
    );
    Ok(())
}

pub fn replay(config: &TreeConfig, events: &Path, strict: bool) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(events)
        .with_context(|| format!("reading events {}", events.display()))?;
    let mut tree = open_tree(config)?;
    tree.subscribe(TraceObserver);

    let mut applied = 0usize;
    let mut failed = 0usize;
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let result = Announcement::from_json(line)
            .map_err(anyhow::Error::from)
            .and_then(|announcement| {
                Dispatcher::apply(&mut tree, announcement).map_err(anyhow::Error::from)
            });
        match result {
            Ok(outcome) => {
                applied += 1;
                log_outcome(number + 1, outcome);
            }
            Err(err) if strict => bail!("line {}: {err}", number + 1),
            Err(err) => {
                failed += 1;
                eprintln!("{}", style::warning(format!("line {}: {err}", number + 1)));
            }
        }
    }

    print!("{}", tree.dump());
    println!(
        "{}",
        style::success(format!(
            "{applied} applied, {failed} failed, {} device(s)",
            tree.device_count()
        ))
    );
    Ok(())
}

pub fn capabilities() {
    let registry = CapabilityRegistry::default_registry();
    for (key, kind) in registry.canonical_keys() {
        println!("{} {key}", style::kind(kind));
    }
}

fn log_outcome(line: usize, outcome: DispatchOutcome) {
    match outcome {
        DispatchOutcome::Added(index) => info!(line, row = index.row(), "device added"),
        DispatchOutcome::Known(index) => info!(line, row = index.row(), "device already known"),
        DispatchOutcome::Updated(index) => info!(line, row = index.row(), "value updated"),
        DispatchOutcome::Removed => info!(line, "device removed"),
    }
}

/// Forwards tree events to the log.
struct TraceObserver;

impl TreeObserver for TraceObserver {
    fn structure_will_change(
        &mut self,
        parent: &ModelIndex,
        first: usize,
        last: usize,
        kind: ChangeKind,
    ) {
        let parent_row = parent.is_valid().then(|| parent.row());
        info!(?kind, first, last, ?parent_row, "rows will change");
    }

    fn structure_changed(&mut self) {
        info!("rows changed");
    }

    fn data_changed(&mut self, index: &ModelIndex) {
        info!(row = index.row(), column = index.column(), "data changed");
    }
}

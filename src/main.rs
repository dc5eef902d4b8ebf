//! Batch decoder.
//!
//! Loads the configuration and the search network once, then decodes every
//! score-matrix file named on the command line as one segment and prints one
//! JSON line per segment on stdout.

use anyhow::Context;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use wfst_decoder::{
    config::Config,
    logging::{init_tracing, TracingConfig},
    metrics::DecoderMetrics,
    search::{
        HmmInventory, ModelInventory, ScoreMatrix, SearchConfig, SearchEngine, WordEndDetector,
    },
    wfst::{NetworkManager, SymbolTable, TextFstSource},
};

fn main() -> anyhow::Result<()> {
    init_tracing(TracingConfig::from_env())?;
    let metrics = if std::env::var_os("WFST_METRICS").is_some() {
        Some(DecoderMetrics::install()?)
    } else {
        None
    };

    let config = Config::load().context("loading decoder configuration")?;
    let segments: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if segments.is_empty() {
        warn!("no score files given, nothing to decode");
    }

    let symbols = config
        .symbols_path
        .as_ref()
        .map(SymbolTable::load_from_file)
        .transpose()?;
    let inventory = match &config.inventory_path {
        Some(path) => {
            let inventory = HmmInventory::load_from_file(path)?;
            info!("Loaded {} models from {:?}", inventory.len(), path);
            Some(Arc::new(inventory) as Arc<dyn ModelInventory>)
        }
        None => None,
    };
    let detector = WordEndDetector::new(config.word_end_type, inventory, &config.non_word_models)?;

    let mut manager = NetworkManager::new(
        TextFstSource::new(&config.grammar_path, &config.lexicon_path),
        config.weight_scale,
    );
    manager.init()?;

    let mut engine = SearchEngine::new(SearchConfig::from(&config), manager.network()?, detector);

    for segment in &segments {
        if manager.reset(config.reset_interval)? {
            info!(generation = manager.generation(), "search network rebuilt");
        }
        engine.restart(manager.network()?);

        let scores = match ScoreMatrix::load_from_file(segment) {
            Ok(scores) => scores,
            Err(e) => {
                error!("Skipping segment {:?}: {}", segment, e);
                continue;
            }
        };

        let path = engine.decode(&scores, scores.len())?;
        let lattice = if config.create_lattice {
            engine.lattice()?
        } else {
            None
        };

        let record = match &path {
            Some(path) => json!({
                "segment": segment,
                "text": symbols.as_ref().map(|s| s.render(path.words())),
                "words": path.words(),
                "items": path.items,
                "score": path.score,
                "lattice": lattice,
                "statistics": engine.statistics(),
            }),
            None => json!({
                "segment": segment,
                "text": null,
                "words": [],
                "statistics": engine.statistics(),
            }),
        };
        println!("{}", serde_json::to_string(&record)?);
    }

    if let Some(metrics) = metrics {
        eprintln!("{}", metrics.render());
    }
    Ok(())
}

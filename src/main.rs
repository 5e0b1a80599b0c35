use anyhow::{Context, Result};
use chrono::Duration;
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use taskcascade::{
    backends::{MockClassifierBackend, MockEmbeddingBackend, MockRetrievalBackend},
    cli::{Cli, Commands, ConfigAction},
    config::{ConfigStore, RouterConfig},
    console::{console, init_console},
    layers::{ClassifierLayer, ContextAugmentedLayer, KeywordLayer, SemanticLayer},
    registry::TargetRegistry,
    routing::{CascadeOrchestrator, Task},
    telemetry::{EventStore, Outcome, OutcomeStatus, PerformanceTracker, RoutingEvent},
    tuning::{ThresholdTuner, TuneParams},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_console(cli.get_verbosity());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TASKCASCADE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => RouterConfig::default_path()?,
    };

    match cli.command {
        Commands::Route {
            description,
            task_id,
            meta,
        } => handle_route(&config_path, description, task_id, meta).await?,
        Commands::Outcome {
            event_id,
            status,
            correct,
            incorrect,
            corrected_to,
            quality,
            minutes,
        } => handle_outcome(
            &config_path,
            &event_id,
            &status,
            correct,
            incorrect,
            corrected_to,
            quality,
            minutes,
        )?,
        Commands::Tune {
            layer,
            window_hours,
            min_samples,
            step,
            aggressive,
        } => handle_tune(&config_path, &layer, window_hours, min_samples, step, aggressive)?,
        Commands::Stats { window_hours } => handle_stats(&config_path, window_hours)?,
        Commands::Config { action } => handle_config(&config_path, action)?,
    }

    Ok(())
}

fn load_config_store(config_path: &PathBuf) -> Result<Arc<ConfigStore>> {
    let store = if config_path.exists() {
        ConfigStore::from_path(config_path.clone())
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        ConfigStore::new(RouterConfig::default())?
    };
    Ok(Arc::new(store))
}

fn open_tracker(config: &RouterConfig) -> Result<Arc<PerformanceTracker>> {
    let log_path = config.default_log_path()?;
    Ok(Arc::new(PerformanceTracker::new(EventStore::new(log_path))))
}

/// Wire the full demo stack: keyword vocabularies from config, semantic
/// centroids bootstrapped from target descriptions, retrieval over the same
/// capability descriptions, and the table classifier over registered
/// targets. Real services replace the mock backends behind the same traits.
async fn build_orchestrator(
    config_store: Arc<ConfigStore>,
    tracker: Arc<PerformanceTracker>,
) -> Result<CascadeOrchestrator> {
    let config = config_store.snapshot();

    let registry = Arc::new(TargetRegistry::from_config(&config));
    registry.absorb_history(&tracker.store().fold_events()?);

    let embedder = Arc::new(MockEmbeddingBackend::new());
    let semantic = SemanticLayer::bootstrap(embedder.clone(), &registry)
        .await
        .context("Failed to bootstrap semantic centroids")?;

    let mut retrieval = MockRetrievalBackend::new();
    for (target, description) in registry.descriptions() {
        retrieval = retrieval.with_document(&target, &description, 0.8);
    }

    let context_layer = ContextAugmentedLayer::new(
        SemanticLayer::new(embedder, semantic.index()),
        Arc::new(retrieval),
    )
    .with_semantic_weight(config.context.semantic_weight)
    .with_retrieval_limit(config.context.retrieval_limit);

    let class_names: Vec<String> = registry.descriptions().into_iter().map(|(n, _)| n).collect();
    let classifier = ClassifierLayer::new(
        Arc::new(MockClassifierBackend::new(class_names)),
        Arc::clone(&registry),
    );

    let orchestrator = CascadeOrchestrator::builder(config_store, tracker)
        .with_adapter(Arc::new(KeywordLayer::from_config(&config)?))
        .with_adapter(Arc::new(semantic))
        .with_adapter(Arc::new(context_layer))
        .with_adapter(Arc::new(classifier))
        .build()?;

    Ok(orchestrator)
}

async fn handle_route(
    config_path: &PathBuf,
    description: String,
    task_id: Option<String>,
    meta: Vec<String>,
) -> Result<()> {
    let config_store = load_config_store(config_path)?;
    let tracker = open_tracker(&config_store.snapshot())?;
    let orchestrator = build_orchestrator(config_store, Arc::clone(&tracker)).await?;

    let mut task = Task::new(description);
    if let Some(id) = task_id {
        task = task.with_id(id);
    }
    for pair in meta {
        match pair.split_once('=') {
            Some((key, value)) => task = task.with_metadata(key, value),
            None => anyhow::bail!("Invalid --meta '{}', expected key=value", pair),
        }
    }

    let decision = orchestrator.route(task).await?;

    if let Some(event) = tracker.store().load_event(&decision.event_id)? {
        for attempt in &event.layer_attempts {
            console().layer_attempt(
                &attempt.layer_name,
                attempt.confidence,
                attempt.threshold,
                attempt.success,
            );
        }
    }

    console().decision(
        decision.selected_target.as_deref(),
        &decision.routing_layer,
        decision.confidence,
    );
    if decision.is_clarification() && !decision.all_candidate_scores.is_empty() {
        console().plain("Best candidate per layer:");
        for (target, score) in &decision.all_candidate_scores {
            console().plain(&format!("  {:<24} {:.2}", target, score));
        }
    }
    console().verbose(&format!(
        "event {} finished in {:.1}ms",
        decision.event_id, decision.total_latency_ms
    ));
    console().plain(&format!("event_id: {}", decision.event_id));

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_outcome(
    config_path: &PathBuf,
    event_id: &str,
    status: &str,
    correct: bool,
    incorrect: bool,
    corrected_to: Option<String>,
    quality: Option<f64>,
    minutes: Option<f64>,
) -> Result<()> {
    let config_store = load_config_store(config_path)?;
    let tracker = open_tracker(&config_store.snapshot())?;

    let status: OutcomeStatus = status
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let was_correct_target = if correct {
        Some(true)
    } else if incorrect || corrected_to.is_some() {
        Some(false)
    } else {
        None
    };

    let outcome = Outcome {
        task_completed: status == OutcomeStatus::Completed,
        status,
        was_correct_target,
        corrected_to,
        completion_time_minutes: minutes,
        quality_score: quality,
    };

    let feedback = tracker
        .record_outcome(event_id, outcome)
        .with_context(|| format!("Failed to record outcome for {}", event_id))?;

    console().success(&format!("Outcome recorded for {}", event_id));
    for signal in &feedback.signals {
        console().verbose(&format!(
            "  {}: {:?} (confidence {:.2} / threshold {:.2})",
            signal.layer_name, signal.signal, signal.confidence, signal.threshold
        ));
    }

    Ok(())
}

fn handle_tune(
    config_path: &PathBuf,
    layer: &str,
    window_hours: i64,
    min_samples: usize,
    step: f64,
    aggressive: bool,
) -> Result<()> {
    let config_store = load_config_store(config_path)?;
    let log_path = config_store.snapshot().default_log_path()?;
    let tuner = ThresholdTuner::new(Arc::clone(&config_store), EventStore::new(log_path));

    let params = TuneParams::new(layer)
        .with_window(Duration::hours(window_hours))
        .with_min_samples(min_samples)
        .with_step_size(step)
        .aggressive(aggressive);

    let report = tuner.tune(&params)?;

    if (report.new_threshold - report.old_threshold).abs() < f64::EPSILON {
        console().info(&format!(
            "{}: threshold unchanged at {:.2}",
            report.layer_name, report.old_threshold
        ));
    } else {
        console().success(&format!(
            "{}: threshold {:.2} -> {:.2}",
            report.layer_name, report.old_threshold, report.new_threshold
        ));
    }
    console().plain(&report.rationale);

    Ok(())
}

fn handle_stats(config_path: &PathBuf, window_hours: Option<i64>) -> Result<()> {
    let config_store = load_config_store(config_path)?;
    let tracker = open_tracker(&config_store.snapshot())?;

    let mut events = tracker.store().fold_events()?;
    if let Some(hours) = window_hours {
        let cutoff = chrono::Utc::now() - Duration::hours(hours);
        events.retain(|e| e.created_at >= cutoff);
    }

    if events.is_empty() {
        console().info("No routing events recorded");
        return Ok(());
    }

    print_summary(&events);
    Ok(())
}

fn print_summary(events: &[RoutingEvent]) {
    let finalized: Vec<&RoutingEvent> = events.iter().filter(|e| e.is_finalized()).collect();
    let with_outcome = finalized.iter().filter(|e| e.outcome.is_some()).count();

    console().plain(&format!(
        "{} events ({} finalized, {} with outcome)",
        events.len(),
        finalized.len(),
        with_outcome
    ));

    let mut by_layer: HashMap<&str, usize> = HashMap::new();
    let mut latency_sum = 0.0;
    for event in &finalized {
        if let Some(decision) = &event.final_decision {
            *by_layer.entry(decision.routing_layer.as_str()).or_insert(0) += 1;
        }
        latency_sum += event.total_latency_ms.unwrap_or(0.0);
    }

    if !finalized.is_empty() {
        console().plain(&format!(
            "avg total latency: {:.1}ms",
            latency_sum / finalized.len() as f64
        ));
    }

    console().plain("Decisions by routing layer:");
    let mut layers: Vec<(&&str, &usize)> = by_layer.iter().collect();
    layers.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (layer, count) in layers {
        console().plain(&format!("  {:<24} {}", layer, count));
    }

    let mut attempts: HashMap<&str, (usize, usize)> = HashMap::new();
    for event in events {
        for attempt in &event.layer_attempts {
            let entry = attempts.entry(attempt.layer_name.as_str()).or_insert((0, 0));
            entry.0 += 1;
            if attempt.success {
                entry.1 += 1;
            }
        }
    }

    console().plain("Layer acceptance rates:");
    let mut rates: Vec<(&&str, &(usize, usize))> = attempts.iter().collect();
    rates.sort_by(|a, b| a.0.cmp(b.0));
    for (layer, (tried, accepted)) in rates {
        console().plain(&format!(
            "  {:<24} {}/{} ({:.0}%)",
            layer,
            accepted,
            tried,
            if *tried > 0 {
                *accepted as f64 / *tried as f64 * 100.0
            } else {
                0.0
            }
        ));
    }
}

fn handle_config(config_path: &PathBuf, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config_store = load_config_store(config_path)?;
            let content = toml::to_string_pretty(&*config_store.snapshot())
                .context("Failed to serialize config")?;
            console().plain(&content);
        }
        ConfigAction::Init => {
            if config_path.exists() {
                anyhow::bail!("Config already exists at {}", config_path.display());
            }
            RouterConfig::default().save(config_path)?;
            console().success(&format!("Wrote default config to {}", config_path.display()));
        }
    }
    Ok(())
}

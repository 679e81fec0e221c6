use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use hse_eval::config::AppConfig;
use hse_eval::error::AppError;
use hse_eval::telemetry;
use hse_eval::workflows::frm32::{
    frm32_router, DisabledSuggestionGenerator, Frm32Service, InMemorySubmissionStore,
    LogNotificationSender, MetricCatalog, MetricCode, ScoreRecord, ScoreValue, ScoringConfig,
    ScoringEngine,
};
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: Arc<PrometheusHandle>,
}

#[derive(Parser, Debug)]
#[command(
    name = "HSE Contractor Evaluation Service",
    about = "Run the FRM32 contractor evaluation backend or inspect its scoring catalog",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the seeded K2 metric catalog
    Catalog,
    /// Compute a weighted final score for ad-hoc metric=score pairs
    Score(ScoreArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// Score assignments in the form K2.1=10 (repeatable)
    #[arg(required = true, value_parser = parse_score_pair)]
    scores: Vec<(String, i64)>,
}

fn parse_score_pair(raw: &str) -> Result<(String, i64), String> {
    let (code, score) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected METRIC=SCORE, got '{raw}'"))?;
    let score = score
        .trim()
        .parse::<i64>()
        .map_err(|err| format!("failed to parse score in '{raw}' ({err})"))?;
    Ok((code.trim().to_string(), score))
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Catalog => {
            print_catalog(&MetricCatalog::standard());
            Ok(())
        }
        Command::Score(args) => run_score_demo(args),
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let catalog = Arc::new(MetricCatalog::standard());
    let engine = Arc::new(ScoringEngine::new(
        catalog,
        ScoringConfig {
            risk: config.risk,
            ..ScoringConfig::default()
        },
    ));
    let service = Arc::new(Frm32Service::new(
        Arc::new(InMemorySubmissionStore::default()),
        engine,
        Arc::new(DisabledSuggestionGenerator),
        Arc::new(LogNotificationSender),
    ));

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .merge(frm32_router(service))
        .layer(Extension(state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "contractor evaluation service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn print_catalog(catalog: &MetricCatalog) {
    println!("FRM32 K2 metric catalog");
    for metric in catalog.iter() {
        println!(
            "- {} ({}%): {}",
            metric.code.as_str(),
            metric.weight_percentage,
            metric.scope_en
        );
    }
}

fn run_score_demo(args: ScoreArgs) -> Result<(), AppError> {
    let catalog = Arc::new(MetricCatalog::standard());
    let engine = ScoringEngine::new(catalog.clone(), ScoringConfig::default());

    let mut rows = BTreeMap::new();
    let now = chrono::Utc::now();
    for (code, raw_score) in args.scores {
        let code = MetricCode(code);
        let metric = catalog.lookup(&code)?;
        let score = ScoreValue::try_from(raw_score)?;
        let comment = metric.comments.for_score(score);
        rows.insert(
            code.clone(),
            ScoreRecord {
                metric_code: code,
                score,
                comment_en: comment.en.clone(),
                comment_tr: comment.tr.clone(),
                recorded_at: now,
            },
        );
    }

    println!("Weighted scoring demo ({} of {} metrics scored)", rows.len(), catalog.len());
    for (code, record) in &rows {
        let metric = catalog.lookup(code)?;
        let contribution = metric.weight_percentage * f64::from(record.score.points()) / 10.0;
        println!(
            "- {} = {} -> contributes {:.2} of {:.0}%",
            code.as_str(),
            record.score.points(),
            contribution,
            metric.weight_percentage
        );
    }

    match engine.weighted_final_score(&rows)? {
        Some(final_score) => {
            let risk = engine.classify(final_score);
            println!("\nFinal score: {final_score:.2}");
            println!("Risk classification: {} ({})", risk.label(), risk.color());
        }
        None => println!("\nNo scores supplied; final score is undetermined"),
    }

    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_metric_score_pairs() {
        assert_eq!(
            parse_score_pair("K2.1=10").expect("valid pair"),
            ("K2.1".to_string(), 10)
        );
        assert!(parse_score_pair("K2.1").is_err());
        assert!(parse_score_pair("K2.1=ten").is_err());
    }

    #[test]
    fn score_demo_accepts_seeded_codes() {
        let args = ScoreArgs {
            scores: vec![("K2.1".to_string(), 10), ("K2.2".to_string(), 6)],
        };
        run_score_demo(args).expect("demo runs");
    }

    #[test]
    fn score_demo_rejects_unknown_metric() {
        let args = ScoreArgs {
            scores: vec![("K9.9".to_string(), 10)],
        };
        assert!(matches!(
            run_score_demo(args),
            Err(AppError::Catalog(_))
        ));
    }
}

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meridian::config::Config;
use meridian::db;
use meridian::services::agent::{
    AgentOrchestrator, ClusterPredictor, LanguageModel, OpenAiCompatClient,
};
use meridian::services::{
    ArtifactStore, Catalog, EmbeddingIndex, ReportBuilder, VendorVoiceClient, VoiceService,
};
use meridian::{handlers, AppState};

/// Missing or malformed startup input
const EXIT_CONFIG_ERROR: u8 = 1;
/// LLM endpoint or embedding index unreachable
const EXIT_STARTUP_FAILURE: u8 = 2;

const INDEX_LOAD_TIMEOUT: Duration = Duration::from_secs(60);

enum StartupError {
    Config(anyhow::Error),
    Fatal(anyhow::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        },
    };

    let _log_guard = init_logging(&config);
    tracing::info!("Meridian starting up");

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(StartupError::Config(e)) => {
            tracing::error!("configuration error: {:#}", e);
            ExitCode::from(EXIT_CONFIG_ERROR)
        },
        Err(StartupError::Fatal(e)) => {
            tracing::error!("unrecoverable startup failure: {:#}", e);
            ExitCode::from(EXIT_STARTUP_FAILURE)
        },
    }
}

/// Optional rolling file layer on top of stdout; the guard must outlive the
/// process for buffered writes to flush
fn init_logging(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("meridian.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
        Some(guard)
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
        None
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    // Static catalog definition; duplicate ids or a missing file are
    // configuration errors
    let catalog = Catalog::from_file(&config.catalog_path())
        .map_err(|e| StartupError::Config(e.into()))?;
    let catalog = Arc::new(catalog);
    tracing::info!("catalog loaded: {} products", catalog.len());

    // Centroid storage and the embedding index
    let pool = db::create_pool(&config.database.url)
        .await
        .map_err(|e| StartupError::Fatal(e.into()))?;
    tracing::info!("centroid database pool created");

    let index = tokio::time::timeout(INDEX_LOAD_TIMEOUT, EmbeddingIndex::load(&pool))
        .await
        .map_err(|_| {
            StartupError::Fatal(anyhow::anyhow!(
                "embedding index load timed out after {:?}",
                INDEX_LOAD_TIMEOUT
            ))
        })?
        .map_err(|e| StartupError::Fatal(e.into()))?;

    // The embedding model must match what the index was built with
    if index.dim() != config.llm.embedding_dim {
        return Err(StartupError::Config(anyhow::anyhow!(
            "embedding dimension mismatch: index has {}, llm.embedding_dim is {}",
            index.dim(),
            config.llm.embedding_dim
        )));
    }
    let index = Arc::new(index);

    // Generative model client; unreachable vendor is fatal
    let llm_client =
        OpenAiCompatClient::new(&config.llm).map_err(|e| StartupError::Fatal(e.into()))?;
    llm_client
        .probe()
        .await
        .map_err(|e| StartupError::Fatal(e.into()))?;
    let llm: Arc<dyn LanguageModel> = Arc::new(llm_client);
    tracing::info!("LLM client initialized");

    let artifact_store = Arc::new(ArtifactStore::new(
        &config.artifacts.dir,
        config.artifacts.summary_preview_rows,
        Duration::from_secs(config.artifacts.load_timeout_secs),
        Arc::clone(&catalog),
    ));

    // Sample context grounds the planner prompt; its absence only degrades
    // planning quality
    let sample_context = match artifact_store
        .load_summary(&config.artifacts.sample_product)
        .await
    {
        Ok(summary) => summary.text.clone(),
        Err(e) => {
            tracing::warn!("sample context unavailable ({}), planner runs without it", e);
            String::new()
        },
    };

    let orchestrator = Arc::new(
        AgentOrchestrator::new(
            Arc::clone(&catalog),
            Arc::clone(&artifact_store),
            Arc::clone(&index),
            Arc::clone(&llm),
            &config.agent,
            config.llm.input_budget_chars,
            sample_context,
        )
        .map_err(|e| StartupError::Config(e.into()))?,
    );

    let predictor = Arc::new(ClusterPredictor::new(Arc::clone(&llm), Arc::clone(&index)));
    let report_builder = Arc::new(ReportBuilder::new(
        Arc::clone(&catalog),
        Arc::clone(&artifact_store),
        Arc::clone(&index),
    ));

    let voice: Option<Arc<dyn VoiceService>> = VendorVoiceClient::from_config(&config.voice)
        .map_err(|e| StartupError::Fatal(e.into()))?
        .map(|client| Arc::new(client) as Arc<dyn VoiceService>);
    if voice.is_some() {
        tracing::info!("voice service initialized");
    } else {
        tracing::warn!("VOICE_API_KEY not set, voice endpoints disabled");
    }

    let app_state = Arc::new(AppState {
        catalog,
        artifact_store,
        embedding_index: index,
        llm,
        orchestrator,
        predictor,
        report_builder,
        voice,
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/chat/stream", post(handlers::chat::chat_stream))
        .route("/api/chat", post(handlers::chat::chat))
        .route("/api/cluster/predict", post(handlers::chat::predict_cluster))
        .route("/api/chat/analytics-visit", post(handlers::chat::analytics_visit))
        .route("/api/report/generate", post(handlers::report::generate_report))
        .route("/api/voice/tts", post(handlers::voice::tts))
        .route("/api/voice/tts/stream", post(handlers::voice::tts_stream))
        .route(
            "/api/voice/tts/with-timestamps",
            post(handlers::voice::tts_with_timestamps),
        )
        .route("/api/voice/stt", post(handlers::voice::stt))
        .route("/api/voice/stt/stream", post(handlers::voice::stt_stream))
        .with_state(app_state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors_layer(&config));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| StartupError::Fatal(e.into()))?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Meridian is ready to serve requests");

    axum::serve(listener, app)
        .await
        .map_err(|e| StartupError::Fatal(e.into()))
}

fn cors_layer(config: &Config) -> CorsLayer {
    match &config.cors.frontend_origin {
        Some(origin) => match origin.parse::<HeaderValue>() {
            Ok(value) => CorsLayer::new()
                .allow_origin(value)
                .allow_methods(Any)
                .allow_headers(Any),
            Err(_) => {
                tracing::warn!("invalid FRONTEND_ORIGIN '{}', falling back to permissive", origin);
                CorsLayer::permissive()
            },
        },
        None => CorsLayer::permissive(),
    }
}

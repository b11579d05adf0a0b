//! Tutoring agent worker entry point

use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::sync::watch;
use tokio::task::JoinSet;

use tutor_agent_config::{load_settings, Settings, WorkerKind};
use tutor_agent_core::{
    ChatModel, ControlPlane, RealtimeModel, SpeechSynthesis, SpeechToText, WorkerRegistry,
};
use tutor_agent_llm::{
    ChatClientConfig, HttpSpeechSynthesis, OpenAiChatClient, WsRealtimeModel,
    WsRealtimeModelConfig, WsSpeechToText,
};
use tutor_agent_media::{GatewayClient, HttpControlPlane, VadModel};
use tutor_agent_persistence::{LearningStore, NullStore, RestStore, StoreAuditSink};
use tutor_agent_safety::{moderation_client, rewriter_client, SafetyFilter};
use tutor_agent_telemetry::init_tracing;
use tutor_agent_worker::{
    http, run_pipeline_job, run_realtime_job, PipelineDeps, RealtimeDeps,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Worker selection and configuration are startup contracts: an unknown
    // AGENT_TYPE or a missing required endpoint refuses to serve.
    let kind = WorkerKind::from_env().context("worker selection")?;

    let env = std::env::var("TUTOR_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing is not initialized yet.
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };
    settings.validate(kind).context("configuration")?;

    let mut telemetry = init_tracing(&settings.observability, kind.worker_name())
        .context("telemetry init")?;
    tracing::info!(
        worker = kind.worker_name(),
        version = env!("CARGO_PKG_VERSION"),
        "starting tutoring agent worker"
    );

    let metrics = init_metrics()?;
    let health = tokio::spawn(http::serve(
        settings.health_port,
        kind.worker_name(),
        metrics,
    ));

    let gateway = Arc::new(GatewayClient::new(settings.media.clone()));
    let control_plane: Arc<dyn ControlPlane> = Arc::new(HttpControlPlane::new(&settings.media));
    let store: Arc<dyn LearningStore> = if settings.persistence.enabled {
        Arc::new(RestStore::new(&settings.persistence))
    } else {
        tracing::info!("persistence disabled, store writes are no-ops");
        Arc::new(NullStore)
    };
    let safety = Arc::new(
        SafetyFilter::new(
            moderation_client(&settings.services),
            rewriter_client(&settings.services),
        )
        .with_audit(Arc::new(StoreAuditSink::new(store.clone()))),
    );

    match kind {
        WorkerKind::Orchestrator => {
            run_pipeline_worker(settings, gateway, control_plane, store, safety).await?
        }
        WorkerKind::English => {
            run_realtime_worker(settings, gateway, control_plane, store, safety).await?
        }
    }

    health.abort();
    telemetry.shutdown();
    tracing::info!("worker shutdown complete");
    Ok(())
}

async fn run_pipeline_worker(
    settings: Settings,
    gateway: Arc<GatewayClient>,
    control_plane: Arc<dyn ControlPlane>,
    store: Arc<dyn LearningStore>,
    safety: Arc<SafetyFilter>,
) -> anyhow::Result<()> {
    // Prewarm. The load is asynchronous and awaited here, once, before any
    // job is accepted.
    let vad = Arc::new(VadModel::load(&settings.vad).await.context("VAD prewarm")?);

    let services = &settings.services;
    let chat: Arc<dyn ChatModel> = Arc::new(
        OpenAiChatClient::new(ChatClientConfig::new(
            services.inference_url.clone(),
            services.inference_api_key.clone(),
            services.chat_model.clone(),
        ))
        .context("chat client")?,
    );
    let stt: Arc<dyn SpeechToText> = Arc::new(WsSpeechToText::new(
        services.stt_ws_url.clone(),
        services.inference_api_key.clone(),
    ));
    let tts: Arc<dyn SpeechSynthesis> = Arc::new(HttpSpeechSynthesis::new(
        services.inference_url.clone(),
        services.inference_api_key.clone(),
        services.tts_model.clone(),
    ));

    let worker_name = tutor_agent_config::WorkerKind::Orchestrator.worker_name();
    let mut jobs = gateway
        .register(worker_name)
        .await
        .map_err(|e| anyhow::anyhow!("worker registration failed: {e}"))?;

    let deps = Arc::new(PipelineDeps {
        settings,
        gateway,
        control_plane,
        store,
        safety,
        chat,
        stt,
        tts,
        vad,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sessions = JoinSet::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            signal = &mut shutdown => {
                tracing::info!(signal, "shutdown requested");
                break;
            }
            job = jobs.recv() => match job {
                Some(job) => {
                    tracing::info!(room = %job.room_name, "accepted pipeline job");
                    let deps = deps.clone();
                    let shutdown_rx = shutdown_rx.clone();
                    sessions.spawn(async move {
                        if let Err(e) = run_pipeline_job(deps, job, shutdown_rx).await {
                            tracing::error!(error = %e, "pipeline job failed");
                        }
                    });
                }
                None => {
                    tracing::warn!("job stream ended, shutting down");
                    break;
                }
            },
        }
    }
    drain_sessions(shutdown_tx, sessions).await;
    Ok(())
}

async fn run_realtime_worker(
    settings: Settings,
    gateway: Arc<GatewayClient>,
    control_plane: Arc<dyn ControlPlane>,
    store: Arc<dyn LearningStore>,
    safety: Arc<SafetyFilter>,
) -> anyhow::Result<()> {
    // No prewarm for the realtime worker.
    let services = &settings.services;
    let realtime: Arc<dyn RealtimeModel> = Arc::new(WsRealtimeModel::new(WsRealtimeModelConfig {
        ws_url: services.realtime_ws_url.clone(),
        api_key: services.inference_api_key.clone(),
        model: services.realtime_model.clone(),
    }));

    let worker_name = tutor_agent_config::WorkerKind::English.worker_name();
    let mut jobs = gateway
        .register(worker_name)
        .await
        .map_err(|e| anyhow::anyhow!("worker registration failed: {e}"))?;

    let deps = Arc::new(RealtimeDeps {
        settings,
        gateway,
        control_plane,
        store,
        safety,
        realtime,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sessions = JoinSet::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            signal = &mut shutdown => {
                tracing::info!(signal, "shutdown requested");
                break;
            }
            job = jobs.recv() => match job {
                Some(job) => {
                    tracing::info!(room = %job.room_name, "accepted realtime job");
                    let deps = deps.clone();
                    let shutdown_rx = shutdown_rx.clone();
                    sessions.spawn(async move {
                        if let Err(e) = run_realtime_job(deps, job, shutdown_rx).await {
                            tracing::error!(error = %e, "realtime job failed");
                        }
                    });
                }
                None => {
                    tracing::warn!("job stream ended, shutting down");
                    break;
                }
            },
        }
    }
    drain_sessions(shutdown_tx, sessions).await;
    Ok(())
}

/// Flip the worker-wide shutdown flag and wait for every live session to
/// finish its graceful close. Sessions see the flag through the receiver
/// passed into their job runner.
async fn drain_sessions(shutdown_tx: watch::Sender<bool>, mut sessions: JoinSet<()>) {
    let _ = shutdown_tx.send(true);
    if !sessions.is_empty() {
        tracing::info!(live = sessions.len(), "draining live sessions");
    }
    while let Some(result) = sessions.join_next().await {
        if let Err(e) = result {
            tracing::warn!(error = %e, "session task failed");
        }
    }
}

fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("metrics recorder")
}

/// Resolves when the process is asked to stop, naming the signal so the
/// accept loop's drain log carries it. The caller stops accepting jobs and
/// drains live sessions; nothing is torn down here.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("Failed to install SIGTERM handler");
    #[cfg(unix)]
    let terminate = sigterm.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "ctrl-c",
        _ = terminate => "sigterm",
    }
}

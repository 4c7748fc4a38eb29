//! Startup wiring for the two deployment variants.
//!
//! Both variants share the same pipeline: one request queue, one
//! inference worker. They differ only in which source feeds the queue
//! and which router the worker drives.

use crate::config::Config;
use anyhow::{bail, Context, Result};
use lookout_classifier::{resolve_runner, LabelVocabulary, SubprocessClassifier};
use lookout_pipeline::{request_queue, BusRouter, DecisionPolicy, FileRouter, PipelineWorker};
use lookout_sinks::{FtpUploader, LocalStore, MqttPublisher};
use lookout_sources::{connect, BusSubscriber, DirectoryWatcher, WatcherConfig};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Filesystem + FTP variant.
pub async fn run_watch(config: Config) -> Result<()> {
    config.validate_watch()?;

    let watch_dir = config
        .inference
        .image_watch_dir
        .clone()
        .context("watch mode requires inference.image_watch_dir")?;

    let classifier = spawn_classifier(&config).await?;
    let (queue_tx, queue_rx) = request_queue();

    let (watcher, source_shutdown) = DirectoryWatcher::new(
        WatcherConfig {
            dir: watch_dir,
            pattern: config.inference.watch_pattern.clone(),
            poll_interval: Duration::from_millis(config.inference.poll_interval_ms),
        },
        queue_tx,
    )?;

    let transfer = config.ftp.clone().map(FtpUploader::new);
    if transfer.is_none() {
        info!("no ftp section configured, uploads disabled");
    }
    let copy_destination = config
        .file_operations
        .copy
        .then(|| config.file_operations.copy_destination.clone())
        .flatten();
    let router = FileRouter::new(
        transfer,
        LocalStore,
        copy_destination,
        config.file_operations.delete,
    );

    let (worker, worker_shutdown) =
        PipelineWorker::new(decision_policy(&config), classifier, router, queue_rx);

    supervise(Tasks {
        source: tokio::spawn(watcher.run()),
        source_shutdown,
        worker: tokio::spawn(worker.run()),
        worker_shutdown,
    })
    .await
}

/// MQTT bus variant.
pub async fn run_bus(config: Config) -> Result<()> {
    config.validate_bus()?;

    let mqtt = config
        .mqtt
        .clone()
        .context("bus mode requires the mqtt section")?;

    let classifier = spawn_classifier(&config).await?;
    let (queue_tx, queue_rx) = request_queue();

    let (client, eventloop) = connect(&mqtt);
    let (subscriber, source_shutdown) = BusSubscriber::new(
        client.clone(),
        eventloop,
        mqtt.subscribe_topic.as_str(),
        queue_tx,
    );

    let publisher = if mqtt.publish_topic.is_empty() {
        info!("mqtt.publish_topic is empty, publishing disabled");
        None
    } else {
        Some(MqttPublisher::new(client, mqtt.publish_topic.as_str()))
    };
    let save_destination = config
        .save_images
        .enabled
        .then(|| config.save_images.destination.clone())
        .flatten();
    let router = BusRouter::new(publisher, LocalStore, save_destination);

    let (worker, worker_shutdown) =
        PipelineWorker::new(decision_policy(&config), classifier, router, queue_rx);

    supervise(Tasks {
        source: tokio::spawn(subscriber.run()),
        source_shutdown,
        worker: tokio::spawn(worker.run()),
        worker_shutdown,
    })
    .await
}

fn decision_policy(config: &Config) -> DecisionPolicy {
    DecisionPolicy {
        target_label: config.inference.target_label.clone(),
        threshold: config.inference.threshold,
    }
}

async fn spawn_classifier(config: &Config) -> Result<SubprocessClassifier> {
    let vocabulary = LabelVocabulary::load(&config.inference.model_dir)?;
    if !vocabulary.contains(&config.inference.target_label) {
        bail!(
            "target label '{}' is not in the model vocabulary",
            config.inference.target_label
        );
    }

    let runner = resolve_runner(config.inference.classifier_cmd.as_deref());
    SubprocessClassifier::spawn(&runner, &config.inference.model_dir, vocabulary)
        .await
        .context("failed to start the classifier runner")
}

struct Tasks {
    source: JoinHandle<Result<()>>,
    source_shutdown: mpsc::Sender<()>,
    worker: JoinHandle<Result<()>>,
    worker_shutdown: mpsc::Sender<()>,
}

/// Run until ctrl-c or until either task exits on its own, then stop
/// the other side and wait out the shutdown timeout.
async fn supervise(mut tasks: Tasks) -> Result<()> {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("ctrl-c received, shutting down");
        }
        result = &mut tasks.worker => {
            report("inference worker", result);
            let _ = tasks.source_shutdown.send(()).await;
            join_with_timeout(&mut tasks.source, "image source").await;
            return Ok(());
        }
        result = &mut tasks.source => {
            report("image source", result);
            let _ = tasks.worker_shutdown.send(()).await;
            join_with_timeout(&mut tasks.worker, "inference worker").await;
            return Ok(());
        }
    }

    let _ = tasks.source_shutdown.send(()).await;
    let _ = tasks.worker_shutdown.send(()).await;
    join_with_timeout(&mut tasks.source, "image source").await;
    join_with_timeout(&mut tasks.worker, "inference worker").await;
    Ok(())
}

async fn join_with_timeout(handle: &mut JoinHandle<Result<()>>, name: &str) {
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut *handle).await {
        Ok(result) => report(name, result),
        Err(_) => {
            warn!("{name} did not stop within {SHUTDOWN_TIMEOUT:?}, aborting");
            handle.abort();
        }
    }
}

fn report(name: &str, result: std::result::Result<Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("{name} stopped"),
        Ok(Err(e)) => warn!("{name} failed: {e:#}"),
        Err(e) => warn!("{name} task panicked: {e}"),
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use kitchen_amqp::{AmqpClient, AmqpConsumer, AmqpStatusBroadcaster};
use kitchen_core::app::{
    KitchenService, LoggingNotifier, NotificationSubscriber, TrackingService, WorkerLifecycle,
};
use kitchen_core::domain::KitchenError;
use kitchen_core::ports::{Clock, SystemClock};
use kitchen_pg::{PgOrderStore, PgPool, PgWorkerRegistry};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::config::{DbArgs, OrderArgs, SubscriberArgs, WorkerArgs};

async fn pool(db: &DbArgs) -> Result<PgPool> {
    kitchen_pg::connect(&db.database_url, db.max_connections)
        .await
        .context("failed to connect to Postgres")
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Flip `stop` on SIGINT or SIGTERM.
fn spawn_signal_listener(stop: Arc<watch::Sender<bool>>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        stop.send_replace(true);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            warn!(error = %err, "SIGTERM handler unavailable, listening for ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

pub async fn kitchen_worker(args: WorkerArgs) -> Result<()> {
    let pool = pool(&args.db).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let orders = Arc::new(PgOrderStore::new(pool.clone()));
    let lifecycle = Arc::new(WorkerLifecycle::new(
        Arc::new(PgWorkerRegistry::new(pool)),
        clock.clone(),
    ));

    lifecycle
        .ensure_registered(&args.name, args.order_type)
        .await
        .with_context(|| format!("failed to register worker {}", args.name))?;

    // Offline must be recorded even when consuming failed to start.
    let result = start_consuming(&args, orders, lifecycle.clone(), clock).await;

    if let Err(err) = lifecycle.set_offline(&args.name).await {
        error!(worker = %args.name, error = %err, "failed to mark worker offline");
    }
    result
}

/// Everything between registration and going offline.
async fn start_consuming(
    args: &WorkerArgs,
    orders: Arc<PgOrderStore>,
    lifecycle: Arc<WorkerLifecycle>,
    clock: Arc<dyn Clock>,
) -> Result<()> {
    let amqp = AmqpClient::connect(&args.rabbitmq_url)
        .await
        .context("failed to connect to RabbitMQ")?;
    let queue = AmqpConsumer::order_queue(&amqp, args.order_type, args.prefetch, &args.name)
        .await
        .context("failed to bind the order queue")?;
    let broadcaster = AmqpStatusBroadcaster::new(&amqp)
        .await
        .context("failed to open the status broadcaster")?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);
    spawn_signal_listener(stop_tx.clone());

    let heartbeat = tokio::spawn({
        let lifecycle = lifecycle.clone();
        let name = args.name.clone();
        let interval = args.heartbeat_interval();
        let stop_rx = stop_rx.clone();
        let stop_tx = stop_tx.clone();
        async move {
            // Without heartbeats tracking reports us offline; stop taking work.
            let beat = lifecycle.run_heartbeat(&name, interval, stop_rx).await;
            if beat.is_err() {
                stop_tx.send_replace(true);
            }
            beat
        }
    });

    let kitchen = Arc::new(
        KitchenService::new(
            args.name.clone(),
            orders,
            Arc::new(broadcaster),
            lifecycle,
            clock,
        )
        .with_shutdown_grace(args.shutdown_grace()),
    );
    info!(
        worker = %args.name,
        order_type = %args.order_type,
        prefetch = args.prefetch,
        "kitchen worker running"
    );
    let result = kitchen.run(Arc::new(queue), stop_rx).await;

    stop_tx.send_replace(true);
    let beat = heartbeat.await;
    if let Err(err) = amqp.close().await {
        warn!(error = %err, "rabbitmq connection did not close cleanly");
    }
    worker_outcome(result, beat)
}

/// A kitchen error wins; otherwise a failed heartbeat fails the process.
fn worker_outcome(
    kitchen: Result<(), KitchenError>,
    heartbeat: Result<Result<(), KitchenError>, JoinError>,
) -> Result<()> {
    kitchen.context("kitchen service stopped with an error")?;
    match heartbeat {
        Ok(beat) => beat.context("heartbeat failed"),
        Err(err) => {
            error!(error = %err, "heartbeat task ended abnormally");
            Err(err).context("heartbeat task ended abnormally")
        }
    }
}

pub async fn notification_subscriber(args: SubscriberArgs) -> Result<()> {
    let amqp = AmqpClient::connect(&args.rabbitmq_url)
        .await
        .context("failed to connect to RabbitMQ")?;
    let subscription =
        AmqpConsumer::notification_subscription(&amqp, args.prefetch, "notification-subscriber")
            .await
            .context("failed to subscribe to status broadcast")?;

    let (stop_tx, stop_rx) = watch::channel(false);
    spawn_signal_listener(Arc::new(stop_tx));

    let result = NotificationSubscriber::new(Arc::new(LoggingNotifier))
        .run(Arc::new(subscription), stop_rx)
        .await;
    if let Err(err) = amqp.close().await {
        warn!(error = %err, "rabbitmq connection did not close cleanly");
    }
    result.context("notification subscriber stopped with an error")
}

fn tracking(pool: PgPool) -> TrackingService {
    TrackingService::new(
        Arc::new(PgOrderStore::new(pool.clone())),
        Arc::new(PgWorkerRegistry::new(pool)),
        Arc::new(SystemClock),
    )
}

pub async fn order_status(args: OrderArgs) -> Result<()> {
    let view = tracking(pool(&args.db).await?)
        .order_status(&args.order_number)
        .await?;
    print_json(&view)
}

pub async fn order_history(args: OrderArgs) -> Result<()> {
    let history = tracking(pool(&args.db).await?)
        .order_history(&args.order_number)
        .await?;
    print_json(&history)
}

pub async fn workers(args: DbArgs) -> Result<()> {
    let workers = tracking(pool(&args).await?).workers_status().await?;
    print_json(&workers)
}

pub async fn reset_workers(args: DbArgs) -> Result<()> {
    let lifecycle = WorkerLifecycle::new(
        Arc::new(PgWorkerRegistry::new(pool(&args).await?)),
        Arc::new(SystemClock),
    );
    let changed = lifecycle.set_all_offline().await?;
    println!("{changed} worker(s) marked offline");
    Ok(())
}

pub async fn migrate(args: DbArgs) -> Result<()> {
    let pool = pool(&args).await?;
    kitchen_pg::migrate(&pool).await.context("migration failed")?;
    info!("migrations applied");
    Ok(())
}

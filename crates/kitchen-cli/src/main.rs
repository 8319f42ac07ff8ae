use anyhow::Result;
use clap::Parser;

mod commands;
mod config;
mod telemetry;

use config::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    telemetry::init(cli.log_json);

    match cli.command {
        Command::KitchenWorker(args) => commands::kitchen_worker(args).await,
        Command::NotificationSubscriber(args) => commands::notification_subscriber(args).await,
        Command::OrderStatus(args) => commands::order_status(args).await,
        Command::OrderHistory(args) => commands::order_history(args).await,
        Command::Workers(args) => commands::workers(args).await,
        Command::ResetWorkers(args) => commands::reset_workers(args).await,
        Command::Migrate(args) => commands::migrate(args).await,
    }
}

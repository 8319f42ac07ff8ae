use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use kitchen_core::domain::OrderType;

#[derive(Debug, Parser)]
#[command(name = "kitchen")]
#[command(about = "Kitchen fulfillment workers and order tracking")]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, env = "KITCHEN_LOG_JSON", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Consume orders of one type and cook them
    KitchenWorker(WorkerArgs),
    /// Print every order status change
    NotificationSubscriber(SubscriberArgs),
    /// Current status of one order
    OrderStatus(OrderArgs),
    /// Applied status transitions of one order
    OrderHistory(OrderArgs),
    /// Registered workers with presence
    Workers(DbArgs),
    /// Mark every worker offline (after a crash left rows online)
    ResetWorkers(DbArgs),
    /// Apply database migrations
    Migrate(DbArgs),
}

#[derive(Debug, Args)]
pub struct DbArgs {
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    #[arg(long, env = "KITCHEN_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,
}

#[derive(Debug, Args)]
pub struct OrderArgs {
    pub order_number: String,

    #[command(flatten)]
    pub db: DbArgs,
}

#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Unique worker identity
    #[arg(long = "worker-name", env = "KITCHEN_WORKER_NAME")]
    pub name: String,

    /// dine_in, takeout or delivery
    #[arg(long, env = "KITCHEN_ORDER_TYPE", value_parser = parse_order_type)]
    pub order_type: OrderType,

    /// Unacknowledged deliveries in flight at once
    #[arg(long, env = "KITCHEN_PREFETCH", default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub prefetch: u16,

    #[arg(long, env = "KITCHEN_HEARTBEAT_SECS", default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub heartbeat_secs: u64,

    /// How long to wait for orders still cooking on shutdown
    #[arg(long, env = "KITCHEN_SHUTDOWN_GRACE_SECS", default_value_t = 30)]
    pub shutdown_grace_secs: u64,

    #[arg(long, env = "RABBITMQ_URL", hide_env_values = true)]
    pub rabbitmq_url: String,

    #[command(flatten)]
    pub db: DbArgs,
}

impl WorkerArgs {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Args)]
pub struct SubscriberArgs {
    #[arg(long, env = "RABBITMQ_URL", hide_env_values = true)]
    pub rabbitmq_url: String,

    #[arg(long, env = "KITCHEN_PREFETCH", default_value_t = 1)]
    pub prefetch: u16,
}

fn parse_order_type(raw: &str) -> Result<OrderType, String> {
    raw.parse().map_err(|err: kitchen_core::domain::KitchenError| err.to_string())
}

//! orderbot - An IRC Bot Engine
//!
//! This is the main entry point for the bot.
//! It loads the configuration, registers the orders, connects and joins.

use orderbot::commands::{help_order, CommandHandler, Event, Nickname, Order, OrderRegistry};
use orderbot::config::{Cli, Config};
use orderbot::connection::Connection;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

fn print_help() {
    println!(
        r#"
orderbot - An IRC bot engine

USAGE:
    orderbot [OPTIONS]

OPTIONS:
    -C, --config <FILE>      TOML config file
    -s, --server <HOST>      IRC server (default: 127.0.0.1)
    -p, --port <PORT>        IRC port (default: 6667)
    -n, --nick <NICK>        Nickname (default: orderbot)
    -c, --channel <CHANNEL>  Channel to join (default: #orderbot)
    -w, --workers <N>        Concurrent handlers (default: 10)
        --log-file <FILE>    Append logs to FILE
    -v, --verbose            Raise verbosity (repeat for debug)
    -V, --version            Print version information
        --help               Print this help message

ORDERS:
    Send the bot a private message, or address it in the channel:
    /msg orderbot hello
    orderbot: help
"#
    );
}

/// The orders this binary ships with.
fn build_orders() -> anyhow::Result<OrderRegistry> {
    let mut orders = OrderRegistry::new();
    orders.register([Order::build("^hello", "hello - say hi", |inv| {
        Ok(format!("Hi, {}", inv.sender).into())
    })?])?;

    let help = help_order(&orders, "^help", "help - list available commands")?;
    orders.register([help])?;
    Ok(orders)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_args() {
        Ok(Cli::Run(config)) => config,
        Ok(Cli::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Cli::Version) => {
            println!("orderbot version {}", orderbot::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    orderbot::logging::init(&config.log)?;

    let orders = build_orders()?;
    info!(orders = orders.len(), "Orders registered");

    let nickname = Arc::new(Nickname::new(config.bot.nickname.clone()));
    let handler = CommandHandler::new(nickname, Arc::new(orders)).with_listener(Arc::new(
        |event: &Event| {
            if let Event::NickChanged { old, new } = event {
                info!(old = %old, new = %new, "Nick changed");
            }
        },
    ));

    let mut conn = Connection::new(Arc::new(handler), config.connection_options());

    if let Err(e) = conn.connect(&config.server.host, config.server.port).await {
        error!(error = %e, "Connection failed");
        std::process::exit(1);
    }

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, disconnecting...");
    };

    tokio::select! {
        result = conn.join(&config.bot.channel) => {
            if let Err(e) = result {
                error!(error = %e, "Connection ended with error");
            }
        }
        _ = shutdown => {}
    }

    conn.disconnect().await;
    info!("Bot shutdown complete");
    Ok(())
}

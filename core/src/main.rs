/// HomeLink chat - demo terminal client for the sync engine
use colored::*;
use homelink_core::{ChatClient, ChatUpdate, Config, HttpApi};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config =
        Config::from_args(&args).map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let api = Arc::new(
        HttpApi::new(&config.rest_base_url, config.fetch_timeout)
            .map_err(|e| anyhow::anyhow!("REST client error: {}", e))?,
    );
    let client = ChatClient::new(config.clone(), api);

    info!("Starting HomeLink chat for user {}", config.local_user_id);
    client
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Session error: {}", e))?;

    spawn_update_printer(&client);
    print_usage();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(3, ' ');
        match parts.next().unwrap_or("") {
            "/open" => match parts.next().and_then(|s| s.parse().ok()) {
                Some(peer) => match client.open_conversation(peer).await {
                    Ok(()) => print_history(&client).await,
                    Err(e) => eprintln!("{} {}", "✗".red().bold(), e),
                },
                None => eprintln!("{}", "Usage: /open <peer_id>".yellow()),
            },
            "/send" => {
                let peer = parts.next().and_then(|s| s.parse().ok());
                let text = parts.next().unwrap_or("");
                match peer {
                    Some(peer) => {
                        if let Err(e) = client.send_message(peer, text).await {
                            eprintln!("{} {}", "✗".red().bold(), e);
                        }
                    }
                    None => eprintln!("{}", "Usage: /send <peer_id> <message>".yellow()),
                }
            }
            "/contacts" => {
                if let Err(e) = client.refresh_contacts().await {
                    eprintln!("{} {}", "✗".red().bold(), e);
                    continue;
                }
                for contact in client.conversations("").await {
                    let dot = if contact.online {
                        "●".green()
                    } else {
                        "○".dimmed()
                    };
                    let unread = if contact.unread_count > 0 {
                        format!(" ({})", contact.unread_count).red().to_string()
                    } else {
                        String::new()
                    };
                    println!(
                        "{} {} {}{} {}",
                        dot,
                        contact.id,
                        contact.display_name.bold(),
                        unread,
                        contact.last_message.as_deref().unwrap_or("").dimmed()
                    );
                }
            }
            "/status" => {
                let state = if client.is_connected() {
                    "connected".green()
                } else {
                    "reconnecting".yellow()
                };
                println!(
                    "{} | open: {:?} | unread: {}",
                    state,
                    client.open_peer().await,
                    client.unread_total().await
                );
            }
            "/quit" => break,
            other => {
                eprintln!("{} Unknown command: {}", "✗".red().bold(), other.red());
                print_usage();
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

/// Echo engine activity to the terminal as it happens
fn spawn_update_printer(client: &ChatClient) {
    let client = client.clone();
    let mut updates = client.subscribe_updates();
    tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            match update {
                ChatUpdate::Messages => {
                    if let Some(last) = client.messages().await.last() {
                        let who = if last.sender_id == client.local_user_id() {
                            "you:".dimmed()
                        } else {
                            format!("{}:", last.sender_id).cyan()
                        };
                        println!("{} {}", who, last.content);
                    }
                }
                ChatUpdate::Typing => {
                    if let Some(peer) = client.typing_peer().await {
                        println!("{}", format!("{} is typing...", peer).dimmed());
                    }
                }
                ChatUpdate::Connection => {
                    if client.is_connected() {
                        println!("{}", "connected".green());
                    } else {
                        println!("{}", "reconnecting...".yellow());
                    }
                }
                _ => {}
            }
        }
    });
}

async fn print_history(client: &ChatClient) {
    for day in client.grouped_messages().await {
        println!("{}", format!("── {} ──", day.date).dimmed());
        for group in day.groups {
            for message in group.messages {
                println!(
                    "  {} {}",
                    format!("{}:", message.sender_id).cyan(),
                    message.content
                );
            }
        }
    }
}

fn print_usage() {
    println!("{}", "Commands:".bold());
    println!("  /open <peer_id>            open a conversation");
    println!("  /send <peer_id> <message>  send a message");
    println!("  /contacts                  refresh and list conversations");
    println!("  /status                    connection and unread status");
    println!("  /quit                      exit");
}

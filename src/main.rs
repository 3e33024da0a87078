use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use amity::{
    cache::RelationCache,
    config::{Cli, Command},
    domain::{Aggregate, PendingState, Principal},
    notification::unread_count,
    reconcile::{Reconciler, RelationError},
    rpc::RpcBackend,
    signals,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.config;

    let viewer = config
        .viewer_principal()
        .map_err(|e| anyhow::anyhow!("--viewer: {e}"))?;
    let backend = RpcBackend::new(
        &config.api_base_url,
        &config.session_token,
        Duration::from_secs(config.request_timeout_secs),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?;
    let backend = Arc::new(backend);
    let cache = Arc::new(RelationCache::new(Duration::from_secs(
        config.cache_ttl_secs,
    )));
    let reconciler = Reconciler::new(viewer, Arc::clone(&backend), cache);

    match cli.command {
        Command::Status(args) => {
            let target = parse_target(&args.target)?;
            signals::record_profile_view(&backend, &target);
            let snapshot = reconciler
                .resolve_relationship(&target)
                .await
                .map_err(relation_err)?;
            let following = reconciler.resolve_follow(&target).await.map_err(relation_err)?;
            println!("connected: {}", yes_no(snapshot.connected));
            println!(
                "outgoing request pending: {}",
                pending_label(snapshot.outgoing_pending)
            );
            println!(
                "incoming request pending: {}",
                pending_label(snapshot.incoming_pending)
            );
            println!("following: {}", yes_no(following));
        }
        Command::Follow(args) => {
            let target = parse_target(&args.target)?;
            reconciler.follow(&target).await.map_err(relation_err)?;
            println!("now following {target}");
        }
        Command::Unfollow(args) => {
            let target = parse_target(&args.target)?;
            reconciler.unfollow(&target).await.map_err(relation_err)?;
            println!("unfollowed {target}");
        }
        Command::Request(args) => {
            let target = parse_target(&args.target)?;
            reconciler
                .send_connection_request(&target)
                .await
                .map_err(relation_err)?;
            println!("connection request sent to {target}");
        }
        Command::Cancel(args) => {
            let target = parse_target(&args.target)?;
            reconciler
                .cancel_connection_request(&target)
                .await
                .map_err(relation_err)?;
            println!("connection request to {target} cancelled");
        }
        Command::Accept(args) => {
            let target = parse_target(&args.target)?;
            reconciler
                .accept_connection_request(&target)
                .await
                .map_err(relation_err)?;
            println!("connection request from {target} accepted");
        }
        Command::Decline(args) => {
            let target = parse_target(&args.target)?;
            reconciler
                .decline_connection_request(&target)
                .await
                .map_err(relation_err)?;
            println!("connection request from {target} declined");
        }
        Command::Connections => {
            let viewer = reconciler.viewer().clone();
            let list = reconciler.connections(&viewer).await.map_err(relation_err)?;
            print_principals(&list);
        }
        Command::Requests => match reconciler.pending_requests().await.map_err(relation_err)? {
            Aggregate::Ready(lists) => {
                println!("incoming:");
                print_principals(&lists.incoming);
                println!("outgoing:");
                print_principals(&lists.outgoing);
            }
            Aggregate::Unsupported => {
                println!("unavailable: the backend does not expose pending request lists");
            }
        },
        Command::Following => match reconciler.following().await.map_err(relation_err)? {
            Aggregate::Ready(list) => print_principals(&list),
            Aggregate::Unsupported => {
                println!("unavailable: the backend does not expose the following list");
            }
        },
        Command::Notifications => {
            let items = reconciler.notifications().await.map_err(relation_err)?;
            println!("{} unread", unread_count(&items));
            for item in &items {
                let marker = if item.is_read { " " } else { "*" };
                println!("{marker} {} {}", item.id, item.payload.summary());
            }
        }
        Command::Read(args) => {
            reconciler
                .mark_notification_read(&args.id)
                .await
                .map_err(relation_err)?;
            println!("marked {} as read", args.id);
        }
        Command::ReadAll => {
            reconciler
                .mark_all_notifications_read()
                .await
                .map_err(relation_err)?;
            println!("marked all notifications as read");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

fn parse_target(text: &str) -> Result<Principal> {
    Principal::from_text(text).map_err(|e| anyhow::anyhow!("{e}"))
}

fn relation_err(e: RelationError) -> anyhow::Error {
    if e.is_privacy_denied() {
        anyhow::anyhow!("the target's privacy settings do not allow this action: {e}")
    } else {
        anyhow::anyhow!("{e}")
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn pending_label(state: PendingState) -> &'static str {
    match state {
        PendingState::Known(true) => "yes",
        PendingState::Known(false) => "no",
        PendingState::Unknown => "unknown (backend cannot answer)",
    }
}

fn print_principals(list: &[Principal]) {
    if list.is_empty() {
        println!("(none)");
    }
    for p in list {
        println!("{p}");
    }
}

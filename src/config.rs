use clap::{Args, Parser, Subcommand};

use crate::domain::{DomainError, Principal};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "amity",
    about = "Social relationship client",
    version = crate::version::VERSION,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show relationship and follow status for a target principal.
    Status(TargetArgs),

    /// Follow a target principal.
    Follow(TargetArgs),

    /// Unfollow a target principal.
    Unfollow(TargetArgs),

    /// Send a connection request to a target principal.
    Request(TargetArgs),

    /// Cancel a previously sent connection request.
    Cancel(TargetArgs),

    /// Accept an incoming connection request.
    Accept(TargetArgs),

    /// Decline an incoming connection request.
    Decline(TargetArgs),

    /// List the viewer's connections.
    Connections,

    /// List pending connection requests, if the backend supports the query.
    Requests,

    /// List who the viewer follows, if the backend supports the query.
    Following,

    /// List notifications for the viewer.
    Notifications,

    /// Mark one notification as read.
    Read(ReadArgs),

    /// Mark all notifications as read.
    ReadAll,
}

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    #[arg(value_name = "PRINCIPAL")]
    pub target: String,
}

#[derive(Args, Debug, Clone)]
pub struct ReadArgs {
    #[arg(value_name = "NOTIFICATION_ID")]
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    #[arg(
        long,
        global = true,
        env = "AMITY_API_BASE_URL",
        value_name = "ORIGIN",
        default_value = "http://127.0.0.1:8943"
    )]
    pub api_base_url: String,

    #[arg(
        long,
        global = true,
        env = "AMITY_SESSION_TOKEN",
        value_name = "TOKEN",
        default_value = ""
    )]
    pub session_token: String,

    /// Principal of the signed-in viewer, as issued by the identity provider.
    #[arg(
        long,
        global = true,
        env = "AMITY_VIEWER",
        value_name = "PRINCIPAL",
        default_value = ""
    )]
    pub viewer: String,

    #[arg(
        long = "cache-ttl-secs",
        global = true,
        env = "AMITY_CACHE_TTL_SECS",
        value_name = "SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..=3600)
    )]
    pub cache_ttl_secs: u64,

    #[arg(
        long = "request-timeout-secs",
        global = true,
        env = "AMITY_REQUEST_TIMEOUT_SECS",
        value_name = "SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..=120)
    )]
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn viewer_principal(&self) -> Result<Principal, DomainError> {
        Principal::from_text(&self.viewer)
    }
}

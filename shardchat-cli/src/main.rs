use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use shardchat_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "shardchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    server: SocketAddr,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new account and print its access token
    CreateUser {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Rotate the access token for an existing account
    ChangeToken {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Show the calling account and its chat memberships
    MyInfo {
        #[arg(short, long)]
        token: String,
    },
    /// Create a chat; the caller becomes its admin
    CreateChat {
        #[arg(short, long)]
        token: String,
        #[arg(short, long)]
        name: String,
        /// Make the chat readable by non-members
        #[arg(long)]
        visible: bool,
        /// Initial member usernames, repeatable
        #[arg(short, long)]
        member: Vec<String>,
    },
    /// Fetch chat metadata
    GetChat {
        #[arg(short, long)]
        token: String,
        #[arg(short, long)]
        chat_id: u64,
    },
    /// Update a chat property (name or is_visible), admin only
    SetChatProperty {
        #[arg(short, long)]
        token: String,
        #[arg(short, long)]
        chat_id: u64,
        #[arg(short, long)]
        property: String,
        #[arg(short, long)]
        value: String,
    },
    /// Invite a user into a chat
    AddMember {
        #[arg(short, long)]
        token: String,
        #[arg(short, long)]
        chat_id: u64,
        #[arg(short, long)]
        user_id: u64,
    },
    /// Remove a user from a chat, admin only
    KickMember {
        #[arg(short, long)]
        token: String,
        #[arg(short, long)]
        chat_id: u64,
        #[arg(short, long)]
        user_id: u64,
    },
    /// Send a message to a chat
    SendMessage {
        #[arg(short, long)]
        token: String,
        #[arg(short, long)]
        chat_id: u64,
        text: String,
    },
    /// Fetch the newest messages of a chat
    LastMessages {
        #[arg(short, long)]
        token: String,
        #[arg(short, long)]
        chat_id: u64,
        #[arg(short, long, default_value_t = 20)]
        num: i64,
    },
}

impl Command {
    fn request(&self) -> (&'static str, Value) {
        match self {
            Command::CreateUser { username, password } => (
                "user.create",
                json!({ "username": username, "password": password }),
            ),
            Command::ChangeToken { username, password } => (
                "access_token.change",
                json!({ "username": username, "password": password }),
            ),
            Command::MyInfo { token } => ("user.getmyinfo", json!({ "access_token": token })),
            Command::CreateChat {
                token,
                name,
                visible,
                member,
            } => (
                "chat.create",
                json!({
                    "access_token": token,
                    "name": name,
                    "is_visible": visible,
                    "members": member,
                }),
            ),
            Command::GetChat { token, chat_id } => (
                "chat.get",
                json!({ "access_token": token, "chat_id": chat_id }),
            ),
            Command::SetChatProperty {
                token,
                chat_id,
                property,
                value,
            } => (
                "chat.set.property",
                json!({
                    "access_token": token,
                    "chat_id": chat_id,
                    "property": property,
                    "value": value,
                }),
            ),
            Command::AddMember {
                token,
                chat_id,
                user_id,
            } => (
                "chat.addmember",
                json!({ "access_token": token, "chat_id": chat_id, "user_id": user_id }),
            ),
            Command::KickMember {
                token,
                chat_id,
                user_id,
            } => (
                "chat.kickmember",
                json!({ "access_token": token, "chat_id": chat_id, "user_id": user_id }),
            ),
            Command::SendMessage {
                token,
                chat_id,
                text,
            } => (
                "chat.sendmessage",
                json!({ "access_token": token, "chat_id": chat_id, "text": text }),
            ),
            Command::LastMessages {
                token,
                chat_id,
                num,
            } => (
                "chat.getlastmessages",
                json!({ "access_token": token, "chat_id": chat_id, "num": num }),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = LogLevel::from_str(&args.log_level).unwrap_or_else(|| {
        eprintln!("Invalid log level '{}', using 'warn'", args.log_level);
        LogLevel::Warn
    });
    init_logging_with_config(LogConfig::new(log_level).json_format(args.json_logs))?;

    let (method, params) = args.command.request();
    let payload = json!({ "method": method, "params": params }).to_string();
    debug!(server = %args.server, method, "sending request");

    let mut stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("cannot connect to {}", args.server))?;
    stream.write_all(payload.as_bytes()).await?;
    stream.shutdown().await?;

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;

    // replies are JSON except the oversized-query notice
    match serde_json::from_slice::<Value>(&reply) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", String::from_utf8_lossy(&reply)),
    }
    Ok(())
}

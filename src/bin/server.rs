use clap::{Parser, ValueEnum};
use colored::*;
use conversation_sync::{serve_client, Conversation, ConversationConfig, DeliveryPolicy};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "conversation-server")]
#[command(about = "Collaborative editing server hosting a single conversation")]
struct Cli {
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    address: String,

    /// Initial document content
    #[arg(short, long, default_value = "")]
    content: String,

    #[arg(long, default_value = "1")]
    conversation_id: i64,

    /// Messages buffered per client before the delivery policy kicks in
    #[arg(long, default_value = "256")]
    outbound_capacity: usize,

    #[arg(long, value_enum, default_value_t = Policy::Disconnect)]
    policy: Policy,

    /// Send a fresh snapshot to clients whose edits fail to apply
    #[arg(long)]
    resync: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Disconnect clients whose queue is full
    Disconnect,
    /// Wait for slow clients to catch up
    Block,
}

impl From<Policy> for DeliveryPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Disconnect => DeliveryPolicy::DisconnectOnFull,
            Policy::Block => DeliveryPolicy::Block,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = ConversationConfig {
        outbound_capacity: cli.outbound_capacity,
        delivery: cli.policy.into(),
        notify_rejected_patches: cli.resync,
        ..ConversationConfig::default()
    };

    println!("{}", "🚀 Starting Conversation Server".green().bold());
    println!("📍 Address: {}", cli.address.cyan());
    println!("📄 Initial content: \"{}\"", cli.content.blue());

    let (handle, _conversation) = Conversation::spawn(cli.conversation_id, cli.content, config);

    let listener = TcpListener::bind(&cli.address).await?;
    println!("✅ Server listening on {}", cli.address.green());

    // Identity normally comes from an auth layer; hand out sequential ids instead
    let mut next_user_id = 1;
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let user_id = next_user_id;
                next_user_id += 1;
                println!(
                    "🔌 New connection from {} (user {})",
                    addr.to_string().yellow(),
                    user_id.to_string().cyan()
                );

                let handle = handle.clone();
                tokio::spawn(async move {
                    match serve_client(stream, handle, user_id).await {
                        Ok(()) => println!("👋 User {} disconnected", user_id),
                        Err(e) => eprintln!("❌ Client error: {}", e.to_string().red()),
                    }
                });
            }
            Err(e) => {
                eprintln!("❌ Failed to accept connection: {}", e);
            }
        }
    }
}

use clap::{Parser, Subcommand};
use colored::*;
use conversation_sync::{
    make_patch, ClientId, Conversation, ConversationConfig, ConversationHandle, Message,
    MessageType, Patch, UpdateKind, UserId,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "conversation-demo")]
#[command(about = "In-process demonstration of a collaborative conversation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Two users take turns editing, with every message printed
    Walkthrough {
        #[arg(short, long, default_value = "hello")]
        initial_text: String,
    },
    /// Several users edit concurrently with random insertions
    Simulate {
        #[arg(short, long, default_value = "4")]
        clients: usize,
        #[arg(short, long, default_value = "10")]
        rounds: usize,
    },
}

const WORDS: &[&str] = &["quick", "brown", "fox", "lazy", "dog", "jumps", "over", "red"];

/// A simulated participant keeping its own copy of the document
struct Peer {
    name: String,
    id: ClientId,
    text: String,
    direct: mpsc::UnboundedReceiver<Vec<u8>>,
    inbox: mpsc::Receiver<Vec<u8>>,
}

impl Peer {
    async fn join(handle: &ConversationHandle, user_id: UserId, name: &str) -> Result<Self, String> {
        let (direct_tx, mut direct) = mpsc::unbounded_channel();
        let (client, inbox) = handle.client(user_id, direct_tx);
        let id = client.id();
        handle.register(client).await.map_err(|e| e.to_string())?;

        let init = direct.recv().await.ok_or("registration refused")?;
        let init = Message::decode(&init).map_err(|e| e.to_string())?;
        Ok(Self {
            name: name.to_string(),
            id,
            text: init.data.content.unwrap_or_default(),
            direct,
            inbox,
        })
    }

    /// Edit the local copy and send the change
    async fn edit(&mut self, handle: &ConversationHandle, new_text: String) -> Result<(), String> {
        let patch = make_patch(&self.text, &new_text);
        let delta = new_text.chars().count() as i64 - self.text.chars().count() as i64;
        self.text = new_text;

        let message = Message::edit(1, patch.to_text(), delta);
        let payload = message.encode().map_err(|e| e.to_string())?;
        handle.broadcast(payload, self.id).await.map_err(|e| e.to_string())
    }

    /// Apply everything waiting in the queue; returns the messages seen
    fn drain(&mut self) -> Vec<Message> {
        let mut seen = Vec::new();
        while let Ok(raw) = self.direct.try_recv().or_else(|_| self.inbox.try_recv()) {
            let Ok(message) = Message::decode(&raw) else {
                continue;
            };
            match (message.kind, &message.data.kind) {
                (MessageType::Update, Some(UpdateKind::Edit)) => {
                    if let Some(Ok(patch)) = message.data.patch.as_deref().map(Patch::from_text) {
                        self.text = patch.apply(&self.text).0;
                    }
                }
                (MessageType::Init, _) => {
                    self.text = message.data.content.clone().unwrap_or_default();
                }
                _ => {}
            }
            seen.push(message);
        }
        seen
    }

    /// Drain the queue, printing each message as it arrived on the wire
    fn show(&mut self) {
        for message in self.drain() {
            let line = String::from_utf8(message.encode().unwrap_or_default()).unwrap_or_default();
            println!("  {} ⬅ {}", self.name.green(), line.dimmed());
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Walkthrough { initial_text } => run_walkthrough(initial_text).await,
        Commands::Simulate { clients, rounds } => run_simulation(clients, rounds).await,
    };
    if let Err(e) = result {
        eprintln!("❌ {}", e.red());
    }
}

async fn run_walkthrough(initial_text: String) -> Result<(), String> {
    println!("{}", "=== Conversation Walkthrough ===".bold().cyan());
    let (handle, conversation) = Conversation::spawn(1, initial_text, ConversationConfig::default());

    let mut alice = Peer::join(&handle, 1, "Alice").await?;
    println!("{} joined, sees \"{}\"", alice.name.green(), alice.text.blue());
    let mut bob = Peer::join(&handle, 2, "Bob").await?;
    println!("{} joined, sees \"{}\"", bob.name.green(), bob.text.blue());
    settle().await;
    alice.show();

    let edited = alice.text.replacen('e', "u", 1);
    println!("\n{} edits to \"{}\"", alice.name.green(), edited.yellow());
    alice.edit(&handle, edited).await?;
    settle().await;
    alice.show();
    bob.show();

    let edited = format!("{}!", bob.text);
    println!("\n{} edits to \"{}\"", bob.name.green(), edited.yellow());
    bob.edit(&handle, edited).await?;
    settle().await;
    alice.show();
    bob.show();

    drop(handle);
    let document = conversation.await.map_err(|e| e.to_string())?;
    println!("\n📄 Final document: {}", document.to_string().bold());
    Ok(())
}

async fn run_simulation(clients: usize, rounds: usize) -> Result<(), String> {
    println!("{}", "=== Concurrent Edit Simulation ===".bold().cyan());
    let config = ConversationConfig {
        notify_rejected_patches: true,
        ..ConversationConfig::default()
    };
    let (handle, conversation) =
        Conversation::spawn(1, "The quick brown fox jumps over the lazy dog", config);

    let mut peers = Vec::with_capacity(clients);
    for i in 0..clients {
        let peer = Peer::join(&handle, i as UserId + 1, &format!("user{}", i + 1)).await?;
        peers.push(peer);
    }

    let mut rng = rand::thread_rng();
    for round in 1..=rounds {
        for peer in &mut peers {
            let chars: Vec<char> = peer.text.chars().collect();
            let at = rng.gen_range(0..=chars.len());
            let word = WORDS.choose(&mut rng).copied().unwrap_or("word");
            let mut new_text: String = chars[..at].iter().collect();
            new_text.push_str(word);
            new_text.push(' ');
            new_text.extend(&chars[at..]);
            peer.edit(&handle, new_text).await?;
        }
        settle().await;
        for peer in &mut peers {
            peer.drain();
        }
        println!("Round {:>3}: {}", round, peers[0].text.dimmed());
    }

    let observer = Peer::join(&handle, 0, "observer").await?;
    settle().await;
    for peer in &mut peers {
        peer.drain();
    }

    let mut converged = 0;
    for peer in &peers {
        if peer.text == observer.text {
            converged += 1;
        } else {
            println!("{} diverged: \"{}\"", peer.name.yellow(), peer.text);
        }
    }

    drop(handle);
    let document = conversation.await.map_err(|e| e.to_string())?;
    println!("\n📄 Server document (v{}): \"{}\"", document.version, document.content.blue());
    println!(
        "{} {}/{} clients match the server",
        if converged == peers.len() { "✅".green() } else { "⚠️".yellow() },
        converged,
        peers.len()
    );
    Ok(())
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}


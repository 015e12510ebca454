use anyhow::{Context, Result};
use chatstore::{Op, OpResult, StoreConfig, StoreContext};
use clap::{Parser, Subcommand};
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

/// Inspect and drive the chat history store
#[derive(Parser)]
#[command(name = "chatstore", version, about)]
struct Cli {
    /// Use the local Redis-compatible server
    #[arg(long, global = true)]
    local: bool,

    /// Address of the local server (overrides LOCAL_REDIS_URL)
    #[arg(long, global = true)]
    local_url: Option<String>,

    /// REST endpoint of the remote service (overrides UPSTASH_REDIS_REST_URL)
    #[arg(long, global = true)]
    remote_url: Option<String>,

    /// Bearer token of the remote service (overrides UPSTASH_REDIS_REST_TOKEN)
    #[arg(long, global = true)]
    remote_token: Option<String>,

    /// Connect timeout in milliseconds (overrides REDIS_CONNECT_TIMEOUT_MS)
    #[arg(long, global = true)]
    connect_timeout_ms: Option<u64>,

    /// Skip the PING sent to the remote service while resolving
    #[arg(long, global = true)]
    no_verify: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the resolved backend and its state
    Status,

    /// Run one command: HGETALL, HSET, ZADD, ZREM, ZRANGE or DEL
    Exec {
        /// Command name followed by its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

impl Cli {
    fn config(&self) -> StoreConfig {
        let mut config = StoreConfig::from_env();
        if self.local {
            config.use_local_backend = true;
        }
        if let Some(url) = &self.local_url {
            config.local_url = url.clone();
        }
        if let Some(url) = &self.remote_url {
            config.remote_url = Some(url.clone());
        }
        if let Some(token) = &self.remote_token {
            config.remote_token = Some(token.clone());
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout_ms = ms;
        }
        if self.no_verify {
            config.verify_remote = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays clean
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let context = StoreContext::new(cli.config());
    let outcome = run(&context, cli.command).await;
    context.close().await.context("closing the store")?;
    outcome
}

async fn run(context: &StoreContext, command: Command) -> Result<()> {
    let store = context.get().await;

    match command {
        Command::Status => {
            println!("backend: {}", store.kind());
            println!("state:   {}", context.state());
            if let Some(stats) = store.memory_stats() {
                println!(
                    "keys:    {} ({} hashes, {} sorted sets, {} members)",
                    stats.keys, stats.hashes, stats.sorted_sets, stats.members
                );
            }
        }
        Command::Exec { args } => {
            let op = Op::parse(&args)?;
            debug!("Parsed {:?}", op);
            let result = store
                .execute(&op)
                .await
                .with_context(|| format!("{} failed", op.name()))?;
            print_result(&result);
        }
    }
    Ok(())
}

/// Print a result the way redis-cli does
fn print_result(result: &OpResult) {
    match result {
        OpResult::Hash(None) => println!("(nil)"),
        OpResult::Hash(Some(record)) => {
            for (i, (field, value)) in record.iter().enumerate() {
                println!("{}) {}: {}", i + 1, field, value);
            }
        }
        OpResult::Ack => println!("OK"),
        OpResult::Inserted(flag) | OpResult::Removed(flag) | OpResult::Deleted(flag) => {
            println!("(integer) {}", *flag as i64)
        }
        OpResult::Members(members) if members.is_empty() => println!("(empty list)"),
        OpResult::Members(members) => {
            for (i, member) in members.iter().enumerate() {
                println!("{}) \"{}\"", i + 1, member);
            }
        }
    }
}

use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use postchat_core::config::{resolve_with_base, Config, Settings};
use postchat_core::data_processor::DataProcessor;
use postchat_core::locks::PostLocks;
use postchat_core::memory::{MemoryExchangeRepository, MemoryPostRepository};
use postchat_core::signal::StopSignal;
use postchat_core::types::{ChatState, Post, PostId, Requester};
use postchat_embed::get_default_embedder;
use postchat_generate::GenerationClient;
use postchat_jobs::{EmbeddingWorker, MemoryJobQueue, RetryPolicy, WorkerPool};
use postchat_service::{ChatOrchestrator, Collaborators, Intent};
use postchat_vector::{EmbeddingCache, MemoryChunkStore, RetrievalEngine};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.is_empty() {
        eprintln!("Usage: {} <ask|ingest|classify> [args...]", prog);
        std::process::exit(1);
    }
    let cmd = args.remove(0);
    (cmd, args)
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

struct App {
    posts: Arc<MemoryPostRepository>,
    processor: DataProcessor,
    pool: WorkerPool,
    orchestrator: ChatOrchestrator,
}

impl App {
    fn build(settings: &Settings) -> anyhow::Result<Self> {
        let posts = Arc::new(MemoryPostRepository::new());
        let chunks = Arc::new(MemoryChunkStore::new());
        let locks = PostLocks::new();
        let embedder = get_default_embedder(&settings.embedding)?;
        let queue = Arc::new(MemoryJobQueue::new(RetryPolicy::from_settings(&settings.queue)));
        let worker = Arc::new(EmbeddingWorker::new(
            posts.clone(),
            chunks.clone(),
            embedder.clone(),
            Arc::new(EmbeddingCache::new(settings.embedding.cache_capacity)),
            DataProcessor::with_settings(settings.chunking.clone()),
            locks.clone(),
        ));
        let pool = WorkerPool::spawn(queue.clone(), worker, settings.queue.workers, StopSignal::new());
        let orchestrator = ChatOrchestrator::new(
            Collaborators {
                posts: posts.clone(),
                chunks: chunks.clone(),
                exchanges: Arc::new(MemoryExchangeRepository::new()),
                queue,
                retrieval: RetrievalEngine::new(embedder, chunks, settings.retrieval.top_k),
                generator: Arc::new(GenerationClient::new(&settings.generation)?),
            },
            locks,
            settings.chat.clone(),
        );
        Ok(Self { posts, processor: DataProcessor::with_settings(settings.chunking.clone()), pool, orchestrator })
    }

    /// Wait until every post left the pending state; returns how many became ready.
    async fn wait_settled(&self, post_ids: &[PostId], pb: &ProgressBar) -> anyhow::Result<usize> {
        loop {
            let mut ready = 0usize;
            let mut pending = 0usize;
            for id in post_ids {
                match self.orchestrator.chat_state(*id).await? {
                    Some(ChatState::Ready) => ready += 1,
                    Some(ChatState::PendingEmbedding) => pending += 1,
                    _ => {}
                }
            }
            pb.set_message(format!("embedding: {} ready, {} pending", ready, pending));
            if pending == 0 {
                return Ok(ready);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

fn spinner() -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

async fn cmd_ask(app: &App, file: &Path, question: &str) -> anyhow::Result<()> {
    let content = app.processor.read_file_content(file)?;
    let author = Requester::new(Uuid::new_v4());
    let post = Post::new(author.user_id, app.processor.extract_title(file), content);
    let post_id = post.id;
    app.posts.insert(post).await;

    if !app.orchestrator.enable_chat(post_id, author).await? {
        bail!("chat could not be enabled for {}", file.display());
    }
    let pb = spinner()?;
    let ready = app.wait_settled(&[post_id], &pb).await?;
    pb.finish_and_clear();
    if ready == 0 {
        bail!("embedding failed for {}", file.display());
    }

    let stop = StopSignal::new();
    let on_ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.stop();
        }
    });

    let payload = serde_json::json!({ "question": question }).to_string();
    let mut stdout = std::io::stdout();
    let exchange = app
        .orchestrator
        .ask_and_record(post_id, author, &payload, &stop, |fragment| {
            let _ = write!(stdout, "{}", fragment.text);
            let _ = stdout.flush();
        })
        .await?;
    println!();
    info!(exchange_id = %exchange.id, chars = exchange.response.len(), "exchange recorded");
    Ok(())
}

async fn cmd_ingest(app: &App, data_dir: &Path) -> anyhow::Result<()> {
    println!("Ingesting from {}", data_dir.display());
    let author = Requester::new(Uuid::new_v4());
    let posts = app.processor.load_text_posts(data_dir, author.user_id)?;
    if posts.is_empty() {
        println!("No .txt files found");
        return Ok(());
    }
    let mut ids = Vec::with_capacity(posts.len());
    for post in posts {
        ids.push(post.id);
        app.posts.insert(post).await;
    }
    for id in &ids {
        app.orchestrator.enable_chat(*id, author).await?;
    }
    let pb = spinner()?;
    let ready = app.wait_settled(&ids, &pb).await?;
    pb.finish_with_message(format!("{} of {} posts ready for chat", ready, ids.len()));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let settings = config.settings()?;
    init_tracing(&settings.log.filter);
    let (cmd, args) = parse_args();
    match cmd.as_str() {
        "classify" => {
            let message = args.join(" ");
            if message.trim().is_empty() {
                bail!("message cannot be empty");
            }
            println!("{}", Intent::classify(&message));
        }
        "ask" => {
            let (Some(file), Some(_)) = (args.first(), args.get(1)) else {
                eprintln!("Usage: postchat-cli ask <file.txt> <question>");
                std::process::exit(1);
            };
            let question = args[1..].join(" ");
            let app = App::build(&settings)?;
            cmd_ask(&app, &PathBuf::from(file), &question).await?;
            app.pool.shutdown().await?;
        }
        "ingest" => {
            let data_dir = match args.first() {
                Some(dir) => PathBuf::from(dir),
                None => {
                    let dir: String = config.get("data.raw_txt_dir").unwrap_or_else(|_| "../dev_data/txt".to_string());
                    resolve_with_base(&env::current_dir().context("current dir")?, dir)
                }
            };
            let app = App::build(&settings)?;
            cmd_ingest(&app, &data_dir).await?;
            app.pool.shutdown().await?;
        }
        _ => {
            eprintln!("Unknown command: {}", cmd);
            std::process::exit(1);
        }
    }
    Ok(())
}

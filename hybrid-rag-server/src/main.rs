use std::sync::Arc;

use anyhow::Context;
use hybrid_rag::{
    HybridSearchPipeline, QueryEmbedder, RetrievalConfig, disable_tokenizer_parallelism,
    qdrant::QdrantIndex,
};
use hybrid_rag_server::{AppState, ServerConfig, init_tracing, run_server};
use tracing::info;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // Environment writes happen before the runtime spawns its workers.
    disable_tokenizer_parallelism();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?
        .block_on(serve())
}

async fn serve() -> anyhow::Result<()> {
    init_tracing();

    let config = RetrievalConfig::from_env().context("invalid retrieval configuration")?;
    let server = ServerConfig::from_env()?;

    let index = QdrantIndex::new(&config)?;
    let embedder = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || load_embedder(&config))
            .await
            .context("embedding model loader panicked")??
    };
    info!(collection = %config.collection_name, "retrieval pipeline ready");

    let pipeline = HybridSearchPipeline::builder()
        .config(config)
        .embedder(embedder)
        .index(Arc::new(index))
        .build()?;

    run_server(server, AppState::new(pipeline)).await
}

#[cfg(feature = "fastembed")]
fn load_embedder(config: &RetrievalConfig) -> anyhow::Result<QueryEmbedder> {
    hybrid_rag::fastembed::load_query_embedder(config).context("failed to load embedding models")
}

#[cfg(not(feature = "fastembed"))]
fn load_embedder(_config: &RetrievalConfig) -> anyhow::Result<QueryEmbedder> {
    anyhow::bail!("no embedding models available: rebuild with `--features fastembed`")
}

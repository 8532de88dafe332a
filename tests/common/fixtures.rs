use delve::llm::mock_segment_list;
use delve::{ExploreConfig, Explorer, MemoryStore, MockClient, OpenStore, QueryStore, SqliteStore};
use std::path::Path;
use std::sync::Arc;

pub const LIGHT_REACTIONS: &str = "Light reactions";
pub const PHOTOSYSTEM_II: &str = "Photosystem II";

/// Scripted answers for a small photosynthesis tree.
///
/// Expansion prompts embed the original search, so deeper needles are
/// registered first: the first matching rule wins.
pub fn photosynthesis_client() -> MockClient {
    MockClient::available()
        .with_reply(
            PHOTOSYSTEM_II,
            mock_segment_list(&[
                ("Water splitting", "Releases oxygen and electrons."),
                ("P680", "Reaction-centre chlorophyll."),
            ]),
        )
        .with_reply(
            LIGHT_REACTIONS,
            mock_segment_list(&[
                (PHOTOSYSTEM_II, "Absorbs light and splits water."),
                ("Photosystem I", "Re-energises electrons to make NADPH."),
                ("ATP synthase", "Uses the proton gradient to make ATP."),
            ]),
        )
        .with_reply(
            "photosynthesis",
            // Fenced with prose around it, as models often answer
            format!(
                "Here is the breakdown:\n```json\n{}\n```\nHope that helps!",
                mock_segment_list(&[
                    (LIGHT_REACTIONS, "Capture light energy as ATP and NADPH."),
                    ("Calvin cycle", "Uses ATP and NADPH to fix carbon dioxide."),
                    ("Chlorophyll", "Pigment absorbing red and blue light."),
                    ("Stomata", "Pores regulating gas exchange."),
                ])
            ),
        )
}

pub fn memory_store() -> Arc<QueryStore> {
    Arc::new(QueryStore::new(Arc::new(MemoryStore::new())))
}

pub fn disk_store(path: &Path) -> Arc<QueryStore> {
    let backend = SqliteStore::open(path).expect("open sqlite store");
    Arc::new(QueryStore::new(Arc::new(backend)))
}

pub fn explorer_over(client: Arc<MockClient>, store: Arc<QueryStore>) -> Arc<Explorer> {
    Arc::new(Explorer::new(client, store, ExploreConfig::default()))
}

pub fn memory_explorer(client: Arc<MockClient>) -> Arc<Explorer> {
    explorer_over(client, memory_store())
}

/// Let spawned tasks run up to their next suspension point
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

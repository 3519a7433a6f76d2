use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use alicia_llm::LlmProvider;
use alicia_memory::MemoryRetriever;
use alicia_protocol::sequencer::StanzaSequencer;
use alicia_store::Store;
use alicia_tools::ToolRegistry;
use alicia_tts::TtsPipeline;

use crate::observability::Observability;

/// Shared, process-wide state for the engine — the Alicia analogue of the
/// teacher's `AppState`. `active_turns` is grounded directly on
/// `AppState::active_operations`: `ControlStop` cancels one entry the way
/// `stop.rs::execute_stop` sweeps the whole table.
pub struct EngineState {
    pub store: Arc<Store>,
    pub sequencer_table: DashMap<String, StanzaSequencer>,
    pub pcsw: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    pub active_turns: DashMap<String, CancellationToken>,
    pub memory: Arc<MemoryRetriever>,
    pub tools: Arc<ToolRegistry>,
    pub llm: Arc<dyn LlmProvider>,
    pub tts: Arc<TtsPipeline>,
    pub observability: Arc<Observability>,
}

impl EngineState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        memory: Arc<MemoryRetriever>,
        tools: Arc<ToolRegistry>,
        llm: Arc<dyn LlmProvider>,
        tts: Arc<TtsPipeline>,
        observability: Arc<Observability>,
    ) -> Self {
        Self {
            store,
            sequencer_table: DashMap::new(),
            pcsw: DashMap::new(),
            active_turns: DashMap::new(),
            memory,
            tools,
            llm,
            tts,
            observability,
        }
    }

    /// Acquire the per-conversation serial writer lock, creating the
    /// conversation's entry on first use.
    pub fn pcsw_lock(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.pcsw
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Register a fresh cancellation token for a turn about to start.
    pub fn begin_turn(&self, conversation_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.active_turns
            .insert(conversation_id.to_string(), token.clone());
        token
    }

    pub fn end_turn(&self, conversation_id: &str) {
        self.active_turns.remove(conversation_id);
    }

    /// `ControlStop`, scoped to one conversation — the scoped analogue of
    /// `stop.rs::execute_stop`'s sweep of every `active_operations` entry.
    pub fn control_stop(&self, conversation_id: &str) -> bool {
        if let Some((_, token)) = self.active_turns.remove(conversation_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn sequencer_for(&self, conversation_id: &str) -> StanzaSequencer {
        self.sequencer_table
            .entry(conversation_id.to_string())
            .or_insert_with(StanzaSequencer::new)
            .clone()
    }

    pub fn save_sequencer(&self, conversation_id: &str, sequencer: StanzaSequencer) {
        self.sequencer_table
            .insert(conversation_id.to_string(), sequencer);
    }
}

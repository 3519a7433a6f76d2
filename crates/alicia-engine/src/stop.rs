//! `ControlStop` handling: cancels one conversation's entry in
//! `active_turns` instead of sweeping the whole table.

use alicia_core::types::CompletionStatus;
use tracing::info;

use crate::error::Result;
use crate::state::EngineState;

/// Cancel the conversation's in-flight turn, if any, and mark its
/// non-terminal rows `failed`. Returns whether a turn was actually
/// cancelled (a no-op stop on an idle conversation is not an error).
pub fn execute_stop(state: &EngineState, conversation_id: &str) -> Result<bool> {
    let cancelled = state.control_stop(conversation_id);
    if !cancelled {
        info!(conversation_id, "control_stop: no active turn");
        return Ok(false);
    }

    let conversation = state.store.get_conversation(conversation_id)?;
    if let Some(tip) = &conversation.tip_message_id {
        let tip_message = state.store.get_message(tip)?;
        if !matches!(
            tip_message.completion_status,
            CompletionStatus::Completed | CompletionStatus::Failed
        ) {
            state
                .store
                .set_message_status(tip, CompletionStatus::Failed)?;
        }
        state.store.fail_incomplete_sentences(tip)?;
    }
    info!(conversation_id, "control_stop: turn cancelled");
    Ok(true)
}

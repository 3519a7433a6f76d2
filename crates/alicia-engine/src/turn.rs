//! Per-conversation turn state machine. The transition table is
//! reproduced verbatim as `advance()`'s match arms.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Retrieving,
    ToolSelecting,
    Executing,
    Generating,
    Streaming,
    Finalizing,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    UserMessageAccepted,
    MemoriesFiltered,
    ToolDecisionNone,
    ToolDecisionCall,
    ToolResultOrTimeout,
    FirstChunk,
    ToolCallChunk,
    TextChunk,
    Done,
    ControlStop,
    FatalError,
    Released,
}

impl TurnState {
    /// Legal transition for `(self, trigger)`, or `None` if the trigger
    /// does not apply in this state. `ControlStop` and `FatalError` are
    /// legal from every state (the table's "any" row).
    pub fn advance(self, trigger: Trigger) -> Option<TurnState> {
        if trigger == Trigger::ControlStop {
            return Some(TurnState::Cancelled);
        }
        if trigger == Trigger::FatalError {
            return Some(TurnState::Failed);
        }
        match (self, trigger) {
            (TurnState::Idle, Trigger::UserMessageAccepted) => Some(TurnState::Retrieving),
            (TurnState::Retrieving, Trigger::MemoriesFiltered) => Some(TurnState::ToolSelecting),
            (TurnState::ToolSelecting, Trigger::ToolDecisionNone) => Some(TurnState::Generating),
            (TurnState::ToolSelecting, Trigger::ToolDecisionCall) => Some(TurnState::Executing),
            (TurnState::Executing, Trigger::ToolResultOrTimeout) => Some(TurnState::Generating),
            (TurnState::Generating, Trigger::FirstChunk) => Some(TurnState::Streaming),
            (TurnState::Streaming, Trigger::ToolCallChunk) => Some(TurnState::Executing),
            (TurnState::Streaming, Trigger::TextChunk) => Some(TurnState::Streaming),
            (TurnState::Streaming, Trigger::Done) => Some(TurnState::Finalizing),
            (
                TurnState::Finalizing | TurnState::Cancelled | TurnState::Failed,
                Trigger::Released,
            ) => Some(TurnState::Idle),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::Finalizing | TurnState::Cancelled | TurnState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_text_turn() {
        let mut state = TurnState::Idle;
        for trigger in [
            Trigger::UserMessageAccepted,
            Trigger::MemoriesFiltered,
            Trigger::ToolDecisionNone,
            Trigger::FirstChunk,
            Trigger::TextChunk,
            Trigger::Done,
            Trigger::Released,
        ] {
            state = state.advance(trigger).unwrap_or_else(|| {
                panic!("trigger {trigger:?} illegal from {state:?}")
            });
        }
        assert_eq!(state, TurnState::Idle);
    }

    #[test]
    fn happy_path_tool_augmented_turn() {
        let mut state = TurnState::Idle;
        for trigger in [
            Trigger::UserMessageAccepted,
            Trigger::MemoriesFiltered,
            Trigger::ToolDecisionCall,
            Trigger::ToolResultOrTimeout,
            Trigger::FirstChunk,
            Trigger::Done,
            Trigger::Released,
        ] {
            state = state.advance(trigger).unwrap();
        }
        assert_eq!(state, TurnState::Idle);
    }

    #[test]
    fn control_stop_is_legal_from_every_state() {
        for state in [
            TurnState::Idle,
            TurnState::Retrieving,
            TurnState::ToolSelecting,
            TurnState::Executing,
            TurnState::Generating,
            TurnState::Streaming,
        ] {
            assert_eq!(state.advance(Trigger::ControlStop), Some(TurnState::Cancelled));
        }
    }

    #[test]
    fn illegal_transition_returns_none() {
        assert_eq!(TurnState::Idle.advance(Trigger::Done), None);
        assert_eq!(TurnState::Generating.advance(Trigger::TextChunk), None);
    }

    #[test]
    fn streaming_tool_call_chunk_returns_to_executing() {
        assert_eq!(
            TurnState::Streaming.advance(Trigger::ToolCallChunk),
            Some(TurnState::Executing)
        );
    }
}

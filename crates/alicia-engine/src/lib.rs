pub mod branching;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod state;
pub mod stop;
pub mod turn;

pub use branching::{apply_variation, VariationMode};
pub use error::{EngineError, Result};
pub use observability::{Observability, ScoreType, TraceContext};
pub use pipeline::run_turn;
pub use state::EngineState;
pub use stop::execute_stop;
pub use turn::{Trigger, TurnState};

pub mod client;
pub mod pipeline;
pub mod segmenter;

pub use client::{SynthesizedAudio, TtsClient, TtsError};
pub use pipeline::{AudioDelivery, TtsPipeline};
pub use segmenter::{SegmentedSentence, SentenceSegmenter};

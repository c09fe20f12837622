pub mod distilbert;
pub mod scores;

pub use distilbert::DistilBertSentimentModel;
pub use scores::{LabelOrder, SentimentScores};

/// Anything that can turn a piece of text into a two-class sentiment
/// distribution. Implementations must be safe to call from many worker
/// threads at once without mutating shared state.
pub trait SentimentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> anyhow::Result<SentimentScores>;

    fn model_id(&self) -> &str;
}

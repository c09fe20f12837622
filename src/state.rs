// Shared state management for the loaded model
use crate::models::SentimentClassifier;
use std::sync::Arc;

/// Process-wide handle to the classifier. Built once before the server
/// starts and only ever read afterwards.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<dyn SentimentClassifier>,
}

impl AppState {
    pub fn new(classifier: Arc<dyn SentimentClassifier>) -> Self {
        Self { classifier }
    }
}

// Two-class sentiment scores and the label order of the model producing them
use anyhow::Context;
use log::debug;
use std::collections::HashMap;

/// Normalized output of a classification: both values lie in [0, 1] and
/// sum to one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentScores {
    pub negative: f32,
    pub positive: f32,
}

impl SentimentScores {
    /// Unpacks a softmax output using the model's label order. Anything
    /// other than exactly two finite probabilities is rejected.
    pub fn from_probabilities(probabilities: &[f32], order: &LabelOrder) -> anyhow::Result<Self> {
        if probabilities.len() != 2 {
            anyhow::bail!(
                "expected 2 class probabilities, model produced {}",
                probabilities.len()
            );
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            anyhow::bail!("model produced non-finite probabilities: {:?}", probabilities);
        }
        Ok(Self {
            negative: probabilities[order.negative],
            positive: probabilities[order.positive],
        })
    }

    /// Five-star rating derived from the positive probability.
    pub fn rating(&self) -> f32 {
        5.0 * self.positive
    }
}

/// Which output index of the classifier holds which sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelOrder {
    pub negative: usize,
    pub positive: usize,
}

impl Default for LabelOrder {
    fn default() -> Self {
        Self {
            negative: 0,
            positive: 1,
        }
    }
}

impl LabelOrder {
    /// Resolves the order from a Hugging Face `id2label` map. Named labels
    /// (`NEGATIVE`/`POSITIVE`, `neg`/`pos`, ...) are honoured wherever they
    /// sit; generic names like `LABEL_0`/`LABEL_1` fall back to
    /// negative-first.
    pub fn from_id2label(id2label: &HashMap<String, String>) -> anyhow::Result<Self> {
        if id2label.is_empty() {
            debug!("model config has no id2label, assuming negative-first order");
            return Ok(Self::default());
        }
        if id2label.len() != 2 {
            anyhow::bail!(
                "expected a two-class model, config lists {} labels: {:?}",
                id2label.len(),
                id2label
            );
        }

        let mut negative = None;
        let mut positive = None;
        for (id, label) in id2label {
            let index: usize = id
                .parse()
                .with_context(|| format!("invalid label id {id:?} in id2label"))?;
            if index > 1 {
                anyhow::bail!("label id {index} is out of range for a two-class model");
            }
            let name = label.trim().to_ascii_lowercase();
            if name.starts_with("neg") {
                negative = Some(index);
            } else if name.starts_with("pos") {
                positive = Some(index);
            }
        }

        match (negative, positive) {
            (Some(negative), Some(positive)) if negative != positive => {
                Ok(Self { negative, positive })
            }
            (None, None) => {
                debug!(
                    "generic labels {:?}, assuming negative-first order",
                    id2label
                );
                Ok(Self::default())
            }
            _ => anyhow::bail!("cannot determine sentiment label order from {:?}", id2label),
        }
    }
}

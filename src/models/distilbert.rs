// DistilBERT sequence classification model
use super::{LabelOrder, SentimentClassifier, SentimentScores};
use crate::config::ModelConfig;
use anyhow::Context;
use candle::{DType, Device, IndexOp, Module, Tensor, D};
use candle_nn::{linear, Linear, VarBuilder};
use candle_transformers::models::distilbert::{Config, DistilBertModel};
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokenizers::{Encoding, Tokenizer, TruncationParams};

/// The parts of `config.json` the classification head needs on top of the
/// encoder config.
#[derive(Debug, Deserialize)]
struct ClassifierConfig {
    dim: usize,
    max_position_embeddings: usize,
    #[serde(default)]
    id2label: HashMap<String, String>,
}

impl ClassifierConfig {
    fn num_labels(&self) -> usize {
        match self.id2label.len() {
            0 => 2,
            n => n,
        }
    }
}

/// Encoder plus the `pre_classifier -> relu -> classifier` head applied to
/// the first token, laid out like `DistilBertForSequenceClassification`
/// checkpoints.
pub struct DistilBertForSequenceClassification {
    distilbert: DistilBertModel,
    pre_classifier: Linear,
    classifier: Linear,
}

impl DistilBertForSequenceClassification {
    pub fn load(
        vb: VarBuilder,
        config: &Config,
        dim: usize,
        num_labels: usize,
    ) -> anyhow::Result<Self> {
        let distilbert = DistilBertModel::load(vb.pp("distilbert"), config)?;
        let pre_classifier = linear(dim, dim, vb.pp("pre_classifier"))?;
        let classifier = linear(dim, num_labels, vb.pp("classifier"))?;
        Ok(Self {
            distilbert,
            pre_classifier,
            classifier,
        })
    }

    /// `input_ids` is `(batch, seq)`; `padding_mask` is non-zero where a
    /// position must be ignored. Returns `(batch, num_labels)` logits.
    pub fn forward(&self, input_ids: &Tensor, padding_mask: &Tensor) -> anyhow::Result<Tensor> {
        let hidden = self.distilbert.forward(input_ids, padding_mask)?;
        let pooled = hidden.i((.., 0))?;
        let pooled = self.pre_classifier.forward(&pooled)?.relu()?;
        Ok(self.classifier.forward(&pooled)?)
    }
}

pub struct DistilBertSentimentModel {
    model: DistilBertForSequenceClassification,
    tokenizer: Tokenizer,
    labels: LabelOrder,
    device: Device,
    model_id: String,
}

impl DistilBertSentimentModel {
    pub fn load_from_hub(source: &ModelConfig, device: Device) -> anyhow::Result<Self> {
        let api = ApiBuilder::new()
            .with_token(source.hf_token.clone())
            .build()
            .context("failed to build the Hugging Face Hub client")?;
        let repo = api.repo(Repo::with_revision(
            source.model_id.clone(),
            RepoType::Model,
            source.revision.clone(),
        ));
        info!(
            "fetching {} (revision {}) from the Hugging Face Hub",
            source.model_id, source.revision
        );

        let config_filename = repo
            .get("config.json")
            .with_context(|| format!("failed to fetch config.json for {}", source.model_id))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .with_context(|| format!("failed to fetch tokenizer.json for {}", source.model_id))?;
        let weights = match repo.get("model.safetensors") {
            Ok(path) => Weights::SafeTensors(path),
            Err(e) => {
                warn!("model.safetensors unavailable ({}), trying pytorch_model.bin", e);
                let path = repo.get("pytorch_model.bin").with_context(|| {
                    format!("no loadable weights found for {}", source.model_id)
                })?;
                Weights::Pytorch(path)
            }
        };

        // load the model config
        let raw_config = std::fs::read_to_string(&config_filename)
            .with_context(|| format!("failed to read {}", config_filename.display()))?;
        let encoder_config: Config =
            serde_json::from_str(&raw_config).context("invalid DistilBERT config")?;
        let head_config: ClassifierConfig =
            serde_json::from_str(&raw_config).context("invalid classifier config")?;
        let labels = LabelOrder::from_id2label(&head_config.id2label)?;
        if head_config.num_labels() != 2 {
            anyhow::bail!(
                "{} has {} labels, a two-class sentiment model is required",
                source.model_id,
                head_config.num_labels()
            );
        }

        // load the tokenizer
        let mut tokenizer = Tokenizer::from_file(&tokenizer_filename).map_err(anyhow::Error::msg)?;
        let max_length = source
            .max_sequence_length
            .min(head_config.max_position_embeddings);
        prepare_tokenizer(&mut tokenizer, max_length)?;

        // load the weights
        let vb = match &weights {
            Weights::SafeTensors(path) => unsafe {
                VarBuilder::from_mmaped_safetensors(&[path], DType::F32, &device)?
            },
            Weights::Pytorch(path) => VarBuilder::from_pth(path, DType::F32, &device)?,
        };
        let model = DistilBertForSequenceClassification::load(
            vb,
            &encoder_config,
            head_config.dim,
            head_config.num_labels(),
        )
        .context("failed to build the classification model")?;
        info!(
            "loaded {} from {} with label order {:?}",
            source.model_id,
            weights.path().display(),
            labels
        );

        Ok(Self::from_parts(
            model,
            tokenizer,
            labels,
            device,
            source.model_id.clone(),
        ))
    }

    pub fn from_parts(
        model: DistilBertForSequenceClassification,
        tokenizer: Tokenizer,
        labels: LabelOrder,
        device: Device,
        model_id: String,
    ) -> Self {
        Self {
            model,
            tokenizer,
            labels,
            device,
            model_id,
        }
    }

    fn probabilities(&self, encoding: &Encoding) -> anyhow::Result<Vec<f32>> {
        let ids = encoding.get_ids();
        if ids.is_empty() {
            anyhow::bail!("text produced no tokens");
        }
        let padding: Vec<u8> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| u8::from(m == 0))
            .collect();

        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let padding_mask =
            Tensor::new(padding.as_slice(), &self.device)?.reshape((1, 1, 1, ids.len()))?;
        let logits = self.model.forward(&input_ids, &padding_mask)?;
        let probabilities = candle_nn::ops::softmax(&logits, D::Minus1)?;

        probabilities
            .to_vec2::<f32>()?
            .into_iter()
            .next()
            .context("model returned an empty batch")
    }
}

impl SentimentClassifier for DistilBertSentimentModel {
    fn classify(&self, text: &str) -> anyhow::Result<SentimentScores> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(anyhow::Error::msg)?;
        let probabilities = self.probabilities(&encoding)?;
        SentimentScores::from_probabilities(&probabilities, &self.labels)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Single-sequence inputs: no padding, and anything past `max_length`
/// tokens is cut off instead of overrunning the position embeddings.
fn prepare_tokenizer(tokenizer: &mut Tokenizer, max_length: usize) -> anyhow::Result<()> {
    tokenizer
        .with_padding(None)
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(anyhow::Error::msg)?;
    debug!("tokenizer truncates inputs to {} tokens", max_length);
    Ok(())
}

enum Weights {
    SafeTensors(PathBuf),
    Pytorch(PathBuf),
}

impl Weights {
    fn path(&self) -> &PathBuf {
        match self {
            Self::SafeTensors(path) | Self::Pytorch(path) => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;
    use tokenizers::models::wordlevel::WordLevel;
    use tokenizers::pre_tokenizers::whitespace::Whitespace;
    use tokenizers::pre_tokenizers::PreTokenizerWrapper;

    const TINY_CONFIG: &str = r#"{
        "vocab_size": 8,
        "dim": 8,
        "n_layers": 1,
        "n_heads": 2,
        "hidden_dim": 16,
        "activation": "gelu",
        "max_position_embeddings": 16,
        "initializer_range": 0.02,
        "pad_token_id": 0,
        "model_type": "distilbert",
        "id2label": {"0": "NEGATIVE", "1": "POSITIVE"}
    }"#;

    fn tiny_model() -> DistilBertSentimentModel {
        let device = Device::Cpu;
        let encoder_config: Config = serde_json::from_str(TINY_CONFIG).unwrap();
        let head_config: ClassifierConfig = serde_json::from_str(TINY_CONFIG).unwrap();
        // Randomly initialised so different tokens give different logits.
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = DistilBertForSequenceClassification::load(
            vb,
            &encoder_config,
            head_config.dim,
            head_config.num_labels(),
        )
        .unwrap();

        let vocab: HashMap<String, u32> = [("[PAD]", 0), ("[UNK]", 1), ("great", 2), ("awful", 3)]
            .into_iter()
            .map(|(token, id)| (token.to_string(), id))
            .collect();
        let word_level = WordLevel::builder()
            .vocab(vocab)
            .unk_token("[UNK]".to_string())
            .build()
            .unwrap();
        let mut tokenizer = Tokenizer::new(word_level);
        tokenizer.with_pre_tokenizer(PreTokenizerWrapper::from(Whitespace {}));
        prepare_tokenizer(&mut tokenizer, head_config.max_position_embeddings).unwrap();

        DistilBertSentimentModel::from_parts(
            model,
            tokenizer,
            LabelOrder::from_id2label(&head_config.id2label).unwrap(),
            device,
            "tiny-distilbert".to_string(),
        )
    }

    #[test]
    fn head_config_reads_labels_and_limits() {
        let head_config: ClassifierConfig = serde_json::from_str(TINY_CONFIG).unwrap();
        assert_eq!(head_config.dim, 8);
        assert_eq!(head_config.max_position_embeddings, 16);
        assert_eq!(head_config.num_labels(), 2);
    }

    #[test]
    fn missing_id2label_defaults_to_two_labels() {
        let head_config: ClassifierConfig =
            serde_json::from_str(r#"{"dim": 8, "max_position_embeddings": 16}"#).unwrap();
        assert_eq!(head_config.num_labels(), 2);
    }

    #[test]
    fn forward_pass_yields_one_row_of_two_logits() {
        let model = tiny_model();
        let input_ids = Tensor::new(&[[2u32, 1, 3]], &Device::Cpu).unwrap();
        let padding_mask = Tensor::zeros((1, 1, 1, 3), DType::U8, &Device::Cpu).unwrap();
        let logits = model.model.forward(&input_ids, &padding_mask).unwrap();
        assert_eq!(logits.dims(), &[1, 2]);
    }

    #[test]
    fn classify_returns_normalized_deterministic_scores() {
        let model = tiny_model();
        let first = model.classify("great").unwrap();
        let second = model.classify("great").unwrap();

        assert!((first.negative + first.positive - 1.0).abs() < 1e-4);
        assert!((0.0..=1.0).contains(&first.negative));
        assert!((0.0..=1.0).contains(&first.positive));
        assert_eq!(first, second);
        assert_eq!(model.model_id(), "tiny-distilbert");
    }

    #[test]
    fn encoding_without_tokens_is_an_error() {
        let model = tiny_model();
        let err = model.probabilities(&Encoding::default()).unwrap_err();
        assert!(err.to_string().contains("no tokens"));
    }

    #[test]
    fn different_texts_get_different_scores() {
        let model = tiny_model();
        let great = model.classify("great").unwrap();
        let awful = model.classify("awful").unwrap();

        assert_ne!(great, awful);
        for scores in [great, awful] {
            assert!((scores.negative + scores.positive - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn overlong_text_is_truncated_to_the_position_limit() {
        let model = tiny_model();
        let text = vec!["great"; 40].join(" ");

        let encoding = model.tokenizer.encode(text.as_str(), true).unwrap();
        assert_eq!(encoding.get_ids().len(), 16);

        let first = model.classify(&text).unwrap();
        let second = model.classify(&text).unwrap();
        assert!((first.negative + first.positive - 1.0).abs() < 1e-4);
        assert_eq!(first, second);
    }
}

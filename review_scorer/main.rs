use anyhow::{Context, Result};
use candle::Device;
use env_logger::Env;
use log::info;
use rayon::prelude::*;
use sentiment_server::config::ServerConfig;
use sentiment_server::models::{DistilBertSentimentModel, SentimentClassifier, SentimentScores};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: review_scorer <file_name> [text_column]");
        std::process::exit(1);
    }
    let csv_file_path = &args[1];
    let text_col_index = match args.get(2) {
        Some(index) => index
            .parse::<usize>()
            .with_context(|| format!("invalid column index {index:?}"))?,
        None => 0,
    };

    let reviews = load_reviews_from_csv(csv_file_path, text_col_index)?;
    info!("loaded {} reviews from {}", reviews.len(), csv_file_path);

    let config = ServerConfig::from_env()?;
    let model = DistilBertSentimentModel::load_from_hub(&config.model, Device::Cpu)?;

    // Score in parallel, keeping the input order
    let scores: Vec<SentimentScores> = reviews
        .par_iter()
        .map(|text| {
            model
                .classify(text)
                .with_context(|| format!("failed to score review {text:?}"))
        })
        .collect::<Result<_>>()?;
    info!("scored {} reviews", scores.len());

    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer.write_record(["text", "positive", "negative", "rating"])?;
    for (text, score) in reviews.iter().zip(&scores) {
        writer.write_record([
            text.clone(),
            format!("{:.6}", score.positive),
            format!("{:.6}", score.negative),
            format!("{:.2}", score.rating()),
        ])?;
    }
    writer.flush()?;

    Ok(())
}

// Reads the given column of every non-blank row, skipping the header
fn load_reviews_from_csv(csv_file_path: &str, text_col_index: usize) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(csv_file_path)
        .with_context(|| format!("failed to open {csv_file_path}"))?;
    let mut reviews = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let text = record
            .get(text_col_index)
            .with_context(|| format!("row {} has no column {}", row + 1, text_col_index))?;
        if !text.trim().is_empty() {
            reviews.push(text.to_string());
        }
    }
    Ok(reviews)
}

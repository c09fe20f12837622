// API routes and handlers
use crate::error::{json_error_handler, ApiError};
use crate::models::SentimentScores;
use crate::state::AppState;
use actix_web::{get, post, web, HttpResponse};
use log::info;
use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
pub struct SentimentRequest {
    pub text: String,
}

// Only a JSON object with a string `text` is a valid request; the derived
// impl would also take a one-element array.
impl<'de> Deserialize<'de> for SentimentRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RequestVisitor;

        impl<'de> Visitor<'de> for RequestVisitor {
            type Value = SentimentRequest;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object with a string `text` field")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut text = None;
                while let Some(key) = map.next_key::<String>()? {
                    if key == "text" {
                        if text.is_some() {
                            return Err(de::Error::duplicate_field("text"));
                        }
                        text = Some(map.next_value::<String>()?);
                    } else {
                        map.next_value::<IgnoredAny>()?;
                    }
                }
                text.map(|text| SentimentRequest { text })
                    .ok_or_else(|| de::Error::missing_field("text"))
            }
        }

        deserializer.deserialize_map(RequestVisitor)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SentimentResponse {
    pub positive: f32,
    pub negative: f32,
}

impl From<SentimentScores> for SentimentResponse {
    fn from(scores: SentimentScores) -> Self {
        Self {
            positive: scores.positive,
            negative: scores.negative,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
}

/// Registers the API routes and the JSON extractor limits on an app.
pub fn configure(cfg: &mut web::ServiceConfig, max_body_bytes: usize) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(max_body_bytes)
            .content_type_required(false)
            .error_handler(json_error_handler),
    )
    .service(analyze_sentiment)
    .service(health);
}

#[post("/api/v1/sentiment")]
pub async fn analyze_sentiment(
    state: web::Data<AppState>,
    payload: web::Json<SentimentRequest>,
) -> Result<HttpResponse, ApiError> {
    let SentimentRequest { text } = payload.into_inner();
    if text.trim().is_empty() {
        return Err(ApiError::validation(
            "field `text` must be a non-empty string",
        ));
    }

    let classifier = Arc::clone(&state.classifier);
    let chars = text.chars().count();
    let scores = web::block(move || classifier.classify(&text)).await??;
    info!(
        "scored {} chars: negative={:.4} positive={:.4}",
        chars, scores.negative, scores.positive
    );

    Ok(HttpResponse::Ok().json(SentimentResponse::from(scores)))
}

#[get("/api/v1/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        model: state.classifier.model_id().to_string(),
    })
}

//! Text embedders.
//!
//! [`HashingEmbedder`] needs no model or network: it hashes character
//! trigrams into a fixed-size signed vector. [`RemoteEmbedder`] calls an
//! OpenAI-compatible `/embeddings` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use mojarung_shared::{AppConfig, MojarungError, Result, embeddings_key};

use crate::vector::normalize;

/// Turns texts into dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Vector size, when known before the first call.
    fn dimension(&self) -> Option<usize>;

    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Build the embedder selected by `[dedup] embedder`.
pub fn embedder_from_config(config: &AppConfig) -> Result<Box<dyn Embedder>> {
    match config.dedup.embedder.as_str() {
        "hashing" => Ok(Box::new(HashingEmbedder::new(config.dedup.dimension)?)),
        "remote" => {
            let remote = &config.dedup.remote;
            let api_key = embeddings_key(config).ok_or_else(|| {
                MojarungError::config(format!(
                    "embeddings API key not found. Set the {} environment variable.",
                    remote.api_key_env
                ))
            })?;
            Ok(Box::new(RemoteEmbedder::new(
                &remote.base_url,
                &remote.model,
                api_key,
                Duration::from_secs(config.llm.timeout_secs),
            )?))
        }
        other => Err(MojarungError::config(format!(
            "unknown embedder {other:?} (expected hashing or remote)"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

/// Feature-hashed character trigrams, L2-normalised.
///
/// Texts are lowercased and reduced to alphanumeric words separated by
/// single spaces, so punctuation and layout changes do not move the vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(MojarungError::config("embedding dimension must be positive"));
        }
        Ok(Self { dimension })
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let words: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(String::from)
            .collect();
        let padded: Vec<char> = format!(" {} ", words.join(" ")).chars().collect();

        let mut v = vec![0.0f32; self.dimension];
        if words.is_empty() {
            return v;
        }
        let mut buf = [0u8; 12];
        for gram in padded.windows(3) {
            let mut len = 0;
            for c in gram {
                len += c.encode_utf8(&mut buf[len..]).len();
            }
            let h = fnv1a(&buf[..len]);
            let slot = (h % self.dimension as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[slot] += sign;
        }
        normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

/// Embeddings from an OpenAI-compatible HTTP API.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl RemoteEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MojarungError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn dimension(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = texts.len(), model = %self.model, "requesting embeddings");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|e| MojarungError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(512).collect();
            return Err(MojarungError::Network(format!(
                "embeddings API error {status}: {body}"
            )));
        }

        let mut payload: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| MojarungError::parse(format!("invalid embeddings response: {e}")))?;

        if payload.data.len() != texts.len() {
            return Err(MojarungError::parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                payload.data.len()
            )));
        }
        payload.data.sort_by_key(|item| item.index);
        Ok(payload.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosine_similarity;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn hashing_is_deterministic_and_normalised() {
        let e = HashingEmbedder::new(64).expect("embedder");
        let a = e.embed_one("Сбербанк увеличил прибыль");
        let b = e.embed_one("Сбербанк увеличил прибыль");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hashing_ignores_case_and_punctuation() {
        let e = HashingEmbedder::new(384).expect("embedder");
        let a = e.embed_one("ЦБ сохранил ключевую ставку!");
        let b = e.embed_one("цб   сохранил, ключевую ставку");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn related_texts_are_closer_than_unrelated() {
        let e = HashingEmbedder::new(384).expect("embedder");
        let base = e.embed_one("Газпром повысил дивиденды по итогам года");
        let near = e.embed_one("Газпром повысил дивиденды по итогам прошлого года");
        let far = e.embed_one("В Москве открылась выставка современного искусства");
        assert!(cosine_similarity(&base, &near) > 0.7);
        assert!(cosine_similarity(&base, &far) < cosine_similarity(&base, &near));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashingEmbedder::new(16).expect("embedder");
        assert_eq!(e.embed_one(" ... "), vec![0.0; 16]);
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[tokio::test]
    async fn remote_orders_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "mini", "input": ["a", "b"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "index": 1, "embedding": [0.0, 1.0] },
                    { "index": 0, "embedding": [1.0, 0.0] }
                ]
            })))
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(
            &format!("{}/v1/", server.uri()),
            "mini",
            "sk-test",
            Duration::from_secs(5),
        )
        .expect("embedder");
        let vectors = embedder
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .expect("embed");
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn remote_errors_surface() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let embedder =
            RemoteEmbedder::new(&server.uri(), "mini", "k", Duration::from_secs(5)).expect("embedder");
        let err = embedder.embed(&["x".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("slow down"));
    }

    #[test]
    fn unknown_embedder_is_config_error() {
        let mut config = AppConfig::default();
        config.dedup.embedder = "bert".into();
        assert!(matches!(
            embedder_from_config(&config).err().expect("error"),
            MojarungError::Config { .. }
        ));
    }
}

//! Dimensionality reducer client (§6.4): `POST /reduce` with
//! `{vectors, method, n_components: 3}`, returning one `{x,y,z}` per
//! input vector in the same order. A plain HTTP call, not an LLM
//! capability, so it never goes through `retry::with_backoff` — transport
//! failures here are `PipelineError::Transport`, not `LlmError`.

use anyhow::{bail, Context, Result};
use mnemosyne_common::entities::ProjectionPosition;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct ReducerClient {
    client: Client,
    url: String,
}

#[derive(Serialize)]
struct ReduceRequest<'a> {
    vectors: &'a [Vec<f32>],
    method: &'a str,
    n_components: u8,
}

#[derive(Deserialize)]
struct Coordinate {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Deserialize)]
struct ReduceResponse {
    coordinates: Vec<Coordinate>,
}

impl ReducerClient {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }

    pub async fn reduce(&self, vectors: &[Vec<f32>], method: &str) -> Result<Vec<ProjectionPosition>> {
        if vectors.is_empty() {
            return Ok(Vec::new());
        }

        let body = ReduceRequest {
            vectors,
            method,
            n_components: 3,
        };
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("calling dimensionality reducer")?;

        if !resp.status().is_success() {
            bail!("reducer returned status {}", resp.status());
        }

        let parsed: ReduceResponse = resp.json().await.context("parsing reducer response")?;
        if parsed.coordinates.len() != vectors.len() {
            bail!(
                "reducer returned {} coordinates for {} input vectors",
                parsed.coordinates.len(),
                vectors.len()
            );
        }

        Ok(parsed
            .coordinates
            .into_iter()
            .map(|c| ProjectionPosition { x: c.x, y: c.y, z: c.z })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reduce_parses_matching_coordinates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reduce"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "coordinates": [{"x": 1.0, "y": 2.0, "z": 3.0}]
            })))
            .mount(&server)
            .await;

        let client = ReducerClient::new(format!("{}/reduce", server.uri()));
        let result = client.reduce(&[vec![0.1, 0.2]], "umap").await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].x, 1.0);
    }

    #[tokio::test]
    async fn reduce_errors_on_length_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reduce"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "coordinates": []
            })))
            .mount(&server)
            .await;

        let client = ReducerClient::new(format!("{}/reduce", server.uri()));
        let result = client.reduce(&[vec![0.1, 0.2]], "umap").await;
        assert!(result.is_err());
    }
}

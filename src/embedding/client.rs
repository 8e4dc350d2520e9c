use crate::core::config::Config;
use crate::error::CoreError;

/// Thin wrapper over the external embedding endpoint (§6: opaque collaborator,
/// `POST {text} -> {embedding: [f32]}`).
pub async fn embed(client: &reqwest::Client, cfg: &Config, text: &str) -> Result<Vec<f32>, CoreError> {
    #[derive(serde::Serialize)]
    struct Req<'a> {
        text: &'a str,
    }
    #[derive(serde::Deserialize)]
    struct Resp {
        embedding: Vec<f32>,
    }

    let resp = client
        .post(&cfg.embedding_endpoint_url)
        .json(&Req { text })
        .timeout(cfg.http_timeout)
        .send()
        .await
        .map_err(|e| CoreError::ModelUnavailable(e.to_string()))?
        .error_for_status()
        .map_err(|e| CoreError::ModelUnavailable(e.to_string()))?
        .json::<Resp>()
        .await
        .map_err(|e| CoreError::DecodeFailed(e.to_string()))?;

    Ok(resp.embedding)
}

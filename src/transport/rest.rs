//! One-shot request/response wrappers for the non-streaming audio endpoints.
//!
//! These are plain HTTP calls with no session state; the realtime engine
//! never touches them.

use std::time::Duration;

use reqwest::{
    header::{HeaderValue, AUTHORIZATION},
    multipart, Client,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::Result;

const BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Client for plain transcription and text-to-speech calls.
#[derive(Clone, Debug)]
pub struct AudioRestClient {
    client: Client,
    auth_header: HeaderValue,
    base_url: String,
}

impl AudioRestClient {
    /// Create a client with the default timeouts.
    ///
    /// # Errors
    /// Returns an error if the API key is not a valid header value or the
    /// HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_base_url(api_key, BASE_URL)
    }

    /// Create a client against a non-default base URL (proxies, test servers).
    ///
    /// # Errors
    /// Returns an error if the API key is not a valid header value or the
    /// HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .pool_idle_timeout(DEFAULT_POOL_IDLE_TIMEOUT)
            .build()?;

        let auth_header = HeaderValue::from_str(&format!("Bearer {api_key}"))?;

        Ok(Self {
            client,
            auth_header,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Transcribe an audio recording to text.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails.
    pub async fn transcribe(&self, audio: Vec<u8>, filename: &str, model: &str) -> Result<String> {
        let part = multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str("audio/wav")?;
        let form = multipart::Form::new()
            .text("model", model.to_string())
            .part("file", part);

        let res = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header(AUTHORIZATION, &self.auth_header)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        Ok(res.json::<TranscriptionResponse>().await?.text)
    }

    /// Synthesize speech for a piece of text, returning the audio bytes.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails.
    pub async fn synthesize(&self, text: &str, voice: &str, model: &str) -> Result<Vec<u8>> {
        let res = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .header(AUTHORIZATION, &self.auth_header)
            .json(&json!({
                "model": model,
                "input": text,
                "voice": voice,
                "response_format": "wav",
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(res.bytes().await?.to_vec())
    }
}

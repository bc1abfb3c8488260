//! Gemini text-to-speech client.
//!
//! Calls `models/{model}:generateContent` with an AUDIO response modality and
//! returns the base64 PCM payload of the first candidate part.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use speech_player::EncodedAudio;

use crate::config::TtsSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);
const MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;

pub struct TtsClient {
    agent: ureq::Agent,
    url: String,
    api_key: String,
    voice: String,
}

impl TtsClient {
    pub fn new(settings: &TtsSettings) -> Result<Self> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            anyhow!("no API key: pass --api-key, set api_key in config, or export GEMINI_API_KEY")
        })?;
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build();
        Ok(Self {
            agent: ureq::Agent::new_with_config(config),
            url: generate_url(&settings.api_base_url, &settings.model),
            api_key,
            voice: settings.voice.clone(),
        })
    }

    /// Synthesize `text` and return the encoded PCM.
    pub fn synthesize(&self, text: &str) -> Result<EncodedAudio> {
        let body = GenerateRequest::speech(text, &self.voice);
        tracing::info!(
            url = %self.url,
            voice = %self.voice,
            chars = text.chars().count(),
            "tts request"
        );

        let resp = match self
            .agent
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .config()
            .http_status_as_error(false)
            .build()
            .send_json(&body)
        {
            Ok(resp) => resp,
            Err(err) => bail!("tts request failed (transport) url={}: {err}", self.url),
        };

        let code = resp.status();
        let body_str = resp
            .into_body()
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_string()
            .context("tts response read failed")?;
        if code.as_u16() >= 400 {
            bail!("tts request failed (status {code}): {}", snippet(&body_str));
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body_str).context("tts response parse failed")?;
        let data = parsed
            .audio_data()
            .ok_or_else(|| anyhow!("tts response contained no audio"))?;
        tracing::info!(base64_len = data.len(), "tts audio received");
        Ok(EncodedAudio::new(data))
    }
}

fn generate_url(base: &str, model: &str) -> String {
    format!(
        "{}/v1beta/models/{}:generateContent",
        base.trim_end_matches('/'),
        model
    )
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    let head: String = trimmed.chars().take(300).collect();
    if trimmed.chars().count() > 300 {
        format!("{head}...")
    } else {
        head
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

impl<'a> GenerateRequest<'a> {
    fn speech(text: &'a str, voice: &'a str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![TextPart { text }],
            }],
            generation_config: GenerationConfig {
                response_modalities: ["AUDIO"],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: voice },
                    },
                },
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

impl GenerateResponse {
    /// Payload of `candidates[0].content.parts[0].inlineData.data`.
    fn audio_data(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .inline_data
            .map(|d| d.data)
            .filter(|d| !d.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_in_api_shape() {
        let value = serde_json::to_value(GenerateRequest::speech("hola", "Kore")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "contents": [{ "parts": [{ "text": "hola" }] }],
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": {
                        "voiceConfig": {
                            "prebuiltVoiceConfig": { "voiceName": "Kore" }
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn response_yields_first_inline_data() {
        let body = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "inlineData": { "mimeType": "audio/L16;codec=pcm;rate=24000", "data": "AAD/fw==" } }]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "totalTokenCount": 12 }
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.audio_data().as_deref(), Some("AAD/fw=="));
    }

    #[test]
    fn response_without_audio_yields_none() {
        let no_candidates: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(no_candidates.audio_data().is_none());

        let text_only: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[{"text":"hi"}]}}]}"#)
                .unwrap();
        assert!(text_only.audio_data().is_none());

        let blocked: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert!(blocked.audio_data().is_none());
    }

    #[test]
    fn url_joins_base_and_model() {
        assert_eq!(
            generate_url("https://example.test/", "gemini-2.5-flash-preview-tts"),
            "https://example.test/v1beta/models/gemini-2.5-flash-preview-tts:generateContent"
        );
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let settings = TtsSettings {
            api_key: None,
            api_base_url: "http://localhost".to_string(),
            model: "m".to_string(),
            voice: "Kore".to_string(),
        };
        let err = TtsClient::new(&settings).err().unwrap();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn snippet_truncates_long_bodies() {
        let long = "x".repeat(400);
        assert_eq!(snippet(&long).len(), 303);
        assert_eq!(snippet("  short  "), "short");
    }
}

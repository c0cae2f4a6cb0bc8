/// Text-to-speech generation
///
/// A `tts` job points at a `text_to_speech` record. The handler loads the
/// chapter, splits its text into chunks the provider accepts, synthesizes
/// each chunk, stores every clip under the `audio` storage namespace and
/// records the ordered segment list on the request.
///
/// # Providers
///
/// - [`HttpSpeechProvider`]: POSTs `{"text", "voice"}` as JSON to a
///   configured endpoint (bearer key optional) and stores the returned bytes
///   with the response's content type.
/// - [`SilentSpeechProvider`]: produces silent 8-bit mono WAV clips whose
///   length follows the text length. Used in development and tests.
///
/// # Chunking
///
/// [`chunk_text`] packs whole paragraphs while they fit, falls back to
/// sentences, then words, and finally hard-splits a single over-long word.
/// Lengths are counted in characters, not bytes.

use crate::config::{TtsBackend, TtsSettings};
use crate::handlers::{HandlerError, JobHandler};
use async_trait::async_trait;
use bytes::Bytes;
use readhub_shared::models::chapter::Chapter;
use readhub_shared::models::job::{Job, JobKind, TtsPayload};
use readhub_shared::models::tts::{TextToSpeech, TtsSegment, TtsStatus};
use readhub_shared::storage::{FileStorage, StoredFile};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Storage namespace for generated clips
pub const AUDIO_NAMESPACE: &str = "audio";

const WAV_CONTENT_TYPE: &str = "audio/wav";
const DEFAULT_AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Synthesized audio for one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audio {
    pub bytes: Bytes,
    pub content_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Speech request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Speech provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Speech provider returned no audio")]
    EmptyAudio,

    #[error("Text of {len} characters exceeds the provider limit of {max}")]
    TooLong { len: usize, max: usize },
}

impl SpeechError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SpeechError::Http(_) | SpeechError::EmptyAudio => true,
            SpeechError::Status { status, .. } => *status == 429 || *status >= 500,
            SpeechError::TooLong { .. } => false,
        }
    }
}

impl From<SpeechError> for HandlerError {
    fn from(err: SpeechError) -> Self {
        if err.is_retryable() {
            HandlerError::transient(err.to_string())
        } else {
            HandlerError::permanent(err.to_string())
        }
    }
}

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Longest text accepted by one `synthesize` call, in characters
    fn max_chars(&self) -> usize;

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Audio, SpeechError>;
}

/// Builds the provider selected in configuration
pub fn provider_from_settings(settings: &TtsSettings) -> anyhow::Result<Arc<dyn SpeechProvider>> {
    let provider: Arc<dyn SpeechProvider> = match &settings.backend {
        TtsBackend::Silent => Arc::new(SilentSpeechProvider::new(settings.max_chars)),
        TtsBackend::Http { endpoint, api_key } => Arc::new(HttpSpeechProvider::new(
            endpoint,
            api_key.clone(),
            settings.max_chars,
        )?),
    };
    Ok(provider)
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

/// Remote speech API speaking JSON in, audio bytes out
#[derive(Debug, Clone)]
pub struct HttpSpeechProvider {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: Option<String>,
    max_chars: usize,
}

impl HttpSpeechProvider {
    pub fn new(endpoint: &str, api_key: Option<String>, max_chars: usize) -> anyhow::Result<Self> {
        let endpoint = url::Url::parse(endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!("TTS endpoint must be http or https, got {}", endpoint.scheme());
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            max_chars: max_chars.max(1),
        })
    }
}

#[async_trait]
impl SpeechProvider for HttpSpeechProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Audio, SpeechError> {
        let len = text.chars().count();
        if len > self.max_chars {
            return Err(SpeechError::TooLong {
                len,
                max: self.max_chars,
            });
        }

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&SpeechRequest { text, voice });
        if let Some(key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_AUDIO_CONTENT_TYPE.to_string());

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }

        Ok(Audio { bytes, content_type })
    }
}

/// Offline provider producing silence
#[derive(Debug, Clone)]
pub struct SilentSpeechProvider {
    max_chars: usize,
    sample_rate: u32,
    chars_per_second: u32,
}

impl SilentSpeechProvider {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
            sample_rate: 8000,
            chars_per_second: 15,
        }
    }

    /// Clip length for `chars` characters, never under a quarter second
    pub fn duration_ms(&self, chars: usize) -> u64 {
        let chars = u64::try_from(chars).unwrap_or(u64::MAX);
        (chars.saturating_mul(1000) / u64::from(self.chars_per_second)).max(250)
    }
}

#[async_trait]
impl SpeechProvider for SilentSpeechProvider {
    fn name(&self) -> &str {
        "silent"
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    async fn synthesize(&self, text: &str, _voice: &str) -> Result<Audio, SpeechError> {
        let len = text.chars().count();
        if len > self.max_chars {
            return Err(SpeechError::TooLong {
                len,
                max: self.max_chars,
            });
        }

        let samples = u64::from(self.sample_rate) * self.duration_ms(len) / 1000;
        let samples = u32::try_from(samples).unwrap_or(u32::MAX);

        Ok(Audio {
            bytes: Bytes::from(silent_wav(self.sample_rate, samples)),
            content_type: WAV_CONTENT_TYPE.to_string(),
        })
    }
}

/// Silent 8-bit mono PCM WAV file
pub fn silent_wav(sample_rate: u32, samples: u32) -> Vec<u8> {
    const HEADER_LEN: u32 = 44;
    let data_len = samples.min(u32::MAX - HEADER_LEN);

    let mut wav = Vec::with_capacity((HEADER_LEN + data_len) as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(HEADER_LEN - 8 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes()); // byte rate
    wav.extend_from_slice(&1u16.to_le_bytes()); // block align
    wav.extend_from_slice(&8u16.to_le_bytes());

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    // Unsigned 8-bit samples are silent at the midpoint.
    wav.resize(wav.len() + data_len as usize, 0x80);
    wav
}

/// Splits text into chunks of at most `max_chars` characters
///
/// Returns no chunks for blank text. No chunk is empty.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in paragraphs(text) {
        if char_len(&paragraph) <= max {
            pack(&mut chunks, &mut current, &paragraph, "\n\n", max);
            continue;
        }

        flush(&mut chunks, &mut current);
        for sentence in sentences(&paragraph) {
            if char_len(sentence) <= max {
                pack(&mut chunks, &mut current, sentence, " ", max);
                continue;
            }

            for word in sentence.split_whitespace() {
                if char_len(word) <= max {
                    pack(&mut chunks, &mut current, word, " ", max);
                } else {
                    flush(&mut chunks, &mut current);
                    chunks.extend(hard_split(word, max));
                }
            }
        }
        flush(&mut chunks, &mut current);
    }

    flush(&mut chunks, &mut current);
    chunks
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Appends `piece` to the open chunk, starting a new one when it would overflow
fn pack(chunks: &mut Vec<String>, current: &mut String, piece: &str, separator: &str, max: usize) {
    if current.is_empty() {
        current.push_str(piece);
        return;
    }

    if char_len(current) + char_len(separator) + char_len(piece) <= max {
        current.push_str(separator);
        current.push_str(piece);
    } else {
        chunks.push(std::mem::take(current));
        current.push_str(piece);
    }
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
}

/// Blank-line separated paragraphs with whitespace collapsed
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut words: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !words.is_empty() {
                out.push(words.join(" "));
                words.clear();
            }
        } else {
            words.extend(line.split_whitespace());
        }
    }
    if !words.is_empty() {
        out.push(words.join(" "));
    }

    out
}

/// Sentences of a single-spaced paragraph, terminal punctuation kept
fn sentences(paragraph: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev = None;

    for (i, c) in paragraph.char_indices() {
        if c == ' ' && matches!(prev, Some('.' | '!' | '?' | '…')) {
            let sentence = paragraph[start..i].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = i + 1;
        }
        prev = Some(c);
    }

    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn hard_split(word: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}

/// Handles `tts` jobs
pub struct TtsHandler {
    db: PgPool,
    storage: FileStorage,
    provider: Arc<dyn SpeechProvider>,
}

impl TtsHandler {
    pub fn new(db: PgPool, storage: FileStorage, provider: Arc<dyn SpeechProvider>) -> Self {
        Self {
            db,
            storage,
            provider,
        }
    }

    async fn generate(&self, request: &TextToSpeech) -> Result<Vec<TtsSegment>, HandlerError> {
        let chapter = Chapter::find(&self.db, request.chapter_id)
            .await?
            .ok_or_else(|| HandlerError::permanent("Chapter not found"))?;

        let text = format!("{}\n\n{}", chapter.title, chapter.content);
        let chunks = chunk_text(&text, self.provider.max_chars());
        if chunks.is_empty() {
            return Err(HandlerError::permanent("Chapter has no text"));
        }

        let mut segments: Vec<TtsSegment> = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let stored = match self.synthesize_chunk(chunk, &request.voice).await {
                Ok(stored) => stored,
                Err(e) => {
                    self.discard(&segments).await;
                    return Err(e);
                }
            };

            segments.push(TtsSegment {
                index,
                url: stored.url,
                content_type: stored.content_type,
                chars: char_len(chunk),
            });
        }

        Ok(segments)
    }

    async fn synthesize_chunk(
        &self,
        chunk: &str,
        voice: &str,
    ) -> Result<StoredFile, HandlerError> {
        let audio = self.provider.synthesize(chunk, voice).await?;
        Ok(self
            .storage
            .save(&audio.bytes, &audio.content_type, AUDIO_NAMESPACE)
            .await?)
    }

    /// Removes clips of a generation that did not finish
    async fn discard(&self, segments: &[TtsSegment]) {
        for segment in segments {
            if let Err(e) = self.storage.delete(&segment.url).await {
                tracing::warn!(url = %segment.url, error = %e, "Failed to remove partial audio");
            }
        }
    }
}

#[async_trait]
impl JobHandler for TtsHandler {
    fn kind(&self) -> JobKind {
        JobKind::Tts
    }

    async fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        let payload: TtsPayload = job.payload_as()?;

        let request = TextToSpeech::find(&self.db, payload.tts_id)
            .await?
            .ok_or_else(|| HandlerError::permanent("TTS request not found"))?;

        if request.status == TtsStatus::Completed {
            tracing::debug!(tts_id = %request.id, "TTS request already completed");
            return Ok(());
        }

        TextToSpeech::mark_processing(&self.db, request.id).await?;

        match self.generate(&request).await {
            Ok(segments) => {
                TextToSpeech::mark_completed(&self.db, request.id, &segments).await?;
                tracing::info!(
                    tts_id = %request.id,
                    chapter_id = %request.chapter_id,
                    provider = self.provider.name(),
                    segments = segments.len(),
                    "Generated chapter audio"
                );
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                let recorded = if job.will_retry(e.is_retryable()) {
                    TextToSpeech::mark_pending(&self.db, request.id, &message).await
                } else {
                    TextToSpeech::mark_failed(&self.db, request.id, &message).await
                };
                if let Err(db_err) = recorded {
                    tracing::error!(tts_id = %request.id, error = %db_err, "Failed to record TTS failure");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn assert_bounded(chunks: &[String], max: usize) {
        for chunk in chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.chars().count() <= max, "chunk over limit: {:?}", chunk);
        }
    }

    #[test]
    fn test_chunk_blank_text() {
        assert!(chunk_text("", 100).is_empty());
        assert!(chunk_text(" \n\n \t\n", 100).is_empty());
    }

    #[test]
    fn test_chunk_packs_paragraphs() {
        let text = "First paragraph.\n\nSecond one.\n\nThird.";
        assert_eq!(chunk_text(text, 1000), vec![text.to_string()]);

        let chunks = chunk_text(text, 30);
        assert_eq!(chunks, vec!["First paragraph.\n\nSecond one.", "Third."]);
    }

    #[test]
    fn test_chunk_collapses_whitespace() {
        let chunks = chunk_text("  Hello\n   world  \n\n\n  again ", 100);
        assert_eq!(chunks, vec!["Hello world\n\nagain"]);
    }

    #[test]
    fn test_chunk_splits_sentences() {
        let text = "The rain fell. The wind rose! Did the ship hold? Nobody knew.";
        let chunks = chunk_text(text, 30);
        assert_bounded(&chunks, 30);
        assert_eq!(
            chunks,
            vec!["The rain fell. The wind rose!", "Did the ship hold?", "Nobody knew."]
        );
    }

    #[test]
    fn test_chunk_splits_words_and_long_words() {
        let text = "a bb ccc dddddddddddd ee";
        let chunks = chunk_text(text, 5);
        assert_bounded(&chunks, 5);
        assert_eq!(chunks, vec!["a bb", "ccc", "ddddd", "ddddd", "dd", "ee"]);
    }

    #[test]
    fn test_chunk_counts_characters() {
        let text = "ééééé ééééé";
        let chunks = chunk_text(text, 5);
        assert_eq!(chunks, vec!["ééééé", "ééééé"]);
    }

    #[test]
    fn test_chunk_keeps_all_words() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(40);
        let chunks = chunk_text(&text, 120);
        assert_bounded(&chunks, 120);

        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn test_silent_wav_header() {
        let wav = silent_wav(8000, 4000);
        assert_eq!(wav.len(), 44 + 4000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes([wav[4], wav[5], wav[6], wav[7]]), 36 + 4000);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u16::from_le_bytes([wav[20], wav[21]]), 1);
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 8000);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 4000);
        assert!(wav[44..].iter().all(|&b| b == 0x80));
    }

    #[tokio::test]
    async fn test_silent_provider_duration_follows_text() {
        let provider = SilentSpeechProvider::new(1000);
        assert_eq!(provider.duration_ms(0), 250);
        assert_eq!(provider.duration_ms(150), 10_000);

        let short = provider.synthesize("Hi.", "default").await.unwrap();
        let long = provider.synthesize(&"word ".repeat(60), "default").await.unwrap();
        assert_eq!(short.content_type, "audio/wav");
        assert!(long.bytes.len() > short.bytes.len());
        // 300 characters at 15 per second is 20 seconds of 8 kHz audio.
        assert_eq!(long.bytes.len(), 44 + 160_000);
    }

    #[tokio::test]
    async fn test_silent_provider_rejects_long_text() {
        let provider = SilentSpeechProvider::new(10);
        let err = provider.synthesize("far too long for it", "default").await.unwrap_err();
        assert!(matches!(err, SpeechError::TooLong { len: 19, max: 10 }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_http_provider_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/speak"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_json(serde_json::json!({"text": "Hello there.", "voice": "alto"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(vec![0xFF, 0xFB, 0x90, 0x00]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpSpeechProvider::new(
            &format!("{}/v1/speak", server.uri()),
            Some("test-key".into()),
            500,
        )
        .unwrap();

        let audio = provider.synthesize("Hello there.", "alto").await.unwrap();
        assert_eq!(audio.content_type, "audio/mpeg");
        assert_eq!(audio.bytes.as_ref(), &[0xFF, 0xFB, 0x90, 0x00]);
    }

    #[tokio::test]
    async fn test_http_provider_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("unknown voice"))
            .mount(&server)
            .await;

        let provider = HttpSpeechProvider::new(&server.uri(), None, 500).unwrap();
        let err = provider.synthesize("Hello", "nope").await.unwrap_err();

        match &err {
            SpeechError::Status { status, body } => {
                assert_eq!(*status, 400);
                assert_eq!(body, "unknown voice");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_http_provider_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = HttpSpeechProvider::new(&server.uri(), None, 500).unwrap();
        let err = provider.synthesize("Hello", "default").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(HandlerError::from(err).is_retryable());
    }

    #[tokio::test]
    async fn test_http_provider_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let provider = HttpSpeechProvider::new(&server.uri(), None, 500).unwrap();
        let err = provider.synthesize("Hello", "default").await.unwrap_err();
        assert!(matches!(err, SpeechError::EmptyAudio));
    }

    #[test]
    fn test_http_provider_rejects_bad_endpoint() {
        assert!(HttpSpeechProvider::new("ftp://tts.example.com", None, 100).is_err());
        assert!(HttpSpeechProvider::new("not a url", None, 100).is_err());
    }

    #[test]
    fn test_provider_from_settings() {
        let provider = provider_from_settings(&TtsSettings {
            backend: TtsBackend::Silent,
            max_chars: 700,
        })
        .unwrap();
        assert_eq!(provider.name(), "silent");
        assert_eq!(provider.max_chars(), 700);

        let provider = provider_from_settings(&TtsSettings {
            backend: TtsBackend::Http {
                endpoint: "https://tts.example.com/speak".into(),
                api_key: None,
            },
            max_chars: 300,
        })
        .unwrap();
        assert_eq!(provider.name(), "http");
    }

    #[tokio::test]
    async fn test_silent_audio_is_storable() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), "/uploads", 1024 * 1024);
        let audio = SilentSpeechProvider::new(100).synthesize("Short line.", "default").await.unwrap();

        let stored = storage
            .save(&audio.bytes, &audio.content_type, AUDIO_NAMESPACE)
            .await
            .unwrap();
        assert!(stored.url.starts_with("/uploads/audio/"));
        assert!(stored.url.ends_with(".wav"));
    }
}

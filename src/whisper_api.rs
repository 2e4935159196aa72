use crate::config::{TranscribeConfig, MAX_PAYLOAD_BYTES};
use crate::error::UploadError;
use crate::sanitize::sanitize_error;
use crate::types::{EncodedPayload, Transcription};
use reqwest::multipart;
use serde::Deserialize;
use std::time::SystemTime;

/// アップロードを許可する音声 MIME タイプ
pub const ALLOWED_MIME_TYPES: [&str; 6] = [
    "audio/wav",
    "audio/webm",
    "audio/mp4",
    "audio/mpeg",
    "audio/ogg",
    "audio/x-m4a",
];

/// 文字起こし API レスポンス
#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
}

/// 文字起こしアップロードクライアント
///
/// PCM ペイロードを multipart で文字起こしサービスに送信する。
/// 入力検証（MIME タイプ・サイズ・言語ヒント）は外部呼び出しの前に
/// 同期的に行い、違反があればネットワークに一切触れずに返す。
pub struct TranscribeClient {
    config: TranscribeConfig,
    client: reqwest::Client,
}

impl TranscribeClient {
    pub fn new(config: TranscribeConfig) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self { config, client })
    }

    /// アップロード前の入力検証
    ///
    /// # Errors
    ///
    /// - [`UploadError::UnsupportedMimeType`] - 許可リストにない MIME タイプ
    /// - [`UploadError::PayloadTooLarge`] - 25 MiB 超過
    /// - [`UploadError::InvalidLanguage`] - 言語ヒントが 2〜5 文字でない
    pub fn validate_upload(
        mime_type: &str,
        size: usize,
        language: Option<&str>,
    ) -> Result<(), UploadError> {
        if !ALLOWED_MIME_TYPES.contains(&mime_type) {
            return Err(UploadError::UnsupportedMimeType(mime_type.to_string()));
        }

        if size > MAX_PAYLOAD_BYTES {
            return Err(UploadError::PayloadTooLarge {
                size,
                max: MAX_PAYLOAD_BYTES,
            });
        }

        if let Some(lang) = language {
            Self::validate_language(lang)?;
        }

        Ok(())
    }

    /// 言語ヒントの検証（"ja", "en", "zh-CN" のような 2〜5 文字のコード）
    fn validate_language(language: &str) -> Result<(), UploadError> {
        let len = language.chars().count();
        let valid_chars = language
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c == '-');

        if !(2..=5).contains(&len) || !valid_chars {
            return Err(UploadError::InvalidLanguage(language.to_string()));
        }

        Ok(())
    }

    /// ペイロードをアップロードして文字起こし
    ///
    /// 検証 → multipart 構築 → 送信 の順で、検証エラー時は
    /// ネットワーク呼び出しは発生しない。上流エラーのメッセージは
    /// サニタイズして返し、未加工の全文はログにのみ記録する。
    pub async fn transcribe(
        &self,
        payload: &EncodedPayload,
        language: Option<&str>,
    ) -> Result<Transcription, UploadError> {
        let language = language.or(self.config.language.as_deref());

        Self::validate_upload("audio/wav", payload.bytes.len(), language)?;

        let start_time = SystemTime::now();

        log::debug!(
            "文字起こしアップロード: {} バイト ({}Hz)",
            payload.bytes.len(),
            payload.sample_rate
        );

        let part = multipart::Part::bytes(payload.bytes.clone())
            .file_name("audio.wav")
            .mime_str("audio/wav")?;

        let mut form = multipart::Form::new()
            .part("file", part)
            .text("model", self.config.model.clone());

        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let raw = response.text().await.unwrap_or_default();
            // 未加工のエラーはサーバーサイドのログにのみ残す
            log::error!("文字起こし API エラー: {} - {}", status, raw);
            return Err(UploadError::Upstream {
                status,
                message: sanitize_error(&raw),
            });
        }

        let whisper_response: WhisperResponse = response.json().await?;

        if whisper_response.text.is_empty() {
            return Err(UploadError::EmptyTranscript);
        }

        log::debug!("文字起こし結果: {} 文字", whisper_response.text.chars().count());

        Ok(Transcription::new(whisper_response.text, start_time))
    }

    /// 文字起こしサービスへの到達性チェック
    ///
    /// HTTP 応答が返れば（ステータスを問わず）到達可能とみなす。
    pub async fn health_check(&self) -> Result<(), UploadError> {
        self.client.get(&self.config.endpoint).send().await?;
        Ok(())
    }
}

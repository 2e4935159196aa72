use crate::config::ComposeConfig;
use crate::error::ComposeError;
use crate::relay::relay_events;
use crate::sanitize::{sanitize_error, validate_pre_prompt, validate_transcript};
use crate::types::RelayEvent;
use futures_util::Stream;
use serde::Serialize;

/// 整形出力の方向付けに使う固定システムプロンプト
pub const SYSTEM_PROMPT: &str = "You are a concise writing assistant. \
    Produce clean, well structured text. Respect the user intent from the \
    pre prompt. Remove filler. Fix obvious mistakes.";

/// 生成 API へのチャットリクエスト
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

/// 文章整形（生成）クライアント
///
/// トランスクリプトとプリプロンプトを組み合わせてストリーミング
/// 生成を要求し、改行区切り JSON のレスポンスボディをリレーパーサー
/// 経由でイベントストリームとして返す。
pub struct ComposeClient {
    config: ComposeConfig,
    client: reqwest::Client,
}

impl ComposeClient {
    pub fn new(config: ComposeConfig) -> Result<Self, ComposeError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self { config, client })
    }

    /// プリプロンプトとトランスクリプトをユーザーメッセージに合成
    fn build_user_message(transcript: &str, pre_prompt: Option<&str>) -> String {
        [
            format!("Pre prompt: {}", pre_prompt.unwrap_or("None")),
            "Transcript:".to_string(),
            transcript.to_string(),
        ]
        .join("\n\n")
    }

    /// ストリーミング生成を開始し、イベントストリームを返す
    ///
    /// 入力検証は外部呼び出しの前に同期的に行う。返されたストリームは
    /// イベントを生成順に1つずつ発行する。ストリームを途中で drop した
    /// 場合は下層のレスポンスも閉じられる。
    ///
    /// # Errors
    ///
    /// - [`ComposeError::EmptyTranscript`] / [`ComposeError::TranscriptTooLong`]
    /// - [`ComposeError::PrePromptTooLong`]
    /// - [`ComposeError::Upstream`] - 非成功レスポンス（メッセージはサニタイズ済み）
    pub async fn compose_stream(
        &self,
        transcript: &str,
        pre_prompt: Option<&str>,
    ) -> Result<impl Stream<Item = RelayEvent>, ComposeError> {
        let transcript = validate_transcript(transcript)?;
        let pre_prompt = validate_pre_prompt(pre_prompt)?;

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::build_user_message(transcript, pre_prompt),
                },
            ],
            stream: true,
        };

        log::debug!(
            "生成リクエスト: model={}, transcript {} 文字",
            self.config.model,
            transcript.chars().count()
        );

        let response = self
            .client
            .post(format!("{}/chat", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let raw = response.text().await.unwrap_or_default();
            // 未加工のエラーはサーバーサイドのログにのみ残す
            log::error!("生成 API エラー: {} - {}", status, raw);
            return Err(ComposeError::Upstream {
                status,
                message: sanitize_error(&raw),
            });
        }

        Ok(relay_events(response.bytes_stream()))
    }

    /// 生成サービスへの到達性チェック
    pub async fn health_check(&self) -> Result<(), ComposeError> {
        self.client.get(&self.config.base_url).send().await?;
        Ok(())
    }
}

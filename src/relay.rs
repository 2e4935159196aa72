use crate::types::RelayEvent;
use async_stream::stream;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

/// 上流の改行区切り JSON の1行
///
/// `{"message":{"content":"..."},"done":false}` または `{"done":true}`
#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}

/// SSE フレームのトークンペイロード
#[derive(Serialize)]
struct TokenPayload<'a> {
    content: &'a str,
}

/// 改行区切り JSON のバイトストリームをイベント列に変換するパーサー
///
/// 上流のチャンク境界は JSON オブジェクト境界と一致しないため、
/// 行末記号が観測されるまで末尾の不完全な行をバッファする。
/// 完全な行ごとに、`message.content` が非空なら `Token` を、
/// `done = true` なら `Done` を発行する。`Done` 以降は一切発行しない。
/// パースできない行はスキップし、ストリームは中断しない
/// （1行の破損で後続の有効トークンを失わない）。
///
/// # Examples
///
/// ```
/// # use verbalize::relay::RelayParser;
/// # use verbalize::types::RelayEvent;
/// let mut parser = RelayParser::new();
/// let events = parser.push_chunk(b"{\"message\":{\"content\":\"Hi\"},\"done\":false}\n");
/// assert_eq!(events, vec![RelayEvent::Token("Hi".to_string())]);
/// ```
pub struct RelayParser {
    pending: Vec<u8>,
    done: bool,
}

impl RelayParser {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            done: false,
        }
    }

    /// 上流チャンクを1つ消費し、発行可能になったイベントを返す
    ///
    /// チャンクサイズは任意（1バイトでも複数行分でもよい）。
    /// `Done` 発行後のチャンクは読み捨てる。
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<RelayEvent> {
        let mut events = Vec::new();

        if self.done {
            return events;
        }

        self.pending.extend_from_slice(chunk);

        // 完全な行だけを取り出して処理する
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.handle_line(&line[..line.len() - 1], &mut events);
            if self.done {
                break;
            }
        }

        events
    }

    /// ストリーム終端での後処理
    ///
    /// 行末記号で終わらない末尾の行が残っていればパースする。
    pub fn finish(&mut self) -> Vec<RelayEvent> {
        let mut events = Vec::new();

        if self.done || self.pending.is_empty() {
            return events;
        }

        let line = std::mem::take(&mut self.pending);
        self.handle_line(&line, &mut events);

        events
    }

    /// `Done` を発行済みか
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn handle_line(&mut self, line: &[u8], events: &mut Vec<RelayEvent>) {
        let text = String::from_utf8_lossy(line);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }

        let parsed: StreamLine = match serde_json::from_str(trimmed) {
            Ok(parsed) => parsed,
            Err(e) => {
                // 破損した行はスキップして後続を処理する
                log::debug!("不正な行をスキップ: {}", e);
                return;
            }
        };

        if let Some(message) = parsed.message {
            if !message.content.is_empty() {
                events.push(RelayEvent::Token(message.content));
            }
        }

        if parsed.done {
            events.push(RelayEvent::Done);
            self.done = true;
        }
    }
}

impl Default for RelayParser {
    fn default() -> Self {
        Self::new()
    }
}

/// イベントを呼び出し元向けのワイヤフォーマットに直列化
///
/// `text/event-stream` の1イベント分:
/// - `Token` → `data: {"content":"<fragment>"}\n\n`
/// - `Done` → `data: [DONE]\n\n`
pub fn sse_frame(event: &RelayEvent) -> String {
    match event {
        RelayEvent::Token(content) => {
            // TokenPayload のシリアライズは失敗しない
            let payload = serde_json::to_string(&TokenPayload { content })
                .unwrap_or_else(|_| "{}".to_string());
            format!("data: {}\n\n", payload)
        }
        RelayEvent::Done => "data: [DONE]\n\n".to_string(),
    }
}

/// 上流のバイトストリームをイベントストリームに変換
///
/// イベントは生成され次第すぐに下流へ転送される（最初のイベントの
/// 発行前にレスポンス全体をバッファしない）。`Done` 発行後も
/// 接続リークを避けるため上流を最後まで読み切るが、イベントは
/// 発行しない。上流の読み取りエラーはその時点でストリームを
/// 打ち切る（発行済みイベントはそのまま有効）。
pub fn relay_events<S, B, E>(upstream: S) -> impl Stream<Item = RelayEvent>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    stream! {
        futures_util::pin_mut!(upstream);
        let mut parser = RelayParser::new();

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    for event in parser.push_chunk(bytes.as_ref()) {
                        yield event;
                    }
                }
                Err(e) => {
                    log::warn!("上流ストリームの読み取りエラー: {}", e);
                    break;
                }
            }
        }

        for event in parser.finish() {
            yield event;
        }
    }
}

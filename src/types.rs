use crate::error::CaptureError;
use serde::Serialize;
use std::time::SystemTime;

/// 正規化済みオーディオサンプルのバッファ
///
/// 各サンプルは -1.0 〜 1.0 の範囲の f32。マルチチャンネルの場合は
/// フレーム単位でインターリーブされる。パイプラインの各ステージは
/// 入力バッファの所有権を受け取り、新しいバッファを返す
/// （ステージ間でのエイリアシングは発生しない）。
///
/// # Examples
///
/// ```
/// # use verbalize::types::SampleBuffer;
/// let buffer = SampleBuffer {
///     samples: vec![0.0f32; 32000], // 1秒分 @ 16kHz ステレオ
///     sample_rate: 16000,
///     channels: 2,
/// };
/// assert_eq!(buffer.frames(), 16000);
/// ```
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    /// オーディオサンプルの配列（チャンネルインターリーブ）
    pub samples: Vec<f32>,

    /// サンプリングレート (Hz)
    ///
    /// 典型的な値: 8000, 16000, 44100, 48000
    pub sample_rate: u32,

    /// チャンネル数
    ///
    /// 1: モノラル, 2: ステレオ
    pub channels: u16,
}

impl SampleBuffer {
    /// フレーム数（チャンネルあたりのサンプル数）
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// バッファ内のデータ時間（秒）
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// キャプチャデバイスから届く1チャンクの不透明なエンコード済みデータ
///
/// チャンクの中身はデバイスのネイティブエンコーディングのまま。
/// パイプラインはデコーダーを通すまで内容を解釈しない。
#[derive(Clone, Debug)]
pub struct CaptureChunk {
    /// エンコード済みバイト列
    pub bytes: Vec<u8>,

    /// このチャンクが表す再生時間 (ミリ秒)
    pub duration_ms: u64,
}

/// 録音データ
///
/// キャプチャ開始時に生成され、録音中はチャンクが追記される。
/// 録音停止で seal され、以降は不変。
#[derive(Clone, Debug)]
pub struct Recording {
    bytes: Vec<u8>,
    mime_type: String,
    duration_ms: u64,
    sealed: bool,
}

impl Recording {
    /// 空の Recording を作成（キャプチャ開始時）
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            bytes: Vec::new(),
            mime_type: mime_type.into(),
            duration_ms: 0,
            sealed: false,
        }
    }

    /// チャンクを追記
    ///
    /// 空チャンク（使用可能なバイトが0）は無視する。
    /// seal 済みの Recording への追記はエラー。
    pub fn append(&mut self, chunk: &CaptureChunk) -> Result<(), CaptureError> {
        if self.sealed {
            return Err(CaptureError::RecordingSealed);
        }
        if chunk.bytes.is_empty() {
            return Ok(());
        }
        self.bytes.extend_from_slice(&chunk.bytes);
        self.duration_ms += chunk.duration_ms;
        Ok(())
    }

    /// Recording を確定し、以降の追記を禁止する
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// エンコード済みバイト列
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// MIME タイプ
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// 録音時間 (ミリ秒)
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// 確定済みかどうか
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

/// アップロード可能な PCM コンテナペイロード
///
/// 固定44バイトのヘッダ + 16bit リトルエンディアンのサンプルデータ。
/// ヘッダが宣言するデータ長はサンプルバイト数と常に一致し、
/// 宣言サンプルレートはコンテナのサンプリングレートと常に一致する。
#[derive(Clone, Debug)]
pub struct EncodedPayload {
    /// コンテナ全体のバイト列
    pub bytes: Vec<u8>,

    /// 宣言サンプリングレート (Hz)
    pub sample_rate: u32,

    /// ビット深度（この設計では常に16）
    pub bits_per_sample: u16,
}

/// 生成ストリームから再構成されたイベント
///
/// 呼び出し側は1リクエストにつき有限・順序付き・再開不能な
/// イベント列を観測する。順序は生成順と厳密に一致する。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayEvent {
    /// 生成テキストの連続した断片
    Token(String),

    /// 生成終了マーカー
    Done,
}

/// 文字起こし結果
///
/// JSON形式でシリアライズして呼び出し元に返す。
///
/// # JSON出力例
///
/// ```json
/// {
///   "transcript": "こちら本部、応答願います",
///   "timestamp": "2025-01-02T14:30:15+00:00",
///   "timestamp_seconds": 15.234
/// }
/// ```
#[derive(Clone, Debug, Serialize)]
pub struct Transcription {
    /// 文字起こしテキスト
    pub transcript: String,

    /// ISO 8601形式のタイムスタンプ
    pub timestamp: String,

    /// 処理開始時刻からの経過秒数
    pub timestamp_seconds: f64,
}

impl Transcription {
    /// 新しい文字起こし結果を作成
    ///
    /// # Arguments
    ///
    /// * `transcript` - 文字起こしテキスト
    /// * `start_time` - 処理開始時刻（タイムスタンプ計算の基準）
    pub fn new(transcript: String, start_time: SystemTime) -> Self {
        let now = SystemTime::now();

        // 開始時刻からの経過時間を計算
        let duration = now.duration_since(start_time).unwrap_or_default();
        let timestamp_seconds = duration.as_secs_f64();

        // ISO 8601形式のタイムスタンプを生成
        let timestamp = chrono::DateTime::from_timestamp(
            now.duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64,
            0,
        )
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default();

        Self {
            transcript,
            timestamp,
            timestamp_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_buffer_frames() {
        let buffer = SampleBuffer {
            samples: vec![0.0; 3200],
            sample_rate: 16000,
            channels: 2,
        };
        assert_eq!(buffer.frames(), 1600);
        assert!((buffer.duration_seconds() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_recording_append_and_seal() {
        let mut recording = Recording::new("audio/pcm;rate=16000;channels=1");

        recording
            .append(&CaptureChunk {
                bytes: vec![0u8; 64],
                duration_ms: 100,
            })
            .unwrap();
        assert_eq!(recording.bytes().len(), 64);
        assert_eq!(recording.duration_ms(), 100);

        // 空チャンクは無視される
        recording
            .append(&CaptureChunk {
                bytes: vec![],
                duration_ms: 50,
            })
            .unwrap();
        assert_eq!(recording.bytes().len(), 64);
        assert_eq!(recording.duration_ms(), 100);

        recording.seal();
        assert!(recording.is_sealed());

        // seal 後の追記はエラー
        let result = recording.append(&CaptureChunk {
            bytes: vec![0u8; 4],
            duration_ms: 10,
        });
        assert!(matches!(result, Err(CaptureError::RecordingSealed)));
    }

    #[test]
    fn test_recording_duration_monotonic() {
        let mut recording = Recording::new("audio/pcm;rate=16000;channels=1");
        let mut last = 0;
        for _ in 0..10 {
            recording
                .append(&CaptureChunk {
                    bytes: vec![0u8; 16],
                    duration_ms: 20,
                })
                .unwrap();
            assert!(recording.duration_ms() >= last);
            last = recording.duration_ms();
        }
        assert_eq!(recording.duration_ms(), 200);
    }

    #[test]
    fn test_transcription_creation() {
        let start_time = SystemTime::now();
        let result = Transcription::new("テストメッセージ".to_string(), start_time);

        assert_eq!(result.transcript, "テストメッセージ");
        assert!(result.timestamp_seconds >= 0.0);
        assert!(!result.timestamp.is_empty());
    }

    #[test]
    fn test_transcription_json_serialization() {
        let start_time = SystemTime::now();
        let result = Transcription::new("こんにちは".to_string(), start_time);

        let json = serde_json::to_string(&result).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["transcript"], "こんにちは");
        assert!(parsed["timestamp_seconds"].is_number());
    }

    #[test]
    fn test_relay_event_equality() {
        assert_eq!(
            RelayEvent::Token("Hello".to_string()),
            RelayEvent::Token("Hello".to_string())
        );
        assert_ne!(RelayEvent::Token("Hello".to_string()), RelayEvent::Done);
    }
}

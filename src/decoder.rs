use crate::error::TranscodeError;
use crate::types::{Recording, SampleBuffer};

/// ネイティブエンコーディングのデコーダー
///
/// Recording のバイト列をプラットフォーム固有のエンコーディングから
/// SampleBuffer に展開する境界。デコード自体はコアの範囲外だが、
/// 失敗は無音の空バッファではなく明示的なエラーとして報告される。
pub trait AudioDecoder: Send + Sync {
    /// この MIME タイプを処理できるか
    fn supports(&self, mime_type: &str) -> bool;

    /// Recording をデコードして SampleBuffer を返す
    fn decode(&self, recording: &Recording) -> Result<SampleBuffer, TranscodeError>;
}

/// 生 PCM (f32 リトルエンディアン、インターリーブ) のデコーダー
///
/// マイクキャプチャのネイティブフォーマット。MIME タイプの
/// パラメータでレートとチャンネル数を受け取る:
/// `audio/pcm;rate=48000;channels=2`
pub struct PcmDecoder;

impl PcmDecoder {
    /// MIME タイプのパラメータから (rate, channels) を取り出す
    fn parse_params(mime_type: &str) -> Result<(u32, u16), TranscodeError> {
        let mut rate: Option<u32> = None;
        let mut channels: Option<u16> = None;

        for param in mime_type.split(';').skip(1) {
            let mut kv = param.trim().splitn(2, '=');
            match (kv.next(), kv.next()) {
                (Some("rate"), Some(v)) => {
                    rate = Some(v.parse().map_err(|_| {
                        TranscodeError::Decode(format!("invalid rate parameter: {}", v))
                    })?);
                }
                (Some("channels"), Some(v)) => {
                    channels = Some(v.parse().map_err(|_| {
                        TranscodeError::Decode(format!("invalid channels parameter: {}", v))
                    })?);
                }
                _ => {}
            }
        }

        match (rate, channels) {
            (Some(r), Some(c)) if r > 0 && c > 0 => Ok((r, c)),
            _ => Err(TranscodeError::Decode(format!(
                "missing rate/channels parameters: {}",
                mime_type
            ))),
        }
    }
}

impl AudioDecoder for PcmDecoder {
    fn supports(&self, mime_type: &str) -> bool {
        mime_type
            .split(';')
            .next()
            .map(|base| base.trim() == "audio/pcm")
            .unwrap_or(false)
    }

    fn decode(&self, recording: &Recording) -> Result<SampleBuffer, TranscodeError> {
        let (sample_rate, channels) = Self::parse_params(recording.mime_type())?;

        let bytes = recording.bytes();
        let frame_bytes = 4 * channels as usize;
        if bytes.len() % frame_bytes != 0 {
            return Err(TranscodeError::Decode(format!(
                "truncated PCM data: {} bytes is not a multiple of {}",
                bytes.len(),
                frame_bytes
            )));
        }

        let samples: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(SampleBuffer {
            samples,
            sample_rate,
            channels,
        })
    }
}

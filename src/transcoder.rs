use crate::config::{MAX_PAYLOAD_BYTES, TARGET_SAMPLE_RATE};
use crate::decoder::{AudioDecoder, PcmDecoder};
use crate::error::TranscodeError;
use crate::mixdown::mixdown;
use crate::resample::resample;
use crate::types::{EncodedPayload, Recording};
use crate::wav_encoder::encode_wav;

/// 録音データをアップロード可能な PCM ペイロードに変換するパイプライン
///
/// デコード → ミックスダウン → リサンプル → PCM コンテナエンコード を
/// この順で合成し、最後に出力サイズの上限を検査する。
/// 各段の失敗はそれぞれ別の [`TranscodeError`] として報告され、
/// 内部でのリトライは行わない。
///
/// # Examples
///
/// ```no_run
/// # use verbalize::transcoder::Transcoder;
/// # use verbalize::types::Recording;
/// let transcoder = Transcoder::new();
/// let recording = Recording::new("audio/pcm;rate=48000;channels=2");
/// let payload = transcoder.transcode(&recording).unwrap();
/// assert_eq!(payload.sample_rate, 16000);
/// ```
pub struct Transcoder {
    decoders: Vec<Box<dyn AudioDecoder>>,
    target_rate: u32,
    max_bytes: usize,
}

impl Transcoder {
    /// 標準構成のトランスコーダーを作成
    ///
    /// 生 PCM デコーダーを登録し、ターゲットレート 16kHz、
    /// 出力上限 25 MiB で初期化する。
    pub fn new() -> Self {
        Self {
            decoders: vec![Box::new(PcmDecoder)],
            target_rate: TARGET_SAMPLE_RATE,
            max_bytes: MAX_PAYLOAD_BYTES,
        }
    }

    /// デコーダーを追加登録
    pub fn with_decoder(mut self, decoder: Box<dyn AudioDecoder>) -> Self {
        self.decoders.push(decoder);
        self
    }

    /// 確定済みの Recording をトランスコード
    ///
    /// # Errors
    ///
    /// - [`TranscodeError::UnsupportedMimeType`] - 対応デコーダーなし
    /// - [`TranscodeError::Decode`] - ネイティブエンコーディングの展開失敗
    /// - [`TranscodeError::EmptySource`] - デコード結果が空
    /// - [`TranscodeError::PayloadTooLarge`] - 出力が上限サイズを超過
    pub fn transcode(&self, recording: &Recording) -> Result<EncodedPayload, TranscodeError> {
        let decoder = self
            .decoders
            .iter()
            .find(|d| d.supports(recording.mime_type()))
            .ok_or_else(|| {
                TranscodeError::UnsupportedMimeType(recording.mime_type().to_string())
            })?;

        let decoded = decoder.decode(recording)?;

        log::debug!(
            "デコード完了: {}ch, {}Hz, {}フレーム",
            decoded.channels,
            decoded.sample_rate,
            decoded.frames()
        );

        let mono = mixdown(decoded);
        let resampled = resample(mono, self.target_rate)?;
        let payload = encode_wav(&resampled)?;

        if payload.bytes.len() > self.max_bytes {
            return Err(TranscodeError::PayloadTooLarge {
                size: payload.bytes.len(),
                max: self.max_bytes,
            });
        }

        log::debug!(
            "トランスコード完了: {} バイト ({}Hz, {}bit)",
            payload.bytes.len(),
            payload.sample_rate,
            payload.bits_per_sample
        );

        Ok(payload)
    }
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new()
    }
}

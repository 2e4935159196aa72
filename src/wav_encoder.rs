use crate::error::TranscodeError;
use crate::types::{EncodedPayload, SampleBuffer};
use std::io::Cursor;

/// f32 サンプルを 16bit 符号付き整数に変換
///
/// [-1, 1] にクランプしたうえで、負値は 32768、非負値は 32767 で
/// スケールする（非対称スケーリング）。これにより ±1.0 が i16 の
/// 範囲内で正確に表現できる。
pub(crate) fn float_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32768.0) as i16
    } else {
        (clamped * 32767.0) as i16
    }
}

/// モノラル SampleBuffer を PCM/WAV コンテナにエンコード
///
/// 固定ヘッダ（リニア PCM、1チャンネル、16bit、バイトレート =
/// サンプルレート×2、ブロックアライン = 2）に続けてサンプルデータを
/// リトルエンディアンで書き込む。決定論的な純関数で、同じ入力からは
/// 常にバイト単位で同一の出力が得られる。
///
/// 入力はモノラルであることが前提条件（Transcoder が保証する）。
///
/// # Errors
///
/// コンテナの書き込みに失敗した場合は [`TranscodeError::Encode`] を返す。
pub fn encode_wav(buffer: &SampleBuffer) -> Result<EncodedPayload, TranscodeError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| TranscodeError::Encode(e.to_string()))?;

        for &sample in &buffer.samples {
            writer
                .write_sample(float_to_i16(sample))
                .map_err(|e| TranscodeError::Encode(e.to_string()))?;
        }

        writer
            .finalize()
            .map_err(|e| TranscodeError::Encode(e.to_string()))?;
    }

    Ok(EncodedPayload {
        bytes: cursor.into_inner(),
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(samples: Vec<f32>, sample_rate: u32) -> SampleBuffer {
        SampleBuffer {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// ヘッダからリトルエンディアンの u32 を読む
    fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    #[test]
    fn test_float_to_i16_scaling() {
        assert_eq!(float_to_i16(0.0), 0);
        assert_eq!(float_to_i16(1.0), 32767);
        assert_eq!(float_to_i16(-1.0), -32768);
        assert_eq!(float_to_i16(0.5), 16383);
        assert_eq!(float_to_i16(-0.5), -16384);

        // 範囲外はクランプ
        assert_eq!(float_to_i16(2.0), 32767);
        assert_eq!(float_to_i16(-2.0), -32768);
    }

    #[test]
    fn test_header_invariants() {
        for n in [1usize, 5, 1600] {
            let payload = encode_wav(&mono(vec![0.1; n], 16000)).unwrap();

            // 44バイトヘッダ + 2バイト×サンプル数
            assert_eq!(payload.bytes.len(), 44 + n * 2);
            assert_eq!(payload.bits_per_sample, 16);

            // ヘッダのサンプルレート (offset 24) とデータ長 (offset 40)
            assert_eq!(read_u32_le(&payload.bytes, 24), 16000);
            assert_eq!(read_u32_le(&payload.bytes, 40), (n * 2) as u32);

            // バイトレート (offset 28) = レート × 2、ブロックアライン (offset 32) = 2
            assert_eq!(read_u32_le(&payload.bytes, 28), 16000 * 2);
            assert_eq!(
                u16::from_le_bytes([payload.bytes[32], payload.bytes[33]]),
                2
            );
        }
    }

    #[test]
    fn test_declared_rate_matches_buffer() {
        let payload = encode_wav(&mono(vec![0.0; 100], 44100)).unwrap();
        assert_eq!(payload.sample_rate, 44100);
        assert_eq!(read_u32_le(&payload.bytes, 24), 44100);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let input = vec![0.0f32, 0.5, -0.5, 1.0, -1.0];
        let payload = encode_wav(&mono(input.clone(), 16000)).unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(payload.bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);

        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![0, 16383, -16384, 32767, -32768]);

        // 量子化誤差 1/32768 以内で元の値が復元できる（±1.0 は正確）
        for (&original, &quantized) in input.iter().zip(&decoded) {
            let recovered = if quantized < 0 {
                quantized as f32 / 32768.0
            } else {
                quantized as f32 / 32767.0
            };
            assert!(
                (original - recovered).abs() <= 1.0 / 32768.0,
                "{} -> {} -> {}",
                original,
                quantized,
                recovered
            );
        }
    }

    #[test]
    fn test_deterministic_output() {
        let buffer = mono(vec![0.3, -0.7, 0.9], 16000);
        let a = encode_wav(&buffer).unwrap();
        let b = encode_wav(&buffer).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }
}

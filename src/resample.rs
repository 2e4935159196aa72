use crate::error::TranscodeError;
use crate::types::SampleBuffer;

/// モノラル音声を線形補間でリサンプル
///
/// 出力長は floor(入力長 × R_out / R_in)、最小1。出力インデックス i に
/// 対してソース位置 p = i / (R_out/R_in) を計算し、p を挟む2サンプルを
/// 線形補間する。末尾では最終サンプルにクランプする。
///
/// R_in = R_out の場合は入力をそのまま返す。これは単なる最適化ではなく、
/// 既に正しいレートの音声がビット単位で不変に通過することを保証する
/// ための仕様。
///
/// # Errors
///
/// 入力が空の場合は [`TranscodeError::EmptySource`] を返す
/// （空ソースに意味のあるリサンプルは存在しないため即座に失敗させる）。
///
/// # Examples
///
/// ```
/// # use verbalize::resample::resample;
/// # use verbalize::types::SampleBuffer;
/// let buffer = SampleBuffer {
///     samples: vec![0.5; 48000],
///     sample_rate: 48000,
///     channels: 1,
/// };
/// let out = resample(buffer, 16000).unwrap();
/// assert_eq!(out.sample_rate, 16000);
/// assert_eq!(out.samples.len(), 16000);
/// ```
pub fn resample(buffer: SampleBuffer, target_rate: u32) -> Result<SampleBuffer, TranscodeError> {
    if buffer.samples.is_empty() {
        return Err(TranscodeError::EmptySource);
    }

    // 同一レートはビット単位の恒等変換
    if buffer.sample_rate == target_rate {
        return Ok(buffer);
    }

    let input = &buffer.samples;
    let ratio = target_rate as f64 / buffer.sample_rate as f64;
    let output_len = ((input.len() as f64 * ratio) as usize).max(1);
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let p = i as f64 / ratio;
        let i0 = p as usize;
        let i1 = (i0 + 1).min(input.len() - 1);
        let frac = (p - i0 as f64) as f32;
        output.push(input[i0] + frac * (input[i1] - input[i0]));
    }

    Ok(SampleBuffer {
        samples: output,
        sample_rate: target_rate,
        channels: buffer.channels,
    })
}

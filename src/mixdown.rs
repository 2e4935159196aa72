use crate::types::SampleBuffer;

/// マルチチャンネル音声をモノラルにミックスダウン
///
/// 各出力サンプルは同一フレーム内の N チャンネルの算術平均。
/// 加算前に各チャンネルへ 1/N のスケールを掛けることで、
/// 全チャンネルが同符号でも合計が [-1, 1] を超えない。
///
/// N = 1 の場合は入力をそのまま返す（恒等変換）。
/// チャンネル数 ≥ 1 は呼び出し側が保証する前提条件。
///
/// # Examples
///
/// ```
/// # use verbalize::mixdown::mixdown;
/// # use verbalize::types::SampleBuffer;
/// let stereo = SampleBuffer {
///     samples: vec![1.0, -1.0, 1.0, -1.0], // L/R 逆相
///     sample_rate: 48000,
///     channels: 2,
/// };
/// let mono = mixdown(stereo);
/// assert_eq!(mono.channels, 1);
/// assert_eq!(mono.samples, vec![0.0, 0.0]);
/// ```
pub fn mixdown(buffer: SampleBuffer) -> SampleBuffer {
    if buffer.channels <= 1 {
        return buffer;
    }

    let n = buffer.channels as usize;
    let scale = 1.0 / n as f32;

    let mono: Vec<f32> = buffer
        .samples
        .chunks_exact(n)
        .map(|frame| frame.iter().map(|&s| s * scale).sum())
        .collect();

    SampleBuffer {
        samples: mono,
        sample_rate: buffer.sample_rate,
        channels: 1,
    }
}

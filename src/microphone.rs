use crate::capture::{CaptureDevice, CaptureSession, DeviceHandle};
use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::types::CaptureChunk;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SizedSample};
use tokio::sync::mpsc;

/// マイク入力デバイス
///
/// cpal の入力ストリームを [`CaptureDevice`] に適合させる。
/// チャンクはデバイスのネイティブフォーマットを保ったまま
/// 生 PCM (f32 リトルエンディアン、インターリーブ) として届き、
/// MIME タイプのパラメータでレートとチャンネル数を伝える。
pub struct MicrophoneDevice {
    device_id: String,
}

/// マイクのストリームハンドル
///
/// drop でストリームを破棄し、マイクを解放する。
struct MicrophoneHandle {
    _stream: cpal::Stream,
}

impl DeviceHandle for MicrophoneHandle {}

impl Drop for MicrophoneHandle {
    fn drop(&mut self) {
        log::info!("マイクを解放しました");
    }
}

impl MicrophoneDevice {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            device_id: config.device_id.clone(),
        }
    }

    /// 設定に合致する入力デバイスを取得
    fn find_device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();

        if self.device_id == "default" {
            return host
                .default_input_device()
                .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".to_string()));
        }

        // デバイスIDが指定されている場合は、デバイス一覧から検索
        let mut devices = host
            .input_devices()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
        devices
            .find(|d| d.name().ok().as_deref() == Some(&self.device_id))
            .ok_or_else(|| {
                CaptureError::DeviceUnavailable(format!("device not found: {}", self.device_id))
            })
    }

    /// ストリームを構築
    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        tx: mpsc::Sender<CaptureChunk>,
    ) -> Result<cpal::Stream, CaptureError>
    where
        T: SizedSample + Sample + Send + 'static,
        <T as Sample>::Float: Into<f32>,
    {
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0 as u64;

        let data_callback = move |data: &[T], _info: &cpal::InputCallbackInfo| {
            let mut bytes = Vec::with_capacity(data.len() * 4);
            for &sample in data {
                let f: f32 = sample.to_float_sample().into();
                bytes.extend_from_slice(&f.clamp(-1.0, 1.0).to_le_bytes());
            }

            let frames = if channels > 0 { data.len() / channels } else { 0 };
            let duration_ms = (frames as u64 * 1000) / sample_rate.max(1);

            match tx.try_send(CaptureChunk { bytes, duration_ms }) {
                Ok(_) => {
                    // 成功時はログ出力しない（パフォーマンス重視）
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("キャプチャチャンクの送信失敗: バッファ満杯");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::debug!("キャプチャチャンクの送信失敗: チャンネルクローズ");
                }
            }
        };

        let error_callback = move |err| {
            log::error!("ストリームエラー: {}", err);
        };

        device
            .build_input_stream(config, data_callback, error_callback, None)
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => {
                    CaptureError::PermissionDenied("device not available".to_string())
                }
                other => CaptureError::StreamBuild(other.to_string()),
            })
    }

    /// デバイス一覧を表示
    pub fn list_devices() -> anyhow::Result<()> {
        let host = cpal::default_host();
        println!("利用可能な入力デバイス:");
        println!();

        for (idx, device) in host.input_devices()?.enumerate() {
            let name = device.name()?;
            println!("  [{}] {}", idx, name);

            device.supported_input_configs()?.for_each(|config_range| {
                println!(
                    "      フォーマット: {:?}, {}-{}Hz, {}ch",
                    config_range.sample_format(),
                    config_range.min_sample_rate().0,
                    config_range.max_sample_rate().0,
                    config_range.channels()
                );
            });
            println!();
        }

        Ok(())
    }
}

#[async_trait(?Send)]
impl CaptureDevice for MicrophoneDevice {
    async fn open(&mut self) -> Result<CaptureSession, CaptureError> {
        let device = self.find_device()?;

        log::info!("入力デバイス: {:?}", device.name());

        let default_config = device
            .default_input_config()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        log::info!(
            "デバイス設定: {:?}, {}Hz, {}ch",
            default_config.sample_format(),
            default_config.sample_rate().0,
            default_config.channels()
        );

        let sample_rate = default_config.sample_rate().0;
        let channels = default_config.channels();
        let stream_config = default_config.config();

        let (tx, rx) = mpsc::channel(1024);

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(&device, &stream_config, tx)?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(&device, &stream_config, tx)?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(&device, &stream_config, tx)?,
            cpal::SampleFormat::I32 => Self::build_stream::<i32>(&device, &stream_config, tx)?,
            other => {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| CaptureError::StreamBuild(e.to_string()))?;

        log::info!("音声入力ストリームを開始しました");

        Ok(CaptureSession {
            mime_type: format!("audio/pcm;rate={};channels={}", sample_rate, channels),
            chunks: rx,
            handle: Box::new(MicrophoneHandle { _stream: stream }),
        })
    }
}

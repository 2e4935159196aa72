use crate::error::CaptureError;
use crate::types::{CaptureChunk, Recording};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// 録音状態
///
/// `Idle → Recording → Idle`（通常停止）、
/// `Idle → Recording → Error`（許可拒否・未対応環境）、
/// タイマーによる自動停止も `Recording → Idle`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    /// 待機中
    Idle,

    /// 録音中（同時に1セッションのみ）
    Recording,

    /// キャプチャ失敗（reset または再 start まで維持）
    Error,
}

/// デバイスハンドル
///
/// drop でデバイスを解放する。エラーパスを含むあらゆる経路で
/// 確実に解放されるよう、所有権ベースの解放のみを使う。
pub trait DeviceHandle {}

/// オープン済みのキャプチャセッション
///
/// デバイスから非同期に届くエンコード済みチャンクの受信口と、
/// 排他的なデバイスハンドルの組。
pub struct CaptureSession {
    /// チャンクのネイティブエンコーディングを表す MIME タイプ
    pub mime_type: String,

    /// チャンク受信チャンネル
    pub chunks: mpsc::Receiver<CaptureChunk>,

    /// デバイスハンドル（drop で解放）
    pub handle: Box<dyn DeviceHandle>,
}

/// キャプチャデバイスの共通トレイト
///
/// 排他的なデバイスハンドルを取得し、エンコード済みチャンクの
/// ストリームを開始する。
#[async_trait(?Send)]
pub trait CaptureDevice {
    /// デバイスを取得してセッションを開始
    async fn open(&mut self) -> Result<CaptureSession, CaptureError>;
}

struct ActiveSession {
    recording: Recording,
    chunks: mpsc::Receiver<CaptureChunk>,
    handle: Box<dyn DeviceHandle>,
    deadline: Instant,
}

/// 録音ライフサイクルを管理するステートマシン
///
/// 1インスタンスにつき同時に1つの Recording のみを許可する。
/// `start` はデバイスを排他取得し、`capture` は停止シグナル・
/// 最大録音時間・デバイス側の終了のいずれかまでチャンクを蓄積して
/// Recording を確定する。どの経路でもデバイスハンドルは無条件に
/// 解放される。
pub struct Recorder {
    device: Box<dyn CaptureDevice>,
    state: CaptureState,
    max_duration: Duration,
    active: Option<ActiveSession>,
}

impl Recorder {
    pub fn new(device: Box<dyn CaptureDevice>, max_duration: Duration) -> Self {
        Self {
            device,
            state: CaptureState::Idle,
            max_duration,
            active: None,
        }
    }

    /// 現在の状態
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// 録音を開始
    ///
    /// デバイスを排他取得し、チャンクの蓄積準備を行う。
    /// 最大録音時間のデッドラインはこの時点から計測される。
    ///
    /// # Errors
    ///
    /// すでに録音中の場合は [`CaptureError::AlreadyRecording`]。
    /// デバイス取得に失敗した場合はそのエラーを返し、状態は `Error` になる。
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if self.state == CaptureState::Recording {
            return Err(CaptureError::AlreadyRecording);
        }

        match self.device.open().await {
            Ok(session) => {
                log::info!("録音を開始しました ({})", session.mime_type);
                self.active = Some(ActiveSession {
                    recording: Recording::new(session.mime_type),
                    chunks: session.chunks,
                    handle: session.handle,
                    deadline: Instant::now() + self.max_duration,
                });
                self.state = CaptureState::Recording;
                Ok(())
            }
            Err(e) => {
                log::error!("デバイス取得に失敗: {}", e);
                self.state = CaptureState::Error;
                Err(e)
            }
        }
    }

    /// チャンクを蓄積し、停止条件の成立で Recording を確定して返す
    ///
    /// 停止条件は次のいずれか:
    /// - `stop` フューチャの解決（ユーザー起因の停止）
    /// - 最大録音時間への到達（タイマー起因の強制停止）
    /// - デバイス側のチャンク供給終了
    ///
    /// 早期停止は常に安全で、それまでに蓄積したチャンクからなる
    /// 有効な（ごく短い可能性のある）Recording を返す。
    /// 復帰前にデバイスハンドルを必ず解放する。
    pub async fn capture(&mut self, stop: impl Future<Output = ()>) -> Result<Recording, CaptureError> {
        let mut active = self.active.take().ok_or(CaptureError::NotRecording)?;

        tokio::pin!(stop);

        let pump_result: Result<(), CaptureError> = loop {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    log::info!("停止要求を受信しました");
                    break Ok(());
                }
                _ = tokio::time::sleep_until(active.deadline) => {
                    log::info!("最大録音時間に達したため停止します");
                    break Ok(());
                }
                maybe_chunk = active.chunks.recv() => {
                    match maybe_chunk {
                        Some(chunk) => {
                            if let Err(e) = active.recording.append(&chunk) {
                                break Err(e);
                            }
                        }
                        None => {
                            log::debug!("デバイスがチャンク供給を終了しました");
                            break Ok(());
                        }
                    }
                }
            }
        };

        // 停止時点までに届いていたチャンクを取りこぼさない
        while let Ok(chunk) = active.chunks.try_recv() {
            let _ = active.recording.append(&chunk);
        }

        // デバイスハンドルを無条件に解放
        drop(active.handle);
        self.state = CaptureState::Idle;

        pump_result?;

        let mut recording = active.recording;
        recording.seal();

        log::info!(
            "録音を確定しました: {} バイト ({:.2}秒)",
            recording.bytes().len(),
            recording.duration_ms() as f64 / 1000.0
        );

        Ok(recording)
    }

    /// エラー状態を待機状態に戻す
    pub fn reset(&mut self) {
        if self.state == CaptureState::Error {
            self.state = CaptureState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FakeHandle {
        released: Arc<AtomicBool>,
    }

    impl DeviceHandle for FakeHandle {}

    impl Drop for FakeHandle {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    /// テスト用キャプチャデバイス
    ///
    /// open 時に事前登録したチャンクを送信する。
    /// `hold_open` が真の間は送信側を保持してチャンネルを開いたままにする。
    struct FakeDevice {
        chunks: Vec<CaptureChunk>,
        hold_open: bool,
        released: Arc<AtomicBool>,
        sender_keepalive: Option<mpsc::Sender<CaptureChunk>>,
        fail_with: Option<fn() -> CaptureError>,
    }

    impl FakeDevice {
        fn new(chunks: Vec<CaptureChunk>, hold_open: bool) -> Self {
            Self {
                chunks,
                hold_open,
                released: Arc::new(AtomicBool::new(false)),
                sender_keepalive: None,
                fail_with: None,
            }
        }
    }

    #[async_trait(?Send)]
    impl CaptureDevice for FakeDevice {
        async fn open(&mut self) -> Result<CaptureSession, CaptureError> {
            if let Some(make_err) = self.fail_with {
                return Err(make_err());
            }

            let (tx, rx) = mpsc::channel(64);
            for chunk in &self.chunks {
                tx.try_send(chunk.clone()).unwrap();
            }
            if self.hold_open {
                self.sender_keepalive = Some(tx);
            }

            Ok(CaptureSession {
                mime_type: "audio/pcm;rate=16000;channels=1".to_string(),
                chunks: rx,
                handle: Box::new(FakeHandle {
                    released: self.released.clone(),
                }),
            })
        }
    }

    fn chunk(len: usize, duration_ms: u64) -> CaptureChunk {
        CaptureChunk {
            bytes: vec![0u8; len],
            duration_ms,
        }
    }

    #[tokio::test]
    async fn test_normal_stop_produces_sealed_recording() {
        let device = FakeDevice::new(vec![chunk(64, 100), chunk(32, 50)], false);
        let mut recorder = Recorder::new(Box::new(device), Duration::from_secs(10));

        recorder.start().await.unwrap();
        assert_eq!(recorder.state(), CaptureState::Recording);

        // デバイスが供給を終えるとキャプチャも終わる
        let recording = recorder.capture(std::future::pending()).await.unwrap();

        assert!(recording.is_sealed());
        assert_eq!(recording.bytes().len(), 96);
        assert_eq!(recording.duration_ms(), 150);
        assert_eq!(recorder.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_start_while_recording_rejected() {
        let device = FakeDevice::new(vec![], true);
        let mut recorder = Recorder::new(Box::new(device), Duration::from_secs(10));

        recorder.start().await.unwrap();
        let result = recorder.start().await;
        assert!(matches!(result, Err(CaptureError::AlreadyRecording)));
    }

    #[tokio::test]
    async fn test_user_stop_is_always_safe() {
        let device = FakeDevice::new(vec![chunk(16, 20)], true);
        let released = device.released.clone();
        let mut recorder = Recorder::new(Box::new(device), Duration::from_secs(10));

        recorder.start().await.unwrap();

        // 即時停止でも、届いていたチャンクは回収される
        let recording = recorder.capture(std::future::ready(())).await.unwrap();

        assert!(recording.is_sealed());
        assert_eq!(recording.bytes().len(), 16);
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(recorder.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_timeout_forces_stop() {
        let device = FakeDevice::new(vec![chunk(8, 10)], true);
        let released = device.released.clone();
        let mut recorder = Recorder::new(Box::new(device), Duration::from_millis(50));

        recorder.start().await.unwrap();

        let started = std::time::Instant::now();
        let recording = recorder.capture(std::future::pending()).await.unwrap();

        // 停止シグナルなしでもタイマーで停止する
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert!(recording.is_sealed());
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(recorder.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_open_failure_enters_error_state() {
        let mut device = FakeDevice::new(vec![], false);
        device.fail_with = Some(|| CaptureError::PermissionDenied("denied by user".to_string()));
        let mut recorder = Recorder::new(Box::new(device), Duration::from_secs(10));

        let result = recorder.start().await;
        assert!(matches!(result, Err(CaptureError::PermissionDenied(_))));
        assert_eq!(recorder.state(), CaptureState::Error);

        // reset で待機状態に戻せる
        recorder.reset();
        assert_eq!(recorder.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_capture_without_start() {
        let device = FakeDevice::new(vec![], false);
        let mut recorder = Recorder::new(Box::new(device), Duration::from_secs(10));

        let result = recorder.capture(std::future::ready(())).await;
        assert!(matches!(result, Err(CaptureError::NotRecording)));
    }

    #[tokio::test]
    async fn test_zero_byte_chunks_ignored() {
        let device = FakeDevice::new(vec![chunk(0, 100), chunk(8, 10), chunk(0, 0)], false);
        let mut recorder = Recorder::new(Box::new(device), Duration::from_secs(10));

        recorder.start().await.unwrap();
        let recording = recorder.capture(std::future::pending()).await.unwrap();

        assert_eq!(recording.bytes().len(), 8);
        assert_eq!(recording.duration_ms(), 10);
    }
}

use anyhow::{Context, Result};
use env_logger::Env;
use futures_util::StreamExt;
use std::io::Write;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use verbalize::capture::Recorder;
use verbalize::compose_api::ComposeClient;
use verbalize::config::Config;
use verbalize::microphone::MicrophoneDevice;
use verbalize::relay::sse_frame;
use verbalize::transcoder::Transcoder;
use verbalize::whisper_api::TranscribeClient;

#[tokio::main]
async fn main() -> Result<()> {
    // ロガーを初期化
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    // コマンドライン引数をパース
    let args: Vec<String> = std::env::args().collect();

    // デバイス一覧表示モード
    if args.len() > 1 && args[1] == "--show-devices" {
        MicrophoneDevice::list_devices()?;
        return Ok(());
    }

    // 設定ファイル生成モード
    if args.len() > 1 && args[1] == "--generate-config" {
        let config_path = if args.len() > 2 {
            &args[2]
        } else {
            "config.toml"
        };
        Config::write_default(config_path)?;
        println!("設定ファイルを生成しました: {}", config_path);
        return Ok(());
    }

    // ヘルスチェックモード
    if args.len() > 1 && args[1] == "--health-check" {
        let config_path = if args.len() > 2 {
            &args[2]
        } else {
            "config.toml"
        };
        let config = Config::load_or_default(config_path)?;
        return run_health_check(&config).await;
    }

    // 設定ファイルのパス
    let config_path = if args.len() > 1 && !args[1].starts_with("--") {
        &args[1]
    } else {
        "config.toml"
    };

    // 設定を読み込み
    let config = Config::load_or_default(config_path)?;
    config.validate()?;

    log::info!("verbalize を起動します");

    // Ctrl+C ハンドラを設定（録音の停止シグナル）
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || {
        log::info!("停止シグナルを受信しました...");
        running_clone.store(false, Ordering::SeqCst);
    })?;

    // 1. 録音
    let device = MicrophoneDevice::new(&config.capture);
    let mut recorder = Recorder::new(
        Box::new(device),
        Duration::from_secs(config.capture.max_duration_seconds),
    );

    recorder.start().await.context("録音の開始に失敗")?;

    log::info!(
        "録音中です (Ctrl+C で停止、最大 {} 秒)",
        config.capture.max_duration_seconds
    );

    let stop_signal = {
        let running = running.clone();
        async move {
            while running.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    };

    let recording = recorder
        .capture(stop_signal)
        .await
        .context("録音の確定に失敗")?;

    // 2. トランスコード
    let transcoder = Transcoder::new();
    let payload = transcoder
        .transcode(&recording)
        .context("トランスコードに失敗")?;

    log::info!(
        "アップロードペイロード: {} バイト ({}Hz)",
        payload.bytes.len(),
        payload.sample_rate
    );

    // 3. 文字起こし
    let transcribe_client =
        TranscribeClient::new(config.transcribe.clone()).context("文字起こしクライアント作成失敗")?;
    let transcription = transcribe_client
        .transcribe(&payload, None)
        .await
        .context("文字起こしに失敗")?;

    // JSON形式で出力
    if let Ok(json) = serde_json::to_string(&transcription) {
        println!("{}", json);
    }

    // 4. 文章整形（ストリーミング）
    let compose_client =
        ComposeClient::new(config.compose.clone()).context("生成クライアント作成失敗")?;
    let events = compose_client
        .compose_stream(
            &transcription.transcript,
            config.compose.pre_prompt.as_deref(),
        )
        .await
        .context("生成リクエストに失敗")?;

    // イベントを生成され次第 SSE フレームとして転送する
    let mut stdout = std::io::stdout();
    futures_util::pin_mut!(events);
    while let Some(event) = events.next().await {
        stdout.write_all(sse_frame(&event).as_bytes())?;
        stdout.flush()?;
    }

    log::info!("verbalize を終了しました");

    Ok(())
}

/// 外部サービスへの到達性を確認
async fn run_health_check(config: &Config) -> Result<()> {
    let transcribe_client = TranscribeClient::new(config.transcribe.clone())
        .context("文字起こしクライアント作成失敗")?;
    match transcribe_client.health_check().await {
        Ok(()) => println!("transcribe: ok"),
        Err(e) => println!("transcribe: unreachable ({})", e),
    }

    let compose_client =
        ComposeClient::new(config.compose.clone()).context("生成クライアント作成失敗")?;
    match compose_client.health_check().await {
        Ok(()) => println!("compose: ok"),
        Err(e) => println!("compose: unreachable ({})", e),
    }

    Ok(())
}

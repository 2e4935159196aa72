use thiserror::Error;

/// 録音（キャプチャ）段階のエラー
///
/// マイクの取得から Recording の確定までに発生するエラー。
/// いずれの場合もデバイスハンドルは解放済みであることを保証する。
#[derive(Debug, Error)]
pub enum CaptureError {
    /// すでに録音中に start が呼ばれた（多重録音は拒否する）
    #[error("recording already in progress")]
    AlreadyRecording,

    /// 録音中でないのに stop が呼ばれた
    #[error("no recording in progress")]
    NotRecording,

    /// マイクの使用許可が得られなかった
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// 入力デバイスが存在しない、または環境が未対応
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// 入力ストリームの構築に失敗
    #[error("failed to build capture stream: {0}")]
    StreamBuild(String),

    /// 確定済みの Recording への追記は許可しない
    #[error("recording is sealed")]
    RecordingSealed,
}

/// トランスコード段階のエラー
///
/// デコード失敗・空ソース・サイズ超過はそれぞれ別の変種として報告し、
/// アップロード前に必ず呼び出し元へ返す。内部でのリトライは行わない。
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// Recording の MIME タイプに対応するデコーダーが登録されていない
    #[error("unsupported recording type: {0}")]
    UnsupportedMimeType(String),

    /// ネイティブエンコーディングのデコードに失敗
    #[error("failed to decode recording: {0}")]
    Decode(String),

    /// リサンプル対象が空（無意味な変換は即座に失敗させる）
    #[error("audio source is empty")]
    EmptySource,

    /// PCM コンテナへの書き込みに失敗
    #[error("failed to encode PCM container: {0}")]
    Encode(String),

    /// 出力ペイロードが上限サイズを超過
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// 文字起こしアップロード境界のエラー
///
/// 入力検証エラーは外部呼び出しの前に同期的に返す。
/// 上流エラーのメッセージはサニタイズ済みの文字列のみを保持する。
#[derive(Debug, Error)]
pub enum UploadError {
    /// 許可されていない音声 MIME タイプ
    #[error("unsupported type: {0}")]
    UnsupportedMimeType(String),

    /// ペイロードが上限サイズを超過
    #[error("file too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// 言語ヒントが不正（2〜5文字の言語コードのみ許可）
    #[error("invalid language hint: {0}")]
    InvalidLanguage(String),

    /// 文字起こし結果が空
    #[error("no transcript returned from server")]
    EmptyTranscript,

    /// 上流サービスが非成功レスポンスを返した（メッセージはサニタイズ済み）
    #[error("transcription service error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// HTTP リクエスト自体の失敗
    #[error("transcription request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// 文章整形（生成）境界のエラー
#[derive(Debug, Error)]
pub enum ComposeError {
    /// トランスクリプトが空
    #[error("transcript cannot be empty")]
    EmptyTranscript,

    /// トランスクリプトが長すぎる
    #[error("transcript too long: {len} chars (max {max})")]
    TranscriptTooLong { len: usize, max: usize },

    /// プリプロンプトが長すぎる
    #[error("pre-prompt too long: {len} chars (max {max})")]
    PrePromptTooLong { len: usize, max: usize },

    /// 上流サービスが非成功レスポンスを返した（メッセージはサニタイズ済み）
    #[error("composition service error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// HTTP リクエスト自体の失敗
    #[error("composition request failed: {0}")]
    Request(#[from] reqwest::Error),
}

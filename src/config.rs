use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// リサンプル先の固定ターゲットレート (Hz)
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// アップロードペイロードの上限サイズ (25 MiB 固定)
pub const MAX_PAYLOAD_BYTES: usize = 25 * 1024 * 1024;

/// 最大録音時間の有効範囲（秒）
pub const MIN_DURATION_SEC: u64 = 10;
pub const MAX_DURATION_SEC: u64 = 600;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub transcribe: TranscribeConfig,
    #[serde(default)]
    pub compose: ComposeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// 録音設定
///
/// マイクデバイスと録音時間の上限に関する設定。
///
/// # デフォルト値
///
/// - `device_id`: "default" (システムのデフォルトデバイス)
/// - `max_duration_seconds`: 180 秒（有効範囲 10〜600）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default = "default_max_duration_seconds")]
    pub max_duration_seconds: u64,
}

/// 文字起こし API 設定
///
/// # デフォルト値
///
/// - `endpoint`: OpenAI Audio Transcriptions API
/// - `model`: "whisper-1"
/// - `language`: なし（自動判定）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscribeConfig {
    /// API Key
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_transcribe_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_transcribe_model")]
    pub model: String,
    /// 言語ヒント（"ja", "en" など 2〜5 文字）。省略可能
    pub language: Option<String>,
}

/// 文章整形（生成）API 設定
///
/// # デフォルト値
///
/// - `base_url`: "https://ollama.com/api"
/// - `model`: "gpt-oss:120b-cloud"
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComposeConfig {
    /// API Key
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_compose_base_url")]
    pub base_url: String,
    #[serde(default = "default_compose_model")]
    pub model: String,
    /// 整形の方向付けに使うプリプロンプト。省略可能
    pub pre_prompt: Option<String>,
}

/// 出力設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default functions
fn default_device_id() -> String {
    "default".to_string()
}

fn default_max_duration_seconds() -> u64 {
    180
}

fn default_transcribe_endpoint() -> String {
    "https://api.openai.com/v1/audio/transcriptions".to_string()
}

fn default_transcribe_model() -> String {
    "whisper-1".to_string()
}

fn default_compose_base_url() -> String {
    "https://ollama.com/api".to_string()
}

fn default_compose_model() -> String {
    "gpt-oss:120b-cloud".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            transcribe: TranscribeConfig::default(),
            compose: ComposeConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            max_duration_seconds: default_max_duration_seconds(),
        }
    }
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_transcribe_endpoint(),
            model: default_transcribe_model(),
            language: None,
        }
    }
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_compose_base_url(),
            model: default_compose_model(),
            pre_prompt: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// 設定ファイルから読み込み
    ///
    /// TOML形式の設定ファイルをパースしてConfig構造体を生成する。
    ///
    /// # Errors
    ///
    /// ファイルの読み込みまたはパースに失敗した場合にエラーを返す。
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use verbalize::config::Config;
    /// let config = Config::from_file("config.toml").unwrap();
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("設定ファイルの読み込みに失敗: {:?}", path.as_ref()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "設定ファイルのパースに失敗")?;
        config.validate()?;
        Ok(config)
    }

    /// デフォルト設定をファイルに書き出し
    ///
    /// 既存のファイルは上書きされる。
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Config::default();
        let content =
            toml::to_string_pretty(&config).with_context(|| "設定のシリアライズに失敗")?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("設定ファイルの書き込みに失敗: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// 設定ファイルがあれば読み込み、なければデフォルトを使用
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            log::warn!(
                "設定ファイルが見つかりません。デフォルト設定を使用します: {:?}",
                path.as_ref()
            );
            Ok(Config::default())
        }
    }

    /// 設定値の検証
    ///
    /// 最大録音時間が有効範囲（10〜600秒）に収まっているかを確認する。
    pub fn validate(&self) -> Result<()> {
        let duration = self.capture.max_duration_seconds;
        if !(MIN_DURATION_SEC..=MAX_DURATION_SEC).contains(&duration) {
            anyhow::bail!(
                "max_duration_seconds は {}〜{} の範囲で指定してください: {}",
                MIN_DURATION_SEC,
                MAX_DURATION_SEC,
                duration
            );
        }
        Ok(())
    }
}

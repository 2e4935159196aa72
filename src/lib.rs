//! verbalize - 音声から整形済みテキストへの変換リレー
//!
//! このクレートは、マイクから取り込んだ音声を文字起こし可能な
//! フォーマットに正規化し、外部の文字起こし・文章生成サービスを
//! 経由して、生成テキストを呼び出し元にインクリメンタルに中継する
//! システムを提供します。
//!
//! # 主な機能
//!
//! - **音声正規化パイプライン**: ミックスダウン → 線形補間リサンプル → PCM/WAV エンコード
//! - **録音ステートマシン**: マイクの排他取得・チャンク蓄積・最大録音時間の強制
//! - **ストリームリレー**: 改行区切り JSON をチャンク境界を跨いで再構成し SSE として転送
//! - **レートゲート**: クライアント識別子ごとの固定ウィンドウカウンター
//!
//! # アーキテクチャ
//!
//! ```text
//! [Microphone] → [Recorder] → [Recording]
//!                                  ↓
//!                            [Transcoder]
//!                       (decode → mixdown → resample → wav)
//!                                  ↓
//!                          [TranscribeClient] → transcript
//!                                  ↓
//!                           [ComposeClient]
//!                                  ↓
//!                        [RelayParser] → SSE events
//! ```
//!
//! # 使用例
//!
//! ```no_run
//! use verbalize::config::Config;
//!
//! // 設定ファイルを読み込み
//! let config = Config::load_or_default("config.toml").unwrap();
//!
//! // またはデフォルト設定を生成
//! Config::write_default("config.toml").unwrap();
//! ```

pub mod capture;
pub mod compose_api;
pub mod config;
pub mod decoder;
pub mod error;
pub mod microphone;
pub mod mixdown;
pub mod rate_gate;
pub mod relay;
pub mod resample;
pub mod sanitize;
pub mod transcoder;
pub mod types;
pub mod wav_encoder;
pub mod whisper_api;

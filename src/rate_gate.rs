use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 固定ウィンドウの長さ
pub const WINDOW: Duration = Duration::from_secs(60);

/// ウィンドウあたりのリクエスト上限
pub const MAX_REQUESTS: u32 = 30;

/// リクエストごとに期限切れエントリを掃除する確率
const SWEEP_PROBABILITY: f64 = 0.01;

/// クライアント識別子ごとのウィンドウ状態
///
/// ウィンドウ内の最初のリクエストで作成され、期限切れで新しい
/// ウィンドウに置き換えられる。破棄は確率的スイープに任せる。
#[derive(Debug)]
struct RateWindow {
    count: u32,
    reset_at: Instant,
}

/// ゲート判定の結果
///
/// HTTP 層はこの値をそのままレスポンスヘッダ
/// (`X-RateLimit-Limit` / `X-RateLimit-Remaining`) と、拒否時の
/// 429 + `Retry-After` に写像する。
#[derive(Clone, Copy, Debug)]
pub struct GateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub retry_after_seconds: u64,
}

impl GateDecision {
    /// レスポンスヘッダへの写像
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit".to_string(), self.limit.to_string()),
            (
                "X-RateLimit-Remaining".to_string(),
                self.remaining.to_string(),
            ),
        ];
        if !self.allowed {
            headers.push((
                "Retry-After".to_string(),
                self.retry_after_seconds.to_string(),
            ));
        }
        headers
    }

    /// 拒否時の JSON ボディ
    pub fn rejection_body(&self) -> RejectionBody {
        RejectionBody {
            error: "Too many requests. Please try again later.",
            retry_after: self.retry_after_seconds,
        }
    }
}

/// 429 レスポンスの JSON ボディ
#[derive(Debug, Serialize)]
pub struct RejectionBody {
    pub error: &'static str,
    #[serde(rename = "retryAfter")]
    pub retry_after: u64,
}

/// 固定ウィンドウのリクエストカウンター
///
/// プロセス起動時に1つ作成し、リクエストごとに読み書きする
/// プロセス全域の状態。明示的な破棄は行わない（常駐サービス
/// プロセスとしては許容範囲）。
///
/// 既知の弱点: キー空間は転送元アドレスに由来するため、多数の
/// 偽装アドレスでマップが際限なく成長し得る。スイープは期限切れ
/// エントリしか回収しない。本番品質の再実装では容量制限付きの
/// ストア（LRU や外部キャッシュ）を使うこと。
pub struct RateGate {
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl RateGate {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// 転送元アドレスヘッダからクライアント識別子を導出
    ///
    /// カンマ区切りの先頭要素を使い、ヘッダがない場合は固定の
    /// "unknown" バケットに落とす（既知の弱点として明示）。
    pub fn client_key(forwarded_for: Option<&str>) -> String {
        forwarded_for
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown")
            .to_string()
    }

    /// リクエストを判定
    pub fn check(&self, key: &str) -> GateDecision {
        let decision = self.check_at(key, Instant::now());

        // 低確率で期限切れエントリを掃除する
        if rand::random::<f64>() < SWEEP_PROBABILITY {
            self.sweep(Instant::now());
        }

        decision
    }

    /// 指定時刻でリクエストを判定（テスト用に時刻を注入可能）
    fn check_at(&self, key: &str, now: Instant) -> GateDecision {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        let window = windows.get_mut(key);

        match window {
            None => {
                windows.insert(
                    key.to_string(),
                    RateWindow {
                        count: 1,
                        reset_at: now + WINDOW,
                    },
                );
                Self::decision(true, MAX_REQUESTS - 1)
            }
            Some(window) if window.reset_at <= now => {
                // 期限切れウィンドウは新しいウィンドウで置き換える
                window.count = 1;
                window.reset_at = now + WINDOW;
                Self::decision(true, MAX_REQUESTS - 1)
            }
            Some(window) => {
                if window.count >= MAX_REQUESTS {
                    return Self::decision(false, 0);
                }
                window.count += 1;
                Self::decision(true, MAX_REQUESTS - window.count)
            }
        }
    }

    /// 期限切れエントリを削除
    fn sweep(&self, now: Instant) {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let before = windows.len();
        windows.retain(|_, w| w.reset_at > now);
        let removed = before - windows.len();
        if removed > 0 {
            log::debug!("レートゲート: 期限切れエントリを {} 件削除", removed);
        }
    }

    fn decision(allowed: bool, remaining: u32) -> GateDecision {
        GateDecision {
            allowed,
            limit: MAX_REQUESTS,
            remaining,
            retry_after_seconds: WINDOW.as_secs(),
        }
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_30th_allowed_31st_rejected() {
        let gate = RateGate::new();
        let now = Instant::now();

        for i in 1..=29 {
            let decision = gate.check_at("10.0.0.1", now);
            assert!(decision.allowed, "request {} should be allowed", i);
        }

        // 30件目は許可され、残数は0
        let decision = gate.check_at("10.0.0.1", now);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);

        // 31件目は拒否され、Retry-After は 60
        let decision = gate.check_at("10.0.0.1", now);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after_seconds, 60);
    }

    #[test]
    fn test_window_expiry_resets_count() {
        let gate = RateGate::new();
        let now = Instant::now();

        for _ in 0..31 {
            gate.check_at("10.0.0.2", now);
        }
        assert!(!gate.check_at("10.0.0.2", now).allowed);

        // ウィンドウ経過後は新しいウィンドウとして許可される
        let later = now + WINDOW + Duration::from_secs(1);
        let decision = gate.check_at("10.0.0.2", later);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, MAX_REQUESTS - 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let gate = RateGate::new();
        let now = Instant::now();

        for _ in 0..31 {
            gate.check_at("10.0.0.3", now);
        }
        assert!(!gate.check_at("10.0.0.3", now).allowed);

        // 別のクライアントには影響しない
        assert!(gate.check_at("10.0.0.4", now).allowed);
    }

    #[test]
    fn test_client_key_derivation() {
        assert_eq!(
            RateGate::client_key(Some("203.0.113.5, 10.0.0.1")),
            "203.0.113.5"
        );
        assert_eq!(RateGate::client_key(Some(" 203.0.113.5 ")), "203.0.113.5");
        assert_eq!(RateGate::client_key(None), "unknown");
        assert_eq!(RateGate::client_key(Some("")), "unknown");
    }

    #[test]
    fn test_sweep_removes_expired_only() {
        let gate = RateGate::new();
        let now = Instant::now();

        gate.check_at("old", now);
        let later = now + WINDOW + Duration::from_secs(1);
        gate.check_at("fresh", later);

        gate.sweep(later);

        let windows = gate.windows.lock().unwrap();
        assert!(!windows.contains_key("old"));
        assert!(windows.contains_key("fresh"));
    }

    #[test]
    fn test_headers_mapping() {
        let gate = RateGate::new();
        let now = Instant::now();

        let decision = gate.check_at("10.0.0.5", now);
        let headers = decision.headers();
        assert!(headers.contains(&("X-RateLimit-Limit".to_string(), "30".to_string())));
        assert!(headers.contains(&("X-RateLimit-Remaining".to_string(), "29".to_string())));
        assert!(!headers.iter().any(|(k, _)| k == "Retry-After"));

        for _ in 0..30 {
            gate.check_at("10.0.0.5", now);
        }
        let rejected = gate.check_at("10.0.0.5", now);
        let headers = rejected.headers();
        assert!(headers.contains(&("Retry-After".to_string(), "60".to_string())));

        let body = serde_json::to_value(rejected.rejection_body()).unwrap();
        assert_eq!(body["retryAfter"], 60);
        assert!(body["error"].is_string());
    }
}

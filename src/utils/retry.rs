use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// 线性退避重试策略：第 n 次失败后等待 n * base_delay
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// 执行 `operation` 直到成功、遇到不可重试的错误或用尽次数
///
/// `operation` 收到从 1 开始的尝试序号。返回首个成功结果，
/// 或首个 `is_retryable` 为 false 的错误，或最后一次的错误。
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= policy.max_attempts || !is_retryable(&e) {
                    return Err(e);
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    "第 {}/{} 次尝试失败: {}，{}ms 后重试",
                    attempt,
                    policy.max_attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1000))
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_with_increasing_delay() {
        let mut stamps = Vec::new();
        let result: Result<(), TestError> = retry_with_backoff(
            policy(),
            |_| {
                stamps.push(Instant::now());
                async { Err(TestError::Transient) }
            },
            |e| *e == TestError::Transient,
        )
        .await;

        assert_eq!(result, Err(TestError::Transient));
        assert_eq!(stamps.len(), 3);
        let first_gap = stamps[1] - stamps[0];
        let second_gap = stamps[2] - stamps[1];
        assert!(first_gap >= Duration::from_millis(1000));
        assert!(second_gap >= Duration::from_millis(2000));
        assert!(second_gap > first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_non_retryable_error() {
        let mut calls = 0;
        let result: Result<(), TestError> = retry_with_backoff(
            policy(),
            |_| {
                calls += 1;
                async { Err(TestError::Fatal) }
            },
            |e| *e == TestError::Transient,
        )
        .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_success() {
        let result = retry_with_backoff(
            policy(),
            |attempt| async move {
                if attempt < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(attempt)
                }
            },
            |e| *e == TestError::Transient,
        )
        .await;

        assert_eq!(result, Ok(2));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1)).max_attempts, 1);
    }
}

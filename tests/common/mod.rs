#![allow(dead_code)]

pub use appmon_test_utils::*;

use std::time::Duration;

/// Poll `cond` until it holds, for at most 5 seconds.
pub async fn eventually(cond: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

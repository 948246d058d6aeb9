#![cfg(feature = "browser")]

use std::time::Duration;

use futures::{StreamExt, stream};
use relay::server::services::browser_services::wait_for_network_idle;

const QUIET: Duration = Duration::from_millis(500);
const LIMIT: Duration = Duration::from_secs(5);

#[tokio::test(start_paused = true)]
async fn test_network_settles_once_responses_stop() {
    let mut events = stream::iter([1, 2, 3]).chain(stream::pending());

    let started = tokio::time::Instant::now();
    assert!(wait_for_network_idle(&mut events, QUIET, LIMIT).await);
    assert_eq!(started.elapsed(), QUIET);
}

#[tokio::test(start_paused = true)]
async fn test_network_settles_when_events_end() {
    let mut events = stream::iter([1, 2]);

    assert!(wait_for_network_idle(&mut events, QUIET, LIMIT).await);
}

#[tokio::test(start_paused = true)]
async fn test_busy_network_gives_up_at_the_limit() {
    let mut events = Box::pin(
        stream::repeat(()).then(|_| tokio::time::sleep(Duration::from_millis(100))),
    );

    let started = tokio::time::Instant::now();
    assert!(!wait_for_network_idle(&mut events, QUIET, LIMIT).await);
    assert_eq!(started.elapsed(), LIMIT);
}

/// Validate that a load test properly shuts down when it receives SIGINT (control-c).
use httpmock::{Method::GET, Mock, MockServer};
use nix::sys::signal::{kill, SIGINT};
use nix::unistd::getpid;
use serial_test::serial;
use tokio::time::{sleep, Duration};

mod common;

use loadtest::run_state::StopSignal;
use loadtest::LoadTest;

// Paths used in load tests performed during these tests.
const INDEX_PATH: &str = "/";

// Load test configuration.
const EXPECT_THREADS: &str = "4";

// All tests in this file run against a common endpoint.
async fn setup_mock_server_endpoint(server: &MockServer) -> Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(GET).path(INDEX_PATH);
            then.status(200);
        })
        .await
}

// Send SIGINT to the test process after the delay.
async fn cancel_load_test(duration: Duration) {
    sleep(duration).await;
    kill(getpid(), SIGINT).expect("failed to send SIGINT");
}

// Send SIGINT to the test process twice, quickly.
async fn cancel_load_test_twice(duration: Duration) {
    sleep(duration).await;
    kill(getpid(), SIGINT).expect("failed to send SIGINT");
    sleep(Duration::from_millis(10)).await;
    kill(getpid(), SIGINT).expect("failed to send second SIGINT");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
/// An unlimited load test runs until control-c, then displays the report.
async fn test_cancel() {
    let server = MockServer::start_async().await;
    let index = setup_mock_server_endpoint(&server).await;

    let configuration = common::build_server_configuration(
        &server,
        vec!["--threads", EXPECT_THREADS, "--delay", "0.01"],
    );

    let _ = tokio::spawn(cancel_load_test(Duration::from_secs(1)));
    let report = LoadTest::new(configuration).run().await.unwrap();
    common::validate_report(&report);

    assert!(report.total_requests > 0);
    assert_eq!(report.total_errors, 0);
    assert!(report.elapsed >= std::time::Duration::from_secs(1));
    assert_eq!(index.hits_async().await, report.total_requests);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
/// A second control-c changes nothing, and doesn't exit the process.
async fn test_cancel_twice() {
    let server = MockServer::start_async().await;
    let index = setup_mock_server_endpoint(&server).await;

    let configuration = common::build_server_configuration(
        &server,
        vec!["--threads", EXPECT_THREADS, "--delay", "2"],
    );

    // Workers sleep in half second steps, both signals arrive between two wake ups.
    let _ = tokio::spawn(cancel_load_test_twice(Duration::from_millis(1_250)));
    let report = LoadTest::new(configuration).run().await.unwrap();
    common::validate_report(&report);

    assert!(report.total_requests > 0);
    assert_eq!(index.hits_async().await, report.total_requests);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
/// The stop signal can also be triggered programmatically.
async fn test_stop_signal() {
    let server = MockServer::start_async().await;
    let index = setup_mock_server_endpoint(&server).await;

    let configuration =
        common::build_server_configuration(&server, vec!["--threads", EXPECT_THREADS]);
    let load_test = LoadTest::new(configuration);
    let stop_signal: StopSignal = load_test.stop_signal();

    let _ = tokio::spawn(async move {
        sleep(Duration::from_millis(500)).await;
        assert!(stop_signal.request_stop());
        // Already stopping.
        assert!(!stop_signal.request_stop());
    });
    let report = load_test.run().await.unwrap();
    common::validate_report(&report);

    assert!(report.total_requests > 0);
    assert_eq!(index.hits_async().await, report.total_requests);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
/// Canceled before any request was made, all rates are zero.
async fn test_cancel_before_start() {
    let server = MockServer::start_async().await;
    let index = setup_mock_server_endpoint(&server).await;

    let configuration =
        common::build_server_configuration(&server, vec!["--threads", EXPECT_THREADS]);
    let load_test = LoadTest::new(configuration);
    load_test.stop_signal().request_stop();

    let report = load_test.run().await.unwrap();
    common::validate_report(&report);

    assert_eq!(report.total_requests, 0);
    assert_eq!(report.total_errors, 0);
    assert_eq!(report.error_rate_percent, 0.0);
    assert_eq!(report.requests_per_second, 0.0);
    assert!(report.outcomes.is_empty());
    assert!(report
        .to_string()
        .starts_with("0 errors of 0 requests (0% error rate) made in"));
    assert_eq!(index.hits_async().await, 0);
}

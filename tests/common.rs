use gumdrop::Options;
use httpmock::MockServer;

use loadtest::config::{LoadTestConfig, LoadTestOptions};
use loadtest::outcome::OutcomeCategory;
use loadtest::report::LoadTestReport;
use loadtest::LoadTest;

/// Not all functions are used by all tests, so we enable allow(dead_code) to avoid
/// compiler warnings during testing.

/// The following options are configured by default, if not set to a custom value:
///  --threads 1
///  --no-progress
///
/// The URL is added last, as the only free argument.
#[allow(dead_code)]
pub fn build_configuration(url: &str, custom: Vec<&str>) -> LoadTestConfig {
    // Start with an empty configuration.
    let mut configuration: Vec<&str> = vec![];

    // Merge in all custom options first.
    configuration.extend_from_slice(&custom);

    // Default to testing with 1 thread if not otherwise configured.
    if !configuration.contains(&"--threads") && !configuration.contains(&"-t") {
        configuration.extend_from_slice(&["--threads", "1"]);
    }

    // Progress markers would only clutter the test output.
    if !configuration.contains(&"--no-progress") {
        configuration.push("--no-progress");
    }

    configuration.push(url);

    // Parse these options to generate a LoadTestConfig.
    LoadTestOptions::parse_args_default(&configuration)
        .expect("failed to parse options")
        .validate()
        .expect("failed to validate options")
}

/// Build a configuration targeting the root of the mock server.
#[allow(dead_code)]
pub fn build_server_configuration(server: &MockServer, custom: Vec<&str>) -> LoadTestConfig {
    build_configuration(&server.url("/"), custom)
}

/// Run the actual load test, returning the LoadTestReport.
#[allow(dead_code)]
pub fn run_load_test(configuration: LoadTestConfig) -> LoadTestReport {
    // Execute the load test.
    let report = LoadTest::new(configuration).execute().unwrap();

    // Every report must be internally consistent.
    validate_report(&report);

    report
}

/// Confirm the counters add up, no matter how the load test ended.
#[allow(dead_code)]
pub fn validate_report(report: &LoadTestReport) {
    let counted: usize = report.outcomes.iter().map(|outcome| outcome.count).sum();
    assert_eq!(counted, report.total_requests);

    let errors: usize = report
        .outcomes
        .iter()
        .filter(|outcome| outcome.category != OutcomeCategory::Success)
        .map(|outcome| outcome.count)
        .sum();
    assert_eq!(errors, report.total_errors);
    assert!(report.total_errors <= report.total_requests);

    // Outcomes are sorted by label.
    let labels: Vec<&str> = report
        .outcomes
        .iter()
        .map(|outcome| outcome.label.as_str())
        .collect();
    let mut sorted = labels.clone();
    sorted.sort_unstable();
    assert_eq!(labels, sorted);

    // Rates are always defined.
    assert!(report.error_rate_percent.is_finite());
    assert!(report.requests_per_second.is_finite());
}

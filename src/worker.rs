//! The loop run by each concurrent worker.

use std::sync::Arc;

use crate::config::LoadTestConfig;
use crate::dispatcher::RequestDispatcher;
use crate::outcome::{OutcomeCounter, OutcomeEvent};
use crate::run_state::RunState;
use crate::util;
use crate::LoadTestError;

/// Issue requests until the load test stops.
///
/// Before each request the worker checks the shared stop signal and the shared request
/// count. After each request it stops the whole load test if the duration has expired,
/// then waits the configured delay. A request that can't be built ends this worker
/// only, and the error is returned.
pub async fn worker_main(
    thread_number: usize,
    configuration: Arc<LoadTestConfig>,
    dispatcher: Arc<RequestDispatcher>,
    run_state: Arc<RunState>,
    outcomes: Arc<OutcomeCounter>,
    progress: Option<flume::Sender<OutcomeEvent>>,
) -> Result<(), LoadTestError> {
    info!("launching worker {}...", thread_number);
    let mut requests: usize = 0;

    while run_state.should_continue(configuration.count) {
        run_state.increment_requests();

        let event = match dispatcher.dispatch(&run_state, &outcomes).await {
            Ok(event) => event,
            Err(e) => {
                // The request was never sent, don't count it.
                run_state.rollback_request();
                error!("worker {} failed to build request: {}", thread_number, e);
                return Err(e);
            }
        };
        requests += 1;
        debug!("worker {} request {}: {}", thread_number, requests, event.label);

        if let Some(sender) = progress.as_ref() {
            // The receiver may have gone away, progress is best effort.
            let _ = sender.send(event);
        }

        if run_state.duration_expired(configuration.duration) && run_state.request_stop() {
            info!(
                "worker {}: maximum duration of {} reached, stopping...",
                thread_number,
                util::count_string(configuration.duration, "second")
            );
        }

        if configuration.delay.as_nanos() > 0 && run_state.should_continue(configuration.count) {
            util::sleep_unless_stopped(configuration.delay, run_state.stop_signal()).await;
        }
    }

    info!(
        "exiting worker {} after {}...",
        thread_number,
        util::count_string(requests, "request")
    );
    Ok(())
}

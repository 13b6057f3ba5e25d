//! Magazine delivery demo.
//!
//! A publisher prints 20 magazines, one per second, into a shared stand with
//! room for 8 that keeps each one for 4 seconds. Jack takes a second per
//! magazine and keeps up, Pete takes 3 seconds per magazine and misses some.

use pressroom::{Pipeline, PipelineConfig, RunReport};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    setup_logging();

    info!(
        "\n\n### CASE 3: A slow subscriber, and a very limited buffer size on the \
         publisher's side so it's important to keep the slow subscriber under control"
    );

    let result = Pipeline::new(PipelineConfig::default()).and_then(Pipeline::run);
    if let Ok(report) = &result {
        log_report(report);
    }
    ExitCode::from(exit_status(&result))
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();
}

fn log_report(report: &RunReport) {
    for sub in &report.subscribers {
        info!(
            subscriber = %sub.name,
            state = ?sub.state,
            delivered = sub.delivered.len(),
            skipped = sub.skipped,
            "===========> {} received {:?}",
            sub.name,
            sub.delivered.iter().map(|i| i.0).collect::<Vec<_>>()
        );
    }
    info!(
        accepted = report.producer.accepted,
        dropped = report.buffer.dropped,
        "===========> delivery finished"
    );
}

/// 0 when every subscriber finished cleanly, 1 on timeout or subscriber error.
fn exit_status(result: &pressroom::Result<RunReport>) -> u8 {
    let checked = match result {
        Ok(report) => report.check(),
        Err(e) => {
            error!(error = %e, "delivery failed");
            return 1;
        }
    };
    match checked {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "delivery failed");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressroom::{
        BufferStats, FlowError, ProducerStats, SubscriberReport, SubscriberState,
    };
    use std::time::Duration;

    fn run_report(states: Vec<(&str, SubscriberState)>) -> RunReport {
        RunReport {
            subscribers: states
                .into_iter()
                .map(|(name, state)| SubscriberReport {
                    name: name.to_string(),
                    state,
                    delivered: Vec::new(),
                    skipped: 0,
                    failures: 0,
                })
                .collect(),
            producer: ProducerStats::default(),
            buffer: BufferStats::default(),
        }
    }

    #[test]
    fn test_exit_zero_when_all_complete() {
        let report = run_report(vec![
            ("jack", SubscriberState::Completed),
            ("pete", SubscriberState::Completed),
        ]);
        assert_eq!(exit_status(&Ok(report)), 0);
    }

    #[test]
    fn test_exit_one_on_subscriber_error() {
        let report = run_report(vec![
            ("jack", SubscriberState::Completed),
            (
                "pete",
                SubscriberState::Errored {
                    reason: "torn magazine".to_string(),
                },
            ),
        ]);
        assert_eq!(exit_status(&Ok(report)), 1);
    }

    #[test]
    fn test_exit_one_on_timeout() {
        let result = Err(FlowError::CompletionTimeout {
            pending: vec!["pete".to_string()],
            grace: Duration::from_secs(60),
        });
        assert_eq!(exit_status(&result), 1);
    }
}

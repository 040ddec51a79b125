// Cron-driven tailing
//
// Six-field cron expression (seconds included). Every tick spawns the
// cycle on its own task so a slow cycle never delays the next tick; the
// tailer's single-flight lock turns overlapping ticks into no-ops.

use crate::tailer::{LogTailer, TailError};
use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct Scheduler {
    schedule: Schedule,
    tailer: Arc<LogTailer>,
    /// How long shutdown waits for an in-flight cycle
    shutdown_grace: Duration,
}

impl Scheduler {
    pub fn new(
        expression: &str,
        tailer: Arc<LogTailer>,
        shutdown_grace: Duration,
    ) -> Result<Self, cron::error::Error> {
        let schedule = Schedule::from_str(expression)?;
        info!(schedule = expression, "Scheduled log processing job");
        Ok(Self {
            schedule,
            tailer,
            shutdown_grace,
        })
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            let Some(next) = self.schedule.upcoming(Utc).next() else {
                warn!("Cron schedule has no upcoming fire times, scheduler exiting");
                break;
            };
            let wait = (next - Utc::now())
                .to_std()
                .unwrap_or(Duration::from_millis(0));

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let tailer = Arc::clone(&self.tailer);
            let tick_cancel = cancel.clone();
            in_flight = Some(tokio::spawn(async move {
                match tailer.process_logs(&tick_cancel).await {
                    Ok(_) | Err(TailError::Cancelled) => {}
                    Err(e) => error!(error = %e, "Error during scheduled log processing"),
                }
            }));
        }

        info!("Stopping scheduler");
        if let Some(handle) = in_flight {
            if !handle.is_finished()
                && tokio::time::timeout(self.shutdown_grace, handle).await.is_err()
            {
                warn!("Shutdown grace expired with a tailing cycle still running");
            }
        }
        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_six_field_expressions_parse() {
        assert!(Schedule::from_str("*/30 * * * * *").is_ok());
        assert!(Schedule::from_str("0 */5 * * * *").is_ok());
        assert!(Schedule::from_str("not a cron line").is_err());
    }

    #[test]
    fn test_upcoming_fire_times_advance() {
        let schedule = Schedule::from_str("*/10 * * * * *").unwrap();
        let mut upcoming = schedule.upcoming(Utc);
        let first = upcoming.next().unwrap();
        let second = upcoming.next().unwrap();
        assert!(second > first);
    }
}

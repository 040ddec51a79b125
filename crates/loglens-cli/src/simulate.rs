// Log simulator - writes application_* directories full of log files
// in the cluster's header format so the tailer has something to chew on.

use chrono::{Duration, Utc};
use rand::prelude::*;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

const COMPONENTS: [&str; 6] = [
    "scheduler.DAGScheduler",
    "executor.Executor",
    "storage.BlockManager",
    "cluster.YarnAllocator",
    "rpc.RpcEnv",
    "shuffle.ShuffleBlockFetcher",
];

const INFO_MESSAGES: [&str; 5] = [
    "Job finished successfully",
    "Registered block manager",
    "Starting task in stage",
    "Requesting 2 executor containers",
    "Fetching shuffle blocks from remote host",
];

const ERROR_MESSAGES: [&str; 3] = [
    "Task failed: java.io.IOException: broken pipe",
    "Exception in task: connection refused",
    "Lost executor on host worker-3",
];

const STACK_FRAMES: [&str; 3] = [
    "\tat org.apache.spark.scheduler.DAGScheduler.abortStage(DAGScheduler.scala:1890)",
    "\tat org.apache.spark.executor.Executor$TaskRunner.run(Executor.scala:411)",
    "\tat java.lang.Thread.run(Thread.java:748)",
];

pub fn run(
    out: &Path,
    applications: usize,
    files: usize,
    entries: usize,
    error_rate: u8,
    append: bool,
) -> std::io::Result<()> {
    let mut rng = rand::thread_rng();
    let run_id: u32 = rng.gen_range(1_000_000..9_999_999);

    for app_index in 0..applications {
        let app_name = format!("application_{}_{:04}", run_id, app_index + 1);
        let app_dir = out.join(&app_name);
        fs::create_dir_all(&app_dir)?;

        for file_index in 0..files {
            let path = app_dir.join(format!("container_{:02}.log", file_index + 1));
            let mut file = OpenOptions::new()
                .create(true)
                .append(append)
                .truncate(!append)
                .write(true)
                .open(&path)?;

            // spread the timestamps over the last hour so time bucket
            // queries have something to aggregate
            let mut ts = Utc::now() - Duration::hours(1);
            let step = Duration::seconds((3600 / entries.max(1)) as i64);

            for _ in 0..entries {
                let component = COMPONENTS[rng.gen_range(0..COMPONENTS.len())];
                let is_error = rng.gen_range(0..100u8) < error_rate;

                if is_error {
                    let message = ERROR_MESSAGES[rng.gen_range(0..ERROR_MESSAGES.len())];
                    writeln!(
                        file,
                        "{} ERROR {}: {}",
                        ts.format("%y/%m/%d %H:%M:%S"),
                        component,
                        message
                    )?;
                    // errors drag a stack trace behind them
                    for frame in STACK_FRAMES.iter().take(rng.gen_range(1..=3)) {
                        writeln!(file, "{}", frame)?;
                    }
                } else {
                    let message = INFO_MESSAGES[rng.gen_range(0..INFO_MESSAGES.len())];
                    let level = if rng.gen_range(0..10) == 0 { "WARN" } else { "INFO" };
                    writeln!(
                        file,
                        "{} {} {}: {}",
                        ts.format("%y/%m/%d %H:%M:%S"),
                        level,
                        component,
                        message
                    )?;
                }

                ts += step;
            }

            println!("wrote {}", path.display());
        }
    }

    println!(
        "done: {} applications x {} files x {} entries under {}",
        applications,
        files,
        entries,
        out.display()
    );
    Ok(())
}

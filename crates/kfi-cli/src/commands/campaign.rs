//! Run a workload and inject random faults into it until it exits.

use std::io::{BufRead, BufReader, Read};
use std::process::ExitStatus;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;
use kfi_core::{CampaignConfig, InjectorConfig};
use tracing::{info, warn};

/// How often the loop checks whether the workload has exited.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for output forwarding to drain after the workload exits.
const FORWARD_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Log each line of a workload stream with a prefix.
fn forward_lines<R: Read + Send + 'static>(
    stream: Option<R>,
    prefix: &'static str,
) -> Option<JoinHandle<()>> {
    let stream = stream?;
    Some(thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(line) => info!("{}{}", prefix, line),
                Err(_) => break,
            }
        }
    }))
}

/// Join the forwarders that finish within `timeout`.
///
/// Grandchildren of the workload can keep its pipes open, so a forwarder
/// may never see EOF. Those threads are left detached. Returns how many.
fn join_forwarders(handles: Vec<JoinHandle<()>>, timeout: Duration) -> usize {
    let deadline = Instant::now() + timeout;
    let mut pending = handles;
    loop {
        let (done, rest): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|h| h.is_finished());
        for handle in done {
            let _ = handle.join();
        }
        pending = rest;
        if pending.is_empty() || Instant::now() >= deadline {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    if !pending.is_empty() {
        warn!(
            "{} output stream(s) still open after the workload exited",
            pending.len()
        );
    }
    pending.len()
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(0) => "Program finished running and exited cleanly.".to_string(),
        Some(code) => format!("Program exited with status {code}."),
        None => format!("Program terminated by {status}."),
    }
}

#[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "x86")))]
pub fn run(
    injector_config: &InjectorConfig,
    config: &CampaignConfig,
    command: &[String],
) -> Result<()> {
    use std::process::{Command, Stdio};
    use std::sync::Arc;

    use anyhow::Context;
    use kfi_core::{CampaignStats, FaultClock, InjectionRequest, Injector, LinuxProcessControl};
    use rand::rngs::OsRng;
    use tracing::{debug, error};

    use crate::shutdown::ShutdownSignal;

    let (program, args) = command.split_first().context("No command to run")?;

    let shutdown = Arc::new(ShutdownSignal::new());
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        shutdown_ctrlc.trigger();
    })?;

    let injector = Injector::new(LinuxProcessControl::new()?, injector_config.clone());
    let mut clock = FaultClock::new(config.mean_interval(), OsRng);
    let mut stats = CampaignStats::default();

    let started = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to start {program}"))?;
    let pid = i32::try_from(child.id()).context("Workload pid out of range")?;
    info!(
        "Started {} (pid {}), mean fault interval {:?}",
        program,
        pid,
        config.mean_interval()
    );

    let forwarders: Vec<_> = [
        forward_lines(child.stdout.take(), "stdout: "),
        forward_lines(child.stderr.take(), "stderr: "),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut next_fault = Instant::now() + clock.next_delay();
    let mut stuck_error = None;

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if shutdown.is_shutdown() {
            break None;
        }

        let injecting = config.max_faults.is_none_or(|max| stats.faults < max);
        let now = Instant::now();
        if injecting && now >= next_fault {
            let attempt = Instant::now();
            let result = injector.inject_request(&InjectionRequest::random(pid));
            stats.record_attempt(attempt.elapsed(), result.as_ref().map(|_| ()));

            match result {
                Ok(record) => info!("{}", record),
                Err(e) if e.is_partial_failure() => {
                    error!("Workload left stopped, aborting campaign: {}", e);
                    stuck_error = Some(e);
                    break None;
                }
                Err(e) => warn!("Injection failed: {}", e),
            }
            next_fault = Instant::now() + clock.next_delay();
            debug!(
                "Next fault in {:?}",
                next_fault.saturating_duration_since(Instant::now())
            );
            continue;
        }

        let wait = if injecting {
            EXIT_POLL_INTERVAL.min(next_fault.saturating_duration_since(now))
        } else {
            EXIT_POLL_INTERVAL
        };
        shutdown.wait(wait);
    };

    let status = match status {
        Some(status) => status,
        None => {
            info!("Stopping workload (pid {})", pid);
            if let Err(e) = child.kill() {
                warn!("Failed to kill workload: {}", e);
            }
            child.wait()?
        }
    };
    join_forwarders(forwarders, FORWARD_DRAIN_TIMEOUT);

    stats.total = started.elapsed();
    println!("{}", describe_exit(status));
    println!("{stats}");

    if let Some(e) = stuck_error {
        return Err(e.into());
    }
    Ok(())
}

#[cfg(not(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "x86"))))]
pub fn run(
    _injector_config: &InjectorConfig,
    _config: &CampaignConfig,
    _command: &[String],
) -> Result<()> {
    anyhow::bail!("Fault campaigns are only supported on Linux x86 and x86_64")
}

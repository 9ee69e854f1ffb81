//! `callscribe verify-capacity` — check configuration headroom against
//! a target concurrent-session count.

use cs_domain::config::{Config, ConfigSeverity};

/// Rough per-chunk memory estimate: two seconds of 16 kHz mono PCM16.
const BYTES_PER_CHUNK: usize = 16_000 * 2 * 2;

/// Run the capacity checks. Returns `Ok(true)` when the configuration
/// can plausibly carry `target` concurrent sessions.
pub fn run(config: &Config, target: usize) -> anyhow::Result<bool> {
    println!("callscribe verify-capacity");
    println!("==========================\n");

    let mut all_passed = true;

    // 1. Config must be valid to begin with.
    let issues = config.validate();
    let config_errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    print_check(
        "Configuration valid",
        config_errors == 0,
        format!("{} error(s), {} issue(s) total", config_errors, issues.len()),
    );
    if config_errors > 0 {
        all_passed = false;
        for issue in &issues {
            eprintln!("  {issue}");
        }
    }

    // 2. Worker budget: three workers per session plus the shared
    //    connection monitor.
    let workers = target * 3 + 1;
    print_check(
        "Worker budget",
        true,
        format!("{target} session(s) -> {workers} task(s)"),
    );

    // 3. Queue memory at full saturation.
    let queue_bytes = target * config.transcription.max_chunk_queue_size * BYTES_PER_CHUNK;
    let queue_mb = queue_bytes as f64 / (1024.0 * 1024.0);
    let queue_ok = queue_mb < 2048.0;
    print_check(
        "Audio queue memory",
        queue_ok,
        format!(
            "{} x {} chunk(s) = {queue_mb:.0} MiB at saturation",
            target, config.transcription.max_chunk_queue_size
        ),
    );
    all_passed &= queue_ok;

    // 4. HTTP concurrency must leave room for producers: each session
    //    streams chunks plus an occasional status poll.
    let needed_requests = target * 2;
    let http_ok = config.server.max_concurrent_requests >= needed_requests;
    print_check(
        "HTTP concurrency limit",
        http_ok,
        format!(
            "need ~{needed_requests}, limit {}",
            config.server.max_concurrent_requests
        ),
    );
    all_passed &= http_ok;

    // 5. Reconnect worst case must fit inside the session timeout.
    let backoff_total: u64 = (1..=config.session.max_reconnect_attempts)
        .map(|n| config.session.reconnect_delay_base_s.pow(n))
        .sum();
    let backoff_ok = backoff_total < config.session.session_timeout_s;
    print_check(
        "Reconnect backoff fits timeout",
        backoff_ok,
        format!(
            "worst case {}s of backoff vs {}s timeout",
            backoff_total, config.session.session_timeout_s
        ),
    );
    all_passed &= backoff_ok;

    println!();
    if all_passed {
        println!("Capacity checks passed for {target} concurrent session(s).");
    } else {
        println!("Capacity checks FAILED for {target} concurrent session(s).");
    }
    Ok(all_passed)
}

fn print_check(name: &str, passed: bool, detail: String) {
    let mark = if passed { "ok" } else { "FAIL" };
    println!("[{mark:>4}] {name}: {detail}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_carries_fifty_sessions() {
        assert!(run(&Config::default(), 50).unwrap());
    }

    #[test]
    fn absurd_target_fails_on_queue_memory() {
        assert!(!run(&Config::default(), 100_000).unwrap());
    }

    #[test]
    fn backoff_exceeding_timeout_fails() {
        let mut config = Config::default();
        config.session.session_timeout_s = 60;
        config.session.reconnect_delay_base_s = 10;
        config.session.max_reconnect_attempts = 3;
        // 10 + 100 + 1000 seconds of backoff never fits 60 seconds.
        assert!(!run(&config, 10).unwrap());
    }
}

//! `callscribe monitor` — probe a running gateway's health and metrics.

use std::time::Duration;

use serde_json::Value;

/// Probe the gateway. Returns `Ok(true)` when the gateway is healthy,
/// `Ok(false)` when unreachable or degraded (caller exits non-zero).
pub async fn run(base_url: &str, once: bool, interval_s: u64) -> anyhow::Result<bool> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let token = std::env::var("CS_API_TOKEN").ok();

    loop {
        let healthy = probe(&client, base_url, token.as_deref()).await;
        if once {
            return Ok(healthy);
        }
        if !healthy {
            // In polling mode an unreachable gateway ends the run so
            // supervisors notice.
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_secs(interval_s.max(1))).await;
    }
}

async fn probe(client: &reqwest::Client, base_url: &str, token: Option<&str>) -> bool {
    let health_url = format!("{}/v1/health", base_url.trim_end_matches('/'));
    let health: Value = match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                eprintln!("monitor: bad health payload: {e}");
                return false;
            }
        },
        Ok(resp) => {
            eprintln!("monitor: {health_url} returned {}", resp.status());
            return false;
        }
        Err(e) => {
            eprintln!("monitor: gateway unreachable: {e}");
            return false;
        }
    };

    println!(
        "health: {} (version {}, {} active session(s))",
        health["status"].as_str().unwrap_or("unknown"),
        health["version"].as_str().unwrap_or("?"),
        health["active_sessions"].as_u64().unwrap_or(0),
    );

    let metrics_url = format!("{}/v1/metrics", base_url.trim_end_matches('/'));
    let mut req = client.get(&metrics_url);
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }
    match req.send().await {
        Ok(resp) if resp.status().is_success() => {
            if let Ok(metrics) = resp.json::<Value>().await {
                println!(
                    "metrics: {} meeting(s), {} draft(s), {} validation session(s), {} sync record(s)",
                    metrics["meetings"].as_u64().unwrap_or(0),
                    metrics["draft_summaries"].as_u64().unwrap_or(0),
                    metrics["validation_sessions"].as_u64().unwrap_or(0),
                    metrics["crm_sync_records"].as_u64().unwrap_or(0),
                );
            }
        }
        Ok(resp) => {
            // Metrics live behind auth; a 401 still counts as healthy.
            println!("metrics: skipped ({})", resp.status());
        }
        Err(e) => {
            eprintln!("monitor: metrics probe failed: {e}");
            return false;
        }
    }

    health["status"].as_str() == Some("ok")
}

use anyhow::{Context, Result};
use reqwest::StatusCode;

/// Run an orchestration on the server and print the final state
pub async fn run(api_url: &str, orchestration_type: &str, input: Option<String>, timeout_secs: u64) -> Result<()> {
    let input: serde_json::Value = match input {
        Some(raw) => serde_json::from_str(&raw).context("--input must be valid JSON")?,
        None => serde_json::Value::Null,
    };

    println!("Running {} (waiting up to {}s)...", orchestration_type, timeout_secs);

    let response = reqwest::Client::new()
        .post(format!("{}/api/orchestrations/run", api_url))
        .json(&serde_json::json!({
            "orchestration_type": orchestration_type,
            "input": input,
            "wait_timeout_ms": timeout_secs * 1000,
        }))
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to API: {}", e))?;

    let state = read_body(response).await?;
    print_state(&state);
    Ok(())
}

/// Show the latest execution of an instance
pub async fn get(api_url: &str, instance_id: &str, output: &str) -> Result<()> {
    let response = reqwest::get(format!("{}/api/orchestrations/{}", api_url, instance_id))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to API: {}", e))?;

    if response.status() == StatusCode::NOT_FOUND {
        println!("Orchestration '{}' not found", instance_id);
        return Ok(());
    }

    let state = read_body(response).await?;
    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        print_state(&state);
    }
    Ok(())
}

pub async fn purge(api_url: &str) -> Result<()> {
    let response = reqwest::Client::new()
        .post(format!("{}/api/history/purge", api_url))
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to API: {}", e))?;

    let body = read_body(response).await?;
    println!("✓ Purged {} completed executions", body["purged"].as_u64().unwrap_or(0));
    Ok(())
}

async fn read_body(response: reqwest::Response) -> Result<serde_json::Value> {
    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
    if !status.is_success() {
        let kind = body["kind"].as_str().unwrap_or("unknown");
        let message = body["error"].as_str().unwrap_or("no details");
        anyhow::bail!("API error {} ({}): {}", status, kind, message);
    }
    Ok(body)
}

fn print_state(state: &serde_json::Value) {
    println!("Orchestration Details");
    println!("{}", "=".repeat(60));
    println!("Instance ID:  {}", state["instance"]["instance_id"].as_str().unwrap_or("-"));
    println!("Execution ID: {}", state["instance"]["execution_id"].as_str().unwrap_or("-"));
    println!("Type:         {}", state["name"].as_str().unwrap_or("-"));
    println!("Status:       {}", state["status"].as_str().unwrap_or("-"));
    println!("Created:      {}", state["created_at"].as_str().unwrap_or("-"));
    if let Some(completed) = state["completed_at"].as_str() {
        println!("Completed:    {}", completed);
    }
    if let Some(output) = state["output"].as_str() {
        println!();
        println!("Output:");
        println!("  {}", output);
    }
}

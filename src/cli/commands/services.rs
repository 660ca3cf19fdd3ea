use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;

use crate::cli::{RegisterArgs, ResolveArgs};
use crate::record::ServiceRecord;

/// Default timeout for HTTP requests (30 seconds)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

pub async fn execute_register(args: RegisterArgs) -> Result<()> {
    let record = ServiceRecord::new(args.id, args.name, args.address);
    record.validate()?;

    let url = format!("{}/services", args.url.trim_end_matches('/'));
    let response = client()?
        .post(&url)
        .json(&record)
        .send()
        .await
        .with_context(|| format!("Failed to reach injector at {}", url))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Failed to register service: {} - {}", status, body);
    }

    println!("Registered '{}' -> {}", record.id, record.address);
    Ok(())
}

pub async fn execute_resolve(args: ResolveArgs) -> Result<()> {
    let url = format!("{}/services/{}", args.url.trim_end_matches('/'), args.id);
    let response = client()?
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach injector at {}", url))?;

    match response.status() {
        StatusCode::OK => {
            let record: ServiceRecord = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        StatusCode::NOT_FOUND => anyhow::bail!("Service '{}' not found", args.id),
        status => {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to resolve service: {} - {}", status, body)
        }
    }
}

//! AWS CLI integration
//!
//! Runs the `aws` binary with JSON output. Credentials, profiles and
//! pagination are left to the CLI itself.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::process::Command;

/// Something that can answer `aws <args>` with JSON
pub trait AwsCli: Send + Sync {
    fn run_json<'a>(&'a self, args: &'a [&'a str]) -> BoxFuture<'a, Result<Value>>;

    /// Region the calls are made against, "" when none is configured
    fn region(&self) -> BoxFuture<'_, Result<String>>;
}

/// Shells out to the installed `aws` binary
#[derive(Debug, Clone, Default)]
pub struct AwsCliRunner {
    region: Option<String>,
}

impl AwsCliRunner {
    pub fn new(region: Option<String>) -> Self {
        Self {
            region: region.filter(|r| !r.is_empty()),
        }
    }

    async fn execute(&self, args: &[&str]) -> Result<String> {
        let mut command = Command::new("aws");
        command.args(args);
        if let Some(region) = &self.region {
            command.args(["--region", region.as_str()]);
        }

        tracing::debug!("Executing: aws {}", args.join(" "));

        let output = command
            .output()
            .await
            .context("Failed to launch the aws CLI. Is it installed and on PATH?")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first_line = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
            return Err(anyhow::anyhow!(
                "aws {} failed ({}): {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                first_line.trim()
            ));
        }

        String::from_utf8(output.stdout).context("aws CLI produced non UTF-8 output")
    }
}

impl AwsCli for AwsCliRunner {
    fn run_json<'a>(&'a self, args: &'a [&'a str]) -> BoxFuture<'a, Result<Value>> {
        async move {
            let mut full: Vec<&str> = args.to_vec();
            full.extend(["--output", "json"]);
            let stdout = self.execute(&full).await?;
            if stdout.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&stdout).context("Failed to parse aws CLI output")
        }
        .boxed()
    }

    fn region(&self) -> BoxFuture<'_, Result<String>> {
        async move {
            if let Some(region) = &self.region {
                return Ok(region.clone());
            }
            // `configure get` exits non-zero when the key is unset
            match self.execute(&["configure", "get", "region"]).await {
                Ok(region) => Ok(region.trim().to_string()),
                Err(e) => {
                    tracing::debug!("No default AWS region: {:#}", e);
                    Ok(String::new())
                }
            }
        }
        .boxed()
    }
}

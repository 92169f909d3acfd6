//! SSH agent transport: key authentication, host-key checking disabled (an
//! operator-explicit trust decision for a scanner-controlled lab network).
//! Shells out to the system `ssh`/`scp` binaries, mirroring how a scanner
//! without a bundled SSH client library would drive them.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use provenance_core::snapshot::ExtractorRecord;
use provenance_core::ProvenanceError;
use tokio::process::Command;
use tokio::time::timeout;

use crate::{collected_file_stem, AgentTransport, RemoteOs};

pub struct SshTransport {
    pub host: String,
    pub user: String,
    pub key_path: String,
    pub execute_timeout: Duration,
}

impl SshTransport {
    pub fn new(host: impl Into<String>, user: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            key_path: key_path.into(),
            execute_timeout: Duration::from_secs(60),
        }
    }

    fn ssh_base_args(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.key_path.clone(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            format!("{}@{}", self.user, self.host),
        ]
    }

    async fn run_remote(&self, cmd: &str, dur: Duration) -> Result<std::process::Output, ProvenanceError> {
        let mut args = self.ssh_base_args();
        args.push(cmd.to_string());
        let fut = Command::new("ssh").args(&args).output();
        timeout(dur, fut)
            .await
            .map_err(|_| ProvenanceError::ProbeTimeout {
                target: self.host.clone(),
            })?
            .map_err(|e| ProvenanceError::ExecuteFailed {
                host: self.host.clone(),
                reason: e.to_string(),
            })
    }

    async fn scp_to_remote(&self, local: &Path, remote_path: &str) -> Result<(), ProvenanceError> {
        let dest = format!("{}@{}:{}", self.user, self.host, remote_path);
        let output = Command::new("scp")
            .args(["-i", &self.key_path, "-o", "StrictHostKeyChecking=no"])
            .arg(local)
            .arg(&dest)
            .output()
            .await
            .map_err(|e| ProvenanceError::DeployFailed {
                host: self.host.clone(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(ProvenanceError::DeployFailed {
                host: self.host.clone(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }

    async fn scp_from_remote(&self, remote_path: &str, local: &Path) -> Result<(), ProvenanceError> {
        let src = format!("{}@{}:{}", self.user, self.host, remote_path);
        let output = Command::new("scp")
            .args(["-i", &self.key_path, "-o", "StrictHostKeyChecking=no"])
            .arg(&src)
            .arg(local)
            .output()
            .await
            .map_err(|e| ProvenanceError::CollectFailed {
                host: self.host.clone(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(ProvenanceError::CollectFailed {
                host: self.host.clone(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AgentTransport for SshTransport {
    fn target(&self) -> &str {
        &self.host
    }

    async fn detect_os(&self) -> Result<RemoteOs, ProvenanceError> {
        let short_timeout = Duration::from_secs(10);
        if let Ok(output) = self.run_remote("uname -s", short_timeout).await {
            if output.status.success() {
                let text = String::from_utf8_lossy(&output.stdout).to_lowercase();
                if text.contains("linux") {
                    return Ok(RemoteOs::Linux);
                }
                if text.contains("darwin") {
                    return Ok(RemoteOs::Macos);
                }
            }
        }

        // The POSIX probe failed or answered with neither family: the
        // target may be an SSH-reached Windows host (OpenSSH for Windows),
        // whose shell doesn't understand `uname`.
        if let Ok(output) = self.run_remote("cmd /c echo WINDOWS", short_timeout).await {
            if output.status.success() && String::from_utf8_lossy(&output.stdout).contains("WINDOWS") {
                return Ok(RemoteOs::Windows);
            }
        }

        Err(ProvenanceError::RemoteOsUnknown {
            host: self.host.clone(),
        })
    }

    async fn deploy(&self, os: RemoteOs) -> Result<(), ProvenanceError> {
        let local_binary = Path::new(os.agent_build_dir());
        let remote_binary = format!("{}/{}", os.remote_dir(), os.remote_binary());

        let mkdir_cmd = match os {
            RemoteOs::Windows => format!("mkdir \"{}\"", os.remote_dir()),
            RemoteOs::Linux | RemoteOs::Macos => format!("mkdir -p {}", os.remote_dir()),
        };
        self.run_remote(&mkdir_cmd, Duration::from_secs(15)).await?;

        self.scp_to_remote(local_binary, &remote_binary).await?;

        if !matches!(os, RemoteOs::Windows) {
            self.run_remote(&format!("chmod +x {remote_binary}"), Duration::from_secs(15))
                .await?;
        }
        Ok(())
    }

    async fn execute(&self, os: RemoteOs) -> Result<(), ProvenanceError> {
        let cmd = format!("cd {} && ./{}", os.remote_dir(), os.remote_binary());
        let output = self.run_remote(&cmd, self.execute_timeout).await?;
        if !output.status.success() {
            return Err(ProvenanceError::ExecuteFailed {
                host: self.host.clone(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }

    async fn collect(&self, os: RemoteOs, local_dir: &Path) -> Result<ExtractorRecord, ProvenanceError> {
        std::fs::create_dir_all(local_dir)?;
        let stem = collected_file_stem(&self.host, chrono::Utc::now());
        let json_local = local_dir.join(format!("{stem}.json"));
        let yml_local = local_dir.join(format!("{stem}.yml"));

        self.scp_from_remote(&format!("{}/output.json", os.remote_dir()), &json_local)
            .await?;
        let _ = self
            .scp_from_remote(&format!("{}/output.yml", os.remote_dir()), &yml_local)
            .await;

        let contents = std::fs::read_to_string(&json_local)?;
        serde_json::from_str(&contents).map_err(|e| ProvenanceError::CollectFailed {
            host: self.host.clone(),
            reason: e.to_string(),
        })
    }

    async fn cleanup(&self, os: RemoteOs) {
        let _ = self
            .run_remote(&format!("rm -rf {}", os.remote_dir()), Duration::from_secs(15))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_base_args_disable_host_key_checking() {
        let transport = SshTransport::new("10.0.0.20", "lab", "/home/lab/.ssh/id_ed25519");
        let args = transport.ssh_base_args();
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.contains(&"lab@10.0.0.20".to_string()));
    }
}

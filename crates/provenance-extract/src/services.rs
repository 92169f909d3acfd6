//! Services extractor: processes, listening sockets, platform services.

use std::fs;

use provenance_core::snapshot::{
    PlatformService, ProcessRecord, ProcessRole, ProcessType, ServicesRecord, SocketDirection,
};

fn uid_to_username(uid: u32) -> Option<String> {
    let passwd = fs::read_to_string("/etc/passwd").ok()?;
    passwd.lines().find_map(|line| {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() >= 3 && fields[2].parse::<u32>().ok() == Some(uid) {
            Some(fields[0].to_string())
        } else {
            None
        }
    })
}

fn classify_process_type(user: &Option<String>) -> ProcessType {
    match user.as_deref() {
        Some("root") => ProcessType::System,
        Some(_) => ProcessType::User,
        None => ProcessType::Unknown,
    }
}

fn classify_process_role(cmdline: &Option<String>) -> ProcessRole {
    match cmdline {
        Some(cmd) if cmd.contains("provenance-agent") || cmd.contains("provenance_agent") => {
            ProcessRole::Scanner
        }
        Some(cmd)
            if ["bash", "sh", "zsh", "fish", "csh", "ksh"]
                .iter()
                .any(|shell| cmd.contains(shell)) =>
        {
            ProcessRole::Shell
        }
        _ => ProcessRole::None,
    }
}

#[cfg(target_os = "linux")]
fn processes() -> Vec<ProcessRecord> {
    let Ok(proc_dir) = fs::read_dir("/proc") else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for entry in proc_dir.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        let base = entry.path();
        let cmdline = fs::read_to_string(base.join("cmdline"))
            .ok()
            .map(|s| s.replace('\0', " ").trim().to_string())
            .filter(|s| !s.is_empty());
        let exe = fs::read_link(base.join("exe"))
            .ok()
            .map(|p| p.to_string_lossy().to_string());
        let status = fs::read_to_string(base.join("status")).unwrap_or_default();
        let ppid = status
            .lines()
            .find(|l| l.starts_with("PPid:"))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|v| v.parse::<u32>().ok());
        let user = status
            .lines()
            .find(|l| l.starts_with("Uid:"))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|v| v.parse::<u32>().ok())
            .and_then(uid_to_username);
        let parent_name = ppid.and_then(|p| {
            fs::read_to_string(format!("/proc/{p}/comm"))
                .ok()
                .map(|s| s.trim().to_string())
        });
        let create_time = fs::metadata(&base).ok().and_then(|m| {
            m.created()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
        });

        out.push(ProcessRecord {
            pid,
            ppid,
            parent_name,
            exe,
            process_type: classify_process_type(&user),
            process_role: classify_process_role(&cmdline),
            user,
            cmdline,
            create_time,
        });
    }
    out
}

#[cfg(not(target_os = "linux"))]
fn processes() -> Vec<ProcessRecord> {
    Vec::new()
}

#[cfg(target_os = "linux")]
fn platform_services() -> Vec<PlatformService> {
    let Ok(output) = std::process::Command::new("systemctl")
        .args(["list-units", "--type=service", "--no-legend", "--no-pager"])
        .output()
    else {
        return Vec::new();
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let name = fields.first()?.to_string();
            let state = fields.get(3).map(|s| s.to_string());
            Some(PlatformService {
                name,
                main_pid: None,
                exec_start: None,
                user: None,
                state,
                start_mode: None,
                path_name: None,
            })
        })
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn platform_services() -> Vec<PlatformService> {
    Vec::new()
}

pub fn extract() -> ServicesRecord {
    let all_processes = processes();
    let network = crate::network::extract();
    let listening_sockets = network
        .sockets
        .into_iter()
        .filter(|s| s.direction == SocketDirection::Listening)
        .collect();

    ServicesRecord {
        processes: all_processes,
        listening_sockets,
        services: platform_services(),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanner_cmdline_is_scanner_role() {
        let cmdline = Some("/usr/local/bin/provenance-agent".to_string());
        assert_eq!(classify_process_role(&cmdline), ProcessRole::Scanner);
    }

    #[test]
    fn shell_cmdline_is_shell_role() {
        let cmdline = Some("/bin/bash -l".to_string());
        assert_eq!(classify_process_role(&cmdline), ProcessRole::Shell);
    }

    #[test]
    fn root_user_is_system_type() {
        assert_eq!(
            classify_process_type(&Some("root".to_string())),
            ProcessType::System
        );
    }
}

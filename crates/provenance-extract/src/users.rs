//! Users extractor: logged sessions and system accounts with inferred roles.

use std::fs;

use provenance_core::snapshot::{AccountRole, LoggedSession, SystemAccount, UsersRecord};

#[cfg(target_os = "linux")]
fn logged_sessions() -> Vec<LoggedSession> {
    // `who` is present on every POSIX system with session accounting; its
    // absence is tolerated by returning an empty list, not an error.
    let Ok(output) = std::process::Command::new("who").output() else {
        return Vec::new();
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 2 {
                return None;
            }
            Some(LoggedSession {
                username: fields[0].to_string(),
                terminal: fields.get(1).map(|s| s.to_string()),
                source_host: fields
                    .iter()
                    .find(|f| f.starts_with('(') && f.ends_with(')'))
                    .map(|s| s.trim_matches(|c| c == '(' || c == ')').to_string()),
                started_at: None,
            })
        })
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn logged_sessions() -> Vec<LoggedSession> {
    Vec::new()
}

struct PasswdEntry {
    username: String,
    uid: i64,
    shell: String,
}

fn parse_passwd(contents: &str) -> Vec<PasswdEntry> {
    contents
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() < 7 {
                return None;
            }
            Some(PasswdEntry {
                username: fields[0].to_string(),
                uid: fields[2].parse().ok()?,
                shell: fields[6].to_string(),
            })
        })
        .collect()
}

fn roles_for(entry: &PasswdEntry, groups: &[String]) -> Vec<AccountRole> {
    let mut roles = Vec::new();
    if entry.uid == 0 {
        roles.push(AccountRole::Root);
    } else if entry.uid < 1000 {
        roles.push(AccountRole::System);
    } else {
        roles.push(AccountRole::Human);
    }

    if entry.shell.ends_with("nologin") || entry.shell.ends_with("false") {
        roles.push(AccountRole::Service);
    }

    if groups.iter().any(|g| g == "sudo" || g == "wheel") {
        roles.push(AccountRole::Admin);
    }
    roles
}

#[cfg(target_os = "linux")]
fn group_members() -> std::collections::HashMap<String, Vec<String>> {
    let mut membership: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
    let Ok(contents) = fs::read_to_string("/etc/group") else {
        return membership;
    };
    for line in contents.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 4 {
            continue;
        }
        let group = fields[0];
        for user in fields[3].split(',').filter(|s| !s.is_empty()) {
            membership.entry(user.to_string()).or_default().push(group.to_string());
        }
    }
    membership
}

#[cfg(not(target_os = "linux"))]
fn group_members() -> std::collections::HashMap<String, Vec<String>> {
    std::collections::HashMap::new()
}

#[cfg(target_os = "linux")]
fn system_accounts() -> (Vec<SystemAccount>, Option<String>) {
    match fs::read_to_string("/etc/passwd") {
        Ok(contents) => {
            let entries = parse_passwd(&contents);
            let membership = group_members();
            let accounts = entries
                .into_iter()
                .map(|entry| {
                    let groups = membership.get(&entry.username).cloned().unwrap_or_default();
                    let roles = roles_for(&entry, &groups);
                    SystemAccount {
                        username: entry.username,
                        uid: Some(entry.uid),
                        shell: Some(entry.shell),
                        roles,
                        groups,
                        domain: None,
                    }
                })
                .collect();
            (accounts, None)
        }
        Err(e) => (Vec::new(), Some(format!("could not read /etc/passwd: {e}"))),
    }
}

/// Fixed local-group-to-role mapping used on Windows hosts.
#[cfg(target_os = "windows")]
const WINDOWS_ROLE_TABLE: &[(&str, AccountRole)] = &[
    ("Administrators", AccountRole::Admin),
    ("Remote Desktop Users", AccountRole::Rdp),
    ("Backup Operators", AccountRole::Backup),
];

#[cfg(target_os = "windows")]
fn system_accounts() -> (Vec<SystemAccount>, Option<String>) {
    (Vec::new(), Some("windows local account enumeration not available".to_string()))
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
fn system_accounts() -> (Vec<SystemAccount>, Option<String>) {
    (Vec::new(), Some("account enumeration not supported on this platform".to_string()))
}

pub fn extract() -> UsersRecord {
    let sessions = logged_sessions();
    let (accounts, error) = system_accounts();
    UsersRecord {
        sessions,
        accounts,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_uid_yields_root_role() {
        let entry = PasswdEntry {
            username: "root".to_string(),
            uid: 0,
            shell: "/bin/bash".to_string(),
        };
        assert_eq!(roles_for(&entry, &[]), vec![AccountRole::Root]);
    }

    #[test]
    fn service_shell_adds_service_role() {
        let entry = PasswdEntry {
            username: "daemon".to_string(),
            uid: 1,
            shell: "/usr/sbin/nologin".to_string(),
        };
        assert_eq!(
            roles_for(&entry, &[]),
            vec![AccountRole::System, AccountRole::Service]
        );
    }

    #[test]
    fn sudo_group_adds_admin_role() {
        let entry = PasswdEntry {
            username: "alice".to_string(),
            uid: 1000,
            shell: "/bin/bash".to_string(),
        };
        let groups = vec!["sudo".to_string()];
        assert_eq!(
            roles_for(&entry, &groups),
            vec![AccountRole::Human, AccountRole::Admin]
        );
    }

    #[test]
    fn parses_passwd_lines() {
        let sample = "root:x:0:0:root:/root:/bin/bash\nnobody:x:65534:65534::/nonexistent:/usr/sbin/nologin\n";
        let entries = parse_passwd(sample);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].username, "root");
        assert_eq!(entries[1].uid, 65534);
    }
}

use crate::core::command::Command;
use clap::Parser;
use std::path::PathBuf;

/// 舊版的兩字母短參數，clap 只支援單字母，先換成長參數
const LEGACY_FLAGS: &[(&str, &str)] = &[
    ("-cu", "--createUser"),
    ("-ag", "--addUserToGroup"),
    ("-un", "--updateNotes"),
    ("-du", "--disableUser"),
    ("-gm", "--groupMembers"),
];

#[derive(Debug, Clone, Parser)]
#[command(name = "adcmd")]
#[command(about = "Query and maintain Active Directory user accounts")]
pub struct CliConfig {
    /// List users of an organizational unit (distinguished name)
    #[arg(short = 'o', long = "organizationalUnit", value_name = "DN")]
    pub organizational_unit: Option<String>,

    /// List enabled contractors
    #[arg(short = 'c', long = "contractors")]
    pub contractors: bool,

    /// List disabled users, or include them when combined with -o
    #[arg(short = 'd', long = "disabledUsers")]
    pub disabled_users: bool,

    /// Also write the listed users to a CSV file
    #[arg(
        short = 'e',
        long = "exportUsers",
        value_name = "PATH",
        num_args = 0..=1,
        default_missing_value = "users.csv"
    )]
    pub export_users: Option<PathBuf>,

    /// Create a user account (interactive)
    #[arg(long = "createUser")]
    pub create_user: bool,

    /// Show a user's direct group memberships and optionally add one (interactive).
    /// The primary group and groups inherited through nesting are not listed.
    #[arg(long = "addUserToGroup")]
    pub add_user_to_group: bool,

    /// Append a line to a user's notes (interactive)
    #[arg(long = "updateNotes")]
    pub update_notes: bool,

    /// Disable a user, prune groups and move to the disabled OU (interactive)
    #[arg(long = "disableUser")]
    pub disable_user: bool,

    /// List the members of a group (interactive)
    #[arg(long = "groupMembers")]
    pub group_members: bool,

    /// Path to TOML configuration file
    #[arg(long, env = "ADCMD_CONFIG", default_value = "adcmd.toml")]
    pub config: PathBuf,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long = "log-json")]
    pub log_json: bool,

    /// Run against an empty in-memory directory instead of the server
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

impl CliConfig {
    pub fn from_env_args() -> Self {
        Self::parse_from(normalize_legacy_flags(std::env::args()))
    }

    /// 每次執行只做一個工作流程；互動式操作優先於列表
    pub fn command(&self) -> Command {
        if self.create_user {
            Command::CreateUser
        } else if self.disable_user {
            Command::DisableUser
        } else if self.update_notes {
            Command::UpdateNotes
        } else if self.add_user_to_group {
            Command::AddUserToGroup
        } else if self.group_members {
            Command::GroupMembers
        } else if self.contractors {
            Command::Contractors
        } else if let Some(ou) = &self.organizational_unit {
            Command::ListOu {
                ou: trim_quotes(ou).to_string(),
                include_disabled: self.disabled_users,
            }
        } else if self.disabled_users {
            Command::DisabledUsers
        } else {
            Command::ListDefault
        }
    }
}

pub fn normalize_legacy_flags<I>(args: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            LEGACY_FLAGS
                .iter()
                .find(|(legacy, _)| *legacy == arg)
                .map(|(_, long)| long.to_string())
                .unwrap_or(arg)
        })
        .collect()
}

/// 去掉成對的前後引號（" 或 '），可重複
pub fn trim_quotes(value: &str) -> &str {
    let mut current = value.trim();
    loop {
        let mut chars = current.chars();
        match (chars.next(), chars.next_back()) {
            (Some(first), Some(last)) if first == last && (first == '"' || first == '\'') => {
                current = current[1..current.len() - 1].trim();
            }
            _ => return current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliConfig {
        let mut full = vec!["adcmd"];
        full.extend_from_slice(args);
        CliConfig::parse_from(normalize_legacy_flags(full))
    }

    #[test]
    fn test_no_flags_lists_default_ou() {
        assert_eq!(parse(&[]).command(), Command::ListDefault);
    }

    #[test]
    fn test_legacy_short_flags() {
        assert_eq!(parse(&["-cu"]).command(), Command::CreateUser);
        assert_eq!(parse(&["-ag"]).command(), Command::AddUserToGroup);
        assert_eq!(parse(&["-un"]).command(), Command::UpdateNotes);
        assert_eq!(parse(&["-du"]).command(), Command::DisableUser);
        assert_eq!(parse(&["-gm"]).command(), Command::GroupMembers);
    }

    #[test]
    fn test_organizational_unit_with_equals_and_quotes() {
        let cli = parse(&["-o=\"OU=Staff,DC=corp,DC=com\"", "-d"]);
        assert_eq!(
            cli.command(),
            Command::ListOu {
                ou: "OU=Staff,DC=corp,DC=com".to_string(),
                include_disabled: true,
            }
        );

        let cli = parse(&["--organizationalUnit", "OU=Staff,DC=corp"]);
        assert_eq!(
            cli.command(),
            Command::ListOu {
                ou: "OU=Staff,DC=corp".to_string(),
                include_disabled: false,
            }
        );
    }

    #[test]
    fn test_disabled_and_contractors() {
        assert_eq!(parse(&["-d"]).command(), Command::DisabledUsers);
        assert_eq!(parse(&["-c"]).command(), Command::Contractors);
    }

    #[test]
    fn test_export_flag_optional_path() {
        let cli = parse(&["-c", "-e"]);
        assert_eq!(cli.export_users, Some(PathBuf::from("users.csv")));

        let cli = parse(&["--exportUsers=out/staff.csv"]);
        assert_eq!(cli.export_users, Some(PathBuf::from("out/staff.csv")));

        assert_eq!(parse(&["-c"]).export_users, None);
    }

    #[test]
    fn test_group_inspection_help_says_direct_memberships_only() {
        let cmd = <CliConfig as clap::CommandFactory>::command();
        let help = cmd
            .get_arguments()
            .find(|a| a.get_id() == "add_user_to_group")
            .and_then(|a| a.get_help())
            .map(|h| h.to_string())
            .unwrap_or_default();

        assert!(help.contains("direct group memberships"));
        assert!(help.contains("primary group"));
        assert!(help.contains("nesting are not listed"));
    }

    #[test]
    fn test_trim_quotes() {
        assert_eq!(trim_quotes("\"OU=A,DC=b\""), "OU=A,DC=b");
        assert_eq!(trim_quotes("'OU=A,DC=b'"), "OU=A,DC=b");
        assert_eq!(trim_quotes("\"'OU=A'\""), "OU=A");
        assert_eq!(trim_quotes("\"OU=A"), "\"OU=A");
        assert_eq!(trim_quotes("OU=A"), "OU=A");
        assert_eq!(trim_quotes("\""), "\"");
    }
}

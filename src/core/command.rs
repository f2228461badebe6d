use crate::adapters::export::export_users_csv;
use crate::core::lifecycle::{DisableStatus, UserLifecycleService};
use crate::core::query::DirectoryQueryService;
use crate::domain::model::{NewUser, UserRecord};
use crate::domain::notes::{self, Clock};
use crate::domain::ports::{DirectoryConnector, PromptProvider};
use crate::utils::error::{AdError, Result};
use std::io::Write;
use std::path::PathBuf;

/// 每次執行只跑一個工作流程
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ListDefault,
    ListOu { ou: String, include_disabled: bool },
    Contractors,
    DisabledUsers,
    CreateUser,
    AddUserToGroup,
    UpdateNotes,
    DisableUser,
    GroupMembers,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::ListDefault => "list-default-ou",
            Command::ListOu { .. } => "list-ou",
            Command::Contractors => "contractors",
            Command::DisabledUsers => "disabled-users",
            Command::CreateUser => "create-user",
            Command::AddUserToGroup => "add-user-to-group",
            Command::UpdateNotes => "update-notes",
            Command::DisableUser => "disable-user",
            Command::GroupMembers => "group-members",
        }
    }
}

/// 把指令對應到服務呼叫，並把結果逐行輸出。
///
/// 找不到帳號、OU 無效這類資訊性結果直接印出，不當成失敗。
pub struct CommandRunner<D: DirectoryConnector, C: Clock, P: PromptProvider, W: Write> {
    query: DirectoryQueryService<D>,
    lifecycle: UserLifecycleService<D, C>,
    prompt: P,
    out: W,
    verbose: bool,
    export_path: Option<PathBuf>,
}

impl<D, C, P, W> CommandRunner<D, C, P, W>
where
    D: DirectoryConnector,
    C: Clock,
    P: PromptProvider,
    W: Write,
{
    pub fn new(
        query: DirectoryQueryService<D>,
        lifecycle: UserLifecycleService<D, C>,
        prompt: P,
        out: W,
    ) -> Self {
        Self {
            query,
            lifecycle,
            prompt,
            out,
            verbose: false,
            export_path: None,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn export_to(mut self, path: Option<PathBuf>) -> Self {
        self.export_path = path;
        self
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub async fn run(&mut self, command: &Command) -> Result<()> {
        tracing::debug!("Running workflow {}", command.name());

        let outcome = match command {
            Command::ListDefault => {
                let users = self.query.default_ou_users().await;
                self.print_listing(users)
            }
            Command::ListOu {
                ou,
                include_disabled,
            } => {
                let users = self.query.users_in_ou(ou, *include_disabled).await;
                self.print_listing(users)
            }
            Command::Contractors => {
                let users = self.query.contractors().await;
                self.print_listing(users)
            }
            Command::DisabledUsers => {
                let users = self.query.disabled_users().await;
                self.print_listing(users)
            }
            Command::CreateUser => self.create_user().await,
            Command::AddUserToGroup => self.add_user_to_group().await,
            Command::UpdateNotes => self.update_notes().await,
            Command::DisableUser => self.disable_user().await,
            Command::GroupMembers => self.group_members().await,
        };

        match outcome {
            Err(e) if e.is_informational() => {
                tracing::info!("{}", e);
                writeln!(self.out, "{}", e)?;
                Ok(())
            }
            other => other,
        }
    }

    fn print_listing(&mut self, users: Result<Vec<UserRecord>>) -> Result<()> {
        let users = users?;
        self.print_users(&users)?;

        if let Some(path) = &self.export_path {
            let written = export_users_csv(path, &users)?;
            writeln!(self.out, "Exported {} users to {}", written, path.display())?;
        }
        Ok(())
    }

    fn print_users(&mut self, users: &[UserRecord]) -> Result<()> {
        for user in users {
            let line = self.format_user(user);
            writeln!(self.out, "{}", line)?;
        }
        writeln!(self.out, "Results found: {}", users.len())?;
        Ok(())
    }

    fn format_user(&self, user: &UserRecord) -> String {
        let line = format!(
            "{} -> {} {}",
            user.sam_account_name, user.given_name, user.surname
        );
        if !self.verbose {
            return line;
        }

        let details: Vec<&str> = [
            user.company.as_str(),
            user.department.as_str(),
            user.title.as_str(),
            user.phone_number.as_str(),
        ]
        .into_iter()
        .filter(|v| !v.is_empty())
        .collect();

        let state = if user.enabled { "" } else { " [disabled]" };
        if details.is_empty() {
            format!("{}{}", line, state)
        } else {
            format!("{} ({}){}", line, details.join(" | "), state)
        }
    }

    fn print_notes(&mut self, notes_text: &str) -> Result<()> {
        if notes_text.trim().is_empty() {
            writeln!(self.out, "  (no notes)")?;
        }
        for line in notes::lines(notes_text) {
            writeln!(self.out, "  {}", line)?;
        }
        Ok(())
    }

    fn ask_required(&mut self, prompt: &str) -> Result<String> {
        let answer = self.prompt.ask_line(prompt)?;
        let answer = answer.trim().to_string();
        if answer.is_empty() {
            return Err(AdError::PromptError {
                message: format!(
                    "a value is required for '{}'",
                    prompt.trim_end_matches(|c: char| c == ':' || c == ' ')
                ),
            });
        }
        Ok(answer)
    }

    async fn create_user(&mut self) -> Result<()> {
        let given_name = self.ask_required("First name: ")?;
        let surname = self.ask_required("Last name: ")?;
        let username = self.ask_required("Username: ")?;
        let password = self.prompt.ask_secret("Password: ")?;

        let new_user = NewUser::new(given_name, surname, username);
        let user = self.lifecycle.create_user(&new_user, &password).await?;

        writeln!(
            self.out,
            "Created {} ({}) in {}",
            user.sam_account_name, user.user_principal_name, user.distinguished_name
        )?;
        Ok(())
    }

    async fn disable_user(&mut self) -> Result<()> {
        let username = self.ask_required("Username: ")?;
        let outcome = self.lifecycle.disable_user(&username).await?;

        match outcome.status {
            DisableStatus::AlreadyDisabled => {
                writeln!(
                    self.out,
                    "{} is already disabled. Current notes:",
                    outcome.user.sam_account_name
                )?;
            }
            DisableStatus::Disabled => {
                writeln!(
                    self.out,
                    "Disabled {} and moved it to {}",
                    outcome.user.sam_account_name, outcome.user.distinguished_name
                )?;
                if !outcome.failed.is_empty() {
                    writeln!(
                        self.out,
                        "Warning: could not remove from {}",
                        outcome.failed.join(", ")
                    )?;
                }
                writeln!(self.out, "Notes:")?;
            }
        }
        self.print_notes(&outcome.user.notes)
    }

    async fn update_notes(&mut self) -> Result<()> {
        let username = self.ask_required("Username: ")?;
        let text = self.ask_required("Note: ")?;

        let user = self.lifecycle.update_notes(&username, &text).await?;
        writeln!(self.out, "Notes for {}:", user.sam_account_name)?;
        self.print_notes(&user.notes)
    }

    async fn add_user_to_group(&mut self) -> Result<()> {
        let username = self.ask_required("Username: ")?;
        let user = self.lifecycle.user_groups(&username).await?;

        writeln!(self.out, "Groups for {}:", user.sam_account_name)?;
        for group in &user.groups {
            writeln!(self.out, "  {}", group)?;
        }
        writeln!(self.out, "Results found: {}", user.groups.len())?;

        let group = self
            .prompt
            .ask_line("Group to add (leave blank to skip): ")?;
        let group = group.trim();
        if group.is_empty() {
            return Ok(());
        }

        if self
            .lifecycle
            .add_user_to_group(&user.sam_account_name, group)
            .await?
        {
            writeln!(self.out, "Added {} to {}", user.sam_account_name, group)?;
        } else {
            writeln!(
                self.out,
                "{} is already a member of {}",
                user.sam_account_name, group
            )?;
        }
        Ok(())
    }

    async fn group_members(&mut self) -> Result<()> {
        let group_name = self.ask_required("Group name: ")?;
        let (group, users) = self.lifecycle.group_members(&group_name).await?;

        writeln!(self.out, "Members of {}:", group.name)?;
        self.print_users(&users)
    }
}

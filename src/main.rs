use adcmd::core::command::{Command, CommandRunner};
use adcmd::domain::ports::DirectoryConnector;
use adcmd::utils::{logger, validation::Validate};
use adcmd::{
    AdError, CliConfig, ConsolePrompt, DirectoryQueryService, DirectorySettings,
    InMemoryDirectory, LdapDirectory, UserLifecycleService,
};
use std::path::Path;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = CliConfig::from_env_args();

    // 初始化日誌
    if config.log_json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting adcmd");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 載入並驗證設定
    let settings = match load_settings(&config.config) {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.severity().exit_code().max(1));
        }
    };

    let command = config.command();
    let result = if config.dry_run {
        tracing::info!("🔍 Dry run: using an empty in-memory directory");
        run(InMemoryDirectory::from_settings(&settings), settings, &config, &command).await
    } else {
        run(LdapDirectory::from_settings(&settings), settings, &config, &command).await
    };

    match result {
        Ok(()) => tracing::info!("✅ {} finished", command.name()),
        Err(e) => {
            // 記錄詳細錯誤信息
            tracing::error!(
                "❌ {} failed: {} (Category: {:?}, Severity: {:?})",
                command.name(),
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());

            // 依嚴重程度決定退出碼
            let exit_code = e.severity().exit_code();
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }
}

fn load_settings(path: &Path) -> Result<DirectorySettings, AdError> {
    let settings = DirectorySettings::from_file(path)?;
    settings.validate()?;
    tracing::debug!("Settings: {:?}", settings);
    Ok(settings)
}

async fn run<D>(
    connector: D,
    settings: Arc<DirectorySettings>,
    config: &CliConfig,
    command: &Command,
) -> Result<(), AdError>
where
    D: DirectoryConnector + Clone,
{
    let query = DirectoryQueryService::new(connector.clone(), Arc::clone(&settings));
    let lifecycle = UserLifecycleService::new(connector, settings);

    let mut runner = CommandRunner::new(query, lifecycle, ConsolePrompt::new(), std::io::stdout())
        .verbose(config.verbose)
        .export_to(config.export_users.clone());

    runner.run(command).await
}

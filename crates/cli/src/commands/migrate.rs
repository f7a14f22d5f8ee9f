use crate::commands::CommandResult;
use trusty_core::config::{AppConfig, LoadOptions};
use trusty_db::{connect, migrations};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let before = migrations::applied_count(&pool).await;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let after = migrations::applied_count(&pool).await;
        pool.close().await;
        Ok::<(u64, u64), (&'static str, String, u8)>((before, after))
    });

    match result {
        Ok((before, after)) if after > before => CommandResult::success(
            "migrate",
            format!("applied {} migrations ({after} total)", after - before),
        ),
        Ok((_, after)) => CommandResult::success(
            "migrate",
            format!("schema already up to date ({after} migrations applied previously)"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}

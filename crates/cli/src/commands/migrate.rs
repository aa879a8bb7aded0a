use treadline_db::{connect_with_config, migrations};

use crate::commands::{block_on, load_config, CommandResult, EXIT_DATABASE, EXIT_MIGRATION};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let applied = block_on("migrate", async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        let applied = migrations::MIGRATOR
            .iter()
            .filter(|migration| migration.migration_type.is_up_migration())
            .count();
        pool.close().await;
        Ok(applied)
    });

    match applied {
        Ok(count) => CommandResult::success(
            "migrate",
            format!("applied pending migrations ({count} known) to {}", config.database.url),
        ),
        Err(result) => result,
    }
}

use treadline_db::{connect_with_config, migrations, FleetSeedDataset, RequestSeedInfo};

use crate::commands::{
    block_on, load_config, CommandResult, EXIT_DATABASE, EXIT_MIGRATION, EXIT_VERIFICATION,
};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let seeded = block_on("seed", async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let seed_result = FleetSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;

        let verification = FleetSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_VERIFICATION))?;
        pool.close().await;

        let failed: Vec<&str> = verification
            .checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect();
        if verification.all_present {
            Ok(seed_result.requests_seeded)
        } else {
            Err(("seed_verification", verification_failure_message(&failed), EXIT_VERIFICATION))
        }
    });

    match seeded {
        Ok(requests) => CommandResult::success("seed", summary(&requests)),
        Err(result) => result,
    }
}

fn summary(requests: &[RequestSeedInfo]) -> String {
    let lines: Vec<String> = requests
        .iter()
        .map(|request| {
            format!("  - request {} [{}]: {}", request.request_id, request.status, request.description)
        })
        .collect();
    format!("demo fleet loaded (1 user, 2 vehicles, 2 suppliers):\n{}", lines.join("\n"))
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

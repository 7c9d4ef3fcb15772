//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `geofence_core` linkage without a mobile host.
//! - Print the geofences stored in a plugin database for quick inspection.
//!
//! Usage: `geofence_cli [DB_PATH]`

use geofence_core::db::open_db;
use geofence_core::{NotificationStore, SqliteNotificationStore};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("geofence_core ping={}", geofence_core::ping());
    println!("geofence_core version={}", geofence_core::core_version());

    let Some(db_path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };

    let store = match open_db(&db_path) {
        Ok(conn) => SqliteNotificationStore::new(conn),
        Err(err) => {
            eprintln!("failed to open `{db_path}`: {err}");
            return ExitCode::FAILURE;
        }
    };

    match store.all_notifications() {
        Ok(notifications) => {
            println!("geofences={}", notifications.len());
            for notification in &notifications {
                println!("{notification}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to list geofences: {err}");
            ExitCode::FAILURE
        }
    }
}

pub mod commands;
pub mod inspect;
pub mod maintenance;

pub use commands::{Cli, Commands};

use crate::errors::StoreError;

/// Run one parsed command.
pub fn run(command: Commands) -> Result<(), StoreError> {
    match command {
        Commands::Info(args) => inspect::handle_info(args),
        Commands::Alerts(args) => inspect::handle_alerts(args),
        Commands::Sessions(args) => inspect::handle_sessions(args),
        Commands::Compact(args) => maintenance::handle_compact(args),
        Commands::DeleteSession(args) => maintenance::handle_delete_session(args),
        Commands::DiscardSession(args) => maintenance::handle_discard_session(args),
        Commands::Version => {
            println!("proxystore {}", commands::long_version());
            Ok(())
        }
    }
}

/// Process exit code for an error, by error class.
pub fn exit_code(error: &StoreError) -> i32 {
    match error.classify().error_type {
        "ConfigError" => 2,
        "UnsupportedBackendError" => 3,
        "ConnectionError" => 4,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_class() {
        assert_eq!(exit_code(&StoreError::Config("x".into())), 2);
        assert_eq!(exit_code(&StoreError::UnsupportedBackend("x".into())), 3);
        let exhausted = StoreError::RetriesExhausted {
            operation: "open".into(),
            attempts: 5,
            source: Box::new(StoreError::Closed),
        };
        assert_eq!(exit_code(&exhausted), 4);
        assert_eq!(exit_code(&StoreError::Closed), 1);
    }
}

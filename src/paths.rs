//! Where tasknest keeps its files.

fn home() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".into())
}

/// Resolve the database path.
/// Checks `TNEST_DB` env var, falls back to `$HOME/.tasknest/tasknest.db`.
pub fn db_path() -> String {
    std::env::var("TNEST_DB").unwrap_or_else(|_| format!("{}/.tasknest/tasknest.db", home()))
}

/// Resolve the config file path.
/// Checks `TNEST_CONFIG` env var, falls back to `$HOME/.tasknest/config.toml`.
pub fn config_path() -> String {
    std::env::var("TNEST_CONFIG").unwrap_or_else(|_| format!("{}/.tasknest/config.toml", home()))
}

/// Identity used when a command does not name one: `TNEST_USER`, then `USER`.
pub fn default_requester() -> String {
    std::env::var("TNEST_USER")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "local".into())
}

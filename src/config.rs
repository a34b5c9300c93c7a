use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub upload_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_or("PORT", "8080").parse().unwrap_or(8080),
            database_url: env_or("DATABASE_URL", "sqlite:chat.db"),
            upload_dir: env_or("UPLOAD_DIR", "uploads").into(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    dotenv::var(key).unwrap_or_else(|_| default.to_owned())
}

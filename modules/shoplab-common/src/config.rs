use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Shop
    pub shop_id: u64,
    pub data_dir: String,

    // Etsy
    pub etsy_keys_path: String,

    // OpenAI
    pub openai_api_key: String,
    pub openai_model: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            shop_id: required_env("SHOP_ID")
                .parse()
                .expect("SHOP_ID must be a number"),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            etsy_keys_path: env::var("ETSY_KEYS_PATH").unwrap_or_else(|_| "keys.json".to_string()),
            openai_api_key: required_env("OPENAI_API_KEY"),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4.1".to_string()),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

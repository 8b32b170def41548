use std::env;

use bigdecimal::BigDecimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Mongo,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub store_backend: StoreBackend,
    pub mongodb_uri: String,
    pub mongodb_db: String,
    pub host: String,
    pub port: u16,

    pub jwt_secret: String,
    pub token_days: i64,

    /// Rate applied to the balance to derive the `interest` field.
    pub interest_rate: BigDecimal,
    /// Compare-and-set attempts per balance mutation before giving up.
    pub cas_max_attempts: u32,
    pub bcrypt_cost: u32,
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub fn load() -> Settings {
    // Loads .env if present (no crash if missing)
    dotenvy::dotenv().ok();

    let store_backend = match env::var("STORE_BACKEND").as_deref() {
        Ok("mongodb") | Ok("mongo") => StoreBackend::Mongo,
        _ => StoreBackend::Memory,
    };

    let mongodb_uri = env::var("MONGODB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

    let mongodb_db = env::var("MONGODB_DB")
        .unwrap_or_else(|_| "pocketbank".to_string());

    let host = env::var("HOST")
        .unwrap_or_else(|_| "127.0.0.1".to_string());

    let port = parsed("PORT", 3000u16);

    let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| "change-me-dev-secret".to_string());
    let token_days = parsed("TOKEN_DAYS", 7i64).max(1);

    let interest_rate = parsed("INTEREST_RATE", BigDecimal::from(2i64) / BigDecimal::from(100i64));
    let cas_max_attempts = parsed("CAS_MAX_ATTEMPTS", 8u32).max(1);
    let bcrypt_cost = parsed("BCRYPT_COST", bcrypt::DEFAULT_COST).clamp(4, 31);

    Settings {
        store_backend,
        mongodb_uri,
        mongodb_db,
        host,
        port,
        jwt_secret,
        token_days,
        interest_rate,
        cas_max_attempts,
        bcrypt_cost,
    }
}

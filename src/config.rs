use dotenvy::dotenv;
use std::env;

use crate::model::leave::LEAVES_COLLECTION;
use crate::model::user::USERS_COLLECTION;

/// Runtime knobs for the sync core. Everything is defaulted so embedding the
/// crate needs no environment at all.
#[derive(Clone, Debug)]
pub struct Config {
    pub leaves_collection: String,
    pub users_collection: String,

    /// Change-notification channel capacity for the in-memory store.
    pub channel_capacity: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            leaves_collection: env::var("CLMS_LEAVES_COLLECTION")
                .unwrap_or_else(|_| LEAVES_COLLECTION.to_string()),
            users_collection: env::var("CLMS_USERS_COLLECTION")
                .unwrap_or_else(|_| USERS_COLLECTION.to_string()),
            channel_capacity: env::var("CLMS_CHANNEL_CAPACITY")
                .unwrap_or_else(|_| "64".to_string())
                .parse()
                .unwrap(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            leaves_collection: LEAVES_COLLECTION.to_string(),
            users_collection: USERS_COLLECTION.to_string(),
            channel_capacity: 64,
        }
    }
}

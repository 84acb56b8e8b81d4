use adledger_core::RankPlatform;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("scrape already in flight: {platform} '{keyword}' for client {client_id}")]
    AlreadyInFlight {
        client_id: String,
        platform: RankPlatform,
        keyword: String,
    },

    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] adledger_db::DatabaseError),
}

pub type Result<T> = std::result::Result<T, SyncError>;

pub mod export;
pub mod health;
pub mod mock;
pub mod oauth;
pub mod reports;
pub mod status;

//! Google collaborators: the OAuth helpers behind the consent routes and the
//! GA4 Data API client.

pub mod analytics;
pub mod oauth;

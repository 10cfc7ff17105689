pub use trendline_core::config::{Config, GoogleConfig, OpenAiConfig};

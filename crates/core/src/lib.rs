pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AppConfig, BrowserPoolConfig, ExtractorConfig, FetchPolicyConfig, FrontierConfig,
    GeneralConfig, SpaDetectorConfig, StaticFetchConfig,
};
pub use error::{CrawlError, FatalCrawlError};
pub use types::*;

//! Socialcast - multi-platform publishing core
//!
//! Publishes one post to many connected social accounts at once, keeping
//! every account inside its platform's API budget, tracking account health
//! and recording per-account outcomes.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod keyed;
pub mod logging;
pub mod orchestrator;
pub mod platforms;
pub mod rate_limiter;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use db::{Database, PublishStore};
pub use error::{FailureKind, PlatformError, Result, SocialcastError};
pub use health::{AccountHealthSnapshot, AccountHealthTracker, HealthStatus};
pub use keyed::AccountKey;
pub use orchestrator::PublishOrchestrator;
pub use rate_limiter::{RateLimitStatus, RateLimiter};
pub use types::{
    AccountOutcome, AttemptStatus, MediaRef, Post, PostStatus, PostType, PublishReport,
    SocialAccount,
};

//! # 授权与准入模块
//!
//! 来源授权、人机挑战校验、双窗口速率限制

pub mod challenge;
pub mod origin;
pub mod rate_limit;
pub mod types;

pub use challenge::ChallengeVerifier;
pub use origin::OriginAuthorizer;
pub use rate_limit::{
    DurableCounter, FastCounter, MemoryHourCounter, MemoryMinuteCounter, RateLimitVerdict,
    RateLimiter,
};
pub use types::{
    CredentialSource, EnvSecretResolver, MapSecretResolver, RequestIdentity, ResolvedCredential,
    SecretResolver,
};

//! Rate limiting logic and counter storage.

mod backend;
mod counter;
mod distributed;
mod limiter;
mod memory;
mod token;

pub use backend::CounterStore;
pub use counter::CounterRecord;
pub use distributed::{RedisStore, DEFAULT_KEY_PREFIX};
pub use limiter::{Decision, LimitConfig, RateLimiter, MAX_INTERVAL_SECS};
pub use memory::{InMemoryStore, Sweeper};
pub use token::{Token, MAX_TOKEN_LEN};

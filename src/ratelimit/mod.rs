//! Rate limiting logic and state management.

mod backend;
mod clock;
mod counter;
mod key;
mod limiter;
mod policy;
mod remote;

pub use backend::CounterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{CounterState, Decision};
pub use key::{
    derive_key, AuthenticatedUser, DefaultKeyDeriver, KeyDeriver, RateLimitKey,
    DEFAULT_TRUSTED_IP_HEADER, FORWARDED_FOR,
};
pub use limiter::CounterRegistry;
pub use policy::{
    PolicyTable, RateLimitPolicy, AUTH, EXPENSIVE, MAX_WINDOW_SECONDS, SEARCH, STANDARD, UPLOAD,
};
pub use remote::RemoteCounters;

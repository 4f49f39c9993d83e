pub mod clock;
pub mod resettable_timeout;
pub mod scheduler;

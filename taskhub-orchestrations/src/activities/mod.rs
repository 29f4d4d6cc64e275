pub mod get_user;
pub mod greet_user;
pub mod generation_basic;
pub mod random_time_waiting;

pub mod simple_with_tasks;
pub mod simple_with_timer;
pub mod generation_basic;
pub mod simple_with_sub_orchestration;
pub mod driver;
pub mod test_orchestration;

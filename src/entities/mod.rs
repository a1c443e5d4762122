pub mod material;
pub mod operation;
pub mod order;
pub mod tech_process;
pub mod user;
pub mod user_rate;
pub mod work_time;

pub mod junit;
pub mod run_result;

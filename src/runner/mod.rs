pub mod aggregator;
pub mod backend;
pub mod backends;
pub mod display;
pub mod executor;
pub mod report;
pub mod resolver;
pub mod result;

#[cfg(test)]
pub(crate) mod test_runners;

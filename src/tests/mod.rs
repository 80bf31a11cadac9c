

#[cfg(test)]
pub mod runner_tests;

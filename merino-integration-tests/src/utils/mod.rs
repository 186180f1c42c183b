//! Tools shared by the tests.

pub mod accuweather;
pub mod logging;
pub mod metrics;
pub mod test_tools;

pub mod locator;
pub mod normalizer;
pub mod runner;
pub mod sink;
